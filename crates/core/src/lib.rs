#![doc = include_str!("../README.md")]

use std::future::Future;
use std::pin::Pin;

pub mod config;
pub mod error;
pub mod metrics;
pub mod types;

/// 객체 안전한 비동기 trait 메서드의 반환 타입
///
/// 협력자 trait(`AnalysisStore`, `LogContentSource`, `LlmProvider` 등)은
/// `Arc<dyn Trait>`으로 주입되므로 boxed future를 반환해야 합니다.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// --- 주요 타입 re-export ---
// 각 모듈의 핵심 타입을 크레이트 루트에서 바로 사용할 수 있도록 합니다.

// 에러
pub use error::{ConfigError, ContentError, ProviderError, ProviderErrorKind, StorageError};

// 설정
pub use config::LogwardConfig;

// 도메인 타입
pub use types::{
    AnalysisResult, Finding, FindingCategory, FindingSource, LlmOverride, ProviderKind, Severity,
    Upload, UploadStatus,
};
