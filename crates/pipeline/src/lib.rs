#![doc = include_str!("../README.md")]
//!
//! # 실행 흐름
//!
//! ```text
//! request ──> AdmissionGuard ──> try_begin_analysis (CAS) ──> 202 Accepted
//!                                       │
//!                                tokio::spawn
//!                                       │
//!                     rule phase ──> mark durable ──> llm phase ──> COMPLETED
//!
//! RecoveryScheduler ──(startup/stall sweep)──> resume(upload)
//! ```

pub mod admission;
pub mod api;
pub mod content;
pub mod error;
pub mod recovery;
pub mod service;
pub mod settings;

// --- 주요 타입 re-export ---

// 서비스
pub use service::{AnalysisService, AnalysisServiceBuilder, AnalyzeOutcome};

// 에러
pub use error::ServiceError;

// 수락 제어
pub use admission::{AdmissionDecision, AdmissionGuard};

// 복구
pub use recovery::RecoveryScheduler;

// 협력자 인터페이스
pub use content::{FsContentSource, LogContentSource};
pub use settings::{EnvSettings, SettingsProvider};

// API 형태
pub use api::{AnalyzeResponse, ApiError, ErrorKind, FindingsQuery};
