//! 서비스 에러 분류 체계
//!
//! [`ServiceError`]는 분석 요청/실행의 모든 실패를 기계 판별 가능한
//! 분류로 표현합니다. HTTP 형태로의 매핑은 [`crate::api`]가 담당합니다.

use logward_core::error::{ContentError, ProviderError, StorageError};

/// 분석 서비스 에러
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// 요청 형식 오류 — 사용자가 입력을 수정해야 함
    #[error("validation error: {reason}")]
    Validation { reason: String },

    /// 업로드 소유자가 아님 — 재시도 불가
    #[error("upload {upload_id} does not belong to the caller")]
    Forbidden { upload_id: String },

    /// 업로드 없음
    #[error("upload {upload_id} not found")]
    NotFound { upload_id: String },

    /// 이미 분석 진행 중 — 클라이언트는 폴링 가능
    #[error("analysis already running for upload {upload_id}")]
    Conflict { upload_id: String },

    /// 속도 제한 초과 — `retry_after_ms` 이후 재시도
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// 업스트림 프로바이더 실패 (분류됨, 표면화 전 정제)
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// 스토리지 실패
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// 로그 콘텐츠 읽기 실패
    #[error(transparent)]
    Content(#[from] ContentError),

    /// 단계 실행 중 예기치 못한 실패 — 업로드는 FAILED로 전환됨
    #[error("pipeline phase '{phase}' failed: {reason}")]
    Phase { phase: &'static str, reason: String },
}
