//! 에러 타입 — 크레이트 경계에서 공유되는 에러 정의
//!
//! 각 기능 크레이트는 자체 도메인 에러를 정의하되, 협력자 trait의
//! 시그니처에 등장하는 에러([`StorageError`], [`ContentError`],
//! [`ProviderError`])는 여기서 정의하여 순환 의존을 피합니다.

use std::fmt;

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 스토리지 에러
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// 연결 실패
    #[error("storage connection failed: {0}")]
    Connection(String),

    /// 쿼리 실패
    #[error("storage query failed: {0}")]
    Query(String),

    /// 데이터 정합성 위반 (예: COMPLETED 업로드에 결과 레코드 없음)
    #[error("storage integrity violation: {0}")]
    Integrity(String),
}

/// 로그 콘텐츠 읽기 에러
///
/// 오브젝트 스토리지 협력자 인터페이스([`LogContentSource`] 구현체)가
/// 반환하는 에러입니다.
#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    /// 업로드에 대응하는 콘텐츠 없음
    #[error("log content not found for upload {upload_id}")]
    NotFound { upload_id: String },

    /// 읽기 실패
    #[error("failed to read log content for upload {upload_id}: {reason}")]
    Read { upload_id: String, reason: String },

    /// 크기 제한 초과
    #[error("log content too large: {size} bytes (max: {max})")]
    TooLarge { size: u64, max: u64 },
}

/// 업스트림 프로바이더 에러 분류
///
/// 원시 에러 문자열은 호출자에게 노출되지 않으며, 이 분류와
/// [`ProviderErrorKind::user_message`]의 고정 문구만 표면화됩니다.
/// 내부 호스트명 등 인프라 상세는 로그에만 남습니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    /// 인증 실패 (401)
    InvalidCredentials,
    /// 요청 시간 초과
    Timeout,
    /// 자원 없음 (404, 존재하지 않는 모델 등)
    NotFound,
    /// 접근 거부 (403)
    AccessDenied,
    /// 엔드포인트 연결 불가
    Unreachable,
    /// 프로바이더 측 속도 제한 (429)
    RateLimited,
    /// 그 외 — 일반 실패 문구로 표면화
    Other,
}

impl ProviderErrorKind {
    /// 호출자에게 노출 가능한 고정 문구를 반환합니다.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "provider credentials are invalid",
            Self::Timeout => "provider request timed out",
            Self::NotFound => "requested provider resource was not found",
            Self::AccessDenied => "access to the provider resource was denied",
            Self::Unreachable => "provider endpoint is unreachable",
            Self::RateLimited => "provider rate limit exceeded",
            Self::Other => "provider request failed",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "invalid_credentials",
            Self::Timeout => "timeout",
            Self::NotFound => "not_found",
            Self::AccessDenied => "access_denied",
            Self::Unreachable => "unreachable",
            Self::RateLimited => "rate_limited",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 업스트림 프로바이더 에러
///
/// `detail`은 내부 로깅용이며 API 응답에는 포함되지 않습니다.
#[derive(Debug, thiserror::Error)]
#[error("provider '{provider}' error ({kind}): {detail}")]
pub struct ProviderError {
    /// 에러 분류
    pub kind: ProviderErrorKind,
    /// 프로바이더 이름 (openai, anthropic 등)
    pub provider: String,
    /// 내부 상세 (로그 전용)
    pub detail: String,
}

impl ProviderError {
    pub fn new(
        kind: ProviderErrorKind,
        provider: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            provider: provider.into(),
            detail: detail.into(),
        }
    }
}
