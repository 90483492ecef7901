//! HTTP 표면의 형태 — DTO, 에러 분류, 상태 코드 매핑
//!
//! 전송(라우팅, 세션)은 제외된 협력자의 몫입니다. 이 모듈은 코어가
//! 소비/생산하는 요청/응답의 형태만 정의합니다.
//!
//! 모든 에러 응답은 기계 판별 가능한 `kind`와 사람이 읽을 메시지를
//! 담습니다. 스택 트레이스나 내부 식별자는 노출되지 않으며, 업스트림
//! 프로바이더 에러는 분류된 고정 문구로만 표면화됩니다.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use logward_core::types::{FindingCategory, FindingSource, Severity};
use logward_store::{FindingFilter, PageRequest};

use crate::error::ServiceError;
use crate::service::AnalyzeOutcome;

/// 기계 판별 가능한 에러 분류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// 요청 형식 오류 — 입력 수정 필요
    Validation,
    /// 세션 없음
    Unauthorized,
    /// 소유자 아님 — 재시도 불가
    Forbidden,
    /// 자원 없음
    NotFound,
    /// 분석 진행 중 — 폴링 가능
    Conflict,
    /// 속도 제한 — `retry_after_ms` 이후 재시도
    RateLimited,
    /// 업스트림 프로바이더 실패 (정제됨)
    UpstreamProvider,
    /// 파이프라인 내부 실패
    Pipeline,
}

/// API 에러 응답 형태
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// 에러 분류
    pub kind: ErrorKind,
    /// 사람이 읽을 메시지 (내부 상세 없음)
    pub message: String,
    /// RateLimited일 때 재시도 힌트 (밀리초)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

impl ApiError {
    /// HTTP 상태 코드 매핑
    pub fn http_status(&self) -> u16 {
        match self.kind {
            ErrorKind::Validation => 400,
            ErrorKind::Unauthorized => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::RateLimited => 429,
            ErrorKind::UpstreamProvider => 502,
            ErrorKind::Pipeline => 500,
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation { reason } => Self {
                kind: ErrorKind::Validation,
                message: reason,
                retry_after_ms: None,
            },
            ServiceError::Forbidden { .. } => Self {
                kind: ErrorKind::Forbidden,
                message: "you do not own this upload".to_owned(),
                retry_after_ms: None,
            },
            ServiceError::NotFound { .. } => Self {
                kind: ErrorKind::NotFound,
                message: "upload not found".to_owned(),
                retry_after_ms: None,
            },
            ServiceError::Conflict { .. } => Self {
                kind: ErrorKind::Conflict,
                message: "analysis is already running for this upload".to_owned(),
                retry_after_ms: None,
            },
            ServiceError::RateLimited { retry_after_ms } => Self {
                kind: ErrorKind::RateLimited,
                message: "too many analysis requests, retry later".to_owned(),
                retry_after_ms: Some(retry_after_ms),
            },
            // 프로바이더 원문(detail)은 버리고 분류된 고정 문구만 노출
            ServiceError::Provider(e) => Self {
                kind: ErrorKind::UpstreamProvider,
                message: e.kind.user_message().to_owned(),
                retry_after_ms: None,
            },
            ServiceError::Storage(_) | ServiceError::Content(_) | ServiceError::Phase { .. } => {
                Self {
                    kind: ErrorKind::Pipeline,
                    message: "analysis pipeline failed".to_owned(),
                    retry_after_ms: None,
                }
            }
        }
    }
}

/// `POST /uploads/{id}/analyze` 응답 형태
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    /// 추적 메시지
    pub message: String,
    /// 결과 레코드 ID
    pub analysis_result_id: String,
    /// HTTP 상태 (202 시작, 200 기존 완료)
    #[serde(skip)]
    pub http_status: u16,
}

impl From<AnalyzeOutcome> for AnalyzeResponse {
    fn from(outcome: AnalyzeOutcome) -> Self {
        match outcome {
            AnalyzeOutcome::Accepted { analysis_result_id } => Self {
                message: "analysis started, poll the upload status for progress".to_owned(),
                analysis_result_id,
                http_status: 202,
            },
            AnalyzeOutcome::AlreadyCompleted { analysis_result_id } => Self {
                message: "analysis already completed, pass reanalyze=true to run again"
                    .to_owned(),
                analysis_result_id,
                http_status: 200,
            },
        }
    }
}

/// `GET /findings` 쿼리 형태 (파싱 전)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FindingsQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub severity: Option<String>,
    pub category: Option<String>,
    pub source: Option<String>,
    pub search: Option<String>,
    pub date_start: Option<String>,
    pub date_end: Option<String>,
}

impl FindingsQuery {
    /// 쿼리를 검증하고 저장소 필터/페이지로 변환합니다.
    ///
    /// 알 수 없는 enum 문자열과 파싱 불가능한 날짜는 Validation
    /// 에러입니다. page/limit은 계약 범위로 정규화됩니다.
    pub fn parse(self) -> Result<(FindingFilter, PageRequest), ApiError> {
        let severity = self
            .severity
            .as_deref()
            .map(|s| {
                Severity::from_str_loose(s).ok_or_else(|| validation(format!(
                    "unknown severity: {s}"
                )))
            })
            .transpose()?;

        let category = self
            .category
            .as_deref()
            .map(|s| {
                FindingCategory::from_str_loose(s)
                    .ok_or_else(|| validation(format!("unknown category: {s}")))
            })
            .transpose()?;

        let source = self
            .source
            .as_deref()
            .map(|s| {
                FindingSource::from_str_loose(s)
                    .ok_or_else(|| validation(format!("unknown source: {s}")))
            })
            .transpose()?;

        let date_start = self
            .date_start
            .as_deref()
            .map(parse_rfc3339)
            .transpose()?;
        let date_end = self.date_end.as_deref().map(parse_rfc3339).transpose()?;

        if let (Some(start), Some(end)) = (date_start, date_end)
            && start > end
        {
            return Err(validation("date_start must not be after date_end".to_owned()));
        }

        let filter = FindingFilter {
            severity,
            category,
            source,
            search: self.search,
            date_start,
            date_end,
        };

        let page = PageRequest::new(
            self.page.unwrap_or(1),
            self.limit.unwrap_or(PageRequest::DEFAULT_LIMIT),
        )
        .normalized();

        Ok((filter, page))
    }
}

fn parse_rfc3339(s: &str) -> Result<DateTime<Utc>, ApiError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| validation(format!("invalid RFC 3339 date: {s}")))
}

fn validation(message: String) -> ApiError {
    ApiError {
        kind: ErrorKind::Validation,
        message,
        retry_after_ms: None,
    }
}
