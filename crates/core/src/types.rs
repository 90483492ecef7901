//! 도메인 타입 — 분석 파이프라인 전역에서 사용되는 공통 타입
//!
//! 업로드, 분석 결과, 탐지 결과(Finding)와 그 분류 체계를 정의합니다.
//! 모든 크레이트는 이 타입들을 사용하여 데이터를 교환하고 저장합니다.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 심각도 레벨
///
/// `Ord` 구현으로 심각도 비교가 가능합니다 (`Info < Low < Medium < High < Critical`).
/// 표시/정렬 계약인 "CRITICAL 우선"은 심각도 내림차순 정렬을 의미합니다.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// 정보성 이벤트
    #[default]
    Info,
    /// 낮은 심각도
    Low,
    /// 중간 심각도
    Medium,
    /// 높은 심각도
    High,
    /// 치명적 — 즉시 대응 필요
    Critical,
}

impl Severity {
    /// 저장/직렬화에 사용되는 정규 문자열을 반환합니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }

    /// 문자열에서 심각도를 파싱합니다. 대소문자를 구분하지 않습니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "info" | "informational" => Some(Self::Info),
            "low" => Some(Self::Low),
            "medium" | "med" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" | "crit" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 탐지 카테고리 — 11종의 고정 분류
///
/// 패턴 라이브러리는 `PasswordSpray`를 제외한 10종을 다루며,
/// `PasswordSpray`는 통계 규칙에서만 생성됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FindingCategory {
    SqlInjection,
    Xss,
    BruteForce,
    PasswordSpray,
    DirectoryTraversal,
    CommandInjection,
    SuspiciousStatusCode,
    RateAnomaly,
    MaliciousUserAgent,
    PrivilegeEscalation,
    DataExfiltration,
}

impl FindingCategory {
    /// 전체 카테고리 목록 (정렬/검증용)
    pub const ALL: [FindingCategory; 11] = [
        Self::SqlInjection,
        Self::Xss,
        Self::BruteForce,
        Self::PasswordSpray,
        Self::DirectoryTraversal,
        Self::CommandInjection,
        Self::SuspiciousStatusCode,
        Self::RateAnomaly,
        Self::MaliciousUserAgent,
        Self::PrivilegeEscalation,
        Self::DataExfiltration,
    ];

    /// 저장/직렬화에 사용되는 정규 문자열을 반환합니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SqlInjection => "SQL_INJECTION",
            Self::Xss => "XSS",
            Self::BruteForce => "BRUTE_FORCE",
            Self::PasswordSpray => "PASSWORD_SPRAY",
            Self::DirectoryTraversal => "DIRECTORY_TRAVERSAL",
            Self::CommandInjection => "COMMAND_INJECTION",
            Self::SuspiciousStatusCode => "SUSPICIOUS_STATUS_CODE",
            Self::RateAnomaly => "RATE_ANOMALY",
            Self::MaliciousUserAgent => "MALICIOUS_USER_AGENT",
            Self::PrivilegeEscalation => "PRIVILEGE_ESCALATION",
            Self::DataExfiltration => "DATA_EXFILTRATION",
        }
    }

    /// 문자열에서 카테고리를 파싱합니다.
    ///
    /// 대소문자를 구분하지 않으며 `-`/공백을 `_`로 취급합니다.
    /// LLM 응답처럼 형식이 느슨한 입력을 흡수하기 위한 것입니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        let normalized = s.trim().to_uppercase().replace(['-', ' '], "_");
        Self::ALL
            .iter()
            .find(|c| c.as_str() == normalized)
            .copied()
    }
}

impl fmt::Display for FindingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 탐지 결과의 출처
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FindingSource {
    /// 결정적 규칙 엔진
    RuleBased,
    /// LLM 컨텍스트 분석
    Llm,
}

impl FindingSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RuleBased => "RULE_BASED",
            Self::Llm => "LLM",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "RULE_BASED" => Some(Self::RuleBased),
            "LLM" => Some(Self::Llm),
            _ => None,
        }
    }
}

impl fmt::Display for FindingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 업로드 상태
///
/// 상태 전환은 파이프라인 상태 기계를 통해서만 수행됩니다:
/// `Pending -> Analyzing -> {Completed, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UploadStatus {
    /// 제출됨, 분석 대기
    Pending,
    /// 분석 진행 중 (규칙 단계 또는 LLM 단계)
    Analyzing,
    /// 분석 완료
    Completed,
    /// 분석 실패 — 명시적 재분석으로만 재진입
    Failed,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Analyzing => "ANALYZING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "PENDING" => Some(Self::Pending),
            "ANALYZING" => Some(Self::Analyzing),
            "COMPLETED" => Some(Self::Completed),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 업로드된 로그 파일 레코드
///
/// 파일 제출 시 생성되며, 상태는 파이프라인만 변경합니다.
/// 파이프라인은 업로드를 삭제하지 않습니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Upload {
    /// 업로드 ID (UUID v4)
    pub id: String,
    /// 소유 사용자 ID
    pub user_id: String,
    /// 원본 파일명
    pub file_name: String,
    /// 파일 크기 (바이트)
    pub size_bytes: u64,
    /// 현재 상태
    pub status: UploadStatus,
    /// 생성 시각
    pub created_at: DateTime<Utc>,
    /// 마지막 갱신 시각 — 복구 스케줄러의 stall 판정 기준
    pub updated_at: DateTime<Utc>,
}

impl Upload {
    /// 새 업로드 레코드를 생성합니다 (상태 `Pending`).
    pub fn new(
        user_id: impl Into<String>,
        file_name: impl Into<String>,
        size_bytes: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            file_name: file_name.into(),
            size_bytes,
            status: UploadStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

impl fmt::Display for Upload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({} bytes) user={}",
            self.status, self.file_name, self.size_bytes, self.user_id,
        )
    }
}

/// 분석 결과 레코드 — 업로드와 1:1
///
/// `rule_based_completed`는 단계 경계의 내구성 마커입니다.
/// 이 값이 `true`면 중단된 분석은 LLM 단계부터 재개됩니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// 결과 ID (UUID v4)
    pub id: String,
    /// 대상 업로드 ID
    pub upload_id: String,
    /// 규칙 단계 완료 마커
    pub rule_based_completed: bool,
    /// 전체 상태 (업로드 상태와 동일한 어휘)
    pub status: UploadStatus,
    /// 실패 시 기록되는 에러 요약
    pub error: Option<String>,
    /// 생성 시각
    pub created_at: DateTime<Utc>,
    /// 마지막 갱신 시각
    pub updated_at: DateTime<Utc>,
}

impl AnalysisResult {
    /// 분석 시작 시점의 새 결과 레코드를 생성합니다.
    pub fn new(upload_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            upload_id: upload_id.into(),
            rule_based_completed: false,
            status: UploadStatus::Analyzing,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// 탐지 결과 — 하나의 보안 관련 이벤트/패턴
///
/// append-only이며, 동일 `fingerprint`는 하나의 `AnalysisResult` 내에서
/// 중복 저장되지 않습니다 (재분석 멱등성의 핵심).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    /// Finding ID (UUID v4)
    pub id: String,
    /// 소속 분석 결과 ID
    pub analysis_result_id: String,
    /// 심각도
    pub severity: Severity,
    /// 카테고리
    pub category: FindingCategory,
    /// 제목
    pub title: String,
    /// 상세 설명
    pub description: String,
    /// 매칭된 라인 번호 (1부터)
    pub line_number: Option<u64>,
    /// 매칭된 라인 내용 (절단될 수 있음)
    pub line_content: Option<String>,
    /// 매칭에 사용된 패턴 원문
    pub matched_pattern: Option<String>,
    /// 출처 (규칙 엔진 / LLM)
    pub source: FindingSource,
    /// 결정적 중복 제거 키
    pub fingerprint: String,
    /// 신뢰도 [0, 1]
    pub confidence: Option<f64>,
    /// MITRE ATT&CK 전술
    pub mitre_tactic: Option<String>,
    /// MITRE ATT&CK 기법
    pub mitre_technique: Option<String>,
    /// 로그 라인에서 파싱된 이벤트 시각
    pub event_timestamp: Option<DateTime<Utc>>,
    /// 생성 시각
    pub created_at: DateTime<Utc>,
}

impl Finding {
    /// 핑거프린트를 계산합니다.
    ///
    /// (카테고리, 정규화된 매칭 내용, 라인 식별자)의 결정적 함수이므로
    /// 동일 입력은 항상 동일 핑거프린트를 생성합니다. 규칙 기반과 LLM
    /// 결과가 같은 함수를 사용해야 병합 시 중복 제거가 성립합니다.
    pub fn fingerprint_of(
        category: FindingCategory,
        content: &str,
        line_number: Option<u64>,
    ) -> String {
        let normalized = normalize_match_content(content);
        match line_number {
            Some(n) => format!("{}|{}|{}", category.as_str(), normalized, n),
            None => format!("{}|{}|-", category.as_str(), normalized),
        }
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} ({})",
            self.severity, self.category, self.title, self.source,
        )
    }
}

/// 매칭 내용 정규화: trim + 소문자화 + 공백 축약
fn normalize_match_content(content: &str) -> String {
    content
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// LLM 프로바이더 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI Chat Completions API
    OpenAi,
    /// Anthropic Messages API
    Anthropic,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" | "open_ai" | "open-ai" => Some(Self::OpenAi),
            "anthropic" | "claude" => Some(Self::Anthropic),
            _ => None,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 사용자별 LLM 설정 오버라이드
///
/// 설정 협력자(암호화 저장소)가 복호화하여 전달하는 해석 완료 값입니다.
/// 우선순위: 명시적 오버라이드 > 사용자 저장 설정 > 환경변수 기본값.
#[derive(Clone, Serialize, Deserialize)]
pub struct LlmOverride {
    /// 사용할 프로바이더
    pub provider: ProviderKind,
    /// 해당 프로바이더의 API 키
    pub api_key: String,
}

// api_key가 로그에 노출되지 않도록 Debug를 직접 구현합니다.
impl fmt::Debug for LlmOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmOverride")
            .field("provider", &self.provider)
            .field("api_key", &"<redacted>")
            .finish()
    }
}
