//! LLM 프로바이더 추상화 — "컨텍스트 로그 분석" 능력에 대한 다형성
//!
//! [`LlmProvider`]는 객체 안전 trait입니다. 요청별 오버라이드에 따라
//! 런타임에 프로바이더가 선택되므로 `Box<dyn LlmProvider>`로 다뤄지며,
//! 비동기 메서드는 [`BoxFuture`]를 반환합니다.
//!
//! 프로바이더 응답은 모델이 생성한 JSON 배열입니다. 형식이 느슨할 수
//! 있으므로 (코드 펜스, 알 수 없는 카테고리 문자열, 범위 밖 신뢰도)
//! 정규화 단계에서 흡수합니다.

use serde::Deserialize;
use serde_json::Value;

use logward_core::BoxFuture;
use logward_core::error::{ProviderError, ProviderErrorKind};
use logward_core::types::{FindingCategory, Severity};

use super::chunk::LogChunk;

/// 프로바이더가 반환하는 정규화된 후보 Finding
#[derive(Debug, Clone)]
pub struct LlmFinding {
    /// 카테고리 (알 수 없는 값은 `RateAnomaly`로 폴백)
    pub category: FindingCategory,
    /// 심각도 (알 수 없는 값은 `Medium`으로 폴백)
    pub severity: Severity,
    /// 제목
    pub title: String,
    /// 근거 설명
    pub description: String,
    /// 파일 절대 라인 번호
    pub line_number: Option<u64>,
    /// 신뢰도 [0, 1] (클램프됨)
    pub confidence: Option<f64>,
    /// MITRE ATT&CK 전술
    pub mitre_tactic: Option<String>,
    /// MITRE ATT&CK 기법
    pub mitre_technique: Option<String>,
    /// 매칭 근거 텍스트 (핑거프린트 계산에 사용)
    pub evidence: Option<String>,
}

/// 컨텍스트 로그 분석 능력을 제공하는 trait
///
/// 구현체는 벤더별로 하나씩이며, 청크 단위 분석만 노출합니다.
/// 청크 수준 실패는 분류된 [`ProviderError`]로 보고되고 호출자가
/// 부분 커버리지로 강등합니다.
pub trait LlmProvider: Send + Sync {
    /// 프로바이더 이름 (로깅/메트릭 레이블)
    fn name(&self) -> &str;

    /// 하나의 청크를 분석하여 후보 Finding을 반환합니다.
    fn analyze_chunk<'a>(
        &'a self,
        chunk: &'a LogChunk,
    ) -> BoxFuture<'a, Result<Vec<LlmFinding>, ProviderError>>;
}

/// 모델 응답의 원시 Finding 형태 (느슨한 스키마)
#[derive(Debug, Deserialize)]
pub(crate) struct RawLlmFinding {
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, alias = "line_number")]
    line: Option<u64>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    mitre_tactic: Option<String>,
    #[serde(default)]
    mitre_technique: Option<String>,
    #[serde(default)]
    evidence: Option<String>,
}

impl RawLlmFinding {
    /// 원시 Finding을 정규화합니다.
    ///
    /// - 알 수 없는 카테고리/심각도는 폴백하고 원문을 설명에 보존
    /// - 청크 상대 라인 번호를 파일 절대 번호로 변환
    /// - 신뢰도를 [0, 1]로 클램프
    pub(crate) fn normalize(self, chunk: &LogChunk) -> LlmFinding {
        let mut description = self.description.unwrap_or_default();

        let category = match self.category.as_deref().and_then(FindingCategory::from_str_loose)
        {
            Some(c) => c,
            None => {
                if let Some(raw) = self.category.as_deref() {
                    if !description.is_empty() {
                        description.push(' ');
                    }
                    description.push_str(&format!("(reported category: {raw})"));
                }
                FindingCategory::RateAnomaly
            }
        };

        let severity = self
            .severity
            .as_deref()
            .and_then(Severity::from_str_loose)
            .unwrap_or(Severity::Medium);

        LlmFinding {
            category,
            severity,
            title: self
                .title
                .unwrap_or_else(|| format!("{category} detected by contextual analysis")),
            description,
            line_number: self.line.map(|l| chunk.absolute_line(l)),
            confidence: self.confidence.map(|c| c.clamp(0.0, 1.0)),
            mitre_tactic: self.mitre_tactic,
            mitre_technique: self.mitre_technique,
            evidence: self.evidence,
        }
    }
}

/// 모델 응답 텍스트에서 Finding JSON 배열을 파싱합니다.
///
/// 코드 펜스로 감싸인 응답과 앞뒤 잡담을 허용합니다:
/// 첫 `[`부터 마지막 `]`까지를 배열로 시도합니다.
pub(crate) fn parse_findings_payload(text: &str) -> Result<Vec<RawLlmFinding>, String> {
    let start = text.find('[').ok_or("no JSON array in response")?;
    let end = text.rfind(']').ok_or("unterminated JSON array in response")?;
    if end < start {
        return Err("malformed JSON array in response".to_owned());
    }
    serde_json::from_str(&text[start..=end]).map_err(|e| format!("JSON parse error: {e}"))
}

/// 분석 프롬프트를 구성합니다.
pub(crate) fn build_prompt(chunk: &LogChunk) -> String {
    let categories = FindingCategory::ALL
        .iter()
        .map(|c| c.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "You are a security analyst reviewing a server log excerpt. \
         Identify security-relevant events and return ONLY a JSON array. \
         Each element: {{\"category\": one of [{categories}], \
         \"severity\": one of [INFO, LOW, MEDIUM, HIGH, CRITICAL], \
         \"title\": short title, \"description\": rationale, \
         \"line\": 1-based line number within this excerpt, \
         \"confidence\": 0.0-1.0, \"mitre_tactic\": tactic or null, \
         \"mitre_technique\": technique id or null, \
         \"evidence\": the exact suspicious text}}. \
         Return [] if nothing is suspicious. No prose, no code fences.\n\n\
         Log excerpt (starts at file line {start_line}):\n{content}",
        start_line = chunk.start_line,
        content = chunk.content,
    )
}

/// reqwest 에러를 분류합니다.
pub(crate) fn classify_transport_error(provider: &str, err: &reqwest::Error) -> ProviderError {
    let kind = if err.is_timeout() {
        ProviderErrorKind::Timeout
    } else if err.is_connect() {
        ProviderErrorKind::Unreachable
    } else {
        ProviderErrorKind::Other
    };
    ProviderError::new(kind, provider, err.to_string())
}

/// HTTP 상태 코드를 분류합니다.
pub(crate) fn classify_status(provider: &str, status: u16, body: &str) -> ProviderError {
    let kind = match status {
        401 => ProviderErrorKind::InvalidCredentials,
        403 => ProviderErrorKind::AccessDenied,
        404 => ProviderErrorKind::NotFound,
        429 => ProviderErrorKind::RateLimited,
        _ => ProviderErrorKind::Other,
    };
    ProviderError::new(kind, provider, format!("HTTP {status}: {body}"))
}

fn build_client(
    provider: &str,
    timeout: std::time::Duration,
) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ProviderError::new(ProviderErrorKind::Other, provider, e.to_string()))
}

// ─── OpenAI ──────────────────────────────────────────────────────────

/// OpenAI Chat Completions 프로바이더
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiProvider {
    pub const NAME: &'static str = "openai";

    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: std::time::Duration,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client(Self::NAME, timeout)?,
            api_key: api_key.into(),
            model: model.into(),
            base_url: "https://api.openai.com/v1".to_owned(),
        })
    }

    /// 테스트/프록시용 base URL 교체
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn call(&self, chunk: &LogChunk) -> Result<Vec<LlmFinding>, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "temperature": 0.1,
            "messages": [
                {"role": "user", "content": build_prompt(chunk)}
            ],
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport_error(Self::NAME, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(Self::NAME, status.as_u16(), &body));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| classify_transport_error(Self::NAME, &e))?;

        let text = payload["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                ProviderError::new(
                    ProviderErrorKind::Other,
                    Self::NAME,
                    "missing choices[0].message.content in response",
                )
            })?;

        let raw = parse_findings_payload(text)
            .map_err(|e| ProviderError::new(ProviderErrorKind::Other, Self::NAME, e))?;
        Ok(raw.into_iter().map(|r| r.normalize(chunk)).collect())
    }
}

impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn analyze_chunk<'a>(
        &'a self,
        chunk: &'a LogChunk,
    ) -> BoxFuture<'a, Result<Vec<LlmFinding>, ProviderError>> {
        Box::pin(self.call(chunk))
    }
}

// ─── Anthropic ───────────────────────────────────────────────────────

/// Anthropic Messages 프로바이더
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl AnthropicProvider {
    pub const NAME: &'static str = "anthropic";
    const API_VERSION: &'static str = "2023-06-01";
    const MAX_TOKENS: u32 = 2048;

    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: std::time::Duration,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client(Self::NAME, timeout)?,
            api_key: api_key.into(),
            model: model.into(),
            base_url: "https://api.anthropic.com".to_owned(),
        })
    }

    /// 테스트/프록시용 base URL 교체
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn call(&self, chunk: &LogChunk) -> Result<Vec<LlmFinding>, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": Self::MAX_TOKENS,
            "messages": [
                {"role": "user", "content": build_prompt(chunk)}
            ],
        });

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", Self::API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport_error(Self::NAME, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(Self::NAME, status.as_u16(), &body));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| classify_transport_error(Self::NAME, &e))?;

        let text = payload["content"][0]["text"].as_str().ok_or_else(|| {
            ProviderError::new(
                ProviderErrorKind::Other,
                Self::NAME,
                "missing content[0].text in response",
            )
        })?;

        let raw = parse_findings_payload(text)
            .map_err(|e| ProviderError::new(ProviderErrorKind::Other, Self::NAME, e))?;
        Ok(raw.into_iter().map(|r| r.normalize(chunk)).collect())
    }
}

impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn analyze_chunk<'a>(
        &'a self,
        chunk: &'a LogChunk,
    ) -> BoxFuture<'a, Result<Vec<LlmFinding>, ProviderError>> {
        Box::pin(self.call(chunk))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk_at(start_line: u64) -> LogChunk {
        LogChunk {
            index: 0,
            start_line,
            content: "line a\nline b\n".to_owned(),
        }
    }

    #[test]
    fn parse_plain_json_array() {
        let raw = parse_findings_payload(
            r#"[{"category": "XSS", "severity": "HIGH", "title": "t", "line": 1}]"#,
        )
        .unwrap();
        assert_eq!(raw.len(), 1);
    }

    #[test]
    fn parse_fenced_json_array() {
        let text = "```json\n[{\"category\": \"SQL_INJECTION\"}]\n```";
        let raw = parse_findings_payload(text).unwrap();
        assert_eq!(raw.len(), 1);
    }

    #[test]
    fn parse_array_with_surrounding_prose() {
        let text = "Here are the findings:\n[{\"title\": \"x\"}]\nLet me know!";
        assert_eq!(parse_findings_payload(text).unwrap().len(), 1);
    }

    #[test]
    fn parse_empty_array() {
        assert!(parse_findings_payload("[]").unwrap().is_empty());
    }

    #[test]
    fn parse_rejects_no_array() {
        assert!(parse_findings_payload("no findings here").is_err());
        assert!(parse_findings_payload("{\"not\": \"an array\"}").is_err());
    }

    #[test]
    fn normalize_maps_known_category_and_severity() {
        let raw: RawLlmFinding = serde_json::from_str(
            r#"{"category": "sql_injection", "severity": "critical", "title": "t",
                "description": "d", "line": 2, "confidence": 0.7}"#,
        )
        .unwrap();
        let finding = raw.normalize(&chunk_at(10));
        assert_eq!(finding.category, FindingCategory::SqlInjection);
        assert_eq!(finding.severity, Severity::Critical);
        assert_eq!(finding.line_number, Some(11)); // 10 + (2-1)
        assert_eq!(finding.confidence, Some(0.7));
    }

    #[test]
    fn normalize_falls_back_on_unknown_category() {
        let raw: RawLlmFinding =
            serde_json::from_str(r#"{"category": "ZERO_DAY", "description": "d"}"#).unwrap();
        let finding = raw.normalize(&chunk_at(1));
        assert_eq!(finding.category, FindingCategory::RateAnomaly);
        // 원문 카테고리는 설명에 보존
        assert!(finding.description.contains("ZERO_DAY"));
    }

    #[test]
    fn normalize_falls_back_on_unknown_severity() {
        let raw: RawLlmFinding =
            serde_json::from_str(r#"{"severity": "EXTREME"}"#).unwrap();
        assert_eq!(raw.normalize(&chunk_at(1)).severity, Severity::Medium);
    }

    #[test]
    fn normalize_clamps_confidence() {
        let raw: RawLlmFinding = serde_json::from_str(r#"{"confidence": 7.5}"#).unwrap();
        assert_eq!(raw.normalize(&chunk_at(1)).confidence, Some(1.0));
    }

    #[test]
    fn normalize_synthesizes_title_when_missing() {
        let raw: RawLlmFinding = serde_json::from_str(r#"{"category": "XSS"}"#).unwrap();
        let finding = raw.normalize(&chunk_at(1));
        assert!(finding.title.contains("XSS"));
    }

    #[test]
    fn normalize_accepts_line_number_alias() {
        let raw: RawLlmFinding = serde_json::from_str(r#"{"line_number": 3}"#).unwrap();
        assert_eq!(raw.normalize(&chunk_at(5)).line_number, Some(7));
    }

    #[test]
    fn classify_status_codes() {
        assert_eq!(
            classify_status("openai", 401, "").kind,
            ProviderErrorKind::InvalidCredentials
        );
        assert_eq!(
            classify_status("openai", 403, "").kind,
            ProviderErrorKind::AccessDenied
        );
        assert_eq!(
            classify_status("openai", 404, "").kind,
            ProviderErrorKind::NotFound
        );
        assert_eq!(
            classify_status("openai", 429, "").kind,
            ProviderErrorKind::RateLimited
        );
        assert_eq!(
            classify_status("openai", 500, "").kind,
            ProviderErrorKind::Other
        );
    }

    #[test]
    fn prompt_contains_contract_fields() {
        let prompt = build_prompt(&chunk_at(42));
        assert!(prompt.contains("SQL_INJECTION"));
        assert!(prompt.contains("PASSWORD_SPRAY"));
        assert!(prompt.contains("file line 42"));
        assert!(prompt.contains("line a"));
    }

    #[test]
    fn providers_report_names() {
        let openai = OpenAiProvider::new("k", "m", std::time::Duration::from_secs(5)).unwrap();
        assert_eq!(openai.name(), "openai");
        let anthropic =
            AnthropicProvider::new("k", "m", std::time::Duration::from_secs(5)).unwrap();
        assert_eq!(anthropic.name(), "anthropic");
    }
}
