//! LLM 오케스트레이터 — 청킹, 프로바이더 선택, 강등 처리
//!
//! 로그 내용을 프로바이더 컨텍스트 제한에 맞게 청킹하고, 청크별로
//! 독립 분석을 수행한 뒤 결과를 이어붙입니다. 청크 수준 실패는
//! 분류된 경고로 기록되고 부분 커버리지로 강등됩니다 — 파이프라인을
//! 중단시키지 않습니다.
//!
//! # 프로바이더 선택 우선순위
//! 1. 명시적 오버라이드 (설정 협력자가 해석해 전달한 [`LlmOverride`])
//! 2. 설정 기본 프로바이더 + 환경변수 API 키
//!    (`LOGWARD_LLM_OPENAI_API_KEY`, `LOGWARD_LLM_ANTHROPIC_API_KEY`)
//!
//! 오케스트레이터는 저장된 원시 자격증명에 직접 접근하지 않습니다.

pub mod chunk;
pub mod provider;

pub use chunk::{LogChunk, chunk_lines};
pub use provider::{AnthropicProvider, LlmFinding, LlmProvider, OpenAiProvider};

use std::time::Duration;

use logward_core::config::LlmConfig;
use logward_core::error::{ProviderError, ProviderErrorKind};
use logward_core::metrics as m;
use logward_core::types::{LlmOverride, ProviderKind};

/// OpenAI 기본 자격증명 환경변수
pub const ENV_OPENAI_API_KEY: &str = "LOGWARD_LLM_OPENAI_API_KEY";
/// Anthropic 기본 자격증명 환경변수
pub const ENV_ANTHROPIC_API_KEY: &str = "LOGWARD_LLM_ANTHROPIC_API_KEY";

/// LLM 단계 실행 결과
///
/// 실패한 청크 수를 함께 보고하여 호출자가 부분 커버리지 경고를
/// 표면화할 수 있게 합니다.
#[derive(Debug, Default)]
pub struct LlmAnalysisReport {
    /// 정규화된 후보 Finding (청크 순서는 보장되지 않음)
    pub findings: Vec<LlmFinding>,
    /// 시도한 청크 수
    pub chunks_total: usize,
    /// 실패한 청크 수
    pub chunks_failed: usize,
}

impl LlmAnalysisReport {
    /// 모든 청크가 실패했는지 여부
    pub fn all_failed(&self) -> bool {
        self.chunks_total > 0 && self.chunks_failed == self.chunks_total
    }
}

/// LLM 오케스트레이터
pub struct LlmOrchestrator {
    config: LlmConfig,
}

impl LlmOrchestrator {
    pub fn new(config: LlmConfig) -> Self {
        Self { config }
    }

    /// 오버라이드와 설정에 따라 프로바이더를 해석합니다.
    ///
    /// 자격증명이 없으면 `InvalidCredentials`로 분류된 에러를 반환합니다.
    pub fn resolve_provider(
        &self,
        overrides: Option<&LlmOverride>,
    ) -> Result<Box<dyn LlmProvider>, ProviderError> {
        let timeout = Duration::from_secs(self.config.request_timeout_secs);

        let (kind, api_key) = match overrides {
            Some(o) => (o.provider, o.api_key.clone()),
            None => {
                let kind = ProviderKind::from_str_loose(&self.config.provider).ok_or_else(|| {
                    ProviderError::new(
                        ProviderErrorKind::Other,
                        self.config.provider.clone(),
                        "unknown provider in configuration",
                    )
                })?;
                let env_key = match kind {
                    ProviderKind::OpenAi => ENV_OPENAI_API_KEY,
                    ProviderKind::Anthropic => ENV_ANTHROPIC_API_KEY,
                };
                let api_key = std::env::var(env_key).map_err(|_| {
                    ProviderError::new(
                        ProviderErrorKind::InvalidCredentials,
                        kind.as_str(),
                        format!("no override supplied and {env_key} is not set"),
                    )
                })?;
                (kind, api_key)
            }
        };

        match kind {
            ProviderKind::OpenAi => Ok(Box::new(OpenAiProvider::new(
                api_key,
                self.config.model.clone(),
                timeout,
            )?)),
            ProviderKind::Anthropic => Ok(Box::new(AnthropicProvider::new(
                api_key,
                self.config.model.clone(),
                timeout,
            )?)),
        }
    }

    /// 주어진 프로바이더로 전체 내용을 분석합니다.
    ///
    /// 모든 청크를 시도한 뒤에야 반환합니다. 청크 실패는 경고 로그와
    /// 카운터로만 남고 에러로 전파되지 않습니다.
    pub async fn run(&self, provider: &dyn LlmProvider, content: &str) -> LlmAnalysisReport {
        let chunks = chunk_lines(content, self.config.chunk_max_bytes);
        let mut report = LlmAnalysisReport {
            chunks_total: chunks.len(),
            ..Default::default()
        };

        for chunk in &chunks {
            metrics::counter!(m::LLM_CHUNKS_TOTAL, "provider" => provider.name().to_owned())
                .increment(1);

            match provider.analyze_chunk(chunk).await {
                Ok(findings) => {
                    tracing::debug!(
                        chunk = chunk.index,
                        findings = findings.len(),
                        "llm chunk analyzed"
                    );
                    report.findings.extend(findings);
                }
                Err(e) => {
                    report.chunks_failed += 1;
                    metrics::counter!(
                        m::LLM_CHUNK_FAILURES_TOTAL,
                        "provider" => provider.name().to_owned()
                    )
                    .increment(1);
                    tracing::warn!(
                        chunk = chunk.index,
                        provider = provider.name(),
                        kind = %e.kind,
                        error = %e,
                        "llm chunk analysis failed, degrading to partial coverage"
                    );
                }
            }
        }

        metrics::counter!(m::LLM_FINDINGS_TOTAL).increment(report.findings.len() as u64);

        if report.chunks_failed > 0 {
            tracing::warn!(
                failed = report.chunks_failed,
                total = report.chunks_total,
                "llm phase completed with partial coverage"
            );
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logward_core::BoxFuture;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 고정 응답/실패를 반환하는 테스트 프로바이더
    struct ScriptedProvider {
        fail_every: Option<usize>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn succeeding() -> Self {
            Self {
                fail_every: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing_every(n: usize) -> Self {
            Self {
                fail_every: Some(n),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        fn analyze_chunk<'a>(
            &'a self,
            chunk: &'a LogChunk,
        ) -> BoxFuture<'a, Result<Vec<LlmFinding>, ProviderError>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                if self.fail_every.is_some_and(|n| call % n == 0) {
                    return Err(ProviderError::new(
                        ProviderErrorKind::Timeout,
                        "scripted",
                        "scripted failure",
                    ));
                }
                Ok(vec![LlmFinding {
                    category: logward_core::types::FindingCategory::Xss,
                    severity: logward_core::types::Severity::Medium,
                    title: format!("chunk {} finding", chunk.index),
                    description: String::new(),
                    line_number: Some(chunk.start_line),
                    confidence: Some(0.5),
                    mitre_tactic: None,
                    mitre_technique: None,
                    evidence: None,
                }])
            })
        }
    }

    fn config(chunk_max_bytes: usize) -> LlmConfig {
        LlmConfig {
            chunk_max_bytes,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn run_analyzes_all_chunks() {
        let orchestrator = LlmOrchestrator::new(config(16));
        let provider = ScriptedProvider::succeeding();
        let content = "0123456789abcd\n0123456789abcd\n0123456789abcd\n";

        let report = orchestrator.run(&provider, content).await;
        assert_eq!(report.chunks_total, 3);
        assert_eq!(report.chunks_failed, 0);
        assert_eq!(report.findings.len(), 3);
    }

    #[tokio::test]
    async fn chunk_failures_degrade_gracefully() {
        let orchestrator = LlmOrchestrator::new(config(16));
        // 매 2번째 호출 실패 (0, 2번째 청크)
        let provider = ScriptedProvider::failing_every(2);
        let content = "0123456789abcd\n0123456789abcd\n0123456789abcd\n";

        let report = orchestrator.run(&provider, content).await;
        assert_eq!(report.chunks_total, 3);
        assert_eq!(report.chunks_failed, 2);
        assert_eq!(report.findings.len(), 1);
        assert!(!report.all_failed());
    }

    #[tokio::test]
    async fn all_chunks_failing_is_reported() {
        let orchestrator = LlmOrchestrator::new(config(16));
        let provider = ScriptedProvider::failing_every(1);
        let report = orchestrator.run(&provider, "some content\n").await;
        assert!(report.all_failed());
        assert!(report.findings.is_empty());
    }

    #[tokio::test]
    async fn empty_content_yields_empty_report() {
        let orchestrator = LlmOrchestrator::new(config(16));
        let provider = ScriptedProvider::succeeding();
        let report = orchestrator.run(&provider, "").await;
        assert_eq!(report.chunks_total, 0);
        assert!(!report.all_failed());
    }

    #[test]
    fn resolve_provider_prefers_override() {
        let orchestrator = LlmOrchestrator::new(LlmConfig::default());
        let overrides = LlmOverride {
            provider: ProviderKind::Anthropic,
            api_key: "key-from-override".to_owned(),
        };
        let provider = orchestrator.resolve_provider(Some(&overrides)).unwrap();
        assert_eq!(provider.name(), "anthropic");
    }

    #[test]
    #[serial_test::serial]
    fn resolve_provider_without_credentials_is_classified() {
        // SAFETY: 테스트는 serial로 실행되므로 환경변수 조작이 안전합니다.
        unsafe { std::env::remove_var(ENV_OPENAI_API_KEY) };
        let orchestrator = LlmOrchestrator::new(LlmConfig::default());
        let err = match orchestrator.resolve_provider(None) {
            Ok(_) => panic!("expected resolve_provider to fail without credentials"),
            Err(err) => err,
        };
        assert_eq!(err.kind, ProviderErrorKind::InvalidCredentials);
    }

    #[test]
    #[serial_test::serial]
    fn resolve_provider_uses_env_fallback() {
        // SAFETY: 테스트는 serial로 실행되므로 환경변수 조작이 안전합니다.
        unsafe { std::env::set_var(ENV_OPENAI_API_KEY, "sk-env") };
        let orchestrator = LlmOrchestrator::new(LlmConfig::default());
        let provider = orchestrator.resolve_provider(None).unwrap();
        assert_eq!(provider.name(), "openai");
        unsafe { std::env::remove_var(ENV_OPENAI_API_KEY) };
    }
}
