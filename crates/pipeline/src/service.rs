//! 분석 서비스 — 수락, 상태 전환, 단계 실행, 재개
//!
//! # 상태 기계
//!
//! ```text
//! PENDING ──start──> ANALYZING ──rule phase──> (rule_based_completed=true)
//!                        │                            │
//!                        │                     ──llm phase──> COMPLETED
//!                        └── 단계 실패 ──────────────────────> FAILED
//! ```
//!
//! `request_analysis`는 검증과 상태 전환까지만 수행하고 즉시 반환합니다.
//! 실제 단계는 분리된 백그라운드 태스크에서 실행되며, 완료/실패는
//! 저장소의 영속 상태로만 관측됩니다.
//!
//! `resume`은 내구성 마커 `rule_based_completed`를 검사합니다:
//! - `false`: 중단된 실행의 규칙 Finding을 폐기하고 규칙 단계부터 재시작
//!   (규칙 결과는 결정적이므로 재생성이 안전)
//! - `true`: LLM 단계로 직행 — 이전 부분 LLM 실행의 중복은 핑거프린트
//!   중복 제거가 막습니다

use std::sync::Arc;

use logward_analysis::llm::{LlmOrchestrator, LlmProvider};
use logward_analysis::{PatternLibrary, RuleEngine, dedup_against, llm_to_findings};
use logward_core::config::LogwardConfig;
use logward_core::error::ProviderError;
use logward_core::metrics as m;
use logward_core::types::{AnalysisResult, FindingSource, Upload, UploadStatus};
use logward_store::{AnalysisStore, BeginAnalysis, FindingFilter, FindingsPage, PageRequest};

use crate::admission::AdmissionGuard;
use crate::content::LogContentSource;
use crate::error::ServiceError;
use crate::settings::{EnvSettings, SettingsProvider};

/// 분석 요청 수락 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalyzeOutcome {
    /// 분석이 시작됨 (202)
    Accepted { analysis_result_id: String },
    /// 이미 완료되었고 재분석을 요청하지 않음 (200)
    AlreadyCompleted { analysis_result_id: String },
}

impl AnalyzeOutcome {
    /// 결과 레코드 ID
    pub fn analysis_result_id(&self) -> &str {
        match self {
            Self::Accepted { analysis_result_id }
            | Self::AlreadyCompleted { analysis_result_id } => analysis_result_id,
        }
    }
}

struct ServiceInner {
    store: Arc<dyn AnalysisStore>,
    content: Arc<dyn LogContentSource>,
    settings: Arc<dyn SettingsProvider>,
    admission: AdmissionGuard,
    engine: RuleEngine,
    orchestrator: LlmOrchestrator,
    /// 해석 과정을 건너뛰는 고정 프로바이더 (테스트/커스텀 배포)
    fixed_provider: Option<Arc<dyn LlmProvider>>,
    llm_enabled: bool,
}

/// 분석 서비스 핸들 (clone 가능, 내부 공유)
#[derive(Clone)]
pub struct AnalysisService {
    inner: Arc<ServiceInner>,
}

/// 분석 서비스 빌더
pub struct AnalysisServiceBuilder {
    config: LogwardConfig,
    store: Option<Arc<dyn AnalysisStore>>,
    content: Option<Arc<dyn LogContentSource>>,
    settings: Arc<dyn SettingsProvider>,
    library: Option<PatternLibrary>,
    fixed_provider: Option<Arc<dyn LlmProvider>>,
}

impl AnalysisServiceBuilder {
    pub fn new(config: LogwardConfig) -> Self {
        Self {
            config,
            store: None,
            content: None,
            settings: Arc::new(EnvSettings),
            library: None,
            fixed_provider: None,
        }
    }

    /// 저장소를 지정합니다 (필수).
    pub fn store(mut self, store: Arc<dyn AnalysisStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// 로그 콘텐츠 소스를 지정합니다 (필수).
    pub fn content_source(mut self, content: Arc<dyn LogContentSource>) -> Self {
        self.content = Some(content);
        self
    }

    /// 설정 협력자를 지정합니다. 기본값은 환경변수 폴백 전용입니다.
    pub fn settings(mut self, settings: Arc<dyn SettingsProvider>) -> Self {
        self.settings = settings;
        self
    }

    /// 패턴 라이브러리를 지정합니다. 기본값은 내장 패턴입니다.
    pub fn pattern_library(mut self, library: PatternLibrary) -> Self {
        self.library = Some(library);
        self
    }

    /// 고정 LLM 프로바이더를 지정합니다 (오버라이드/환경변수 해석 생략).
    pub fn llm_provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.fixed_provider = Some(provider);
        self
    }

    pub fn build(self) -> Result<AnalysisService, ServiceError> {
        let store = self.store.ok_or_else(|| ServiceError::Validation {
            reason: "analysis service requires a store".to_owned(),
        })?;
        let content = self.content.ok_or_else(|| ServiceError::Validation {
            reason: "analysis service requires a content source".to_owned(),
        })?;

        let library = match self.library {
            Some(library) => library,
            None => PatternLibrary::builtin().map_err(|e| ServiceError::Validation {
                reason: format!("failed to compile builtin patterns: {e}"),
            })?,
        };

        Ok(AnalysisService {
            inner: Arc::new(ServiceInner {
                store,
                content,
                settings: self.settings,
                admission: AdmissionGuard::new(&self.config.admission),
                engine: RuleEngine::new(library, self.config.analysis.clone()),
                orchestrator: LlmOrchestrator::new(self.config.llm.clone()),
                fixed_provider: self.fixed_provider,
                llm_enabled: self.config.llm.enabled,
            }),
        })
    }
}

impl AnalysisService {
    pub fn builder(config: LogwardConfig) -> AnalysisServiceBuilder {
        AnalysisServiceBuilder::new(config)
    }

    /// 저장소 핸들 (복구 스케줄러의 스윕 조회에 사용)
    pub fn store(&self) -> &Arc<dyn AnalysisStore> {
        &self.inner.store
    }

    /// 분석을 요청합니다.
    ///
    /// 수락 검사 → 소유권 검사 → 원자적 상태 전환 순으로 진행하고,
    /// 전환에 성공하면 백그라운드 실행을 예약한 뒤 즉시 반환합니다.
    pub async fn request_analysis(
        &self,
        user_id: &str,
        upload_id: &str,
        reanalyze: bool,
    ) -> Result<AnalyzeOutcome, ServiceError> {
        let decision = self.inner.admission.check(user_id);
        if !decision.allowed {
            return Err(ServiceError::RateLimited {
                retry_after_ms: decision.retry_after_ms,
            });
        }

        let upload = self
            .inner
            .store
            .upload(upload_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound {
                upload_id: upload_id.to_owned(),
            })?;

        if upload.user_id != user_id {
            return Err(ServiceError::Forbidden {
                upload_id: upload_id.to_owned(),
            });
        }

        match self.inner.store.try_begin_analysis(upload_id, reanalyze).await? {
            BeginAnalysis::Started(result) => {
                let analysis_result_id = result.id.clone();
                tracing::info!(
                    upload_id,
                    analysis_result_id = %result.id,
                    reanalyze,
                    "analysis accepted, scheduling background run"
                );
                self.spawn_run(upload, result);
                Ok(AnalyzeOutcome::Accepted { analysis_result_id })
            }
            BeginAnalysis::AlreadyCompleted(result) => Ok(AnalyzeOutcome::AlreadyCompleted {
                analysis_result_id: result.id,
            }),
            BeginAnalysis::Conflict => Err(ServiceError::Conflict {
                upload_id: upload_id.to_owned(),
            }),
            BeginAnalysis::NotFound => Err(ServiceError::NotFound {
                upload_id: upload_id.to_owned(),
            }),
        }
    }

    /// 중단된 분석을 재개합니다. 복구 스케줄러가 호출합니다.
    ///
    /// `request_analysis`와 달리 인라인으로 실행합니다 — 호출자
    /// (스케줄러)가 이미 fire-and-forget 태스크이기 때문입니다.
    pub async fn resume(&self, upload_id: &str) -> Result<(), ServiceError> {
        let upload = self
            .inner
            .store
            .upload(upload_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound {
                upload_id: upload_id.to_owned(),
            })?;

        if upload.status != UploadStatus::Analyzing {
            tracing::debug!(
                upload_id,
                status = %upload.status,
                "resume skipped, upload is no longer analyzing"
            );
            return Ok(());
        }

        let result = self.inner.store.ensure_result(upload_id).await?;
        tracing::info!(
            upload_id,
            analysis_result_id = %result.id,
            rule_based_completed = result.rule_based_completed,
            "resuming interrupted analysis"
        );
        self.execute(upload, result).await;
        Ok(())
    }

    /// 호출자 소유 업로드로 스코프된 Finding 페이지를 반환합니다.
    pub async fn list_findings(
        &self,
        user_id: &str,
        filter: &FindingFilter,
        page: PageRequest,
    ) -> Result<FindingsPage, ServiceError> {
        Ok(self.inner.store.findings_page(user_id, filter, page).await?)
    }

    /// 백그라운드 실행을 예약합니다. 완료는 저장소 상태로만 관측됩니다.
    fn spawn_run(&self, upload: Upload, result: AnalysisResult) {
        let service = self.clone();
        tokio::spawn(async move {
            service.execute(upload, result).await;
        });
    }

    /// 단계를 실행하고, 실패 시 FAILED 전환을 기록합니다.
    async fn execute(&self, upload: Upload, result: AnalysisResult) {
        metrics::counter!(m::PIPELINE_RUNS_TOTAL).increment(1);

        if let Err(e) = self.run_phases(&upload, &result).await {
            metrics::counter!(m::PIPELINE_FAILURES_TOTAL).increment(1);
            tracing::error!(
                upload_id = %upload.id,
                analysis_result_id = %result.id,
                error = %e,
                "analysis pipeline failed"
            );
            if let Err(mark_err) = self
                .inner
                .store
                .fail_analysis(&upload.id, &result.id, &e.to_string())
                .await
            {
                tracing::error!(
                    upload_id = %upload.id,
                    error = %mark_err,
                    "failed to record analysis failure"
                );
            }
        }
    }

    /// 규칙 단계 → LLM 단계 순서의 본체.
    ///
    /// 외부 I/O(콘텐츠 읽기, 청크별 LLM 호출, 저장소 쓰기)만이
    /// suspension point입니다.
    async fn run_phases(
        &self,
        upload: &Upload,
        result: &AnalysisResult,
    ) -> Result<(), ServiceError> {
        let content = self.inner.content.read(upload).await?;

        if result.rule_based_completed {
            tracing::info!(
                upload_id = %upload.id,
                "rule phase already durable, re-entering at llm phase"
            );
        } else {
            // 중단된 이전 실행의 부분 규칙 결과 폐기 후 재생성
            self.inner
                .store
                .delete_findings(&result.id, FindingSource::RuleBased)
                .await?;

            let findings = self.inner.engine.analyze(&result.id, &content);
            let inserted = self.inner.store.insert_findings(findings).await?;
            self.inner.store.mark_rule_phase_done(&result.id).await?;
            tracing::info!(
                upload_id = %upload.id,
                findings = inserted,
                "rule phase complete"
            );
        }

        if self.inner.llm_enabled {
            self.run_llm_phase(upload, result, &content).await?;
        }

        self.inner
            .store
            .finish_analysis(&upload.id, &result.id)
            .await?;
        tracing::info!(upload_id = %upload.id, "analysis completed");
        Ok(())
    }

    async fn run_llm_phase(
        &self,
        upload: &Upload,
        result: &AnalysisResult,
        content: &str,
    ) -> Result<(), ServiceError> {
        let provider = match self.resolve_provider(&upload.user_id).await {
            Ok(provider) => provider,
            Err(e) => {
                // 프로바이더 자체를 못 쓰는 경우도 청크 실패와 같은 강등:
                // 규칙 기반 결과만으로 완료합니다.
                tracing::warn!(
                    upload_id = %upload.id,
                    kind = %e.kind,
                    error = %e,
                    "llm provider unavailable, completing with rule-based findings only"
                );
                return Ok(());
            }
        };

        let report = self.inner.orchestrator.run(provider.as_ref(), content).await;
        if report.chunks_failed > 0 {
            tracing::warn!(
                upload_id = %upload.id,
                failed = report.chunks_failed,
                total = report.chunks_total,
                "llm phase degraded to partial coverage"
            );
        }

        let candidates = llm_to_findings(&result.id, report.findings);

        // 규칙 단계가 이미 저장한 핑거프린트(그리고 이전 부분 LLM 실행의
        // 것)와의 충돌은 규칙 기반이 이깁니다.
        let existing = self.inner.store.fingerprints_for_result(&result.id).await?;
        let fresh = dedup_against(&existing, candidates);
        let inserted = self.inner.store.insert_findings(fresh).await?;

        tracing::info!(
            upload_id = %upload.id,
            findings = inserted,
            "llm phase complete"
        );
        Ok(())
    }

    async fn resolve_provider(
        &self,
        user_id: &str,
    ) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        if let Some(fixed) = &self.inner.fixed_provider {
            return Ok(Arc::clone(fixed));
        }

        let overrides = match self.inner.settings.llm_override(user_id).await {
            Ok(overrides) => overrides,
            Err(e) => {
                tracing::warn!(
                    user_id,
                    error = %e,
                    "failed to load user llm override, using environment default"
                );
                None
            }
        };

        let provider = self.inner.orchestrator.resolve_provider(overrides.as_ref())?;
        Ok(Arc::from(provider))
    }
}
