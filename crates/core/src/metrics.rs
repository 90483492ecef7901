//! 메트릭 상수 — Prometheus 메트릭 이름의 중앙 정의
//!
//! 각 크레이트는 이 상수를 사용하여 `metrics::counter!()`,
//! `metrics::gauge!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `logward_`
//! - 구성요소명: `rule_engine_`, `llm_`, `pipeline_`, `recovery_`, `admission_`
//! - 접미어: `_total` (counter), `_seconds` (gauge/histogram)

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 심각도 레이블 키 (info, low, medium, high, critical)
pub const LABEL_SEVERITY: &str = "severity";

/// 카테고리 레이블 키
pub const LABEL_CATEGORY: &str = "category";

/// 프로바이더 레이블 키 (openai, anthropic)
pub const LABEL_PROVIDER: &str = "provider";

/// 결과 레이블 키 (success, failure)
pub const LABEL_RESULT: &str = "result";

// ─── Rule Engine 메트릭 ────────────────────────────────────────────

/// Rule Engine: 처리된 로그 라인 수 (counter)
pub const RULE_ENGINE_LINES_TOTAL: &str = "logward_rule_engine_lines_total";

/// Rule Engine: 생성된 Finding 수 (counter, label: category)
pub const RULE_ENGINE_FINDINGS_TOTAL: &str = "logward_rule_engine_findings_total";

// ─── LLM Orchestrator 메트릭 ───────────────────────────────────────

/// LLM: 분석한 청크 수 (counter, label: provider)
pub const LLM_CHUNKS_TOTAL: &str = "logward_llm_chunks_total";

/// LLM: 실패한 청크 수 (counter, label: provider)
pub const LLM_CHUNK_FAILURES_TOTAL: &str = "logward_llm_chunk_failures_total";

/// LLM: 정규화된 후보 Finding 수 (counter)
pub const LLM_FINDINGS_TOTAL: &str = "logward_llm_findings_total";

// ─── Pipeline 메트릭 ───────────────────────────────────────────────

/// Pipeline: 시작된 분석 실행 수 (counter)
pub const PIPELINE_RUNS_TOTAL: &str = "logward_pipeline_runs_total";

/// Pipeline: 실패로 끝난 분석 실행 수 (counter)
pub const PIPELINE_FAILURES_TOTAL: &str = "logward_pipeline_failures_total";

// ─── Recovery Scheduler 메트릭 ─────────────────────────────────────

/// Recovery: 재개를 시도한 업로드 수 (counter)
pub const RECOVERY_RESUMED_TOTAL: &str = "logward_recovery_resumed_total";

/// Recovery: 수행된 스윕 횟수 (counter)
pub const RECOVERY_SWEEPS_TOTAL: &str = "logward_recovery_sweeps_total";

// ─── Admission Guard 메트릭 ────────────────────────────────────────

/// Admission: 속도 제한으로 거부된 요청 수 (counter)
pub const ADMISSION_REJECTED_TOTAL: &str = "logward_admission_rejected_total";

// ─── Daemon 메트릭 ─────────────────────────────────────────────────

/// Daemon: 빌드 정보 (gauge, label: version)
pub const DAEMON_BUILD_INFO: &str = "logward_daemon_build_info";

/// Daemon: 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "logward_daemon_uptime_seconds";
