//! 설정 관리 — logward.toml 파싱 및 런타임 설정
//!
//! [`LogwardConfig`]는 모든 구성요소의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`LOGWARD_LLM_PROVIDER=anthropic` 형식)
//! 3. 설정 파일 (`logward.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), logward_core::error::ConfigError> {
//! use logward_core::config::LogwardConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = LogwardConfig::load("logward.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = LogwardConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConfigError;
use crate::types::ProviderKind;

/// Logward 통합 설정
///
/// `logward.toml` 파일의 최상위 구조를 나타냅니다.
/// 각 구성요소는 자기 섹션만 읽어 사용합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogwardConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 스토리지 설정
    #[serde(default)]
    pub storage: StorageConfig,
    /// 규칙 엔진 통계 임계값
    #[serde(default)]
    pub analysis: AnalysisConfig,
    /// LLM 오케스트레이터 설정
    #[serde(default)]
    pub llm: LlmConfig,
    /// 복구 스케줄러 설정
    #[serde(default)]
    pub recovery: RecoveryConfig,
    /// 요청 속도 제한 설정
    #[serde(default)]
    pub admission: AdmissionConfig,
    /// 메트릭 노출 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl LogwardConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                ConfigError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml_str).map_err(|e| ConfigError::ParseFailed {
            reason: e.to_string(),
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `LOGWARD_{SECTION}_{FIELD}`
    /// 예: `LOGWARD_RECOVERY_SWEEP_INTERVAL_SECS=60`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "LOGWARD_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "LOGWARD_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.data_dir, "LOGWARD_GENERAL_DATA_DIR");

        // Storage
        override_string(&mut self.storage.database_url, "LOGWARD_STORAGE_DATABASE_URL");
        override_string(&mut self.storage.uploads_dir, "LOGWARD_STORAGE_UPLOADS_DIR");
        override_u64(
            &mut self.storage.max_content_bytes,
            "LOGWARD_STORAGE_MAX_CONTENT_BYTES",
        );

        // Analysis
        override_u64(
            &mut self.analysis.brute_force_attempts,
            "LOGWARD_ANALYSIS_BRUTE_FORCE_ATTEMPTS",
        );
        override_u64(
            &mut self.analysis.spray_usernames,
            "LOGWARD_ANALYSIS_SPRAY_USERNAMES",
        );
        override_u64(
            &mut self.analysis.enumeration_404s,
            "LOGWARD_ANALYSIS_ENUMERATION_404S",
        );
        override_u64(&mut self.analysis.volume_medium, "LOGWARD_ANALYSIS_VOLUME_MEDIUM");
        override_u64(&mut self.analysis.volume_high, "LOGWARD_ANALYSIS_VOLUME_HIGH");
        override_u64(
            &mut self.analysis.volume_critical,
            "LOGWARD_ANALYSIS_VOLUME_CRITICAL",
        );
        override_f64(&mut self.analysis.error_ratio, "LOGWARD_ANALYSIS_ERROR_RATIO");
        override_u64(
            &mut self.analysis.error_ratio_min_requests,
            "LOGWARD_ANALYSIS_ERROR_RATIO_MIN_REQUESTS",
        );
        override_u64(
            &mut self.analysis.burst_requests,
            "LOGWARD_ANALYSIS_BURST_REQUESTS",
        );
        override_u64(
            &mut self.analysis.burst_window_secs,
            "LOGWARD_ANALYSIS_BURST_WINDOW_SECS",
        );
        override_opt_string(&mut self.analysis.pattern_dir, "LOGWARD_ANALYSIS_PATTERN_DIR");

        // LLM
        override_bool(&mut self.llm.enabled, "LOGWARD_LLM_ENABLED");
        override_string(&mut self.llm.provider, "LOGWARD_LLM_PROVIDER");
        override_string(&mut self.llm.model, "LOGWARD_LLM_MODEL");
        override_usize(&mut self.llm.chunk_max_bytes, "LOGWARD_LLM_CHUNK_MAX_BYTES");
        override_u64(
            &mut self.llm.request_timeout_secs,
            "LOGWARD_LLM_REQUEST_TIMEOUT_SECS",
        );

        // Recovery
        override_u64(
            &mut self.recovery.sweep_interval_secs,
            "LOGWARD_RECOVERY_SWEEP_INTERVAL_SECS",
        );
        override_u64(
            &mut self.recovery.stall_threshold_secs,
            "LOGWARD_RECOVERY_STALL_THRESHOLD_SECS",
        );

        // Admission
        override_u32(
            &mut self.admission.max_requests,
            "LOGWARD_ADMISSION_MAX_REQUESTS",
        );
        override_u64(&mut self.admission.window_secs, "LOGWARD_ADMISSION_WINDOW_SECS");

        // Metrics
        override_bool(&mut self.metrics.enabled, "LOGWARD_METRICS_ENABLED");
        override_u16(&mut self.metrics.port, "LOGWARD_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            });
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            });
        }

        if ProviderKind::from_str_loose(&self.llm.provider).is_none() {
            return Err(ConfigError::InvalidValue {
                field: "llm.provider".to_owned(),
                reason: "must be one of: openai, anthropic".to_owned(),
            });
        }

        if self.llm.chunk_max_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                field: "llm.chunk_max_bytes".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        for (field, value) in [
            ("analysis.brute_force_attempts", self.analysis.brute_force_attempts),
            ("analysis.spray_usernames", self.analysis.spray_usernames),
            ("analysis.enumeration_404s", self.analysis.enumeration_404s),
            ("analysis.volume_medium", self.analysis.volume_medium),
            ("analysis.burst_requests", self.analysis.burst_requests),
            ("analysis.burst_window_secs", self.analysis.burst_window_secs),
            ("recovery.sweep_interval_secs", self.recovery.sweep_interval_secs),
            ("recovery.stall_threshold_secs", self.recovery.stall_threshold_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_owned(),
                    reason: "must be greater than 0".to_owned(),
                });
            }
        }

        // 상위 티어가 하위 티어보다 커야 단일 최고 티어 선택이 성립합니다.
        if self.analysis.volume_high <= self.analysis.volume_medium
            || self.analysis.volume_critical <= self.analysis.volume_high
        {
            return Err(ConfigError::InvalidValue {
                field: "analysis.volume_*".to_owned(),
                reason: "tiers must satisfy medium < high < critical".to_owned(),
            });
        }

        if !(self.analysis.error_ratio > 0.0 && self.analysis.error_ratio <= 1.0) {
            return Err(ConfigError::InvalidValue {
                field: "analysis.error_ratio".to_owned(),
                reason: "must be within (0, 1]".to_owned(),
            });
        }

        if self.admission.max_requests == 0 {
            return Err(ConfigError::InvalidValue {
                field: "admission.max_requests".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        Ok(())
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// 데이터 디렉토리
    pub data_dir: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            data_dir: "/var/lib/logward".to_owned(),
        }
    }
}

/// 스토리지 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite 연결 문자열
    pub database_url: String,
    /// 업로드 콘텐츠 디렉토리 (오브젝트 스토리지 협력자의 로컬 구현)
    pub uploads_dir: String,
    /// 단일 업로드 콘텐츠 최대 크기 (바이트)
    pub max_content_bytes: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:logward.db".to_owned(),
            uploads_dir: "/var/lib/logward/uploads".to_owned(),
            max_content_bytes: 64 * 1024 * 1024, // 64MB
        }
    }
}

/// 규칙 엔진 통계 임계값 설정
///
/// 기본값은 탐지 규칙의 계약값입니다. 운영 환경 튜닝을 위해
/// 노출하지만, 변경 시 테스트 가능한 속성들이 함께 이동합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// 브루트포스: 단일 IP의 최소 인증 실패 횟수
    pub brute_force_attempts: u64,
    /// 패스워드 스프레이: 단일 IP의 최소 고유 사용자명 수
    pub spray_usernames: u64,
    /// 디렉토리 열거: 단일 IP의 최소 404 응답 수
    pub enumeration_404s: u64,
    /// 요청량 MEDIUM 티어 임계값
    pub volume_medium: u64,
    /// 요청량 HIGH 티어 임계값
    pub volume_high: u64,
    /// 요청량 CRITICAL 티어 임계값
    pub volume_critical: u64,
    /// 에러 응답 비율 임계값 (0, 1]
    pub error_ratio: f64,
    /// 에러 비율 규칙 적용 최소 요청 수
    pub error_ratio_min_requests: u64,
    /// 버스트: 윈도우 내 최소 요청 수
    pub burst_requests: u64,
    /// 버스트 윈도우 크기 (초)
    pub burst_window_secs: u64,
    /// 추가 패턴 YAML 디렉토리 (없으면 내장 패턴만 사용)
    pub pattern_dir: Option<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            brute_force_attempts: 10,
            spray_usernames: 5,
            enumeration_404s: 20,
            volume_medium: 100,
            volume_high: 500,
            volume_critical: 1000,
            error_ratio: 0.8,
            error_ratio_min_requests: 10,
            burst_requests: 20,
            burst_window_secs: 5,
            pattern_dir: None,
        }
    }
}

/// LLM 오케스트레이터 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// LLM 단계 활성화 여부
    pub enabled: bool,
    /// 기본 프로바이더 (openai, anthropic)
    ///
    /// 사용자별 오버라이드가 없을 때 사용됩니다. API 키는
    /// `LOGWARD_LLM_OPENAI_API_KEY` / `LOGWARD_LLM_ANTHROPIC_API_KEY`
    /// 환경변수에서 읽습니다.
    pub provider: String,
    /// 모델 이름
    pub model: String,
    /// 청크 최대 크기 (바이트, 라인 경계 유지)
    pub chunk_max_bytes: usize,
    /// 청크당 요청 타임아웃 (초)
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: "openai".to_owned(),
            model: "gpt-4o-mini".to_owned(),
            chunk_max_bytes: 16 * 1024, // 16KB
            request_timeout_secs: 60,
        }
    }
}

/// 복구 스케줄러 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// 주기 스윕 간격 (초)
    pub sweep_interval_secs: u64,
    /// stall 판정 임계값 (초) — 이보다 오래 갱신이 없는 ANALYZING 업로드를 재개
    pub stall_threshold_secs: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 300,  // 5분
            stall_threshold_secs: 900, // 15분
        }
    }
}

/// 요청 속도 제한 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// 윈도우당 사용자별 최대 (재)분석 요청 수
    pub max_requests: u32,
    /// 윈도우 크기 (초)
    pub window_secs: u64,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_requests: 5,
            window_secs: 3600,
        }
    }
}

/// 메트릭 노출 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prometheus 엔드포인트 활성화 여부
    pub enabled: bool,
    /// 리스너 포트
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9188,
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_opt_string(target: &mut Option<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = Some(val);
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

fn override_u32(target: &mut u32, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u32>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u32 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_f64(target: &mut f64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<f64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse f64 from env var, ignoring"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_contract_thresholds() {
        let config = LogwardConfig::default();
        assert_eq!(config.analysis.brute_force_attempts, 10);
        assert_eq!(config.analysis.spray_usernames, 5);
        assert_eq!(config.analysis.enumeration_404s, 20);
        assert_eq!(config.analysis.volume_medium, 100);
        assert_eq!(config.analysis.volume_high, 500);
        assert_eq!(config.analysis.volume_critical, 1000);
        assert_eq!(config.analysis.burst_requests, 20);
        assert_eq!(config.analysis.burst_window_secs, 5);
        assert_eq!(config.recovery.sweep_interval_secs, 300);
        assert_eq!(config.recovery.stall_threshold_secs, 900);
    }

    #[test]
    fn default_config_passes_validation() {
        LogwardConfig::default().validate().unwrap();
    }

    #[test]
    fn parse_empty_toml_uses_defaults() {
        let config = LogwardConfig::parse("").unwrap();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.llm.provider, "openai");
    }

    #[test]
    fn parse_partial_toml_merges_with_defaults() {
        let toml = r#"
[general]
log_level = "debug"

[llm]
provider = "anthropic"
model = "claude-sonnet-4-5"
"#;
        let config = LogwardConfig::parse(toml).unwrap();
        assert_eq!(config.general.log_level, "debug");
        // log_format은 기본값 유지
        assert_eq!(config.general.log_format, "json");
        assert_eq!(config.llm.provider, "anthropic");
        assert_eq!(config.llm.model, "claude-sonnet-4-5");
        assert_eq!(config.llm.chunk_max_bytes, 16 * 1024);
    }

    #[test]
    fn parse_full_toml() {
        let toml = r#"
[general]
log_level = "warn"
log_format = "pretty"
data_dir = "/opt/logward"

[storage]
database_url = "sqlite:/opt/logward/logward.db"
uploads_dir = "/opt/logward/uploads"
max_content_bytes = 1048576

[analysis]
brute_force_attempts = 20
spray_usernames = 8
enumeration_404s = 50
volume_medium = 200
volume_high = 800
volume_critical = 2000
error_ratio = 0.9
error_ratio_min_requests = 25
burst_requests = 40
burst_window_secs = 10
pattern_dir = "/etc/logward/patterns"

[llm]
enabled = false
provider = "anthropic"
model = "claude-sonnet-4-5"
chunk_max_bytes = 32768
request_timeout_secs = 120

[recovery]
sweep_interval_secs = 60
stall_threshold_secs = 300

[admission]
max_requests = 3
window_secs = 600

[metrics]
enabled = true
port = 9999
"#;
        let config = LogwardConfig::parse(toml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.analysis.brute_force_attempts, 20);
        assert_eq!(config.analysis.pattern_dir.as_deref(), Some("/etc/logward/patterns"));
        assert!(!config.llm.enabled);
        assert_eq!(config.recovery.sweep_interval_secs, 60);
        assert_eq!(config.admission.max_requests, 3);
        assert_eq!(config.metrics.port, 9999);
    }

    #[test]
    fn parse_invalid_toml_returns_error() {
        let result = LogwardConfig::parse("invalid = [[[toml");
        assert!(matches!(result, Err(ConfigError::ParseFailed { .. })));
    }

    #[test]
    fn validate_rejects_invalid_log_level() {
        let mut config = LogwardConfig::default();
        config.general.log_level = "verbose".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_level"));
    }

    #[test]
    fn validate_rejects_invalid_provider() {
        let mut config = LogwardConfig::default();
        config.llm.provider = "gemini".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("provider"));
    }

    #[test]
    fn validate_rejects_zero_thresholds() {
        let mut config = LogwardConfig::default();
        config.analysis.brute_force_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_unordered_volume_tiers() {
        let mut config = LogwardConfig::default();
        config.analysis.volume_high = config.analysis.volume_medium;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("volume"));
    }

    #[test]
    fn validate_rejects_error_ratio_out_of_range() {
        let mut config = LogwardConfig::default();
        config.analysis.error_ratio = 1.5;
        assert!(config.validate().is_err());

        config.analysis.error_ratio = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_admission_limit() {
        let mut config = LogwardConfig::default();
        config.admission.max_requests = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial_test::serial]
    fn env_override_string() {
        let mut config = LogwardConfig::default();
        // SAFETY: 테스트는 serial로 실행되므로 환경변수 조작이 안전합니다.
        unsafe { std::env::set_var("LOGWARD_GENERAL_LOG_LEVEL", "debug") };
        config.apply_env_overrides();
        assert_eq!(config.general.log_level, "debug");
        unsafe { std::env::remove_var("LOGWARD_GENERAL_LOG_LEVEL") };
    }

    #[test]
    #[serial_test::serial]
    fn env_override_numeric() {
        let mut config = LogwardConfig::default();
        // SAFETY: 테스트는 serial로 실행되므로 환경변수 조작이 안전합니다.
        unsafe { std::env::set_var("LOGWARD_RECOVERY_SWEEP_INTERVAL_SECS", "42") };
        config.apply_env_overrides();
        assert_eq!(config.recovery.sweep_interval_secs, 42);
        unsafe { std::env::remove_var("LOGWARD_RECOVERY_SWEEP_INTERVAL_SECS") };
    }

    #[test]
    #[serial_test::serial]
    fn env_override_invalid_numeric_keeps_original() {
        let mut config = LogwardConfig::default();
        // SAFETY: 테스트는 serial로 실행되므로 환경변수 조작이 안전합니다.
        unsafe { std::env::set_var("LOGWARD_ADMISSION_MAX_REQUESTS", "many") };
        config.apply_env_overrides();
        assert_eq!(config.admission.max_requests, 5); // 원래 값 유지
        unsafe { std::env::remove_var("LOGWARD_ADMISSION_MAX_REQUESTS") };
    }

    #[test]
    fn config_serialize_roundtrip() {
        let config = LogwardConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed = LogwardConfig::parse(&toml_str).unwrap();
        assert_eq!(config.general.log_level, parsed.general.log_level);
        assert_eq!(config.analysis.volume_critical, parsed.analysis.volume_critical);
        assert_eq!(config.admission.window_secs, parsed.admission.window_secs);
    }

    #[tokio::test]
    async fn from_file_not_found() {
        let result = LogwardConfig::from_file("/nonexistent/path/logward.toml").await;
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }
}
