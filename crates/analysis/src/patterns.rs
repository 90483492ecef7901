//! 패턴 라이브러리 — 선언적 탐지 패턴 정의와 로딩
//!
//! 모든 패턴은 출처(내장/커스텀 파일)와 무관하게 동일한
//! [`PatternSpec`] 형태를 가집니다. 엔진은 이 라이브러리를 조회만 하며,
//! 새 패턴 추가는 엔트리 추가이지 코드 경로 추가가 아닙니다.
//!
//! # 커스텀 패턴 파일
//!
//! 디렉토리의 `.yml`/`.yaml` 파일을 로드합니다. 두 형식을 지원합니다:
//!
//! 전체 형태 (엔트리 목록):
//! ```yaml
//! - label: custom_sqli
//!   category: SQL_INJECTION
//!   severity: HIGH
//!   confidence: 0.8
//!   description: Tenant-specific injection marker
//!   pattern: "(?i)xp_cmdshell"
//! ```
//!
//! 레거시 형태 (카테고리 + 원시 패턴 목록) — 로드 시 합성 레이블이
//! 부여되어 동일한 `PatternSpec` 형태로 승격됩니다:
//! ```yaml
//! category: XSS
//! patterns:
//!   - "(?i)<svg/onload"
//!   - "(?i)document\\.cookie"
//! ```

use std::collections::HashSet;
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

use logward_core::types::{FindingCategory, Severity};

use crate::error::AnalysisError;

/// 패턴 파일 최대 크기
const MAX_PATTERN_FILE_SIZE: u64 = 1024 * 1024; // 1MB

/// 탐지 패턴 정의
///
/// 매처는 단일 로그 라인에 대한 순수 술어(정규식)입니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternSpec {
    /// 패턴 고유 레이블 (라이브러리 내에서 유일)
    pub label: String,
    /// 탐지 카테고리
    pub category: FindingCategory,
    /// 심각도
    pub severity: Severity,
    /// 신뢰도 [0, 1]
    pub confidence: f64,
    /// 설명 (Finding description에 사용)
    pub description: String,
    /// 정규식 원문
    pub pattern: String,
    /// MITRE ATT&CK 전술
    #[serde(default)]
    pub mitre_tactic: Option<String>,
    /// MITRE ATT&CK 기법
    #[serde(default)]
    pub mitre_technique: Option<String>,
}

impl PatternSpec {
    /// 패턴의 유효성을 검증합니다. 정규식 컴파일은 별도입니다.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.label.is_empty() {
            return Err(AnalysisError::PatternValidation {
                label: "(empty)".to_owned(),
                reason: "pattern label must not be empty".to_owned(),
            });
        }
        if self.pattern.is_empty() {
            return Err(AnalysisError::PatternValidation {
                label: self.label.clone(),
                reason: "pattern regex must not be empty".to_owned(),
            });
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(AnalysisError::PatternValidation {
                label: self.label.clone(),
                reason: "confidence must be within [0, 1]".to_owned(),
            });
        }
        Ok(())
    }
}

/// 레거시 패턴 파일 — 카테고리 + 원시 패턴 문자열 목록
#[derive(Debug, Deserialize)]
struct LegacyPatternFile {
    category: FindingCategory,
    #[serde(default = "default_legacy_severity")]
    severity: Severity,
    #[serde(default = "default_legacy_confidence")]
    confidence: f64,
    patterns: Vec<String>,
}

fn default_legacy_severity() -> Severity {
    Severity::Medium
}

fn default_legacy_confidence() -> f64 {
    0.5
}

/// 컴파일된 패턴 — 로딩 시 한 번만 정규식을 컴파일합니다.
#[derive(Debug)]
pub struct CompiledPattern {
    spec: PatternSpec,
    regex: Regex,
}

impl CompiledPattern {
    fn compile(spec: PatternSpec) -> Result<Self, AnalysisError> {
        spec.validate()?;
        let regex = Regex::new(&spec.pattern).map_err(|e| AnalysisError::PatternValidation {
            label: spec.label.clone(),
            reason: format!("invalid regex: {e}"),
        })?;
        Ok(Self { spec, regex })
    }

    /// 패턴 정의에 대한 참조를 반환합니다.
    pub fn spec(&self) -> &PatternSpec {
        &self.spec
    }

    /// 라인에 대해 매칭을 수행하고, 매칭된 부분 문자열을 반환합니다.
    pub fn matches<'t>(&self, line: &'t str) -> Option<&'t str> {
        self.regex.find(line).map(|m| m.as_str())
    }
}

/// 패턴 라이브러리 — 컴파일된 패턴의 조회 전용 컨테이너
#[derive(Debug)]
pub struct PatternLibrary {
    patterns: Vec<CompiledPattern>,
}

impl PatternLibrary {
    /// 내장 패턴으로 라이브러리를 생성합니다.
    pub fn builtin() -> Result<Self, AnalysisError> {
        Self::compile(builtin_specs())
    }

    /// 패턴 목록을 컴파일하여 라이브러리를 생성합니다.
    ///
    /// 중복 레이블은 경고 로그를 남기고 뒤의 것을 건너뜁니다.
    pub fn compile(specs: Vec<PatternSpec>) -> Result<Self, AnalysisError> {
        let mut patterns = Vec::with_capacity(specs.len());
        let mut seen_labels = HashSet::new();

        for spec in specs {
            if !seen_labels.insert(spec.label.clone()) {
                tracing::warn!(label = %spec.label, "duplicate pattern label, skipping");
                continue;
            }
            patterns.push(CompiledPattern::compile(spec)?);
        }

        Ok(Self { patterns })
    }

    /// 빈 라이브러리를 생성합니다 (테스트용).
    pub fn empty() -> Self {
        Self {
            patterns: Vec::new(),
        }
    }

    /// 디렉토리에서 커스텀 패턴 파일을 로드하여 추가합니다.
    ///
    /// 개별 파일의 파싱/컴파일 실패는 경고 로그를 남기고 건너뜁니다.
    /// 추가된 패턴 수를 반환합니다.
    pub async fn load_dir(&mut self, dir: impl AsRef<Path>) -> Result<usize, AnalysisError> {
        let dir = dir.as_ref();
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| AnalysisError::PatternLoad {
                path: dir.display().to_string(),
                reason: format!("failed to read directory: {e}"),
            })?;

        let mut existing: HashSet<String> = self
            .patterns
            .iter()
            .map(|p| p.spec.label.clone())
            .collect();
        let mut added = 0;

        while let Some(entry) =
            entries
                .next_entry()
                .await
                .map_err(|e| AnalysisError::PatternLoad {
                    path: dir.display().to_string(),
                    reason: format!("failed to read directory entry: {e}"),
                })?
        {
            let path = entry.path();
            let is_yaml = path
                .extension()
                .is_some_and(|ext| ext == "yml" || ext == "yaml");
            if !is_yaml {
                continue;
            }

            let specs = match load_pattern_file(&path).await {
                Ok(specs) => specs,
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "failed to load pattern file, skipping"
                    );
                    continue;
                }
            };

            for spec in specs {
                if !existing.insert(spec.label.clone()) {
                    tracing::warn!(
                        label = %spec.label,
                        path = %path.display(),
                        "duplicate pattern label, skipping"
                    );
                    continue;
                }
                match CompiledPattern::compile(spec) {
                    Ok(compiled) => {
                        self.patterns.push(compiled);
                        added += 1;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "failed to compile custom pattern, skipping"
                        );
                    }
                }
            }
        }

        tracing::info!(
            dir = %dir.display(),
            added,
            total = self.patterns.len(),
            "loaded custom detection patterns"
        );
        Ok(added)
    }

    /// 전체 패턴에 대한 이터레이터
    pub fn iter(&self) -> impl Iterator<Item = &CompiledPattern> {
        self.patterns.iter()
    }

    /// 패턴 수
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// 라이브러리가 다루는 카테고리 집합
    pub fn categories(&self) -> HashSet<FindingCategory> {
        self.patterns.iter().map(|p| p.spec.category).collect()
    }
}

/// 단일 패턴 파일을 파싱합니다. 전체 형태를 먼저 시도하고,
/// 실패하면 레거시 형태로 재시도하여 합성 레이블을 부여합니다.
async fn load_pattern_file(path: &Path) -> Result<Vec<PatternSpec>, AnalysisError> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| AnalysisError::PatternLoad {
            path: path.display().to_string(),
            reason: format!("failed to read file metadata: {e}"),
        })?;
    if metadata.len() > MAX_PATTERN_FILE_SIZE {
        return Err(AnalysisError::PatternLoad {
            path: path.display().to_string(),
            reason: format!(
                "file too large: {} bytes (max: {MAX_PATTERN_FILE_SIZE})",
                metadata.len()
            ),
        });
    }

    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| AnalysisError::PatternLoad {
            path: path.display().to_string(),
            reason: format!("failed to read file: {e}"),
        })?;

    parse_pattern_yaml(&content, &path.display().to_string())
}

/// YAML 문자열에서 패턴 목록을 파싱합니다.
pub fn parse_pattern_yaml(yaml_str: &str, source: &str) -> Result<Vec<PatternSpec>, AnalysisError> {
    if let Ok(specs) = serde_yaml::from_str::<Vec<PatternSpec>>(yaml_str) {
        return Ok(specs);
    }

    let legacy: LegacyPatternFile =
        serde_yaml::from_str(yaml_str).map_err(|e| AnalysisError::PatternLoad {
            path: source.to_owned(),
            reason: format!("YAML parse error: {e}"),
        })?;

    let category = legacy.category;
    Ok(legacy
        .patterns
        .into_iter()
        .enumerate()
        .map(|(idx, pattern)| PatternSpec {
            label: format!("{}_custom_{}", category.as_str().to_lowercase(), idx),
            category,
            severity: legacy.severity,
            confidence: legacy.confidence,
            description: format!("custom {} pattern", category.as_str().to_lowercase()),
            pattern,
            mitre_tactic: None,
            mitre_technique: None,
        })
        .collect())
}

/// 내장 패턴 정의 — 10개 카테고리
///
/// `PasswordSpray`는 통계 규칙 전용이므로 여기에 없습니다.
fn builtin_specs() -> Vec<PatternSpec> {
    fn spec(
        label: &str,
        category: FindingCategory,
        severity: Severity,
        confidence: f64,
        description: &str,
        pattern: &str,
        tactic: &str,
        technique: &str,
    ) -> PatternSpec {
        PatternSpec {
            label: label.to_owned(),
            category,
            severity,
            confidence,
            description: description.to_owned(),
            pattern: pattern.to_owned(),
            mitre_tactic: Some(tactic.to_owned()),
            mitre_technique: Some(technique.to_owned()),
        }
    }

    use FindingCategory::*;
    use Severity::*;

    vec![
        // --- SQL injection ---
        spec(
            "sqli_union_select",
            SqlInjection,
            High,
            0.9,
            "SQL UNION-based injection attempt",
            r"(?i)union(\s|%20|\+)+(all(\s|%20|\+)+)?select",
            "Initial Access",
            "T1190",
        ),
        spec(
            "sqli_tautology",
            SqlInjection,
            High,
            0.85,
            "SQL tautology injection ('1'='1' style)",
            r#"(?i)('|%27|")\s*(or|and)\s*('|%27|")?\d+('|%27|")?\s*=\s*\d"#,
            "Initial Access",
            "T1190",
        ),
        spec(
            "sqli_stacked_query",
            SqlInjection,
            Critical,
            0.9,
            "Stacked query attempting data destruction",
            r"(?i)(;|%3b)\s*(drop|truncate|delete)\s+(table|from|database)",
            "Impact",
            "T1485",
        ),
        spec(
            "sqli_time_based",
            SqlInjection,
            High,
            0.85,
            "Time-based blind SQL injection probe",
            r"(?i)(sleep\s*\(\s*\d+\s*\)|benchmark\s*\(|waitfor\s+delay|pg_sleep)",
            "Initial Access",
            "T1190",
        ),
        spec(
            "sqli_schema_probe",
            SqlInjection,
            Medium,
            0.75,
            "Database schema enumeration probe",
            r"(?i)(information_schema|sysobjects|pg_catalog)\b",
            "Discovery",
            "T1082",
        ),
        // --- XSS ---
        spec(
            "xss_script_tag",
            Xss,
            High,
            0.9,
            "Inline script tag injection",
            r"(?i)<\s*script[^>]*>",
            "Initial Access",
            "T1189",
        ),
        spec(
            "xss_event_handler",
            Xss,
            Medium,
            0.8,
            "HTML event handler injection",
            r"(?i)\b(onerror|onload|onmouseover|onfocus|onclick)\s*=",
            "Initial Access",
            "T1189",
        ),
        spec(
            "xss_javascript_uri",
            Xss,
            Medium,
            0.8,
            "javascript: URI injection",
            r"(?i)javascript\s*:\s*[a-z(]",
            "Initial Access",
            "T1189",
        ),
        spec(
            "xss_encoded_script",
            Xss,
            Medium,
            0.75,
            "URL-encoded script tag injection",
            r"(?i)(%3c|&lt;)\s*script",
            "Initial Access",
            "T1189",
        ),
        // --- Brute force (무상태 라인 마커; 횟수 기반 승격은 통계 규칙) ---
        spec(
            "auth_failure_marker",
            BruteForce,
            Low,
            0.5,
            "Failed authentication attempt",
            r"(?i)(failed password|authentication failure|login failed|invalid user)",
            "Credential Access",
            "T1110",
        ),
        // --- Directory traversal ---
        spec(
            "traversal_dotdot",
            DirectoryTraversal,
            High,
            0.9,
            "Path traversal sequence",
            r"(\.\./){2,}|(\.\.\\){2,}",
            "Initial Access",
            "T1190",
        ),
        spec(
            "traversal_encoded",
            DirectoryTraversal,
            High,
            0.85,
            "URL-encoded path traversal sequence",
            r"(?i)(%2e%2e%2f|%2e%2e/|\.\.%2f|%252e%252e)",
            "Initial Access",
            "T1190",
        ),
        spec(
            "traversal_sensitive_file",
            DirectoryTraversal,
            High,
            0.85,
            "Access attempt to sensitive system file",
            r"(?i)/etc/(passwd|shadow)|boot\.ini|win\.ini",
            "Credential Access",
            "T1003",
        ),
        // --- Command injection ---
        spec(
            "cmdi_chained_command",
            CommandInjection,
            Critical,
            0.85,
            "Shell command chaining in request",
            r"(?i)(;|\||%7c|&&)\s*(cat|ls|id|whoami|uname|wget|curl)\b",
            "Execution",
            "T1059",
        ),
        spec(
            "cmdi_substitution",
            CommandInjection,
            Critical,
            0.85,
            "Command substitution injection",
            r"(?i)(\$\(|%24%28|`)\s*[a-z]",
            "Execution",
            "T1059",
        ),
        spec(
            "cmdi_reverse_shell",
            CommandInjection,
            Critical,
            0.95,
            "Reverse shell invocation attempt",
            r"(?i)(nc\s+-e|/bin/(ba)?sh\s+-i|python\s+-c\s+.*socket)",
            "Execution",
            "T1059.004",
        ),
        // --- Suspicious status code ---
        spec(
            "status_auth_denied",
            SuspiciousStatusCode,
            Info,
            0.5,
            "Authentication or authorization denied response",
            r#""\s+40[13]\s"#,
            "Credential Access",
            "T1110",
        ),
        spec(
            "status_server_error",
            SuspiciousStatusCode,
            Info,
            0.4,
            "Server error response (possible probing side effect)",
            r#""\s+5\d{2}\s"#,
            "Initial Access",
            "T1190",
        ),
        // --- Rate anomaly (무상태 마커; 집계 기반 탐지는 통계 규칙) ---
        spec(
            "rate_limited_response",
            RateAnomaly,
            Low,
            0.6,
            "Upstream rate limiting triggered",
            r#"(?i)("\s+429\s|too many requests|rate limit exceeded)"#,
            "Impact",
            "T1498",
        ),
        // --- Malicious user agent ---
        spec(
            "ua_scanner_tool",
            MaliciousUserAgent,
            High,
            0.9,
            "Known offensive scanner user agent",
            r"(?i)(sqlmap|nikto|nmap|masscan|dirbuster|gobuster|wpscan|hydra|metasploit|acunetix)",
            "Reconnaissance",
            "T1595",
        ),
        spec(
            "ua_headless_client",
            MaliciousUserAgent,
            Low,
            0.4,
            "Headless HTTP client user agent",
            r"(?i)(python-requests|go-http-client|libwww-perl)",
            "Reconnaissance",
            "T1595",
        ),
        // --- Privilege escalation ---
        spec(
            "privesc_sudo_failure",
            PrivilegeEscalation,
            Medium,
            0.7,
            "Failed sudo privilege escalation attempt",
            r"(?i)sudo:.*(incorrect password|not in the sudoers|command not allowed)",
            "Privilege Escalation",
            "T1548.003",
        ),
        spec(
            "privesc_root_session",
            PrivilegeEscalation,
            Medium,
            0.6,
            "Root session or uid transition marker",
            r"(?i)(session opened for user root|su(do)?\s+(-\s+)?root\b|uid=0\(root\))",
            "Privilege Escalation",
            "T1548",
        ),
        spec(
            "privesc_setuid_change",
            PrivilegeEscalation,
            High,
            0.8,
            "setuid bit or dangerous permission change",
            r"(?i)chmod\s+([0-7])?[4567][0-7]{2}\s|chmod\s+\+s\b",
            "Privilege Escalation",
            "T1548.001",
        ),
        // --- Data exfiltration ---
        spec(
            "exfil_archive_download",
            DataExfiltration,
            High,
            0.75,
            "Bulk data archive requested over HTTP",
            r"(?i)/(backup|dump|export)[^\s]*\.(sql|zip|tar|tar\.gz|tgz|7z)",
            "Exfiltration",
            "T1048",
        ),
        spec(
            "exfil_outbound_copy",
            DataExfiltration,
            High,
            0.8,
            "Outbound bulk copy command",
            r"(?i)\b(scp|rsync|sftp)\s+\S+@",
            "Exfiltration",
            "T1048",
        ),
        spec(
            "exfil_encoded_payload",
            DataExfiltration,
            Medium,
            0.6,
            "Base64 decode of transferred payload",
            r"(?i)base64\s+(-d|--decode)",
            "Exfiltration",
            "T1132.001",
        ),
    ]
}
