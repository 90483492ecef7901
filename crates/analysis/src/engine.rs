//! 규칙 엔진 — 무상태 패턴 매칭과 IP별 통계 규칙 평가
//!
//! 하나의 업로드에 대한 전체 로그 라인 시퀀스를 입력으로 받아
//! 유한한 Finding 목록을 생성합니다. 동일 입력에 대해 결정적입니다
//! (Finding의 `id`/`created_at`만 호출마다 달라지며, `fingerprint`
//! 집합은 항상 같습니다).
//!
//! # 알고리즘
//! 1. 라인별로 모든 무상태 패턴을 평가하며 동시에 IP별 집계를 누적
//! 2. 전체 패스 후 집계 상태에 대해 통계 규칙 평가
//!
//! 파싱 불가능한 라인도 무상태 매칭에는 참여합니다.

use chrono::{Duration, Utc};

use logward_core::config::AnalysisConfig;
use logward_core::metrics as m;
use logward_core::types::{Finding, FindingCategory, FindingSource, Severity};

use crate::aggregate::{AggregateState, IpAggregate};
use crate::parser::LineParser;
use crate::patterns::PatternLibrary;

/// Finding에 보존하는 라인 내용 최대 길이 (바이트가 아닌 char 수)
const MAX_LINE_CONTENT: usize = 512;

/// 규칙 엔진
///
/// 패턴 라이브러리와 임계값 설정을 받아 구성됩니다. 실행 자체는
/// 순수하며 공유 상태가 없으므로 `&self`로 동시 실행이 가능합니다.
pub struct RuleEngine {
    library: PatternLibrary,
    parser: LineParser,
    config: AnalysisConfig,
}

impl RuleEngine {
    /// 새 규칙 엔진을 생성합니다.
    pub fn new(library: PatternLibrary, config: AnalysisConfig) -> Self {
        Self {
            library,
            parser: LineParser::new(),
            config,
        }
    }

    /// 로드된 패턴 수를 반환합니다.
    pub fn pattern_count(&self) -> usize {
        self.library.len()
    }

    /// 전체 로그 내용을 분석하여 Finding 목록을 생성합니다.
    pub fn analyze(&self, analysis_result_id: &str, content: &str) -> Vec<Finding> {
        let mut findings = Vec::new();
        let mut state = AggregateState::new();
        let mut line_count = 0u64;

        for (idx, line) in content.lines().enumerate() {
            let line_number = (idx + 1) as u64;
            line_count += 1;

            let fields = self.parser.parse(line);

            // 1. 무상태 패턴 매칭
            for pattern in self.library.iter() {
                if let Some(matched) = pattern.matches(line) {
                    let spec = pattern.spec();
                    findings.push(Finding {
                        id: uuid::Uuid::new_v4().to_string(),
                        analysis_result_id: analysis_result_id.to_owned(),
                        severity: spec.severity,
                        category: spec.category,
                        title: spec.description.clone(),
                        description: format!(
                            "Pattern '{}' matched on line {line_number}",
                            spec.label
                        ),
                        line_number: Some(line_number),
                        line_content: Some(truncate_chars(line, MAX_LINE_CONTENT)),
                        matched_pattern: Some(spec.pattern.clone()),
                        source: FindingSource::RuleBased,
                        fingerprint: Finding::fingerprint_of(
                            spec.category,
                            matched,
                            Some(line_number),
                        ),
                        confidence: Some(spec.confidence),
                        mitre_tactic: spec.mitre_tactic.clone(),
                        mitre_technique: spec.mitre_technique.clone(),
                        event_timestamp: fields.timestamp,
                        created_at: Utc::now(),
                    });
                }
            }

            // 2. 집계 누적
            state.observe(&fields);
        }

        // 3. 통계 규칙 평가
        for (ip, agg) in state.iter() {
            self.evaluate_statistical_rules(analysis_result_id, ip, agg, &mut findings);
        }

        metrics::counter!(m::RULE_ENGINE_LINES_TOTAL).increment(line_count);
        metrics::counter!(m::RULE_ENGINE_FINDINGS_TOTAL).increment(findings.len() as u64);

        tracing::debug!(
            lines = line_count,
            ips = state.ip_count(),
            findings = findings.len(),
            "rule engine pass complete"
        );

        findings
    }

    /// 단일 IP의 집계에 대해 모든 통계 규칙을 평가합니다.
    ///
    /// 한 IP가 여러 규칙에 걸리면 규칙마다 하나씩 Finding이 생성됩니다.
    fn evaluate_statistical_rules(
        &self,
        result_id: &str,
        ip: &str,
        agg: &IpAggregate,
        findings: &mut Vec<Finding>,
    ) {
        let cfg = &self.config;

        // 브루트포스: 동일 IP의 인증 실패 누적
        if agg.failed_auth_count >= cfg.brute_force_attempts {
            findings.push(statistical_finding(
                result_id,
                FindingCategory::BruteForce,
                Severity::High,
                0.9,
                "brute_force",
                ip,
                format!("Brute force authentication attack from {ip}"),
                format!(
                    "{} failed authentication attempts observed from {ip} \
                     (threshold: {})",
                    agg.failed_auth_count, cfg.brute_force_attempts
                ),
                Some(("Credential Access", "T1110.001")),
            ));
        }

        // 패스워드 스프레이: 고유 사용자명 수 (브루트포스 횟수와 독립)
        if agg.attempted_usernames.len() as u64 >= cfg.spray_usernames {
            findings.push(statistical_finding(
                result_id,
                FindingCategory::PasswordSpray,
                Severity::Critical,
                0.95,
                "password_spray",
                ip,
                format!("Password spray attack from {ip}"),
                format!(
                    "{} distinct usernames targeted from {ip} (threshold: {})",
                    agg.attempted_usernames.len(),
                    cfg.spray_usernames
                ),
                Some(("Credential Access", "T1110.003")),
            ));
        }

        // 디렉토리 열거: 404 응답 누적 (고유/반복 불문)
        if agg.not_found_count >= cfg.enumeration_404s {
            findings.push(statistical_finding(
                result_id,
                FindingCategory::DirectoryTraversal,
                Severity::High,
                0.85,
                "directory_enumeration",
                ip,
                format!("Directory enumeration from {ip}"),
                format!(
                    "{} not-found responses ({} distinct paths) triggered by {ip} \
                     (threshold: {})",
                    agg.not_found_count,
                    agg.not_found_paths.len(),
                    cfg.enumeration_404s
                ),
                Some(("Discovery", "T1083")),
            ));
        }

        // 요청량: 최고 티어 하나만 (누적 아님)
        if let Some((severity, tier)) = self.volume_tier(agg.total_requests) {
            findings.push(statistical_finding(
                result_id,
                FindingCategory::RateAnomaly,
                severity,
                0.8,
                "volume",
                ip,
                format!("Abnormal request volume from {ip}"),
                format!(
                    "{} total requests from {ip} (tier threshold: {tier})",
                    agg.total_requests
                ),
                Some(("Impact", "T1498")),
            ));
        }

        // 에러 비율: 최소 요청 수를 만족할 때만
        if agg.total_requests >= cfg.error_ratio_min_requests
            && agg.error_ratio() >= cfg.error_ratio
        {
            findings.push(statistical_finding(
                result_id,
                FindingCategory::RateAnomaly,
                Severity::High,
                0.8,
                "error_ratio",
                ip,
                format!("High error-response ratio from {ip}"),
                format!(
                    "{:.0}% of {} requests from {ip} resulted in errors \
                     (threshold: {:.0}%)",
                    agg.error_ratio() * 100.0,
                    agg.total_requests,
                    cfg.error_ratio * 100.0
                ),
                Some(("Reconnaissance", "T1595")),
            ));
        }

        // 버스트: 슬라이딩 윈도우 내 요청 밀도
        let window = Duration::seconds(cfg.burst_window_secs as i64);
        let burst = agg.max_requests_in_window(window);
        if burst >= cfg.burst_requests {
            findings.push(statistical_finding(
                result_id,
                FindingCategory::RateAnomaly,
                Severity::High,
                0.85,
                "burst",
                ip,
                format!("Request burst from {ip}"),
                format!(
                    "{burst} requests within a {}s window from {ip} (threshold: {})",
                    cfg.burst_window_secs, cfg.burst_requests
                ),
                Some(("Impact", "T1498.001")),
            ));
        }
    }

    /// 요청량 티어를 결정합니다. 최고 티어 하나만 반환합니다.
    fn volume_tier(&self, total: u64) -> Option<(Severity, u64)> {
        let cfg = &self.config;
        if total >= cfg.volume_critical {
            Some((Severity::Critical, cfg.volume_critical))
        } else if total >= cfg.volume_high {
            Some((Severity::High, cfg.volume_high))
        } else if total >= cfg.volume_medium {
            Some((Severity::Medium, cfg.volume_medium))
        } else {
            None
        }
    }
}

/// 통계 규칙 Finding을 생성합니다.
///
/// 핑거프린트는 (카테고리, `rule_key:ip`)의 함수이므로 라인과 무관하게
/// 규칙당/IP당 하나로 안정됩니다.
#[allow(clippy::too_many_arguments)]
fn statistical_finding(
    result_id: &str,
    category: FindingCategory,
    severity: Severity,
    confidence: f64,
    rule_key: &str,
    ip: &str,
    title: String,
    description: String,
    mitre: Option<(&str, &str)>,
) -> Finding {
    Finding {
        id: uuid::Uuid::new_v4().to_string(),
        analysis_result_id: result_id.to_owned(),
        severity,
        category,
        title,
        description,
        line_number: None,
        line_content: None,
        matched_pattern: None,
        source: FindingSource::RuleBased,
        fingerprint: Finding::fingerprint_of(category, &format!("{rule_key}:{ip}"), None),
        confidence: Some(confidence),
        mitre_tactic: mitre.map(|(t, _)| t.to_owned()),
        mitre_technique: mitre.map(|(_, t)| t.to_owned()),
        event_timestamp: None,
        created_at: Utc::now(),
    }
}

/// char 경계를 존중하여 문자열을 절단합니다.
fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_owned()
    } else {
        s.chars().take(max_chars).collect()
    }
}
