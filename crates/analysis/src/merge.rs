//! Finding 병합기 — 두 탐지 스트림의 핑거프린트 기반 중복 제거
//!
//! 규칙 엔진과 LLM 오케스트레이터의 Finding을 하나의 일관된 집합으로
//! 합칩니다. 핑거프린트가 충돌하면 규칙 기반 Finding이 유지됩니다
//! (결정적이고 신뢰도가 높으므로). 동일 출처 내부의 중복도 함께
//! 제거됩니다.
//!
//! 저장소 계층의 `(analysis_result_id, fingerprint)` 유니크 제약이
//! 재실행에 걸친 같은 법칙을 보강합니다.

use std::collections::HashSet;

use chrono::Utc;

use logward_core::types::{Finding, FindingSource};

use crate::llm::LlmFinding;

/// 규칙 기반 Finding과 LLM Finding을 병합합니다.
///
/// 반환 집합에는 핑거프린트 충돌이 없습니다. 충돌 시 규칙 기반이
/// 유지되고 LLM 중복이 버려집니다.
pub fn merge_findings(rule_based: Vec<Finding>, llm: Vec<Finding>) -> Vec<Finding> {
    let mut seen = HashSet::new();
    let mut merged = Vec::with_capacity(rule_based.len() + llm.len());

    // 규칙 기반 우선 — 충돌 시 승자
    for finding in rule_based.into_iter().chain(llm) {
        if seen.insert(finding.fingerprint.clone()) {
            merged.push(finding);
        } else {
            tracing::debug!(
                fingerprint = %finding.fingerprint,
                source = %finding.source,
                "duplicate fingerprint discarded during merge"
            );
        }
    }

    merged
}

/// 이미 저장된 핑거프린트 집합에 대해 신규 Finding을 걸러냅니다.
///
/// 재개된 LLM 단계에서 이전 부분 실행의 중복을 방지하는 데 쓰입니다.
pub fn dedup_against(existing: &HashSet<String>, findings: Vec<Finding>) -> Vec<Finding> {
    let mut seen = existing.clone();
    findings
        .into_iter()
        .filter(|f| seen.insert(f.fingerprint.clone()))
        .collect()
}

/// LLM 후보 Finding을 영속 가능한 [`Finding`]으로 변환합니다.
///
/// 핑거프린트는 규칙 엔진과 동일한 함수로 계산합니다:
/// (카테고리, 근거 텍스트 — 없으면 제목, 라인 참조).
pub fn llm_to_findings(analysis_result_id: &str, candidates: Vec<LlmFinding>) -> Vec<Finding> {
    candidates
        .into_iter()
        .map(|c| {
            let fingerprint_content = c.evidence.as_deref().unwrap_or(c.title.as_str());
            let fingerprint =
                Finding::fingerprint_of(c.category, fingerprint_content, c.line_number);
            Finding {
                id: uuid::Uuid::new_v4().to_string(),
                analysis_result_id: analysis_result_id.to_owned(),
                severity: c.severity,
                category: c.category,
                title: c.title,
                description: c.description,
                line_number: c.line_number,
                line_content: None,
                matched_pattern: None,
                source: FindingSource::Llm,
                fingerprint,
                confidence: c.confidence,
                mitre_tactic: c.mitre_tactic,
                mitre_technique: c.mitre_technique,
                event_timestamp: None,
                created_at: Utc::now(),
            }
        })
        .collect()
}
