//! 조회 타입 — Finding 목록의 필터/페이지네이션
//!
//! 정렬 계약: 심각도 내림차순(CRITICAL 우선), 그 다음 생성 시각
//! 내림차순. 페이지는 1부터, limit 기본 25, 최대 100.

use chrono::{DateTime, Utc};

use logward_core::types::{Finding, FindingCategory, FindingSource, Severity};

/// Finding 목록 필터
///
/// 모든 조건은 AND 결합이며, 비어 있으면 전체를 의미합니다.
#[derive(Debug, Clone, Default)]
pub struct FindingFilter {
    /// 심각도 일치
    pub severity: Option<Severity>,
    /// 카테고리 일치
    pub category: Option<FindingCategory>,
    /// 출처 일치
    pub source: Option<FindingSource>,
    /// 제목/설명 부분 문자열 검색 (대소문자 무시)
    pub search: Option<String>,
    /// 생성 시각 하한 (포함)
    pub date_start: Option<DateTime<Utc>>,
    /// 생성 시각 상한 (포함)
    pub date_end: Option<DateTime<Utc>>,
}

impl FindingFilter {
    /// 메모리 구현에서 사용하는 단일 Finding 매칭 술어
    pub fn matches(&self, finding: &Finding) -> bool {
        if let Some(severity) = self.severity
            && finding.severity != severity
        {
            return false;
        }
        if let Some(category) = self.category
            && finding.category != category
        {
            return false;
        }
        if let Some(source) = self.source
            && finding.source != source
        {
            return false;
        }
        if let Some(ref term) = self.search {
            let term = term.to_lowercase();
            let haystack = format!(
                "{} {}",
                finding.title.to_lowercase(),
                finding.description.to_lowercase()
            );
            if !haystack.contains(&term) {
                return false;
            }
        }
        if let Some(start) = self.date_start
            && finding.created_at < start
        {
            return false;
        }
        if let Some(end) = self.date_end
            && finding.created_at > end
        {
            return false;
        }
        true
    }
}

/// 페이지 요청
#[derive(Debug, Clone, Copy)]
pub struct PageRequest {
    /// 페이지 번호 (1부터)
    pub page: u32,
    /// 페이지 크기
    pub limit: u32,
}

impl PageRequest {
    /// 기본 페이지 크기
    pub const DEFAULT_LIMIT: u32 = 25;
    /// 최대 페이지 크기
    pub const MAX_LIMIT: u32 = 100;

    pub fn new(page: u32, limit: u32) -> Self {
        Self { page, limit }
    }

    /// 계약 범위로 정규화합니다: page >= 1, 1 <= limit <= 100.
    pub fn normalized(self) -> Self {
        Self {
            page: self.page.max(1),
            limit: self.limit.clamp(1, Self::MAX_LIMIT),
        }
    }

    /// 정규화된 오프셋 (0부터)
    pub fn offset(self) -> u64 {
        let n = self.normalized();
        u64::from(n.page - 1) * u64::from(n.limit)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            limit: Self::DEFAULT_LIMIT,
        }
    }
}

/// 페이지네이션된 Finding 목록
#[derive(Debug, Clone)]
pub struct FindingsPage {
    /// 정렬된 페이지 항목
    pub items: Vec<Finding>,
    /// 페이지 번호 (1부터)
    pub page: u32,
    /// 페이지 크기
    pub limit: u32,
    /// 필터를 만족하는 전체 항목 수
    pub total: u64,
}

/// 정렬 키: 심각도 내림차순, 생성 시각 내림차순
pub fn finding_sort_key(finding: &Finding) -> (std::cmp::Reverse<Severity>, std::cmp::Reverse<DateTime<Utc>>) {
    (
        std::cmp::Reverse(finding.severity),
        std::cmp::Reverse(finding.created_at),
    )
}
