//! IP별 집계 상태 — 통계 규칙 평가를 위한 단일 실행 스코프 상태
//!
//! 하나의 규칙 엔진 실행에만 속하며 영속되지 않습니다.
//! 매 실행마다 원시 로그 라인에서 다시 계산됩니다.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Duration, Utc};

use crate::parser::LineFields;

/// 단일 출발지 IP의 집계 값
#[derive(Debug, Default)]
pub struct IpAggregate {
    /// 전체 요청(라인) 수
    pub total_requests: u64,
    /// 에러 응답(상태 >= 400) 수
    pub error_responses: u64,
    /// 인증 실패 라인에서 관측된 고유 사용자명
    pub attempted_usernames: HashSet<String>,
    /// 404 응답을 받은 고유 경로
    pub not_found_paths: HashSet<String>,
    /// 404 응답 총 횟수 (고유/반복 모두 포함)
    pub not_found_count: u64,
    /// 요청 타임스탬프 (버스트 윈도우 평가용)
    pub request_times: Vec<DateTime<Utc>>,
    /// 인증 실패 라인 수
    pub failed_auth_count: u64,
}

impl IpAggregate {
    /// 임의의 `window` 구간 안에 들어오는 최대 요청 수를 반환합니다.
    ///
    /// 타임스탬프가 없는 라인은 이 계산에 참여하지 않습니다.
    pub fn max_requests_in_window(&self, window: Duration) -> u64 {
        if self.request_times.is_empty() {
            return 0;
        }
        let mut times = self.request_times.clone();
        times.sort_unstable();

        let mut best = 0u64;
        let mut start = 0usize;
        for end in 0..times.len() {
            while times[end] - times[start] > window {
                start += 1;
            }
            best = best.max((end - start + 1) as u64);
        }
        best
    }

    /// 에러 응답 비율 (요청이 없으면 0)
    pub fn error_ratio(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.error_responses as f64 / self.total_requests as f64
    }
}

/// 전체 파일에 대한 IP별 집계 상태
///
/// `BTreeMap`을 사용하여 통계 Finding의 생성 순서를 결정적으로 만듭니다.
#[derive(Debug, Default)]
pub struct AggregateState {
    per_ip: BTreeMap<String, IpAggregate>,
}

impl AggregateState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 파싱된 한 라인을 집계에 반영합니다.
    ///
    /// IP가 없는 라인은 집계에서 제외됩니다 (무상태 매칭에는 무관).
    pub fn observe(&mut self, fields: &LineFields) {
        let Some(ip) = fields.source_ip.as_deref() else {
            return;
        };
        let agg = self.per_ip.entry(ip.to_owned()).or_default();

        agg.total_requests += 1;

        if let Some(status) = fields.status {
            if status >= 400 {
                agg.error_responses += 1;
            }
            if status == 404 {
                agg.not_found_count += 1;
                if let Some(path) = fields.path.as_deref() {
                    agg.not_found_paths.insert(path.to_owned());
                }
            }
        }

        if fields.failed_auth {
            agg.failed_auth_count += 1;
            if let Some(user) = fields.username.as_deref() {
                agg.attempted_usernames.insert(user.to_owned());
            }
        }

        if let Some(ts) = fields.timestamp {
            agg.request_times.push(ts);
        }
    }

    /// IP 오름차순 이터레이터
    pub fn iter(&self) -> impl Iterator<Item = (&String, &IpAggregate)> {
        self.per_ip.iter()
    }

    /// 집계된 IP 수
    pub fn ip_count(&self) -> usize {
        self.per_ip.len()
    }

    /// 특정 IP의 집계 조회 (테스트용)
    pub fn get(&self, ip: &str) -> Option<&IpAggregate> {
        self.per_ip.get(ip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fields(ip: &str) -> LineFields {
        LineFields {
            source_ip: Some(ip.to_owned()),
            ..Default::default()
        }
    }

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn lines_without_ip_are_excluded() {
        let mut state = AggregateState::new();
        state.observe(&LineFields::default());
        assert_eq!(state.ip_count(), 0);
    }

    #[test]
    fn counts_totals_and_errors() {
        let mut state = AggregateState::new();
        for status in [200, 404, 500, 200] {
            let mut f = fields("10.0.0.1");
            f.status = Some(status);
            state.observe(&f);
        }
        let agg = state.get("10.0.0.1").unwrap();
        assert_eq!(agg.total_requests, 4);
        assert_eq!(agg.error_responses, 2);
        assert_eq!(agg.not_found_count, 1);
        assert_eq!(agg.error_ratio(), 0.5);
    }

    #[test]
    fn repeated_404_on_same_path_counts_each_response() {
        let mut state = AggregateState::new();
        for _ in 0..3 {
            let mut f = fields("10.0.0.1");
            f.status = Some(404);
            f.path = Some("/admin".to_owned());
            state.observe(&f);
        }
        let agg = state.get("10.0.0.1").unwrap();
        // "distinct-or-repeated": 총 횟수는 3, 고유 경로는 1
        assert_eq!(agg.not_found_count, 3);
        assert_eq!(agg.not_found_paths.len(), 1);
    }

    #[test]
    fn usernames_only_counted_on_failed_auth() {
        let mut state = AggregateState::new();

        let mut ok_login = fields("10.0.0.1");
        ok_login.username = Some("alice".to_owned());
        state.observe(&ok_login);

        let mut failed = fields("10.0.0.1");
        failed.username = Some("bob".to_owned());
        failed.failed_auth = true;
        state.observe(&failed);

        let agg = state.get("10.0.0.1").unwrap();
        assert_eq!(agg.attempted_usernames.len(), 1);
        assert!(agg.attempted_usernames.contains("bob"));
        assert_eq!(agg.failed_auth_count, 1);
    }

    #[test]
    fn ips_are_aggregated_independently() {
        let mut state = AggregateState::new();
        let mut a = fields("10.0.0.1");
        a.failed_auth = true;
        state.observe(&a);
        state.observe(&fields("10.0.0.2"));

        assert_eq!(state.ip_count(), 2);
        assert_eq!(state.get("10.0.0.1").unwrap().failed_auth_count, 1);
        assert_eq!(state.get("10.0.0.2").unwrap().failed_auth_count, 0);
    }

    #[test]
    fn burst_window_counts_dense_cluster() {
        let mut agg = IpAggregate::default();
        // 5초 안에 5건, 이후 멀리 떨어진 1건
        for s in [0, 1, 2, 3, 5] {
            agg.request_times.push(ts(s));
        }
        agg.request_times.push(ts(120));
        assert_eq!(agg.max_requests_in_window(Duration::seconds(5)), 5);
    }

    #[test]
    fn burst_window_with_sparse_requests() {
        let mut agg = IpAggregate::default();
        for s in [0, 10, 20, 30] {
            agg.request_times.push(ts(s));
        }
        assert_eq!(agg.max_requests_in_window(Duration::seconds(5)), 1);
    }

    #[test]
    fn burst_window_unsorted_input() {
        let mut agg = IpAggregate::default();
        for s in [4, 0, 2, 1, 3] {
            agg.request_times.push(ts(s));
        }
        assert_eq!(agg.max_requests_in_window(Duration::seconds(5)), 5);
    }

    #[test]
    fn burst_window_empty_is_zero() {
        let agg = IpAggregate::default();
        assert_eq!(agg.max_requests_in_window(Duration::seconds(5)), 0);
    }

    #[test]
    fn error_ratio_zero_when_no_requests() {
        let agg = IpAggregate::default();
        assert_eq!(agg.error_ratio(), 0.0);
    }

    #[test]
    fn iteration_order_is_deterministic() {
        let mut state = AggregateState::new();
        for ip in ["10.0.0.3", "10.0.0.1", "10.0.0.2"] {
            state.observe(&fields(ip));
        }
        let ips: Vec<_> = state.iter().map(|(ip, _)| ip.clone()).collect();
        assert_eq!(ips, vec!["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
    }
}
