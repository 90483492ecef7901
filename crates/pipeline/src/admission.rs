//! 수락 제어 — 사용자별 (재)분석 요청 속도 제한
//!
//! 사용자마다 슬라이딩 윈도우 안의 요청 시각을 추적합니다.
//! 윈도우 내 요청 수가 한도에 도달하면 거부하고, 가장 오래된 요청이
//! 윈도우를 벗어날 때까지의 시간을 `retry_after_ms`로 알려줍니다.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use logward_core::config::AdmissionConfig;
use logward_core::metrics as m;

/// 수락 판정
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionDecision {
    /// 허용 여부
    pub allowed: bool,
    /// 거부 시 재시도까지 대기 시간 (밀리초, 허용 시 0)
    pub retry_after_ms: u64,
}

impl AdmissionDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            retry_after_ms: 0,
        }
    }
}

/// 사용자별 슬라이딩 윈도우 속도 제한기
///
/// 내부 락은 await 지점 없이 짧게만 잡으므로 `std::sync::Mutex`를
/// 사용합니다.
pub struct AdmissionGuard {
    max_requests: u32,
    window: Duration,
    requests: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl AdmissionGuard {
    pub fn new(config: &AdmissionConfig) -> Self {
        Self {
            max_requests: config.max_requests,
            window: Duration::from_secs(config.window_secs),
            requests: Mutex::new(HashMap::new()),
        }
    }

    /// 요청을 판정합니다. 허용 시 해당 요청이 윈도우에 기록됩니다.
    pub fn check(&self, user_id: &str) -> AdmissionDecision {
        let now = Instant::now();
        let mut requests = match self.requests.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let window = requests.entry(user_id.to_owned()).or_default();

        // 윈도우를 벗어난 기록 제거
        while let Some(front) = window.front() {
            if now.duration_since(*front) >= self.window {
                window.pop_front();
            } else {
                break;
            }
        }

        if window.len() >= self.max_requests as usize {
            let retry_after = window
                .front()
                .map(|oldest| self.window.saturating_sub(now.duration_since(*oldest)))
                .unwrap_or(self.window);
            metrics::counter!(m::ADMISSION_REJECTED_TOTAL).increment(1);
            tracing::debug!(
                user_id,
                in_window = window.len(),
                retry_after_ms = retry_after.as_millis() as u64,
                "analysis request rate limited"
            );
            return AdmissionDecision {
                allowed: false,
                // 0이면 즉시 재시도로 읽히므로 최소 1ms
                retry_after_ms: (retry_after.as_millis() as u64).max(1),
            };
        }

        window.push_back(now);
        AdmissionDecision::allow()
    }

    /// 만료된 사용자 엔트리를 정리합니다. 주기적으로 호출해 메모리
    /// 성장을 방지합니다.
    pub fn cleanup_expired(&self) {
        let now = Instant::now();
        let mut requests = match self.requests.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        requests.retain(|_, window| {
            window
                .back()
                .is_some_and(|last| now.duration_since(*last) < self.window)
        });
    }

    /// 추적 중인 사용자 수 (테스트용)
    pub fn tracked_users(&self) -> usize {
        match self.requests.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard(max_requests: u32, window_secs: u64) -> AdmissionGuard {
        AdmissionGuard::new(&AdmissionConfig {
            max_requests,
            window_secs,
        })
    }

    #[test]
    fn allows_up_to_limit() {
        let guard = guard(3, 60);
        for _ in 0..3 {
            assert!(guard.check("user-1").allowed);
        }
    }

    #[test]
    fn rejects_over_limit_with_retry_hint() {
        let guard = guard(2, 60);
        assert!(guard.check("user-1").allowed);
        assert!(guard.check("user-1").allowed);

        let decision = guard.check("user-1");
        assert!(!decision.allowed);
        assert!(decision.retry_after_ms > 0);
        // 윈도우 크기를 넘지 않음
        assert!(decision.retry_after_ms <= 60_000);
    }

    #[test]
    fn users_are_limited_independently() {
        let guard = guard(1, 60);
        assert!(guard.check("user-1").allowed);
        assert!(!guard.check("user-1").allowed);
        assert!(guard.check("user-2").allowed);
    }

    #[test]
    fn rejected_request_does_not_consume_quota() {
        let guard = guard(1, 60);
        assert!(guard.check("user-1").allowed);
        // 거부된 요청이 윈도우를 채우지 않으므로 retry_after는 일정
        let first = guard.check("user-1");
        let second = guard.check("user-1");
        assert!(!first.allowed);
        assert!(!second.allowed);
        assert!(second.retry_after_ms <= first.retry_after_ms);
    }

    #[test]
    fn zero_window_admits_everything() {
        let guard = guard(1, 0);
        assert!(guard.check("user-1").allowed);
        // 윈도우가 0이면 이전 기록이 즉시 만료
        assert!(guard.check("user-1").allowed);
    }

    #[test]
    fn cleanup_removes_expired_users() {
        let guard = guard(5, 0);
        guard.check("user-1");
        assert_eq!(guard.tracked_users(), 1);
        guard.cleanup_expired();
        assert_eq!(guard.tracked_users(), 0);
    }

    #[test]
    fn cleanup_keeps_active_users() {
        let guard = guard(5, 60);
        guard.check("user-1");
        guard.cleanup_expired();
        assert_eq!(guard.tracked_users(), 1);
    }
}
