//! 로그 라인 파서 — 단일 라인에서 집계용 필드를 추출합니다.
//!
//! 형식을 고정하지 않는 best-effort 추출입니다. Apache/Nginx combined,
//! syslog/auth 로그, `key=value` 스타일 애플리케이션 로그를 다룹니다.
//! 인식 가능한 IP/상태 코드가 없는 라인은 집계에서 제외되지만
//! 무상태 패턴 매칭에는 여전히 참여합니다.

use std::sync::LazyLock;

use chrono::{DateTime, Datelike, NaiveDateTime, TimeZone, Utc};
use regex::Regex;

static RE_IP_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:ip|src|source_ip|client)[=:]\s*(\d{1,3}(?:\.\d{1,3}){3})")
        .expect("static regex")
});
static RE_IP_BARE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,3}(?:\.\d{1,3}){3})\b").expect("static regex"));
static RE_STATUS_COMBINED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""\s+(\d{3})\s"#).expect("static regex"));
static RE_STATUS_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bstatus[=:]\s*(\d{3})\b").expect("static regex"));
static RE_REQUEST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""(GET|POST|PUT|DELETE|HEAD|OPTIONS|PATCH)\s+(\S+)"#).expect("static regex")
});
static RE_PATH_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bpath[=:]\s*(\S+)").expect("static regex"));
static RE_USER_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\buser(?:name)?[=:]\s*([^\s,;]+)").expect("static regex"));
// "Failed password for (invalid user) NAME from"과 "Invalid user NAME from"
// 두 sshd 형식을 모두 다룹니다.
static RE_USER_SSH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\bfor\s+(?:invalid user\s+)?|\binvalid user\s+)([A-Za-z0-9_.-]+)\s+from\b")
        .expect("static regex")
});
static RE_TS_APACHE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[(\d{2}/\w{3}/\d{4}:\d{2}:\d{2}:\d{2})(\s+[+-]\d{4})?\]").expect("static regex")
});
static RE_TS_ISO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{4}-\d{2}-\d{2})[T ](\d{2}:\d{2}:\d{2})").expect("static regex")
});
static RE_TS_SYSLOG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\w{3})\s+(\d{1,2})\s+(\d{2}:\d{2}:\d{2})").expect("static regex")
});
static RE_FAILED_AUTH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(failed password|authentication failure|login failed|invalid user)")
        .expect("static regex")
});

/// 한 라인에서 추출된 필드
///
/// 모든 필드는 선택적입니다. 없는 필드는 해당 통계에서 제외될 뿐
/// 라인 자체를 버리지 않습니다.
#[derive(Debug, Clone, Default)]
pub struct LineFields {
    /// 출발지 IP (v4 dotted)
    pub source_ip: Option<String>,
    /// HTTP 상태 코드
    pub status: Option<u16>,
    /// 요청 경로
    pub path: Option<String>,
    /// 사용자명
    pub username: Option<String>,
    /// 이벤트 시각
    pub timestamp: Option<DateTime<Utc>>,
    /// 인증 실패 라인 여부
    pub failed_auth: bool,
}

/// 로그 라인 파서
///
/// 정규식은 프로세스 전역에서 한 번만 컴파일됩니다.
#[derive(Debug, Default)]
pub struct LineParser;

impl LineParser {
    pub fn new() -> Self {
        Self
    }

    /// 한 라인을 파싱하여 필드를 추출합니다. 실패하지 않습니다.
    pub fn parse(&self, line: &str) -> LineFields {
        LineFields {
            source_ip: extract_ip(line),
            status: extract_status(line),
            path: extract_path(line),
            username: extract_username(line),
            timestamp: extract_timestamp(line),
            failed_auth: RE_FAILED_AUTH.is_match(line),
        }
    }
}

/// `ip=` 형식을 우선하고, 없으면 라인의 첫 dotted-quad를 사용합니다.
fn extract_ip(line: &str) -> Option<String> {
    if let Some(caps) = RE_IP_FIELD.captures(line) {
        let candidate = caps.get(1)?.as_str();
        if is_valid_ipv4(candidate) {
            return Some(candidate.to_owned());
        }
    }
    for caps in RE_IP_BARE.captures_iter(line) {
        let candidate = caps.get(1)?.as_str();
        if is_valid_ipv4(candidate) {
            return Some(candidate.to_owned());
        }
    }
    None
}

/// 각 옥텟이 0~255 범위인지 검증합니다.
fn is_valid_ipv4(s: &str) -> bool {
    s.split('.')
        .all(|octet| octet.parse::<u16>().is_ok_and(|n| n <= 255))
}

fn extract_status(line: &str) -> Option<u16> {
    let caps = RE_STATUS_COMBINED
        .captures(line)
        .or_else(|| RE_STATUS_FIELD.captures(line))?;
    let code: u16 = caps.get(1)?.as_str().parse().ok()?;
    (100..=599).contains(&code).then_some(code)
}

fn extract_path(line: &str) -> Option<String> {
    if let Some(caps) = RE_REQUEST.captures(line) {
        return Some(caps.get(2)?.as_str().to_owned());
    }
    RE_PATH_FIELD
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_owned())
}

fn extract_username(line: &str) -> Option<String> {
    if let Some(caps) = RE_USER_FIELD.captures(line) {
        return Some(caps.get(1)?.as_str().to_owned());
    }
    RE_USER_SSH
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_owned())
}

/// Apache, ISO-8601, syslog 순으로 타임스탬프 파싱을 시도합니다.
///
/// 파싱 불가능한 라인은 `None` — 버스트 윈도우 통계에서만 제외됩니다.
/// 현재 시각으로 대체하지 않습니다 (결정성 유지).
fn extract_timestamp(line: &str) -> Option<DateTime<Utc>> {
    if let Some(caps) = RE_TS_APACHE.captures(line) {
        let base = caps.get(1)?.as_str();
        if let Some(offset) = caps.get(2) {
            let joined = format!("{}{}", base, offset.as_str());
            if let Ok(dt) = DateTime::parse_from_str(joined.trim(), "%d/%b/%Y:%H:%M:%S %z") {
                return Some(dt.with_timezone(&Utc));
            }
            let joined = format!("{} {}", base, offset.as_str().trim());
            if let Ok(dt) = DateTime::parse_from_str(&joined, "%d/%b/%Y:%H:%M:%S %z") {
                return Some(dt.with_timezone(&Utc));
            }
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(base, "%d/%b/%Y:%H:%M:%S") {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    if let Some(caps) = RE_TS_ISO.captures(line) {
        let joined = format!("{} {}", caps.get(1)?.as_str(), caps.get(2)?.as_str());
        if let Ok(naive) = NaiveDateTime::parse_from_str(&joined, "%Y-%m-%d %H:%M:%S") {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    if let Some(caps) = RE_TS_SYSLOG.captures(line) {
        // syslog는 연도가 없으므로 현재 연도를 가정합니다.
        let joined = format!(
            "{} {} {} {}",
            caps.get(2)?.as_str(),
            caps.get(1)?.as_str(),
            Utc::now().year(),
            caps.get(3)?.as_str(),
        );
        if let Ok(naive) = NaiveDateTime::parse_from_str(&joined, "%d %b %Y %H:%M:%S") {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    None
}
