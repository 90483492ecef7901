//! 분석 크레이트 에러 타입

/// 분석 도메인 에러
///
/// 패턴 로딩/검증, 정규식 컴파일 등 분석 구성 단계의 에러를 포괄합니다.
/// 분석 실행 자체(매칭, 집계)는 실패하지 않는 순수 연산입니다.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// 패턴 파일 로딩 실패
    #[error("pattern load error: {path}: {reason}")]
    PatternLoad {
        /// 패턴 파일 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// 패턴 유효성 검증 실패
    #[error("pattern validation error: pattern '{label}': {reason}")]
    PatternValidation {
        /// 문제가 된 패턴 레이블
        label: String,
        /// 검증 실패 사유
        reason: String,
    },

    /// 정규식 컴파일 에러
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
