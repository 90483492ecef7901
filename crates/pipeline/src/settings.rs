//! 설정 협력자 인터페이스 — 사용자별 LLM 오버라이드 해석
//!
//! 자격증명의 암호화 저장/마스킹 읽기는 제외된 협력자의 몫입니다.
//! 파이프라인이 소비하는 것은 "해석 완료된 오버라이드" 하나뿐이므로
//! 그 인터페이스만 모델링합니다. 오케스트레이터는 저장된 원시
//! 자격증명에 직접 접근하지 않습니다.

use logward_core::BoxFuture;
use logward_core::error::StorageError;
use logward_core::types::LlmOverride;

/// 사용자 설정 협력자 계약
pub trait SettingsProvider: Send + Sync {
    /// 사용자의 저장된 LLM 오버라이드를 해석하여 반환합니다.
    ///
    /// `None`이면 환경변수 기본 자격증명으로 폴백합니다.
    fn llm_override<'a>(
        &'a self,
        user_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<LlmOverride>, StorageError>>;
}

/// 저장 설정이 없는 배포용 구현 — 항상 환경변수 폴백
pub struct EnvSettings;

impl SettingsProvider for EnvSettings {
    fn llm_override<'a>(
        &'a self,
        _user_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<LlmOverride>, StorageError>> {
        Box::pin(async { Ok(None) })
    }
}
