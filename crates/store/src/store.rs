//! 저장소 trait — 파이프라인이 의존하는 영속 연산 계약
//!
//! 구현체는 `Arc<dyn AnalysisStore>`로 주입되므로 모든 비동기 메서드는
//! [`BoxFuture`]를 반환합니다.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use logward_core::BoxFuture;
use logward_core::error::StorageError;
use logward_core::types::{AnalysisResult, Finding, FindingSource, Upload, UploadStatus};

use crate::query::{FindingFilter, FindingsPage, PageRequest};

/// `try_begin_analysis`의 결과
///
/// PENDING/FAILED(또는 재분석 허용 시 COMPLETED) → ANALYZING 전환을
/// 단일 원자적 compare-and-set으로 시도한 결과입니다.
#[derive(Debug)]
pub enum BeginAnalysis {
    /// 전환 성공 — 결과 레코드가 생성/리셋됨
    Started(AnalysisResult),
    /// 이미 COMPLETED이고 재분석을 요청하지 않음 — 기존 결과 반환
    AlreadyCompleted(AnalysisResult),
    /// 이미 ANALYZING — 동시 실행 거부
    Conflict,
    /// 해당 업로드 없음
    NotFound,
}

/// 분석 파이프라인의 영속 연산 계약
///
/// 완료/실패는 오직 이 저장소의 상태로만 관측됩니다 — 파이프라인
/// 실행은 호출자 연결과 분리되어 있기 때문입니다.
pub trait AnalysisStore: Send + Sync {
    /// 업로드 레코드를 생성합니다.
    fn create_upload(&self, upload: Upload) -> BoxFuture<'_, Result<(), StorageError>>;

    /// 업로드를 조회합니다.
    fn upload<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Option<Upload>, StorageError>>;

    /// 업로드 상태를 설정하고 `updated_at`을 갱신합니다.
    ///
    /// PENDING→ANALYZING 전환에는 사용하지 않습니다 — 그 전환은
    /// [`try_begin_analysis`](Self::try_begin_analysis)만 수행합니다.
    fn set_upload_status<'a>(
        &'a self,
        id: &'a str,
        status: UploadStatus,
    ) -> BoxFuture<'a, Result<(), StorageError>>;

    /// ANALYZING 전환을 원자적 조건부 갱신으로 시도합니다.
    ///
    /// 성공 시 결과 레코드를 생성하거나 리셋합니다
    /// (`rule_based_completed = false`, `error = NULL`).
    fn try_begin_analysis<'a>(
        &'a self,
        upload_id: &'a str,
        reanalyze: bool,
    ) -> BoxFuture<'a, Result<BeginAnalysis, StorageError>>;

    /// 업로드의 분석 결과를 조회합니다.
    fn result_for_upload<'a>(
        &'a self,
        upload_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<AnalysisResult>, StorageError>>;

    /// 업로드의 분석 결과를 조회하고, 없으면 생성합니다 (재개 경로).
    fn ensure_result<'a>(
        &'a self,
        upload_id: &'a str,
    ) -> BoxFuture<'a, Result<AnalysisResult, StorageError>>;

    /// 규칙 단계 완료를 내구성 있게 기록합니다.
    fn mark_rule_phase_done<'a>(
        &'a self,
        result_id: &'a str,
    ) -> BoxFuture<'a, Result<(), StorageError>>;

    /// 분석 완료: 업로드와 결과를 COMPLETED로 설정합니다.
    fn finish_analysis<'a>(
        &'a self,
        upload_id: &'a str,
        result_id: &'a str,
    ) -> BoxFuture<'a, Result<(), StorageError>>;

    /// 분석 실패: 업로드와 결과를 FAILED로 설정하고 에러를 기록합니다.
    fn fail_analysis<'a>(
        &'a self,
        upload_id: &'a str,
        result_id: &'a str,
        error: &'a str,
    ) -> BoxFuture<'a, Result<(), StorageError>>;

    /// Finding을 저장합니다.
    ///
    /// `(analysis_result_id, fingerprint)`가 이미 존재하는 항목은
    /// 무시됩니다. 실제로 삽입된 수를 반환합니다.
    fn insert_findings(
        &self,
        findings: Vec<Finding>,
    ) -> BoxFuture<'_, Result<usize, StorageError>>;

    /// 결과의 특정 출처 Finding을 삭제합니다 (규칙 단계 재시작 시 사용).
    fn delete_findings<'a>(
        &'a self,
        result_id: &'a str,
        source: FindingSource,
    ) -> BoxFuture<'a, Result<u64, StorageError>>;

    /// 결과에 저장된 핑거프린트 집합을 반환합니다.
    fn fingerprints_for_result<'a>(
        &'a self,
        result_id: &'a str,
    ) -> BoxFuture<'a, Result<HashSet<String>, StorageError>>;

    /// 결과의 전체 Finding을 반환합니다 (정렬 계약 적용).
    fn findings_for_result<'a>(
        &'a self,
        result_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Finding>, StorageError>>;

    /// 호출자 소유 업로드로 스코프된 Finding 페이지를 반환합니다.
    fn findings_page<'a>(
        &'a self,
        user_id: &'a str,
        filter: &'a FindingFilter,
        page: PageRequest,
    ) -> BoxFuture<'a, Result<FindingsPage, StorageError>>;

    /// ANALYZING 상태의 모든 업로드 (기동 스윕)
    fn uploads_in_analyzing(&self) -> BoxFuture<'_, Result<Vec<Upload>, StorageError>>;

    /// `older_than`보다 오래 갱신이 없는 ANALYZING 업로드 (stall 스윕)
    fn stalled_uploads(
        &self,
        older_than: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<Vec<Upload>, StorageError>>;
}
