//! 인메모리 저장소 — 테스트/개발용 구현
//!
//! 단일 쓰기 락 아래에서 모든 연산을 수행하므로
//! `try_begin_analysis`의 compare-and-set이 자명하게 원자적입니다.
//! SQLite 구현과 동일한 의미론을 유지해야 합니다.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use logward_core::BoxFuture;
use logward_core::error::StorageError;
use logward_core::types::{AnalysisResult, Finding, FindingSource, Upload, UploadStatus};

use crate::query::{FindingFilter, FindingsPage, PageRequest, finding_sort_key};
use crate::store::{AnalysisStore, BeginAnalysis};

#[derive(Default)]
struct Inner {
    uploads: HashMap<String, Upload>,
    /// upload_id -> AnalysisResult (1:1)
    results: HashMap<String, AnalysisResult>,
    findings: Vec<Finding>,
}

/// 인메모리 [`AnalysisStore`] 구현
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 테스트 셋업용: 임의 상태의 업로드와 결과를 직접 심습니다.
    pub async fn seed(&self, upload: Upload, result: Option<AnalysisResult>) {
        let mut inner = self.inner.write().await;
        if let Some(result) = result {
            inner.results.insert(upload.id.clone(), result);
        }
        inner.uploads.insert(upload.id.clone(), upload);
    }

    /// 테스트 검증용: 저장된 전체 Finding 수
    pub async fn finding_count(&self) -> usize {
        self.inner.read().await.findings.len()
    }
}

impl AnalysisStore for MemoryStore {
    fn create_upload(&self, upload: Upload) -> BoxFuture<'_, Result<(), StorageError>> {
        Box::pin(async move {
            let mut inner = self.inner.write().await;
            inner.uploads.insert(upload.id.clone(), upload);
            Ok(())
        })
    }

    fn upload<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Option<Upload>, StorageError>> {
        Box::pin(async move { Ok(self.inner.read().await.uploads.get(id).cloned()) })
    }

    fn set_upload_status<'a>(
        &'a self,
        id: &'a str,
        status: UploadStatus,
    ) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            let mut inner = self.inner.write().await;
            match inner.uploads.get_mut(id) {
                Some(upload) => {
                    upload.status = status;
                    upload.updated_at = Utc::now();
                    Ok(())
                }
                None => Err(StorageError::Query(format!("no such upload: {id}"))),
            }
        })
    }

    fn try_begin_analysis<'a>(
        &'a self,
        upload_id: &'a str,
        reanalyze: bool,
    ) -> BoxFuture<'a, Result<BeginAnalysis, StorageError>> {
        Box::pin(async move {
            let mut inner = self.inner.write().await;

            let Some(status) = inner.uploads.get(upload_id).map(|u| u.status) else {
                return Ok(BeginAnalysis::NotFound);
            };

            let allowed = matches!(status, UploadStatus::Pending | UploadStatus::Failed)
                || (status == UploadStatus::Completed && reanalyze);

            if !allowed {
                return match status {
                    UploadStatus::Analyzing => Ok(BeginAnalysis::Conflict),
                    UploadStatus::Completed => {
                        let result = inner.results.get(upload_id).cloned().ok_or_else(|| {
                            StorageError::Integrity(format!(
                                "completed upload {upload_id} has no analysis result"
                            ))
                        })?;
                        Ok(BeginAnalysis::AlreadyCompleted(result))
                    }
                    _ => Err(StorageError::Integrity(format!(
                        "unexpected status {status} for upload {upload_id}"
                    ))),
                };
            }

            if let Some(upload) = inner.uploads.get_mut(upload_id) {
                upload.status = UploadStatus::Analyzing;
                upload.updated_at = Utc::now();
            }

            // 결과 생성 또는 리셋 (같은 id 유지)
            let result = inner
                .results
                .entry(upload_id.to_owned())
                .and_modify(|r| {
                    r.rule_based_completed = false;
                    r.status = UploadStatus::Analyzing;
                    r.error = None;
                    r.updated_at = Utc::now();
                })
                .or_insert_with(|| AnalysisResult::new(upload_id))
                .clone();

            Ok(BeginAnalysis::Started(result))
        })
    }

    fn result_for_upload<'a>(
        &'a self,
        upload_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<AnalysisResult>, StorageError>> {
        Box::pin(async move { Ok(self.inner.read().await.results.get(upload_id).cloned()) })
    }

    fn ensure_result<'a>(
        &'a self,
        upload_id: &'a str,
    ) -> BoxFuture<'a, Result<AnalysisResult, StorageError>> {
        Box::pin(async move {
            let mut inner = self.inner.write().await;
            if !inner.uploads.contains_key(upload_id) {
                return Err(StorageError::Query(format!("no such upload: {upload_id}")));
            }
            Ok(inner
                .results
                .entry(upload_id.to_owned())
                .or_insert_with(|| AnalysisResult::new(upload_id))
                .clone())
        })
    }

    fn mark_rule_phase_done<'a>(
        &'a self,
        result_id: &'a str,
    ) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            let mut inner = self.inner.write().await;
            let result = inner
                .results
                .values_mut()
                .find(|r| r.id == result_id)
                .ok_or_else(|| {
                    StorageError::Query(format!("no such analysis result: {result_id}"))
                })?;
            result.rule_based_completed = true;
            result.updated_at = Utc::now();

            // 단계 경계는 업로드 updated_at도 갱신 (stall 판정 하트비트)
            let upload_id = result.upload_id.clone();
            if let Some(upload) = inner.uploads.get_mut(&upload_id) {
                upload.updated_at = Utc::now();
            }
            Ok(())
        })
    }

    fn finish_analysis<'a>(
        &'a self,
        upload_id: &'a str,
        result_id: &'a str,
    ) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            let mut inner = self.inner.write().await;
            if let Some(result) = inner.results.values_mut().find(|r| r.id == result_id) {
                result.status = UploadStatus::Completed;
                result.updated_at = Utc::now();
            }
            match inner.uploads.get_mut(upload_id) {
                Some(upload) => {
                    upload.status = UploadStatus::Completed;
                    upload.updated_at = Utc::now();
                    Ok(())
                }
                None => Err(StorageError::Query(format!("no such upload: {upload_id}"))),
            }
        })
    }

    fn fail_analysis<'a>(
        &'a self,
        upload_id: &'a str,
        result_id: &'a str,
        error: &'a str,
    ) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            let mut inner = self.inner.write().await;
            if let Some(result) = inner.results.values_mut().find(|r| r.id == result_id) {
                result.status = UploadStatus::Failed;
                result.error = Some(error.to_owned());
                result.updated_at = Utc::now();
            }
            match inner.uploads.get_mut(upload_id) {
                Some(upload) => {
                    upload.status = UploadStatus::Failed;
                    upload.updated_at = Utc::now();
                    Ok(())
                }
                None => Err(StorageError::Query(format!("no such upload: {upload_id}"))),
            }
        })
    }

    fn insert_findings(
        &self,
        findings: Vec<Finding>,
    ) -> BoxFuture<'_, Result<usize, StorageError>> {
        Box::pin(async move {
            let mut inner = self.inner.write().await;
            let mut existing: HashSet<(String, String)> = inner
                .findings
                .iter()
                .map(|f| (f.analysis_result_id.clone(), f.fingerprint.clone()))
                .collect();

            let mut inserted = 0;
            for finding in findings {
                let key = (finding.analysis_result_id.clone(), finding.fingerprint.clone());
                if existing.insert(key) {
                    inner.findings.push(finding);
                    inserted += 1;
                }
            }
            Ok(inserted)
        })
    }

    fn delete_findings<'a>(
        &'a self,
        result_id: &'a str,
        source: FindingSource,
    ) -> BoxFuture<'a, Result<u64, StorageError>> {
        Box::pin(async move {
            let mut inner = self.inner.write().await;
            let before = inner.findings.len();
            inner
                .findings
                .retain(|f| !(f.analysis_result_id == result_id && f.source == source));
            Ok((before - inner.findings.len()) as u64)
        })
    }

    fn fingerprints_for_result<'a>(
        &'a self,
        result_id: &'a str,
    ) -> BoxFuture<'a, Result<HashSet<String>, StorageError>> {
        Box::pin(async move {
            Ok(self
                .inner
                .read()
                .await
                .findings
                .iter()
                .filter(|f| f.analysis_result_id == result_id)
                .map(|f| f.fingerprint.clone())
                .collect())
        })
    }

    fn findings_for_result<'a>(
        &'a self,
        result_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Finding>, StorageError>> {
        Box::pin(async move {
            let mut items: Vec<Finding> = self
                .inner
                .read()
                .await
                .findings
                .iter()
                .filter(|f| f.analysis_result_id == result_id)
                .cloned()
                .collect();
            items.sort_by_key(finding_sort_key);
            Ok(items)
        })
    }

    fn findings_page<'a>(
        &'a self,
        user_id: &'a str,
        filter: &'a FindingFilter,
        page: PageRequest,
    ) -> BoxFuture<'a, Result<FindingsPage, StorageError>> {
        Box::pin(async move {
            let inner = self.inner.read().await;

            // 호출자 소유 업로드의 결과 id 집합
            let owned_results: HashSet<&str> = inner
                .results
                .values()
                .filter(|r| {
                    inner
                        .uploads
                        .get(&r.upload_id)
                        .is_some_and(|u| u.user_id == user_id)
                })
                .map(|r| r.id.as_str())
                .collect();

            let mut items: Vec<Finding> = inner
                .findings
                .iter()
                .filter(|f| owned_results.contains(f.analysis_result_id.as_str()))
                .filter(|f| filter.matches(f))
                .cloned()
                .collect();
            items.sort_by_key(finding_sort_key);

            let total = items.len() as u64;
            let page = page.normalized();
            let offset = page.offset() as usize;
            let items = if offset >= items.len() {
                Vec::new()
            } else {
                items
                    .into_iter()
                    .skip(offset)
                    .take(page.limit as usize)
                    .collect()
            };

            Ok(FindingsPage {
                items,
                page: page.page,
                limit: page.limit,
                total,
            })
        })
    }

    fn uploads_in_analyzing(&self) -> BoxFuture<'_, Result<Vec<Upload>, StorageError>> {
        Box::pin(async move {
            Ok(self
                .inner
                .read()
                .await
                .uploads
                .values()
                .filter(|u| u.status == UploadStatus::Analyzing)
                .cloned()
                .collect())
        })
    }

    fn stalled_uploads(
        &self,
        older_than: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<Vec<Upload>, StorageError>> {
        Box::pin(async move {
            Ok(self
                .inner
                .read()
                .await
                .uploads
                .values()
                .filter(|u| u.status == UploadStatus::Analyzing && u.updated_at < older_than)
                .cloned()
                .collect())
        })
    }
}
