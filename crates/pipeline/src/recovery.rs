//! 복구 스케줄러 — 중단된 분석의 기동/주기 스윕
//!
//! 두 스케줄을 실행합니다:
//! 1. 기동 스윕: 시작 직후 ANALYZING 상태의 모든 업로드를 재개
//! 2. stall 스윕: 주기적으로(`sweep_interval_secs`) 마지막 갱신이
//!    `stall_threshold_secs`보다 오래된 ANALYZING 업로드를 재개
//!
//! 명시적 수명주기를 갖습니다: [`start`](RecoveryScheduler::start)가
//! 태스크를 스폰하고 [`stop`](RecoveryScheduler::stop)이
//! `CancellationToken`으로 종료합니다. 개별 재개 실패는 로그만 남기고
//! 스윕을 중단하지 않습니다.

use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use logward_core::config::RecoveryConfig;
use logward_core::metrics as m;

use crate::service::AnalysisService;

/// 복구 스케줄러
pub struct RecoveryScheduler {
    service: AnalysisService,
    sweep_interval: Duration,
    stall_threshold: chrono::Duration,
    cancel: CancellationToken,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl RecoveryScheduler {
    pub fn new(service: AnalysisService, config: &RecoveryConfig) -> Self {
        Self {
            service,
            sweep_interval: Duration::from_secs(config.sweep_interval_secs),
            stall_threshold: chrono::Duration::seconds(config.stall_threshold_secs as i64),
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    /// 스케줄러 태스크를 시작합니다. 중복 호출은 no-op입니다.
    pub fn start(&mut self) {
        if self.task.is_some() {
            tracing::warn!("recovery scheduler already started");
            return;
        }

        let service = self.service.clone();
        let sweep_interval = self.sweep_interval;
        let stall_threshold = self.stall_threshold;
        let cancel = self.cancel.clone();

        self.task = Some(tokio::spawn(async move {
            // 기동 스윕: ANALYZING 전체
            startup_sweep(&service).await;

            let mut interval = tokio::time::interval(sweep_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // 첫 tick은 즉시 발화하므로 소비
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        stall_sweep(&service, stall_threshold).await;
                    }
                    _ = cancel.cancelled() => {
                        tracing::info!("recovery scheduler shutting down");
                        break;
                    }
                }
            }
        }));

        tracing::info!(
            sweep_interval_secs = self.sweep_interval.as_secs(),
            stall_threshold_secs = self.stall_threshold.num_seconds(),
            "recovery scheduler started"
        );
    }

    /// 스케줄러를 정지하고 태스크 종료를 기다립니다.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "recovery scheduler task join failed");
            }
        }
    }

    /// 실행 중 여부 (테스트용)
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

/// 기동 스윕: ANALYZING 상태 전체를 재개합니다.
async fn startup_sweep(service: &AnalysisService) {
    metrics::counter!(m::RECOVERY_SWEEPS_TOTAL).increment(1);

    let uploads = match service.store().uploads_in_analyzing().await {
        Ok(uploads) => uploads,
        Err(e) => {
            tracing::error!(error = %e, "startup sweep query failed");
            return;
        }
    };

    if !uploads.is_empty() {
        tracing::info!(count = uploads.len(), "startup sweep found interrupted analyses");
    }
    resume_all(service, uploads).await;
}

/// stall 스윕: 임계값보다 오래 갱신이 없는 ANALYZING 업로드를 재개합니다.
async fn stall_sweep(service: &AnalysisService, stall_threshold: chrono::Duration) {
    metrics::counter!(m::RECOVERY_SWEEPS_TOTAL).increment(1);

    let cutoff = Utc::now() - stall_threshold;
    let uploads = match service.store().stalled_uploads(cutoff).await {
        Ok(uploads) => uploads,
        Err(e) => {
            tracing::error!(error = %e, "stall sweep query failed");
            return;
        }
    };

    if !uploads.is_empty() {
        tracing::info!(count = uploads.len(), "stall sweep found stalled analyses");
    }
    resume_all(service, uploads).await;
}

/// 각 업로드를 fire-and-forget으로 재개합니다.
///
/// 개별 실패는 로그만 남기고 나머지 업로드 처리를 계속합니다.
async fn resume_all(service: &AnalysisService, uploads: Vec<logward_core::types::Upload>) {
    for upload in uploads {
        metrics::counter!(m::RECOVERY_RESUMED_TOTAL).increment(1);
        let service = service.clone();
        tokio::spawn(async move {
            if let Err(e) = service.resume(&upload.id).await {
                tracing::error!(
                    upload_id = %upload.id,
                    error = %e,
                    "failed to resume interrupted analysis"
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logward_core::config::LogwardConfig;
    use logward_core::types::{Upload, UploadStatus};
    use logward_store::{AnalysisStore, MemoryStore};
    use std::sync::Arc;

    use crate::content::FsContentSource;

    fn test_service(store: Arc<MemoryStore>, dir: &tempfile::TempDir) -> AnalysisService {
        let mut config = LogwardConfig::default();
        config.llm.enabled = false;
        AnalysisService::builder(config)
            .store(store)
            .content_source(Arc::new(FsContentSource::new(dir.path(), 1024 * 1024)))
            .build()
            .expect("service builds")
    }

    async fn wait_for_status(
        store: &MemoryStore,
        upload_id: &str,
        expected: UploadStatus,
    ) -> bool {
        for _ in 0..200 {
            if let Some(upload) = store.upload(upload_id).await.unwrap() {
                if upload.status == expected {
                    return true;
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn startup_sweep_resumes_interrupted_upload() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());

        // 중단된 것처럼 보이는 업로드 심기
        let mut upload = Upload::new("u1", "a.log", 1);
        upload.status = UploadStatus::Analyzing;
        let id = upload.id.clone();
        store.seed(upload, None).await;
        tokio::fs::write(dir.path().join(&id), "plain line\n")
            .await
            .unwrap();

        let service = test_service(Arc::clone(&store), &dir);
        let mut scheduler = RecoveryScheduler::new(service, &RecoveryConfig::default());
        scheduler.start();
        assert!(scheduler.is_running());

        assert!(
            wait_for_status(&store, &id, UploadStatus::Completed).await,
            "interrupted upload should be resumed to completion"
        );

        scheduler.stop().await;
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn sweep_failure_on_one_upload_does_not_block_others() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());

        // 콘텐츠 없는 업로드 (재개 시 FAILED로 수렴)
        let mut broken = Upload::new("u1", "broken.log", 1);
        broken.status = UploadStatus::Analyzing;
        let broken_id = broken.id.clone();
        store.seed(broken, None).await;

        // 정상 업로드
        let mut ok = Upload::new("u1", "ok.log", 1);
        ok.status = UploadStatus::Analyzing;
        let ok_id = ok.id.clone();
        store.seed(ok, None).await;
        tokio::fs::write(dir.path().join(&ok_id), "plain line\n")
            .await
            .unwrap();

        let service = test_service(Arc::clone(&store), &dir);
        let mut scheduler = RecoveryScheduler::new(service, &RecoveryConfig::default());
        scheduler.start();

        assert!(wait_for_status(&store, &ok_id, UploadStatus::Completed).await);
        assert!(wait_for_status(&store, &broken_id, UploadStatus::Failed).await);

        scheduler.stop().await;
    }

    #[tokio::test]
    async fn stop_without_start_is_harmless() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let service = test_service(store, &dir);
        let mut scheduler = RecoveryScheduler::new(service, &RecoveryConfig::default());
        scheduler.stop().await;
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn double_start_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let service = test_service(store, &dir);
        let mut scheduler = RecoveryScheduler::new(service, &RecoveryConfig::default());
        scheduler.start();
        scheduler.start(); // no-op
        assert!(scheduler.is_running());
        scheduler.stop().await;
    }
}
