//! 통합 테스트 — 파이프라인 전체 흐름 검증
//!
//! 실행은 요청과 분리된 백그라운드 태스크이므로, 테스트는 반환값이
//! 아니라 저장소의 영속 상태를 폴링하여 완료를 관측합니다.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use logward_analysis::llm::{LlmFinding, LlmProvider, LogChunk};
use logward_core::BoxFuture;
use logward_core::config::LogwardConfig;
use logward_core::error::{ProviderError, ProviderErrorKind};
use logward_core::types::{
    AnalysisResult, Finding, FindingCategory, FindingSource, Severity, Upload, UploadStatus,
};
use logward_pipeline::{AnalysisService, AnalyzeOutcome, FsContentSource, ServiceError};
use logward_store::{AnalysisStore, FindingFilter, MemoryStore, PageRequest};

/// 스크립트된 응답을 반환하는 테스트 프로바이더
struct MockProvider {
    findings: Vec<LlmFinding>,
    fail_all: bool,
    calls: AtomicUsize,
}

impl MockProvider {
    fn returning(findings: Vec<LlmFinding>) -> Arc<Self> {
        Arc::new(Self {
            findings,
            fail_all: false,
            calls: AtomicUsize::new(0),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            findings: Vec::new(),
            fail_all: true,
            calls: AtomicUsize::new(0),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn analyze_chunk<'a>(
        &'a self,
        _chunk: &'a LogChunk,
    ) -> BoxFuture<'a, Result<Vec<LlmFinding>, ProviderError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            if self.fail_all {
                return Err(ProviderError::new(
                    ProviderErrorKind::Timeout,
                    "mock",
                    "scripted timeout",
                ));
            }
            Ok(self.findings.clone())
        })
    }
}

fn llm_finding(category: FindingCategory, evidence: &str, line: Option<u64>) -> LlmFinding {
    LlmFinding {
        category,
        severity: Severity::High,
        title: format!("{category} via contextual analysis"),
        description: "mock rationale".to_owned(),
        line_number: line,
        confidence: Some(0.7),
        mitre_tactic: Some("Credential Access".to_owned()),
        mitre_technique: Some("T1110".to_owned()),
        evidence: Some(evidence.to_owned()),
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    service: AnalysisService,
    dir: tempfile::TempDir,
}

impl Harness {
    fn new(configure: impl FnOnce(&mut LogwardConfig), provider: Option<Arc<MockProvider>>) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = Arc::new(MemoryStore::new());

        let mut config = LogwardConfig::default();
        configure(&mut config);

        let mut builder = AnalysisService::builder(config)
            .store(Arc::clone(&store) as Arc<dyn AnalysisStore>)
            .content_source(Arc::new(FsContentSource::new(dir.path(), 16 * 1024 * 1024)));
        if let Some(provider) = provider {
            builder = builder.llm_provider(provider);
        }

        Self {
            store,
            service: builder.build().expect("service builds"),
            dir,
        }
    }

    /// 업로드를 생성하고 콘텐츠 파일을 씁니다.
    async fn upload_with_content(&self, user: &str, content: &str) -> String {
        let upload = Upload::new(user, "test.log", content.len() as u64);
        let id = upload.id.clone();
        tokio::fs::write(self.dir.path().join(&id), content)
            .await
            .expect("write content");
        self.store.create_upload(upload).await.expect("create upload");
        id
    }

    async fn wait_for_terminal(&self, upload_id: &str) -> UploadStatus {
        for _ in 0..500 {
            if let Some(upload) = self.store.upload(upload_id).await.unwrap() {
                if matches!(upload.status, UploadStatus::Completed | UploadStatus::Failed) {
                    return upload.status;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("upload {upload_id} did not reach a terminal state");
    }

    async fn findings(&self, upload_id: &str) -> Vec<Finding> {
        let result = self
            .store
            .result_for_upload(upload_id)
            .await
            .unwrap()
            .expect("analysis result exists");
        self.store.findings_for_result(&result.id).await.unwrap()
    }
}

fn no_llm(config: &mut LogwardConfig) {
    config.llm.enabled = false;
}

/// 스펙 시나리오: 같은 IP에서 6명의 사용자로 12회 로그인 실패
/// → 브루트포스(HIGH, 0.9)와 패스워드 스프레이(CRITICAL, 0.95) 둘 다
#[tokio::test]
async fn end_to_end_brute_force_and_password_spray() {
    let harness = Harness::new(no_llm, None);

    let users = ["alice", "foo2", "foo3", "foo4", "foo5", "foo6"];
    let content: String = (0..12)
        .map(|i| format!("login failed user={} ip=203.0.113.5\n", users[i % 6]))
        .collect();
    let id = harness.upload_with_content("u1", &content).await;

    let outcome = harness
        .service
        .request_analysis("u1", &id, false)
        .await
        .unwrap();
    assert!(matches!(outcome, AnalyzeOutcome::Accepted { .. }));

    assert_eq!(harness.wait_for_terminal(&id).await, UploadStatus::Completed);

    let findings = harness.findings(&id).await;
    let brute = findings
        .iter()
        .find(|f| f.category == FindingCategory::BruteForce && f.line_number.is_none())
        .expect("brute force finding");
    assert_eq!(brute.severity, Severity::High);
    assert_eq!(brute.confidence, Some(0.9));

    let spray = findings
        .iter()
        .find(|f| f.category == FindingCategory::PasswordSpray)
        .expect("password spray finding");
    assert_eq!(spray.severity, Severity::Critical);
    assert_eq!(spray.confidence, Some(0.95));
}

/// 스펙 시나리오: 정상 트래픽 속 한 IP의 404 응답 25건
/// → 디렉토리 열거 Finding 정확히 하나 (라인별 중복 없음)
#[tokio::test]
async fn end_to_end_directory_enumeration_single_finding() {
    let harness = Harness::new(no_llm, None);

    let mut lines: Vec<String> = (0..25)
        .map(|i| format!(r#"203.0.113.9 - - [01/Feb/2025:10:{:02}:00 +0000] "GET /probe{i} HTTP/1.1" 404 152"#, i % 60))
        .collect();
    // 정상 트래픽
    for i in 0..30 {
        lines.push(format!(
            r#"198.51.100.{} - - [01/Feb/2025:11:00:00 +0000] "GET /home HTTP/1.1" 200 1024"#,
            i % 10 + 1
        ));
    }
    let id = harness.upload_with_content("u1", &lines.join("\n")).await;

    harness.service.request_analysis("u1", &id, false).await.unwrap();
    assert_eq!(harness.wait_for_terminal(&id).await, UploadStatus::Completed);

    let findings = harness.findings(&id).await;
    let enumeration: Vec<_> = findings
        .iter()
        .filter(|f| {
            f.category == FindingCategory::DirectoryTraversal && f.line_number.is_none()
        })
        .collect();
    assert_eq!(enumeration.len(), 1, "exactly one enumeration finding");
    assert_eq!(enumeration[0].severity, Severity::High);
    assert_eq!(enumeration[0].confidence, Some(0.85));
}

/// 중복 제거 법칙: 규칙과 LLM이 같은 핑거프린트를 보고하면
/// RULE_BASED 하나만 남는다
#[tokio::test]
async fn merge_law_rule_based_wins_shared_fingerprint() {
    // 규칙 엔진이 1번 라인에서 "union select"를 매칭할 내용
    let content = "GET /items?id=1+UNION+SELECT+password+FROM+users HTTP/1.1\n";

    // 규칙 엔진과 같은 근거/라인을 보고하는 LLM — 핑거프린트 충돌
    let duplicate = llm_finding(
        FindingCategory::SqlInjection,
        "UNION+SELECT",
        Some(1),
    );
    // 새로운 근거 — 살아남아야 함
    let novel = llm_finding(FindingCategory::DataExfiltration, "bulk export", Some(1));
    let provider = MockProvider::returning(vec![duplicate, novel]);

    let harness = Harness::new(|_| {}, Some(Arc::clone(&provider)));
    let id = harness.upload_with_content("u1", content).await;

    harness.service.request_analysis("u1", &id, false).await.unwrap();
    assert_eq!(harness.wait_for_terminal(&id).await, UploadStatus::Completed);
    assert!(provider.call_count() > 0, "llm provider was invoked");

    let findings = harness.findings(&id).await;

    // 충돌 핑거프린트는 RULE_BASED 하나만
    let sqli_line1: Vec<_> = findings
        .iter()
        .filter(|f| f.category == FindingCategory::SqlInjection && f.line_number == Some(1))
        .collect();
    assert_eq!(sqli_line1.len(), 1);
    assert_eq!(sqli_line1[0].source, FindingSource::RuleBased);

    // 새로운 LLM Finding은 유지
    assert!(
        findings
            .iter()
            .any(|f| f.category == FindingCategory::DataExfiltration
                && f.source == FindingSource::Llm)
    );
}

/// 재개 가능성: rule_based_completed=true인 결과는 LLM 단계만 재진입하며
/// 규칙 Finding을 중복 생성하지 않는다
#[tokio::test]
async fn resume_with_durable_rule_phase_reenters_llm_only() {
    let provider = MockProvider::returning(vec![llm_finding(
        FindingCategory::Xss,
        "resumed evidence",
        None,
    )]);
    let harness = Harness::new(|_| {}, Some(Arc::clone(&provider)));

    // 브루트포스를 유발하는 콘텐츠로 중단된 분석 상태를 구성
    let content: String = (0..12)
        .map(|_| "login failed user=alice ip=203.0.113.5\n".to_owned())
        .collect();
    let id = harness.upload_with_content("u1", &content).await;

    // 규칙 단계까지 끝난 중단 상태 시뮬레이션:
    // 업로드 ANALYZING + rule_based_completed=true + 규칙 Finding 저장됨
    let mut upload = harness.store.upload(&id).await.unwrap().unwrap();
    upload.status = UploadStatus::Analyzing;
    let mut result = AnalysisResult::new(&id);
    result.rule_based_completed = true;
    let result_id = result.id.clone();
    harness.store.seed(upload, Some(result)).await;

    let rule_findings = vec![Finding {
        id: uuid::Uuid::new_v4().to_string(),
        analysis_result_id: result_id.clone(),
        severity: Severity::High,
        category: FindingCategory::BruteForce,
        title: "Brute force authentication attack from 203.0.113.5".to_owned(),
        description: "12 failed attempts".to_owned(),
        line_number: None,
        line_content: None,
        matched_pattern: None,
        source: FindingSource::RuleBased,
        fingerprint: Finding::fingerprint_of(
            FindingCategory::BruteForce,
            "brute_force:203.0.113.5",
            None,
        ),
        confidence: Some(0.9),
        mitre_tactic: None,
        mitre_technique: None,
        event_timestamp: None,
        created_at: chrono::Utc::now(),
    }];
    harness.store.insert_findings(rule_findings).await.unwrap();
    let before = harness.store.finding_count().await;

    harness.service.resume(&id).await.unwrap();

    assert_eq!(harness.wait_for_terminal(&id).await, UploadStatus::Completed);
    assert!(provider.call_count() > 0, "llm phase ran");

    let findings = harness.findings(&id).await;
    // 규칙 Finding은 그대로 하나, LLM Finding 하나 추가
    let brute_count = findings
        .iter()
        .filter(|f| f.category == FindingCategory::BruteForce && f.line_number.is_none())
        .count();
    assert_eq!(brute_count, 1, "no duplicate rule-based findings after resume");
    assert_eq!(harness.store.finding_count().await, before + 1);
}

/// 재개 가능성: rule_based_completed=false면 규칙 단계부터 재시작하고
/// 중단 실행의 부분 결과를 폐기한다
#[tokio::test]
async fn resume_without_durable_marker_restarts_rule_phase() {
    let harness = Harness::new(no_llm, None);

    let content: String = (0..12)
        .map(|_| "login failed user=alice ip=203.0.113.5\n".to_owned())
        .collect();
    let id = harness.upload_with_content("u1", &content).await;

    // 규칙 단계 도중 중단된 상태: 마커 없음, 부분 Finding 존재
    let mut upload = harness.store.upload(&id).await.unwrap().unwrap();
    upload.status = UploadStatus::Analyzing;
    let result = AnalysisResult::new(&id);
    let result_id = result.id.clone();
    harness.store.seed(upload, Some(result)).await;

    harness
        .store
        .insert_findings(vec![Finding {
            id: uuid::Uuid::new_v4().to_string(),
            analysis_result_id: result_id.clone(),
            severity: Severity::Low,
            category: FindingCategory::BruteForce,
            title: "partial marker from interrupted run".to_owned(),
            description: String::new(),
            line_number: Some(999),
            line_content: None,
            matched_pattern: None,
            source: FindingSource::RuleBased,
            fingerprint: "stale|partial|999".to_owned(),
            confidence: None,
            mitre_tactic: None,
            mitre_technique: None,
            event_timestamp: None,
            created_at: chrono::Utc::now(),
        }])
        .await
        .unwrap();

    harness.service.resume(&id).await.unwrap();
    assert_eq!(harness.wait_for_terminal(&id).await, UploadStatus::Completed);

    let findings = harness.findings(&id).await;
    // 중단 실행의 부분 결과는 폐기됨
    assert!(
        !findings.iter().any(|f| f.fingerprint == "stale|partial|999"),
        "partial findings from the interrupted run are discarded"
    );
    // 재생성된 규칙 Finding 존재
    assert!(
        findings
            .iter()
            .any(|f| f.category == FindingCategory::BruteForce && f.line_number.is_none())
    );
}

/// LLM 전면 실패는 부분 커버리지로 강등 — 업로드는 COMPLETED
#[tokio::test]
async fn llm_failures_degrade_but_analysis_completes() {
    let provider = MockProvider::failing();
    let harness = Harness::new(|_| {}, Some(Arc::clone(&provider)));

    let content = "GET /items?id=1+UNION+SELECT+1 HTTP/1.1\n";
    let id = harness.upload_with_content("u1", content).await;

    harness.service.request_analysis("u1", &id, false).await.unwrap();
    assert_eq!(harness.wait_for_terminal(&id).await, UploadStatus::Completed);
    assert!(provider.call_count() > 0);

    // 규칙 기반 결과는 존재
    let findings = harness.findings(&id).await;
    assert!(findings.iter().all(|f| f.source == FindingSource::RuleBased));
    assert!(!findings.is_empty());
}

/// 재분석: COMPLETED 업로드는 reanalyze=true로만 재진입하며,
/// 핑거프린트 멱등성으로 Finding이 불어나지 않는다
#[tokio::test]
async fn reanalysis_is_idempotent() {
    let harness = Harness::new(no_llm, None);

    let content: String = (0..12)
        .map(|_| "login failed user=alice ip=203.0.113.5\n".to_owned())
        .collect();
    let id = harness.upload_with_content("u1", &content).await;

    harness.service.request_analysis("u1", &id, false).await.unwrap();
    assert_eq!(harness.wait_for_terminal(&id).await, UploadStatus::Completed);
    let first_count = harness.findings(&id).await.len();
    assert!(first_count > 0);

    // reanalyze 없이 → 기존 결과 반환
    let outcome = harness
        .service
        .request_analysis("u1", &id, false)
        .await
        .unwrap();
    assert!(matches!(outcome, AnalyzeOutcome::AlreadyCompleted { .. }));

    // reanalyze → 재실행, 같은 핑거프린트 집합
    let outcome = harness
        .service
        .request_analysis("u1", &id, true)
        .await
        .unwrap();
    assert!(matches!(outcome, AnalyzeOutcome::Accepted { .. }));
    assert_eq!(harness.wait_for_terminal(&id).await, UploadStatus::Completed);

    assert_eq!(harness.findings(&id).await.len(), first_count);
}

/// 수락 제어: N번 허용 후 N+1번째는 retry_after_ms > 0으로 거부
#[tokio::test]
async fn admission_guard_rejects_after_quota() {
    let harness = Harness::new(
        |config| {
            config.llm.enabled = false;
            config.admission.max_requests = 2;
            config.admission.window_secs = 3600;
        },
        None,
    );

    let id = harness.upload_with_content("u1", "benign line\n").await;

    harness.service.request_analysis("u1", &id, false).await.unwrap();
    harness.wait_for_terminal(&id).await;
    let _ = harness.service.request_analysis("u1", &id, true).await;

    let err = harness
        .service
        .request_analysis("u1", &id, true)
        .await
        .unwrap_err();
    match err {
        ServiceError::RateLimited { retry_after_ms } => assert!(retry_after_ms > 0),
        other => panic!("expected RateLimited, got {other}"),
    }
}

/// Finding 조회: 소유자 스코프 + 정렬 계약 (CRITICAL 우선)
#[tokio::test]
async fn findings_listing_scoped_and_ordered() {
    let harness = Harness::new(no_llm, None);

    let users = ["alice", "foo2", "foo3", "foo4", "foo5", "foo6"];
    let content: String = (0..12)
        .map(|i| format!("login failed user={} ip=203.0.113.5\n", users[i % 6]))
        .collect();
    let id = harness.upload_with_content("owner", &content).await;

    harness
        .service
        .request_analysis("owner", &id, false)
        .await
        .unwrap();
    assert_eq!(harness.wait_for_terminal(&id).await, UploadStatus::Completed);

    let page = harness
        .service
        .list_findings("owner", &FindingFilter::default(), PageRequest::default())
        .await
        .unwrap();
    assert!(page.total > 0);
    // CRITICAL(스프레이)이 맨 앞
    assert_eq!(page.items[0].severity, Severity::Critical);
    // 심각도 내림차순 유지
    for pair in page.items.windows(2) {
        assert!(pair[0].severity >= pair[1].severity);
    }

    // 타인에게는 보이지 않음
    let empty = harness
        .service
        .list_findings("stranger", &FindingFilter::default(), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(empty.total, 0);
}
