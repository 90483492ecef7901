//! SQLite 저장소 — sqlx 기반 운영 구현
//!
//! 스키마는 기동 시 `CREATE TABLE IF NOT EXISTS`로 초기화합니다.
//! 핵심 제약:
//! - `analysis_results.upload_id` UNIQUE (업로드와 1:1)
//! - `findings (analysis_result_id, fingerprint)` UNIQUE +
//!   `INSERT OR IGNORE` — 재실행 멱등성
//! - ANALYZING 전환은 단일 조건부 UPDATE (read-then-write 금지)

use std::collections::HashSet;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};

use logward_core::BoxFuture;
use logward_core::error::StorageError;
use logward_core::types::{
    AnalysisResult, Finding, FindingCategory, FindingSource, Severity, Upload, UploadStatus,
};

use crate::query::{FindingFilter, FindingsPage, PageRequest};
use crate::store::{AnalysisStore, BeginAnalysis};

/// SQLite [`AnalysisStore`] 구현
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// 연결 문자열로 저장소를 생성하고 스키마를 초기화합니다.
    ///
    /// 데이터베이스 파일이 없으면 생성합니다.
    pub async fn new(database_url: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| StorageError::Connection(e.to_string()))?
            .create_if_missing(true);

        // `:memory:` 연결은 커넥션마다 별도 DB이므로 풀을 1로 제한
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.init_schema().await?;
        tracing::info!("sqlite store initialized");
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS uploads (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                file_name TEXT NOT NULL,
                size_bytes INTEGER NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS analysis_results (
                id TEXT PRIMARY KEY,
                upload_id TEXT NOT NULL UNIQUE REFERENCES uploads(id),
                rule_based_completed INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL,
                error TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS findings (
                id TEXT PRIMARY KEY,
                analysis_result_id TEXT NOT NULL REFERENCES analysis_results(id),
                severity TEXT NOT NULL,
                category TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                line_number INTEGER,
                line_content TEXT,
                matched_pattern TEXT,
                source TEXT NOT NULL,
                fingerprint TEXT NOT NULL,
                confidence REAL,
                mitre_tactic TEXT,
                mitre_technique TEXT,
                event_timestamp TEXT,
                created_at TEXT NOT NULL,
                UNIQUE (analysis_result_id, fingerprint)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_uploads_status_updated
             ON uploads (status, updated_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_findings_result
             ON findings (analysis_result_id)",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }
}

fn db_err(e: sqlx::Error) -> StorageError {
    StorageError::Query(e.to_string())
}

fn row_to_upload(row: &SqliteRow) -> Result<Upload, StorageError> {
    let status_str: String = row.try_get("status").map_err(db_err)?;
    let status = UploadStatus::from_str_loose(&status_str)
        .ok_or_else(|| StorageError::Integrity(format!("unknown upload status: {status_str}")))?;
    Ok(Upload {
        id: row.try_get("id").map_err(db_err)?,
        user_id: row.try_get("user_id").map_err(db_err)?,
        file_name: row.try_get("file_name").map_err(db_err)?,
        size_bytes: row.try_get::<i64, _>("size_bytes").map_err(db_err)? as u64,
        status,
        created_at: row.try_get("created_at").map_err(db_err)?,
        updated_at: row.try_get("updated_at").map_err(db_err)?,
    })
}

fn row_to_result(row: &SqliteRow) -> Result<AnalysisResult, StorageError> {
    let status_str: String = row.try_get("status").map_err(db_err)?;
    let status = UploadStatus::from_str_loose(&status_str)
        .ok_or_else(|| StorageError::Integrity(format!("unknown result status: {status_str}")))?;
    Ok(AnalysisResult {
        id: row.try_get("id").map_err(db_err)?,
        upload_id: row.try_get("upload_id").map_err(db_err)?,
        rule_based_completed: row.try_get::<i64, _>("rule_based_completed").map_err(db_err)? != 0,
        status,
        error: row.try_get("error").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
        updated_at: row.try_get("updated_at").map_err(db_err)?,
    })
}

fn row_to_finding(row: &SqliteRow) -> Result<Finding, StorageError> {
    let severity_str: String = row.try_get("severity").map_err(db_err)?;
    let severity = Severity::from_str_loose(&severity_str)
        .ok_or_else(|| StorageError::Integrity(format!("unknown severity: {severity_str}")))?;
    let category_str: String = row.try_get("category").map_err(db_err)?;
    let category = FindingCategory::from_str_loose(&category_str)
        .ok_or_else(|| StorageError::Integrity(format!("unknown category: {category_str}")))?;
    let source_str: String = row.try_get("source").map_err(db_err)?;
    let source = FindingSource::from_str_loose(&source_str)
        .ok_or_else(|| StorageError::Integrity(format!("unknown finding source: {source_str}")))?;

    Ok(Finding {
        id: row.try_get("id").map_err(db_err)?,
        analysis_result_id: row.try_get("analysis_result_id").map_err(db_err)?,
        severity,
        category,
        title: row.try_get("title").map_err(db_err)?,
        description: row.try_get("description").map_err(db_err)?,
        line_number: row
            .try_get::<Option<i64>, _>("line_number")
            .map_err(db_err)?
            .map(|n| n as u64),
        line_content: row.try_get("line_content").map_err(db_err)?,
        matched_pattern: row.try_get("matched_pattern").map_err(db_err)?,
        source,
        fingerprint: row.try_get("fingerprint").map_err(db_err)?,
        confidence: row.try_get("confidence").map_err(db_err)?,
        mitre_tactic: row.try_get("mitre_tactic").map_err(db_err)?,
        mitre_technique: row.try_get("mitre_technique").map_err(db_err)?,
        event_timestamp: row.try_get("event_timestamp").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

/// 심각도 내림차순 정렬을 위한 CASE 식
const SEVERITY_ORDER_SQL: &str = "CASE f.severity
    WHEN 'CRITICAL' THEN 0
    WHEN 'HIGH' THEN 1
    WHEN 'MEDIUM' THEN 2
    WHEN 'LOW' THEN 3
    ELSE 4 END";

impl AnalysisStore for SqliteStore {
    fn create_upload(&self, upload: Upload) -> BoxFuture<'_, Result<(), StorageError>> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO uploads (id, user_id, file_name, size_bytes, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )
            .bind(&upload.id)
            .bind(&upload.user_id)
            .bind(&upload.file_name)
            .bind(upload.size_bytes as i64)
            .bind(upload.status.as_str())
            .bind(upload.created_at)
            .bind(upload.updated_at)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
            Ok(())
        })
    }

    fn upload<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Option<Upload>, StorageError>> {
        Box::pin(async move {
            let row = sqlx::query("SELECT * FROM uploads WHERE id = ?1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
            row.as_ref().map(row_to_upload).transpose()
        })
    }

    fn set_upload_status<'a>(
        &'a self,
        id: &'a str,
        status: UploadStatus,
    ) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            let affected =
                sqlx::query("UPDATE uploads SET status = ?1, updated_at = ?2 WHERE id = ?3")
                    .bind(status.as_str())
                    .bind(Utc::now())
                    .bind(id)
                    .execute(&self.pool)
                    .await
                    .map_err(db_err)?
                    .rows_affected();
            if affected == 0 {
                return Err(StorageError::Query(format!("no such upload: {id}")));
            }
            Ok(())
        })
    }

    fn try_begin_analysis<'a>(
        &'a self,
        upload_id: &'a str,
        reanalyze: bool,
    ) -> BoxFuture<'a, Result<BeginAnalysis, StorageError>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await.map_err(db_err)?;
            let now = Utc::now();

            // 원자적 compare-and-set: 허용 상태에서만 ANALYZING으로 전환
            let affected = sqlx::query(
                "UPDATE uploads SET status = 'ANALYZING', updated_at = ?1
                 WHERE id = ?2
                   AND (status IN ('PENDING', 'FAILED')
                        OR (status = 'COMPLETED' AND ?3))",
            )
            .bind(now)
            .bind(upload_id)
            .bind(reanalyze)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?
            .rows_affected();

            if affected == 0 {
                // 전환 실패 사유 판별
                let status: Option<String> =
                    sqlx::query_scalar("SELECT status FROM uploads WHERE id = ?1")
                        .bind(upload_id)
                        .fetch_optional(&mut *tx)
                        .await
                        .map_err(db_err)?;

                let outcome = match status.as_deref() {
                    None => BeginAnalysis::NotFound,
                    Some("ANALYZING") => BeginAnalysis::Conflict,
                    Some("COMPLETED") => {
                        let row = sqlx::query(
                            "SELECT * FROM analysis_results WHERE upload_id = ?1",
                        )
                        .bind(upload_id)
                        .fetch_optional(&mut *tx)
                        .await
                        .map_err(db_err)?
                        .ok_or_else(|| {
                            StorageError::Integrity(format!(
                                "completed upload {upload_id} has no analysis result"
                            ))
                        })?;
                        BeginAnalysis::AlreadyCompleted(row_to_result(&row)?)
                    }
                    Some(other) => {
                        return Err(StorageError::Integrity(format!(
                            "unexpected status {other} for upload {upload_id}"
                        )));
                    }
                };
                tx.commit().await.map_err(db_err)?;
                return Ok(outcome);
            }

            // 결과 생성 또는 리셋 (같은 id 유지)
            let fresh = AnalysisResult::new(upload_id);
            sqlx::query(
                "INSERT INTO analysis_results
                     (id, upload_id, rule_based_completed, status, error, created_at, updated_at)
                 VALUES (?1, ?2, 0, 'ANALYZING', NULL, ?3, ?4)
                 ON CONFLICT (upload_id) DO UPDATE SET
                     rule_based_completed = 0,
                     status = 'ANALYZING',
                     error = NULL,
                     updated_at = excluded.updated_at",
            )
            .bind(&fresh.id)
            .bind(upload_id)
            .bind(fresh.created_at)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

            let row = sqlx::query("SELECT * FROM analysis_results WHERE upload_id = ?1")
                .bind(upload_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(db_err)?;
            let result = row_to_result(&row)?;

            tx.commit().await.map_err(db_err)?;
            Ok(BeginAnalysis::Started(result))
        })
    }

    fn result_for_upload<'a>(
        &'a self,
        upload_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<AnalysisResult>, StorageError>> {
        Box::pin(async move {
            let row = sqlx::query("SELECT * FROM analysis_results WHERE upload_id = ?1")
                .bind(upload_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
            row.as_ref().map(row_to_result).transpose()
        })
    }

    fn ensure_result<'a>(
        &'a self,
        upload_id: &'a str,
    ) -> BoxFuture<'a, Result<AnalysisResult, StorageError>> {
        Box::pin(async move {
            let fresh = AnalysisResult::new(upload_id);
            sqlx::query(
                "INSERT INTO analysis_results
                     (id, upload_id, rule_based_completed, status, error, created_at, updated_at)
                 VALUES (?1, ?2, 0, 'ANALYZING', NULL, ?3, ?4)
                 ON CONFLICT (upload_id) DO NOTHING",
            )
            .bind(&fresh.id)
            .bind(upload_id)
            .bind(fresh.created_at)
            .bind(fresh.updated_at)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

            let row = sqlx::query("SELECT * FROM analysis_results WHERE upload_id = ?1")
                .bind(upload_id)
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)?;
            row_to_result(&row)
        })
    }

    fn mark_rule_phase_done<'a>(
        &'a self,
        result_id: &'a str,
    ) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            let now = Utc::now();
            let affected = sqlx::query(
                "UPDATE analysis_results SET rule_based_completed = 1, updated_at = ?1
                 WHERE id = ?2",
            )
            .bind(now)
            .bind(result_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?
            .rows_affected();
            if affected == 0 {
                return Err(StorageError::Query(format!(
                    "no such analysis result: {result_id}"
                )));
            }

            // 단계 경계는 업로드 updated_at도 갱신 (stall 판정 하트비트)
            sqlx::query(
                "UPDATE uploads SET updated_at = ?1
                 WHERE id = (SELECT upload_id FROM analysis_results WHERE id = ?2)",
            )
            .bind(now)
            .bind(result_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
            Ok(())
        })
    }

    fn finish_analysis<'a>(
        &'a self,
        upload_id: &'a str,
        result_id: &'a str,
    ) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await.map_err(db_err)?;
            let now = Utc::now();
            sqlx::query(
                "UPDATE analysis_results SET status = 'COMPLETED', updated_at = ?1 WHERE id = ?2",
            )
            .bind(now)
            .bind(result_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
            sqlx::query("UPDATE uploads SET status = 'COMPLETED', updated_at = ?1 WHERE id = ?2")
                .bind(now)
                .bind(upload_id)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
            tx.commit().await.map_err(db_err)
        })
    }

    fn fail_analysis<'a>(
        &'a self,
        upload_id: &'a str,
        result_id: &'a str,
        error: &'a str,
    ) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await.map_err(db_err)?;
            let now = Utc::now();
            sqlx::query(
                "UPDATE analysis_results SET status = 'FAILED', error = ?1, updated_at = ?2
                 WHERE id = ?3",
            )
            .bind(error)
            .bind(now)
            .bind(result_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
            sqlx::query("UPDATE uploads SET status = 'FAILED', updated_at = ?1 WHERE id = ?2")
                .bind(now)
                .bind(upload_id)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
            tx.commit().await.map_err(db_err)
        })
    }

    fn insert_findings(
        &self,
        findings: Vec<Finding>,
    ) -> BoxFuture<'_, Result<usize, StorageError>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await.map_err(db_err)?;
            let mut inserted = 0usize;

            for f in &findings {
                let affected = sqlx::query(
                    "INSERT OR IGNORE INTO findings
                         (id, analysis_result_id, severity, category, title, description,
                          line_number, line_content, matched_pattern, source, fingerprint,
                          confidence, mitre_tactic, mitre_technique, event_timestamp, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                )
                .bind(&f.id)
                .bind(&f.analysis_result_id)
                .bind(f.severity.as_str())
                .bind(f.category.as_str())
                .bind(&f.title)
                .bind(&f.description)
                .bind(f.line_number.map(|n| n as i64))
                .bind(&f.line_content)
                .bind(&f.matched_pattern)
                .bind(f.source.as_str())
                .bind(&f.fingerprint)
                .bind(f.confidence)
                .bind(&f.mitre_tactic)
                .bind(&f.mitre_technique)
                .bind(f.event_timestamp)
                .bind(f.created_at)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?
                .rows_affected();
                inserted += affected as usize;
            }

            tx.commit().await.map_err(db_err)?;
            Ok(inserted)
        })
    }

    fn delete_findings<'a>(
        &'a self,
        result_id: &'a str,
        source: FindingSource,
    ) -> BoxFuture<'a, Result<u64, StorageError>> {
        Box::pin(async move {
            let affected = sqlx::query(
                "DELETE FROM findings WHERE analysis_result_id = ?1 AND source = ?2",
            )
            .bind(result_id)
            .bind(source.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_err)?
            .rows_affected();
            Ok(affected)
        })
    }

    fn fingerprints_for_result<'a>(
        &'a self,
        result_id: &'a str,
    ) -> BoxFuture<'a, Result<HashSet<String>, StorageError>> {
        Box::pin(async move {
            let rows: Vec<String> = sqlx::query_scalar(
                "SELECT fingerprint FROM findings WHERE analysis_result_id = ?1",
            )
            .bind(result_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
            Ok(rows.into_iter().collect())
        })
    }

    fn findings_for_result<'a>(
        &'a self,
        result_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Finding>, StorageError>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT f.* FROM findings f WHERE f.analysis_result_id = ?1
                 ORDER BY {SEVERITY_ORDER_SQL} ASC, f.created_at DESC"
            );
            let rows = sqlx::query(&sql)
                .bind(result_id)
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?;
            rows.iter().map(row_to_finding).collect()
        })
    }

    fn findings_page<'a>(
        &'a self,
        user_id: &'a str,
        filter: &'a FindingFilter,
        page: PageRequest,
    ) -> BoxFuture<'a, Result<FindingsPage, StorageError>> {
        Box::pin(async move {
            let page = page.normalized();

            fn push_filters<'q>(
                qb: &mut QueryBuilder<'q, Sqlite>,
                user_id: &'q str,
                filter: &'q FindingFilter,
            ) {
                qb.push(
                    " FROM findings f
                      JOIN analysis_results ar ON ar.id = f.analysis_result_id
                      JOIN uploads u ON u.id = ar.upload_id
                      WHERE u.user_id = ",
                );
                qb.push_bind(user_id);
                if let Some(severity) = filter.severity {
                    qb.push(" AND f.severity = ").push_bind(severity.as_str());
                }
                if let Some(category) = filter.category {
                    qb.push(" AND f.category = ").push_bind(category.as_str());
                }
                if let Some(source) = filter.source {
                    qb.push(" AND f.source = ").push_bind(source.as_str());
                }
                if let Some(ref term) = filter.search {
                    let like = format!("%{}%", term.to_lowercase());
                    qb.push(" AND (LOWER(f.title) LIKE ")
                        .push_bind(like.clone())
                        .push(" OR LOWER(f.description) LIKE ")
                        .push_bind(like)
                        .push(")");
                }
                if let Some(start) = filter.date_start {
                    qb.push(" AND f.created_at >= ").push_bind(start);
                }
                if let Some(end) = filter.date_end {
                    qb.push(" AND f.created_at <= ").push_bind(end);
                }
            }

            let mut count_qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*)");
            push_filters(&mut count_qb, user_id, filter);
            let total: i64 = count_qb
                .build_query_scalar()
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)?;

            let mut page_qb = QueryBuilder::<Sqlite>::new("SELECT f.*");
            push_filters(&mut page_qb, user_id, filter);
            page_qb.push(format!(
                " ORDER BY {SEVERITY_ORDER_SQL} ASC, f.created_at DESC LIMIT "
            ));
            page_qb.push_bind(page.limit as i64);
            page_qb.push(" OFFSET ");
            page_qb.push_bind(page.offset() as i64);

            let rows = page_qb
                .build()
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?;
            let items: Result<Vec<Finding>, StorageError> =
                rows.iter().map(row_to_finding).collect();

            Ok(FindingsPage {
                items: items?,
                page: page.page,
                limit: page.limit,
                total: total as u64,
            })
        })
    }

    fn uploads_in_analyzing(&self) -> BoxFuture<'_, Result<Vec<Upload>, StorageError>> {
        Box::pin(async move {
            let rows = sqlx::query("SELECT * FROM uploads WHERE status = 'ANALYZING'")
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?;
            rows.iter().map(row_to_upload).collect()
        })
    }

    fn stalled_uploads(
        &self,
        older_than: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<Vec<Upload>, StorageError>> {
        Box::pin(async move {
            let rows = sqlx::query(
                "SELECT * FROM uploads WHERE status = 'ANALYZING' AND updated_at < ?1",
            )
            .bind(older_than)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
            rows.iter().map(row_to_upload).collect()
        })
    }
}
