//! Record read operations: completion lookup, listings, statistics.

use anyhow::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::path::PathBuf;

use super::super::db::{degrade, Ledger};
use super::super::types::{JobRecord, JobStatus, LedgerStats};

const RECORD_COLUMNS: &str = r#"
    id, source_key, source_url, title, site, final_path, temp_path,
    status, download_time, size_bytes, created_at, updated_at
"#;

fn record_from_row(row: &SqliteRow) -> JobRecord {
    let status: String = row.get("status");
    let final_path: Option<String> = row.get("final_path");
    let temp_path: Option<String> = row.get("temp_path");
    JobRecord {
        id: row.get("id"),
        source_key: row.get("source_key"),
        source_url: row.get("source_url"),
        title: row.get("title"),
        site: row.get("site"),
        final_path: final_path.map(PathBuf::from),
        temp_path: temp_path.map(PathBuf::from),
        status: JobStatus::from_db(&status),
        download_time: row.get("download_time"),
        size_bytes: row.get("size_bytes"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

impl Ledger {
    /// Final path of a `completed` record whose artifact still exists on disk.
    ///
    /// A `completed` record whose file vanished is demoted to `missing_file`
    /// and reported as not completed. Store failures also read as not completed.
    pub async fn lookup_completed(&self, source_key: &str) -> Option<PathBuf> {
        let result = self.try_lookup_completed(source_key).await;
        degrade("lookup_completed", result, None)
    }

    async fn try_lookup_completed(&self, source_key: &str) -> Result<Option<PathBuf>> {
        let final_path: Option<Option<String>> = sqlx::query_scalar(
            r#"
            SELECT final_path FROM downloads
            WHERE source_key = ?1 AND status = 'completed'
            "#,
        )
        .bind(source_key)
        .fetch_optional(&self.pool)
        .await?;

        let Some(final_path) = final_path else {
            return Ok(None);
        };
        if let Some(path) = final_path.map(PathBuf::from) {
            if tokio::fs::metadata(&path).await.is_ok() {
                return Ok(Some(path));
            }
        }

        if self.mark_missing(source_key).await? {
            tracing::info!(%source_key, "completed artifact missing, record demoted");
        }
        Ok(None)
    }

    /// Temp path recorded for `source_key`, if any.
    pub async fn temp_path(&self, source_key: &str) -> Option<PathBuf> {
        let result = async {
            let path: Option<Option<String>> =
                sqlx::query_scalar("SELECT temp_path FROM downloads WHERE source_key = ?1")
                    .bind(source_key)
                    .fetch_optional(&self.pool)
                    .await?;
            Ok::<_, anyhow::Error>(path.flatten().map(PathBuf::from))
        }
        .await;
        degrade("temp_path", result, None)
    }

    /// Full record for `source_key`.
    pub async fn get_record(&self, source_key: &str) -> Option<JobRecord> {
        let result = async {
            let sql = format!("SELECT {RECORD_COLUMNS} FROM downloads WHERE source_key = ?1");
            let row = sqlx::query(&sql)
                .bind(source_key)
                .fetch_optional(&self.pool)
                .await?;
            Ok::<_, anyhow::Error>(row.as_ref().map(record_from_row))
        }
        .await;
        degrade("get_record", result, None)
    }

    /// Records newest first, paginated.
    pub async fn recent_jobs(&self, limit: i64, offset: i64) -> Vec<JobRecord> {
        let result = async {
            let sql = format!(
                "SELECT {RECORD_COLUMNS} FROM downloads \
                 ORDER BY created_at DESC, id DESC LIMIT ?1 OFFSET ?2"
            );
            let rows = sqlx::query(&sql)
                .bind(limit)
                .bind(offset.max(0))
                .fetch_all(&self.pool)
                .await?;
            Ok::<_, anyhow::Error>(rows.iter().map(record_from_row).collect())
        }
        .await;
        degrade("recent_jobs", result, Vec::new())
    }

    /// Records in `status`, newest first.
    pub async fn jobs_by_status(&self, status: JobStatus) -> Vec<JobRecord> {
        let result = async {
            let sql = format!(
                "SELECT {RECORD_COLUMNS} FROM downloads \
                 WHERE status = ?1 ORDER BY created_at DESC, id DESC"
            );
            let rows = sqlx::query(&sql)
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await?;
            Ok::<_, anyhow::Error>(rows.iter().map(record_from_row).collect())
        }
        .await;
        degrade("jobs_by_status", result, Vec::new())
    }

    /// Totals per status, completed-with-path count and completed bytes.
    pub async fn statistics(&self) -> LedgerStats {
        let result = self.try_statistics().await;
        degrade("statistics", result, LedgerStats::default())
    }

    async fn try_statistics(&self) -> Result<LedgerStats> {
        let mut stats = LedgerStats::default();

        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM downloads GROUP BY status")
            .fetch_all(&self.pool)
            .await?;
        for row in rows {
            let status: String = row.get("status");
            let n: i64 = row.get("n");
            *stats.per_status.entry(JobStatus::from_db(&status)).or_default() += n;
            stats.total += n;
        }

        let row = sqlx::query(
            r#"
            SELECT
                COUNT(final_path) AS valid,
                COALESCE(SUM(size_bytes), 0) AS bytes
            FROM downloads
            WHERE status = 'completed'
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        stats.valid_completed = row.get("valid");
        stats.total_bytes = row.get("bytes");

        Ok(stats)
    }
}
