//! Record write operations: upsert, status transitions, sweeps, reset.

use anyhow::Result;
use sqlx::Row;
use std::path::Path;

use super::super::db::{degrade, unix_timestamp, Ledger};
use super::super::types::{JobId, JobStatus};

/// SQL list of the statuses allowed to move to `next`, e.g. `'pending','failed'`.
fn predecessors_sql(next: JobStatus) -> String {
    JobStatus::ALL
        .iter()
        .filter(|s| s.can_transition_to(next))
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(",")
}

fn path_text(path: Option<&Path>) -> Option<String> {
    path.map(|p| p.to_string_lossy().into_owned())
}

impl Ledger {
    /// Create the record for `source_url` in `downloading`, or move an existing
    /// non-completed record back to `downloading` with fresh metadata.
    ///
    /// Returns the row id, or `None` when the store failed or the record is
    /// already `completed` (a completed record is never revived here).
    pub async fn upsert(
        &self,
        source_url: &str,
        title: &str,
        site: &str,
        temp_path: &Path,
    ) -> Option<JobId> {
        let key = super::super::source_key(source_url);
        let result = self.try_upsert(&key, source_url, title, site, temp_path).await;
        degrade("upsert", result, None)
    }

    async fn try_upsert(
        &self,
        key: &str,
        source_url: &str,
        title: &str,
        site: &str,
        temp_path: &Path,
    ) -> Result<Option<JobId>> {
        let now = unix_timestamp();
        sqlx::query(
            r#"
            INSERT INTO downloads (
                source_key, source_url, title, site, temp_path,
                status, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, 'downloading', ?6, ?7)
            ON CONFLICT(source_key) DO UPDATE SET
                source_url = excluded.source_url,
                title = excluded.title,
                site = excluded.site,
                temp_path = excluded.temp_path,
                status = 'downloading',
                updated_at = excluded.updated_at
            WHERE downloads.status <> 'completed'
            "#,
        )
        .bind(key)
        .bind(source_url)
        .bind(title)
        .bind(site)
        .bind(temp_path.to_string_lossy().as_ref())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query("SELECT id, status FROM downloads WHERE source_key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let id: i64 = row.get("id");
        let status: String = row.get("status");
        if JobStatus::from_db(&status) != JobStatus::Downloading {
            tracing::warn!(source_key = %key, %status, "upsert left record untouched");
            return Ok(None);
        }
        tracing::debug!(source_key = %key, id, %title, "ledger record downloading");
        Ok(Some(id))
    }

    /// Move the record for `source_key` to `status`.
    ///
    /// `final_path` and `size_bytes` are written when given. Returns false when
    /// no record matches, the transition is not a forward edge of the lifecycle,
    /// a `completed` status arrives without a final path, or the store failed.
    pub async fn set_status(
        &self,
        source_key: &str,
        status: JobStatus,
        final_path: Option<&Path>,
        size_bytes: Option<i64>,
    ) -> bool {
        if status == JobStatus::Completed && final_path.is_none() {
            tracing::warn!(%source_key, "refusing completed status without a final path");
            return false;
        }
        let result = self
            .try_set_status(source_key, status, final_path, size_bytes)
            .await;
        degrade("set_status", result, false)
    }

    async fn try_set_status(
        &self,
        source_key: &str,
        status: JobStatus,
        final_path: Option<&Path>,
        size_bytes: Option<i64>,
    ) -> Result<bool> {
        let now = unix_timestamp();
        let download_time = (status == JobStatus::Completed).then_some(now);
        let sql = format!(
            r#"
            UPDATE downloads
            SET status = ?1,
                final_path = COALESCE(?2, final_path),
                size_bytes = COALESCE(?3, size_bytes),
                download_time = COALESCE(?4, download_time),
                updated_at = ?5
            WHERE source_key = ?6
              AND status IN ({})
            "#,
            predecessors_sql(status)
        );
        let r = sqlx::query(&sql)
            .bind(status.as_str())
            .bind(path_text(final_path))
            .bind(size_bytes)
            .bind(download_time)
            .bind(now)
            .bind(source_key)
            .execute(&self.pool)
            .await?;

        if r.rows_affected() > 0 {
            tracing::debug!(%source_key, %status, "ledger status updated");
            return Ok(true);
        }

        let current: Option<String> =
            sqlx::query_scalar("SELECT status FROM downloads WHERE source_key = ?1")
                .bind(source_key)
                .fetch_optional(&self.pool)
                .await?;
        match current {
            None => tracing::warn!(%source_key, "no ledger record to update"),
            Some(from) => tracing::warn!(
                %source_key,
                %from,
                to = %status,
                "rejected ledger status transition"
            ),
        }
        Ok(false)
    }

    /// Demote a `completed` record whose artifact vanished.
    pub(crate) async fn mark_missing(&self, source_key: &str) -> Result<bool> {
        let r = sqlx::query(
            r#"
            UPDATE downloads
            SET status = 'missing_file',
                updated_at = ?1
            WHERE source_key = ?2 AND status = 'completed'
            "#,
        )
        .bind(unix_timestamp())
        .bind(source_key)
        .execute(&self.pool)
        .await?;
        Ok(r.rows_affected() > 0)
    }

    /// Demote every `completed` record whose final file no longer exists.
    /// Returns the number of records demoted (0 on store failure).
    pub async fn sweep_missing(&self) -> u64 {
        let result = self.try_sweep_missing().await;
        degrade("sweep_missing", result, 0)
    }

    async fn try_sweep_missing(&self) -> Result<u64> {
        let rows = sqlx::query(
            r#"
            SELECT id, title, final_path FROM downloads
            WHERE status = 'completed' AND final_path IS NOT NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut missing = Vec::new();
        for row in rows {
            let id: i64 = row.get("id");
            let title: String = row.get("title");
            let final_path: String = row.get("final_path");
            if tokio::fs::metadata(&final_path).await.is_err() {
                missing.push((id, title));
            }
        }
        if missing.is_empty() {
            return Ok(0);
        }

        let now = unix_timestamp();
        let mut demoted = 0;
        let mut tx = self.pool.begin().await?;
        for (id, title) in &missing {
            let r = sqlx::query(
                r#"
                UPDATE downloads
                SET status = 'missing_file',
                    updated_at = ?1
                WHERE id = ?2 AND status = 'completed'
                "#,
            )
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await?;
            if r.rows_affected() > 0 {
                tracing::info!(%title, "completed artifact missing, record demoted");
                demoted += 1;
            }
        }
        tx.commit().await?;
        Ok(demoted)
    }

    /// Move records left in `downloading` by an interrupted run to `error`.
    /// Their temp files stay in place. Returns the number of records moved.
    pub async fn recover_interrupted(&self) -> u64 {
        let result = async {
            let r = sqlx::query(
                r#"
                UPDATE downloads
                SET status = 'error',
                    updated_at = ?1
                WHERE status = 'downloading'
                "#,
            )
            .bind(unix_timestamp())
            .execute(&self.pool)
            .await?;
            Ok::<u64, anyhow::Error>(r.rows_affected())
        }
        .await;
        degrade("recover_interrupted", result, 0)
    }

    /// Delete every record. Administrative escape hatch; returns the number deleted.
    pub async fn reset_all(&self) -> u64 {
        let result = async {
            let r = sqlx::query("DELETE FROM downloads")
                .execute(&self.pool)
                .await?;
            Ok::<u64, anyhow::Error>(r.rows_affected())
        }
        .await;
        let deleted = degrade("reset_all", result, 0);
        tracing::info!(deleted, "ledger reset");
        deleted
    }
}
