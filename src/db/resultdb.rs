// db/resultdb.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;

use super::db::DBClient;

/// Row-tier record for a completed (or failed) match job. For oversize
/// payloads `result_json` stays null and `file_path` points at the blob
/// tier.
#[derive(Debug, Clone, FromRow, serde::Serialize)]
pub struct MatchResultRow {
    pub job_id: String,
    pub status: String,
    pub result_json: Option<String>,
    pub file_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub priority: Option<String>,
    pub processing_time: Option<f64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NewMatchResultRow<'a> {
    pub job_id: &'a str,
    pub status: &'a str,
    pub result_json: Option<&'a str>,
    pub file_path: Option<&'a str>,
    pub priority: Option<&'a str>,
    pub processing_time: Option<f64>,
    pub error: Option<&'a str>,
}

#[async_trait]
pub trait MatchResultExt {
    /// Creates the row-tier table when absent.
    async fn ensure_result_schema(&self) -> Result<(), sqlx::Error>;

    async fn upsert_match_result(&self, row: NewMatchResultRow<'_>) -> Result<(), sqlx::Error>;

    async fn set_result_file_path(&self, job_id: &str, file_path: &str)
        -> Result<(), sqlx::Error>;

    async fn get_match_result(&self, job_id: &str) -> Result<Option<MatchResultRow>, sqlx::Error>;
}

#[async_trait]
impl MatchResultExt for DBClient {
    async fn ensure_result_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS match_results (
                job_id VARCHAR(64) PRIMARY KEY,
                status VARCHAR(20) NOT NULL,
                result_json TEXT,
                file_path VARCHAR(255),
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                priority VARCHAR(20),
                processing_time DOUBLE PRECISION,
                error TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_match_results_status ON match_results (status)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn upsert_match_result(&self, row: NewMatchResultRow<'_>) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO match_results
                (job_id, status, result_json, file_path, priority, processing_time, error)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (job_id) DO UPDATE SET
                status = EXCLUDED.status,
                result_json = EXCLUDED.result_json,
                file_path = COALESCE(EXCLUDED.file_path, match_results.file_path),
                priority = COALESCE(EXCLUDED.priority, match_results.priority),
                processing_time = COALESCE(EXCLUDED.processing_time, match_results.processing_time),
                error = EXCLUDED.error,
                updated_at = NOW()
            "#,
        )
        .bind(row.job_id)
        .bind(row.status)
        .bind(row.result_json)
        .bind(row.file_path)
        .bind(row.priority)
        .bind(row.processing_time)
        .bind(row.error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_result_file_path(
        &self,
        job_id: &str,
        file_path: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE match_results SET file_path = $2, updated_at = NOW() WHERE job_id = $1",
        )
        .bind(job_id)
        .bind(file_path)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_match_result(&self, job_id: &str) -> Result<Option<MatchResultRow>, sqlx::Error> {
        sqlx::query_as::<_, MatchResultRow>(
            r#"
            SELECT job_id, status, result_json, file_path, created_at, updated_at,
                   priority, processing_time, error
            FROM match_results
            WHERE job_id = $1
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
    }
}
