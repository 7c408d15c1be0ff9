use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;

use crate::{
    db::{
        cache::CacheHelper,
        db::DBClient,
        resultdb::{MatchResultExt, NewMatchResultRow},
    },
    service::error::ServiceError,
};

/// Three-tier write-through store for match results: Redis hot entry
/// with TTL, durable Postgres row, and a filesystem blob for oversize
/// payloads. Writes are best-effort per tier; reads walk Hot -> Row ->
/// Blob and repopulate the hot tier on a blob hit.
pub struct ResultStore {
    db: Arc<DBClient>,
    hot_ttl: usize,
    large_threshold: usize,
    blob_dir: PathBuf,
}

impl ResultStore {
    pub fn new(db: Arc<DBClient>, hot_ttl: usize, large_threshold: usize, blob_dir: PathBuf) -> Self {
        ResultStore {
            db,
            hot_ttl,
            large_threshold,
            blob_dir,
        }
    }

    fn hot_key(job_id: &str) -> String {
        format!("match:result:{}", job_id)
    }

    fn blob_path(&self, job_id: &str) -> PathBuf {
        self.blob_dir.join("results").join(format!("{}.json", job_id))
    }

    fn blob_name(job_id: &str) -> String {
        format!("results/{}.json", job_id)
    }

    fn is_large(&self, serialized: &str) -> bool {
        serialized.len() > self.large_threshold
    }

    /// Writes a result through every configured tier. Succeeds when at
    /// least one tier accepted the payload.
    pub async fn store(
        &self,
        job_id: &str,
        payload: &Value,
        status: &str,
        priority: Option<&str>,
        processing_time: Option<f64>,
        error: Option<&str>,
    ) -> Result<(), ServiceError> {
        let serialized = serde_json::to_string(payload)?;
        let is_large = self.is_large(&serialized);
        let mut stored = false;

        if let Some(redis) = &self.db.redis_client {
            match CacheHelper::set_raw(redis, &Self::hot_key(job_id), &serialized, self.hot_ttl).await
            {
                Ok(()) => stored = true,
                Err(e) => tracing::error!("Hot-tier write failed for job {}: {}", job_id, e),
            }
        }

        let row = NewMatchResultRow {
            job_id,
            status,
            result_json: if is_large { None } else { Some(&serialized) },
            file_path: None,
            priority,
            processing_time,
            error,
        };
        match self.db.upsert_match_result(row).await {
            Ok(()) => stored = true,
            Err(e) => tracing::error!("Row-tier write failed for job {}: {}", job_id, e),
        }

        if is_large {
            match self.write_blob(job_id, &serialized).await {
                Ok(()) => {
                    stored = true;
                    if let Err(e) = self
                        .db
                        .set_result_file_path(job_id, &Self::blob_name(job_id))
                        .await
                    {
                        tracing::error!("Blob path update failed for job {}: {}", job_id, e);
                    }
                }
                Err(e) => tracing::error!("Blob-tier write failed for job {}: {}", job_id, e),
            }
        }

        if stored {
            Ok(())
        } else {
            Err(ServiceError::Persistence(format!(
                "all storage tiers failed for job {}",
                job_id
            )))
        }
    }

    async fn write_blob(&self, job_id: &str, serialized: &str) -> Result<(), std::io::Error> {
        let path = self.blob_path(job_id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, serialized).await?;
        tracing::info!("Oversize result stored as blob: {}", path.display());
        Ok(())
    }

    /// Looks a result up by job id in tier order; the first hit wins.
    pub async fn fetch(&self, job_id: &str) -> Result<Option<Value>, ServiceError> {
        if let Some(redis) = &self.db.redis_client {
            if let Ok(Some(raw)) = CacheHelper::get_raw(redis, &Self::hot_key(job_id)).await {
                if let Ok(value) = serde_json::from_str(&raw) {
                    return Ok(Some(value));
                }
            }
        }

        let Some(row) = self.db.get_match_result(job_id).await? else {
            return Ok(None);
        };

        if let Some(raw) = &row.result_json {
            return Ok(serde_json::from_str(raw).ok());
        }

        if row.file_path.is_some() {
            let path = self.blob_path(job_id);
            match tokio::fs::read_to_string(&path).await {
                Ok(raw) => {
                    if let Some(redis) = &self.db.redis_client {
                        let _ = CacheHelper::set_raw(
                            redis,
                            &Self::hot_key(job_id),
                            &raw,
                            self.hot_ttl,
                        )
                        .await;
                    }
                    return Ok(serde_json::from_str(&raw).ok());
                }
                Err(e) => {
                    tracing::error!("Blob read failed for job {}: {}", job_id, e);
                }
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;

    fn store() -> ResultStore {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/talentmatch")
            .unwrap();
        ResultStore::new(
            Arc::new(DBClient::new(pool)),
            3600,
            100 * 1024,
            std::env::temp_dir().join("talentmatch-test"),
        )
    }

    #[test]
    fn hot_key_and_blob_name_are_stable() {
        assert_eq!(ResultStore::hot_key("abc"), "match:result:abc");
        assert_eq!(ResultStore::blob_name("abc"), "results/abc.json");
    }

    #[tokio::test]
    async fn large_threshold_is_strict() {
        let store = store();
        let small = "x".repeat(100 * 1024);
        let large = "x".repeat(100 * 1024 + 1);
        assert!(!store.is_large(&small));
        assert!(store.is_large(&large));
    }
}
