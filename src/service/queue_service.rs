use std::sync::Arc;
use std::time::{Duration, Instant};

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::watch;
use uuid::Uuid;

use crate::{
    db::{
        cache::CacheHelper,
        db::DBClient,
        resultdb::{MatchResultExt, NewMatchResultRow},
    },
    service::{
        error::ServiceError,
        matching_service::{AlgorithmChoice, MatchOptions, MatchingService},
        result_store::ResultStore,
        webhook::WebhookNotifier,
    },
};

pub const DEAD_LETTER_QUEUE: &str = "matching_failed";

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobPriority {
    High,
    Default,
    Low,
}

impl JobPriority {
    pub fn queue_name(&self) -> &'static str {
        match self {
            JobPriority::High => "matching_high",
            JobPriority::Default => "matching_default",
            JobPriority::Low => "matching_low",
        }
    }

    pub fn from_label(label: Option<&str>) -> JobPriority {
        match label.map(|l| l.trim().to_lowercase()).as_deref() {
            Some("high") => JobPriority::High,
            Some("low") => JobPriority::Low,
            _ => JobPriority::Default,
        }
    }

    /// Pop order for workers: highest priority first.
    pub fn polling_order() -> [&'static str; 3] {
        [
            JobPriority::High.queue_name(),
            JobPriority::Default.queue_name(),
            JobPriority::Low.queue_name(),
        ]
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Match,
    FindJobs,
    FindCandidates,
}

/// A queued match request. `Match`/`FindJobs` carry one candidate and a
/// job list; `FindCandidates` carries one job and a candidate list.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct QueuedJob {
    pub id: String,
    pub kind: TaskKind,
    #[serde(default)]
    pub candidate: Option<Value>,
    #[serde(default)]
    pub candidates: Vec<Value>,
    #[serde(default)]
    pub job: Option<Value>,
    #[serde(default)]
    pub jobs: Vec<Value>,
    #[serde(default)]
    pub with_commute_time: bool,
    #[serde(default)]
    pub algorithm: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub min_score: Option<f64>,
    #[serde(default)]
    pub webhook_url: Option<String>,
    pub priority: JobPriority,
    pub retries_left: u32,
    pub enqueued_at: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn to_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JobMeta {
    pub job_id: String,
    pub status: JobStatus,
    pub priority: JobPriority,
    pub enqueued_at: i64,
    pub updated_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Priority-queue dispatch of match requests to workers, with retry
/// bookkeeping, a dead-letter queue and webhook notification. Queues
/// live in Redis; workers are spawned tasks that drain them in
/// priority order and finish their current job on shutdown.
pub struct QueueService {
    db: Arc<DBClient>,
    matching: Arc<MatchingService>,
    store: Arc<ResultStore>,
    notifier: Arc<WebhookNotifier>,
    job_timeout: Duration,
    result_ttl: usize,
    max_retries: u32,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl QueueService {
    pub fn new(
        db: Arc<DBClient>,
        matching: Arc<MatchingService>,
        store: Arc<ResultStore>,
        notifier: Arc<WebhookNotifier>,
        job_timeout: Duration,
        result_ttl: usize,
        max_retries: u32,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        QueueService {
            db,
            matching,
            store,
            notifier,
            job_timeout,
            result_ttl,
            max_retries,
            shutdown_tx,
            shutdown_rx,
        }
    }

    fn redis(&self) -> Result<Arc<ConnectionManager>, ServiceError> {
        self.db
            .redis_client
            .clone()
            .ok_or_else(|| ServiceError::Queue("Redis is not configured".to_string()))
    }

    fn meta_key(job_id: &str) -> String {
        format!("match:job:{}", job_id)
    }

    /// Enqueues a job and records its `queued` metadata. Returns the
    /// job id.
    pub async fn enqueue(&self, mut job: QueuedJob) -> Result<String, ServiceError> {
        let redis = self.redis()?;

        if job.id.is_empty() {
            job.id = Uuid::new_v4().to_string();
        }
        job.retries_left = self.max_retries;
        job.enqueued_at = chrono::Utc::now().timestamp();

        let payload = serde_json::to_string(&job)?;
        let mut conn = ConnectionManager::clone(&redis);
        let _: () = conn.lpush(job.priority.queue_name(), payload).await?;

        self.write_meta(&redis, &job, JobStatus::Queued, None).await;
        tracing::info!("Job {} queued on {}", job.id, job.priority.queue_name());
        Ok(job.id)
    }

    pub async fn job_status(&self, job_id: &str) -> Result<Option<JobMeta>, ServiceError> {
        let redis = self.redis()?;
        Ok(CacheHelper::get::<JobMeta>(&redis, &Self::meta_key(job_id)).await?)
    }

    async fn write_meta(
        &self,
        redis: &Arc<ConnectionManager>,
        job: &QueuedJob,
        status: JobStatus,
        error: Option<String>,
    ) {
        let meta = JobMeta {
            job_id: job.id.clone(),
            status,
            priority: job.priority,
            enqueued_at: job.enqueued_at,
            updated_at: chrono::Utc::now().timestamp(),
            error,
        };
        if let Err(e) = CacheHelper::set(redis, &Self::meta_key(&job.id), &meta, self.result_ttl).await
        {
            tracing::error!("Failed to write meta for job {}: {}", job.id, e);
        }
    }

    /// Signals workers to stop after their current job.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn spawn_workers(self: &Arc<Self>, count: usize) {
        for index in 0..count.max(1) {
            let service = Arc::clone(self);
            tokio::spawn(async move {
                service.worker_loop(index).await;
            });
        }
    }

    async fn worker_loop(self: Arc<Self>, index: usize) {
        tracing::info!("Matching worker {} started", index);
        let mut shutdown = self.shutdown_rx.clone();
        loop {
            if *shutdown.borrow_and_update() {
                break;
            }
            match self.pop_job().await {
                Ok(Some(job)) => self.process_job(job).await,
                Ok(None) => {}
                Err(e) => {
                    tracing::error!("Worker {} queue error: {}", index, e);
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }
        tracing::info!("Matching worker {} stopped gracefully", index);
    }

    async fn pop_job(&self) -> Result<Option<QueuedJob>, ServiceError> {
        let redis = self.redis()?;
        let mut conn = ConnectionManager::clone(&redis);
        let queues: Vec<&str> = JobPriority::polling_order().to_vec();
        let popped: Option<(String, String)> = conn.brpop(queues, 5.0).await?;
        match popped {
            Some((_, payload)) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    async fn process_job(&self, job: QueuedJob) {
        let Ok(redis) = self.redis() else { return };
        self.write_meta(&redis, &job, JobStatus::Processing, None).await;
        let started = Instant::now();

        let outcome = tokio::time::timeout(self.job_timeout, self.run_task(&job)).await;
        match outcome {
            Ok(Ok(result)) => {
                let processing_time = started.elapsed().as_secs_f64();
                if let Err(e) = self
                    .store
                    .store(
                        &job.id,
                        &result,
                        JobStatus::Completed.to_str(),
                        Some(priority_label(job.priority)),
                        Some(processing_time),
                        None,
                    )
                    .await
                {
                    tracing::error!("Result persistence failed for job {}: {}", job.id, e);
                }
                self.write_meta(&redis, &job, JobStatus::Completed, None).await;
                if let Some(url) = &job.webhook_url {
                    self.notifier
                        .deliver(&job.id, JobStatus::Completed.to_str(), result, url)
                        .await;
                }
            }
            Ok(Err(error)) => {
                self.handle_failure(&redis, job, error.to_string()).await;
            }
            Err(_) => {
                self.handle_failure(
                    &redis,
                    job,
                    format!("job exceeded its {}s timeout", self.job_timeout.as_secs()),
                )
                .await;
            }
        }
    }

    /// Retries a failed job while attempts remain, then routes its
    /// payload to the dead-letter queue.
    async fn handle_failure(
        &self,
        redis: &Arc<ConnectionManager>,
        mut job: QueuedJob,
        error: String,
    ) {
        tracing::error!("Job {} failed: {}", job.id, error);

        if job.retries_left > 1 {
            job.retries_left -= 1;
            match serde_json::to_string(&job) {
                Ok(payload) => {
                    let mut conn = ConnectionManager::clone(redis);
                    let pushed: Result<(), redis::RedisError> =
                        conn.lpush(job.priority.queue_name(), payload).await;
                    match pushed {
                        Ok(()) => {
                            self.write_meta(redis, &job, JobStatus::Queued, Some(error)).await;
                            tracing::warn!(
                                "Job {} requeued, {} retries left",
                                job.id,
                                job.retries_left
                            );
                            return;
                        }
                        Err(e) => tracing::error!("Requeue failed for job {}: {}", job.id, e),
                    }
                }
                Err(e) => tracing::error!("Requeue serialization failed for job {}: {}", job.id, e),
            }
        }

        let dead_letter = json!({
            "id": job.id,
            "queue": job.priority.queue_name(),
            "payload": serde_json::to_value(&job).unwrap_or(Value::Null),
            "error": error,
        });
        let mut conn = ConnectionManager::clone(redis);
        let pushed: Result<(), redis::RedisError> =
            conn.lpush(DEAD_LETTER_QUEUE, dead_letter.to_string()).await;
        if let Err(e) = pushed {
            tracing::error!("Dead-letter push failed for job {}: {}", job.id, e);
        } else {
            tracing::warn!("Job {} moved to dead-letter queue", job.id);
        }

        self.write_meta(redis, &job, JobStatus::Failed, Some(error.clone())).await;
        let row = NewMatchResultRow {
            job_id: &job.id,
            status: JobStatus::Failed.to_str(),
            result_json: None,
            file_path: None,
            priority: Some(priority_label(job.priority)),
            processing_time: None,
            error: Some(&error),
        };
        if let Err(e) = self.db.upsert_match_result(row).await {
            tracing::error!("Failure row write failed for job {}: {}", job.id, e);
        }
    }

    fn task_options(&self, job: &QueuedJob) -> MatchOptions {
        let mut options = self.matching.defaults().options();
        if let Some(limit) = job.limit {
            options.limit = limit;
        }
        if let Some(min_score) = job.min_score {
            options.min_score = min_score;
        }
        options.algorithm = AlgorithmChoice::parse(job.algorithm.as_deref());
        // The commute flag pins the one variant that always resolves
        // real travel times.
        if job.with_commute_time && options.algorithm == AlgorithmChoice::Auto {
            options.algorithm = AlgorithmChoice::Named("comprehensive".to_string());
        }
        options
    }

    async fn run_task(&self, job: &QueuedJob) -> Result<Value, ServiceError> {
        let options = self.task_options(job);
        match job.kind {
            TaskKind::Match | TaskKind::FindJobs => {
                let candidate = job.candidate.as_ref().ok_or_else(|| {
                    ServiceError::InvalidInput("queued job has no candidate payload".to_string())
                })?;
                let response = self.matching.execute(candidate, &job.jobs, &options).await?;
                Ok(serde_json::to_value(response)?)
            }
            TaskKind::FindCandidates => {
                let posting = job.job.as_ref().ok_or_else(|| {
                    ServiceError::InvalidInput("queued job has no posting payload".to_string())
                })?;
                let jobs = vec![posting.clone()];

                let mut ranked = Vec::new();
                for (index, candidate) in job.candidates.iter().enumerate() {
                    match self.matching.execute(candidate, &jobs, &options).await {
                        Ok(response) => {
                            let score = response
                                .results
                                .first()
                                .map(|r| r.global_score)
                                .unwrap_or(0);
                            let candidate_id = candidate
                                .get("id")
                                .and_then(Value::as_str)
                                .map(str::to_string)
                                .unwrap_or_else(|| format!("candidate_{}", index));
                            ranked.push((score, candidate_id, serde_json::to_value(response)?));
                        }
                        Err(e) => {
                            tracing::warn!("Candidate #{} skipped: {}", index, e);
                        }
                    }
                }
                ranked.sort_by(|a, b| b.0.cmp(&a.0));
                ranked.truncate(options.limit);

                let matches: Vec<Value> = ranked
                    .into_iter()
                    .map(|(score, candidate_id, response)| {
                        json!({
                            "candidate_id": candidate_id,
                            "score": score,
                            "response": response,
                        })
                    })
                    .collect();

                Ok(json!({
                    "job": posting.get("id").cloned().unwrap_or(Value::Null),
                    "matches": matches,
                }))
            }
        }
    }
}

fn priority_label(priority: JobPriority) -> &'static str {
    match priority {
        JobPriority::High => "high",
        JobPriority::Default => "default",
        JobPriority::Low => "low",
    }
}
