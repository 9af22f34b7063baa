//! Work queue backed by Postgres (spec §6 persisted job shapes, §5 queue
//! guarantees). Claiming uses `SELECT ... FOR UPDATE SKIP LOCKED` so many
//! worker processes can share one `jobs` table safely.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    EmailSend,
    BounceProcess,
    WarmupSend,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::EmailSend => "email-send",
            JobType::BounceProcess => "bounce-process",
            JobType::WarmupSend => "warmup-send",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "email-send" => JobType::EmailSend,
            "bounce-process" => JobType::BounceProcess,
            "warmup-send" => JobType::WarmupSend,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Scheduled,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Scheduled => "scheduled",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub job_type: JobType,
    pub payload: serde_json::Value,
    pub attempts: i32,
    pub max_attempts: i32,
    pub created_at: DateTime<Utc>,
    pub team_id: Option<Uuid>,
    pub idempotency_key: Option<String>,
}

/// Spec §6: `email-send = {emailId, leadId, campaignId, inboxId, sequenceStep, isRetry?, retryCount?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailSendPayload {
    pub email_id: Uuid,
    pub lead_id: Uuid,
    pub campaign_id: Uuid,
    pub inbox_id: Uuid,
    pub sequence_step: i32,
    #[serde(default)]
    pub is_retry: bool,
    #[serde(default)]
    pub retry_count: i32,
}

/// Spec §6: `bounce-process = {emailId, leadId, inboxId, campaignId?, bounceType, bounceReason, diagnosticCode?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BounceProcessPayload {
    pub email_id: Uuid,
    pub lead_id: Uuid,
    pub inbox_id: Uuid,
    pub campaign_id: Option<Uuid>,
    pub bounce_type: String,
    pub bounce_reason: String,
    pub diagnostic_code: Option<String>,
}

/// Spec §6: `warmup-send = {fromInboxId, toInboxId, templateType, threadDepth, maxThreadDepth, isNetworkWarmup}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmupSendPayload {
    pub from_inbox_id: Uuid,
    pub to_inbox_id: Uuid,
    pub template_type: String,
    pub thread_depth: i32,
    pub max_thread_depth: i32,
    pub is_network_warmup: bool,
}

pub struct JobQueue {
    pool: Arc<PgPool>,
}

impl JobQueue {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Enqueue a job to run at `run_at`. `idempotency_key`, when present, is
    /// unique per spec §4.4/§5 ("job key is `campaign-<cid>-<leadid>-<step>-<YYYYMMDD>`
    /// to make it idempotent for the day"); a conflicting key is a no-op and
    /// the existing job's id is returned.
    pub async fn enqueue(
        &self,
        job_type: JobType,
        payload: serde_json::Value,
        team_id: Option<Uuid>,
        run_at: DateTime<Utc>,
        idempotency_key: Option<String>,
    ) -> Result<Uuid, CoreError> {
        let job_id = Uuid::new_v4();
        let now = Utc::now();
        let status = if run_at <= now { JobStatus::Pending } else { JobStatus::Scheduled };

        let inserted: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO jobs (id, job_type, payload, status, attempts, max_attempts, created_at, team_id, next_retry_at, idempotency_key)
            VALUES ($1, $2, $3, $4, 0, 3, $5, $6, $7, $8)
            ON CONFLICT (idempotency_key) WHERE idempotency_key IS NOT NULL DO NOTHING
            RETURNING id
            "#,
        )
        .bind(job_id)
        .bind(job_type.as_str())
        .bind(&payload)
        .bind(status.as_str())
        .bind(now)
        .bind(team_id)
        .bind(run_at)
        .bind(&idempotency_key)
        .fetch_optional(self.pool.as_ref())
        .await?;

        match inserted {
            Some((id,)) => Ok(id),
            None => {
                let key = idempotency_key.as_deref().unwrap_or_default();
                let existing: (Uuid,) = sqlx::query_as("SELECT id FROM jobs WHERE idempotency_key = $1")
                    .bind(key)
                    .fetch_one(self.pool.as_ref())
                    .await?;
                Ok(existing.0)
            }
        }
    }

    pub async fn enqueue_email_send(
        &self,
        payload: EmailSendPayload,
        team_id: Uuid,
        run_at: DateTime<Utc>,
        idempotency_key: String,
    ) -> Result<Uuid, CoreError> {
        self.enqueue(JobType::EmailSend, serde_json::to_value(payload)?, Some(team_id), run_at, Some(idempotency_key))
            .await
    }

    pub async fn enqueue_bounce_process(&self, payload: BounceProcessPayload, team_id: Uuid) -> Result<Uuid, CoreError> {
        self.enqueue(JobType::BounceProcess, serde_json::to_value(payload)?, Some(team_id), Utc::now(), None).await
    }

    pub async fn enqueue_warmup_send(&self, payload: WarmupSendPayload, team_id: Uuid, run_at: DateTime<Utc>) -> Result<Uuid, CoreError> {
        self.enqueue(JobType::WarmupSend, serde_json::to_value(payload)?, Some(team_id), run_at, None).await
    }

    /// Atomically claim due jobs with `SELECT ... FOR UPDATE SKIP LOCKED`,
    /// so concurrent worker processes never double-claim (spec §5).
    pub async fn claim_due_jobs(&self, limit: i64) -> Result<Vec<Job>, CoreError> {
        #[derive(sqlx::FromRow)]
        struct Row {
            id: Uuid,
            job_type: String,
            payload: serde_json::Value,
            attempts: i32,
            max_attempts: i32,
            created_at: DateTime<Utc>,
            team_id: Option<Uuid>,
            idempotency_key: Option<String>,
        }

        let rows: Vec<Row> = sqlx::query_as(
            r#"
            WITH claimed AS (
                SELECT id FROM jobs
                WHERE status = 'pending'
                   OR (status = 'scheduled' AND next_retry_at <= now())
                ORDER BY created_at ASC
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE jobs SET status = 'processing', started_at = now(), attempts = jobs.attempts + 1
            FROM claimed
            WHERE jobs.id = claimed.id
            RETURNING jobs.id, jobs.job_type, jobs.payload, jobs.attempts, jobs.max_attempts, jobs.created_at, jobs.team_id, jobs.idempotency_key
            "#,
        )
        .bind(limit)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|r| {
                Some(Job {
                    id: r.id,
                    job_type: JobType::from_str(&r.job_type)?,
                    payload: r.payload,
                    attempts: r.attempts,
                    max_attempts: r.max_attempts,
                    created_at: r.created_at,
                    team_id: r.team_id,
                    idempotency_key: r.idempotency_key,
                })
            })
            .collect())
    }

    pub async fn mark_completed(&self, job_id: Uuid) -> Result<(), CoreError> {
        sqlx::query("UPDATE jobs SET status = 'completed', completed_at = now() WHERE id = $1")
            .bind(job_id)
            .execute(self.pool.as_ref())
            .await?;
        Ok(())
    }

    /// Exponential backoff: 30s, 2m, 8m, dead-lettered after `max_attempts`
    /// (spec §7 "transient I/O").
    pub async fn mark_failed(&self, job: &Job, error: &str) -> Result<(), CoreError> {
        let backoff = Duration::seconds(30 * 4i64.pow(job.attempts.max(1) as u32 - 1));
        let next_retry = Utc::now() + backoff;
        let dead_letter = job.attempts >= job.max_attempts;

        sqlx::query(
            r#"
            UPDATE jobs
            SET status = CASE WHEN $3 THEN 'failed' ELSE 'scheduled' END,
                error = $2,
                next_retry_at = CASE WHEN $3 THEN NULL ELSE $4 END
            WHERE id = $1
            "#,
        )
        .bind(job.id)
        .bind(error)
        .bind(dead_letter)
        .bind(next_retry)
        .execute(self.pool.as_ref())
        .await?;

        if dead_letter {
            sqlx::query(
                "INSERT INTO operator_events (id, event_type, metadata, created_at) VALUES ($1, 'job_dead_lettered', $2, now())",
            )
            .bind(Uuid::new_v4())
            .bind(serde_json::json!({ "job_id": job.id, "job_type": job.job_type.as_str(), "error": error }))
            .execute(self.pool.as_ref())
            .await?;
        }

        Ok(())
    }
}
