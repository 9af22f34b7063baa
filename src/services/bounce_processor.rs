//! Bounce processor (spec §4.8). Consumes a `bounce-process` job and turns
//! delivery feedback into lead/suppression/inbox state, grounded on the
//! read-then-write RPC pattern in `health_monitor.rs`.

use chrono::{Duration, Utc};
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::CoreError;
use crate::models::compliance::SuppressionReason;
use crate::models::email::Email;
use crate::models::inbox::Inbox;
use crate::models::lead::Lead;
use crate::services::analytics;
use crate::services::job_queue::{BounceProcessPayload, EmailSendPayload, JobQueue};
use crate::services::lead_state::{self, LeadEvent, TransitionOutcome};

/// Retry backoff by attempt number: 1h, 4h, 24h (spec §4.8).
const SOFT_BOUNCE_BACKOFF: [i64; 3] = [3600, 4 * 3600, 24 * 3600];
const MAX_SOFT_BOUNCE_RETRIES: i32 = 3;

async fn add_suppression(pool: &PgPool, team_id: Uuid, email: &str, reason: SuppressionReason, details: Option<&str>) -> Result<(), CoreError> {
    sqlx::query(
        r#"
        INSERT INTO suppression_list (id, team_id, email, reason, details, created_at)
        VALUES ($1, $2, $3, $4, $5, now())
        ON CONFLICT (team_id, email) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(team_id)
    .bind(email.to_lowercase())
    .bind(reason.as_str())
    .bind(details)
    .execute(pool)
    .await?;
    Ok(())
}

async fn apply_lead_transition(pool: &PgPool, lead: &Lead, event: LeadEvent) -> Result<(), CoreError> {
    match lead_state::transition(lead.status(), event) {
        TransitionOutcome::Applied(next) => {
            sqlx::query("UPDATE leads SET status = $1, updated_at = now() WHERE id = $2")
                .bind(next.as_str())
                .bind(lead.id)
                .execute(pool)
                .await?;
        }
        TransitionOutcome::Blocked => {
            warn!(lead_id = %lead.id, ?event, "lead transition blocked, state unchanged");
        }
    }
    Ok(())
}

async fn log_email_event(pool: &PgPool, team_id: Uuid, email_id: Uuid, event_type: &str, metadata: serde_json::Value) -> Result<(), CoreError> {
    sqlx::query(
        "INSERT INTO email_events (id, team_id, email_id, event_type, metadata, created_at) VALUES ($1, $2, $3, $4, $5, now())",
    )
    .bind(Uuid::new_v4())
    .bind(team_id)
    .bind(email_id)
    .bind(event_type)
    .bind(metadata)
    .execute(pool)
    .await?;
    Ok(())
}

async fn check_inbox_health(pool: &PgPool, config: &Config, inbox_id: Uuid) -> Result<(), CoreError> {
    let inbox: Option<Inbox> = sqlx::query_as("SELECT * FROM inboxes WHERE id = $1").bind(inbox_id).fetch_optional(pool).await?;
    let Some(inbox) = inbox else { return Ok(()) };

    if inbox.sent_total < config.min_emails_for_rate {
        return Ok(());
    }
    if inbox.bounce_rate() <= config.bounce_rate_threshold {
        return Ok(());
    }

    let reason = format!("High bounce rate: {:.1}%", inbox.bounce_rate() * 100.0);
    sqlx::query(
        "UPDATE inboxes SET status = 'paused', paused_at = now(), pause_reason = $2 WHERE id = $1",
    )
    .bind(inbox.id)
    .bind(&reason)
    .execute(pool)
    .await?;

    sqlx::query(
        "INSERT INTO inbox_events (id, team_id, inbox_id, event_type, metadata, created_at) VALUES ($1, $2, $3, 'auto_paused', $4, now())",
    )
    .bind(Uuid::new_v4())
    .bind(inbox.team_id)
    .bind(inbox.id)
    .bind(serde_json::json!({ "reason": reason, "bounce_rate": inbox.bounce_rate() }))
    .execute(pool)
    .await?;

    info!(inbox_id = %inbox.id, reason, "inbox auto-paused for high bounce rate");
    Ok(())
}

/// Processes one `bounce-process` job (spec §4.8, P7, P8).
pub async fn process_bounce(pool: &PgPool, queue: &JobQueue, config: &Config, payload: BounceProcessPayload) -> Result<(), CoreError> {
    let email: Email = sqlx::query_as("SELECT * FROM emails WHERE id = $1")
        .bind(payload.email_id)
        .fetch_one(pool)
        .await?;
    let lead: Lead = sqlx::query_as("SELECT * FROM leads WHERE id = $1").bind(payload.lead_id).fetch_one(pool).await?;

    let mut bounce_type = payload.bounce_type.clone();
    let mut bounce_reason = payload.bounce_reason.clone();

    if bounce_type == "soft" {
        if email.soft_bounce_count < MAX_SOFT_BOUNCE_RETRIES {
            let new_count = email.soft_bounce_count + 1;
            sqlx::query(
                "UPDATE emails SET status = 'retry_pending', soft_bounce_count = $2, bounce_reason = $3, last_retry_at = now() WHERE id = $1",
            )
            .bind(email.id)
            .bind(new_count)
            .bind(&bounce_reason)
            .execute(pool)
            .await?;

            let delay_secs = SOFT_BOUNCE_BACKOFF[(new_count - 1) as usize];
            let run_at = Utc::now() + Duration::seconds(delay_secs);
            queue
                .enqueue_email_send(
                    EmailSendPayload {
                        email_id: email.id,
                        lead_id: lead.id,
                        campaign_id: email.campaign_id,
                        inbox_id: email.inbox_id,
                        sequence_step: email.step_number,
                        is_retry: true,
                        retry_count: new_count,
                    },
                    email.team_id,
                    run_at,
                    format!("retry-{}-{}", email.id, new_count),
                )
                .await?;

            log_email_event(
                pool,
                email.team_id,
                email.id,
                "retry_scheduled",
                serde_json::json!({ "soft_bounce_count": new_count, "delay_seconds": delay_secs }),
            )
            .await?;

            log_email_event(pool, email.team_id, email.id, "bounced", serde_json::to_value(&payload)?).await?;
            analytics::increment_campaign_bounces(pool, email.campaign_id).await?;
            return Ok(());
        }

        // Retries exhausted: treat as hard bounce from here on (spec §4.8, P7).
        bounce_type = "hard".to_string();
        bounce_reason = format!("{} (max retries exceeded)", bounce_reason);
    }

    sqlx::query(
        "UPDATE emails SET status = 'bounced', bounce_type = $2, bounce_reason = $3, bounced_at = now() WHERE id = $1",
    )
    .bind(email.id)
    .bind(&bounce_type)
    .bind(&bounce_reason)
    .execute(pool)
    .await?;

    match bounce_type.as_str() {
        "hard" => {
            apply_lead_transition(pool, &lead, LeadEvent::HardBounce).await?;
            add_suppression(pool, lead.team_id, &lead.email, SuppressionReason::HardBounce, Some(&bounce_reason)).await?;
        }
        "complaint" => {
            apply_lead_transition(pool, &lead, LeadEvent::SpamComplaint).await?;
            add_suppression(pool, lead.team_id, &lead.email, SuppressionReason::SpamComplaint, Some(&bounce_reason)).await?;
            sqlx::query("UPDATE inboxes SET spam_complaints_total = spam_complaints_total + 1 WHERE id = $1")
                .bind(email.inbox_id)
                .execute(pool)
                .await?;
        }
        other => {
            warn!(bounce_type = other, "unrecognized bounce type, leaving lead state unchanged");
        }
    }

    log_email_event(pool, email.team_id, email.id, "bounced", serde_json::to_value(&payload)?).await?;
    analytics::increment_campaign_bounces(pool, email.campaign_id).await?;

    if bounce_type == "hard" || bounce_type == "complaint" {
        check_inbox_health(pool, config, email.inbox_id).await?;
    }

    Ok(())
}
