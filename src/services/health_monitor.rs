//! Health Monitor (spec component 10). Periodically recomputes every
//! mailbox's health score (spec §4.11) from its own counters and warmup
//! state, persists it, and pauses mailboxes that fall below the
//! configured floor — a backstop alongside `bounce_processor.rs`'s
//! immediate per-bounce-event pause, not a replacement for it. Grounded
//! on `campaign_scheduler.rs`'s tick/per-item error-isolation idiom.

use sqlx::PgPool;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::CoreError;
use crate::models::inbox::{Inbox, InboxStatus, WarmupState};
use crate::services::health_score::{compute_health_score, HealthInputs};

async fn warmup_state(pool: &PgPool, inbox_id: Uuid) -> Result<Option<WarmupState>, CoreError> {
    Ok(sqlx::query_as("SELECT * FROM warmup_states WHERE inbox_id = $1").bind(inbox_id).fetch_optional(pool).await?)
}

fn inputs_for(inbox: &Inbox, warmup: Option<&WarmupState>) -> HealthInputs {
    HealthInputs {
        warmup_enabled: warmup.map(|w| w.enabled).unwrap_or(false),
        warmup_current_day: warmup.map(|w| w.current_day).unwrap_or(0),
        sent_total: inbox.sent_total,
        replied_total: inbox.replied_total,
        bounced_total: inbox.bounced_total,
        spam_complaints_total: inbox.spam_complaints_total as i64,
    }
}

async fn recompute_one(pool: &PgPool, config: &Config, inbox: Inbox) -> Result<(), CoreError> {
    let warmup = warmup_state(pool, inbox.id).await?;
    let score = compute_health_score(inputs_for(&inbox, warmup.as_ref()));

    sqlx::query("UPDATE inboxes SET health_score = $2 WHERE id = $1")
        .bind(inbox.id)
        .bind(score)
        .execute(pool)
        .await?;

    let sendable = matches!(inbox.status(), InboxStatus::Active | InboxStatus::WarmingUp);
    if sendable && score < config.min_inbox_health_score {
        let reason = format!("Health score {} fell below floor {}", score, config.min_inbox_health_score);
        sqlx::query("UPDATE inboxes SET status = 'paused', paused_at = now(), pause_reason = $2 WHERE id = $1")
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
        .bind(serde_json::json!({ "reason": reason, "health_score": score }))
        .execute(pool)
        .await?;

        warn!(inbox_id = %inbox.id, score, "inbox auto-paused: health score below floor");
    } else {
        info!(inbox_id = %inbox.id, score, "health score recomputed");
    }

    Ok(())
}

/// One tick (spec component 10): recompute every inbox's health score and
/// apply the auto-pause backstop. Errors on one inbox never block the
/// rest, mirroring the campaign scheduler's per-item isolation.
pub async fn tick(pool: &PgPool, config: &Config) -> Result<(), CoreError> {
    let inboxes: Vec<Inbox> = sqlx::query_as("SELECT * FROM inboxes WHERE status IN ('active', 'warming_up', 'paused')")
        .fetch_all(pool)
        .await?;

    for inbox in inboxes {
        let inbox_id = inbox.id;
        if let Err(e) = recompute_one(pool, config, inbox).await {
            error!(inbox_id = %inbox_id, error = %e, "health monitor failed to process inbox");
        }
    }

    Ok(())
}
