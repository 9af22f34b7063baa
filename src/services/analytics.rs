//! Analytics counters (spec §4.10). Every engagement counter is mutated
//! through a single atomic UPDATE statement — the store's stand-in for the
//! spec's "atomic RPCs" (see DESIGN.md) — and `opened_at`/`clicked_at` are
//! only ever set on the first increment via `COALESCE`.

use serde_json::Value as Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::CoreError;

/// Which per-variant counter to bump (spec §4.10 `increment_variant_stat`).
#[derive(Debug, Clone, Copy)]
pub enum VariantStat {
    Sent,
    Opened,
    Clicked,
    Replied,
}

impl VariantStat {
    fn column(self) -> &'static str {
        match self {
            VariantStat::Sent => "sent_count",
            VariantStat::Opened => "opened_count",
            VariantStat::Clicked => "clicked_count",
            VariantStat::Replied => "replied_count",
        }
    }
}

pub async fn increment_email_open(pool: &PgPool, email_id: Uuid) -> Result<(), CoreError> {
    sqlx::query(
        r#"
        UPDATE emails
        SET open_count = open_count + 1,
            opened_at = COALESCE(opened_at, now()),
            status = CASE WHEN status IN ('sent', 'delivered') THEN 'opened' ELSE status END
        WHERE id = $1
        "#,
    )
    .bind(email_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn increment_email_click(pool: &PgPool, email_id: Uuid) -> Result<(), CoreError> {
    sqlx::query(
        r#"
        UPDATE emails
        SET click_count = click_count + 1,
            clicked_at = COALESCE(clicked_at, now()),
            status = CASE WHEN status IN ('sent', 'delivered', 'opened') THEN 'clicked' ELSE status END
        WHERE id = $1
        "#,
    )
    .bind(email_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn increment_campaign_opens(pool: &PgPool, campaign_id: Uuid) -> Result<(), CoreError> {
    sqlx::query("UPDATE campaigns SET opened_count = opened_count + 1 WHERE id = $1")
        .bind(campaign_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn increment_campaign_clicks(pool: &PgPool, campaign_id: Uuid) -> Result<(), CoreError> {
    sqlx::query("UPDATE campaigns SET clicked_count = clicked_count + 1 WHERE id = $1")
        .bind(campaign_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn increment_campaign_sent(pool: &PgPool, campaign_id: Uuid) -> Result<(), CoreError> {
    sqlx::query("UPDATE campaigns SET sent_count = sent_count + 1 WHERE id = $1")
        .bind(campaign_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn increment_campaign_bounces(pool: &PgPool, campaign_id: Uuid) -> Result<(), CoreError> {
    sqlx::query("UPDATE campaigns SET bounced_count = bounced_count + 1 WHERE id = $1")
        .bind(campaign_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn increment_campaign_replies(pool: &PgPool, campaign_id: Uuid) -> Result<(), CoreError> {
    sqlx::query("UPDATE campaigns SET replied_count = replied_count + 1 WHERE id = $1")
        .bind(campaign_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn increment_variant_stat(pool: &PgPool, variant_id: Uuid, stat: VariantStat) -> Result<(), CoreError> {
    let sql = format!("UPDATE sequence_variants SET {0} = {0} + 1 WHERE id = $1", stat.column());
    sqlx::query(&sql).bind(variant_id).execute(pool).await?;
    Ok(())
}

pub async fn increment_inbox_spam(pool: &PgPool, inbox_id: Uuid) -> Result<(), CoreError> {
    sqlx::query("UPDATE inboxes SET spam_complaints_total = spam_complaints_total + 1 WHERE id = $1")
        .bind(inbox_id)
        .execute(pool)
        .await?;
    Ok(())
}

async fn insert_email_event(pool: &PgPool, team_id: Uuid, email_id: Uuid, event_type: &str, metadata: Json) -> Result<(), CoreError> {
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

/// Open-tracking pipeline, call order fixed by spec §4.10: email-counter
/// RPC, then the `email_events` row, then the campaign RPC (if
/// campaign-attached), then the variant RPC (if variant-attached).
pub async fn record_open(
    pool: &PgPool,
    team_id: Uuid,
    email_id: Uuid,
    campaign_id: Option<Uuid>,
    variant_id: Option<Uuid>,
) -> Result<(), CoreError> {
    increment_email_open(pool, email_id).await?;
    insert_email_event(pool, team_id, email_id, "opened", Json::Null).await?;
    if let Some(campaign_id) = campaign_id {
        increment_campaign_opens(pool, campaign_id).await?;
    }
    if let Some(variant_id) = variant_id {
        increment_variant_stat(pool, variant_id, VariantStat::Opened).await?;
    }
    Ok(())
}

/// Same ordering as [`record_open`], for clicks.
pub async fn record_click(
    pool: &PgPool,
    team_id: Uuid,
    email_id: Uuid,
    campaign_id: Option<Uuid>,
    variant_id: Option<Uuid>,
) -> Result<(), CoreError> {
    increment_email_click(pool, email_id).await?;
    insert_email_event(pool, team_id, email_id, "clicked", Json::Null).await?;
    if let Some(campaign_id) = campaign_id {
        increment_campaign_clicks(pool, campaign_id).await?;
    }
    if let Some(variant_id) = variant_id {
        increment_variant_stat(pool, variant_id, VariantStat::Clicked).await?;
    }
    Ok(())
}
