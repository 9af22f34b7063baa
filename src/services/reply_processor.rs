//! Reply processor (spec §4.9). Matches an inbound message to a sent email
//! by thread headers, records a `Reply`, updates campaign/variant reply
//! counters, and — when the owning campaign's `stop_on_reply` setting is
//! on — moves the lead through the reply/intent branch of the state
//! machine. Grounded on the read-then-write RPC shape and per-item error
//! isolation already used in `bounce_processor.rs`.

use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::CoreError;
use crate::models::campaign::{Campaign, CampaignSettings};
use crate::models::email::Email;
use crate::models::lead::Lead;
use crate::models::reply::ReplyIntent;
use crate::services::analytics::{self, VariantStat};
use crate::services::lead_state::{self, LeadEvent, TransitionOutcome};
use crate::services::reply_classifier;

const BODY_PREVIEW_MAX: usize = 500;

/// An inbound message as handed to the processor by whatever surface
/// receives it (inbound SMTP relay, provider webhook, IMAP poll — none of
/// those are this module's concern; it only consumes the parsed result).
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub team_id: Uuid,
    pub from_email: String,
    pub body: String,
    pub thread_id: Option<String>,
    pub in_reply_to: Option<String>,
    pub references_header: Option<String>,
}

fn references_list(references: &str) -> Vec<&str> {
    references.split_whitespace().collect()
}

/// Matches an inbound message to the sent email it replies to, trying
/// `thread_id`, then `in_reply_to`, then `references`, in that order (spec
/// §4.9). Picks the latest step when more than one email shares a key.
async fn match_email(pool: &PgPool, msg: &InboundMessage) -> Result<Option<Email>, CoreError> {
    if let Some(thread_id) = msg.thread_id.as_deref() {
        let email: Option<Email> = sqlx::query_as(
            "SELECT * FROM emails WHERE team_id = $1 AND thread_id = $2 ORDER BY step_number DESC LIMIT 1",
        )
        .bind(msg.team_id)
        .bind(thread_id)
        .fetch_optional(pool)
        .await?;
        if email.is_some() {
            return Ok(email);
        }
    }

    if let Some(in_reply_to) = msg.in_reply_to.as_deref() {
        let email: Option<Email> = sqlx::query_as(
            "SELECT * FROM emails WHERE team_id = $1 AND message_id = $2 ORDER BY step_number DESC LIMIT 1",
        )
        .bind(msg.team_id)
        .bind(in_reply_to)
        .fetch_optional(pool)
        .await?;
        if email.is_some() {
            return Ok(email);
        }
    }

    if let Some(references) = msg.references_header.as_deref() {
        let ids: Vec<String> = references_list(references).into_iter().map(str::to_string).collect();
        if !ids.is_empty() {
            let email: Option<Email> = sqlx::query_as(
                "SELECT * FROM emails WHERE team_id = $1 AND message_id = ANY($2) ORDER BY step_number DESC LIMIT 1",
            )
            .bind(msg.team_id)
            .bind(&ids)
            .fetch_optional(pool)
            .await?;
            if email.is_some() {
                return Ok(email);
            }
        }
    }

    Ok(None)
}

async fn record_reply(pool: &PgPool, email: &Email, msg: &InboundMessage, intent: ReplyIntent) -> Result<Uuid, CoreError> {
    let preview: String = msg.body.chars().take(BODY_PREVIEW_MAX).collect();
    let row: (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO replies (id, team_id, email_id, from_email, body_preview, intent, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, now())
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(msg.team_id)
    .bind(email.id)
    .bind(&msg.from_email)
    .bind(&preview)
    .bind(intent.as_str())
    .fetch_one(pool)
    .await?;
    Ok(row.0)
}

async fn apply_lead_transition(pool: &PgPool, lead: &Lead, event: LeadEvent) -> Result<LeadEvent, CoreError> {
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
    Ok(event)
}

/// Maps a classified intent to the state-machine event it drives. Three of
/// the seven categories (question, out-of-office, auto-reply) and bounce
/// notices that arrive as a "reply" carry no onward transition of their
/// own — the lead simply stays `replied`.
fn intent_event(intent: ReplyIntent) -> Option<LeadEvent> {
    match intent {
        ReplyIntent::Interested => Some(LeadEvent::IntentInterested),
        ReplyIntent::NotInterested => Some(LeadEvent::IntentNotInterested),
        ReplyIntent::MeetingBooked => Some(LeadEvent::IntentMeetingBooked),
        ReplyIntent::Question | ReplyIntent::OutOfOffice | ReplyIntent::AutoReply | ReplyIntent::Bounce => None,
    }
}

/// Processes one inbound message (spec §4.9).
pub async fn process_inbound_reply(pool: &PgPool, config: &Config, msg: InboundMessage) -> Result<(), CoreError> {
    let Some(email) = match_email(pool, &msg).await? else {
        info!(from = %msg.from_email, "inbound message matched no outbound email, ignoring");
        return Ok(());
    };

    let lead: Lead = sqlx::query_as("SELECT * FROM leads WHERE id = $1").bind(email.lead_id).fetch_one(pool).await?;
    let campaign: Campaign = sqlx::query_as("SELECT * FROM campaigns WHERE id = $1").bind(email.campaign_id).fetch_one(pool).await?;
    let settings = CampaignSettings::from_json(&campaign.settings);

    let (intent, confidence) = reply_classifier::classify_reply_with_fallback(config.anthropic_api_key.as_deref(), &msg.body).await;
    info!(email_id = %email.id, ?intent, confidence, "classified inbound reply");

    record_reply(pool, &email, &msg, intent).await?;
    analytics::increment_campaign_replies(pool, campaign.id).await?;
    if let Some(variant_id) = email.variant_id {
        analytics::increment_variant_stat(pool, variant_id, VariantStat::Replied).await?;
    }

    if settings.stop_on_reply {
        apply_lead_transition(pool, &lead, LeadEvent::ReplyReceived).await?;
        if let Some(event) = intent_event(intent) {
            let replied: Lead = sqlx::query_as("SELECT * FROM leads WHERE id = $1").bind(lead.id).fetch_one(pool).await?;
            apply_lead_transition(pool, &replied, event).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn references_list_splits_on_whitespace() {
        assert_eq!(references_list("<a@x> <b@x>  <c@x>"), vec!["<a@x>", "<b@x>", "<c@x>"]);
    }

    #[test]
    fn intent_maps_only_decisive_categories() {
        assert_eq!(intent_event(ReplyIntent::Interested), Some(LeadEvent::IntentInterested));
        assert_eq!(intent_event(ReplyIntent::NotInterested), Some(LeadEvent::IntentNotInterested));
        assert_eq!(intent_event(ReplyIntent::MeetingBooked), Some(LeadEvent::IntentMeetingBooked));
        assert_eq!(intent_event(ReplyIntent::Question), None);
        assert_eq!(intent_event(ReplyIntent::OutOfOffice), None);
        assert_eq!(intent_event(ReplyIntent::AutoReply), None);
        assert_eq!(intent_event(ReplyIntent::Bounce), None);
    }
}
