//! Email Send Worker (spec component 5). Consumes an `email-send` job for
//! an already-rendered `Email` row (rendering happens once, at enqueue
//! time, in `campaign_scheduler.rs`), hands it to the SMTP transport, and
//! records the outcome. The actual mail transport — Gmail, Microsoft
//! Graph, or raw SMTP — is explicitly out of scope (spec §1: "only their
//! contract is referenced"); this module depends on nothing more than
//! "hand a message to a transport, get a message id or an error string
//! back", backed here by the `lettre` SMTP client this repo already
//! carries.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use lettre::{
    message::{header::ContentType, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use regex::Regex;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::CoreError;
use crate::models::campaign::{Campaign, CampaignStatus};
use crate::models::email::Email;
use crate::models::inbox::{Inbox, InboxStatus};
use crate::models::lead::Lead;
use crate::services::analytics::{self, VariantStat};
use crate::services::encryption::EncryptionService;
use crate::services::job_queue::EmailSendPayload;
use crate::services::lead_state::{self, LeadEvent, TransitionOutcome};
use crate::services::template_engine;

/// Conservative keyword match for provider auth failures (spec §7). Every
/// entry is a whole word or phrase so "author"/"authority" never trip it.
const PROVIDER_AUTH_FAILURE_PATTERN: &str = r"(?i)\b(unauthorized|invalid_grant|invalid_client|token expired|token has been revoked|refresh token|authentication|auth_error|insufficient permissions)\b";

fn is_provider_auth_failure(message: &str) -> bool {
    Regex::new(PROVIDER_AUTH_FAILURE_PATTERN).map(|re| re.is_match(message)).unwrap_or(false)
}

fn strip_html(html: &str) -> String {
    Regex::new(r"<[^>]*>").map(|re| re.replace_all(html, "").to_string()).unwrap_or_else(|_| html.to_string())
}

fn generate_message_id(email_id: Uuid, inbox_email: &str) -> String {
    let domain = inbox_email.split('@').nth(1).unwrap_or("outreachiq.local");
    format!("<{}@{}>", email_id, domain)
}

fn decrypt_smtp_password(config: &Config, inbox: &Inbox) -> Result<String, String> {
    let encrypted = inbox.smtp_password_encrypted.as_ref().ok_or("inbox has no stored SMTP credentials")?;
    let key_b64 = config.encryption_key.as_deref().ok_or("ENCRYPTION_KEY not configured")?;
    let key_bytes = BASE64.decode(key_b64).map_err(|e| format!("invalid ENCRYPTION_KEY: {e}"))?;
    let key_id = inbox.encryption_key_id.as_deref().unwrap_or(&config.encryption_key_id);
    let service = EncryptionService::new_with_key(&key_bytes, key_id)?;
    service.decrypt(encrypted)
}

/// Builds and hands one message to the SMTP transport. Returns the
/// Message-ID we assigned (not the transport's own response text, which
/// is only a protocol acknowledgment) or an error string for the §7
/// taxonomy to classify.
async fn deliver(config: &Config, inbox: &Inbox, email: &Email) -> Result<String, String> {
    let smtp_host = inbox.smtp_host.clone().or_else(|| config.smtp_host.clone()).ok_or("inbox has no SMTP host configured")?;
    let smtp_port = inbox.smtp_port.map(|p| p as u16).or(config.smtp_port).unwrap_or(587);
    let smtp_username = inbox.smtp_username.clone().unwrap_or_else(|| inbox.email.clone());
    let password = decrypt_smtp_password(config, inbox)?;

    let from_name = inbox.from_name.clone().or_else(|| inbox.sender_first_name.clone()).unwrap_or_default();
    let from = if from_name.is_empty() { inbox.email.clone() } else { format!("{} <{}>", from_name, inbox.email) };

    let message_id = generate_message_id(email.id, &inbox.email);

    let mut builder = Message::builder()
        .from(from.parse().map_err(|e| format!("invalid from address: {e}"))?)
        .to(email.to_email.parse().map_err(|e| format!("invalid to address: {e}"))?)
        .subject(&email.subject)
        .message_id(Some(message_id.clone()));

    if let Some(in_reply_to) = &email.in_reply_to {
        builder = builder.in_reply_to(in_reply_to.clone());
    }
    if let Some(references) = &email.references_header {
        builder = builder.references(references.clone());
    }

    let message = builder
        .multipart(
            MultiPart::alternative()
                .singlepart(SinglePart::builder().header(ContentType::TEXT_PLAIN).body(strip_html(&email.body_html)))
                .singlepart(SinglePart::builder().header(ContentType::TEXT_HTML).body(email.body_html.clone())),
        )
        .map_err(|e| format!("failed to build message: {e}"))?;

    let creds = Credentials::new(smtp_username, password);
    let mailer: AsyncSmtpTransport<Tokio1Executor> = AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp_host)
        .map_err(|e| format!("failed to create transport: {e}"))?
        .credentials(creds)
        .port(smtp_port)
        .build();

    mailer.send(message).await.map_err(|e| e.to_string())?;
    Ok(message_id)
}

async fn record_success(pool: &PgPool, email: &Email, inbox: &Inbox, campaign: &Campaign, message_id: &str) -> Result<(), CoreError> {
    sqlx::query("UPDATE emails SET status = 'sent', message_id = $2, sent_at = now() WHERE id = $1")
        .bind(email.id)
        .bind(message_id)
        .execute(pool)
        .await?;

    sqlx::query("UPDATE inboxes SET sent_today = sent_today + 1, sent_total = sent_total + 1 WHERE id = $1")
        .bind(inbox.id)
        .execute(pool)
        .await?;

    analytics::increment_campaign_sent(pool, campaign.id).await?;
    if let Some(variant_id) = email.variant_id {
        analytics::increment_variant_stat(pool, variant_id, VariantStat::Sent).await?;
    }

    let lead: Lead = sqlx::query_as("SELECT * FROM leads WHERE id = $1").bind(email.lead_id).fetch_one(pool).await?;
    if let TransitionOutcome::Applied(next) = lead_state::transition(lead.status(), LeadEvent::EmailDelivered) {
        sqlx::query("UPDATE leads SET status = $1, updated_at = now() WHERE id = $2")
            .bind(next.as_str())
            .bind(lead.id)
            .execute(pool)
            .await?;
    }

    sqlx::query(
        "INSERT INTO email_events (id, team_id, email_id, event_type, metadata, created_at) VALUES ($1, $2, $3, 'sent', $4, now())",
    )
    .bind(Uuid::new_v4())
    .bind(email.team_id)
    .bind(email.id)
    .bind(serde_json::json!({ "message_id": message_id }))
    .execute(pool)
    .await?;

    info!(email_id = %email.id, inbox_id = %inbox.id, "email sent");
    Ok(())
}

async fn disconnect_inbox(pool: &PgPool, inbox: &Inbox, error: &str) -> Result<(), CoreError> {
    sqlx::query("UPDATE inboxes SET status = 'error', status_reason = $2 WHERE id = $1")
        .bind(inbox.id)
        .bind(format!("disconnected: {error}"))
        .execute(pool)
        .await?;

    sqlx::query("UPDATE warmup_states SET enabled = false WHERE inbox_id = $1")
        .bind(inbox.id)
        .execute(pool)
        .await?;

    sqlx::query(
        "INSERT INTO inbox_events (id, team_id, inbox_id, event_type, metadata, created_at) VALUES ($1, $2, $3, 'provider_auth_failure', $4, now())",
    )
    .bind(Uuid::new_v4())
    .bind(inbox.team_id)
    .bind(inbox.id)
    .bind(serde_json::json!({ "error": error }))
    .execute(pool)
    .await?;

    warn!(inbox_id = %inbox.id, error, "inbox disconnected on provider auth failure, warmup disabled");
    Ok(())
}

/// Processes one `email-send` job (spec component 5, §7).
pub async fn send_email(pool: &PgPool, config: &Config, payload: EmailSendPayload) -> Result<(), CoreError> {
    let email: Email = sqlx::query_as("SELECT * FROM emails WHERE id = $1").bind(payload.email_id).fetch_one(pool).await?;
    let campaign: Campaign = sqlx::query_as("SELECT * FROM campaigns WHERE id = $1").bind(payload.campaign_id).fetch_one(pool).await?;

    // Cancellation point (spec §5): a campaign paused between dequeue and
    // dispatch must not have its job delivered.
    if matches!(campaign.status(), CampaignStatus::Paused | CampaignStatus::Archived) {
        info!(email_id = %email.id, campaign_id = %campaign.id, "campaign no longer active, skipping send");
        return Ok(());
    }

    let inbox: Inbox = sqlx::query_as("SELECT * FROM inboxes WHERE id = $1").bind(payload.inbox_id).fetch_one(pool).await?;
    if !matches!(inbox.status(), InboxStatus::Active | InboxStatus::WarmingUp) {
        info!(email_id = %email.id, inbox_id = %inbox.id, "inbox not in a sendable state, skipping send");
        return Ok(());
    }

    // P10: rendered content leaving the queue must already be pure.
    if template_engine::contains_unresolved_markup(&email.subject) || template_engine::contains_unresolved_markup(&email.body_html) {
        warn!(email_id = %email.id, "rendered content still contains unresolved template markup, refusing to send");
        sqlx::query("UPDATE emails SET status = 'failed' WHERE id = $1").bind(email.id).execute(pool).await?;
        return Err(CoreError::Template("rendered content still contains unresolved markup".into()));
    }

    match deliver(config, &inbox, &email).await {
        Ok(message_id) => record_success(pool, &email, &inbox, &campaign, &message_id).await,
        Err(transport_error) => {
            if is_provider_auth_failure(&transport_error) {
                disconnect_inbox(pool, &inbox, &transport_error).await?;
            }
            sqlx::query("UPDATE emails SET status = 'failed' WHERE id = $1").bind(email.id).execute(pool).await?;
            Err(CoreError::External(transport_error))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_auth_keywords_match_whole_words_only() {
        assert!(is_provider_auth_failure("401 Unauthorized: invalid_grant"));
        assert!(is_provider_auth_failure("the refresh token has expired"));
        assert!(is_provider_auth_failure("Authentication failed for user"));
        assert!(!is_provider_auth_failure("unknown author on this document"));
        assert!(!is_provider_auth_failure("connection reset by peer"));
    }

    #[test]
    fn message_id_is_bracketed_and_stable_per_email() {
        let id = Uuid::new_v4();
        let mid = generate_message_id(id, "jo@example.com");
        assert!(mid.starts_with('<') && mid.ends_with('>'));
        assert!(mid.contains("example.com"));
        assert_eq!(mid, generate_message_id(id, "jo@example.com"));
    }

    #[test]
    fn strip_html_removes_tags_only() {
        assert_eq!(strip_html("<p>Hi <b>Jo</b></p>"), "Hi Jo");
    }
}
