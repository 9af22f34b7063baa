use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmailStatus {
    Queued,
    Sending,
    Sent,
    Delivered,
    Opened,
    Clicked,
    Bounced,
    RetryPending,
    Failed,
}

impl EmailStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailStatus::Queued => "queued",
            EmailStatus::Sending => "sending",
            EmailStatus::Sent => "sent",
            EmailStatus::Delivered => "delivered",
            EmailStatus::Opened => "opened",
            EmailStatus::Clicked => "clicked",
            EmailStatus::Bounced => "bounced",
            EmailStatus::RetryPending => "retry_pending",
            EmailStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "queued" => EmailStatus::Queued,
            "sending" => EmailStatus::Sending,
            "sent" => EmailStatus::Sent,
            "delivered" => EmailStatus::Delivered,
            "opened" => EmailStatus::Opened,
            "clicked" => EmailStatus::Clicked,
            "bounced" => EmailStatus::Bounced,
            "retry_pending" => EmailStatus::RetryPending,
            "failed" => EmailStatus::Failed,
            _ => return None,
        })
    }

    /// Statuses counted as a successful prior-step send for gating step N+1
    /// (spec §4.4 step 3).
    pub fn counts_as_successful_send(&self) -> bool {
        matches!(
            self,
            EmailStatus::Sent | EmailStatus::Delivered | EmailStatus::Opened | EmailStatus::Clicked
        )
    }
}

impl std::fmt::Display for EmailStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BounceType {
    Hard,
    Soft,
    Complaint,
}

impl BounceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BounceType::Hard => "hard",
            BounceType::Soft => "soft",
            BounceType::Complaint => "complaint",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "hard" => BounceType::Hard,
            "soft" => BounceType::Soft,
            "complaint" => BounceType::Complaint,
            _ => return None,
        })
    }
}

/// Spec §3 "Email" — one per outbound send attempt.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Email {
    pub id: Uuid,
    pub team_id: Uuid,
    pub campaign_id: Uuid,
    pub sequence_step_id: Uuid,
    pub step_number: i32,
    pub lead_id: Uuid,
    pub inbox_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub from_email: String,
    pub to_email: String,
    pub subject: String,
    pub body_html: String,
    pub status: String,
    pub message_id: Option<String>,
    pub in_reply_to: Option<String>,
    pub references_header: Option<String>,
    pub thread_id: Option<String>,
    pub open_count: i32,
    pub click_count: i32,
    pub opened_at: Option<DateTime<Utc>>,
    pub clicked_at: Option<DateTime<Utc>>,
    pub soft_bounce_count: i32,
    pub bounce_type: Option<String>,
    pub bounce_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub bounced_at: Option<DateTime<Utc>>,
    pub last_retry_at: Option<DateTime<Utc>>,
}

impl Email {
    pub fn status(&self) -> EmailStatus {
        EmailStatus::from_str(&self.status).unwrap_or(EmailStatus::Queued)
    }
}

/// Spec §3 "Email Events" — append-only audit/analytics log.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EmailEvent {
    pub id: Uuid,
    pub team_id: Uuid,
    pub email_id: Uuid,
    pub event_type: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Spec §4.8 "Inbox Events" row shape (`auto_paused`, etc).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InboxEvent {
    pub id: Uuid,
    pub team_id: Uuid,
    pub inbox_id: Uuid,
    pub event_type: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
