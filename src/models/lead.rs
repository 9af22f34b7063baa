use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Spec §3 `LeadStatus`. The full closed set the lead state machine
/// operates over (see `services::lead_state`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    Pending,
    InSequence,
    Contacted,
    Replied,
    Interested,
    NotInterested,
    MeetingBooked,
    Bounced,
    SoftBounced,
    Unsubscribed,
    SpamReported,
    SequenceComplete,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::Pending => "pending",
            LeadStatus::InSequence => "in_sequence",
            LeadStatus::Contacted => "contacted",
            LeadStatus::Replied => "replied",
            LeadStatus::Interested => "interested",
            LeadStatus::NotInterested => "not_interested",
            LeadStatus::MeetingBooked => "meeting_booked",
            LeadStatus::Bounced => "bounced",
            LeadStatus::SoftBounced => "soft_bounced",
            LeadStatus::Unsubscribed => "unsubscribed",
            LeadStatus::SpamReported => "spam_reported",
            LeadStatus::SequenceComplete => "sequence_complete",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "pending" => LeadStatus::Pending,
            "in_sequence" => LeadStatus::InSequence,
            "contacted" => LeadStatus::Contacted,
            "replied" => LeadStatus::Replied,
            "interested" => LeadStatus::Interested,
            "not_interested" => LeadStatus::NotInterested,
            "meeting_booked" => LeadStatus::MeetingBooked,
            "bounced" => LeadStatus::Bounced,
            "soft_bounced" => LeadStatus::SoftBounced,
            "unsubscribed" => LeadStatus::Unsubscribed,
            "spam_reported" => LeadStatus::SpamReported,
            "sequence_complete" => LeadStatus::SequenceComplete,
            _ => return None,
        })
    }
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Email-verifier result (ambient: spec §3 doesn't require a verification
/// pipeline, but `services::email_verifier` is kept as a legitimate ambient
/// feature and needs a typed result).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Valid,
    Risky,
    Invalid,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Valid => "valid",
            VerificationStatus::Risky => "risky",
            VerificationStatus::Invalid => "invalid",
        }
    }
}

/// A recipient record (spec §3 "Lead").
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Lead {
    pub id: Uuid,
    pub team_id: Uuid,
    pub lead_list_id: Option<Uuid>,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company: Option<String>,
    pub title: Option<String>,
    pub phone: Option<String>,
    pub linkedin_url: Option<String>,
    pub website: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub timezone: Option<String>,
    pub custom_fields: serde_json::Value,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    pub fn status(&self) -> LeadStatus {
        LeadStatus::from_str(&self.status).unwrap_or(LeadStatus::Pending)
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateLeadRequest {
    pub lead_list_id: Option<Uuid>,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company: Option<String>,
    pub title: Option<String>,
    pub phone: Option<String>,
    pub linkedin_url: Option<String>,
    pub website: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub timezone: Option<String>,
    pub custom_fields: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct LeadResponse {
    pub id: Uuid,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company: Option<String>,
    pub title: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl From<Lead> for LeadResponse {
    fn from(lead: Lead) -> Self {
        Self {
            id: lead.id,
            email: lead.email,
            first_name: lead.first_name,
            last_name: lead.last_name,
            company: lead.company,
            title: lead.title,
            status: lead.status,
            created_at: lead.created_at,
        }
    }
}
