use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Spec §3 / §6 "Suppression List". Unique on `(team_id, email)`. Any email
/// to a suppressed address is skipped by the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SuppressionEntry {
    pub id: Uuid,
    pub team_id: Uuid,
    pub email: String,
    pub reason: String,
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SuppressionReason {
    HardBounce,
    SpamComplaint,
    Unsubscribe,
    Manual,
}

impl SuppressionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuppressionReason::HardBounce => "hard_bounce",
            SuppressionReason::SpamComplaint => "spam_complaint",
            SuppressionReason::Unsubscribe => "unsubscribe",
            SuppressionReason::Manual => "manual",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "hard_bounce" => Some(SuppressionReason::HardBounce),
            "spam_complaint" => Some(SuppressionReason::SpamComplaint),
            "unsubscribe" => Some(SuppressionReason::Unsubscribe),
            "manual" => Some(SuppressionReason::Manual),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AddSuppressionRequest {
    pub email: String,
    pub reason: String,
    pub details: Option<String>,
}
