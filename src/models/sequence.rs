use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Spec §3 "Sequence Step". Step numbers are 1-based and dense; step 1 has
/// zero delay.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SequenceStep {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub step_number: i32,
    pub delay_days: i32,
    pub delay_hours: i32,
    pub subject: String,
    pub body_html: String,
    pub created_at: DateTime<Utc>,
}

impl SequenceStep {
    pub fn delay(&self) -> chrono::Duration {
        chrono::Duration::days(self.delay_days as i64) + chrono::Duration::hours(self.delay_hours as i64)
    }
}

/// Spec §3 "Sequence Variant". Weights across a step sum to 100;
/// `is_winner=true` on any variant freezes the experiment (spec §4.6).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SequenceVariant {
    pub id: Uuid,
    pub sequence_step_id: Uuid,
    pub subject: String,
    pub body: String,
    pub weight: i32,
    pub is_winner: bool,
    pub sent_count: i32,
    pub opened_count: i32,
    pub clicked_count: i32,
    pub replied_count: i32,
}
