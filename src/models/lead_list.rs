use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A named bag of Leads, owned by a Team, with a cached `lead_count`
/// (spec §3 "Lead List").
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LeadList {
    pub id: Uuid,
    pub team_id: Uuid,
    pub name: String,
    pub lead_count: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateLeadListRequest {
    pub name: String,
}
