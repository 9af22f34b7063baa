use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Active,
    Paused,
    Completed,
    Archived,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Draft => "draft",
            CampaignStatus::Active => "active",
            CampaignStatus::Paused => "paused",
            CampaignStatus::Completed => "completed",
            CampaignStatus::Archived => "archived",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "draft" => CampaignStatus::Draft,
            "active" => CampaignStatus::Active,
            "paused" => CampaignStatus::Paused,
            "completed" => CampaignStatus::Completed,
            "archived" => CampaignStatus::Archived,
            _ => return None,
        })
    }
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Spec §3 "Campaign". `settings` holds the §6 recognized keys and is kept
/// as a JSON blob — see `CampaignSettings` for the typed view used by the
/// scheduler.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Campaign {
    pub id: Uuid,
    pub team_id: Uuid,
    pub name: String,
    pub status: String,
    pub lead_list_id: Option<Uuid>,
    pub settings: serde_json::Value,
    pub sent_count: i32,
    pub opened_count: i32,
    pub clicked_count: i32,
    pub replied_count: i32,
    pub bounced_count: i32,
    pub auto_paused: bool,
    pub auto_pause_reason: Option<String>,
    pub paused_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
}

impl Campaign {
    pub fn status(&self) -> CampaignStatus {
        CampaignStatus::from_str(&self.status).unwrap_or(CampaignStatus::Draft)
    }
}

/// Per-step condition (spec §6 `sequence_conditions[N]`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConditionType {
    NoReply,
    NoOpen,
    NoClick,
    Replied,
    Opened,
    Clicked,
    Bounced,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConditionAction {
    Continue,
    Stop,
    SkipStep,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceCondition {
    #[serde(rename = "type")]
    pub condition_type: ConditionType,
    pub action: ConditionAction,
}

impl Default for SequenceCondition {
    fn default() -> Self {
        Self {
            condition_type: ConditionType::NoReply,
            action: ConditionAction::Continue,
        }
    }
}

/// A single day's send intervals, hours 0..24 half-open (spec §4.3/§6).
pub type DayIntervals = Vec<DayInterval>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DayInterval {
    pub start: u32,
    pub end: u32,
}

/// Typed view over `Campaign.settings` (spec §6).
///
/// `schedule` is `Option` rather than a bare map so an absent key (fall back
/// to the legacy window) stays distinguishable from a present-but-empty
/// `{}` (spec P9: block every send regardless of `send_window_*`) — both
/// would otherwise deserialize to the same empty `HashMap`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CampaignSettings {
    pub send_window_start: Option<String>,
    pub send_window_end: Option<String>,
    pub timezone: String,
    pub send_days: Vec<String>,
    pub schedule: Option<std::collections::HashMap<String, DayIntervals>>,
    pub track_opens: bool,
    pub track_clicks: bool,
    pub stop_on_reply: bool,
    pub sequence_conditions: std::collections::HashMap<i32, SequenceCondition>,
}

impl Default for CampaignSettings {
    fn default() -> Self {
        Self {
            send_window_start: None,
            send_window_end: None,
            timezone: "America/New_York".to_string(),
            send_days: vec![
                "mon".to_string(),
                "tue".to_string(),
                "wed".to_string(),
                "thu".to_string(),
                "fri".to_string(),
            ],
            schedule: None,
            track_opens: true,
            track_clicks: true,
            stop_on_reply: true,
            sequence_conditions: std::collections::HashMap::new(),
        }
    }
}

impl CampaignSettings {
    pub fn from_json(value: &serde_json::Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }

    /// Default condition for step N>1 when unspecified (spec §6).
    pub fn condition_for_step(&self, step_number: i32) -> SequenceCondition {
        self.sequence_conditions
            .get(&step_number)
            .cloned()
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateCampaignRequest {
    pub name: String,
    pub lead_list_id: Option<Uuid>,
    pub settings: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCampaignRequest {
    pub name: Option<String>,
    pub status: Option<String>,
    pub settings: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct CreateSequenceStepRequest {
    pub delay_days: i32,
    pub delay_hours: i32,
    pub subject: String,
    pub body_html: String,
}
