use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InboxProvider {
    Google,
    Microsoft,
    Smtp,
}

impl InboxProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            InboxProvider::Google => "google",
            InboxProvider::Microsoft => "microsoft",
            InboxProvider::Smtp => "smtp",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InboxStatus {
    Active,
    WarmingUp,
    Paused,
    Error,
    Banned,
}

impl InboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InboxStatus::Active => "active",
            InboxStatus::WarmingUp => "warming_up",
            InboxStatus::Paused => "paused",
            InboxStatus::Error => "error",
            InboxStatus::Banned => "banned",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "active" => InboxStatus::Active,
            "warming_up" => InboxStatus::WarmingUp,
            "paused" => InboxStatus::Paused,
            "error" => InboxStatus::Error,
            "banned" => InboxStatus::Banned,
            _ => return None,
        })
    }
}

impl std::fmt::Display for InboxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Spec §3 "Inbox" — a mailbox owned by a Team.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Inbox {
    pub id: Uuid,
    pub team_id: Uuid,
    pub provider: String,
    pub email: String,
    pub from_name: Option<String>,
    pub sender_first_name: Option<String>,
    pub sender_last_name: Option<String>,
    pub sender_company: Option<String>,
    pub sender_title: Option<String>,
    pub sender_phone: Option<String>,
    pub sender_website: Option<String>,
    pub status: String,
    pub status_reason: Option<String>,
    pub health_score: i32,
    pub daily_send_limit: i32,
    pub hourly_send_limit: Option<i32>,
    pub min_delay_seconds: i32,
    pub max_delay_seconds: i32,
    pub sent_today: i32,
    pub sent_total: i64,
    pub replied_total: i64,
    pub bounced_total: i64,
    pub spam_complaints_total: i32,
    pub throttle_percentage: i32,
    pub smtp_host: Option<String>,
    pub smtp_port: Option<i32>,
    pub smtp_username: Option<String>,
    pub smtp_password_encrypted: Option<Vec<u8>>,
    pub encryption_key_id: Option<String>,
    pub paused_at: Option<DateTime<Utc>>,
    pub pause_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Inbox {
    pub fn status(&self) -> InboxStatus {
        InboxStatus::from_str(&self.status).unwrap_or(InboxStatus::Error)
    }

    /// Spec §4.4 step 2: `floor(daily_send_limit × throttle_percentage / 100)`.
    pub fn effective_daily_limit(&self) -> i32 {
        (self.daily_send_limit * self.throttle_percentage) / 100
    }

    pub fn remaining_capacity(&self) -> i32 {
        (self.effective_daily_limit() - self.sent_today).max(0)
    }

    pub fn bounce_rate(&self) -> f64 {
        if self.sent_total == 0 {
            0.0
        } else {
            self.bounced_total as f64 / self.sent_total as f64
        }
    }

    pub fn spam_rate(&self) -> f64 {
        if self.sent_total == 0 {
            0.0
        } else {
            self.spam_complaints_total as f64 / self.sent_total as f64
        }
    }

    pub fn reply_rate(&self) -> f64 {
        if self.sent_total == 0 {
            0.0
        } else {
            self.replied_total as f64 / self.sent_total as f64
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WarmupPhase {
    Ramping,
    Maintaining,
    Paused,
    Completed,
}

impl WarmupPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarmupPhase::Ramping => "ramping",
            WarmupPhase::Maintaining => "maintaining",
            WarmupPhase::Paused => "paused",
            WarmupPhase::Completed => "completed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "ramping" => WarmupPhase::Ramping,
            "maintaining" => WarmupPhase::Maintaining,
            "paused" => WarmupPhase::Paused,
            "completed" => WarmupPhase::Completed,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RampSpeed {
    Slow,
    Normal,
    Fast,
}

impl RampSpeed {
    pub fn as_str(&self) -> &'static str {
        match self {
            RampSpeed::Slow => "slow",
            RampSpeed::Normal => "normal",
            RampSpeed::Fast => "fast",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "slow" => RampSpeed::Slow,
            "normal" => RampSpeed::Normal,
            "fast" => RampSpeed::Fast,
            _ => return None,
        })
    }

    /// Spec §4.7 ramp-speed multiplier.
    pub fn multiplier(&self) -> f64 {
        match self {
            RampSpeed::Slow => 0.7,
            RampSpeed::Normal => 1.0,
            RampSpeed::Fast => 1.5,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WarmupMode {
    Pool,
    Network,
}

impl WarmupMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarmupMode::Pool => "pool",
            WarmupMode::Network => "network",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "pool" => WarmupMode::Pool,
            "network" => WarmupMode::Network,
            _ => return None,
        })
    }
}

/// Spec §3 "Warmup State" — one per Inbox.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WarmupState {
    pub inbox_id: Uuid,
    pub enabled: bool,
    pub phase: String,
    pub current_day: i32,
    pub ramp_speed: String,
    pub target_daily_volume: i32,
    pub reply_rate_target: i32,
    pub warmup_mode: Option<String>,
    pub sent_today: i32,
    pub received_today: i32,
    pub replied_today: i32,
    pub spam_today: i32,
    pub sent_total: i64,
    pub received_total: i64,
    pub replied_total: i64,
    pub spam_total: i64,
    pub started_at: DateTime<Utc>,
    pub last_activity_at: Option<DateTime<Utc>>,
}

impl WarmupState {
    pub fn phase(&self) -> WarmupPhase {
        WarmupPhase::from_str(&self.phase).unwrap_or(WarmupPhase::Paused)
    }

    pub fn ramp_speed(&self) -> RampSpeed {
        RampSpeed::from_str(&self.ramp_speed).unwrap_or(RampSpeed::Normal)
    }

    pub fn warmup_mode(&self) -> Option<WarmupMode> {
        self.warmup_mode.as_deref().and_then(WarmupMode::from_str)
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateInboxRequest {
    pub provider: String,
    pub email: String,
    pub from_name: Option<String>,
    pub smtp_host: Option<String>,
    pub smtp_port: Option<i32>,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub daily_send_limit: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateWarmupSettingsRequest {
    pub ramp_speed: Option<String>,
    pub target_daily_volume: Option<i32>,
    pub reply_rate_target: Option<i32>,
    pub warmup_mode: Option<String>,
}
