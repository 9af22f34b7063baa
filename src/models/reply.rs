use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Spec §3 "Reply" — inbound message linked to an Email by threading headers.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Reply {
    pub id: Uuid,
    pub team_id: Uuid,
    pub email_id: Uuid,
    pub from_email: String,
    pub body_preview: String,
    pub intent: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Intents an external classifier may return (spec §4.9).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReplyIntent {
    Interested,
    NotInterested,
    MeetingBooked,
    Question,
    OutOfOffice,
    AutoReply,
    Bounce,
}

impl ReplyIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplyIntent::Interested => "interested",
            ReplyIntent::NotInterested => "not_interested",
            ReplyIntent::MeetingBooked => "meeting_booked",
            ReplyIntent::Question => "question",
            ReplyIntent::OutOfOffice => "out_of_office",
            ReplyIntent::AutoReply => "auto_reply",
            ReplyIntent::Bounce => "bounce",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "interested" => ReplyIntent::Interested,
            "not_interested" => ReplyIntent::NotInterested,
            "meeting_booked" => ReplyIntent::MeetingBooked,
            "question" => ReplyIntent::Question,
            "out_of_office" => ReplyIntent::OutOfOffice,
            "auto_reply" => ReplyIntent::AutoReply,
            "bounce" => ReplyIntent::Bounce,
            _ => return None,
        })
    }
}
