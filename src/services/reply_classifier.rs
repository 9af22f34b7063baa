//! Reply intent classification (spec §4.9: "Intent classification ... is
//! delegated to an external service"). Tries an LLM call first, falling
//! back to a keyword heuristic on any failure — same two-tier structure
//! this file always had, realigned to the seven-category vocabulary
//! `models::reply::ReplyIntent` defines rather than an ad-hoc one.

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::models::reply::ReplyIntent;

#[derive(Debug, Serialize)]
struct ClaudeRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<ClaudeMessage>,
}

#[derive(Debug, Serialize)]
struct ClaudeMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ClaudeResponse {
    content: Vec<ClaudeContent>,
}

#[derive(Debug, Deserialize)]
struct ClaudeContent {
    text: String,
}

const CLASSIFICATION_PROMPT: &str = r#"Classify this cold email reply into ONE category:
- interested: Shows clear interest ("Tell me more", "Let's chat", "Sounds good", positive engagement)
- not_interested: Explicit rejection or wants to stop ("Not interested", "Unsubscribe", "Stop", "Remove me")
- meeting_booked: Reply confirms or proposes a specific meeting time/calendar link
- question: Has questions or concerns before deciding ("How much?", "Who else uses this?", "What's the pricing?")
- out_of_office: Automated out-of-office/vacation auto-responder
- auto_reply: Any other automated response (bounce notice, mailbox-full notice, generic autoresponder)
- bounce: Delivery failure notice masquerading as a reply

Reply text:
{reply_text}

Return ONLY the category name (one word, lowercase, underscores). Nothing else."#;

pub async fn classify_reply(api_key: &str, reply_text: &str) -> Result<(ReplyIntent, f32), String> {
    let client = Client::new();
    let prompt = CLASSIFICATION_PROMPT.replace("{reply_text}", reply_text);

    let request = ClaudeRequest {
        model: "claude-3-haiku-20240307".to_string(),
        max_tokens: 20,
        messages: vec![ClaudeMessage { role: "user".to_string(), content: prompt }],
    };

    let response = client
        .post("https://api.anthropic.com/v1/messages")
        .header("x-api-key", api_key)
        .header("anthropic-version", "2023-06-01")
        .header("content-type", "application/json")
        .json(&request)
        .send()
        .await
        .map_err(|e| format!("Failed to call Claude API: {}", e))?;

    if !response.status().is_success() {
        let status = response.status();
        let error_text = response.text().await.unwrap_or_default();
        return Err(format!("Claude API error {}: {}", status, error_text));
    }

    let claude_response: ClaudeResponse = response.json().await.map_err(|e| format!("Failed to parse Claude response: {}", e))?;

    let raw = claude_response.content.first().map(|c| c.text.trim().to_lowercase()).unwrap_or_default();

    let intent = ReplyIntent::from_str(&raw)
        .or_else(|| {
            [
                ReplyIntent::Interested,
                ReplyIntent::NotInterested,
                ReplyIntent::MeetingBooked,
                ReplyIntent::Question,
                ReplyIntent::OutOfOffice,
                ReplyIntent::AutoReply,
                ReplyIntent::Bounce,
            ]
            .into_iter()
            .find(|i| raw.contains(i.as_str()))
        })
        .unwrap_or(ReplyIntent::AutoReply);

    Ok((intent, 0.85))
}

/// Keyword-pattern fallback, used when the LLM call errors (spec §4.9,
/// §7 "classification failure").
pub fn classify_reply_simple(reply_text: &str) -> (ReplyIntent, f32) {
    let text = reply_text.to_lowercase();

    const BOUNCE_PATTERNS: &[&str] = &["undeliverable", "delivery failed", "mailbox full", "delivery status notification", "address not found"];
    for pattern in BOUNCE_PATTERNS {
        if text.contains(pattern) {
            return (ReplyIntent::Bounce, 0.9);
        }
    }

    const OUT_OF_OFFICE_PATTERNS: &[&str] =
        &["out of office", "ooo", "vacation", "away from", "i am currently out", "will return", "limited access"];
    for pattern in OUT_OF_OFFICE_PATTERNS {
        if text.contains(pattern) {
            return (ReplyIntent::OutOfOffice, 0.95);
        }
    }

    const AUTO_REPLY_PATTERNS: &[&str] = &["auto-reply", "automatic reply", "this is an automated", "do not reply", "no longer with"];
    for pattern in AUTO_REPLY_PATTERNS {
        if text.contains(pattern) {
            return (ReplyIntent::AutoReply, 0.9);
        }
    }

    const MEETING_PATTERNS: &[&str] = &["calendar invite", "see you at", "confirmed for", "booked a time", "scheduled our call", "calendly.com"];
    for pattern in MEETING_PATTERNS {
        if text.contains(pattern) {
            return (ReplyIntent::MeetingBooked, 0.8);
        }
    }

    const NOT_INTERESTED_PATTERNS: &[&str] = &[
        "unsubscribe", "stop emailing", "remove me", "take me off", "not interested", "stop contacting",
        "do not contact", "leave me alone", "reported as spam",
    ];
    for pattern in NOT_INTERESTED_PATTERNS {
        if text.contains(pattern) {
            return (ReplyIntent::NotInterested, 0.9);
        }
    }

    const INTERESTED_PATTERNS: &[&str] = &[
        "let's chat", "let's talk", "schedule a call", "book a meeting", "send me your calendar", "interested",
        "tell me more", "sounds good", "love to learn more", "set up a time", "when are you free", "happy to connect",
        "let's do it",
    ];
    for pattern in INTERESTED_PATTERNS {
        if text.contains(pattern) {
            return (ReplyIntent::Interested, 0.85);
        }
    }

    const QUESTION_PATTERNS: &[&str] = &[
        "how much", "what's the price", "pricing", "cost", "who else", "case study", "references", "competitors",
        "how does it work", "more information", "can you explain", "?",
    ];
    for pattern in QUESTION_PATTERNS {
        if text.contains(pattern) {
            return (ReplyIntent::Question, 0.7);
        }
    }

    (ReplyIntent::AutoReply, 0.5)
}

pub async fn classify_reply_with_fallback(api_key: Option<&str>, reply_text: &str) -> (ReplyIntent, f32) {
    if let Some(api_key) = api_key {
        match classify_reply(api_key, reply_text).await {
            Ok(result) => return result,
            Err(e) => tracing::warn!("reply classification via external service failed, using fallback: {}", e),
        }
    }
    classify_reply_simple(reply_text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_classification_covers_each_category() {
        assert_eq!(classify_reply_simple("I'm out of office until Monday").0, ReplyIntent::OutOfOffice);
        assert_eq!(classify_reply_simple("Please unsubscribe me").0, ReplyIntent::NotInterested);
        assert_eq!(classify_reply_simple("Let's schedule a call!").0, ReplyIntent::Interested);
        assert_eq!(classify_reply_simple("How much does this cost?").0, ReplyIntent::Question);
        assert_eq!(classify_reply_simple("Confirmed for Tuesday at 2pm, see you at the meeting").0, ReplyIntent::MeetingBooked);
        assert_eq!(classify_reply_simple("Mailbox full, delivery failed").0, ReplyIntent::Bounce);
    }
}
