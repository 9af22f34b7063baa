//! Campaign scheduler (spec §4.4). A periodic tick that walks active
//! campaigns, gates on the send window, picks eligible inboxes and
//! candidate leads per sequence step, and enqueues `email-send` jobs with
//! jitter. Grounded on this file's own pre-existing SQL idiom (direct
//! `sqlx::query_as` calls, no query builder) generalized to the current
//! schema and the full gating/threading/variant logic.

use chrono::{Duration, Utc};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::CoreError;
use crate::models::campaign::{Campaign, CampaignSettings, CampaignStatus, ConditionAction, ConditionType};
use crate::models::email::Email;
use crate::models::inbox::{Inbox, InboxStatus};
use crate::models::lead::{Lead, LeadStatus};
use crate::models::sequence::{SequenceStep, SequenceVariant};
use crate::services::job_queue::{EmailSendPayload, JobQueue};
use crate::services::lead_state;
use crate::services::send_window::{self, HourInterval, LegacyWindow};
use crate::services::template_engine::{self, VariableBuilder};
use crate::services::variant_selection;

pub struct CampaignScheduler {
    pool: Arc<sqlx::PgPool>,
    queue: Arc<JobQueue>,
    config: Arc<Config>,
    /// Per-campaign round-robin cursor into the current tick's
    /// capacity-bearing inbox subset. Process-local, not persisted — spec
    /// §5 explicitly allows in-memory scheduler state.
    rotation: Mutex<HashMap<Uuid, usize>>,
}

impl CampaignScheduler {
    pub fn new(pool: Arc<sqlx::PgPool>, queue: Arc<JobQueue>, config: Arc<Config>) -> Self {
        Self {
            pool,
            queue,
            config,
            rotation: Mutex::new(HashMap::new()),
        }
    }

    /// One full tick: every active campaign, independently. A failure on
    /// one campaign is logged and never aborts the others (spec §4.4
    /// "Failure handling").
    pub async fn tick(&self) -> Result<(), CoreError> {
        let campaigns: Vec<Campaign> = sqlx::query_as("SELECT * FROM campaigns WHERE status = $1")
            .bind(CampaignStatus::Active.as_str())
            .fetch_all(self.pool.as_ref())
            .await?;

        for campaign in campaigns {
            if let Err(e) = self.process_campaign(&campaign).await {
                error!(campaign_id = %campaign.id, error = %e, "campaign scheduler tick failed for campaign");
            }
        }
        Ok(())
    }

    async fn process_campaign(&self, campaign: &Campaign) -> Result<i64, CoreError> {
        let settings = CampaignSettings::from_json(&campaign.settings);

        if !self.window_open(campaign, &settings) {
            return Ok(0);
        }

        let mut inboxes = self.eligible_inboxes(campaign.team_id).await?;
        if inboxes.is_empty() {
            return Ok(0);
        }

        let steps: Vec<SequenceStep> = sqlx::query_as(
            "SELECT * FROM sequence_steps WHERE campaign_id = $1 ORDER BY step_number ASC",
        )
        .bind(campaign.id)
        .fetch_all(self.pool.as_ref())
        .await?;

        let mut scheduled = 0i64;
        let budget = self.config.max_emails_per_run.max(0);

        for step in &steps {
            if scheduled >= budget {
                break;
            }
            let remaining_budget = budget - scheduled;
            let sent = self
                .process_step(campaign, &settings, step, &mut inboxes, remaining_budget)
                .await?;
            scheduled += sent;
        }

        self.completion_sweep(campaign.id).await?;

        if scheduled > 0 {
            info!(campaign_id = %campaign.id, scheduled, "campaign scheduler tick enqueued sends");
        }
        Ok(scheduled)
    }

    fn window_open(&self, _campaign: &Campaign, settings: &CampaignSettings) -> bool {
        let tz: chrono_tz::Tz = settings.timezone.parse().unwrap_or(chrono_tz::America::New_York);
        let schedule: Option<HashMap<String, Vec<HourInterval>>> = settings.schedule.as_ref().map(|map| {
            map.iter()
                .map(|(day, intervals)| {
                    (day.clone(), intervals.iter().map(|iv| HourInterval { start: iv.start, end: iv.end }).collect())
                })
                .collect()
        });
        let legacy = LegacyWindow {
            start_hour: settings.send_window_start.as_deref().and_then(|s| s.parse().ok()).unwrap_or(0),
            end_hour: settings.send_window_end.as_deref().and_then(|s| s.parse().ok()).unwrap_or(24),
            send_days: settings.send_days.clone(),
        };
        send_window::may_send_now(Utc::now(), tz, schedule.as_ref(), &legacy)
    }

    /// Spec §4.4 step 2. Inboxes kept in a deterministic order (health desc)
    /// so round-robin indices are reproducible within one tick.
    async fn eligible_inboxes(&self, team_id: Uuid) -> Result<Vec<Inbox>, CoreError> {
        let inboxes: Vec<Inbox> = sqlx::query_as(
            r#"
            SELECT * FROM inboxes
            WHERE team_id = $1
              AND status IN ('active', 'warming_up')
              AND health_score >= $2
            ORDER BY health_score DESC, sent_today ASC
            "#,
        )
        .bind(team_id)
        .bind(self.config.min_inbox_health_score)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(inboxes
            .into_iter()
            .filter(|i| i.status() == InboxStatus::Active || i.status() == InboxStatus::WarmingUp)
            .filter(|i| i.sent_today < i.effective_daily_limit())
            .collect())
    }

    async fn process_step(
        &self,
        campaign: &Campaign,
        settings: &CampaignSettings,
        step: &SequenceStep,
        inboxes: &mut [Inbox],
        budget: i64,
    ) -> Result<i64, CoreError> {
        let capacity_subset: Vec<usize> = inboxes
            .iter()
            .enumerate()
            .filter(|(_, i)| i.sent_today < i.effective_daily_limit())
            .map(|(idx, _)| idx)
            .collect();
        if capacity_subset.is_empty() {
            return Ok(0);
        }

        let candidates = self.candidate_leads(campaign, settings, step, budget).await?;
        if candidates.is_empty() {
            return Ok(0);
        }

        let variants: Vec<SequenceVariant> =
            sqlx::query_as("SELECT * FROM sequence_variants WHERE sequence_step_id = $1")
                .bind(step.id)
                .fetch_all(self.pool.as_ref())
                .await?;

        let mut sent = 0i64;
        for (batch_index, lead) in candidates.iter().enumerate() {
            if sent >= budget {
                break;
            }

            // An inbox can hit its cap mid-tick as earlier leads in this same
            // batch consume it; walk the rotation forward up to one full
            // revolution of the subset rather than dropping the candidate.
            let mut inbox_idx = None;
            for _ in 0..capacity_subset.len() {
                let idx = self.next_inbox_index(campaign.id, &capacity_subset).await;
                if inboxes[idx].sent_today < inboxes[idx].effective_daily_limit() {
                    inbox_idx = Some(idx);
                    break;
                }
            }
            let Some(inbox_idx) = inbox_idx else {
                break;
            };
            let inbox = &mut inboxes[inbox_idx];

            match self
                .send_one(campaign, step, &variants, lead, inbox, batch_index)
                .await
            {
                Ok(true) => {
                    inbox.sent_today += 1;
                    sent += 1;
                }
                Ok(false) => {}
                Err(e) => warn!(lead_id = %lead.id, step = step.step_number, error = %e, "failed to schedule send for lead"),
            }
        }
        Ok(sent)
    }

    async fn next_inbox_index(&self, campaign_id: Uuid, capacity_subset: &[usize]) -> usize {
        let mut rotation = self.rotation.lock().await;
        let cursor = rotation.entry(campaign_id).or_insert(0);
        let idx = capacity_subset[*cursor % capacity_subset.len()];
        *cursor = cursor.wrapping_add(1);
        idx
    }

    /// Spec §4.4 step 3. Step 1 is `pending` leads in the linked list;
    /// step N>1 requires a qualifying prior-step send and the absence of a
    /// blocking condition.
    async fn candidate_leads(
        &self,
        campaign: &Campaign,
        settings: &CampaignSettings,
        step: &SequenceStep,
        limit: i64,
    ) -> Result<Vec<Lead>, CoreError> {
        let Some(lead_list_id) = campaign.lead_list_id else {
            return Ok(vec![]);
        };

        if step.step_number == 1 {
            let leads: Vec<Lead> = sqlx::query_as(
                r#"
                SELECT l.* FROM leads l
                LEFT JOIN emails e ON e.lead_id = l.id AND e.campaign_id = $1 AND e.step_number = 1
                WHERE l.lead_list_id = $2 AND l.status = 'pending' AND e.id IS NULL
                ORDER BY l.created_at ASC
                LIMIT $3
                "#,
            )
            .bind(campaign.id)
            .bind(lead_list_id)
            .bind(limit)
            .fetch_all(self.pool.as_ref())
            .await?;
            return Ok(leads);
        }

        let prev_step_number = step.step_number - 1;
        let prev_step: Option<SequenceStep> = sqlx::query_as(
            "SELECT * FROM sequence_steps WHERE campaign_id = $1 AND step_number = $2",
        )
        .bind(campaign.id)
        .bind(prev_step_number)
        .fetch_optional(self.pool.as_ref())
        .await?;
        let Some(prev_step) = prev_step else { return Ok(vec![]) };

        let cutoff = Utc::now() - prev_step.delay();
        let condition = settings.condition_for_step(step.step_number);
        let require_no_reply = settings.stop_on_reply
            || matches!((condition.condition_type, condition.action), (ConditionType::NoReply, ConditionAction::Stop));

        let rows: Vec<Lead> = sqlx::query_as(
            r#"
            SELECT l.* FROM leads l
            INNER JOIN emails prev ON prev.lead_id = l.id AND prev.campaign_id = $1 AND prev.step_number = $2
            LEFT JOIN emails cur ON cur.lead_id = l.id AND cur.campaign_id = $1 AND cur.step_number = $3
            WHERE l.lead_list_id = $4
              AND prev.status IN ('sent', 'delivered', 'opened', 'clicked')
              AND prev.sent_at IS NOT NULL AND prev.sent_at <= $5
              AND cur.id IS NULL
            ORDER BY prev.sent_at ASC
            LIMIT $6
            "#,
        )
        .bind(campaign.id)
        .bind(prev_step_number)
        .bind(step.step_number)
        .bind(lead_list_id)
        .bind(cutoff)
        .bind(limit)
        .fetch_all(self.pool.as_ref())
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for lead in rows {
            if lead_state::blocks_sequence(lead.status()) {
                continue;
            }
            if require_no_reply && lead.status() == LeadStatus::Replied {
                continue;
            }
            out.push(lead);
        }
        Ok(out)
    }

    /// One candidate lead through suppression/dedup/variant/threading/
    /// render/enqueue. Returns `Ok(true)` when a send was scheduled,
    /// `Ok(false)` when the lead was legitimately skipped.
    async fn send_one(
        &self,
        campaign: &Campaign,
        step: &SequenceStep,
        variants: &[SequenceVariant],
        lead: &Lead,
        inbox: &Inbox,
        batch_index: usize,
    ) -> Result<bool, CoreError> {
        let suppressed: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM suppression_list WHERE team_id = $1 AND email = $2")
                .bind(campaign.team_id)
                .bind(lead.email.to_lowercase())
                .fetch_optional(self.pool.as_ref())
                .await?;
        if suppressed.is_some() {
            return Ok(false);
        }

        let existing: Option<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM emails WHERE campaign_id = $1 AND lead_id = $2 AND step_number = $3",
        )
        .bind(campaign.id)
        .bind(lead.id)
        .bind(step.step_number)
        .fetch_optional(self.pool.as_ref())
        .await?;
        if existing.is_some() {
            return Ok(false);
        }

        let variant = variant_selection::select_variant(variants);

        let (subject_template, body_template) = match variant {
            Some(v) => (v.subject.clone(), v.body.clone()),
            None => (step.subject.clone(), step.body_html.clone()),
        };

        let vars = VariableBuilder::new()
            .set("firstName", lead.first_name.clone())
            .set("lastName", lead.last_name.clone())
            .set("company", lead.company.clone())
            .set("title", lead.title.clone())
            .set("senderFirstName", inbox.sender_first_name.clone())
            .set("senderLastName", inbox.sender_last_name.clone())
            .set("senderCompany", inbox.sender_company.clone())
            .set("senderTitle", inbox.sender_title.clone())
            .set("senderPhone", inbox.sender_phone.clone())
            .set("senderWebsite", inbox.sender_website.clone())
            .set_custom_fields(&lead.custom_fields)
            .build();

        let mut subject = template_engine::render(&subject_template, &vars);
        let body = template_engine::render(&body_template, &vars);

        let (thread_id, in_reply_to, references_header) = if step.step_number > 1 {
            self.build_threading(campaign.id, lead.id, &mut subject).await?
        } else {
            (None, None, None)
        };

        let email_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO emails (
                id, team_id, campaign_id, sequence_step_id, step_number, lead_id, inbox_id, variant_id,
                from_email, to_email, subject, body_html, status, thread_id, in_reply_to, references_header,
                open_count, click_count, soft_bounce_count, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, 'queued', $13, $14, $15, 0, 0, 0, now())
            "#,
        )
        .bind(email_id)
        .bind(campaign.team_id)
        .bind(campaign.id)
        .bind(step.id)
        .bind(step.step_number)
        .bind(lead.id)
        .bind(inbox.id)
        .bind(variant.map(|v| v.id))
        .bind(&inbox.email)
        .bind(&lead.email)
        .bind(&subject)
        .bind(&body)
        .bind(&thread_id)
        .bind(&in_reply_to)
        .bind(&references_header)
        .execute(self.pool.as_ref())
        .await?;

        if let lead_state::TransitionOutcome::Applied(next) =
            lead_state::transition(lead.status(), lead_state::LeadEvent::EmailSent)
        {
            sqlx::query("UPDATE leads SET status = $1, updated_at = now() WHERE id = $2")
                .bind(next.as_str())
                .bind(lead.id)
                .execute(self.pool.as_ref())
                .await?;
        }

        // Jitter: i * U(30s,120s) + U(0,30s), spec §4.4 step 5.
        let mut rng = rand::thread_rng();
        let per_item = rng.gen_range(30.0..120.0);
        let extra = rng.gen_range(0.0..30.0);
        let delay_secs = (batch_index as f64) * per_item + extra;
        let run_at = Utc::now() + Duration::milliseconds((delay_secs * 1000.0) as i64);

        let idempotency_key = format!(
            "campaign-{}-{}-{}-{}",
            campaign.id,
            lead.id,
            step.step_number,
            Utc::now().format("%Y%m%d"),
        );

        self.queue
            .enqueue_email_send(
                EmailSendPayload {
                    email_id,
                    lead_id: lead.id,
                    campaign_id: campaign.id,
                    inbox_id: inbox.id,
                    sequence_step: step.step_number,
                    is_retry: false,
                    retry_count: 0,
                },
                campaign.team_id,
                run_at,
                idempotency_key,
            )
            .await?;

        Ok(true)
    }

    /// Spec §4.4 step 5 threading: thread_id/subject/headers are sourced
    /// from the step-1 email of this `(campaign, lead)`.
    async fn build_threading(
        &self,
        campaign_id: Uuid,
        lead_id: Uuid,
        subject: &mut String,
    ) -> Result<(Option<String>, Option<String>, Option<String>), CoreError> {
        let prior: Vec<Email> = sqlx::query_as(
            "SELECT * FROM emails WHERE campaign_id = $1 AND lead_id = $2 ORDER BY step_number ASC",
        )
        .bind(campaign_id)
        .bind(lead_id)
        .fetch_all(self.pool.as_ref())
        .await?;

        let Some(first) = prior.first() else {
            return Ok((None, None, None));
        };

        let base_subject = strip_re_prefix(&first.subject);
        *subject = format!("Re: {}", base_subject);

        let last = prior.last().unwrap();
        let references: Vec<String> = prior.iter().filter_map(|e| e.message_id.clone()).collect();

        Ok((
            first.thread_id.clone().or(Some(first.id.to_string())),
            last.message_id.clone(),
            if references.is_empty() { None } else { Some(references.join(" ")) },
        ))
    }

    /// Spec §4.4 completion sweep: leads whose highest-step email has
    /// actually been dispatched, still `in_sequence`/`contacted`, move to
    /// `sequence_complete`. A `queued`/`sending` last step means the send
    /// worker hasn't run yet (S1) and must not trigger completion.
    async fn completion_sweep(&self, campaign_id: Uuid) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            UPDATE leads l
            SET status = 'sequence_complete', updated_at = now()
            FROM (
                SELECT DISTINCT ON (e.lead_id) e.lead_id, e.status
                FROM emails e
                WHERE e.campaign_id = $1
                ORDER BY e.lead_id, e.step_number DESC
            ) last_email
            WHERE l.id = last_email.lead_id
              AND l.status IN ('in_sequence', 'contacted')
              AND last_email.status IN ('sent', 'delivered', 'opened', 'clicked')
              AND NOT EXISTS (
                  SELECT 1 FROM sequence_steps s
                  WHERE s.campaign_id = $1
                  AND s.step_number > (SELECT step_number FROM emails WHERE lead_id = l.id AND campaign_id = $1 ORDER BY step_number DESC LIMIT 1)
              )
            "#,
        )
        .bind(campaign_id)
        .execute(self.pool.as_ref())
        .await?;
        Ok(())
    }
}

fn strip_re_prefix(subject: &str) -> String {
    let trimmed = subject.trim();
    let lower = trimmed.to_lowercase();
    if let Some(rest) = lower.strip_prefix("re:") {
        subject[subject.len() - rest.trim_start().len()..].to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_existing_re_prefix() {
        assert_eq!(strip_re_prefix("Re: Hello there"), "Hello there");
        assert_eq!(strip_re_prefix("RE:   Hello there"), "Hello there");
        assert_eq!(strip_re_prefix("Hello there"), "Hello there");
    }
}
