use actix_web::{web, HttpRequest, HttpResponse};
use serde::Serialize;
use sqlx::PgPool;

use crate::middleware::auth::{extract_claims, get_team_id};
use crate::models::campaign::Campaign;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/analytics")
            .route("/overview", web::get().to(get_overview))
            .route("/campaigns", web::get().to(get_campaign_analytics))
            .route("/leads", web::get().to(get_lead_analytics))
            .route("/deliverability", web::get().to(get_deliverability_report)),
    );
}

#[derive(Debug, Serialize)]
struct OverviewStats {
    total_leads: i64,
    total_campaigns: i64,
    active_campaigns: i64,
    total_sent: i64,
    total_opened: i64,
    total_replied: i64,
    open_rate: f64,
    reply_rate: f64,
}

fn rate(numerator: i64, denominator: i64) -> f64 {
    if denominator > 0 {
        numerator as f64 / denominator as f64
    } else {
        0.0
    }
}

async fn get_overview(pool: web::Data<PgPool>, req: HttpRequest) -> Result<HttpResponse, actix_web::Error> {
    let claims = extract_claims(&req)?;
    let team_id = get_team_id(&claims)?;

    let total_leads: i64 = sqlx::query_scalar("SELECT count(*) FROM leads WHERE team_id = $1")
        .bind(team_id)
        .fetch_one(pool.get_ref())
        .await
        .map_err(|e| actix_web::error::ErrorInternalServerError(e.to_string()))?;

    let (total_campaigns, active_campaigns, sent, opened, replied): (i64, i64, i64, i64, i64) = sqlx::query_as(
        r#"
        SELECT
            count(*),
            count(*) FILTER (WHERE status = 'active'),
            COALESCE(sum(sent_count), 0),
            COALESCE(sum(opened_count), 0),
            COALESCE(sum(replied_count), 0)
        FROM campaigns
        WHERE team_id = $1
        "#,
    )
    .bind(team_id)
    .fetch_one(pool.get_ref())
    .await
    .map_err(|e| actix_web::error::ErrorInternalServerError(e.to_string()))?;

    Ok(HttpResponse::Ok().json(OverviewStats {
        total_leads,
        total_campaigns,
        active_campaigns,
        total_sent: sent,
        total_opened: opened,
        total_replied: replied,
        open_rate: rate(opened, sent),
        reply_rate: rate(replied, sent),
    }))
}

#[derive(Debug, Serialize)]
struct CampaignAnalytics {
    id: uuid::Uuid,
    name: String,
    status: String,
    sent: i32,
    opened: i32,
    clicked: i32,
    replied: i32,
    bounced: i32,
    open_rate: f64,
    click_rate: f64,
    reply_rate: f64,
}

async fn get_campaign_analytics(pool: web::Data<PgPool>, req: HttpRequest) -> Result<HttpResponse, actix_web::Error> {
    let claims = extract_claims(&req)?;
    let team_id = get_team_id(&claims)?;

    let campaigns: Vec<Campaign> = sqlx::query_as("SELECT * FROM campaigns WHERE team_id = $1 ORDER BY created_at DESC LIMIT 50")
        .bind(team_id)
        .fetch_all(pool.get_ref())
        .await
        .map_err(|e| actix_web::error::ErrorInternalServerError(e.to_string()))?;

    let analytics: Vec<CampaignAnalytics> = campaigns
        .into_iter()
        .map(|c| CampaignAnalytics {
            id: c.id,
            name: c.name,
            status: c.status,
            sent: c.sent_count,
            opened: c.opened_count,
            clicked: c.clicked_count,
            replied: c.replied_count,
            bounced: c.bounced_count,
            open_rate: rate(c.opened_count as i64, c.sent_count as i64),
            click_rate: rate(c.clicked_count as i64, c.sent_count as i64),
            reply_rate: rate(c.replied_count as i64, c.sent_count as i64),
        })
        .collect();

    Ok(HttpResponse::Ok().json(analytics))
}

#[derive(Debug, Serialize)]
struct LeadAnalytics {
    total: i64,
    by_status: Vec<StatusCount>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
struct StatusCount {
    status: String,
    count: i64,
}

async fn get_lead_analytics(pool: web::Data<PgPool>, req: HttpRequest) -> Result<HttpResponse, actix_web::Error> {
    let claims = extract_claims(&req)?;
    let team_id = get_team_id(&claims)?;

    let total: i64 = sqlx::query_scalar("SELECT count(*) FROM leads WHERE team_id = $1")
        .bind(team_id)
        .fetch_one(pool.get_ref())
        .await
        .map_err(|e| actix_web::error::ErrorInternalServerError(e.to_string()))?;

    let by_status: Vec<StatusCount> = sqlx::query_as(
        "SELECT status, count(*) as count FROM leads WHERE team_id = $1 GROUP BY status ORDER BY count DESC",
    )
    .bind(team_id)
    .fetch_all(pool.get_ref())
    .await
    .map_err(|e| actix_web::error::ErrorInternalServerError(e.to_string()))?;

    Ok(HttpResponse::Ok().json(LeadAnalytics { total, by_status }))
}

#[derive(Debug, Serialize)]
struct DeliverabilityReport {
    total_inboxes: i64,
    active_inboxes: i64,
    paused_inboxes: i64,
    disconnected_inboxes: i64,
    total_sent: i64,
    total_bounced: i64,
    total_spam_complaints: i64,
    avg_health_score: f64,
    bounce_rate: f64,
    spam_rate: f64,
}

/// Aggregates inbox-level deliverability signals across the team's sending
/// pool (spec §3 Inbox fields; §4.8's bounce/spam counters are the per-send
/// source of truth this rolls up).
async fn get_deliverability_report(pool: web::Data<PgPool>, req: HttpRequest) -> Result<HttpResponse, actix_web::Error> {
    let claims = extract_claims(&req)?;
    let team_id = get_team_id(&claims)?;

    let (total_inboxes, active_inboxes, paused_inboxes, disconnected_inboxes, sent, bounced, spam, avg_health): (
        i64,
        i64,
        i64,
        i64,
        i64,
        i64,
        i64,
        Option<f64>,
    ) = sqlx::query_as(
        r#"
        SELECT
            count(*),
            count(*) FILTER (WHERE status IN ('active', 'warming_up')),
            count(*) FILTER (WHERE status = 'paused'),
            count(*) FILTER (WHERE status = 'error'),
            COALESCE(sum(sent_total), 0),
            COALESCE(sum(bounced_total), 0),
            COALESCE(sum(spam_complaints_total), 0),
            avg(health_score)
        FROM inboxes
        WHERE team_id = $1
        "#,
    )
    .bind(team_id)
    .fetch_one(pool.get_ref())
    .await
    .map_err(|e| actix_web::error::ErrorInternalServerError(e.to_string()))?;

    Ok(HttpResponse::Ok().json(DeliverabilityReport {
        total_inboxes,
        active_inboxes,
        paused_inboxes,
        disconnected_inboxes,
        total_sent: sent,
        total_bounced: bounced,
        total_spam_complaints: spam,
        avg_health_score: avg_health.unwrap_or(0.0),
        bounce_rate: rate(bounced, sent),
        spam_rate: rate(spam, sent),
    }))
}
