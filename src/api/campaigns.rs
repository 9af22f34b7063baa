use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::middleware::auth::{extract_claims, get_team_id};
use crate::models::campaign::{Campaign, CreateCampaignRequest, CreateSequenceStepRequest, UpdateCampaignRequest};
use crate::models::lead::Lead;
use crate::models::sequence::SequenceStep;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/campaigns")
            .route("", web::get().to(get_campaigns))
            .route("", web::post().to(create_campaign))
            .route("/{id}", web::get().to(get_campaign_by_id))
            .route("/{id}", web::put().to(update_campaign))
            .route("/{id}", web::delete().to(delete_campaign))
            .route("/{id}/start", web::post().to(start_campaign))
            .route("/{id}/pause", web::post().to(pause_campaign))
            .route("/{id}/leads", web::get().to(get_campaign_leads))
            .route("/{id}/steps", web::get().to(get_sequence_steps))
            .route("/{id}/steps", web::post().to(add_sequence_step)),
    );
}

async fn get_campaigns(pool: web::Data<PgPool>, req: HttpRequest) -> Result<HttpResponse, actix_web::Error> {
    let claims = extract_claims(&req)?;
    let team_id = get_team_id(&claims)?;

    let campaigns: Vec<Campaign> = sqlx::query_as("SELECT * FROM campaigns WHERE team_id = $1 ORDER BY created_at DESC")
        .bind(team_id)
        .fetch_all(pool.get_ref())
        .await
        .map_err(|e| actix_web::error::ErrorInternalServerError(e.to_string()))?;

    Ok(HttpResponse::Ok().json(campaigns))
}

async fn get_campaign_by_id(pool: web::Data<PgPool>, path: web::Path<Uuid>, req: HttpRequest) -> Result<HttpResponse, actix_web::Error> {
    let claims = extract_claims(&req)?;
    let team_id = get_team_id(&claims)?;
    let campaign_id = path.into_inner();

    let campaign: Option<Campaign> = sqlx::query_as("SELECT * FROM campaigns WHERE id = $1 AND team_id = $2")
        .bind(campaign_id)
        .bind(team_id)
        .fetch_optional(pool.get_ref())
        .await
        .map_err(|e| actix_web::error::ErrorInternalServerError(e.to_string()))?;

    match campaign {
        Some(c) => Ok(HttpResponse::Ok().json(c)),
        None => Ok(HttpResponse::NotFound().json(serde_json::json!({"error": "campaign not found"}))),
    }
}

async fn create_campaign(
    pool: web::Data<PgPool>,
    body: web::Json<CreateCampaignRequest>,
    req: HttpRequest,
) -> Result<HttpResponse, actix_web::Error> {
    let claims = extract_claims(&req)?;
    let team_id = get_team_id(&claims)?;

    let campaign: Campaign = sqlx::query_as(
        r#"
        INSERT INTO campaigns (id, team_id, name, status, lead_list_id, settings, created_at)
        VALUES ($1, $2, $3, 'draft', $4, $5, now())
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(team_id)
    .bind(&body.name)
    .bind(body.lead_list_id)
    .bind(body.settings.clone().unwrap_or_else(|| serde_json::json!({})))
    .fetch_one(pool.get_ref())
    .await
    .map_err(|e| actix_web::error::ErrorInternalServerError(e.to_string()))?;

    Ok(HttpResponse::Created().json(campaign))
}

async fn update_campaign(
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
    body: web::Json<UpdateCampaignRequest>,
    req: HttpRequest,
) -> Result<HttpResponse, actix_web::Error> {
    let claims = extract_claims(&req)?;
    let team_id = get_team_id(&claims)?;
    let campaign_id = path.into_inner();

    let campaign: Option<Campaign> = sqlx::query_as(
        r#"
        UPDATE campaigns SET
            name = COALESCE($3, name),
            status = COALESCE($4, status),
            settings = COALESCE($5, settings)
        WHERE id = $1 AND team_id = $2
        RETURNING *
        "#,
    )
    .bind(campaign_id)
    .bind(team_id)
    .bind(&body.name)
    .bind(&body.status)
    .bind(&body.settings)
    .fetch_optional(pool.get_ref())
    .await
    .map_err(|e| actix_web::error::ErrorInternalServerError(e.to_string()))?;

    match campaign {
        Some(c) => Ok(HttpResponse::Ok().json(c)),
        None => Ok(HttpResponse::NotFound().json(serde_json::json!({"error": "campaign not found"}))),
    }
}

async fn delete_campaign(pool: web::Data<PgPool>, path: web::Path<Uuid>, req: HttpRequest) -> Result<HttpResponse, actix_web::Error> {
    let claims = extract_claims(&req)?;
    let team_id = get_team_id(&claims)?;
    let campaign_id = path.into_inner();

    let result = sqlx::query("DELETE FROM campaigns WHERE id = $1 AND team_id = $2")
        .bind(campaign_id)
        .bind(team_id)
        .execute(pool.get_ref())
        .await
        .map_err(|e| actix_web::error::ErrorInternalServerError(e.to_string()))?;

    if result.rows_affected() > 0 {
        Ok(HttpResponse::Ok().json(serde_json::json!({"deleted": true})))
    } else {
        Ok(HttpResponse::NotFound().json(serde_json::json!({"error": "campaign not found"})))
    }
}

/// Spec §4.1 "Campaign lifecycle": draft/paused → active. Picked up by the
/// scheduler's next tick.
async fn start_campaign(pool: web::Data<PgPool>, path: web::Path<Uuid>, req: HttpRequest) -> Result<HttpResponse, actix_web::Error> {
    let claims = extract_claims(&req)?;
    let team_id = get_team_id(&claims)?;
    let campaign_id = path.into_inner();
    let now = Utc::now();

    let result = sqlx::query(
        "UPDATE campaigns SET status = 'active', started_at = COALESCE(started_at, $1) WHERE id = $2 AND team_id = $3 AND status IN ('draft', 'paused')",
    )
    .bind(now)
    .bind(campaign_id)
    .bind(team_id)
    .execute(pool.get_ref())
    .await
    .map_err(|e| actix_web::error::ErrorInternalServerError(e.to_string()))?;

    if result.rows_affected() > 0 {
        Ok(HttpResponse::Ok().json(serde_json::json!({"status": "active", "started_at": now})))
    } else {
        Ok(HttpResponse::BadRequest().json(serde_json::json!({"error": "campaign not found or cannot be started"})))
    }
}

async fn pause_campaign(pool: web::Data<PgPool>, path: web::Path<Uuid>, req: HttpRequest) -> Result<HttpResponse, actix_web::Error> {
    let claims = extract_claims(&req)?;
    let team_id = get_team_id(&claims)?;
    let campaign_id = path.into_inner();

    let result = sqlx::query("UPDATE campaigns SET status = 'paused' WHERE id = $1 AND team_id = $2 AND status = 'active'")
        .bind(campaign_id)
        .bind(team_id)
        .execute(pool.get_ref())
        .await
        .map_err(|e| actix_web::error::ErrorInternalServerError(e.to_string()))?;

    if result.rows_affected() > 0 {
        Ok(HttpResponse::Ok().json(serde_json::json!({"status": "paused"})))
    } else {
        Ok(HttpResponse::BadRequest().json(serde_json::json!({"error": "campaign not found or not active"})))
    }
}

/// A campaign's leads are its `lead_list_id` membership, not a manual join
/// table — the scheduler draws from the same set (spec §4.1/§4.4).
async fn get_campaign_leads(pool: web::Data<PgPool>, path: web::Path<Uuid>, req: HttpRequest) -> Result<HttpResponse, actix_web::Error> {
    let claims = extract_claims(&req)?;
    let team_id = get_team_id(&claims)?;
    let campaign_id = path.into_inner();

    let leads: Vec<Lead> = sqlx::query_as(
        r#"
        SELECT l.* FROM leads l
        INNER JOIN campaigns c ON c.lead_list_id = l.lead_list_id
        WHERE c.id = $1 AND c.team_id = $2
        ORDER BY l.created_at DESC
        "#,
    )
    .bind(campaign_id)
    .bind(team_id)
    .fetch_all(pool.get_ref())
    .await
    .map_err(|e| actix_web::error::ErrorInternalServerError(e.to_string()))?;

    Ok(HttpResponse::Ok().json(leads))
}

async fn get_sequence_steps(pool: web::Data<PgPool>, path: web::Path<Uuid>, req: HttpRequest) -> Result<HttpResponse, actix_web::Error> {
    let claims = extract_claims(&req)?;
    let team_id = get_team_id(&claims)?;
    let campaign_id = path.into_inner();

    let exists: i64 = sqlx::query_scalar("SELECT count(*) FROM campaigns WHERE id = $1 AND team_id = $2")
        .bind(campaign_id)
        .bind(team_id)
        .fetch_one(pool.get_ref())
        .await
        .map_err(|e| actix_web::error::ErrorInternalServerError(e.to_string()))?;
    if exists == 0 {
        return Ok(HttpResponse::NotFound().json(serde_json::json!({"error": "campaign not found"})));
    }

    let steps: Vec<SequenceStep> = sqlx::query_as("SELECT * FROM sequence_steps WHERE campaign_id = $1 ORDER BY step_number ASC")
        .bind(campaign_id)
        .fetch_all(pool.get_ref())
        .await
        .map_err(|e| actix_web::error::ErrorInternalServerError(e.to_string()))?;

    Ok(HttpResponse::Ok().json(steps))
}

async fn add_sequence_step(
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
    body: web::Json<CreateSequenceStepRequest>,
    req: HttpRequest,
) -> Result<HttpResponse, actix_web::Error> {
    let claims = extract_claims(&req)?;
    let team_id = get_team_id(&claims)?;
    let campaign_id = path.into_inner();

    let exists: i64 = sqlx::query_scalar("SELECT count(*) FROM campaigns WHERE id = $1 AND team_id = $2")
        .bind(campaign_id)
        .bind(team_id)
        .fetch_one(pool.get_ref())
        .await
        .map_err(|e| actix_web::error::ErrorInternalServerError(e.to_string()))?;
    if exists == 0 {
        return Ok(HttpResponse::NotFound().json(serde_json::json!({"error": "campaign not found"})));
    }

    let next_step: i32 = sqlx::query_scalar("SELECT COALESCE(MAX(step_number), 0) + 1 FROM sequence_steps WHERE campaign_id = $1")
        .bind(campaign_id)
        .fetch_one(pool.get_ref())
        .await
        .map_err(|e| actix_web::error::ErrorInternalServerError(e.to_string()))?;

    let step: SequenceStep = sqlx::query_as(
        r#"
        INSERT INTO sequence_steps (id, campaign_id, step_number, delay_days, delay_hours, subject, body_html, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, now())
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(campaign_id)
    .bind(next_step)
    .bind(body.delay_days)
    .bind(body.delay_hours)
    .bind(&body.subject)
    .bind(&body.body_html)
    .fetch_one(pool.get_ref())
    .await
    .map_err(|e| actix_web::error::ErrorInternalServerError(e.to_string()))?;

    Ok(HttpResponse::Created().json(step))
}
