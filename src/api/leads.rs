use actix_web::{web, HttpRequest, HttpResponse};
use sqlx::PgPool;
use uuid::Uuid;

use crate::middleware::auth::{extract_claims, get_team_id};
use crate::models::lead::{CreateLeadRequest, Lead};
use crate::models::lead_list::{CreateLeadListRequest, LeadList};
use crate::services::email_verifier::EmailVerifier;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/leads")
            .route("", web::get().to(get_leads))
            .route("", web::post().to(create_lead))
            .route("/verify", web::post().to(verify_leads))
            .route("/{id}", web::get().to(get_lead_by_id))
            .route("/{id}", web::delete().to(delete_lead)),
    );
    cfg.service(
        web::scope("/lead-lists")
            .route("", web::get().to(get_lead_lists))
            .route("", web::post().to(create_lead_list)),
    );
}

async fn get_leads(pool: web::Data<PgPool>, req: HttpRequest) -> Result<HttpResponse, actix_web::Error> {
    let claims = extract_claims(&req)?;
    let team_id = get_team_id(&claims)?;

    let leads: Vec<Lead> = sqlx::query_as("SELECT * FROM leads WHERE team_id = $1 ORDER BY created_at DESC LIMIT 500")
        .bind(team_id)
        .fetch_all(pool.get_ref())
        .await
        .map_err(|e| actix_web::error::ErrorInternalServerError(e.to_string()))?;

    Ok(HttpResponse::Ok().json(leads))
}

async fn get_lead_by_id(pool: web::Data<PgPool>, path: web::Path<Uuid>, req: HttpRequest) -> Result<HttpResponse, actix_web::Error> {
    let claims = extract_claims(&req)?;
    let team_id = get_team_id(&claims)?;
    let lead_id = path.into_inner();

    let lead: Option<Lead> = sqlx::query_as("SELECT * FROM leads WHERE id = $1 AND team_id = $2")
        .bind(lead_id)
        .bind(team_id)
        .fetch_optional(pool.get_ref())
        .await
        .map_err(|e| actix_web::error::ErrorInternalServerError(e.to_string()))?;

    match lead {
        Some(lead) => Ok(HttpResponse::Ok().json(lead)),
        None => Ok(HttpResponse::NotFound().json(serde_json::json!({"error": "lead not found"}))),
    }
}

async fn create_lead(
    pool: web::Data<PgPool>,
    req: HttpRequest,
    body: web::Json<CreateLeadRequest>,
) -> Result<HttpResponse, actix_web::Error> {
    let claims = extract_claims(&req)?;
    let team_id = get_team_id(&claims)?;
    let body = body.into_inner();

    let lead_id = Uuid::new_v4();
    let lead: Lead = sqlx::query_as(
        r#"
        INSERT INTO leads (
            id, team_id, lead_list_id, email, first_name, last_name, company, title, phone,
            linkedin_url, website, country, city, timezone, custom_fields, status, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, 'pending', now(), now())
        ON CONFLICT (team_id, email) DO UPDATE SET updated_at = now()
        RETURNING *
        "#,
    )
    .bind(lead_id)
    .bind(team_id)
    .bind(body.lead_list_id)
    .bind(body.email.to_lowercase())
    .bind(&body.first_name)
    .bind(&body.last_name)
    .bind(&body.company)
    .bind(&body.title)
    .bind(&body.phone)
    .bind(&body.linkedin_url)
    .bind(&body.website)
    .bind(&body.country)
    .bind(&body.city)
    .bind(&body.timezone)
    .bind(body.custom_fields.unwrap_or_else(|| serde_json::json!({})))
    .fetch_one(pool.get_ref())
    .await
    .map_err(|e| actix_web::error::ErrorInternalServerError(e.to_string()))?;

    if let Some(lead_list_id) = lead.lead_list_id {
        sqlx::query("UPDATE lead_lists SET lead_count = (SELECT count(*) FROM leads WHERE lead_list_id = $1) WHERE id = $1")
            .bind(lead_list_id)
            .execute(pool.get_ref())
            .await
            .map_err(|e| actix_web::error::ErrorInternalServerError(e.to_string()))?;
    }

    Ok(HttpResponse::Created().json(lead))
}

async fn delete_lead(pool: web::Data<PgPool>, path: web::Path<Uuid>, req: HttpRequest) -> Result<HttpResponse, actix_web::Error> {
    let claims = extract_claims(&req)?;
    let team_id = get_team_id(&claims)?;
    let lead_id = path.into_inner();

    let result = sqlx::query("DELETE FROM leads WHERE id = $1 AND team_id = $2")
        .bind(lead_id)
        .bind(team_id)
        .execute(pool.get_ref())
        .await
        .map_err(|e| actix_web::error::ErrorInternalServerError(e.to_string()))?;

    if result.rows_affected() > 0 {
        Ok(HttpResponse::Ok().json(serde_json::json!({"deleted": true})))
    } else {
        Ok(HttpResponse::NotFound().json(serde_json::json!({"error": "lead not found"})))
    }
}

async fn get_lead_lists(pool: web::Data<PgPool>, req: HttpRequest) -> Result<HttpResponse, actix_web::Error> {
    let claims = extract_claims(&req)?;
    let team_id = get_team_id(&claims)?;

    let lists: Vec<LeadList> = sqlx::query_as("SELECT * FROM lead_lists WHERE team_id = $1 ORDER BY created_at DESC")
        .bind(team_id)
        .fetch_all(pool.get_ref())
        .await
        .map_err(|e| actix_web::error::ErrorInternalServerError(e.to_string()))?;

    Ok(HttpResponse::Ok().json(lists))
}

async fn create_lead_list(
    pool: web::Data<PgPool>,
    req: HttpRequest,
    body: web::Json<CreateLeadListRequest>,
) -> Result<HttpResponse, actix_web::Error> {
    let claims = extract_claims(&req)?;
    let team_id = get_team_id(&claims)?;

    let list: LeadList = sqlx::query_as(
        "INSERT INTO lead_lists (id, team_id, name, lead_count, created_at) VALUES ($1, $2, $3, 0, now()) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(team_id)
    .bind(&body.name)
    .fetch_one(pool.get_ref())
    .await
    .map_err(|e| actix_web::error::ErrorInternalServerError(e.to_string()))?;

    Ok(HttpResponse::Created().json(list))
}

/// Checks email deliverability signals (syntax, MX, disposable/role-based
/// heuristics) without touching the lead's persisted state.
async fn verify_leads(emails: web::Json<Vec<String>>, req: HttpRequest) -> Result<HttpResponse, actix_web::Error> {
    let _claims = extract_claims(&req)?;

    let verifier = EmailVerifier::new()
        .await
        .map_err(|e| actix_web::error::ErrorInternalServerError(e.to_string()))?;

    let results = verifier.verify_batch(&emails).await;
    let body: Vec<_> = results
        .into_iter()
        .map(|(email, status, confidence)| {
            serde_json::json!({ "email": email, "status": status.as_str(), "confidence": confidence })
        })
        .collect();

    Ok(HttpResponse::Ok().json(body))
}
