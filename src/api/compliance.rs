use actix_web::{web, HttpRequest, HttpResponse};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::middleware::auth::{extract_claims, get_team_id};
use crate::models::compliance::{AddSuppressionRequest, SuppressionEntry, SuppressionReason};

#[derive(Debug, Deserialize)]
pub struct UnsubscribeRequest {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct UnsubscribeResponse {
    pub success: bool,
    pub message: String,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/compliance")
            .route("/unsubscribe", web::get().to(handle_unsubscribe))
            .route("/unsubscribe", web::post().to(handle_unsubscribe))
            .route("/suppression", web::get().to(get_suppression_list))
            .route("/suppression", web::post().to(add_to_suppression))
            .route("/suppression/{email}", web::delete().to(remove_from_suppression)),
    );
}

/// Public endpoint (spec §6 unsubscribe link) — no auth required. Token is
/// `lead_id:email:team_id`, base64url-encoded.
async fn handle_unsubscribe(pool: web::Data<PgPool>, query: web::Query<UnsubscribeRequest>) -> HttpResponse {
    process_unsubscribe(&pool, &query.token).await
}

async fn process_unsubscribe(pool: &PgPool, token: &str) -> HttpResponse {
    let decoded = match URL_SAFE_NO_PAD.decode(token).ok().and_then(|b| String::from_utf8(b).ok()) {
        Some(s) => s,
        None => {
            return HttpResponse::BadRequest().json(UnsubscribeResponse {
                success: false,
                message: "Invalid token".to_string(),
            })
        }
    };

    let parts: Vec<&str> = decoded.split(':').collect();
    if parts.len() < 3 {
        return HttpResponse::BadRequest().json(UnsubscribeResponse {
            success: false,
            message: "Invalid token structure".to_string(),
        });
    }

    let email = parts[1];
    let team_id = match Uuid::parse_str(parts[2]) {
        Ok(id) => id,
        Err(_) => {
            return HttpResponse::BadRequest().json(UnsubscribeResponse {
                success: false,
                message: "Invalid token".to_string(),
            })
        }
    };

    let result = sqlx::query(
        r#"
        INSERT INTO suppression_list (id, team_id, email, reason, details, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (team_id, email) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(team_id)
    .bind(email.to_lowercase())
    .bind(SuppressionReason::Unsubscribe.as_str())
    .bind(Option::<&str>::None)
    .bind(Utc::now())
    .execute(pool)
    .await;

    match result {
        Ok(_) => {
            let _ = sqlx::query("UPDATE leads SET status = 'unsubscribed', updated_at = now() WHERE team_id = $1 AND email = $2")
                .bind(team_id)
                .bind(email.to_lowercase())
                .execute(pool)
                .await;

            HttpResponse::Ok().json(UnsubscribeResponse {
                success: true,
                message: "You have been successfully unsubscribed.".to_string(),
            })
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to process unsubscribe");
            HttpResponse::InternalServerError().json(UnsubscribeResponse {
                success: false,
                message: "Failed to process unsubscribe request.".to_string(),
            })
        }
    }
}

async fn get_suppression_list(pool: web::Data<PgPool>, req: HttpRequest) -> Result<HttpResponse, actix_web::Error> {
    let claims = extract_claims(&req)?;
    let team_id = get_team_id(&claims)?;

    let entries: Vec<SuppressionEntry> = sqlx::query_as(
        "SELECT * FROM suppression_list WHERE team_id = $1 ORDER BY created_at DESC LIMIT 1000",
    )
    .bind(team_id)
    .fetch_all(pool.get_ref())
    .await
    .map_err(|e| actix_web::error::ErrorInternalServerError(e.to_string()))?;

    Ok(HttpResponse::Ok().json(entries))
}

async fn add_to_suppression(
    pool: web::Data<PgPool>,
    req: HttpRequest,
    body: web::Json<AddSuppressionRequest>,
) -> Result<HttpResponse, actix_web::Error> {
    let claims = extract_claims(&req)?;
    let team_id = get_team_id(&claims)?;

    sqlx::query(
        r#"
        INSERT INTO suppression_list (id, team_id, email, reason, details, created_at)
        VALUES ($1, $2, $3, $4, $5, now())
        ON CONFLICT (team_id, email) DO UPDATE SET reason = $4, details = $5, created_at = now()
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(team_id)
    .bind(body.email.to_lowercase())
    .bind(&body.reason)
    .bind(&body.details)
    .execute(pool.get_ref())
    .await
    .map_err(|e| actix_web::error::ErrorInternalServerError(e.to_string()))?;

    Ok(HttpResponse::Created().json(serde_json::json!({
        "success": true,
        "email": body.email,
        "reason": body.reason,
    })))
}

async fn remove_from_suppression(
    pool: web::Data<PgPool>,
    req: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse, actix_web::Error> {
    let claims = extract_claims(&req)?;
    let team_id = get_team_id(&claims)?;
    let email = path.into_inner();

    let result = sqlx::query("DELETE FROM suppression_list WHERE team_id = $1 AND email = $2")
        .bind(team_id)
        .bind(email.to_lowercase())
        .execute(pool.get_ref())
        .await
        .map_err(|e| actix_web::error::ErrorInternalServerError(e.to_string()))?;

    if result.rows_affected() > 0 {
        Ok(HttpResponse::Ok().json(serde_json::json!({"deleted": true, "email": email})))
    } else {
        Ok(HttpResponse::NotFound().json(serde_json::json!({"error": "email not found in suppression list"})))
    }
}
