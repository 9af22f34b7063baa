use actix_web::{web, HttpRequest, HttpResponse};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use sqlx::PgPool;
use uuid::Uuid;

use crate::middleware::auth::{extract_claims, get_team_id};
use crate::models::inbox::{CreateInboxRequest, Inbox, UpdateWarmupSettingsRequest, WarmupState};
use crate::services::encryption::EncryptionService;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/inboxes")
            .route("", web::get().to(get_inboxes))
            .route("", web::post().to(create_inbox))
            .route("/{id}", web::get().to(get_inbox))
            .route("/{id}", web::delete().to(delete_inbox))
            .route("/{id}/warmup", web::get().to(get_warmup_state))
            .route("/{id}/warmup", web::put().to(update_warmup_settings))
            .route("/{id}/warmup/start", web::post().to(start_warmup))
            .route("/{id}/warmup/pause", web::post().to(pause_warmup)),
    );
}

async fn get_inboxes(pool: web::Data<PgPool>, req: HttpRequest) -> Result<HttpResponse, actix_web::Error> {
    let claims = extract_claims(&req)?;
    let team_id = get_team_id(&claims)?;

    let inboxes: Vec<Inbox> = sqlx::query_as("SELECT * FROM inboxes WHERE team_id = $1 ORDER BY created_at DESC")
        .bind(team_id)
        .fetch_all(pool.get_ref())
        .await
        .map_err(|e| actix_web::error::ErrorInternalServerError(e.to_string()))?;

    Ok(HttpResponse::Ok().json(inboxes))
}

async fn get_inbox(pool: web::Data<PgPool>, path: web::Path<Uuid>, req: HttpRequest) -> Result<HttpResponse, actix_web::Error> {
    let claims = extract_claims(&req)?;
    let team_id = get_team_id(&claims)?;
    let inbox_id = path.into_inner();

    let inbox: Option<Inbox> = sqlx::query_as("SELECT * FROM inboxes WHERE id = $1 AND team_id = $2")
        .bind(inbox_id)
        .bind(team_id)
        .fetch_optional(pool.get_ref())
        .await
        .map_err(|e| actix_web::error::ErrorInternalServerError(e.to_string()))?;

    match inbox {
        Some(inbox) => Ok(HttpResponse::Ok().json(inbox)),
        None => Ok(HttpResponse::NotFound().json(serde_json::json!({"error": "inbox not found"}))),
    }
}

/// Persists the mailbox and, for SMTP providers, its encrypted credential.
/// A fresh inbox starts with a `warmup_states` row so the engine can enroll
/// it without a separate provisioning step.
async fn create_inbox(
    pool: web::Data<PgPool>,
    config: web::Data<std::sync::Arc<crate::config::Config>>,
    body: web::Json<CreateInboxRequest>,
    req: HttpRequest,
) -> Result<HttpResponse, actix_web::Error> {
    let claims = extract_claims(&req)?;
    let team_id = get_team_id(&claims)?;
    let body = body.into_inner();

    let (encrypted_password, key_id) = match (&body.smtp_password, &config.encryption_key) {
        (Some(password), Some(key)) => {
            let key_bytes = BASE64
                .decode(key)
                .map_err(|e| actix_web::error::ErrorInternalServerError(e.to_string()))?;
            let enc = EncryptionService::new_with_key(&key_bytes, &config.encryption_key_id)
                .map_err(actix_web::error::ErrorInternalServerError)?;
            let (ciphertext, used_key_id) = enc.encrypt(password).map_err(actix_web::error::ErrorInternalServerError)?;
            (Some(ciphertext), Some(used_key_id))
        }
        _ => (None, None),
    };

    let inbox_id = Uuid::new_v4();
    let inbox: Inbox = sqlx::query_as(
        r#"
        INSERT INTO inboxes (
            id, team_id, provider, email, from_name, status, health_score,
            daily_send_limit, smtp_host, smtp_port, smtp_username,
            smtp_password_encrypted, encryption_key_id, created_at
        ) VALUES ($1, $2, $3, $4, $5, 'active', 100, $6, $7, $8, $9, $10, $11, now())
        RETURNING *
        "#,
    )
    .bind(inbox_id)
    .bind(team_id)
    .bind(&body.provider)
    .bind(body.email.to_lowercase())
    .bind(&body.from_name)
    .bind(body.daily_send_limit.unwrap_or(50))
    .bind(&body.smtp_host)
    .bind(body.smtp_port)
    .bind(&body.smtp_username)
    .bind(&encrypted_password)
    .bind(&key_id)
    .fetch_one(pool.get_ref())
    .await
    .map_err(|e| actix_web::error::ErrorInternalServerError(e.to_string()))?;

    sqlx::query(
        "INSERT INTO warmup_states (inbox_id, enabled, phase, current_day, ramp_speed, target_daily_volume, reply_rate_target, started_at) \
         VALUES ($1, false, 'paused', 1, 'normal', 5, 30, now())",
    )
    .bind(inbox_id)
    .execute(pool.get_ref())
    .await
    .map_err(|e| actix_web::error::ErrorInternalServerError(e.to_string()))?;

    Ok(HttpResponse::Created().json(inbox))
}

async fn delete_inbox(pool: web::Data<PgPool>, path: web::Path<Uuid>, req: HttpRequest) -> Result<HttpResponse, actix_web::Error> {
    let claims = extract_claims(&req)?;
    let team_id = get_team_id(&claims)?;
    let inbox_id = path.into_inner();

    let result = sqlx::query("DELETE FROM inboxes WHERE id = $1 AND team_id = $2")
        .bind(inbox_id)
        .bind(team_id)
        .execute(pool.get_ref())
        .await
        .map_err(|e| actix_web::error::ErrorInternalServerError(e.to_string()))?;

    if result.rows_affected() > 0 {
        Ok(HttpResponse::Ok().json(serde_json::json!({"deleted": true})))
    } else {
        Ok(HttpResponse::NotFound().json(serde_json::json!({"error": "inbox not found"})))
    }
}

async fn get_warmup_state(pool: web::Data<PgPool>, path: web::Path<Uuid>, req: HttpRequest) -> Result<HttpResponse, actix_web::Error> {
    let claims = extract_claims(&req)?;
    let team_id = get_team_id(&claims)?;
    let inbox_id = path.into_inner();

    let state = load_warmup_for_team(pool.get_ref(), inbox_id, team_id).await?;
    match state {
        Some(state) => Ok(HttpResponse::Ok().json(state)),
        None => Ok(HttpResponse::NotFound().json(serde_json::json!({"error": "inbox not found"}))),
    }
}

/// Spec §3 "Inbox Settings" — ramp speed, target volume, and mode are
/// operator-tunable; `enabled`/`phase` are owned by the warmup engine
/// (§4.7) and only move via start/pause below.
async fn update_warmup_settings(
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
    body: web::Json<UpdateWarmupSettingsRequest>,
    req: HttpRequest,
) -> Result<HttpResponse, actix_web::Error> {
    let claims = extract_claims(&req)?;
    let team_id = get_team_id(&claims)?;
    let inbox_id = path.into_inner();

    if load_warmup_for_team(pool.get_ref(), inbox_id, team_id).await?.is_none() {
        return Ok(HttpResponse::NotFound().json(serde_json::json!({"error": "inbox not found"})));
    }

    let state: WarmupState = sqlx::query_as(
        r#"
        UPDATE warmup_states SET
            ramp_speed = COALESCE($2, ramp_speed),
            target_daily_volume = COALESCE($3, target_daily_volume),
            reply_rate_target = COALESCE($4, reply_rate_target),
            warmup_mode = COALESCE($5, warmup_mode)
        WHERE inbox_id = $1
        RETURNING *
        "#,
    )
    .bind(inbox_id)
    .bind(&body.ramp_speed)
    .bind(body.target_daily_volume)
    .bind(body.reply_rate_target)
    .bind(&body.warmup_mode)
    .fetch_one(pool.get_ref())
    .await
    .map_err(|e| actix_web::error::ErrorInternalServerError(e.to_string()))?;

    Ok(HttpResponse::Ok().json(state))
}

/// Spec §3 Warmup State invariant: `enabled=true` requires a non-null
/// `warmup_mode`. Defaults a bare mailbox to `pool` mode rather than
/// rejecting the request, matching the reconciliation pass's own
/// self-healing bias (§4.7 "State-sync invariants").
async fn start_warmup(pool: web::Data<PgPool>, path: web::Path<Uuid>, req: HttpRequest) -> Result<HttpResponse, actix_web::Error> {
    let claims = extract_claims(&req)?;
    let team_id = get_team_id(&claims)?;
    let inbox_id = path.into_inner();

    if load_warmup_for_team(pool.get_ref(), inbox_id, team_id).await?.is_none() {
        return Ok(HttpResponse::NotFound().json(serde_json::json!({"error": "inbox not found"})));
    }

    let state: WarmupState = sqlx::query_as(
        r#"
        UPDATE warmup_states SET
            enabled = true,
            phase = 'ramping',
            warmup_mode = COALESCE(warmup_mode, 'pool')
        WHERE inbox_id = $1
        RETURNING *
        "#,
    )
    .bind(inbox_id)
    .fetch_one(pool.get_ref())
    .await
    .map_err(|e| actix_web::error::ErrorInternalServerError(e.to_string()))?;

    sqlx::query("UPDATE inboxes SET status = 'warming_up', status_reason = NULL WHERE id = $1")
        .bind(inbox_id)
        .execute(pool.get_ref())
        .await
        .map_err(|e| actix_web::error::ErrorInternalServerError(e.to_string()))?;

    Ok(HttpResponse::Ok().json(state))
}

async fn pause_warmup(pool: web::Data<PgPool>, path: web::Path<Uuid>, req: HttpRequest) -> Result<HttpResponse, actix_web::Error> {
    let claims = extract_claims(&req)?;
    let team_id = get_team_id(&claims)?;
    let inbox_id = path.into_inner();

    if load_warmup_for_team(pool.get_ref(), inbox_id, team_id).await?.is_none() {
        return Ok(HttpResponse::NotFound().json(serde_json::json!({"error": "inbox not found"})));
    }

    let state: WarmupState = sqlx::query_as(
        "UPDATE warmup_states SET enabled = false, phase = 'paused' WHERE inbox_id = $1 RETURNING *",
    )
    .bind(inbox_id)
    .fetch_one(pool.get_ref())
    .await
    .map_err(|e| actix_web::error::ErrorInternalServerError(e.to_string()))?;

    sqlx::query("UPDATE inboxes SET status = 'active' WHERE id = $1 AND status = 'warming_up'")
        .bind(inbox_id)
        .execute(pool.get_ref())
        .await
        .map_err(|e| actix_web::error::ErrorInternalServerError(e.to_string()))?;

    Ok(HttpResponse::Ok().json(state))
}

async fn load_warmup_for_team(pool: &PgPool, inbox_id: Uuid, team_id: Uuid) -> Result<Option<WarmupState>, actix_web::Error> {
    sqlx::query_as(
        r#"
        SELECT w.* FROM warmup_states w
        INNER JOIN inboxes i ON i.id = w.inbox_id
        WHERE w.inbox_id = $1 AND i.team_id = $2
        "#,
    )
    .bind(inbox_id)
    .bind(team_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| actix_web::error::ErrorInternalServerError(e.to_string()))
}
