use actix_web::{web, HttpRequest, HttpResponse, Responder};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::Config;
use crate::middleware::auth::{extract_claims, Claims};
use crate::models::user::{User, UserResponse};

const JWT_EXPIRATION_HOURS: i64 = 24;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub team_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserResponse,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .route("/register", web::post().to(register))
            .route("/login", web::post().to(login))
            .route("/me", web::get().to(get_current_user))
            .route("/refresh", web::post().to(refresh_token)),
    );
}

async fn register(pool: web::Data<PgPool>, config: web::Data<std::sync::Arc<Config>>, payload: web::Json<RegisterRequest>) -> impl Responder {
    let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE email = $1")
        .bind(&payload.email)
        .fetch_one(pool.get_ref())
        .await
        .unwrap_or(0);

    if existing > 0 {
        return HttpResponse::Conflict().json(serde_json::json!({"error": "email already registered"}));
    }

    let salt = SaltString::generate(&mut OsRng);
    let password_hash = match Argon2::default().hash_password(payload.password.as_bytes(), &salt) {
        Ok(hash) => hash.to_string(),
        Err(_) => return HttpResponse::InternalServerError().json(serde_json::json!({"error": "failed to hash password"})),
    };

    let user_id = Uuid::new_v4();
    let now = Utc::now();

    if let Err(e) = sqlx::query(
        "INSERT INTO users (id, email, password_hash, first_name, last_name, email_verified, created_at) VALUES ($1, $2, $3, $4, $5, false, $6)",
    )
    .bind(user_id)
    .bind(&payload.email)
    .bind(&password_hash)
    .bind(&payload.first_name)
    .bind(&payload.last_name)
    .bind(now)
    .execute(pool.get_ref())
    .await
    {
        return HttpResponse::InternalServerError().json(serde_json::json!({"error": e.to_string()}));
    }

    let team_id = Uuid::new_v4();
    let team_name = payload
        .team_name
        .clone()
        .unwrap_or_else(|| format!("{}'s Team", payload.first_name.clone().unwrap_or_else(|| "New".to_string())));

    if let Err(e) = sqlx::query("INSERT INTO teams (id, name, timezone, created_at, updated_at) VALUES ($1, $2, 'America/New_York', $3, $3)")
        .bind(team_id)
        .bind(&team_name)
        .bind(now)
        .execute(pool.get_ref())
        .await
    {
        return HttpResponse::InternalServerError().json(serde_json::json!({"error": e.to_string()}));
    }

    if let Err(e) = sqlx::query("INSERT INTO team_members (id, team_id, user_id, role, joined_at) VALUES ($1, $2, $3, 'owner', $4)")
        .bind(Uuid::new_v4())
        .bind(team_id)
        .bind(user_id)
        .bind(now)
        .execute(pool.get_ref())
        .await
    {
        return HttpResponse::InternalServerError().json(serde_json::json!({"error": e.to_string()}));
    }

    let token = generate_token(&config, user_id, &payload.email, "owner", Some(team_id));
    let user = User {
        id: user_id,
        email: payload.email.clone(),
        password_hash: String::new(),
        first_name: payload.first_name.clone(),
        last_name: payload.last_name.clone(),
        email_verified: Some(false),
        created_at: now,
        last_login: None,
    };

    HttpResponse::Created().json(AuthResponse { token, user: user.into() })
}

async fn login(pool: web::Data<PgPool>, config: web::Data<std::sync::Arc<Config>>, payload: web::Json<LoginRequest>) -> impl Responder {
    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = $1")
        .bind(&payload.email)
        .fetch_optional(pool.get_ref())
        .await
        .unwrap_or(None);

    let Some(user) = user else {
        return HttpResponse::Unauthorized().json(serde_json::json!({"error": "invalid credentials"}));
    };

    let parsed_hash = match PasswordHash::new(&user.password_hash) {
        Ok(hash) => hash,
        Err(_) => return HttpResponse::InternalServerError().json(serde_json::json!({"error": "invalid password hash"})),
    };

    if Argon2::default().verify_password(payload.password.as_bytes(), &parsed_hash).is_err() {
        return HttpResponse::Unauthorized().json(serde_json::json!({"error": "invalid credentials"}));
    }

    let _ = sqlx::query("UPDATE users SET last_login = now() WHERE id = $1")
        .bind(user.id)
        .execute(pool.get_ref())
        .await;

    let membership: Option<(Uuid, String)> = sqlx::query_as(
        r#"
        SELECT team_id, role FROM team_members
        WHERE user_id = $1
        ORDER BY joined_at ASC
        LIMIT 1
        "#,
    )
    .bind(user.id)
    .fetch_optional(pool.get_ref())
    .await
    .unwrap_or(None);

    let (team_id, role) = match membership {
        Some((team_id, role)) => (Some(team_id), role),
        None => (None, "owner".to_string()),
    };

    let token = generate_token(&config, user.id, &user.email, &role, team_id);
    HttpResponse::Ok().json(AuthResponse { token, user: user.into() })
}

async fn get_current_user(pool: web::Data<PgPool>, req: HttpRequest) -> impl Responder {
    let claims = match extract_claims(&req) {
        Ok(c) => c,
        Err(e) => return HttpResponse::from_error(e),
    };

    let user_id = match Uuid::parse_str(&claims.user_id) {
        Ok(id) => id,
        Err(_) => return HttpResponse::Unauthorized().json(serde_json::json!({"error": "invalid user id"})),
    };

    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool.get_ref())
        .await
        .unwrap_or(None);

    match user {
        Some(user) => HttpResponse::Ok().json(UserResponse::from(user)),
        None => HttpResponse::NotFound().json(serde_json::json!({"error": "user not found"})),
    }
}

async fn refresh_token(config: web::Data<std::sync::Arc<Config>>, req: HttpRequest) -> impl Responder {
    let claims = match extract_claims(&req) {
        Ok(c) => c,
        Err(e) => return HttpResponse::from_error(e),
    };

    let Ok(user_id) = Uuid::parse_str(&claims.user_id) else {
        return HttpResponse::Unauthorized().json(serde_json::json!({"error": "invalid user id"}));
    };
    let team_id = claims.team_id.as_deref().and_then(|s| Uuid::parse_str(s).ok());

    let token = generate_token(&config, user_id, &claims.sub, &claims.role, team_id);
    HttpResponse::Ok().json(serde_json::json!({ "token": token }))
}

fn generate_token(config: &Config, user_id: Uuid, email: &str, role: &str, team_id: Option<Uuid>) -> String {
    let now = Utc::now();
    let exp = now + Duration::hours(JWT_EXPIRATION_HOURS);

    let claims = Claims {
        sub: email.to_string(),
        user_id: user_id.to_string(),
        team_id: team_id.map(|id| id.to_string()),
        role: role.to_string(),
        exp: exp.timestamp() as usize,
        iat: now.timestamp() as usize,
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(config.jwt_secret.as_bytes())).unwrap_or_default()
}
