use std::env;

/// Process-wide configuration, loaded once from the environment. Shared by
/// the API binary and the worker binary.
#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub app_url: String,
    pub frontend_url: String,
    pub smtp_host: Option<String>,
    pub smtp_port: Option<u16>,
    pub encryption_key: Option<String>,
    pub encryption_key_id: String,
    pub anthropic_api_key: Option<String>,

    /// Campaign scheduler tick cadence, seconds. Spec §4.4: "≈5 minutes".
    pub scheduler_tick_secs: u64,
    /// Warmup engine tick cadence, seconds. Spec §4.7: "≈30 minutes".
    pub warmup_tick_secs: u64,
    /// Health monitor / auto-pause cadence, seconds.
    pub health_check_tick_secs: u64,
    /// Daily-reset check cadence, seconds. Spec §4.7: "runs every minute".
    pub daily_reset_tick_secs: u64,
    /// Progressive A/B traffic-shifting cadence, seconds (spec §4.6: "a
    /// separate periodic job").
    pub ab_shift_tick_secs: u64,

    /// Spec §4.4 step 2: MIN_INBOX_HEALTH_SCORE.
    pub min_inbox_health_score: i32,
    /// Spec §4.4 step 4: MAX_EMAILS_PER_RUN.
    pub max_emails_per_run: i64,
    /// Spec §4.8: MIN_EMAILS_FOR_RATE.
    pub min_emails_for_rate: i64,
    /// Spec §4.8: BOUNCE_RATE_THRESHOLD.
    pub bounce_rate_threshold: f64,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            jwt_secret: env::var("JWT_SECRET")
                .unwrap_or_else(|_| "default-secret-change-in-production".to_string()),
            app_url: env::var("APP_URL").unwrap_or_else(|_| "https://app.outreachiq.com".to_string()),
            frontend_url: env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:3000".to_string()),
            smtp_host: env::var("SMTP_HOST").ok(),
            smtp_port: env::var("SMTP_PORT").ok().and_then(|p| p.parse().ok()),
            encryption_key: env::var("ENCRYPTION_KEY").ok(),
            encryption_key_id: env::var("ENCRYPTION_KEY_ID").unwrap_or_else(|_| "default-key-v1".to_string()),
            anthropic_api_key: env::var("ANTHROPIC_API_KEY").ok().or_else(|| env::var("CLAUDE_API_KEY").ok()),

            scheduler_tick_secs: env_u64("SCHEDULER_TICK_SECS", 300),
            warmup_tick_secs: env_u64("WARMUP_TICK_SECS", 1800),
            health_check_tick_secs: env_u64("HEALTH_CHECK_TICK_SECS", 21600),
            daily_reset_tick_secs: env_u64("DAILY_RESET_TICK_SECS", 60),
            ab_shift_tick_secs: env_u64("AB_SHIFT_TICK_SECS", 3600),

            min_inbox_health_score: env_i32("MIN_INBOX_HEALTH_SCORE", 50),
            max_emails_per_run: env_i64("MAX_EMAILS_PER_RUN", 100),
            min_emails_for_rate: env_i64("MIN_EMAILS_FOR_RATE", 50),
            bounce_rate_threshold: env_f64("BOUNCE_RATE_THRESHOLD", 0.03),
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_i32(key: &str, default: i32) -> i32 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_i64(key: &str, default: i64) -> i64 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
