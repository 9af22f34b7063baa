//! Ephemeral key-value substitute (spec §5, §9): warmup dedup keys with a
//! TTL, and the single-key CAS sentinel guarding the daily reset task.
//! Modeled as ordinary Postgres tables rather than a separate KV service,
//! since the rest of the store is Postgres-only and row uniqueness
//! already gives the atomicity the spec asks for (see DESIGN.md).

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;

use crate::error::CoreError;

pub struct KvStore<'a> {
    pool: &'a PgPool,
}

impl<'a> KvStore<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Atomic SET-NX with TTL (spec §4.7, §5, P4). Returns `true` when the
    /// key was not already held (a fresh acquisition, or the previous
    /// holder expired), `false` when an unexpired holder is still in
    /// place — the caller should treat that as "already seen".
    pub async fn try_acquire_dedup(&self, key: &str, ttl: Duration) -> Result<bool, CoreError> {
        let now = Utc::now();
        let expires_at = now + ttl;
        let row = sqlx::query(
            r#"
            INSERT INTO warmup_dedup_keys (key, expires_at)
            VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE
                SET expires_at = EXCLUDED.expires_at
                WHERE warmup_dedup_keys.expires_at < $3
            RETURNING key
            "#,
        )
        .bind(key)
        .bind(expires_at)
        .bind(now)
        .fetch_optional(self.pool)
        .await?;
        Ok(row.is_some())
    }

    /// Compare-and-swap a single sentinel row. `expected` is `None` for a
    /// first-ever acquisition (insert-if-absent); `Some(old)` requires the
    /// current value to match before swapping in `new_value`. Used for
    /// `warmup:last_reset_date` (spec §4.7, §5).
    pub async fn cas_sentinel(&self, name: &str, expected: Option<&str>, new_value: &str) -> Result<bool, CoreError> {
        let row = match expected {
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO kv_sentinels (name, value, updated_at)
                    VALUES ($1, $2, now())
                    ON CONFLICT (name) DO NOTHING
                    RETURNING name
                    "#,
                )
                .bind(name)
                .bind(new_value)
                .fetch_optional(self.pool)
                .await?
            }
            Some(expected_value) => {
                sqlx::query(
                    r#"
                    UPDATE kv_sentinels
                    SET value = $1, updated_at = now()
                    WHERE name = $2 AND value = $3
                    RETURNING name
                    "#,
                )
                .bind(new_value)
                .bind(name)
                .bind(expected_value)
                .fetch_optional(self.pool)
                .await?
            }
        };
        Ok(row.is_some())
    }

    pub async fn get_sentinel(&self, name: &str) -> Result<Option<String>, CoreError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM kv_sentinels WHERE name = $1")
            .bind(name)
            .fetch_optional(self.pool)
            .await?;
        Ok(row.map(|(value,)| value))
    }

    /// Periodic cleanup of expired dedup keys; not required for
    /// correctness (expired rows are simply overwritable) but keeps the
    /// table from growing unbounded.
    pub async fn purge_expired_dedup_keys(&self, now: DateTime<Utc>) -> Result<u64, CoreError> {
        let result = sqlx::query("DELETE FROM warmup_dedup_keys WHERE expires_at < $1")
            .bind(now)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
