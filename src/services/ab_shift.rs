//! Progressive A/B traffic shifting (spec §4.6). A periodic job, separate
//! from the campaign scheduler's own cadence, that walks every sequence
//! step carrying two or more variants, applies the guarded two-proportion
//! z-test in `variant_selection.rs`, and persists the resulting weights
//! (and winner declaration) back onto `sequence_variants`. Grounded on
//! `campaign_scheduler.rs`'s tick/per-item error-isolation idiom; the pure
//! math lives in `variant_selection.rs`.

use sqlx::PgPool;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::CoreError;
use crate::models::sequence::SequenceVariant;
use crate::services::variant_selection::{self, PrimaryMetric};

/// One tick: every step with >=2 variants is evaluated independently, and
/// a failure on one step never blocks the others (spec §4.4's "Failure
/// handling" isolation pattern, generalized to this job).
pub async fn tick(pool: &PgPool) -> Result<(), CoreError> {
    let step_ids = steps_with_multiple_variants(pool).await?;
    for step_id in step_ids {
        if let Err(e) = evaluate_step(pool, step_id).await {
            error!(sequence_step_id = %step_id, error = %e, "progressive traffic shift failed for step");
        }
    }
    Ok(())
}

async fn steps_with_multiple_variants(pool: &PgPool) -> Result<Vec<Uuid>, CoreError> {
    let rows: Vec<(Uuid,)> = sqlx::query_as(
        r#"
        SELECT sequence_step_id FROM sequence_variants
        GROUP BY sequence_step_id
        HAVING count(*) >= 2
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

async fn evaluate_step(pool: &PgPool, step_id: Uuid) -> Result<(), CoreError> {
    let variants: Vec<SequenceVariant> = sqlx::query_as(
        "SELECT * FROM sequence_variants WHERE sequence_step_id = $1 ORDER BY id ASC",
    )
    .bind(step_id)
    .fetch_all(pool)
    .await?;

    // spec §9 worked example (S5) compares by open rate; reply/click rate
    // are available to callers that need a different primary metric, but
    // the scheduled job uses open rate as its default primary metric.
    let Some(decision) = variant_selection::compute_shift(&variants, PrimaryMetric::OpenRate) else {
        return Ok(());
    };

    for (variant, new_weight) in variants.iter().zip(decision.new_weights.iter()) {
        let is_winner = decision.declare_winner && variant.id == variants[decision.leader_index].id;
        sqlx::query("UPDATE sequence_variants SET weight = $2, is_winner = $3 WHERE id = $1")
            .bind(variant.id)
            .bind(new_weight)
            .bind(is_winner)
            .execute(pool)
            .await?;
    }

    info!(
        sequence_step_id = %step_id,
        leader = %variants[decision.leader_index].id,
        confidence = decision.confidence,
        declare_winner = decision.declare_winner,
        "progressive traffic shift applied"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variant(id: Uuid, weight: i32, sent: i32, opened: i32) -> SequenceVariant {
        SequenceVariant {
            id,
            sequence_step_id: Uuid::new_v4(),
            subject: String::new(),
            body: String::new(),
            weight,
            is_winner: false,
            sent_count: sent,
            opened_count: opened,
            clicked_count: 0,
            replied_count: 0,
        }
    }

    #[test]
    fn winner_flag_lands_on_the_leader_only() {
        let a = variant(Uuid::new_v4(), 50, 100, 30);
        let b = variant(Uuid::new_v4(), 50, 100, 50);
        let variants = vec![a.clone(), b.clone()];
        let decision = variant_selection::compute_shift(&variants, PrimaryMetric::OpenRate).unwrap();
        assert!(decision.declare_winner);
        assert_eq!(variants[decision.leader_index].id, b.id);
    }
}
