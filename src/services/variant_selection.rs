//! A/B variant selection and progressive traffic shifting (spec §4.5, §4.6).
//! Pure module: weighted random draw, weight reset, winner declaration, and
//! the two-proportion z-test that drives automatic traffic shifting.

use crate::models::sequence::SequenceVariant;

/// Which engagement rate drives leader selection and the z-test. The
/// worked example (spec §9 S5) compares variants by open rate.
#[derive(Debug, Clone, Copy)]
pub enum PrimaryMetric {
    OpenRate,
    ClickRate,
    ReplyRate,
}

fn rate(variant: &SequenceVariant, metric: PrimaryMetric) -> (f64, i64) {
    match metric {
        PrimaryMetric::OpenRate => {
            let n = variant.sent_count as i64;
            let p = if n == 0 { 0.0 } else { variant.opened_count as f64 / n as f64 };
            (p, n)
        }
        PrimaryMetric::ClickRate => {
            let n = variant.opened_count as i64;
            let p = if n == 0 { 0.0 } else { variant.clicked_count as f64 / n as f64 };
            (p, n)
        }
        PrimaryMetric::ReplyRate => {
            let n = variant.sent_count as i64;
            let p = if n == 0 { 0.0 } else { variant.replied_count as f64 / n as f64 };
            (p, n)
        }
    }
}

/// Abramowitz & Stegun 26.2.17 polynomial approximation of the standard
/// normal CDF (spec §4.6).
fn normal_cdf_approx(z: f64) -> f64 {
    let x = z.abs();
    let k = 1.0 / (1.0 + 0.33267 * x);
    let a1 = 0.4361836;
    let a2 = -0.1201676;
    let a3 = 0.9372980;
    let phi = (-x * x / 2.0).exp() / (2.0 * std::f64::consts::PI).sqrt();
    1.0 - phi * (a1 * k + a2 * k * k + a3 * k * k * k)
}

/// Two-proportion z-score, zero-safe on empty samples (spec §4.6).
fn two_proportion_z(p1: f64, n1: i64, p2: f64, n2: i64) -> f64 {
    if n1 == 0 || n2 == 0 {
        return 0.0;
    }
    let (n1, n2) = (n1 as f64, n2 as f64);
    let p_hat = (p1 * n1 + p2 * n2) / (n1 + n2);
    let se = (p_hat * (1.0 - p_hat) * (1.0 / n1 + 1.0 / n2)).sqrt();
    if se == 0.0 {
        return 0.0;
    }
    (p1 - p2).abs() / se
}

/// Weighted random selection (spec §4.5). Empty weights (total = 0) fall
/// back to the first variant; the last variant is always reachable.
pub fn select_variant(variants: &[SequenceVariant]) -> Option<&SequenceVariant> {
    let total: i64 = variants.iter().map(|v| v.weight as i64).sum();
    if variants.is_empty() || total <= 0 {
        return variants.first();
    }
    let draw = rand::Rng::gen_range(&mut rand::thread_rng(), 0..total);
    select_variant_with_draw(variants, draw)
}

/// Deterministic variant of [`select_variant`] for previews and tests; the
/// caller supplies the raw draw, which is reduced modulo the total weight.
pub fn select_variant_with_draw(variants: &[SequenceVariant], raw_draw: i64) -> Option<&SequenceVariant> {
    if variants.is_empty() {
        return None;
    }
    let total: i64 = variants.iter().map(|v| v.weight as i64).sum();
    if total <= 0 {
        return variants.first();
    }
    let draw = raw_draw.rem_euclid(total);
    let mut acc = 0i64;
    for v in variants {
        acc += v.weight as i64;
        if draw < acc {
            return Some(v);
        }
    }
    variants.last()
}

/// `resetTest(n)` (spec §4.5): base = floor(100/n), remainder distributed
/// to the first variant. Weights sum to exactly 100 (P2).
pub fn reset_test_weights(n: usize) -> Vec<i32> {
    if n == 0 {
        return Vec::new();
    }
    let base = 100 / n as i32;
    let remainder = 100 - base * n as i32;
    let mut weights = vec![base; n];
    weights[0] += remainder;
    weights
}

/// Winner weights: 100 for the winner, 0 for everyone else, `is_winner`
/// true only on the winner (spec §4.5).
pub fn declare_winner_weights(n: usize, winner_index: usize) -> Vec<(i32, bool)> {
    (0..n).map(|i| (if i == winner_index { 100 } else { 0 }, i == winner_index)).collect()
}

/// Outcome of a progressive-shifting evaluation (spec §4.6).
#[derive(Debug, Clone, PartialEq)]
pub struct ShiftDecision {
    pub leader_index: usize,
    pub confidence: f64,
    /// New weight per variant, same order as the input slice.
    pub new_weights: Vec<i32>,
    pub declare_winner: bool,
}

/// Progressive A/B traffic shifting (spec §4.6). Guards: at least two
/// variants, every variant has `sent_count >= 50`, and no variant is
/// already a declared winner. Confidence is the *minimum* one-tailed
/// confidence across all leader-vs-other comparisons, so a leader only
/// gains weight when it is ahead of every other variant, not just the
/// weakest one.
pub fn compute_shift(variants: &[SequenceVariant], metric: PrimaryMetric) -> Option<ShiftDecision> {
    let n = variants.len();
    if n < 2 {
        return None;
    }
    if variants.iter().any(|v| v.is_winner) {
        return None;
    }
    if variants.iter().any(|v| v.sent_count < 50) {
        return None;
    }

    let rates: Vec<(f64, i64)> = variants.iter().map(|v| rate(v, metric)).collect();
    let leader_index = rates
        .iter()
        .enumerate()
        .max_by(|a, b| a.1 .0.partial_cmp(&b.1 .0).unwrap())
        .map(|(i, _)| i)?;
    let (leader_p, leader_n) = rates[leader_index];

    let mut min_confidence = 1.0f64;
    for (i, &(p, n_i)) in rates.iter().enumerate() {
        if i == leader_index {
            continue;
        }
        let z = two_proportion_z(leader_p, leader_n, p, n_i);
        min_confidence = min_confidence.min(normal_cdf_approx(z));
    }

    let leader_weight = if min_confidence >= 0.95 {
        100
    } else if min_confidence >= 0.90 {
        85
    } else if min_confidence >= 0.80 {
        75
    } else if min_confidence >= 0.70 {
        60
    } else {
        return None;
    };

    let loser_weight = (100 - leader_weight) / (n as i32 - 1);
    let mut new_weights = vec![loser_weight; n];
    new_weights[leader_index] = leader_weight;

    Some(ShiftDecision {
        leader_index,
        confidence: min_confidence,
        new_weights,
        declare_winner: leader_weight == 100,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn variant(weight: i32, sent: i32, opened: i32) -> SequenceVariant {
        SequenceVariant {
            id: Uuid::new_v4(),
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
    fn p2_reset_weights_sum_to_100_and_differ_by_at_most_1() {
        for n in 1..=11usize {
            let weights = reset_test_weights(n);
            assert_eq!(weights.iter().sum::<i32>(), 100);
            let min = *weights.iter().min().unwrap();
            let max = *weights.iter().max().unwrap();
            assert!(max - min <= 1, "n={} weights={:?}", n, weights);
        }
    }

    #[test]
    fn select_variant_respects_weight_windows() {
        let variants = vec![variant(30, 0, 0), variant(70, 0, 0)];
        // draws in [0,30) -> first, [30,100) -> second
        assert_eq!(select_variant_with_draw(&variants, 0).unwrap().weight, 30);
        assert_eq!(select_variant_with_draw(&variants, 29).unwrap().weight, 30);
        assert_eq!(select_variant_with_draw(&variants, 30).unwrap().weight, 70);
        assert_eq!(select_variant_with_draw(&variants, 99).unwrap().weight, 70);
    }

    #[test]
    fn select_variant_zero_total_weight_falls_back_to_first() {
        let variants = vec![variant(0, 0, 0), variant(0, 0, 0)];
        assert_eq!(select_variant_with_draw(&variants, 5).unwrap().weight, 0);
    }

    #[test]
    fn declare_winner_sets_100_and_0() {
        let weights = declare_winner_weights(3, 1);
        assert_eq!(weights, vec![(0, false), (100, true), (0, false)]);
    }

    #[test]
    fn guard_blocks_shift_below_sent_threshold() {
        let variants = vec![variant(50, 49, 30), variant(50, 100, 50)];
        assert!(compute_shift(&variants, PrimaryMetric::OpenRate).is_none());
    }

    #[test]
    fn guard_blocks_shift_when_winner_already_declared() {
        let mut variants = vec![variant(50, 100, 30), variant(50, 100, 50)];
        variants[1].is_winner = true;
        assert!(compute_shift(&variants, PrimaryMetric::OpenRate).is_none());
    }

    #[test]
    fn s5_traffic_shift_declares_winner() {
        // A: 100 sent, 30 opened. B: 100 sent, 50 opened.
        let variants = vec![variant(50, 100, 30), variant(50, 100, 50)];
        let decision = compute_shift(&variants, PrimaryMetric::OpenRate).unwrap();
        assert_eq!(decision.leader_index, 1);
        assert!(decision.confidence >= 0.95);
        assert!(decision.declare_winner);
        assert_eq!(decision.new_weights, vec![0, 100]);
    }

    #[test]
    fn p3_like_shift_thresholds_are_monotone_in_confidence() {
        // Bigger observed gap with the same sample size should never
        // produce a lower confidence threshold tier.
        let weak = vec![variant(50, 100, 48), variant(50, 100, 52)];
        let strong = vec![variant(50, 100, 20), variant(50, 100, 80)];
        let weak_conf = compute_shift(&weak, PrimaryMetric::OpenRate).map(|d| d.confidence).unwrap_or(0.0);
        let strong_conf = compute_shift(&strong, PrimaryMetric::OpenRate).map(|d| d.confidence).unwrap_or(0.0);
        assert!(strong_conf >= weak_conf);
    }
}
