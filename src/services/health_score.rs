//! Inbox health score formula (spec §4.11). Pure module, recomputed on
//! demand and on engagement events.

/// Inputs needed to recompute a mailbox's health score. Deliberately flat
/// rather than borrowing `Inbox`/`WarmupState` so the formula stays a pure
/// function of primitives (spec §9 design note on modeling reads as
/// concrete structs).
#[derive(Debug, Clone, Copy)]
pub struct HealthInputs {
    pub warmup_enabled: bool,
    pub warmup_current_day: i32,
    pub sent_total: i64,
    pub replied_total: i64,
    pub bounced_total: i64,
    pub spam_complaints_total: i64,
}

/// Scaling constant for `volumeScore`, chosen so `log10(1 + sent_total) * K`
/// reaches the 25-point cap around a few thousand lifetime sends.
const VOLUME_SCORE_K: f64 = 8.0;

fn clamp(value: f64, lo: f64, hi: f64) -> f64 {
    value.max(lo).min(hi)
}

/// Spec §4.11 formula, verbatim. Returns an integer in `[0, 100]`.
pub fn compute_health_score(inputs: HealthInputs) -> i32 {
    let day_score = if inputs.warmup_enabled {
        (inputs.warmup_current_day as f64 * 40.0 / 30.0).min(40.0)
    } else {
        0.0
    };

    let engagement_bonus = if inputs.warmup_enabled && inputs.warmup_current_day > 7 { 10.0 } else { 0.0 };

    let sent_total = inputs.sent_total.max(0);
    let volume_score = ((1.0 + sent_total as f64).log10() * VOLUME_SCORE_K).min(25.0);

    let denom = sent_total.max(1) as f64;
    let reply_rate = inputs.replied_total as f64 / denom;
    let reply_score = (reply_rate * 50.0).min(25.0);

    let bounce_rate = inputs.bounced_total as f64 / denom;
    let bounce_penalty = (bounce_rate * 10.0).min(10.0);

    let spam_rate = inputs.spam_complaints_total as f64 / denom;
    let spam_penalty = (spam_rate * 40.0).min(20.0);

    let raw = day_score + engagement_bonus + volume_score + reply_score - bounce_penalty - spam_penalty;
    clamp(raw, 0.0, 100.0).round() as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> HealthInputs {
        HealthInputs {
            warmup_enabled: true,
            warmup_current_day: 10,
            sent_total: 100,
            replied_total: 5,
            bounced_total: 1,
            spam_complaints_total: 0,
        }
    }

    #[test]
    fn bounded_in_0_to_100() {
        let extreme_good = HealthInputs {
            warmup_enabled: true,
            warmup_current_day: 1000,
            sent_total: 1_000_000,
            replied_total: 900_000,
            bounced_total: 0,
            spam_complaints_total: 0,
        };
        assert!(compute_health_score(extreme_good) <= 100);

        let extreme_bad = HealthInputs {
            warmup_enabled: false,
            warmup_current_day: 0,
            sent_total: 1000,
            replied_total: 0,
            bounced_total: 1000,
            spam_complaints_total: 1000,
        };
        assert!(compute_health_score(extreme_bad) >= 0);
    }

    #[test]
    fn monotone_non_decreasing_in_current_day() {
        let mut prev = compute_health_score(HealthInputs { warmup_current_day: 1, ..base() });
        for day in 2..=35 {
            let score = compute_health_score(HealthInputs { warmup_current_day: day, ..base() });
            assert!(score >= prev, "day={} score={} prev={}", day, score, prev);
            prev = score;
        }
    }

    #[test]
    fn monotone_non_decreasing_in_reply_rate() {
        let low = compute_health_score(HealthInputs { replied_total: 1, ..base() });
        let high = compute_health_score(HealthInputs { replied_total: 50, ..base() });
        assert!(high >= low);
    }

    #[test]
    fn monotone_non_increasing_in_bounce_and_spam_rate() {
        let clean = compute_health_score(HealthInputs { bounced_total: 0, spam_complaints_total: 0, ..base() });
        let bouncy = compute_health_score(HealthInputs { bounced_total: 20, ..base() });
        let spammy = compute_health_score(HealthInputs { spam_complaints_total: 20, ..base() });
        assert!(clean >= bouncy);
        assert!(clean >= spammy);
    }

    #[test]
    fn no_warmup_means_zero_day_score_and_bonus() {
        let inputs = HealthInputs {
            warmup_enabled: false,
            warmup_current_day: 25,
            sent_total: 100,
            replied_total: 5,
            bounced_total: 0,
            spam_complaints_total: 0,
        };
        let with_warmup = HealthInputs { warmup_enabled: true, ..inputs };
        assert!(compute_health_score(with_warmup) >= compute_health_score(inputs));
    }
}
