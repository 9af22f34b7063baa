//! Warmup quota ramp table and dedup key scheme (spec §4.7). Pure module.

use crate::models::inbox::RampSpeed;

/// Base daily quota for `current_day`, before the ramp-speed multiplier
/// (spec §4.7 ramp table).
fn base_quota(current_day: i32) -> i32 {
    match current_day {
        d if d <= 2 => 2,
        d if d <= 4 => 4,
        d if d <= 7 => 8,
        d if d <= 10 => 12,
        d if d <= 14 => 18,
        d if d <= 21 => 25,
        d if d <= 30 => 35,
        _ => 40,
    }
}

/// Daily warmup quota for a mailbox: `base(current_day) * speed.multiplier()`,
/// floored. `current_day` below 1 is clamped to 1 (quota > 0 for day >= 1,
/// spec §4.7 invariant).
pub fn quota(current_day: i32, speed: RampSpeed) -> i32 {
    let day = current_day.max(1);
    ((base_quota(day) as f64) * speed.multiplier()).floor() as i32
}

/// Warmup send types, used in the dedup key scheme (spec §4.7, §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarmupMessageType {
    Main,
    Reply,
    Continuation,
    Closer,
}

impl WarmupMessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarmupMessageType::Main => "main",
            WarmupMessageType::Reply => "reply",
            WarmupMessageType::Continuation => "continuation",
            WarmupMessageType::Closer => "closer",
        }
    }
}

/// TTL for a warmup dedup key (spec §4.7: "7 days").
pub const DEDUP_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;

/// Builds the dedup key `warmup:dedup:<fromId>:<toId>:<type>` (spec §4.7).
pub fn dedup_key(from_inbox: uuid::Uuid, to_inbox: uuid::Uuid, message_type: WarmupMessageType) -> String {
    format!("warmup:dedup:{}:{}:{}", from_inbox, to_inbox, message_type.as_str())
}

/// Template pool sizes (spec §4.7: "205 templates total").
pub const MAIN_TEMPLATE_COUNT: usize = 105;
pub const REPLY_TEMPLATE_COUNT: usize = 50;
pub const CONTINUATION_TEMPLATE_COUNT: usize = 30;
pub const CLOSER_TEMPLATE_COUNT: usize = 20;

pub fn template_pool_size(message_type: WarmupMessageType) -> usize {
    match message_type {
        WarmupMessageType::Main => MAIN_TEMPLATE_COUNT,
        WarmupMessageType::Reply => REPLY_TEMPLATE_COUNT,
        WarmupMessageType::Continuation => CONTINUATION_TEMPLATE_COUNT,
        WarmupMessageType::Closer => CLOSER_TEMPLATE_COUNT,
    }
}

/// Fisher-Yates shuffle over `0..len`, using the supplied RNG so callers
/// can inject a seeded generator for tests/previews (spec §9).
pub fn fisher_yates_shuffle<R: rand::Rng + ?Sized>(len: usize, rng: &mut R) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..len).collect();
    for i in (1..indices.len()).rev() {
        let j = rng.gen_range(0..=i);
        indices.swap(i, j);
    }
    indices
}

/// Thread-depth selection: a 50/50 coin flip picks single-reply vs.
/// multi-level; multi-level picks a max depth uniformly from `{2,3,4,5}`
/// (spec §4.7).
pub fn choose_max_thread_depth<R: rand::Rng + ?Sized>(rng: &mut R) -> u32 {
    if rng.gen_bool(0.5) {
        1
    } else {
        rng.gen_range(2..=5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn p3_quota_monotone_in_day() {
        for speed in [RampSpeed::Slow, RampSpeed::Normal, RampSpeed::Fast] {
            let mut prev = quota(1, speed);
            for day in 2..=60 {
                let q = quota(day, speed);
                assert!(q >= prev, "day={} speed={:?} q={} prev={}", day, speed, q, prev);
                prev = q;
            }
        }
    }

    #[test]
    fn p3_quota_monotone_across_speeds() {
        for day in 1..=60 {
            let slow = quota(day, RampSpeed::Slow);
            let normal = quota(day, RampSpeed::Normal);
            let fast = quota(day, RampSpeed::Fast);
            assert!(slow <= normal && normal <= fast, "day={} slow={} normal={} fast={}", day, slow, normal, fast);
        }
    }

    #[test]
    fn quota_positive_from_day_one() {
        for speed in [RampSpeed::Slow, RampSpeed::Normal, RampSpeed::Fast] {
            assert!(quota(1, speed) > 0);
            assert!(quota(0, speed) > 0); // clamped to day 1
        }
    }

    #[test]
    fn quota_table_breakpoints() {
        assert_eq!(quota(2, RampSpeed::Normal), 2);
        assert_eq!(quota(3, RampSpeed::Normal), 4);
        assert_eq!(quota(7, RampSpeed::Normal), 8);
        assert_eq!(quota(10, RampSpeed::Normal), 12);
        assert_eq!(quota(14, RampSpeed::Normal), 18);
        assert_eq!(quota(21, RampSpeed::Normal), 25);
        assert_eq!(quota(30, RampSpeed::Normal), 35);
        assert_eq!(quota(31, RampSpeed::Normal), 40);
        assert_eq!(quota(1, RampSpeed::Slow), 1); // floor(2 * 0.7) = 1
        assert_eq!(quota(1, RampSpeed::Fast), 3); // floor(2 * 1.5) = 3
    }

    #[test]
    fn p4_dedup_key_shape_is_stable() {
        let from = uuid::Uuid::new_v4();
        let to = uuid::Uuid::new_v4();
        let key = dedup_key(from, to, WarmupMessageType::Reply);
        assert_eq!(key, format!("warmup:dedup:{}:{}:reply", from, to));
    }

    #[test]
    fn fisher_yates_is_a_permutation() {
        let mut rng = rand::thread_rng();
        let shuffled = fisher_yates_shuffle(10, &mut rng);
        let mut sorted = shuffled.clone();
        sorted.sort();
        assert_eq!(sorted, (0..10).collect::<Vec<_>>());
    }
}
