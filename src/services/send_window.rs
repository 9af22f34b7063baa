//! Send-window evaluation (spec §4.3). Given a timestamp, a team timezone,
//! and either a legacy window or a per-day schedule map, decide whether
//! sending is permitted right now. Pure — no I/O, no suspension points.

use chrono::{DateTime, Datelike, Timelike, Utc};
use chrono_tz::Tz;
use std::collections::HashMap;

/// Half-open hour interval `[start, end)`, hours in `0..24`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HourInterval {
    pub start: u32,
    pub end: u32,
}

impl HourInterval {
    pub fn contains(&self, hour: u32) -> bool {
        hour >= self.start && hour < self.end
    }
}

/// Legacy `(start, end, days)` tuple, used only when `schedule` is absent
/// (spec §6).
#[derive(Debug, Clone)]
pub struct LegacyWindow {
    pub start_hour: u32,
    pub end_hour: u32,
    pub send_days: Vec<String>,
}

fn day_key(weekday: chrono::Weekday) -> &'static str {
    use chrono::Weekday::*;
    match weekday {
        Mon => "mon",
        Tue => "tue",
        Wed => "wed",
        Thu => "thu",
        Fri => "fri",
        Sat => "sat",
        Sun => "sun",
    }
}

/// Decide "may send now" per spec §4.3. `schedule: None` means "no
/// schedule configured", falling back to the legacy window; `schedule:
/// Some(map)` is authoritative, including when `map` is empty — `{}` must
/// block every send regardless of `legacy` (spec §6, P9). A present map
/// with no entry for today's key, or an entry with an empty interval
/// list, likewise blocks sending for the day.
pub fn may_send_now(
    now: DateTime<Utc>,
    timezone: Tz,
    schedule: Option<&HashMap<String, Vec<HourInterval>>>,
    legacy: &LegacyWindow,
) -> bool {
    let local = now.with_timezone(&timezone);
    let key = day_key(local.weekday());
    let hour = local.hour();

    if let Some(schedule) = schedule {
        return match schedule.get(key) {
            Some(intervals) => intervals.iter().any(|iv| iv.contains(hour)),
            None => false,
        };
    }

    if !legacy.send_days.iter().any(|d| d == key) {
        return false;
    }
    if legacy.start_hour <= legacy.end_hour {
        hour >= legacy.start_hour && hour < legacy.end_hour
    } else {
        // wraps past midnight
        hour >= legacy.start_hour || hour < legacy.end_hour
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ny() -> Tz {
        "America/New_York".parse().unwrap()
    }

    #[test]
    fn p9_empty_schedule_object_blocks_every_send() {
        // schedule present as {} -> never send, regardless of a wide-open legacy window
        let schedule: HashMap<String, Vec<HourInterval>> = HashMap::new();
        let legacy = LegacyWindow {
            start_hour: 0,
            end_hour: 24,
            send_days: vec!["mon".into(), "tue".into(), "wed".into(), "thu".into(), "fri".into(), "sat".into(), "sun".into()],
        };
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 15, 0, 0).unwrap();
        assert!(!may_send_now(now, ny(), Some(&schedule), &legacy));
    }

    #[test]
    fn schedule_present_but_missing_todays_key_blocks() {
        // schedule present but doesn't cover Monday -> no send, regardless of legacy window
        let mut schedule = HashMap::new();
        schedule.insert("tue".to_string(), vec![HourInterval { start: 0, end: 24 }]);
        let legacy = LegacyWindow {
            start_hour: 0,
            end_hour: 24,
            send_days: vec!["mon".into()],
        };
        // 2024-01-01 is a Monday
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 15, 0, 0).unwrap();
        assert!(!may_send_now(now, ny(), Some(&schedule), &legacy));
    }

    #[test]
    fn schedule_empty_interval_list_for_today_blocks_sending() {
        let mut schedule = HashMap::new();
        schedule.insert("mon".to_string(), vec![]);
        let legacy = LegacyWindow {
            start_hour: 0,
            end_hour: 24,
            send_days: vec!["mon".into()],
        };
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 15, 0, 0).unwrap();
        assert!(!may_send_now(now, ny(), Some(&schedule), &legacy));
    }

    #[test]
    fn schedule_takes_precedence_over_legacy() {
        let mut schedule = HashMap::new();
        schedule.insert("mon".to_string(), vec![HourInterval { start: 9, end: 17 }]);
        let legacy = LegacyWindow {
            start_hour: 0,
            end_hour: 1, // legacy would reject at 10am
            send_days: vec!["mon".into()],
        };
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 14, 30, 0).unwrap(); // 9:30am EST
        assert!(may_send_now(now, ny(), Some(&schedule), &legacy));
    }

    #[test]
    fn legacy_window_used_when_no_schedule() {
        let legacy = LegacyWindow {
            start_hour: 9,
            end_hour: 17,
            send_days: vec!["mon".into(), "tue".into(), "wed".into(), "thu".into(), "fri".into()],
        };
        let inside = Utc.with_ymd_and_hms(2024, 1, 1, 14, 30, 0).unwrap(); // 9:30am EST Monday
        assert!(may_send_now(inside, ny(), None, &legacy));

        let outside = Utc.with_ymd_and_hms(2024, 1, 1, 2, 0, 0).unwrap(); // 9pm EST Sunday
        assert!(!may_send_now(outside, ny(), None, &legacy));
    }

    #[test]
    fn legacy_day_not_in_send_days_blocks() {
        let legacy = LegacyWindow {
            start_hour: 0,
            end_hour: 24,
            send_days: vec!["mon".into()],
        };
        // Saturday
        let now = Utc.with_ymd_and_hms(2024, 1, 6, 15, 0, 0).unwrap();
        assert!(!may_send_now(now, ny(), None, &legacy));
    }
}
