//! Next fire time for an automation.

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::warn;

use reel_models::{FireTime, Frequency};

/// Calendar days searched, today included.
pub const LOOKAHEAD_DAYS: i64 = 8;

/// Longest DST gap we step across when a local time does not exist.
const MAX_GAP_MINUTES: i64 = 180;

/// Earliest configured local time that is strictly after `now` and at least
/// `frequency.min_gap()` after `last_run_at`.
///
/// Local times that fall in a DST gap move to the first valid minute after
/// it; ambiguous local times take the earlier instant. An unknown timezone
/// is treated as UTC. When nothing qualifies within [`LOOKAHEAD_DAYS`] the
/// result is `now + 24h`.
pub fn compute_next_fire_time(
    fire_times: &[FireTime],
    timezone: &str,
    frequency: Frequency,
    last_run_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    let tz = parse_timezone(timezone);
    let not_before = last_run_at.map(|last| last + frequency.min_gap());

    let mut times = fire_times.to_vec();
    times.sort();

    let today = now.with_timezone(&tz).date_naive();
    for offset in 0..LOOKAHEAD_DAYS {
        let date = today + Duration::days(offset);
        for time in &times {
            let Some(candidate) = resolve_local(&tz, date.and_time(time.to_naive_time())) else {
                continue;
            };
            if candidate <= now {
                continue;
            }
            if not_before.is_some_and(|earliest| candidate < earliest) {
                continue;
            }
            return candidate;
        }
    }

    now + Duration::hours(24)
}

fn parse_timezone(timezone: &str) -> Tz {
    timezone.parse::<Tz>().unwrap_or_else(|_| {
        warn!(timezone, "Unknown timezone, falling back to UTC");
        Tz::UTC
    })
}

fn resolve_local(tz: &Tz, local: NaiveDateTime) -> Option<DateTime<Utc>> {
    (0..=MAX_GAP_MINUTES).find_map(|minutes| {
        tz.from_local_datetime(&(local + Duration::minutes(minutes)))
            .earliest()
            .map(|t| t.with_timezone(&Utc))
    })
}
