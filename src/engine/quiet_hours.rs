//! Quiet-hours handling: whether a notification may go out now, and when to
//! send it otherwise.

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::models::{Severity, User};

/// Stateless quiet-hours policy evaluated in the user's time zone.
pub struct QuietHoursManager;

impl QuietHoursManager {
    /// Whether `at` falls inside the user's quiet hours. Users without quiet
    /// hours enabled (or without a configured window) are never quiet.
    pub fn is_quiet_hours(user: &User, at: DateTime<Utc>) -> bool {
        if !user.quiet_hours_enabled {
            return false;
        }
        let (start, end) = match (user.quiet_hours_start, user.quiet_hours_end) {
            (Some(start), Some(end)) => (start, end),
            _ => return false,
        };

        let tz = user_timezone(user);
        let local_time = at.with_timezone(&tz).time();

        let in_quiet = if start < end {
            // Same-day window, e.g. 09:00 - 17:00.
            start <= local_time && local_time < end
        } else {
            // Window wraps midnight, e.g. 22:00 - 06:00.
            local_time >= start || local_time < end
        };

        if in_quiet {
            tracing::debug!(
                user_id = user.id,
                time = %local_time,
                start = %start,
                end = %end,
                "User is in quiet hours."
            );
        }
        in_quiet
    }

    /// Whether a notification of the given severity may be delivered at `at`.
    /// CRITICAL always sends; HIGH sends when the user allows the override.
    pub fn should_send_now(user: &User, severity: Severity, at: DateTime<Utc>) -> bool {
        if severity == Severity::Critical {
            return true;
        }
        if severity == Severity::High && user.quiet_hours_override_high {
            return true;
        }
        if Self::is_quiet_hours(user, at) {
            tracing::info!(
                user_id = user.id,
                severity = %severity,
                "Delaying notification due to quiet hours."
            );
            return false;
        }
        true
    }

    /// The earliest time at or after `from` when a delayed notification may
    /// go out: `from` itself outside quiet hours, otherwise the end of the
    /// current quiet window in the user's zone.
    pub fn next_send_time(user: &User, from: DateTime<Utc>) -> DateTime<Utc> {
        if !Self::is_quiet_hours(user, from) {
            return from;
        }

        let end = match user.quiet_hours_end {
            Some(end) => end,
            None => return from,
        };

        let tz = user_timezone(user);
        let local_from = from.with_timezone(&tz);
        let candidate = resolve_local(&tz, local_from.date_naive().and_time(end));
        let next_send =
            if candidate <= from { candidate + Duration::days(1) } else { candidate };

        tracing::debug!(user_id = user.id, next_send = %next_send, "Computed next send time.");
        next_send
    }
}

fn user_timezone(user: &User) -> Tz {
    user.quiet_hours_timezone.parse().unwrap_or_else(|_| {
        tracing::warn!(
            timezone = %user.quiet_hours_timezone,
            "Invalid timezone, defaulting to UTC."
        );
        Tz::UTC
    })
}

/// Resolves a local wall-clock time to UTC, taking the earliest mapping when
/// the time is ambiguous or skipped by a DST transition.
fn resolve_local(tz: &Tz, naive: chrono::NaiveDateTime) -> DateTime<Utc> {
    match tz.from_local_datetime(&naive) {
        chrono::LocalResult::Single(dt) | chrono::LocalResult::Ambiguous(dt, _) => {
            dt.with_timezone(&Utc)
        }
        chrono::LocalResult::None => {
            // The wall-clock time does not exist; nudge forward an hour.
            tz.from_local_datetime(&(naive + Duration::hours(1)))
                .earliest()
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(Utc::now)
        }
    }
}

/// Parses a `HH:MM` string, used by configuration and API handlers.
pub fn parse_quiet_time(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M").ok()
}
