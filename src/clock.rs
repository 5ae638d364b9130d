//! Injected wall-clock and logical-day computation.
//!
//! Both the navigator callers and the routing resolver depend on "now" and
//! on the user's timezone. Time access goes through the `Clock` trait so
//! resolution is testable with fixed instants.

use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc};
use chrono_tz::Tz;
use tracing::warn;

/// Local hours below this count toward the previous calendar day.
pub const NIGHT_OWL_END_HOUR: u32 = 3;

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;
}

/// Real wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fixed instant, for tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

/// The user's current position in their day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalDay {
    /// Logical date — the calendar date after the night-owl shift.
    pub date: NaiveDate,
    /// Local wall-clock time of day.
    pub time: NaiveTime,
    /// Whether the night-owl shift applied (local hour < 3).
    pub night_owl: bool,
}

impl LocalDay {
    /// Logical date formatted as `YYYY-MM-DD`.
    pub fn date_string(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }
}

/// Parse an IANA timezone identifier, falling back to UTC.
///
/// A bad stored timezone must never break routing, so this logs and
/// degrades instead of erroring.
pub fn parse_timezone(id: &str) -> Tz {
    id.parse().unwrap_or_else(|_| {
        warn!(timezone = id, "Unrecognized IANA timezone, falling back to UTC");
        Tz::UTC
    })
}

/// Compute the user's logical day from an instant and their timezone.
///
/// Hours 00:00–02:59 local are attributed to the previous calendar day
/// ("night owl mode"); everything else to the local calendar date.
pub fn local_day(now: DateTime<Utc>, tz: Tz) -> LocalDay {
    let local = now.with_timezone(&tz);
    let night_owl = local.hour() < NIGHT_OWL_END_HOUR;
    let date = if night_owl {
        local.date_naive().pred_opt().unwrap_or_else(|| local.date_naive())
    } else {
        local.date_naive()
    };
    LocalDay {
        date,
        time: local.time(),
        night_owl,
    }
}

/// Date portion of a UTC timestamp in the given timezone.
///
/// Used for the "onboarding completion day" comparison; deliberately does
/// NOT apply the night-owl shift (the stored timestamp is a fact, not a
/// session).
pub fn local_date_of(instant: DateTime<Utc>, tz: Tz) -> NaiveDate {
    instant.with_timezone(&tz).date_naive()
}
