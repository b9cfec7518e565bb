//! Time sources and the per-run reference instant.

use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use chrono_tz::Tz;

use crate::date::MARKER_FORMAT;
use crate::error::{DomainError, DomainResult};

/// Source of "now".
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Copy, Clone)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock frozen at a given instant (tests, replays).
#[derive(Debug, Copy, Clone)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Parse an IANA timezone name (e.g. `Europe/Berlin`).
pub fn parse_timezone(name: &str) -> DomainResult<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| DomainError::unknown_timezone(name))
}

/// The single instant a run is pinned to.
///
/// Captured once at run start; every group in the run classifies against the
/// same [`today`](RunInstant::today) even if the run crosses midnight.
#[derive(Debug, Copy, Clone)]
pub struct RunInstant {
    utc: DateTime<Utc>,
    local: DateTime<Tz>,
}

impl RunInstant {
    pub fn capture(clock: &dyn Clock, tz: Tz) -> Self {
        Self::at(clock.now(), tz)
    }

    pub fn at(utc: DateTime<Utc>, tz: Tz) -> Self {
        Self {
            utc,
            local: utc.with_timezone(&tz),
        }
    }

    pub fn utc(&self) -> DateTime<Utc> {
        self.utc
    }

    /// Calendar day in the pinned timezone.
    pub fn today(&self) -> NaiveDate {
        self.local.date_naive()
    }

    pub fn is_weekend(&self) -> bool {
        matches!(self.local.weekday(), Weekday::Sat | Weekday::Sun)
    }

    /// Write-back value marking a record as handled by this run.
    pub fn marker(&self) -> String {
        self.local.format(MARKER_FORMAT).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn today_follows_the_pinned_timezone() {
        // 2026-10-19 02:30 UTC is still Sunday evening in New York.
        let utc = Utc.with_ymd_and_hms(2026, 10, 19, 2, 30, 0).unwrap();
        let ny = RunInstant::at(utc, parse_timezone("America/New_York").unwrap());
        let utc_run = RunInstant::at(utc, Tz::UTC);

        assert_eq!(ny.today(), NaiveDate::from_ymd_opt(2026, 10, 18).unwrap());
        assert!(ny.is_weekend());
        assert_eq!(utc_run.today(), NaiveDate::from_ymd_opt(2026, 10, 19).unwrap());
        assert!(!utc_run.is_weekend());
    }

    #[test]
    fn marker_uses_local_wall_time() {
        let utc = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
        let run = RunInstant::at(utc, parse_timezone("Europe/Berlin").unwrap());
        assert_eq!(run.marker(), "2026-10-19 14:00:00");
    }

    #[test]
    fn unknown_timezone_is_rejected() {
        assert_eq!(
            parse_timezone("Mars/Olympus"),
            Err(DomainError::UnknownTimezone("Mars/Olympus".to_string()))
        );
    }

    #[test]
    fn fixed_clock_is_frozen() {
        let at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let clock = FixedClock(at);
        assert_eq!(RunInstant::capture(&clock, Tz::UTC).utc(), at);
    }
}
