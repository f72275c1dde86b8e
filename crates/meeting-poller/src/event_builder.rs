//! Turns an untrusted meeting candidate into a dispatch-ready event.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use shared_types::MeetingCandidate;

use crate::error::{Error, Result};

/// Fully validated event: both endpoints present, in the configured zone
#[derive(Debug, Clone, PartialEq)]
pub struct SanitizedEvent {
    pub summary: String,
    pub location: String,
    pub description: String,
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
}

impl SanitizedEvent {
    /// IANA identifier sent alongside both endpoints
    pub fn time_zone(&self) -> &'static str {
        self.start.timezone().name()
    }
}

/// A timestamp as the model wrote it, with or without an explicit offset
#[derive(Debug, Clone, Copy, PartialEq)]
enum ParsedStamp {
    Offset(DateTime<FixedOffset>),
    Naive(NaiveDateTime),
}

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M%z",
    "%Y-%m-%d %H:%M%z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y"];

impl ParsedStamp {
    /// Accepts RFC 3339, RFC 2822 and common ISO-like layouts; a bare date
    /// means midnight.
    fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }

        if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
            return Some(ParsedStamp::Offset(dt));
        }
        if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
            return Some(ParsedStamp::Offset(dt));
        }
        for format in OFFSET_FORMATS {
            if let Ok(dt) = DateTime::parse_from_str(value, format) {
                return Some(ParsedStamp::Offset(dt));
            }
        }
        for format in NAIVE_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
                return Some(ParsedStamp::Naive(naive));
            }
        }
        for format in DATE_FORMATS {
            if let Ok(date) = NaiveDate::parse_from_str(value, format) {
                return date.and_hms_opt(0, 0, 0).map(ParsedStamp::Naive);
            }
        }
        None
    }

    fn year(&self) -> i32 {
        match self {
            ParsedStamp::Offset(dt) => dt.year(),
            ParsedStamp::Naive(naive) => naive.year(),
        }
    }

    /// Same wall-clock month, day and time in another year
    fn with_year(self, year: i32) -> Option<Self> {
        match self {
            ParsedStamp::Offset(dt) => dt.with_year(year).map(ParsedStamp::Offset),
            ParsedStamp::Naive(naive) => naive.with_year(year).map(ParsedStamp::Naive),
        }
    }

    /// Offsets from the model are kept as instants; naive times are read as
    /// local times in `tz`. An ambiguous time takes the earlier instant and a
    /// time skipped by a forward transition is read with the pre-gap offset.
    fn in_zone(self, tz: Tz) -> Option<DateTime<Tz>> {
        match self {
            ParsedStamp::Offset(dt) => Some(dt.with_timezone(&tz)),
            ParsedStamp::Naive(naive) => tz
                .from_local_datetime(&naive)
                .earliest()
                .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest()),
        }
    }
}

pub struct EventBuilder {
    timezone: Tz,
    plausible_year_floor: Option<i32>,
}

impl EventBuilder {
    pub fn new(timezone: Tz, plausible_year_floor: Option<i32>) -> Self {
        Self {
            timezone,
            plausible_year_floor,
        }
    }

    /// Build the event using today's year in the configured zone
    pub fn build(&self, candidate: &MeetingCandidate) -> Result<SanitizedEvent> {
        let current_year = Utc::now().with_timezone(&self.timezone).year();
        self.build_for_year(candidate, current_year)
    }

    pub(crate) fn build_for_year(
        &self,
        candidate: &MeetingCandidate,
        current_year: i32,
    ) -> Result<SanitizedEvent> {
        let floor = self.plausible_year_floor.unwrap_or(current_year);

        let start = self
            .resolve(&candidate.start, floor, current_year)
            .ok_or_else(|| Error::date_parse("start", candidate.start.as_str()))?;

        let default_end = start + Duration::hours(1);
        let end = match candidate.end_value() {
            None => default_end,
            Some(raw_end) => match self.resolve(raw_end, floor, current_year) {
                Some(end) if end >= start => end,
                Some(end) => {
                    tracing::warn!(
                        "End {} is before start {}, using one hour after start",
                        end,
                        start
                    );
                    default_end
                }
                None => {
                    tracing::warn!(
                        "Could not parse end timestamp {:?}, using one hour after start",
                        raw_end
                    );
                    default_end
                }
            },
        };

        Ok(SanitizedEvent {
            summary: candidate.title.clone(),
            location: candidate.location.clone().unwrap_or_default(),
            description: candidate.description.clone().unwrap_or_default(),
            start,
            end,
        })
    }

    fn resolve(&self, value: &str, floor: i32, current_year: i32) -> Option<DateTime<Tz>> {
        let mut stamp = ParsedStamp::parse(value)?;

        if stamp.year() < floor {
            tracing::debug!(
                "Coercing implausible year {} to {} in {:?}",
                stamp.year(),
                current_year,
                value
            );
            stamp = stamp.with_year(current_year)?;
        }

        stamp.in_zone(self.timezone)
    }
}
