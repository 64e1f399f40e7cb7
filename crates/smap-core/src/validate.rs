//! Per-entry protocol checks.
//!
//! The validator never stops at the first problem: every violation of an
//! entry is reported so the manifest can list all of them at once.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};

use crate::error::ValidationError;
use crate::normalize::NormalizedUrl;
use crate::types::{ChangeFrequency, EntryMetadata, MAX_URL_LENGTH, RawEntry, UrlEntry};

/// Default tolerance, in seconds, for last-modified times slightly ahead of
/// the run clock.
pub const DEFAULT_CLOCK_SKEW_SECS: i64 = 300;

/// Checks entries against the sitemap protocol constraints.
#[derive(Debug, Clone, Copy)]
pub struct Validator {
    run_time: DateTime<Utc>,
    clock_skew: TimeDelta,
}

impl Validator {
    /// Create a validator for a run started at `run_time`.
    #[must_use]
    pub fn new(run_time: DateTime<Utc>) -> Self {
        Self {
            run_time,
            clock_skew: TimeDelta::seconds(DEFAULT_CLOCK_SKEW_SECS),
        }
    }

    /// Override the clock-skew tolerance.
    #[must_use]
    pub const fn with_clock_skew(mut self, clock_skew: TimeDelta) -> Self {
        self.clock_skew = clock_skew;
        self
    }

    /// The run time future timestamps are measured against.
    #[must_use]
    pub const fn run_time(&self) -> DateTime<Utc> {
        self.run_time
    }

    /// Latest acceptable last-modified time.
    #[must_use]
    pub fn latest_allowed(&self) -> DateTime<Utc> {
        self.run_time
            .checked_add_signed(self.clock_skew)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Check an already-typed entry.
    pub fn validate(&self, entry: &UrlEntry) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        Self::check_location(&entry.location, &mut errors);
        Self::check_priority(entry.metadata.priority, &mut errors);
        self.check_timestamp(entry.metadata.last_modified, &mut errors);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Check metadata on its own, as used for configured defaults: priority
    /// range and last-modified against the run time.
    pub fn validate_metadata(
        &self,
        metadata: &EntryMetadata,
    ) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        Self::check_priority(metadata.priority, &mut errors);
        self.check_timestamp(metadata.last_modified, &mut errors);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Parse the raw metadata of an entry and validate it in one pass.
    pub fn build(
        &self,
        location: NormalizedUrl,
        raw: &RawEntry,
    ) -> Result<UrlEntry, Vec<ValidationError>> {
        let mut errors = Vec::new();
        Self::check_location(&location, &mut errors);
        Self::check_priority(raw.priority, &mut errors);

        let change_frequency = raw.change_frequency.as_deref().and_then(|text| {
            text.parse::<ChangeFrequency>().map_or_else(
                |_| {
                    errors.push(ValidationError::InvalidFrequency {
                        value: text.to_string(),
                    });
                    None
                },
                Some,
            )
        });

        let last_modified = raw.last_modified.as_deref().and_then(|text| {
            parse_w3c_datetime(text).or_else(|| {
                errors.push(ValidationError::InvalidTimestamp {
                    value: text.to_string(),
                });
                None
            })
        });
        self.check_timestamp(last_modified, &mut errors);

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(UrlEntry {
            location,
            metadata: EntryMetadata {
                last_modified,
                change_frequency,
                priority: raw.priority,
            },
        })
    }

    fn check_location(location: &NormalizedUrl, errors: &mut Vec<ValidationError>) {
        let length = location.char_len();
        if length > MAX_URL_LENGTH {
            errors.push(ValidationError::UrlTooLong {
                length,
                limit: MAX_URL_LENGTH,
            });
        }
    }

    fn check_priority(priority: Option<f64>, errors: &mut Vec<ValidationError>) {
        if let Some(value) = priority {
            if !(0.0..=1.0).contains(&value) {
                errors.push(ValidationError::PriorityOutOfRange { value });
            }
        }
    }

    fn check_timestamp(&self, at: Option<DateTime<Utc>>, errors: &mut Vec<ValidationError>) {
        if let Some(value) = at {
            let limit = self.latest_allowed();
            if value > limit {
                errors.push(ValidationError::FutureTimestamp { value, limit });
            }
        }
    }
}

/// Parse a W3C datetime as allowed in `<lastmod>`.
///
/// Accepts `YYYY`, `YYYY-MM`, `YYYY-MM-DD`, and date-times with minutes,
/// seconds or fractional seconds followed by `Z` or a `±hh:mm` offset. Date
/// and time without an offset are read as UTC, the way many generators emit
/// them. Date-only values mean midnight UTC.
pub fn parse_w3c_datetime(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }

    // Minute precision: 2024-01-15T10:30Z or 2024-01-15T10:30+02:00
    let with_offset = text.strip_suffix('Z').map_or_else(
        || text.to_string(),
        |stripped| format!("{stripped}+00:00"),
    );
    if let Ok(dt) = DateTime::parse_from_str(&with_offset, "%Y-%m-%dT%H:%M%:z") {
        return Some(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }

    let date = match text.len() {
        10 => NaiveDate::parse_from_str(text, "%Y-%m-%d").ok(),
        7 => NaiveDate::parse_from_str(&format!("{text}-01"), "%Y-%m-%d").ok(),
        4 if text.bytes().all(|b| b.is_ascii_digit()) => {
            NaiveDate::parse_from_str(&format!("{text}-01-01"), "%Y-%m-%d").ok()
        },
        _ => None,
    }?;
    date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc())
}
