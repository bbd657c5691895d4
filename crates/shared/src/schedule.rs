//! Cron-expression helpers for report schedules
//!
//! User-facing schedules are stored as classic 5-field cron expressions. The
//! `cron` crate (the engine underneath the worker's job scheduler) expects a
//! seconds field, so expressions are normalized before parsing.

use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use cron::Schedule;
use time::OffsetDateTime;

/// Prefix a 5-field expression with a zero seconds field; 6- and 7-field
/// expressions pass through untouched.
pub fn normalize_cron(expression: &str) -> String {
    let fields = expression.split_whitespace().count();
    if fields == 5 {
        format!("0 {}", expression.trim())
    } else {
        expression.trim().to_string()
    }
}

/// Check that an expression parses; returns the parse error message on failure.
pub fn validate_cron(expression: &str) -> Result<(), String> {
    Schedule::from_str(&normalize_cron(expression))
        .map(|_| ())
        .map_err(|e| e.to_string())
}

/// Next occurrence of `expression` strictly after `after`, in UTC.
///
/// Returns `None` for unparseable expressions and for schedules with no
/// further occurrence.
pub fn next_occurrence(expression: &str, after: OffsetDateTime) -> Option<OffsetDateTime> {
    let schedule = Schedule::from_str(&normalize_cron(expression)).ok()?;
    let after: DateTime<Utc> = Utc.timestamp_opt(after.unix_timestamp(), 0).single()?;
    let next = schedule.after(&after).next()?;
    OffsetDateTime::from_unix_timestamp(next.timestamp()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn five_field_expressions_gain_a_seconds_field() {
        assert_eq!(normalize_cron("*/5 * * * *"), "0 */5 * * * *");
        assert_eq!(normalize_cron("0 9 * * 1"), "0 0 9 * * 1");
    }

    #[test]
    fn six_field_expressions_pass_through() {
        assert_eq!(normalize_cron("0 30 8 * * *"), "0 30 8 * * *");
    }

    #[test]
    fn validate_accepts_classic_and_rejects_garbage() {
        assert!(validate_cron("*/15 * * * *").is_ok());
        assert!(validate_cron("0 9 * * 1-5").is_ok());
        assert!(validate_cron("not a cron").is_err());
        assert!(validate_cron("99 99 * * *").is_err());
    }

    #[test]
    fn next_occurrence_advances_to_the_following_match() {
        let after = datetime!(2024-03-01 09:00:00 UTC);
        let next = next_occurrence("0 9 * * *", after).unwrap();
        assert_eq!(next, datetime!(2024-03-02 09:00:00 UTC));
    }

    #[test]
    fn next_occurrence_is_strictly_after() {
        let after = datetime!(2024-03-01 08:59:59 UTC);
        let next = next_occurrence("0 9 * * *", after).unwrap();
        assert_eq!(next, datetime!(2024-03-01 09:00:00 UTC));
    }

    #[test]
    fn next_occurrence_handles_bad_expressions() {
        let after = datetime!(2024-03-01 09:00:00 UTC);
        assert!(next_occurrence("nope", after).is_none());
    }
}
