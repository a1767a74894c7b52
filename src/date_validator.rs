use crate::error::{CrawlError, Result};
use regex::Regex;
use std::sync::LazyLock;

pub const UNSET: &str = "none";
pub const EXPECTED_FORMAT: &str = "YYYY-MM-DD";

// Month 01-12, day 01-31. Day validity against the month is not checked.
static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]{4}-(0[1-9]|1[0-2])-(0[1-9]|[12][0-9]|3[01])$").expect("date pattern compiles")
});

/// Returns true when `date` looks like `YYYY-MM-DD`.
///
/// The year `0000` is rejected. `2023-02-31` is accepted: the month/day
/// combination is not checked against a calendar. The sentinel
/// [`UNSET`] never validates.
pub fn validate(date: &str) -> bool {
    DATE_RE.is_match(date) && !date.starts_with("0000")
}

pub fn check(date: &str) -> Result<()> {
    if validate(date) {
        Ok(())
    } else {
        Err(CrawlError::WrongDateString {
            value: date.to_string(),
            expected: EXPECTED_FORMAT,
        })
    }
}
