//! Calendar-date helpers for GitHub's `GitTimestamp` values.

use chrono::NaiveDate;
use log::trace;

use crate::ghgql_error::GhQueryError;
use crate::nested;

const DATE_FORMAT: &str = "%Y-%m-%d";
const GIT_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Converts a `YYYY-MM-DD` string into the (midnight) timestamp format GitHub's GraphQL API expects for
/// `GitTimestamp` arguments, ie: `2021-03-01` -> `2021-03-01T00:00:00`.
pub fn as_git_timestamp(date_str: &str) -> Result<String, GhQueryError> {
    let midnight = parse_date(date_str)?.and_hms_opt(0, 0, 0).ok_or_else(|| GhQueryError::InvalidDateError {
        value: date_str.to_string(),
        nested: anyhow::anyhow!("no midnight on this date"),
    })?;

    Ok(midnight.format(GIT_TIMESTAMP_FORMAT).to_string())
}

/// Reads the calendar date at the start of a `YYYY-MM-DD...` string (typically a full timestamp).
pub fn as_date(datetime_str: &str) -> Result<NaiveDate, GhQueryError> {
    let date_str = datetime_str.get(..10).unwrap_or(datetime_str);

    parse_date(date_str)
}

fn parse_date(date_str: &str) -> Result<NaiveDate, GhQueryError> {
    NaiveDate::parse_from_str(date_str, DATE_FORMAT).map_err(|e| {
        trace!("Error = {:?}", e);
        GhQueryError::InvalidDateError {
            value: date_str.to_string(),
            nested: nested!(e),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn git_timestamp_is_midnight_of_the_given_day() {
        assert_eq!(as_git_timestamp("2021-03-01").unwrap(), "2021-03-01T00:00:00");
    }

    #[test]
    fn malformed_dates_are_rejected() {
        assert!(matches!(as_git_timestamp("01/03/2021"), Err(GhQueryError::InvalidDateError { .. })));
        assert!(matches!(as_git_timestamp("2021-02-30"), Err(GhQueryError::InvalidDateError { .. })));
    }

    #[test]
    fn date_is_read_from_the_start_of_a_timestamp() {
        let christmas_eve = NaiveDate::from_ymd_opt(2020, 12, 24).unwrap();

        assert_eq!(as_date("2020-12-24T18:30:00Z").unwrap(), christmas_eve);
        assert_eq!(as_date("2020-12-24").unwrap(), christmas_eve);
    }
}
