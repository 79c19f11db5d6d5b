//! Conversion of flat `key value key value ...` command-line pairs into query variables.

use itertools::Itertools;
use serde_json::Value;

use crate::dates;
use crate::ghgql_error::GhQueryError;
use crate::github::json::payload::Variables;

/// Friendly name for the start date; it is sent to the API as `since`.
const START_KEY: &str = "start";
const SINCE_KEY: &str = "since";
const IS_FORK_KEY: &str = "isFork";

/// Splits command-line arguments into the query path (first item) and its variables (the rest).
pub fn process_args(args: &[String]) -> Result<(String, Variables), GhQueryError> {
    match args.split_first() {
        Some((path, pairs)) => Ok((path.clone(), process_variables(pairs)?)),
        None => Err(GhQueryError::MissingQueryPathError),
    }
}

/// Builds query variables out of alternating keys & values. Any key is accepted; two get special treatment:
/// - `start` (a `YYYY-MM-DD` date) is replaced by `since`, holding the matching `GitTimestamp`.
/// - `isFork` is turned into a boolean.
///
/// Empty values for either of them are dropped. A later occurrence of a key overrides an earlier one.
pub fn process_variables(args: &[String]) -> Result<Variables, GhQueryError> {
    if args.len() % 2 != 0 {
        return Err(GhQueryError::UnevenVariablesError(args.join(" ")));
    }

    let mut variables: Variables = args
        .iter()
        .tuples()
        .map(|(key, value)| (key.clone(), Value::String(value.clone())))
        .collect();

    if let Some(start) = variables.remove(START_KEY) {
        let start = start.as_str().unwrap_or_default();
        if !start.is_empty() {
            variables.insert(SINCE_KEY.to_string(), Value::String(dates::as_git_timestamp(start)?));
        }
    }

    if let Some(is_fork) = variables.remove(IS_FORK_KEY) {
        let is_fork = is_fork.as_str().unwrap_or_default();
        if !is_fork.is_empty() {
            variables.insert(IS_FORK_KEY.to_string(), Value::Bool(parse_bool(is_fork)?));
        }
    }

    Ok(variables)
}

/// Interprets the usual spellings of a yes/no value, ignoring case.
pub fn parse_bool(value: &str) -> Result<bool, GhQueryError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" => Ok(true),
        "false" | "f" | "no" | "n" | "0" => Ok(false),
        _ => Err(GhQueryError::InvalidBoolError(value.to_string())),
    }
}
