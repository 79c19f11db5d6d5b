//!A universal, project-wide error wrapper that is also able to retain the nested cause of an [`Error`].

use thiserror::Error;

/// Message GitHub places in the `message` field of a response when the access token is rejected.
pub const BAD_CREDENTIALS_MESSAGE: &str = "Bad credentials";

// NOTE: the rendering of every recoverable variant is scanned for the substring "rate" in order to detect
// rate-limiting; keep the fixed parts of these messages free of it
#[derive(Error, Debug)]
pub enum GhQueryError {
    #[error("Bad credentials. Update the configured token and try again.")]
    BadCredentialsError,
    #[error("Error requesting GitHub. Errors:\n{errors}")]
    GraphQLQueryError { errors: String },
    #[error("Error requesting GitHub. Details:\n{body}")]
    MissingDataError { body: String },
    // :# prints causes as well using anyhow's default formatting of causes
    #[error("GitHub API error: {msg}; nested = {nested:#}")]
    GitHubAPIError {
        msg: String,
        #[source]
        nested: anyhow::Error,
    },
    #[error("GitHub API response body error: {msg}; nested = {nested:#}")]
    GitHubAPIResponseBodyError {
        msg: String,
        #[source]
        nested: anyhow::Error,
    },
    #[error("Unexpected response shape: {msg}")]
    ResponseShapeError { msg: String },
    #[error("Could not format node; nested = {nested:#}. Node:\n{node}")]
    NodeFormatError {
        node: String,
        #[source]
        nested: anyhow::Error,
    },
    #[error("Pagination stopped after reaching the ceiling of [{max_pages}] pages")]
    PageLimitExceededError { max_pages: u64 },
    #[error("Uneven number of items in key-value pairs. Got: {0}")]
    UnevenVariablesError(String),
    #[error("Missing required variable [{0}]")]
    MissingVariableError(String),
    #[error("Invalid date [{value}], expected YYYY-MM-DD; nested = {nested:#}")]
    InvalidDateError {
        value: String,
        #[source]
        nested: anyhow::Error,
    },
    #[error("Could not interpret [{0}] as a boolean")]
    InvalidBoolError(String),
    #[error("No query given; expected: QUERY [KEY VALUE]...")]
    MissingQueryPathError,
    #[error("Could not find query [{0}] on disk nor among the built-in queries")]
    QueryNotFoundError(String),
    #[error("Query-template rendering error: {msg}; nested = {nested:#}")]
    TemplateRenderError {
        msg: String,
        #[source]
        nested: anyhow::Error,
    },
    #[error("Could not write diagnostics file [{path}]; nested = {nested:#}")]
    DiagnosticsWriteError {
        path: String,
        #[source]
        nested: anyhow::Error,
    },
    #[error("Could not write CSV file [{path}]; nested = {nested:#}")]
    CsvWriteError {
        path: String,
        #[source]
        nested: anyhow::Error,
    },
    #[error("Could not read CSV file [{path}]; nested = {nested:#}")]
    CsvReadError {
        path: String,
        #[source]
        nested: anyhow::Error,
    },
    #[error("CSV file [{path}] has no [{column}] column")]
    MissingColumnError { path: String, column: String },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl GhQueryError {
    /// Whether the failed request is worth retrying within the executor's attempt budget.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            GhQueryError::GraphQLQueryError { .. }
                | GhQueryError::MissingDataError { .. }
                | GhQueryError::GitHubAPIError { .. }
                | GhQueryError::GitHubAPIResponseBodyError { .. }
        )
    }

    /// Whether the error must end the whole run immediately.
    pub fn is_fatal(&self) -> bool {
        matches!(self, GhQueryError::BadCredentialsError)
    }
}

#[macro_export]
/// Wraps a dynamic error type into an [`anyhow::Error`]. Useful in a plethora of cases for constructing
/// [`GhQueryError`]s.
macro_rules! nested {
    ($source:expr) => {
        anyhow::Error::new($source)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_request_level_failures_are_recoverable() {
        assert!(GhQueryError::GraphQLQueryError { errors: "boom".to_string() }.is_recoverable());
        assert!(GhQueryError::MissingDataError { body: "{}".to_string() }.is_recoverable());
        assert!(!GhQueryError::BadCredentialsError.is_recoverable());
        assert!(!GhQueryError::UnevenVariablesError("a".to_string()).is_recoverable());
        assert!(GhQueryError::BadCredentialsError.is_fatal());
    }

    #[test]
    fn fixed_message_parts_do_not_trigger_rate_limit_detection() {
        let errors = vec![
            GhQueryError::GraphQLQueryError { errors: String::new() },
            GhQueryError::MissingDataError { body: String::new() },
            GhQueryError::GitHubAPIError { msg: String::new(), nested: anyhow::anyhow!("") },
            GhQueryError::GitHubAPIResponseBodyError {
                msg: String::new(),
                nested: anyhow::anyhow!(""),
            },
        ];

        for e in errors {
            assert!(!e.to_string().contains("rate"), "[{}] mentions rate", e);
        }
    }
}
