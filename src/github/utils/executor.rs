//! Response validation & bounded retries on top of a [`Transport`].

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, info, warn};
#[cfg(test)]
use mockall::automock;
use serde_json::Value;

use crate::ghgql_error::{GhQueryError, BAD_CREDENTIALS_MESSAGE};
use crate::github::client::transport::Transport;
use crate::github::json::payload::{QueryPayload, Variables};
use crate::github::json::response::{prettify, GraphQLResponse};
use crate::github::utils::diagnostics::DiagnosticsSink;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

/// How many times a request is attempted, and how long to wait in between. The wait is constant (no
/// exponential growth, no jitter).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

/// Blocks the (single) flow of control for the backoff interval.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await
    }
}

/// Sends queries through a [`Transport`] and classifies every response as success, recoverable error
/// (retried) or fatal error (surfaced immediately).
pub struct RequestExecutor {
    transport: Box<dyn Transport>,
    diagnostics: Box<dyn DiagnosticsSink>,
    sleeper: Box<dyn Sleeper>,
    policy: RetryPolicy,
}

impl RequestExecutor {
    pub fn new(transport: Box<dyn Transport>, diagnostics: Box<dyn DiagnosticsSink>) -> Self {
        RequestExecutor {
            transport,
            diagnostics,
            sleeper: Box::new(TokioSleeper),
            policy: RetryPolicy::default(),
        }
    }

    #[cfg(test)]
    pub fn with_sleeper(mut self, sleeper: Box<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Runs `query` with `variables` and returns the response's `data` payload.
    /// <br/><br/>
    /// Recoverable errors are logged and retried after a fixed backoff until the attempt budget runs out, at
    /// which point the last one is returned. A [`GhQueryError::BadCredentialsError`] is returned right away,
    /// without any further attempt; callers are expected to end the run on it.
    pub async fn execute(&self, query: &str, variables: &Variables) -> Result<Value, GhQueryError> {
        let payload = QueryPayload::new(query, variables);
        let max_attempts = self.policy.max_attempts.max(1);
        debug!("Executing query (cursor = {:?})", payload.cursor());

        let mut attempt = 1;
        loop {
            let e = match self.attempt(&payload).await {
                Ok(data) => return Ok(data),
                Err(e) if !e.is_recoverable() => return Err(e),
                Err(e) => e,
            };

            error!("Request failed - attempt #{}/{}", attempt, max_attempts);

            if attempt >= max_attempts {
                return Err(e);
            }
            error!("{}", e);

            if is_rate_limited(&e) {
                warn!("RATE LIMITED");
            }

            info!("Sleeping {:?}...", self.policy.backoff);
            self.sleeper.sleep(self.policy.backoff).await;
            info!("Retrying...");

            attempt += 1;
        }
    }

    async fn attempt(&self, payload: &QueryPayload) -> Result<Value, GhQueryError> {
        let body = self.transport.post(payload).await?;

        self.validate(payload, body)
    }

    /// Checks, in order: rejected credentials, API-reported errors (which win even if `data` came along),
    /// and a missing/null `data` payload.
    fn validate(&self, payload: &QueryPayload, body: Value) -> Result<Value, GhQueryError> {
        let response = GraphQLResponse::from_body(&body);

        if response.message.as_deref() == Some(BAD_CREDENTIALS_MESSAGE) {
            error!("Bad credentials");
            return Err(GhQueryError::BadCredentialsError);
        }

        if let Some(errors) = response.non_empty_errors() {
            // a broken diagnostics sink must not hide the API error itself
            if let Err(e) = self.diagnostics.record_failure(&payload.query, payload) {
                error!("{}", e);
            }

            return Err(GhQueryError::GraphQLQueryError {
                errors: prettify(&Value::Array(errors.clone())),
            });
        }

        match response.data {
            Some(data) => Ok(data),
            None => Err(GhQueryError::MissingDataError {
                body: prettify(&body),
            }),
        }
    }
}

/// Whether the error reads like GitHub's rate limiting kicked in. Only the notice depends on it; the backoff
/// stays the same.
pub fn is_rate_limited(e: &GhQueryError) -> bool {
    e.to_string().contains("rate")
}
