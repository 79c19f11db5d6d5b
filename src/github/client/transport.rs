//! The single outbound seam of the application: one HTTP `POST` of a [`QueryPayload`] against GitHub's
//! GraphQL endpoint.
//!
//! ### Usage example:
//!
//! ```rust
//! use crate::github::client::transport::{ClientConfig, HttpTransport};
//!
//! let github_token = "MY_AWESOME_PERSONAL_ACCESS_TOKEN";
//!
//! let transport = HttpTransport::new(ClientConfig::new(github_token))?;
//! ```
//!
//! See more: [https://docs.github.com/en/graphql/guides/forming-calls-with-graphql](https://docs.github.com/en/graphql/guides/forming-calls-with-graphql)

use std::time::Duration;

use async_trait::async_trait;
use log::trace;
#[cfg(test)]
use mockall::automock;
use reqwest::header::{AUTHORIZATION, USER_AGENT};
use serde_json::Value;

use crate::ghgql_error::GhQueryError;
use crate::ghgql_metadata;
use crate::github::json::payload::QueryPayload;
use crate::nested;

pub const DEFAULT_BASE_URL: &str = "https://api.github.com/graphql";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything needed to reach (and authenticate against) the GraphQL endpoint.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub token: String,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(token: &str) -> Self {
        ClientConfig {
            base_url: DEFAULT_BASE_URL.to_string(),
            token: token.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }
}

/// Trait for any and all `type`s able to deliver a [`QueryPayload`] and hand back the parsed response body.
/// <br/><br/>
/// Implementations must not interpret the body (that is the executor's job); they only fail when no JSON
/// body could be obtained at all.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(&self, payload: &QueryPayload) -> Result<Value, GhQueryError>;
}

/// [`Transport`] backed by a `reqwest` client.
pub struct HttpTransport {
    client: reqwest::Client,
    config: ClientConfig,
}

impl HttpTransport {
    pub fn new(config: ClientConfig) -> Result<Self, GhQueryError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build().map_err(|e| {
            trace!("Error = {:?}", e);
            GhQueryError::GitHubAPIError {
                msg: "Could not build HTTP client.".to_string(),
                nested: nested!(e),
            }
        })?;

        Ok(HttpTransport { client, config })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, payload: &QueryPayload) -> Result<Value, GhQueryError> {
        let url = &self.config.base_url;
        trace!("Posting query to [{}] with variables {:?}...", url, payload.variables);

        let response = self
            .client
            .post(url)
            .header(AUTHORIZATION, format!("token {}", self.config.token))
            .header(USER_AGENT, ghgql_metadata::user_agent())
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                trace!("Error = {:?}", e);
                GhQueryError::GitHubAPIError {
                    msg: format!("Error posting query to [{}].", url),
                    nested: nested!(e),
                }
            })?;

        trace!("Response status = {}", response.status());

        let raw_response_text = response.text().await.map_err(|e| {
            trace!("Error = {:?}", e);
            GhQueryError::GitHubAPIResponseBodyError {
                msg: format!("Error retrieving response body from [{}].", url),
                nested: nested!(e),
            }
        })?;

        serde_json::from_str(&raw_response_text).map_err(|e| {
            trace!("Error = {:?}", e);
            trace!("Raw response = {}", raw_response_text);
            GhQueryError::GitHubAPIResponseBodyError {
                msg: format!("Error parsing response JSON from [{}].", url),
                nested: nested!(e),
            }
        })
    }
}
