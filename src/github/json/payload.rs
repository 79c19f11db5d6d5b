use serde::Serialize;
use serde_json::{Map, Value};

/// Named variables sent along a query. Insertion order is preserved.
pub type Variables = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize)]
/// Body of a single GraphQL request: `{"query": ..., "variables": {...}}`.
pub struct QueryPayload {
    pub query: String,
    pub variables: Variables,
}

impl QueryPayload {
    pub fn new(query: &str, variables: &Variables) -> Self {
        QueryPayload {
            query: query.to_string(),
            variables: variables.clone(),
        }
    }

    /// Value of the continuation cursor variable, if one has been injected.
    pub fn cursor(&self) -> Option<&str> {
        self.variables.get("cursor").and_then(Value::as_str)
    }
}
