use serde_json::Value;

#[derive(Default, Debug, Clone, PartialEq)]
/// Top-level shape of a GraphQL response body. GitHub answers `200` even when `errors` is populated (and may
/// still send partial `data` alongside); a `404`/`401` body only carries `message`.
pub struct GraphQLResponse {
    pub data: Option<Value>,
    pub errors: Option<Vec<Value>>,
    pub message: Option<String>,
}

impl GraphQLResponse {
    /// Interprets a raw response body field by field, so one oddly-typed field does not hide the others. Bodies
    /// that are not even an object are treated as carrying nothing.
    /// <br/><br/>
    /// A non-null `errors` that is not a list is kept as a single error entry; a non-string `message` is kept
    /// through its JSON rendering.
    pub fn from_body(body: &Value) -> Self {
        let field = |name: &str| body.get(name).filter(|value| !value.is_null());

        let errors = field("errors").map(|errors| match errors {
            Value::Array(errors) => errors.clone(),
            other => vec![other.clone()],
        });

        let message = field("message").map(|message| match message {
            Value::String(message) => message.clone(),
            other => other.to_string(),
        });

        GraphQLResponse {
            data: field("data").cloned(),
            errors,
            message,
        }
    }

    /// Returns the error list only when it has at least one entry.
    pub fn non_empty_errors(&self) -> Option<&Vec<Value>> {
        self.errors.as_ref().filter(|errors| !errors.is_empty())
    }
}

/// Human-readable rendering of any JSON value.
pub fn prettify(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn null_data_and_missing_errors_are_absent() {
        let response = GraphQLResponse::from_body(&json!({"data": null}));

        assert_eq!(response.data, None);
        assert_eq!(response.non_empty_errors(), None);
    }

    #[test]
    fn empty_error_list_is_ignored() {
        let response = GraphQLResponse::from_body(&json!({"data": {"a": 1}, "errors": []}));

        assert_eq!(response.non_empty_errors(), None);
        assert_eq!(response.data, Some(json!({"a": 1})));
    }

    #[test]
    fn oddly_typed_errors_are_kept_alongside_the_other_fields() {
        let response = GraphQLResponse::from_body(&json!({
            "data": {"a": 1},
            "errors": {"message": "something went wrong"},
            "message": 42
        }));

        assert_eq!(response.non_empty_errors(), Some(&vec![json!({"message": "something went wrong"})]));
        assert_eq!(response.message, Some("42".to_string()));
        assert_eq!(response.data, Some(json!({"a": 1})));
    }

    #[test]
    fn non_object_body_yields_empty_response() {
        let response = GraphQLResponse::from_body(&json!(["unexpected"]));

        assert_eq!(response, GraphQLResponse::default());
    }
}
