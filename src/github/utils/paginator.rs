//! Cursor-driven de-pagination of a GraphQL connection.

use log::{debug, info};
use num::integer;
use serde_json::Value;

use crate::ghgql_error::GhQueryError;
use crate::github::json::page::Page;
use crate::github::json::payload::Variables;
use crate::github::json::response::prettify;
use crate::github::utils::executor::RequestExecutor;
use crate::nested;
use crate::report::Row;

/// Amount of items the built-in queries ask for per page (GitHub's maximum).
pub const ITEMS_PER_PAGE: u64 = 100;

/// Name of the query variable carrying the continuation cursor.
pub const CURSOR_VARIABLE: &str = "cursor";

/// Turns one node of a page into (at most) one output row.
/// <br/><br/>
/// Implementations are report-specific. When a node lacks an expected field, the returned error must carry the
/// offending node (see [`node_error`]).
pub trait NodeFormatter {
    /// Sees the whole `data` payload of every page before its nodes are formatted, ie: to pick up fields that
    /// live next to the connection rather than inside its nodes.
    fn on_page(&mut self, _data: &Value) -> Result<(), GhQueryError> {
        Ok(())
    }

    fn format(&self, node: &Value) -> Result<Option<Row>, GhQueryError>;
}

impl<F> NodeFormatter for F
where
    F: Fn(&Value) -> Result<Option<Row>, GhQueryError>,
{
    fn format(&self, node: &Value) -> Result<Option<Row>, GhQueryError> {
        self(node)
    }
}

/// Builds a [`GhQueryError::NodeFormatError`] that shows the node that could not be formatted.
pub fn node_error(node: &Value, reason: &str) -> GhQueryError {
    GhQueryError::NodeFormatError {
        node: prettify(node),
        nested: anyhow::anyhow!(reason.to_string()),
    }
}

/// Drives a [`RequestExecutor`] page after page, threading the `cursor` variable through, until the API reports
/// there is no next page.
pub struct Paginator<'a> {
    executor: &'a RequestExecutor,
    connection_path: String,
    max_pages: Option<u64>,
}

impl<'a> Paginator<'a> {
    /// `connection_path` is a JSON pointer (ie: `/repositoryOwner/repositories`) from the `data` payload to the
    /// paginated connection, which must expose `totalCount`, `nodes` and `pageInfo`.
    pub fn new(executor: &'a RequestExecutor, connection_path: &str) -> Self {
        Paginator {
            executor,
            connection_path: connection_path.to_string(),
            max_pages: None,
        }
    }

    /// Fails the pagination (instead of looping forever) once more than `max_pages` pages were requested.
    pub fn with_max_pages(mut self, max_pages: Option<u64>) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Fetches every page of `query` and returns the formatted rows, in the order the API returned the nodes.
    /// <br/><br/>
    /// `variables` is left untouched; the first request uses it as-is and later requests send a copy with the
    /// `cursor` variable set. Any failing page fails the whole pagination; no partial result is returned.
    pub async fn paginate(
        &self, query: &str, variables: &Variables, formatter: &mut dyn NodeFormatter,
    ) -> Result<Vec<Row>, GhQueryError> {
        let mut variables = variables.clone();
        let mut rows: Vec<Row> = Vec::new();

        let mut page_number: u64 = 0;
        loop {
            page_number += 1;

            if let Some(max_pages) = self.max_pages {
                if page_number > max_pages {
                    return Err(GhQueryError::PageLimitExceededError { max_pages });
                }
            }

            info!("Query #{}", page_number);
            let data = self.executor.execute(query, &variables).await?;
            let page = self.extract_page(&data)?;

            if page_number == 1 {
                let grand_total = page.total_count.unwrap_or(0);
                info!("Completed first page.");
                info!("Data to fetch:");
                info!(" - items: {}", grand_total);
                info!(" - pages: {}", integer::div_ceil(grand_total, ITEMS_PER_PAGE));
            }

            formatter.on_page(&data)?;
            for node in page.nodes.iter() {
                if let Some(row) = formatter.format(node)? {
                    rows.push(row);
                }
            }
            debug!("Accumulated [{}] rows after page #{}", rows.len(), page_number);

            if !page.page_info.has_next_page {
                break;
            }

            let cursor = page.page_info.end_cursor.ok_or_else(|| GhQueryError::ResponseShapeError {
                msg: format!(
                    "page #{} at [{}] reports a next page but no end cursor",
                    page_number, self.connection_path
                ),
            })?;
            variables.insert(CURSOR_VARIABLE.to_string(), Value::String(cursor));
        }

        Ok(rows)
    }

    fn extract_page(&self, data: &Value) -> Result<Page<Value>, GhQueryError> {
        let connection = data.pointer(&self.connection_path).ok_or_else(|| GhQueryError::ResponseShapeError {
            msg: format!("nothing found at [{}] in:\n{}", self.connection_path, prettify(data)),
        })?;

        serde_json::from_value(connection.clone()).map_err(|e| GhQueryError::ResponseShapeError {
            msg: format!(
                "[{}] is not a paginated connection ({:#}):\n{}",
                self.connection_path,
                nested!(e),
                prettify(connection)
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use mockall::Sequence;
    use serde_json::json;

    use crate::github::client::transport::MockTransport;
    use crate::github::json::payload::QueryPayload;
    use crate::github::utils::diagnostics::MockDiagnosticsSink;

    use super::*;

    macro_rules! aw {
        ($e:expr) => {
            tokio_test::block_on($e)
        };
    }

    const QUERY: &str = "query ($owner: String!, $cursor: String) { repositoryOwner(login: $owner) { repositories(first: 100, after: $cursor) { totalCount nodes { name } pageInfo { hasNextPage endCursor } } } }";
    const PATH: &str = "/repositoryOwner/repositories";

    fn page(names: &[&str], total: u64, end_cursor: Option<&str>) -> Value {
        let nodes: Vec<Value> = names.iter().map(|name| json!({ "name": name })).collect();

        json!({
            "data": {
                "repositoryOwner": {
                    "repositories": {
                        "totalCount": total,
                        "nodes": nodes,
                        "pageInfo": {"hasNextPage": end_cursor.is_some(), "endCursor": end_cursor}
                    }
                }
            }
        })
    }

    fn name_formatter(node: &Value) -> Result<Option<Row>, GhQueryError> {
        let name = node.get("name").ok_or_else(|| node_error(node, "missing name"))?;

        let mut row = Row::new();
        row.insert("repo_name".to_string(), name.clone());
        Ok(Some(row))
    }

    fn variables() -> Variables {
        let mut variables = Variables::new();
        variables.insert("owner".to_string(), json!("octocat"));
        variables
    }

    fn executor(transport: MockTransport) -> RequestExecutor {
        RequestExecutor::new(Box::new(transport), Box::new(MockDiagnosticsSink::new()))
    }

    fn repo_names(rows: &[Row]) -> Vec<&str> {
        rows.iter().map(|row| row["repo_name"].as_str().unwrap()).collect()
    }

    #[test]
    fn follows_cursors_until_the_last_page() {
        let mut seq = Sequence::new();
        let mut transport = MockTransport::new();

        transport
            .expect_post()
            .withf(|payload: &QueryPayload| payload.cursor().is_none())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(page(&["a", "b"], 5, Some("c1"))));
        transport
            .expect_post()
            .withf(|payload: &QueryPayload| payload.cursor() == Some("c1"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(page(&["c", "d"], 5, Some("c2"))));
        transport
            .expect_post()
            .withf(|payload: &QueryPayload| {
                payload.cursor() == Some("c2") && payload.variables.get("owner") == Some(&json!("octocat"))
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(page(&["e"], 5, None)));

        let executor = executor(transport);
        let given_variables = variables();

        let rows = aw!(Paginator::new(&executor, PATH).paginate(QUERY, &given_variables, &mut name_formatter)).unwrap();

        assert_eq!(repo_names(&rows), vec!["a", "b", "c", "d", "e"]);
        assert_eq!(given_variables, variables());
    }

    #[test]
    fn formatter_may_skip_nodes() {
        let mut transport = MockTransport::new();
        transport.expect_post().times(1).returning(|_| Ok(page(&["keep", "skip", "keep-too"], 3, None)));

        let executor = executor(transport);
        let mut only_kept = |node: &Value| -> Result<Option<Row>, GhQueryError> {
            if node["name"] == json!("skip") {
                Ok(None)
            } else {
                name_formatter(node)
            }
        };

        let rows = aw!(Paginator::new(&executor, PATH).paginate(QUERY, &variables(), &mut only_kept)).unwrap();

        assert_eq!(repo_names(&rows), vec!["keep", "keep-too"]);
    }

    struct PageCounter {
        pages_seen: usize,
    }

    impl NodeFormatter for PageCounter {
        fn on_page(&mut self, data: &Value) -> Result<(), GhQueryError> {
            assert!(data.pointer(PATH).is_some());
            self.pages_seen += 1;
            Ok(())
        }

        fn format(&self, node: &Value) -> Result<Option<Row>, GhQueryError> {
            let mut row = name_formatter(node)?.unwrap_or_default();
            row.insert("page".to_string(), json!(self.pages_seen));
            Ok(Some(row))
        }
    }

    #[test]
    fn formatter_sees_every_page_before_its_nodes() {
        let mut seq = Sequence::new();
        let mut transport = MockTransport::new();
        transport
            .expect_post()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(page(&["a"], 2, Some("c1"))));
        transport
            .expect_post()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(page(&["b"], 2, None)));

        let executor = executor(transport);
        let mut counter = PageCounter { pages_seen: 0 };
        let rows = aw!(Paginator::new(&executor, PATH).paginate(QUERY, &variables(), &mut counter)).unwrap();

        assert_eq!(counter.pages_seen, 2);
        assert_eq!(rows[0]["page"], json!(1));
        assert_eq!(rows[1]["page"], json!(2));
    }

    #[test]
    fn empty_connection_yields_no_rows() {
        let mut transport = MockTransport::new();
        transport.expect_post().times(1).returning(|_| Ok(page(&[], 0, None)));

        let executor = executor(transport);
        let rows = aw!(Paginator::new(&executor, PATH).paginate(QUERY, &variables(), &mut name_formatter)).unwrap();

        assert!(rows.is_empty());
    }

    #[test]
    fn formatter_errors_carry_the_offending_node() {
        let mut transport = MockTransport::new();
        transport.expect_post().times(1).returning(|_| {
            Ok(json!({"data": {"repositoryOwner": {"repositories": {
                "totalCount": 1,
                "nodes": [{"unexpected": "shape"}],
                "pageInfo": {"hasNextPage": false, "endCursor": null}
            }}}}))
        });

        let executor = executor(transport);
        let result = aw!(Paginator::new(&executor, PATH).paginate(QUERY, &variables(), &mut name_formatter));

        match result {
            Err(GhQueryError::NodeFormatError { node, .. }) => assert!(node.contains("unexpected")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn missing_connection_is_a_shape_error() {
        let mut transport = MockTransport::new();
        transport.expect_post().times(1).returning(|_| Ok(json!({"data": {"repositoryOwner": null}})));

        let executor = executor(transport);
        let result = aw!(Paginator::new(&executor, PATH).paginate(QUERY, &variables(), &mut name_formatter));

        assert!(matches!(result, Err(GhQueryError::ResponseShapeError { .. })));
    }

    #[test]
    fn next_page_without_cursor_is_a_shape_error() {
        let mut transport = MockTransport::new();
        transport.expect_post().times(1).returning(|_| {
            Ok(json!({"data": {"repositoryOwner": {"repositories": {
                "totalCount": 200,
                "nodes": [],
                "pageInfo": {"hasNextPage": true, "endCursor": null}
            }}}}))
        });

        let executor = executor(transport);
        let result = aw!(Paginator::new(&executor, PATH).paginate(QUERY, &variables(), &mut name_formatter));

        assert!(matches!(result, Err(GhQueryError::ResponseShapeError { .. })));
    }

    #[test]
    fn page_ceiling_stops_a_never_ending_connection() {
        let mut transport = MockTransport::new();
        transport.expect_post().times(2).returning(|_| Ok(page(&["again"], 1, Some("same"))));

        let executor = executor(transport);
        let result = aw!(Paginator::new(&executor, PATH)
            .with_max_pages(Some(2))
            .paginate(QUERY, &variables(), &mut name_formatter));

        assert!(matches!(result, Err(GhQueryError::PageLimitExceededError { max_pages: 2 })));
    }

    #[test]
    fn failing_page_fails_the_whole_pagination() {
        let mut seq = Sequence::new();
        let mut transport = MockTransport::new();
        transport
            .expect_post()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(page(&["a"], 2, Some("c1"))));
        transport
            .expect_post()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(json!({"message": "Bad credentials"})));

        let executor = executor(transport);
        let result = aw!(Paginator::new(&executor, PATH).paginate(QUERY, &variables(), &mut name_formatter));

        assert!(matches!(result, Err(GhQueryError::BadCredentialsError)));
    }
}
