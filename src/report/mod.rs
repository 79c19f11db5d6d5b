//! CSV persistence of flattened query results, and the built-in reports producing them.

use std::fs;
use std::path::Path;

use log::trace;
use serde_json::{Map, Value};

use crate::ghgql_error::GhQueryError;
use crate::github::utils::paginator::node_error;
use crate::nested;

pub mod commits;
pub mod csv_file;
pub mod repos;
pub mod repos_commits;

/// One flattened entity; key order is the column order of the report.
pub type Row = Map<String, Value>;

/// Looks up a field that must be present (and non-null) in a node, given as a JSON pointer.
pub fn required<'v>(node: &'v Value, pointer: &str) -> Result<&'v Value, GhQueryError> {
    node.pointer(pointer)
        .filter(|value| !value.is_null())
        .ok_or_else(|| node_error(node, &format!("missing field [{}]", pointer)))
}

/// Same as [`required`], for fields holding text.
pub fn required_str<'v>(node: &'v Value, pointer: &str) -> Result<&'v str, GhQueryError> {
    required(node, pointer)?
        .as_str()
        .ok_or_else(|| node_error(node, &format!("field [{}] is not a string", pointer)))
}

/// Generic formatter: nested objects become `parent.child` columns, arrays are kept as JSON text.
pub fn flatten_node(node: &Value) -> Result<Option<Row>, GhQueryError> {
    let mut row = Row::new();
    flatten_into(&mut row, None, node);

    Ok(Some(row))
}

fn flatten_into(row: &mut Row, prefix: Option<&str>, value: &Value) {
    match value {
        Value::Object(fields) => {
            for (key, field) in fields {
                let column = match prefix {
                    Some(prefix) => format!("{}.{}", prefix, key),
                    None => key.clone(),
                };
                flatten_into(row, Some(&column), field);
            }
        }
        Value::Array(_) => {
            row.insert(prefix.unwrap_or("value").to_string(), Value::String(value.to_string()));
        }
        scalar => {
            row.insert(prefix.unwrap_or("value").to_string(), scalar.clone());
        }
    }
}

/// Creates the directory a report is about to be written into.
pub fn prepare_output_dir(path: &Path) -> Result<(), GhQueryError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent).map_err(|e| {
            trace!("Error = {:?}", e);
            GhQueryError::CsvWriteError {
                path: path.display().to_string(),
                nested: nested!(e),
            }
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn flatten_node_joins_nested_keys() {
        let node = json!({
            "name": "ghgql",
            "owner": {"login": "octocat"},
            "defaultBranchRef": null,
            "topics": ["rust", "graphql"]
        });

        let row = flatten_node(&node).unwrap().unwrap();

        assert_eq!(row.keys().collect::<Vec<_>>(), vec!["name", "owner.login", "defaultBranchRef", "topics"]);
        assert_eq!(row["owner.login"], json!("octocat"));
        assert_eq!(row["defaultBranchRef"], Value::Null);
        assert_eq!(row["topics"], json!("[\"rust\",\"graphql\"]"));
    }

    #[test]
    fn required_fields_report_the_node_when_missing() {
        let node = json!({"name": "ghgql", "owner": null});

        assert_eq!(required_str(&node, "/name").unwrap(), "ghgql");
        match required(&node, "/owner/login") {
            Err(GhQueryError::NodeFormatError { node, nested }) => {
                assert!(node.contains("ghgql"));
                assert!(nested.to_string().contains("/owner/login"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
