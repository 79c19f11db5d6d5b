//! Repo commits report: every commit of a single repository's branch, optionally narrowed down to a committer
//! and a date range.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use log::{debug, info};
use serde_json::{json, Value};

use crate::dates;
use crate::ghgql_error::GhQueryError;
use crate::github::json::payload::Variables;
use crate::github::utils::executor::RequestExecutor;
use crate::github::utils::paginator::{NodeFormatter, Paginator};
use crate::query::loader;
use crate::report::csv_file::write_csv;
use crate::report::{prepare_output_dir, required, required_str, Row};

const QUERY_PATH: &str = "repos/repo_commits.gql";
const QUERY_PATH_BRANCH: &str = "repos/repo_commits_branch.gql";

const CONNECTION_PATH: &str = "/repository/defaultBranchRef/target/history";
const CONNECTION_PATH_BRANCH: &str = "/repository/ref/target/history";
const DEFAULT_BRANCH_NAME_PATH: &str = "/repository/defaultBranchRef/name";

/// Everything that identifies (and narrows down) one commits report.
#[derive(Debug, Clone, Default)]
pub struct CommitsReportOptions {
    pub owner: String,
    pub repo_name: String,
    pub branch_name: Option<String>,
    pub committer: Option<String>,
    /// Commits on or after this `YYYY-MM-DD` date (filtered by the API).
    pub start_date: Option<String>,
    /// Commits strictly before this `YYYY-MM-DD` date (filtered locally).
    pub end_date: Option<String>,
    pub verbose: bool,
}

impl CommitsReportOptions {
    /// `{owner}--{repo}[--{branch}]--start-{start}--end-{end}.csv`, under `output_dir`.
    pub fn output_path(&self, output_dir: &Path, today: NaiveDate) -> PathBuf {
        let start = self.start_date.as_deref().unwrap_or("START");
        let end = self.end_date.clone().unwrap_or_else(|| today.format("%Y-%m-%d").to_string());

        let file_name = match &self.branch_name {
            Some(branch) => format!("{}--{}--{}--start-{}--end-{}.csv", self.owner, self.repo_name, branch, start, end),
            None => format!("{}--{}--start-{}--end-{}.csv", self.owner, self.repo_name, start, end),
        };

        output_dir.join(file_name)
    }

    fn variables(&self) -> Result<Variables, GhQueryError> {
        let mut variables = Variables::new();
        variables.insert("owner".to_string(), json!(self.owner));
        variables.insert("repo_name".to_string(), json!(self.repo_name));

        if let Some(branch_name) = &self.branch_name {
            variables.insert("branch_name".to_string(), json!(branch_name));
        }

        if let Some(start_date) = &self.start_date {
            variables.insert("since".to_string(), json!(dates::as_git_timestamp(start_date)?));
        }

        Ok(variables)
    }
}

/// Flattens a commit node, prefixed with the repository (and branch) it was fetched from.
pub struct CommitFormatter {
    repo_name: String,
    branch_name: Option<String>,
    branch_name_path: Option<String>,
    verbose: bool,
}

impl CommitFormatter {
    pub fn new(repo_name: &str, branch_name: Option<&str>, verbose: bool) -> Self {
        CommitFormatter {
            repo_name: repo_name.to_string(),
            branch_name: branch_name.map(str::to_string),
            branch_name_path: None,
            verbose,
        }
    }

    /// For branches only known by the API (ie: the default one): the name is read from every page's `data`, at
    /// the JSON pointer `branch_name_path`.
    pub fn reading_branch_name(repo_name: &str, branch_name_path: &str, verbose: bool) -> Self {
        CommitFormatter {
            branch_name_path: Some(branch_name_path.to_string()),
            ..CommitFormatter::new(repo_name, None, verbose)
        }
    }
}

impl NodeFormatter for CommitFormatter {
    fn on_page(&mut self, data: &Value) -> Result<(), GhQueryError> {
        if let Some(path) = &self.branch_name_path {
            let name = data.pointer(path).and_then(Value::as_str).ok_or_else(|| GhQueryError::ResponseShapeError {
                msg: format!("no branch name found at [{}]", path),
            })?;
            self.branch_name = Some(name.to_string());
        }

        Ok(())
    }

    fn format(&self, commit: &Value) -> Result<Option<Row>, GhQueryError> {
        let mut row = Row::new();
        row.insert("repo_name".to_string(), json!(self.repo_name));
        row.insert("branch_name".to_string(), json!(self.branch_name));
        row.insert("commit_id".to_string(), required(commit, "/abbreviatedOid")?.clone());

        if self.verbose {
            row.insert("author_date".to_string(), date_of(commit, "/authoredDate")?);
            row.insert("author_login".to_string(), login_of(commit, "/author/user/login"));
        }

        row.insert("committed_date".to_string(), date_of(commit, "/committedDate")?);
        row.insert("committer_login".to_string(), login_of(commit, "/committer/user/login"));

        if self.verbose {
            row.insert("changed_files".to_string(), required(commit, "/changedFiles")?.clone());
            row.insert("additions".to_string(), required(commit, "/additions")?.clone());
            row.insert("deletions".to_string(), required(commit, "/deletions")?.clone());
        }

        row.insert("message".to_string(), required(commit, "/message")?.clone());

        Ok(Some(row))
    }
}

fn date_of(commit: &Value, pointer: &str) -> Result<Value, GhQueryError> {
    let date = dates::as_date(required_str(commit, pointer)?)?;

    Ok(json!(date.format("%Y-%m-%d").to_string()))
}

// git authors/committers are not necessarily GitHub users
fn login_of(commit: &Value, pointer: &str) -> Value {
    commit.pointer(pointer).cloned().unwrap_or(Value::Null)
}

/// Keeps the commits made by `committer` (if any) and strictly before `end_date` (if any).
pub fn filter_commits(
    rows: Vec<Row>, committer: Option<&str>, end_date: Option<NaiveDate>,
) -> Result<Vec<Row>, GhQueryError> {
    let mut kept = Vec::with_capacity(rows.len());

    for row in rows {
        if let Some(committer) = committer {
            if row.get("committer_login").and_then(Value::as_str) != Some(committer) {
                continue;
            }
        }

        if let Some(end_date) = end_date {
            let committed_date = row.get("committed_date").and_then(Value::as_str).unwrap_or_default();
            if dates::as_date(committed_date)? >= end_date {
                continue;
            }
        }

        kept.push(row);
    }

    Ok(kept)
}

/// Fetches all commits of the requested branch (the default one unless named) and writes them to `output`,
/// always overwriting it.
pub async fn commits_report(
    executor: &RequestExecutor, options: &CommitsReportOptions, output: &Path, max_pages: Option<u64>,
) -> Result<usize, GhQueryError> {
    match &options.branch_name {
        Some(branch) => info!("{}/{}/{}", options.owner, options.repo_name, branch),
        None => info!("{}/{}", options.owner, options.repo_name),
    }

    let (query_path, connection_path) = match options.branch_name {
        Some(_) => (QUERY_PATH_BRANCH, CONNECTION_PATH_BRANCH),
        None => (QUERY_PATH, CONNECTION_PATH),
    };

    let end_date = options.end_date.as_deref().map(dates::as_date).transpose()?;
    let variables = options.variables()?;
    let query = loader::load_query(query_path)?;
    let mut formatter = match &options.branch_name {
        Some(branch) => CommitFormatter::new(&options.repo_name, Some(branch), options.verbose),
        None => CommitFormatter::reading_branch_name(&options.repo_name, DEFAULT_BRANCH_NAME_PATH, options.verbose),
    };

    let rows = Paginator::new(executor, connection_path)
        .with_max_pages(max_pages)
        .paginate(&query, &variables, &mut formatter)
        .await?;
    let fetched = rows.len();

    let rows = filter_commits(rows, options.committer.as_deref(), end_date)?;
    debug!("Kept [{}] of [{}] fetched commits", rows.len(), fetched);
    info!(" - commits: {}", rows.len());

    if !rows.is_empty() {
        prepare_output_dir(output)?;
    }
    write_csv(output, &rows, false)?;

    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use crate::github::client::transport::MockTransport;
    use crate::github::json::payload::QueryPayload;
    use crate::github::utils::diagnostics::MockDiagnosticsSink;
    use crate::report::csv_file::read_csv;

    use super::*;

    macro_rules! aw {
        ($e:expr) => {
            tokio_test::block_on($e)
        };
    }

    fn commit(oid: &str, committed: &str, committer: Option<&str>) -> Value {
        json!({
            "abbreviatedOid": oid,
            "authoredDate": "2021-01-01T10:00:00Z",
            "committedDate": committed,
            "author": {"user": {"login": "author"}},
            "committer": {"user": committer.map(|login| json!({"login": login}))},
            "changedFiles": 2,
            "additions": 10,
            "deletions": 3,
            "message": format!("Commit {}", oid)
        })
    }

    fn options() -> CommitsReportOptions {
        CommitsReportOptions {
            owner: "octocat".to_string(),
            repo_name: "ghgql".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn compact_rows_have_the_short_column_set() {
        let formatter = CommitFormatter::new("ghgql", None, false);

        let row = formatter.format(&commit("abc1234", "2021-01-02T00:00:00Z", Some("octocat"))).unwrap().unwrap();

        assert_eq!(
            row.keys().collect::<Vec<_>>(),
            vec!["repo_name", "branch_name", "commit_id", "committed_date", "committer_login", "message"]
        );
        assert_eq!(row["committed_date"], json!("2021-01-02"));
        assert_eq!(row["branch_name"], Value::Null);
    }

    #[test]
    fn verbose_rows_add_author_and_size_columns() {
        let formatter = CommitFormatter::new("ghgql", Some("dev"), true);

        let row = formatter.format(&commit("abc1234", "2021-01-02T00:00:00Z", None)).unwrap().unwrap();

        assert_eq!(row["author_login"], json!("author"));
        assert_eq!(row["committer_login"], Value::Null);
        assert_eq!(row["additions"], json!(10));
        assert_eq!(row["branch_name"], json!("dev"));
    }

    #[test]
    fn filters_by_committer_and_exclusive_end_date() {
        let formatter = CommitFormatter::new("ghgql", None, false);
        let rows: Vec<Row> = vec![
            commit("a", "2021-01-01T00:00:00Z", Some("octocat")),
            commit("b", "2021-01-02T00:00:00Z", Some("someone-else")),
            commit("c", "2021-01-03T00:00:00Z", Some("octocat")),
        ]
        .iter()
        .map(|node| formatter.format(node).unwrap().unwrap())
        .collect();

        let kept = filter_commits(rows, Some("octocat"), Some(NaiveDate::from_ymd_opt(2021, 1, 3).unwrap())).unwrap();

        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0]["commit_id"], json!("a"));
    }

    #[test]
    fn output_path_names_the_branch_and_date_range() {
        let today = NaiveDate::from_ymd_opt(2021, 6, 1).unwrap();
        let mut options = options();

        assert_eq!(
            options.output_path(Path::new("out"), today),
            Path::new("out").join("octocat--ghgql--start-START--end-2021-06-01.csv")
        );

        options.branch_name = Some("dev".to_string());
        options.start_date = Some("2021-01-01".to_string());
        assert_eq!(
            options.output_path(Path::new("out"), today),
            Path::new("out").join("octocat--ghgql--dev--start-2021-01-01--end-2021-06-01.csv")
        );
    }

    #[test]
    fn report_sends_since_and_walks_the_default_branch_history() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("commits.csv");

        let mut transport = MockTransport::new();
        transport
            .expect_post()
            .withf(|payload: &QueryPayload| {
                payload.variables.get("since") == Some(&json!("2021-01-01T00:00:00"))
                    && payload.variables.get("branch_name").is_none()
            })
            .times(1)
            .returning(|_| {
                Ok(json!({"data": {"repository": {"defaultBranchRef": {"name": "main", "target": {"history": {
                    "totalCount": 2,
                    "nodes": [
                        commit("a", "2021-01-05T00:00:00Z", Some("octocat")),
                        commit("b", "2021-01-04T00:00:00Z", Some("octocat"))
                    ],
                    "pageInfo": {"hasNextPage": false, "endCursor": null}
                }}}}}}))
            });

        let executor = RequestExecutor::new(Box::new(transport), Box::new(MockDiagnosticsSink::new()));
        let mut options = options();
        options.start_date = Some("2021-01-01".to_string());

        let written = aw!(commits_report(&executor, &options, &output, None)).unwrap();

        assert_eq!(written, 2);
        let rows = read_csv(&output).unwrap();
        assert_eq!(rows[0]["commit_id"], json!("a"));
        assert_eq!(rows[0]["branch_name"], json!("main"));
        assert_eq!(rows[1]["committed_date"], json!("2021-01-04"));
        assert_eq!(rows[1]["branch_name"], json!("main"));
    }

    #[test]
    fn default_branch_name_comes_from_the_response() {
        let mut formatter = CommitFormatter::reading_branch_name("ghgql", DEFAULT_BRANCH_NAME_PATH, false);
        formatter
            .on_page(&json!({"repository": {"defaultBranchRef": {"name": "trunk", "target": {}}}}))
            .unwrap();

        let row = formatter.format(&commit("abc1234", "2021-01-02T00:00:00Z", None)).unwrap().unwrap();

        assert_eq!(row["branch_name"], json!("trunk"));
        assert!(matches!(
            formatter.on_page(&json!({"repository": {"defaultBranchRef": null}})),
            Err(GhQueryError::ResponseShapeError { .. })
        ));
    }

    #[test]
    fn empty_result_leaves_the_output_directory_alone() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("reports").join("commits.csv");

        let mut transport = MockTransport::new();
        transport.expect_post().times(1).returning(|_| {
            Ok(json!({"data": {"repository": {"defaultBranchRef": {"name": "main", "target": {"history": {
                "totalCount": 0,
                "nodes": [],
                "pageInfo": {"hasNextPage": false, "endCursor": null}
            }}}}}}))
        });

        let executor = RequestExecutor::new(Box::new(transport), Box::new(MockDiagnosticsSink::new()));
        let written = aw!(commits_report(&executor, &options(), &output, None)).unwrap();

        assert_eq!(written, 0);
        assert!(!dir.path().join("reports").exists());
    }

    #[test]
    fn malformed_end_date_fails_before_any_request() {
        let executor = RequestExecutor::new(Box::new(MockTransport::new()), Box::new(MockDiagnosticsSink::new()));
        let mut options = options();
        options.end_date = Some("yesterday".to_string());

        let result = aw!(commits_report(&executor, &options, Path::new("unused.csv"), None));

        assert!(matches!(result, Err(GhQueryError::InvalidDateError { .. })));
    }
}
