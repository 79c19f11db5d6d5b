//! Repos & commit counts report: one row per repository owned by an account, with the size of its default
//! branch's history (optionally counted from a start date onwards) and its latest commit.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use log::info;
use serde_json::{json, Value};

use crate::dates;
use crate::ghgql_error::GhQueryError;
use crate::github::json::payload::Variables;
use crate::github::utils::executor::RequestExecutor;
use crate::github::utils::paginator::Paginator;
use crate::query::loader;
use crate::report::csv_file::write_csv;
use crate::report::{prepare_output_dir, required, required_str, Row};

pub const QUERY_PATH: &str = "repos/repos_and_commit_counts.gql";
pub const CONNECTION_PATH: &str = "/repositoryOwner/repositories";

/// Default location of the report: `<var_dir>/counts-end-<today>.csv`.
pub fn default_output_path(var_dir: &Path, today: NaiveDate) -> PathBuf {
    var_dir.join(format!("counts-end-{}.csv", today.format("%Y-%m-%d")))
}

/// Formats summary repo data. Empty repositories have no default branch; they are still reported, with zero
/// commits.
pub fn format_repo(repo: &Value) -> Result<Option<Row>, GhQueryError> {
    let mut branch_name = Value::Null;
    let mut total_commits = json!(0);
    let mut last_committed_date = Value::Null;
    let mut last_commit_msg_subject = Value::Null;

    if let Some(branch) = repo.get("defaultBranch").filter(|branch| !branch.is_null()) {
        branch_name = required(branch, "/name")?.clone();

        let history = required(branch, "/commits/history")?;
        total_commits = required(history, "/totalCount")?.clone();

        if total_commits.as_u64().unwrap_or(0) > 0 {
            let latest_commit = required(history, "/nodes/0")?;

            let committed_date = dates::as_date(required_str(latest_commit, "/committedDate")?)?;
            last_committed_date = json!(committed_date.format("%Y-%m-%d").to_string());

            let message = required_str(latest_commit, "/message")?;
            last_commit_msg_subject = json!(message.lines().next().unwrap_or(""));
        }
    }

    let mut row = Row::new();
    row.insert("owner_name".to_string(), json!(required_str(repo, "/owner/login")?));
    row.insert("repo_name".to_string(), json!(required_str(repo, "/name")?));
    row.insert("branch_name".to_string(), branch_name);
    row.insert("total_commits".to_string(), total_commits);
    row.insert("last_committed_date".to_string(), last_committed_date);
    row.insert("last_commit_msg_subject".to_string(), last_commit_msg_subject);

    Ok(Some(row))
}

/// Fetches commit counts for all repos owned by an account and writes them to `output`.
/// <br/><br/>
/// `variables` must hold `owner`, and may hold `since` (a `GitTimestamp`) and `isFork`.
pub async fn counts_report(
    executor: &RequestExecutor, variables: &Variables, output: &Path, append: bool, max_pages: Option<u64>,
) -> Result<usize, GhQueryError> {
    let query = loader::load_query(QUERY_PATH)?;

    info!("Fetching repos and commit counts");
    let rows = Paginator::new(executor, CONNECTION_PATH)
        .with_max_pages(max_pages)
        .paginate(&query, variables, &mut format_repo)
        .await?;

    if !rows.is_empty() {
        prepare_output_dir(output)?;
    }
    write_csv(output, &rows, append)?;

    Ok(rows.len())
}
