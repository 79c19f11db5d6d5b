//! Repos & commits report: every commit on the default branch of every repository listed in a counts report.
//!
//! Nested pagination (repositories, then commits of each) is not possible in a single GraphQL query, so the
//! repositories are taken from the counts report instead and queried in batches. Every repository in a batch
//! gets its own alias and its own history cursor; a repository drops out of the batch once its history is
//! exhausted, and the batch is re-rendered for the remaining ones.

use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde_json::{json, Value};

use crate::dates;
use crate::ghgql_error::GhQueryError;
use crate::github::json::page::Page;
use crate::github::json::payload::Variables;
use crate::github::json::response::prettify;
use crate::github::utils::executor::RequestExecutor;
use crate::github::utils::paginator::NodeFormatter;
use crate::query::loader;
use crate::query::template::QueryTemplate;
use crate::report::commits::CommitFormatter;
use crate::report::csv_file::{read_csv, write_csv};
use crate::report::{prepare_output_dir, required, required_str, Row};

pub const TEMPLATE_PATH: &str = "templates/repos_and_commits.gql";

/// Repositories per request. Around a hundred repositories (with a hundred commits each) per query is known
/// to make GitHub give up on the request.
pub const BATCH_SIZE: usize = 30;

const OUTPUT_FILE_NAME: &str = "commits.csv";

/// Default location of the report: `<var_dir>/commits.csv`.
pub fn default_output_path(var_dir: &Path) -> PathBuf {
    var_dir.join(OUTPUT_FILE_NAME)
}

/// A repository taken from the counts report.
#[derive(Debug, Clone, PartialEq)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

/// A repository of the current batch whose history has not been exhausted yet.
#[derive(Debug, Clone)]
struct PendingRepo {
    alias: String,
    repo: RepoRef,
    cursor: Option<String>,
}

/// Lists the repositories of a counts report that have at least one commit to fetch. Empty repositories (no
/// default branch, or no commits in the counted range) are left out.
pub fn repos_with_commits(counts_path: &Path, counts: &[Row]) -> Result<Vec<RepoRef>, GhQueryError> {
    let column = |row: &Row, name: &str| -> Result<String, GhQueryError> {
        row.get(name).and_then(Value::as_str).map(str::to_string).ok_or_else(|| {
            GhQueryError::MissingColumnError {
                path: counts_path.display().to_string(),
                column: name.to_string(),
            }
        })
    };

    let mut repos = Vec::new();
    for row in counts {
        let branch_name = column(row, "branch_name")?;
        let total_commits = column(row, "total_commits")?;

        if branch_name.is_empty() || total_commits == "0" {
            continue;
        }

        repos.push(RepoRef {
            owner: column(row, "owner_name")?,
            name: column(row, "repo_name")?,
        });
    }

    Ok(repos)
}

/// Values for the batch query template. `since` and every `after` are GraphQL literals (a quoted string or
/// `null`), since the query takes no variables.
fn template_data(pending: &[PendingRepo], since: Option<&str>) -> Variables {
    let repos: Vec<Value> = pending
        .iter()
        .map(|pending| {
            json!({
                "alias": pending.alias,
                "owner": pending.repo.owner,
                "name": pending.repo.name,
                "after": json!(pending.cursor).to_string(),
            })
        })
        .collect();

    let mut data = Variables::new();
    data.insert("since".to_string(), json!(json!(since).to_string()));
    data.insert("repos".to_string(), Value::Array(repos));
    data
}

/// Formats the history page of one repository into `rows`, returning the cursor of its next page (if any).
fn collect_repo_page(data: &Value, pending: &PendingRepo, rows: &mut Vec<Row>) -> Result<Option<String>, GhQueryError> {
    let repo = &pending.repo;

    let node = match data.get(&pending.alias).filter(|node| !node.is_null()) {
        Some(node) => node,
        None => {
            warn!("Repository [{}/{}] not found, skipping", repo.owner, repo.name);
            return Ok(None);
        }
    };

    let branch = match node.get("defaultBranchRef").filter(|branch| !branch.is_null()) {
        Some(branch) => branch,
        None => return Ok(None),
    };

    let branch_name = required_str(branch, "/name")?;
    let history: Page<Value> = serde_json::from_value(required(branch, "/target/history")?.clone()).map_err(|e| {
        GhQueryError::ResponseShapeError {
            msg: format!("history of [{}/{}] is not a page: {}", repo.owner, repo.name, e),
        }
    })?;

    let formatter = CommitFormatter::new(&repo.name, Some(branch_name), true);
    for commit in history.nodes.iter() {
        if let Some(row) = formatter.format(commit)? {
            rows.push(row);
        }
    }
    debug!("{:20}| {:5}", repo.name, history.nodes.len());

    if !history.page_info.has_next_page {
        return Ok(None);
    }

    match history.page_info.end_cursor {
        Some(cursor) => Ok(Some(cursor)),
        None => Err(GhQueryError::ResponseShapeError {
            msg: format!("history of [{}/{}] reports a next page but no end cursor", repo.owner, repo.name),
        }),
    }
}

/// Fetches all commits of one batch of repositories, request after request, until every history is exhausted.
async fn fetch_batch(
    executor: &RequestExecutor, template: &QueryTemplate, batch: &[RepoRef], since: Option<&str>,
    max_pages: Option<u64>,
) -> Result<Vec<Row>, GhQueryError> {
    let mut pending: Vec<PendingRepo> = batch
        .iter()
        .enumerate()
        .map(|(index, repo)| PendingRepo {
            alias: format!("repo{}", index),
            repo: repo.clone(),
            cursor: None,
        })
        .collect();
    let mut rows: Vec<Row> = Vec::new();

    let mut page_number: u64 = 0;
    while !pending.is_empty() {
        page_number += 1;

        if let Some(max_pages) = max_pages {
            if page_number > max_pages {
                return Err(GhQueryError::PageLimitExceededError { max_pages });
            }
        }

        info!("Query #{} ({} repos)", page_number, pending.len());
        let query = template.render(&template_data(&pending, since))?;
        let data = executor.execute(&query, &Variables::new()).await?;

        if let Some(rate_limit) = data.get("rateLimit") {
            debug!("Rate limit = {}", prettify(rate_limit));
        }

        let mut still_pending = Vec::with_capacity(pending.len());
        for repo in pending {
            if let Some(cursor) = collect_repo_page(&data, &repo, &mut rows)? {
                still_pending.push(PendingRepo {
                    cursor: Some(cursor),
                    ..repo
                });
            }
        }
        pending = still_pending;
    }

    Ok(rows)
}

/// Reads the repositories out of the counts report at `counts_path` and writes all of their commits (on or after
/// the `YYYY-MM-DD` `start_date`, if any) to `output`, always overwriting it.
pub async fn repos_commits_report(
    executor: &RequestExecutor, counts_path: &Path, start_date: Option<&str>, output: &Path,
    max_pages: Option<u64>,
) -> Result<usize, GhQueryError> {
    let since = start_date.map(dates::as_git_timestamp).transpose()?;

    let counts = read_csv(counts_path)?;
    let repos = repos_with_commits(counts_path, &counts)?;
    info!("Fetching commits of [{}] repos listed in [{}]", repos.len(), counts_path.display());

    let template = QueryTemplate::from(TEMPLATE_PATH, &loader::load_query(TEMPLATE_PATH)?);

    let mut rows: Vec<Row> = Vec::new();
    for (batch_number, batch) in repos.chunks(BATCH_SIZE).enumerate() {
        info!("Batch #{}", batch_number + 1);
        rows.extend(fetch_batch(executor, &template, batch, since.as_deref(), max_pages).await?);
    }
    info!(" - commits: {}", rows.len());

    if !rows.is_empty() {
        prepare_output_dir(output)?;
    }
    write_csv(output, &rows, false)?;

    Ok(rows.len())
}
