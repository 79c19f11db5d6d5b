use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use clap::{Arg, ArgMatches, Command};
use console::{Emoji, Term};
use log::{debug, error, LevelFilter};
use serde_json::Value;
use simplelog::{ConfigBuilder, TerminalMode};

use crate::ghgql_error::GhQueryError;
use crate::github::client::transport::{ClientConfig, HttpTransport, DEFAULT_BASE_URL};
use crate::github::json::payload::Variables;
use crate::github::json::response::prettify;
use crate::github::utils::diagnostics::FileDiagnostics;
use crate::github::utils::executor::{RequestExecutor, RetryPolicy, DEFAULT_BACKOFF, DEFAULT_MAX_ATTEMPTS};
use crate::github::utils::paginator::Paginator;
use crate::query::loader;
use crate::query::template::QueryTemplate;
use crate::query::variables::{process_args, process_variables};
use crate::report::commits::{commits_report, CommitsReportOptions};
use crate::report::csv_file::write_csv;
use crate::report::repos::{counts_report, default_output_path};
use crate::report::repos_commits::{self, repos_commits_report};
use crate::report::{flatten_node, prepare_output_dir};

#[path = "error.rs"]
mod ghgql_error;

#[path = "metadata.rs"]
mod ghgql_metadata;

mod dates;

mod github;

mod query;

mod report;

// CLI subcommands ---
const QUERY_COMMAND: &str = "query";
const COUNTS_COMMAND: &str = "counts";
const COMMITS_COMMAND: &str = "commits";
const REPOS_COMMITS_COMMAND: &str = "repos-commits";

// CLI params ---
const BACKOFF_PARAM: &str = "backoff";
const BASE_URL_PARAM: &str = "base-url";
const BRANCH_PARAM: &str = "branch";
const COMMITTER_PARAM: &str = "committer";
const COUNTS_PARAM: &str = "counts";
const END_PARAM: &str = "end";
const GITHUB_TOKEN_PARAM: &str = "github-token";
const LOG_LEVEL_PARAM: &str = "log-level";
const MAX_ATTEMPTS_PARAM: &str = "max-attempts";
const MAX_PAGES_PARAM: &str = "max-pages";
const OUTPUT_DIR_PARAM: &str = "output-dir";
const OUTPUT_PARAM: &str = "output";
const OWNER_PARAM: &str = "owner";
const PAGINATE_PARAM: &str = "paginate";
const QUERY_ARGS_PARAM: &str = "query-args";
const REPOSITORY_PARAM: &str = "repository";
const START_PARAM: &str = "start";
const VAR_DIR_PARAM: &str = "var-dir";
const VARIABLES_PARAM: &str = "variables";

// CLI flags ---
const APPEND_FLAG: &str = "append";
const LIST_FLAG: &str = "list";
const RENDER_FLAG: &str = "render";
const VERBOSE_FLAG: &str = "verbose";

// Default values ---
const DEFAULT_BACKOFF_ARG: &str = "1";
const DEFAULT_MAX_ATTEMPTS_ARG: &str = "3";
const DEFAULT_VAR_DIR: &str = "var";
const GITHUB_TOKEN_ENV: &str = "GITHUB_TOKEN";

// one request in flight at a time: every page's cursor comes from the previous page
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // initialize CLI access ---
    let args = setup_cli();

    // initialize logging facade ---
    let log_level: LevelFilter = args.value_of_t_or_exit(LOG_LEVEL_PARAM);
    init_logging(log_level);

    // parse obligatory params ---

    // clap already enforces the token (either as param or through the environment); this is just a last check
    let github_token = args.value_of(GITHUB_TOKEN_PARAM).unwrap_or_else(|| {
        eprintln!(
            "{} is an obligatory param (or set {})! Aborting operation.",
            GITHUB_TOKEN_PARAM, GITHUB_TOKEN_ENV
        );
        process::exit(1)
    });

    // parse optional params ---
    let base_url = args.value_of(BASE_URL_PARAM).unwrap_or(DEFAULT_BASE_URL);
    let var_dir = PathBuf::from(args.value_of(VAR_DIR_PARAM).unwrap_or(DEFAULT_VAR_DIR));
    let max_pages: Option<u64> = args.get_one::<u64>(MAX_PAGES_PARAM).copied();
    let policy = RetryPolicy {
        max_attempts: args.get_one::<u32>(MAX_ATTEMPTS_PARAM).copied().unwrap_or(DEFAULT_MAX_ATTEMPTS),
        backoff: args.get_one::<u64>(BACKOFF_PARAM).map(|secs| Duration::from_secs(*secs)).unwrap_or(DEFAULT_BACKOFF),
    };

    // initialize request executor ---
    let transport = HttpTransport::new(ClientConfig::new(github_token).with_base_url(base_url))
        .unwrap_or_else(|e| exit_with(e));
    let executor =
        RequestExecutor::new(Box::new(transport), Box::new(FileDiagnostics::new(&var_dir))).with_policy(policy);

    debug!("Using endpoint [{}] and var dir [{}]", base_url, var_dir.display());
    debug!("Using retry policy {:?}", policy);

    // execute selected command ---
    let result = match args.subcommand() {
        Some((QUERY_COMMAND, sub_args)) => run_query(&executor, sub_args, max_pages).await,
        Some((COUNTS_COMMAND, sub_args)) => run_counts(&executor, sub_args, &var_dir, max_pages).await,
        Some((COMMITS_COMMAND, sub_args)) => run_commits(&executor, sub_args, &var_dir, max_pages).await,
        Some((REPOS_COMMITS_COMMAND, sub_args)) => run_repos_commits(&executor, sub_args, &var_dir, max_pages).await,
        _ => Ok(()), // clap requires a subcommand
    };

    if let Err(e) = result {
        exit_with(e);
    }

    Ok(())
}

/// Runs a single query (or every page of it) and prints the result.
async fn run_query(
    executor: &RequestExecutor, args: &ArgMatches, max_pages: Option<u64>,
) -> Result<(), GhQueryError> {
    let stdout = Term::stdout();

    if args.is_present(LIST_FLAG) {
        for path in loader::built_in_queries() {
            print_line(&stdout, &path)?;
        }
        return Ok(());
    }

    let raw_args = values_of(args, QUERY_ARGS_PARAM);
    let (query_path, variables) = process_args(&raw_args)?;

    let mut query = loader::load_query(&query_path)?;
    if args.is_present(RENDER_FLAG) {
        query = QueryTemplate::from(&query_path, &query).render(&variables)?;
    }

    let connection_path = match args.value_of(PAGINATE_PARAM) {
        Some(connection_path) => connection_path,
        None => {
            let data = executor.execute(&query, &variables).await?;
            return print_line(&stdout, &prettify(&data));
        }
    };

    let rows = Paginator::new(executor, connection_path)
        .with_max_pages(max_pages)
        .paginate(&query, &variables, &mut flatten_node)
        .await?;

    if let Some(output) = args.value_of(OUTPUT_PARAM) {
        let output = Path::new(output);
        if !rows.is_empty() {
            prepare_output_dir(output)?;
        }
        write_csv(output, &rows, args.is_present(APPEND_FLAG))?;

        return print_written(&stdout, rows.len(), output);
    }

    for row in rows {
        print_line(&stdout, &prettify(&Value::Object(row)))?;
    }

    Ok(())
}

/// Runs the repos & commit counts report.
async fn run_counts(
    executor: &RequestExecutor, args: &ArgMatches, var_dir: &Path, max_pages: Option<u64>,
) -> Result<(), GhQueryError> {
    let variables: Variables = process_variables(&values_of(args, VARIABLES_PARAM))?;
    if !variables.contains_key(OWNER_PARAM) {
        return Err(GhQueryError::MissingVariableError(OWNER_PARAM.to_string()));
    }

    let output = args
        .value_of(OUTPUT_PARAM)
        .map(PathBuf::from)
        .unwrap_or_else(|| default_output_path(var_dir, today()));

    let written = counts_report(executor, &variables, &output, args.is_present(APPEND_FLAG), max_pages).await?;

    print_written(&Term::stdout(), written, &output)
}

/// Runs the repo commits report.
async fn run_commits(
    executor: &RequestExecutor, args: &ArgMatches, var_dir: &Path, max_pages: Option<u64>,
) -> Result<(), GhQueryError> {
    let to_string = |value: &str| value.to_string();

    let options = CommitsReportOptions {
        owner: args.value_of(OWNER_PARAM).map(to_string).unwrap_or_default(),
        repo_name: args.value_of(REPOSITORY_PARAM).map(to_string).unwrap_or_default(),
        branch_name: args.value_of(BRANCH_PARAM).map(to_string),
        committer: args.value_of(COMMITTER_PARAM).map(to_string),
        start_date: args.value_of(START_PARAM).map(to_string),
        end_date: args.value_of(END_PARAM).map(to_string),
        verbose: args.is_present(VERBOSE_FLAG),
    };

    let output_dir = args.value_of(OUTPUT_DIR_PARAM).map(PathBuf::from).unwrap_or_else(|| var_dir.to_path_buf());
    let output = options.output_path(&output_dir, today());

    let written = commits_report(executor, &options, &output, max_pages).await?;

    print_written(&Term::stdout(), written, &output)
}

/// Runs the repos & commits report, out of a previously written counts report.
async fn run_repos_commits(
    executor: &RequestExecutor, args: &ArgMatches, var_dir: &Path, max_pages: Option<u64>,
) -> Result<(), GhQueryError> {
    let counts_path = args
        .value_of(COUNTS_PARAM)
        .map(PathBuf::from)
        .unwrap_or_else(|| default_output_path(var_dir, today()));
    let output = args
        .value_of(OUTPUT_PARAM)
        .map(PathBuf::from)
        .unwrap_or_else(|| repos_commits::default_output_path(var_dir));

    let written = repos_commits_report(executor, &counts_path, args.value_of(START_PARAM), &output, max_pages).await?;

    print_written(&Term::stdout(), written, &output)
}

/// Reports the error and ends the run. Rejected credentials get their own hint, since no retry can fix them.
fn exit_with(e: GhQueryError) -> ! {
    if e.is_fatal() {
        error!("Bad credentials");
        error!("Update the configured token and try again");
    } else {
        error!("{}", e);
    }

    process::exit(1)
}

fn values_of(args: &ArgMatches, name: &str) -> Vec<String> {
    args.values_of(name).map(|values| values.map(str::to_string).collect()).unwrap_or_default()
}

fn today() -> NaiveDate {
    Local::now().naive_local().date()
}

fn print_line(term: &Term, line: &str) -> Result<(), GhQueryError> {
    term.write_line(line)
        .map_err(|e| GhQueryError::Other(anyhow::Error::new(e).context("Could not write to stdout")))
}

fn print_written(term: &Term, rows: usize, path: &Path) -> Result<(), GhQueryError> {
    let paper_emoji = Emoji("📃", "*");

    if rows == 0 {
        return print_line(term, &format!("{} Nothing to write into [{}].", paper_emoji, path.display()));
    }

    print_line(term, &format!("{} Wrote [{}] rows into [{}].", paper_emoji, rows, path.display()))
}

/// Initializes the `Log` crate's logging facade.
fn init_logging(log_level: LevelFilter) {
    simplelog::TermLogger::init(
        log_level,
        ConfigBuilder::new()
            .add_filter_allow_str(ghgql_metadata::package_name())
            .set_time_to_local(true)
            .build(),
        TerminalMode::Mixed,
    )
    .unwrap() // we want to panic if the logger couldn't be initialized, so the unwrap() is adequate
}

/// Sets up the CLI for the whole application.
fn setup_cli() -> ArgMatches {
    Command::new(ghgql_metadata::package_name())
        .version(ghgql_metadata::full_version())
        .author(ghgql_metadata::authors())
        .about(ghgql_metadata::description())
        .subcommand_required(true)
        .arg_required_else_help(true)
        // params start here ---
        .arg(
            Arg::new(GITHUB_TOKEN_PARAM)
                .long(GITHUB_TOKEN_PARAM)
                .short('G')
                .help("The personal access token under which to query GitHub")
                .env(GITHUB_TOKEN_ENV)
                .hide_env_values(true)
                .required(true)
                .takes_value(true),
        )
        .arg(
            Arg::new(BASE_URL_PARAM)
                .long(BASE_URL_PARAM)
                .help("GitHub's GraphQL endpoint")
                .takes_value(true)
                .default_value(DEFAULT_BASE_URL),
        )
        .arg(
            Arg::new(VAR_DIR_PARAM)
                .long(VAR_DIR_PARAM)
                .help(
                    "Working directory for default report files and for the diagnostics of failed queries \
                    (error_query.gql & error_payload.gql)"
                )
                .takes_value(true)
                .default_value(DEFAULT_VAR_DIR),
        )
        .arg(
            Arg::new(MAX_PAGES_PARAM)
                .long(MAX_PAGES_PARAM)
                .help(
                    "Aborts a paginated query once it needs more than this amount of pages. By default \
                    pages are requested for as long as GitHub reports there is a next one"
                )
                .takes_value(true)
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(MAX_ATTEMPTS_PARAM)
                .long(MAX_ATTEMPTS_PARAM)
                .help("How many times a request is attempted before giving up on it")
                .takes_value(true)
                .value_parser(clap::value_parser!(u32).range(1..))
                .default_value(DEFAULT_MAX_ATTEMPTS_ARG),
        )
        .arg(
            Arg::new(BACKOFF_PARAM)
                .long(BACKOFF_PARAM)
                .help("Seconds to wait between two attempts of the same request")
                .takes_value(true)
                .value_parser(clap::value_parser!(u64))
                .default_value(DEFAULT_BACKOFF_ARG),
        )
        .arg(
            Arg::new(LOG_LEVEL_PARAM)
                .long(LOG_LEVEL_PARAM)
                .short('L')
                .help("Overrides the logging verbosity for the whole application")
                .takes_value(true)
                .possible_values([
                    LevelFilter::Info.as_str(),
                    LevelFilter::Debug.as_str(),
                    LevelFilter::Trace.as_str(),
                    LevelFilter::Warn.as_str(),
                    LevelFilter::Error.as_str(),
                    LevelFilter::Off.as_str(),
                ])
                .ignore_case(true)
                .default_value(ghgql_metadata::default_log_level().as_str()),
        )
        // subcommands start here ---
        .subcommand(
            Command::new(QUERY_COMMAND)
                .about("Runs a query file (or a built-in query) and prints its data as JSON")
                .arg(
                    Arg::new(QUERY_ARGS_PARAM)
                        .help("Path to the query, followed by variables as key-value pairs: QUERY [KEY VALUE]...")
                        .required_unless_present(LIST_FLAG)
                        .multiple_values(true)
                        .takes_value(true),
                )
                .arg(
                    Arg::new(LIST_FLAG)
                        .long(LIST_FLAG)
                        .short('l')
                        .help("Lists the built-in queries instead of running one")
                        .takes_value(false)
                        .conflicts_with(QUERY_ARGS_PARAM),
                )
                .arg(
                    Arg::new(RENDER_FLAG)
                        .long(RENDER_FLAG)
                        .help("Treats the query as a Handlebars template, rendered with the given variables")
                        .takes_value(false),
                )
                .arg(
                    Arg::new(PAGINATE_PARAM)
                        .long(PAGINATE_PARAM)
                        .short('p')
                        .help(
                            "JSON pointer to the paginated connection inside `data` (ie: /viewer/repositories). \
                            The query must accept a `cursor` variable; every node is flattened into a row"
                        )
                        .takes_value(true),
                )
                .arg(
                    Arg::new(OUTPUT_PARAM)
                        .long(OUTPUT_PARAM)
                        .short('o')
                        .help("Writes the paginated rows into this CSV file instead of printing them")
                        .takes_value(true)
                        .requires(PAGINATE_PARAM),
                )
                .arg(
                    Arg::new(APPEND_FLAG)
                        .long(APPEND_FLAG)
                        .short('a')
                        .help("Appends to the CSV file instead of overwriting it")
                        .takes_value(false)
                        .requires(OUTPUT_PARAM),
                ),
        )
        .subcommand(
            Command::new(COUNTS_COMMAND)
                .about("Reports commit counts for all repos owned by an account: owner OWNER [start YYYY-MM-DD] [isFork BOOL]")
                .arg(
                    Arg::new(VARIABLES_PARAM)
                        .help("Variables as key-value pairs; `start` only affects the commit count, not which repos are shown")
                        .required(true)
                        .multiple_values(true)
                        .takes_value(true),
                )
                .arg(
                    Arg::new(OUTPUT_PARAM)
                        .long(OUTPUT_PARAM)
                        .short('o')
                        .help("CSV file to write into (defaults to counts-end-<today>.csv inside the var dir)")
                        .takes_value(true),
                )
                .arg(
                    Arg::new(APPEND_FLAG)
                        .long(APPEND_FLAG)
                        .short('a')
                        .help("Appends to the CSV file instead of overwriting it")
                        .takes_value(false),
                ),
        )
        .subcommand(
            Command::new(COMMITS_COMMAND)
                .about("Reports all commits of a single repository")
                .arg(Arg::new(OWNER_PARAM).help("Owner of the repository").required(true).takes_value(true))
                .arg(Arg::new(REPOSITORY_PARAM).help("Repository name").required(true).takes_value(true))
                .arg(
                    Arg::new(COMMITTER_PARAM)
                        .long(COMMITTER_PARAM)
                        .short('c')
                        .help("Keeps only the commits of this committer (GitHub login)")
                        .takes_value(true),
                )
                .arg(
                    Arg::new(BRANCH_PARAM)
                        .long(BRANCH_PARAM)
                        .short('b')
                        .help("Specific branch to pull commits from (defaults to the default branch)")
                        .takes_value(true),
                )
                .arg(
                    Arg::new(OUTPUT_DIR_PARAM)
                        .long(OUTPUT_DIR_PARAM)
                        .short('o')
                        .help("Directory in which to write the CSV file (defaults to the var dir)")
                        .takes_value(true),
                )
                .arg(
                    Arg::new(START_PARAM)
                        .long(START_PARAM)
                        .short('s')
                        .help("Keeps only commits from this date onwards. Format: YYYY-MM-DD")
                        .takes_value(true),
                )
                .arg(
                    Arg::new(END_PARAM)
                        .long(END_PARAM)
                        .short('e')
                        .help("Keeps only commits strictly before this date. Format: YYYY-MM-DD")
                        .takes_value(true),
                )
                .arg(
                    Arg::new(VERBOSE_FLAG)
                        .long(VERBOSE_FLAG)
                        .short('v')
                        .help("Adds author, changed files, additions and deletions to every commit")
                        .takes_value(false),
                ),
        )
        .subcommand(
            Command::new(REPOS_COMMITS_COMMAND)
                .about("Reports the commits of every repo listed in a counts report, querying repos in batches")
                .arg(
                    Arg::new(COUNTS_PARAM)
                        .long(COUNTS_PARAM)
                        .short('c')
                        .help("Counts report listing the repos (defaults to counts-end-<today>.csv inside the var dir)")
                        .takes_value(true),
                )
                .arg(
                    Arg::new(START_PARAM)
                        .long(START_PARAM)
                        .short('s')
                        .help("Keeps only commits from this date onwards. Format: YYYY-MM-DD")
                        .takes_value(true),
                )
                .arg(
                    Arg::new(OUTPUT_PARAM)
                        .long(OUTPUT_PARAM)
                        .short('o')
                        .help("CSV file to write into (defaults to commits.csv inside the var dir)")
                        .takes_value(true),
                ),
        )
        .get_matches()
}
