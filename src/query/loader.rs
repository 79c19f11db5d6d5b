use std::fs;
use std::path::Path;

use log::{debug, trace};
use rust_embed::RustEmbed;

use crate::ghgql_error::GhQueryError;
use crate::nested;

/// Queries shipped inside the binary, addressed by their path relative to the `queries` folder.
#[derive(RustEmbed)]
#[folder = "$CARGO_MANIFEST_DIR/queries/"]
struct BuiltInQueries;

/// Returns the text of the query at `path`, looking on disk first and among the built-in queries second.
pub fn load_query(path: &str) -> Result<String, GhQueryError> {
    if Path::new(path).is_file() {
        debug!("Reading query from [{}]", path);

        return fs::read_to_string(path).map_err(|e| {
            trace!("Error = {:?}", e);
            GhQueryError::Other(nested!(e).context(format!("Could not read query file [{}]", path)))
        });
    }

    let embedded = BuiltInQueries::get(path).ok_or_else(|| GhQueryError::QueryNotFoundError(path.to_string()))?;
    debug!("Using built-in query [{}]", path);

    String::from_utf8(embedded.into_owned()).map_err(|e| {
        trace!("Error = {:?}", e);
        GhQueryError::Other(nested!(e).context(format!("Built-in query [{}] is not valid UTF-8", path)))
    })
}

/// Paths of all built-in queries (query templates included), sorted; any of them can be handed to
/// [`load_query`].
pub fn built_in_queries() -> Vec<String> {
    let mut paths: Vec<String> = BuiltInQueries::iter().map(|path| path.into_owned()).collect();
    paths.sort();
    paths
}
