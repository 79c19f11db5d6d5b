//! Offline-inspection support for queries GitHub refused to answer.

use std::fs;
use std::path::{Path, PathBuf};

use log::{info, trace};
#[cfg(test)]
use mockall::automock;

use crate::ghgql_error::GhQueryError;
use crate::github::json::payload::QueryPayload;
use crate::nested;

const ERROR_QUERY_FILE_NAME: &str = "error_query.gql";
const ERROR_PAYLOAD_FILE_NAME: &str = "error_payload.gql";

/// Receives the request that produced an API-reported error, so it can be inspected after the run.
#[cfg_attr(test, automock)]
pub trait DiagnosticsSink: Send + Sync {
    fn record_failure(&self, query: &str, payload: &QueryPayload) -> Result<(), GhQueryError>;
}

/// [`DiagnosticsSink`] that writes the raw query and the serialized payload into two fixed files, overwriting
/// whatever the previous failure left there.
pub struct FileDiagnostics {
    query_path: PathBuf,
    payload_path: PathBuf,
}

impl FileDiagnostics {
    /// Places both diagnostics files under `dir`, which is created on demand.
    pub fn new(dir: &Path) -> Self {
        FileDiagnostics {
            query_path: dir.join(ERROR_QUERY_FILE_NAME),
            payload_path: dir.join(ERROR_PAYLOAD_FILE_NAME),
        }
    }

    #[cfg(test)]
    pub fn query_path(&self) -> &Path {
        &self.query_path
    }

    #[cfg(test)]
    pub fn payload_path(&self) -> &Path {
        &self.payload_path
    }

    fn write(path: &Path, content: &str) -> Result<(), GhQueryError> {
        info!("Writing diagnostics to: [{}]", path.display());

        let to_error = |e: std::io::Error| {
            trace!("Error = {:?}", e);
            GhQueryError::DiagnosticsWriteError {
                path: path.display().to_string(),
                nested: nested!(e),
            }
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(to_error)?;
        }

        fs::write(path, content).map_err(to_error)
    }
}

impl DiagnosticsSink for FileDiagnostics {
    fn record_failure(&self, query: &str, payload: &QueryPayload) -> Result<(), GhQueryError> {
        FileDiagnostics::write(&self.query_path, query)?;

        let serialized_payload = serde_json::to_string(payload).map_err(|e| {
            trace!("Error = {:?}", e);
            GhQueryError::DiagnosticsWriteError {
                path: self.payload_path.display().to_string(),
                nested: nested!(e),
            }
        })?;

        FileDiagnostics::write(&self.payload_path, &serialized_payload)
    }
}
