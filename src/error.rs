//! Typed errors for the ingestion pipeline.
//!
//! Cell-level problems never surface here; they are absorbed by the value
//! normalizer (logged warning, documented default). These variants cover the
//! conditions that abort a file's import or a refresh cycle.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Every encoding in the fallback list failed. Fatal to this file's
    /// import only; previously committed data is untouched.
    #[error("no supported encoding could decode {} (tried: {tried})", .path.display())]
    Decode { path: PathBuf, tried: String },

    /// The decoded text could not be read as tab-separated records.
    #[error("malformed tabular data in {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// The storage engine rejected a write. The transactional boundaries
    /// around replace-import and aggregation rebuild guarantee the store is
    /// left in either the old or the new consistent state, never a mix.
    #[error("store write failed: {0}")]
    Store(#[from] sqlx::Error),

    #[error("could not read input file: {0}")]
    Io(#[from] std::io::Error),
}
