/// Run-level errors
///
/// Only these abort a run. Everything an individual worker hits is kept in
/// its `AccountReport`.

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadTestError {
    /// Worker thread could not be started
    #[error("failed to spawn worker for {account}: {source}")]
    Spawn {
        account: String,
        #[source]
        source: io::Error,
    },

    /// Result file could not be written
    #[error("report I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid run configuration
    #[error("invalid configuration: {0}")]
    Config(String),
}
