//! Error types for opening physical endpoints.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("stty failed for {path}: {detail}")]
    LineSetup { path: String, detail: String },

    #[error("cannot open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
