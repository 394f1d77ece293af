//! Transport errors

use thiserror::Error;

/// Errors that can occur while starting or using a transport
#[derive(Error, Debug)]
pub enum TransportError {
    /// The attempt could not be started
    #[error("Failed to open endpoint: {0}")]
    Open(String),

    /// The handle was closed or its driver has exited
    #[error("Link already closed")]
    Closed,

    /// Called outside a tokio runtime
    #[error("No async runtime available to drive the link")]
    NoRuntime,

    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
