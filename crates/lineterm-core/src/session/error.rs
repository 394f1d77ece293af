//! Session errors

use thiserror::Error;

use super::ConnectionState;
use crate::codec::HexError;

/// Errors returned synchronously by session operations
///
/// Transport failures are not returned here; they reach the listener as
/// events and end the link.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The operation is not allowed in the current state
    #[error("Cannot {operation} while {state}")]
    InvalidState {
        /// Refused operation
        operation: &'static str,
        /// State at the time of the call
        state: ConnectionState,
    },

    /// Sending requires an open link
    #[error("Not connected")]
    NotConnected,

    /// A hex mode payload could not be parsed
    #[error(transparent)]
    MalformedHex(#[from] HexError),
}

impl SessionError {
    /// True when the operation was refused because of the connection state
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::InvalidState { .. } | Self::NotConnected)
    }
}
