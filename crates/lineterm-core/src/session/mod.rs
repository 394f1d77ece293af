//! Terminal session
//!
//! A session owns at most one link at a time and moves between
//! `Disconnected`, `Connecting` and `Connected` in response to caller
//! requests and transport events. Runtime failures end the link and are
//! reported to the listener; nothing is retried.

mod error;
mod listener;
mod manager;
mod state;

pub use error::SessionError;
pub use listener::{ChannelListener, Listener, SessionEvent};
pub use manager::{ConnectionManager, EventPump};
pub use state::ConnectionState;
