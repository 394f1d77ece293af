//! # lineterm Core Library
//!
//! Core functionality for the lineterm serial terminal.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Session state machine over an unreliable byte-stream link
//! - Re-assembly of received fragments into display text, including CR LF
//!   terminators split across reads
//! - Hex and caret-notation codecs
//! - Serial and TCP transports on tokio
//!
//! ## Example
//!
//! ```rust,ignore
//! use lineterm_core::prelude::*;
//!
//! let (session, pump) = ConnectionManager::new(
//!     SerialConnector::new(LinkSettings::default()),
//!     SessionConfig::default(),
//! );
//! tokio::spawn(pump.run());
//!
//! let (listener, mut events) = ChannelListener::new();
//! session.attach(listener);
//! session.connect("/dev/rfcomm0")?;
//!
//! while let Some(event) = events.recv().await {
//!     if event == SessionEvent::Connected {
//!         session.send("AT")?;
//!     }
//! }
//! ```

pub mod buffer;
pub mod codec;
pub mod config;
pub mod session;
pub mod transport;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::buffer::{LineBuffer, RenderedText};
    pub use crate::codec::{from_hex, to_caret_string, to_hex, HexError, Newline, RenderMode};
    pub use crate::config::{LinkSettings, SessionConfig, TerminalConfig};
    pub use crate::session::{
        ChannelListener, ConnectionManager, ConnectionState, EventPump, Listener, SessionError,
        SessionEvent,
    };
    pub use crate::transport::{
        Connector, EventSink, SerialConnector, TcpConnector, Transport, TransportError,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
