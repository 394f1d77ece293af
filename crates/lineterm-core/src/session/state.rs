use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection state
///
/// ```text
///             connect()
///   Disconnected ────────► Connecting
///        ▲  ▲                  │
///        │  │ open failed,     │ opened
///        │  │ I/O error,       ▼
///        │  └─ disconnect() ─ Connected
///        └──── (same) ─────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No link, ready to connect
    Disconnected,
    /// Link requested, waiting for the transport to open
    Connecting,
    /// Link open, sending allowed
    Connected,
}

impl ConnectionState {
    /// True when `connect` is allowed
    pub fn can_connect(&self) -> bool {
        matches!(self, Self::Disconnected)
    }

    /// True when `send` is allowed
    pub fn can_send(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// True while a transport handle is held
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Disconnected)
    }

    /// Lowercase state name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_predicates() {
        assert!(ConnectionState::Disconnected.can_connect());
        assert!(!ConnectionState::Connecting.can_connect());
        assert!(!ConnectionState::Connecting.can_send());
        assert!(ConnectionState::Connected.can_send());
        assert!(ConnectionState::Connecting.is_active());
        assert!(!ConnectionState::Disconnected.is_active());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Connecting.to_string(), "connecting");
    }
}
