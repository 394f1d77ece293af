//! Terminal configuration
//!
//! Settings are plain serde structs with defaults for every field, so a
//! config file only needs to name what it changes.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::buffer::DEFAULT_MAX_RENDERED;
use crate::codec::{Newline, RenderMode};

/// Default baud rate for serial links
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Default size of the per-read buffer in bytes
pub const DEFAULT_READ_BUFFER_SIZE: usize = 1024;

/// Default time a closed link gets to flush queued writes, in milliseconds
pub const DEFAULT_CLOSE_GRACE_MS: u64 = 2000;

/// Errors that can occur while loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read or written
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid config JSON
    #[error("Invalid config file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Rendering and encoding settings of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Terminator appended to sent payloads and expected on receive
    pub newline: Newline,
    /// Initial render mode
    pub render_mode: RenderMode,
    /// Report sent payloads back to the listener
    pub echo: bool,
    /// Upper bound in bytes of the rendered text kept by the session
    pub max_rendered: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            newline: Newline::Crlf,
            render_mode: RenderMode::Text,
            echo: true,
            max_rendered: DEFAULT_MAX_RENDERED,
        }
    }
}

/// Settings used by the stream transports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkSettings {
    /// Serial baud rate (ignored by TCP)
    pub baud_rate: u32,
    /// Size of a single read
    pub read_buffer_size: usize,
    /// How long a closed link may keep flushing queued writes before its
    /// driver is aborted
    pub close_grace_ms: u64,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            close_grace_ms: DEFAULT_CLOSE_GRACE_MS,
        }
    }
}

/// Complete terminal configuration as stored on disk
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    /// Rendering and encoding
    pub session: SessionConfig,
    /// Transport settings
    pub link: LinkSettings,
}

impl TerminalConfig {
    /// Load from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse from JSON text
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Save as pretty printed JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
