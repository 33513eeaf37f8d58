//! Connection tuning.

use std::time::Duration;

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

use crate::framing::{DEFAULT_BUFFER_SIZE, DEFAULT_SENTINEL};

/// Sentinel candidates the markup writer escapes everywhere, so they never
/// occur inside a serialized document.
pub const SAFE_SENTINELS: [u8; 2] = [b'\n', b'\r'];

/// Per-connection settings, loaded from the `[net]` table of the
/// application config.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct NetConfig {
    /// Byte terminating each message; both peers must agree on it. Must be
    /// one of [`SAFE_SENTINELS`].
    pub sentinel: u8,
    /// Framing read buffer size in bytes.
    pub buffer_size: usize,
    /// Timeout for establishing a connection, in milliseconds.
    pub connect_timeout_ms: u64,
    /// Trace every tag of incoming messages.
    pub trace_markup: bool,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            sentinel: DEFAULT_SENTINEL,
            buffer_size: DEFAULT_BUFFER_SIZE,
            connect_timeout_ms: 5_000,
            trace_markup: false,
        }
    }
}

impl NetConfig {
    /// Connect timeout as a duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Reject settings a connection cannot work with.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            SAFE_SENTINELS.contains(&self.sentinel),
            "sentinel {:?} can occur inside markup; use one of {:?}",
            char::from(self.sentinel),
            SAFE_SENTINELS.map(char::from)
        );
        ensure!(self.buffer_size > 0, "buffer_size must be positive");
        Ok(())
    }
}
