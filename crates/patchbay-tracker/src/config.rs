//! Configuration types for the tracker.

use serde::Deserialize;

/// Tracker configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Host to bind to.
    pub host: String,
    /// First port of the bind scan range.
    pub port: u16,
    /// Last port of the bind scan range (inclusive).
    pub port_end: u16,
    /// Suppresses info-level service chatter.
    pub silent: bool,
    /// Maximum accepted frame payload size in bytes.
    pub max_frame_size: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 9190,
            port_end: 9199,
            silent: false,
            max_frame_size: patchbay_proto::MAX_FRAME_SIZE,
        }
    }
}

impl TrackerConfig {
    /// Creates a config binding the given scan range on the default host.
    #[must_use]
    pub fn with_port_range(mut self, port: u16, port_end: u16) -> Self {
        self.port = port;
        self.port_end = port_end;
        self
    }

    /// Sets the bind host.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Suppresses info-level service chatter.
    #[must_use]
    pub const fn silent(mut self) -> Self {
        self.silent = true;
        self
    }
}
