//! Configuration options.
//!
//! Applications that embed the tracker are free to define their own command
//! line arguments; the tracker itself is configured from a [`TrackerConfig`],
//! typically loaded from a TOML file whose path is passed on the command line.
//!
//! ## Example
//! ```toml
//! max_connections = 100_000
//! inactivity_timeout = 300_000
//! timeout_resolution = 100
//! max_buffered_bytes = 100_000
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Loads a configuration file from `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> TrackerConfig {
    let config_str = fs::read_to_string(path).expect("ERROR: File read failed");
    toml::from_str(&config_str).expect("Invalid config file")
}

/// Returns the default configuration.
pub fn default_config() -> TrackerConfig {
    TrackerConfig::default()
}

/* --------------------------------------------------------------------------------- */

/// Connection tracking options.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TrackerConfig {
    /// Maximum number of connections that can be tracked simultaneously.
    /// Segments for new connections beyond this are dropped. Defaults to
    /// `100_000`.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Time to expire inactive connections (in milliseconds). Every tracked
    /// connection starts with this window; it can be overridden per
    /// connection. Defaults to 5 minutes.
    #[serde(default = "default_inactivity_timeout")]
    pub inactivity_timeout: usize,

    /// Frequency to check for inactive connections (in milliseconds).
    /// Defaults to `100`.
    #[serde(default = "default_timeout_resolution")]
    pub timeout_resolution: usize,

    /// Upper bound on the bytes buffered per flow before the stream fails
    /// and any session watcher tears down. Unbounded when absent.
    #[serde(default)]
    pub max_buffered_bytes: Option<usize>,

    /// Whether a RST segment matching no tracked connection creates one.
    /// Defaults to `true`, matching the capture sources this tracker was
    /// built against.
    #[serde(default = "default_init_on_rst")]
    pub init_on_rst: bool,
}

fn default_max_connections() -> usize {
    100_000
}

fn default_inactivity_timeout() -> usize {
    300_000
}

fn default_timeout_resolution() -> usize {
    100
}

fn default_init_on_rst() -> bool {
    true
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            max_connections: default_max_connections(),
            inactivity_timeout: default_inactivity_timeout(),
            timeout_resolution: default_timeout_resolution(),
            max_buffered_bytes: None,
            init_on_rst: default_init_on_rst(),
        }
    }
}
