//! Logger configuration types
//!
//! This module defines the settings the capture engine needs: where session
//! files go, how they are named and laid out, and the timing of the capture
//! loop. Hardware wiring (bus channel, GPIO pins) is handled by the
//! application layer.

use chrono::format::{Item, StrftimeItems};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::PathBuf;
use std::time::Duration;

/// Row layout of session files
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordLayout {
    /// One `Signals` column holding the decoded mapping or raw hex
    #[default]
    Long,
    /// One column per schema signal, `<Message>_<Signal>`
    Wide,
}

impl std::fmt::Display for RecordLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordLayout::Long => write!(f, "long"),
            RecordLayout::Wide => write!(f, "wide"),
        }
    }
}

impl std::str::FromStr for RecordLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "long" => Ok(RecordLayout::Long),
            "wide" => Ok(RecordLayout::Wide),
            other => Err(format!("unknown layout '{}' (expected long or wide)", other)),
        }
    }
}

/// Configuration for the capture engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggerConfig {
    /// Directory receiving session files (created if absent)
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Session file name prefix
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,

    /// chrono format string for the timestamp part of file names
    #[serde(default = "default_timestamp_format")]
    pub timestamp_format: String,

    /// Row layout of session files
    #[serde(default)]
    pub layout: RecordLayout,

    /// Bus receive timeout while a session is active
    #[serde(default = "default_receive_timeout")]
    pub receive_timeout_ms: u64,

    /// Wait on control input per idle iteration
    #[serde(default = "default_idle_poll")]
    pub idle_poll_ms: u64,

    /// Pause after a transport error before retrying
    #[serde(default = "default_error_backoff")]
    pub error_backoff_ms: u64,

    /// Hardware trigger debounce window
    #[serde(default = "default_debounce")]
    pub debounce_ms: u64,

    /// Capacity of the control event channel
    #[serde(default = "default_control_capacity")]
    pub control_capacity: usize,

    /// Write a `.json` metadata sidecar when a session closes
    #[serde(default = "default_true")]
    pub write_metadata: bool,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("can_logs")
}

fn default_file_prefix() -> String {
    "can_log".to_string()
}

fn default_timestamp_format() -> String {
    "%Y%m%d_%H%M%S".to_string()
}

fn default_receive_timeout() -> u64 {
    1000
}

fn default_idle_poll() -> u64 {
    100
}

fn default_error_backoff() -> u64 {
    1000
}

fn default_debounce() -> u64 {
    300
}

fn default_control_capacity() -> usize {
    16
}

fn default_true() -> bool {
    true
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            file_prefix: default_file_prefix(),
            timestamp_format: default_timestamp_format(),
            layout: RecordLayout::default(),
            receive_timeout_ms: default_receive_timeout(),
            idle_poll_ms: default_idle_poll(),
            error_backoff_ms: default_error_backoff(),
            debounce_ms: default_debounce(),
            control_capacity: default_control_capacity(),
            write_metadata: true,
        }
    }
}

impl LoggerConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the output directory
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Builder method: set the file name prefix
    pub fn with_file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.file_prefix = prefix.into();
        self
    }

    /// Builder method: set the row layout
    pub fn with_layout(mut self, layout: RecordLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Builder method: set the bus receive timeout
    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Builder method: set the idle poll interval
    pub fn with_idle_poll(mut self, interval: Duration) -> Self {
        self.idle_poll_ms = interval.as_millis() as u64;
        self
    }

    /// Builder method: set the transport error backoff
    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff_ms = backoff.as_millis() as u64;
        self
    }

    /// Builder method: set the trigger debounce window
    pub fn with_debounce(mut self, window: Duration) -> Self {
        self.debounce_ms = window.as_millis() as u64;
        self
    }

    /// Builder method: enable or disable metadata sidecars
    pub fn with_metadata(mut self, enabled: bool) -> Self {
        self.write_metadata = enabled;
        self
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Check settings that would otherwise fail deep inside the loop
    pub fn validate(&self) -> crate::Result<()> {
        if self.file_prefix.is_empty() || contains_separator(&self.file_prefix) {
            return Err(crate::LoggerError::ConfigError(format!(
                "file_prefix must be a non-empty file name, got '{}'",
                self.file_prefix
            )));
        }
        if self.timestamp_format.is_empty()
            || StrftimeItems::new(&self.timestamp_format).any(|item| matches!(item, Item::Error))
        {
            return Err(crate::LoggerError::ConfigError(format!(
                "timestamp_format '{}' is not a valid strftime pattern",
                self.timestamp_format
            )));
        }
        let mut sample = String::new();
        let rendered = write!(
            sample,
            "{}",
            Local::now().format_with_items(StrftimeItems::new(&self.timestamp_format))
        );
        if rendered.is_err() || contains_separator(&sample) {
            return Err(crate::LoggerError::ConfigError(format!(
                "timestamp_format '{}' does not render a plain file name (got '{}')",
                self.timestamp_format, sample
            )));
        }
        if self.receive_timeout_ms == 0 {
            return Err(crate::LoggerError::ConfigError(
                "receive_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.control_capacity == 0 {
            return Err(crate::LoggerError::ConfigError(
                "control_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn contains_separator(name: &str) -> bool {
    name.contains('/') || name.contains(std::path::MAIN_SEPARATOR)
}
