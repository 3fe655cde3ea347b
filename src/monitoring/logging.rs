//! Structured logging setup.
//!
//! The library only emits `tracing` events. Binaries and tests that want to
//! see them call [`init_logging`] once.

use serde::{Deserialize, Serialize};
use tracing::Level;

/// Log level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    /// Trace level (most verbose)
    Trace = 0,
    /// Debug level
    Debug = 1,
    /// Info level
    Info = 2,
    /// Warning level
    Warn = 3,
    /// Error level
    Error = 4,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "TRACE"),
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum level emitted
    pub level: LogLevel,
    /// Print the module path of each event
    pub with_target: bool,
    /// Print the thread name of each event
    pub with_thread_names: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            with_target: true,
            with_thread_names: false,
        }
    }
}

/// Install a fmt subscriber as the global default.
///
/// Returns false when a subscriber was already installed, which leaves the
/// existing one in place.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let installed = tracing_subscriber::fmt()
        .with_max_level(Level::from(config.level))
        .with_target(config.with_target)
        .with_thread_names(config.with_thread_names)
        .try_init()
        .is_ok();
    if installed {
        tracing::debug!(level = %config.level, "Logging initialised");
    }
    installed
}
