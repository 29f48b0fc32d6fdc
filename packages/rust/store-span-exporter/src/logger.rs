//! Logging utilities for store-span-exporter.
//!
//! The exporter sits below the instrumentation layer of the host process, so
//! it must not report through the tracing pipeline it feeds. This module
//! provides a small level-filtered logger with consistent module prefixing
//! instead.
//!
//! Each module declares its own static logger:
//!
//! ```ignore
//! static LOGGER: Logger = Logger::const_new("processor");
//!
//! LOGGER.warn("something went sideways");
//! ```
//!
//! The level is read once from `STORE_SPAN_EXPORTER_LOG_LEVEL` (falling back
//! to `LOG_LEVEL`) and cached for the lifetime of the process.

use crate::constants::env_vars;
use std::env;
use std::sync::OnceLock;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum LogLevel {
    None,
    Error,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    fn parse(value: &str) -> Option<LogLevel> {
        match value.to_lowercase().as_str() {
            "none" => Some(LogLevel::None),
            "error" => Some(LogLevel::Error),
            "warn" => Some(LogLevel::Warn),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            _ => None,
        }
    }
}

// Global log level cache
static LOG_LEVEL: OnceLock<LogLevel> = OnceLock::new();

fn configured_level() -> LogLevel {
    *LOG_LEVEL.get_or_init(|| {
        env::var(env_vars::LOG_LEVEL)
            .or_else(|_| env::var(env_vars::LOG_LEVEL_FALLBACK))
            .ok()
            .and_then(|value| LogLevel::parse(&value))
            .unwrap_or(LogLevel::Info)
    })
}

/// Logger with level filtering and consistent prefixing.
#[derive(Clone)]
pub(crate) struct Logger {
    prefix: &'static str,
}

impl Logger {
    /// Create a new logger with the given prefix, usable in const contexts.
    pub const fn const_new(prefix: &'static str) -> Self {
        Self { prefix }
    }

    fn should_log(&self, level: LogLevel) -> bool {
        configured_level() >= level
    }

    fn format_message(&self, message: &str) -> String {
        format!("[{}] {}", self.prefix, message)
    }

    /// Log a debug message
    pub fn debug(&self, message: impl AsRef<str>) {
        if self.should_log(LogLevel::Debug) {
            println!("{}", self.format_message(message.as_ref()));
        }
    }

    /// Log an info message
    #[allow(dead_code)]
    pub fn info(&self, message: impl AsRef<str>) {
        if self.should_log(LogLevel::Info) {
            println!("{}", self.format_message(message.as_ref()));
        }
    }

    /// Log a warning message
    pub fn warn(&self, message: impl AsRef<str>) {
        if self.should_log(LogLevel::Warn) {
            eprintln!("{}", self.format_message(message.as_ref()));
        }
    }

    /// Log an error message
    pub fn error(&self, message: impl AsRef<str>) {
        if self.should_log(LogLevel::Error) {
            eprintln!("{}", self.format_message(message.as_ref()));
        }
    }
}
