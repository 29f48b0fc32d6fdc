//! Constants for the store-span-exporter package.
//!
//! This file centralizes all constants to ensure consistency across the codebase
//! and provide a single source of truth for configuration parameters.

/// Environment variable names recognized by the crate.
///
/// The core exporter is configured exclusively through [`ExporterConfig`];
/// only the internal logger reads the environment.
///
/// [`ExporterConfig`]: crate::ExporterConfig
pub mod env_vars {
    /// Log level for the exporter's internal logger.
    pub const LOG_LEVEL: &str = "STORE_SPAN_EXPORTER_LOG_LEVEL";

    /// Generic fallback log level variable.
    pub const LOG_LEVEL_FALLBACK: &str = "LOG_LEVEL";
}

/// Default values for configuration parameters.
pub mod defaults {
    /// Default size-trigger threshold for a batch flush.
    pub const MAX_BATCH_SIZE: usize = 1000;

    /// Default emergency-overflow threshold for the in-memory buffer.
    pub const MAX_BUFFER_SIZE: usize = 10_000;

    /// Default wall-clock flush threshold in milliseconds.
    pub const MAX_BATCH_WAIT_MS: u64 = 5_000;

    /// Default number of retry attempts after the initial flush attempt.
    pub const MAX_RETRIES: u32 = 4;

    /// Default base delay for exponential backoff in milliseconds.
    pub const RETRY_DELAY_MS: u64 = 500;
}
