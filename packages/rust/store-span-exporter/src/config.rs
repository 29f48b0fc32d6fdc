//! Exporter configuration.

use crate::constants::defaults;
use crate::strategy::TracingStrategy;
use bon::Builder;
use std::time::Duration;

/// Configuration for [`StoreSpanExporter`].
///
/// Every option has a default; `ExporterConfig::default()` is a fully usable
/// configuration.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use store_span_exporter::{ExporterConfig, TracingStrategy};
///
/// let config = ExporterConfig::builder()
///     .max_batch_size(200)
///     .max_batch_wait(Duration::from_secs(2))
///     .strategy(TracingStrategy::BatchWithUpdates)
///     .build();
/// assert_eq!(config.max_batch_size, 200);
/// ```
///
/// [`StoreSpanExporter`]: crate::StoreSpanExporter
#[derive(Builder, Clone, Debug)]
pub struct ExporterConfig {
    /// Size-trigger threshold: a batch flush starts once the buffer holds
    /// this many records.
    #[builder(default = defaults::MAX_BATCH_SIZE)]
    pub max_batch_size: usize,

    /// Emergency-overflow threshold: reaching this size forces an immediate
    /// flush regardless of batching economics.
    #[builder(default = defaults::MAX_BUFFER_SIZE)]
    pub max_buffer_size: usize,

    /// Wall-clock flush threshold: a non-empty buffer is flushed once its
    /// oldest record has waited this long.
    #[builder(default = Duration::from_millis(defaults::MAX_BATCH_WAIT_MS))]
    pub max_batch_wait: Duration,

    /// Retry attempts after the initial one before a batch is dropped.
    #[builder(default = defaults::MAX_RETRIES)]
    pub max_retries: u32,

    /// Base delay for exponential backoff between retries.
    #[builder(default = Duration::from_millis(defaults::RETRY_DELAY_MS))]
    pub retry_delay: Duration,

    /// Pin a write strategy instead of taking the store's preference.
    /// Ignored with a warning when the store does not support it.
    pub strategy: Option<TracingStrategy>,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}
