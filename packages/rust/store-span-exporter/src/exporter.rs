//! The public exporter façade.
//!
//! # Lifecycle
//!
//! An exporter moves through an explicit state machine:
//!
//! ```ascii
//!   Uninitialized ──init()──> Initializing ──> Ready
//!                                   │             │
//!                                   └──> Disabled │
//!                                          │      │
//!                  ShutDown <──────────────┴──────┘
//! ```
//!
//! `init` may be awaited by the caller or fired on a detached task; either
//! way, `export_event` calls that arrive while init is in flight park on a
//! watch channel and resume once the state settles. When no storage (or no
//! observability sub-store) is available the exporter lands in `Disabled`,
//! where every export is a cheap no-op.
//!
//! # Failure containment
//!
//! None of the pipeline's failure modes escape this API: `export_event`,
//! `flush` and `shutdown` always return normally. Failures surface through
//! the internal logger and through the read-only counters
//! ([`out_of_order_count`](StoreSpanExporter::out_of_order_count),
//! [`dropped_span_count`](StoreSpanExporter::dropped_span_count)).

use crate::clock::{Clock, SystemClock};
use crate::config::ExporterConfig;
use crate::logger::Logger;
use crate::processor::SpanPipeline;
use crate::span::TracingEvent;
use crate::store::StorageRegistry;
use crate::strategy::{ResolvedStrategy, TracingStrategy};
use bon::bon;
use std::sync::Arc;
use std::sync::OnceLock;
use tokio::sync::watch;

/// Module-specific logger
static LOGGER: Logger = Logger::const_new("exporter");

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Uninitialized,
    Initializing,
    Ready,
    Disabled,
    ShutDown,
}

/// Receives span-lifecycle events from an instrumented runtime and persists
/// them to a pluggable observability store.
///
/// # Examples
///
/// ```
/// use store_span_exporter::{ExporterConfig, StoreSpanExporter, TracingStrategy};
///
/// let exporter = StoreSpanExporter::builder()
///     .config(
///         ExporterConfig::builder()
///             .max_batch_size(250)
///             .strategy(TracingStrategy::BatchWithUpdates)
///             .build(),
///     )
///     .build();
/// # drop(exporter);
/// ```
#[derive(Debug)]
pub struct StoreSpanExporter {
    config: ExporterConfig,
    clock: Arc<dyn Clock>,
    phase: watch::Sender<Phase>,
    pipeline: OnceLock<Arc<SpanPipeline>>,
}

#[bon]
impl StoreSpanExporter {
    /// Create an exporter. `config` defaults to [`ExporterConfig::default`];
    /// `clock` defaults to the system clock and only needs overriding in
    /// tests.
    #[builder]
    pub fn new(config: Option<ExporterConfig>, clock: Option<Arc<dyn Clock>>) -> Self {
        let (phase, _) = watch::channel(Phase::Uninitialized);
        Self {
            config: config.unwrap_or_default(),
            clock: clock.unwrap_or_else(|| Arc::new(SystemClock)),
            phase,
            pipeline: OnceLock::new(),
        }
    }
}

impl Default for StoreSpanExporter {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl StoreSpanExporter {
    /// Look up the observability store and negotiate the write strategy.
    ///
    /// Only the first call does anything; repeated or concurrent calls are
    /// no-ops. If the registry has no storage, or the storage no
    /// observability sub-store, the exporter is disabled and every
    /// subsequent export becomes a no-op.
    pub async fn init(&self, registry: &dyn StorageRegistry) {
        let mut started = false;
        self.phase.send_if_modified(|phase| {
            if *phase == Phase::Uninitialized {
                *phase = Phase::Initializing;
                started = true;
                true
            } else {
                false
            }
        });
        if !started {
            LOGGER.debug("init: already initialized or shut down, ignoring");
            return;
        }

        let Some(storage) = registry.storage().await else {
            LOGGER.warn("no storage configured, span export disabled");
            self.phase.send_replace(Phase::Disabled);
            return;
        };
        let Some(store) = storage.observability().await else {
            LOGGER.warn("storage has no observability store, span export disabled");
            self.phase.send_replace(Phase::Disabled);
            return;
        };

        let resolved = TracingStrategy::resolve(self.config.strategy, &store.tracing_strategy());
        let pipeline = SpanPipeline::new(store, resolved, &self.config, Arc::clone(&self.clock));
        let _ = self.pipeline.set(pipeline);
        self.phase.send_replace(Phase::Ready);
    }

    /// Export one span-lifecycle event.
    ///
    /// Blocks only while an `init` is in flight; in every other non-ready
    /// state the event is dropped with a debug log.
    pub async fn export_event(&self, event: TracingEvent) {
        let mut phase_rx = self.phase.subscribe();
        loop {
            let phase = *phase_rx.borrow_and_update();
            match phase {
                Phase::Ready => break,
                Phase::Initializing => {
                    if phase_rx.changed().await.is_err() {
                        return;
                    }
                }
                Phase::Uninitialized => {
                    LOGGER.debug("export_event: exporter not initialized, dropping event");
                    return;
                }
                Phase::Disabled => {
                    LOGGER.debug("export_event: exporter disabled, dropping event");
                    return;
                }
                Phase::ShutDown => {
                    LOGGER.debug("export_event: exporter shut down, dropping event");
                    return;
                }
            }
        }

        if let Some(pipeline) = self.pipeline.get() {
            pipeline.handle_event(event).await;
        }
    }

    /// Force-drain the buffer, awaiting the flush (including its retries).
    pub async fn flush(&self) {
        if *self.phase.borrow() != Phase::Ready {
            return;
        }
        if let Some(pipeline) = self.pipeline.get() {
            pipeline.flush().await;
        }
    }

    /// Cancel the flush timer, drain the buffer and every in-flight retry,
    /// and refuse all further events.
    pub async fn shutdown(&self) {
        let mut phase_rx = self.phase.subscribe();
        loop {
            let phase = *phase_rx.borrow_and_update();
            match phase {
                Phase::Initializing => {
                    // let init settle so its pipeline gets drained too
                    if phase_rx.changed().await.is_err() {
                        return;
                    }
                }
                Phase::Ready => {
                    if let Some(pipeline) = self.pipeline.get() {
                        pipeline.shutdown().await;
                    }
                    break;
                }
                Phase::ShutDown => return,
                Phase::Uninitialized | Phase::Disabled => break,
            }
        }
        self.phase.send_replace(Phase::ShutDown);
        LOGGER.debug("exporter shut down");
    }

    /// The strategy negotiated at init, if the exporter is ready.
    pub fn strategy(&self) -> Option<ResolvedStrategy> {
        self.pipeline.get().map(|pipeline| pipeline.strategy())
    }

    /// Records currently buffered and not yet handed to a flush.
    pub fn buffered_span_count(&self) -> usize {
        self.pipeline
            .get()
            .map(|pipeline| pipeline.buffered_span_count())
            .unwrap_or(0)
    }

    /// Spans whose create was submitted and whose terminal batch is still
    /// unresolved.
    pub fn tracked_span_count(&self) -> usize {
        self.pipeline
            .get()
            .map(|pipeline| pipeline.tracked_span_count())
            .unwrap_or(0)
    }

    /// Out-of-order events dropped from the current buffer generation.
    pub fn out_of_order_count(&self) -> u64 {
        self.pipeline
            .get()
            .map(|pipeline| pipeline.out_of_order_count())
            .unwrap_or(0)
    }

    /// Total records lost to batches that exhausted their retry budget.
    pub fn dropped_span_count(&self) -> u64 {
        self.pipeline
            .get()
            .map(|pipeline| pipeline.dropped_span_count())
            .unwrap_or(0)
    }
}
