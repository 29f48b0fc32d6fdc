//! Batching span exporter for pluggable observability stores.
//!
//! This crate receives a stream of span-lifecycle events from an
//! instrumented runtime and persists them to an [`ObservabilityStore`]. It
//! preserves span causality, tolerates out-of-order events, bounds memory,
//! batches writes for throughput, and retries transient storage failures
//! with exponential backoff.
//!
//! # Features
//!
//! - **Negotiated write strategies**: realtime, batch-with-updates, or
//!   insert-only, picked from the store's advertisement (or pinned in
//!   config)
//! - **Ordered updates**: per-span sequence numbers plus a stable sort keep
//!   update order intact through batched stores
//! - **Bounded memory**: size, wall-clock and emergency-overflow flush
//!   triggers; spans are dropped (and counted) rather than blocking the
//!   producer
//! - **Retry with backoff**: failed batches retry with exponential backoff
//!   before being dropped and accounted for
//!
//! # Architecture
//!
//! The crate is organized into a few focused modules:
//!
//! - [`exporter`]: the public façade and its init state machine
//! - [`store`]: the store contract and the records written through it
//! - [`span`]: span snapshots, lifecycle events and attribute serialization
//! - [`strategy`]: write-strategy negotiation
//! - [`config`]: exporter configuration
//!
//! # Quick Start
//!
//! ```no_run
//! use async_trait::async_trait;
//! use std::sync::Arc;
//! use store_span_exporter::{
//!     ExportedSpan, ObservabilityStore, SequencedSpanUpdate, SpanCreateRecord, SpanType,
//!     SpanUpdateRecord, StorageHandle, StorageRegistry, StoreError, StoreSpanExporter,
//!     TracingEvent, TracingStrategy, TracingStrategyHint,
//! };
//!
//! #[derive(Debug)]
//! struct PrintStore;
//!
//! #[async_trait]
//! impl ObservabilityStore for PrintStore {
//!     fn tracing_strategy(&self) -> TracingStrategyHint {
//!         TracingStrategyHint {
//!             preferred: TracingStrategy::BatchWithUpdates,
//!             supported: vec![TracingStrategy::BatchWithUpdates],
//!         }
//!     }
//!
//!     async fn create_span(&self, _record: SpanCreateRecord) -> Result<(), StoreError> {
//!         Ok(())
//!     }
//!
//!     async fn update_span(
//!         &self,
//!         _trace_id: &str,
//!         _span_id: &str,
//!         _updates: SpanUpdateRecord,
//!     ) -> Result<(), StoreError> {
//!         Ok(())
//!     }
//!
//!     async fn batch_create_spans(
//!         &self,
//!         records: Vec<SpanCreateRecord>,
//!     ) -> Result<(), StoreError> {
//!         println!("persisting {} spans", records.len());
//!         Ok(())
//!     }
//!
//!     async fn batch_update_spans(
//!         &self,
//!         _records: Vec<SequencedSpanUpdate>,
//!     ) -> Result<(), StoreError> {
//!         Ok(())
//!     }
//! }
//!
//! struct Storage;
//!
//! #[async_trait]
//! impl StorageHandle for Storage {
//!     async fn observability(&self) -> Option<Arc<dyn ObservabilityStore>> {
//!         Some(Arc::new(PrintStore))
//!     }
//! }
//!
//! struct Registry;
//!
//! #[async_trait]
//! impl StorageRegistry for Registry {
//!     async fn storage(&self) -> Option<Arc<dyn StorageHandle>> {
//!         Some(Arc::new(Storage))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let exporter = StoreSpanExporter::builder().build();
//!     exporter.init(&Registry).await;
//!
//!     exporter
//!         .export_event(TracingEvent::SpanStarted(
//!             ExportedSpan::builder()
//!                 .trace_id("trace-1")
//!                 .span_id("span-1")
//!                 .name("agent run")
//!                 .span_type(SpanType::AgentRun)
//!                 .started_at(chrono::Utc::now())
//!                 .build(),
//!         ))
//!         .await;
//!
//!     exporter.shutdown().await;
//! }
//! ```
//!
//! # Configuration
//!
//! All knobs live on [`ExporterConfig`]; see [`config`] for the full option
//! table. The core reads no environment variables — only the internal
//! logger's level comes from the environment (`STORE_SPAN_EXPORTER_LOG_LEVEL`
//! or `LOG_LEVEL`).

mod buffer;
pub mod clock;
pub mod config;
pub mod constants;
mod exporter;
mod logger;
mod processor;
mod retry;
pub mod span;
pub mod store;
pub mod strategy;
#[cfg(test)]
mod testing;
mod tracker;

pub use clock::{Clock, SystemClock};
pub use config::ExporterConfig;
pub use exporter::StoreSpanExporter;
pub use span::{
    serialize_attributes, AttributeValue, ExportedSpan, SpanErrorInfo, SpanKey, SpanMetadata,
    SpanType, TracingEvent,
};
pub use store::{
    ObservabilityStore, SequencedSpanUpdate, SpanCreateRecord, SpanUpdateRecord, StorageHandle,
    StorageRegistry, StoreError,
};
pub use strategy::{ResolvedStrategy, StrategySource, TracingStrategy, TracingStrategyHint};
