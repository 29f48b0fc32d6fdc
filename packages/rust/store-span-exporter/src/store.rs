//! The observability-store contract and the records the exporter writes.
//!
//! The exporter never talks to a database directly. It hands
//! [`SpanCreateRecord`]s and [`SpanUpdateRecord`]s to an
//! [`ObservabilityStore`] implementation, which owns schema, transport and
//! transactions. Batches are applied atomically by the store or reported as
//! a single error; repeating a call after an error is safe.

use crate::span::{serialize_attributes, ExportedSpan, SpanType};
use crate::strategy::TracingStrategyHint;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Failure reported by a store operation.
///
/// The exporter treats every store error as retryable up to its configured
/// retry budget; a store that knows a write can never succeed should still
/// just return an error and let the budget expire.
#[derive(Clone, Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("write failed: {0}")]
    WriteFailed(String),
}

/// The full row written when a span is first persisted.
///
/// Correlation fields are lifted out of the span's metadata into top-level
/// columns so the store can index them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpanCreateRecord {
    pub trace_id: String,
    pub span_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,
    pub name: String,
    pub span_type: SpanType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    pub is_event: bool,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl SpanCreateRecord {
    /// Build a create record from a span snapshot.
    pub fn from_span(span: &ExportedSpan) -> Self {
        let metadata = span.metadata.as_ref();
        Self {
            trace_id: span.trace_id.clone(),
            span_id: span.span_id.clone(),
            parent_span_id: span.parent_span_id.clone(),
            name: span.name.clone(),
            span_type: span.span_type,
            entity_id: span.entity_id.clone(),
            entity_type: span.entity_type.clone(),
            entity_name: span.entity_name.clone(),
            user_id: metadata.and_then(|m| m.user_id.clone()),
            organization_id: metadata.and_then(|m| m.organization_id.clone()),
            resource_id: metadata.and_then(|m| m.resource_id.clone()),
            run_id: metadata.and_then(|m| m.run_id.clone()),
            session_id: metadata.and_then(|m| m.session_id.clone()),
            thread_id: metadata.and_then(|m| m.thread_id.clone()),
            request_id: metadata.and_then(|m| m.request_id.clone()),
            environment: metadata.and_then(|m| m.environment.clone()),
            source: metadata.and_then(|m| m.source.clone()),
            service_name: metadata.and_then(|m| m.service_name.clone()),
            scope: metadata.and_then(|m| m.scope.clone()),
            attributes: serialize_attributes(span),
            metadata: metadata.and_then(|m| serde_json::to_value(m).ok()),
            tags: span.tags.clone(),
            input: span.input.clone(),
            output: span.output.clone(),
            error: span
                .error
                .as_ref()
                .and_then(|e| serde_json::to_value(e).ok()),
            is_event: span.is_event,
            started_at: span.started_at,
            ended_at: span.ended_at,
        }
    }
}

/// The mutable subset of span fields written by an update.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpanUpdateRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl SpanUpdateRecord {
    /// Build an update record from a span snapshot.
    pub fn from_span(span: &ExportedSpan) -> Self {
        Self {
            name: Some(span.name.clone()),
            attributes: serialize_attributes(span),
            metadata: span
                .metadata
                .as_ref()
                .and_then(|m| serde_json::to_value(m).ok()),
            input: span.input.clone(),
            output: span.output.clone(),
            error: span
                .error
                .as_ref()
                .and_then(|e| serde_json::to_value(e).ok()),
            ended_at: span.ended_at,
        }
    }
}

/// An update plus the identity and ordering information a batched store
/// needs to apply it in observation order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequencedSpanUpdate {
    pub trace_id: String,
    pub span_id: String,
    pub sequence_number: u64,
    #[serde(flatten)]
    pub updates: SpanUpdateRecord,
}

/// The write surface of an observability backend.
///
/// Implementations advertise their supported write strategies through
/// [`tracing_strategy`](ObservabilityStore::tracing_strategy); the exporter
/// negotiates once at init and then uses either the single-span or the batch
/// operations, never both.
#[async_trait]
pub trait ObservabilityStore: Send + Sync + fmt::Debug {
    /// The store's strategy advertisement.
    fn tracing_strategy(&self) -> TracingStrategyHint;

    /// Persist a single span create.
    async fn create_span(&self, record: SpanCreateRecord) -> Result<(), StoreError>;

    /// Apply a partial update to a previously created span.
    async fn update_span(
        &self,
        trace_id: &str,
        span_id: &str,
        updates: SpanUpdateRecord,
    ) -> Result<(), StoreError>;

    /// Persist a batch of creates atomically.
    async fn batch_create_spans(&self, records: Vec<SpanCreateRecord>) -> Result<(), StoreError>;

    /// Apply a batch of sequenced updates atomically, in the given order.
    async fn batch_update_spans(
        &self,
        records: Vec<SequencedSpanUpdate>,
    ) -> Result<(), StoreError>;
}

/// A storage handle from which the observability sub-store is obtained.
#[async_trait]
pub trait StorageHandle: Send + Sync {
    /// The observability sub-store, if this storage backend has one.
    async fn observability(&self) -> Option<Arc<dyn ObservabilityStore>>;
}

/// The dependency surface handed to [`StoreSpanExporter::init`].
///
/// [`StoreSpanExporter::init`]: crate::StoreSpanExporter::init
#[async_trait]
pub trait StorageRegistry: Send + Sync {
    /// Look up the configured storage backend, if any.
    async fn storage(&self) -> Option<Arc<dyn StorageHandle>>;
}
