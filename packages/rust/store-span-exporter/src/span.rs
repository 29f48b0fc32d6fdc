//! Span snapshots and lifecycle events as emitted by an instrumented runtime.
//!
//! The exporter consumes a stream of [`TracingEvent`]s. Each event carries an
//! [`ExportedSpan`] snapshot: the full state of the span at the moment the
//! event was emitted. Snapshots are immutable once constructed; the exporter
//! only ever reads them.
//!
//! # Attribute serialization
//!
//! Span attributes are arbitrary key/value data supplied by the traced
//! program. [`serialize_attributes`] renders them into a JSON tree for the
//! store: timestamps become RFC 3339 UTC strings, and any value that cannot
//! be represented in JSON (for example a non-finite float) is replaced with
//! `null` after a warning. The helper never fails.

use crate::logger::Logger;
use bon::Builder;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Module-specific logger
static LOGGER: Logger = Logger::const_new("span");

/// Identity of a span: `(trace_id, span_id)`, both opaque strings.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpanKey {
    pub trace_id: String,
    pub span_id: String,
}

impl SpanKey {
    pub fn new(trace_id: impl Into<String>, span_id: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            span_id: span_id.into(),
        }
    }

    /// The key of a span snapshot.
    pub fn of(span: &ExportedSpan) -> Self {
        Self::new(span.trace_id.clone(), span.span_id.clone())
    }
}

impl fmt::Display for SpanKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.trace_id, self.span_id)
    }
}

/// The kind of traced work a span records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanType {
    AgentRun,
    WorkflowRun,
    LlmGeneration,
    ToolCall,
    McpToolCall,
    Generic,
}

impl fmt::Display for SpanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpanType::AgentRun => write!(f, "agent_run"),
            SpanType::WorkflowRun => write!(f, "workflow_run"),
            SpanType::LlmGeneration => write!(f, "llm_generation"),
            SpanType::ToolCall => write!(f, "tool_call"),
            SpanType::McpToolCall => write!(f, "mcp_tool_call"),
            SpanType::Generic => write!(f, "generic"),
        }
    }
}

/// A single attribute value on a span.
///
/// Timestamps are carried as typed values so the store-facing rendering can
/// produce ISO-8601 strings; everything else is either a JSON scalar or an
/// arbitrary JSON tree.
#[derive(Clone, Debug, PartialEq)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Timestamp(DateTime<Utc>),
    Json(Value),
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Int(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Float(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_owned())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::String(value)
    }
}

impl From<DateTime<Utc>> for AttributeValue {
    fn from(value: DateTime<Utc>) -> Self {
        AttributeValue::Timestamp(value)
    }
}

impl From<Value> for AttributeValue {
    fn from(value: Value) -> Self {
        AttributeValue::Json(value)
    }
}

#[derive(Debug, Error)]
enum AttributeError {
    #[error("non-finite number {0} cannot be represented in JSON")]
    NonFiniteNumber(f64),
}

fn render_attribute(value: &AttributeValue) -> Result<Value, AttributeError> {
    match value {
        AttributeValue::Bool(b) => Ok(Value::Bool(*b)),
        AttributeValue::Int(i) => Ok(Value::from(*i)),
        AttributeValue::Float(f) => serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .ok_or(AttributeError::NonFiniteNumber(*f)),
        AttributeValue::String(s) => Ok(Value::String(s.clone())),
        AttributeValue::Timestamp(ts) => Ok(Value::String(
            ts.to_rfc3339_opts(SecondsFormat::Millis, true),
        )),
        AttributeValue::Json(v) => Ok(v.clone()),
    }
}

/// Render a span's attributes into a JSON object for storage.
///
/// Returns `None` when the span carries no attributes. A key whose value
/// cannot be rendered is stored as `null`; the failure is logged with the
/// span's identity and never surfaces to the caller.
pub fn serialize_attributes(span: &ExportedSpan) -> Option<Value> {
    let attributes = span.attributes.as_ref()?;
    let mut rendered = Map::with_capacity(attributes.len());
    for (key, value) in attributes {
        match render_attribute(value) {
            Ok(value) => {
                rendered.insert(key.clone(), value);
            }
            Err(err) => {
                LOGGER.warn(format!(
                    "failed to serialize attribute {:?} (span_id={}, span_type={}, error={})",
                    key, span.span_id, span.span_type, err
                ));
                rendered.insert(key.clone(), Value::Null);
            }
        }
    }
    Some(Value::Object(rendered))
}

/// Correlation metadata attached to a span by the instrumented runtime.
///
/// The typed fields are lifted into top-level columns of the create record;
/// anything else rides along in `extra`.
#[derive(Builder, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[builder(on(String, into))]
#[serde(rename_all = "camelCase")]
pub struct SpanMetadata {
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
    #[serde(flatten)]
    #[builder(default)]
    pub extra: Map<String, Value>,
}

/// Error information recorded on a failed span.
#[derive(Builder, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[builder(on(String, into))]
#[serde(rename_all = "camelCase")]
pub struct SpanErrorInfo {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Immutable snapshot of a span at the moment a lifecycle event fired.
///
/// `is_event` marks zero-duration *event spans*, which emit a single
/// `SpanEnded` and no `SpanStarted`.
#[derive(Builder, Clone, Debug)]
#[builder(on(String, into))]
pub struct ExportedSpan {
    pub trace_id: String,
    pub span_id: String,
    pub parent_span_id: Option<String>,
    pub name: String,
    pub span_type: SpanType,
    pub entity_id: Option<String>,
    pub entity_type: Option<String>,
    pub entity_name: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub attributes: Option<BTreeMap<String, AttributeValue>>,
    pub metadata: Option<SpanMetadata>,
    pub tags: Option<Vec<String>>,
    pub input: Option<Value>,
    pub output: Option<Value>,
    pub error: Option<SpanErrorInfo>,
    #[builder(default)]
    pub is_event: bool,
}

/// A span-lifecycle event emitted by the instrumented runtime.
#[derive(Clone, Debug)]
pub enum TracingEvent {
    SpanStarted(ExportedSpan),
    SpanUpdated(ExportedSpan),
    SpanEnded(ExportedSpan),
}

impl TracingEvent {
    /// The span snapshot this event carries.
    pub fn span(&self) -> &ExportedSpan {
        match self {
            TracingEvent::SpanStarted(span)
            | TracingEvent::SpanUpdated(span)
            | TracingEvent::SpanEnded(span) => span,
        }
    }

    /// Stable name of the event kind, for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            TracingEvent::SpanStarted(_) => "span_started",
            TracingEvent::SpanUpdated(_) => "span_updated",
            TracingEvent::SpanEnded(_) => "span_ended",
        }
    }
}
