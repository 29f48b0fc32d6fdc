//! End-to-end demo: export a small trace to an in-memory store.
//!
//! Run with:
//!
//! ```sh
//! cargo run --example basic
//! ```

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use store_span_exporter::{
    ExportedSpan, ExporterConfig, ObservabilityStore, SequencedSpanUpdate, SpanCreateRecord,
    SpanMetadata, SpanType, SpanUpdateRecord, StorageHandle, StorageRegistry, StoreError,
    StoreSpanExporter, TracingEvent, TracingStrategy, TracingStrategyHint,
};

/// A store that keeps every span in a map, keyed by `(trace_id, span_id)`.
#[derive(Debug, Default)]
struct InMemoryStore {
    spans: Mutex<BTreeMap<(String, String), SpanCreateRecord>>,
}

impl InMemoryStore {
    fn dump(&self) {
        let spans = self.spans.lock().unwrap();
        println!("store holds {} spans:", spans.len());
        for ((trace_id, span_id), record) in spans.iter() {
            println!(
                "  {trace_id}/{span_id} {} ended_at={:?}",
                record.name, record.ended_at
            );
        }
    }

    fn apply_update(record: &mut SpanCreateRecord, updates: &SpanUpdateRecord) {
        if let Some(name) = &updates.name {
            record.name = name.clone();
        }
        if updates.attributes.is_some() {
            record.attributes = updates.attributes.clone();
        }
        if updates.output.is_some() {
            record.output = updates.output.clone();
        }
        if updates.error.is_some() {
            record.error = updates.error.clone();
        }
        if updates.ended_at.is_some() {
            record.ended_at = updates.ended_at;
        }
    }
}

#[async_trait]
impl ObservabilityStore for InMemoryStore {
    fn tracing_strategy(&self) -> TracingStrategyHint {
        TracingStrategyHint {
            preferred: TracingStrategy::BatchWithUpdates,
            supported: vec![
                TracingStrategy::Realtime,
                TracingStrategy::BatchWithUpdates,
                TracingStrategy::InsertOnly,
            ],
        }
    }

    async fn create_span(&self, record: SpanCreateRecord) -> Result<(), StoreError> {
        self.spans
            .lock()
            .unwrap()
            .insert((record.trace_id.clone(), record.span_id.clone()), record);
        Ok(())
    }

    async fn update_span(
        &self,
        trace_id: &str,
        span_id: &str,
        updates: SpanUpdateRecord,
    ) -> Result<(), StoreError> {
        let mut spans = self.spans.lock().unwrap();
        if let Some(record) = spans.get_mut(&(trace_id.to_owned(), span_id.to_owned())) {
            Self::apply_update(record, &updates);
        }
        Ok(())
    }

    async fn batch_create_spans(&self, records: Vec<SpanCreateRecord>) -> Result<(), StoreError> {
        println!("batch_create_spans: {} records", records.len());
        let mut spans = self.spans.lock().unwrap();
        for record in records {
            spans.insert((record.trace_id.clone(), record.span_id.clone()), record);
        }
        Ok(())
    }

    async fn batch_update_spans(
        &self,
        records: Vec<SequencedSpanUpdate>,
    ) -> Result<(), StoreError> {
        println!("batch_update_spans: {} records", records.len());
        let mut spans = self.spans.lock().unwrap();
        for update in records {
            if let Some(record) =
                spans.get_mut(&(update.trace_id.clone(), update.span_id.clone()))
            {
                Self::apply_update(record, &update.updates);
            }
        }
        Ok(())
    }
}

struct DemoStorage {
    store: Arc<InMemoryStore>,
}

#[async_trait]
impl StorageHandle for DemoStorage {
    async fn observability(&self) -> Option<Arc<dyn ObservabilityStore>> {
        Some(self.store.clone())
    }
}

struct DemoRegistry {
    storage: Arc<DemoStorage>,
}

#[async_trait]
impl StorageRegistry for DemoRegistry {
    async fn storage(&self) -> Option<Arc<dyn StorageHandle>> {
        Some(self.storage.clone())
    }
}

fn agent_span(trace_id: &str, span_id: &str, name: &str) -> ExportedSpan {
    ExportedSpan::builder()
        .trace_id(trace_id)
        .span_id(span_id)
        .name(name)
        .span_type(SpanType::AgentRun)
        .started_at(Utc::now())
        .metadata(
            SpanMetadata::builder()
                .user_id("demo-user")
                .environment("local")
                .build(),
        )
        .build()
}

#[tokio::main]
async fn main() {
    let store = Arc::new(InMemoryStore::default());
    let registry = DemoRegistry {
        storage: Arc::new(DemoStorage {
            store: store.clone(),
        }),
    };

    let exporter = StoreSpanExporter::builder()
        .config(ExporterConfig::builder().max_batch_size(4).build())
        .build();
    exporter.init(&registry).await;

    let root = agent_span("trace-1", "span-1", "weather agent");
    exporter
        .export_event(TracingEvent::SpanStarted(root.clone()))
        .await;

    let tool = ExportedSpan::builder()
        .trace_id("trace-1")
        .span_id("span-2")
        .parent_span_id("span-1")
        .name("lookup forecast")
        .span_type(SpanType::ToolCall)
        .started_at(Utc::now())
        .build();
    exporter
        .export_event(TracingEvent::SpanStarted(tool.clone()))
        .await;

    let mut tool_done = tool;
    tool_done.ended_at = Some(Utc::now());
    exporter
        .export_event(TracingEvent::SpanEnded(tool_done))
        .await;

    let mut root_done = root;
    root_done.ended_at = Some(Utc::now());
    exporter
        .export_event(TracingEvent::SpanEnded(root_done))
        .await;

    exporter.shutdown().await;
    store.dump();
}
