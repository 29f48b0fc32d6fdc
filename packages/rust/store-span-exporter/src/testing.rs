//! Test doubles shared by the unit tests.

use crate::store::{
    ObservabilityStore, SequencedSpanUpdate, SpanCreateRecord, SpanUpdateRecord, StorageHandle,
    StorageRegistry, StoreError,
};
use crate::strategy::{TracingStrategy, TracingStrategyHint};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// An [`ObservabilityStore`] that records every call and can be told to fail
/// batch creates on demand.
#[derive(Debug, Default)]
pub(crate) struct RecordingStore {
    hint: Mutex<Option<TracingStrategyHint>>,
    creates: Mutex<Vec<SpanCreateRecord>>,
    updates: Mutex<Vec<(String, String, SpanUpdateRecord)>>,
    batch_creates: Mutex<Vec<Vec<SpanCreateRecord>>>,
    batch_updates: Mutex<Vec<Vec<SequencedSpanUpdate>>>,
    batch_create_attempts: AtomicU32,
    fail_batch_creates: AtomicU32,
    fail_all_batch_creates: AtomicBool,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hint(hint: TracingStrategyHint) -> Self {
        let store = Self::new();
        *store.hint.lock().unwrap() = Some(hint);
        store
    }

    /// Fail the next `count` batch-create calls, then succeed.
    pub fn fail_next_batch_creates(&self, count: u32) {
        self.fail_batch_creates.store(count, Ordering::SeqCst);
    }

    /// Fail every batch-create call.
    pub fn fail_all_batch_creates(&self) {
        self.fail_all_batch_creates.store(true, Ordering::SeqCst);
    }

    pub fn creates(&self) -> Vec<SpanCreateRecord> {
        self.creates.lock().unwrap().clone()
    }

    pub fn updates(&self) -> Vec<(String, String, SpanUpdateRecord)> {
        self.updates.lock().unwrap().clone()
    }

    pub fn batch_creates(&self) -> Vec<Vec<SpanCreateRecord>> {
        self.batch_creates.lock().unwrap().clone()
    }

    pub fn batch_updates(&self) -> Vec<Vec<SequencedSpanUpdate>> {
        self.batch_updates.lock().unwrap().clone()
    }

    /// How many batch-create calls were made, successful or not.
    pub fn batch_create_attempts(&self) -> u32 {
        self.batch_create_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObservabilityStore for RecordingStore {
    fn tracing_strategy(&self) -> TracingStrategyHint {
        self.hint
            .lock()
            .unwrap()
            .clone()
            .unwrap_or(TracingStrategyHint {
                preferred: TracingStrategy::BatchWithUpdates,
                supported: vec![
                    TracingStrategy::Realtime,
                    TracingStrategy::BatchWithUpdates,
                    TracingStrategy::InsertOnly,
                ],
            })
    }

    async fn create_span(&self, record: SpanCreateRecord) -> Result<(), StoreError> {
        self.creates.lock().unwrap().push(record);
        Ok(())
    }

    async fn update_span(
        &self,
        trace_id: &str,
        span_id: &str,
        updates: SpanUpdateRecord,
    ) -> Result<(), StoreError> {
        self.updates
            .lock()
            .unwrap()
            .push((trace_id.to_owned(), span_id.to_owned(), updates));
        Ok(())
    }

    async fn batch_create_spans(&self, records: Vec<SpanCreateRecord>) -> Result<(), StoreError> {
        self.batch_create_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_all_batch_creates.load(Ordering::SeqCst) {
            return Err(StoreError::WriteFailed("injected failure".to_owned()));
        }
        let remaining = self.fail_batch_creates.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_batch_creates
                .store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::WriteFailed("injected failure".to_owned()));
        }
        self.batch_creates.lock().unwrap().push(records);
        Ok(())
    }

    async fn batch_update_spans(
        &self,
        records: Vec<SequencedSpanUpdate>,
    ) -> Result<(), StoreError> {
        self.batch_updates.lock().unwrap().push(records);
        Ok(())
    }
}

/// A [`StorageHandle`] exposing an optional observability store.
#[derive(Debug)]
pub(crate) struct RecordingStorage {
    store: Option<Arc<dyn ObservabilityStore>>,
}

#[async_trait]
impl StorageHandle for RecordingStorage {
    async fn observability(&self) -> Option<Arc<dyn ObservabilityStore>> {
        self.store.clone()
    }
}

/// A [`StorageRegistry`] with a configurable lookup outcome and delay, for
/// exercising the exporter's init wait-list.
#[derive(Debug, Default)]
pub(crate) struct RecordingRegistry {
    storage: Option<Arc<RecordingStorage>>,
    lookup_delay: Option<Duration>,
}

impl RecordingRegistry {
    /// A registry whose storage exposes the given observability store.
    pub fn with_store(store: Arc<dyn ObservabilityStore>) -> Self {
        Self {
            storage: Some(Arc::new(RecordingStorage { store: Some(store) })),
            lookup_delay: None,
        }
    }

    /// A registry with no storage at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A registry whose storage has no observability sub-store.
    pub fn without_observability() -> Self {
        Self {
            storage: Some(Arc::new(RecordingStorage { store: None })),
            lookup_delay: None,
        }
    }

    /// Delay the storage lookup to keep init in flight for a while.
    pub fn with_lookup_delay(mut self, delay: Duration) -> Self {
        self.lookup_delay = Some(delay);
        self
    }
}

#[async_trait]
impl StorageRegistry for RecordingRegistry {
    async fn storage(&self) -> Option<Arc<dyn StorageHandle>> {
        if let Some(delay) = self.lookup_delay {
            tokio::time::sleep(delay).await;
        }
        self.storage
            .clone()
            .map(|storage| storage as Arc<dyn StorageHandle>)
    }
}
