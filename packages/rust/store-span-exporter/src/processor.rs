//! Event routing, batching and the flush/retry pipeline.
//!
//! # Architecture
//!
//! The pipeline owns the live [`TraceBuffer`], the [`SpanTracker`] and the
//! single-shot flush timer as one lock-protected unit: every code path that
//! mutates the buffer is also the one that schedules or cancels the timer,
//! under the same lock, so a size-triggered flush can never race a
//! time-triggered one.
//!
//! Store calls never happen under that lock. A flush takes the whole buffer
//! generation as an immutable [`SpanBatch`] and resets the live buffer in
//! one step; the batch is then exported (and retried) on a detached task
//! while new events keep landing in the fresh generation.
//!
//! # Tracker lifecycle
//!
//! Spans enter the tracker when their create record is buffered (or written,
//! in realtime mode). They leave only after the batch carrying their
//! terminal event lands — or is dropped once the retry budget is exhausted.
//! Pruning on drop loses the ability to recognize extremely late updates for
//! those spans, but keeps the tracker from growing without bound against a
//! permanently broken store.

use crate::buffer::{SpanBatch, TraceBuffer};
use crate::clock::Clock;
use crate::config::ExporterConfig;
use crate::logger::Logger;
use crate::retry::RetryPolicy;
use crate::span::{SpanKey, TracingEvent};
use crate::store::{ObservabilityStore, SpanCreateRecord, SpanUpdateRecord, StoreError};
use crate::strategy::{ResolvedStrategy, TracingStrategy};
use crate::tracker::SpanTracker;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Module-specific logger
static LOGGER: Logger = Logger::const_new("processor");

/// Why a flush started.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FlushReason {
    /// The buffer hit the emergency overflow threshold.
    Overflow,
    /// The buffer reached the configured batch size.
    Size,
    /// The oldest buffered record waited out the batch window.
    Time,
    /// An explicit `flush()` or shutdown drain.
    Forced,
}

impl fmt::Display for FlushReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlushReason::Overflow => write!(f, "overflow"),
            FlushReason::Size => write!(f, "size"),
            FlushReason::Time => write!(f, "time"),
            FlushReason::Forced => write!(f, "forced"),
        }
    }
}

/// Buffer, tracker and timer handle: one invariant-bearing unit.
///
/// `generation` increments every time the buffer is taken for a flush. The
/// batch-window timer remembers the generation it was scheduled for, so a
/// stale timer that lost the race against a size-triggered flush cannot
/// touch the generation that replaced it.
struct BufferState {
    buffer: TraceBuffer,
    tracker: SpanTracker,
    flush_timer: Option<JoinHandle<()>>,
    generation: u64,
}

pub(crate) struct SpanPipeline {
    handle: Weak<SpanPipeline>,
    store: Arc<dyn ObservabilityStore>,
    strategy: ResolvedStrategy,
    max_batch_size: usize,
    max_buffer_size: usize,
    max_batch_wait: Duration,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
    shared: Mutex<BufferState>,
    flush_tasks: Mutex<Vec<JoinHandle<()>>>,
    dropped_spans: AtomicU64,
}

impl SpanPipeline {
    pub fn new(
        store: Arc<dyn ObservabilityStore>,
        strategy: ResolvedStrategy,
        config: &ExporterConfig,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let mut max_batch_size = config.max_batch_size;
        if max_batch_size > config.max_buffer_size {
            LOGGER.warn(format!(
                "max_batch_size {} exceeds max_buffer_size {}, clamping",
                max_batch_size, config.max_buffer_size
            ));
            max_batch_size = config.max_buffer_size;
        }
        // The pipeline hands clones of itself to its timer and flush tasks,
        // so it is only ever constructed behind an Arc.
        Arc::new_cyclic(|handle| Self {
            handle: handle.clone(),
            store,
            strategy,
            max_batch_size,
            max_buffer_size: config.max_buffer_size,
            max_batch_wait: config.max_batch_wait,
            retry: RetryPolicy::new(config.max_retries, config.retry_delay),
            clock,
            shared: Mutex::new(BufferState {
                buffer: TraceBuffer::new(),
                tracker: SpanTracker::new(),
                flush_timer: None,
                generation: 0,
            }),
            flush_tasks: Mutex::new(Vec::new()),
            dropped_spans: AtomicU64::new(0),
        })
    }

    pub fn strategy(&self) -> ResolvedStrategy {
        self.strategy
    }

    /// Route one event according to the resolved strategy.
    pub async fn handle_event(&self, event: TracingEvent) {
        match self.strategy.strategy {
            TracingStrategy::Realtime => self.handle_realtime(event).await,
            TracingStrategy::BatchWithUpdates => self.buffer_batched(event),
            TracingStrategy::InsertOnly => self.buffer_insert_only(event),
        }
    }

    /// Realtime: one store call per event, no buffering.
    async fn handle_realtime(&self, event: TracingEvent) {
        let span = event.span();
        let key = SpanKey::of(span);

        if span.is_event {
            // Event spans carry their whole life in the terminal event.
            if !matches!(event, TracingEvent::SpanEnded(_)) {
                LOGGER.warn(format!(
                    "unexpected {} for event span (trace_id={}, span_id={}), dropping",
                    event.kind(),
                    key.trace_id,
                    key.span_id
                ));
                return;
            }
            let result = self.store.create_span(SpanCreateRecord::from_span(span)).await;
            self.log_realtime_result(result, &event, &key);
            return;
        }

        match &event {
            TracingEvent::SpanStarted(span) => {
                let result = self.store.create_span(SpanCreateRecord::from_span(span)).await;
                if result.is_ok() {
                    self.shared.lock().unwrap().tracker.insert(key.clone());
                }
                self.log_realtime_result(result, &event, &key);
            }
            TracingEvent::SpanUpdated(span) => {
                let result = self
                    .store
                    .update_span(
                        &key.trace_id,
                        &key.span_id,
                        SpanUpdateRecord::from_span(span),
                    )
                    .await;
                self.log_realtime_result(result, &event, &key);
            }
            TracingEvent::SpanEnded(span) => {
                let result = self
                    .store
                    .update_span(
                        &key.trace_id,
                        &key.span_id,
                        SpanUpdateRecord::from_span(span),
                    )
                    .await;
                self.shared.lock().unwrap().tracker.remove(&key);
                self.log_realtime_result(result, &event, &key);
            }
        }
    }

    fn log_realtime_result(
        &self,
        result: Result<(), StoreError>,
        event: &TracingEvent,
        key: &SpanKey,
    ) {
        if let Err(err) = result {
            LOGGER.error(format!(
                "realtime {} write failed (trace_id={}, span_id={}, error={})",
                event.kind(),
                key.trace_id,
                key.span_id,
                err
            ));
        }
    }

    /// Batch-with-updates: drive the buffer and check flush triggers.
    fn buffer_batched(&self, event: TracingEvent) {
        let now = self.clock.now();
        let flush = {
            let mut state = self.shared.lock().unwrap();
            let span = event.span();
            let key = SpanKey::of(span);

            match &event {
                TracingEvent::SpanStarted(span) => {
                    state
                        .buffer
                        .push_create(key.clone(), SpanCreateRecord::from_span(span), now);
                    state.tracker.insert(key);
                }
                TracingEvent::SpanUpdated(span) => {
                    if state.tracker.contains(&key) {
                        state
                            .buffer
                            .push_update(&key, SpanUpdateRecord::from_span(span), now);
                    } else {
                        Self::drop_out_of_order(&mut state, &event, &key);
                    }
                }
                TracingEvent::SpanEnded(span) => {
                    if state.tracker.contains(&key) {
                        state
                            .buffer
                            .push_update(&key, SpanUpdateRecord::from_span(span), now);
                        state.buffer.mark_completed(key);
                    } else if span.is_event {
                        // No prior create exists for an event span: synthesize
                        // one rather than emitting an unanchored update.
                        state
                            .buffer
                            .push_create(key.clone(), SpanCreateRecord::from_span(span), now);
                        state.tracker.insert(key.clone());
                        state.buffer.mark_completed(key);
                    } else {
                        Self::drop_out_of_order(&mut state, &event, &key);
                    }
                }
            }

            self.check_triggers(&mut state, now)
        };

        if let Some((batch, reason)) = flush {
            self.spawn_flush(batch, reason);
        }
    }

    /// Insert-only: only terminal events produce writes.
    fn buffer_insert_only(&self, event: TracingEvent) {
        let TracingEvent::SpanEnded(span) = &event else {
            // Starts and updates are irrelevant to an append-only store.
            return;
        };
        let now = self.clock.now();
        let flush = {
            let mut state = self.shared.lock().unwrap();
            let key = SpanKey::of(span);
            state
                .buffer
                .push_insert_only(key, SpanCreateRecord::from_span(span), now);
            self.check_triggers(&mut state, now)
        };

        if let Some((batch, reason)) = flush {
            self.spawn_flush(batch, reason);
        }
    }

    fn drop_out_of_order(state: &mut BufferState, event: &TracingEvent, key: &SpanKey) {
        let count = state.buffer.record_out_of_order();
        LOGGER.warn(format!(
            "dropping out-of-order {} with no prior create (trace_id={}, span_id={}, out_of_order_count={})",
            event.kind(),
            key.trace_id,
            key.span_id,
            count
        ));
    }

    /// Evaluate flush triggers after a buffer mutation; on trigger, take the
    /// batch (cancelling the timer) so the caller can hand it to the retry
    /// loop outside the lock. Otherwise make sure the batch-window timer is
    /// running.
    fn check_triggers(
        &self,
        state: &mut BufferState,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Option<(SpanBatch, FlushReason)> {
        let size = state.buffer.total_size();
        let reason = if size >= self.max_buffer_size {
            Some(FlushReason::Overflow)
        } else if size >= self.max_batch_size {
            Some(FlushReason::Size)
        } else if size > 0 && self.batch_window_elapsed(state, now) {
            Some(FlushReason::Time)
        } else {
            None
        };

        match reason {
            Some(reason) => Some((Self::begin_flush(state), reason)),
            None => {
                self.ensure_timer(state);
                None
            }
        }
    }

    fn batch_window_elapsed(
        &self,
        state: &BufferState,
        now: chrono::DateTime<chrono::Utc>,
    ) -> bool {
        state
            .buffer
            .first_event_time()
            .map(|first| (now - first).num_milliseconds() >= self.max_batch_wait.as_millis() as i64)
            .unwrap_or(false)
    }

    /// Cancel the timer and take the buffer generation. Tracker pruning is
    /// deferred until the batch lands or is abandoned.
    fn begin_flush(state: &mut BufferState) -> SpanBatch {
        if let Some(timer) = state.flush_timer.take() {
            timer.abort();
        }
        state.generation += 1;
        state.buffer.take()
    }

    /// Schedule the single-shot batch-window timer for the generation that
    /// just received its first event.
    fn ensure_timer(&self, state: &mut BufferState) {
        if state.flush_timer.is_some() || state.buffer.is_empty() {
            return;
        }
        let Some(pipeline) = self.handle.upgrade() else {
            return;
        };
        let wait = self.max_batch_wait;
        let generation = state.generation;
        state.flush_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            pipeline.flush_timer_fired(generation);
        }));
    }

    /// The batch window expired: take whatever is buffered and flush it.
    fn flush_timer_fired(&self, generation: u64) {
        let batch = {
            let mut state = self.shared.lock().unwrap();
            if state.generation != generation {
                // a size or forced flush won the race; this timer is stale
                return;
            }
            // this very task holds the timer slot; drop the handle rather
            // than letting begin_flush abort the running task
            state.flush_timer = None;
            if state.buffer.is_empty() {
                return;
            }
            Self::begin_flush(&mut state)
        };
        self.spawn_flush(batch, FlushReason::Time);
    }

    /// Run the retry loop on a detached task so ingestion never waits on the
    /// store.
    fn spawn_flush(&self, batch: SpanBatch, reason: FlushReason) {
        let Some(pipeline) = self.handle.upgrade() else {
            return;
        };
        let handle = tokio::spawn(async move {
            pipeline.run_flush(batch, reason).await;
        });
        let mut tasks = self.flush_tasks.lock().unwrap();
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }

    /// Force-drain the buffer and await the retry chain to completion.
    pub async fn flush(&self) {
        let batch = {
            let mut state = self.shared.lock().unwrap();
            if state.buffer.is_empty() {
                if let Some(timer) = state.flush_timer.take() {
                    timer.abort();
                }
                return;
            }
            Self::begin_flush(&mut state)
        };
        self.run_flush(batch, FlushReason::Forced).await;
    }

    /// Final flush plus drain of every in-flight retry chain.
    pub async fn shutdown(&self) {
        self.flush().await;
        let tasks: Vec<JoinHandle<()>> = {
            let mut tasks = self.flush_tasks.lock().unwrap();
            tasks.drain(..).collect()
        };
        for task in tasks {
            let _ = task.await;
        }
    }

    async fn run_flush(&self, batch: SpanBatch, reason: FlushReason) {
        LOGGER.debug(format!(
            "flushing batch (reason={}, size={})",
            reason,
            batch.total_size()
        ));

        let mut attempt: u32 = 0;
        loop {
            match self.export_batch(&batch).await {
                Ok(()) => {
                    self.resolve_batch(&batch);
                    return;
                }
                Err(err) if attempt < self.retry.max_retries() => {
                    let delay = self.retry.backoff_delay(attempt);
                    LOGGER.warn(format!(
                        "Batch flush failed, retrying (attempt={}, next_retry_in_ms={}, error={})",
                        attempt + 1,
                        delay.as_millis(),
                        err
                    ));
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    LOGGER.error(format!(
                        "Batch flush failed after all retries, dropping batch (final_attempt={}, dropped_batch_size={}, error={})",
                        attempt + 1,
                        batch.total_size(),
                        err
                    ));
                    self.dropped_spans
                        .fetch_add(batch.total_size() as u64, Ordering::Relaxed);
                    // The data is lost either way; keeping tracker entries for
                    // completed spans would leak memory indefinitely.
                    self.resolve_batch(&batch);
                    return;
                }
            }
        }
    }

    /// One export attempt. Creates always go before updates of the same
    /// batch, and updates are replayed in per-span observation order.
    async fn export_batch(&self, batch: &SpanBatch) -> Result<(), StoreError> {
        match self.strategy.strategy {
            TracingStrategy::BatchWithUpdates => {
                if !batch.creates.is_empty() {
                    self.store.batch_create_spans(batch.creates.clone()).await?;
                }
                if !batch.updates.is_empty() {
                    self.store
                        .batch_update_spans(batch.sorted_updates())
                        .await?;
                }
            }
            TracingStrategy::InsertOnly => {
                if !batch.insert_only.is_empty() {
                    self.store
                        .batch_create_spans(batch.insert_only.clone())
                        .await?;
                }
            }
            // Realtime never buffers, so there is nothing to batch.
            TracingStrategy::Realtime => {}
        }
        Ok(())
    }

    /// The batch landed or was abandoned: completed spans are resolved and
    /// leave the tracker.
    fn resolve_batch(&self, batch: &SpanBatch) {
        let mut state = self.shared.lock().unwrap();
        for key in &batch.completed_spans {
            state.tracker.remove(key);
        }
    }

    // Read-only observers for callers that monitor exporter health.

    pub fn buffered_span_count(&self) -> usize {
        self.shared.lock().unwrap().buffer.total_size()
    }

    pub fn tracked_span_count(&self) -> usize {
        self.shared.lock().unwrap().tracker.len()
    }

    pub fn out_of_order_count(&self) -> u64 {
        self.shared.lock().unwrap().buffer.out_of_order_count()
    }

    pub fn dropped_span_count(&self) -> u64 {
        self.dropped_spans.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for SpanPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpanPipeline")
            .field("strategy", &self.strategy)
            .field("max_batch_size", &self.max_batch_size)
            .field("max_buffer_size", &self.max_buffer_size)
            .field("max_batch_wait", &self.max_batch_wait)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test::ManualClock;
    use crate::clock::SystemClock;
    use crate::span::{ExportedSpan, SpanType};
    use crate::strategy::StrategySource;
    use crate::testing::RecordingStore;
    use chrono::Utc;
    use std::time::Duration;

    fn pipeline_with(
        store: Arc<RecordingStore>,
        strategy: TracingStrategy,
        config: ExporterConfig,
        clock: Arc<dyn Clock>,
    ) -> Arc<SpanPipeline> {
        SpanPipeline::new(
            store,
            ResolvedStrategy {
                strategy,
                source: StrategySource::User,
            },
            &config,
            clock,
        )
    }

    fn span(trace_id: &str, span_id: &str) -> ExportedSpan {
        ExportedSpan::builder()
            .trace_id(trace_id)
            .span_id(span_id)
            .name(span_id)
            .span_type(SpanType::Generic)
            .started_at(Utc::now())
            .build()
    }

    fn event_span(trace_id: &str, span_id: &str) -> ExportedSpan {
        ExportedSpan::builder()
            .trace_id(trace_id)
            .span_id(span_id)
            .name(span_id)
            .span_type(SpanType::Generic)
            .started_at(Utc::now())
            .ended_at(Utc::now())
            .is_event(true)
            .build()
    }

    #[tokio::test]
    async fn test_size_trigger_flushes_in_insertion_order() {
        let store = Arc::new(RecordingStore::new());
        let pipeline = pipeline_with(
            store.clone(),
            TracingStrategy::BatchWithUpdates,
            ExporterConfig::builder().max_batch_size(2).build(),
            Arc::new(SystemClock),
        );

        pipeline
            .handle_event(TracingEvent::SpanStarted(span("t", "s1")))
            .await;
        pipeline
            .handle_event(TracingEvent::SpanStarted(span("t", "s2")))
            .await;
        pipeline.shutdown().await;

        let batches = store.batch_creates();
        assert_eq!(batches.len(), 1);
        let ids: Vec<&str> = batches[0].iter().map(|r| r.span_id.as_str()).collect();
        assert_eq!(ids, vec!["s1", "s2"]);
        assert_eq!(pipeline.buffered_span_count(), 0);
    }

    #[tokio::test]
    async fn test_out_of_order_update_is_dropped() {
        let store = Arc::new(RecordingStore::new());
        let pipeline = pipeline_with(
            store.clone(),
            TracingStrategy::BatchWithUpdates,
            ExporterConfig::default(),
            Arc::new(SystemClock),
        );

        pipeline
            .handle_event(TracingEvent::SpanUpdated(span("t", "s1")))
            .await;

        assert_eq!(pipeline.out_of_order_count(), 1);
        assert_eq!(pipeline.buffered_span_count(), 0);
        pipeline.shutdown().await;
        assert!(store.batch_creates().is_empty());
        assert!(store.batch_updates().is_empty());
    }

    #[tokio::test]
    async fn test_event_span_synthesizes_create() {
        let store = Arc::new(RecordingStore::new());
        let pipeline = pipeline_with(
            store.clone(),
            TracingStrategy::BatchWithUpdates,
            ExporterConfig::default(),
            Arc::new(SystemClock),
        );

        pipeline
            .handle_event(TracingEvent::SpanEnded(event_span("t", "e1")))
            .await;
        pipeline.shutdown().await;

        let batches = store.batch_creates();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0][0].span_id, "e1");
        assert!(batches[0][0].is_event);
        assert!(store.batch_updates().is_empty());
        assert_eq!(pipeline.out_of_order_count(), 0);
        // terminal event resolved on flush
        assert_eq!(pipeline.tracked_span_count(), 0);
    }

    #[tokio::test]
    async fn test_cross_batch_completion() {
        let store = Arc::new(RecordingStore::new());
        let pipeline = pipeline_with(
            store.clone(),
            TracingStrategy::BatchWithUpdates,
            ExporterConfig::builder().max_batch_size(10).build(),
            Arc::new(SystemClock),
        );

        pipeline
            .handle_event(TracingEvent::SpanStarted(span("t", "s1")))
            .await;
        pipeline
            .handle_event(TracingEvent::SpanStarted(span("t", "s2")))
            .await;
        pipeline.flush().await;

        let mut ended = span("t", "s1");
        ended.ended_at = Some(Utc::now());
        pipeline
            .handle_event(TracingEvent::SpanUpdated(span("t", "s1")))
            .await;
        pipeline
            .handle_event(TracingEvent::SpanEnded(ended))
            .await;
        pipeline
            .handle_event(TracingEvent::SpanStarted(span("t", "s3")))
            .await;
        pipeline.flush().await;

        let creates = store.batch_creates();
        assert_eq!(creates.len(), 2);
        assert_eq!(creates[0].len(), 2);
        assert_eq!(creates[1][0].span_id, "s3");

        let updates = store.batch_updates();
        assert_eq!(updates.len(), 1);
        let sequences: Vec<(&str, u64)> = updates[0]
            .iter()
            .map(|u| (u.span_id.as_str(), u.sequence_number))
            .collect();
        assert_eq!(sequences, vec![("s1", 1), ("s1", 2)]);

        // s1 completed and resolved; s2 and s3 still open
        assert_eq!(pipeline.tracked_span_count(), 2);
        pipeline.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_window_timer_flushes() {
        let store = Arc::new(RecordingStore::new());
        let pipeline = pipeline_with(
            store.clone(),
            TracingStrategy::BatchWithUpdates,
            ExporterConfig::builder()
                .max_batch_wait(Duration::from_millis(100))
                .build(),
            Arc::new(SystemClock),
        );

        pipeline
            .handle_event(TracingEvent::SpanStarted(span("t", "s1")))
            .await;
        assert_eq!(pipeline.buffered_span_count(), 1);

        tokio::time::sleep(Duration::from_millis(150)).await;
        pipeline.shutdown().await;

        assert_eq!(store.batch_creates().len(), 1);
        assert_eq!(pipeline.buffered_span_count(), 0);
    }

    #[tokio::test]
    async fn test_time_trigger_checked_on_ingest() {
        let store = Arc::new(RecordingStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let pipeline = pipeline_with(
            store.clone(),
            TracingStrategy::BatchWithUpdates,
            ExporterConfig::builder()
                .max_batch_wait(Duration::from_secs(60))
                .build(),
            clock.clone(),
        );

        pipeline
            .handle_event(TracingEvent::SpanStarted(span("t", "s1")))
            .await;
        clock.advance(Duration::from_secs(120));
        pipeline
            .handle_event(TracingEvent::SpanStarted(span("t", "s2")))
            .await;
        pipeline.shutdown().await;

        // the second event tripped the wall-clock trigger synchronously
        let batches = store.batch_creates();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 2);
    }

    #[tokio::test]
    async fn test_overflow_forces_emergency_flush() {
        let store = Arc::new(RecordingStore::new());
        let pipeline = pipeline_with(
            store.clone(),
            TracingStrategy::BatchWithUpdates,
            ExporterConfig::builder()
                .max_batch_size(10)
                .max_buffer_size(3)
                .build(),
            Arc::new(SystemClock),
        );

        for i in 0..3 {
            pipeline
                .handle_event(TracingEvent::SpanStarted(span("t", &format!("s{i}"))))
                .await;
        }
        pipeline.shutdown().await;

        // batch size was never reached, overflow drove the flush
        assert_eq!(store.batch_creates().len(), 1);
        assert_eq!(store.batch_creates()[0].len(), 3);
    }

    #[tokio::test]
    async fn test_insert_only_ignores_starts_and_updates() {
        let store = Arc::new(RecordingStore::new());
        let pipeline = pipeline_with(
            store.clone(),
            TracingStrategy::InsertOnly,
            ExporterConfig::default(),
            Arc::new(SystemClock),
        );

        pipeline
            .handle_event(TracingEvent::SpanStarted(span("t", "s1")))
            .await;
        pipeline
            .handle_event(TracingEvent::SpanUpdated(span("t", "s1")))
            .await;
        let mut ended = span("t", "s1");
        ended.ended_at = Some(Utc::now());
        pipeline.handle_event(TracingEvent::SpanEnded(ended)).await;
        pipeline.shutdown().await;

        let batches = store.batch_creates();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 1);
        assert!(store.batch_updates().is_empty());
        // insert-only spans never enter the tracker
        assert_eq!(pipeline.tracked_span_count(), 0);
    }

    #[tokio::test]
    async fn test_realtime_one_store_call_per_event() {
        let store = Arc::new(RecordingStore::new());
        let pipeline = pipeline_with(
            store.clone(),
            TracingStrategy::Realtime,
            ExporterConfig::default(),
            Arc::new(SystemClock),
        );

        pipeline
            .handle_event(TracingEvent::SpanStarted(span("t", "s1")))
            .await;
        assert_eq!(pipeline.tracked_span_count(), 1);
        pipeline
            .handle_event(TracingEvent::SpanUpdated(span("t", "s1")))
            .await;
        let mut ended = span("t", "s1");
        ended.ended_at = Some(Utc::now());
        pipeline.handle_event(TracingEvent::SpanEnded(ended)).await;

        assert_eq!(store.creates().len(), 1);
        assert_eq!(store.updates().len(), 2);
        assert!(store.batch_creates().is_empty());
        assert_eq!(pipeline.tracked_span_count(), 0);
    }

    #[tokio::test]
    async fn test_realtime_event_span_creates_once() {
        let store = Arc::new(RecordingStore::new());
        let pipeline = pipeline_with(
            store.clone(),
            TracingStrategy::Realtime,
            ExporterConfig::default(),
            Arc::new(SystemClock),
        );

        // only the terminal event is valid for an event span
        pipeline
            .handle_event(TracingEvent::SpanStarted(event_span("t", "e1")))
            .await;
        assert!(store.creates().is_empty());

        pipeline
            .handle_event(TracingEvent::SpanEnded(event_span("t", "e1")))
            .await;
        assert_eq!(store.creates().len(), 1);
        assert!(store.updates().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_then_success_keeps_tracker() {
        let store = Arc::new(RecordingStore::new());
        store.fail_next_batch_creates(1);
        let pipeline = pipeline_with(
            store.clone(),
            TracingStrategy::BatchWithUpdates,
            ExporterConfig::builder()
                .max_retries(2)
                .retry_delay(Duration::from_millis(100))
                .build(),
            Arc::new(SystemClock),
        );

        pipeline
            .handle_event(TracingEvent::SpanStarted(span("t", "s1")))
            .await;
        pipeline.flush().await;

        assert_eq!(store.batch_create_attempts(), 2);
        assert_eq!(store.batch_creates().len(), 1);
        // no terminal event was in the batch
        assert_eq!(pipeline.tracked_span_count(), 1);
        pipeline.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhaustion_drops_batch_and_prunes_completed() {
        let store = Arc::new(RecordingStore::new());
        store.fail_all_batch_creates();
        let pipeline = pipeline_with(
            store.clone(),
            TracingStrategy::BatchWithUpdates,
            ExporterConfig::builder()
                .max_retries(1)
                .retry_delay(Duration::from_millis(100))
                .build(),
            Arc::new(SystemClock),
        );

        pipeline
            .handle_event(TracingEvent::SpanStarted(span("t", "s1")))
            .await;
        pipeline
            .handle_event(TracingEvent::SpanEnded(event_span("t", "e1")))
            .await;
        pipeline.flush().await;

        // initial attempt plus one retry
        assert_eq!(store.batch_create_attempts(), 2);
        assert!(store.batch_creates().is_empty());
        assert_eq!(pipeline.dropped_span_count(), 2);
        // the completed event span was pruned; the open span stays tracked
        assert_eq!(pipeline.tracked_span_count(), 1);
        pipeline.shutdown().await;
    }

    #[tokio::test]
    async fn test_late_update_after_flush_is_accepted() {
        let store = Arc::new(RecordingStore::new());
        let pipeline = pipeline_with(
            store.clone(),
            TracingStrategy::BatchWithUpdates,
            ExporterConfig::default(),
            Arc::new(SystemClock),
        );

        pipeline
            .handle_event(TracingEvent::SpanStarted(span("t", "s1")))
            .await;
        pipeline.flush().await;

        // create landed in the previous batch; this is not out of order
        pipeline
            .handle_event(TracingEvent::SpanUpdated(span("t", "s1")))
            .await;
        assert_eq!(pipeline.out_of_order_count(), 0);
        assert_eq!(pipeline.buffered_span_count(), 1);
        pipeline.shutdown().await;

        assert_eq!(store.batch_updates().len(), 1);
    }
}
