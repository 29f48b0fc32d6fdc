//! In-memory batch state for the buffered write strategies.
//!
//! A [`TraceBuffer`] accumulates one *generation* of records between flushes.
//! The flusher takes the whole generation at once with [`TraceBuffer::take`],
//! which resets the live buffer so new events land in a fresh generation
//! while the taken [`SpanBatch`] is in flight.
//!
//! Per-span sequence numbers are assigned at insert time and start over with
//! each generation; the flusher's stable sort restores per-span observation
//! order inside a batch.

use crate::span::SpanKey;
use crate::store::{SequencedSpanUpdate, SpanCreateRecord, SpanUpdateRecord};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::mem;

/// One generation of buffered writes.
#[derive(Debug, Default)]
pub(crate) struct TraceBuffer {
    creates: Vec<SpanCreateRecord>,
    updates: Vec<SequencedSpanUpdate>,
    insert_only: Vec<SpanCreateRecord>,
    seen_spans: HashSet<SpanKey>,
    span_sequences: HashMap<SpanKey, u64>,
    completed_spans: HashSet<SpanKey>,
    out_of_order_count: u64,
    first_event_time: Option<DateTime<Utc>>,
    total_size: usize,
}

impl TraceBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a create for `key` and mark the span as seen in this batch.
    pub fn push_create(&mut self, key: SpanKey, record: SpanCreateRecord, now: DateTime<Utc>) {
        self.note_event(now);
        self.creates.push(record);
        self.seen_spans.insert(key);
        self.total_size += 1;
    }

    /// Append an update for `key` with the next sequence number for the span.
    pub fn push_update(&mut self, key: &SpanKey, updates: SpanUpdateRecord, now: DateTime<Utc>) {
        self.note_event(now);
        let sequence_number = self.next_sequence(key);
        self.updates.push(SequencedSpanUpdate {
            trace_id: key.trace_id.clone(),
            span_id: key.span_id.clone(),
            sequence_number,
            updates,
        });
        self.total_size += 1;
    }

    /// Append an insert-only create for a completed span.
    pub fn push_insert_only(&mut self, key: SpanKey, record: SpanCreateRecord, now: DateTime<Utc>) {
        self.note_event(now);
        self.insert_only.push(record);
        self.seen_spans.insert(key.clone());
        self.completed_spans.insert(key);
        self.total_size += 1;
    }

    /// Record that `key` received its terminal event in this batch.
    pub fn mark_completed(&mut self, key: SpanKey) {
        self.completed_spans.insert(key);
    }

    /// Count one dropped out-of-order event.
    pub fn record_out_of_order(&mut self) -> u64 {
        self.out_of_order_count += 1;
        self.out_of_order_count
    }

    pub fn out_of_order_count(&self) -> u64 {
        self.out_of_order_count
    }

    pub fn total_size(&self) -> usize {
        debug_assert_eq!(
            self.total_size,
            self.creates.len() + self.updates.len() + self.insert_only.len()
        );
        self.total_size
    }

    pub fn is_empty(&self) -> bool {
        self.total_size == 0
    }

    pub fn first_event_time(&self) -> Option<DateTime<Utc>> {
        self.first_event_time
    }

    /// Take the current generation as an immutable batch and reset the live
    /// buffer. Sequence counters start over with the next generation.
    pub fn take(&mut self) -> SpanBatch {
        let batch = SpanBatch {
            creates: mem::take(&mut self.creates),
            updates: mem::take(&mut self.updates),
            insert_only: mem::take(&mut self.insert_only),
            completed_spans: mem::take(&mut self.completed_spans),
        };
        self.seen_spans.clear();
        self.span_sequences.clear();
        self.out_of_order_count = 0;
        self.first_event_time = None;
        self.total_size = 0;
        batch
    }

    fn next_sequence(&mut self, key: &SpanKey) -> u64 {
        let counter = self.span_sequences.entry(key.clone()).or_insert(0);
        *counter += 1;
        *counter
    }

    fn note_event(&mut self, now: DateTime<Utc>) {
        if self.total_size == 0 {
            self.first_event_time = Some(now);
        }
    }
}

/// The immutable snapshot handed to the retry loop.
#[derive(Debug)]
pub(crate) struct SpanBatch {
    pub creates: Vec<SpanCreateRecord>,
    pub updates: Vec<SequencedSpanUpdate>,
    pub insert_only: Vec<SpanCreateRecord>,
    pub completed_spans: HashSet<SpanKey>,
}

impl SpanBatch {
    pub fn total_size(&self) -> usize {
        self.creates.len() + self.updates.len() + self.insert_only.len()
    }

    /// Updates in store-apply order: grouped per span, ascending sequence.
    pub fn sorted_updates(&self) -> Vec<SequencedSpanUpdate> {
        let mut updates = self.updates.clone();
        updates.sort_by(|a, b| {
            (&a.trace_id, &a.span_id, a.sequence_number)
                .cmp(&(&b.trace_id, &b.span_id, b.sequence_number))
        });
        updates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::{ExportedSpan, SpanType};
    use crate::store::SpanCreateRecord;

    fn test_span(trace_id: &str, span_id: &str) -> ExportedSpan {
        ExportedSpan::builder()
            .trace_id(trace_id)
            .span_id(span_id)
            .name(span_id)
            .span_type(SpanType::Generic)
            .started_at(Utc::now())
            .build()
    }

    fn create_record(trace_id: &str, span_id: &str) -> (SpanKey, SpanCreateRecord) {
        let span = test_span(trace_id, span_id);
        (SpanKey::of(&span), SpanCreateRecord::from_span(&span))
    }

    #[test]
    fn test_total_size_tracks_all_three_lists() {
        let mut buffer = TraceBuffer::new();
        let now = Utc::now();

        let (k1, r1) = create_record("t", "s1");
        buffer.push_create(k1.clone(), r1, now);
        buffer.push_update(&k1, SpanUpdateRecord::default(), now);
        let (k2, r2) = create_record("t", "e1");
        buffer.push_insert_only(k2, r2, now);

        assert_eq!(buffer.total_size(), 3);
        assert!(!buffer.is_empty());
    }

    #[test]
    fn test_sequences_are_monotone_per_span_and_reset_on_take() {
        let mut buffer = TraceBuffer::new();
        let now = Utc::now();
        let (k1, r1) = create_record("t", "s1");
        let (k2, r2) = create_record("t", "s2");

        buffer.push_create(k1.clone(), r1, now);
        buffer.push_create(k2.clone(), r2, now);
        buffer.push_update(&k1, SpanUpdateRecord::default(), now);
        buffer.push_update(&k2, SpanUpdateRecord::default(), now);
        buffer.push_update(&k1, SpanUpdateRecord::default(), now);

        let sequences: Vec<(String, u64)> = buffer
            .take()
            .updates
            .iter()
            .map(|u| (u.span_id.clone(), u.sequence_number))
            .collect();
        assert_eq!(
            sequences,
            vec![
                ("s1".to_owned(), 1),
                ("s2".to_owned(), 1),
                ("s1".to_owned(), 2)
            ]
        );

        // fresh generation starts over at 1
        buffer.push_update(&k1, SpanUpdateRecord::default(), now);
        assert_eq!(buffer.take().updates[0].sequence_number, 1);
    }

    #[test]
    fn test_first_event_time_set_once_per_generation() {
        let mut buffer = TraceBuffer::new();
        let first = Utc::now();
        let later = first + chrono::Duration::seconds(5);

        let (k1, r1) = create_record("t", "s1");
        buffer.push_create(k1.clone(), r1, first);
        buffer.push_update(&k1, SpanUpdateRecord::default(), later);
        assert_eq!(buffer.first_event_time(), Some(first));

        buffer.take();
        assert_eq!(buffer.first_event_time(), None);

        buffer.push_update(&k1, SpanUpdateRecord::default(), later);
        assert_eq!(buffer.first_event_time(), Some(later));
    }

    #[test]
    fn test_take_resets_everything() {
        let mut buffer = TraceBuffer::new();
        let now = Utc::now();
        let (k1, r1) = create_record("t", "s1");

        buffer.push_create(k1.clone(), r1, now);
        buffer.mark_completed(k1.clone());
        buffer.record_out_of_order();

        let batch = buffer.take();
        assert_eq!(batch.total_size(), 1);
        assert!(batch.completed_spans.contains(&k1));

        assert!(buffer.is_empty());
        assert_eq!(buffer.out_of_order_count(), 0);
        assert_eq!(buffer.first_event_time(), None);
    }

    #[test]
    fn test_sorted_updates_orders_by_span_then_sequence() {
        let mut buffer = TraceBuffer::new();
        let now = Utc::now();
        let (k1, r1) = create_record("t", "s1");
        let (k2, r2) = create_record("t", "s2");

        buffer.push_create(k1.clone(), r1, now);
        buffer.push_create(k2.clone(), r2, now);
        buffer.push_update(&k2, SpanUpdateRecord::default(), now);
        buffer.push_update(&k1, SpanUpdateRecord::default(), now);
        buffer.push_update(&k2, SpanUpdateRecord::default(), now);
        buffer.push_update(&k1, SpanUpdateRecord::default(), now);

        let sorted: Vec<(String, u64)> = buffer
            .take()
            .sorted_updates()
            .iter()
            .map(|u| (u.span_id.clone(), u.sequence_number))
            .collect();
        assert_eq!(
            sorted,
            vec![
                ("s1".to_owned(), 1),
                ("s1".to_owned(), 2),
                ("s2".to_owned(), 1),
                ("s2".to_owned(), 2)
            ]
        );
    }
}
