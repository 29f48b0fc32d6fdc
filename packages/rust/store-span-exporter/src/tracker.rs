//! Process-lifetime span tracking across flush boundaries.

use crate::span::SpanKey;
use std::collections::HashSet;

/// The set of spans whose create record has been submitted (pending or
/// landed) and whose terminal batch has not yet been resolved.
///
/// Unlike the buffer, this set survives flushes: it is what lets the router
/// tell a legitimate late update (create landed in an earlier batch) from a
/// truly out-of-order event. Entries leave only once the batch containing
/// the span's terminal event either lands or is definitively dropped.
#[derive(Debug, Default)]
pub(crate) struct SpanTracker {
    spans: HashSet<SpanKey>,
}

impl SpanTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: SpanKey) {
        self.spans.insert(key);
    }

    pub fn remove(&mut self, key: &SpanKey) {
        self.spans.remove(key);
    }

    pub fn contains(&self, key: &SpanKey) -> bool {
        self.spans.contains(key)
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_contains_remove() {
        let mut tracker = SpanTracker::new();
        let key = SpanKey::new("t", "s1");

        tracker.insert(key.clone());
        assert!(tracker.contains(&key));
        assert_eq!(tracker.len(), 1);

        // idempotent
        tracker.insert(key.clone());
        assert_eq!(tracker.len(), 1);

        tracker.remove(&key);
        assert!(!tracker.contains(&key));
        assert_eq!(tracker.len(), 0);
    }
}
