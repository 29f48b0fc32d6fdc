//! Wall-clock abstraction.
//!
//! The flush timing decisions in [`crate::StoreSpanExporter`] depend on wall
//! time; injecting the clock keeps those decisions deterministic under test.

use chrono::{DateTime, Utc};
use std::fmt;

/// Source of wall-clock time for buffer timing decisions.
pub trait Clock: Send + Sync + fmt::Debug {
    /// The current wall-clock time.
    fn now(&self) -> DateTime<Utc>;
}

/// The default [`Clock`] backed by the system time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
