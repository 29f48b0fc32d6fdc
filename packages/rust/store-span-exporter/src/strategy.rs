//! Write-strategy negotiation between the exporter and its store.
//!
//! A store advertises which write patterns it supports and which one it
//! prefers through a [`TracingStrategyHint`]. The user may pin a strategy in
//! [`ExporterConfig`]; leaving it unset means "auto", i.e. take the store's
//! preference.
//!
//! # Strategies
//!
//! - `Realtime`: one store call per event, no buffering
//!   - Lowest latency from event to durable record
//!   - Highest per-event overhead; best for low volume or debugging
//!
//! - `BatchWithUpdates`: buffered creates plus ordered updates
//!   - Creates are written before updates of the same batch
//!   - Per-span update order is preserved through sequence numbers
//!   - The default for stores that can apply partial updates
//!
//! - `InsertOnly`: one create per completed span
//!   - Start and update events are discarded
//!   - Best for append-only backends
//!
//! [`ExporterConfig`]: crate::ExporterConfig

use crate::logger::Logger;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Module-specific logger
static LOGGER: Logger = Logger::const_new("strategy");

/// How span writes are delivered to the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TracingStrategy {
    /// One store call per event.
    Realtime,
    /// Buffered creates plus ordered updates.
    BatchWithUpdates,
    /// One create per completed span; starts and updates are discarded.
    InsertOnly,
}

impl fmt::Display for TracingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TracingStrategy::Realtime => write!(f, "realtime"),
            TracingStrategy::BatchWithUpdates => write!(f, "batch-with-updates"),
            TracingStrategy::InsertOnly => write!(f, "insert-only"),
        }
    }
}

/// A store's advertisement of the strategies it can service.
#[derive(Clone, Debug, PartialEq)]
pub struct TracingStrategyHint {
    /// The strategy the store would like to receive.
    pub preferred: TracingStrategy,
    /// Every strategy the store can service.
    pub supported: Vec<TracingStrategy>,
}

/// Where the resolved strategy came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StrategySource {
    /// The user named the strategy and the store supports it.
    User,
    /// The store's preference, either because the user chose auto or
    /// because their choice was not supported.
    Auto,
}

/// Outcome of strategy negotiation, fixed once at init.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedStrategy {
    pub strategy: TracingStrategy,
    pub source: StrategySource,
}

impl TracingStrategy {
    /// Resolve the effective strategy from the user's choice and the store's
    /// hint.
    ///
    /// `None` means auto: take the store's preference. A named strategy is
    /// honored when the store supports it; otherwise a warning is logged and
    /// the store's preference wins.
    pub fn resolve(
        requested: Option<TracingStrategy>,
        hint: &TracingStrategyHint,
    ) -> ResolvedStrategy {
        let result = match requested {
            None => ResolvedStrategy {
                strategy: hint.preferred,
                source: StrategySource::Auto,
            },
            Some(strategy) if hint.supported.contains(&strategy) => ResolvedStrategy {
                strategy,
                source: StrategySource::User,
            },
            Some(strategy) => {
                LOGGER.warn(format!(
                    "configured strategy {} is not supported by the store (supported: [{}]), falling back to {}",
                    strategy,
                    hint.supported
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(", "),
                    hint.preferred
                ));
                ResolvedStrategy {
                    strategy: hint.preferred,
                    source: StrategySource::Auto,
                }
            }
        };

        LOGGER.debug(format!(
            "using {} write strategy (source={:?})",
            result.strategy, result.source
        ));

        result
    }
}
