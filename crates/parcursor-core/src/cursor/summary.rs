//! How a drain ended.

use crate::config::ClaimStrategyKind;
use crate::error::SourceError;
use std::fmt;

/// Why the producer stopped reading the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The source reported no more rows
    Exhausted,
    /// The accept predicate rejected the row at this position
    PredicateRejected {
        /// Zero-based row position of the rejected row
        row: usize,
    },
    /// The cursor was aborted while draining
    Aborted,
    /// The source failed while reading the row at this position
    SourceFailed {
        /// Zero-based row position being read
        row: usize,
    },
    /// The cursor was closed before anything claimed from it
    NotStarted,
}

impl StopReason {
    /// Whether the source ran out or the predicate ended the stream.
    ///
    /// Both count as a normal end of stream for consumers.
    pub fn is_clean(&self) -> bool {
        matches!(
            self,
            StopReason::Exhausted | StopReason::PredicateRejected { .. } | StopReason::NotStarted
        )
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Exhausted => write!(f, "exhausted"),
            StopReason::PredicateRejected { row } => write!(f, "predicate rejected row {}", row),
            StopReason::Aborted => write!(f, "aborted"),
            StopReason::SourceFailed { row } => write!(f, "source failed at row {}", row),
            StopReason::NotStarted => write!(f, "not started"),
        }
    }
}

/// What the producer thread reports when it finishes.
#[derive(Debug, Clone)]
pub(crate) struct ProducerReport {
    pub stop: StopReason,
    /// Rows read from the source, including a rejected one
    pub rows_observed: usize,
    /// Records handed to consumers
    pub produced: usize,
    pub failure: Option<SourceError>,
}

impl ProducerReport {
    pub fn not_started() -> Self {
        Self {
            stop: StopReason::NotStarted,
            rows_observed: 0,
            produced: 0,
            failure: None,
        }
    }
}

/// Final accounting for one cursor, returned by `close`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainSummary {
    /// Strategy that served the claims
    pub strategy: ClaimStrategyKind,
    /// Why the producer stopped
    pub stop: StopReason,
    /// Rows read from the source, including a rejected one
    pub rows_observed: usize,
    /// Records accepted and made claimable
    pub produced: usize,
    /// Records handed to a claimer
    pub claimed: usize,
}

impl DrainSummary {
    /// Produced records nobody claimed (non-zero only after an abort).
    pub fn unclaimed(&self) -> usize {
        self.produced.saturating_sub(self.claimed)
    }
}
