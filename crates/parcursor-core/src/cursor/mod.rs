//! Concurrent cursor over a sequential source.
//!
//! A single producer thread drains the source. Consumers claim records
//! through one of two strategies:
//!
//! - **Optimistic**: the producer appends to a shared buffer; claimers race
//!   on an atomic claim index and back off while the producer is behind.
//! - **Blocking**: records pass through a two-stage queue; claimers park
//!   until a record is handed over or the stream ends.
//!
//! Both guarantee that the set of claimed indexes is exactly
//! `0..produced`, each claimed once.

mod backoff;
mod binding;
mod blocking;
mod concurrent;
mod optimistic;
mod producer;
mod strategy;
mod summary;

pub use binding::CallerId;
pub use concurrent::{make_concurrent, make_concurrent_while, Claims, ConcurrentCursor, CursorBuilder};
pub use producer::AcceptPredicate;
pub use summary::{DrainSummary, StopReason};
