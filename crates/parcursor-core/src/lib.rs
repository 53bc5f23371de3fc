//! Parcursor Core - parallel draining of single-pass sequential sources
//!
//! A forward-only source (a database result set, a file scanner) can only be
//! read by one caller at a time. This library drains such a source on one
//! producer thread and lets any number of worker threads claim its records
//! concurrently:
//!
//! - Every accepted record is claimed exactly once, across all threads
//! - Two claim strategies: optimistic (atomic claim index) and blocking
//!   (two-stage hand-off queue)
//! - Per-caller bindings for typed field access without passing records
//! - Fan-out/fan-in with results returned in source order
//!
//! ```
//! use parcursor_core::{make_concurrent, run_parallel, MemorySource, Tuple};
//!
//! let cursor = make_concurrent(MemorySource::sequence(100));
//! let ids = run_parallel(&cursor, |record| record.get::<i64>("id"), Some(4)).unwrap();
//! assert_eq!(ids, (0..100).collect::<Vec<_>>());
//! ```

pub mod buffer;
pub mod config;
pub mod cursor;
pub mod engine;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod record;
pub mod source;
pub mod tuple;
pub mod value;

// Re-export commonly used types
pub use config::{ClaimStrategyKind, CursorConfig};
pub use cursor::{
    make_concurrent, make_concurrent_while, CallerId, ConcurrentCursor, CursorBuilder,
    DrainSummary, StopReason,
};
pub use engine::{for_each, load, run_parallel, FanOut, Materialized, WorkerContext};
pub use error::{AccessError, Error, Result, SourceError};
pub use logging::init_logging;
pub use metrics::DrainMetrics;
pub use record::{Record, Schema};
pub use source::{IterSource, MemorySource, SequentialSource};
pub use tuple::Tuple;
pub use value::{FromValue, Value};
