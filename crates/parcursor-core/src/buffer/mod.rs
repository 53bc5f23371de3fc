//! Storage between the producer and the claiming consumers.
//!
//! [`RecordBuffer`] is the append-only, index-addressed store behind the
//! optimistic strategy. [`HandoffQueue`] is the blocking queue consumers park
//! on in the blocking strategy.

mod handoff;
mod record_buffer;

pub use handoff::HandoffQueue;
pub use record_buffer::RecordBuffer;
