//! Sequential sources that feed a concurrent cursor.
//!
//! A source is forward-only and single-caller: only the producer thread ever
//! touches it once a cursor owns it.

mod iter;
mod memory;
mod sequential;

pub use iter::IterSource;
pub use memory::MemorySource;
pub use sequential::SequentialSource;
