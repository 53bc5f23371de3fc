//! Parallel drain of a concurrent cursor.
//!
//! [`run_parallel`] maps every record and returns results in source order,
//! [`for_each`] runs an action per record, and [`load`] drains everything
//! into a [`Materialized`] set.

mod fan_out;
mod worker;

pub use fan_out::{for_each, load, run_parallel, FanOut, Materialized};
pub use worker::WorkerContext;
