//! What a fan-out worker sees of the cursor.

use crate::cursor::{CallerId, ConcurrentCursor};
use crate::error::AccessError;
use crate::record::Record;
use crate::tuple::Tuple;
use crate::value::FromValue;
use std::sync::Arc;

/// Handle given to each fan-out worker.
///
/// Bound to the worker's own thread, so `current` and `get` resolve to the
/// record this worker claimed last. The thread-bound accessors on
/// [`ConcurrentCursor`] see the same binding.
pub struct WorkerContext<'c> {
    cursor: &'c ConcurrentCursor,
    worker: usize,
    caller: CallerId,
}

impl<'c> WorkerContext<'c> {
    /// Context for the calling thread. Must be created on the worker thread.
    pub(crate) fn new(cursor: &'c ConcurrentCursor, worker: usize) -> Self {
        Self {
            cursor,
            worker,
            caller: CallerId::current_thread(),
        }
    }

    /// Zero-based worker number.
    pub fn worker(&self) -> usize {
        self.worker
    }

    /// Identity the worker's claims are bound to.
    pub fn caller(&self) -> CallerId {
        self.caller
    }

    /// The cursor being drained.
    pub fn cursor(&self) -> &'c ConcurrentCursor {
        self.cursor
    }

    pub(crate) fn claim(&self) -> Option<Arc<Record>> {
        self.cursor.claim_next_as(self.caller)
    }

    /// Record this worker is processing.
    pub fn current(&self) -> Result<Arc<Record>, AccessError> {
        self.cursor.current_for(&self.caller)
    }

    /// Typed field of the record this worker is processing.
    pub fn get<T: FromValue>(&self, name: &str) -> Result<T, AccessError> {
        self.current()?.get(name)
    }
}
