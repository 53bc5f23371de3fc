//! Per-caller record bindings.
//!
//! Each successful claim binds the record to the claimer's identity, so
//! accessors called later by that same caller resolve without passing the
//! record around. A caller that sees end of stream loses its binding.

use crate::record::Record;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};

/// Identity a claimed record is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallerId {
    /// An OS thread claiming on its own behalf
    Thread(ThreadId),
    /// A fan-out worker, by worker number
    Worker(usize),
}

impl CallerId {
    /// Identity of the calling thread.
    pub fn current_thread() -> Self {
        CallerId::Thread(thread::current().id())
    }
}

impl fmt::Display for CallerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallerId::Thread(id) => write!(f, "thread {:?}", id),
            CallerId::Worker(n) => write!(f, "worker {}", n),
        }
    }
}

/// Concurrent map from caller to its current record.
#[derive(Debug, Default)]
pub(crate) struct BindingStore {
    bindings: DashMap<CallerId, Arc<Record>>,
}

impl BindingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `record` to `caller`, replacing any previous binding.
    pub fn bind(&self, caller: CallerId, record: Arc<Record>) {
        self.bindings.insert(caller, record);
    }

    /// Drop the binding for `caller`, if any.
    pub fn release(&self, caller: &CallerId) {
        self.bindings.remove(caller);
    }

    /// Current record for `caller`.
    pub fn get(&self, caller: &CallerId) -> Option<Arc<Record>> {
        self.bindings.get(caller).map(|r| Arc::clone(r.value()))
    }
}
