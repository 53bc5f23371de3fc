//! Append-only record buffer with published length.
//!
//! Only the producer appends. Readers first load the published length with
//! acquire ordering, then fetch any index below it; every record below a
//! published length is fully constructed.

use crate::record::Record;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Ordered, append-only store of produced records.
#[derive(Debug, Default)]
pub struct RecordBuffer {
    /// Records in source order (indexed by `Record::index`)
    records: RwLock<Vec<Arc<Record>>>,

    /// Number of records visible to readers
    published: AtomicUsize,

    /// Set once the producer will never append again
    complete: AtomicBool,
}

impl RecordBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the next record and publish the new length.
    pub fn append(&self, record: Arc<Record>) {
        let mut records = self.records.write();
        debug_assert_eq!(record.index(), records.len());
        records.push(record);
        self.published.store(records.len(), Ordering::Release);
    }

    /// Published length.
    pub fn len(&self) -> usize {
        self.published.load(Ordering::Acquire)
    }

    /// Check if nothing has been published yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record at `index`, if published.
    pub fn get(&self, index: usize) -> Option<Arc<Record>> {
        if index >= self.len() {
            return None;
        }
        self.records.read().get(index).cloned()
    }

    /// Mark the buffer complete. Must follow the last `append`.
    pub fn mark_complete(&self) {
        self.complete.store(true, Ordering::Release);
    }

    /// Whether the producer has finished appending.
    pub fn is_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }

    /// Copy of every published record, in source order.
    pub fn snapshot(&self) -> Vec<Arc<Record>> {
        let len = self.len();
        let records = self.records.read();
        records[..len].to_vec()
    }
}
