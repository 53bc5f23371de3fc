//! Optimistic claims over a shared append-only buffer.
//!
//! Claimers race on one atomic claim index. A claimer only attempts the
//! compare-and-swap after checking that the candidate index is below the
//! published buffer length, so the index never passes the end of the buffer
//! and no claim ever has to be rolled back. Losing a race means another
//! claimer made progress; the loser simply reloads and tries again.

use super::backoff::Backoff;
use super::producer::{Producer, RecordSink};
use super::strategy::ClaimStrategy;
use super::summary::ProducerReport;
use crate::buffer::RecordBuffer;
use crate::config::{BackoffConfig, ClaimStrategyKind};
use crate::error::{panic_message, Error, Result};
use crate::metrics::DrainMetrics;
use crate::record::Record;
use parking_lot::Mutex;
use std::hint;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Appends produced records to the buffer; completes it when dropped.
struct BufferSink {
    buffer: Arc<RecordBuffer>,
}

impl RecordSink for BufferSink {
    fn push(&mut self, record: Record) -> bool {
        self.buffer.append(Arc::new(record));
        true
    }
}

impl Drop for BufferSink {
    fn drop(&mut self) {
        self.buffer.mark_complete();
    }
}

pub(crate) struct OptimisticClaims {
    buffer: Arc<RecordBuffer>,
    /// Next index to hand out; never exceeds the published buffer length
    next_claim: AtomicUsize,
    abort: Arc<AtomicBool>,
    backoff: BackoffConfig,
    metrics: Arc<DrainMetrics>,
    producer: Mutex<Option<JoinHandle<ProducerReport>>>,
}

impl OptimisticClaims {
    pub fn new(backoff: BackoffConfig, abort: Arc<AtomicBool>, metrics: Arc<DrainMetrics>) -> Self {
        Self {
            buffer: Arc::new(RecordBuffer::new()),
            next_claim: AtomicUsize::new(0),
            abort,
            backoff,
            metrics,
            producer: Mutex::new(None),
        }
    }
}

impl ClaimStrategy for OptimisticClaims {
    fn kind(&self) -> ClaimStrategyKind {
        ClaimStrategyKind::Optimistic
    }

    fn start(&self, producer: Producer) -> Result<()> {
        let sink = BufferSink {
            buffer: Arc::clone(&self.buffer),
        };
        // A failed spawn drops the sink, which completes the buffer.
        let handle = producer.spawn(sink)?;
        *self.producer.lock() = Some(handle);
        Ok(())
    }

    fn claim(&self) -> Option<Arc<Record>> {
        let mut backoff = Backoff::new(&self.backoff);

        loop {
            if self.abort.load(Ordering::Acquire) {
                return None;
            }

            let candidate = self.next_claim.load(Ordering::Acquire);
            if candidate < self.buffer.len() {
                match self.next_claim.compare_exchange_weak(
                    candidate,
                    candidate + 1,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    // Published indexes are always present.
                    Ok(_) => return self.buffer.get(candidate),
                    Err(_) => {
                        self.metrics.record_claim_retry();
                        hint::spin_loop();
                        continue;
                    }
                }
            }

            // Completion is stored after the last append, so the length
            // read after seeing it is final.
            if self.buffer.is_complete() {
                if self.next_claim.load(Ordering::Acquire) >= self.buffer.len() {
                    return None;
                }
                continue;
            }

            if backoff.snooze() {
                self.metrics.record_backoff_sleep();
            }
        }
    }

    fn is_complete(&self) -> bool {
        self.buffer.is_complete()
    }

    fn abort(&self) {
        // Claimers poll the abort flag; nothing is parked.
    }

    fn join(&self) -> Result<ProducerReport> {
        let handle = self.producer.lock().take();
        match handle {
            Some(handle) => handle
                .join()
                .map_err(|p| Error::ProducerPanicked(panic_message(p.as_ref()))),
            None => Ok(ProducerReport::not_started()),
        }
    }

    fn records(&self) -> Vec<Arc<Record>> {
        self.buffer.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::summary::StopReason;
    use crate::source::MemorySource;
    use std::collections::HashSet;

    fn started(rows: usize) -> OptimisticClaims {
        let abort = Arc::new(AtomicBool::new(false));
        let metrics = Arc::new(DrainMetrics::new());
        let claims = OptimisticClaims::new(
            BackoffConfig::default(),
            Arc::clone(&abort),
            Arc::clone(&metrics),
        );
        let producer = Producer::new(
            Box::new(MemorySource::sequence(rows)),
            None,
            abort,
            metrics,
        );
        claims.start(producer).unwrap();
        claims
    }

    #[test]
    fn test_single_claimer_gets_source_order() {
        let claims = started(50);
        let mut indexes = Vec::new();
        while let Some(record) = claims.claim() {
            indexes.push(record.index());
        }
        assert_eq!(indexes, (0..50).collect::<Vec<_>>());
        assert!(claims.is_complete());

        let report = claims.join().unwrap();
        assert_eq!(report.stop, StopReason::Exhausted);
        assert_eq!(report.produced, 50);
    }

    #[test]
    fn test_racing_claimers_partition_indexes() {
        let claims = started(5000);

        let per_thread: Vec<Vec<usize>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|_| {
                    scope.spawn(|| {
                        let mut mine = Vec::new();
                        while let Some(record) = claims.claim() {
                            mine.push(record.index());
                        }
                        mine
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let mut seen = HashSet::new();
        for index in per_thread.into_iter().flatten() {
            assert!(seen.insert(index), "index {} claimed twice", index);
        }
        assert_eq!(seen.len(), 5000);
        assert!(seen.iter().all(|i| *i < 5000));
    }

    #[test]
    fn test_claim_after_end_keeps_returning_none() {
        let claims = started(1);
        assert!(claims.claim().is_some());
        assert!(claims.claim().is_none());
        assert!(claims.claim().is_none());
    }

    #[test]
    fn test_abort_flag_ends_claims() {
        let abort = Arc::new(AtomicBool::new(false));
        let claims = OptimisticClaims::new(
            BackoffConfig::default(),
            Arc::clone(&abort),
            Arc::new(DrainMetrics::new()),
        );
        // Never started: only the abort flag can release the claimer.
        abort.store(true, Ordering::Release);
        assert!(claims.claim().is_none());
        assert_eq!(claims.join().unwrap().stop, StopReason::NotStarted);
    }

    #[test]
    fn test_records_snapshot() {
        let claims = started(10);
        while claims.claim().is_some() {}
        claims.join().unwrap();
        assert_eq!(claims.records().len(), 10);
    }
}
