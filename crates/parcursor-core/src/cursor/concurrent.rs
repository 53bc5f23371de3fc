//! The shared, thread-safe cursor.

use super::binding::{BindingStore, CallerId};
use super::blocking::BlockingClaims;
use super::optimistic::OptimisticClaims;
use super::producer::{AcceptPredicate, Producer};
use super::strategy::ClaimStrategy;
use super::summary::{DrainSummary, ProducerReport};
use crate::config::{ClaimStrategyKind, CursorConfig};
use crate::error::{AccessError, Error, Result};
use crate::metrics::DrainMetrics;
use crate::record::Record;
use crate::source::SequentialSource;
use crate::tuple::Tuple;
use crate::value::FromValue;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// How the background threads ended, cached by the first `close`.
#[derive(Debug, Clone)]
enum Settled {
    Report(ProducerReport),
    SpawnFailed(String),
    Panicked(String),
}

/// A sequential source shared by any number of claiming threads.
///
/// The producer thread starts on the first claim. Every record the producer
/// accepts is handed to exactly one claimer; once the stream ends, every
/// claim returns `None`.
pub struct ConcurrentCursor {
    strategy: Box<dyn ClaimStrategy>,
    pending: Mutex<Option<Producer>>,
    started: AtomicBool,
    abort: Arc<AtomicBool>,
    bindings: BindingStore,
    claimed: AtomicUsize,
    config: CursorConfig,
    metrics: Arc<DrainMetrics>,
    start_error: Mutex<Option<String>>,
    settled: Mutex<Option<Settled>>,
}

/// Builder for [`ConcurrentCursor`].
pub struct CursorBuilder {
    source: Box<dyn SequentialSource>,
    accept: Option<AcceptPredicate>,
    config: CursorConfig,
    metrics: Option<Arc<DrainMetrics>>,
}

impl CursorBuilder {
    /// Start building a cursor over `source`.
    pub fn new(source: impl SequentialSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            accept: None,
            config: CursorConfig::default(),
            metrics: None,
        }
    }

    /// Stop the stream at the first row the predicate rejects.
    pub fn accept_while<P>(mut self, predicate: P) -> Self
    where
        P: FnMut(&Record) -> bool + Send + 'static,
    {
        self.accept = Some(Box::new(predicate));
        self
    }

    /// Use the given claim strategy.
    pub fn strategy(mut self, strategy: ClaimStrategyKind) -> Self {
        self.config.strategy = strategy;
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: CursorConfig) -> Self {
        self.config = config;
        self
    }

    /// Record into a shared metrics instance.
    pub fn metrics(mut self, metrics: Arc<DrainMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Validate the configuration and build the cursor. Nothing is read
    /// from the source until the first claim.
    pub fn build(self) -> Result<ConcurrentCursor> {
        self.config.validate()?;
        Ok(ConcurrentCursor::from_parts(
            self.source,
            self.accept,
            self.config,
            self.metrics.unwrap_or_default(),
        ))
    }
}

/// Share `source` across threads with the default configuration.
pub fn make_concurrent(source: impl SequentialSource + 'static) -> ConcurrentCursor {
    ConcurrentCursor::from_parts(
        Box::new(source),
        None,
        CursorConfig::default(),
        Arc::default(),
    )
}

/// Share `source` across threads, ending the stream at the first row
/// `predicate` rejects.
pub fn make_concurrent_while<P>(
    source: impl SequentialSource + 'static,
    predicate: P,
) -> ConcurrentCursor
where
    P: FnMut(&Record) -> bool + Send + 'static,
{
    ConcurrentCursor::from_parts(
        Box::new(source),
        Some(Box::new(predicate)),
        CursorConfig::default(),
        Arc::default(),
    )
}

impl ConcurrentCursor {
    /// Start building a cursor over `source`.
    pub fn builder(source: impl SequentialSource + 'static) -> CursorBuilder {
        CursorBuilder::new(source)
    }

    fn from_parts(
        source: Box<dyn SequentialSource>,
        accept: Option<AcceptPredicate>,
        config: CursorConfig,
        metrics: Arc<DrainMetrics>,
    ) -> Self {
        let abort = Arc::new(AtomicBool::new(false));
        let strategy: Box<dyn ClaimStrategy> = match config.strategy {
            ClaimStrategyKind::Optimistic => Box::new(OptimisticClaims::new(
                config.backoff.clone(),
                Arc::clone(&abort),
                Arc::clone(&metrics),
            )),
            ClaimStrategyKind::Blocking => {
                Box::new(BlockingClaims::new(&config.handoff, Arc::clone(&abort)))
            }
        };
        let producer = Producer::new(source, accept, Arc::clone(&abort), Arc::clone(&metrics));

        Self {
            strategy,
            pending: Mutex::new(Some(producer)),
            started: AtomicBool::new(false),
            abort,
            bindings: BindingStore::new(),
            claimed: AtomicUsize::new(0),
            config,
            metrics,
            start_error: Mutex::new(None),
            settled: Mutex::new(None),
        }
    }

    /// Spawn the producer exactly once.
    ///
    /// The pending producer is taken and started under one lock, so a
    /// concurrent `close` either releases it unread or sees it running.
    fn ensure_started(&self) {
        if self.started.load(Ordering::Acquire) {
            return;
        }
        let mut pending = self.pending.lock();
        let Some(producer) = pending.take() else {
            return;
        };
        self.started.store(true, Ordering::Release);

        info!(strategy = self.strategy.kind().as_str(), "Starting producer");
        if let Err(e) = self.strategy.start(producer) {
            error!(error = %e, "Failed to start producer");
            *self.start_error.lock() = Some(e.to_string());
            self.abort.store(true, Ordering::Release);
            self.strategy.abort();
        }
    }

    /// Claim the next record for the calling thread.
    ///
    /// Returns `None` once the stream has ended (exhausted, rejected by the
    /// accept predicate, failed, or aborted).
    pub fn claim_next(&self) -> Option<Arc<Record>> {
        self.claim_next_as(CallerId::current_thread())
    }

    /// Claim the next record and bind it to `caller`.
    pub fn claim_next_as(&self, caller: CallerId) -> Option<Arc<Record>> {
        self.ensure_started();

        match self.strategy.claim() {
            Some(record) => {
                self.bindings.bind(caller, Arc::clone(&record));
                self.claimed.fetch_add(1, Ordering::Relaxed);
                self.metrics.record_claim();
                Some(record)
            }
            None => {
                self.bindings.release(&caller);
                None
            }
        }
    }

    /// Iterate over claims made by the calling thread.
    pub fn claims(&self) -> Claims<'_> {
        Claims { cursor: self }
    }

    /// Record most recently claimed by the calling thread.
    pub fn current(&self) -> std::result::Result<Arc<Record>, AccessError> {
        self.current_for(&CallerId::current_thread())
    }

    /// Record most recently claimed by `caller`.
    pub fn current_for(&self, caller: &CallerId) -> std::result::Result<Arc<Record>, AccessError> {
        self.bindings
            .get(caller)
            .ok_or_else(|| AccessError::NoBindingFound {
                caller: caller.to_string(),
            })
    }

    /// Typed field of the calling thread's current record.
    pub fn get<T: FromValue>(&self, name: &str) -> std::result::Result<T, AccessError> {
        self.current()?.get(name)
    }

    /// Stop the producer and release every waiting claimer.
    ///
    /// Records not yet claimed are never handed out.
    pub fn abort(&self) {
        if self.abort.swap(true, Ordering::AcqRel) {
            return;
        }
        self.metrics.record_abort();
        warn!(
            strategy = self.strategy.kind().as_str(),
            claimed = self.claimed(),
            "Cursor aborted"
        );
        self.strategy.abort();
    }

    /// Whether `abort` has been called.
    pub fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::Acquire)
    }

    /// Settle the cursor and report how the drain ended.
    ///
    /// Blocks until the producer (and the blocking strategy's mapper) has
    /// finished. Claimers on other threads keep draining meanwhile, so every
    /// accepted record is still handed out; with bounded hand-off queues the
    /// wait lasts until they have been claimed. Call [`abort`](Self::abort)
    /// first to truncate the stream instead. Closing a cursor nobody claimed
    /// from releases the source without reading it. Repeated calls return
    /// the same outcome.
    /// A source failure is returned as [`Error::Source`]; the summary stays
    /// available through [`summary`](Self::summary).
    pub fn close(&self) -> Result<DrainSummary> {
        let mut guard = self.settled.lock();
        let settled = guard.get_or_insert_with(|| self.settle());

        match settled {
            Settled::Report(report) => {
                if let Some(failure) = &report.failure {
                    return Err(Error::Source {
                        row: report.produced,
                        source: failure.clone(),
                    });
                }
                Ok(self.summarize(report))
            }
            Settled::SpawnFailed(message) => Err(Error::Spawn(message.clone())),
            Settled::Panicked(message) => Err(Error::ProducerPanicked(message.clone())),
        }
    }

    fn settle(&self) -> Settled {
        let unstarted = {
            let mut pending = self.pending.lock();
            let producer = pending.take();
            if producer.is_some() {
                self.started.store(true, Ordering::Release);
            }
            producer
        };
        if let Some(producer) = unstarted {
            self.abort.store(true, Ordering::Release);
            self.strategy.abort();
            producer.release();
            info!("Cursor closed before any claim, source released");
            return Settled::Report(ProducerReport::not_started());
        }

        if !self.strategy.is_complete() {
            debug!("Waiting for the producer to finish");
        }

        let joined = self.strategy.join();
        if let Some(message) = self.start_error.lock().clone() {
            return Settled::SpawnFailed(message);
        }
        match joined {
            Ok(report) => Settled::Report(report),
            Err(e) => {
                error!(error = %e, "Producer did not finish cleanly");
                Settled::Panicked(e.to_string())
            }
        }
    }

    fn summarize(&self, report: &ProducerReport) -> DrainSummary {
        DrainSummary {
            strategy: self.strategy.kind(),
            stop: report.stop,
            rows_observed: report.rows_observed,
            produced: report.produced,
            claimed: self.claimed(),
        }
    }

    /// Summary of a closed cursor, including one whose source failed.
    pub fn summary(&self) -> Option<DrainSummary> {
        match self.settled.lock().as_ref() {
            Some(Settled::Report(report)) => Some(self.summarize(report)),
            _ => None,
        }
    }

    /// Every record produced so far, in source order.
    ///
    /// After the stream has ended this is the full result set and can be
    /// read any number of times.
    pub fn records(&self) -> Vec<Arc<Record>> {
        self.strategy.records()
    }

    /// Claims handed out so far.
    pub fn claimed(&self) -> usize {
        self.claimed.load(Ordering::Relaxed)
    }

    /// Whether the producer has been started (or the cursor closed).
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Strategy backing this cursor.
    pub fn strategy(&self) -> ClaimStrategyKind {
        self.strategy.kind()
    }

    /// Configuration the cursor was built with.
    pub fn config(&self) -> &CursorConfig {
        &self.config
    }

    /// Metrics recorded by this cursor.
    pub fn metrics(&self) -> &Arc<DrainMetrics> {
        &self.metrics
    }
}

impl Drop for ConcurrentCursor {
    fn drop(&mut self) {
        if let Some(producer) = self.pending.get_mut().take() {
            producer.release();
            return;
        }
        if self.settled.get_mut().is_none() {
            // Background threads exit on their own once aborted.
            self.abort.store(true, Ordering::Release);
            self.strategy.abort();
        }
    }
}

impl std::fmt::Debug for ConcurrentCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcurrentCursor")
            .field("strategy", &self.strategy.kind())
            .field("started", &self.is_started())
            .field("aborted", &self.is_aborted())
            .field("claimed", &self.claimed())
            .finish()
    }
}

/// Iterator over the calling thread's claims.
pub struct Claims<'c> {
    cursor: &'c ConcurrentCursor,
}

impl Iterator for Claims<'_> {
    type Item = Arc<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.cursor.claim_next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::summary::StopReason;
    use crate::error::SourceError;
    use crate::source::MemorySource;

    #[test]
    fn test_source_untouched_until_first_claim() {
        let source = MemorySource::sequence(3);
        let advances = source.advance_counter();
        let cursor = make_concurrent(source);

        std::thread::sleep(std::time::Duration::from_millis(10));
        assert_eq!(advances.load(Ordering::SeqCst), 0);
        assert!(!cursor.is_started());

        assert!(cursor.claim_next().is_some());
        assert!(cursor.is_started());
    }

    #[test]
    fn test_current_follows_latest_claim() {
        let cursor = make_concurrent(MemorySource::sequence(3));

        assert!(matches!(
            cursor.current(),
            Err(AccessError::NoBindingFound { .. })
        ));

        let first = cursor.claim_next().unwrap();
        assert_eq!(cursor.current().unwrap().index(), first.index());
        assert_eq!(cursor.get::<i64>("ID").unwrap(), first.index() as i64);

        let second = cursor.claim_next().unwrap();
        assert_eq!(cursor.current().unwrap().index(), second.index());
    }

    #[test]
    fn test_end_of_stream_clears_binding() {
        let cursor = make_concurrent(MemorySource::sequence(1));
        assert!(cursor.claim_next().is_some());
        assert!(cursor.claim_next().is_none());
        assert!(cursor.current().is_err());
    }

    #[test]
    fn test_bindings_are_per_caller() {
        let cursor = make_concurrent(MemorySource::sequence(2));
        let a = cursor.claim_next_as(CallerId::Worker(0)).unwrap();
        let b = cursor.claim_next_as(CallerId::Worker(1)).unwrap();

        assert_eq!(cursor.current_for(&CallerId::Worker(0)).unwrap().index(), a.index());
        assert_eq!(cursor.current_for(&CallerId::Worker(1)).unwrap().index(), b.index());
        assert!(cursor.current().is_err());
    }

    #[test]
    fn test_close_after_full_drain() {
        for strategy in [ClaimStrategyKind::Optimistic, ClaimStrategyKind::Blocking] {
            let cursor = ConcurrentCursor::builder(MemorySource::sequence(20))
                .strategy(strategy)
                .build()
                .unwrap();

            assert_eq!(cursor.claims().count(), 20);
            let summary = cursor.close().unwrap();
            assert_eq!(summary.strategy, strategy);
            assert_eq!(summary.stop, StopReason::Exhausted);
            assert_eq!(summary.produced, 20);
            assert_eq!(summary.claimed, 20);

            // idempotent
            assert_eq!(cursor.close().unwrap(), summary);
            assert_eq!(cursor.summary(), Some(summary));
        }
    }

    #[test]
    fn test_close_before_claim_releases_source() {
        let source = MemorySource::sequence(5);
        let advances = source.advance_counter();
        let closed = source.closed_flag();
        let cursor = make_concurrent(source);

        let summary = cursor.close().unwrap();
        assert_eq!(summary.stop, StopReason::NotStarted);
        assert_eq!(summary.produced, 0);
        assert_eq!(advances.load(Ordering::SeqCst), 0);
        assert!(closed.load(Ordering::SeqCst));
        assert!(cursor.claim_next().is_none());
    }

    #[test]
    fn test_close_waits_for_claimers_to_drain() {
        for strategy in [ClaimStrategyKind::Optimistic, ClaimStrategyKind::Blocking] {
            let cursor = ConcurrentCursor::builder(MemorySource::sequence(50_000))
                .strategy(strategy)
                .build()
                .unwrap();

            let claimed: usize = std::thread::scope(|scope| {
                let handles: Vec<_> = (0..4)
                    .map(|_| scope.spawn(|| cursor.claims().count()))
                    .collect();
                while !cursor.is_started() {
                    std::thread::yield_now();
                }
                let summary = cursor.close().unwrap();
                assert_eq!(summary.stop, StopReason::Exhausted);
                assert_eq!(summary.produced, 50_000);
                handles.into_iter().map(|h| h.join().unwrap()).sum()
            });

            assert_eq!(claimed, 50_000);
            assert!(!cursor.is_aborted());
        }
    }

    #[test]
    fn test_abort_then_close_truncates() {
        let mut config = CursorConfig::default().with_strategy(ClaimStrategyKind::Blocking);
        config.handoff.stage_one_capacity = Some(1);
        config.handoff.stage_two_capacity = Some(1);

        let cursor = ConcurrentCursor::builder(MemorySource::sequence(10_000))
            .config(config)
            .build()
            .unwrap();

        assert!(cursor.claim_next().is_some());
        cursor.abort();
        let summary = cursor.close().unwrap();
        assert_eq!(summary.stop, StopReason::Aborted);
        assert!(summary.produced < 10_000);
        assert!(cursor.claim_next().is_none());
    }

    #[test]
    fn test_close_racing_first_claim_is_consistent() {
        for _ in 0..200 {
            let cursor = make_concurrent(MemorySource::sequence(3));
            let (claimed, summary) = std::thread::scope(|scope| {
                let claimer = scope.spawn(|| cursor.claims().count());
                let summary = cursor.close().unwrap();
                (claimer.join().unwrap(), summary)
            });

            match summary.stop {
                StopReason::NotStarted => assert_eq!(claimed, 0),
                StopReason::Exhausted => {
                    assert_eq!(summary.produced, 3);
                    assert_eq!(claimed, 3);
                }
                other => panic!("unexpected stop: {other}"),
            }
        }
    }

    #[test]
    fn test_predicate_ends_stream() {
        let cursor = make_concurrent_while(MemorySource::sequence(100), |r: &Record| {
            r.get::<i64>("id").map(|id| id < 10).unwrap_or(false)
        });

        assert_eq!(cursor.claims().count(), 10);
        let summary = cursor.close().unwrap();
        assert_eq!(summary.stop, StopReason::PredicateRejected { row: 10 });
        assert_eq!(summary.rows_observed, 11);
    }

    #[test]
    fn test_source_failure_surfaces_on_close() {
        let source =
            MemorySource::sequence(10).fail_at(6, SourceError::Advance("socket closed".into()));
        let cursor = make_concurrent(source);

        assert_eq!(cursor.claims().count(), 6);
        let err = cursor.close().unwrap_err();
        assert!(matches!(err, Error::Source { row: 6, .. }));

        let summary = cursor.summary().unwrap();
        assert_eq!(summary.stop, StopReason::SourceFailed { row: 6 });
        assert_eq!(summary.produced, 6);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = ConcurrentCursor::builder(MemorySource::sequence(1))
            .config(CursorConfig::default().with_workers(0))
            .build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_records_replay_after_drain() {
        for strategy in [ClaimStrategyKind::Optimistic, ClaimStrategyKind::Blocking] {
            let cursor = ConcurrentCursor::builder(MemorySource::sequence(7))
                .strategy(strategy)
                .build()
                .unwrap();
            while cursor.claim_next().is_some() {}
            cursor.close().unwrap();

            let first: Vec<usize> = cursor.records().iter().map(|r| r.index()).collect();
            let second: Vec<usize> = cursor.records().iter().map(|r| r.index()).collect();
            assert_eq!(first, (0..7).collect::<Vec<_>>());
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_drop_without_close_stops_producer() {
        let source = MemorySource::sequence(1_000_000);
        let closed = source.closed_flag();
        let cursor = make_concurrent(source);
        assert!(cursor.claim_next().is_some());
        drop(cursor);

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
        while !closed.load(Ordering::SeqCst) {
            assert!(std::time::Instant::now() < deadline, "producer kept running");
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
    }

    #[test]
    fn test_drop_before_claim_releases_source() {
        let source = MemorySource::sequence(5);
        let closed = source.closed_flag();
        let advances = source.advance_counter();
        drop(make_concurrent(source));

        assert!(closed.load(Ordering::SeqCst));
        assert_eq!(advances.load(Ordering::SeqCst), 0);
    }
}
