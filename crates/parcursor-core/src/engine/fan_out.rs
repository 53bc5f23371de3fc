//! Fan-out over a worker pool, fan-in in source order.
//!
//! Workers claim from the cursor until it reports end of stream, tagging
//! every result with the record's source index. Once all workers have been
//! joined the results are sorted by that index and checked against the
//! number of records the producer handed out.
//!
//! The first failure (transform error, worker panic, spawn failure) aborts
//! the cursor so no worker stays parked on it, every worker is still joined,
//! and that failure is returned. A source failure is returned only when no
//! worker failed.

use super::worker::WorkerContext;
use crate::config::CursorConfig;
use crate::cursor::{ConcurrentCursor, DrainSummary, StopReason};
use crate::error::{panic_message, BoxError, Error, Result};
use crate::record::Record;
use crate::source::MemorySource;
use parking_lot::Mutex;
use std::convert::Infallible;
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Keeps the first failure reported by any worker.
struct FirstFailure(Mutex<Option<Error>>);

impl FirstFailure {
    fn new() -> Self {
        Self(Mutex::new(None))
    }

    fn record(&self, err: Error) {
        let mut slot = self.0.lock();
        if slot.is_none() {
            *slot = Some(err);
        } else {
            debug!(error = %err, "Additional worker failure ignored");
        }
    }

    fn take(self) -> Option<Error> {
        self.0.into_inner()
    }
}

/// Marks the worker finished, and aborts the cursor if it is unwinding.
struct WorkerGuard<'a> {
    cursor: &'a ConcurrentCursor,
}

impl Drop for WorkerGuard<'_> {
    fn drop(&mut self) {
        self.cursor.metrics().worker_finished();
        if thread::panicking() {
            self.cursor.metrics().record_worker_panic();
            self.cursor.abort();
        }
    }
}

/// Parallel drain of one cursor.
pub struct FanOut<'c> {
    cursor: &'c ConcurrentCursor,
    workers: usize,
}

impl<'c> FanOut<'c> {
    /// Fan-out using the cursor's configured worker count.
    pub fn new(cursor: &'c ConcurrentCursor) -> Self {
        Self {
            cursor,
            workers: cursor.config().effective_workers(),
        }
    }

    /// Use `workers` threads (at least one).
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Map every record and return the results in source order.
    pub fn map<T, E, F>(&self, transform: F) -> Result<Vec<T>>
    where
        T: Send,
        E: Into<BoxError>,
        F: Fn(&Record) -> std::result::Result<T, E> + Sync,
    {
        let (results, _) = self.run(|_, record| {
            transform(record).map_err(|e| Error::transform(record.index(), e))
        })?;
        Ok(results)
    }

    /// Run `action` once per record; the worker context exposes the record
    /// being processed.
    pub fn for_each<E, F>(&self, action: F) -> Result<DrainSummary>
    where
        E: Into<BoxError>,
        F: Fn(&WorkerContext<'_>) -> std::result::Result<(), E> + Sync,
    {
        let (_, summary) = self.run(|ctx, record| {
            action(ctx).map_err(|e| Error::transform(record.index(), e))
        })?;
        Ok(summary)
    }

    fn run<T, F>(&self, body: F) -> Result<(Vec<T>, DrainSummary)>
    where
        T: Send,
        F: Fn(&WorkerContext<'_>, &Record) -> Result<T> + Sync,
    {
        let cursor = self.cursor;
        let started = Instant::now();
        let claimed_before = cursor.claimed();
        let failure = FirstFailure::new();

        info!(
            workers = self.workers,
            strategy = cursor.strategy().as_str(),
            "Starting fan-out"
        );

        let per_worker: Vec<Vec<(usize, T)>> = thread::scope(|scope| {
            let mut handles = Vec::with_capacity(self.workers);

            for worker in 0..self.workers {
                let body = &body;
                let failure = &failure;
                let spawned = thread::Builder::new()
                    .name(format!("parcursor-worker-{}", worker))
                    .spawn_scoped(scope, move || run_worker(cursor, worker, body, failure));

                match spawned {
                    Ok(handle) => handles.push((worker, handle)),
                    Err(e) => {
                        error!(worker, error = %e, "Failed to spawn worker");
                        failure.record(Error::Spawn(format!("worker {}: {}", worker, e)));
                        cursor.abort();
                        break;
                    }
                }
            }

            handles
                .into_iter()
                .map(|(worker, handle)| match handle.join() {
                    Ok(results) => results,
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        error!(worker, panic = %message, "Worker panicked");
                        failure.record(Error::WorkerPanicked { worker, message });
                        Vec::new()
                    }
                })
                .collect()
        });

        let elapsed = started.elapsed();
        cursor.metrics().record_run(elapsed);
        let closed = cursor.close();

        if let Some(err) = failure.take() {
            warn!(error = %err, "Fan-out failed");
            return Err(err);
        }
        let summary = closed?;
        if summary.stop == StopReason::Aborted {
            return Err(Error::Aborted);
        }

        let mut indexed: Vec<(usize, T)> = per_worker.into_iter().flatten().collect();
        indexed.sort_unstable_by_key(|(index, _)| *index);

        let expected = summary.produced.saturating_sub(claimed_before);
        let duplicated = indexed.windows(2).any(|pair| pair[0].0 == pair[1].0);
        if indexed.len() != expected || duplicated {
            return Err(Error::IncompleteDrain {
                produced: expected,
                collected: indexed.len(),
            });
        }

        info!(
            records = indexed.len(),
            stop = %summary.stop,
            elapsed_ms = elapsed.as_millis() as u64,
            "Fan-out complete"
        );

        Ok((indexed.into_iter().map(|(_, value)| value).collect(), summary))
    }
}

fn run_worker<T, F>(
    cursor: &ConcurrentCursor,
    worker: usize,
    body: &F,
    failure: &FirstFailure,
) -> Vec<(usize, T)>
where
    F: Fn(&WorkerContext<'_>, &Record) -> Result<T>,
{
    cursor.metrics().worker_started();
    let _guard = WorkerGuard { cursor };
    let ctx = WorkerContext::new(cursor, worker);
    let mut results = Vec::new();

    while let Some(record) = ctx.claim() {
        match body(&ctx, &record) {
            Ok(value) => results.push((record.index(), value)),
            Err(e) => {
                cursor.metrics().record_transform_error();
                warn!(worker, index = record.index(), error = %e, "Transform failed");
                failure.record(e);
                cursor.abort();
                break;
            }
        }
    }

    debug!(worker, processed = results.len(), "Worker finished");
    results
}

/// Map every record of `cursor` in parallel and return the results in
/// source order.
///
/// `workers` defaults to the cursor's configured worker count.
pub fn run_parallel<T, E, F>(
    cursor: &ConcurrentCursor,
    transform: F,
    workers: Option<usize>,
) -> Result<Vec<T>>
where
    T: Send,
    E: Into<BoxError>,
    F: Fn(&Record) -> std::result::Result<T, E> + Sync,
{
    let mut fan_out = FanOut::new(cursor);
    if let Some(workers) = workers {
        fan_out = fan_out.workers(workers);
    }
    fan_out.map(transform)
}

/// Run `action` once per record of `cursor` in parallel.
pub fn for_each<E, F>(
    cursor: &ConcurrentCursor,
    action: F,
    workers: Option<usize>,
) -> Result<DrainSummary>
where
    E: Into<BoxError>,
    F: Fn(&WorkerContext<'_>) -> std::result::Result<(), E> + Sync,
{
    let mut fan_out = FanOut::new(cursor);
    if let Some(workers) = workers {
        fan_out = fan_out.workers(workers);
    }
    fan_out.for_each(action)
}

/// Drain `cursor` completely and keep every record.
pub fn load(cursor: &ConcurrentCursor) -> Result<Materialized> {
    let summary = FanOut::new(cursor).for_each(|_| Ok::<(), Infallible>(()))?;
    Ok(Materialized {
        records: cursor.records(),
        summary,
        config: cursor.config().clone(),
    })
}

/// Fully drained result set, readable any number of times.
#[derive(Debug, Clone)]
pub struct Materialized {
    records: Vec<Arc<Record>>,
    summary: DrainSummary,
    config: CursorConfig,
}

impl Materialized {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record at source position `index`.
    pub fn get(&self, index: usize) -> Option<&Arc<Record>> {
        self.records.get(index)
    }

    pub fn records(&self) -> &[Arc<Record>] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Arc<Record>> {
        self.records.iter()
    }

    /// How the drain that produced this set ended.
    pub fn summary(&self) -> &DrainSummary {
        &self.summary
    }

    /// A fresh cursor over the same rows, for another parallel pass.
    ///
    /// The new cursor uses the configuration of the cursor that was loaded.
    pub fn replay(&self) -> Result<ConcurrentCursor> {
        let names = self
            .records
            .first()
            .map(|r| r.schema().names().to_vec())
            .unwrap_or_default();
        let rows = self.records.iter().map(|r| r.values().to_vec()).collect();
        ConcurrentCursor::builder(MemorySource::new(names, rows))
            .config(self.config.clone())
            .build()
    }

    pub fn into_records(self) -> Vec<Arc<Record>> {
        self.records
    }
}

impl<'a> IntoIterator for &'a Materialized {
    type Item = &'a Arc<Record>;
    type IntoIter = std::slice::Iter<'a, Arc<Record>>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

impl IntoIterator for Materialized {
    type Item = Arc<Record>;
    type IntoIter = std::vec::IntoIter<Arc<Record>>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClaimStrategyKind;
    use crate::cursor::make_concurrent;
    use crate::error::SourceError;
    use crate::tuple::Tuple;

    fn cursor(rows: usize, strategy: ClaimStrategyKind) -> ConcurrentCursor {
        ConcurrentCursor::builder(MemorySource::sequence(rows))
            .strategy(strategy)
            .build()
            .unwrap()
    }

    #[test]
    fn test_map_preserves_source_order() {
        for strategy in [ClaimStrategyKind::Optimistic, ClaimStrategyKind::Blocking] {
            let cursor = cursor(500, strategy);
            let ids = run_parallel(&cursor, |r| r.get::<i64>("id"), Some(8)).unwrap();
            assert_eq!(ids, (0..500).collect::<Vec<i64>>());
        }
    }

    #[test]
    fn test_non_unique_mapped_values() {
        let cursor = cursor(100, ClaimStrategyKind::Optimistic);
        let parity = run_parallel(
            &cursor,
            |r| r.get::<i64>("id").map(|id| id % 2),
            Some(4),
        )
        .unwrap();
        assert_eq!(parity.len(), 100);
        assert!(parity.iter().enumerate().all(|(i, p)| *p == (i as i64) % 2));
    }

    #[test]
    fn test_transform_error_reported_with_index() {
        let cursor = cursor(200, ClaimStrategyKind::Blocking);
        let err = run_parallel(
            &cursor,
            |r| {
                if r.index() == 50 {
                    Err("bad row")
                } else {
                    Ok(r.index())
                }
            },
            Some(4),
        )
        .unwrap_err();

        assert!(matches!(err, Error::Transform { index: 50, .. }));
        assert!(cursor.is_aborted());
        assert_eq!(cursor.metrics().snapshot().transform_errors, 1);
    }

    #[test]
    fn test_worker_panic_reported() {
        let cursor = cursor(100, ClaimStrategyKind::Optimistic);
        let err = run_parallel(
            &cursor,
            |r| {
                if r.index() == 10 {
                    panic!("worker exploded");
                }
                Ok::<_, Infallible>(r.index())
            },
            Some(3),
        )
        .unwrap_err();

        match err {
            Error::WorkerPanicked { message, .. } => assert_eq!(message, "worker exploded"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(cursor.metrics().snapshot().worker_panics, 1);
    }

    #[test]
    fn test_source_failure_propagates() {
        let source =
            MemorySource::sequence(100).fail_at(30, SourceError::Advance("lost connection".into()));
        let cursor = make_concurrent(source);

        let err = run_parallel(&cursor, |r| Ok::<_, Infallible>(r.index()), Some(4)).unwrap_err();
        assert!(matches!(err, Error::Source { row: 30, .. }));
    }

    #[test]
    fn test_for_each_sees_bound_record() {
        let cursor = cursor(64, ClaimStrategyKind::Optimistic);
        let seen = Mutex::new(Vec::new());

        let summary = for_each(
            &cursor,
            |ctx| {
                let id: i64 = ctx.get("ID")?;
                assert_eq!(ctx.cursor().get::<i64>("id")?, id);
                seen.lock().push(id);
                Ok::<(), crate::error::AccessError>(())
            },
            Some(4),
        )
        .unwrap();

        assert_eq!(summary.produced, 64);
        assert_eq!(summary.claimed, 64);
        let mut seen = seen.into_inner();
        seen.sort_unstable();
        assert_eq!(seen, (0..64).collect::<Vec<_>>());
    }

    #[test]
    fn test_load_materializes_everything() {
        let cursor = cursor(42, ClaimStrategyKind::Blocking);
        let loaded = load(&cursor).unwrap();

        assert_eq!(loaded.len(), 42);
        assert_eq!(loaded.summary().stop, StopReason::Exhausted);
        for (i, record) in loaded.iter().enumerate() {
            assert_eq!(record.index(), i);
        }

        let again = loaded.replay().unwrap();
        assert_eq!(again.strategy(), ClaimStrategyKind::Blocking);
        let ids = run_parallel(&again, |r| r.get::<i64>("id"), Some(2)).unwrap();
        assert_eq!(ids, (0..42).collect::<Vec<_>>());
    }

    #[test]
    fn test_partial_manual_claims_are_excluded() {
        let cursor = cursor(20, ClaimStrategyKind::Optimistic);
        let first = cursor.claim_next().unwrap();
        assert_eq!(first.index(), 0);

        let rest = run_parallel(&cursor, |r| Ok::<_, Infallible>(r.index()), Some(2)).unwrap();
        assert_eq!(rest, (1..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_external_abort_is_an_error() {
        let cursor = cursor(10_000, ClaimStrategyKind::Optimistic);
        let err = run_parallel(
            &cursor,
            |r| {
                if r.index() == 5 {
                    cursor.abort();
                }
                Ok::<_, Infallible>(r.index())
            },
            Some(2),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Aborted));
    }

    #[test]
    fn test_replay_keeps_configuration() {
        let config = CursorConfig::default()
            .with_strategy(ClaimStrategyKind::Blocking)
            .with_workers(3);
        let cursor = ConcurrentCursor::builder(MemorySource::sequence(10))
            .config(config.clone())
            .build()
            .unwrap();
        let loaded = load(&cursor).unwrap();

        let again = loaded.replay().unwrap();
        assert_eq!(again.config(), &config);
        assert_eq!(FanOut::new(&again).workers, 3);
    }
}
