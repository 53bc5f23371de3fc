//! Blocking hand-off claims.
//!
//! Two stages: the producer sends raw records over a crossbeam channel
//! (unbounded by default, so the producer never waits on consumers), and a
//! mapper thread wraps each one, appends it to the replay log, and pushes it
//! into a [`HandoffQueue`] where consumers park until a record arrives or
//! the stream ends.

use super::producer::{Producer, RecordSink};
use super::strategy::ClaimStrategy;
use super::summary::ProducerReport;
use crate::buffer::HandoffQueue;
use crate::config::{ClaimStrategyKind, HandoffConfig};
use crate::error::{panic_message, Error, Result};
use crate::record::Record;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::debug;

/// Stage-one sender; dropping it disconnects the mapper.
struct StageOneSink {
    tx: Sender<Record>,
}

impl RecordSink for StageOneSink {
    fn push(&mut self, record: Record) -> bool {
        self.tx.send(record).is_ok()
    }
}

/// Completes the hand-off queue when the mapper exits, even by panic.
struct CompleteOnDrop<'a>(&'a HandoffQueue<Arc<Record>>);

impl Drop for CompleteOnDrop<'_> {
    fn drop(&mut self) {
        self.0.complete_adding();
    }
}

#[derive(Default)]
struct Threads {
    producer: Option<JoinHandle<ProducerReport>>,
    mapper: Option<JoinHandle<()>>,
}

pub(crate) struct BlockingClaims {
    handoff: Arc<HandoffQueue<Arc<Record>>>,
    replay: Arc<RwLock<Vec<Arc<Record>>>>,
    stage_one_capacity: Option<usize>,
    abort: Arc<AtomicBool>,
    threads: Mutex<Threads>,
}

impl BlockingClaims {
    pub fn new(config: &HandoffConfig, abort: Arc<AtomicBool>) -> Self {
        Self {
            handoff: Arc::new(HandoffQueue::new(config.stage_two_capacity)),
            replay: Arc::new(RwLock::new(Vec::new())),
            stage_one_capacity: config.stage_one_capacity,
            abort,
            threads: Mutex::new(Threads::default()),
        }
    }
}

/// Move records from stage one into the hand-off queue.
fn map_records(
    rx: Receiver<Record>,
    handoff: &HandoffQueue<Arc<Record>>,
    replay: &RwLock<Vec<Arc<Record>>>,
) {
    let _complete = CompleteOnDrop(handoff);

    for record in rx.iter() {
        let record = Arc::new(record);
        replay.write().push(Arc::clone(&record));
        if handoff.push(record).is_err() {
            debug!("Hand-off queue closed, mapper stopping");
            return;
        }
    }
    debug!(mapped = replay.read().len(), "Stage one drained");
}

impl ClaimStrategy for BlockingClaims {
    fn kind(&self) -> ClaimStrategyKind {
        ClaimStrategyKind::Blocking
    }

    fn start(&self, producer: Producer) -> Result<()> {
        let (tx, rx) = match self.stage_one_capacity {
            Some(capacity) => bounded(capacity),
            None => unbounded(),
        };

        let handoff = Arc::clone(&self.handoff);
        let replay = Arc::clone(&self.replay);
        let mapper = thread::Builder::new()
            .name("parcursor-mapper".into())
            .spawn(move || map_records(rx, &handoff, &replay));

        let mapper = match mapper {
            Ok(handle) => handle,
            Err(e) => {
                self.handoff.complete_adding();
                producer.release();
                return Err(Error::Spawn(format!("mapper: {}", e)));
            }
        };
        self.threads.lock().mapper = Some(mapper);

        // A failed spawn drops the sender, which lets the mapper finish.
        let handle = producer.spawn(StageOneSink { tx })?;
        self.threads.lock().producer = Some(handle);
        Ok(())
    }

    fn claim(&self) -> Option<Arc<Record>> {
        if self.abort.load(Ordering::Acquire) {
            return None;
        }
        self.handoff.pop()
    }

    fn is_complete(&self) -> bool {
        self.handoff.is_finished()
    }

    fn abort(&self) {
        self.handoff.close();
    }

    fn join(&self) -> Result<ProducerReport> {
        let (producer, mapper) = {
            let mut threads = self.threads.lock();
            (threads.producer.take(), threads.mapper.take())
        };

        let report = match producer {
            Some(handle) => handle
                .join()
                .map_err(|p| Error::ProducerPanicked(panic_message(p.as_ref()))),
            None => Ok(ProducerReport::not_started()),
        };

        if let Some(handle) = mapper {
            handle.join().map_err(|p| {
                Error::ProducerPanicked(format!("mapper: {}", panic_message(p.as_ref())))
            })?;
        }

        report
    }

    fn records(&self) -> Vec<Arc<Record>> {
        self.replay.read().clone()
    }
}
