//! The single thread that drains the sequential source.
//!
//! Only the producer ever touches the source. It reads the field names once
//! (from the first row), snapshots every accepted row into an immutable
//! [`Record`], and hands it to a [`RecordSink`]. Dropping the sink signals
//! completion to consumers, which also happens if the producer unwinds.

use super::summary::{ProducerReport, StopReason};
use crate::error::{Error, Result, SourceError};
use crate::metrics::DrainMetrics;
use crate::record::{Record, Schema, SchemaRef};
use crate::source::SequentialSource;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Row filter; the first rejected row ends the stream.
pub type AcceptPredicate = Box<dyn FnMut(&Record) -> bool + Send>;

/// Destination for produced records.
///
/// Dropping the sink marks the stream complete.
pub(crate) trait RecordSink: Send + 'static {
    /// Hand over the next record. `false` means consumers are gone.
    fn push(&mut self, record: Record) -> bool;
}

pub(crate) struct Producer {
    source: Box<dyn SequentialSource>,
    accept: Option<AcceptPredicate>,
    abort: Arc<AtomicBool>,
    metrics: Arc<DrainMetrics>,
}

impl Producer {
    pub fn new(
        source: Box<dyn SequentialSource>,
        accept: Option<AcceptPredicate>,
        abort: Arc<AtomicBool>,
        metrics: Arc<DrainMetrics>,
    ) -> Self {
        Self {
            source,
            accept,
            abort,
            metrics,
        }
    }

    /// Start draining on a dedicated thread.
    pub fn spawn<S: RecordSink>(self, sink: S) -> Result<JoinHandle<ProducerReport>> {
        thread::Builder::new()
            .name("parcursor-producer".into())
            .spawn(move || self.drain(sink))
            .map_err(|e| Error::Spawn(format!("producer: {}", e)))
    }

    /// Release the source without reading from it.
    pub fn release(mut self) {
        if let Err(e) = self.source.close() {
            warn!(error = %e, "Failed to close source");
        }
    }

    fn drain<S: RecordSink>(mut self, mut sink: S) -> ProducerReport {
        info!("Producer started");

        let mut schema: Option<SchemaRef> = None;
        let mut rows_observed = 0;
        let mut produced = 0;
        let mut failure = None;

        let stop = loop {
            if self.abort.load(Ordering::Acquire) {
                break StopReason::Aborted;
            }

            match self.source.advance() {
                Ok(true) => {}
                Ok(false) => break StopReason::Exhausted,
                Err(e) => {
                    failure = Some(e);
                    break StopReason::SourceFailed { row: produced };
                }
            }
            rows_observed += 1;
            self.metrics.record_row_observed();

            let record = match self.read_row(produced, &mut schema) {
                Ok(record) => record,
                Err(e) => {
                    failure = Some(e);
                    break StopReason::SourceFailed { row: produced };
                }
            };

            if let Some(accept) = self.accept.as_mut() {
                if !accept(&record) {
                    self.metrics.record_predicate_stop();
                    break StopReason::PredicateRejected { row: produced };
                }
            }

            if !sink.push(record) {
                break StopReason::Aborted;
            }
            produced += 1;
            self.metrics.record_produced();
        };

        // Consumers may finish before the source is released.
        drop(sink);

        if let Some(e) = &failure {
            self.metrics.record_source_error();
            warn!(row = produced, error = %e, "Source failed, stream ended early");
        }

        if let Err(e) = self.source.close() {
            warn!(error = %e, "Failed to close source");
        }

        info!(
            produced,
            rows_observed,
            stop = %stop,
            "Producer finished"
        );

        ProducerReport {
            stop,
            rows_observed,
            produced,
            failure,
        }
    }

    /// Snapshot the current row as the record at `index`.
    fn read_row(
        &mut self,
        index: usize,
        schema: &mut Option<SchemaRef>,
    ) -> std::result::Result<Record, SourceError> {
        let schema = match schema {
            Some(schema) => Arc::clone(schema),
            None => {
                let names = self.source.field_names()?;
                debug!(fields = names.len(), "Read source schema");
                let fresh = Arc::new(Schema::new(names));
                *schema = Some(Arc::clone(&fresh));
                fresh
            }
        };

        let values = (0..schema.len())
            .map(|i| self.source.field_value(i))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Record::new(index, schema, values))
    }
}
