//! The seam between the cursor and its claim strategies.

use super::producer::Producer;
use super::summary::ProducerReport;
use crate::config::ClaimStrategyKind;
use crate::error::Result;
use crate::record::Record;
use std::sync::Arc;

/// How consumers obtain the next unclaimed record.
///
/// Every produced record is returned by exactly one `claim` call. After the
/// stream completes, or after `abort`, every `claim` returns `None`.
pub(crate) trait ClaimStrategy: Send + Sync {
    fn kind(&self) -> ClaimStrategyKind;

    /// Spawn the producer (and any helper threads). Called at most once.
    fn start(&self, producer: Producer) -> Result<()>;

    /// Claim the next record, waiting while the producer is behind.
    fn claim(&self) -> Option<Arc<Record>>;

    /// Whether the producer has signalled the end of the stream.
    fn is_complete(&self) -> bool;

    /// Release every waiting claimer. The cursor sets the abort flag first.
    fn abort(&self);

    /// Wait for the background threads and collect the producer's report.
    fn join(&self) -> Result<ProducerReport>;

    /// Every record produced so far, in source order.
    fn records(&self) -> Vec<Arc<Record>>;
}
