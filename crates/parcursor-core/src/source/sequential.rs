//! The forward-only cursor contract.

use crate::error::SourceError;
use crate::value::Value;

/// A single-pass cursor that can only be advanced by one caller at a time.
///
/// `field_names` and `field_value` are only valid after `advance` has
/// returned `true`. The producer reads the field names once, from the first
/// row, and assumes they stay fixed.
pub trait SequentialSource: Send {
    /// Move to the next row. Returns `false` once exhausted.
    fn advance(&mut self) -> Result<bool, SourceError>;

    /// Ordered field names of the current row.
    fn field_names(&self) -> Result<Vec<String>, SourceError>;

    /// Value of the field at `index` in the current row.
    fn field_value(&self, index: usize) -> Result<Value, SourceError>;

    /// Release the underlying resource. Called exactly once by the producer.
    fn close(&mut self) -> Result<(), SourceError>;
}

impl<S: SequentialSource + ?Sized> SequentialSource for Box<S> {
    fn advance(&mut self) -> Result<bool, SourceError> {
        (**self).advance()
    }

    fn field_names(&self) -> Result<Vec<String>, SourceError> {
        (**self).field_names()
    }

    fn field_value(&self, index: usize) -> Result<Value, SourceError> {
        (**self).field_value(index)
    }

    fn close(&mut self) -> Result<(), SourceError> {
        (**self).close()
    }
}
