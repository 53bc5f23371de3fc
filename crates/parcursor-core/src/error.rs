//! Error types for parcursor core library.
//!
//! Uses hierarchical domain-specific errors following the thiserror pattern.
//! End of stream is not an error: claims report it by returning `None`.

use thiserror::Error;

/// Result type alias for parcursor operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error returned by caller-supplied transforms.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Top-level error type for parcursor.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The sequential source failed while being drained
    #[error("Source failed at row {row}: {source}")]
    Source {
        /// Zero-based row position the producer was reading
        row: usize,
        #[source]
        source: SourceError,
    },

    /// Field accessor error
    #[error("Access error: {0}")]
    Access(#[from] AccessError),

    /// A worker transform failed for one record
    #[error("Transform failed for record {index}: {source}")]
    Transform {
        /// Original source index of the record being transformed
        index: usize,
        #[source]
        source: BoxError,
    },

    /// A worker thread panicked
    #[error("Worker {worker} panicked: {message}")]
    WorkerPanicked { worker: usize, message: String },

    /// The producer thread panicked
    #[error("Producer panicked: {0}")]
    ProducerPanicked(String),

    /// The cursor was aborted before the drain completed
    #[error("Cursor aborted before the drain completed")]
    Aborted,

    /// Fan-in found a different number of results than records produced
    #[error("Incomplete drain: {produced} records produced, {collected} collected")]
    IncompleteDrain { produced: usize, collected: usize },

    /// Failed to spawn a background or worker thread
    #[error("Thread spawn failed: {0}")]
    Spawn(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by a [`SequentialSource`](crate::source::SequentialSource).
///
/// Cloneable so a single failure can be reported by every `close()` call and
/// by the orchestrator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    /// Moving to the next row failed
    #[error("Advance failed: {0}")]
    Advance(String),

    /// Field names could not be read
    #[error("Schema unavailable: {0}")]
    Schema(String),

    /// A field value could not be read
    #[error("Field {index} read failed: {message}")]
    Field { index: usize, message: String },

    /// Releasing the source failed
    #[error("Close failed: {0}")]
    Close(String),
}

/// Record accessor errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AccessError {
    /// The caller has no claimed record bound to it
    #[error("No data bound to {caller}")]
    NoBindingFound { caller: String },

    /// Field name not present in the schema
    #[error("Field not found: {0}")]
    FieldNotFound(String),

    /// Positional access beyond the field count
    #[error("Field index {index} out of range ({len} fields)")]
    IndexOutOfRange { index: usize, len: usize },

    /// Stored value cannot convert to the requested type
    #[error("Type mismatch for field {field}: cannot convert {actual} to {expected}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        actual: String,
    },
}

impl Error {
    /// Wrap a transform failure for the record at `index`.
    pub fn transform(index: usize, err: impl Into<BoxError>) -> Self {
        Error::Transform {
            index,
            source: err.into(),
        }
    }

    /// Whether this error came from the sequential source.
    pub fn is_source_failure(&self) -> bool {
        matches!(self, Error::Source { .. })
    }
}

/// Text of a panic payload, for reporting a panicked thread.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// Conversion implementations for external error types

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Config("invalid value".into());
        assert_eq!(err.to_string(), "Configuration error: invalid value");

        let err = Error::Source {
            row: 12,
            source: SourceError::Advance("connection reset".into()),
        };
        assert_eq!(
            err.to_string(),
            "Source failed at row 12: Advance failed: connection reset"
        );
        assert!(err.is_source_failure());
    }

    #[test]
    fn test_access_error() {
        let err: Error = AccessError::FieldNotFound("OrderId".into()).into();
        assert_eq!(err.to_string(), "Access error: Field not found: OrderId");

        let err = AccessError::TypeMismatch {
            field: "amount".into(),
            expected: "i64",
            actual: "text \"abc\"".into(),
        };
        assert!(err.to_string().contains("cannot convert"));
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");

        let payload: Box<dyn std::any::Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }

    #[test]
    fn test_transform_error_keeps_source() {
        let err = Error::transform(7, "bad row");
        assert!(err.to_string().contains("record 7"));
        assert!(std::error::Error::source(&err).is_some());
        assert!(!err.is_source_failure());
    }
}
