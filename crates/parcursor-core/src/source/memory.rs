//! In-memory sequential source.
//!
//! Used for tests and simulations: rows are held in a `Vec` and handed out
//! one at a time, exactly like a forward-only result set. A failure can be
//! injected at a given row to exercise error propagation.

use super::SequentialSource;
use crate::error::SourceError;
use crate::value::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Source backed by rows held in memory.
pub struct MemorySource {
    names: Vec<String>,
    rows: Vec<Vec<Value>>,
    /// Position of the current row; `None` before the first advance
    position: Option<usize>,
    fail_at: Option<(usize, SourceError)>,
    advances: Arc<AtomicUsize>,
    closed: Arc<AtomicBool>,
}

impl MemorySource {
    /// Create a source from field names and rows.
    pub fn new(names: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            names,
            rows,
            position: None,
            fail_at: None,
            advances: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Synthetic source of `count` rows with fields `id` (the row number)
    /// and `name`.
    pub fn sequence(count: usize) -> Self {
        let rows = (0..count)
            .map(|i| vec![Value::Int(i as i64), Value::Text(format!("row-{}", i))])
            .collect();
        Self::new(vec!["id".into(), "name".into()], rows)
    }

    /// Fail the advance that would move onto row `row` (zero-based), so
    /// exactly `row` rows are delivered before the error.
    pub fn fail_at(mut self, row: usize, error: SourceError) -> Self {
        self.fail_at = Some((row, error));
        self
    }

    /// Shared counter of successful `advance` calls.
    pub fn advance_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.advances)
    }

    /// Shared flag set once `close` has been called.
    pub fn closed_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }

    fn current(&self) -> Result<&Vec<Value>, SourceError> {
        self.position
            .and_then(|p| self.rows.get(p))
            .ok_or_else(|| SourceError::Advance("no current row".into()))
    }
}

impl SequentialSource for MemorySource {
    fn advance(&mut self) -> Result<bool, SourceError> {
        let next = self.position.map_or(0, |p| p + 1);

        if let Some((row, error)) = &self.fail_at {
            if *row == next {
                return Err(error.clone());
            }
        }

        if next >= self.rows.len() {
            self.position = Some(self.rows.len());
            return Ok(false);
        }

        self.position = Some(next);
        self.advances.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }

    fn field_names(&self) -> Result<Vec<String>, SourceError> {
        self.current()
            .map(|_| self.names.clone())
            .map_err(|_| SourceError::Schema("no current row".into()))
    }

    fn field_value(&self, index: usize) -> Result<Value, SourceError> {
        let row = self.current()?;
        row.get(index).cloned().ok_or(SourceError::Field {
            index,
            message: format!("row has {} fields", row.len()),
        })
    }

    fn close(&mut self) -> Result<(), SourceError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
