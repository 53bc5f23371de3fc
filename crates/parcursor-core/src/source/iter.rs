//! Adapter turning a row iterator into a sequential source.

use super::SequentialSource;
use crate::error::SourceError;
use crate::value::Value;

/// Sequential source over any iterator of rows.
///
/// Handy for streaming parsers and generated data where the rows already
/// arrive one at a time.
pub struct IterSource<I> {
    names: Vec<String>,
    rows: I,
    current: Option<Vec<Value>>,
}

impl<I> IterSource<I>
where
    I: Iterator<Item = Result<Vec<Value>, SourceError>> + Send,
{
    /// Create a source with fixed field names.
    pub fn new(names: Vec<String>, rows: I) -> Self {
        Self {
            names,
            rows,
            current: None,
        }
    }
}

impl<I> SequentialSource for IterSource<I>
where
    I: Iterator<Item = Result<Vec<Value>, SourceError>> + Send,
{
    fn advance(&mut self) -> Result<bool, SourceError> {
        match self.rows.next() {
            Some(Ok(row)) => {
                if row.len() != self.names.len() {
                    return Err(SourceError::Advance(format!(
                        "row has {} values, expected {}",
                        row.len(),
                        self.names.len()
                    )));
                }
                self.current = Some(row);
                Ok(true)
            }
            Some(Err(e)) => Err(e),
            None => {
                self.current = None;
                Ok(false)
            }
        }
    }

    fn field_names(&self) -> Result<Vec<String>, SourceError> {
        Ok(self.names.clone())
    }

    fn field_value(&self, index: usize) -> Result<Value, SourceError> {
        self.current
            .as_ref()
            .and_then(|row| row.get(index).cloned())
            .ok_or(SourceError::Field {
                index,
                message: "no value at this position".into(),
            })
    }

    fn close(&mut self) -> Result<(), SourceError> {
        self.current = None;
        Ok(())
    }
}
