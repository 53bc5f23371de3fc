//! Read-only typed access to a record's fields.

use crate::error::AccessError;
use crate::record::Record;
use crate::value::{FromValue, Value};

/// Named, typed view over one row.
///
/// Names are matched case-insensitively; callers must not depend on the
/// casing the source reported.
pub trait Tuple {
    /// Field names in source order.
    fn columns(&self) -> &[String];

    /// Raw value at a position.
    fn value_at(&self, index: usize) -> Result<&Value, AccessError>;

    /// Position of a named field.
    fn position(&self, name: &str) -> Result<usize, AccessError>;

    /// Raw value of a named field.
    fn value(&self, name: &str) -> Result<&Value, AccessError> {
        self.value_at(self.position(name)?)
    }

    /// Typed value of a named field.
    fn get<T: FromValue>(&self, name: &str) -> Result<T, AccessError> {
        let value = self.value(name)?;
        T::from_value(value).map_err(|m| AccessError::TypeMismatch {
            field: name.to_string(),
            expected: m.expected,
            actual: m.actual,
        })
    }

    /// Typed value at a position.
    fn get_at<T: FromValue>(&self, index: usize) -> Result<T, AccessError> {
        let value = self.value_at(index)?;
        T::from_value(value).map_err(|m| AccessError::TypeMismatch {
            field: self
                .columns()
                .get(index)
                .cloned()
                .unwrap_or_else(|| format!("#{}", index)),
            expected: m.expected,
            actual: m.actual,
        })
    }
}

impl Tuple for Record {
    fn columns(&self) -> &[String] {
        self.schema().names()
    }

    fn value_at(&self, index: usize) -> Result<&Value, AccessError> {
        self.values().get(index).ok_or(AccessError::IndexOutOfRange {
            index,
            len: self.values().len(),
        })
    }

    fn position(&self, name: &str) -> Result<usize, AccessError> {
        self.schema()
            .position(name)
            .ok_or_else(|| AccessError::FieldNotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Schema;
    use std::sync::Arc;

    fn record() -> Record {
        let schema = Arc::new(Schema::new(vec![
            "OrderID".into(),
            "ShipName".into(),
            "ShippedDate".into(),
        ]));
        Record::new(
            0,
            schema,
            vec![Value::Int(10248), Value::from("Vins et alcools"), Value::Null],
        )
    }

    #[test]
    fn test_get_by_name_any_case() {
        let r = record();
        assert_eq!(r.get::<i64>("orderid"), Ok(10248));
        assert_eq!(r.get::<i32>("ORDERID"), Ok(10248));
        assert_eq!(r.get::<String>("shipname").unwrap(), "Vins et alcools");
    }

    #[test]
    fn test_get_by_position() {
        let r = record();
        assert_eq!(r.get_at::<i64>(0), Ok(10248));
        assert_eq!(r.get_at::<Option<String>>(2), Ok(None));
        assert_eq!(
            r.get_at::<i64>(3),
            Err(AccessError::IndexOutOfRange { index: 3, len: 3 })
        );
    }

    #[test]
    fn test_missing_field() {
        let r = record();
        assert_eq!(
            r.get::<i64>("Freight"),
            Err(AccessError::FieldNotFound("Freight".into()))
        );
    }

    #[test]
    fn test_type_mismatch_names_the_field() {
        let r = record();
        match r.get::<i64>("ShipName") {
            Err(AccessError::TypeMismatch {
                field, expected, ..
            }) => {
                assert_eq!(field, "ShipName");
                assert_eq!(expected, "i64");
            }
            other => panic!("expected type mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_accessors_are_idempotent() {
        let r = record();
        assert_eq!(r.value("OrderID"), r.value("OrderID"));
        assert_eq!(r.get::<String>("ShipName"), r.get::<String>("ShipName"));
        assert_eq!(r.columns().len(), 3);
    }

    #[test]
    fn test_unnamed_position_reported_by_index() {
        let schema = Arc::new(Schema::new(vec!["OrderID".into()]));
        let r = Record::new(0, schema, vec![Value::Int(10248), Value::from("VINET")]);

        assert_eq!(r.get_at::<String>(1).unwrap(), "VINET");
        match r.get_at::<i64>(1) {
            Err(AccessError::TypeMismatch { field, .. }) => assert_eq!(field, "#1"),
            other => panic!("expected type mismatch, got {:?}", other),
        }
    }
}
