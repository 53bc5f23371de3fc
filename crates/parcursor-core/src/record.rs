//! Immutable records and the schema they share.

use crate::value::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Field names of one source, captured once from its first row.
///
/// Lookups are case-insensitive; when two names differ only by case the
/// first one wins.
#[derive(Debug)]
pub struct Schema {
    names: Vec<String>,
    lookup: HashMap<String, usize>,
}

/// Shared schema handle.
pub type SchemaRef = Arc<Schema>;

impl Schema {
    /// Create a schema from ordered field names.
    pub fn new(names: Vec<String>) -> Self {
        let mut lookup = HashMap::with_capacity(names.len());
        for (position, name) in names.iter().enumerate() {
            lookup.entry(name.to_lowercase()).or_insert(position);
        }
        Self { names, lookup }
    }

    /// Ordered field names, in original casing.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Position of a field, matched case-insensitively.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.lookup.get(&name.to_lowercase()).copied()
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Check if the schema has no fields.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// One row from the source.
///
/// `index` is the zero-based position at which the producer read the row.
/// It never changes, so results computed out of order can be put back in
/// source order.
#[derive(Debug, Clone)]
pub struct Record {
    index: usize,
    schema: SchemaRef,
    values: Vec<Value>,
}

impl Record {
    /// Create a record. `values` line up with `schema` by position; values
    /// past the last name are reachable only by position.
    pub fn new(index: usize, schema: SchemaRef, values: Vec<Value>) -> Self {
        Self {
            index,
            schema,
            values,
        }
    }

    /// Original source position.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Shared schema.
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// Values in schema order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Iterate `(name, value)` pairs in schema order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.schema
            .names()
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order_schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            "OrderID".into(),
            "CustomerID".into(),
            "Freight".into(),
        ]))
    }

    #[test]
    fn test_schema_lookup_is_case_insensitive() {
        let schema = order_schema();
        assert_eq!(schema.position("orderid"), Some(0));
        assert_eq!(schema.position("CUSTOMERID"), Some(1));
        assert_eq!(schema.position("ShipName"), None);
        assert_eq!(schema.len(), 3);
    }

    #[test]
    fn test_schema_first_name_wins_on_case_collision() {
        let schema = Schema::new(vec!["id".into(), "ID".into()]);
        assert_eq!(schema.position("Id"), Some(0));
        assert_eq!(schema.names()[1], "ID");
    }

    #[test]
    fn test_record_fields_keep_original_casing() {
        let record = Record::new(
            3,
            order_schema(),
            vec![Value::Int(10251), Value::from("VICTE"), Value::Float(41.34)],
        );

        assert_eq!(record.index(), 3);
        let names: Vec<&str> = record.fields().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["OrderID", "CustomerID", "Freight"]);
        assert_eq!(record.values()[1], Value::from("VICTE"));
    }
}
