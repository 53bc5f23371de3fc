//! Dynamic field values and typed coercion.
//!
//! A [`Value`] is whatever a source hands back for one field. [`FromValue`]
//! converts it into a concrete Rust type, widening or parsing where the
//! conversion is lossless and rejecting everything else.

use chrono::{DateTime, NaiveDateTime, Utc};
use std::fmt;

/// One field value as produced by a sequential source.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL / missing value
    Null,
    /// Boolean
    Bool(bool),
    /// Signed integer (all integer widths are widened to i64)
    Int(i64),
    /// Floating point
    Float(f64),
    /// Text
    Text(String),
    /// Raw bytes
    Bytes(Vec<u8>),
    /// Point in time
    Timestamp(DateTime<Utc>),
}

impl Value {
    /// Short type name used in mismatch errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::Timestamp(_) => "timestamp",
        }
    }

    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => f.write_str(s),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
        }
    }
}

macro_rules! impl_from_primitive {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::$variant(v.into())
                }
            }
        )*
    };
}

impl_from_primitive!(
    bool => Bool,
    i8 => Int,
    i16 => Int,
    i32 => Int,
    i64 => Int,
    u8 => Int,
    u16 => Int,
    u32 => Int,
    f32 => Float,
    f64 => Float,
    String => Text,
    Vec<u8> => Bytes,
    DateTime<Utc> => Timestamp,
);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Why a value could not be converted. The accessor adds the field name.
#[derive(Debug, Clone, PartialEq)]
pub struct Mismatch {
    /// Requested Rust type
    pub expected: &'static str,
    /// Description of the stored value
    pub actual: String,
}

impl Mismatch {
    fn new(expected: &'static str, value: &Value) -> Self {
        let actual = match value {
            Value::Text(s) => format!("text {:?}", s),
            Value::Null | Value::Bytes(_) => value.type_name().to_string(),
            other => format!("{} {}", other.type_name(), other),
        };
        Self { expected, actual }
    }
}

/// Conversion from a stored [`Value`] into a concrete type.
pub trait FromValue: Sized {
    /// Convert, or report the mismatch.
    fn from_value(value: &Value) -> std::result::Result<Self, Mismatch>;
}

impl FromValue for Value {
    fn from_value(value: &Value) -> std::result::Result<Self, Mismatch> {
        Ok(value.clone())
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> std::result::Result<Self, Mismatch> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> std::result::Result<Self, Mismatch> {
        match value {
            Value::Int(i) => Ok(*i),
            Value::Bool(b) => Ok(i64::from(*b)),
            Value::Float(x) if x.fract() == 0.0 && x.is_finite() => {
                if *x >= i64::MIN as f64 && *x < i64::MAX as f64 {
                    Ok(*x as i64)
                } else {
                    Err(Mismatch::new("i64", value))
                }
            }
            Value::Text(s) => s.trim().parse().map_err(|_| Mismatch::new("i64", value)),
            _ => Err(Mismatch::new("i64", value)),
        }
    }
}

macro_rules! impl_from_value_int {
    ($($t:ty),*) => {
        $(
            impl FromValue for $t {
                fn from_value(value: &Value) -> std::result::Result<Self, Mismatch> {
                    let wide = i64::from_value(value)
                        .map_err(|_| Mismatch::new(stringify!($t), value))?;
                    <$t>::try_from(wide).map_err(|_| Mismatch::new(stringify!($t), value))
                }
            }
        )*
    };
}

impl_from_value_int!(i8, i16, i32, u8, u16, u32, u64, usize);

impl FromValue for f64 {
    fn from_value(value: &Value) -> std::result::Result<Self, Mismatch> {
        match value {
            Value::Float(x) => Ok(*x),
            Value::Int(i) => Ok(*i as f64),
            Value::Text(s) => s.trim().parse().map_err(|_| Mismatch::new("f64", value)),
            _ => Err(Mismatch::new("f64", value)),
        }
    }
}

impl FromValue for f32 {
    fn from_value(value: &Value) -> std::result::Result<Self, Mismatch> {
        f64::from_value(value)
            .map(|x| x as f32)
            .map_err(|_| Mismatch::new("f32", value))
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> std::result::Result<Self, Mismatch> {
        match value {
            Value::Bool(b) => Ok(*b),
            Value::Int(i) => Ok(*i != 0),
            Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "t" | "yes" | "1" => Ok(true),
                "false" | "f" | "no" | "0" => Ok(false),
                _ => Err(Mismatch::new("bool", value)),
            },
            _ => Err(Mismatch::new("bool", value)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> std::result::Result<Self, Mismatch> {
        match value {
            Value::Null => Err(Mismatch::new("String", value)),
            Value::Bytes(b) => {
                String::from_utf8(b.clone()).map_err(|_| Mismatch::new("String", value))
            }
            other => Ok(other.to_string()),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> std::result::Result<Self, Mismatch> {
        match value {
            Value::Bytes(b) => Ok(b.clone()),
            Value::Text(s) => Ok(s.as_bytes().to_vec()),
            _ => Err(Mismatch::new("Vec<u8>", value)),
        }
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: &Value) -> std::result::Result<Self, Mismatch> {
        match value {
            Value::Timestamp(ts) => Ok(*ts),
            Value::Int(millis) => DateTime::from_timestamp_millis(*millis)
                .ok_or_else(|| Mismatch::new("DateTime<Utc>", value)),
            Value::Text(s) => parse_timestamp(s.trim())
                .ok_or_else(|| Mismatch::new("DateTime<Utc>", value)),
            _ => Err(Mismatch::new("DateTime<Utc>", value)),
        }
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_integer_widening_and_narrowing() {
        assert_eq!(i64::from_value(&Value::Int(42)), Ok(42));
        assert_eq!(i32::from_value(&Value::Int(-7)), Ok(-7));
        assert_eq!(u8::from_value(&Value::Int(255)), Ok(255));
        assert!(u8::from_value(&Value::Int(256)).is_err());
        assert!(u32::from_value(&Value::Int(-1)).is_err());
    }

    #[test]
    fn test_text_parsing() {
        assert_eq!(i64::from_value(&Value::from(" 10248 ")), Ok(10248));
        assert_eq!(f64::from_value(&Value::from("32.38")), Ok(32.38));
        assert_eq!(bool::from_value(&Value::from("Yes")), Ok(true));

        let err = i64::from_value(&Value::from("abc")).unwrap_err();
        assert_eq!(err.expected, "i64");
        assert_eq!(err.actual, "text \"abc\"");
    }

    #[test]
    fn test_float_to_int_requires_integral_value() {
        assert_eq!(i64::from_value(&Value::Float(3.0)), Ok(3));
        assert!(i64::from_value(&Value::Float(3.5)).is_err());
        assert!(i64::from_value(&Value::Float(f64::NAN)).is_err());
    }

    #[test]
    fn test_null_handling() {
        assert_eq!(Option::<i64>::from_value(&Value::Null), Ok(None));
        assert_eq!(Option::<i64>::from_value(&Value::Int(1)), Ok(Some(1)));
        assert!(i64::from_value(&Value::Null).is_err());
        assert!(String::from_value(&Value::Null).is_err());
        assert_eq!(Value::from(None::<i32>), Value::Null);
    }

    #[test]
    fn test_string_conversion() {
        assert_eq!(String::from_value(&Value::Int(5)), Ok("5".to_string()));
        assert_eq!(
            String::from_value(&Value::Bytes(b"VINET".to_vec())),
            Ok("VINET".to_string())
        );
        assert!(String::from_value(&Value::Bytes(vec![0xff, 0xfe])).is_err());
    }

    #[test]
    fn test_timestamp_conversion() {
        let expected = Utc.with_ymd_and_hms(1996, 7, 4, 0, 0, 0).unwrap();
        assert_eq!(
            DateTime::<Utc>::from_value(&Value::from("1996-07-04T00:00:00Z")),
            Ok(expected)
        );
        assert_eq!(
            DateTime::<Utc>::from_value(&Value::from("1996-07-04 00:00:00")),
            Ok(expected)
        );
        assert_eq!(
            DateTime::<Utc>::from_value(&Value::Int(expected.timestamp_millis())),
            Ok(expected)
        );
    }
}
