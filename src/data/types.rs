use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::model::Value;
use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// ColumnType – the four user-facing type names
// ---------------------------------------------------------------------------

/// Type names accepted in `column_types`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Datetime,
    Int,
    Float,
    Str,
}

/// Storage type of a dataset column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeType {
    /// `datetime64[ns]`
    DateTime64,
    /// Nullable `Int64`
    Int64,
    /// `float64`
    Float64,
    /// `object`: strings and anything mixed
    Object,
}

impl ColumnType {
    pub const ALL: [ColumnType; 4] = [
        ColumnType::Datetime,
        ColumnType::Int,
        ColumnType::Float,
        ColumnType::Str,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ColumnType::Datetime => "datetime",
            ColumnType::Int => "int",
            ColumnType::Float => "float",
            ColumnType::Str => "str",
        }
    }

    pub fn to_native(self) -> NativeType {
        match self {
            ColumnType::Datetime => NativeType::DateTime64,
            ColumnType::Int => NativeType::Int64,
            ColumnType::Float => NativeType::Float64,
            ColumnType::Str => NativeType::Object,
        }
    }

    pub fn from_native(native: NativeType) -> Self {
        match native {
            NativeType::DateTime64 => ColumnType::Datetime,
            NativeType::Int64 => ColumnType::Int,
            NativeType::Float64 => ColumnType::Float,
            NativeType::Object => ColumnType::Str,
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnType::Int | ColumnType::Float)
    }
}

impl FromStr for ColumnType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ColumnType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::UnsupportedType(s.to_string()))
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl NativeType {
    pub fn as_str(self) -> &'static str {
        match self {
            NativeType::DateTime64 => "datetime64[ns]",
            NativeType::Int64 => "Int64",
            NativeType::Float64 => "float64",
            NativeType::Object => "object",
        }
    }
}

impl fmt::Display for NativeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Casting
// ---------------------------------------------------------------------------

/// Convert a value to the native representation of `ty`.
///
/// Nulls stay null. Empty text becomes null for every type except `str`.
pub fn cast(value: &Value, ty: ColumnType) -> Result<Value> {
    match (value, ty) {
        (Value::Null, _) => Ok(Value::Null),
        (Value::Str(s), ColumnType::Str) => Ok(Value::Str(s.clone())),
        (other, ColumnType::Str) => Ok(Value::Str(other.to_canonical_string())),
        (Value::Str(s), _) if s.trim().is_empty() => Ok(Value::Null),

        (Value::Int(i), ColumnType::Int) => Ok(Value::Int(*i)),
        (Value::Float(v), ColumnType::Int) => {
            if v.is_nan() {
                Ok(Value::Null)
            } else if v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
                Ok(Value::Int(*v as i64))
            } else {
                Err(Error::coercion(v, ty, "not an integer"))
            }
        }
        (Value::Str(s), ColumnType::Int) => s
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|e| Error::coercion(s, ty, e)),
        (Value::DateTime(dt), ColumnType::Int) => dt
            .and_utc()
            .timestamp_nanos_opt()
            .map(Value::Int)
            .ok_or_else(|| Error::coercion(dt, ty, "out of range for nanoseconds")),

        (Value::Float(v), ColumnType::Float) => Ok(Value::Float(*v)),
        (Value::Int(i), ColumnType::Float) => Ok(Value::Float(*i as f64)),
        (Value::Str(s), ColumnType::Float) => s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|e| Error::coercion(s, ty, e)),
        (Value::DateTime(dt), ColumnType::Float) => {
            Err(Error::coercion(dt, ty, "datetimes cannot be converted to float"))
        }

        (Value::DateTime(dt), ColumnType::Datetime) => Ok(Value::DateTime(*dt)),
        (Value::Str(s), ColumnType::Datetime) => parse_datetime(s)
            .map(Value::DateTime)
            .ok_or_else(|| Error::coercion(s, ty, "unrecognised datetime format")),
        (Value::Int(ns), ColumnType::Datetime) => Ok(Value::DateTime(
            DateTime::from_timestamp_nanos(*ns).naive_utc(),
        )),
        (Value::Float(v), ColumnType::Datetime) => {
            Err(Error::coercion(v, ty, "floats cannot be converted to datetime"))
        }
    }
}

/// Cast one ad-hoc textual value without touching a column.
pub fn cast_single(value: &str, ty: ColumnType) -> Result<Value> {
    cast(&Value::Str(value.to_string()), ty)
}

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parse an ISO-8601-like timestamp. Offsets are normalised to UTC.
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(dt.naive_utc());
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(dt.naive_utc());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_names_map_both_ways() {
        for ty in ColumnType::ALL {
            assert_eq!(ColumnType::from_native(ty.to_native()), ty);
            assert_eq!(ty.as_str().parse::<ColumnType>().unwrap(), ty);
        }
        assert_eq!(ColumnType::Int.to_native().as_str(), "Int64");
    }

    #[test]
    fn unknown_type_name_is_rejected() {
        let err = "double".parse::<ColumnType>().unwrap_err();
        assert!(matches!(err, Error::UnsupportedType(name) if name == "double"));
    }

    #[test]
    fn non_numeric_text_fails_float_cast() {
        let err = cast_single("fast", ColumnType::Float).unwrap_err();
        assert!(matches!(err, Error::TypeCoercion { .. }));
    }

    #[test]
    fn fractional_float_is_not_an_int() {
        assert_eq!(cast(&Value::Float(4.0), ColumnType::Int).unwrap(), Value::Int(4));
        assert!(cast(&Value::Float(4.5), ColumnType::Int).is_err());
    }

    #[test]
    fn datetime_accepts_iso_forms() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(12, 30, 0)
            .unwrap();
        for text in [
            "2024-03-01T12:30:00",
            "2024-03-01 12:30:00",
            "2024-03-01T12:30:00Z",
            "2024-03-01T13:30:00+01:00",
            "2024-03-01 12:30",
        ] {
            assert_eq!(
                cast_single(text, ColumnType::Datetime).unwrap(),
                Value::DateTime(expected),
                "{text}"
            );
        }
        assert!(cast_single("yesterday", ColumnType::Datetime).is_err());
    }

    #[test]
    fn native_timestamp_passes_through() {
        let dt = parse_datetime("2023-11-05").unwrap();
        assert_eq!(cast(&Value::DateTime(dt), ColumnType::Datetime).unwrap(), Value::DateTime(dt));
        let ns = dt.and_utc().timestamp_nanos_opt().unwrap();
        assert_eq!(cast(&Value::Int(ns), ColumnType::Datetime).unwrap(), Value::DateTime(dt));
    }

    #[test]
    fn canonical_text_survives_recast() {
        for (value, ty) in [
            (Value::Float(2.5), ColumnType::Float),
            (Value::Float(3.0), ColumnType::Float),
            (Value::Int(-7), ColumnType::Int),
            (
                Value::DateTime(parse_datetime("2024-01-02T03:04:05.250").unwrap()),
                ColumnType::Datetime,
            ),
        ] {
            let text = value.to_canonical_string();
            assert_eq!(cast_single(&text, ty).unwrap(), value, "{text}");
        }
    }

    #[test]
    fn empty_text_is_null_except_for_str() {
        assert_eq!(cast_single("", ColumnType::Int).unwrap(), Value::Null);
        assert_eq!(cast_single("", ColumnType::Str).unwrap(), Value::Str(String::new()));
    }
}
