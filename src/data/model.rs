use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::NaiveDateTime;

use super::types::{ColumnType, NativeType};

// ---------------------------------------------------------------------------
// Value – a single cell in a dataset column
// ---------------------------------------------------------------------------

/// A dynamically-typed cell mirroring the four supported column dtypes.
/// Distinct values are collected in `BTreeSet`s so `Value` must be `Ord`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Str(String),
    DateTime(NaiveDateTime),
}

// -- Manual Eq/Ord so we can put Value in BTreeSet --

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use Value::*;
        fn discriminant(v: &Value) -> u8 {
            match v {
                Null => 0,
                Int(_) => 1,
                Float(_) => 2,
                DateTime(_) => 3,
                Str(_) => 4,
            }
        }
        match (self, other) {
            (Null, Null) => std::cmp::Ordering::Equal,
            (Int(a), Int(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (DateTime(a), DateTime(b)) => a.cmp(b),
            (Str(a), Str(b)) => a.cmp(b),
            _ => discriminant(self).cmp(&discriminant(other)),
        }
    }
}

impl std::hash::Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Str(s) => s.hash(state),
            Value::Int(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::DateTime(dt) => dt.hash(state),
            Value::Null => {}
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "<null>"),
            other => f.write_str(&other.to_canonical_string()),
        }
    }
}

impl Value {
    /// Textual form that casts back to the same value through its type.
    pub fn to_canonical_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Int(i) => i.to_string(),
            Value::Float(v) => v.to_string(),
            Value::Str(s) => s.clone(),
            Value::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
        }
    }

    /// Try to interpret the value as an `f64` for scaling.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::DateTime(v)
    }
}

/// Infer the storage type of a column from its values.
pub fn infer_dtype<'a>(values: impl IntoIterator<Item = &'a Value>) -> NativeType {
    let mut dtype: Option<NativeType> = None;
    for value in values {
        let this = match value {
            Value::Null => continue,
            Value::Int(_) => NativeType::Int64,
            Value::Float(_) => NativeType::Float64,
            Value::DateTime(_) => NativeType::DateTime64,
            Value::Str(_) => return NativeType::Object,
        };
        dtype = Some(match (dtype, this) {
            (None, t) => t,
            (Some(a), b) if a == b => a,
            (Some(NativeType::Int64), NativeType::Float64)
            | (Some(NativeType::Float64), NativeType::Int64) => NativeType::Float64,
            _ => return NativeType::Object,
        });
    }
    dtype.unwrap_or(NativeType::Object)
}

// ---------------------------------------------------------------------------
// Dataset – the complete loaded table
// ---------------------------------------------------------------------------

/// One row: column_name → value. Missing keys read as null.
pub type Record = BTreeMap<String, Value>;

/// Per-row selection produced by the filter engine.
pub type Mask = Vec<bool>;

static NULL: Value = Value::Null;

/// The full table with its column order and per-column dtypes.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    /// All rows.
    pub rows: Vec<Record>,
    /// Ordered, unique column names.
    pub column_names: Vec<String>,
    /// Storage type of each column.
    pub dtypes: BTreeMap<String, NativeType>,
}

impl Dataset {
    /// Build a dataset from rows, keeping `column_names` order and inferring dtypes.
    /// Columns seen in rows but not named are appended in sorted order.
    pub fn from_rows(column_names: Vec<String>, rows: Vec<Record>) -> Self {
        let mut names = Vec::with_capacity(column_names.len());
        let mut seen = BTreeSet::new();
        for name in column_names {
            if seen.insert(name.clone()) {
                names.push(name);
            }
        }
        let extra: BTreeSet<&String> = rows
            .iter()
            .flat_map(|r| r.keys())
            .filter(|k| !seen.contains(*k))
            .collect();
        names.extend(extra.into_iter().cloned());

        let mut dataset = Dataset {
            rows,
            column_names: names,
            dtypes: BTreeMap::new(),
        };
        dataset.refresh_dtypes();
        dataset
    }

    /// Build a dataset column by column. Columns must have equal length.
    pub fn from_columns<S: Into<String>>(columns: Vec<(S, Vec<Value>)>) -> Self {
        let columns: Vec<(String, Vec<Value>)> =
            columns.into_iter().map(|(n, v)| (n.into(), v)).collect();
        let n_rows = columns.iter().map(|(_, v)| v.len()).max().unwrap_or(0);
        let mut rows = vec![Record::new(); n_rows];
        for (name, values) in &columns {
            for (row, value) in rows.iter_mut().zip(values) {
                row.insert(name.clone(), value.clone());
            }
        }
        Self::from_rows(columns.into_iter().map(|(n, _)| n).collect(), rows)
    }

    fn refresh_dtypes(&mut self) {
        self.dtypes = self
            .column_names
            .iter()
            .map(|c| (c.clone(), infer_dtype(self.rows.iter().map(|r| r.get(c).unwrap_or(&NULL)))))
            .collect();
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the dataset is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.dtypes.contains_key(column)
    }

    pub fn dtype(&self, column: &str) -> Option<NativeType> {
        self.dtypes.get(column).copied()
    }

    /// The user-facing type matching a column's storage type.
    pub fn column_type(&self, column: &str) -> Option<ColumnType> {
        self.dtype(column).map(ColumnType::from_native)
    }

    pub fn value(&self, row: usize, column: &str) -> &Value {
        self.rows[row].get(column).unwrap_or(&NULL)
    }

    /// Values of one column in row order.
    pub fn column<'a>(&'a self, column: &'a str) -> impl Iterator<Item = &'a Value> + 'a {
        self.rows.iter().map(move |r| r.get(column).unwrap_or(&NULL))
    }

    /// Sorted distinct non-null values of a column, optionally restricted to masked rows.
    pub fn distinct_values(&self, column: &str, mask: Option<&[bool]>) -> Vec<Value> {
        self.column(column)
            .enumerate()
            .filter(|(i, v)| !v.is_null() && mask.map_or(true, |m| m[*i]))
            .map(|(_, v)| v.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Replace a column's values and record its new dtype.
    pub fn set_column(&mut self, column: &str, values: Vec<Value>, dtype: NativeType) {
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.insert(column.to_string(), value);
        }
        self.dtypes.insert(column.to_string(), dtype);
    }

    /// Stable sort on `(column, descending)` keys, in order; nulls sort first
    /// in ascending keys.
    pub fn sort_by_columns(&mut self, keys: &[(&str, bool)]) {
        self.rows.sort_by(|a, b| {
            for (c, descending) in keys {
                let ord = a.get(*c).unwrap_or(&NULL).cmp(b.get(*c).unwrap_or(&NULL));
                if ord != std::cmp::Ordering::Equal {
                    return if *descending { ord.reverse() } else { ord };
                }
            }
            std::cmp::Ordering::Equal
        });
    }

    /// Rows passing `mask`, restricted to `columns` (all columns when empty).
    pub fn select(&self, mask: &[bool], columns: &[String]) -> Dataset {
        let columns: Vec<String> = if columns.is_empty() {
            self.column_names.clone()
        } else {
            columns.to_vec()
        };
        let rows = self
            .rows
            .iter()
            .zip(mask)
            .filter(|(_, keep)| **keep)
            .map(|(r, _)| {
                columns
                    .iter()
                    .map(|c| (c.clone(), r.get(c).cloned().unwrap_or(Value::Null)))
                    .collect()
            })
            .collect();
        let dtypes = columns
            .iter()
            .filter_map(|c| self.dtypes.get(c).map(|t| (c.clone(), *t)))
            .collect();
        Dataset {
            rows,
            column_names: columns,
            dtypes,
        }
    }
}

/// Indices of rows selected by a mask.
pub fn mask_indices(mask: &[bool]) -> Vec<usize> {
    mask.iter()
        .enumerate()
        .filter(|(_, keep)| **keep)
        .map(|(i, _)| i)
        .collect()
}
