use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::model::{Dataset, Mask, Value};
use super::types::{cast_single, ColumnType};
use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Filter clauses: (column, operator, value)
// ---------------------------------------------------------------------------

/// Comparison operator of a filter clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">=")]
    Ge,
}

impl Operator {
    pub const ALL: [Operator; 6] = [
        Operator::Eq,
        Operator::Ne,
        Operator::Lt,
        Operator::Gt,
        Operator::Le,
        Operator::Ge,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Gt => ">",
            Operator::Le => "<=",
            Operator::Ge => ">=",
        }
    }

    fn holds(self, ord: Option<Ordering>) -> bool {
        match self {
            Operator::Eq => ord == Some(Ordering::Equal),
            Operator::Ne => ord != Some(Ordering::Equal),
            Operator::Lt => ord == Some(Ordering::Less),
            Operator::Gt => ord == Some(Ordering::Greater),
            Operator::Le => matches!(ord, Some(Ordering::Less | Ordering::Equal)),
            Operator::Ge => matches!(ord, Some(Ordering::Greater | Ordering::Equal)),
        }
    }
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        Operator::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| format!("unknown comparison operator '{s}'"))
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One filter condition. The value is kept as canonical text and cast to the
/// column's type when evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FilterClause {
    pub column: String,
    pub op: Operator,
    pub value: String,
}

impl FilterClause {
    pub fn new(column: impl Into<String>, op: Operator, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    /// A series entry: an implicit equality.
    pub fn series(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(column, Operator::Eq, value)
    }
}

impl fmt::Display for FilterClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.column, self.op, self.value)
    }
}

/// Which list a clause belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterKind {
    And,
    Or,
    Series,
}

impl FilterKind {
    pub const ALL: [FilterKind; 3] = [FilterKind::And, FilterKind::Or, FilterKind::Series];
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FilterKind::And => "and",
            FilterKind::Or => "or",
            FilterKind::Series => "series",
        })
    }
}

/// The three independent, ordered clause lists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSet {
    pub and_filters: Vec<FilterClause>,
    pub or_filters: Vec<FilterClause>,
    pub series: Vec<FilterClause>,
}

impl FilterSet {
    pub fn get(&self, kind: FilterKind) -> &Vec<FilterClause> {
        match kind {
            FilterKind::And => &self.and_filters,
            FilterKind::Or => &self.or_filters,
            FilterKind::Series => &self.series,
        }
    }

    pub fn get_mut(&mut self, kind: FilterKind) -> &mut Vec<FilterClause> {
        match kind {
            FilterKind::And => &mut self.and_filters,
            FilterKind::Or => &mut self.or_filters,
            FilterKind::Series => &mut self.series,
        }
    }

    /// Every clause with the list it belongs to.
    pub fn iter(&self) -> impl Iterator<Item = (FilterKind, &FilterClause)> {
        FilterKind::ALL
            .into_iter()
            .flat_map(move |k| self.get(k).iter().map(move |c| (k, c)))
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Compare a cell with a clause value. `None` when the two cannot be ordered
/// (nulls, mismatched types).
fn compare(cell: &Value, target: &Value) -> Option<Ordering> {
    match (cell, target) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Float(_) | Value::Int(_), Value::Float(_) | Value::Int(_)) => {
            cell.as_f64()?.partial_cmp(&target.as_f64()?)
        }
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Type used to interpret a clause's column: declared first, native otherwise.
pub fn clause_type(
    dataset: &Dataset,
    column: &str,
    column_types: &BTreeMap<String, ColumnType>,
) -> Result<ColumnType> {
    let native = dataset
        .column_type(column)
        .ok_or_else(|| Error::ColumnNotFound(column.to_string()))?;
    Ok(column_types.get(column).copied().unwrap_or(native))
}

/// Per-row result of a single clause.
///
/// An empty clause value means null: `==` selects null cells, `!=` non-null ones.
pub fn row_filter(
    dataset: &Dataset,
    clause: &FilterClause,
    column_types: &BTreeMap<String, ColumnType>,
) -> Result<Mask> {
    log::debug!("Applying row filter condition: {clause}");
    let ty = clause_type(dataset, &clause.column, column_types)?;
    let target = if clause.value.is_empty() {
        Value::Null
    } else {
        cast_single(&clause.value, ty)?
    };

    let mask = dataset
        .column(&clause.column)
        .map(|cell| match (&target, clause.op) {
            (Value::Null, Operator::Eq) => cell.is_null(),
            (Value::Null, _) => !cell.is_null(),
            _ => clause.op.holds(compare(cell, &target)),
        })
        .collect();
    Ok(mask)
}

fn combine(
    dataset: &Dataset,
    clauses: &[FilterClause],
    column_types: &BTreeMap<String, ColumnType>,
    conjoin: bool,
) -> Result<Mask> {
    // No clauses impose no restriction, for OR lists as well as AND lists.
    if clauses.is_empty() {
        return Ok(vec![true; dataset.len()]);
    }
    let mut acc = vec![conjoin; dataset.len()];
    for clause in clauses {
        let m = row_filter(dataset, clause, column_types)?;
        for (a, b) in acc.iter_mut().zip(m) {
            *a = if conjoin { *a && b } else { *a || b };
        }
    }
    Ok(acc)
}

/// Row mask for a filter set: AND-clauses ∧ (OR-clauses) ∧ (series).
pub fn evaluate(
    dataset: &Dataset,
    filters: &FilterSet,
    column_types: &BTreeMap<String, ColumnType>,
) -> Result<Mask> {
    let and_mask = combine(dataset, &filters.and_filters, column_types, true)?;
    let or_mask = combine(dataset, &filters.or_filters, column_types, false)?;
    let series_mask = combine(dataset, &filters.series, column_types, false)?;

    Ok(and_mask
        .into_iter()
        .zip(or_mask)
        .zip(series_mask)
        .map(|((a, o), s)| a && o && s)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset() -> Dataset {
        Dataset::from_columns(vec![
            ("tasks", vec![1i64.into(), 2i64.into(), 4i64.into(), 8i64.into()]),
            ("cpus", vec![1i64.into(), 2i64.into(), 1i64.into(), 2i64.into()]),
            ("system", vec!["a".into(), "b".into(), "a".into(), Value::Null]),
            ("speed", vec![Value::Float(1.5), Value::Float(2.0), Value::Float(3.0), Value::Float(4.0)]),
        ])
    }

    #[test]
    fn empty_filter_set_selects_everything() {
        let mask = evaluate(&dataset(), &FilterSet::default(), &BTreeMap::new()).unwrap();
        assert_eq!(mask, vec![true; 4]);
    }

    #[test]
    fn and_or_series_compose() {
        let filters = FilterSet {
            and_filters: vec![FilterClause::new("tasks", Operator::Gt, "1")],
            or_filters: vec![
                FilterClause::new("system", Operator::Eq, "a"),
                FilterClause::new("speed", Operator::Ge, "4"),
            ],
            series: vec![FilterClause::series("cpus", "1"), FilterClause::series("cpus", "2")],
        };
        let mask = evaluate(&dataset(), &filters, &BTreeMap::new()).unwrap();
        assert_eq!(mask, vec![false, false, true, true]);
    }

    #[test]
    fn empty_or_list_does_not_exclude_rows() {
        let filters = FilterSet {
            and_filters: vec![FilterClause::new("cpus", Operator::Eq, "2")],
            ..Default::default()
        };
        let mask = evaluate(&dataset(), &filters, &BTreeMap::new()).unwrap();
        assert_eq!(mask, vec![false, true, false, true]);
    }

    #[test]
    fn null_cells_only_pass_not_equal() {
        let ds = dataset();
        let ne = row_filter(&ds, &FilterClause::new("system", Operator::Ne, "a"), &BTreeMap::new()).unwrap();
        assert_eq!(ne, vec![false, true, false, true]);
        let is_null = row_filter(&ds, &FilterClause::new("system", Operator::Eq, ""), &BTreeMap::new()).unwrap();
        assert_eq!(is_null, vec![false, false, false, true]);
    }

    #[test]
    fn declared_type_drives_value_cast() {
        let ds = dataset();
        let mut types = BTreeMap::new();
        types.insert("speed".to_string(), ColumnType::Float);
        let m = row_filter(&ds, &FilterClause::new("speed", Operator::Lt, "2"), &types).unwrap();
        assert_eq!(m, vec![true, false, false, false]);

        let err = row_filter(&ds, &FilterClause::new("speed", Operator::Lt, "slow"), &types).unwrap_err();
        assert!(matches!(err, Error::TypeCoercion { .. }));
    }

    #[test]
    fn unknown_column_is_reported() {
        let filters = FilterSet {
            or_filters: vec![FilterClause::new("nodes", Operator::Eq, "1")],
            ..Default::default()
        };
        let err = evaluate(&dataset(), &filters, &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, Error::ColumnNotFound(c) if c == "nodes"));
    }

    #[test]
    fn operators_parse_from_symbols() {
        for op in Operator::ALL {
            assert_eq!(op.as_str().parse::<Operator>().unwrap(), op);
        }
        assert!("=>".parse::<Operator>().is_err());
    }
}
