//! Resolution of the y-axis scale factor.

use std::collections::BTreeMap;

use crate::config::{Scaling, ScalingColumn};
use crate::data::filter::{row_filter, FilterClause, Operator};
use crate::data::model::{Dataset, Value};
use crate::data::types::ColumnType;
use crate::error::{Error, Result};

/// How the y-axis values are divided.
#[derive(Debug, Clone, PartialEq)]
pub enum Scale {
    /// One divisor for every row.
    Uniform(f64),
    /// One divisor per series, keyed by series clause index.
    PerSeries(Vec<(usize, f64)>),
}

/// Compute the scale factor for the y-axis.
///
/// A custom scaling returns its constant. A column scaling takes the distinct
/// values of the column over the rows in `mask`, narrowed to the series clause
/// at `series` and to rows whose x-axis value equals `x_value`; exactly one
/// value must remain. Returns `None` when no scaling is configured.
pub fn resolve(
    dataset: &Dataset,
    mask: &[bool],
    scaling: Option<&Scaling>,
    x_column: Option<&str>,
    series: &[FilterClause],
    column_types: &BTreeMap<String, ColumnType>,
) -> Result<Option<f64>> {
    match scaling {
        None => Ok(None),
        Some(Scaling::Custom(value)) => Ok(Some(*value)),
        Some(Scaling::Column(column)) => {
            resolve_column(dataset, mask, column, x_column, series, column_types).map(Some)
        }
    }
}

/// One scale per series clause: the column value at `x_value` within each
/// series, as used for baseline plots.
pub fn resolve_per_series(
    dataset: &Dataset,
    mask: &[bool],
    column: &ScalingColumn,
    x_column: Option<&str>,
    series: &[FilterClause],
    column_types: &BTreeMap<String, ColumnType>,
) -> Result<Vec<(usize, f64)>> {
    (0..series.len())
        .map(|index| {
            let column = ScalingColumn {
                series: Some(index),
                ..column.clone()
            };
            let scale = resolve_column(dataset, mask, &column, x_column, series, column_types)?;
            Ok((index, scale))
        })
        .collect()
}

/// Resolve the configured scaling. A column scaling with an x-axis value but
/// no series index is resolved per series when series are present.
pub fn resolve_scale(
    dataset: &Dataset,
    mask: &[bool],
    scaling: Option<&Scaling>,
    x_column: Option<&str>,
    series: &[FilterClause],
    column_types: &BTreeMap<String, ColumnType>,
) -> Result<Option<Scale>> {
    match scaling {
        Some(Scaling::Column(column))
            if column.series.is_none() && column.x_value.is_some() && !series.is_empty() =>
        {
            let scales = resolve_per_series(dataset, mask, column, x_column, series, column_types)?;
            Ok(Some(Scale::PerSeries(scales)))
        }
        _ => Ok(resolve(dataset, mask, scaling, x_column, series, column_types)?.map(Scale::Uniform)),
    }
}

fn resolve_column(
    dataset: &Dataset,
    mask: &[bool],
    column: &ScalingColumn,
    x_column: Option<&str>,
    series: &[FilterClause],
    column_types: &BTreeMap<String, ColumnType>,
) -> Result<f64> {
    let name = column.name.as_str();
    if !dataset.has_column(name) {
        return Err(Error::ScalingColumnNotFound(format!("column '{name}' is not in the dataset")));
    }

    let mut rows = mask.to_vec();
    if let Some(index) = column.series {
        let clause = series.get(index).ok_or_else(|| {
            Error::ScalingColumnNotFound(format!("series index {index} (only {} series)", series.len()))
        })?;
        narrow(&mut rows, &row_filter(dataset, clause, column_types)?);
    }
    if let Some(x_value) = &column.x_value {
        let x_column = x_column.ok_or_else(|| {
            Error::ScalingColumnNotFound(format!("x-axis value '{x_value}' without an x-axis column"))
        })?;
        let clause = FilterClause::new(x_column, Operator::Eq, x_value.clone());
        narrow(&mut rows, &row_filter(dataset, &clause, column_types)?);
        if !rows.iter().any(|r| *r) {
            return Err(Error::ScalingColumnNotFound(format!(
                "x-axis value '{x_value}' in column '{x_column}'"
            )));
        }
    }

    let candidates = dataset.distinct_values(name, Some(rows.as_slice()));
    log::debug!("Scaling candidates in '{name}': {candidates:?}");
    match candidates.as_slice() {
        [] => Err(Error::ScalingColumnNotFound(format!("no value of '{name}' survives filtering"))),
        [value] => numeric(value, name),
        _ => Err(Error::AmbiguousScaling {
            column: name.to_string(),
            candidates: candidates.len(),
        }),
    }
}

fn narrow(rows: &mut [bool], keep: &[bool]) {
    for (r, k) in rows.iter_mut().zip(keep) {
        *r &= *k;
    }
}

fn numeric(value: &Value, column: &str) -> Result<f64> {
    value
        .as_f64()
        .ok_or_else(|| Error::coercion(value, "float", format!("scaling column '{column}' must be numeric")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset() -> Dataset {
        Dataset::from_columns(vec![
            ("tasks", vec![Value::Int(1), Value::Int(2), Value::Int(4), Value::Int(1), Value::Int(2), Value::Int(4)]),
            ("cpus", vec![Value::Int(1), Value::Int(1), Value::Int(1), Value::Int(2), Value::Int(2), Value::Int(2)]),
            (
                "speed",
                vec![
                    Value::Float(1.0),
                    Value::Float(2.0),
                    Value::Float(3.0),
                    Value::Float(1.5),
                    Value::Float(2.5),
                    Value::Float(3.5),
                ],
            ),
            ("label", vec!["a".into(), "a".into(), "a".into(), "a".into(), "a".into(), "a".into()]),
        ])
    }

    fn by_column(name: &str, series: Option<usize>, x_value: Option<&str>) -> Scaling {
        Scaling::Column(ScalingColumn {
            name: name.into(),
            series,
            x_value: x_value.map(str::to_string),
        })
    }

    fn series() -> Vec<FilterClause> {
        vec![FilterClause::series("cpus", "1"), FilterClause::series("cpus", "2")]
    }

    #[test]
    fn custom_value_bypasses_the_dataset() {
        let scale = resolve(&dataset(), &[false; 6], Some(&Scaling::Custom(8.0)), None, &[], &BTreeMap::new());
        assert_eq!(scale.unwrap(), Some(8.0));
        assert_eq!(resolve(&dataset(), &[true; 6], None, None, &[], &BTreeMap::new()).unwrap(), None);
    }

    #[test]
    fn x_value_selects_the_matching_row() {
        let mask = [true, true, true, false, false, false];
        let scaling = by_column("speed", None, Some("2"));
        let scale = resolve(&dataset(), &mask, Some(&scaling), Some("tasks"), &series(), &BTreeMap::new());
        assert_eq!(scale.unwrap(), Some(2.0));
    }

    #[test]
    fn several_candidates_are_ambiguous() {
        let mask = [true, true, true, false, false, false];
        let scaling = by_column("speed", None, None);
        let err = resolve(&dataset(), &mask, Some(&scaling), Some("tasks"), &[], &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, Error::AmbiguousScaling { candidates: 3, .. }));
    }

    #[test]
    fn series_and_x_value_together_disambiguate() {
        let scaling = by_column("speed", Some(1), Some("4"));
        let scale = resolve(&dataset(), &[true; 6], Some(&scaling), Some("tasks"), &series(), &BTreeMap::new());
        assert_eq!(scale.unwrap(), Some(3.5));
    }

    #[test]
    fn missing_column_series_or_x_value_is_not_found() {
        let ds = dataset();
        let types = BTreeMap::new();
        for scaling in [
            by_column("flops", None, None),
            by_column("speed", Some(5), Some("1")),
            by_column("speed", Some(0), Some("16")),
        ] {
            let err = resolve(&ds, &[true; 6], Some(&scaling), Some("tasks"), &series(), &types).unwrap_err();
            assert!(matches!(err, Error::ScalingColumnNotFound(_)), "{scaling:?}: {err}");
        }
    }

    #[test]
    fn non_numeric_scaling_value_is_rejected() {
        let scaling = by_column("label", None, None);
        let err = resolve(&dataset(), &[true; 6], Some(&scaling), None, &[], &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, Error::TypeCoercion { .. }));
    }

    #[test]
    fn resolving_twice_gives_the_same_scale() {
        let ds = dataset();
        let scaling = by_column("speed", Some(0), Some("1"));
        let first = resolve(&ds, &[true; 6], Some(&scaling), Some("tasks"), &series(), &BTreeMap::new()).unwrap();
        let second = resolve(&ds, &[true; 6], Some(&scaling), Some("tasks"), &series(), &BTreeMap::new()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, Some(1.0));
    }

    #[test]
    fn x_value_without_series_index_scales_each_series() {
        let ds = dataset();
        let scaling = by_column("speed", None, Some("1"));
        let types = BTreeMap::new();
        let scale = resolve_scale(&ds, &[true; 6], Some(&scaling), Some("tasks"), &series(), &types).unwrap();
        assert_eq!(scale, Some(Scale::PerSeries(vec![(0, 1.0), (1, 1.5)])));

        let err = resolve(&ds, &[true; 6], Some(&scaling), Some("tasks"), &series(), &types).unwrap_err();
        assert!(matches!(err, Error::AmbiguousScaling { candidates: 2, .. }));
    }

    #[test]
    fn single_scale_stays_uniform() {
        let scaling = by_column("speed", Some(1), Some("2"));
        let scale = resolve_scale(&dataset(), &[true; 6], Some(&scaling), Some("tasks"), &series(), &BTreeMap::new());
        assert_eq!(scale.unwrap(), Some(Scale::Uniform(2.5)));
    }
}
