use std::collections::BTreeMap;

use crate::config::{Axis, AxisKind, Config, Scaling, SortOrder, Units};
use crate::data::filter::{evaluate, row_filter, FilterClause};
use crate::data::model::{Dataset, Mask, Value};
use crate::data::types::{cast, ColumnType, NativeType};
use crate::error::{Error, Result};
use crate::scaling::{self, Scale};

// ---------------------------------------------------------------------------
// Plot-ready output
// ---------------------------------------------------------------------------

/// What a renderer needs: the selected rows, the columns to show and the
/// axis labels. The y column is already divided by `scale`.
#[derive(Debug, Clone, PartialEq)]
pub struct PlotData {
    /// Rows passing the filters, restricted to `columns`.
    pub dataset: Dataset,
    /// Plot columns followed by extra columns.
    pub columns: Vec<String>,
    pub x_column: String,
    pub y_column: String,
    pub scale: Option<Scale>,
    pub x_label: String,
    pub y_label: String,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Owns a dataset for the duration of a session and turns it into plot data.
///
/// The dataset handed to [`Pipeline::new`] is kept untouched; every run
/// starts again from it, so coercions never compound.
#[derive(Debug, Clone)]
pub struct Pipeline {
    original: Dataset,
    /// Working copy: coerced and sorted by the last successful run.
    dataset: Dataset,
    /// Rows of `dataset` selected by the last successful run.
    mask: Mask,
}

impl Pipeline {
    pub fn new(dataset: Dataset) -> Self {
        let mask = vec![true; dataset.len()];
        Self {
            original: dataset.clone(),
            dataset,
            mask,
        }
    }

    /// The dataset as it was loaded.
    pub fn original(&self) -> &Dataset {
        &self.original
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn mask(&self) -> &[bool] {
        &self.mask
    }

    /// Drop all coercions and selection.
    pub fn reset(&mut self) {
        self.dataset = self.original.clone();
        self.mask = vec![true; self.dataset.len()];
    }

    /// Reset the working copy and coerce every column with a declared type.
    /// On failure the working copy is left as it was.
    pub fn apply_column_types(&mut self, config: &Config) -> Result<()> {
        let coerced = coerce(&self.original, &config.column_types)?;
        self.mask = vec![true; coerced.len()];
        self.dataset = coerced;
        Ok(())
    }

    /// Validate, coerce, sort, filter, scale and label.
    ///
    /// All work happens on a fresh copy of the original dataset, which
    /// replaces the working copy only once every step has succeeded.
    pub fn run(&mut self, config: &Config) -> Result<PlotData> {
        config.validate(Some(&self.original))?;
        let mut config = config.clone();
        config.parse_columns(Some(&self.original));

        let x_column = required(&config.x_axis, AxisKind::X)?;
        let y_column = required(&config.y_axis, AxisKind::Y)?;

        let mut dataset = coerce(&self.original, &config.column_types)?;

        let descending = config.x_axis.sort == Some(SortOrder::Descending);
        let mut sort_keys = vec![(x_column.as_str(), descending)];
        sort_keys.extend(config.series_columns().first().map(|s| (s.as_str(), false)));
        dataset.sort_by_columns(&sort_keys);

        let mask = evaluate(&dataset, &config.filters, &config.column_types)?;
        let selected = mask.iter().filter(|m| **m).count();
        if selected == 0 {
            return Err(Error::EmptySelection);
        }

        let series_count = config.filters.series.len().max(1);
        let expected = series_count * dataset.distinct_values(&x_column, Some(mask.as_slice())).len();
        if selected > expected {
            return Err(Error::UnexpectedRowCount {
                rows: selected,
                expected,
            });
        }

        let scale = scaling::resolve_scale(
            &dataset,
            &mask,
            config.scaling(),
            Some(&x_column),
            &config.filters.series,
            &config.column_types,
        )?;

        let mut columns: Vec<String> = config.plot_columns().to_vec();
        for extra in &config.extra_columns {
            if !columns.contains(extra) {
                columns.push(extra.clone());
            }
        }
        let mut plot = dataset.select(&mask, &columns);
        if let Some(scale) = &scale {
            let divisors = row_divisors(&plot, scale, &config.filters.series, &config.column_types)?;
            divide_column(&mut plot, &y_column, &divisors)?;
        }

        let x_label = axis_label(&plot, &config.x_axis, &x_column, &config.filters.series)?;
        let y_label = axis_label(&plot, &config.y_axis, &y_column, &config.filters.series)?;

        log::info!(
            "Selected {selected} of {} rows for '{}' ({} columns, scale {scale:?})",
            dataset.len(),
            config.title.as_deref().unwrap_or_default(),
            columns.len()
        );

        self.dataset = dataset;
        self.mask = mask;
        Ok(PlotData {
            dataset: plot,
            columns,
            x_column,
            y_column,
            scale,
            x_label,
            y_label,
        })
    }
}

fn required(axis: &Axis, kind: AxisKind) -> Result<String> {
    axis.value
        .clone()
        .ok_or_else(|| Error::ConfigValidation(vec![format!("Missing {kind}-axis value information.")]))
}

/// Copy `original` and cast each typed column present in it.
fn coerce(original: &Dataset, column_types: &BTreeMap<String, ColumnType>) -> Result<Dataset> {
    let mut dataset = original.clone();
    for (column, ty) in column_types {
        if !dataset.has_column(column) {
            log::debug!("Skipping type '{ty}' for absent column '{column}'");
            continue;
        }
        if dataset.dtype(column) == Some(ty.to_native()) {
            continue;
        }
        let values = dataset
            .column(column)
            .map(|v| cast(v, *ty))
            .collect::<Result<Vec<_>>>()?;
        log::debug!("Coerced column '{column}' to {ty}");
        dataset.set_column(column, values, ty.to_native());
    }
    Ok(dataset)
}

/// Divisor for each row of `dataset`. Per-series scales apply to the rows
/// matching their series clause.
fn row_divisors(
    dataset: &Dataset,
    scale: &Scale,
    series: &[FilterClause],
    column_types: &BTreeMap<String, ColumnType>,
) -> Result<Vec<f64>> {
    match scale {
        Scale::Uniform(value) => Ok(vec![*value; dataset.len()]),
        Scale::PerSeries(scales) => {
            let mut divisors = vec![1.0; dataset.len()];
            for (index, value) in scales {
                let Some(clause) = series.get(*index) else {
                    continue;
                };
                let rows = row_filter(dataset, clause, column_types)?;
                for (divisor, _) in divisors.iter_mut().zip(rows).filter(|(_, hit)| *hit) {
                    *divisor = *value;
                }
            }
            Ok(divisors)
        }
    }
}

fn divide_column(dataset: &mut Dataset, column: &str, divisors: &[f64]) -> Result<()> {
    let values = dataset
        .column(column)
        .zip(divisors)
        .map(|(v, scale)| match v {
            Value::Null => Ok(Value::Null),
            other => other
                .as_f64()
                .map(|x| Value::Float(x / scale))
                .ok_or_else(|| Error::coercion(other, "float", format!("cannot scale column '{column}'"))),
        })
        .collect::<Result<Vec<_>>>()?;
    dataset.set_column(column, values, NativeType::Float64);
    Ok(())
}

// ---------------------------------------------------------------------------
// Labels
// ---------------------------------------------------------------------------

fn axis_label(dataset: &Dataset, axis: &Axis, column: &str, series: &[FilterClause]) -> Result<String> {
    let units = match &axis.units {
        None => None,
        Some(Units::Custom(units)) => Some(units.clone()).filter(|u| !u.is_empty()),
        Some(Units::Column(units_column)) => {
            let found = dataset.distinct_values(units_column, None);
            match found.as_slice() {
                [unit] => Some(unit.to_canonical_string()),
                _ => {
                    return Err(Error::AmbiguousUnits {
                        column: units_column.clone(),
                        found: found.iter().map(Value::to_canonical_string).collect(),
                    })
                }
            }
        }
    };

    let mut label = titlecase(&column.replace('_', " "));
    if let Some(scaling) = axis.scaling.as_ref().map(|s| scaling_label(s, series)) {
        label.push(' ');
        label.push_str(&titlecase(&format!("Scaled by {}", scaling.replace('_', " "))));
    }
    if let Some(units) = units {
        label.push_str(&format!(" ({units})"));
    }
    Ok(label)
}

fn scaling_label(scaling: &Scaling, series: &[FilterClause]) -> String {
    match scaling {
        Scaling::Custom(value) => value.to_string(),
        Scaling::Column(column) => {
            let source = match column.series.and_then(|i| series.get(i)) {
                Some(clause) => format!("{} in {}", clause.value, column.name),
                None => column.name.clone(),
            };
            match &column.x_value {
                Some(x) => format!("{x} {source}"),
                None => source,
            }
        }
    }
}

const SMALL_WORDS: &[&str] = &[
    "a", "an", "and", "as", "at", "but", "by", "en", "for", "if", "in", "of", "on", "or", "the", "to",
    "v", "via", "vs",
];

/// Capitalize words, leaving small words after the first and words that
/// already carry capitals or digits alone.
fn titlecase(text: &str) -> String {
    text.split(' ')
        .enumerate()
        .map(|(i, word)| {
            let keep = word.chars().any(|c| c.is_uppercase() || c.is_ascii_digit())
                || (i > 0 && SMALL_WORDS.contains(&word));
            if keep {
                return word.to_string();
            }
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::filter::{FilterKind, Operator};

    fn dataset() -> Dataset {
        Dataset::from_columns(vec![
            ("tasks", vec!["4".into(), "1".into(), "2".into(), "4".into(), "1".into(), "2".into()]),
            ("cpus", vec![Value::Int(1), Value::Int(1), Value::Int(1), Value::Int(2), Value::Int(2), Value::Int(2)]),
            (
                "triad_value",
                vec![
                    Value::Float(8.0),
                    Value::Float(2.0),
                    Value::Float(4.0),
                    Value::Float(16.0),
                    Value::Float(4.0),
                    Value::Float(8.0),
                ],
            ),
            ("triad_unit", vec!["MB/s".into(), "MB/s".into(), "MB/s".into(), "MB/s".into(), "MB/s".into(), "MB/s".into()]),
        ])
    }

    fn config() -> Config {
        let mut config = Config::template();
        config.title = Some("Triad".into());
        config.set_axis_value(AxisKind::X, "tasks");
        config.set_axis_value(AxisKind::Y, "triad_value");
        config.set_axis_units_custom(AxisKind::X, "ranks");
        config.set_axis_units_column(AxisKind::Y, "triad_unit");
        config.set_column_type("tasks", ColumnType::Int);
        config.filters.series = vec![FilterClause::series("cpus", "1"), FilterClause::series("cpus", "2")];
        config.parse_columns(Some(&dataset()));
        config
    }

    #[test]
    fn run_sorts_coerces_and_labels() {
        let mut pipeline = Pipeline::new(dataset());
        let plot = pipeline.run(&config()).unwrap();
        assert_eq!(plot.columns, ["tasks", "triad_value", "triad_unit", "cpus"]);
        let tasks: Vec<&Value> = plot.dataset.column("tasks").collect();
        assert_eq!(tasks[0], &Value::Int(1));
        assert_eq!(tasks[5], &Value::Int(4));
        assert_eq!(plot.x_label, "Tasks (ranks)");
        assert_eq!(plot.y_label, "Triad Value (MB/s)");
        assert_eq!(plot.scale, None);
        assert_eq!(pipeline.dataset().dtype("tasks"), Some(NativeType::Int64));
        assert_eq!(pipeline.original().dtype("tasks"), Some(NativeType::Object));
    }

    #[test]
    fn descending_sort_reverses_x() {
        let mut config = config();
        config.set_axis_sort_order(SortOrder::Descending);
        let plot = Pipeline::new(dataset()).run(&config).unwrap();
        assert_eq!(plot.dataset.value(0, "tasks"), &Value::Int(4));
        let cpus: Vec<&Value> = plot.dataset.column("cpus").collect();
        assert_eq!(cpus[..2], [&Value::Int(1), &Value::Int(2)]);
        assert_eq!(cpus[4..], [&Value::Int(1), &Value::Int(2)]);
    }

    #[test]
    fn custom_scale_divides_y() {
        let mut config = config();
        config.set_scaling_custom(2.0);
        let plot = Pipeline::new(dataset()).run(&config).unwrap();
        assert_eq!(plot.scale, Some(Scale::Uniform(2.0)));
        assert_eq!(plot.y_label, "Triad Value Scaled by 2 (MB/s)");
        let y: Vec<f64> = plot.dataset.column("triad_value").filter_map(Value::as_f64).collect();
        assert_eq!(y, [1.0, 2.0, 2.0, 4.0, 4.0, 8.0]);
    }

    #[test]
    fn column_scale_uses_series_and_x_value() {
        let mut config = config();
        config.set_scaling_column("triad_value", Some(0), Some("1".into()));
        let plot = Pipeline::new(dataset()).run(&config).unwrap();
        assert_eq!(plot.scale, Some(Scale::Uniform(2.0)));
        assert_eq!(plot.y_label, "Triad Value Scaled by 1 1 in Triad Value (MB/s)");
    }

    #[test]
    fn x_value_alone_scales_each_series_by_its_own_baseline() {
        let mut config = config();
        config.set_scaling_column("triad_value", None, Some("1".into()));
        let plot = Pipeline::new(dataset()).run(&config).unwrap();
        assert_eq!(plot.scale, Some(Scale::PerSeries(vec![(0, 2.0), (1, 4.0)])));
        let y: Vec<f64> = plot.dataset.column("triad_value").filter_map(Value::as_f64).collect();
        assert_eq!(y, [1.0, 1.0, 2.0, 2.0, 4.0, 4.0]);
        assert_eq!(plot.y_label, "Triad Value Scaled by 1 Triad Value (MB/s)");
    }

    #[test]
    fn empty_selection_fails_and_keeps_state() {
        let mut pipeline = Pipeline::new(dataset());
        pipeline.run(&config()).unwrap();
        let before = pipeline.dataset().clone();

        let mut config = config();
        config.filters.and_filters.push(FilterClause::new("tasks", Operator::Gt, "100"));
        assert!(matches!(pipeline.run(&config), Err(Error::EmptySelection)));
        assert_eq!(pipeline.dataset(), &before);
    }

    #[test]
    fn duplicated_rows_are_rejected() {
        let mut config = config();
        config.set_filters(FilterKind::Series, vec![]);
        let err = Pipeline::new(dataset()).run(&config).unwrap_err();
        assert!(matches!(err, Error::UnexpectedRowCount { rows: 6, expected: 3 }));
    }

    #[test]
    fn mixed_units_are_ambiguous() {
        let mut ds = dataset();
        ds.rows[0].insert("triad_unit".into(), "GB/s".into());
        let err = Pipeline::new(ds).run(&config()).unwrap_err();
        assert!(matches!(err, Error::AmbiguousUnits { ref column, .. } if column == "triad_unit"));
    }

    #[test]
    fn invalid_config_leaves_dataset_untouched() {
        let mut pipeline = Pipeline::new(dataset());
        let mut config = config();
        config.title = None;
        assert!(matches!(pipeline.run(&config), Err(Error::ConfigValidation(_))));
        assert_eq!(pipeline.dataset(), pipeline.original());
    }

    #[test]
    fn failed_coercion_leaves_working_copy() {
        let mut pipeline = Pipeline::new(dataset());
        let mut config = config();
        config.set_column_type("triad_unit", ColumnType::Float);
        assert!(matches!(pipeline.apply_column_types(&config), Err(Error::TypeCoercion { .. })));
        assert_eq!(pipeline.dataset(), pipeline.original());
    }

    #[test]
    fn titlecase_keeps_small_words_and_units() {
        assert_eq!(titlecase("triad value scaled by 2 nodes in cpus"), "Triad Value Scaled by 2 Nodes in Cpus");
        assert_eq!(titlecase("MB copy"), "MB Copy");
    }
}
