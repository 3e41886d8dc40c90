/// Configuration layer: what to plot and how to select it.
///
/// ```text
///   YAML document ──► document (structural checks, serde) ──► Config
///                                                              │
///        edit operations (axis, units, scaling, filters) ──────┤
///                                                              ▼
///                           parse_columns / parse_filters / parse_scaling
///                                                              │
///                                                              ▼
///                                     validate(dataset) ──► pipeline
/// ```

pub mod axis;
pub mod document;
pub mod filters;
pub(crate) mod scalar;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

pub use axis::{Axis, AxisKind, ScalingColumn, ScalingFields, Scaling, SortOrder, Units};
pub use document::ConfigDocument;
pub use filters::AddFilter;

use crate::data::filter::{FilterClause, FilterKind, FilterSet};
use crate::data::model::Dataset;
use crate::data::types::ColumnType;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlotType {
    Generic,
    Line,
}

// ---------------------------------------------------------------------------
// Config – the in-memory plotting configuration
// ---------------------------------------------------------------------------

/// Plotting configuration plus the column sets derived from it.
///
/// Serializes through [`ConfigDocument`]; the derived sets and the scaling
/// form fields have no serialized form and are rebuilt on load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "ConfigDocument", into = "ConfigDocument")]
pub struct Config {
    pub title: Option<String>,
    pub plot_type: Option<PlotType>,
    pub x_axis: Axis,
    pub y_axis: Axis,
    pub filters: FilterSet,
    /// Column → user-facing type. Every referenced column has an entry
    /// after [`Config::parse_columns`].
    pub column_types: BTreeMap<String, ColumnType>,
    /// Columns shown alongside the plot columns; they do not affect plotting.
    pub extra_columns: Vec<String>,

    plot_columns: Vec<String>,
    series_columns: Vec<String>,
    all_columns: BTreeSet<String>,
    scaling_fields: ScalingFields,
}

impl PartialEq for Config {
    fn eq(&self, other: &Self) -> bool {
        self.title == other.title
            && self.plot_type == other.plot_type
            && self.x_axis == other.x_axis
            && self.y_axis == other.y_axis
            && self.filters == other.filters
            && self.column_types == other.column_types
            && self.extra_columns == other.extra_columns
    }
}

impl Config {
    /// A document with every field present but empty.
    pub fn template() -> Self {
        Self::default()
    }

    pub fn axis(&self, kind: AxisKind) -> &Axis {
        match kind {
            AxisKind::X => &self.x_axis,
            AxisKind::Y => &self.y_axis,
        }
    }

    fn axis_mut(&mut self, kind: AxisKind) -> &mut Axis {
        match kind {
            AxisKind::X => &mut self.x_axis,
            AxisKind::Y => &mut self.y_axis,
        }
    }

    /// Axis value, units columns and series columns, in that order.
    pub fn plot_columns(&self) -> &[String] {
        &self.plot_columns
    }

    /// Columns the series clauses group by.
    pub fn series_columns(&self) -> &[String] {
        &self.series_columns
    }

    /// Every column that needs a declared type.
    pub fn all_columns(&self) -> &BTreeSet<String> {
        &self.all_columns
    }

    pub fn scaling(&self) -> Option<&Scaling> {
        self.y_axis.scaling.as_ref()
    }

    // -- axis edits --

    pub fn set_axis_value(&mut self, axis: AxisKind, column: impl Into<String>) {
        self.axis_mut(axis).value = Some(column.into());
        self.refresh_columns();
    }

    pub fn set_axis_units_custom(&mut self, axis: AxisKind, units: impl Into<String>) {
        self.axis_mut(axis).units = Some(Units::Custom(units.into()));
        self.refresh_columns();
    }

    /// Units read from a column. Unit columns are always typed as `str`.
    pub fn set_axis_units_column(&mut self, axis: AxisKind, column: impl Into<String>) {
        let column = column.into();
        self.column_types.insert(column.clone(), ColumnType::Str);
        self.axis_mut(axis).units = Some(Units::Column(column));
        self.refresh_columns();
    }

    pub fn clear_axis_units(&mut self, axis: AxisKind) {
        self.axis_mut(axis).units = None;
        self.refresh_columns();
    }

    /// Sort order of the x-axis values.
    pub fn set_axis_sort_order(&mut self, order: SortOrder) {
        self.x_axis.sort = Some(order);
    }

    pub fn set_column_type(&mut self, column: impl Into<String>, ty: ColumnType) {
        self.column_types.insert(column.into(), ty);
    }

    // -- scaling edits --

    /// Scale the y-axis by a constant. Clears any column scaling.
    pub fn set_scaling_custom(&mut self, value: f64) {
        self.y_axis.scaling = Some(Scaling::Custom(value));
        self.sync_scaling_fields();
    }

    /// Scale the y-axis by a value looked up in `name`. Clears any custom value.
    pub fn set_scaling_column(&mut self, name: impl Into<String>, series: Option<usize>, x_value: Option<String>) {
        self.y_axis.scaling = Some(Scaling::Column(ScalingColumn {
            name: name.into(),
            series,
            x_value,
        }));
        self.sync_scaling_fields();
    }

    pub fn clear_scaling(&mut self) {
        self.y_axis.scaling = None;
        self.sync_scaling_fields();
    }

    /// Scaling inputs for independent editing; apply with [`Config::parse_scaling`].
    pub fn scaling_fields_mut(&mut self) -> &mut ScalingFields {
        &mut self.scaling_fields
    }

    pub fn scaling_fields(&self) -> &ScalingFields {
        &self.scaling_fields
    }

    /// Rebuild the y-axis scaling from its separately edited fields.
    pub fn parse_scaling(&mut self) {
        self.y_axis.scaling = self.scaling_fields.to_scaling();
        self.refresh_columns();
    }

    fn sync_scaling_fields(&mut self) {
        self.scaling_fields = ScalingFields::from(self.y_axis.scaling.as_ref());
        self.refresh_columns();
    }

    // -- extra columns --

    /// Append an extra column. Returns `false` if it is already listed.
    pub fn add_extra_column(&mut self, column: impl Into<String>) -> bool {
        let column = column.into();
        if self.extra_columns.contains(&column) {
            log::warn!("Extra column '{column}' is already present");
            return false;
        }
        if self.plot_columns.contains(&column) {
            log::warn!("Extra column '{column}' is already present in the plot columns");
        }
        self.extra_columns.push(column);
        self.refresh_columns();
        true
    }

    pub fn set_extra_columns(&mut self, columns: Vec<String>) {
        let mut seen = BTreeSet::new();
        self.extra_columns = columns.into_iter().filter(|c| seen.insert(c.clone())).collect();
        self.refresh_columns();
    }

    // -- normalization --

    /// Recompute plot, series and typed column sets; with a dataset, also add
    /// missing `column_types` entries from each column's native dtype.
    pub fn parse_columns(&mut self, dataset: Option<&Dataset>) {
        self.refresh_columns();
        let Some(dataset) = dataset else {
            return;
        };
        for column in &self.all_columns {
            if self.column_types.contains_key(column) {
                continue;
            }
            match dataset.column_type(column) {
                Some(ty) => {
                    log::debug!("Inferred type '{ty}' for column '{column}'");
                    self.column_types.insert(column.clone(), ty);
                }
                None => log::warn!("Column '{column}' is not present in the dataset"),
            }
        }
    }

    /// Drop `column_types` entries for columns nothing references any more.
    pub fn remove_redundant_types(&mut self) {
        self.refresh_columns();
        let all = &self.all_columns;
        self.column_types.retain(|column, _| all.contains(column));
    }

    pub(crate) fn refresh_columns(&mut self) {
        let mut plot_columns: Vec<String> = Vec::new();
        let push = |list: &mut Vec<String>, c: &str| {
            if !list.iter().any(|p| p == c) {
                list.push(c.to_string());
            }
        };
        for c in self.x_axis.columns().chain(self.y_axis.columns()) {
            push(&mut plot_columns, c);
        }
        let mut series_columns = Vec::new();
        for clause in &self.filters.series {
            push(&mut series_columns, &clause.column);
            push(&mut plot_columns, &clause.column);
        }

        let mut all: BTreeSet<String> = plot_columns.iter().cloned().collect();
        all.extend(
            self.filters
                .iter()
                .filter(|(kind, _)| *kind != FilterKind::Series)
                .map(|(_, c)| c.column.clone()),
        );
        all.extend(self.scaling().and_then(Scaling::column).map(str::to_string));
        all.extend(self.extra_columns.iter().cloned());

        self.plot_columns = plot_columns;
        self.series_columns = series_columns;
        self.all_columns = all;
    }

    // -- validation --

    /// Check the configuration is complete enough to run, collecting every
    /// problem. With a dataset, referenced columns must exist in it.
    pub fn validate(&self, dataset: Option<&Dataset>) -> Result<()> {
        let mut problems = Vec::new();

        if self.title.as_deref().map_or(true, |t| t.trim().is_empty()) {
            problems.push("Missing plot title information.".to_string());
        }
        for kind in [AxisKind::X, AxisKind::Y] {
            if self.axis(kind).value.as_deref().map_or(true, str::is_empty) {
                problems.push(format!("Missing {kind}-axis value information."));
            }
        }
        if self.x_axis.scaling.is_some() {
            problems.push("Scaling is only supported on the y-axis.".to_string());
        }

        let series = &self.filters.series;
        if series.len() == 1 {
            problems.push(
                "Number of series must be >= 2 (specify an empty list if there is only one series)."
                    .to_string(),
            );
        }
        let series_columns: BTreeSet<&str> = series.iter().map(|s| s.column.as_str()).collect();
        if series_columns.len() > 1 {
            problems.push(
                "Currently supporting grouping of series by only one column. \
                 Please use a single column name in your series configuration."
                    .to_string(),
            );
        }

        match self.scaling() {
            Some(Scaling::Custom(v)) if *v == 0.0 || !v.is_finite() => {
                problems.push(format!("Invalid custom scaling value (cannot divide by {v})."));
            }
            Some(Scaling::Column(c)) => {
                if c.name.is_empty() {
                    problems.push("Scaling column must have a name.".to_string());
                }
                if let Some(i) = c.series {
                    if i >= series.len() {
                        problems.push(format!(
                            "Scaling series index {i} is out of range ({} series).",
                            series.len()
                        ));
                    }
                }
            }
            _ => {}
        }

        let mut referenced = self.clone();
        referenced.refresh_columns();
        for column in referenced.all_columns() {
            if let Some(ds) = dataset {
                if !ds.has_column(column) {
                    problems.push(format!("Could not find column '{column}' in the dataset."));
                    continue;
                }
            }
            if !self.column_types.contains_key(column) {
                problems.push(format!("Could not find user-specified type for column '{column}'."));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::ConfigValidation(problems))
        }
    }

    /// Whether `kind` already holds exactly this clause.
    pub fn has_filter(&self, kind: FilterKind, clause: &FilterClause) -> bool {
        self.filters.get(kind).contains(clause)
    }
}
