use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use super::axis::{Axis, ScalingFields};
use super::{scalar, Config, PlotType};
use crate::data::filter::{FilterClause, FilterSet, Operator};
use crate::data::types::ColumnType;
use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Serialized form
// ---------------------------------------------------------------------------

/// `[column, operator, value]`
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ClauseDoc(String, Operator, #[serde(with = "scalar")] String);

/// `[column, value]`
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SeriesDoc(String, #[serde(with = "scalar")] String);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct FiltersDoc {
    #[serde(default)]
    and: Vec<ClauseDoc>,
    #[serde(default)]
    or: Vec<ClauseDoc>,
}

/// The key/value document a [`Config`] is saved as.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigDocument {
    #[serde(default)]
    title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    plot_type: Option<PlotType>,
    #[serde(default)]
    x_axis: Axis,
    #[serde(default)]
    y_axis: Axis,
    #[serde(default)]
    filters: FiltersDoc,
    #[serde(default)]
    series: Vec<SeriesDoc>,
    #[serde(default)]
    column_types: BTreeMap<String, ColumnType>,
    #[serde(default)]
    extra_columns: Vec<String>,
}

impl From<ConfigDocument> for Config {
    fn from(doc: ConfigDocument) -> Self {
        let clause = |c: ClauseDoc| FilterClause::new(c.0, c.1, c.2);
        let mut config = Config {
            title: doc.title,
            plot_type: doc.plot_type,
            x_axis: doc.x_axis,
            y_axis: doc.y_axis,
            filters: FilterSet {
                and_filters: doc.filters.and.into_iter().map(clause).collect(),
                or_filters: doc.filters.or.into_iter().map(clause).collect(),
                series: doc
                    .series
                    .into_iter()
                    .map(|s| FilterClause::series(s.0, s.1))
                    .collect(),
            },
            column_types: doc.column_types,
            extra_columns: doc.extra_columns,
            ..Default::default()
        };
        config.scaling_fields = ScalingFields::from(config.y_axis.scaling.as_ref());
        config.parse_filters();
        config
    }
}

impl From<Config> for ConfigDocument {
    fn from(config: Config) -> Self {
        let clause = |c: FilterClause| ClauseDoc(c.column, c.op, c.value);
        ConfigDocument {
            title: config.title,
            plot_type: config.plot_type,
            x_axis: config.x_axis,
            y_axis: config.y_axis,
            filters: FiltersDoc {
                and: config.filters.and_filters.into_iter().map(clause).collect(),
                or: config.filters.or_filters.into_iter().map(clause).collect(),
            },
            series: config
                .filters
                .series
                .into_iter()
                .map(|s| SeriesDoc(s.column, s.value))
                .collect(),
            column_types: config.column_types,
            extra_columns: config.extra_columns,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading and saving
// ---------------------------------------------------------------------------

impl Config {
    /// Parse a YAML configuration document.
    ///
    /// Structural problems are collected and reported together as
    /// [`Error::ConfigValidation`].
    pub fn from_yaml(text: &str) -> Result<Self> {
        let raw: Value = serde_yaml::from_str(text)?;
        Self::from_value(raw)
    }

    /// Build a configuration from a JSON-like dictionary.
    pub fn from_dict(dict: &serde_json::Value) -> Result<Self> {
        Self::from_value(serde_yaml::to_value(dict)?)
    }

    fn from_value(mut raw: Value) -> Result<Self> {
        normalize_document(&mut raw);
        let problems = check_document(&raw);
        if !problems.is_empty() {
            return Err(Error::ConfigValidation(problems));
        }
        serde_yaml::from_value(raw).map_err(|e| Error::ConfigValidation(vec![e.to_string()]))
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn to_dict(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Parse a document, falling back to a template on failure.
    ///
    /// The fallback keeps every top-level field of the document that parses
    /// on its own, so a caller can still show what was loaded next to the
    /// error.
    pub fn load(text: &str) -> (Self, Option<Error>) {
        match Self::from_yaml(text) {
            Ok(config) => (config, None),
            Err(e) => {
                log::warn!("Falling back to template configuration: {e}");
                (Self::salvage(text), Some(e))
            }
        }
    }

    fn salvage(text: &str) -> Self {
        let Ok(mut raw) = serde_yaml::from_str::<Value>(text) else {
            return Self::template();
        };
        normalize_document(&mut raw);
        let Some(map) = raw.as_mapping() else {
            return Self::template();
        };
        fn field<T: serde::de::DeserializeOwned + Default>(map: &Mapping, key: &str) -> T {
            map.get(key)
                .and_then(|v| serde_yaml::from_value(v.clone()).ok())
                .unwrap_or_default()
        }
        Config::from(ConfigDocument {
            title: field(map, "title"),
            plot_type: field(map, "plot_type"),
            x_axis: field(map, "x_axis"),
            y_axis: field(map, "y_axis"),
            filters: field(map, "filters"),
            series: field(map, "series"),
            column_types: field(map, "column_types"),
            extra_columns: field(map, "extra_columns"),
        })
    }
}

// ---------------------------------------------------------------------------
// Structural checks on the raw document
// ---------------------------------------------------------------------------

/// Treat `units: {custom: null}` style entries (every alternative null) as
/// absent, and a null `filters`/`series`/... as empty.
fn normalize_document(raw: &mut Value) {
    let Some(map) = raw.as_mapping_mut() else {
        return;
    };
    for axis in ["x_axis", "y_axis"] {
        let Some(axis) = map.get_mut(axis).and_then(Value::as_mapping_mut) else {
            continue;
        };
        for key in ["units", "scaling"] {
            if let Some(entry) = axis.get_mut(key) {
                let all_null = entry
                    .as_mapping()
                    .is_some_and(|m| m.values().all(Value::is_null));
                if all_null {
                    *entry = Value::Null;
                }
            }
        }
    }
    for key in ["x_axis", "y_axis", "filters", "series", "column_types", "extra_columns"] {
        if map.get(key).is_some_and(Value::is_null) {
            map.remove(key);
        }
    }
}

fn check_document(raw: &Value) -> Vec<String> {
    let mut problems = Vec::new();
    let map = match raw {
        Value::Mapping(m) => m,
        Value::Null => return problems,
        _ => return vec!["Configuration document must be a mapping.".to_string()],
    };

    if let Some(title) = map.get("title") {
        if !(title.is_null() || title.is_string()) {
            problems.push("Plot title must be text.".to_string());
        }
    }
    if let Some(plot_type) = map.get("plot_type") {
        if !plot_type.is_null() && !matches!(plot_type.as_str(), Some("generic" | "line")) {
            problems.push(format!("Unsupported plot type {plot_type:?} (expected generic or line)."));
        }
    }
    for (key, label) in [("x_axis", "x"), ("y_axis", "y")] {
        if let Some(axis) = map.get(key) {
            check_axis(axis, label, &mut problems);
        }
    }

    if let Some(filters) = map.get("filters") {
        match filters.as_mapping() {
            Some(f) => {
                for kind in ["and", "or"] {
                    if let Some(list) = f.get(kind) {
                        check_clauses(list, kind, 3, &mut problems);
                    }
                }
            }
            None => problems.push("Filters must be a mapping with 'and' and 'or' lists.".to_string()),
        }
    }
    if let Some(series) = map.get("series") {
        check_clauses(series, "series", 2, &mut problems);
    }

    if let Some(types) = map.get("column_types") {
        match types.as_mapping() {
            Some(t) => {
                for (column, ty) in t {
                    if !column.is_string() {
                        problems.push(format!("Column name {column:?} in column types must be text."));
                    }
                    let column = scalar::scalar_text(column).unwrap_or_else(|| format!("{column:?}"));
                    match ty.as_str() {
                        Some(name) => {
                            if let Err(e) = name.parse::<ColumnType>() {
                                problems.push(format!("{e} for column '{column}'."));
                            }
                        }
                        None => problems.push(format!("Type of column '{column}' must be a type name.")),
                    }
                }
            }
            None => problems.push("Column types must be a mapping of column names to types.".to_string()),
        }
    }
    if let Some(extra) = map.get("extra_columns") {
        let ok = extra
            .as_sequence()
            .is_some_and(|s| s.iter().all(Value::is_string));
        if !ok {
            problems.push("Extra columns must be a list of column names.".to_string());
        }
    }
    problems
}

fn check_axis(axis: &Value, label: &str, problems: &mut Vec<String>) {
    let Some(axis) = axis.as_mapping() else {
        problems.push(format!("Missing {label}-axis information."));
        return;
    };
    if let Some(value) = axis.get("value") {
        if !(value.is_null() || value.is_string()) {
            problems.push(format!("The {label}-axis value must be a column name."));
        }
    }

    if let Some(units) = axis.get("units").filter(|u| !u.is_null()) {
        match units.as_mapping() {
            Some(u) => {
                let custom = u.get("custom").is_some_and(|v| !v.is_null());
                let column = u.get("column").is_some_and(|v| !v.is_null());
                if custom && column {
                    problems.push(format!(
                        "Specify {label}-axis units information as only one of 'custom' or 'column'."
                    ));
                }
                if u.keys().any(|k| !matches!(k.as_str(), Some("custom" | "column"))) {
                    problems.push(format!("Unknown key in {label}-axis units information."));
                }
            }
            None => problems.push(format!("The {label}-axis units must be a mapping.")),
        }
    }

    if let Some(scaling) = axis.get("scaling").filter(|s| !s.is_null()) {
        if label != "y" {
            problems.push("Scaling is only supported on the y-axis.".to_string());
        }
        match scaling.as_mapping() {
            Some(s) => {
                let custom = s.get("custom").filter(|v| !v.is_null());
                let column = s.get("column").filter(|v| !v.is_null());
                match (custom, column) {
                    (Some(_), Some(_)) => problems.push(format!(
                        "Specify {label}-axis scaling information as only one of 'custom' or 'column'."
                    )),
                    (Some(c), None) if !c.is_number() => {
                        problems.push(format!("Invalid custom scaling value {c:?}."))
                    }
                    (None, Some(c)) => {
                        let named = c
                            .as_mapping()
                            .and_then(|m| m.get("name"))
                            .and_then(Value::as_str)
                            .is_some_and(|n| !n.is_empty());
                        if !named {
                            problems.push("Scaling column must have a name.".to_string());
                        }
                        if let Some(series) = c.as_mapping().and_then(|m| m.get("series")) {
                            if !(series.is_null() || series.as_u64().is_some()) {
                                problems.push("Scaling series must be a non-negative index.".to_string());
                            }
                        }
                    }
                    _ => {}
                }
            }
            None => problems.push(format!("The {label}-axis scaling must be a mapping.")),
        }
    }

    if let Some(sort) = axis.get("sort").filter(|s| !s.is_null()) {
        if label != "x" {
            problems.push("Sorting is only supported on the x-axis.".to_string());
        }
        if !matches!(sort.as_str(), Some("ascending" | "descending")) {
            problems.push(format!("Sort order must be 'ascending' or 'descending', found {sort:?}."));
        }
    }
}

fn check_clauses(list: &Value, kind: &str, arity: usize, problems: &mut Vec<String>) {
    let Some(list) = list.as_sequence() else {
        problems.push(format!("The '{kind}' filters must be a list."));
        return;
    };
    for (i, clause) in list.iter().enumerate() {
        let Some(parts) = clause.as_sequence().filter(|p| p.len() == arity) else {
            problems.push(format!(
                "Malformed {kind} filter at index {i}: expected {arity} elements, found {clause:?}."
            ));
            continue;
        };
        if !parts[0].is_string() {
            problems.push(format!("Malformed {kind} filter at index {i}: column must be a name."));
        }
        if arity == 3 {
            if let Err(e) = parts[1].as_str().unwrap_or_default().parse::<Operator>() {
                problems.push(format!("Malformed {kind} filter at index {i}: {e}."));
            }
        }
        if scalar::scalar_text(&parts[arity - 1]).is_none() {
            problems.push(format!("Malformed {kind} filter at index {i}: value must be a scalar."));
        }
    }
}
