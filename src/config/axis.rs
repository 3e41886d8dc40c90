use std::fmt;

use serde::{Deserialize, Serialize};

use super::scalar;

/// One of the two plot dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AxisKind {
    X,
    Y,
}

impl fmt::Display for AxisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AxisKind::X => "x",
            AxisKind::Y => "y",
        })
    }
}

/// Axis units: a fixed label or a column holding the label. Written as a
/// one-key mapping, `{custom: ranks}` or `{column: unit}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    Custom(String),
    Column(String),
}

impl Units {
    pub fn column(&self) -> Option<&str> {
        match self {
            Units::Column(c) => Some(c),
            Units::Custom(_) => None,
        }
    }
}

/// Column-based scaling: which column, and optionally which series and
/// x-axis value select the scaling row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingColumn {
    pub name: String,
    #[serde(default)]
    pub series: Option<usize>,
    #[serde(default, deserialize_with = "scalar::deserialize_opt")]
    pub x_value: Option<String>,
}

/// Y-axis scaling: a constant divisor or a value looked up in the data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scaling {
    Custom(f64),
    Column(ScalingColumn),
}

impl Scaling {
    pub fn column(&self) -> Option<&str> {
        match self {
            Scaling::Column(c) => Some(&c.name),
            Scaling::Custom(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default, with = "serde_yaml::with::singleton_map")]
    pub units: Option<Units>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "serde_yaml::with::singleton_map"
    )]
    pub scaling: Option<Scaling>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortOrder>,
}

impl Axis {
    /// Columns this axis reads: its value and its units column.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.value
            .as_deref()
            .into_iter()
            .chain(self.units.as_ref().and_then(Units::column))
    }
}

// ---------------------------------------------------------------------------
// Scaling sub-fields edited one at a time
// ---------------------------------------------------------------------------

/// Scaling inputs as a form edits them, independently of each other.
/// [`super::Config::parse_scaling`] folds them back into a [`Scaling`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScalingFields {
    pub column: Option<String>,
    pub series: Option<usize>,
    pub x_value: Option<String>,
    pub custom: Option<f64>,
}

impl From<Option<&Scaling>> for ScalingFields {
    fn from(scaling: Option<&Scaling>) -> Self {
        match scaling {
            None => ScalingFields::default(),
            Some(Scaling::Custom(v)) => ScalingFields {
                custom: Some(*v),
                ..Default::default()
            },
            Some(Scaling::Column(c)) => ScalingFields {
                column: Some(c.name.clone()),
                series: c.series,
                x_value: c.x_value.clone(),
                custom: None,
            },
        }
    }
}

impl ScalingFields {
    /// Resolve the fields into one scaling variant. A custom value wins and
    /// clears the column fields.
    pub fn to_scaling(&mut self) -> Option<Scaling> {
        if let Some(v) = self.custom {
            self.column = None;
            self.series = None;
            self.x_value = None;
            return Some(Scaling::Custom(v));
        }
        let name = self.column.clone().filter(|c| !c.is_empty())?;
        Some(Scaling::Column(ScalingColumn {
            name,
            series: self.series,
            x_value: self.x_value.clone().filter(|x| !x.is_empty()),
        }))
    }
}
