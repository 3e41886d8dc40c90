//! Configuration model and post-processing engine for benchmark perflogs.
//!
//! A [`Config`] says what to plot: axes, units, scaling and filters. A
//! [`Pipeline`] owns a [`Dataset`] and turns it into [`PlotData`] for a
//! renderer, coercing column types, filtering rows and scaling the y-axis.

pub mod config;
pub mod data;
pub mod error;
pub mod pipeline;
pub mod scaling;

pub use config::{AddFilter, AxisKind, Config, Scaling, Units};
pub use data::filter::{FilterClause, FilterKind, FilterSet, Operator};
pub use data::model::{Dataset, Value};
pub use data::types::ColumnType;
pub use error::{Error, Result};
pub use pipeline::{Pipeline, PlotData};
