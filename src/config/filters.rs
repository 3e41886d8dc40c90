use std::collections::{BTreeMap, HashSet};

use super::Config;
use crate::data::filter::{FilterClause, FilterKind, FilterSet, Operator};
use crate::data::model::Dataset;
use crate::data::types::{cast, cast_single, ColumnType};
use crate::error::{Error, Result};

/// Outcome of [`Config::add_filter`] when nothing went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddFilter {
    Added,
    /// The clause is already in that list; nothing changed.
    Duplicate,
    /// The clause has no value; nothing changed.
    MissingValue,
}

impl Config {
    /// Add a clause to one of the filter lists.
    ///
    /// The value is cast once through `ty` and stored in canonical form, `ty`
    /// becomes the column's declared type, and every other clause on the same
    /// column is re-cast to it. On any failure the filter lists and column
    /// types are left as they were.
    pub fn add_filter(
        &mut self,
        kind: FilterKind,
        mut clause: FilterClause,
        ty: ColumnType,
        dataset: &Dataset,
    ) -> Result<AddFilter> {
        if clause.value.is_empty() {
            log::warn!("Filter on '{}' cannot be added without a value", clause.column);
            return Ok(AddFilter::MissingValue);
        }
        if !dataset.has_column(&clause.column) {
            return Err(Error::ColumnNotFound(clause.column));
        }
        if kind == FilterKind::Series {
            clause.op = Operator::Eq;
        }
        clause.value = cast_single(&clause.value, ty)?.to_canonical_string();

        if self.has_filter(kind, &clause) {
            log::warn!("Filter '{clause}' is already present in the {kind} filters");
            return Ok(AddFilter::Duplicate);
        }

        let snapshot = (self.filters.clone(), self.column_types.clone());
        let column = clause.column.clone();
        self.filters.get_mut(kind).push(clause);
        self.retype_or_restore(snapshot, &column, ty, dataset)?;
        Ok(AddFilter::Added)
    }

    /// Remove a clause. Returns whether it was present.
    pub fn remove_filter(&mut self, kind: FilterKind, clause: &FilterClause) -> bool {
        let list = self.filters.get_mut(kind);
        let Some(pos) = list.iter().position(|c| c == clause) else {
            return false;
        };
        list.remove(pos);
        self.parse_filters();
        true
    }

    /// Replace a whole filter list, e.g. after a multi-select edit.
    pub fn set_filters(&mut self, kind: FilterKind, clauses: Vec<FilterClause>) {
        *self.filters.get_mut(kind) = clauses;
        self.parse_filters();
    }

    /// Normalize the filter lists after an external edit: series clauses are
    /// equalities, exact duplicates are dropped, order is kept.
    pub fn parse_filters(&mut self) {
        for clause in &mut self.filters.series {
            clause.op = Operator::Eq;
        }
        for kind in FilterKind::ALL {
            let mut seen = HashSet::new();
            self.filters.get_mut(kind).retain(|c| seen.insert(c.clone()));
        }
        self.refresh_columns();
    }

    /// Declare `ty` for `column` and re-cast every clause on it, across all
    /// three lists. The dataset column itself must accept the type.
    ///
    /// Rolls the filters and column types back if any value fails.
    pub fn retype_filter_column(&mut self, column: &str, ty: ColumnType, dataset: &Dataset) -> Result<()> {
        let snapshot = (self.filters.clone(), self.column_types.clone());
        self.retype_or_restore(snapshot, column, ty, dataset)
    }

    fn retype_or_restore(
        &mut self,
        (filters, column_types): (FilterSet, BTreeMap<String, ColumnType>),
        column: &str,
        ty: ColumnType,
        dataset: &Dataset,
    ) -> Result<()> {
        if let Err(e) = self.try_retype(column, ty, dataset) {
            log::warn!("Reverting filters after failing to retype '{column}' as {ty}: {e}");
            self.filters = filters;
            self.column_types = column_types;
            self.parse_filters();
            return Err(e);
        }
        self.parse_filters();
        self.parse_columns(Some(dataset));
        Ok(())
    }

    fn try_retype(&mut self, column: &str, ty: ColumnType, dataset: &Dataset) -> Result<()> {
        if !dataset.has_column(column) {
            return Err(Error::ColumnNotFound(column.to_string()));
        }
        for value in dataset.column(column) {
            cast(value, ty)?;
        }
        self.column_types.insert(column.to_string(), ty);

        for kind in FilterKind::ALL {
            for clause in self.filters.get_mut(kind).iter_mut() {
                if clause.column != column || clause.value.is_empty() {
                    continue;
                }
                let recast = cast_single(&clause.value, ty)?.to_canonical_string();
                if recast != clause.value {
                    log::debug!("Re-typed filter value '{}' on '{column}' as '{recast}'", clause.value);
                }
                clause.value = recast;
            }
        }
        Ok(())
    }
}
