//! Variable Record - row-aligned fields of one recorded variable

use std::collections::BTreeMap;

use super::{Column, ColumnKind};
use crate::{Error, Result};

/// Well-known field names produced by extraction.
pub mod fields {
    /// Time series per recorded entity.
    pub const DATA: &str = "data";
    /// Entity/connection index in the simulation's recording space.
    pub const INDEX: &str = "index";
    /// Source entity of a recorded connection (`NaN` otherwise).
    pub const PRE_INDEX: &str = "pre_index";
    /// Target entity of a recorded connection (`NaN` otherwise).
    pub const POST_INDEX: &str = "post_index";
    /// Logical group label.
    pub const GROUP_NAME: &str = "group_name";
    /// Name of the simulator object the monitor was attached to.
    pub const SOURCE_NAME: &str = "source_name";
    /// Trial identifier; key into the store's context table.
    pub const TRIAL_ID: &str = "trial_id";
    /// Stimulation field magnitude of the trial.
    pub const FIELD_MAG: &str = "field_mag";
}

/// Fields of one recorded variable, all holding the same number of rows.
///
/// Row `i` of every column describes the same recorded entity. The row count
/// is fixed by the first inserted column and every later column must match
/// it, so a misaligned record cannot be constructed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableRecord {
    columns: BTreeMap<String, Column>,
    rows: usize,
}

impl VariableRecord {
    /// Create an empty record (no fields, zero rows).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a record with `rows` rows and no fields yet.
    ///
    /// Used when the entity count is known before any column is built.
    #[must_use]
    pub fn with_rows(rows: usize) -> Self {
        Self {
            columns: BTreeMap::new(),
            rows,
        }
    }

    /// Insert a new field.
    ///
    /// The first column of a record created with [`new`](Self::new) fixes the
    /// row count.
    ///
    /// # Errors
    /// `SchemaMismatch` if the field already exists, `ShapeMismatch` if the
    /// column length differs from the record's row count. The record is left
    /// unchanged on error.
    pub fn insert(&mut self, variable: &str, field: &str, column: Column) -> Result<()> {
        if self.columns.contains_key(field) {
            return Err(Error::SchemaMismatch {
                variable: variable.to_string(),
                reason: format!("field '{field}' already present"),
            });
        }
        let fixed = !self.columns.is_empty() || self.rows > 0;
        if fixed && column.len() != self.rows {
            return Err(Error::ShapeMismatch {
                variable: variable.to_string(),
                field: field.to_string(),
                expected: self.rows,
                actual: column.len(),
            });
        }
        self.rows = column.len();
        self.columns.insert(field.to_string(), column);
        Ok(())
    }

    /// Builder-style [`insert`](Self::insert).
    ///
    /// # Errors
    /// Same as [`insert`](Self::insert).
    pub fn with_column(mut self, variable: &str, field: &str, column: Column) -> Result<Self> {
        self.insert(variable, field, column)?;
        Ok(self)
    }

    /// Number of rows (recorded entities) shared by every field.
    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    /// Number of fields.
    #[must_use]
    pub fn num_fields(&self) -> usize {
        self.columns.len()
    }

    /// True when the record has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Field names in sorted order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Field name and kind pairs in sorted order.
    #[must_use]
    pub fn schema(&self) -> BTreeMap<String, ColumnKind> {
        self.columns
            .iter()
            .map(|(name, col)| (name.clone(), col.kind()))
            .collect()
    }

    /// Get a field's column.
    #[must_use]
    pub fn column(&self, field: &str) -> Option<&Column> {
        self.columns.get(field)
    }

    /// Iterate over `(field, column)` pairs in field order.
    pub fn columns(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Time series of the `data` field, if present.
    #[must_use]
    pub fn data(&self) -> Option<&[Vec<f64>]> {
        match self.columns.get(fields::DATA)? {
            Column::Series(v) => Some(v),
            _ => None,
        }
    }

    /// Float values of a field, if present with float kind.
    #[must_use]
    pub fn floats(&self, field: &str) -> Option<&[f64]> {
        match self.columns.get(field)? {
            Column::Float(v) => Some(v),
            _ => None,
        }
    }

    /// Integer values of a field, if present with int kind.
    #[must_use]
    pub fn ints(&self, field: &str) -> Option<&[i64]> {
        match self.columns.get(field)? {
            Column::Int(v) => Some(v),
            _ => None,
        }
    }

    /// Text values of a field, if present with text kind.
    #[must_use]
    pub fn texts(&self, field: &str) -> Option<&[String]> {
        match self.columns.get(field)? {
            Column::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Row indices whose `trial_id` equals `trial_id`.
    #[must_use]
    pub fn rows_for_trial(&self, trial_id: &str) -> Vec<usize> {
        self.texts(fields::TRIAL_ID)
            .map(|ids| {
                ids.iter()
                    .enumerate()
                    .filter(|(_, id)| id.as_str() == trial_id)
                    .map(|(i, _)| i)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Consume the record, returning its columns by field name.
    #[must_use]
    pub fn into_columns(self) -> BTreeMap<String, Column> {
        self.columns
    }

    pub(crate) fn column_mut(&mut self, field: &str) -> Option<&mut Column> {
        self.columns.get_mut(field)
    }

    pub(crate) fn insert_unchecked(&mut self, field: String, column: Column) {
        self.columns.insert(field, column);
    }

    pub(crate) fn set_rows(&mut self, rows: usize) {
        self.rows = rows;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_column_fixes_rows() {
        let mut record = VariableRecord::new();
        record
            .insert("u", fields::TRIAL_ID, Column::broadcast_text("t1", 3))
            .unwrap();
        assert_eq!(record.rows(), 3);

        let err = record
            .insert("u", fields::FIELD_MAG, Column::broadcast_float(0.0, 2))
            .unwrap_err();
        assert!(err.is_shape_fault());
        assert_eq!(record.num_fields(), 1);
    }

    #[test]
    fn test_with_rows_rejects_other_lengths() {
        let result = VariableRecord::with_rows(4).with_column(
            "u",
            fields::INDEX,
            Column::Int(vec![0, 1]),
        );
        assert!(matches!(
            result,
            Err(Error::ShapeMismatch {
                expected: 4,
                actual: 2,
                ..
            })
        ));
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let mut record = VariableRecord::new();
        record.insert("u", "a", Column::Int(vec![1])).unwrap();
        assert!(record.insert("u", "a", Column::Int(vec![2])).is_err());
        assert_eq!(record.ints("a"), Some(&[1][..]));
    }

    #[test]
    fn test_rows_for_trial() {
        let record = VariableRecord::new()
            .with_column(
                "u",
                fields::TRIAL_ID,
                Column::Text(vec!["a".into(), "b".into(), "a".into()]),
            )
            .unwrap();
        assert_eq!(record.rows_for_trial("a"), vec![0, 2]);
        assert!(record.rows_for_trial("missing").is_empty());
    }

    #[test]
    fn test_typed_accessors_check_kind() {
        let record = VariableRecord::new()
            .with_column("u", fields::FIELD_MAG, Column::broadcast_float(1.5, 2))
            .unwrap();
        assert_eq!(record.floats(fields::FIELD_MAG), Some(&[1.5, 1.5][..]));
        assert!(record.texts(fields::FIELD_MAG).is_none());
        assert!(record.data().is_none());
    }
}
