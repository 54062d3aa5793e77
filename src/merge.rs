//! Incremental merge of trial records into a cumulative store
//!
//! **Append-Only Write Pattern**:
//! - Existing rows are never rewritten; new rows land after them
//! - A variable unseen so far is inserted whole
//! - No deduplication: merging the same trial twice stores its rows twice
//!
//! Every variable is validated before any is modified, so a rejected merge
//! leaves the store exactly as it was.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use crate::record::VariableRecord;
use crate::{Error, Result};

/// Merge `incoming` variable records into `store`.
///
/// For a variable already in the store, each incoming field is appended to
/// the existing field of the same name. A field present on only one side is
/// accepted only while the other side holds no rows, since anything else
/// would leave the variable's fields with different lengths.
///
/// # Returns
/// Number of rows appended across all variables.
///
/// # Errors
/// `SchemaMismatch` if any variable cannot be appended; nothing is merged in
/// that case.
///
/// # Example
///
/// ```rust
/// use std::collections::BTreeMap;
/// use trial_store::merge::merge;
/// use trial_store::record::{fields, Column, VariableRecord};
///
/// # fn main() -> trial_store::Result<()> {
/// let rows = |id: &str, n| VariableRecord::new().with_column("u", fields::TRIAL_ID, Column::broadcast_text(id, n));
///
/// let mut store = BTreeMap::new();
/// merge(&mut store, BTreeMap::from([("u".to_string(), rows("t1", 3)?)]))?;
/// merge(&mut store, BTreeMap::from([("u".to_string(), rows("t2", 2)?)]))?;
///
/// assert_eq!(store["u"].rows(), 5);
/// assert_eq!(store["u"].rows_for_trial("t2"), vec![3, 4]);
/// # Ok(())
/// # }
/// ```
pub fn merge(
    store: &mut BTreeMap<String, VariableRecord>,
    incoming: BTreeMap<String, VariableRecord>,
) -> Result<usize> {
    for (variable, record) in &incoming {
        if let Some(existing) = store.get(variable) {
            check_append(variable, existing, record)?;
        }
    }

    let mut appended = 0;
    for (variable, record) in incoming {
        appended += record.rows();
        match store.entry(variable) {
            Entry::Vacant(slot) => {
                slot.insert(record);
            }
            Entry::Occupied(mut slot) => {
                let variable = slot.key().clone();
                append_checked(&variable, slot.get_mut(), record)?;
            }
        }
    }
    Ok(appended)
}

/// Append `incoming` rows onto one variable's record.
///
/// # Errors
/// `SchemaMismatch` if the records cannot be stacked; `existing` is left
/// unchanged.
pub fn append(variable: &str, existing: &mut VariableRecord, incoming: VariableRecord) -> Result<()> {
    check_append(variable, existing, &incoming)?;
    append_checked(variable, existing, incoming)
}

fn check_append(variable: &str, existing: &VariableRecord, incoming: &VariableRecord) -> Result<()> {
    if existing.is_empty() {
        return Ok(());
    }

    let mismatch = |reason: String| Error::SchemaMismatch {
        variable: variable.to_string(),
        reason,
    };

    for (field, column) in incoming.columns() {
        match existing.column(field) {
            Some(current) if current.kind() != column.kind() => {
                return Err(mismatch(format!(
                    "field '{field}' holds {} values in the store but {} values in the incoming rows",
                    current.kind(),
                    column.kind()
                )));
            }
            Some(_) => {}
            None if existing.rows() > 0 => {
                return Err(mismatch(format!(
                    "field '{field}' is new but {} rows already exist without it",
                    existing.rows()
                )));
            }
            None => {}
        }
    }

    if incoming.rows() > 0 {
        if let Some(field) = existing.fields().find(|f| incoming.column(f).is_none()) {
            return Err(mismatch(format!(
                "field '{field}' is missing from {} incoming rows",
                incoming.rows()
            )));
        }
    }

    Ok(())
}

fn append_checked(variable: &str, existing: &mut VariableRecord, incoming: VariableRecord) -> Result<()> {
    if existing.is_empty() {
        *existing = incoming;
        return Ok(());
    }

    let rows = existing.rows() + incoming.rows();
    for (field, column) in incoming.into_columns() {
        match existing.column_mut(&field) {
            Some(current) => {
                current
                    .extend(column)
                    .map_err(|(have, got)| Error::SchemaMismatch {
                        variable: variable.to_string(),
                        reason: format!("field '{field}' cannot append {got} values to {have} values"),
                    })?;
            }
            None => existing.insert_unchecked(field, column),
        }
    }
    existing.set_rows(rows);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{fields, Column};

    fn record(trial: &str, n: usize) -> VariableRecord {
        VariableRecord::new()
            .with_column("u", fields::TRIAL_ID, Column::broadcast_text(trial, n))
            .and_then(|r| r.with_column("u", fields::FIELD_MAG, Column::broadcast_float(0.0, n)))
            .unwrap()
    }

    #[test]
    fn test_new_variable_inserted_unchanged() {
        let mut store = BTreeMap::new();
        let incoming = record("t1", 3);
        let appended = merge(&mut store, BTreeMap::from([("u".to_string(), incoming.clone())])).unwrap();

        assert_eq!(appended, 3);
        assert_eq!(store["u"], incoming);
    }

    #[test]
    fn test_existing_variable_appends_after_existing_rows() {
        let mut store = BTreeMap::from([("u".to_string(), record("t1", 3))]);
        merge(&mut store, BTreeMap::from([("u".to_string(), record("t2", 2))])).unwrap();

        let ids = store["u"].texts(fields::TRIAL_ID).unwrap();
        assert_eq!(ids, &["t1", "t1", "t1", "t2", "t2"]);
        assert_eq!(store["u"].rows(), 5);
    }

    #[test]
    fn test_new_field_on_populated_variable_rejected() {
        let mut store = BTreeMap::from([("u".to_string(), record("t1", 3))]);
        let incoming = record("t2", 2)
            .with_column("u", fields::INDEX, Column::Int(vec![0, 1]))
            .unwrap();

        let err = merge(&mut store, BTreeMap::from([("u".to_string(), incoming)])).unwrap_err();
        assert!(err.is_shape_fault());
        assert_eq!(store["u"].rows(), 3);
    }

    #[test]
    fn test_new_field_inserted_when_existing_has_no_rows() {
        let mut store = BTreeMap::from([("u".to_string(), record("t0", 0))]);
        let incoming = record("t1", 2)
            .with_column("u", fields::INDEX, Column::Int(vec![4, 5]))
            .unwrap();

        merge(&mut store, BTreeMap::from([("u".to_string(), incoming)])).unwrap();
        assert_eq!(store["u"].rows(), 2);
        assert_eq!(store["u"].ints(fields::INDEX), Some(&[4, 5][..]));
    }

    #[test]
    fn test_failed_merge_leaves_every_variable_untouched() {
        let mut store = BTreeMap::from([
            ("u".to_string(), record("t1", 3)),
            ("w".to_string(), record("t1", 1)),
        ]);
        let before = store.clone();

        let bad_w = VariableRecord::new()
            .with_column("w", fields::TRIAL_ID, Column::Int(vec![2]))
            .unwrap();
        let incoming = BTreeMap::from([("u".to_string(), record("t2", 2)), ("w".to_string(), bad_w)]);

        assert!(merge(&mut store, incoming).is_err());
        assert_eq!(store, before);
    }

    #[test]
    fn test_missing_field_in_incoming_rejected() {
        let mut existing = record("t1", 1);
        let incoming = VariableRecord::new()
            .with_column("u", fields::TRIAL_ID, Column::broadcast_text("t2", 1))
            .unwrap();

        let err = append("u", &mut existing, incoming).unwrap_err();
        assert!(err.to_string().contains("field_mag"));
    }
}
