//! Parquet encoding of a [`GroupStore`]
//!
//! Long layout: one row per (variable, entity). The first column names the
//! variable; the remaining columns are the union of every variable's fields,
//! null on rows of variables that lack the field.
//!
//! Schema metadata:
//! - `trial_store.version`: layout version
//! - `trial_store.variables`: variable → field → kind, so variables without
//!   rows still round-trip with their fields
//! - `trial_store.contexts`: trial ID → trial context (JSON)

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::Write;
use std::sync::Arc;

use arrow::array::{new_null_array, Array, ArrayRef, StringArray};
use arrow::compute::filter_record_batch;
use arrow::compute::kernels::cmp::eq;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;

use crate::record::{Column, ColumnKind, TrialContext, VariableRecord};
use crate::store::GroupStore;
use crate::table;
use crate::{Error, Result};

/// Name of the column identifying each row's variable.
pub const VARIABLE_COLUMN: &str = "variable";

const VERSION_KEY: &str = "trial_store.version";
const VARIABLES_KEY: &str = "trial_store.variables";
const CONTEXTS_KEY: &str = "trial_store.contexts";
const FORMAT_VERSION: &str = "1";

type Manifest = BTreeMap<String, BTreeMap<String, ColumnKind>>;

/// Write `store` as Parquet into `sink`.
pub(crate) fn write_store<W: Write + Send>(
    store: &GroupStore,
    sink: W,
    max_row_group_size: usize,
) -> Result<()> {
    let manifest: Manifest = store
        .variables()
        .iter()
        .map(|(variable, record)| (variable.clone(), record.schema()))
        .collect();
    let union = union_schema(&manifest)?;

    let mut columns = vec![Field::new(VARIABLE_COLUMN, DataType::Utf8, false)];
    columns.extend(
        union
            .iter()
            .map(|(field, kind)| Field::new(field, table::data_type(*kind), true)),
    );
    let metadata = HashMap::from([
        (VERSION_KEY.to_string(), FORMAT_VERSION.to_string()),
        (VARIABLES_KEY.to_string(), serde_json::to_string(&manifest)?),
        (CONTEXTS_KEY.to_string(), serde_json::to_string(store.contexts())?),
    ]);
    let schema = Arc::new(Schema::new(columns).with_metadata(metadata));

    let props = WriterProperties::builder()
        .set_max_row_group_size(max_row_group_size.max(1))
        .build();
    let mut writer = ArrowWriter::try_new(sink, Arc::clone(&schema), Some(props))
        .map_err(|e| Error::StorageError(format!("Failed to create Parquet writer: {e}")))?;

    for (variable, record) in store.variables() {
        if record.rows() == 0 {
            continue;
        }
        let batch = long_batch(&schema, &union, variable, record)?;
        writer
            .write(&batch)
            .map_err(|e| Error::StorageError(format!("Failed to write variable '{variable}': {e}")))?;
    }

    writer
        .close()
        .map_err(|e| Error::StorageError(format!("Failed to finish Parquet file: {e}")))?;
    Ok(())
}

/// Read a store previously written by [`write_store`].
pub(crate) fn read_store(file: File) -> Result<GroupStore> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(|e| Error::StorageError(format!("Failed to parse Parquet file: {e}")))?;

    let metadata = builder.schema().metadata().clone();
    match metadata.get(VERSION_KEY).map(String::as_str) {
        Some(FORMAT_VERSION) => {}
        Some(other) => {
            return Err(Error::StorageError(format!(
                "unsupported store layout version {other}"
            )))
        }
        None => {
            return Err(Error::StorageError(
                "file carries no trial store metadata".to_string(),
            ))
        }
    }
    let manifest: Manifest = serde_json::from_str(required(&metadata, VARIABLES_KEY)?)?;
    let contexts: BTreeMap<String, TrialContext> =
        serde_json::from_str(required(&metadata, CONTEXTS_KEY)?)?;

    let reader = builder
        .build()
        .map_err(|e| Error::StorageError(format!("Failed to create Parquet reader: {e}")))?;

    let mut pending: BTreeMap<&str, (usize, BTreeMap<&str, Column>)> = manifest
        .iter()
        .map(|(variable, fields)| {
            let columns = fields
                .iter()
                .map(|(field, kind)| (field.as_str(), Column::empty(*kind)))
                .collect();
            (variable.as_str(), (0, columns))
        })
        .collect();

    for batch in reader {
        let batch =
            batch.map_err(|e| Error::StorageError(format!("Failed to read record batch: {e}")))?;
        let names = batch
            .column_by_name(VARIABLE_COLUMN)
            .and_then(|array| array.as_any().downcast_ref::<StringArray>())
            .ok_or_else(|| {
                Error::StorageError(format!("missing '{VARIABLE_COLUMN}' column"))
            })?;

        let mut matched = 0;
        for (variable, (rows, columns)) in &mut pending {
            let mask = eq(names, &StringArray::new_scalar(*variable))?;
            let selected = filter_record_batch(&batch, &mask)?;
            if selected.num_rows() == 0 {
                continue;
            }
            matched += selected.num_rows();
            *rows += selected.num_rows();

            for (field, column) in columns.iter_mut() {
                let array = selected.column_by_name(field).ok_or_else(|| {
                    Error::StorageError(format!(
                        "variable '{variable}' lists field '{field}' but the file has no such column"
                    ))
                })?;
                let part = table::from_array(array.as_ref(), column.kind())?;
                column.extend(part).map_err(|(have, got)| {
                    Error::StorageError(format!(
                        "field '{field}' of variable '{variable}' decoded as {got}, expected {have}"
                    ))
                })?;
            }
        }

        if matched != batch.num_rows() {
            return Err(Error::StorageError(format!(
                "{} rows belong to variables missing from the manifest",
                batch.num_rows() - matched
            )));
        }
    }

    let mut variables = BTreeMap::new();
    for (variable, (rows, columns)) in pending {
        let mut record = VariableRecord::with_rows(rows);
        for (field, column) in columns {
            record.insert(variable, field, column)?;
        }
        variables.insert(variable.to_string(), record);
    }

    Ok(GroupStore::from_parts(variables, contexts))
}

fn required<'a>(metadata: &'a HashMap<String, String>, key: &str) -> Result<&'a str> {
    metadata
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| Error::StorageError(format!("missing '{key}' metadata")))
}

/// One Arrow type per field name across all variables.
fn union_schema(manifest: &Manifest) -> Result<BTreeMap<String, ColumnKind>> {
    let mut union: BTreeMap<String, ColumnKind> = BTreeMap::new();
    for (variable, fields) in manifest {
        for (field, kind) in fields {
            if field == VARIABLE_COLUMN {
                return Err(Error::InvalidInput(format!(
                    "variable '{variable}' uses reserved field name '{VARIABLE_COLUMN}'"
                )));
            }
            match union.get(field) {
                Some(existing) if existing != kind => {
                    return Err(Error::SchemaMismatch {
                        variable: variable.clone(),
                        reason: format!(
                            "field '{field}' holds {kind} values here but {existing} values in another variable"
                        ),
                    });
                }
                Some(_) => {}
                None => {
                    union.insert(field.clone(), *kind);
                }
            }
        }
    }
    Ok(union)
}

fn long_batch(
    schema: &Arc<Schema>,
    union: &BTreeMap<String, ColumnKind>,
    variable: &str,
    record: &VariableRecord,
) -> Result<RecordBatch> {
    let rows = record.rows();
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(union.len() + 1);
    arrays.push(Arc::new(StringArray::from(vec![variable; rows])));
    for (field, kind) in union {
        arrays.push(match record.column(field) {
            Some(column) => table::to_array(column),
            None => new_null_array(&table::data_type(*kind), rows),
        });
    }
    Ok(RecordBatch::try_new(Arc::clone(schema), arrays)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::fields;

    #[test]
    fn test_union_schema_rejects_conflicting_kinds() {
        let manifest = Manifest::from([
            ("u".to_string(), BTreeMap::from([("x".to_string(), ColumnKind::Int)])),
            ("w".to_string(), BTreeMap::from([("x".to_string(), ColumnKind::Text)])),
        ]);
        let err = union_schema(&manifest).unwrap_err();
        assert!(err.is_shape_fault());
    }

    #[test]
    fn test_union_schema_rejects_reserved_field() {
        let manifest = Manifest::from([(
            "u".to_string(),
            BTreeMap::from([(VARIABLE_COLUMN.to_string(), ColumnKind::Text)]),
        )]);
        assert!(matches!(
            union_schema(&manifest),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_long_batch_nulls_missing_fields() {
        let record = VariableRecord::new()
            .with_column("u", fields::INDEX, Column::Int(vec![1, 2]))
            .unwrap();
        let union = BTreeMap::from([
            (fields::INDEX.to_string(), ColumnKind::Int),
            (fields::TRIAL_ID.to_string(), ColumnKind::Text),
        ]);
        let schema = Arc::new(Schema::new(vec![
            Field::new(VARIABLE_COLUMN, DataType::Utf8, false),
            Field::new(fields::INDEX, DataType::Int64, true),
            Field::new(fields::TRIAL_ID, DataType::Utf8, true),
        ]));

        let batch = long_batch(&schema, &union, "u", &record).unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.column(2).null_count(), 2);
        assert_eq!(batch.column(1).null_count(), 0);
    }
}
