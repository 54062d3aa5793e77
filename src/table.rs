//! Table projection of variable records (Arrow)
//!
//! Each variable becomes one `RecordBatch`: one column per field, one row per
//! recorded entity. Columns carry a two-level label (variable × field) in
//! their Arrow field metadata so tables can be recombined or exported
//! without losing which variable a column belongs to.
//!
//! Column mapping:
//!
//! | [`ColumnKind`] | Arrow type          |
//! |----------------|---------------------|
//! | `Series`       | `List<Float64>`     |
//! | `Float`        | `Float64`           |
//! | `Int`          | `Int64`             |
//! | `Text`         | `Utf8`              |

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float64Array, Int64Array, ListArray, StringArray};
use arrow::datatypes::{DataType, Field, Float64Type, Schema};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};

use crate::record::{Column, ColumnKind, VariableRecord};
use crate::{Error, Result};

/// Metadata key holding the variable name (outer label level).
pub const VARIABLE_KEY: &str = "variable";

/// Metadata key holding the field name (inner label level).
pub const FIELD_KEY: &str = "field";

/// Two-level column label.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ColumnLabel {
    /// Recorded variable (outer level).
    pub variable: String,
    /// Field within the variable (inner level).
    pub field: String,
}

impl ColumnLabel {
    /// Create a label.
    #[must_use]
    pub fn new(variable: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
            field: field.into(),
        }
    }
}

impl fmt::Display for ColumnLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.variable, self.field)
    }
}

/// Arrow type used for a column kind.
#[must_use]
pub fn data_type(kind: ColumnKind) -> DataType {
    match kind {
        ColumnKind::Series => DataType::new_list(DataType::Float64, true),
        ColumnKind::Float => DataType::Float64,
        ColumnKind::Int => DataType::Int64,
        ColumnKind::Text => DataType::Utf8,
    }
}

/// Column kind stored in an Arrow type.
///
/// # Errors
/// `InvalidInput` for types this crate never writes.
pub fn column_kind(data_type: &DataType) -> Result<ColumnKind> {
    match data_type {
        DataType::List(item) if item.data_type() == &DataType::Float64 => Ok(ColumnKind::Series),
        DataType::Float64 => Ok(ColumnKind::Float),
        DataType::Int64 => Ok(ColumnKind::Int),
        DataType::Utf8 => Ok(ColumnKind::Text),
        other => Err(Error::InvalidInput(format!(
            "unsupported column type {other:?}"
        ))),
    }
}

/// Convert a column into an Arrow array.
#[must_use]
pub fn to_array(column: &Column) -> ArrayRef {
    match column {
        Column::Series(rows) => Arc::new(ListArray::from_iter_primitive::<Float64Type, _, _>(
            rows.iter().map(|row| Some(row.iter().copied().map(Some))),
        )),
        Column::Float(values) => Arc::new(Float64Array::from(values.clone())),
        Column::Int(values) => Arc::new(Int64Array::from(values.clone())),
        Column::Text(values) => Arc::new(StringArray::from_iter_values(values)),
    }
}

/// Convert an Arrow array back into a column of the given kind.
///
/// # Errors
/// `StorageError` if the array holds nulls or does not match `kind`.
pub fn from_array(array: &dyn Array, kind: ColumnKind) -> Result<Column> {
    if array.null_count() > 0 {
        return Err(Error::StorageError(format!(
            "{} column holds {} null values",
            kind,
            array.null_count()
        )));
    }

    let wrong_type = || {
        Error::StorageError(format!(
            "expected {kind} column, found {:?}",
            array.data_type()
        ))
    };

    match kind {
        ColumnKind::Series => {
            let list = array
                .as_any()
                .downcast_ref::<ListArray>()
                .ok_or_else(wrong_type)?;
            let mut rows = Vec::with_capacity(list.len());
            for i in 0..list.len() {
                let values = list.value(i);
                let values = values
                    .as_any()
                    .downcast_ref::<Float64Array>()
                    .ok_or_else(wrong_type)?;
                if values.null_count() > 0 {
                    return Err(Error::StorageError(format!(
                        "series row {i} holds null samples"
                    )));
                }
                rows.push(values.values().to_vec());
            }
            Ok(Column::Series(rows))
        }
        ColumnKind::Float => {
            let values = array
                .as_any()
                .downcast_ref::<Float64Array>()
                .ok_or_else(wrong_type)?;
            Ok(Column::Float(values.values().to_vec()))
        }
        ColumnKind::Int => {
            let values = array
                .as_any()
                .downcast_ref::<Int64Array>()
                .ok_or_else(wrong_type)?;
            Ok(Column::Int(values.values().to_vec()))
        }
        ColumnKind::Text => {
            let values = array
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(wrong_type)?;
            Ok(Column::Text(
                (0..values.len()).map(|i| values.value(i).to_string()).collect(),
            ))
        }
    }
}

/// Render one variable's record as a table.
///
/// # Errors
/// `ShapeMismatch` if a field's length differs from the record's row count.
///
/// # Example
///
/// ```rust
/// use trial_store::record::{fields, Column, VariableRecord};
/// use trial_store::table::{column_labels, to_table};
///
/// # fn main() -> trial_store::Result<()> {
/// let record = VariableRecord::new()
///     .with_column("u", fields::DATA, Column::Series(vec![vec![0.0, 1.0]; 3]))?
///     .with_column("u", fields::TRIAL_ID, Column::broadcast_text("t1", 3))?;
///
/// let table = to_table("u", &record)?;
/// assert_eq!(table.num_rows(), 3);
/// assert_eq!(column_labels(&table)[0].to_string(), "u/data");
/// # Ok(())
/// # }
/// ```
pub fn to_table(variable: &str, record: &VariableRecord) -> Result<RecordBatch> {
    let mut fields = Vec::with_capacity(record.num_fields());
    let mut arrays = Vec::with_capacity(record.num_fields());

    for (field, column) in record.columns() {
        if column.len() != record.rows() {
            return Err(Error::ShapeMismatch {
                variable: variable.to_string(),
                field: field.to_string(),
                expected: record.rows(),
                actual: column.len(),
            });
        }
        let label = HashMap::from([
            (VARIABLE_KEY.to_string(), variable.to_string()),
            (FIELD_KEY.to_string(), field.to_string()),
        ]);
        fields.push(Field::new(field, data_type(column.kind()), false).with_metadata(label));
        arrays.push(to_array(column));
    }

    let schema = Schema::new(fields).with_metadata(HashMap::from([(
        VARIABLE_KEY.to_string(),
        variable.to_string(),
    )]));
    let options = RecordBatchOptions::new().with_row_count(Some(record.rows()));

    Ok(RecordBatch::try_new_with_options(
        Arc::new(schema),
        arrays,
        &options,
    )?)
}

/// Render every variable's record as a table, keyed by variable name.
///
/// # Errors
/// Same as [`to_table`].
pub fn to_tables(
    records: &BTreeMap<String, VariableRecord>,
) -> Result<BTreeMap<String, RecordBatch>> {
    records
        .iter()
        .map(|(variable, record)| Ok((variable.clone(), to_table(variable, record)?)))
        .collect()
}

/// Rebuild a variable's record from a table produced by [`to_table`].
///
/// # Errors
/// `StorageError` if the table lacks its variable label or holds columns
/// that cannot be decoded.
pub fn from_table(table: &RecordBatch) -> Result<(String, VariableRecord)> {
    let schema = table.schema();
    let variable = schema
        .metadata()
        .get(VARIABLE_KEY)
        .cloned()
        .ok_or_else(|| Error::StorageError("table has no variable label".to_string()))?;

    let mut record = VariableRecord::with_rows(table.num_rows());
    for (field, array) in schema.fields().iter().zip(table.columns()) {
        let kind = column_kind(field.data_type())?;
        let column = from_array(array.as_ref(), kind)?;
        record.insert(&variable, field.name(), column)?;
    }
    Ok((variable, record))
}

/// Two-level labels of every column in a table, in column order.
#[must_use]
pub fn column_labels(table: &RecordBatch) -> Vec<ColumnLabel> {
    let schema = table.schema();
    let table_variable = schema.metadata().get(VARIABLE_KEY);

    schema
        .fields()
        .iter()
        .map(|field| {
            let meta = field.metadata();
            let variable = meta
                .get(VARIABLE_KEY)
                .or(table_variable)
                .cloned()
                .unwrap_or_default();
            let name = meta
                .get(FIELD_KEY)
                .cloned()
                .unwrap_or_else(|| field.name().clone());
            ColumnLabel::new(variable, name)
        })
        .collect()
}
