//! Group Store - cumulative, multi-trial aggregate of variable records
//!
//! ## Design
//!
//! The record form ([`GroupStore`]) is the single source of truth. The table
//! form ([`TableStore`]) is a projection derived from it and converted back
//! before saving; it is never merged into directly.
//!
//! Trial contexts are kept once per trial in a side table keyed by
//! `trial_id`. Rows reference their trial through the `trial_id` field, so
//! the parameter blob is not repeated on every row.

use std::collections::BTreeMap;

use arrow::record_batch::RecordBatch;
use tracing::{debug, warn};

use crate::merge;
use crate::record::{TrialContext, TrialRecord, VariableRecord};
use crate::table;
use crate::Result;

/// Representation requested from [`load_or_create`](crate::storage::load_or_create).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreFormat {
    /// Nested mapping: variable → field → column.
    #[default]
    Records,
    /// One Arrow table per variable.
    Tables,
}

/// Cumulative store in record form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupStore {
    variables: BTreeMap<String, VariableRecord>,
    contexts: BTreeMap<String, TrialContext>,
}

impl GroupStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assemble a store from its parts.
    #[must_use]
    pub const fn from_parts(
        variables: BTreeMap<String, VariableRecord>,
        contexts: BTreeMap<String, TrialContext>,
    ) -> Self {
        Self {
            variables,
            contexts,
        }
    }

    /// Check if the store holds no variables and no trials.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty() && self.contexts.is_empty()
    }

    /// Get the number of variables.
    #[must_use]
    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }

    /// Get the number of merged trials.
    #[must_use]
    pub fn trial_count(&self) -> usize {
        self.contexts.len()
    }

    /// Get one variable's record.
    #[must_use]
    pub fn variable(&self, name: &str) -> Option<&VariableRecord> {
        self.variables.get(name)
    }

    /// Get all variable records, keyed by variable name.
    #[must_use]
    pub const fn variables(&self) -> &BTreeMap<String, VariableRecord> {
        &self.variables
    }

    /// Get a trial's context by ID.
    #[must_use]
    pub fn context(&self, trial_id: &str) -> Option<&TrialContext> {
        self.contexts.get(trial_id)
    }

    /// Get all trial contexts, keyed by trial ID.
    #[must_use]
    pub const fn contexts(&self) -> &BTreeMap<String, TrialContext> {
        &self.contexts
    }

    /// Check if a trial has been merged.
    #[must_use]
    pub fn contains_trial(&self, trial_id: &str) -> bool {
        self.contexts.contains_key(trial_id)
    }

    /// Merge one trial into the store.
    ///
    /// Rows are appended after existing rows; the trial's context is added to
    /// the context table. Merging a trial whose ID is already present appends
    /// its rows again (logged as a warning).
    ///
    /// # Returns
    /// Number of rows appended.
    ///
    /// # Errors
    /// `SchemaMismatch` if any variable cannot be appended; the store is left
    /// unchanged.
    pub fn merge(&mut self, trial: TrialRecord) -> Result<usize> {
        let (context, variables) = trial.into_parts();
        let trial_id = context.trial_id().to_string();

        if self.contains_trial(&trial_id) {
            warn!(trial_id = %trial_id, "trial already merged, its rows will be counted twice");
        }

        let appended = merge::merge(&mut self.variables, variables)?;
        self.contexts.insert(trial_id.clone(), context);

        debug!(trial_id = %trial_id, rows = appended, "merged trial into group store");
        Ok(appended)
    }

    /// Project the store into one table per variable.
    ///
    /// # Errors
    /// `ShapeMismatch` if a record is internally misaligned.
    pub fn to_tables(&self) -> Result<TableStore> {
        Ok(TableStore {
            tables: table::to_tables(&self.variables)?,
            contexts: self.contexts.clone(),
        })
    }

    /// Split into variable records and context table.
    #[must_use]
    pub fn into_parts(
        self,
    ) -> (
        BTreeMap<String, VariableRecord>,
        BTreeMap<String, TrialContext>,
    ) {
        (self.variables, self.contexts)
    }
}

/// Cumulative store in table form (read view).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableStore {
    tables: BTreeMap<String, RecordBatch>,
    contexts: BTreeMap<String, TrialContext>,
}

impl TableStore {
    /// Create a new empty table store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the store holds no tables and no trials.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.contexts.is_empty()
    }

    /// Get one variable's table.
    #[must_use]
    pub fn table(&self, variable: &str) -> Option<&RecordBatch> {
        self.tables.get(variable)
    }

    /// Get all tables, keyed by variable name.
    #[must_use]
    pub const fn tables(&self) -> &BTreeMap<String, RecordBatch> {
        &self.tables
    }

    /// Get a trial's context by ID.
    #[must_use]
    pub fn context(&self, trial_id: &str) -> Option<&TrialContext> {
        self.contexts.get(trial_id)
    }

    /// Convert back into record form.
    ///
    /// # Errors
    /// `StorageError` if a table cannot be decoded.
    pub fn to_records(&self) -> Result<GroupStore> {
        let mut variables = BTreeMap::new();
        for table in self.tables.values() {
            let (variable, record) = table::from_table(table)?;
            variables.insert(variable, record);
        }
        Ok(GroupStore::from_parts(variables, self.contexts.clone()))
    }
}

/// A loaded store in the representation the caller asked for.
#[derive(Debug, Clone, PartialEq)]
pub enum Store {
    /// Record form.
    Records(GroupStore),
    /// Table form.
    Tables(TableStore),
}

impl Store {
    /// Empty store in the given representation.
    #[must_use]
    pub fn empty(format: StoreFormat) -> Self {
        match format {
            StoreFormat::Records => Self::Records(GroupStore::new()),
            StoreFormat::Tables => Self::Tables(TableStore::new()),
        }
    }

    /// Representation of this store.
    #[must_use]
    pub const fn format(&self) -> StoreFormat {
        match self {
            Self::Records(_) => StoreFormat::Records,
            Self::Tables(_) => StoreFormat::Tables,
        }
    }

    /// Check if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Records(store) => store.is_empty(),
            Self::Tables(store) => store.is_empty(),
        }
    }

    /// Record form, converting from tables if needed.
    ///
    /// # Errors
    /// `StorageError` if a table cannot be decoded.
    pub fn into_records(self) -> Result<GroupStore> {
        match self {
            Self::Records(store) => Ok(store),
            Self::Tables(store) => store.to_records(),
        }
    }

    /// Table form, projecting from records if needed.
    ///
    /// # Errors
    /// `ShapeMismatch` if a record is internally misaligned.
    pub fn into_tables(self) -> Result<TableStore> {
        match self {
            Self::Records(store) => store.to_tables(),
            Self::Tables(store) => Ok(store),
        }
    }
}

impl From<GroupStore> for Store {
    fn from(store: GroupStore) -> Self {
        Self::Records(store)
    }
}

impl From<TableStore> for Store {
    fn from(store: TableStore) -> Self {
        Self::Tables(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{fields, Column};

    fn trial(trial_id: &str, n: usize) -> TrialRecord {
        let u = VariableRecord::new()
            .with_column("u", fields::DATA, Column::Series(vec![vec![0.5; 4]; n]))
            .and_then(|r| r.with_column("u", fields::TRIAL_ID, Column::broadcast_text(trial_id, n)))
            .unwrap();
        TrialRecord::new(
            TrialContext::new(trial_id, 1.0),
            BTreeMap::from([("u".to_string(), u)]),
        )
    }

    #[test]
    fn test_store_default() {
        let store = GroupStore::new();
        assert!(store.is_empty());
        assert_eq!(store.variable_count(), 0);
        assert_eq!(store.trial_count(), 0);
    }

    #[test]
    fn test_merge_records_context_once() {
        let mut store = GroupStore::new();
        assert_eq!(store.merge(trial("t1", 3)).unwrap(), 3);
        assert_eq!(store.merge(trial("t2", 2)).unwrap(), 2);

        assert_eq!(store.trial_count(), 2);
        assert_eq!(store.variable("u").unwrap().rows(), 5);
        assert_eq!(store.context("t2").unwrap().trial_id(), "t2");
    }

    #[test]
    fn test_duplicate_trial_is_appended_again() {
        let mut store = GroupStore::new();
        store.merge(trial("t1", 3)).unwrap();
        store.merge(trial("t1", 3)).unwrap();

        assert_eq!(store.trial_count(), 1);
        assert_eq!(store.variable("u").unwrap().rows(), 6);
    }

    #[test]
    fn test_table_projection_round_trip() {
        let mut store = GroupStore::new();
        store.merge(trial("t1", 3)).unwrap();

        let tables = store.to_tables().unwrap();
        assert_eq!(tables.table("u").unwrap().num_rows(), 3);
        assert!(tables.context("t1").is_some());
        assert_eq!(tables.to_records().unwrap(), store);
    }

    #[test]
    fn test_store_enum_conversions() {
        let empty = Store::empty(StoreFormat::Tables);
        assert!(empty.is_empty());
        assert_eq!(empty.format(), StoreFormat::Tables);

        let mut records = GroupStore::new();
        records.merge(trial("t1", 1)).unwrap();
        let tables = Store::from(records.clone()).into_tables().unwrap();
        assert_eq!(Store::from(tables).into_records().unwrap(), records);
    }
}
