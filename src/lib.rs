//! # trial-store: Group-Level Store for Simulation Trials
//!
//! **Version**: 0.1.0
//!
//! trial-store turns the monitors of one simulated trial (neuron and synapse
//! recordings) into row-aligned variable records, appends them to a
//! cumulative multi-trial store, and persists that store as a single Parquet
//! file that grows run after run.
//!
//! ## Pipeline
//!
//! ```text
//! recordings ──extract──> TrialRecord ──merge──> GroupStore ──save──> store.parquet
//!                                                   │                      │
//!                                              to_tables            load_or_create
//!                                                   ▼
//!                                     one Arrow table per variable
//! ```
//!
//! ## Design Principles
//!
//! - **Append-only**: merging a trial never rewrites existing rows
//! - **Structural alignment**: every field of a variable has the same row
//!   count by construction, not by convention
//! - **One source of truth**: tables are projections of the record form
//! - **Normalized contexts**: a trial's parameters are stored once, rows
//!   reference them by `trial_id`
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::collections::BTreeMap;
//! use trial_store::extract::extract;
//! use trial_store::record::TrialContext;
//! use trial_store::recording::{GroupType, MonitorRecording};
//! use trial_store::storage::StoreFile;
//! use trial_store::store::StoreFormat;
//!
//! let file = StoreFile::new("results/polarization", "group.parquet")?;
//! let mut store = file.load_or_create(StoreFormat::Records)?.into_records()?;
//!
//! let monitor = MonitorRecording::builder("neurongroup")
//!     .variable("u", vec![vec![-70.0; 100]; 3])
//!     .build();
//! let recordings = BTreeMap::from([(
//!     GroupType::Neurons,
//!     BTreeMap::from([("1".to_string(), monitor)]),
//! )]);
//!
//! store.merge(extract(&recordings, TrialContext::new("t1", 20.0))?)?;
//! file.save_records(&store)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod error;
pub mod extract;
pub mod merge;
pub mod record;
pub mod recording;
pub mod storage;
pub mod store;
pub mod table;

pub use error::{Error, Result};
pub use record::{Column, ColumnKind, TrialContext, TrialRecord, VariableRecord};
pub use recording::{GroupType, MonitorRecording, RecordingHandle, Recordings};
pub use storage::{load_or_create, save, StoreFile, StoreOptions};
pub use store::{GroupStore, Store, StoreFormat, TableStore};
