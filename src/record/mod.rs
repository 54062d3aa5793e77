//! Record model for extracted trial data
//!
//! ## Shape
//!
//! ```text
//! TrialRecord
//!   ├── TrialContext            (one per trial, keyed by trial_id)
//!   └── variable name ──> VariableRecord
//!                            └── field name ──> Column   [all columns: same row count]
//! ```
//!
//! Rows index recorded entities (neurons or synapses). Trials are stacked
//! along that axis when merged into a [`GroupStore`](crate::store::GroupStore).

mod column;
mod trial;
mod variable;

pub use column::{Column, ColumnKind};
pub use trial::{TrialContext, TrialContextBuilder, TrialRecord};
pub use variable::{fields, VariableRecord};
