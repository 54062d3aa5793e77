//! Extraction of one trial's recordings into variable records
//!
//! Each recorded variable of each group becomes a block of rows: one row per
//! recorded entity, carrying its time series plus the metadata analysis code
//! filters on (group, trial, field magnitude, connection endpoints).

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use tracing::debug;

use crate::merge;
use crate::record::{fields, Column, TrialContext, TrialRecord, VariableRecord};
use crate::recording::{GroupType, RecordingHandle, Recordings};
use crate::Result;

/// Extract every recorded variable of a trial.
///
/// Groups are visited in key order (group type, then group name). When two
/// groups record a variable of the same name, the second group's rows are
/// appended after the first's; the `group_name` field tells them apart.
///
/// Variables without data and groups without variables contribute nothing.
///
/// # Errors
/// `ShapeMismatch` if a handle's index arrays disagree with its data array,
/// `SchemaMismatch` if same-named variables from two groups cannot be stacked.
///
/// # Example
///
/// ```rust
/// use std::collections::BTreeMap;
/// use trial_store::extract::extract;
/// use trial_store::record::{fields, TrialContext};
/// use trial_store::recording::{GroupType, MonitorRecording};
///
/// # fn main() -> trial_store::Result<()> {
/// let monitor = MonitorRecording::builder("neurongroup")
///     .variable("u", vec![vec![-70.0; 10]; 3])
///     .build();
/// let recordings = BTreeMap::from([(
///     GroupType::Neurons,
///     BTreeMap::from([("1".to_string(), monitor)]),
/// )]);
///
/// let trial = extract(&recordings, TrialContext::new("t1", 0.0))?;
/// let u = trial.variable("u").unwrap();
/// assert_eq!(u.rows(), 3);
/// assert!(u.floats(fields::PRE_INDEX).unwrap().iter().all(|x| x.is_nan()));
/// # Ok(())
/// # }
/// ```
pub fn extract<H: RecordingHandle>(
    recordings: &Recordings<H>,
    trial: TrialContext,
) -> Result<TrialRecord> {
    let mut variables: BTreeMap<String, VariableRecord> = BTreeMap::new();

    for (group_type, groups) in recordings {
        for (group_name, handle) in groups {
            for variable in handle.record_variables() {
                let Some(traces) = handle.traces(variable) else {
                    debug!(%group_type, group = %group_name, %variable, "variable listed without data, skipping");
                    continue;
                };

                let record =
                    extract_variable(group_type, group_name, handle, variable, traces, &trial)?;

                match variables.entry(variable.clone()) {
                    Entry::Vacant(slot) => {
                        slot.insert(record);
                    }
                    Entry::Occupied(mut slot) => {
                        debug!(%variable, group = %group_name, "variable recorded by several groups, stacking rows");
                        merge::append(variable, slot.get_mut(), record)?;
                    }
                }
            }
        }
    }

    Ok(TrialRecord::new(trial, variables))
}

#[allow(clippy::cast_precision_loss)]
fn extract_variable<H: RecordingHandle>(
    group_type: &GroupType,
    group_name: &str,
    handle: &H,
    variable: &str,
    traces: &[Vec<f64>],
    trial: &TrialContext,
) -> Result<VariableRecord> {
    let n = traces.len();

    let index = match handle.recorded_indices() {
        [] => (0_i64..).take(n).collect(),
        recorded => recorded.to_vec(),
    };

    let (pre_index, post_index) = match handle.connection_indices() {
        Some((pre, post)) if group_type.is_connection() => (
            pre.iter().map(|&i| i as f64).collect(),
            post.iter().map(|&i| i as f64).collect(),
        ),
        // connection groups must report endpoints; an empty column trips the length check
        None if group_type.is_connection() => (Vec::new(), Vec::new()),
        _ => (vec![f64::NAN; n], vec![f64::NAN; n]),
    };

    VariableRecord::with_rows(n)
        .with_column(variable, fields::DATA, Column::Series(traces.to_vec()))?
        .with_column(variable, fields::INDEX, Column::Int(index))?
        .with_column(variable, fields::PRE_INDEX, Column::Float(pre_index))?
        .with_column(variable, fields::POST_INDEX, Column::Float(post_index))?
        .with_column(variable, fields::GROUP_NAME, Column::broadcast_text(group_name, n))?
        .with_column(
            variable,
            fields::SOURCE_NAME,
            Column::broadcast_text(handle.source_name(), n),
        )?
        .with_column(variable, fields::TRIAL_ID, Column::broadcast_text(trial.trial_id(), n))?
        .with_column(variable, fields::FIELD_MAG, Column::broadcast_float(trial.field_mag(), n))
}
