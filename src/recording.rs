//! Recording handles produced by the simulation engine
//!
//! The simulator owns its monitors; this crate only reads them through the
//! [`RecordingHandle`] trait. [`MonitorRecording`] is an owned implementation
//! for drivers that copy monitor contents out of the simulator once a trial
//! finishes.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Recordings of one trial: group type → group name → handle.
pub type Recordings<H> = BTreeMap<GroupType, BTreeMap<String, H>>;

/// Category of a recorded group.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GroupType {
    /// Entity populations (one row per recorded neuron).
    Neurons,
    /// Connection sets (one row per recorded synapse, with pre/post indices).
    Synapses,
    /// Stimulus/input populations.
    Inputs,
    /// Any other category, by key. [`GroupType::new`] maps known keys to
    /// their dedicated variants.
    Other(String),
}

impl GroupType {
    /// Group type for `key`, mapping known keys to their dedicated variants.
    ///
    /// # Errors
    /// `InvalidInput` if `key` is empty.
    pub fn new(key: &str) -> crate::Result<Self> {
        match key {
            "" => Err(Error::InvalidInput("group type key must not be empty".to_string())),
            "neurons" => Ok(Self::Neurons),
            "synapses" => Ok(Self::Synapses),
            "inputs" | "input" => Ok(Self::Inputs),
            other => Ok(Self::Other(other.to_string())),
        }
    }

    /// Get the lowercase key used for this group type.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Neurons => "neurons",
            Self::Synapses => "synapses",
            Self::Inputs => "inputs",
            Self::Other(key) => key,
        }
    }

    /// True for the connection category, however it was constructed.
    #[must_use]
    pub fn is_connection(&self) -> bool {
        self.as_str() == "synapses"
    }
}

impl fmt::Display for GroupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroupType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Read-only view of one simulator monitor.
pub trait RecordingHandle {
    /// Name of the simulator object the monitor is attached to.
    fn source_name(&self) -> &str;

    /// Names of the variables recorded by this monitor.
    fn record_variables(&self) -> &[String];

    /// Recorded values of `variable`, one row per recorded entity.
    ///
    /// Returns `None` if the variable has no data.
    fn traces(&self, variable: &str) -> Option<&[Vec<f64>]>;

    /// Indices of the recorded entities in the simulator's index space.
    ///
    /// An empty slice means every entity was recorded, in order.
    fn recorded_indices(&self) -> &[i64];

    /// Source and target entity of every recorded connection.
    ///
    /// `None` for entity groups.
    fn connection_indices(&self) -> Option<(&[i64], &[i64])> {
        None
    }
}

/// Owned copy of one monitor's contents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonitorRecording {
    source_name: String,
    variables: Vec<String>,
    traces: BTreeMap<String, Vec<Vec<f64>>>,
    indices: Vec<i64>,
    connections: Option<(Vec<i64>, Vec<i64>)>,
}

impl MonitorRecording {
    /// Create a builder for a monitor attached to `source_name`.
    #[must_use]
    pub fn builder(source_name: impl Into<String>) -> MonitorRecordingBuilder {
        MonitorRecordingBuilder::new(source_name)
    }
}

impl RecordingHandle for MonitorRecording {
    fn source_name(&self) -> &str {
        &self.source_name
    }

    fn record_variables(&self) -> &[String] {
        &self.variables
    }

    fn traces(&self, variable: &str) -> Option<&[Vec<f64>]> {
        self.traces.get(variable).map(Vec::as_slice)
    }

    fn recorded_indices(&self) -> &[i64] {
        &self.indices
    }

    fn connection_indices(&self) -> Option<(&[i64], &[i64])> {
        self.connections
            .as_ref()
            .map(|(pre, post)| (pre.as_slice(), post.as_slice()))
    }
}

/// Builder for `MonitorRecording`.
#[derive(Debug)]
pub struct MonitorRecordingBuilder {
    inner: MonitorRecording,
}

impl MonitorRecordingBuilder {
    /// Create a new builder with the monitored object's name.
    #[must_use]
    pub fn new(source_name: impl Into<String>) -> Self {
        Self {
            inner: MonitorRecording {
                source_name: source_name.into(),
                ..MonitorRecording::default()
            },
        }
    }

    /// Add a recorded variable and its traces (entities x samples).
    #[must_use]
    pub fn variable(mut self, name: impl Into<String>, traces: Vec<Vec<f64>>) -> Self {
        let name = name.into();
        if !self.inner.variables.contains(&name) {
            self.inner.variables.push(name.clone());
        }
        self.inner.traces.insert(name, traces);
        self
    }

    /// Set the recorded entity indices.
    #[must_use]
    pub fn indices(mut self, indices: Vec<i64>) -> Self {
        self.inner.indices = indices;
        self
    }

    /// Set source/target entities of the recorded connections.
    #[must_use]
    pub fn connections(mut self, pre: Vec<i64>, post: Vec<i64>) -> Self {
        self.inner.connections = Some((pre, post));
        self
    }

    /// Build the `MonitorRecording`.
    #[must_use]
    pub fn build(self) -> MonitorRecording {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_type_parse_and_display() {
        assert_eq!("synapses".parse::<GroupType>().unwrap(), GroupType::Synapses);
        assert_eq!("input".parse::<GroupType>().unwrap(), GroupType::Inputs);
        assert_eq!(
            "dendrites".parse::<GroupType>().unwrap(),
            GroupType::Other("dendrites".to_string())
        );
        assert!("".parse::<GroupType>().is_err());
        assert_eq!(GroupType::Neurons.to_string(), "neurons");
    }

    #[test]
    fn test_only_synapses_are_connections() {
        assert!(GroupType::Synapses.is_connection());
        assert!(!GroupType::Neurons.is_connection());
        assert!(!GroupType::Other("synapse".to_string()).is_connection());
        assert!(GroupType::Other("synapses".to_string()).is_connection());
    }

    #[test]
    fn test_group_type_new_normalizes_known_keys() {
        assert_eq!(GroupType::new("synapses").unwrap(), GroupType::Synapses);
        assert_eq!(GroupType::new("inputs").unwrap(), GroupType::Inputs);
        assert_eq!(
            GroupType::new("spikes").unwrap(),
            GroupType::Other("spikes".to_string())
        );
        assert!(GroupType::new("").is_err());
    }

    #[test]
    fn test_monitor_builder() {
        let monitor = MonitorRecording::builder("neurongroup_1")
            .variable("u", vec![vec![0.0; 4]; 2])
            .variable("u", vec![vec![1.0; 4]; 3])
            .indices(vec![4, 5, 6])
            .build();

        assert_eq!(monitor.source_name(), "neurongroup_1");
        assert_eq!(monitor.record_variables(), &["u".to_string()]);
        assert_eq!(monitor.traces("u").map(<[_]>::len), Some(3));
        assert!(monitor.traces("v").is_none());
        assert!(monitor.connection_indices().is_none());
    }
}
