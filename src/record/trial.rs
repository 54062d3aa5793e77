//! Trial Context - identity and conditions of one simulation trial

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::VariableRecord;

/// Trial Context identifies a single simulation trial.
///
/// Only `trial_id` and `field_mag` are interpreted; the parameter blob is
/// carried verbatim so analysis code can look up any other trial setting.
/// The store keeps one context per trial id, and rows refer to it through
/// their `trial_id` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialContext {
    trial_id: String,
    #[serde(with = "field_mag_serde")]
    field_mag: f64,
    recorded_at: DateTime<Utc>,
    params: Option<serde_json::Value>,
}

impl TrialContext {
    /// Create a new trial context stamped with the current time.
    ///
    /// # Arguments
    ///
    /// * `trial_id` - Unique identifier for the trial
    /// * `field_mag` - Stimulation field magnitude applied in the trial
    #[must_use]
    pub fn new(trial_id: impl Into<String>, field_mag: f64) -> Self {
        Self {
            trial_id: trial_id.into(),
            field_mag,
            recorded_at: Utc::now(),
            params: None,
        }
    }

    /// Create a builder for constructing a trial context with optional fields.
    #[must_use]
    pub fn builder(trial_id: impl Into<String>, field_mag: f64) -> TrialContextBuilder {
        TrialContextBuilder::new(trial_id, field_mag)
    }

    /// Get the trial ID.
    #[must_use]
    pub fn trial_id(&self) -> &str {
        &self.trial_id
    }

    /// Get the field magnitude.
    #[must_use]
    pub const fn field_mag(&self) -> f64 {
        self.field_mag
    }

    /// Get the timestamp at which the trial was recorded.
    #[must_use]
    pub const fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }

    /// Get the full simulation parameter blob, if any.
    #[must_use]
    pub const fn params(&self) -> Option<&serde_json::Value> {
        self.params.as_ref()
    }
}

impl PartialEq for TrialContext {
    fn eq(&self, other: &Self) -> bool {
        let same_mag = self.field_mag.to_bits() == other.field_mag.to_bits()
            || (self.field_mag.is_nan() && other.field_mag.is_nan());
        same_mag
            && self.trial_id == other.trial_id
            && self.recorded_at == other.recorded_at
            && self.params == other.params
    }
}

/// JSON has no NaN or infinity, so non-finite magnitudes are written as
/// the strings `"NaN"`, `"inf"` and `"-inf"`.
mod field_mag_serde {
    use std::fmt;

    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};

    const NAN: &str = "NaN";
    const INF: &str = "inf";
    const NEG_INF: &str = "-inf";

    pub fn serialize<S>(value: &f64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else if value.is_nan() {
            serializer.serialize_str(NAN)
        } else if value.is_sign_positive() {
            serializer.serialize_str(INF)
        } else {
            serializer.serialize_str(NEG_INF)
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(FieldMagVisitor)
    }

    struct FieldMagVisitor;

    impl Visitor<'_> for FieldMagVisitor {
        type Value = f64;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            write!(f, "a number or one of \"{NAN}\", \"{INF}\", \"{NEG_INF}\"")
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<f64, E> {
            Ok(v)
        }

        #[allow(clippy::cast_precision_loss)]
        fn visit_i64<E: de::Error>(self, v: i64) -> Result<f64, E> {
            Ok(v as f64)
        }

        #[allow(clippy::cast_precision_loss)]
        fn visit_u64<E: de::Error>(self, v: u64) -> Result<f64, E> {
            Ok(v as f64)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<f64, E> {
            match v {
                NAN => Ok(f64::NAN),
                INF => Ok(f64::INFINITY),
                NEG_INF => Ok(f64::NEG_INFINITY),
                other => Err(E::invalid_value(de::Unexpected::Str(other), &self)),
            }
        }
    }
}

/// Builder for `TrialContext`.
#[derive(Debug)]
pub struct TrialContextBuilder {
    trial_id: String,
    field_mag: f64,
    recorded_at: DateTime<Utc>,
    params: Option<serde_json::Value>,
}

impl TrialContextBuilder {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new(trial_id: impl Into<String>, field_mag: f64) -> Self {
        Self {
            trial_id: trial_id.into(),
            field_mag,
            recorded_at: Utc::now(),
            params: None,
        }
    }

    /// Set the simulation parameter blob.
    #[must_use]
    pub fn params(mut self, params: serde_json::Value) -> Self {
        self.params = Some(params);
        self
    }

    /// Set a custom recording timestamp (useful for replay/testing).
    #[must_use]
    pub const fn recorded_at(mut self, recorded_at: DateTime<Utc>) -> Self {
        self.recorded_at = recorded_at;
        self
    }

    /// Build the `TrialContext`.
    #[must_use]
    pub fn build(self) -> TrialContext {
        TrialContext {
            trial_id: self.trial_id,
            field_mag: self.field_mag,
            recorded_at: self.recorded_at,
            params: self.params,
        }
    }
}

/// Everything extracted from one trial: its context plus one record per
/// recorded variable.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialRecord {
    context: TrialContext,
    variables: BTreeMap<String, VariableRecord>,
}

impl TrialRecord {
    /// Bundle a trial's context with its variable records.
    #[must_use]
    pub const fn new(context: TrialContext, variables: BTreeMap<String, VariableRecord>) -> Self {
        Self { context, variables }
    }

    /// Get the trial context.
    #[must_use]
    pub const fn context(&self) -> &TrialContext {
        &self.context
    }

    /// Get the per-variable records.
    #[must_use]
    pub const fn variables(&self) -> &BTreeMap<String, VariableRecord> {
        &self.variables
    }

    /// Get one variable's record.
    #[must_use]
    pub fn variable(&self, name: &str) -> Option<&VariableRecord> {
        self.variables.get(name)
    }

    /// Split into context and variable records.
    #[must_use]
    pub fn into_parts(self) -> (TrialContext, BTreeMap<String, VariableRecord>) {
        (self.context, self.variables)
    }
}
