use crate::window::TimeWindow;
use serde_json::Value;

/// One computed result for a (profile, entity, window) triple.
///
/// Group values are part of the identity, not the value: two messages with
/// different group values for the same profile/entity/window produce
/// distinct measurements.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    profile_name: String,
    entity: String,
    groups: Vec<String>,
    window: TimeWindow,
    value: Value,
}

impl Measurement {
    pub fn new(
        profile_name: impl Into<String>,
        entity: impl Into<String>,
        window: TimeWindow,
    ) -> Self {
        Self {
            profile_name: profile_name.into(),
            entity: entity.into(),
            groups: Vec::new(),
            window,
            value: Value::Null,
        }
    }

    pub fn with_groups(mut self, groups: Vec<String>) -> Self {
        self.groups = groups;
        self
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = value;
        self
    }

    pub fn profile_name(&self) -> &str {
        &self.profile_name
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    pub fn window(&self) -> TimeWindow {
        self.window
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Returns the identity persisted in the row key, without the value.
    pub fn identity(&self) -> MeasurementIdentity {
        MeasurementIdentity {
            profile_name: self.profile_name.clone(),
            entity: self.entity.clone(),
            groups: self.groups.clone(),
            window: self.window,
        }
    }
}

/// The durable identity of a measurement, as recovered from a row key.
///
/// The computed value is never part of the key, so decoding yields only
/// the identity fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeasurementIdentity {
    pub profile_name: String,
    pub entity: String,
    pub groups: Vec<String>,
    pub window: TimeWindow,
}

/// Canonicalizes a group value to its string form.
///
/// Numbers become their decimal rendering, so an integer group `200`
/// round-trips through a row key as the string `"200"`. This is lossy on
/// purpose; the key stores strings only.
pub fn canonical_group(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        other => other.to_string(),
    }
}
