//! # Device Model
//!
//! Serde model of the registry devices the manager binds radio frames to. A
//! device carries its parameters, sensors and commands keyed by reference:
//!
//! ```json
//! {
//!   "id": 12, "name": "Salon", "device_type_id": "rfplayer.5.thermohygro",
//!   "parameters": { "device": { "value": "0x1A2D.154.1" }, "dongle_id": { "value": "rfp" } },
//!   "sensors": { "temperature": { "id": 30, "name": "temperature",
//!                                 "data_type": "DT_Temp", "reference": "temperature" } },
//!   "commands": {}
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Parameter holding the RF id (or the serial port of a dongle).
pub const PARAM_DEVICE: &str = "device";
/// Parameter naming the dongle a device is reached through.
pub const PARAM_DONGLE: &str = "dongle_id";
/// Ping period of a dongle, in seconds.
pub const PARAM_TIMER_STATUS: &str = "timer_status";

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorDescriptor {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub data_type: String,
    #[serde(default)]
    pub reference: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandDescriptor {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<Value>,
}

/// A registry device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: u64,
    pub name: String,
    pub device_type_id: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, Parameter>,
    #[serde(default)]
    pub sensors: BTreeMap<String, SensorDescriptor>,
    #[serde(default)]
    pub commands: BTreeMap<String, CommandDescriptor>,
}

impl Device {
    /// Parameter value as text; numbers are formatted.
    pub fn parameter(&self, key: &str) -> Option<String> {
        self.parameters.get(key).map(|p| value_to_string(&p.value))
    }

    /// RF id (or serial port for dongles); `None` when unset or empty.
    pub fn bound_id(&self) -> Option<String> {
        self.parameter(PARAM_DEVICE).filter(|v| !v.is_empty())
    }

    /// Name of the dongle this device is reached through.
    pub fn dongle_name(&self) -> Option<String> {
        self.parameter(PARAM_DONGLE).filter(|v| !v.is_empty())
    }

    /// Ping period in seconds, 0 when absent or unparsable.
    pub fn timer_status(&self) -> u64 {
        self.parameter(PARAM_TIMER_STATUS)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    }

    /// Protocol code, second dot-segment of `device_type_id`.
    pub fn protocol(&self) -> Option<&str> {
        self.device_type_id.split('.').nth(1)
    }

    /// Command reference and descriptor for a command id.
    pub fn command_by_id(&self, command_id: u64) -> Option<(&str, &CommandDescriptor)> {
        self.commands
            .iter()
            .find(|(_, c)| c.id == command_id)
            .map(|(k, c)| (k.as_str(), c))
    }

    /// Sensors carrying the given reference.
    pub fn sensors_with_reference<'a>(
        &'a self,
        reference: &'a str,
    ) -> impl Iterator<Item = &'a SensorDescriptor> + 'a {
        self.sensors.values().filter(move |s| s.reference == reference)
    }
}

/// Catalogue entry: the sensor and command references a device type has.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceType {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub sensors: Vec<String>,
    #[serde(default)]
    pub commands: Vec<String>,
}

/// A converted sensor value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SensorValue {
    Int(i64),
    Float(f64),
}

impl SensorValue {
    pub fn as_f64(&self) -> f64 {
        match *self {
            SensorValue::Int(v) => v as f64,
            SensorValue::Float(v) => v,
        }
    }
}

impl fmt::Display for SensorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorValue::Int(v) => write!(f, "{v}"),
            SensorValue::Float(v) => write!(f, "{v}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalParameter {
    pub key: String,
    pub value: String,
}

/// Device creation proposal sent to the registry by discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedDevice {
    pub device_type: String,
    pub reference: String,
    pub global: Vec<GlobalParameter>,
}

impl DetectedDevice {
    pub fn new(device_type: &str, reference: &str, rf_id: &str) -> Self {
        DetectedDevice {
            device_type: device_type.to_string(),
            reference: reference.to_string(),
            global: vec![GlobalParameter {
                key: PARAM_DEVICE.to_string(),
                value: rf_id.to_string(),
            }],
        }
    }
}

/// Parameters of a command request, e.g. `{"value": "1", "level": 40}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandValues(pub Map<String, Value>);

impl CommandValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    /// Value as text; numbers are formatted.
    pub fn get(&self, key: &str) -> Option<String> {
        self.0.get(key).map(value_to_string)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn device() -> Device {
        serde_json::from_value(json!({
            "id": 7,
            "name": "Lamp",
            "device_type_id": "rfplayer.4.switch",
            "parameters": {
                "device": {"value": "A1"},
                "dongle_id": {"value": "rfp"},
                "timer_status": {"value": 30}
            },
            "sensors": {"switch": {"id": 3, "name": "switch", "data_type": "DT_Switch", "reference": "switch"}},
            "commands": {"switch": {"id": 11, "name": "Switch"}}
        }))
        .unwrap()
    }

    #[test]
    fn test_parameters() {
        let d = device();
        assert_eq!(d.bound_id().as_deref(), Some("A1"));
        assert_eq!(d.dongle_name().as_deref(), Some("rfp"));
        assert_eq!(d.timer_status(), 30);
        assert_eq!(d.protocol(), Some("4"));
    }

    #[test]
    fn test_command_lookup() {
        let d = device();
        assert_eq!(d.command_by_id(11).map(|(k, _)| k), Some("switch"));
        assert!(d.command_by_id(12).is_none());
        assert_eq!(d.sensors_with_reference("switch").count(), 1);
    }

    #[test]
    fn test_command_values() {
        let values = CommandValues::new().with("value", "1").with("level", 40);
        assert_eq!(values.get("value").as_deref(), Some("1"));
        assert_eq!(values.get("level").as_deref(), Some("40"));
        assert_eq!(values.get("other"), None);
    }

    #[test]
    fn test_sensor_value_serialises_bare() {
        assert_eq!(serde_json::to_string(&SensorValue::Int(1)).unwrap(), "1");
        assert_eq!(serde_json::to_string(&SensorValue::Float(21.5)).unwrap(), "21.5");
        assert_eq!(SensorValue::Int(60).to_string(), "60");
    }
}
