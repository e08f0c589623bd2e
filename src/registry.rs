//! # Registry and Event Sink
//!
//! The manager reaches the outside world through two traits: a
//! [`DeviceRegistry`] holding the device catalogue and the configured devices,
//! and an [`EventSink`] receiving sensor values and state publications.
//! [`StaticRegistry`], [`LogSink`] and [`MemorySink`] are the in-process
//! implementations used by the CLI and the tests.

use crate::device::{DetectedDevice, Device, DeviceType, SensorValue};
use crate::error::RfpError;
use crate::logging::{log_debug, log_info};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, RwLock};

/// Destination of sensor values and state messages.
pub trait EventSink: Send + Sync {
    fn emit_sensor(&self, device: &Device, sensor_id: u64, value_type: &str, value: SensorValue);

    fn publish(&self, category: &str, content: &Value);
}

/// Device catalogue and persistence.
pub trait DeviceRegistry: Send + Sync {
    fn list_devices(&self) -> Vec<Device>;

    /// Device types keyed by id.
    fn device_types(&self) -> BTreeMap<String, DeviceType>;

    /// Proposes the creation of a device found on air.
    fn device_detected(&self, detected: DetectedDevice);

    /// Devices whose `device` parameter equals `rf_id`.
    fn devices_bound_to(&self, rf_id: &str) -> Vec<Device> {
        self.list_devices()
            .into_iter()
            .filter(|d| d.bound_id().as_deref() == Some(rf_id))
            .collect()
    }

    fn device(&self, id: u64) -> Option<Device> {
        self.list_devices().into_iter().find(|d| d.id == id)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Catalogue {
    device_types: BTreeMap<String, DeviceType>,
    devices: Vec<Device>,
}

/// In-memory registry loaded from a JSON catalogue:
/// `{"device_types": {"<id>": {"sensors": [..], "commands": [..]}}, "devices": [..]}`.
#[derive(Debug, Default)]
pub struct StaticRegistry {
    device_types: BTreeMap<String, DeviceType>,
    devices: RwLock<Vec<Device>>,
    detected: Mutex<Vec<DetectedDevice>>,
}

impl StaticRegistry {
    pub fn new(device_types: BTreeMap<String, DeviceType>, devices: Vec<Device>) -> Self {
        StaticRegistry {
            device_types,
            devices: RwLock::new(devices),
            detected: Mutex::new(Vec::new()),
        }
    }

    pub fn from_json(text: &str) -> Result<Self, RfpError> {
        let catalogue: Catalogue = serde_json::from_str(text)?;
        Ok(Self::new(catalogue.device_types, catalogue.devices))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RfpError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn set_devices(&self, devices: Vec<Device>) {
        if let Ok(mut d) = self.devices.write() {
            *d = devices;
        }
    }

    pub fn add_device(&self, device: Device) {
        if let Ok(mut d) = self.devices.write() {
            d.push(device);
        }
    }

    /// Every proposal received so far.
    pub fn detected(&self) -> Vec<DetectedDevice> {
        self.detected.lock().map(|d| d.clone()).unwrap_or_default()
    }
}

impl DeviceRegistry for StaticRegistry {
    fn list_devices(&self) -> Vec<Device> {
        self.devices.read().map(|d| d.clone()).unwrap_or_default()
    }

    fn device_types(&self) -> BTreeMap<String, DeviceType> {
        self.device_types.clone()
    }

    fn device_detected(&self, detected: DetectedDevice) {
        log_info(&format!(
            "Device detected: {} ({}) as {}",
            detected.reference,
            detected
                .global
                .first()
                .map(|g| g.value.as_str())
                .unwrap_or_default(),
            detected.device_type
        ));
        if let Ok(mut d) = self.detected.lock() {
            d.push(detected);
        }
    }
}

/// Sink writing everything to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit_sensor(&self, device: &Device, sensor_id: u64, value_type: &str, value: SensorValue) {
        log_info(&format!(
            "Sensor {sensor_id} of {} ({value_type}) = {value}",
            device.name
        ));
    }

    fn publish(&self, category: &str, content: &Value) {
        log_debug(&format!("Publishing <{category}>, data : {content}"));
    }
}

/// A sensor emission captured by [`MemorySink`].
#[derive(Debug, Clone, PartialEq)]
pub struct SensorEvent {
    pub device_id: u64,
    pub sensor_id: u64,
    pub value_type: String,
    pub value: SensorValue,
}

/// Sink keeping everything in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    sensors: Mutex<Vec<SensorEvent>>,
    published: Mutex<Vec<(String, Value)>>,
}

impl MemorySink {
    pub fn sensors(&self) -> Vec<SensorEvent> {
        self.sensors.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn published(&self) -> Vec<(String, Value)> {
        self.published.lock().map(|p| p.clone()).unwrap_or_default()
    }

    /// Publications of one category, oldest first.
    pub fn published_in(&self, category: &str) -> Vec<Value> {
        self.published()
            .into_iter()
            .filter(|(c, _)| c == category)
            .map(|(_, v)| v)
            .collect()
    }
}

impl EventSink for MemorySink {
    fn emit_sensor(&self, device: &Device, sensor_id: u64, value_type: &str, value: SensorValue) {
        if let Ok(mut s) = self.sensors.lock() {
            s.push(SensorEvent {
                device_id: device.id,
                sensor_id,
                value_type: value_type.to_string(),
                value,
            });
        }
    }

    fn publish(&self, category: &str, content: &Value) {
        if let Ok(mut p) = self.published.lock() {
            p.push((category.to_string(), content.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOGUE: &str = r#"{
        "device_types": {
            "rfplayer.4.switch": {"sensors": ["switch", "rf_quality"], "commands": ["switch", "switch_all", "dimmer"]}
        },
        "devices": [
            {"id": 1, "name": "Lamp", "device_type_id": "rfplayer.4.switch",
             "parameters": {"device": {"value": "A1"}, "dongle_id": {"value": "rfp"}}},
            {"id": 2, "name": "Porch", "device_type_id": "rfplayer.4.switch",
             "parameters": {"device": {"value": "A1"}}}
        ]
    }"#;

    #[test]
    fn test_catalogue_lookup() {
        let registry = StaticRegistry::from_json(CATALOGUE).unwrap();
        assert_eq!(registry.device_types().len(), 1);
        assert_eq!(registry.devices_bound_to("A1").len(), 2);
        assert!(registry.devices_bound_to("B2").is_empty());
        assert_eq!(registry.device(2).unwrap().name, "Porch");
    }

    #[test]
    fn test_detected_devices_are_kept() {
        let registry = StaticRegistry::default();
        registry.device_detected(DetectedDevice::new("rfplayer.4.switch", "Protocol CHACON", "A9"));
        let detected = registry.detected();
        assert_eq!(detected.len(), 1);
        assert_eq!(detected[0].global[0].value, "A9");
    }

    #[test]
    fn test_memory_sink() {
        let sink = MemorySink::default();
        let device = Device::default();
        sink.emit_sensor(&device, 4, "DT_Temp", SensorValue::Float(20.5));
        sink.publish("rfplayer.manager.state", &serde_json::json!({"status": "alive"}));
        assert_eq!(sink.sensors()[0].sensor_id, 4);
        assert_eq!(sink.published_in("rfplayer.manager.state").len(), 1);
    }
}
