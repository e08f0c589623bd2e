//! # RFPlayer Manager
//!
//! The [`RfpManager`] owns one [`DongleClient`] per configured RFP1000 and is
//! the bridge between the dongles and the device registry:
//!
//! - decoded radio events become sensor values of the devices bound to their
//!   RF id, or device proposals when nothing is bound yet;
//! - device commands are rendered through the InfoType tables and queued on
//!   the dongle the device names;
//! - admin requests (`manager.getstatus`, `client.*`) are routed to clients.
//!
//! Clients report to the manager over one event channel, tagged with their
//! id; the manager never hands itself to a client.

use crate::config::RfpConfig;
use crate::constants::{RFP1000_DEVICE_TYPE, STATUS_SENSOR_REF};
use crate::device::{CommandValues, DetectedDevice, Device, SensorValue};
use crate::error::{Report, RfpError};
use crate::infotypes::{info_types_for_protocol, InfoType, RfpFrame};
use crate::logging::{log_debug, log_error, log_info, log_warn};
use crate::registry::{DeviceRegistry, EventSink};
use crate::rfp::client::{ClientEvent, DongleClient, EventSender, FirmwareChunk};
use crate::rfp::commands::{ActionCommand, TranscoderEntry};
use crate::rfp::monitor::MonitorManager;
use crate::rfp::transport::Connector;
use crate::scheduler::PingScheduler;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Why a device command was not sent.
#[derive(Debug, Error)]
pub enum CommandRejection {
    #[error("no command descriptor found")]
    NoCommand,

    #[error("no bound dongle")]
    NoDongle,

    #[error("no InfoType could render")]
    NotRenderable,

    #[error("{0}")]
    Submit(RfpError),
}

/// Answer to `manager.getstatus`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManagerSnapshot {
    pub status: String,
    #[serde(rename = "rfPlayers")]
    pub rf_players: Vec<Value>,
    pub error: String,
}

struct ClientEntry {
    client: Arc<DongleClient>,
    device: Device,
}

/// Client id of a dongle device: `<name>.<id>`.
pub fn client_id(device: &Device) -> String {
    format!("{}.{}", device.name, device.id)
}

fn is_dongle(device: &Device) -> bool {
    device.device_type_id == RFP1000_DEVICE_TYPE && device.bound_id().is_some()
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// True when one candidate set holds exactly the `wanted` references.
///
/// With no candidates, only an empty `wanted` matches.
fn matches_references(candidates: &[Vec<&str>], wanted: &[String]) -> bool {
    if candidates.is_empty() {
        return wanted.is_empty();
    }
    candidates.iter().any(|set| {
        set.len() == wanted.len() && set.iter().all(|r| wanted.iter().any(|w| w == r))
    })
}

#[derive(Deserialize)]
struct SystemRequest {
    command: String,
    #[serde(default)]
    value: String,
}

#[derive(Deserialize)]
struct ProtocolRequest {
    protocol: String,
    mode: String,
    enabled: bool,
}

#[derive(Deserialize)]
struct BandRequest {
    band: String,
    command: String,
    value: String,
}

/// Owner of the dongle clients.
pub struct RfpManager {
    config: RfpConfig,
    registry: Arc<dyn DeviceRegistry>,
    sink: Arc<dyn EventSink>,
    connector: Arc<dyn Connector>,
    clients: RwLock<BTreeMap<String, ClientEntry>>,
    monitors: MonitorManager,
    scheduler: Mutex<PingScheduler>,
    events: EventSender,
    event_task: Mutex<Option<JoinHandle<()>>>,
}

impl RfpManager {
    /// Creates the manager and starts its event loop on the current runtime.
    pub fn new(
        config: RfpConfig,
        registry: Arc<dyn DeviceRegistry>,
        sink: Arc<dyn EventSink>,
        connector: Arc<dyn Connector>,
    ) -> Arc<Self> {
        let (events, mut rx) = mpsc::unbounded_channel::<(String, ClientEvent)>();
        let manager = Arc::new(RfpManager {
            monitors: MonitorManager::new(config.monitor_dir.clone()),
            config,
            registry,
            sink,
            connector,
            clients: RwLock::new(BTreeMap::new()),
            scheduler: Mutex::new(PingScheduler::new()),
            events,
            event_task: Mutex::new(None),
        });
        let weak: Weak<RfpManager> = Arc::downgrade(&manager);
        let task = tokio::spawn(async move {
            while let Some((id, event)) = rx.recv().await {
                let Some(manager) = weak.upgrade() else {
                    break;
                };
                manager.handle_event(&id, event);
            }
            log_debug("Manager event loop stopped");
        });
        *lock(&manager.event_task) = Some(task);
        manager
    }

    pub fn client(&self, id: &str) -> Option<Arc<DongleClient>> {
        let clients = self.clients.read().ok()?;
        clients.get(id).map(|e| Arc::clone(&e.client))
    }

    pub fn client_ids(&self) -> Vec<String> {
        self.clients
            .read()
            .map(|c| c.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn dongle_device(&self, id: &str) -> Option<Device> {
        let clients = self.clients.read().ok()?;
        clients.get(id).map(|e| e.device.clone())
    }

    /// Client whose id starts with `<name>.`.
    pub fn client_by_name(&self, name: &str) -> Option<Arc<DongleClient>> {
        let clients = self.clients.read().ok()?;
        clients
            .iter()
            .find(|(id, _)| id.split_once('.').map_or(id.as_str(), |(n, _)| n) == name)
            .map(|(_, e)| Arc::clone(&e.client))
    }

    /// Reacts to what a client reports.
    pub fn handle_event(&self, client_id: &str, event: ClientEvent) {
        match event {
            ClientEvent::Frame { message, .. } => {
                if let Err(e) = self.on_decoded_frame(client_id, &message) {
                    log_debug(&format!("{client_id}: frame dropped : {e}"));
                }
            }
            ClientEvent::Text { text, .. } => {
                log_info(&format!("{client_id}: {text}"));
            }
            ClientEvent::Status { alive } => self.emit_status(client_id, alive),
            ClientEvent::StateChanged => self.publish_client_state(client_id),
            ClientEvent::Firmware(progress) => {
                let mut content = match progress {
                    Value::Object(m) => m,
                    other => {
                        let mut m = Map::new();
                        m.insert("msg".into(), other);
                        m
                    }
                };
                content.insert("rfplayerID".into(), Value::String(client_id.to_string()));
                self.sink
                    .publish("rfplayer.client.updatefirmware", &Value::Object(content));
            }
        }
    }

    /// Routes a decoded radio event to the devices bound to its RF id, or
    /// proposes devices when none is bound.
    pub fn on_decoded_frame(&self, client_id: &str, message: &Value) -> Result<(), RfpError> {
        let frame = RfpFrame::from_message(message)?;
        let info_type = frame
            .info_type()
            .and_then(InfoType::select)
            .ok_or_else(|| {
                RfpError::DecodeMismatch(format!("unknown infoType {}", frame.header.info_type))
            })?;
        let Some(rf_id) = info_type.device_id(&frame) else {
            let msg = format!(
                "Inconsistent RFP protocol {} for InfoType {} : {message}",
                frame.protocol(),
                info_type.code()
            );
            log_warn(&msg);
            return Err(RfpError::DecodeMismatch(msg));
        };

        let devices = self.registry.devices_bound_to(&rf_id);
        if devices.is_empty() {
            self.discover(client_id, info_type, &frame, &rf_id, message);
            return Ok(());
        }
        for device in &devices {
            for sensor in device.sensors.values() {
                match info_type.sensor_value(&frame, sensor) {
                    Ok(Some(value)) => {
                        log_debug(&format!(
                            "Sensor {} of {} ({rf_id}) = {value}",
                            sensor.reference, device.name
                        ));
                        self.sink
                            .emit_sensor(device, sensor.id, &sensor.data_type, value);
                    }
                    Ok(None) => log_warn(&format!(
                        "No value for sensor {} of device {} in frame {rf_id}",
                        sensor.reference, device.name
                    )),
                    Err(e) => log_warn(&format!("{}: {e}", device.name)),
                }
            }
        }
        Ok(())
    }

    fn discover(
        &self,
        client_id: &str,
        info_type: InfoType,
        frame: &RfpFrame,
        rf_id: &str,
        message: &Value,
    ) -> Vec<DetectedDevice> {
        let sensors = info_type.available_sensors(frame);
        let commands = info_type.available_commands(frame);
        let reference = format!("Protocol {}", frame.protocol_name());
        let mut detected = Vec::new();
        for (type_id, device_type) in self.registry.device_types() {
            if matches_references(&sensors, &device_type.sensors)
                && matches_references(&commands, &device_type.commands)
            {
                detected.push(DetectedDevice::new(&type_id, &reference, rf_id));
            }
        }
        if detected.is_empty() {
            log_debug(&format!("No device type matches {rf_id} ({reference})"));
        }
        for proposal in &detected {
            self.registry.device_detected(proposal.clone());
        }
        if let Some(client) = self.client(client_id) {
            let types: Vec<&str> = detected.iter().map(|d| d.device_type.as_str()).collect();
            client.report_no_device(&types.join(", "), message);
        }
        detected
    }

    fn emit_status(&self, client_id: &str, alive: bool) {
        let Some(device) = self.dongle_device(client_id) else {
            return;
        };
        let value = SensorValue::Int(i64::from(alive));
        for sensor in device.sensors_with_reference(STATUS_SENSOR_REF) {
            self.sink
                .emit_sensor(&device, sensor.id, &sensor.data_type, value);
        }
    }

    /// Sends device command `command_id`. Returns `(sent, reason)`.
    pub fn send_command(
        &self,
        device: &Device,
        command_id: u64,
        values: &CommandValues,
    ) -> (bool, Option<String>) {
        match self.try_send_command(device, command_id, values) {
            Ok(line) => {
                log_info(&format!("Command sent to {} : {line}", device.name));
                (true, None)
            }
            Err(reason) => {
                log_warn(&format!("Command {command_id} of {} not sent : {reason}", device.name));
                (false, Some(reason.to_string()))
            }
        }
    }

    /// Renders and queues a device command; returns the queued line.
    pub fn try_send_command(
        &self,
        device: &Device,
        command_id: u64,
        values: &CommandValues,
    ) -> Result<String, CommandRejection> {
        let (reference, _) = device
            .command_by_id(command_id)
            .ok_or(CommandRejection::NoCommand)?;
        let client = device
            .dongle_name()
            .and_then(|name| self.client_by_name(&name))
            .ok_or(CommandRejection::NoDongle)?;
        let protocol = device.protocol().unwrap_or_default();
        let address = device.bound_id().unwrap_or_default();
        let line = info_types_for_protocol(protocol)
            .into_iter()
            .find_map(|t| match t.render_command(protocol, &address, reference, values) {
                Ok(line) => Some(line),
                Err(e) => {
                    log_debug(&format!("InfoType {} : {e}", t.code()));
                    None
                }
            })
            .ok_or(CommandRejection::NotRenderable)?;
        client.send_line(&line).map_err(CommandRejection::Submit)?;
        Ok(line)
    }

    fn monitored_file(&self, id: &str) -> String {
        if self.monitors.is_monitored(id) {
            self.monitors.file_name(id).display().to_string()
        } else {
            String::new()
        }
    }

    /// Registry devices reached through the dongle `name`.
    fn bound_devices(&self, name: &str) -> Vec<Value> {
        self.registry
            .list_devices()
            .into_iter()
            .filter(|d| d.dongle_name().as_deref() == Some(name))
            .map(|d| {
                json!({
                    "id": d.id,
                    "name": d.name,
                    "device_type_id": d.device_type_id,
                    "device": d.bound_id().unwrap_or_default(),
                })
            })
            .collect()
    }

    fn describe(&self, id: &str, mut info: Map<String, Value>, device: &Device) -> Value {
        info.insert("rfplayerID".into(), Value::String(id.to_string()));
        info.insert("name".into(), Value::String(device.name.clone()));
        info.insert("dmgDevices".into(), Value::Array(self.bound_devices(&device.name)));
        info.insert("monitored".into(), Value::String(self.monitored_file(id)));
        Value::Object(info)
    }

    pub fn manager_status(&self) -> ManagerSnapshot {
        let entries: Vec<(String, Arc<DongleClient>, Device)> = self
            .clients
            .read()
            .map(|c| {
                c.iter()
                    .map(|(id, e)| (id.clone(), Arc::clone(&e.client), e.device.clone()))
                    .collect()
            })
            .unwrap_or_default();
        let rf_players = entries
            .iter()
            .map(|(id, client, device)| self.describe(id, client.state_report(), device))
            .collect();
        ManagerSnapshot {
            status: "alive".into(),
            rf_players,
            error: String::new(),
        }
    }

    fn publish_client_state(&self, id: &str) {
        let (Some(client), Some(device)) = (self.client(id), self.dongle_device(id)) else {
            return;
        };
        let info = match client.infos() {
            Value::Object(m) => m,
            _ => Map::new(),
        };
        self.sink
            .publish("rfplayer.client.state", &self.describe(id, info, &device));
    }

    fn publish_manager_state(&self) {
        match serde_json::to_value(self.manager_status()) {
            Ok(status) => self.sink.publish("rfplayer.manager.state", &status),
            Err(e) => log_error(&format!("Manager state not serialisable : {e}")),
        }
    }

    fn ping_period(&self, device: &Device) -> Duration {
        let secs = match device.timer_status() {
            0 => self.config.default_ping_secs,
            secs => secs,
        };
        Duration::from_secs(secs)
    }

    async fn add_client(&self, id: &str, device: Device) {
        let port = device.bound_id().unwrap_or_default();
        log_info(&format!("Create RFPlayer client {id} on {port}"));
        let client = Arc::new(DongleClient::new(
            id,
            &port,
            self.config.serial.clone(),
            self.config.engine.clone(),
            Arc::clone(&self.connector),
            self.events.clone(),
        ));
        let period = self.ping_period(&device);
        if let Ok(mut clients) = self.clients.write() {
            clients.insert(
                id.to_string(),
                ClientEntry {
                    client: Arc::clone(&client),
                    device,
                },
            );
        }
        if let Err(e) = client.open().await {
            log_error(&format!("RFPlayer client {id} not open : {e}"));
        }
        lock(&self.scheduler).start(client, period);
    }

    async fn remove_client(&self, id: &str) {
        lock(&self.scheduler).stop(id);
        let entry = self.clients.write().ok().and_then(|mut c| c.remove(id));
        if let Some(entry) = entry {
            log_info(&format!("Remove RFPlayer client {id}"));
            self.monitors.stop(id);
            entry.client.set_monitor(None);
            entry.client.shutdown().await;
        }
    }

    /// Reconciles the clients against the dongles found in `devices`, then
    /// publishes the manager state.
    pub async fn refresh_devices(&self, devices: Vec<Device>) {
        let dongles: Vec<Device> = devices.into_iter().filter(is_dongle).collect();
        let wanted: HashSet<String> = dongles.iter().map(client_id).collect();

        for id in self.client_ids() {
            if !wanted.contains(&id) {
                let renamed = self
                    .dongle_device(&id)
                    .map_or(false, |old| dongles.iter().any(|d| d.id == old.id));
                if !renamed {
                    self.remove_client(&id).await;
                }
            }
        }

        for device in dongles {
            let id = client_id(&device);
            let previous = self.client_ids().into_iter().find(|existing| {
                self.dongle_device(existing)
                    .map_or(false, |old| old.id == device.id)
            });
            match previous {
                Some(old_id) => {
                    let same_port = self
                        .dongle_device(&old_id)
                        .map_or(false, |old| old.bound_id() == device.bound_id());
                    if !same_port || old_id != id {
                        // The client id and port are fixed at creation.
                        self.remove_client(&old_id).await;
                        self.add_client(&id, device).await;
                        continue;
                    }
                    let period = self.ping_period(&device);
                    let client = self.client(&id);
                    if let Ok(mut clients) = self.clients.write() {
                        if let Some(entry) = clients.get_mut(&id) {
                            entry.device = device;
                        }
                    }
                    if let Some(client) = client {
                        lock(&self.scheduler).start(client, period);
                    }
                }
                None => self.add_client(&id, device).await,
            }
        }
        self.publish_manager_state();
    }

    /// Refreshes from the registry's current device list.
    pub async fn refresh_from_registry(&self) {
        self.refresh_devices(self.registry.list_devices()).await;
    }

    /// Admin request router.
    pub fn process_request(&self, request: &str, data: &Value) -> Value {
        let unknown = || Report::error(format!("Unknown request <{request}>, data : {data}"));
        let report = match request.split_once('.') {
            Some(("manager", "getstatus")) => {
                return serde_json::to_value(self.manager_status())
                    .unwrap_or_else(|e| Report::error(e.to_string()).to_value());
            }
            Some(("client", action)) => {
                let Some(id) = data.get("rfplayerID").and_then(Value::as_str) else {
                    return Report::error(format!("<{request}>, Invalid data format : {data}"))
                        .to_value();
                };
                let Some(client) = self.client(id) else {
                    return Report::error(format!(
                        "<{request}>, Unknown RFPlayer dongle, data : {data}"
                    ))
                    .to_value();
                };
                let invalid =
                    || Report::error(format!("<{request}>, Invalid data format : {data}"));
                match action {
                    "getinfos" => return client.infos(),
                    "updatefirmware" => self.firmware_request(id, &client, data),
                    "startmonitorclient" => match self.monitors.start(id, &client.infos()) {
                        Ok((monitor, report)) => {
                            client.set_monitor(Some(monitor));
                            self.publish_client_state(id);
                            report
                        }
                        Err(e) => Report::error(format!(
                            "Fail to start monitor client {id} : {e}"
                        )),
                    },
                    "stopmonitorclient" => {
                        client.set_monitor(None);
                        let report = self.monitors.stop(id);
                        self.publish_client_state(id);
                        report
                    }
                    "cmdsystem" => match SystemRequest::deserialize(data) {
                        Ok(r) => client.send_command_system(&r.command, &r.value),
                        Err(_) => invalid(),
                    },
                    "settranscoder" => match TranscoderEntry::deserialize(data) {
                        Ok(entry) => client.set_transcoder_entry(&entry),
                        Err(_) => invalid(),
                    },
                    "setprotocol" => match ProtocolRequest::deserialize(data) {
                        Ok(r) => client.set_protocol(&r.protocol, &r.mode, r.enabled),
                        Err(_) => invalid(),
                    },
                    "setband" => match BandRequest::deserialize(data) {
                        Ok(r) => client.set_band_parameter(&r.band, &r.command, &r.value),
                        Err(_) => invalid(),
                    },
                    "sendaction" => match ActionCommand::deserialize(data) {
                        Ok(action) => client.send_action(&action),
                        Err(_) => invalid(),
                    },
                    _ => unknown(),
                }
            }
            _ => unknown(),
        };
        report.to_value()
    }

    fn firmware_request(&self, id: &str, client: &Arc<DongleClient>, data: &Value) -> Report {
        let chunk = match FirmwareChunk::deserialize(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                client.abort_firmware();
                return Report::error(format!("Bad firmware data : {e}"))
                    .with("progress", 0)
                    .with("totalprogress", 0)
                    .with("finish", true)
                    .with("rfplayerID", id);
            }
        };
        let (report, image) = client.rebuild_firmware(&chunk);
        if let Some(lines) = image {
            log_info(&format!(
                "Firmware {} received for {id} ({} lines)",
                chunk.firmware_file,
                lines.len()
            ));
            let client = Arc::clone(client);
            tokio::spawn(async move {
                client.update_firmware(lines).await;
            });
        }
        report.with("rfplayerID", id)
    }

    /// Closes every client and stops the timers.
    pub async fn shutdown(&self) {
        lock(&self.scheduler).stop_all();
        for id in self.client_ids() {
            self.remove_client(&id).await;
        }
        self.monitors.stop_all();
        if let Some(task) = lock(&self.event_task).take() {
            task.abort();
        }
        log_info("RFPlayer manager stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_matching() {
        let wanted = vec!["switch".to_string(), "rf_quality".to_string()];
        assert!(matches_references(&[vec!["rf_quality", "switch"]], &wanted));
        assert!(!matches_references(&[vec!["switch"]], &wanted));
        assert!(!matches_references(
            &[vec!["switch", "rf_quality", "switch_all"]],
            &wanted
        ));
        assert!(matches_references(&[], &[]));
        assert!(!matches_references(&[], &wanted));
        assert!(!matches_references(&[vec!["switch"]], &[]));
    }

    #[test]
    fn test_client_id() {
        let device = Device {
            id: 7,
            name: "rfp".into(),
            device_type_id: RFP1000_DEVICE_TYPE.into(),
            ..Device::default()
        };
        assert_eq!(client_id(&device), "rfp.7");
        assert!(!is_dongle(&device));
    }

    #[test]
    fn test_rejection_reasons() {
        assert_eq!(CommandRejection::NoCommand.to_string(), "no command descriptor found");
        assert_eq!(CommandRejection::NoDongle.to_string(), "no bound dongle");
        assert_eq!(CommandRejection::NotRenderable.to_string(), "no InfoType could render");
    }
}
