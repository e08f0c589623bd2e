//! # Dongle Client
//!
//! One [`DongleClient`] per RFP1000. It owns the transport channel and the
//! duty cycles of an open session, keeps the last status and transcoder
//! snapshot reported by the dongle, and exposes the configuration commands.
//!
//! Everything the manager needs to hear about (decoded frames, liveness, state
//! changes, firmware progress) is sent on the client event channel tagged with
//! the client id.

use crate::config::EngineConfig;
use crate::constants::{FIRMWARE_COMMAND, FIRMWARE_DONE_MARKER, HEADER_SIZE, LOCK_FIRMWARE};
use crate::error::{Report, RfpError};
use crate::logging::{log_debug, log_error, log_info, log_warn};
use crate::rfp::channel::TransportChannel;
use crate::rfp::commands::{
    band_command_line, find_band_command, parse_protocols_reply, protocol_command_line,
    system_catalogue, system_command_line, ActionCommand, Band, ProtocolMode, TranscoderEntry,
};
use crate::rfp::correlator::{
    match_reply, Completion, OutboundCommand, PendingRequest, ReplyMatch, RequestCounter,
};
use crate::rfp::dispatch::{self, DispatchHandle, FrameRouter, StopSignal};
use crate::rfp::frame::{trim_line, DecodedMessage, Frame};
use crate::rfp::monitor::Monitor;
use crate::rfp::transport::{Connector, SerialConfig, Transport};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Lifecycle of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientState {
    #[serde(rename = "stopped")]
    Stopped,
    #[serde(rename = "starting")]
    Opening,
    #[serde(rename = "alive")]
    Alive,
    #[serde(rename = "dead")]
    Dead,
}

impl ClientState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientState::Stopped => "stopped",
            ClientState::Opening => "starting",
            ClientState::Alive => "alive",
            ClientState::Dead => "dead",
        }
    }
}

/// What a client reports to its manager.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// A JSON or XML event that is not a status report.
    Frame {
        message: Value,
        received_at: DateTime<Utc>,
    },
    Text {
        text: String,
        received_at: DateTime<Utc>,
    },
    /// Liveness of the dongle.
    Status { alive: bool },
    /// State or snapshot changed; republish the client.
    StateChanged,
    /// Firmware update progress `{error, progress, totalprogress, msg, info}`.
    Firmware(Value),
}

pub type EventSender = mpsc::UnboundedSender<(String, ClientEvent)>;

#[derive(Debug)]
struct Lifecycle {
    state: ClientState,
    open: bool,
    error: String,
    locked: String,
    ident: String,
}

#[derive(Debug, Default)]
struct Snapshot {
    /// `systemStatus` and `radioStatus` as last reported.
    status: Map<String, Value>,
    /// Transcoder entries keyed by entry number.
    transcoder: Map<String, Value>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn text_of(value: Option<&Value>) -> Value {
    value.cloned().unwrap_or_else(|| Value::String(String::new()))
}

/// State shared between the client and its dispatch tasks.
struct ClientShared {
    id: String,
    port: String,
    events: EventSender,
    lifecycle: Mutex<Lifecycle>,
    snapshot: Mutex<Snapshot>,
    monitor: Mutex<Option<Arc<Monitor>>>,
    firmware: Mutex<Vec<String>>,
}

impl ClientShared {
    fn emit(&self, event: ClientEvent) {
        if self.events.send((self.id.clone(), event)).is_err() {
            log_debug(&format!("{}: event channel closed", self.id));
        }
    }

    fn monitor(&self) -> Option<Arc<Monitor>> {
        lock(&self.monitor).clone()
    }

    fn set_state(&self, state: ClientState, error: Option<String>) {
        {
            let mut l = lock(&self.lifecycle);
            l.state = state;
            if let Some(error) = error {
                l.error = error;
            }
        }
        self.emit(ClientEvent::StateChanged);
    }

    fn set_open(&self, open: bool) {
        lock(&self.lifecycle).open = open;
    }

    fn locked(&self) -> String {
        lock(&self.lifecycle).locked.clone()
    }

    fn set_locked(&self, label: &str) {
        lock(&self.lifecycle).locked = label.to_string();
    }

    /// Stores `systemStatus`/`radioStatus`; the reply to `STATUS JSON` starts
    /// a fresh snapshot.
    fn set_status(&self, data: &Value, reply: bool) {
        {
            let mut snap = lock(&self.snapshot);
            if reply {
                log_debug(&format!("RFP1000 on {} receive STATUS result", self.port));
                snap.status.clear();
            } else {
                log_debug(&format!("RFP1000 on {} receive complement STATUS", self.port));
            }
            for key in ["systemStatus", "radioStatus"] {
                if let Some(v) = data.get(key) {
                    snap.status.insert(key.to_string(), v.clone());
                }
            }
        }
        self.emit(ClientEvent::StateChanged);
    }

    fn set_transcoder_data(&self, data: &Value) {
        let Some(info) = data
            .get("transcoderStatus")
            .and_then(|t| t.get("info"))
            .and_then(Value::as_array)
        else {
            return;
        };
        log_debug(&format!("RFP1000 on {} receive Transcoder result", self.port));
        let mut entry = "unknown".to_string();
        let mut values = Map::new();
        for param in info {
            let Some(name) = param.get("n").and_then(Value::as_str) else {
                continue;
            };
            if name == "entry" {
                entry = match param.get("v") {
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                    None => entry,
                };
            } else {
                let mut detail = Map::new();
                detail.insert("value".into(), text_of(param.get("v")));
                if let Some(c) = param.get("c") {
                    detail.insert("comment".into(), c.clone());
                }
                values.insert(name.to_string(), Value::Object(detail));
            }
        }
        lock(&self.snapshot)
            .transcoder
            .insert(entry, Value::Object(values));
        self.emit(ClientEvent::StateChanged);
    }

    fn protocols_list(&self, mode: ProtocolMode, status: &str) -> Vec<String> {
        let snap = lock(&self.snapshot);
        let Some(info) = snap
            .status
            .get("systemStatus")
            .and_then(|s| s.get("info"))
            .and_then(Value::as_array)
        else {
            return Vec::new();
        };
        info.iter()
            .find_map(|param| {
                param
                    .get(mode.status_key())
                    .and_then(|k| k.get(status))
                    .and_then(|s| s.get("p"))
                    .and_then(Value::as_array)
            })
            .map(|list| {
                list.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Replaces the enabled list of `mode` in the system status.
    fn apply_enabled_protocols(&self, mode: ProtocolMode, protocols: Vec<String>) {
        let key = mode.status_key();
        {
            let mut snap = lock(&self.snapshot);
            let system = snap
                .status
                .entry("systemStatus")
                .or_insert_with(|| json!({ "info": [] }));
            if !system.is_object() {
                *system = json!({ "info": [] });
            }
            if !system.get("info").map_or(false, Value::is_array) {
                system["info"] = json!([]);
            }
            let enabled = json!({ "p": protocols });
            if let Some(info) = system.get_mut("info").and_then(Value::as_array_mut) {
                let existing = info.iter().position(|param| {
                    param
                        .get(key)
                        .map_or(false, |k| k.get("enabled").is_some())
                });
                match existing {
                    Some(i) => info[i][key]["enabled"] = enabled,
                    None => info.push(json!({ key: { "enabled": enabled } })),
                }
            }
        }
        log_info(&format!(
            "{} activate {key} protocols {:?}",
            self.port,
            self.protocols_list(mode, "enabled")
        ));
        self.emit(ClientEvent::StateChanged);
    }

    fn format_status(&self) -> Value {
        let snap = lock(&self.snapshot);
        let radio = match snap.status.get("radioStatus") {
            Some(radio) => Value::Array(format_radio(radio)),
            None => Value::String("Not read".into()),
        };
        let system = match snap.status.get("systemStatus") {
            Some(system) => format_system(system),
            None => Value::String("Not read".into()),
        };
        json!({ "radioStatus": radio, "systemStatus": system })
    }

    fn state_report(&self) -> Map<String, Value> {
        let l = lock(&self.lifecycle);
        let mut m = Map::new();
        m.insert("lasterror".into(), Value::String(l.error.clone()));
        m.insert("open".into(), Value::Bool(l.open));
        m.insert("state".into(), Value::String(l.state.as_str().into()));
        let error = if l.state == ClientState::Dead {
            l.error.clone()
        } else {
            String::new()
        };
        m.insert("error".into(), Value::String(error));
        m.insert("locked".into(), Value::String(l.locked.clone()));
        m
    }
}

fn format_radio(radio: &Value) -> Vec<Value> {
    let mut bands = Vec::new();
    let groups = radio.as_object().into_iter().flat_map(|o| o.values());
    for band in groups.filter_map(Value::as_array).flatten() {
        let Some(params) = band.get("i").and_then(Value::as_array) else {
            continue;
        };
        let frequency = params
            .iter()
            .find(|p| p.get("n").and_then(Value::as_str) == Some("Frequency"));
        let which = frequency.map(|p| {
            if p.get("v").and_then(Value::as_str).map_or(false, |v| v.contains("433")) {
                Band::Low
            } else {
                Band::High
            }
        });
        let mut details = Map::new();
        for param in params {
            let Some(name) = param.get("n").and_then(Value::as_str) else {
                continue;
            };
            let mut detail = Map::new();
            detail.insert("value".into(), text_of(param.get("v")));
            detail.insert("unit".into(), text_of(param.get("unit")));
            detail.insert("comment".into(), text_of(param.get("c")));
            detail.insert("help".into(), Value::String(String::new()));
            if let Some(cmd) = find_band_command(name) {
                detail.insert("help".into(), Value::String(cmd.help.into()));
                if let Some(b) = which {
                    detail.insert("command".into(), cmd.values(b).to_value());
                }
            }
            details.insert(name.to_string(), Value::Object(detail));
        }
        let label = which.map_or("unknown", |b| b.label());
        bands.push(json!({ "band": label, "params": details }));
    }
    bands
}

fn format_system(system: &Value) -> Value {
    let mut infos = Map::new();
    let mut protocols: Map<String, Value> = Map::new();
    let params = system.get("info").and_then(Value::as_array);
    for param in params.into_iter().flatten() {
        let kind = ["transmitter", "receiver", "repeater"]
            .into_iter()
            .find(|k| param.get(*k).is_some());
        match kind {
            None => {
                let Some(name) = param.get("n").and_then(Value::as_str) else {
                    continue;
                };
                infos.insert(
                    name.to_string(),
                    json!({
                        "value": text_of(param.get("v")),
                        "unit": text_of(param.get("unit")),
                        "comment": text_of(param.get("c")),
                    }),
                );
            }
            Some(kind) => {
                let table = protocols
                    .entry(kind)
                    .or_insert_with(|| Value::Object(Map::new()));
                let Some(table) = table.as_object_mut() else {
                    continue;
                };
                let lists = &param[kind];
                if let Some(available) = lists["available"]["p"].as_array() {
                    for p in available.iter().filter_map(Value::as_str) {
                        table.entry(p).or_insert(Value::Bool(false));
                    }
                } else if let Some(enabled) = lists["enabled"]["p"].as_array() {
                    for p in enabled.iter().filter_map(Value::as_str) {
                        table.insert(p.to_string(), Value::Bool(true));
                    }
                }
            }
        }
    }
    json!({ "infos": infos, "protocols": protocols })
}

impl FrameRouter for ClientShared {
    fn route(&self, message: DecodedMessage, received_at: DateTime<Utc>) {
        match message {
            DecodedMessage::Text(text) => {
                if let Some((mode, protocols)) = parse_protocols_reply(&text) {
                    self.apply_enabled_protocols(mode, protocols);
                    return;
                }
                self.emit(ClientEvent::Text { text, received_at });
            }
            DecodedMessage::Json(value) | DecodedMessage::Xml(value) => {
                if value.get("radioStatus").is_some() || value.get("systemStatus").is_some() {
                    self.set_status(&value, false);
                } else if value.get("transcoderStatus").is_some() {
                    self.set_transcoder_data(&value);
                } else {
                    log_debug(&format!("{}: sending frame to manager : {value}", self.id));
                    self.emit(ClientEvent::Frame {
                        message: value,
                        received_at,
                    });
                }
            }
        }
    }

    fn session_lost(&self, error: &RfpError) {
        self.set_open(false);
        self.set_state(
            ClientState::Dead,
            Some(format!(
                "Error on RFP1000 device {} (disconnected ?) : {error}",
                self.port
            )),
        );
        self.emit(ClientEvent::Status { alive: false });
    }

    fn raw_line(&self, line: &str) {
        if let Some(monitor) = self.monitor() {
            monitor.raw_data(line);
        }
    }

    fn wrote_line(&self, line: &str) {
        if let Some(monitor) = self.monitor() {
            monitor.write_data(line);
        }
    }

    fn note(&self, text: &str) {
        if let Some(monitor) = self.monitor() {
            monitor.note(text);
        }
    }
}

fn lenient_f64<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    match Value::deserialize(d)? {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| serde::de::Error::custom("size out of range")),
        Value::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
        other => Err(serde::de::Error::custom(format!("bad size {other}"))),
    }
}

/// A chunk of firmware image sent by the admin UI.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirmwareChunk {
    /// Index of the first line of the chunk; 0 starts a new image.
    pub line: u64,
    pub firmware_data: String,
    /// Number of lines of the full image.
    #[serde(deserialize_with = "lenient_f64")]
    pub size: f64,
    #[serde(default)]
    pub firmware_file: String,
}

const FIRMWARE_OFFSET: i64 = 25;
const FIRMWARE_STEPS: i64 = 4;

/// A physical RFP1000 dongle.
pub struct DongleClient {
    shared: Arc<ClientShared>,
    channel: TransportChannel,
    engine: EngineConfig,
    counter: Arc<RequestCounter>,
    commands: Mutex<Option<mpsc::UnboundedSender<OutboundCommand>>>,
    dispatch: tokio::sync::Mutex<Option<DispatchHandle>>,
    halt: StopSignal,
}

impl DongleClient {
    pub fn new(
        id: &str,
        port: &str,
        serial: SerialConfig,
        engine: EngineConfig,
        connector: Arc<dyn Connector>,
        events: EventSender,
    ) -> Self {
        let channel = TransportChannel::new(port, serial, connector, engine.handshake_timeout);
        DongleClient {
            shared: Arc::new(ClientShared {
                id: id.to_string(),
                port: port.to_string(),
                events,
                lifecycle: Mutex::new(Lifecycle {
                    state: ClientState::Stopped,
                    open: false,
                    error: String::new(),
                    locked: String::new(),
                    ident: String::new(),
                }),
                snapshot: Mutex::new(Snapshot::default()),
                monitor: Mutex::new(None),
                firmware: Mutex::new(Vec::new()),
            }),
            channel,
            engine,
            counter: Arc::new(RequestCounter::new()),
            commands: Mutex::new(None),
            dispatch: tokio::sync::Mutex::new(None),
            halt: StopSignal::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.shared.id
    }

    pub fn port(&self) -> &str {
        &self.shared.port
    }

    pub fn state(&self) -> ClientState {
        lock(&self.shared.lifecycle).state
    }

    pub fn is_open(&self) -> bool {
        lock(&self.shared.lifecycle).open
    }

    pub fn locked(&self) -> String {
        self.shared.locked()
    }

    /// HELLO reply of the last successful open.
    pub fn ident(&self) -> String {
        lock(&self.shared.lifecycle).ident.clone()
    }

    fn not_open(&self) -> Report {
        Report::error(format!(
            "Dongle RFP1000 not open on serial : {}",
            self.shared.port
        ))
    }

    /// Opens the link, starts the duty cycles and asks for the dongle status.
    pub async fn open(&self) -> Result<String, RfpError> {
        if self.channel.is_open().await {
            log_warn(&format!("RFP1000 device {} allready open", self.shared.port));
            return Err(RfpError::Other(format!("{} already open", self.shared.port)));
        }
        self.shared.set_state(ClientState::Opening, None);
        let ident = match self.channel.open().await {
            Ok(ident) => ident,
            Err(e) => {
                let error = format!("RFP1000 {} can't be open : {e}", self.shared.port);
                log_error(&error);
                self.shared.set_state(ClientState::Dead, Some(error));
                return Err(e);
            }
        };
        {
            let mut l = lock(&self.shared.lifecycle);
            l.open = true;
            l.ident = ident.clone();
        }
        self.shared.set_state(ClientState::Alive, Some(String::new()));
        self.shared.emit(ClientEvent::Status { alive: true });

        self.start_services().await;
        self.send_line("FORMAT JSON")?;
        tokio::select! {
            _ = tokio::time::sleep(self.engine.settle_delay) => {}
            _ = self.halt.wait() => {}
        }
        self.get_status()?;
        self.get_transcoder_data()?;
        Ok(ident)
    }

    async fn start_services(&self) {
        let (tx, rx) = mpsc::unbounded_channel();
        let router: Arc<dyn FrameRouter> = self.shared.clone();
        let handle = dispatch::spawn(
            &self.shared.id,
            self.channel.shared(),
            rx,
            router,
            Arc::clone(&self.counter),
            self.engine.poll_interval,
        );
        *lock(&self.commands) = Some(tx);
        let previous = self.dispatch.lock().await.replace(handle);
        if let Some(previous) = previous {
            previous.shutdown().await;
        }
    }

    /// Stops the duty cycles and closes the link. Always ends `Stopped`.
    pub async fn close(&self) {
        log_info(&format!("Close RFP1000 on {}", self.shared.port));
        let handle = self.dispatch.lock().await.take();
        if let Some(handle) = handle {
            handle.shutdown().await;
        }
        lock(&self.commands).take();
        if let Err(e) = self.channel.close().await {
            log_error(&format!("Error while closing {} : {e}", self.shared.port));
        }
        self.shared.set_open(false);
        self.shared.set_state(ClientState::Stopped, None);
        self.shared.emit(ClientEvent::Status { alive: false });
    }

    /// Closes for good: cancels pending waits (settle, reboot) first.
    pub async fn shutdown(&self) {
        self.halt.set();
        self.close().await;
    }

    /// PING/PONG liveness check, reported as a `Status` event.
    pub async fn ping(&self) -> bool {
        let alive = if self.is_open() {
            let shared = &self.shared;
            let stray = |frame: Frame| match frame.decode() {
                Ok(message) => shared.route(message, frame.received_at),
                Err(e) => log_debug(&format!("{}: dropping {}: {e}", shared.id, frame.to_line())),
            };
            match self.channel.ping(self.engine.handshake_timeout, stray).await {
                Ok(true) => true,
                Ok(false) => {
                    let error = format!("RFPLAYER on {} don't receive PING response", self.shared.port);
                    self.shared.set_state(ClientState::Dead, Some(error));
                    false
                }
                Err(e) => {
                    let error = format!("RFPLAYER on {} PING failed : {e}", self.shared.port);
                    log_warn(&error);
                    self.shared.set_state(ClientState::Dead, Some(error));
                    false
                }
            }
        } else {
            false
        };
        if alive && self.state() == ClientState::Dead && self.services_running().await {
            self.shared.set_state(ClientState::Alive, Some(String::new()));
        }
        self.shared.emit(ClientEvent::Status { alive });
        alive
    }

    async fn services_running(&self) -> bool {
        self.dispatch
            .lock()
            .await
            .as_ref()
            .map_or(false, |h| !h.is_finished())
    }

    fn enqueue(&self, command: OutboundCommand) -> Result<(), RfpError> {
        let guard = lock(&self.commands);
        let tx = guard
            .as_ref()
            .ok_or_else(|| RfpError::NotOpen(self.shared.port.clone()))?;
        tx.send(command)
            .map_err(|_| RfpError::NotOpen(self.shared.port.clone()))
    }

    /// Queues a command. Rejected while the client is locked.
    pub fn submit(
        &self,
        command: &str,
        expect_response: bool,
        completion: Option<Completion>,
    ) -> Result<(), RfpError> {
        let locked = self.shared.locked();
        if !locked.is_empty() {
            return Err(RfpError::Locked(format!(
                "{} is locked ({locked}), command {command} refused",
                self.shared.id
            )));
        }
        let outbound = if expect_response {
            OutboundCommand::tracked(command, completion).with_timeout(self.engine.request_timeout)
        } else {
            OutboundCommand::untracked(command)
        };
        self.enqueue(outbound)
    }

    /// Fire-and-forget command.
    pub fn send_line(&self, command: &str) -> Result<(), RfpError> {
        self.submit(command, false, None)
    }

    pub fn get_status(&self) -> Result<(), RfpError> {
        log_info(&format!("Get Status of {}", self.shared.port));
        let shared = Arc::clone(&self.shared);
        self.submit(
            "STATUS JSON",
            true,
            Some(Completion::handler(move |result| match result {
                Ok(message) => shared.set_status(&message.into_value(), true),
                Err(e) => log_warn(&format!("{}: STATUS not received : {e}", shared.id)),
            })),
        )
    }

    pub fn get_transcoder_data(&self) -> Result<(), RfpError> {
        log_info(&format!("Get transcode data of {}", self.shared.port));
        let shared = Arc::clone(&self.shared);
        self.submit(
            "STATUS TRANSCODER JSON",
            true,
            Some(Completion::handler(move |result| match result {
                Ok(message) => shared.set_transcoder_data(&message.into_value()),
                Err(e) => log_warn(&format!("{}: transcoder status not received : {e}", shared.id)),
            })),
        )
    }

    pub fn format_status(&self) -> Value {
        self.shared.format_status()
    }

    /// Protocols of `mode` in the `enabled` or `available` list.
    pub fn protocols_list(&self, mode: ProtocolMode, status: &str) -> Vec<String> {
        self.shared.protocols_list(mode, status)
    }

    /// `lasterror`, `open`, `state`, `error` (when dead) and `locked`.
    pub fn state_report(&self) -> Map<String, Value> {
        self.shared.state_report()
    }

    /// Everything the admin UI shows about the dongle.
    pub fn infos(&self) -> Value {
        let mut infos = self.state_report();
        infos.insert(
            "serialParam".into(),
            serde_json::to_value(self.channel.serial()).unwrap_or(Value::Null),
        );
        infos.insert("status".into(), self.format_status());
        infos.insert("cmdsystem".into(), system_catalogue());
        let transcoder = lock(&self.shared.snapshot).transcoder.clone();
        infos.insert("transcoder".into(), Value::Object(transcoder));
        Value::Object(infos)
    }

    fn report_of(&self, result: Result<(), RfpError>) -> Report {
        if let Err(e) = &result {
            log_warn(&format!("{}: {e}", self.shared.id));
        }
        result.into()
    }

    pub fn set_band_parameter(&self, band: &str, command: &str, value: &str) -> Report {
        if !self.is_open() {
            return self.not_open();
        }
        log_debug(&format!("Band parameter setting {band} {command} {value}"));
        let result = band_command_line(band, command, value)
            .and_then(|line| self.send_line(&line))
            .and_then(|_| self.get_status());
        self.report_of(result)
    }

    pub fn send_command_system(&self, name: &str, value: &str) -> Report {
        if !self.is_open() {
            return self.not_open();
        }
        log_debug(&format!("Handle command system {name} {value}"));
        let result = system_command_line(name, value)
            .and_then(|line| self.send_line(&line))
            .and_then(|_| self.get_status());
        self.report_of(result)
    }

    /// Enables or disables `protocol` for `mode`.
    pub fn set_protocol(&self, protocol: &str, mode: &str, enabled: bool) -> Report {
        if !self.is_open() {
            return self.not_open();
        }
        let bad_format = || {
            Report::error(format!(
                "Bad protocol activation format({},{protocol},{enabled})",
                mode.to_uppercase()
            ))
        };
        let Some(mode) = ProtocolMode::parse(mode) else {
            return bad_format();
        };
        let known = self.format_status()["systemStatus"]["protocols"]["receiver"]
            .as_object()
            .map_or(false, |r| r.contains_key(protocol));
        if !known {
            return bad_format();
        }
        let shared = Arc::clone(&self.shared);
        let result = self.submit(
            &protocol_command_line(mode, protocol, enabled),
            true,
            Some(Completion::handler(move |result| match result {
                Ok(DecodedMessage::Text(text)) => match parse_protocols_reply(&text) {
                    Some((mode, list)) => shared.apply_enabled_protocols(mode, list),
                    None => log_warn(&format!(
                        "{} activate protocols recieved in bad format {text}",
                        shared.port
                    )),
                },
                Ok(other) => log_debug(&format!("{}: protocol reply {other:?}", shared.id)),
                Err(e) => log_debug(&format!("{}: protocol reply : {e}", shared.id)),
            })),
        );
        self.report_of(result)
    }

    pub fn set_transcoder_entry(&self, entry: &TranscoderEntry) -> Report {
        if !self.is_open() {
            return self.not_open();
        }
        log_debug(&format!("Handle transcoder entry format {entry:?}"));
        let result = entry
            .to_command()
            .and_then(|line| self.send_line(&line))
            .and_then(|_| self.get_transcoder_data());
        self.report_of(result)
    }

    pub fn send_action(&self, action: &ActionCommand) -> Report {
        if !self.is_open() {
            return self.not_open();
        }
        let available = self.protocols_list(ProtocolMode::Transmitter, "available");
        let result = action
            .to_command(&available)
            .and_then(|line| self.send_line(&line));
        self.report_of(result)
    }

    /// Attaches (or detaches with `None`) a traffic monitor.
    pub fn set_monitor(&self, monitor: Option<Arc<Monitor>>) {
        *lock(&self.shared.monitor) = monitor;
    }

    pub fn is_monitored(&self) -> bool {
        self.shared.monitor().is_some()
    }

    /// Reports a frame of an unknown device to the monitor, if any.
    pub fn report_no_device(&self, device_type_id: &str, frame: &Value) {
        if let Some(monitor) = self.shared.monitor() {
            monitor.no_device(device_type_id, frame);
        }
    }

    /// Accumulates firmware chunks and locks the client.
    ///
    /// Returns the assembled image once `size` lines are collected.
    pub fn rebuild_firmware(&self, chunk: &FirmwareChunk) -> (Report, Option<Vec<String>>) {
        self.shared.set_locked(LOCK_FIRMWARE);
        let mut data = lock(&self.shared.firmware);
        if chunk.line == 0 {
            data.clear();
        }
        data.extend(chunk.firmware_data.split('\n').map(str::to_string));
        let length = data.len() as f64;
        if length >= chunk.size {
            let report = Report::ok()
                .with("progress", 100)
                .with("totalprogress", FIRMWARE_OFFSET)
                .with("finish", true);
            (report, Some(std::mem::take(&mut *data)))
        } else {
            let ratio = length / chunk.size;
            let report = Report::ok()
                .with("progress", (ratio * 100.0) as i64)
                .with("totalprogress", (ratio * FIRMWARE_OFFSET as f64) as i64)
                .with("finish", false);
            (report, None)
        }
    }

    /// Gives up a firmware upload.
    pub fn abort_firmware(&self) {
        lock(&self.shared.firmware).clear();
        self.shared.set_locked("");
    }

    fn firmware_progress(&self, error: &str, progress: i64, total: i64, msg: &str, info: &str) {
        self.shared.emit(ClientEvent::Firmware(json!({
            "error": error,
            "progress": progress,
            "totalprogress": total,
            "msg": msg,
            "info": info,
        })));
    }

    fn firmware_failed(&self, msg: &str) {
        self.shared.set_locked("");
        log_warn(msg);
        self.firmware_progress(msg, 0, 0, "", "download");
    }

    /// Writes a firmware image, waits for its validation and restarts the
    /// dongle on it. Submissions are refused for the whole operation.
    pub async fn update_firmware(&self, lines: Vec<String>) {
        if !self.is_open() {
            self.firmware_failed(&format!(
                "Update firmware on RFP1000 device {} fail : not open.",
                self.shared.port
            ));
            return;
        }
        self.shared.set_locked(LOCK_FIRMWARE);

        let stop = self
            .dispatch
            .lock()
            .await
            .as_ref()
            .map_or_else(StopSignal::new, DispatchHandle::stop_signal);
        let transport = self.channel.shared();
        let mut slot = transport.lock().await;
        let outcome = match slot.as_mut() {
            Some(link) => self.download_firmware(&mut **link, &lines, &stop).await,
            None => Err(RfpError::NotOpen(self.shared.port.clone())),
        };
        drop(slot);

        let reply = match outcome {
            Ok(reply) => reply,
            Err(e) => {
                let msg = format!(
                    "Error while update firmware on RFP1000 device {} : {e}",
                    self.shared.port
                );
                log_error(&msg);
                self.shared.set_locked("");
                self.firmware_progress(&msg, 0, 0, "", "download");
                self.close().await;
                return;
            }
        };
        let text = match &reply {
            Some(DecodedMessage::Text(t)) => t.clone(),
            Some(other) => other.clone().into_value().to_string(),
            None => String::new(),
        };
        if !text.contains(FIRMWARE_DONE_MARKER) {
            self.firmware_failed(&format!(
                "Update firmware on RFP1000 device {} fail : {text}",
                self.shared.port
            ));
            return;
        }

        let mut offset = FIRMWARE_OFFSET + 100 / FIRMWARE_STEPS;
        let msg = format!("Internal check OK : {text}");
        log_info(&msg);
        self.firmware_progress("", 100, offset + 100 / FIRMWARE_STEPS, &msg, "Checking");
        offset += 100 / FIRMWARE_STEPS;
        self.close().await;

        let msg = format!("Wait reboot {}s ...", self.engine.reboot_delay.as_secs());
        log_info(&msg);
        self.firmware_progress("", 10, offset + 10 / FIRMWARE_STEPS, &msg, "Reboot");
        tokio::select! {
            _ = tokio::time::sleep(self.engine.reboot_delay) => {}
            _ = self.halt.wait() => {
                self.shared.set_locked("");
                log_info(&format!("{}: firmware reboot wait cancelled", self.shared.id));
                return;
            }
        }
        self.firmware_progress(
            "",
            100,
            offset + 100 / FIRMWARE_STEPS,
            "Try reconnect RFP1000",
            "Acheived",
        );
        self.shared.set_locked("");
        let msg = match self.open().await {
            Ok(_) => format!(
                "RFP1000 device {} reconnected\n******* Updated successfully. *******",
                self.shared.port
            ),
            Err(_) => format!(
                "RFP1000 device {} fail to reconnect, try to restart plugin.",
                self.shared.port
            ),
        };
        self.firmware_progress("", 100, 100, &msg, "Achieved");
    }

    async fn download_firmware(
        &self,
        link: &mut dyn Transport,
        lines: &[String],
        stop: &StopSignal,
    ) -> Result<Option<DecodedMessage>, RfpError> {
        let msg = format!(
            "Start Update firmware on RFP1000 device {}\nWait and DO NOT SHUTDOWN the device ...",
            self.shared.port
        );
        log_info(&msg);
        self.firmware_progress("", 0, FIRMWARE_OFFSET, &msg, "download");

        let total = lines.iter().filter(|l| !l.is_empty()).count().max(1);
        let mut written = 0usize;
        let mut next_step = 0i64;
        for line in lines.iter().filter(|l| !l.is_empty()) {
            if self.halt.is_set() || stop.is_set() {
                return Ok(None);
            }
            link.write_raw(format!("{line}\n").as_bytes()).await?;
            written += 1;
            let progress = ((written as f64 / total as f64) * 100.0).round() as i64;
            if progress >= next_step {
                next_step = progress - progress % 10 + 10;
                let msg = format!("Downloading {progress}%");
                log_info(&msg);
                self.firmware_progress(
                    "",
                    progress,
                    FIRMWARE_OFFSET + progress / FIRMWARE_STEPS,
                    &msg,
                    "download",
                );
            }
        }
        self.firmware_progress(
            "",
            30,
            FIRMWARE_OFFSET + 100 / FIRMWARE_STEPS,
            "Wait for internal check ...",
            "Checking",
        );

        let pending = PendingRequest::new(
            0,
            OutboundCommand::tracked(FIRMWARE_COMMAND, None).with_timeout(self.engine.firmware_timeout),
        );
        loop {
            if self.halt.is_set() || stop.is_set() {
                log_info(&format!("{}: firmware validation wait stopped", self.shared.id));
                return Ok(None);
            }
            let now = Instant::now();
            if now >= pending.deadline() {
                log_warn(&format!("{}: no firmware validation received", self.shared.id));
                return Ok(None);
            }
            let wait = (pending.deadline() - now).min(self.engine.poll_interval);
            let Some(line) = link.read_line(wait).await? else {
                continue;
            };
            let line = trim_line(&line);
            if line.len() <= HEADER_SIZE {
                continue;
            }
            self.shared.raw_line(line);
            let Ok(frame) = Frame::from_line(line) else {
                continue;
            };
            match match_reply(&pending, &frame) {
                ReplyMatch::Matched => return Ok(frame.decode().ok()),
                ReplyMatch::Empty => {}
                ReplyMatch::Unrelated => {
                    if let Ok(message) = frame.decode() {
                        self.shared.route(message, frame.received_at);
                    }
                }
            }
        }
    }
}
