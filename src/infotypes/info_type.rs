use super::rfp_frame::RfpFrame;
use super::tables::{find_protocol, measure_rule, Conversion, VisonicFlags, PROTOCOLS, RTS_QUALIFIERS};
use crate::device::{CommandValues, SensorDescriptor, SensorValue};
use crate::error::RfpError;
use crate::logging::log_debug;
use thiserror::Error;

/// Why a command could not be turned into a dongle line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("InfoType {0} does not send commands")]
    NotRenderable(u8),

    #[error("unknown protocol {0}")]
    UnknownProtocol(String),

    #[error("protocol {protocol} has no command {command}")]
    UnknownCommand { protocol: String, command: String },

    #[error("command {command} has no state {state}")]
    UnknownState { command: String, state: String },

    #[error("missing command parameter {0}")]
    MissingParameter(&'static str),
}

/// Frame families of the dongle, one per `header.infoType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InfoType {
    /// X10, DOMIA, PARROT short frames.
    BasicSwitch = 0,
    /// X10, BLYSS, CHACON, KD101.
    Switch = 1,
    Visonic = 2,
    Rts = 3,
    /// Oregon temperature (and humidity).
    Thermohygro = 4,
    /// Oregon temperature, humidity and pressure.
    Barometer = 5,
    Wind = 6,
    Uv = 7,
    /// OWL energy meters.
    Energy = 8,
    Rain = 9,
    X2dThermostat = 10,
    X2dAlarm = 11,
}

pub const ALL_INFO_TYPES: [InfoType; 12] = [
    InfoType::BasicSwitch,
    InfoType::Switch,
    InfoType::Visonic,
    InfoType::Rts,
    InfoType::Thermohygro,
    InfoType::Barometer,
    InfoType::Wind,
    InfoType::Uv,
    InfoType::Energy,
    InfoType::Rain,
    InfoType::X2dThermostat,
    InfoType::X2dAlarm,
];

fn state_bit(set: bool) -> SensorValue {
    SensorValue::Int(i64::from(set))
}

impl InfoType {
    pub fn select(discriminator: u8) -> Option<InfoType> {
        ALL_INFO_TYPES.get(usize::from(discriminator)).copied()
    }

    /// Variant of a decoded frame.
    pub fn of_frame(frame: &RfpFrame) -> Option<InfoType> {
        frame.info_type().and_then(InfoType::select)
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    /// Protocol codes frames of this variant may carry.
    pub fn protocols(self) -> &'static [&'static str] {
        match self {
            InfoType::BasicSwitch => &["1", "6", "11"],
            InfoType::Switch => &["1", "3", "4", "10"],
            InfoType::Visonic => &["2"],
            InfoType::Rts => &["9"],
            InfoType::Thermohygro
            | InfoType::Barometer
            | InfoType::Wind
            | InfoType::Uv
            | InfoType::Rain => &["5"],
            InfoType::Energy => &["7"],
            InfoType::X2dThermostat | InfoType::X2dAlarm => &["8"],
        }
    }

    pub fn accepts(self, protocol: &str) -> bool {
        self.protocols().contains(&protocol)
    }

    pub fn is_valid(self, frame: &RfpFrame) -> bool {
        self.accepts(frame.protocol())
    }

    /// Variants inheriting the switch behaviour send commands.
    pub fn renders(self) -> bool {
        matches!(
            self,
            InfoType::BasicSwitch
                | InfoType::Switch
                | InfoType::Rts
                | InfoType::X2dThermostat
                | InfoType::X2dAlarm
        )
    }

    fn is_measure(self) -> bool {
        (4..=9).contains(&self.code())
    }

    /// RF id devices bind to, `None` for frames outside the whitelist.
    pub fn device_id(self, frame: &RfpFrame) -> Option<String> {
        if !self.is_valid(frame) {
            return None;
        }
        let infos = &frame.infos;
        let id = match self {
            InfoType::Visonic => format!("{}.{}", infos.id, infos.sub_type),
            t if t.is_measure() => format!("{}.{}.{}", infos.id_phy, infos.adr, infos.channel),
            _ => infos.id.clone(),
        };
        Some(id).filter(|id| !id.is_empty())
    }

    /// Value of `sensor` carried by `frame`.
    ///
    /// `Ok(None)` when the frame has nothing for that sensor.
    pub fn sensor_value(
        self,
        frame: &RfpFrame,
        sensor: &SensorDescriptor,
    ) -> Result<Option<SensorValue>, RfpError> {
        if !self.is_valid(frame) {
            return Err(RfpError::DecodeMismatch(format!(
                "protocol {} not handled by InfoType {}",
                frame.protocol(),
                self.code()
            )));
        }
        if let Some(value) = self.specific_value(frame, sensor) {
            return Ok(Some(value));
        }
        Ok(common_value(frame, sensor))
    }

    fn specific_value(self, frame: &RfpFrame, sensor: &SensorDescriptor) -> Option<SensorValue> {
        let sub_type = frame.sub_type();
        let reference = sensor.reference.as_str();
        match self {
            InfoType::BasicSwitch => match (reference, sub_type) {
                ("switch" | "switch_all" | "bright_dim", "0" | "2" | "4") => Some(SensorValue::Int(0)),
                ("switch" | "switch_all" | "bright_dim", "1" | "3" | "5") => Some(SensorValue::Int(1)),
                _ => None,
            },
            InfoType::Switch => match (reference, sub_type) {
                ("switch" | "switch_all", "0" | "4") => Some(SensorValue::Int(0)),
                ("switch" | "switch_all", "1" | "5") => Some(SensorValue::Int(1)),
                _ => None,
            },
            InfoType::Visonic => {
                let qualifier: u32 = frame.infos.qualifier.trim().parse().ok()?;
                let flags = VisonicFlags::from_bits_truncate(qualifier);
                let flag = match (sub_type, reference) {
                    ("0", _) if sensor.data_type == "DT_OpenClose" => VisonicFlags::TAMPER,
                    ("0", "tamper") => VisonicFlags::TAMPER,
                    ("0", "alarm") => VisonicFlags::ALARM,
                    ("0", "low_battery") => VisonicFlags::LOW_BATTERY,
                    ("1", "button_1") => VisonicFlags::BUTTON_1,
                    ("1", "button_2") => VisonicFlags::BUTTON_2,
                    ("1", "button_3") => VisonicFlags::BUTTON_3,
                    ("1", "button_4") => VisonicFlags::BUTTON_4,
                    _ => return None,
                };
                Some(state_bit(flags.contains(flag)))
            }
            InfoType::Rts => {
                let qualifier: i64 = frame.infos.qualifier.trim().parse().ok()?;
                RTS_QUALIFIERS
                    .iter()
                    .find(|(st, r, q, _)| *st == sub_type && *r == reference && *q == qualifier)
                    .map(|(_, _, _, v)| SensorValue::Int(*v))
            }
            t if t.is_measure() => {
                let measure = frame.measure(&sensor.name)?;
                let conversion = measure_rule(t.code(), &sensor.data_type, &measure.unit)?;
                let raw = measure.value.trim();
                let converted = match conversion {
                    Conversion::Float => raw.parse::<f64>().ok().map(SensorValue::Float),
                    Conversion::Int => raw.parse::<i64>().ok().map(SensorValue::Int),
                    Conversion::HectoPascal => {
                        raw.parse::<i64>()
                            .ok()
                            .and_then(|v| v.checked_mul(100))
                            .map(SensorValue::Int)
                    }
                };
                if converted.is_none() {
                    log_debug(&format!(
                        "Measure {} value {raw:?} not convertible for {}",
                        measure.kind, sensor.data_type
                    ));
                }
                converted
            }
            _ => None,
        }
    }

    /// Candidate sensor reference sets of a device sending `frame`.
    pub fn available_sensors(self, frame: &RfpFrame) -> Vec<Vec<&'static str>> {
        let sets: &[&[&'static str]] = match self {
            InfoType::BasicSwitch | InfoType::X2dThermostat | InfoType::X2dAlarm => &[],
            InfoType::Switch => match frame.protocol() {
                "1" | "4" => &[&["switch", "rf_quality"]],
                "3" | "10" => &[&["switch", "switch_all", "rf_quality"]],
                _ => &[],
            },
            InfoType::Visonic => match frame.sub_type() {
                "0" => &[&["tamper", "alarm", "low_battery", "rf_quality"]],
                "1" => &[&["button_1", "button_2", "button_3", "button_4", "rf_quality"]],
                _ => &[],
            },
            InfoType::Rts => match frame.sub_type() {
                "0" => &[&["shutter", "push_button", "rf_quality"]],
                "1" => &[&["button_1", "button_2", "rf_quality"]],
                _ => &[],
            },
            InfoType::Thermohygro => {
                let hygrometry = frame
                    .infos
                    .measures
                    .iter()
                    .any(|m| m.kind == "hygrometry" && m.value != "0");
                if hygrometry {
                    &[&["temperature", "hygrometry", "low_battery", "rf_quality"]]
                } else {
                    &[&["temperature", "low_battery", "rf_quality"]]
                }
            }
            InfoType::Barometer => &[&["temperature", "hygrometry", "pressure", "low_battery", "rf_quality"]],
            InfoType::Wind => &[&["wind_speed", "direction", "low_battery", "rf_quality"]],
            InfoType::Uv => &[&["uv", "low_battery", "rf_quality"]],
            InfoType::Energy => &[&["energy", "power", "P1", "P2", "P3", "low_battery", "rf_quality"]],
            InfoType::Rain => &[&["total_rain", "rain", "low_battery", "rf_quality"]],
        };
        sets.iter().map(|s| s.to_vec()).collect()
    }

    /// Candidate command reference sets of a device sending `frame`.
    pub fn available_commands(self, frame: &RfpFrame) -> Vec<Vec<&'static str>> {
        let sets: &[&[&'static str]] = match self {
            InfoType::BasicSwitch | InfoType::X2dThermostat | InfoType::X2dAlarm => {
                &[&["switch", "switch_all", "dimmer"]]
            }
            InfoType::Switch => match frame.protocol() {
                "1" | "4" => &[&["switch", "switch_all", "dimmer"]],
                "3" | "10" => &[&["switch"]],
                _ => &[],
            },
            InfoType::Visonic => match frame.sub_type() {
                "1" => &[&["button_1", "button_2", "button_3", "button_4"]],
                _ => &[],
            },
            InfoType::Rts => match frame.sub_type() {
                "0" => &[&["shutter", "push_button"]],
                "1" => &[&["button_1", "button_2"]],
                _ => &[],
            },
            _ => &[],
        };
        sets.iter().map(|s| s.to_vec()).collect()
    }

    /// Renders `command` in the state `values["value"]` for `address`.
    pub fn render_command(
        self,
        protocol: &str,
        address: &str,
        command: &str,
        values: &CommandValues,
    ) -> Result<String, RenderError> {
        if !self.renders() {
            return Err(RenderError::NotRenderable(self.code()));
        }
        let spec =
            find_protocol(protocol).ok_or_else(|| RenderError::UnknownProtocol(protocol.into()))?;
        let templates = spec.templates(command).ok_or_else(|| RenderError::UnknownCommand {
            protocol: spec.name.to_string(),
            command: command.to_string(),
        })?;
        let state = values.get("value").ok_or(RenderError::MissingParameter("value"))?;
        let template = templates
            .iter()
            .find(|(s, _)| *s == state)
            .map(|(_, t)| *t)
            .ok_or_else(|| RenderError::UnknownState {
                command: command.to_string(),
                state: state.clone(),
            })?;
        let mut line = template.replace("{address}", address);
        if command == "dimmer" {
            let level = values.get("level").ok_or(RenderError::MissingParameter("level"))?;
            line = line.replace("{level}", &level);
        }
        Ok(line)
    }
}

/// Sensors every variant reports from the frame header.
fn common_value(frame: &RfpFrame, sensor: &SensorDescriptor) -> Option<SensorValue> {
    match sensor.reference.as_str() {
        "low_battery" => frame.infos.low_batt.trim().parse().ok().map(SensorValue::Int),
        "rf_quality" => frame
            .header
            .rf_quality
            .trim()
            .parse::<i64>()
            .ok()
            .and_then(|q| q.checked_mul(10))
            .map(SensorValue::Int),
        _ => None,
    }
}

/// InfoTypes a protocol's frames come as, in catalogue order.
pub fn info_types_for_protocol(protocol: &str) -> Vec<InfoType> {
    find_protocol(protocol)
        .map(|p| p.info_types.iter().filter_map(|&t| InfoType::select(t)).collect())
        .unwrap_or_default()
}

/// Display name of a protocol code.
pub fn protocol_name(protocol: &str) -> &'static str {
    find_protocol(protocol).map_or(PROTOCOLS[0].name, |p| p.name)
}
