//! # Dongle Configuration Commands
//!
//! Vocabulary of the RFP1000 configuration commands: per band radio
//! parameters, system parameters, protocol activation, transcoder entries and
//! direct actions. Every builder validates its input and returns the command
//! text (without `ZIA++` prefix) or a [`RfpError::Configuration`].

use crate::error::RfpError;
use crate::util::hex::decode_hex;
use nom::branch::alt;
use nom::bytes::complete::{tag, take_while1, take_while_m_n};
use nom::character::complete::space1;
use nom::combinator::{all_consuming, map, value, verify};
use nom::multi::many0;
use nom::sequence::{preceded, tuple};
use nom::IResult;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// One of the two radio bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Band {
    /// 433 MHz
    Low,
    /// 868 MHz
    High,
}

impl Band {
    /// Accepts `L`/`H` or any label mentioning 433/868.
    pub fn parse(band: &str) -> Option<Band> {
        if band.contains("433") || band == "L" {
            Some(Band::Low)
        } else if band.contains("868") || band == "H" {
            Some(Band::High)
        } else {
            None
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Band::Low => "L",
            Band::High => "H",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Band::Low => "433Mhz",
            Band::High => "868Mhz",
        }
    }
}

/// Allowed values of a parameter with their description.
#[derive(Debug, Clone)]
pub struct ValueSet {
    pub values: Vec<(String, String)>,
    pub help: &'static str,
}

impl ValueSet {
    fn new(values: Vec<(String, String)>, help: &'static str) -> Self {
        ValueSet { values, help }
    }

    pub fn contains(&self, value: &str) -> bool {
        self.values.iter().any(|(v, _)| v == value)
    }

    pub fn keys(&self) -> Vec<&str> {
        self.values.iter().map(|(v, _)| v.as_str()).collect()
    }

    pub fn to_value(&self) -> Value {
        let values: Map<String, Value> = self
            .values
            .iter()
            .map(|(k, d)| (k.clone(), Value::String(d.clone())))
            .collect();
        json!({ "values": values, "help": self.help })
    }
}

fn fixed(values: &[(&str, &str)]) -> Vec<(String, String)> {
    values
        .iter()
        .map(|(v, d)| (v.to_string(), d.to_string()))
        .collect()
}

fn dbm_range(from: u32, to: u32, default: u32) -> Vec<(String, String)> {
    (from..=to)
        .map(|x| {
            let mark = if x == default { " <Default>" } else { "" };
            (x.to_string(), format!("{x} dBm{mark}"))
        })
        .collect()
}

/// A radio parameter set per band.
#[derive(Debug, Clone)]
pub struct BandCommand {
    /// Name reported in `radioStatus`.
    pub label: &'static str,
    /// Command keyword.
    pub name: &'static str,
    pub help: &'static str,
    pub low: ValueSet,
    pub high: ValueSet,
}

impl BandCommand {
    pub fn values(&self, band: Band) -> &ValueSet {
        match band {
            Band::Low => &self.low,
            Band::High => &self.high,
        }
    }
}

const SELECTIVITY: &[(&str, &str)] = &[
    ("0", "Medium selectivity (300Khz) <Default>"),
    ("1", "Very low selectivity (800Khz), frequency centered between used frequencies"),
    ("2", "Very low selectivity (800Khz)"),
    ("3", "selectivity (500Khz)"),
    ("4", "Medium selectivity (300Khz)"),
    ("5", "High selectivity (200Khz)"),
];

const SENSITIVITY: &[(&str, &str)] = &[
    ("0", "High sensitivity (-0dB) <Default>"),
    ("1", "Very low sensitivity (-18dB)"),
    ("2", "low sensitivity (-12dB)"),
    ("3", "medium sensitivity (-6dB)"),
    ("4", "high sensitivity (-0dB) <Default>"),
];

pub static BAND_COMMANDS: Lazy<Vec<BandCommand>> = Lazy::new(|| {
    vec![
        BandCommand {
            label: "Frequency",
            name: "FREQ",
            help: "Receiver frequency on High band (around 868Mhz) or Low band (around 433Mhz). \
                   A value of 0 shuts the receiver and transmitter of the band down.",
            low: ValueSet::new(
                fixed(&[
                    ("0", "Shutdown band"),
                    ("433420", "433.420Mhz"),
                    ("433920", "433.920 Mhz (Default)"),
                ]),
                "Set the low frequency receiver.",
            ),
            high: ValueSet::new(
                fixed(&[
                    ("0", "Shutdown band"),
                    ("868950", "868.950Mhz (Default)"),
                    ("868350", "868.350Mhz"),
                ]),
                "Set the high frequency receiver.",
            ),
        },
        BandCommand {
            label: "Selectivity",
            name: "SELECTIVITY",
            help: "Receiver selectivity on the selected band, the ability to filter out of band signals.",
            low: ValueSet::new(fixed(SELECTIVITY), "Set the low frequency (433 Mhz) receiver selectivity."),
            high: ValueSet::new(fixed(SELECTIVITY), "Set the high frequency (868 Mhz) receiver selectivity."),
        },
        BandCommand {
            label: "Sensitivity",
            name: "SENSITIVITY",
            help: "Radio Frequency receiver sensitivity on the selected band.",
            low: ValueSet::new(fixed(SENSITIVITY), "Set the low frequency (433 Mhz) receiver sensitivity."),
            high: ValueSet::new(fixed(SENSITIVITY), "Set the high frequency (868 Mhz) receiver sensitivity."),
        },
        BandCommand {
            label: "Digital Signal Processing Trigger",
            name: "DSPTRIGGER",
            help: "Smallest signal amplitude starting frame detection and analysis. \
                   Low trigger value means high sensitivity.",
            low: ValueSet::new(dbm_range(4, 20, 8), "Set the low frequency (433 Mhz) receiver DSP value in dBm."),
            high: ValueSet::new(dbm_range(4, 20, 6), "Set the high frequency (868 Mhz) receiver DSP value in dBm."),
        },
        BandCommand {
            label: "RFlink Trigger",
            name: "RFLINKTRIGGER",
            help: "Smallest signal amplitude starting RFLINK frame detection.",
            low: ValueSet::new(dbm_range(4, 20, 8), "Set the low frequency (433 Mhz) RFLINK trigger in dBm."),
            high: ValueSet::new(dbm_range(4, 20, 6), "Set the high frequency (868 Mhz) RFLINK trigger in dBm."),
        },
    ]
});

/// Looks a band command up by status label or by keyword.
pub fn find_band_command(command: &str) -> Option<&'static BandCommand> {
    BAND_COMMANDS
        .iter()
        .find(|c| c.label == command || c.name == command)
}

/// Builds `<NAME> <L|H> <value>`.
pub fn band_command_line(band: &str, command: &str, value: &str) -> Result<String, RfpError> {
    let b = Band::parse(band).ok_or_else(|| {
        RfpError::Configuration(format!("Bad band parameter format({band},{command},{value})"))
    })?;
    let cmd = find_band_command(command).ok_or_else(|| {
        RfpError::Configuration(format!("{} band parameter {command} is on read only", b.code()))
    })?;
    let allowed = cmd.values(b);
    if !allowed.contains(value) {
        return Err(RfpError::Configuration(format!(
            "{} band parameter {command} bad value : {value}, available : {:?}",
            b.code(),
            allowed.keys()
        )));
    }
    Ok(format!("{} {} {value}", cmd.name, b.code()))
}

/// How a system command takes its value.
#[derive(Debug, Clone)]
pub enum SystemKind {
    Select(ValueSet),
    /// A 32 bit MAC, hex or decimal.
    MacAddress,
    Empty,
}

#[derive(Debug, Clone)]
pub struct SystemCommand {
    pub label: &'static str,
    pub name: &'static str,
    pub help: &'static str,
    pub param_help: &'static str,
    pub kind: SystemKind,
}

impl SystemCommand {
    fn kind_name(&self) -> &'static str {
        match self.kind {
            SystemKind::Select(_) => "select",
            SystemKind::MacAddress => "string",
            SystemKind::Empty => "empty",
        }
    }

    pub fn to_value(&self) -> Value {
        let params = match &self.kind {
            SystemKind::Select(set) => set.to_value(),
            SystemKind::MacAddress => json!({ "values": MAC_PATTERN, "help": self.param_help }),
            SystemKind::Empty => json!({ "values": "", "help": self.param_help }),
        };
        json!({
            "cmd": { "name": self.name, "type": self.kind_name(), "params": params },
            "help": self.help,
            "type": "system",
        })
    }
}

/// Accepted MAC forms, for display.
pub const MAC_PATTERN: &str = "^0x([0-9A-F]{2}){4}$|^[1-9]$|^[0-9]{2,9}$";

pub static SYSTEM_COMMANDS: Lazy<Vec<SystemCommand>> = Lazy::new(|| {
    let mut lbt = vec![("0".to_string(), "Inhibits LBT function".to_string())];
    lbt.extend(dbm_range(6, 30, 16));
    let mut jamming = vec![("0".to_string(), "Disable detection.".to_string())];
    jamming.extend((1..=10).map(|x| (x.to_string(), format!("{x} - jamming sensitivity"))));
    vec![
        SystemCommand {
            label: "Listen Before Talk",
            name: "LBT",
            help: "When enabled the transmitter waits for a silence on the frequency before talking. \
                   Value 0 inhibits LBT.",
            param_help: "Set receiver Listen Before Talk value in dBm.",
            kind: SystemKind::Select(ValueSet::new(lbt, "Set receiver Listen Before Talk value in dBm.")),
        },
        SystemCommand {
            label: "Set MAC",
            name: "SETMAC",
            help: "Changes the ID contained in outgoing RF frames on most protocols. \
                   Pairing with actuators could be broken.",
            param_help: "MAC address unsigned 32 bits value. eg : 123456765 or 0x2AB265C3 format.",
            kind: SystemKind::MacAddress,
        },
        SystemCommand {
            label: "Factory reset",
            name: "FACTORYRESET",
            help: "Restore factory default parameters.",
            param_help: "Select reset mode.",
            kind: SystemKind::Select(ValueSet::new(
                fixed(&[
                    ("", "Preserve PARROT records and TRANSCODER configuration."),
                    ("ALL", "Erases all, including PARROT records and TRANSCODER configuration."),
                ]),
                "Select reset mode.",
            )),
        },
        SystemCommand {
            label: "LED activity",
            name: "LEDACTIVITY",
            help: "Enable or disable LED activity related to RF flow.",
            param_help: "Select LED activity mode.",
            kind: SystemKind::Select(ValueSet::new(
                fixed(&[("0", "Disable"), ("1", "Enable")]),
                "Select LED activity mode.",
            )),
        },
        SystemCommand {
            label: "Init Leaky Buckets",
            name: "INITLB",
            help: "Refill the per frequency duty cycle leaky buckets.",
            param_help: "Initialization of the leaky buckets (LB) to full level",
            kind: SystemKind::Empty,
        },
        SystemCommand {
            label: "Jamming detection threshold",
            name: "JAMMING",
            help: "Jamming attempt detection on 433 and 868 Mhz. Level 0 cancels the detection.",
            param_help: "Select jamming sensitivity.",
            kind: SystemKind::Select(ValueSet::new(jamming, "Select jamming sensitivity.")),
        },
        SystemCommand {
            label: "Jamming simulation",
            name: "JAMMING SIMULATE",
            help: "Forces a JAMMING ON frame, followed by JAMMING OFF 5 seconds later.",
            param_help: "Simulates a jammer.",
            kind: SystemKind::Empty,
        },
    ]
});

/// Catalogue of system commands keyed by label.
pub fn system_catalogue() -> Value {
    let map: Map<String, Value> = SYSTEM_COMMANDS
        .iter()
        .map(|c| (c.label.to_string(), c.to_value()))
        .collect();
    Value::Object(map)
}

/// A validated SETMAC value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacAddress(pub u32);

fn mac_hex(input: &str) -> IResult<&str, &str> {
    preceded(
        tag("0x"),
        take_while_m_n(8, 8, |c: char| c.is_ascii_digit() || ('A'..='F').contains(&c)),
    )(input)
}

fn mac_decimal(input: &str) -> IResult<&str, &str> {
    verify(take_while_m_n(1, 9, |c: char| c.is_ascii_digit()), |d: &str| {
        d.len() > 1 || d != "0"
    })(input)
}

/// Parses `0xHHHHHHHH`, a single digit 1-9 or 2 to 9 digits.
pub fn parse_mac(input: &str) -> Result<MacAddress, RfpError> {
    enum Form<'a> {
        Hex(&'a str),
        Decimal(&'a str),
    }
    let (_, form) = all_consuming(alt((
        map(mac_hex, Form::Hex),
        map(mac_decimal, Form::Decimal),
    )))(input)?;
    match form {
        Form::Hex(digits) => {
            let bytes = decode_hex(digits)
                .map_err(|e| RfpError::Configuration(format!("bad MAC {input}: {e}")))?;
            let raw: [u8; 4] = bytes
                .try_into()
                .map_err(|_| RfpError::Configuration(format!("bad MAC {input}")))?;
            Ok(MacAddress(u32::from_be_bytes(raw)))
        }
        Form::Decimal(digits) => digits
            .parse()
            .map(MacAddress)
            .map_err(|_| RfpError::Configuration(format!("bad MAC {input}"))),
    }
}

/// Builds a system command line after validating `value`.
pub fn system_command_line(name: &str, value: &str) -> Result<String, RfpError> {
    let cmd = SYSTEM_COMMANDS
        .iter()
        .find(|c| c.name == name)
        .ok_or_else(|| RfpError::Configuration(format!("Command system {name} doesn't exist.")))?;
    match &cmd.kind {
        SystemKind::Select(set) => {
            if set.contains(value) {
                Ok(format!("{} {value}", cmd.name).trim_end().to_string())
            } else {
                Err(RfpError::Configuration(format!(
                    "Command system {name} bad value : {value}, available : {:?}",
                    set.keys()
                )))
            }
        }
        SystemKind::MacAddress => match parse_mac(value) {
            Ok(_) => Ok(format!("{} {value}", cmd.name)),
            Err(_) => Err(RfpError::Configuration(format!(
                "Command system {name}, value ({value}) doesn't match regular expression : {MAC_PATTERN}"
            ))),
        },
        SystemKind::Empty => Ok(cmd.name.to_string()),
    }
}

/// Protocol table a protocol can be enabled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolMode {
    Receiver,
    Repeater,
    Transmitter,
}

impl ProtocolMode {
    pub fn parse(mode: &str) -> Option<ProtocolMode> {
        match mode.to_ascii_uppercase().as_str() {
            "RECEIVER" => Some(ProtocolMode::Receiver),
            "REPEATER" => Some(ProtocolMode::Repeater),
            "TRANSMITTER" => Some(ProtocolMode::Transmitter),
            _ => None,
        }
    }

    /// Keyword used on the wire.
    pub fn keyword(&self) -> &'static str {
        match self {
            ProtocolMode::Receiver => "RECEIVER",
            ProtocolMode::Repeater => "REPEATER",
            ProtocolMode::Transmitter => "TRANSMITTER",
        }
    }

    /// Key used in `systemStatus`.
    pub fn status_key(&self) -> &'static str {
        match self {
            ProtocolMode::Receiver => "receiver",
            ProtocolMode::Repeater => "repeater",
            ProtocolMode::Transmitter => "transmitter",
        }
    }
}

/// `<MODE> <+|-> <protocol>`
pub fn protocol_command_line(mode: ProtocolMode, protocol: &str, enabled: bool) -> String {
    let sign = if enabled { "+" } else { "-" };
    format!("{} {sign} {protocol}", mode.keyword())
}

fn protocols_reply(input: &str) -> IResult<&str, (ProtocolMode, Vec<&str>)> {
    let (input, mode) = alt((
        value(ProtocolMode::Receiver, tag("RECEIVED")),
        value(ProtocolMode::Transmitter, tag("TRANSMITTED")),
        value(ProtocolMode::Repeater, tag("REPEATED")),
    ))(input)?;
    let (input, _) = tuple((space1, tag("PROTOCOLS:")))(input)?;
    let (input, list) = many0(preceded(space1, take_while1(|c: char| !c.is_whitespace())))(input)?;
    Ok((input, (mode, list)))
}

/// Parses `RECEIVED|TRANSMITTED|REPEATED PROTOCOLS: a b c`.
pub fn parse_protocols_reply(text: &str) -> Option<(ProtocolMode, Vec<String>)> {
    let (_, (mode, list)) = all_consuming(protocols_reply)(text.trim()).ok()?;
    Some((mode, list.into_iter().map(str::to_string).collect()))
}

/// Transcoder entry as sent by the admin UI.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TranscoderEntry {
    pub entry: String,
    pub mode: String,
    pub src_protocols: String,
    pub src_addr: String,
    pub src_subtype: String,
    pub src_qualifier: String,
    pub out_cmd: String,
    pub out_protocols: String,
    pub out_addr: String,
    pub out_dim: String,
    pub out_qualifier: String,
    #[serde(alias = "outBrust")]
    pub out_burst: String,
    pub comment: String,
}

impl TranscoderEntry {
    pub fn to_command(&self) -> Result<String, RfpError> {
        if self.entry.is_empty() {
            return Err(RfpError::Configuration(format!(
                "Bad transcoder entry format({self:?})"
            )));
        }
        let mut command = format!("TRANSCODER ENTRY {}", self.entry);
        match self.mode.as_str() {
            "MANUAL" | "" => {
                command = format!("{command} {} {}", self.src_protocols, self.src_addr);
                if !self.src_subtype.is_empty() {
                    command = format!("{command} SUBTYPE {}", self.src_subtype);
                }
                if !self.src_qualifier.is_empty() {
                    command = format!("{command} QUALIFIER {}", self.src_qualifier);
                }
            }
            "CAPTURE" => command = format!("{command} {} CAPTURE", self.src_protocols),
            "KEEP" => command = format!("{command} KEEP"),
            other => {
                return Err(RfpError::Configuration(format!(
                    "Bad transcoder set mode {other}"
                )))
            }
        }
        command = format!(
            "{command} TO {} {} {}",
            self.out_cmd, self.out_protocols, self.out_addr
        );
        if self.out_cmd == "DIM" {
            let dim: i64 = self.out_dim.trim().parse().map_err(|_| {
                RfpError::Configuration(format!("Bad transcoder dim value {}", self.out_dim))
            })?;
            command = format!("{command} %{dim}");
        }
        if !self.out_qualifier.is_empty() {
            command = format!("{command} QUALIFIER {}", self.out_qualifier);
        }
        if !self.out_burst.is_empty() {
            command = format!("{command} BURST {}", self.out_burst);
        }
        if !self.comment.is_empty() {
            command = format!("{command} [{}]", self.comment);
        }
        Ok(command)
    }
}

/// Direct action on a transmitter protocol.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionCommand {
    pub protocol: String,
    pub action: String,
    pub address: String,
    pub burst: String,
    pub qualifier: String,
    pub dim: Option<String>,
}

impl ActionCommand {
    /// `<ACTION> <address> <PROTOCOL>[ %dim][ BURST b][ QUALIFIER q]`
    pub fn to_command(&self, available: &[String]) -> Result<String, RfpError> {
        if available.is_empty() {
            return Err(RfpError::Configuration(
                "Dongle RFP1000 have no available action protocols.".into(),
            ));
        }
        if self.protocol.is_empty() || self.action.is_empty() || self.address.is_empty() {
            return Err(RfpError::Configuration(format!("Bad action format : {self:?}")));
        }
        if !available.contains(&self.protocol) {
            return Err(RfpError::Configuration(format!(
                "Bad action protocols : {}.",
                self.protocol
            )));
        }
        let mut command = format!("{} {} {}", self.action, self.address, self.protocol);
        if self.action == "DIM" {
            let raw = self.dim.as_deref().ok_or_else(|| {
                RfpError::Configuration("Bad DIM action format, missing dim value.".into())
            })?;
            match raw.trim().parse::<i64>() {
                Ok(dim) if (0..=100).contains(&dim) => command = format!("{command} %{dim}"),
                _ => {
                    return Err(RfpError::Configuration(format!(
                        "Bad DIM action format, dim value ({raw}) not a valid number (0 to 100)."
                    )))
                }
            }
        }
        if !self.burst.is_empty() {
            command = format!("{command} BURST {}", self.burst);
        }
        if !self.qualifier.is_empty() {
            command = format!("{command} QUALIFIER {}", self.qualifier);
        }
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_parse() {
        assert_eq!(Band::parse("433Mhz"), Some(Band::Low));
        assert_eq!(Band::parse("H"), Some(Band::High));
        assert_eq!(Band::parse("2.4GHz"), None);
    }

    #[test]
    fn test_band_command_line() {
        assert_eq!(band_command_line("433Mhz", "Frequency", "433420").unwrap(), "FREQ L 433420");
        assert_eq!(band_command_line("H", "DSPTRIGGER", "20").unwrap(), "DSPTRIGGER H 20");
        assert!(band_command_line("L", "FREQ", "868950").is_err());
        assert!(band_command_line("L", "SENSITIVITY", "5").is_err());
        assert!(band_command_line("L", "Version", "1").is_err());
    }

    #[test]
    fn test_parse_mac() {
        assert_eq!(parse_mac("0x2AB265C3").unwrap(), MacAddress(0x2AB2_65C3));
        assert_eq!(parse_mac("7").unwrap(), MacAddress(7));
        assert_eq!(parse_mac("123456765").unwrap(), MacAddress(123_456_765));
        for bad in ["0", "0x2ab265c3", "0x2AB265", "1234567890", "12a", ""] {
            assert!(parse_mac(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn test_system_command_line() {
        assert_eq!(system_command_line("LBT", "16").unwrap(), "LBT 16");
        assert_eq!(system_command_line("LBT", "0").unwrap(), "LBT 0");
        assert!(system_command_line("LBT", "5").is_err());
        assert_eq!(system_command_line("FACTORYRESET", "").unwrap(), "FACTORYRESET");
        assert_eq!(system_command_line("SETMAC", "0x0000FFFF").unwrap(), "SETMAC 0x0000FFFF");
        assert_eq!(system_command_line("JAMMING SIMULATE", "").unwrap(), "JAMMING SIMULATE");
        assert!(system_command_line("REBOOT", "").is_err());
    }

    #[test]
    fn test_protocols_reply() {
        let (mode, list) = parse_protocols_reply("RECEIVED PROTOCOLS: X10 RTS OREGON \r").unwrap();
        assert_eq!(mode, ProtocolMode::Receiver);
        assert_eq!(list, vec!["X10", "RTS", "OREGON"]);
        let (mode, list) = parse_protocols_reply("REPEATED PROTOCOLS:").unwrap();
        assert_eq!(mode, ProtocolMode::Repeater);
        assert!(list.is_empty());
        assert!(parse_protocols_reply("RECEIVED STUFF: X10").is_none());
    }

    #[test]
    fn test_transcoder_entry() {
        let entry = TranscoderEntry {
            entry: "3".into(),
            src_protocols: "X10".into(),
            src_addr: "A1".into(),
            src_qualifier: "1".into(),
            out_cmd: "DIM".into(),
            out_protocols: "CHACON".into(),
            out_addr: "B2".into(),
            out_dim: "40".into(),
            out_burst: "2".into(),
            comment: "hall".into(),
            ..Default::default()
        };
        assert_eq!(
            entry.to_command().unwrap(),
            "TRANSCODER ENTRY 3 X10 A1 QUALIFIER 1 TO DIM CHACON B2 %40 BURST 2 [hall]"
        );

        let keep = TranscoderEntry {
            entry: "1".into(),
            mode: "KEEP".into(),
            out_cmd: "ON".into(),
            out_protocols: "X10".into(),
            out_addr: "C3".into(),
            ..Default::default()
        };
        assert_eq!(keep.to_command().unwrap(), "TRANSCODER ENTRY 1 KEEP TO ON X10 C3");
        assert!(TranscoderEntry::default().to_command().is_err());
    }

    #[test]
    fn test_action_command() {
        let available = vec!["X10".to_string(), "CHACON".to_string()];
        let dim = ActionCommand {
            protocol: "CHACON".into(),
            action: "DIM".into(),
            address: "A1".into(),
            dim: Some("55".into()),
            qualifier: "2".into(),
            ..Default::default()
        };
        assert_eq!(dim.to_command(&available).unwrap(), "DIM A1 CHACON %55 QUALIFIER 2");

        let out_of_range = ActionCommand { dim: Some("101".into()), ..dim.clone() };
        assert!(out_of_range.to_command(&available).is_err());
        let unknown = ActionCommand { protocol: "RTS".into(), ..dim };
        assert!(unknown.to_command(&available).is_err());
    }
}
