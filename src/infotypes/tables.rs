//! Protocol and Measure Tables
//!
//! Static data behind [`InfoType`](super::InfoType): the protocol catalogue
//! with its command templates, the measure conversion rules and the Visonic
//! qualifier flags.

use bitflags::bitflags;
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// `(state, template)`; `{address}` and `{level}` are substituted.
pub type StateTemplates = &'static [(&'static str, &'static str)];

/// A protocol the dongle decodes.
#[derive(Debug)]
pub struct ProtocolSpec {
    pub code: &'static str,
    pub name: &'static str,
    /// InfoTypes frames of this protocol are reported with.
    pub info_types: &'static [u8],
    /// `(command reference, templates per state)`.
    pub commands: &'static [(&'static str, StateTemplates)],
}

impl ProtocolSpec {
    pub fn templates(&self, command: &str) -> Option<StateTemplates> {
        self.commands
            .iter()
            .find(|(name, _)| *name == command)
            .map(|(_, t)| *t)
    }
}

pub static PROTOCOLS: &[ProtocolSpec] = &[
    ProtocolSpec { code: "0", name: "UNKNOWN", info_types: &[], commands: &[] },
    ProtocolSpec {
        code: "1",
        name: "X10",
        info_types: &[0, 1],
        commands: &[
            ("switch", &[("0", "OFF {address} X10"), ("1", "ON {address} X10")]),
            ("switch_all", &[("0", "ALL_OFF {address} X10"), ("1", "ALL_ON {address} X10")]),
            (
                "dimmer",
                &[("0", "DIM {address} X10 %{level}"), ("1", "BRIGHT {address} X10 %{level}")],
            ),
        ],
    },
    ProtocolSpec { code: "2", name: "VISONIC", info_types: &[2], commands: &[] },
    ProtocolSpec {
        code: "3",
        name: "BLYSS",
        info_types: &[1],
        commands: &[
            ("switch", &[("0", "OFF {address} BLYSS"), ("1", "ON {address} BLYSS")]),
            (
                "dimmer",
                &[("0", "DIM {address} BLYSS %{level}"), ("1", "BRIGHT {address} BLYSS %{level}")],
            ),
        ],
    },
    ProtocolSpec {
        code: "4",
        name: "CHACON",
        info_types: &[1],
        commands: &[
            ("switch", &[("0", "OFF {address} CHACON"), ("1", "ON {address} CHACON")]),
            (
                "switch_all",
                &[("0", "ALL_OFF {address} CHACON"), ("1", "ALL_ON {address} CHACON")],
            ),
            (
                "dimmer",
                &[
                    ("0", "DIM {address} CHACON %{level}"),
                    ("1", "BRIGHT {address} CHACON %{level}"),
                ],
            ),
        ],
    },
    ProtocolSpec { code: "5", name: "OREGON", info_types: &[4, 5, 6, 7, 9], commands: &[] },
    ProtocolSpec { code: "6", name: "DOMIA", info_types: &[0], commands: &[] },
    ProtocolSpec { code: "7", name: "OWL", info_types: &[8], commands: &[] },
    ProtocolSpec { code: "8", name: "XD2", info_types: &[10, 11], commands: &[] },
    ProtocolSpec { code: "9", name: "RTS", info_types: &[3], commands: &[] },
    ProtocolSpec { code: "10", name: "KD101", info_types: &[1], commands: &[] },
    ProtocolSpec { code: "11", name: "PARROT", info_types: &[0], commands: &[] },
];

static PROTOCOL_INDEX: Lazy<HashMap<&'static str, &'static ProtocolSpec>> =
    Lazy::new(|| PROTOCOLS.iter().map(|p| (p.code, p)).collect());

pub fn find_protocol(code: &str) -> Option<&'static ProtocolSpec> {
    PROTOCOL_INDEX.get(code).copied()
}

/// How a measure string becomes a sensor value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    Float,
    Int,
    /// hPa in, Pa out.
    HectoPascal,
}

/// `(info types, sensor data type, measure unit, conversion)`; a `None` unit
/// accepts any.
pub type MeasureRule = (&'static [u8], &'static str, Option<&'static str>, Conversion);

pub const MEASURE_RULES: &[MeasureRule] = &[
    (&[4, 5], "DT_Temp", Some("Celsius"), Conversion::Float),
    (&[4, 5], "DT_Humidity", Some("%"), Conversion::Int),
    (&[5], "DT_Pressure", Some("hPa"), Conversion::HectoPascal),
    (&[6], "DT_Speed", Some("m/s"), Conversion::Float),
    (&[6], "DT_Angle", Some("degree"), Conversion::Int),
    (&[7], "DT_Number", None, Conversion::Int),
    (&[8], "DT_ActiveEnergy", Some("Wh"), Conversion::Int),
    (&[8], "DT_Power", Some("W"), Conversion::Int),
    (&[9], "DT_mMeter", Some("mm"), Conversion::Float),
    (&[9], "DT_mMeterHour", Some("mm/h"), Conversion::Float),
];

pub fn measure_rule(info_type: u8, data_type: &str, unit: &str) -> Option<Conversion> {
    MEASURE_RULES
        .iter()
        .find(|(types, dt, u, _)| {
            types.contains(&info_type) && *dt == data_type && u.map_or(true, |u| u == unit)
        })
        .map(|(_, _, _, conversion)| *conversion)
}

bitflags! {
    /// Qualifier bits of Visonic frames.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct VisonicFlags: u32 {
        const TAMPER = 0x01;
        const ALARM = 0x02;
        const LOW_BATTERY = 0x04;
        const BUTTON_1 = 0x08;
        const BUTTON_2 = 0x10;
        const BUTTON_3 = 0x20;
        const BUTTON_4 = 0x40;
    }
}

/// `(subtype, sensor reference, qualifier, value)` for RTS frames.
pub const RTS_QUALIFIERS: &[(&str, &str, i64, i64)] = &[
    ("0", "shutter", 1, 1),
    ("0", "shutter", 7, 0),
    ("0", "push_button", 4, 1),
    ("1", "button_1", 5, 1),
    ("1", "button_2", 6, 1),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_index() {
        assert_eq!(find_protocol("4").unwrap().name, "CHACON");
        assert_eq!(find_protocol("5").unwrap().info_types, &[4, 5, 6, 7, 9]);
        assert!(find_protocol("42").is_none());
    }

    #[test]
    fn test_templates() {
        let chacon = find_protocol("4").unwrap();
        let switch = chacon.templates("switch").unwrap();
        assert!(switch.contains(&("1", "ON {address} CHACON")));
        assert!(find_protocol("3").unwrap().templates("switch_all").is_none());
        assert!(find_protocol("9").unwrap().templates("switch").is_none());
    }

    #[test]
    fn test_measure_rules() {
        assert_eq!(measure_rule(4, "DT_Temp", "Celsius"), Some(Conversion::Float));
        assert_eq!(measure_rule(4, "DT_Temp", "Fahrenheit"), None);
        assert_eq!(measure_rule(4, "DT_Pressure", "hPa"), None);
        assert_eq!(measure_rule(5, "DT_Pressure", "hPa"), Some(Conversion::HectoPascal));
        assert_eq!(measure_rule(7, "DT_Number", "whatever"), Some(Conversion::Int));
    }

    #[test]
    fn test_visonic_flags() {
        let flags = VisonicFlags::from_bits_truncate(0x0B);
        assert!(flags.contains(VisonicFlags::TAMPER));
        assert!(flags.contains(VisonicFlags::ALARM));
        assert!(flags.contains(VisonicFlags::BUTTON_1));
        assert!(!flags.contains(VisonicFlags::LOW_BATTERY));
    }
}
