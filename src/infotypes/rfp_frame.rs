//! Typed view of the `frame` object of a JSON radio event.
//!
//! The dongle writes every scalar as a string (`"infoType":"4"`) but hand
//! written fixtures often use numbers, so scalars are read leniently.

use crate::error::RfpError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FrameHeader {
    #[serde(deserialize_with = "lenient_string")]
    pub frame_type: String,
    #[serde(deserialize_with = "lenient_string")]
    pub data_flag: String,
    #[serde(deserialize_with = "lenient_string")]
    pub rf_level: String,
    #[serde(deserialize_with = "lenient_string")]
    pub floor_noise: String,
    #[serde(deserialize_with = "lenient_string")]
    pub rf_quality: String,
    #[serde(deserialize_with = "lenient_string")]
    pub protocol: String,
    #[serde(deserialize_with = "lenient_string")]
    pub protocol_meaning: String,
    #[serde(deserialize_with = "lenient_string")]
    pub info_type: String,
    #[serde(deserialize_with = "lenient_string")]
    pub frequency: String,
}

/// One entry of `infos.measures`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Measure {
    #[serde(rename = "type", deserialize_with = "lenient_string")]
    pub kind: String,
    #[serde(deserialize_with = "lenient_string")]
    pub value: String,
    #[serde(deserialize_with = "lenient_string")]
    pub unit: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameInfos {
    #[serde(rename = "subType", deserialize_with = "lenient_string")]
    pub sub_type: String,
    #[serde(deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(rename = "id_PHY", deserialize_with = "lenient_string")]
    pub id_phy: String,
    #[serde(deserialize_with = "lenient_string")]
    pub adr: String,
    #[serde(deserialize_with = "lenient_string")]
    pub channel: String,
    #[serde(deserialize_with = "lenient_string")]
    pub qualifier: String,
    #[serde(rename = "lowBatt", deserialize_with = "lenient_string")]
    pub low_batt: String,
    pub measures: Vec<Measure>,
}

/// A decoded radio event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RfpFrame {
    pub header: FrameHeader,
    pub infos: FrameInfos,
}

impl RfpFrame {
    /// Reads the `frame` member of a decoded message.
    pub fn from_message(message: &Value) -> Result<RfpFrame, RfpError> {
        let frame = message
            .get("frame")
            .ok_or_else(|| RfpError::FrameParse("message has no frame member".into()))?;
        Ok(serde_json::from_value(frame.clone())?)
    }

    /// Skeleton frame used to probe command rendering for a device.
    pub fn for_command(protocol: &str, protocol_name: &str, address: &str) -> RfpFrame {
        RfpFrame {
            header: FrameHeader {
                frame_type: "0".into(),
                data_flag: "1".into(),
                protocol: protocol.into(),
                protocol_meaning: protocol_name.into(),
                info_type: "255".into(),
                frequency: "868950".into(),
                ..FrameHeader::default()
            },
            infos: FrameInfos {
                sub_type: "0".into(),
                id: address.into(),
                ..FrameInfos::default()
            },
        }
    }

    /// `header.infoType` as a discriminator.
    pub fn info_type(&self) -> Option<u8> {
        self.header.info_type.trim().parse().ok()
    }

    pub fn protocol(&self) -> &str {
        &self.header.protocol
    }

    pub fn protocol_name(&self) -> &str {
        &self.header.protocol_meaning
    }

    pub fn sub_type(&self) -> &str {
        &self.infos.sub_type
    }

    /// Measure whose type equals `name`.
    pub fn measure(&self, name: &str) -> Option<&Measure> {
        self.infos.measures.iter().find(|m| m.kind == name)
    }
}
