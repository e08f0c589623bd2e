//! # RFPlayer Frame Codec
//!
//! Every line exchanged with the dongle starts with a 5 byte header:
//!
//! ```text
//!  Z I  A|O  --|22|33|44  payload ... \r
//!  sync  SDQ  qualifier
//! ```
//!
//! The header is recognised with `nom`; only the 8 combinations of source
//! format and content qualifier are synced, everything else is noise. The
//! payload is then decoded best-effort into a [`DecodedMessage`]: JSON first,
//! JSON with single quotes normalised, XML (JSON-compatible on this dongle)
//! and finally raw text.
//!
//! ```rust
//! use rfplayer_rs::rfp::frame::{classify_header, Frame, HeaderInfo, Qualifier};
//!
//! assert!(matches!(classify_header(b"ZIA33{}"), HeaderInfo::Synced(_)));
//! assert_eq!(classify_header(b"ZIX33{}"), HeaderInfo::Unsynced);
//!
//! let frame = Frame::from_line("ZIA--{\"systemStatus\":{\"reqNum\":\"3\"}}").unwrap();
//! assert_eq!(frame.header.qualifier, Qualifier::Reply);
//! assert_eq!(frame.req_num(), Some(3));
//! ```

use crate::constants::{
    HEADER_SIZE, MIN_REPLY_PAYLOAD, Q_COMMAND, Q_JSON, Q_REPLY, Q_TEXT, Q_XML, SDQ_ASCII,
    SDQ_BINARY, SYNC_ID,
};
use crate::error::RfpError;
use chrono::{DateTime, Utc};
use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::character::complete::char;
use nom::combinator::value;
use nom::IResult;
use serde_json::Value;
use thiserror::Error;

/// Encoding declared by the SDQ byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceFormat {
    Ascii,
    Binary,
}

/// Content qualifier of an inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Qualifier {
    /// Direct response to a command (`--`).
    Reply,
    /// Asynchronous event in XML (`22`).
    Xml,
    /// Asynchronous event in JSON (`33`).
    Json,
    /// Asynchronous event in plain text (`44`).
    Text,
}

impl Qualifier {
    pub fn code(&self) -> &'static str {
        match self {
            Qualifier::Reply => Q_REPLY,
            Qualifier::Xml => Q_XML,
            Qualifier::Json => Q_JSON,
            Qualifier::Text => Q_TEXT,
        }
    }
}

/// A recognised frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub source: SourceFormat,
    pub qualifier: Qualifier,
}

impl Header {
    /// The 5 byte wire prefix of this header.
    pub fn prefix(&self) -> String {
        let sdq = match self.source {
            SourceFormat::Ascii => SDQ_ASCII,
            SourceFormat::Binary => SDQ_BINARY,
        };
        format!("{SYNC_ID}{sdq}{}", self.qualifier.code())
    }
}

/// Result of header classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderInfo {
    Synced(Header),
    Unsynced,
}

impl HeaderInfo {
    pub fn is_synced(&self) -> bool {
        matches!(self, HeaderInfo::Synced(_))
    }
}

fn source_format(input: &[u8]) -> IResult<&[u8], SourceFormat> {
    alt((
        value(SourceFormat::Ascii, char(SDQ_ASCII)),
        value(SourceFormat::Binary, char(SDQ_BINARY)),
    ))(input)
}

fn qualifier(input: &[u8]) -> IResult<&[u8], Qualifier> {
    alt((
        value(Qualifier::Reply, tag(Q_REPLY)),
        value(Qualifier::Xml, tag(Q_XML)),
        value(Qualifier::Json, tag(Q_JSON)),
        value(Qualifier::Text, tag(Q_TEXT)),
    ))(input)
}

/// Parses the 5 byte header, returning the payload as remainder.
pub fn parse_header(input: &[u8]) -> IResult<&[u8], Header> {
    let (input, _) = tag(SYNC_ID)(input)?;
    let (input, source) = source_format(input)?;
    let (input, qualifier) = qualifier(input)?;
    Ok((input, Header { source, qualifier }))
}

/// Classifies the first 5 bytes of a line.
pub fn classify_header(bytes: &[u8]) -> HeaderInfo {
    match parse_header(bytes) {
        Ok((_, header)) => HeaderInfo::Synced(header),
        Err(_) => HeaderInfo::Unsynced,
    }
}

/// Strips one leading line break left over from the previous terminator and
/// any trailing terminator characters.
pub fn trim_line(line: &str) -> &str {
    let line = line
        .strip_prefix('\r')
        .or_else(|| line.strip_prefix('\n'))
        .unwrap_or(line);
    line.trim_end_matches(['\r', '\n'])
}

/// One header-delimited unit read from the dongle.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub header: Header,
    pub payload: String,
    pub received_at: DateTime<Utc>,
}

impl Frame {
    /// Builds a frame from a raw line, timestamped now.
    pub fn from_line(line: &str) -> Result<Frame, RfpError> {
        Self::from_line_at(line, Utc::now())
    }

    pub fn from_line_at(line: &str, received_at: DateTime<Utc>) -> Result<Frame, RfpError> {
        let line = trim_line(line);
        if line.len() <= HEADER_SIZE {
            return Err(RfpError::Unsynced(line.to_string()));
        }
        match parse_header(line.as_bytes()) {
            Ok((_, header)) => Ok(Frame {
                header,
                // The header is pure ASCII, so byte 5 is a char boundary.
                payload: line[HEADER_SIZE..].to_string(),
                received_at,
            }),
            Err(_) => Err(RfpError::Unsynced(line.to_string())),
        }
    }

    pub fn is_reply(&self) -> bool {
        self.header.qualifier == Qualifier::Reply
    }

    /// Reply frames of 2 characters or fewer carry no data.
    pub fn has_data(&self) -> bool {
        self.payload.trim().len() > MIN_REPLY_PAYLOAD
    }

    /// Request number echoed by the dongle, if any.
    pub fn req_num(&self) -> Option<u32> {
        if !self.payload.contains("reqNum") {
            return None;
        }
        extract_req_num(&self.payload)
    }

    pub fn decode(&self) -> Result<DecodedMessage, DecodeFailure> {
        decode(&self.payload, self.header.qualifier)
    }

    /// The line as it was on the wire, without terminator.
    pub fn to_line(&self) -> String {
        format!("{}{}", self.header.prefix(), self.payload)
    }
}

/// Structured content of a frame payload.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedMessage {
    Json(Value),
    Xml(Value),
    Text(String),
}

impl DecodedMessage {
    /// Structured view; `None` for text.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            DecodedMessage::Json(v) | DecodedMessage::Xml(v) => Some(v),
            DecodedMessage::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            DecodedMessage::Text(t) => Some(t),
            _ => None,
        }
    }

    /// Converts to a JSON value; text becomes a JSON string.
    pub fn into_value(self) -> Value {
        match self {
            DecodedMessage::Json(v) | DecodedMessage::Xml(v) => v,
            DecodedMessage::Text(t) => Value::String(t),
        }
    }

    /// Checks for a top level key in structured messages.
    pub fn has_key(&self, key: &str) -> bool {
        self.as_value()
            .and_then(Value::as_object)
            .map(|o| o.contains_key(key))
            .unwrap_or(false)
    }
}

/// Why a payload could not be decoded for its declared format.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DecodeFailure {
    #[error("payload carries no data")]
    Empty,

    #[error("payload is not JSON: {0}")]
    NotJson(String),

    #[error("payload is not XML: {0}")]
    NotXml(String),
}

fn parse_json(payload: &str) -> Result<Value, String> {
    match serde_json::from_str::<Value>(payload) {
        Ok(v) => Ok(v),
        // Test fixtures of the dongle emit single quoted JSON.
        Err(first) => serde_json::from_str::<Value>(&payload.replace('\'', "\""))
            .map_err(|_| first.to_string()),
    }
}

fn is_empty_value(v: &Value) -> bool {
    match v {
        Value::Object(o) => o.is_empty(),
        Value::Null => true,
        _ => false,
    }
}

fn decode_json(payload: &str) -> Result<Value, DecodeFailure> {
    let payload = payload.trim();
    if payload.len() <= MIN_REPLY_PAYLOAD {
        return Err(DecodeFailure::Empty);
    }
    let value = parse_json(payload).map_err(DecodeFailure::NotJson)?;
    if is_empty_value(&value) {
        return Err(DecodeFailure::Empty);
    }
    Ok(value)
}

// XML reports of this dongle are only ever JSON-compatible in practice.
fn decode_xml(payload: &str) -> Result<Value, DecodeFailure> {
    match serde_json::from_str::<Value>(payload.trim()) {
        Ok(v) if !is_empty_value(&v) => Ok(v),
        Ok(_) => Err(DecodeFailure::Empty),
        Err(e) => Err(DecodeFailure::NotXml(e.to_string())),
    }
}

/// Decodes a payload according to the qualifier it arrived with.
///
/// Replies fall back through JSON, XML and text and only fail when empty;
/// asynchronous JSON/XML events fail when they do not parse.
pub fn decode(payload: &str, declared: Qualifier) -> Result<DecodedMessage, DecodeFailure> {
    match declared {
        Qualifier::Reply => {
            if payload.trim().len() <= MIN_REPLY_PAYLOAD {
                return Err(DecodeFailure::Empty);
            }
            if let Ok(v) = decode_json(payload) {
                return Ok(DecodedMessage::Json(v));
            }
            if let Ok(v) = decode_xml(payload) {
                return Ok(DecodedMessage::Xml(v));
            }
            Ok(DecodedMessage::Text(payload.to_string()))
        }
        Qualifier::Json => decode_json(payload).map(DecodedMessage::Json),
        Qualifier::Xml => decode_xml(payload).map(DecodedMessage::Xml),
        Qualifier::Text => Ok(DecodedMessage::Text(payload.to_string())),
    }
}

fn req_num_of(v: &Value) -> Option<u32> {
    match v {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        _ => None,
    }
}

/// Looks for `reqNum` one level below the root of a JSON payload.
pub fn extract_req_num(payload: &str) -> Option<u32> {
    let value = decode_json(payload).ok()?;
    value
        .as_object()?
        .values()
        .filter_map(Value::as_object)
        .find_map(|inner| inner.get("reqNum").and_then(req_num_of))
}

/// Builds an outbound command line without terminator:
/// `ZIA++<reqNum?> <COMMAND>`.
pub fn command_line(req_num: Option<u32>, command: &str) -> String {
    match req_num {
        Some(n) => format!("{SYNC_ID}{SDQ_ASCII}{Q_COMMAND}{n} {command}"),
        None => format!("{SYNC_ID}{SDQ_ASCII}{Q_COMMAND} {command}"),
    }
}

/// Handshake form without separator, as used by HELLO and PING.
pub fn bare_command_line(command: &str) -> String {
    format!("{SYNC_ID}{SDQ_ASCII}{Q_COMMAND}{command}")
}
