//! # rfplayer-rs - A Rust Crate for the RFPlayer RFP1000 Dongle
//!
//! The rfplayer-rs crate drives RFP1000 dual-band (433/868 MHz) RF dongles over
//! their serial ASCII protocol and maps the radio traffic they report onto
//! home automation devices.
//!
//! ## Features
//!
//! - Frame codec for the `ZI` headers (ASCII/binary, reply, XML, JSON, text)
//! - Serial link with HELLO identification and PING/PONG liveness checks
//! - Half-duplex request correlation by `reqNum`, with per-request timeouts
//! - Listen, write and dispatch duty cycles per dongle on tokio
//! - InfoType 0 to 11 decoders turning JSON events into typed sensor values
//! - Device discovery, command rendering and dongle configuration
//! - Firmware update, traffic monitor logs and structured logging
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! rfplayer-rs = "1.0.0"
//! ```
//!
//! ```rust,no_run
//! use rfplayer_rs::{DongleClient, EngineConfig, SerialConfig, SerialConnector};
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), rfplayer_rs::RfpError> {
//! let (events, _rx) = tokio::sync::mpsc::unbounded_channel();
//! let client = DongleClient::new(
//!     "rfp.1",
//!     "/dev/ttyUSB0",
//!     SerialConfig::default(),
//!     EngineConfig::default(),
//!     Arc::new(SerialConnector),
//!     events,
//! );
//! let ident = client.open().await?;
//! println!("{ident}");
//! client.close().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod device;
pub mod error;
pub mod infotypes;
pub mod logging;
pub mod manager;
pub mod registry;
pub mod rfp;
pub mod scheduler;
pub mod util;

pub use crate::config::{EngineConfig, RfpConfig};
pub use crate::error::{Report, RfpError};
pub use crate::logging::{init_logger, log_info};

// Protocol engine
pub use rfp::{
    ClientEvent, ClientState, DecodedMessage, DongleClient, Frame, Qualifier, SerialConfig,
    SerialConnector,
};

// Decoders and device model
pub use device::{CommandValues, DetectedDevice, Device, DeviceType, SensorValue};
pub use infotypes::{InfoType, RfpFrame};

// Manager and its collaborators
pub use manager::{CommandRejection, ManagerSnapshot, RfpManager};
pub use registry::{DeviceRegistry, EventSink, LogSink, MemorySink, StaticRegistry};

/// Parses one line read from the dongle.
///
/// # Arguments
/// * `line` - Raw line, with or without its terminator
///
/// # Returns
/// * `Ok(Frame)` - Header recognised; payload kept verbatim
/// * `Err(RfpError::Unsynced)` - Unknown header or line too short
pub fn parse_line(line: &str) -> Result<Frame, RfpError> {
    Frame::from_line(line)
}

/// Parses and decodes one line read from the dongle.
pub fn decode_line(line: &str) -> Result<DecodedMessage, RfpError> {
    let frame = Frame::from_line(line)?;
    frame
        .decode()
        .map_err(|e| RfpError::FrameParse(e.to_string()))
}
