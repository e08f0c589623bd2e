//! The infotypes module turns decoded radio events into sensor values and
//! device commands into dongle command lines.
//!
//! Every JSON event names its family in `header.infoType` (0 to 11). Each
//! family accepts a fixed set of protocols, derives the RF id devices bind to,
//! and knows which sensors and commands a device of that family exposes.

pub mod info_type;
pub mod rfp_frame;
pub mod tables;

pub use info_type::{info_types_for_protocol, protocol_name, InfoType, RenderError, ALL_INFO_TYPES};
pub use rfp_frame::{FrameHeader, FrameInfos, Measure, RfpFrame};
pub use tables::{find_protocol, ProtocolSpec, VisonicFlags, PROTOCOLS};
