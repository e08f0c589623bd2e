//! # RFPlayer Protocol Constants
//!
//! Wire-level constants of the RFP1000 ASCII protocol and the default timing
//! values used by the dispatch engine.

use std::time::Duration;

/// Synchronisation id opening every frame.
pub const SYNC_ID: &str = "ZI";

/// Source/destination qualifier for ASCII frames.
pub const SDQ_ASCII: char = 'A';

/// Source/destination qualifier for binary frames.
pub const SDQ_BINARY: char = 'O';

/// Content qualifier of outbound commands.
pub const Q_COMMAND: &str = "++";

/// Content qualifier of replies to commands.
pub const Q_REPLY: &str = "--";

/// Content qualifier of XML events.
pub const Q_XML: &str = "22";

/// Content qualifier of JSON events.
pub const Q_JSON: &str = "33";

/// Content qualifier of plain text events.
pub const Q_TEXT: &str = "44";

/// Header length: sync id + SDQ + qualifier.
pub const HEADER_SIZE: usize = 5;

/// Line terminator on the wire.
pub const TERMINATOR: u8 = b'\r';

/// Substring expected in the HELLO reply of an RFP1000.
pub const RFP1000_IDENT: &str = "ZIA--Welcome to Ziblue Dongle ";

/// Marker returned by the dongle once a firmware image is accepted.
pub const FIRMWARE_DONE_MARKER: &str = "File Download is done!";

/// Command name used to correlate the reqNum-less firmware completion reply.
pub const FIRMWARE_COMMAND: &str = "UPDATE FIRMWARE";

/// Substring of a successful PING reply.
pub const PONG: &str = "PONG";

/// Lock label set on a client while its firmware is being replaced.
pub const LOCK_FIRMWARE: &str = "updatefirmware";

/// Registry device type of an RFP1000 dongle.
pub const RFP1000_DEVICE_TYPE: &str = "rfplayer.rfp1000";

/// Sensor reference carrying dongle liveness.
pub const STATUS_SENSOR_REF: &str = "rfp_status";

// Serial defaults for the RFP1000
pub const DEFAULT_BAUDRATE: u32 = 115_200;
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);
/// Unterminated bytes kept before they are dropped as noise.
pub const MAX_LINE_BUFFER: usize = 4096;

// Engine defaults
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
pub const FIRMWARE_VALIDATION_TIMEOUT: Duration = Duration::from_secs(80);
pub const DEFAULT_REBOOT_DELAY: Duration = Duration::from_secs(60);

/// Reply payloads at or below this length carry no data.
pub const MIN_REPLY_PAYLOAD: usize = 2;
