//! # Utility Modules
//!
//! Hex helpers and logging patterns shared by the transport and dispatch code.

pub mod hex;
pub mod logging;

pub use hex::{decode_hex, encode_hex_upper, format_hex_compact};
pub use logging::{log_frame_hex, LogThrottle};
