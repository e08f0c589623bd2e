//! The rfp module is the RFP1000 protocol engine: the ASCII frame codec, the
//! serial link, request correlation, the dispatch duty cycles and the
//! per-dongle client built on top of them.

pub mod channel;
pub mod client;
pub mod commands;
pub mod correlator;
pub mod dispatch;
pub mod frame;
pub mod mock;
pub mod monitor;
pub mod transport;

pub use channel::{SharedTransport, TransportChannel};
pub use client::{ClientEvent, ClientState, DongleClient, EventSender, FirmwareChunk};
pub use correlator::{Completion, CompletionResult, OutboundCommand, RequestCounter};
pub use dispatch::{DispatchHandle, FrameRouter, StopSignal};
pub use frame::{DecodedMessage, Frame, Qualifier, SourceFormat};
pub use monitor::{Monitor, MonitorManager};
pub use transport::{Connector, SerialConfig, SerialConnector, Transport};
