//! # Transport Channel
//!
//! Owns the connection of one dongle. The transport lives behind a single
//! `tokio::sync::Mutex` shared with the dispatch tasks: whoever holds the lock
//! owns the half-duplex link, for one line read or for a whole
//! write-and-wait-for-reply exchange.

use crate::constants::{PONG, RFP1000_IDENT};
use crate::error::RfpError;
use crate::logging::{log_debug, log_error, log_info, log_warn};
use crate::rfp::frame::{bare_command_line, trim_line, Frame};
use crate::rfp::transport::{Connector, SerialConfig, Transport};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Transport slot shared by the channel and the dispatch tasks; `None` while
/// closed.
pub type SharedTransport = Arc<Mutex<TransportSlot>>;

/// The open link, if any.
pub type TransportSlot = Option<Box<dyn Transport>>;

pub struct TransportChannel {
    port: String,
    serial: SerialConfig,
    connector: Arc<dyn Connector>,
    transport: SharedTransport,
    handshake_timeout: Duration,
}

impl TransportChannel {
    pub fn new(
        port: &str,
        serial: SerialConfig,
        connector: Arc<dyn Connector>,
        handshake_timeout: Duration,
    ) -> Self {
        TransportChannel {
            port: port.to_string(),
            serial,
            connector,
            transport: Arc::new(Mutex::new(None)),
            handshake_timeout,
        }
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn serial(&self) -> &SerialConfig {
        &self.serial
    }

    pub fn shared(&self) -> SharedTransport {
        Arc::clone(&self.transport)
    }

    pub async fn is_open(&self) -> bool {
        self.transport.lock().await.is_some()
    }

    /// Connects and identifies the dongle.
    ///
    /// Returns the HELLO reply on success. On any failure the channel is left
    /// closed.
    pub async fn open(&self) -> Result<String, RfpError> {
        let mut slot = self.transport.lock().await;
        if slot.is_some() {
            log_warn(&format!("RFP1000 device {} already open", self.port));
            return Err(RfpError::Other(format!("{} already open", self.port)));
        }

        let mut transport = self.connector.connect(&self.port, &self.serial).await?;
        match self.identify(transport.as_mut()).await {
            Ok(ident) => {
                log_info(&format!("RFP1000 {} CONNECTED : {ident}", self.port));
                *slot = Some(transport);
                Ok(ident)
            }
            Err(e) => {
                log_error(&format!("RFP1000 {} can't be open: {e}", self.port));
                if let Err(close_err) = transport.close().await {
                    log_debug(&format!("Closing after failed open: {close_err}"));
                }
                Err(e)
            }
        }
    }

    async fn identify(&self, transport: &mut dyn Transport) -> Result<String, RfpError> {
        transport.reset_output().await?;
        transport.write_line(&bare_command_line("HELLO")).await?;
        let ident = transport
            .read_line(self.handshake_timeout)
            .await?
            .unwrap_or_default();
        if ident.contains(RFP1000_IDENT) {
            Ok(ident)
        } else {
            Err(RfpError::BadIdentification(ident))
        }
    }

    /// Closes the transport. Closing a closed channel only logs.
    pub async fn close(&self) -> Result<(), RfpError> {
        let mut slot = self.transport.lock().await;
        match slot.take() {
            Some(mut transport) => {
                log_info(&format!("Close RFP1000 on {}", self.port));
                if let Err(e) = transport.close().await {
                    log_error(&format!("Error while closing {}: {e}", self.port));
                }
            }
            None => log_error(&format!("RFP1000 on {} is not open", self.port)),
        }
        Ok(())
    }

    /// Liveness check: PING must be answered with PONG within `wait`.
    ///
    /// Synced frames read while waiting are handed to `stray` instead of
    /// being taken for a failed answer.
    pub async fn ping<F>(&self, wait: Duration, mut stray: F) -> Result<bool, RfpError>
    where
        F: FnMut(Frame),
    {
        let mut slot = self.transport.lock().await;
        let transport = slot
            .as_mut()
            .ok_or_else(|| RfpError::NotOpen(self.port.clone()))?;
        transport.reset_output().await?;
        transport.write_line(&bare_command_line("PING")).await?;

        let deadline = Instant::now() + wait;
        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let Some(line) = transport.read_line(deadline - now).await? else {
                break;
            };
            if line.contains(PONG) {
                return Ok(true);
            }
            match Frame::from_line(trim_line(&line)) {
                Ok(frame) => stray(frame),
                Err(_) => log_debug(&format!("{}: noise while waiting PONG: {line}", self.port)),
            }
        }
        log_warn(&format!("RFPLAYER on {} don't receive PING response", self.port));
        Ok(false)
    }
}
