//! Mock dongle transport for testing
//!
//! This module provides an in-memory [`Transport`] that records every written
//! line and replays scripted replies, so the dispatch engine and the manager
//! can be exercised without an RFP1000 plugged in. [`MockTransport::rfp1000`]
//! answers like a real dongle: HELLO, PING, STATUS and the protocol commands.

use crate::error::RfpError;
use crate::rfp::transport::{Connector, SerialConfig, Transport};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// Produces the lines the mock answers with for one written line.
pub type Responder = Arc<dyn Fn(&str) -> Vec<String> + Send + Sync>;

pub const WELCOME_LINE: &str =
    "ZIA--Welcome to Ziblue Dongle RFPLAYER (RFP1000, Firmware V1.12 Mac 0xF6C09FA1)";

pub const SYSTEM_STATUS: &str = r#"{"systemStatus":{"reqNum":"@","info":[{"n":"Version","v":"1.12","unit":"","c":""},{"n":"Mac","v":"0xF6C09FA1","unit":"","c":""},{"n":"Time","v":"00:08:33","unit":"","c":"d:h:m"},{"transmitter":{"available":{"p":["X10","RTS","VISONIC","BLYSS","CHACON","KD101","PARROT"]}}},{"receiver":{"available":{"p":["X10","RTS","VISONIC","BLYSS","CHACON","OREGON","DOMIA","OWL","X2D","KD101","PARROT"]}}},{"receiver":{"enabled":{"p":["X10","RTS","VISONIC","CHACON","OREGON"]}}},{"repeater":{"available":{"p":["X10","RTS","VISONIC","BLYSS","CHACON","OREGON"]}}}]}}"#;

pub const RADIO_STATUS: &str = r#"{"radioStatus":{"band":[{"i":[{"n":"Frequency","v":"433920","unit":"Khz","c":"Default"},{"n":"Selectivity","v":"0","unit":"","c":"Medium (300Khz)"},{"n":"Sensitivity","v":"4","unit":"","c":"High (-0dB)"},{"n":"Digital Signal Processing Trigger","v":"8","unit":"dBm","c":""},{"n":"RFlink Trigger","v":"12","unit":"dBm","c":""}]},{"i":[{"n":"Frequency","v":"868950","unit":"Khz","c":"Default"},{"n":"Selectivity","v":"0","unit":"","c":"Medium (300Khz)"},{"n":"Sensitivity","v":"4","unit":"","c":"High (-0dB)"},{"n":"Digital Signal Processing Trigger","v":"6","unit":"dBm","c":""},{"n":"RFlink Trigger","v":"10","unit":"dBm","c":""}]}]}}"#;

pub const TRANSCODER_STATUS: &str = r#"{"transcoderStatus":{"reqNum":"@","info":[{"n":"entry","v":"0"},{"n":"source","v":"X10","c":""},{"n":"id","v":"A1"},{"n":"destination","v":"CHACON"},{"n":"comment","v":"","c":"garage"}]}}"#;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Splits `ZIA++<n> COMMAND` into its request number and command text.
pub fn split_command_line(line: &str) -> Option<(Option<u32>, &str)> {
    let rest = line.strip_prefix("ZIA++")?;
    let digits = rest.len() - rest.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    let (num, command) = rest.split_at(digits);
    Some((num.parse().ok(), command.trim()))
}

fn reply_with(template: &str, req: Option<u32>) -> String {
    let num = req.map(|n| n.to_string()).unwrap_or_default();
    format!("ZIA--{}", template.replace('@', &num))
}

/// Behaviour of a healthy RFP1000.
pub fn rfp1000_responder(line: &str) -> Vec<String> {
    let Some((req, command)) = split_command_line(line) else {
        return Vec::new();
    };
    match command {
        "HELLO" => vec![WELCOME_LINE.to_string()],
        "PING" => vec!["ZIA--PONG".to_string()],
        "STATUS JSON" => vec![
            reply_with(SYSTEM_STATUS, req),
            format!("ZIA--{RADIO_STATUS}"),
        ],
        "STATUS TRANSCODER JSON" => vec![reply_with(TRANSCODER_STATUS, req)],
        cmd if cmd.starts_with("RECEIVER ") => {
            vec!["ZIA--RECEIVED PROTOCOLS: X10 RTS VISONIC CHACON OREGON".to_string()]
        }
        _ => Vec::new(),
    }
}

struct MockState {
    rx: VecDeque<String>,
    tx: Vec<String>,
    raw: Vec<u8>,
    responder: Option<Responder>,
    next_read_error: Option<String>,
    next_write_error: Option<String>,
    resets: usize,
    closed: bool,
}

/// In-memory transport shared between a test and the engine.
#[derive(Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// A silent transport: nothing is answered unless queued.
    pub fn new() -> Self {
        MockTransport {
            state: Arc::new(Mutex::new(MockState {
                rx: VecDeque::new(),
                tx: Vec::new(),
                raw: Vec::new(),
                responder: None,
                next_read_error: None,
                next_write_error: None,
                resets: 0,
                closed: false,
            })),
        }
    }

    /// A transport answering like an RFP1000.
    pub fn rfp1000() -> Self {
        let mock = Self::new();
        mock.set_responder(rfp1000_responder);
        mock
    }

    pub fn set_responder<F>(&self, f: F)
    where
        F: Fn(&str) -> Vec<String> + Send + Sync + 'static,
    {
        lock(&self.state).responder = Some(Arc::new(f));
    }

    /// Queue a line to be read from the dongle.
    pub fn push_line(&self, line: &str) {
        lock(&self.state).rx.push_back(line.to_string());
    }

    /// Lines written so far, without terminator.
    pub fn written(&self) -> Vec<String> {
        lock(&self.state).tx.clone()
    }

    /// Written lines carrying `command`, in order.
    pub fn written_commands(&self) -> Vec<String> {
        self.written()
            .iter()
            .filter_map(|l| split_command_line(l).map(|(_, c)| c.to_string()))
            .collect()
    }

    pub fn raw_written(&self) -> Vec<u8> {
        lock(&self.state).raw.clone()
    }

    pub fn pending_reads(&self) -> usize {
        lock(&self.state).rx.len()
    }

    pub fn output_resets(&self) -> usize {
        lock(&self.state).resets
    }

    pub fn fail_next_read(&self, msg: &str) {
        lock(&self.state).next_read_error = Some(msg.to_string());
    }

    pub fn fail_next_write(&self, msg: &str) {
        lock(&self.state).next_write_error = Some(msg.to_string());
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn write_line(&mut self, line: &str) -> Result<(), RfpError> {
        let mut state = lock(&self.state);
        if let Some(e) = state.next_write_error.take() {
            return Err(RfpError::Transport(e));
        }
        state.tx.push(line.to_string());
        if let Some(responder) = state.responder.clone() {
            let replies = responder(line);
            state.rx.extend(replies);
        }
        Ok(())
    }

    async fn write_raw(&mut self, data: &[u8]) -> Result<(), RfpError> {
        let mut state = lock(&self.state);
        if let Some(e) = state.next_write_error.take() {
            return Err(RfpError::Transport(e));
        }
        state.raw.extend_from_slice(data);
        if let Some(responder) = state.responder.clone() {
            let text = String::from_utf8_lossy(data);
            let replies = responder(text.trim());
            state.rx.extend(replies);
        }
        Ok(())
    }

    async fn read_line(&mut self, wait: Duration) -> Result<Option<String>, RfpError> {
        let deadline = Instant::now() + wait;
        loop {
            {
                let mut state = lock(&self.state);
                if let Some(e) = state.next_read_error.take() {
                    return Err(RfpError::Transport(e));
                }
                if let Some(line) = state.rx.pop_front() {
                    return Ok(Some(line));
                }
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep((deadline - now).min(Duration::from_millis(2))).await;
        }
    }

    async fn reset_output(&mut self) -> Result<(), RfpError> {
        lock(&self.state).resets += 1;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), RfpError> {
        lock(&self.state).closed = true;
        Ok(())
    }
}

/// Connector handing out clones of one mock transport.
#[derive(Clone, Default)]
pub struct MockConnector {
    pub transport: MockTransport,
    fail: Arc<Mutex<Option<String>>>,
}

impl MockConnector {
    pub fn new(transport: MockTransport) -> Self {
        MockConnector {
            transport,
            fail: Arc::new(Mutex::new(None)),
        }
    }

    /// Makes the next connect fail as if the port did not exist.
    pub fn fail_next_connect(&self, msg: &str) {
        *lock(&self.fail) = Some(msg.to_string());
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, port: &str, _config: &SerialConfig) -> Result<Box<dyn Transport>, RfpError> {
        if let Some(msg) = lock(&self.fail).take() {
            return Err(RfpError::Transport(format!("{port}: {msg}")));
        }
        lock(&self.transport.state).closed = false;
        Ok(Box::new(self.transport.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_command_line() {
        assert_eq!(split_command_line("ZIA++ HELLO"), Some((None, "HELLO")));
        assert_eq!(split_command_line("ZIA++PING"), Some((None, "PING")));
        assert_eq!(split_command_line("ZIA++12 STATUS JSON"), Some((Some(12), "STATUS JSON")));
        assert_eq!(split_command_line("ZIA33{}"), None);
    }

    #[tokio::test]
    async fn test_responder_answers_hello_and_status() {
        let mut mock = MockTransport::rfp1000();
        mock.write_line("ZIA++ HELLO").await.unwrap();
        let line = mock.read_line(Duration::from_millis(10)).await.unwrap().unwrap();
        assert!(line.contains("Welcome to Ziblue Dongle"));

        mock.write_line("ZIA++4 STATUS JSON").await.unwrap();
        let line = mock.read_line(Duration::from_millis(10)).await.unwrap().unwrap();
        assert!(line.starts_with("ZIA--{\"systemStatus\":{\"reqNum\":\"4\""));
        assert_eq!(mock.pending_reads(), 1);
    }

    #[tokio::test]
    async fn test_read_times_out_empty() {
        let mut mock = MockTransport::new();
        let start = Instant::now();
        assert!(mock.read_line(Duration::from_millis(20)).await.unwrap().is_none());
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_injected_errors() {
        let mut mock = MockTransport::new();
        mock.fail_next_read("unplugged");
        assert!(matches!(
            mock.read_line(Duration::from_millis(5)).await,
            Err(RfpError::Transport(_))
        ));
        mock.fail_next_write("unplugged");
        assert!(mock.write_line("ZIA++ PING").await.is_err());
        assert!(mock.write_line("ZIA++ PING").await.is_ok());
    }

    #[tokio::test]
    async fn test_connector_failure_and_raw_writes() {
        let connector = MockConnector::new(MockTransport::new());
        connector.fail_next_connect("no such device");
        let err = connector
            .connect("/dev/ttyUSB9", &SerialConfig::default())
            .await
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "Transport error: /dev/ttyUSB9: no such device");

        let mut transport = connector
            .connect("/dev/ttyUSB9", &SerialConfig::default())
            .await
            .unwrap();
        transport.write_raw(b":10000000\n").await.unwrap();
        assert_eq!(connector.transport.raw_written(), b":10000000\n".to_vec());
    }
}
