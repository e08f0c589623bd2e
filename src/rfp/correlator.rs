//! # Request Correlation
//!
//! The dongle is strictly half-duplex: one tracked command is outstanding at
//! a time, and its reply is recognised by the `reqNum` echoed in the payload.
//! This module holds the pure side of that exchange: queued commands, the
//! pending request, and the matching rule.

use crate::constants::{DEFAULT_REQUEST_TIMEOUT, FIRMWARE_COMMAND};
use crate::error::RfpError;
use crate::rfp::frame::{DecodedMessage, Frame};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

pub type CompletionResult = Result<DecodedMessage, RfpError>;

/// What to do with the reply of a tracked command.
pub enum Completion {
    Handler(Box<dyn FnOnce(CompletionResult) + Send>),
    Channel(oneshot::Sender<CompletionResult>),
}

impl Completion {
    pub fn handler<F>(f: F) -> Self
    where
        F: FnOnce(CompletionResult) + Send + 'static,
    {
        Completion::Handler(Box::new(f))
    }

    /// A completion paired with the receiver its result will arrive on.
    pub fn channel() -> (Self, oneshot::Receiver<CompletionResult>) {
        let (tx, rx) = oneshot::channel();
        (Completion::Channel(tx), rx)
    }

    pub fn complete(self, result: CompletionResult) {
        match self {
            Completion::Handler(f) => f(result),
            Completion::Channel(tx) => {
                // Receiver gone means nobody is waiting any more.
                let _ = tx.send(result);
            }
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Completion::Handler(_) => f.write_str("Completion::Handler"),
            Completion::Channel(_) => f.write_str("Completion::Channel"),
        }
    }
}

/// A command waiting in the write queue.
#[derive(Debug)]
pub struct OutboundCommand {
    pub command: String,
    pub expect_response: bool,
    pub completion: Option<Completion>,
    pub timeout: Duration,
}

impl OutboundCommand {
    /// Fire-and-forget command.
    pub fn untracked(command: &str) -> Self {
        OutboundCommand {
            command: command.to_string(),
            expect_response: false,
            completion: None,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Command whose reply is correlated by request number.
    pub fn tracked(command: &str, completion: Option<Completion>) -> Self {
        OutboundCommand {
            command: command.to_string(),
            expect_response: true,
            completion,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// The single request awaiting its reply.
#[derive(Debug)]
pub struct PendingRequest {
    pub req_num: u32,
    pub command: String,
    pub completion: Option<Completion>,
    pub submitted_at: Instant,
    pub timeout: Duration,
}

impl PendingRequest {
    pub fn new(req_num: u32, command: OutboundCommand) -> Self {
        PendingRequest {
            req_num,
            command: command.command,
            completion: command.completion,
            submitted_at: Instant::now(),
            timeout: command.timeout,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.submitted_at + self.timeout
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline()
    }

    pub fn timeout_error(&self) -> RfpError {
        RfpError::CorrelationTimeout {
            req_num: self.req_num,
            command: self.command.clone(),
        }
    }

    /// Hands `result` to the completion, if any.
    pub fn complete(self, result: CompletionResult) {
        if let Some(completion) = self.completion {
            completion.complete(result);
        }
    }
}

/// How an inbound frame relates to the pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyMatch {
    /// The awaited reply.
    Matched,
    /// Something else; dispatch it as unsolicited.
    Unrelated,
    /// A reply without data; drop it.
    Empty,
}

/// Matches a frame against the pending request.
///
/// Only Reply frames can match. The firmware completion reply carries no
/// `reqNum` and matches any data-bearing reply while `UPDATE FIRMWARE` is
/// pending.
pub fn match_reply(pending: &PendingRequest, frame: &Frame) -> ReplyMatch {
    if !frame.is_reply() {
        return ReplyMatch::Unrelated;
    }
    if !frame.has_data() {
        return ReplyMatch::Empty;
    }
    match frame.req_num() {
        Some(n) if n == pending.req_num => ReplyMatch::Matched,
        Some(_) => ReplyMatch::Unrelated,
        None if pending.command == FIRMWARE_COMMAND => ReplyMatch::Matched,
        None => ReplyMatch::Unrelated,
    }
}

/// Monotonic request numbers, starting at 1.
#[derive(Debug, Default)]
pub struct RequestCounter(AtomicU32);

impl RequestCounter {
    pub fn new() -> Self {
        RequestCounter(AtomicU32::new(0))
    }

    pub fn next(&self) -> u32 {
        self.0.fetch_add(1, Ordering::SeqCst).wrapping_add(1)
    }

    pub fn current(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Items of the receive queue.
#[derive(Debug)]
pub enum Inbound {
    /// A synced frame, with the request it answers if any.
    Frame {
        frame: Frame,
        pending: Option<PendingRequest>,
    },
    /// A tracked request whose window elapsed.
    Timeout(PendingRequest),
}
