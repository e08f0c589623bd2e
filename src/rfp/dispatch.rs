//! # Dispatch Loop
//!
//! Three duty cycles run per open dongle, as tokio tasks sharing one
//! [`StopSignal`]:
//!
//! - **listen**: reads lines while no reply is awaited and queues synced frames
//! - **write**: drains the command queue in FIFO order; a tracked command keeps
//!   the transport locked until its reply arrives or its window elapses
//! - **read-dispatch**: completes pending requests and routes everything else
//!   to the owning client through [`FrameRouter`]
//!
//! Every blocking wait is bounded by the poll interval so a stop is observed
//! within one interval.

use crate::constants::HEADER_SIZE;
use crate::error::RfpError;
use crate::log_warn_throttled;
use crate::logging::{log_debug, log_error, log_info, log_warn};
use crate::rfp::channel::{SharedTransport, TransportSlot};
use crate::rfp::correlator::{
    match_reply, Inbound, OutboundCommand, PendingRequest, ReplyMatch, RequestCounter,
};
use crate::rfp::frame::{command_line, trim_line, DecodeFailure, DecodedMessage, Frame};
use crate::rfp::transport::Transport;
use crate::util::logging::LogThrottle;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, MutexGuard};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};

/// Back-off of the listen cycle while the write cycle owns the link.
const WAIT_BACKOFF: Duration = Duration::from_millis(5);

/// Unsynced warnings allowed per second.
const UNSYNCED_WARN_CAP: u32 = 5;

/// Cooperative stop flag shared by the tasks of one client.
#[derive(Debug, Clone)]
pub struct StopSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        StopSignal { tx: Arc::new(tx) }
    }

    pub fn set(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_set(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the signal is set.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

/// Receives what the dispatch loop produces for its client.
pub trait FrameRouter: Send + Sync {
    /// An unsolicited message, or a reply nobody registered a completion for.
    fn route(&self, message: DecodedMessage, received_at: DateTime<Utc>);

    /// The link failed; the loop is stopping.
    fn session_lost(&self, error: &RfpError);

    /// Every line longer than a header, synced or not.
    fn raw_line(&self, _line: &str) {}

    /// Every line written.
    fn wrote_line(&self, _line: &str) {}

    /// Diagnostics worth keeping next to the raw traffic.
    fn note(&self, _text: &str) {}
}

struct Engine {
    name: String,
    transport: SharedTransport,
    router: Arc<dyn FrameRouter>,
    counter: Arc<RequestCounter>,
    inbound: mpsc::UnboundedSender<Inbound>,
    waiting: AtomicBool,
    stop: StopSignal,
    poll: Duration,
}

fn session_error(e: &RfpError) -> RfpError {
    match e {
        RfpError::Transport(msg) => RfpError::Transport(msg.clone()),
        other => RfpError::Transport(other.to_string()),
    }
}

impl Engine {
    fn queue(&self, item: Inbound) {
        if self.inbound.send(item).is_err() {
            log_debug(&format!("{}: receive queue closed", self.name));
        }
    }

    /// Takes the transport lock, giving up once stopped. Firmware downloads
    /// hold the lock for long stretches.
    async fn acquire(&self) -> Option<MutexGuard<'_, TransportSlot>> {
        while !self.stop.is_set() {
            if let Ok(guard) = timeout(self.poll, self.transport.lock()).await {
                return Some(guard);
            }
        }
        None
    }

    fn lost(&self, e: &RfpError) {
        log_error(&format!("Error on {} device (disconnected ?) : {e}", self.name));
        self.router.session_lost(e);
        self.stop.set();
    }

    /// Reports the line and turns it into a frame when synced.
    fn accept_line(&self, line: &str, throttle: &mut LogThrottle) -> Option<Frame> {
        let line = trim_line(line);
        if line.len() <= HEADER_SIZE {
            return None;
        }
        self.router.raw_line(line);
        match Frame::from_line(line) {
            Ok(frame) => Some(frame),
            Err(_) => {
                log_warn_throttled!(throttle, "{}: unsynced data dropped: {}", self.name, line);
                None
            }
        }
    }

    async fn write_command(
        &self,
        command: OutboundCommand,
        throttle: &mut LogThrottle,
    ) -> Result<(), RfpError> {
        self.waiting.store(command.expect_response, Ordering::SeqCst);
        let result = self.exchange(command, throttle).await;
        self.waiting.store(false, Ordering::SeqCst);
        result
    }

    async fn exchange(
        &self,
        command: OutboundCommand,
        throttle: &mut LogThrottle,
    ) -> Result<(), RfpError> {
        let Some(mut slot) = self.acquire().await else {
            log_debug(&format!(
                "{}: stopped before sending {}",
                self.name, command.command
            ));
            return Ok(());
        };
        let Some(transport) = slot.as_mut() else {
            log_warn(&format!("{} not open, dropping command {}", self.name, command.command));
            if let Some(completion) = command.completion {
                completion.complete(Err(RfpError::NotOpen(self.name.clone())));
            }
            return Ok(());
        };

        if !command.expect_response {
            let line = command_line(None, &command.command);
            log_debug(&format!("Send request {line} on {}", self.name));
            transport.write_line(&line).await?;
            self.router.wrote_line(&line);
            return Ok(());
        }

        let req_num = self.counter.next();
        let line = command_line(Some(req_num), &command.command);
        let pending = PendingRequest::new(req_num, command);
        log_debug(&format!("Send request {line} on {}", self.name));
        if let Err(e) = transport.write_line(&line).await {
            pending.complete(Err(session_error(&e)));
            return Err(e);
        }
        self.router.wrote_line(&line);
        self.await_reply(&mut **transport, pending, throttle).await
    }

    /// Reads under the held lock until the reply to `pending` shows up.
    async fn await_reply(
        &self,
        transport: &mut dyn Transport,
        pending: PendingRequest,
        throttle: &mut LogThrottle,
    ) -> Result<(), RfpError> {
        loop {
            if self.stop.is_set() {
                log_debug(&format!(
                    "{}: stopped while waiting reply to request {}",
                    self.name, pending.req_num
                ));
                return Ok(());
            }
            let now = Instant::now();
            let deadline = pending.deadline();
            if now >= deadline {
                self.queue(Inbound::Timeout(pending));
                return Ok(());
            }

            let line = match transport.read_line((deadline - now).min(self.poll)).await {
                Ok(Some(line)) => line,
                Ok(None) => continue,
                Err(e) => {
                    pending.complete(Err(session_error(&e)));
                    return Err(e);
                }
            };
            let Some(frame) = self.accept_line(&line, throttle) else {
                continue;
            };
            match match_reply(&pending, &frame) {
                ReplyMatch::Matched => {
                    log_debug(&format!(
                        "Queuing for {} response reqNum {}",
                        self.name, pending.req_num
                    ));
                    self.queue(Inbound::Frame {
                        frame,
                        pending: Some(pending),
                    });
                    return Ok(());
                }
                ReplyMatch::Empty => log_debug(&format!("{}: reply without data", self.name)),
                ReplyMatch::Unrelated => self.queue(Inbound::Frame {
                    frame,
                    pending: None,
                }),
            }
        }
    }

    fn dispatch(&self, item: Inbound) {
        match item {
            Inbound::Timeout(pending) => {
                log_warn(&format!(
                    "{}: no reply to request {} ({}) within {:?}",
                    self.name, pending.req_num, pending.command, pending.timeout
                ));
                let error = pending.timeout_error();
                pending.complete(Err(error));
            }
            Inbound::Frame { frame, pending } => {
                let received_at = frame.received_at;
                match (frame.decode(), pending) {
                    (Ok(message), Some(p)) if p.completion.is_some() => p.complete(Ok(message)),
                    (Ok(message), _) => self.router.route(message, received_at),
                    (Err(DecodeFailure::Empty), None) => {
                        log_debug(&format!("{}: frame without data", self.name))
                    }
                    (Err(e), pending) => {
                        let text = format!("{}: dropping {}: {e}", self.name, frame.to_line());
                        log_warn(&text);
                        self.router.note(&text);
                        if let Some(p) = pending {
                            p.complete(Err(RfpError::FrameParse(e.to_string())));
                        }
                    }
                }
            }
        }
    }
}

async fn listen_cycle(engine: Arc<Engine>) {
    log_info(&format!("***** Start listening on {} *****", engine.name));
    let mut throttle = LogThrottle::new(1000, UNSYNCED_WARN_CAP);
    while !engine.stop.is_set() {
        if engine.waiting.load(Ordering::SeqCst) {
            tokio::time::sleep(WAIT_BACKOFF).await;
            continue;
        }
        let Some(mut slot) = engine.acquire().await else {
            break;
        };
        let Some(transport) = slot.as_mut() else {
            drop(slot);
            tokio::time::sleep(engine.poll).await;
            continue;
        };
        let read = transport.read_line(engine.poll).await;
        drop(slot);

        match read {
            Ok(Some(line)) => {
                if let Some(frame) = engine.accept_line(&line, &mut throttle) {
                    log_debug(&format!("Queuing for {} data received : {line}", engine.name));
                    engine.queue(Inbound::Frame {
                        frame,
                        pending: None,
                    });
                }
            }
            Ok(None) => {}
            Err(e) => {
                engine.lost(&e);
                break;
            }
        }
    }
    log_info(&format!("***** Listening on {} stopped *****", engine.name));
}

async fn write_cycle(engine: Arc<Engine>, mut commands: mpsc::UnboundedReceiver<OutboundCommand>) {
    log_info(&format!("***** Start write queue on {} *****", engine.name));
    let mut throttle = LogThrottle::new(1000, UNSYNCED_WARN_CAP);
    while !engine.stop.is_set() {
        let command = match timeout(engine.poll, commands.recv()).await {
            Err(_) => continue,
            Ok(None) => break,
            Ok(Some(command)) => command,
        };
        if let Err(e) = engine.write_command(command, &mut throttle).await {
            engine.lost(&e);
            break;
        }
    }
    log_info(&format!("***** Write queue on {} stopped *****", engine.name));
}

async fn read_dispatch_cycle(engine: Arc<Engine>, mut inbound: mpsc::UnboundedReceiver<Inbound>) {
    log_info(&format!("***** Start receive queue on {} *****", engine.name));
    while !engine.stop.is_set() {
        let item = match timeout(engine.poll, inbound.recv()).await {
            Err(_) => continue,
            Ok(None) => break,
            Ok(Some(item)) => item,
        };
        if engine.stop.is_set() {
            break;
        }
        engine.dispatch(item);
    }
    log_info(&format!("***** Receive queue on {} stopped *****", engine.name));
}

/// Running duty cycles of one client.
#[derive(Debug)]
pub struct DispatchHandle {
    stop: StopSignal,
    tasks: Vec<JoinHandle<()>>,
}

impl DispatchHandle {
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.tasks.iter().all(JoinHandle::is_finished)
    }

    /// Sets the stop signal and waits for every task to return.
    pub async fn shutdown(self) {
        self.stop.set();
        for task in self.tasks {
            if let Err(e) = task.await {
                log_error(&format!("Dispatch task failed: {e}"));
            }
        }
    }
}

/// Spawns the three duty cycles of a client.
pub fn spawn(
    name: &str,
    transport: SharedTransport,
    commands: mpsc::UnboundedReceiver<OutboundCommand>,
    router: Arc<dyn FrameRouter>,
    counter: Arc<RequestCounter>,
    poll: Duration,
) -> DispatchHandle {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let stop = StopSignal::new();
    let engine = Arc::new(Engine {
        name: name.to_string(),
        transport,
        router,
        counter,
        inbound: inbound_tx,
        waiting: AtomicBool::new(false),
        stop: stop.clone(),
        poll,
    });

    let tasks = vec![
        tokio::spawn(listen_cycle(Arc::clone(&engine))),
        tokio::spawn(write_cycle(Arc::clone(&engine), commands)),
        tokio::spawn(read_dispatch_cycle(engine, inbound_rx)),
    ];
    DispatchHandle { stop, tasks }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rfp::correlator::Completion;
    use crate::rfp::mock::MockTransport;
    use std::sync::Mutex;
    use tokio::sync::Mutex as AsyncMutex;

    #[derive(Default)]
    struct Collect {
        routed: Mutex<Vec<DecodedMessage>>,
        lost: Mutex<Vec<String>>,
    }

    impl FrameRouter for Collect {
        fn route(&self, message: DecodedMessage, _at: DateTime<Utc>) {
            self.routed.lock().unwrap().push(message);
        }
        fn session_lost(&self, error: &RfpError) {
            self.lost.lock().unwrap().push(error.to_string());
        }
    }

    fn start(
        mock: &MockTransport,
    ) -> (
        DispatchHandle,
        mpsc::UnboundedSender<OutboundCommand>,
        Arc<Collect>,
    ) {
        let transport: SharedTransport =
            Arc::new(AsyncMutex::new(Some(Box::new(mock.clone()) as Box<dyn Transport>)));
        let (tx, rx) = mpsc::unbounded_channel();
        let router = Arc::new(Collect::default());
        let handle = spawn(
            "test",
            transport,
            rx,
            router.clone(),
            Arc::new(RequestCounter::new()),
            Duration::from_millis(20),
        );
        (handle, tx, router)
    }

    #[tokio::test]
    async fn test_stop_signal() {
        let stop = StopSignal::new();
        assert!(!stop.is_set());
        let waiter = {
            let stop = stop.clone();
            tokio::spawn(async move { stop.wait().await })
        };
        stop.set();
        timeout(Duration::from_millis(100), waiter).await.unwrap().unwrap();
        assert!(stop.is_set());
    }

    #[tokio::test]
    async fn test_unsolicited_frames_routed_in_order() {
        let mock = MockTransport::new();
        mock.push_line(r#"ZIA33{"frame":{"n":1}}"#);
        mock.push_line("garbage line here");
        mock.push_line("ZIA44JAMMING ON");
        let (handle, _tx, router) = start(&mock);
        tokio::time::sleep(Duration::from_millis(150)).await;
        handle.shutdown().await;

        let routed = router.routed.lock().unwrap();
        assert_eq!(routed.len(), 2);
        assert!(routed[0].has_key("frame"));
        assert_eq!(routed[1].as_text(), Some("JAMMING ON"));
    }

    #[tokio::test]
    async fn test_tracked_reply_completes() {
        let mock = MockTransport::rfp1000();
        let (handle, tx, _router) = start(&mock);
        let (completion, rx) = Completion::channel();
        tx.send(OutboundCommand::tracked("STATUS JSON", Some(completion)))
            .unwrap();
        let reply = timeout(Duration::from_secs(1), rx).await.unwrap().unwrap().unwrap();
        assert!(reply.has_key("systemStatus"));
        assert_eq!(mock.written(), vec!["ZIA++1 STATUS JSON".to_string()]);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_transport_error_ends_session() {
        let mock = MockTransport::new();
        mock.fail_next_read("unplugged");
        let (handle, _tx, router) = start(&mock);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.stop_signal().is_set());
        assert_eq!(router.lost.lock().unwrap().len(), 1);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_while_link_held_elsewhere() {
        let mock = MockTransport::new();
        let transport: SharedTransport =
            Arc::new(AsyncMutex::new(Some(Box::new(mock.clone()) as Box<dyn Transport>)));
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = spawn(
            "test",
            Arc::clone(&transport),
            rx,
            Arc::new(Collect::default()),
            Arc::new(RequestCounter::new()),
            Duration::from_millis(20),
        );
        tokio::time::sleep(Duration::from_millis(50)).await;

        let held = transport.lock().await;
        tx.send(OutboundCommand::untracked("FORMAT JSON")).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let started = Instant::now();
        timeout(Duration::from_secs(1), handle.shutdown()).await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(200));
        drop(held);
        assert!(mock.written().is_empty());
    }
}
