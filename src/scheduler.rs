//! # Ping Scheduler
//!
//! Periodic liveness checks, one tokio task per client. The first PING goes
//! out one full period after the timer starts.

use crate::logging::{log_debug, log_info};
use crate::rfp::client::DongleClient;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

struct PingTimer {
    period: Duration,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Ping timers keyed by client id.
#[derive(Default)]
pub struct PingScheduler {
    timers: HashMap<String, PingTimer>,
}

impl PingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts (or restarts with a new period) the timer of `client`.
    ///
    /// A zero period disables the timer.
    pub fn start(&mut self, client: Arc<DongleClient>, period: Duration) {
        let id = client.id().to_string();
        if let Some(timer) = self.timers.get(&id) {
            if timer.period == period && !timer.task.is_finished() {
                return;
            }
        }
        self.stop(&id);
        if period.is_zero() {
            return;
        }
        log_info(&format!("Start ping timer of {id} every {}s", period.as_secs_f64()));
        let (shutdown, mut shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticks.tick() => {
                        let alive = client.ping().await;
                        log_debug(&format!("{} ping : {alive}", client.id()));
                    }
                }
            }
        });
        self.timers.insert(
            id,
            PingTimer {
                period,
                shutdown,
                task,
            },
        );
    }

    /// Cancels the timer of `id`, if any.
    pub fn stop(&mut self, id: &str) {
        if let Some(timer) = self.timers.remove(id) {
            log_debug(&format!("Stop ping timer of {id}"));
            let _ = timer.shutdown.send(());
            timer.task.abort();
        }
    }

    pub fn stop_all(&mut self) {
        let ids: Vec<String> = self.timers.keys().cloned().collect();
        for id in ids {
            self.stop(&id);
        }
    }

    pub fn is_running(&self, id: &str) -> bool {
        self.timers.get(id).map_or(false, |t| !t.task.is_finished())
    }

    pub fn period(&self, id: &str) -> Option<Duration> {
        self.timers.get(id).map(|t| t.period)
    }
}

impl Drop for PingScheduler {
    fn drop(&mut self) {
        self.stop_all();
    }
}
