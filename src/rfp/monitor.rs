//! # Client Monitor
//!
//! Per-dongle traffic log written to `<dir>/<client_id>.log`: raw lines
//! received, lines written, frames of unknown devices and error notes, each
//! stamped with local time to the millisecond. A client without monitor simply
//! skips reporting.

use crate::error::{Report, RfpError};
use crate::logging::{log_debug, log_info, log_warn};
use chrono::{DateTime, Local};
use serde_json::Value;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const SEPARATOR: &str = "-----------------------------------------------------------";

fn stamp(at: DateTime<Local>) -> String {
    at.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

/// An open monitor log.
#[derive(Debug)]
pub struct Monitor {
    client_id: String,
    path: PathBuf,
    file: Mutex<File>,
}

impl Monitor {
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, kind: &str, data: &str) {
        let entry = format!("{} - {kind}\n{data}\n{SEPARATOR}\n", stamp(Local::now()));
        let mut file = match self.file.lock() {
            Ok(f) => f,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = file.write_all(entry.as_bytes()) {
            log_warn(&format!("Monitor client {} bad report : {e}", self.client_id));
        }
    }

    pub fn raw_data(&self, line: &str) {
        self.append("Raw received : ", line);
    }

    pub fn write_data(&self, line: &str) {
        self.append("Write data : ", line);
    }

    /// Frame of a device nothing is bound to yet.
    pub fn no_device(&self, device_type_id: &str, frame: &Value) {
        let data = serde_json::to_string_pretty(frame).unwrap_or_else(|_| frame.to_string());
        self.append(&format!("Data for new device {device_type_id} :"), &data);
    }

    pub fn note(&self, text: &str) {
        self.append("Error : ", text);
    }

    fn footer(&self) {
        let mut file = match self.file.lock() {
            Ok(f) => f,
            Err(poisoned) => poisoned.into_inner(),
        };
        let line = format!(
            "{} - Stopped monitor log for clientID {}.\n",
            stamp(Local::now()),
            self.client_id
        );
        if let Err(e) = file.write_all(line.as_bytes()).and_then(|_| file.flush()) {
            log_warn(&format!("Monitor client {} close : {e}", self.client_id));
        }
    }
}

/// Opens and closes monitor logs of clients.
#[derive(Debug)]
pub struct MonitorManager {
    dir: PathBuf,
    monitors: Mutex<HashMap<String, Arc<Monitor>>>,
}

impl MonitorManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        MonitorManager {
            dir: dir.into(),
            monitors: Mutex::new(HashMap::new()),
        }
    }

    pub fn file_name(&self, client_id: &str) -> PathBuf {
        self.dir.join(format!("{client_id}.log"))
    }

    pub fn is_monitored(&self, client_id: &str) -> bool {
        self.monitors
            .lock()
            .map(|m| m.contains_key(client_id))
            .unwrap_or(false)
    }

    pub fn get(&self, client_id: &str) -> Option<Arc<Monitor>> {
        self.monitors.lock().ok()?.get(client_id).cloned()
    }

    /// Creates the log with a header and the client state, then keeps it open
    /// for appending.
    pub fn start(&self, client_id: &str, infos: &Value) -> Result<(Arc<Monitor>, Report), RfpError> {
        let path = self.file_name(client_id);
        if let Some(existing) = self.get(client_id) {
            log_debug(&format!("Monitor client {client_id} in log already started."));
            let report = Report::ok()
                .with("state", "started")
                .with("usermsg", format!("Monitor client {client_id} in log already started."))
                .with("file", path.display().to_string());
            return Ok((existing, report));
        }

        let mut file = File::create(&path)?;
        writeln!(
            file,
            "{} - Started monitor log for clientID {client_id}.",
            stamp(Local::now())
        )?;
        writeln!(file, "clientID is registered in manager, state information :")?;
        writeln!(file, "{}", serde_json::to_string_pretty(infos)?)?;
        writeln!(file, "===============================================")?;
        drop(file);

        let file = OpenOptions::new().append(true).open(&path)?;
        let monitor = Arc::new(Monitor {
            client_id: client_id.to_string(),
            path: path.clone(),
            file: Mutex::new(file),
        });
        self.monitors
            .lock()
            .map_err(|_| RfpError::Other("monitor registry poisoned".into()))?
            .insert(client_id.to_string(), Arc::clone(&monitor));
        log_info(&format!(
            "Start monitor client {client_id} in log file : {}.",
            path.display()
        ));
        let report = Report::ok()
            .with("state", "started")
            .with("usermsg", format!("Start monitor client {client_id} in log file."))
            .with("file", path.display().to_string());
        Ok((monitor, report))
    }

    /// Writes the footer and forgets the log.
    pub fn stop(&self, client_id: &str) -> Report {
        let removed = self
            .monitors
            .lock()
            .ok()
            .and_then(|mut m| m.remove(client_id));
        match removed {
            Some(monitor) => {
                monitor.footer();
                log_info(&format!(
                    "Stop monitor client {client_id} in log file : {}.",
                    monitor.path.display()
                ));
                Report::ok()
                    .with("state", "stopped")
                    .with("usermsg", format!("Stop monitor client {client_id} in log file."))
                    .with("file", monitor.path.display().to_string())
            }
            None => Report::error(format!("Monitor client {client_id} not running.")),
        }
    }

    /// Closes every log.
    pub fn stop_all(&self) {
        let ids: Vec<String> = match self.monitors.lock() {
            Ok(m) => m.keys().cloned().collect(),
            Err(_) => return,
        };
        for id in ids {
            self.stop(&id);
        }
    }
}
