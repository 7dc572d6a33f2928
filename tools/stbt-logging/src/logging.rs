//! Newline-delimited JSON records for `--structured-logging`.
//!
//! The process-wide logger uses the `OnceLock<Mutex<Option<..>>>` slot pattern
//! so emitters can append records without threading a handle through.

use crate::errors::StbtError;
use serde::Serialize;
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 4096;

#[derive(Debug, Clone)]
pub struct JsonlLogger {
    pub path: PathBuf,
    pub max_payload_bytes: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEvent<'a> {
    pub timestamp_ms: u64,
    pub level: &'a str,
    pub event_type: &'a str,
    pub payload: Value,
}

impl JsonlLogger {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
        }
    }

    pub fn append(&self, event: &LogEvent<'_>) -> Result<(), StbtError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StbtError::Io(e.to_string()))?;
        }
        let truncated = truncate_json(event.payload.clone(), self.max_payload_bytes);
        let line = serde_json::to_string(&LogEvent {
            timestamp_ms: event.timestamp_ms,
            level: event.level,
            event_type: event.event_type,
            payload: truncated,
        })
        .map_err(|e| StbtError::Io(e.to_string()))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| StbtError::Io(e.to_string()))?;
        writeln!(file, "{line}").map_err(|e| StbtError::Io(e.to_string()))
    }
}

fn truncate_json(value: Value, max_bytes: usize) -> Value {
    let rendered = serde_json::to_string(&value).unwrap_or_default();
    if rendered.len() <= max_bytes {
        return value;
    }
    let mut cut = max_bytes.saturating_sub(3);
    while !rendered.is_char_boundary(cut) {
        cut -= 1;
    }
    Value::String(format!("{}...", &rendered[..cut]))
}

pub fn timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

static STRUCTURED_LOGGER: OnceLock<Mutex<Option<Arc<JsonlLogger>>>> = OnceLock::new();

fn logger_slot() -> &'static Mutex<Option<Arc<JsonlLogger>>> {
    STRUCTURED_LOGGER.get_or_init(|| Mutex::new(None))
}

/// Starts appending structured records to `path`. The file is created up front
/// so a bad path fails here rather than on the first record.
pub fn init_structured_logging(path: impl AsRef<Path>) -> Result<(), StbtError> {
    let logger = JsonlLogger::new(path);
    if let Some(parent) = logger.path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| StbtError::Io(e.to_string()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&logger.path)
        .map_err(|e| StbtError::Io(format!("{}: {e}", logger.path.display())))?;
    *logger_slot()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Arc::new(logger));
    Ok(())
}

/// Appends a record if structured logging is active. Write failures are dropped:
/// text diagnostics must keep flowing even if the record file goes away.
pub fn log_event(level: &str, event_type: &str, payload: Value) {
    let logger = {
        let guard = logger_slot()
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.as_ref().map(Arc::clone)
    };
    if let Some(logger) = logger {
        let _ = logger.append(&LogEvent {
            timestamp_ms: timestamp_ms(),
            level,
            event_type,
            payload,
        });
    }
}
