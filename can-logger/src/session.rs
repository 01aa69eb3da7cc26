//! Session lifecycle
//!
//! The `SessionManager` owns the Idle/Active state machine and the one open
//! session file. Control events are applied here; the capture loop only asks
//! it to append records while a session is active.
//!
//! Session files are named `<prefix>_<timestamp>.csv`. When that name is
//! taken (two sessions started within the timestamp resolution) a counter is
//! appended: `<prefix>_<timestamp>_1.csv`, `_2`, and so on. Files are created
//! with `create_new`, so an existing file is never truncated.

use crate::config::{LoggerConfig, RecordLayout};
use crate::decoder::DecodeOutcome;
use crate::sink::{Columns, RecordSink};
use crate::types::{ControlEvent, Frame, LoggerError, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

const SESSION_EXTENSION: &str = "csv";
const METADATA_EXTENSION: &str = "json";
const MAX_NAME_ATTEMPTS: usize = 1000;

/// Logging state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Active,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Active => write!(f, "active"),
        }
    }
}

/// Identity of a session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    /// File stem, derived from the start time
    pub id: String,
    pub output_path: PathBuf,
    /// Wall-clock start, used for naming and metadata
    pub started_at: DateTime<Local>,
    /// Monotonic start; record times are measured from here
    pub start: Instant,
}

/// What a finished session contained
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub info: SessionInfo,
    pub ended_at: DateTime<Local>,
    pub records: u64,
    pub raw_records: u64,
}

/// Sidecar written next to each closed session file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub session_id: String,
    pub file: String,
    /// Unix seconds of the session start
    pub timestamp: i64,
    pub started_at: String,
    pub ended_at: String,
    pub duration_s: f64,
    pub records: u64,
    pub raw_records: u64,
    pub layout: RecordLayout,
}

impl SessionMetadata {
    fn from_summary(summary: &SessionSummary, layout: RecordLayout) -> Self {
        let duration = summary.ended_at - summary.info.started_at;
        Self {
            session_id: summary.info.id.clone(),
            file: summary
                .info
                .output_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            timestamp: summary.info.started_at.timestamp(),
            started_at: summary.info.started_at.to_rfc3339(),
            ended_at: summary.ended_at.to_rfc3339(),
            duration_s: duration.num_milliseconds().max(0) as f64 / 1000.0,
            records: summary.records,
            raw_records: summary.raw_records,
            layout,
        }
    }
}

/// Result of applying a control event
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Started(SessionInfo),
    Stopped(SessionSummary),
    Cleared { deleted: usize },
    /// Clear requested while a session is active; nothing changed
    ClearRejected,
}

/// A session file found in the output directory
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEntry {
    pub path: PathBuf,
    pub file_name: String,
    pub size_bytes: u64,
    /// Sidecar contents, when present and readable
    pub metadata: Option<SessionMetadata>,
}

/// Read-only view of whether a session is active, shared with other threads
#[derive(Debug, Clone, Default)]
pub struct SessionStatus(Arc<AtomicBool>);

impl SessionStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn set(&self, active: bool) {
        self.0.store(active, Ordering::SeqCst);
    }
}

struct ActiveSession {
    info: SessionInfo,
    sink: RecordSink,
    records: u64,
    raw_records: u64,
}

/// Idle/Active state machine owning the current session file
pub struct SessionManager {
    output_dir: PathBuf,
    file_prefix: String,
    timestamp_format: String,
    write_metadata: bool,
    columns: Columns,
    active: Option<ActiveSession>,
    status: SessionStatus,
}

impl SessionManager {
    /// Create a manager; `signal_columns` is only used by the wide layout
    pub fn new(config: &LoggerConfig, signal_columns: Vec<String>) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            file_prefix: config.file_prefix.clone(),
            timestamp_format: config.timestamp_format.clone(),
            write_metadata: config.write_metadata,
            columns: Columns::new(config.layout, signal_columns),
            active: None,
            status: SessionStatus::new(),
        }
    }

    /// Publish state changes through `status` instead of a private flag
    pub fn with_status(mut self, status: SessionStatus) -> Self {
        status.set(self.is_active());
        self.status = status;
        self
    }

    /// Shared handle that follows this manager's state
    pub fn status(&self) -> SessionStatus {
        self.status.clone()
    }

    pub fn state(&self) -> SessionState {
        if self.active.is_some() {
            SessionState::Active
        } else {
            SessionState::Idle
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Apply one control event
    pub fn handle(&mut self, event: ControlEvent) -> Result<Transition> {
        match (event, self.state()) {
            (ControlEvent::ToggleLogging, SessionState::Idle) => {
                self.start().map(Transition::Started)
            }
            (ControlEvent::ToggleLogging, SessionState::Active) => match self.stop()? {
                Some(summary) => Ok(Transition::Stopped(summary)),
                None => Err(LoggerError::InvalidData("no active session".to_string())),
            },
            (ControlEvent::ClearRequest, _) => match self.clear() {
                Ok(deleted) => Ok(Transition::Cleared { deleted }),
                Err(LoggerError::LoggingActive) => {
                    log::warn!("Cannot clear logs while logging is active");
                    Ok(Transition::ClearRejected)
                }
                Err(e) => Err(e),
            },
        }
    }

    /// Open a new session now
    pub fn start(&mut self) -> Result<SessionInfo> {
        self.start_at(Local::now(), Instant::now())
    }

    /// Open a new session with explicit start times
    pub fn start_at(&mut self, started_at: DateTime<Local>, start: Instant) -> Result<SessionInfo> {
        if let Some(active) = &self.active {
            return Err(LoggerError::InvalidData(format!(
                "session {} is already active",
                active.info.id
            )));
        }

        std::fs::create_dir_all(&self.output_dir)?;

        let stem = self.session_stem(&started_at)?;
        let (id, output_path, file) = create_unique(&self.output_dir, &stem)?;
        let sink = RecordSink::from_file(&output_path, file, self.columns.clone())?;

        let info = SessionInfo {
            id,
            output_path,
            started_at,
            start,
        };
        log::info!("Starting new logging session {} -> {:?}", info.id, info.output_path);

        self.active = Some(ActiveSession {
            info: info.clone(),
            sink,
            records: 0,
            raw_records: 0,
        });
        self.status.set(true);
        Ok(info)
    }

    /// Close the active session, if any
    ///
    /// The manager is Idle afterwards even when closing reports an error.
    pub fn stop(&mut self) -> Result<Option<SessionSummary>> {
        let Some(mut active) = self.active.take() else {
            return Ok(None);
        };
        self.status.set(false);

        active.sink.close()?;

        let summary = SessionSummary {
            info: active.info,
            ended_at: Local::now(),
            records: active.records,
            raw_records: active.raw_records,
        };

        if self.write_metadata {
            self.write_sidecar(&summary)?;
        }

        log::info!(
            "Stopped logging session {}: {} records ({} raw)",
            summary.info.id,
            summary.records,
            summary.raw_records
        );
        Ok(Some(summary))
    }

    /// Append a decoded frame to the active session
    ///
    /// Returns `Ok(false)` without writing when no session is active.
    pub fn append(&mut self, frame: &Frame, outcome: DecodeOutcome) -> Result<bool> {
        let Some(active) = self.active.as_mut() else {
            return Ok(false);
        };

        let is_raw = outcome.is_raw();
        let record = outcome.into_record(frame, active.info.start);
        active.sink.append(&record)?;

        active.records += 1;
        if is_raw {
            active.raw_records += 1;
        }
        Ok(true)
    }

    /// Delete every session file and sidecar; refused while active
    pub fn clear(&mut self) -> Result<usize> {
        if self.is_active() {
            return Err(LoggerError::LoggingActive);
        }
        let deleted = clear_sessions(&self.output_dir, &self.file_prefix)?;
        log::info!("{} log file(s) deleted", deleted);
        Ok(deleted)
    }

    /// Close any open session before exit
    pub fn shutdown(&mut self) -> Result<()> {
        self.stop().map(|_| ())
    }

    fn session_stem(&self, started_at: &DateTime<Local>) -> Result<String> {
        let mut stamp = String::new();
        write!(stamp, "{}", started_at.format(&self.timestamp_format)).map_err(|_| {
            LoggerError::ConfigError(format!(
                "invalid timestamp_format '{}'",
                self.timestamp_format
            ))
        })?;
        Ok(format!("{}_{}", self.file_prefix, stamp))
    }

    fn write_sidecar(&self, summary: &SessionSummary) -> Result<()> {
        let metadata = SessionMetadata::from_summary(summary, self.columns.layout());
        let path = summary.info.output_path.with_extension(METADATA_EXTENSION);
        let json = serde_json::to_string_pretty(&metadata)?;
        std::fs::write(&path, json)?;
        log::debug!("Wrote session metadata {:?}", path);
        Ok(())
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::error!("Failed to close session on drop: {}", e);
        }
    }
}

/// Create `<stem>.csv`, or the first free `<stem>_<n>.csv`
fn create_unique(dir: &Path, stem: &str) -> Result<(String, PathBuf, File)> {
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let id = if attempt == 0 {
            stem.to_string()
        } else {
            format!("{}_{}", stem, attempt)
        };
        let path = dir.join(format!("{}.{}", id, SESSION_EXTENSION));

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((id, path, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Err(LoggerError::IoError(std::io::Error::new(
        ErrorKind::AlreadyExists,
        format!("no free session file name for {} in {:?}", stem, dir),
    )))
}

fn is_session_file(name: &str, prefix: &str, extension: &str) -> bool {
    name.strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('_'))
        .and_then(|rest| rest.strip_suffix(extension))
        .and_then(|rest| rest.strip_suffix('.'))
        .is_some_and(|stamp| !stamp.is_empty())
}

/// List session files in `dir`, sorted by name
pub fn list_sessions(dir: &Path, prefix: &str) -> Result<Vec<SessionEntry>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if !entry.file_type()?.is_file() || !is_session_file(&file_name, prefix, SESSION_EXTENSION) {
            continue;
        }

        let path = entry.path();
        let metadata = read_sidecar(&path.with_extension(METADATA_EXTENSION));
        entries.push(SessionEntry {
            size_bytes: entry.metadata()?.len(),
            path,
            file_name,
            metadata,
        });
    }

    entries.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    Ok(entries)
}

fn read_sidecar(path: &Path) -> Option<SessionMetadata> {
    let content = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&content) {
        Ok(metadata) => Some(metadata),
        Err(e) => {
            log::warn!("Ignoring unreadable session metadata {:?}: {}", path, e);
            None
        }
    }
}

/// Delete session files and their sidecars; returns the number of session files removed
pub fn clear_sessions(dir: &Path, prefix: &str) -> Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }

    let mut deleted = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }

        let file_name = entry.file_name().to_string_lossy().into_owned();
        if is_session_file(&file_name, prefix, SESSION_EXTENSION) {
            std::fs::remove_file(entry.path())?;
            deleted += 1;
        } else if is_session_file(&file_name, prefix, METADATA_EXTENSION) {
            std::fs::remove_file(entry.path())?;
        }
    }
    Ok(deleted)
}
