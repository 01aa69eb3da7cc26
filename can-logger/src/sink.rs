//! Session file writer
//!
//! A `RecordSink` owns the single open handle of the active session and
//! appends one CSV row per record, flushing after every row.

use crate::config::RecordLayout;
use crate::schema::column_name;
use crate::types::{DecodedRecord, LoggerError, RecordSignals, Result, RAW_MESSAGE_NAME};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Header of the long layout, in order
pub const LONG_HEADER: [&str; 4] = ["Time (s)", "Message Name", "Arbitration ID", "Signals"];

/// Column layout resolved against a schema
#[derive(Debug, Clone)]
pub enum Columns {
    Long,
    Wide {
        /// Signal column names after the fixed columns
        signals: Vec<String>,
        /// Column name -> index into `signals`
        index: HashMap<String, usize>,
    },
}

impl Columns {
    pub fn new(layout: RecordLayout, signal_columns: Vec<String>) -> Self {
        match layout {
            RecordLayout::Long => Columns::Long,
            RecordLayout::Wide => {
                // Same-named signals of same-named messages share one column
                let mut signals = Vec::with_capacity(signal_columns.len());
                let mut index = HashMap::with_capacity(signal_columns.len());
                for name in signal_columns {
                    if index.contains_key(&name) {
                        log::warn!("Duplicate signal column {}, keeping one", name);
                        continue;
                    }
                    index.insert(name.clone(), signals.len());
                    signals.push(name);
                }
                Columns::Wide { signals, index }
            }
        }
    }

    pub fn layout(&self) -> RecordLayout {
        match self {
            Columns::Long => RecordLayout::Long,
            Columns::Wide { .. } => RecordLayout::Wide,
        }
    }

    /// Header row for this layout
    pub fn header(&self) -> Vec<String> {
        match self {
            Columns::Long => LONG_HEADER.iter().map(|s| s.to_string()).collect(),
            Columns::Wide { signals, .. } => {
                let mut header = vec![
                    "Time (s)".to_string(),
                    "Arbitration ID".to_string(),
                    RAW_MESSAGE_NAME.to_string(),
                ];
                header.extend(signals.iter().cloned());
                header
            }
        }
    }

    /// Render one record as a row
    pub fn row(&self, record: &DecodedRecord) -> Vec<String> {
        match self {
            Columns::Long => vec![
                record.time_display(),
                record.message_name.clone(),
                record.identifier_display.clone(),
                record.signals.to_string(),
            ],
            Columns::Wide { signals, index } => {
                let mut row = vec![String::new(); 3 + signals.len()];
                row[0] = record.time_display();
                row[1] = record.identifier_display.clone();

                match &record.signals {
                    RecordSignals::Raw(hex) => row[2] = hex.clone(),
                    RecordSignals::Decoded(decoded) => {
                        for signal in decoded {
                            let key = column_name(&record.message_name, &signal.name);
                            match index.get(&key) {
                                Some(&i) => row[3 + i] = signal.value.to_string(),
                                None => log::trace!("No column for {}", key),
                            }
                        }
                    }
                }
                row
            }
        }
    }
}

/// Append-only writer for one session file
pub struct RecordSink {
    path: PathBuf,
    columns: Columns,
    writer: Option<csv::Writer<File>>,
}

impl RecordSink {
    /// Create `path` (which must not exist) and write the header row
    pub fn create(path: &Path, columns: Columns) -> Result<Self> {
        let file = OpenOptions::new().write(true).create_new(true).open(path)?;
        Self::from_file(path, file, columns)
    }

    /// Wrap an already created, empty file and write the header row
    pub fn from_file(path: &Path, file: File, columns: Columns) -> Result<Self> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer.write_record(columns.header())?;
        writer.flush()?;

        log::debug!("Opened session file {:?} ({} layout)", path, columns.layout());

        Ok(Self {
            path: path.to_path_buf(),
            columns,
            writer: Some(writer),
        })
    }

    /// Append one record and flush it to the OS
    pub fn append(&mut self, record: &DecodedRecord) -> Result<()> {
        let writer = self.writer.as_mut().ok_or_else(|| {
            LoggerError::IoError(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                format!("session file {:?} is closed", self.path),
            ))
        })?;

        writer.write_record(self.columns.row(record))?;
        writer.flush()?;
        Ok(())
    }

    /// Flush, sync and release the handle; calling it again is a no-op
    pub fn close(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            let file = writer.into_inner().map_err(|e| e.into_error())?;
            file.sync_all()?;
            log::debug!("Closed session file {:?}", self.path);
        }
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RecordSink {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::error!("Failed to close session file {:?}: {}", self.path, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DecodedSignal, SignalValue};
    use tempfile::TempDir;

    fn decoded_record(time: f64) -> DecodedRecord {
        DecodedRecord {
            relative_time: time,
            message_name: "EngineData".to_string(),
            identifier_display: "0x100".to_string(),
            signals: RecordSignals::Decoded(vec![
                DecodedSignal::new("rpm", SignalValue::Integer(3000)),
                DecodedSignal::new("temp", SignalValue::Float(80.5)),
            ]),
        }
    }

    fn raw_record(time: f64) -> DecodedRecord {
        DecodedRecord {
            relative_time: time,
            message_name: RAW_MESSAGE_NAME.to_string(),
            identifier_display: "0x999".to_string(),
            signals: RecordSignals::Raw("deadbeef".to_string()),
        }
    }

    #[test]
    fn test_long_layout_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.csv");

        let mut sink = RecordSink::create(&path, Columns::Long).unwrap();
        sink.append(&decoded_record(0.25)).unwrap();
        sink.append(&raw_record(0.5)).unwrap();

        // Rows are flushed before close
        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "Time (s),Message Name,Arbitration ID,Signals");
        assert_eq!(lines[1], "0.250000,EngineData,0x100,\"{rpm: 3000, temp: 80.5}\"");
        assert_eq!(lines[2], "0.500000,RAW_MSG,0x999,deadbeef");

        sink.close().unwrap();
    }

    #[test]
    fn test_wide_layout_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wide.csv");
        let columns = Columns::new(
            RecordLayout::Wide,
            vec![
                "EngineData_rpm".to_string(),
                "EngineData_temp".to_string(),
                "Brake_pressure".to_string(),
            ],
        );

        let mut sink = RecordSink::create(&path, columns).unwrap();
        sink.append(&decoded_record(0.1)).unwrap();
        sink.append(&raw_record(0.2)).unwrap();
        sink.close().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines[0],
            "Time (s),Arbitration ID,RAW_MSG,EngineData_rpm,EngineData_temp,Brake_pressure"
        );
        assert_eq!(lines[1], "0.100000,0x100,,3000,80.5,");
        assert_eq!(lines[2], "0.200000,0x999,deadbeef,,,");
    }

    #[test]
    fn test_wide_layout_merges_duplicate_columns() {
        let columns = Columns::new(
            RecordLayout::Wide,
            vec![
                "EngineData_rpm".to_string(),
                "EngineData_temp".to_string(),
                "EngineData_rpm".to_string(),
            ],
        );

        assert_eq!(
            columns.header(),
            vec!["Time (s)", "Arbitration ID", "RAW_MSG", "EngineData_rpm", "EngineData_temp"]
        );
        let row = columns.row(&decoded_record(0.1));
        assert_eq!(row, vec!["0.100000", "0x100", "", "3000", "80.5"]);
    }

    #[test]
    fn test_close_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.csv");

        let mut sink = RecordSink::create(&path, Columns::Long).unwrap();
        assert!(sink.is_open());
        sink.close().unwrap();
        sink.close().unwrap();
        assert!(!sink.is_open());
        assert!(sink.append(&raw_record(1.0)).is_err());
    }

    #[test]
    fn test_create_refuses_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.csv");
        std::fs::write(&path, "keep me").unwrap();

        assert!(RecordSink::create(&path, Columns::Long).is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "keep me");
    }
}
