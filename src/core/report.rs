//! Result aggregation and report output
//!
//! A [`ResultSet`] is rendered as:
//! - monitoring "sender file" lines (`"<host>" rec_card[volt,1] 5.0`)
//! - rows of a per-run CSV log
//! - a JSON document

use crate::core::poller::{CommandReadings, CycleStats, ResultSet};
use crate::core::protocol::DecoderKind;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Default folder for CSV logs
pub const DEFAULT_CSV_DIR: &str = "csv";

/// Operator recorded when none is configured
pub const UNKNOWN_OPERATOR: &str = "n/a";

/// Header row of CSV logs
pub const CSV_HEADER: &str = "timestamp,hostname,command,card,field,valid,value,operator";

const CSV_FILE_FORMAT: &str = "%Y-%m-%d %H-%M-%S";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Report error types
#[derive(Error, Debug)]
pub enum ReportError {
    /// Writing a report file failed
    #[error("Cannot write {path}: {source}")]
    Io {
        /// File or folder being written
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// JSON serialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ReportError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Sender file lines for a cycle's readings.
///
/// Scan card readings are numbered from 1 by card index. The hostname is
/// quoted so it may contain spaces.
pub fn sender_lines(hostname: &str, results: &ResultSet) -> Vec<String> {
    let mut lines = Vec::with_capacity(results.len());

    for command in results.commands() {
        for reading in &command.readings {
            for field in reading.telemetry.fields() {
                let key = match command.kind {
                    DecoderKind::Composite => format!("mfun_card[{}]", field.name),
                    _ => format!("rec_card[{},{}]", field.name, u16::from(reading.card) + 1),
                };
                lines.push(format!("\"{hostname}\" {key} {}", field.value));
            }
        }
    }

    lines
}

/// Replace the sender file with this cycle's lines
pub fn write_sender_file(
    path: &Path,
    hostname: &str,
    results: &ResultSet,
) -> Result<usize, ReportError> {
    let lines = sender_lines(hostname, results);

    let mut contents = String::new();
    for line in &lines {
        contents.push_str(line);
        contents.push('\n');
    }

    fs::write(path, contents).map_err(|e| ReportError::io(path, e))?;
    info!("Wrote {} line(s) to {}", lines.len(), path.display());
    Ok(lines.len())
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// CSV rows for a cycle's readings, one per reported quantity
pub fn csv_rows(
    timestamp: &DateTime<Local>,
    hostname: &str,
    operator: &str,
    results: &ResultSet,
) -> Vec<String> {
    let timestamp = timestamp.format(TIMESTAMP_FORMAT).to_string();
    let operator = if operator.is_empty() {
        UNKNOWN_OPERATOR
    } else {
        operator
    };

    let mut rows = Vec::new();
    for command in results.commands() {
        for reading in &command.readings {
            for field in reading.telemetry.fields() {
                rows.push(format!(
                    "{},{},{},{},{},{},{},{}",
                    timestamp,
                    csv_field(hostname),
                    csv_field(&command.command),
                    reading.card,
                    field.name,
                    field.valid,
                    field.value,
                    csv_field(operator),
                ));
            }
        }
    }
    rows
}

/// CSV log of one run
pub struct CsvLog {
    file: BufWriter<File>,
    path: PathBuf,
    rows: usize,
}

impl CsvLog {
    /// Create a new log in `dir`, named after the current time
    pub fn create(dir: &Path) -> Result<Self, ReportError> {
        Self::create_at(dir, &Local::now())
    }

    /// Create a new log in `dir`, named after `started`
    pub fn create_at(dir: &Path, started: &DateTime<Local>) -> Result<Self, ReportError> {
        fs::create_dir_all(dir).map_err(|e| ReportError::io(dir, e))?;

        let path = dir.join(format!("{}.csv", started.format(CSV_FILE_FORMAT)));
        let file = File::create(&path).map_err(|e| ReportError::io(&path, e))?;

        let mut log = Self {
            file: BufWriter::new(file),
            path,
            rows: 0,
        };
        log.write_line(CSV_HEADER)?;
        log.flush()?;
        debug!("CSV log {}", log.path.display());
        Ok(log)
    }

    fn write_line(&mut self, line: &str) -> Result<(), ReportError> {
        writeln!(self.file, "{line}").map_err(|e| ReportError::io(&self.path, e))
    }

    fn flush(&mut self) -> Result<(), ReportError> {
        self.file.flush().map_err(|e| ReportError::io(&self.path, e))
    }

    /// Append a cycle's readings and flush
    pub fn append(
        &mut self,
        timestamp: &DateTime<Local>,
        hostname: &str,
        operator: &str,
        results: &ResultSet,
    ) -> Result<usize, ReportError> {
        let rows = csv_rows(timestamp, hostname, operator, results);
        for row in &rows {
            self.write_line(row)?;
        }
        self.flush()?;
        self.rows += rows.len();
        Ok(rows.len())
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows written so far, header excluded
    pub fn rows(&self) -> usize {
        self.rows
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    hostname: &'a str,
    timestamp: String,
    commands: &'a [CommandReadings],
    stats: CycleStats,
}

/// JSON document for a cycle's readings
pub fn to_json(
    timestamp: &DateTime<Local>,
    hostname: &str,
    results: &ResultSet,
) -> Result<String, ReportError> {
    let report = JsonReport {
        hostname,
        timestamp: timestamp.to_rfc3339(),
        commands: results.commands(),
        stats: results.stats(),
    };
    Ok(serde_json::to_string_pretty(&report)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::poller::CardReading;
    use crate::core::protocol::{
        decode_humidity, decode_temperature, decode_voltage, CommandSet, CompositeReading,
        Telemetry,
    };
    use chrono::TimeZone;

    fn results() -> ResultSet {
        let set = CommandSet::builtin();
        let temp = set.find("TempValidOfScanCard").unwrap();
        let volt = set.find("VoltageOfScanCard").unwrap();
        let mfun = set.find("FuncTempHumVolt").unwrap();

        let mut results = ResultSet::new();
        results.push(
            temp,
            CardReading {
                card: 0,
                telemetry: Telemetry::Temperature(decode_temperature(0x0056)),
            },
        );
        results.push(
            temp,
            CardReading {
                card: 2,
                telemetry: Telemetry::Temperature(decode_temperature(0x0001)),
            },
        );
        results.push(
            volt,
            CardReading {
                card: 0,
                telemetry: Telemetry::Voltage(decode_voltage(0x00B2)),
            },
        );
        results.push(
            mfun,
            CardReading {
                card: 0,
                telemetry: Telemetry::Composite(CompositeReading {
                    volt: decode_voltage(0x0032),
                    humidity: decode_humidity(0x00AD),
                    temperature: decode_temperature(0x002A),
                }),
            },
        );
        results
    }

    fn timestamp() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap()
    }

    #[test]
    fn test_sender_lines() {
        let lines = sender_lines("M700 Ticker", &results());
        assert_eq!(
            lines,
            [
                "\"M700 Ticker\" rec_card[temperature,1] +43",
                "\"M700 Ticker\" rec_card[temperature,3] -0",
                "\"M700 Ticker\" rec_card[volt,1] 5.0",
                "\"M700 Ticker\" mfun_card[volt] 5.0",
                "\"M700 Ticker\" mfun_card[temperature] +21",
                "\"M700 Ticker\" mfun_card[humidity] 45",
            ]
        );
    }

    #[test]
    fn test_sender_lines_empty() {
        assert!(sender_lines("host", &ResultSet::new()).is_empty());
    }

    #[test]
    fn test_write_sender_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("senderfile.txt");
        fs::write(&path, "stale\n").unwrap();

        let written = write_sender_file(&path, "host", &results()).unwrap();
        assert_eq!(written, 6);

        let contents = fs::read_to_string(&path).unwrap();
        assert!(!contents.contains("stale"));
        assert_eq!(contents.lines().count(), 6);
        assert!(contents.ends_with("mfun_card[humidity] 45\n"));
    }

    #[test]
    fn test_csv_rows() {
        let rows = csv_rows(&timestamp(), "host, left", "", &results());
        assert_eq!(rows.len(), 6);
        assert_eq!(
            rows[0],
            "2024-03-05 14:07:09,\"host, left\",TempValidOfScanCard,0,temperature,,+43,n/a"
        );
        assert_eq!(
            rows[3],
            "2024-03-05 14:07:09,\"host, left\",FuncTempHumVolt,0,volt,KO,5.0,n/a"
        );
        assert!(rows[5].ends_with("humidity,Ok,45,n/a"));
    }

    #[test]
    fn test_csv_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let csv_dir = dir.path().join(DEFAULT_CSV_DIR);

        let mut log = CsvLog::create_at(&csv_dir, &timestamp()).unwrap();
        assert_eq!(log.path(), csv_dir.join("2024-03-05 14-07-09.csv"));

        assert_eq!(log.append(&timestamp(), "host", "JD", &results()).unwrap(), 6);
        assert_eq!(log.rows(), 6);

        let contents = fs::read_to_string(log.path()).unwrap();
        let mut lines = contents.lines();
        assert_eq!(lines.next(), Some(CSV_HEADER));
        assert_eq!(lines.count(), 6);
    }

    #[test]
    fn test_json() {
        let json = to_json(&timestamp(), "host", &results()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["hostname"], "host");
        assert_eq!(value["commands"][0]["command"], "TempValidOfScanCard");
        assert_eq!(value["commands"][0]["kind"], "temperature");
        assert_eq!(value["commands"][0]["readings"][1]["card"], 2);
        assert_eq!(value["commands"][0]["readings"][1]["value"], "-0");
        assert_eq!(value["commands"][2]["readings"][0]["humidity"]["value"], 45);
        assert_eq!(value["stats"]["requests"], 0);
    }
}
