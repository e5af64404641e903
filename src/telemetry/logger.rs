//! # Telemetry Logger
//!
//! Appends applied unit updates to JSONL files.
//!
//! A new file is started after `max_records_per_file` records and only the
//! newest `max_files_to_keep` files are retained. On startup the newest
//! record per unit is read back to seed the device board.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::sink::{DeviceUnit, MeasurementSink, UnitUpdate};
use crate::config::TelemetryConfig;
use crate::error::Result;

/// File name prefix of telemetry files
const FILE_PREFIX: &str = "ecometer_";

/// File name extension of telemetry files
const FILE_EXTENSION: &str = "jsonl";

/// One line of a telemetry file
#[derive(Debug, Serialize)]
struct TelemetryRecord<'a> {
    timestamp: DateTime<Utc>,
    unit: u8,
    name: &'static str,
    value: f64,
    display: &'a str,
}

/// A telemetry line as read back from disk
#[derive(Debug, Deserialize)]
struct StoredRecord {
    timestamp: DateTime<Utc>,
    unit: u8,
    value: f64,
    display: String,
}

/// Rotating JSONL writer
#[derive(Debug)]
pub struct TelemetryLogger {
    dir: PathBuf,
    max_records_per_file: usize,
    max_files_to_keep: usize,
    writer: Option<BufWriter<File>>,
    records_in_file: usize,
    file_seq: u64,
}

impl TelemetryLogger {
    /// Create a logger writing into `dir`, creating it if needed
    pub fn new(
        dir: impl Into<PathBuf>,
        max_records_per_file: usize,
        max_files_to_keep: usize,
    ) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        Ok(Self {
            dir,
            max_records_per_file: max_records_per_file.max(1),
            max_files_to_keep: max_files_to_keep.max(1),
            writer: None,
            records_in_file: 0,
            file_seq: 0,
        })
    }

    /// Create a logger from the telemetry section of the configuration
    pub fn from_config(config: &TelemetryConfig) -> Result<Self> {
        Self::new(&config.log_dir, config.max_records_per_file, config.max_files_to_keep)
    }

    /// Directory the files are written to
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Newest logged update of every unit, in unit order
    ///
    /// Files are replayed oldest first so later records win. Lines that do
    /// not parse, such as a line cut short by a crash, are skipped.
    pub fn latest_updates(&self) -> Result<Vec<UnitUpdate>> {
        let mut files = telemetry_files(&self.dir)?;
        files.sort();

        let mut latest = BTreeMap::new();
        for path in files {
            let reader = BufReader::new(File::open(&path)?);
            for line in reader.lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }

                let record: StoredRecord = match serde_json::from_str(&line) {
                    Ok(record) => record,
                    Err(e) => {
                        warn!("Skipping telemetry line in {}: {}", path.display(), e);
                        continue;
                    }
                };

                let Some(unit) = DeviceUnit::from_number(record.unit) else {
                    warn!("Skipping telemetry record for unknown unit {}", record.unit);
                    continue;
                };

                latest.insert(
                    unit,
                    UnitUpdate {
                        unit,
                        value: record.value,
                        display: record.display,
                        captured_at: record.timestamp,
                    },
                );
            }
        }

        Ok(latest.into_values().collect())
    }

    /// Write one record, rotating first if the current file is full
    pub fn write_update(&mut self, update: &UnitUpdate) -> Result<()> {
        if self.writer.is_none() || self.records_in_file >= self.max_records_per_file {
            self.rotate()?;
        }

        let record = TelemetryRecord {
            timestamp: update.captured_at,
            unit: update.unit.number(),
            name: update.unit.name(),
            value: update.value,
            display: &update.display,
        };

        let line = serde_json::to_string(&record).map_err(std::io::Error::from)?;

        if let Some(writer) = self.writer.as_mut() {
            writeln!(writer, "{}", line)?;
            writer.flush()?;
        }
        self.records_in_file += 1;

        Ok(())
    }

    /// Close the current file and open the next one
    fn rotate(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }

        self.file_seq += 1;
        let name = format!(
            "{}{}_{:04}.{}",
            FILE_PREFIX,
            Utc::now().format("%Y%m%d_%H%M%S"),
            self.file_seq,
            FILE_EXTENSION
        );
        let path = self.dir.join(name);
        debug!("Opening telemetry file {}", path.display());

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        self.writer = Some(BufWriter::new(file));
        self.records_in_file = 0;

        self.prune()
    }

    /// Delete the oldest telemetry files beyond the retention limit
    fn prune(&self) -> Result<()> {
        let mut files = telemetry_files(&self.dir)?;
        if files.len() <= self.max_files_to_keep {
            return Ok(());
        }

        // Names sort chronologically
        files.sort();
        let excess = files.len() - self.max_files_to_keep;
        for path in files.into_iter().take(excess) {
            if let Err(e) = fs::remove_file(&path) {
                warn!("Failed to remove old telemetry file {}: {}", path.display(), e);
            }
        }

        Ok(())
    }
}

impl MeasurementSink for TelemetryLogger {
    fn publish(&mut self, update: UnitUpdate) -> Result<()> {
        self.write_update(&update)
    }
}

/// Telemetry files currently in `dir`
fn telemetry_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_telemetry = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with(FILE_PREFIX) && n.ends_with(FILE_EXTENSION))
            .unwrap_or(false);

        if is_telemetry {
            files.push(path);
        }
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::sink::{DeviceBoard, MockMeasurementSink};
    use tempfile::TempDir;

    fn update(unit: DeviceUnit, value: f64) -> UnitUpdate {
        UnitUpdate {
            unit,
            value,
            display: format!("{:.1}", value),
            captured_at: Utc::now(),
        }
    }

    fn read_lines(dir: &Path) -> Vec<String> {
        let mut files = telemetry_files(dir).unwrap();
        files.sort();
        files
            .iter()
            .flat_map(|f| {
                fs::read_to_string(f)
                    .unwrap()
                    .lines()
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    #[test]
    fn test_writes_jsonl_records() {
        let tmp = TempDir::new().unwrap();
        let mut logger = TelemetryLogger::new(tmp.path(), 100, 5).unwrap();

        logger.publish(update(DeviceUnit::Percentage, 78.1)).unwrap();
        logger.publish(update(DeviceUnit::Temperature, 10.0)).unwrap();

        let lines = read_lines(tmp.path());
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(first["unit"], 1);
        assert_eq!(first["name"], "Percentage");
        assert_eq!(first["value"], 78.1);
        assert_eq!(first["display"], "78.1");
        assert!(first["timestamp"].is_string());
    }

    #[test]
    fn test_rotates_after_max_records() {
        let tmp = TempDir::new().unwrap();
        let mut logger = TelemetryLogger::new(tmp.path(), 2, 10).unwrap();

        for i in 0..5 {
            logger.publish(update(DeviceUnit::Level, i as f64)).unwrap();
        }

        assert_eq!(telemetry_files(tmp.path()).unwrap().len(), 3);
        assert_eq!(read_lines(tmp.path()).len(), 5);
    }

    #[test]
    fn test_prunes_old_files() {
        let tmp = TempDir::new().unwrap();
        let mut logger = TelemetryLogger::new(tmp.path(), 1, 2).unwrap();

        for i in 0..6 {
            logger.publish(update(DeviceUnit::Volume, i as f64)).unwrap();
        }

        assert_eq!(telemetry_files(tmp.path()).unwrap().len(), 2);

        // Newest records survive
        let lines = read_lines(tmp.path());
        let last: serde_json::Value = serde_json::from_str(lines.last().unwrap()).unwrap();
        assert_eq!(last["value"], 5.0);
    }

    #[test]
    fn test_ignores_foreign_files() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("notes.txt"), "keep me").unwrap();

        let mut logger = TelemetryLogger::new(tmp.path(), 1, 1).unwrap();
        logger.publish(update(DeviceUnit::Distance, 1.0)).unwrap();
        logger.publish(update(DeviceUnit::Distance, 2.0)).unwrap();

        assert!(tmp.path().join("notes.txt").exists());
        assert_eq!(telemetry_files(tmp.path()).unwrap().len(), 1);
    }

    #[test]
    fn test_creates_missing_directory() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("nested").join("logs");

        let config = TelemetryConfig {
            enabled: true,
            log_dir: dir.to_string_lossy().into_owned(),
            max_records_per_file: 10,
            max_files_to_keep: 3,
        };

        let logger = TelemetryLogger::from_config(&config).unwrap();
        assert!(dir.is_dir());
        assert_eq!(logger.dir(), dir.as_path());
    }

    #[test]
    fn test_latest_updates_keeps_newest_per_unit() {
        let tmp = TempDir::new().unwrap();
        let mut logger = TelemetryLogger::new(tmp.path(), 2, 10).unwrap();

        logger.publish(update(DeviceUnit::Level, 140.0)).unwrap();
        logger.publish(update(DeviceUnit::Percentage, 78.1)).unwrap();
        logger.publish(update(DeviceUnit::Level, 139.0)).unwrap();
        logger.publish(update(DeviceUnit::Distance, 51.0)).unwrap();
        drop(logger);

        let reopened = TelemetryLogger::new(tmp.path(), 2, 10).unwrap();
        let latest = reopened.latest_updates().unwrap();

        let units: Vec<DeviceUnit> = latest.iter().map(|u| u.unit).collect();
        assert_eq!(
            units,
            vec![DeviceUnit::Percentage, DeviceUnit::Level, DeviceUnit::Distance]
        );
        assert_eq!(latest[0].display, "78.1");
        assert_eq!(latest[1].value, 139.0);
        assert_eq!(latest[2].value, 51.0);
    }

    #[test]
    fn test_latest_updates_skips_bad_lines() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("ecometer_20240501_120000_0001.jsonl"),
            concat!(
                r#"{"timestamp":"2024-05-01T12:00:00Z","unit":4,"value":10.0,"display":"10.0"}"#,
                "\n",
                r#"{"timestamp":"2024-05-01T12:00:00Z","unit":9,"value":1.0,"display":"1"}"#,
                "\n",
                r#"{"timestamp":"2024-05-01T12:00:01Z","unit":4,"val"#,
                "\n",
            ),
        )
        .unwrap();

        let logger = TelemetryLogger::new(tmp.path(), 10, 10).unwrap();
        let latest = logger.latest_updates().unwrap();

        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].unit, DeviceUnit::Temperature);
        assert_eq!(latest[0].value, 10.0);
    }

    #[test]
    fn test_empty_directory_restores_nothing() {
        let tmp = TempDir::new().unwrap();
        let logger = TelemetryLogger::new(tmp.path(), 10, 10).unwrap();
        assert!(logger.latest_updates().unwrap().is_empty());
    }

    #[test]
    fn test_restored_board_skips_unchanged_reading() {
        let tmp = TempDir::new().unwrap();
        let mut logger = TelemetryLogger::new(tmp.path(), 10, 10).unwrap();
        logger.publish(update(DeviceUnit::Volume, 400.0)).unwrap();
        drop(logger);

        let logger = TelemetryLogger::new(tmp.path(), 10, 10).unwrap();
        let mut downstream = MockMeasurementSink::new();
        downstream
            .expect_publish()
            .withf(|u| u.value == 401.0)
            .times(1)
            .returning(|_| Ok(()));

        let mut board = DeviceBoard::with_downstream(Some(downstream));
        for restored in logger.latest_updates().unwrap() {
            board.restore(restored);
        }

        board.publish(update(DeviceUnit::Volume, 400.0)).unwrap();
        board.publish(update(DeviceUnit::Volume, 401.0)).unwrap();
        assert_eq!(board.applied_count(), 1);
    }
}
