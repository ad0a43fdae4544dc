use crate::error::SinkError;
use crate::lock_or_recover;
use crate::sample::{column_names, Sample};
use crate::sinks::Sink;
use chrono::SecondsFormat;
use log::{debug, warn};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Header label of the timestamp column
const TIMESTAMP_HEADER: &str = "Timestamp";

/// Appends every batch to a CSV file
///
/// The first write to a missing or empty file emits a header row derived
/// from the batch's column names; later writes append rows only. An
/// existing file's header is reused, so a restarted monitor keeps appending
/// to the same columns. Each row holds one timestamp with an empty cell
/// for columns that have no value at that instant; a repeated column at
/// one timestamp gets a row of its own. Samples for columns not in the
/// header are skipped.
#[derive(Debug)]
pub struct CsvFileSink {
    path: PathBuf,
    columns: Mutex<Option<Vec<String>>>,
}

impl CsvFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            columns: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Header columns of an existing file, if it has any
    fn read_existing_columns(path: &Path) -> Result<Option<Vec<String>>, SinkError> {
        if !path.is_file() || fs::metadata(path)?.len() == 0 {
            return Ok(None);
        }

        let mut header = String::new();
        BufReader::new(fs::File::open(path)?).read_line(&mut header)?;
        let columns: Vec<String> = header
            .trim_end()
            .split(',')
            .skip(1)
            .map(str::to_string)
            .collect();
        Ok(Some(columns))
    }

    /// One CSV line per distinct timestamp, in batch order
    ///
    /// A second value for the same column at the same timestamp starts an
    /// extra line with that timestamp rather than overwriting the first.
    fn format_rows(batch: &[Sample], columns: &[String]) -> Vec<String> {
        let mut rows = Vec::new();
        let mut index = 0;

        while index < batch.len() {
            let timestamp = batch[index].timestamp;
            let stamp = timestamp.to_rfc3339_opts(SecondsFormat::Micros, true);
            let mut cells: Vec<Option<f64>> = vec![None; columns.len()];

            while index < batch.len() && batch[index].timestamp == timestamp {
                let sample = &batch[index];
                match columns.iter().position(|column| column == &sample.name) {
                    Some(position) => {
                        if cells[position].is_some() {
                            debug!(
                                "Duplicate '{}' value at {}, writing an extra row",
                                sample.name, stamp
                            );
                            rows.push(Self::format_row(&stamp, &cells));
                            cells = vec![None; columns.len()];
                        }
                        cells[position] = Some(sample.value);
                    }
                    None => warn!("CSV sink has no column for '{}', value skipped", sample.name),
                }
                index += 1;
            }

            rows.push(Self::format_row(&stamp, &cells));
        }

        rows
    }

    fn format_row(stamp: &str, cells: &[Option<f64>]) -> String {
        let cells: Vec<String> = cells
            .iter()
            .map(|cell| cell.map(|value| value.to_string()).unwrap_or_default())
            .collect();
        format!("{},{}", stamp, cells.join(","))
    }
}

impl Sink for CsvFileSink {
    fn update(&self, batch: &[Sample]) -> Result<(), SinkError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut known_columns = lock_or_recover(&self.columns);
        let (columns, write_header) = match known_columns.as_ref() {
            Some(columns) => (columns.clone(), false),
            None => match Self::read_existing_columns(&self.path)? {
                Some(columns) => (columns, false),
                None => (column_names(batch), true),
            },
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = BufWriter::new(file);

        if write_header {
            debug!("Writing CSV header to {}", self.path.display());
            writeln!(writer, "{},{}", TIMESTAMP_HEADER, columns.join(","))?;
        }
        for row in Self::format_rows(batch, &columns) {
            writeln!(writer, "{}", row)?;
        }
        writer.flush()?;

        // Only remember the header once it is actually on disk
        *known_columns = Some(columns);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use tempfile::TempDir;

    fn at_seconds(seconds: i64) -> chrono::DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(seconds)
    }

    #[test]
    fn test_header_written_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.csv");
        let sink = CsvFileSink::new(&path);

        sink.update(&[Sample::new(at_seconds(0), "a", 1.0)]).unwrap();
        sink.update(&[Sample::new(at_seconds(1), "a", 2.0)]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "Timestamp,a");
        assert_eq!(lines[1], "2023-11-14T22:13:20.000000Z,1");
        assert_eq!(lines[2], "2023-11-14T22:13:21.000000Z,2");
    }

    #[test]
    fn test_rows_pivot_by_timestamp() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wide.csv");
        let sink = CsvFileSink::new(&path);

        sink.update(&[
            Sample::new(at_seconds(0), "a", 1.0),
            Sample::new(at_seconds(0), "b", 2.5),
            Sample::new(at_seconds(1), "b", 3.0),
        ])
        .unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "Timestamp,a,b");
        assert!(lines[1].ends_with(",1,2.5"));
        assert!(lines[2].ends_with(",,3"));
    }

    #[test]
    fn test_duplicate_column_value_gets_own_row() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dup.csv");
        let sink = CsvFileSink::new(&path);

        sink.update(&[
            Sample::new(at_seconds(0), "a", 1.0),
            Sample::new(at_seconds(0), "b", 5.0),
            Sample::new(at_seconds(0), "a", 2.0),
        ])
        .unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "Timestamp,a,b");
        assert_eq!(lines[1], "2023-11-14T22:13:20.000000Z,1,5");
        assert_eq!(lines[2], "2023-11-14T22:13:20.000000Z,2,");
    }

    #[test]
    fn test_existing_file_header_is_reused() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("existing.csv");
        fs::write(&path, "Timestamp,b,a\n").unwrap();

        let sink = CsvFileSink::new(&path);
        sink.update(&[
            Sample::new(at_seconds(0), "a", 1.0),
            Sample::new(at_seconds(0), "c", 9.0),
        ])
        .unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].ends_with(",,1"));
    }

    #[test]
    fn test_empty_batch_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.csv");
        CsvFileSink::new(&path).update(&[]).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_unwritable_path_reports_error() {
        let dir = TempDir::new().unwrap();
        let sink = CsvFileSink::new(dir.path().join("missing").join("log.csv"));
        assert!(sink.update(&[Sample::new(at_seconds(0), "a", 1.0)]).is_err());
    }
}
