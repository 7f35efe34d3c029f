//! Structured failure recording.
//!
//! Every reference the pipeline cannot fully resolve is appended to a monthly
//! line log and a companion CSV, one row per failure. Rows are append-only and
//! never rewritten. The recorder is injected behind a one-method trait so the
//! orchestrator stays writable-sink-agnostic and tests collect in memory.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const CSV_HEADER: [&str; 7] = [
    "date",
    "sku",
    "product_name",
    "drive_file_id",
    "drive_name",
    "expected_url",
    "reason",
];

/// One failure row. Field order matches the CSV header.
#[derive(Debug, Clone, Serialize)]
pub struct ResolutionRecord {
    pub date: String,
    pub sku: String,
    pub product_name: String,
    pub drive_file_id: String,
    pub drive_name: Option<String>,
    pub expected_url: Option<String>,
    pub reason: String,
}

pub trait FailureSink: Send + Sync {
    fn record(&self, rec: &ResolutionRecord) -> Result<()>;
}

/// Appends to `drive_relink_YYYY-MM.log` / `.csv` under the report directory.
/// Directory creation happens at construction and is the one fatal condition
/// in the system: a report that cannot be written must surface to the
/// operator, not be masked.
pub struct FileReporter {
    dir: PathBuf,
}

impl FileReporter {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating report directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn month_path(&self, ext: &str) -> PathBuf {
        self.dir
            .join(format!("drive_relink_{}.{ext}", Utc::now().format("%Y-%m")))
    }

    fn append_log_line(&self, path: &Path, rec: &ResolutionRecord) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening {}", path.display()))?;
        writeln!(
            file,
            "[{}] sku={} product={:?} file_id={} name={} url={} reason={}",
            rec.date,
            rec.sku,
            rec.product_name,
            rec.drive_file_id,
            rec.drive_name.as_deref().unwrap_or("-"),
            rec.expected_url.as_deref().unwrap_or("-"),
            rec.reason
        )
        .with_context(|| format!("appending to {}", path.display()))?;
        Ok(())
    }

    fn append_csv_row(&self, path: &Path, rec: &ResolutionRecord) -> Result<()> {
        let new_file = !path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening {}", path.display()))?;
        let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        if new_file {
            wtr.write_record(CSV_HEADER)?;
        }
        wtr.serialize(rec)?;
        wtr.flush()
            .with_context(|| format!("flushing {}", path.display()))?;
        Ok(())
    }
}

impl FailureSink for FileReporter {
    fn record(&self, rec: &ResolutionRecord) -> Result<()> {
        self.append_log_line(&self.month_path("log"), rec)?;
        self.append_csv_row(&self.month_path("csv"), rec)?;
        Ok(())
    }
}

/// Test double: collects records in memory.
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<ResolutionRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<ResolutionRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl FailureSink for MemorySink {
    fn record(&self, rec: &ResolutionRecord) -> Result<()> {
        if let Ok(mut records) = self.records.lock() {
            records.push(rec.clone());
        }
        Ok(())
    }
}
