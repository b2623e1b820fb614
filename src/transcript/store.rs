use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use tracing::{debug, info};
use walkdir::WalkDir;

use super::types::SessionMetrics;
use crate::error::Result;

/// Save a captured pane as `<task_id>_<YYYYmmdd>_<HHMMSS>.log` under `dir`.
///
/// The header carries the task id and capture time; the parser reads the
/// latter back as the session end.
pub fn write_transcript(
    dir: &Path,
    task_id: &str,
    content: &str,
    captured_at: DateTime<Local>,
) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;

    let path = dir.join(format!(
        "{}_{}.log",
        task_id,
        captured_at.format("%Y%m%d_%H%M%S")
    ));

    let mut file = BufWriter::new(File::create(&path)?);
    writeln!(file, "# Task: {task_id}")?;
    writeln!(file, "# Captured at: {}", captured_at.to_rfc3339())?;
    writeln!(file)?;
    file.write_all(content.as_bytes())?;
    if !content.ends_with('\n') {
        writeln!(file)?;
    }
    file.flush()?;

    info!(path = %path.display(), "transcript written");
    Ok(path)
}

/// All `.log` files under `dir`, sorted by path. A missing directory yields
/// nothing.
pub fn collect_session_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!(error = %e, "skipping unreadable entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "log"))
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    files
}

/// Identifies where a [`SessionMetrics`] came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSource {
    pub task_id: String,
    pub session_id: String,
    pub file_path: Option<PathBuf>,
}

impl MetricsSource {
    pub fn new(metrics: &SessionMetrics, file_path: Option<&Path>) -> Self {
        Self {
            task_id: metrics.task_id.clone(),
            session_id: metrics.session_id.clone(),
            file_path: file_path.map(Path::to_path_buf),
        }
    }
}

/// Somewhere finalised metrics are kept for later analysis.
pub trait MetricsSink {
    fn store(&mut self, metrics: &SessionMetrics, source: &MetricsSource) -> Result<()>;
}

#[derive(Serialize)]
struct StoredMetrics<'a> {
    stored_at: DateTime<Utc>,
    source: &'a MetricsSource,
    metrics: &'a SessionMetrics,
}

/// Appends one JSON object per session to a file.
pub struct JsonlMetricsSink {
    writer: BufWriter<File>,
    path: PathBuf,
}

impl JsonlMetricsSink {
    /// Open `path` for appending, creating it and its parent directory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            path,
        })
    }
}

impl MetricsSink for JsonlMetricsSink {
    fn store(&mut self, metrics: &SessionMetrics, source: &MetricsSource) -> Result<()> {
        let record = StoredMetrics {
            stored_at: Utc::now(),
            source,
            metrics,
        };
        serde_json::to_writer(&mut self.writer, &record)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        debug!(path = %self.path.display(), task = %metrics.task_id, "stored session metrics");
        Ok(())
    }
}
