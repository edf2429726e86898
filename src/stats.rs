use chrono::{DateTime, NaiveDate, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const MAX_LOG_ENTRIES: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatsAction {
    Processed,
    Error,
    Clear,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsEntry {
    pub timestamp: DateTime<Utc>,
    pub application_id: Option<String>,
    pub action: StatsAction,
    pub message: String,
}

/// Status counts over the manifest, stamped with the day they were taken.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSummary {
    pub date: Option<NaiveDate>,
    pub total_processed: usize,
    pub total_pending: usize,
    pub total_errors: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StatsFile {
    #[serde(default)]
    summary: StatsSummary,
    #[serde(default)]
    log: Vec<StatsEntry>,
}

/// Per-application action log plus summary counts, kept in one JSON file
/// for dashboards to poll.
pub struct StatsLog {
    path: PathBuf,
    data: StatsFile,
}

impl StatsLog {
    /// Open the file at `path`. A missing or corrupt file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let data = fs::read_to_string(&path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();
        Self { path, data }
    }

    pub fn summary(&self) -> &StatsSummary {
        &self.data.summary
    }

    /// Newest first.
    pub fn entries(&self) -> &[StatsEntry] {
        &self.data.log
    }

    pub fn log_action(&mut self, application_id: Option<&str>, action: StatsAction, message: impl Into<String>) {
        self.data.log.insert(
            0,
            StatsEntry {
                timestamp: Utc::now(),
                application_id: application_id.map(str::to_string),
                action,
                message: message.into(),
            },
        );
        self.data.log.truncate(MAX_LOG_ENTRIES);
        self.save();
    }

    pub fn update_summary(&mut self, processed: usize, pending: usize, errors: usize) {
        self.data.summary = StatsSummary {
            date: Some(Utc::now().date_naive()),
            total_processed: processed,
            total_pending: pending,
            total_errors: errors,
        };
        self.save();
    }

    /// Drop the log, keeping the summary.
    pub fn clear_log(&mut self) {
        self.data.log.clear();
        self.save();
    }

    fn save(&self) {
        if let Err(e) = write_atomic(&self.path, &self.data) {
            warn!("Failed to write stats to {}: {}", self.path.display(), e);
        }
    }
}

fn write_atomic(path: &Path, data: &StatsFile) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    let body = serde_json::to_string_pretty(data)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(body.as_bytes())?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
