use log::debug;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::models::{ApplicationEntry, ApplicationRecord, ApplicationStatus};
use crate::utils::LabelError;

/// Read the application manifest: a JSON array of entries.
pub fn load_applications(path: &Path) -> Result<Vec<ApplicationEntry>, LabelError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| LabelError::StoreError(format!("Failed to read manifest {}: {}", path.display(), e)))?;
    serde_json::from_str(&raw)
        .map_err(|e| LabelError::StoreError(format!("Invalid manifest {}: {}", path.display(), e)))
}

/// One JSON document per application under a results directory.
pub struct JsonRecordStore {
    dir: PathBuf,
}

impl JsonRecordStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, application_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", application_id))
    }

    pub fn load(&self, application_id: &str) -> Result<Option<ApplicationRecord>, LabelError> {
        let path = self.record_path(application_id);
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)?;
        let record = serde_json::from_str(&raw)
            .map_err(|e| LabelError::StoreError(format!("Corrupt record {}: {}", path.display(), e)))?;
        Ok(Some(record))
    }

    pub fn status(&self, application_id: &str) -> Result<ApplicationStatus, LabelError> {
        Ok(self
            .load(application_id)?
            .map(|r| r.status)
            .unwrap_or(ApplicationStatus::Pending))
    }

    /// Write through a temp file in the same directory so readers never see a partial record.
    pub fn save(&self, record: &ApplicationRecord) -> Result<(), LabelError> {
        fs::create_dir_all(&self.dir)?;
        let body = serde_json::to_string_pretty(record)
            .map_err(|e| LabelError::StoreError(format!("Failed to encode {}: {}", record.application_id, e)))?;

        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(body.as_bytes())?;
        let path = self.record_path(&record.application_id);
        tmp.persist(&path)
            .map_err(|e| LabelError::StoreError(format!("Failed to write {}: {}", path.display(), e)))?;
        debug!("Saved record {} ({:?})", record.application_id, record.status);
        Ok(())
    }

    pub fn mark_processing(&self, application_id: &str) -> Result<(), LabelError> {
        self.save(&ApplicationRecord::new(application_id, ApplicationStatus::Processing))
    }

    /// Returns whether a record existed.
    pub fn delete(&self, application_id: &str) -> Result<bool, LabelError> {
        let path = self.record_path(application_id);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)?;
        Ok(true)
    }

    /// All stored records, ordered by application id. Unreadable files are skipped.
    pub fn list(&self) -> Result<Vec<ApplicationRecord>, LabelError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut records = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match self.load(id) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => debug!("Skipping {}: {}", path.display(), e),
            }
        }
        records.sort_by(|a, b| a.application_id.cmp(&b.application_id));
        Ok(records)
    }
}
