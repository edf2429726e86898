use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::data::{FieldOutcome, Side, VerificationScore};

/// One application listed in the manifest, image names relative to the images dir.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationEntry {
    pub application_id: String,
    #[serde(default)]
    pub front_image: Option<String>,
    #[serde(default)]
    pub back_image: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    Pending,
    Processing,
    Processed,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRecord {
    pub text: String,
    pub confidence: f64,
    pub side: Side,
    pub region_bbox: Option<[i32; 4]>,
    pub rotation_degrees: f64,
    pub crop_path: Option<PathBuf>,
    pub ocr_text: Option<String>,
    pub ocr_match_score: Option<f64>,
}

impl FieldRecord {
    pub fn from_outcome(outcome: &FieldOutcome) -> Self {
        Self {
            text: outcome.field.text.clone(),
            confidence: outcome.field.confidence,
            side: outcome.side,
            region_bbox: outcome.bbox.map(|b| b.to_array()),
            rotation_degrees: outcome.bbox.map(|b| b.rotation_degrees).unwrap_or(0.0),
            crop_path: outcome.crop.artifact().map(|a| a.path.clone()),
            ocr_text: None,
            ocr_match_score: None,
        }
    }

    pub fn apply_verification(&mut self, score: &VerificationScore) {
        self.ocr_text = Some(score.ocr_text.clone());
        self.ocr_match_score = Some(score.match_score);
    }

    /// A field whose crop is gone has no score, not a stale one.
    pub fn clear_verification(&mut self) {
        self.ocr_text = None;
        self.ocr_match_score = None;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub application_id: String,
    pub status: ApplicationStatus,
    pub processed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldRecord>,
}

impl ApplicationRecord {
    pub fn new(application_id: impl Into<String>, status: ApplicationStatus) -> Self {
        Self {
            application_id: application_id.into(),
            status,
            processed_at: None,
            error_message: None,
            fields: BTreeMap::new(),
        }
    }

    /// An extraction failure keeps no partial field data.
    pub fn failed(application_id: impl Into<String>, message: impl Into<String>) -> Self {
        let mut record = Self::new(application_id, ApplicationStatus::Error);
        record.processed_at = Some(Utc::now());
        record.error_message = Some(message.into());
        record
    }

    pub fn processed(application_id: impl Into<String>, outcomes: &[FieldOutcome]) -> Self {
        let mut record = Self::new(application_id, ApplicationStatus::Processed);
        record.processed_at = Some(Utc::now());
        for outcome in outcomes {
            record
                .fields
                .insert(outcome.field.name.clone(), FieldRecord::from_outcome(outcome));
        }
        record
    }
}
