use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::processing::crop::DEFAULT_PADDING_PX;
use crate::processing::matcher::DEFAULT_MIN_SIMILARITY;
use crate::processing::verification::LOW_CONFIDENCE_THRESHOLD;
use crate::utils::LabelError;

/// Fields accepted from the extractor. Fields may appear on any label side.
pub const VERIFY_FIELDS: &[&str] = &[
    "brandName",
    "fancifulName",
    "alcoholContent",
    "netContents",
    "classTypeCode",
    "bottlerName",
    "bottlerAddress",
    "governmentWarning",
    "sulfites",
    "countryOfOrigin",
    "wineVintage",
    "grapeVarietal",
    "wineAppellation",
    "ageStatement",
];

/// Prescribed health warning (27 CFR Part 16).
pub const GOVERNMENT_WARNING_TEXT: &str = "GOVERNMENT WARNING: (1) According to the Surgeon General, women should not \
drink alcoholic beverages during pregnancy because of the risk of birth defects. \
(2) Consumption of alcoholic beverages impairs your ability to drive a car or \
operate machinery, and may cause health problems.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub verify_fields: Vec<String>,
    pub min_similarity: f64,
    pub padding_px: i32,
    pub low_score_threshold: f64,
    pub applications_file: PathBuf,
    pub images_dir: PathBuf,
    pub responses_dir: PathBuf,
    pub crops_dir: PathBuf,
    pub results_dir: PathBuf,
    pub events_file: PathBuf,
    pub stats_file: PathBuf,
    /// Presence of this file halts the batch loop between applications.
    pub stop_file: PathBuf,
    pub ocr_language: String,
    pub tessdata_dir: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            verify_fields: VERIFY_FIELDS.iter().map(|f| f.to_string()).collect(),
            min_similarity: DEFAULT_MIN_SIMILARITY,
            padding_px: DEFAULT_PADDING_PX,
            low_score_threshold: LOW_CONFIDENCE_THRESHOLD,
            applications_file: PathBuf::from("data/applications.json"),
            images_dir: PathBuf::from("data/images"),
            responses_dir: PathBuf::from("data/responses"),
            crops_dir: PathBuf::from("output/extracted"),
            results_dir: PathBuf::from("output/results"),
            events_file: PathBuf::from("output/events.json"),
            stats_file: PathBuf::from("output/stats.json"),
            stop_file: PathBuf::from("data/STOP"),
            ocr_language: "eng".to_string(),
            tessdata_dir: None,
        }
    }
}

impl PipelineConfig {
    /// Load from a JSON file; absent keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self, LabelError> {
        let raw = fs::read_to_string(path)
            .map_err(|e| LabelError::ConfigError(format!("Failed to read {}: {}", path.display(), e)))?;
        let config: PipelineConfig = serde_json::from_str(&raw)
            .map_err(|e| LabelError::ConfigError(format!("Invalid config {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), LabelError> {
        if !(0.0..=1.0).contains(&self.min_similarity) {
            return Err(LabelError::ConfigError(format!(
                "min_similarity must be within [0, 1], got {}",
                self.min_similarity
            )));
        }
        if self.padding_px < 0 {
            return Err(LabelError::ConfigError(format!(
                "padding_px must not be negative, got {}",
                self.padding_px
            )));
        }
        Ok(())
    }

    pub fn accepts_field(&self, field_name: &str) -> bool {
        self.verify_fields.iter().any(|f| f == field_name)
    }

    pub fn crop_path(&self, application_id: &str, field_name: &str) -> PathBuf {
        self.crops_dir.join(format!("{}_{}.png", application_id, field_name))
    }
}
