use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::PipelineConfig;
use crate::models::*;
use crate::processing::*;

/// One label image and the regions recognized on it.
#[derive(Debug, Clone, Default)]
pub struct LabelSide {
    pub image: Option<PathBuf>,
    pub regions: Vec<OcrRegion>,
}

impl LabelSide {
    pub fn new(image: Option<PathBuf>, regions: Vec<OcrRegion>) -> Self {
        Self { image, regions }
    }

    /// Run the recognizer over the image, if there is one.
    pub fn recognize<R: TextRecognizer + ?Sized>(image: Option<PathBuf>, recognizer: &mut R) -> Self {
        let regions = match &image {
            Some(path) => recognizer.recognize(path),
            None => Vec::new(),
        };
        Self { image, regions }
    }

    fn is_searchable(&self) -> bool {
        self.image.is_some() && !self.regions.is_empty()
    }
}

/// Matches, merges and crops the extracted fields of one application.
pub struct LabelProcessor {
    config: PipelineConfig,
}

impl LabelProcessor {
    pub fn new(config: PipelineConfig) -> Self {
        LabelProcessor { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn process_fields(
        &self,
        application_id: &str,
        fields: &[FieldExtraction],
        front: &LabelSide,
        back: &LabelSide,
    ) -> Vec<FieldOutcome> {
        let mut outcomes = Vec::new();
        for field in fields {
            if !self.config.accepts_field(&field.name) {
                debug!("{}: ignoring unlisted field {}", application_id, field.name);
                continue;
            }
            outcomes.push(self.process_field(application_id, field, front, back));
        }

        let cropped = outcomes.iter().filter(|o| o.crop.artifact().is_some()).count();
        info!(
            "{}: {} fields, {} matched, {} cropped",
            application_id,
            outcomes.len(),
            outcomes.iter().filter(|o| o.matched()).count(),
            cropped
        );
        outcomes
    }

    fn process_field(
        &self,
        application_id: &str,
        field: &FieldExtraction,
        front: &LabelSide,
        back: &LabelSide,
    ) -> FieldOutcome {
        // A back-side field with no back image can only be on the front
        let declared = match field.side {
            Side::Back if back.image.is_some() => Side::Back,
            _ => Side::Front,
        };
        let pick = |side: Side| match side {
            Side::Front => front,
            Side::Back => back,
        };

        let mut side = declared;
        let mut regions =
            RegionMatcher::find_regions(&field.text, &pick(side).regions, self.config.min_similarity);

        if regions.is_empty() && pick(declared.other()).is_searchable() {
            let alternate = RegionMatcher::find_regions(
                &field.text,
                &pick(declared.other()).regions,
                self.config.min_similarity,
            );
            if !alternate.is_empty() {
                debug!("{}: {} found on {} side instead of {}", application_id, field.name, declared.other(), declared);
                side = declared.other();
                regions = alternate;
            }
        }

        let output = self.config.crop_path(application_id, &field.name);
        let bbox = GeometryMerger::merge(&regions);
        let crop = match (&bbox, pick(side).image.as_deref()) {
            (None, _) => {
                debug!("{}: no regions matched for {}", application_id, field.name);
                remove_stale_crop(&output);
                CropStatus::NoMatch
            }
            (Some(_), None) => {
                remove_stale_crop(&output);
                CropStatus::Failed(format!("no {} image", side))
            }
            (Some(bbox), Some(source)) => {
                match CropNormalizer::crop_to_file(source, bbox, self.config.padding_px, &output) {
                    Ok(artifact) => CropStatus::Saved(artifact),
                    Err(e) => {
                        warn!("{}: crop failed for {}: {}", application_id, field.name, e);
                        remove_stale_crop(&output);
                        CropStatus::Failed(e.to_string())
                    }
                }
            }
        };

        FieldOutcome {
            field: field.clone(),
            regions,
            bbox,
            crop,
            side,
        }
    }

    /// Independent confidence pass over one field's crop.
    pub fn verify_field<R: TextRecognizer + ?Sized>(
        &self,
        recognizer: &mut R,
        field_name: &str,
        crop_path: Option<&Path>,
        original_text: &str,
    ) -> Option<VerificationScore> {
        let score = VerificationScorer::verify(recognizer, crop_path, original_text)?;
        VerificationScorer::report(field_name, original_text, &score, self.config.low_score_threshold);
        Some(score)
    }
}

fn remove_stale_crop(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_file(path) {
            warn!("Failed to remove stale crop {}: {}", path.display(), e);
        }
    }
}
