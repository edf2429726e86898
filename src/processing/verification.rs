use log::{info, warn};
use std::path::Path;

use super::ocr::TextRecognizer;
use super::similarity::SimilarityScorer;
use crate::models::VerificationScore;

pub const LOW_CONFIDENCE_THRESHOLD: f64 = 0.5;

/// VerificationScorer re-reads a crop and scores it against the field text.
pub struct VerificationScorer;

impl VerificationScorer {
    /// Score a crop against the original field text. `None` when there is no
    /// crop to read, which is not the same as a zero score.
    pub fn verify<R: TextRecognizer + ?Sized>(
        recognizer: &mut R,
        crop_path: Option<&Path>,
        original_text: &str,
    ) -> Option<VerificationScore> {
        let crop_path = crop_path?;
        if !crop_path.exists() {
            warn!("Crop {} is gone, skipping verification", crop_path.display());
            return None;
        }

        let mut regions = recognizer.recognize(crop_path);
        regions.sort_by_key(|r| r.reading_key());
        let ocr_text = regions
            .iter()
            .map(|r| r.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        let match_score = SimilarityScorer::score(original_text, &ocr_text);
        Some(VerificationScore {
            ocr_text,
            match_score,
        })
    }

    /// Log a score, surfacing low confidence distinctly.
    pub fn report(field_name: &str, original_text: &str, score: &VerificationScore, threshold: f64) {
        if score.is_low_confidence(threshold) {
            warn!(
                "{}: {:.0}% *** LOW MATCH\n    Extracted: {}\n    OCR:       {}",
                field_name,
                score.match_score * 100.0,
                truncate(original_text, 80),
                truncate(&score.ocr_text, 80)
            );
        } else {
            info!("{}: {:.0}%", field_name, score.match_score * 100.0);
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GOVERNMENT_WARNING_TEXT;
    use crate::models::OcrRegion;
    use std::fs;

    struct FixedRecognizer(Vec<OcrRegion>);

    impl TextRecognizer for FixedRecognizer {
        fn recognize(&mut self, _image_path: &Path) -> Vec<OcrRegion> {
            self.0.clone()
        }
    }

    #[test]
    fn test_missing_crop_is_not_scored() {
        let mut recognizer = FixedRecognizer(vec![]);
        assert!(VerificationScorer::verify(&mut recognizer, None, "750 ML").is_none());
        assert!(VerificationScorer::verify(&mut recognizer, Some(Path::new("/nonexistent/crop.png")), "750 ML").is_none());
    }

    #[test]
    fn test_partial_warning_is_low_confidence() {
        let dir = tempfile::tempdir().unwrap();
        let crop = dir.path().join("governmentWarning.png");
        fs::write(&crop, b"placeholder").unwrap();

        let mut recognizer = FixedRecognizer(vec![OcrRegion::from_rect("GOVERNMENT WARNING", 0, 0, 200, 20, 0.9)]);
        let score = VerificationScorer::verify(&mut recognizer, Some(&crop), GOVERNMENT_WARNING_TEXT).unwrap();

        assert_eq!(score.ocr_text, "GOVERNMENT WARNING");
        assert!(score.match_score > 0.0);
        assert!(score.match_score < LOW_CONFIDENCE_THRESHOLD);
        assert!(score.is_low_confidence(LOW_CONFIDENCE_THRESHOLD));
    }

    #[test]
    fn test_regions_joined_in_reading_order() {
        let dir = tempfile::tempdir().unwrap();
        let crop = dir.path().join("fancifulName.png");
        fs::write(&crop, b"placeholder").unwrap();

        let mut recognizer = FixedRecognizer(vec![
            OcrRegion::from_rect("VERMOUTH", 0, 30, 80, 20, 0.9),
            OcrRegion::from_rect("EXTRA DRY", 0, 0, 80, 20, 0.9),
        ]);
        let score = VerificationScorer::verify(&mut recognizer, Some(&crop), "Extra Dry Vermouth").unwrap();
        assert_eq!(score.ocr_text, "EXTRA DRY VERMOUTH");
        assert_eq!(score.match_score, 1.0);
        assert!(!score.is_low_confidence(LOW_CONFIDENCE_THRESHOLD));
    }
}
