use log::debug;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::models::{FieldExtraction, Side};
use crate::utils::LabelError;

/// Upstream text extractor. Only failures here abort an application.
pub trait FieldExtractor {
    fn extract(
        &mut self,
        application_id: &str,
        front: Option<&Path>,
        back: Option<&Path>,
    ) -> Result<Vec<FieldExtraction>, LabelError>;
}

/// One entry of the extractor's JSON answer.
#[derive(Debug, Deserialize)]
struct RawField {
    field_name: String,
    #[serde(default)]
    extracted_text: String,
    #[serde(default)]
    image_side: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
}

/// Parse the extractor's answer: a JSON array, possibly inside a Markdown code fence.
pub fn parse_extraction_response(text: &str) -> Result<Vec<FieldExtraction>, LabelError> {
    let body = strip_code_fence(text);
    let raw: Vec<RawField> =
        serde_json::from_str(body).map_err(|e| LabelError::ResponseParseError(e.to_string()))?;

    Ok(raw
        .into_iter()
        .map(|field| FieldExtraction {
            name: field.field_name,
            text: field.extracted_text,
            side: field.image_side.as_deref().map(Side::from_label).unwrap_or(Side::Front),
            confidence: field.confidence.unwrap_or(0.0),
        })
        .collect())
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the language tag line, if any
    let rest = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Replays recorded extractor answers from `<dir>/<application_id>.json`
/// (or `.txt`). A `<application_id>.timeout` marker simulates an upstream timeout.
pub struct ResponseFileExtractor {
    responses_dir: PathBuf,
}

impl ResponseFileExtractor {
    pub fn new(responses_dir: impl Into<PathBuf>) -> Self {
        Self {
            responses_dir: responses_dir.into(),
        }
    }
}

impl FieldExtractor for ResponseFileExtractor {
    fn extract(
        &mut self,
        application_id: &str,
        front: Option<&Path>,
        back: Option<&Path>,
    ) -> Result<Vec<FieldExtraction>, LabelError> {
        if front.is_none() && back.is_none() {
            return Ok(Vec::new());
        }

        let timeout_marker = self.responses_dir.join(format!("{}.timeout", application_id));
        if timeout_marker.exists() {
            return Err(LabelError::ExtractionTimeout(format!(
                "Request timed out for {}",
                application_id
            )));
        }

        let response = ["json", "txt"]
            .iter()
            .map(|ext| self.responses_dir.join(format!("{}.{}", application_id, ext)))
            .find(|path| path.exists())
            .ok_or_else(|| {
                LabelError::ExtractionError(format!("No extraction response for {}", application_id))
            })?;

        debug!("Reading extraction response {}", response.display());
        let text = fs::read_to_string(&response)
            .map_err(|e| LabelError::ExtractionError(format!("Failed to read {}: {}", response.display(), e)))?;
        parse_extraction_response(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_array() {
        let fields = parse_extraction_response(
            r#"[{"field_name": "brandName", "extracted_text": "OLD TOM", "image_side": "front", "confidence": 0.97},
                {"field_name": "sulfites", "extracted_text": "Contains Sulfites", "image_side": "BACK"}]"#,
        )
        .unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].name, "brandName");
        assert_eq!(fields[0].side, Side::Front);
        assert_eq!(fields[0].confidence, 0.97);
        assert_eq!(fields[1].side, Side::Back);
        assert_eq!(fields[1].confidence, 0.0);
    }

    #[test]
    fn test_parse_fenced_answer() {
        let text = "```json\n[{\"field_name\": \"netContents\", \"extracted_text\": \"750 ML\", \"image_side\": \"side\"}]\n```";
        let fields = parse_extraction_response(text).unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].text, "750 ML");
        assert_eq!(fields[0].side, Side::Front);
    }

    #[test]
    fn test_parse_garbage_fails() {
        let result = parse_extraction_response("I could not read the label.");
        assert!(matches!(result, Err(LabelError::ResponseParseError(_))));
    }

    #[test]
    fn test_response_file_extractor() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("app1.json"),
            r#"[{"field_name": "brandName", "extracted_text": "OLD TOM"}]"#,
        )
        .unwrap();
        fs::write(dir.path().join("app2.timeout"), "").unwrap();

        let mut extractor = ResponseFileExtractor::new(dir.path());
        let front = Path::new("front.png");

        let fields = extractor.extract("app1", Some(front), None).unwrap();
        assert_eq!(fields[0].text, "OLD TOM");

        let timeout = extractor.extract("app2", Some(front), None).unwrap_err();
        assert!(matches!(timeout, LabelError::ExtractionTimeout(_)));
        assert!(timeout.is_extraction_failure());

        let missing = extractor.extract("app3", Some(front), None).unwrap_err();
        assert!(matches!(missing, LabelError::ExtractionError(_)));

        assert!(extractor.extract("app3", None, None).unwrap().is_empty());
    }
}
