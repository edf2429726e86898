use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Which of the two label images a field or region belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Front,
    Back,
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::Front => Side::Back,
            Side::Back => Side::Front,
        }
    }

    /// Lenient parse used for extractor answers; anything but "back" is the front label.
    pub fn from_label(label: &str) -> Side {
        if label.trim().eq_ignore_ascii_case("back") {
            Side::Back
        } else {
            Side::Front
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Front => "front",
            Side::Back => "back",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named text value read off the label images by the upstream extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldExtraction {
    pub name: String,
    pub text: String,
    pub side: Side,
    pub confidence: f64,
}

/// Four corners in order: top-left, top-right, bottom-right, bottom-left.
pub type Polygon = [[i32; 2]; 4];

/// A geometry-accurate text span detected by the recognizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrRegion {
    pub text: String,
    pub polygon: Polygon,
    pub confidence: f64,
}

impl OcrRegion {
    pub fn new(text: impl Into<String>, polygon: Polygon, confidence: f64) -> Self {
        Self {
            text: text.into(),
            polygon,
            confidence,
        }
    }

    /// Axis-aligned region, convenient for recognizers that only report boxes.
    pub fn from_rect(text: impl Into<String>, x: i32, y: i32, w: i32, h: i32, confidence: f64) -> Self {
        Self::new(
            text,
            [[x, y], [x + w, y], [x + w, y + h], [x, y + h]],
            confidence,
        )
    }

    pub fn top_left(&self) -> [i32; 2] {
        self.polygon[0]
    }

    pub fn top_right(&self) -> [i32; 2] {
        self.polygon[1]
    }

    /// Sort key for reading order: top edge first, then left edge.
    pub fn reading_key(&self) -> (i32, i32) {
        let [x, y] = self.top_left();
        (y, x)
    }
}

/// Regions selected as representing one field. Empty means no geometric match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchedRegionSet {
    regions: Vec<OcrRegion>,
}

impl MatchedRegionSet {
    pub fn new(regions: Vec<OcrRegion>) -> Self {
        Self { regions }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn regions(&self) -> &[OcrRegion] {
        &self.regions
    }

    pub fn iter(&self) -> std::slice::Iter<'_, OcrRegion> {
        self.regions.iter()
    }

    pub fn texts(&self) -> Vec<&str> {
        self.regions.iter().map(|r| r.text.as_str()).collect()
    }
}

/// Enclosing rectangle of a matched region set plus the snapped rotation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBoundingBox {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
    pub rotation_degrees: f64,
}

impl NormalizedBoundingBox {
    /// Persisted form: `[x, y, w, h]`, rotation is stored separately.
    pub fn to_array(&self) -> [i32; 4] {
        [self.x, self.y, self.w, self.h]
    }
}

/// A cropped raster on disk and the box it was cut from.
#[derive(Debug, Clone, PartialEq)]
pub struct CropArtifact {
    pub path: PathBuf,
    pub bbox: NormalizedBoundingBox,
}

/// Independent confidence from re-running recognition on a crop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationScore {
    pub ocr_text: String,
    pub match_score: f64,
}

impl VerificationScore {
    pub fn is_low_confidence(&self, threshold: f64) -> bool {
        self.match_score < threshold
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CropStatus {
    Saved(CropArtifact),
    NoMatch,
    Failed(String),
}

impl CropStatus {
    pub fn artifact(&self) -> Option<&CropArtifact> {
        match self {
            CropStatus::Saved(artifact) => Some(artifact),
            _ => None,
        }
    }
}

/// Result of matching, merging and cropping one field.
#[derive(Debug, Clone)]
pub struct FieldOutcome {
    pub field: FieldExtraction,
    pub regions: MatchedRegionSet,
    pub bbox: Option<NormalizedBoundingBox>,
    pub crop: CropStatus,
    /// Effective side, flipped when the match came from the other image.
    pub side: Side,
}

impl FieldOutcome {
    pub fn matched(&self) -> bool {
        !self.regions.is_empty()
    }
}
