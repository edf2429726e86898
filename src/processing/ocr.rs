use log::{debug, warn};
use std::collections::HashMap;
use std::path::Path;
use tesseract::Tesseract;

use crate::models::OcrRegion;

/// Geometry-accurate text recognizer. Implementations never fail: a missing
/// or unreadable image yields no regions.
pub trait TextRecognizer {
    fn recognize(&mut self, image_path: &Path) -> Vec<OcrRegion>;
}

/// Tesseract-backed recognizer. One engine is created lazily and reused
/// across calls; it is rebuilt after any engine error.
pub struct TesseractRecognizer {
    datapath: Option<String>,
    language: String,
    engine: Option<Tesseract>,
}

impl TesseractRecognizer {
    pub fn new(datapath: Option<String>, language: impl Into<String>) -> Self {
        Self {
            datapath,
            language: language.into(),
            engine: None,
        }
    }

    fn take_engine(&mut self) -> Result<Tesseract, String> {
        match self.engine.take() {
            Some(engine) => Ok(engine),
            None => Tesseract::new(self.datapath.as_deref(), Some(&self.language))
                .map_err(|e| format!("Tesseract init error: {}", e)),
        }
    }

    fn run(&mut self, image_path: &Path) -> Result<Vec<OcrRegion>, String> {
        let path_str = image_path
            .to_str()
            .ok_or_else(|| "Failed to convert path to string".to_string())?;

        let engine = self.take_engine()?;
        let mut engine = engine
            .set_image(path_str)
            .map_err(|e| format!("Tesseract set image error: {}", e))?;
        let tsv = engine
            .get_tsv_text(0)
            .map_err(|e| format!("Tesseract error: {}", e))?;

        // Only a healthy engine goes back for reuse
        self.engine = Some(engine);
        Ok(parse_tsv(&tsv))
    }
}

impl TextRecognizer for TesseractRecognizer {
    fn recognize(&mut self, image_path: &Path) -> Vec<OcrRegion> {
        if !image_path.exists() {
            warn!("Image not found for OCR: {}", image_path.display());
            return Vec::new();
        }
        match self.run(image_path) {
            Ok(regions) => {
                debug!("OCR found {} regions in {}", regions.len(), image_path.display());
                regions
            }
            Err(e) => {
                warn!("OCR failed for {}: {}", image_path.display(), e);
                Vec::new()
            }
        }
    }
}

const WORD_LEVEL: u32 = 5;

#[derive(Default)]
struct LineAccumulator {
    words: Vec<String>,
    confidences: Vec<f64>,
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
}

/// Group Tesseract TSV word rows into line-level regions, in output order.
pub fn parse_tsv(tsv: &str) -> Vec<OcrRegion> {
    let mut order: Vec<(u32, u32, u32)> = Vec::new();
    let mut lines: HashMap<(u32, u32, u32), LineAccumulator> = HashMap::new();

    for row in tsv.lines() {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 {
            continue;
        }
        let numbers: Option<Vec<i64>> = cols[..10].iter().map(|c| c.trim().parse::<i64>().ok()).collect();
        // Header row and malformed rows fail to parse
        let Some(numbers) = numbers else { continue };
        if numbers[0] != WORD_LEVEL as i64 {
            continue;
        }
        let text = cols[11..].join("\t").trim().to_string();
        if text.is_empty() {
            continue;
        }
        let confidence = cols[10].trim().parse::<f64>().unwrap_or(-1.0);

        let key = (numbers[2] as u32, numbers[3] as u32, numbers[4] as u32);
        let (left, top) = (numbers[6] as i32, numbers[7] as i32);
        let (right, bottom) = (left + numbers[8] as i32, top + numbers[9] as i32);

        let line = lines.entry(key).or_insert_with(|| {
            order.push(key);
            LineAccumulator {
                left,
                top,
                right,
                bottom,
                ..Default::default()
            }
        });
        line.words.push(text);
        if confidence >= 0.0 {
            line.confidences.push(confidence);
        }
        line.left = line.left.min(left);
        line.top = line.top.min(top);
        line.right = line.right.max(right);
        line.bottom = line.bottom.max(bottom);
    }

    order
        .into_iter()
        .filter_map(|key| lines.remove(&key))
        .map(|line| {
            let confidence = if line.confidences.is_empty() {
                0.0
            } else {
                line.confidences.iter().sum::<f64>() / line.confidences.len() as f64 / 100.0
            };
            OcrRegion::from_rect(
                line.words.join(" "),
                line.left,
                line.top,
                line.right - line.left,
                line.bottom - line.top,
                confidence,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_TSV: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext
1\t1\t0\t0\t0\t0\t0\t0\t640\t480\t-1\t
2\t1\t1\t0\t0\t0\t10\t10\t300\t60\t-1\t
4\t1\t1\t1\t1\t0\t10\t10\t300\t20\t-1\t
5\t1\t1\t1\t1\t1\t10\t10\t40\t20\t96.0\t40%
5\t1\t1\t1\t1\t2\t55\t12\t35\t18\t90.0\tALC.
5\t1\t1\t1\t1\t3\t95\t10\t30\t20\t88.0\tBY
5\t1\t1\t1\t2\t1\t10\t50\t80\t20\t70.0\t750
5\t1\t1\t1\t2\t2\t95\t50\t30\t20\t-1\t
5\t1\t1\t1\t2\t3\t130\t52\t25\t18\t80.0\tML
";

    #[test]
    fn test_parse_tsv_groups_lines() {
        let regions = parse_tsv(SAMPLE_TSV);
        assert_eq!(regions.len(), 2);

        assert_eq!(regions[0].text, "40% ALC. BY");
        assert_eq!(regions[0].polygon, [[10, 10], [125, 10], [125, 30], [10, 30]]);
        assert!((regions[0].confidence - 0.913333).abs() < 1e-3);

        assert_eq!(regions[1].text, "750 ML");
        assert_eq!(regions[1].polygon, [[10, 50], [155, 50], [155, 70], [10, 70]]);
        assert!((regions[1].confidence - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_parse_tsv_ignores_garbage() {
        assert!(parse_tsv("").is_empty());
        assert!(parse_tsv("not\ta\ttsv").is_empty());
    }

    #[test]
    fn test_missing_image_yields_no_regions() {
        let mut recognizer = TesseractRecognizer::new(None, "eng");
        assert!(recognizer.recognize(Path::new("/nonexistent/front.png")).is_empty());
    }
}
