use super::text::TextNormalizer;

/// SimilarityScorer compares two strings after normalization.
/// Shared by region matching and by crop verification.
pub struct SimilarityScorer;

impl SimilarityScorer {
    /// Similarity in [0, 1] between two raw strings.
    pub fn score(a: &str, b: &str) -> f64 {
        let a = TextNormalizer::normalize(a);
        let b = TextNormalizer::normalize(b);
        Self::ratio(&a, &b)
    }

    /// `2 * lcs / (len(a) + len(b))` over characters of already normalized strings.
    pub fn ratio(a: &str, b: &str) -> f64 {
        let a: Vec<char> = a.chars().collect();
        let b: Vec<char> = b.chars().collect();

        match (a.is_empty(), b.is_empty()) {
            (true, true) => return 1.0,
            (true, false) | (false, true) => return 0.0,
            _ => {}
        }

        let matches = Self::lcs_len(&a, &b);
        (2 * matches) as f64 / (a.len() + b.len()) as f64
    }

    // O(n*m) time, O(m) memory
    fn lcs_len(a: &[char], b: &[char]) -> usize {
        let mut prev = vec![0usize; b.len() + 1];
        let mut curr = vec![0usize; b.len() + 1];

        for ca in a {
            for (j, cb) in b.iter().enumerate() {
                curr[j + 1] = if ca == cb {
                    prev[j] + 1
                } else {
                    prev[j + 1].max(curr[j])
                };
            }
            std::mem::swap(&mut prev, &mut curr);
        }

        prev[b.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_and_empty() {
        assert_eq!(SimilarityScorer::score("750 ML", "750 ml."), 1.0);
        assert_eq!(SimilarityScorer::score("", ""), 1.0);
        assert_eq!(SimilarityScorer::score("...", " - "), 1.0);
        assert_eq!(SimilarityScorer::score("", "BRAND"), 0.0);
        assert_eq!(SimilarityScorer::score("BRAND", ""), 0.0);
    }

    #[test]
    fn test_ratio_value() {
        // LCS of ABCD / ACBD is 3
        let ratio = SimilarityScorer::ratio("ABCD", "ACBD");
        assert!((ratio - 0.75).abs() < 1e-9);
        assert_eq!(SimilarityScorer::ratio("ABC", "XYZ"), 0.0);
    }

    #[test]
    fn test_score_is_symmetric() {
        let pairs = [
            ("STRAIGHT RYE WHISKY", "STRAIGHT RYE WH1SKY"),
            ("GOVERNMENT WARNING", "GOVERNMENT WARNING: (1) According to the Surgeon General"),
            ("NAPA, CA", "NAPA VALLEY"),
            ("a", ""),
        ];
        for (a, b) in pairs {
            assert_eq!(SimilarityScorer::score(a, b), SimilarityScorer::score(b, a));
        }
    }

    #[test]
    fn test_ocr_confusion_scores_high() {
        let score = SimilarityScorer::score("AGED I8 YEARS", "Aged 18 Years");
        assert!(score > 0.9, "score was {}", score);
    }
}
