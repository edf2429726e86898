use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Punctuation and separators that OCR and the extractor disagree on
    static ref PUNCTUATION_NOISE: Regex = Regex::new(r#"[.,;:_|!'"()\-]"#).unwrap();
}

/// TextNormalizer canonicalizes strings before any comparison.
pub struct TextNormalizer;

impl TextNormalizer {
    /// Upper-case, strip punctuation noise, collapse whitespace and trim.
    pub fn normalize(text: &str) -> String {
        let upper = text.to_uppercase();
        let stripped = PUNCTUATION_NOISE.replace_all(&upper, "");
        stripped.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    pub fn words(normalized: &str) -> Vec<&str> {
        normalized.split_whitespace().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_noise() {
        assert_eq!(TextNormalizer::normalize("40% alc. by vol."), "40% ALC BY VOL");
        assert_eq!(
            TextNormalizer::normalize("  Shaw-Ross  (Importers);\t\"Miramar\" | FL_ "),
            "SHAWROSS IMPORTERS MIRAMAR FL"
        );
        assert_eq!(TextNormalizer::normalize("L'UNIQUE: liqueur!"), "LUNIQUE LIQUEUR");
    }

    #[test]
    fn test_normalize_empty_and_noise_only() {
        assert_eq!(TextNormalizer::normalize(""), "");
        assert_eq!(TextNormalizer::normalize(" .,;: -- () "), "");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let samples = [
            "GOVERNMENT WARNING: (1) According to the Surgeon General",
            "750 mL",
            "Château   Ste. Michelle",
            "  a\nb\tc  ",
            "",
        ];
        for sample in samples {
            let once = TextNormalizer::normalize(sample);
            assert_eq!(TextNormalizer::normalize(&once), once);
        }
    }

    #[test]
    fn test_words() {
        assert_eq!(TextNormalizer::words("A B  C"), vec!["A", "B", "C"]);
        assert!(TextNormalizer::words("").is_empty());
    }
}
