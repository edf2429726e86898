use log::debug;

use super::similarity::SimilarityScorer;
use super::text::TextNormalizer;
use crate::models::{MatchedRegionSet, OcrRegion};

pub const DEFAULT_MIN_SIMILARITY: f64 = 0.3;

/// Fields with more words than this are treated as paragraphs.
const SHORT_FIELD_MAX_WORDS: usize = 6;
/// Longest run of consecutive regions tried for a short field.
const MAX_RUN_LENGTH: usize = 3;
const WORD_MATCH_THRESHOLD: f64 = 0.6;
const RATIO_WEIGHT: f64 = 0.6;
const WORD_SCORE_WEIGHT: f64 = 0.8;

/// A region that survived scoring, with its normalized text kept for run search.
#[derive(Debug, Clone)]
struct ScoredRegion<'a> {
    region: &'a OcrRegion,
    normalized: String,
    score: f64,
}

/// RegionMatcher locates the OCR regions that represent one extracted field.
pub struct RegionMatcher;

impl RegionMatcher {
    /// Find the best region or run of regions for `field_text`.
    /// Returns an empty set when nothing scores well enough.
    pub fn find_regions(field_text: &str, regions: &[OcrRegion], min_similarity: f64) -> MatchedRegionSet {
        let field_norm = TextNormalizer::normalize(field_text);
        if field_norm.is_empty() || regions.is_empty() {
            return MatchedRegionSet::empty();
        }
        let field_words = TextNormalizer::words(&field_norm);

        let mut scored: Vec<ScoredRegion> = regions
            .iter()
            .filter_map(|region| {
                let normalized = TextNormalizer::normalize(&region.text);
                if normalized.is_empty() {
                    return None;
                }
                let score = Self::region_score(&normalized, &field_norm, &field_words, min_similarity)?;
                Some(ScoredRegion {
                    region,
                    normalized,
                    score,
                })
            })
            .collect();

        if scored.is_empty() {
            debug!("No OCR region matched \"{}\"", field_norm);
            return MatchedRegionSet::empty();
        }

        // Reading order: top to bottom, then left to right
        scored.sort_by_key(|s| s.region.reading_key());

        if field_words.len() <= SHORT_FIELD_MAX_WORDS {
            Self::best_short_match(&scored, &field_norm)
        } else {
            MatchedRegionSet::new(scored.iter().map(|s| s.region.clone()).collect())
        }
    }

    /// Score one normalized region against the normalized field text.
    /// `None` means the region is discarded.
    fn region_score(region_norm: &str, field_norm: &str, field_words: &[&str], min_similarity: f64) -> Option<f64> {
        // Exact partial match, rewarded in proportion to how much of the field it covers
        if field_norm.contains(region_norm) {
            let score = region_norm.chars().count() as f64 / field_norm.chars().count() as f64;
            return Some(score);
        }

        let ratio = SimilarityScorer::ratio(region_norm, field_norm);

        // Word-level fuzzy match absorbs character confusions like I8 -> 18
        let region_words = TextNormalizer::words(region_norm);
        let fuzzy_hits = region_words
            .iter()
            .filter(|rw| {
                field_words
                    .iter()
                    .any(|fw| SimilarityScorer::ratio(rw, fw) > WORD_MATCH_THRESHOLD)
            })
            .count();
        let word_score = fuzzy_hits as f64 / region_words.len().max(1) as f64;

        let score = (ratio * RATIO_WEIGHT).max(word_score * WORD_SCORE_WEIGHT);
        debug!(
            "Region \"{}\": ratio={:.3} word_score={:.3} score={:.3}",
            region_norm, ratio, word_score, score
        );
        if score >= min_similarity {
            Some(score)
        } else {
            None
        }
    }

    /// Best single region, or best contiguous run of up to three regions
    /// whose joined text matches the whole field.
    fn best_short_match(scored: &[ScoredRegion], field_norm: &str) -> MatchedRegionSet {
        // Any survivor beats nothing, even at a zero score
        let mut best_score = f64::NEG_INFINITY;
        let mut best: &[ScoredRegion] = &[];

        for (i, candidate) in scored.iter().enumerate() {
            if candidate.score > best_score {
                best_score = candidate.score;
                best = &scored[i..i + 1];
            }
        }

        for start in 0..scored.len() {
            let end_max = (start + MAX_RUN_LENGTH).min(scored.len());
            for end in start + 1..=end_max {
                let run = &scored[start..end];
                let combined = run
                    .iter()
                    .map(|s| s.normalized.as_str())
                    .collect::<Vec<_>>()
                    .join(" ");
                let ratio = SimilarityScorer::ratio(&combined, field_norm);
                if ratio > best_score {
                    best_score = ratio;
                    best = run;
                }
            }
        }

        MatchedRegionSet::new(best.iter().map(|s| s.region.clone()).collect())
    }
}
