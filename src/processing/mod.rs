pub mod crop;
pub mod geometry;
pub mod matcher;
pub mod ocr;
pub mod similarity;
pub mod text;
pub mod verification;

pub use crop::{CropNormalizer, NormalizedCrop, PixelRect};
pub use geometry::GeometryMerger;
pub use matcher::RegionMatcher;
pub use ocr::{TesseractRecognizer, TextRecognizer};
pub use similarity::SimilarityScorer;
pub use text::TextNormalizer;
pub use verification::VerificationScorer;
