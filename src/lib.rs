pub mod batch;
pub mod config;
pub mod events;
pub mod extraction;
pub mod label_processor;
pub mod models;
pub mod processing;
pub mod stats;
pub mod store;
pub mod utils;

pub use batch::{BatchRunner, BatchSummary, ClearSummary, VerificationSummary};
pub use config::PipelineConfig;
pub use extraction::{FieldExtractor, ResponseFileExtractor};
pub use label_processor::{LabelProcessor, LabelSide};
pub use utils::{CropError, LabelError};
