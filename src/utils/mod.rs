pub mod error;

pub use error::{CropError, LabelError};
