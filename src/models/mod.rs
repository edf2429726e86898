pub mod data;
pub mod record;

pub use data::*;
pub use record::*;
