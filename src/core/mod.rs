pub mod aggregator;
pub mod arbiter;
pub mod augment;
pub mod cache;
pub mod etl;
pub mod exact;
pub mod fuzzy;
pub mod normalizer;
pub mod reference;
pub mod resolver;

pub use crate::domain::model::{Dataset, Record, TransformResult};
pub use crate::domain::ports::{ConfigProvider, Pipeline, Storage};
pub use crate::utils::error::Result;
