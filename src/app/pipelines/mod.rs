pub mod fips_pipeline;

pub use fips_pipeline::FipsPipeline;
