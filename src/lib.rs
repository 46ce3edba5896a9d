pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::{cli::LocalStorage, toml_config::TomlConfig, CliConfig};

pub use app::pipelines::FipsPipeline;
pub use core::{etl::EtlEngine, resolver::LocationResolver};
pub use domain::model::{RawLocation, ResolutionSource, ResolvedLocation, UnresolvedReason};
pub use utils::error::{EtlError, Result};
