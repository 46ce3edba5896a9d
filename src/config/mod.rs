pub mod cli;
pub mod toml_config;

use crate::core::ConfigProvider;
use crate::domain::settings::{
    default_typo_rules, AugmentationSettings, ColumnMapping, MatchingSettings, OracleEndpoint,
    ReferenceTables,
};
use crate::utils::error::Result;
use crate::utils::validation::{
    validate_delimiter, validate_output_formats, validate_path, validate_positive_number,
    validate_range, validate_url, Validate,
};
use clap::Parser;
use serde::{Deserialize, Serialize};

pub const CLEANUP_API_KEY_ENV: &str = "FIPS_CLEANUP_API_KEY";
pub const PLACES_API_KEY_ENV: &str = "FIPS_PLACES_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[command(name = "fips-etl")]
#[command(about = "Resolve free-text U.S. locations to county FIPS codes")]
pub struct CliConfig {
    /// 輸入的位置資料 (CSV/TSV)
    #[arg(long)]
    pub input: String,

    #[arg(long, default_value = ",")]
    pub delimiter: String,

    #[arg(long, default_value = "./output")]
    pub output_path: String,

    /// Census 2020 參考表所在目錄
    #[arg(long, default_value = "./reference")]
    pub reference_dir: String,

    #[arg(long)]
    pub county_table: Option<String>,

    #[arg(long)]
    pub place_table: Option<String>,

    #[arg(long)]
    pub zip_table: Option<String>,

    #[arg(long, default_value = "city")]
    pub city_column: String,

    #[arg(long, default_value = "county")]
    pub county_column: String,

    #[arg(long, help = "Input has no county column; treat it as empty")]
    pub no_county_column: bool,

    #[arg(long, default_value = "state")]
    pub state_column: String,

    #[arg(long, default_value = "zip")]
    pub zip_column: String,

    #[arg(long, default_value = "fips")]
    pub fips_column: String,

    #[arg(long, default_value = "80")]
    pub fuzzy_threshold: f64,

    #[arg(long, value_delimiter = ',', default_value = "csv")]
    pub output_formats: Vec<String>,

    #[arg(long, help = "Bundle all outputs into fips_output.zip")]
    pub compress: bool,

    #[arg(long)]
    pub cleanup_endpoint: Option<String>,

    #[arg(long, help = "Falls back to FIPS_CLEANUP_API_KEY")]
    pub cleanup_api_key: Option<String>,

    #[arg(long)]
    pub places_endpoint: Option<String>,

    #[arg(long, help = "Falls back to FIPS_PLACES_API_KEY")]
    pub places_api_key: Option<String>,

    #[arg(long)]
    pub cache_path: Option<String>,

    #[arg(long, default_value = "9")]
    pub requests_per_second: f64,

    #[arg(long, default_value = "2000")]
    pub retry_delay_ms: u64,

    #[arg(long, default_value = "30")]
    pub timeout_seconds: u64,

    #[arg(long, default_value = "20")]
    pub batch_size: usize,

    #[arg(long, default_value = "4")]
    pub concurrency: usize,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Report time and memory per phase")]
    pub monitor: bool,
}

fn endpoint(url: &Option<String>, key: &Option<String>, key_env: &str) -> Option<OracleEndpoint> {
    url.as_ref().map(|endpoint| OracleEndpoint {
        endpoint: endpoint.clone(),
        api_key: key.clone().or_else(|| std::env::var(key_env).ok()),
    })
}

impl ConfigProvider for CliConfig {
    fn input_path(&self) -> &str {
        &self.input
    }

    fn input_delimiter(&self) -> u8 {
        validate_delimiter("delimiter", &self.delimiter).unwrap_or(b',')
    }

    fn output_path(&self) -> &str {
        &self.output_path
    }

    fn reference_tables(&self) -> ReferenceTables {
        let defaults = ReferenceTables::in_dir(&self.reference_dir);
        ReferenceTables {
            county_table: self.county_table.clone().unwrap_or(defaults.county_table),
            place_table: self.place_table.clone().unwrap_or(defaults.place_table),
            zip_table: self.zip_table.clone().unwrap_or(defaults.zip_table),
        }
    }

    fn columns(&self) -> ColumnMapping {
        ColumnMapping {
            city: self.city_column.clone(),
            county: (!self.no_county_column).then(|| self.county_column.clone()),
            state: self.state_column.clone(),
            zip: self.zip_column.clone(),
            fips: self.fips_column.clone(),
        }
    }

    fn matching(&self) -> MatchingSettings {
        MatchingSettings {
            fuzzy_threshold: self.fuzzy_threshold,
            typo_rules: default_typo_rules(),
        }
    }

    fn augmentation(&self) -> AugmentationSettings {
        AugmentationSettings {
            cleanup: endpoint(&self.cleanup_endpoint, &self.cleanup_api_key, CLEANUP_API_KEY_ENV),
            places: endpoint(&self.places_endpoint, &self.places_api_key, PLACES_API_KEY_ENV),
            cache_path: self.cache_path.clone(),
            requests_per_second: self.requests_per_second,
            retry_delay_ms: self.retry_delay_ms,
            timeout_seconds: self.timeout_seconds,
            batch_size: self.batch_size,
            concurrency: self.concurrency,
        }
    }

    fn output_formats(&self) -> &[String] {
        &self.output_formats
    }

    fn compress_output(&self) -> bool {
        self.compress
    }
}

/// 兩種設定來源共用的檢查
pub(crate) fn validate_augmentation(prefix: &str, settings: &AugmentationSettings) -> Result<()> {
    let field = |name: &str| format!("{}{}", prefix, name);
    if let Some(cleanup) = &settings.cleanup {
        validate_url(&field("cleanup_endpoint"), &cleanup.endpoint)?;
    }
    if let Some(places) = &settings.places {
        validate_url(&field("places_endpoint"), &places.endpoint)?;
    }
    if let Some(path) = &settings.cache_path {
        validate_path(&field("cache_path"), path)?;
    }
    validate_range(&field("requests_per_second"), settings.requests_per_second, 0.0, 1000.0)?;
    validate_positive_number(&field("timeout_seconds"), settings.timeout_seconds as usize, 1)?;
    validate_positive_number(&field("batch_size"), settings.batch_size, 1)?;
    validate_positive_number(&field("concurrency"), settings.concurrency, 1)?;
    Ok(())
}

impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        validate_path("input", &self.input)?;
        validate_delimiter("delimiter", &self.delimiter)?;
        validate_path("output_path", &self.output_path)?;
        let tables = self.reference_tables();
        validate_path("county_table", &tables.county_table)?;
        validate_path("place_table", &tables.place_table)?;
        validate_path("zip_table", &tables.zip_table)?;
        validate_range("fuzzy_threshold", self.fuzzy_threshold, 0.0, 100.0)?;
        validate_output_formats("output_formats", &self.output_formats)?;
        validate_augmentation("", &self.augmentation())
    }
}
