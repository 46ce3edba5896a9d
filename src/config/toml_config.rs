use crate::config::validate_augmentation;
use crate::core::ConfigProvider;
use crate::domain::states;
use crate::domain::settings::{
    AugmentationSettings, ColumnMapping, MatchingSettings, ReferenceTables,
};
use crate::utils::error::{EtlError, Result};
use crate::utils::validation::{
    validate_delimiter, validate_non_empty_string, validate_output_formats, validate_path,
    validate_range, Validate,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    pub run: RunConfig,
    pub input: InputConfig,
    pub reference: ReferenceConfig,
    #[serde(default)]
    pub matching: MatchingSettings,
    #[serde(default)]
    pub augmentation: AugmentationSettings,
    pub load: LoadConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub monitor: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    pub path: String,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    /// 未寫 county 時視為沒有縣欄位
    #[serde(default)]
    pub columns: ColumnMapping,
}

fn default_delimiter() -> String {
    ",".to_string()
}

/// 參考表：給目錄使用預設檔名，或逐一指定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceConfig {
    pub dir: Option<String>,
    pub county_table: Option<String>,
    pub place_table: Option<String>,
    pub zip_table: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    pub output_path: String,
    #[serde(default = "default_output_formats")]
    pub output_formats: Vec<String>,
    #[serde(default)]
    pub compress: bool,
}

fn default_output_formats() -> Vec<String> {
    vec!["csv".to_string()]
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(EtlError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| EtlError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${PLACES_API_KEY})；未設定的保留原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}")?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        validate_non_empty_string("run.name", &self.run.name)?;
        validate_path("input.path", &self.input.path)?;
        validate_delimiter("input.delimiter", &self.input.delimiter)?;
        validate_non_empty_string("input.columns.city", &self.input.columns.city)?;
        validate_non_empty_string("input.columns.state", &self.input.columns.state)?;
        validate_non_empty_string("input.columns.zip", &self.input.columns.zip)?;
        validate_non_empty_string("input.columns.fips", &self.input.columns.fips)?;

        let reference = &self.reference;
        let all_tables = reference.county_table.is_some()
            && reference.place_table.is_some()
            && reference.zip_table.is_some();
        if reference.dir.is_none() && !all_tables {
            return Err(EtlError::MissingConfigError {
                field: "reference.dir".to_string(),
            });
        }
        let tables = self.reference_tables();
        validate_path("reference.county_table", &tables.county_table)?;
        validate_path("reference.place_table", &tables.place_table)?;
        validate_path("reference.zip_table", &tables.zip_table)?;

        validate_range("matching.fuzzy_threshold", self.matching.fuzzy_threshold, 0.0, 100.0)?;
        for rule in &self.matching.typo_rules {
            if states::lookup(&rule.state).is_none() {
                return Err(EtlError::ConfigError {
                    message: format!("typo rule '{}' names unknown state '{}'", rule.pattern, rule.state),
                });
            }
            Regex::new(&rule.pattern)?;
        }

        validate_augmentation("augmentation.", &self.augmentation)?;

        validate_path("load.output_path", &self.load.output_path)?;
        validate_output_formats("load.output_formats", &self.load.output_formats)?;

        Ok(())
    }

    /// 取得監控設定
    pub fn monitoring_enabled(&self) -> bool {
        self.run.monitor
    }
}

impl ConfigProvider for TomlConfig {
    fn input_path(&self) -> &str {
        &self.input.path
    }

    fn input_delimiter(&self) -> u8 {
        validate_delimiter("input.delimiter", &self.input.delimiter).unwrap_or(b',')
    }

    fn output_path(&self) -> &str {
        &self.load.output_path
    }

    fn reference_tables(&self) -> ReferenceTables {
        let defaults = ReferenceTables::in_dir(self.reference.dir.as_deref().unwrap_or("."));
        ReferenceTables {
            county_table: self.reference.county_table.clone().unwrap_or(defaults.county_table),
            place_table: self.reference.place_table.clone().unwrap_or(defaults.place_table),
            zip_table: self.reference.zip_table.clone().unwrap_or(defaults.zip_table),
        }
    }

    fn columns(&self) -> ColumnMapping {
        self.input.columns.clone()
    }

    fn matching(&self) -> MatchingSettings {
        self.matching.clone()
    }

    fn augmentation(&self) -> AugmentationSettings {
        self.augmentation.clone()
    }

    fn output_formats(&self) -> &[String] {
        &self.load.output_formats
    }

    fn compress_output(&self) -> bool {
        self.load.compress
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL: &str = r#"
[run]
name = "h2a-worksites"

[input]
path = "data/h2a.csv"

[reference]
dir = "census"

[load]
output_path = "./output"
"#;

    #[test]
    fn test_parse_minimal_config_uses_defaults() {
        let config = TomlConfig::from_toml_str(MINIMAL).unwrap();

        assert_eq!(config.run.name, "h2a-worksites");
        assert!(!config.monitoring_enabled());
        assert_eq!(config.input_delimiter(), b',');
        assert_eq!(config.columns(), ColumnMapping::default());
        assert_eq!(config.matching().fuzzy_threshold, 80.0);
        assert_eq!(config.matching().typo_rules.len(), 8);
        assert!(!config.augmentation().is_enabled());
        assert_eq!(config.augmentation().requests_per_second, 9.0);
        assert_eq!(config.output_formats(), ["csv"]);
        assert!(!config.compress_output());
        assert_eq!(
            config.reference_tables().place_table,
            "census/national_place_by_county2020.txt"
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let toml_content = r#"
[run]
name = "full"
monitor = true

[input]
path = "data/h2a.tsv"
delimiter = "\t"

[input.columns]
city = "WORKSITE_CITY"
state = "WORKSITE_STATE"
zip = "WORKSITE_POSTAL_CODE"
fips = "county_fips"

[reference]
county_table = "/ref/counties.txt"
place_table = "/ref/places.txt"
zip_table = "/ref/zcta.txt"

[matching]
fuzzy_threshold = 85.0

[[matching.typo_rules]]
state = "LA"
pattern = "BATON ROGUE"
replacement = "BATON ROUGE"

[augmentation]
cache_path = "./cache/oracle.jsonl"
requests_per_second = 5.0
concurrency = 2

[augmentation.places]
endpoint = "https://places.googleapis.com"
api_key = "abc"

[load]
output_path = "./out"
output_formats = ["csv", "tsv"]
compress = true
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();

        assert!(config.monitoring_enabled());
        assert_eq!(config.input_delimiter(), b'\t');
        assert_eq!(config.columns().county, None);
        assert_eq!(config.columns().fips, "county_fips");
        assert_eq!(config.reference_tables().zip_table, "/ref/zcta.txt");
        assert_eq!(config.matching().typo_rules.len(), 1);
        let augmentation = config.augmentation();
        assert!(augmentation.is_enabled());
        assert!(augmentation.cleanup.is_none());
        assert_eq!(augmentation.concurrency, 2);
        assert_eq!(augmentation.batch_size, 20);
        assert!(config.compress_output());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("FIPS_TEST_PLACES_KEY", "from-env");

        let toml_content = format!(
            "{}\n[augmentation.places]\nendpoint = \"https://places.googleapis.com\"\napi_key = \"${{FIPS_TEST_PLACES_KEY}}\"\n",
            MINIMAL
        );

        let config = TomlConfig::from_toml_str(&toml_content).unwrap();
        assert_eq!(
            config.augmentation.places.unwrap().api_key.as_deref(),
            Some("from-env")
        );

        std::env::remove_var("FIPS_TEST_PLACES_KEY");
    }

    #[test]
    fn test_missing_reference_location_is_rejected() {
        let toml_content = MINIMAL.replace("dir = \"census\"", "county_table = \"c.txt\"");
        let config = TomlConfig::from_toml_str(&toml_content).unwrap();
        assert!(matches!(
            config.validate(),
            Err(EtlError::MissingConfigError { .. })
        ));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let bad_threshold = format!("{}\n[matching]\nfuzzy_threshold = 150.0\n", MINIMAL);
        assert!(TomlConfig::from_toml_str(&bad_threshold).unwrap().validate().is_err());

        let bad_rule = format!(
            "{}\n[[matching.typo_rules]]\nstate = \"LA\"\npattern = \"ST\\\\.(\"\nreplacement = \"\"\n",
            MINIMAL
        );
        assert!(matches!(
            TomlConfig::from_toml_str(&bad_rule).unwrap().validate(),
            Err(EtlError::PatternError(_))
        ));

        let unknown_state = format!(
            "{}\n[[matching.typo_rules]]\nstate = \"XX\"\npattern = \"FOO\"\nreplacement = \"BAR\"\n",
            MINIMAL
        );
        assert!(matches!(
            TomlConfig::from_toml_str(&unknown_state).unwrap().validate(),
            Err(EtlError::ConfigError { .. })
        ));

        let bad_format = MINIMAL.replace(
            "output_path = \"./output\"",
            "output_path = \"./output\"\noutput_formats = [\"json\"]",
        );
        assert!(TomlConfig::from_toml_str(&bad_format).unwrap().validate().is_err());
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(MINIMAL.as_bytes()).unwrap();

        let config = TomlConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.input_path(), "data/h2a.csv");
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let err = TomlConfig::from_toml_str("[run\nname=").unwrap_err();
        assert!(matches!(err, EtlError::ConfigValidationError { .. }));
    }
}
