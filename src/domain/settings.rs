use serde::{Deserialize, Serialize};

pub const DEFAULT_FUZZY_THRESHOLD: f64 = 80.0;

/// Census 參考表路徑 (管線符號分隔)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceTables {
    pub county_table: String,
    pub place_table: String,
    pub zip_table: String,
}

impl ReferenceTables {
    /// 以 Census 2020 預設檔名組出路徑
    pub fn in_dir(dir: &str) -> Self {
        let dir = dir.trim_end_matches('/');
        Self {
            county_table: format!("{}/national_county2020.txt", dir),
            place_table: format!("{}/national_place_by_county2020.txt", dir),
            zip_table: format!("{}/tab20_zcta520_county20_natl.txt", dir),
        }
    }
}

/// 輸入資料的位置欄位名稱；county 可以不存在
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub city: String,
    pub county: Option<String>,
    pub state: String,
    pub zip: String,
    #[serde(default = "default_fips_column")]
    pub fips: String,
}

fn default_fips_column() -> String {
    "fips".to_string()
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            city: "city".to_string(),
            county: Some("county".to_string()),
            state: "state".to_string(),
            zip: "zip".to_string(),
            fips: default_fips_column(),
        }
    }
}

/// 特定州的正規表示式修正規則，依序套用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypoRule {
    pub state: String,
    pub pattern: String,
    pub replacement: String,
}

impl TypoRule {
    pub fn new(state: &str, pattern: &str, replacement: &str) -> Self {
        Self {
            state: state.to_string(),
            pattern: pattern.to_string(),
            replacement: replacement.to_string(),
        }
    }
}

/// 路易斯安那資料常見的 parish 名稱錯誤
pub fn default_typo_rules() -> Vec<TypoRule> {
    vec![
        TypoRule::new("LA", r"ST\.(\w)", "ST. $1"),
        TypoRule::new("LA", r"NORTH\. ", "NORTH "),
        TypoRule::new("LA", r"SOUTH\. ", "SOUTH "),
        TypoRule::new("LA", r"EAST\. ", "EAST "),
        TypoRule::new("LA", r"WEST\. ", "WEST "),
        TypoRule::new("LA", "BATON ROGUE", "BATON ROUGE"),
        TypoRule::new("LA", "JEFF DAVIS", "JEFFERSON DAVIS"),
        TypoRule::new("LA", "IBERIAL", "IBERIA"),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingSettings {
    #[serde(default = "default_threshold")]
    pub fuzzy_threshold: f64,
    #[serde(default = "default_typo_rules")]
    pub typo_rules: Vec<TypoRule>,
}

fn default_threshold() -> f64 {
    DEFAULT_FUZZY_THRESHOLD
}

impl Default for MatchingSettings {
    fn default() -> Self {
        Self {
            fuzzy_threshold: DEFAULT_FUZZY_THRESHOLD,
            typo_rules: default_typo_rules(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleEndpoint {
    pub endpoint: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AugmentationSettings {
    pub cleanup: Option<OracleEndpoint>,
    pub places: Option<OracleEndpoint>,
    pub cache_path: Option<String>,
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: f64,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_requests_per_second() -> f64 {
    9.0
}

fn default_retry_delay_ms() -> u64 {
    2_000
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_batch_size() -> usize {
    20
}

fn default_concurrency() -> usize {
    4
}

impl Default for AugmentationSettings {
    fn default() -> Self {
        Self {
            cleanup: None,
            places: None,
            cache_path: None,
            requests_per_second: default_requests_per_second(),
            retry_delay_ms: default_retry_delay_ms(),
            timeout_seconds: default_timeout_seconds(),
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
        }
    }
}

impl AugmentationSettings {
    pub fn is_enabled(&self) -> bool {
        self.cleanup.is_some() || self.places.is_some()
    }
}
