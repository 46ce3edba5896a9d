use crate::domain::model::{Dataset, TransformResult};
use crate::domain::settings::{
    AugmentationSettings, ColumnMapping, MatchingSettings, ReferenceTables,
};
use crate::utils::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

pub trait ConfigProvider: Send + Sync {
    fn input_path(&self) -> &str;
    fn input_delimiter(&self) -> u8;
    fn output_path(&self) -> &str;
    fn reference_tables(&self) -> ReferenceTables;
    fn columns(&self) -> ColumnMapping;
    fn matching(&self) -> MatchingSettings;
    fn augmentation(&self) -> AugmentationSettings;
    fn output_formats(&self) -> &[String];
    fn compress_output(&self) -> bool;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self) -> Result<Dataset>;
    async fn transform(&self, data: Dataset) -> Result<TransformResult>;
    async fn load(&self, result: TransformResult) -> Result<String>;
}

/// 送往地址清理 oracle 的單筆位置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleLocation {
    pub id: u64,
    pub city: String,
    pub county: String,
    pub state: String,
    pub zip: String,
}

/// 清理 oracle 的建議；null 欄位表示不修正
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CleanedLocation {
    pub id: u64,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub county: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default, alias = "zipcode")]
    pub zip: Option<String>,
    #[serde(default)]
    pub confidence: String,
}

/// 地點詳細資料中與行政區相關的欄位
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaceDetails {
    pub locality: Option<String>,
    pub county_equivalent: Option<String>,
    pub state: Option<String>,
}

#[async_trait]
pub trait CleanupOracle: Send + Sync {
    async fn clean_batch(&self, batch: &[OracleLocation]) -> Result<Vec<CleanedLocation>>;
}

#[async_trait]
pub trait PlacesOracle: Send + Sync {
    async fn search_text(&self, query: &str) -> Result<Vec<String>>;
    async fn place_details(&self, place_id: &str) -> Result<PlaceDetails>;
}
