use crate::adapters::http::{HttpCleanupOracle, HttpPlacesOracle};
use crate::core::aggregator;
use crate::core::augment::AugmentationBridge;
use crate::core::cache::OracleCache;
use crate::core::reference::ReferenceStore;
use crate::core::resolver::LocationResolver;
use crate::core::{ConfigProvider, Dataset, Pipeline, Record, Storage, TransformResult};
use crate::domain::model::ResolvedLocation;
use crate::domain::ports::{CleanupOracle, PlacesOracle};
use crate::utils::error::{EtlError, Result};
use std::io::Write;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use zip::write::{FileOptions, ZipWriter};

pub const RESOLVED_CSV: &str = "resolved.csv";
pub const RESOLVED_TSV: &str = "resolved.tsv";
pub const UNRESOLVED_CSV: &str = "unresolved_locations.csv";
pub const REPORT_JSON: &str = "resolution_report.json";
pub const ARCHIVE: &str = "fips_output.zip";

/// 讀入位置資料、解析 FIPS、輸出結果與待處理清單
pub struct FipsPipeline<S: Storage, C: ConfigProvider> {
    storage: S,
    config: C,
    cleanup: Option<Arc<dyn CleanupOracle>>,
    places: Option<Arc<dyn PlacesOracle>>,
    stop: Arc<AtomicBool>,
}

impl<S: Storage, C: ConfigProvider> FipsPipeline<S, C> {
    /// 依設定建立 HTTP oracle；未設定端點時只做本地比對
    pub fn new(storage: S, config: C) -> Result<Self> {
        let augmentation = config.augmentation();
        let timeout = Duration::from_secs(augmentation.timeout_seconds);

        let cleanup = match &augmentation.cleanup {
            Some(endpoint) => {
                Some(Arc::new(HttpCleanupOracle::new(endpoint, timeout)?) as Arc<dyn CleanupOracle>)
            }
            None => None,
        };
        let places = match &augmentation.places {
            Some(endpoint) => {
                Some(Arc::new(HttpPlacesOracle::new(endpoint, timeout)?) as Arc<dyn PlacesOracle>)
            }
            None => None,
        };

        Ok(Self {
            storage,
            config,
            cleanup,
            places,
            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn with_oracles(
        mut self,
        cleanup: Option<Arc<dyn CleanupOracle>>,
        places: Option<Arc<dyn PlacesOracle>>,
    ) -> Self {
        self.cleanup = cleanup;
        self.places = places;
        self
    }

    /// 設為 true 後，尚未送出的 oracle 請求都會停止
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn config(&self) -> &C {
        &self.config
    }

    async fn bridge(&self) -> Result<Option<AugmentationBridge>> {
        if self.cleanup.is_none() && self.places.is_none() {
            return Ok(None);
        }

        let settings = self.config.augmentation();
        let cache = match &settings.cache_path {
            Some(path) => OracleCache::open(path).await?,
            None => OracleCache::in_memory(),
        };

        let mut bridge = AugmentationBridge::new(&settings, Arc::new(cache))
            .with_stop_flag(self.stop.clone());
        if let Some(cleanup) = &self.cleanup {
            bridge = bridge.with_cleanup(cleanup.clone());
        }
        if let Some(places) = &self.places {
            bridge = bridge.with_places(places.clone());
        }
        Ok(Some(bridge))
    }

    fn output_file(&self, name: &str) -> String {
        format!("{}/{}", self.config.output_path().trim_end_matches('/'), name)
    }
}

fn write_delimited(dataset: &Dataset, delimiter: u8) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(Vec::new());
    writer.write_record(&dataset.headers)?;
    for record in &dataset.records {
        writer.write_record(&record.values)?;
    }
    writer
        .into_inner()
        .map_err(|e| EtlError::IoError(e.into_error()))
}

/// 待人工處理的位置清單
fn write_unresolved<'a>(locations: impl Iterator<Item = &'a ResolvedLocation>) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["city", "county", "state", "zip", "reason"])?;
    for location in locations {
        let reason = location
            .unresolved_reason
            .map(|r| r.as_str())
            .unwrap_or("no_candidate");
        writer.write_record([
            location.original.city.as_str(),
            location.original.county.as_str(),
            location.original.state.as_str(),
            location.original.zip.as_str(),
            reason,
        ])?;
    }
    writer
        .into_inner()
        .map_err(|e| EtlError::IoError(e.into_error()))
}

#[async_trait::async_trait]
impl<S: Storage, C: ConfigProvider> Pipeline for FipsPipeline<S, C> {
    async fn extract(&self) -> Result<Dataset> {
        let input_path = self.config.input_path();
        tracing::info!("📥 Reading locations from {}", input_path);

        let bytes = self.storage.read_file(input_path).await?;
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.config.input_delimiter())
            .has_headers(true)
            .flexible(true)
            .from_reader(bytes.as_slice());

        let headers = reader
            .headers()?
            .iter()
            .map(|h| h.trim().trim_start_matches('\u{feff}').to_string())
            .collect();
        let mut records = Vec::new();
        for row in reader.records() {
            let row = row?;
            records.push(Record {
                values: row.iter().map(str::to_string).collect(),
            });
        }

        tracing::debug!("Parsed {} rows from {}", records.len(), input_path);
        Ok(Dataset { headers, records })
    }

    async fn transform(&self, data: Dataset) -> Result<TransformResult> {
        let reference = ReferenceStore::load(&self.storage, &self.config.reference_tables()).await?;
        let resolver = Arc::new(LocationResolver::new(
            Arc::new(reference),
            &self.config.matching(),
        )?);
        let bridge = self.bridge().await?;

        aggregator::resolve_dataset(data, &self.config.columns(), resolver, bridge.as_ref()).await
    }

    async fn load(&self, result: TransformResult) -> Result<String> {
        let mut files: Vec<(&str, Vec<u8>)> = Vec::new();
        for format in self.config.output_formats() {
            match format.as_str() {
                "csv" => files.push((RESOLVED_CSV, write_delimited(&result.output, b',')?)),
                "tsv" => files.push((RESOLVED_TSV, write_delimited(&result.output, b'\t')?)),
                other => tracing::warn!("Skipping unsupported output format {}", other),
            }
        }
        files.push((UNRESOLVED_CSV, write_unresolved(result.unresolved())?));
        files.push((REPORT_JSON, serde_json::to_vec_pretty(&result.report)?));

        if self.config.compress_output() {
            tracing::debug!("Creating ZIP file with {} files", files.len());
            let zip_data = {
                let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
                for (name, data) in &files {
                    zip.start_file::<_, ()>(*name, FileOptions::default())?;
                    zip.write_all(data)?;
                }
                zip.finish()?.into_inner()
            };

            let path = self.output_file(ARCHIVE);
            tracing::debug!("Writing ZIP file ({} bytes) to storage", zip_data.len());
            self.storage.write_file(&path, &zip_data).await?;
            return Ok(path);
        }

        for (name, data) in &files {
            self.storage.write_file(&self.output_file(name), data).await?;
        }
        tracing::info!(
            "📝 {} unresolved locations written to {}",
            result.report.unresolved,
            self.output_file(UNRESOLVED_CSV)
        );
        Ok(self.config.output_path().to_string())
    }
}
