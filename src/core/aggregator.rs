use crate::core::augment::AugmentationBridge;
use crate::core::resolver::LocationResolver;
use crate::domain::model::{
    Dataset, RawLocation, Record, ResolutionReport, ResolvedLocation, TransformResult,
};
use crate::domain::settings::ColumnMapping;
use crate::utils::error::{EtlError, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// 位置欄位在資料集中的索引；沒有 county 欄位時每列視為空白
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationColumns {
    pub city: usize,
    pub county: Option<usize>,
    pub state: usize,
    pub zip: usize,
}

impl LocationColumns {
    pub fn locate(dataset: &Dataset, mapping: &ColumnMapping) -> Result<Self> {
        let find = |name: &str| {
            dataset
                .column_index(name)
                .ok_or_else(|| EtlError::MissingColumnError {
                    column: name.to_string(),
                })
        };
        let county = match &mapping.county {
            Some(name) => Some(find(name)?),
            None => None,
        };
        Ok(Self {
            city: find(&mapping.city)?,
            county,
            state: find(&mapping.state)?,
            zip: find(&mapping.zip)?,
        })
    }

    pub fn raw_location(&self, record: &Record) -> RawLocation {
        RawLocation {
            city: record.get(self.city).to_string(),
            county: self.county.map(|i| record.get(i)).unwrap_or("").to_string(),
            state: record.get(self.state).to_string(),
            zip: record.get(self.zip).to_string(),
        }
    }
}

/// 去重後的位置，依第一次出現的順序
pub fn unique_locations(dataset: &Dataset, columns: &LocationColumns) -> Vec<RawLocation> {
    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    for record in &dataset.records {
        let location = columns.raw_location(record);
        if seen.insert(location.clone()) {
            unique.push(location);
        }
    }
    unique
}

/// 每個唯一位置解析一次，必要時走 oracle 第二輪，最後以原始位置為鍵回填 fips 欄
pub async fn resolve_dataset(
    dataset: Dataset,
    mapping: &ColumnMapping,
    resolver: Arc<LocationResolver>,
    bridge: Option<&AugmentationBridge>,
) -> Result<TransformResult> {
    let columns = LocationColumns::locate(&dataset, mapping)?;
    let unique = unique_locations(&dataset, &columns);
    tracing::info!(
        "🔄 {} rows reduced to {} unique locations",
        dataset.len(),
        unique.len()
    );

    let mut locations: Vec<ResolvedLocation> = unique.iter().map(|l| resolver.resolve(l)).collect();
    let first_pass = locations.iter().filter(|l| l.is_resolved()).count();
    tracing::info!("✅ First pass resolved {}/{} locations", first_pass, locations.len());

    let mut oracle_failures = Vec::new();
    if let Some(bridge) = bridge.filter(|b| b.is_enabled()) {
        let pending: Vec<RawLocation> = locations
            .iter()
            .filter(|l| !l.is_resolved())
            .map(|l| l.original.clone())
            .collect();
        let outcome = bridge.augment(resolver.clone(), &pending).await;
        for location in locations.iter_mut().filter(|l| !l.is_resolved()) {
            if let Some(found) = outcome.resolved.get(&location.original) {
                location.apply_second_pass(found.fips.clone(), found.source);
            } else if let Some(reason) = outcome.unresolved.get(&location.original) {
                location.mark_unresolved(*reason);
            }
        }
        oracle_failures = outcome.failures;
    }

    let mut report = ResolutionReport::from_locations(dataset.len(), &locations);
    report.oracle_failures = oracle_failures;
    if report.unresolved > 0 {
        tracing::warn!(
            "⚠️ {} unique locations remain unresolved",
            report.unresolved
        );
    }

    let output = join_fips(dataset, &columns, &mapping.fips, &locations);
    Ok(TransformResult {
        output,
        locations,
        report,
    })
}

/// 加上 (或覆寫) fips 欄；每一列都有值，未解析為空字串
fn join_fips(
    mut dataset: Dataset,
    columns: &LocationColumns,
    fips_column: &str,
    locations: &[ResolvedLocation],
) -> Dataset {
    let by_location: HashMap<&RawLocation, &str> = locations
        .iter()
        .map(|l| (&l.original, l.fips.as_str()))
        .collect();

    let existing = dataset.column_index(fips_column);
    if existing.is_none() {
        dataset.headers.push(fips_column.to_string());
    }
    let width = dataset.headers.len();

    for record in &mut dataset.records {
        let fips = by_location
            .get(&columns.raw_location(record))
            .copied()
            .unwrap_or("")
            .to_string();
        match existing {
            Some(index) => {
                if record.values.len() <= index {
                    record.values.resize(index + 1, String::new());
                }
                record.values[index] = fips;
            }
            None => {
                record.values.resize(width - 1, String::new());
                record.values.push(fips);
            }
        }
    }
    dataset
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::reference::ReferenceStore;
    use crate::domain::model::{GeographyRecord, ResolutionSource, ZipRecord};
    use crate::domain::settings::MatchingSettings;

    fn dataset(headers: &[&str], rows: &[&[&str]]) -> Dataset {
        Dataset {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            records: rows
                .iter()
                .map(|r| Record {
                    values: r.iter().map(|v| v.to_string()).collect(),
                })
                .collect(),
        }
    }

    fn resolver() -> Arc<LocationResolver> {
        let county = |state: &str, name: &str, fips: &str| GeographyRecord {
            state: state.to_string(),
            county_name: name.to_string(),
            fips: fips.to_string(),
        };
        let store = ReferenceStore::from_records(
            vec![
                county("KY", "HARRISON COUNTY", "21097"),
                county("KY", "BOURBON COUNTY", "21017"),
                county("ME", "KNOX COUNTY", "23013"),
            ],
            vec![],
            vec![ZipRecord {
                zip: "04843".to_string(),
                fips: vec!["23013".to_string()],
            }],
        );
        Arc::new(LocationResolver::new(Arc::new(store), &MatchingSettings::default()).unwrap())
    }

    #[test]
    fn test_unique_locations_keep_first_occurrence_order() {
        let data = dataset(
            &["case", "city", "county", "state", "zip"],
            &[
                &["1", "", "HARRISON", "KY", ""],
                &["2", "", "", "ME", "04843"],
                &["3", "", "HARRISON", "KY", ""],
            ],
        );
        let columns = LocationColumns::locate(&data, &ColumnMapping::default()).unwrap();
        let unique = unique_locations(&data, &columns);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0], RawLocation::new("", "HARRISON", "KY", ""));
    }

    #[test]
    fn test_missing_column_is_an_error() {
        let data = dataset(&["city", "state"], &[]);
        let result = LocationColumns::locate(&data, &ColumnMapping::default());
        assert!(matches!(result, Err(EtlError::MissingColumnError { .. })));
    }

    #[test]
    fn test_dataset_without_county_column() {
        let data = dataset(&["city", "state", "zip"], &[&["", "ME", "04843"]]);
        let mapping = ColumnMapping {
            county: None,
            ..ColumnMapping::default()
        };
        let columns = LocationColumns::locate(&data, &mapping).unwrap();
        assert_eq!(columns.county, None);
        assert_eq!(
            columns.raw_location(&data.records[0]),
            RawLocation::new("", "", "ME", "04843")
        );
    }

    #[tokio::test]
    async fn test_resolve_dataset_joins_every_row() {
        let data = dataset(
            &["case", "city", "county", "state", "zip"],
            &[
                &["1", "", "HARRISON & BOURBON COUNTIES", "KY", ""],
                &["2", "", "", "ME", "04843"],
                &["3", "Nowhereville", "", "ZZ", ""],
                &["4", "", "HARRISON & BOURBON COUNTIES", "KY", ""],
            ],
        );
        let result = resolve_dataset(data, &ColumnMapping::default(), resolver(), None)
            .await
            .unwrap();

        assert_eq!(result.output.headers.last().map(String::as_str), Some("fips"));
        let fips: Vec<&str> = result
            .output
            .records
            .iter()
            .map(|r| r.get(5))
            .collect();
        assert_eq!(fips, vec!["21097,21017", "23013", "", "21097,21017"]);

        assert_eq!(result.report.input_rows, 4);
        assert_eq!(result.report.unique_locations, 3);
        assert_eq!(result.report.unresolved, 1);
        assert_eq!(result.unresolved().count(), 1);
        assert_eq!(
            result.locations[0].resolution_source,
            ResolutionSource::CountyExact
        );
    }

    #[tokio::test]
    async fn test_partially_matched_multi_county_is_reported_unresolved() {
        let data = dataset(
            &["city", "county", "state", "zip"],
            &[&["", "HARRISON & QQQZZZ", "KY", ""]],
        );
        let result = resolve_dataset(data, &ColumnMapping::default(), resolver(), None)
            .await
            .unwrap();

        assert_eq!(result.output.records[0].get(4), "");
        assert_eq!(result.report.unresolved, 1);
        let residual: Vec<&RawLocation> = result.unresolved().map(|l| &l.original).collect();
        assert_eq!(residual, vec![&RawLocation::new("", "HARRISON & QQQZZZ", "KY", "")]);
    }

    #[tokio::test]
    async fn test_existing_fips_column_is_overwritten() {
        let data = dataset(
            &["city", "county", "state", "zip", "fips"],
            &[&["", "BOURBON", "KY", "", "stale"]],
        );
        let result = resolve_dataset(data, &ColumnMapping::default(), resolver(), None)
            .await
            .unwrap();
        assert_eq!(result.output.headers.len(), 5);
        assert_eq!(result.output.records[0].get(4), "21017");
    }

    #[tokio::test]
    async fn test_resolve_dataset_is_idempotent() {
        let data = dataset(
            &["city", "county", "state", "zip"],
            &[
                &["", "HARRISON", "KY", ""],
                &["", "BOURBN", "KY", ""],
                &["", "", "ME", "4843"],
            ],
        );
        let first = resolve_dataset(data.clone(), &ColumnMapping::default(), resolver(), None)
            .await
            .unwrap();
        let second = resolve_dataset(data, &ColumnMapping::default(), resolver(), None)
            .await
            .unwrap();
        assert_eq!(first.output, second.output);
    }
}
