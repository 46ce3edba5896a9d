use crate::core::exact::county_key;
use crate::core::fuzzy::strip_place_suffix;
use crate::domain::model::{GeographyRecord, PlaceRecord, ZipRecord};
use crate::domain::ports::Storage;
use crate::domain::settings::ReferenceTables;
use crate::domain::states;
use crate::utils::error::{EtlError, Result};
use csv::StringRecord;
use std::collections::HashMap;

/// 模糊比對候選：原始名稱、去除地名後綴後的比對名稱、對應 fips
#[derive(Debug, Clone, PartialEq)]
pub struct NameEntry {
    pub name: String,
    pub match_name: String,
    pub fips: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameList {
    Counties,
    Places,
}

/// 唯讀的參考資料，整個執行期間由所有 matcher 共用
#[derive(Debug, Default)]
pub struct ReferenceStore {
    counties: Vec<GeographyRecord>,
    places: Vec<PlaceRecord>,
    county_keys: HashMap<(String, String), String>,
    county_names: HashMap<String, Vec<NameEntry>>,
    place_names: HashMap<String, Vec<NameEntry>>,
    zips: HashMap<String, ZipRecord>,
}

impl ReferenceStore {
    pub fn from_records(
        counties: Vec<GeographyRecord>,
        places: Vec<PlaceRecord>,
        zips: Vec<ZipRecord>,
    ) -> Self {
        let mut county_keys = HashMap::new();
        let mut county_names: HashMap<String, Vec<NameEntry>> = HashMap::new();
        for county in &counties {
            let key = (county.state.clone(), county_key(&county.county_name));
            if let Some(existing) = county_keys.get(&key) {
                tracing::debug!(
                    "Duplicate county key {:?} in {} ({} kept, {} ignored)",
                    key.1,
                    county.state,
                    existing,
                    county.fips
                );
            } else {
                county_keys.insert(key, county.fips.clone());
            }
            push_name(&mut county_names, &county.state, &county.county_name, county.fips.clone());
        }

        let mut place_names: HashMap<String, Vec<NameEntry>> = HashMap::new();
        for place in &places {
            push_name(&mut place_names, &place.state, &place.place_name, place.fips.join(","));
        }

        let zips = zips.into_iter().map(|z| (z.zip.clone(), z)).collect();

        Self {
            counties,
            places,
            county_keys,
            county_names,
            place_names,
            zips,
        }
    }

    pub async fn load<S: Storage>(storage: &S, tables: &ReferenceTables) -> Result<Self> {
        let county_bytes = storage.read_file(&tables.county_table).await?;
        let counties = parse_county_table(&county_bytes)?;
        tracing::info!("🗺️ Loaded {} counties from {}", counties.len(), tables.county_table);

        let place_bytes = storage.read_file(&tables.place_table).await?;
        let places = parse_place_table(&place_bytes)?;
        tracing::info!("🗺️ Loaded {} places from {}", places.len(), tables.place_table);

        let zip_bytes = storage.read_file(&tables.zip_table).await?;
        let zips = parse_zip_table(&zip_bytes)?;
        tracing::info!("🗺️ Loaded {} ZIP codes from {}", zips.len(), tables.zip_table);

        Ok(Self::from_records(counties, places, zips))
    }

    pub fn counties(&self) -> &[GeographyRecord] {
        &self.counties
    }

    pub fn places(&self) -> &[PlaceRecord] {
        &self.places
    }

    /// 以標準化郡名鍵查詢；state 為兩字母縮寫
    pub fn county_fips_by_key(&self, state: &str, key: &str) -> Option<&str> {
        self.county_keys
            .get(&(state.to_string(), key.to_string()))
            .map(String::as_str)
    }

    pub fn names(&self, state: &str, list: NameList) -> &[NameEntry] {
        let index = match list {
            NameList::Counties => &self.county_names,
            NameList::Places => &self.place_names,
        };
        index.get(state).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_state(&self, state: &str) -> bool {
        self.county_names.contains_key(state) || self.place_names.contains_key(state)
    }

    pub fn zip(&self, zip5: &str) -> Option<&ZipRecord> {
        self.zips.get(zip5)
    }
}

fn push_name(index: &mut HashMap<String, Vec<NameEntry>>, state: &str, name: &str, fips: String) {
    let match_name = strip_place_suffix(name).to_string();
    if match_name.is_empty() {
        return;
    }
    index.entry(state.to_string()).or_default().push(NameEntry {
        name: name.to_string(),
        match_name,
        fips,
    });
}

fn reader(bytes: &[u8]) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .delimiter(b'|')
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes)
}

fn column(headers: &StringRecord, table: &str, name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h.trim().trim_start_matches('\u{feff}').eq_ignore_ascii_case(name))
        .ok_or_else(|| EtlError::ReferenceDataError {
            table: table.to_string(),
            message: format!("missing column {}", name),
        })
}

fn field(record: &StringRecord, index: usize) -> String {
    record.get(index).unwrap_or("").trim().to_uppercase()
}

/// fips 必須為五位數且前兩碼與州一致
fn is_valid_county_fips(state: &str, fips: &str) -> bool {
    match states::state_of_county_fips(fips) {
        Some(fips_state) => fips_state.abbr == state,
        None => false,
    }
}

pub fn parse_county_table(bytes: &[u8]) -> Result<Vec<GeographyRecord>> {
    const TABLE: &str = "county";
    let mut rdr = reader(bytes);
    let headers = rdr.headers()?.clone();
    let state_col = column(&headers, TABLE, "STATE")?;
    let statefp_col = column(&headers, TABLE, "STATEFP")?;
    let countyfp_col = column(&headers, TABLE, "COUNTYFP")?;
    let name_col = column(&headers, TABLE, "COUNTYNAME")?;

    let mut counties = Vec::new();
    let mut skipped = 0usize;
    for row in rdr.records() {
        let row = row?;
        let state = field(&row, state_col);
        let county_name = field(&row, name_col);
        let fips = format!("{}{}", field(&row, statefp_col), field(&row, countyfp_col));
        if county_name.is_empty() || !is_valid_county_fips(&state, &fips) {
            skipped += 1;
            continue;
        }
        counties.push(GeographyRecord {
            state,
            county_name,
            fips,
        });
    }

    if skipped > 0 {
        tracing::warn!("⚠️ Skipped {} county rows with empty names or invalid FIPS", skipped);
    }
    Ok(counties)
}

/// 依 (州, 地名) 聚合，保留第一次出現的順序
pub fn parse_place_table(bytes: &[u8]) -> Result<Vec<PlaceRecord>> {
    const TABLE: &str = "place_by_county";
    let mut rdr = reader(bytes);
    let headers = rdr.headers()?.clone();
    let state_col = column(&headers, TABLE, "STATE")?;
    let statefp_col = column(&headers, TABLE, "STATEFP")?;
    let countyfp_col = column(&headers, TABLE, "COUNTYFP")?;
    let county_col = column(&headers, TABLE, "COUNTYNAME")?;
    let place_col = column(&headers, TABLE, "PLACENAME")?;

    let mut places: Vec<PlaceRecord> = Vec::new();
    let mut positions: HashMap<(String, String), usize> = HashMap::new();
    let mut skipped = 0usize;
    for row in rdr.records() {
        let row = row?;
        let state = field(&row, state_col);
        let place_name = field(&row, place_col);
        let county_name = field(&row, county_col);
        let fips = format!("{}{}", field(&row, statefp_col), field(&row, countyfp_col));
        if place_name.is_empty() || !is_valid_county_fips(&state, &fips) {
            skipped += 1;
            continue;
        }

        let key = (state.clone(), place_name.clone());
        match positions.get(&key) {
            Some(&pos) => {
                let place = &mut places[pos];
                if !place.fips.contains(&fips) {
                    place.fips.push(fips);
                }
                if !place.county_names.contains(&county_name) {
                    place.county_names.push(county_name);
                }
            }
            None => {
                positions.insert(key, places.len());
                places.push(PlaceRecord {
                    state,
                    county_names: vec![county_name],
                    place_name,
                    fips: vec![fips],
                });
            }
        }
    }

    if skipped > 0 {
        tracing::warn!("⚠️ Skipped {} place rows with empty names or invalid FIPS", skipped);
    }
    Ok(places)
}

pub fn parse_zip_table(bytes: &[u8]) -> Result<Vec<ZipRecord>> {
    const TABLE: &str = "zcta_county";
    let mut rdr = reader(bytes);
    let headers = rdr.headers()?.clone();
    let zip_col = column(&headers, TABLE, "GEOID_ZCTA5_20")?;
    let fips_col = column(&headers, TABLE, "GEOID_COUNTY_20")?;

    let mut zips: Vec<ZipRecord> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut skipped = 0usize;
    for row in rdr.records() {
        let row = row?;
        let zip = field(&row, zip_col);
        let fips = field(&row, fips_col);
        if zip.is_empty() || states::state_of_county_fips(&fips).is_none() {
            skipped += 1;
            continue;
        }

        match positions.get(&zip) {
            Some(&pos) => {
                if !zips[pos].fips.contains(&fips) {
                    zips[pos].fips.push(fips);
                }
            }
            None => {
                positions.insert(zip.clone(), zips.len());
                zips.push(ZipRecord {
                    zip,
                    fips: vec![fips],
                });
            }
        }
    }

    // 全國檔包含沒有 ZCTA 的郡列，屬正常情況
    if skipped > 0 {
        tracing::debug!("Skipped {} ZCTA rows without a ZIP or county", skipped);
    }
    Ok(zips)
}

#[cfg(test)]
mod tests {
    use super::*;

    const COUNTIES: &str = "\
STATE|STATEFP|COUNTYFP|COUNTYNS|COUNTYNAME|CLASSFP|FUNCSTAT
KY|21|017|00516855|Bourbon County|H1|A
KY|21|097|00516895|Harrison County|H1|A
RI|44|009|01219782|Washington County|H1|A
LA|22|033|00558530|East Baton Rouge Parish|H1|A
KY|99|001|00000000|Broken County|H1|A
";

    const PLACES: &str = "\
STATE|STATEFP|COUNTYFP|COUNTYNAME|PLACEFP|PLACENS|PLACENAME|TYPE|CLASSFP|FUNCSTAT
KY|21|017|Bourbon County|60852|02404495|Paris city|INCORPORATED PLACE|C1|A
KY|21|097|Harrison County|13090|02403993|Cynthiana city|INCORPORATED PLACE|C1|A
KY|21|017|Bourbon County|99999|00000000|Millersburg city|INCORPORATED PLACE|C1|A
KY|21|097|Harrison County|99999|00000000|Millersburg city|INCORPORATED PLACE|C1|A
";

    const ZIPS: &str = "\
OID_ZCTA5_20|GEOID_ZCTA5_20|NAMELSAD_ZCTA5_20|OID_COUNTY_20|GEOID_COUNTY_20|NAMELSAD_COUNTY_20
1|04843|ZCTA5 04843|2|23013|Knox County
1|40361|ZCTA5 40361|2|21017|Bourbon County
1|40361|ZCTA5 40361|2|21097|Harrison County
1||| 3|23013|Knox County
";

    #[test]
    fn test_parse_county_table_uppercases_and_validates() {
        let counties = parse_county_table(COUNTIES.as_bytes()).unwrap();
        assert_eq!(counties.len(), 4);
        assert_eq!(counties[0].county_name, "BOURBON COUNTY");
        assert_eq!(counties[0].fips, "21017");
        assert!(counties.iter().all(|c| c.fips.len() == 5));
    }

    #[test]
    fn test_parse_place_table_aggregates_straddling_places() {
        let places = parse_place_table(PLACES.as_bytes()).unwrap();
        assert_eq!(places.len(), 3);
        let millersburg = places
            .iter()
            .find(|p| p.place_name == "MILLERSBURG CITY")
            .unwrap();
        assert_eq!(millersburg.fips, vec!["21017", "21097"]);
        assert_eq!(
            millersburg.county_names,
            vec!["BOURBON COUNTY", "HARRISON COUNTY"]
        );
    }

    #[test]
    fn test_parse_zip_table_aggregates_counties() {
        let zips = parse_zip_table(ZIPS.as_bytes()).unwrap();
        assert_eq!(zips.len(), 2);
        assert_eq!(zips[1].zip, "40361");
        assert_eq!(zips[1].fips, vec!["21017", "21097"]);
    }

    #[test]
    fn test_missing_column_is_reference_error() {
        let result = parse_zip_table(b"ZIP|FIPS\n04843|23013\n");
        assert!(matches!(result, Err(EtlError::ReferenceDataError { .. })));
    }

    #[test]
    fn test_store_indexes_by_state() {
        let store = ReferenceStore::from_records(
            parse_county_table(COUNTIES.as_bytes()).unwrap(),
            parse_place_table(PLACES.as_bytes()).unwrap(),
            parse_zip_table(ZIPS.as_bytes()).unwrap(),
        );

        assert_eq!(store.county_fips_by_key("KY", "HARRISON"), Some("21097"));
        assert_eq!(store.county_fips_by_key("RI", "HARRISON"), None);
        assert_eq!(store.names("KY", NameList::Counties).len(), 2);
        assert_eq!(store.names("RI", NameList::Places).len(), 0);
        assert_eq!(store.names("ZZ", NameList::Counties).len(), 0);

        let paris = &store.names("KY", NameList::Places)[0];
        assert_eq!(paris.name, "PARIS CITY");
        assert_eq!(paris.match_name, "PARIS");
        assert_eq!(store.zip("04843").unwrap().fips, vec!["23013"]);
    }
}
