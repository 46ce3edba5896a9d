use crate::domain::states::State;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 標準郡資料：fips 為五位數，前兩碼等於州代碼
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeographyRecord {
    pub state: String,
    pub county_name: String,
    pub fips: String,
}

/// 地名可能橫跨多個郡，fips 依檔案出現順序保存且不重複
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceRecord {
    pub state: String,
    pub county_names: Vec<String>,
    pub place_name: String,
    pub fips: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZipRecord {
    pub zip: String,
    pub fips: Vec<String>,
}

/// 原始位置欄位，原樣保留作為回填時的 join key
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RawLocation {
    pub city: String,
    pub county: String,
    pub state: String,
    pub zip: String,
}

impl RawLocation {
    pub fn new(city: &str, county: &str, state: &str, zip: &str) -> Self {
        Self {
            city: city.to_string(),
            county: county.to_string(),
            state: state.to_string(),
            zip: zip.to_string(),
        }
    }

    /// 快取用的標準請求簽章
    pub fn signature(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.city.trim().to_uppercase(),
            self.county.trim().to_uppercase(),
            self.state.trim().to_uppercase(),
            self.zip.trim().to_uppercase()
        )
    }
}

impl fmt::Display for RawLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(city={:?}, county={:?}, state={:?}, zip={:?})",
            self.city, self.county, self.state, self.zip
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedLocation {
    pub city: String,
    pub county_parts: Vec<String>,
    pub state: Option<&'static State>,
    pub zip5: String,
}

impl NormalizedLocation {
    pub fn state_abbr(&self) -> &str {
        self.state.map(|s| s.abbr).unwrap_or("")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    ZipCrosswalk,
    CountyExact,
    FuzzyCounty,
    FuzzyCity,
    FuzzyPlaceAsCounty,
}

/// 單一 matcher 的候選答案；確定性來源的 score 為 None (視為最高信心)
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateMatch {
    pub source: MatchSource,
    pub fips: String,
    pub score: Option<f64>,
    pub matched_name: Option<String>,
}

impl CandidateMatch {
    pub fn exact(source: MatchSource, fips: impl Into<String>) -> Self {
        Self {
            source,
            fips: fips.into(),
            score: None,
            matched_name: None,
        }
    }

    /// ZIP 對到多個郡時 fips 為逗號串接，信任度低於單一郡
    pub fn is_multi_valued(&self) -> bool {
        self.fips.contains(',')
    }

    pub fn score_or_max(&self) -> f64 {
        self.score.unwrap_or(100.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    ZipCrosswalk,
    CountyExact,
    FuzzyNewEngland,
    FuzzyAgreement,
    FuzzyHigherScore,
    FuzzyCounty,
    FuzzyCity,
    LlmCleanup,
    PlacesConsensus,
    Mixed,
    Unresolved,
}

impl ResolutionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionSource::ZipCrosswalk => "zip_crosswalk",
            ResolutionSource::CountyExact => "county_exact",
            ResolutionSource::FuzzyNewEngland => "fuzzy_new_england",
            ResolutionSource::FuzzyAgreement => "fuzzy_agreement",
            ResolutionSource::FuzzyHigherScore => "fuzzy_higher_score",
            ResolutionSource::FuzzyCounty => "fuzzy_county",
            ResolutionSource::FuzzyCity => "fuzzy_city",
            ResolutionSource::LlmCleanup => "llm_cleanup",
            ResolutionSource::PlacesConsensus => "places_consensus",
            ResolutionSource::Mixed => "mixed",
            ResolutionSource::Unresolved => "unresolved",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedReason {
    NoCandidate,
    ReferenceDataGap,
    OracleFailure,
    OracleDisagreement,
    Interrupted,
}

impl UnresolvedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnresolvedReason::NoCandidate => "no_candidate",
            UnresolvedReason::ReferenceDataGap => "reference_data_gap",
            UnresolvedReason::OracleFailure => "oracle_failure",
            UnresolvedReason::OracleDisagreement => "oracle_disagreement",
            UnresolvedReason::Interrupted => "interrupted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedLocation {
    pub original: RawLocation,
    pub fips: String,
    pub resolution_source: ResolutionSource,
    pub unresolved_reason: Option<UnresolvedReason>,
}

impl ResolvedLocation {
    pub fn is_resolved(&self) -> bool {
        !self.fips.is_empty()
    }

    pub fn is_ambiguous(&self) -> bool {
        self.fips.contains(',')
    }

    /// 只有在先前未解析時才接受第二輪結果
    pub fn apply_second_pass(&mut self, fips: String, source: ResolutionSource) -> bool {
        if self.is_resolved() || fips.is_empty() {
            return false;
        }
        self.fips = fips;
        self.resolution_source = source;
        self.unresolved_reason = None;
        true
    }

    pub fn mark_unresolved(&mut self, reason: UnresolvedReason) {
        if !self.is_resolved() {
            self.unresolved_reason = Some(reason);
        }
    }
}

/// 表格資料：標頭加上逐列字串值
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dataset {
    pub headers: Vec<String>,
    pub records: Vec<Record>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    pub values: Vec<String>,
}

impl Dataset {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Record {
    pub fn get(&self, index: usize) -> &str {
        self.values.get(index).map(String::as_str).unwrap_or("")
    }
}

/// 一次執行的統計，寫入 resolution_report.json
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResolutionReport {
    pub input_rows: usize,
    pub unique_locations: usize,
    pub resolved: usize,
    pub unresolved: usize,
    pub ambiguous: usize,
    pub by_source: BTreeMap<String, usize>,
    pub oracle_failures: Vec<OracleFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OracleFailure {
    pub location: RawLocation,
    pub message: String,
}

impl ResolutionReport {
    pub fn from_locations(input_rows: usize, locations: &[ResolvedLocation]) -> Self {
        let mut report = Self {
            input_rows,
            unique_locations: locations.len(),
            ..Self::default()
        };
        for location in locations {
            if location.is_resolved() {
                report.resolved += 1;
            } else {
                report.unresolved += 1;
            }
            if location.is_ambiguous() {
                report.ambiguous += 1;
            }
            *report
                .by_source
                .entry(location.resolution_source.as_str().to_string())
                .or_insert(0) += 1;
        }
        report
    }
}

/// Transform 階段的輸出
#[derive(Debug, Clone)]
pub struct TransformResult {
    pub output: Dataset,
    pub locations: Vec<ResolvedLocation>,
    pub report: ResolutionReport,
}

impl TransformResult {
    pub fn unresolved(&self) -> impl Iterator<Item = &ResolvedLocation> {
        self.locations.iter().filter(|l| !l.is_resolved())
    }
}
