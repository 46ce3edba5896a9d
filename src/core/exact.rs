use crate::core::reference::ReferenceStore;
use crate::domain::model::{CandidateMatch, MatchSource};
use crate::domain::states::{self, State};

/// 依長度排序，先剝除較長的後綴
const COUNTY_SUFFIXES: [&str; 7] = [
    " CITY AND BOROUGH",
    " CENSUS AREA",
    " MUNICIPALITY",
    " COUNTIES",
    " BOROUGH",
    " COUNTY",
    " PARISH",
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExactMatches {
    pub county_exact: Option<CandidateMatch>,
    pub zip_crosswalk: Option<CandidateMatch>,
}

/// 郡名正規化鍵：大寫、去標點、統一 SAINT/ST、剝除行政區後綴
///
/// CITY 不剝除，維吉尼亞州的獨立市與同名郡才不會互相覆蓋。
pub fn county_key(name: &str) -> String {
    let cleaned: String = name
        .to_uppercase()
        .chars()
        .filter(|c| !matches!(c, '.' | '\'' | '’'))
        .collect();

    let tokens: Vec<&str> = cleaned
        .split_whitespace()
        .map(|t| match t {
            "SAINT" => "ST",
            "SAINTE" => "STE",
            other => other,
        })
        .collect();
    let mut key = tokens.join(" ");

    for suffix in COUNTY_SUFFIXES {
        if key.len() > suffix.len() && key.ends_with(suffix) {
            key.truncate(key.len() - suffix.len());
            break;
        }
    }
    key
}

/// 郡名精確比對；找不到時回傳 None
pub fn county_fips(reference: &ReferenceStore, state: &State, name: &str) -> Option<String> {
    if name.trim().is_empty() {
        return None;
    }
    reference
        .county_fips_by_key(state.abbr, &county_key(name))
        .map(str::to_string)
}

/// ZIP 對照，含州別一致性檢查
///
/// 對到多個郡時原樣回傳 (逗號串接)；對到的郡分屬多州、或州別與查詢不符時丟棄。
pub fn zip_candidate(
    reference: &ReferenceStore,
    state: Option<&State>,
    zip5: &str,
) -> Option<CandidateMatch> {
    let state = state?;
    if zip5.is_empty() {
        return None;
    }

    let record = reference.zip(zip5).or_else(|| {
        // 試算表常吃掉前導零
        let short_numeric = (3..5).contains(&zip5.len()) && zip5.bytes().all(|b| b.is_ascii_digit());
        if short_numeric {
            reference.zip(&format!("{:0>5}", zip5))
        } else {
            None
        }
    })?;

    let mut zip_states: Vec<&str> = Vec::new();
    for fips in &record.fips {
        let abbr = states::state_of_county_fips(fips).map(|s| s.abbr).unwrap_or("");
        if !zip_states.contains(&abbr) {
            zip_states.push(abbr);
        }
    }

    if zip_states.len() != 1 {
        tracing::debug!(
            "ZIP {} spans states {:?}; crosswalk candidate discarded",
            zip5,
            zip_states
        );
        return None;
    }
    if zip_states[0] != state.abbr {
        tracing::debug!(
            "ZIP {} belongs to {} but location says {}; crosswalk candidate discarded",
            zip5,
            zip_states[0],
            state.abbr
        );
        return None;
    }

    Some(CandidateMatch::exact(
        MatchSource::ZipCrosswalk,
        record.fips.join(","),
    ))
}

pub fn match_exact(
    reference: &ReferenceStore,
    county_part: &str,
    state: Option<&State>,
    zip5: &str,
) -> ExactMatches {
    let county_exact = state
        .and_then(|s| county_fips(reference, s, county_part))
        .map(|fips| CandidateMatch::exact(MatchSource::CountyExact, fips));

    ExactMatches {
        county_exact,
        zip_crosswalk: zip_candidate(reference, state, zip5),
    }
}
