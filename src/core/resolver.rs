use crate::core::arbiter::{self, CandidateSet, Decision};
use crate::core::exact;
use crate::core::fuzzy;
use crate::core::normalizer::Normalizer;
use crate::core::reference::{NameList, ReferenceStore};
use crate::domain::model::{
    MatchSource, NormalizedLocation, RawLocation, ResolutionSource, ResolvedLocation,
    UnresolvedReason,
};
use crate::domain::settings::MatchingSettings;
use crate::domain::states::{self, State};
use crate::utils::error::Result;
use std::sync::Arc;

/// 正規化、比對與仲裁的組合，不做任何網路呼叫
#[derive(Debug, Clone)]
pub struct LocationResolver {
    reference: Arc<ReferenceStore>,
    normalizer: Normalizer,
    threshold: f64,
}

impl LocationResolver {
    pub fn new(reference: Arc<ReferenceStore>, matching: &MatchingSettings) -> Result<Self> {
        Ok(Self {
            reference,
            normalizer: Normalizer::new(&matching.typo_rules)?,
            threshold: matching.fuzzy_threshold,
        })
    }

    pub fn reference(&self) -> &ReferenceStore {
        &self.reference
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn resolve(&self, raw: &RawLocation) -> ResolvedLocation {
        let normalized = self.normalizer.normalize(raw);
        let decisions: Vec<Decision> = normalized
            .county_parts
            .iter()
            .map(|part| {
                let candidates = self.candidates(&normalized, part);
                arbiter::resolve(&candidates, normalized.state, self.threshold)
            })
            .collect();

        let (fips, resolution_source) = join_decisions(&decisions);
        let unresolved_reason = if fips.is_empty() {
            Some(self.unresolved_reason(normalized.state))
        } else {
            None
        };

        ResolvedLocation {
            original: raw.clone(),
            fips,
            resolution_source,
            unresolved_reason,
        }
    }

    /// 以標準化鍵精確比對地點詳細資料回傳的郡名
    pub fn county_fips(&self, state: &State, county_name: &str) -> Option<String> {
        exact::county_fips(&self.reference, state, county_name)
    }

    /// 確定性候選存在時不計算模糊比對
    pub fn candidates(&self, normalized: &NormalizedLocation, part: &str) -> CandidateSet {
        let state = normalized.state;
        let exact = exact::match_exact(&self.reference, part, state, &normalized.zip5);
        let mut candidates = CandidateSet {
            zip_crosswalk: exact.zip_crosswalk,
            county_exact: exact.county_exact,
            ..CandidateSet::default()
        };
        if candidates.has_deterministic() {
            return candidates;
        }

        candidates.fuzzy_county = fuzzy::fuzzy_best(
            &self.reference,
            state,
            part,
            NameList::Counties,
            MatchSource::FuzzyCounty,
        );
        candidates.fuzzy_city = fuzzy::fuzzy_best(
            &self.reference,
            state,
            &normalized.city,
            NameList::Places,
            MatchSource::FuzzyCity,
        );
        if state.map(states::is_new_england).unwrap_or(false) {
            candidates.fuzzy_place_as_county = fuzzy::fuzzy_best(
                &self.reference,
                state,
                part,
                NameList::Places,
                MatchSource::FuzzyPlaceAsCounty,
            );
        }
        candidates
    }

    fn unresolved_reason(&self, state: Option<&State>) -> UnresolvedReason {
        match state {
            Some(s) if !self.reference.has_state(s.abbr) => UnresolvedReason::ReferenceDataGap,
            _ => UnresolvedReason::NoCandidate,
        }
    }
}

/// 合併各郡部分的結果：fips 去重後以逗號串接，來源一致時沿用，否則為 Mixed
///
/// 任一部分未解析時整個地點視為未解析，交給第二輪與未解析匯出。
fn join_decisions(decisions: &[Decision]) -> (String, ResolutionSource) {
    if decisions.iter().any(|d| !d.is_resolved()) {
        return (String::new(), ResolutionSource::Unresolved);
    }
    let mut codes: Vec<&str> = Vec::new();
    for decision in decisions {
        for code in decision.fips.split(',').filter(|c| !c.is_empty()) {
            if !codes.contains(&code) {
                codes.push(code);
            }
        }
    }
    if codes.is_empty() {
        return (String::new(), ResolutionSource::Unresolved);
    }

    let source = match decisions.first() {
        Some(first) if decisions.iter().all(|d| d.source == first.source) => first.source,
        _ => ResolutionSource::Mixed,
    };
    (codes.join(","), source)
}
