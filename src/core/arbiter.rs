use crate::domain::model::{CandidateMatch, ResolutionSource};
use crate::domain::states::{self, State};

/// 單一郡部分的所有候選答案
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateSet {
    pub zip_crosswalk: Option<CandidateMatch>,
    pub county_exact: Option<CandidateMatch>,
    pub fuzzy_county: Option<CandidateMatch>,
    pub fuzzy_city: Option<CandidateMatch>,
    pub fuzzy_place_as_county: Option<CandidateMatch>,
}

impl CandidateSet {
    pub fn has_deterministic(&self) -> bool {
        usable(&self.zip_crosswalk).is_some() || usable(&self.county_exact).is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub fips: String,
    pub source: ResolutionSource,
}

impl Decision {
    pub fn unresolved() -> Self {
        Self {
            fips: String::new(),
            source: ResolutionSource::Unresolved,
        }
    }

    fn from(candidate: &CandidateMatch, source: ResolutionSource) -> Self {
        Self {
            fips: candidate.fips.clone(),
            source,
        }
    }

    pub fn is_resolved(&self) -> bool {
        !self.fips.is_empty()
    }
}

fn usable(candidate: &Option<CandidateMatch>) -> Option<&CandidateMatch> {
    candidate.as_ref().filter(|c| !c.fips.is_empty())
}

fn above(candidate: Option<&CandidateMatch>, bar: f64) -> Option<&CandidateMatch> {
    candidate.filter(|c| c.score_or_max() > bar)
}

/// 依優先順序選出唯一答案，第一條成立的規則勝出
///
/// 1. ZIP 對照
/// 2. 郡名精確比對
/// 3. 新英格蘭州且地名當郡名的分數 > threshold + 10
/// 4. 郡與城市模糊比對一致且都 > threshold
/// 5. 兩者不一致時，分數較高者 > threshold + 5 (同分取郡)
/// 6. 郡模糊比對 > threshold + 10
/// 7. 城市模糊比對 > threshold + 10
/// 8. 無解
///
/// 所有門檻都是嚴格大於。
pub fn resolve(candidates: &CandidateSet, state: Option<&State>, threshold: f64) -> Decision {
    if let Some(zip) = usable(&candidates.zip_crosswalk) {
        return Decision::from(zip, ResolutionSource::ZipCrosswalk);
    }
    if let Some(exact) = usable(&candidates.county_exact) {
        return Decision::from(exact, ResolutionSource::CountyExact);
    }

    let new_england = state.map(states::is_new_england).unwrap_or(false);
    if new_england {
        if let Some(town) = above(usable(&candidates.fuzzy_place_as_county), threshold + 10.0) {
            return Decision::from(town, ResolutionSource::FuzzyNewEngland);
        }
    }

    let county = usable(&candidates.fuzzy_county);
    let city = usable(&candidates.fuzzy_city);

    if let (Some(c), Some(p)) = (county, city) {
        let (county_score, city_score) = (c.score_or_max(), p.score_or_max());
        if c.fips == p.fips {
            if county_score > threshold && city_score > threshold {
                return Decision::from(c, ResolutionSource::FuzzyAgreement);
            }
        } else {
            let higher = if county_score >= city_score { c } else { p };
            if let Some(winner) = above(Some(higher), threshold + 5.0) {
                return Decision::from(winner, ResolutionSource::FuzzyHigherScore);
            }
        }
    }

    if let Some(c) = above(county, threshold + 10.0) {
        return Decision::from(c, ResolutionSource::FuzzyCounty);
    }
    if let Some(p) = above(city, threshold + 10.0) {
        return Decision::from(p, ResolutionSource::FuzzyCity);
    }

    Decision::unresolved()
}
