use crate::core::reference::{NameList, ReferenceStore};
use crate::domain::model::{CandidateMatch, MatchSource};
use crate::domain::states::State;

/// 地名類型後綴，長的在前
const PLACE_SUFFIXES: [&str; 12] = [
    " CENSUS DESIGNATED PLACE",
    " CITY AND BOROUGH",
    " CENSUS AREA",
    " MUNICIPALITY",
    " TOWNSHIP",
    " BOROUGH",
    " VILLAGE",
    " COUNTY",
    " PARISH",
    " CITY",
    " TOWN",
    " CDP",
];

/// 剝除結尾的地名類型後綴 (只剝一次，名稱本身就是後綴時保留)
pub fn strip_place_suffix(name: &str) -> &str {
    let name = name.trim();
    for suffix in PLACE_SUFFIXES {
        if name.len() <= suffix.len() {
            continue;
        }
        let split = name.len() - suffix.len();
        if let Some(tail) = name.get(split..) {
            if tail.eq_ignore_ascii_case(suffix) {
                return name[..split].trim_end();
            }
        }
    }
    name
}

/// 小寫化，非英數字元換成空白
pub fn default_process(text: &str) -> String {
    let processed: String = text
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_lowercase().next().unwrap_or(c)
            } else {
                ' '
            }
        })
        .collect();
    processed.trim().to_string()
}

/// 部分比對分數 (0 到 100)
///
/// 短字串在長字串上滑動，取最佳視窗 (或整串) 的正規化 Levenshtein 相似度；
/// 短字串完整出現在長字串中時為 100。
pub fn partial_ratio(a: &str, b: &str) -> f64 {
    let a = default_process(a);
    let b = default_process(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let (short, long) = if a.chars().count() <= b.chars().count() {
        (a, b)
    } else {
        (b, a)
    };
    if long.contains(&short) {
        return 100.0;
    }

    let long_chars: Vec<char> = long.chars().collect();
    let width = short.chars().count();
    // 長度相近時漏字的整體相似度會高於任何等長視窗
    let mut best = strsim::normalized_levenshtein(&short, &long) * 100.0;
    for start in 0..=(long_chars.len() - width) {
        let window: String = long_chars[start..start + width].iter().collect();
        let score = strsim::normalized_levenshtein(&short, &window) * 100.0;
        if score > best {
            best = score;
        }
    }
    best
}

/// 在指定州的名單中找分數最高的名稱，同分取先出現者
pub fn fuzzy_best(
    reference: &ReferenceStore,
    state: Option<&State>,
    query: &str,
    list: NameList,
    source: MatchSource,
) -> Option<CandidateMatch> {
    let state = state?;
    if query.trim().is_empty() {
        return None;
    }

    let mut best: Option<(f64, usize)> = None;
    let entries = reference.names(state.abbr, list);
    for (i, entry) in entries.iter().enumerate() {
        let score = partial_ratio(query, &entry.match_name);
        match best {
            Some((best_score, _)) if score <= best_score => {}
            _ => best = Some((score, i)),
        }
    }

    best.map(|(score, i)| {
        let entry = &entries[i];
        CandidateMatch {
            source,
            fips: entry.fips.clone(),
            score: Some(score),
            matched_name: Some(entry.name.clone()),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{GeographyRecord, PlaceRecord};
    use crate::domain::states::by_abbr;

    fn county(state: &str, name: &str, fips: &str) -> GeographyRecord {
        GeographyRecord {
            state: state.to_string(),
            county_name: name.to_string(),
            fips: fips.to_string(),
        }
    }

    fn place(state: &str, name: &str, fips: &[&str]) -> PlaceRecord {
        PlaceRecord {
            state: state.to_string(),
            county_names: vec![],
            place_name: name.to_string(),
            fips: fips.iter().map(|f| f.to_string()).collect(),
        }
    }

    fn store() -> ReferenceStore {
        ReferenceStore::from_records(
            vec![
                county("RI", "BRISTOL COUNTY", "44001"),
                county("RI", "WASHINGTON COUNTY", "44009"),
                county("VT", "WASHINGTON COUNTY", "50023"),
                county("KY", "HARRISON COUNTY", "21097"),
                county("KY", "HARRIS COUNTY", "21999"),
            ],
            vec![
                place("ME", "BANGOR CITY", &["23019"]),
                place("ME", "BANGOR CDP", &["23029"]),
                place("KY", "MILLERSBURG CITY", &["21017", "21097"]),
            ],
            vec![],
        )
    }

    #[test]
    fn test_strip_place_suffix() {
        assert_eq!(strip_place_suffix("PARIS CITY"), "PARIS");
        assert_eq!(strip_place_suffix("NOME CENSUS AREA"), "NOME");
        assert_eq!(strip_place_suffix("JUNEAU CITY AND BOROUGH"), "JUNEAU");
        assert_eq!(strip_place_suffix("Yardley borough"), "Yardley");
        assert_eq!(strip_place_suffix("CITY"), "CITY");
        assert_eq!(strip_place_suffix("CITYVIEW"), "CITYVIEW");
        assert_eq!(strip_place_suffix("TOWN AND COUNTRY CITY"), "TOWN AND COUNTRY");
    }

    #[test]
    fn test_default_process() {
        assert_eq!(default_process("  St. Mary's-Parish "), "st  mary s parish");
        assert_eq!(default_process("..."), "");
    }

    #[test]
    fn test_partial_ratio() {
        assert_eq!(partial_ratio("WASH", "WASHINGTON"), 100.0);
        assert_eq!(partial_ratio("washington", "WASH"), 100.0);
        assert_eq!(partial_ratio("", "WASHINGTON"), 0.0);
        assert_eq!(partial_ratio("HARRISON", "HARRISON"), 100.0);
        let typo = partial_ratio("HARISON", "HARRISON");
        assert!(typo > 80.0 && typo < 100.0, "score was {}", typo);
        assert!(partial_ratio("BRISTOL", "WASHINGTON") < 50.0);
    }

    #[test]
    fn test_fuzzy_best_picks_highest_score() {
        let store = store();
        let hit = fuzzy_best(
            &store,
            by_abbr("RI"),
            "WASH",
            NameList::Counties,
            MatchSource::FuzzyCounty,
        )
        .unwrap();
        assert_eq!(hit.fips, "44009");
        assert_eq!(hit.score, Some(100.0));
        assert_eq!(hit.matched_name.as_deref(), Some("WASHINGTON COUNTY"));
        assert_eq!(hit.source, MatchSource::FuzzyCounty);
    }

    #[test]
    fn test_fuzzy_best_is_state_scoped() {
        let store = store();
        let hit = fuzzy_best(
            &store,
            by_abbr("VT"),
            "WASHINGTON",
            NameList::Counties,
            MatchSource::FuzzyCounty,
        )
        .unwrap();
        assert!(hit.fips.starts_with("50"));

        assert!(fuzzy_best(&store, by_abbr("TX"), "WASHINGTON", NameList::Counties, MatchSource::FuzzyCounty).is_none());
    }

    #[test]
    fn test_fuzzy_best_ties_break_by_first_occurrence() {
        let store = store();
        let hit = fuzzy_best(&store, by_abbr("ME"), "BANGOR", NameList::Places, MatchSource::FuzzyCity)
            .unwrap();
        assert_eq!(hit.fips, "23019");
        assert_eq!(hit.matched_name.as_deref(), Some("BANGOR CITY"));

        // HARRIS 完整出現在 HARRISON 中，但 HARRISON 排在前面
        let hit = fuzzy_best(&store, by_abbr("KY"), "HARRIS", NameList::Counties, MatchSource::FuzzyCounty)
            .unwrap();
        assert_eq!(hit.fips, "21097");
    }

    #[test]
    fn test_fuzzy_best_empty_inputs() {
        let store = store();
        assert!(fuzzy_best(&store, None, "BANGOR", NameList::Places, MatchSource::FuzzyCity).is_none());
        assert!(fuzzy_best(&store, by_abbr("ME"), "  ", NameList::Places, MatchSource::FuzzyCity).is_none());
    }

    #[test]
    fn test_place_fips_are_joined() {
        let store = store();
        let hit = fuzzy_best(
            &store,
            by_abbr("KY"),
            "MILLERSBURG",
            NameList::Places,
            MatchSource::FuzzyCity,
        )
        .unwrap();
        assert_eq!(hit.fips, "21017,21097");
    }
}
