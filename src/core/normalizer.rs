use crate::domain::model::{NormalizedLocation, RawLocation};
use crate::domain::settings::TypoRule;
use crate::domain::states;
use crate::utils::error::Result;
use regex::Regex;

const COUNTY_SEPARATORS: [&str; 3] = [" AND ", " & ", "/"];
const COUNTY_PART_SUFFIXES: [&str; 4] = [" COUNTIES", " COUNTY", " PARRISH", " PARISH"];

#[derive(Debug, Clone)]
struct CompiledTypoRule {
    state: String,
    pattern: Regex,
    replacement: String,
}

/// 把原始位置整理成比對用的標準形式；本身不會失敗
#[derive(Debug, Clone)]
pub struct Normalizer {
    typo_rules: Vec<CompiledTypoRule>,
}

impl Normalizer {
    /// 編譯修正規則；正規表示式錯誤屬設定錯誤
    pub fn new(rules: &[TypoRule]) -> Result<Self> {
        let typo_rules = rules
            .iter()
            .map(|rule| {
                Ok(CompiledTypoRule {
                    state: rule.state.trim().to_uppercase(),
                    pattern: Regex::new(&rule.pattern)?,
                    replacement: rule.replacement.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { typo_rules })
    }

    pub fn normalize(&self, raw: &RawLocation) -> NormalizedLocation {
        let state = states::lookup(&raw.state);
        let state_abbr = state.map(|s| s.abbr).unwrap_or("");

        let county_parts = split_county(&raw.county)
            .into_iter()
            .map(|part| self.apply_typo_rules(state_abbr, part))
            .collect();

        NormalizedLocation {
            city: collapse_whitespace(&raw.city.to_uppercase()),
            county_parts,
            state,
            zip5: clean_zip(&raw.zip),
        }
    }

    fn apply_typo_rules(&self, state_abbr: &str, part: String) -> String {
        if state_abbr.is_empty() {
            return part;
        }
        let mut fixed = part;
        for rule in self.typo_rules.iter().filter(|r| r.state == state_abbr) {
            let replaced = rule.pattern.replace_all(&fixed, rule.replacement.as_str());
            if replaced != fixed {
                tracing::debug!("Typo rule {:?} rewrote {:?} to {:?}", rule.pattern.as_str(), fixed, replaced);
                fixed = replaced.into_owned();
            }
        }
        collapse_whitespace(&fixed)
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 拆開多郡字串並剝除郡/parish 後綴
///
/// 空白的 county 欄位得到單一空字串部分，讓城市與 ZIP 仍能比對。
pub fn split_county(county: &str) -> Vec<String> {
    let mut joined = collapse_whitespace(&county.to_uppercase());
    for separator in COUNTY_SEPARATORS {
        joined = joined.replace(separator, ",");
    }

    let parts: Vec<String> = joined
        .split(',')
        .map(|part| strip_county_suffix(part.trim()).to_string())
        .filter(|part| !part.is_empty())
        .collect();

    if parts.is_empty() {
        vec![String::new()]
    } else {
        parts
    }
}

fn strip_county_suffix(part: &str) -> &str {
    for suffix in COUNTY_PART_SUFFIXES {
        if let Some(stripped) = part.strip_suffix(suffix) {
            return stripped.trim_end();
        }
    }
    part
}

/// 去除句點並截掉連字號之後的部分，不補零
pub fn clean_zip(zip: &str) -> String {
    let without_periods = zip.replace('.', "");
    without_periods
        .split('-')
        .next()
        .unwrap_or("")
        .trim()
        .to_string()
}
