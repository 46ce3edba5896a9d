/// 州或州級行政區 (含 DC 與屬地)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct State {
    pub abbr: &'static str,
    pub name: &'static str,
    pub fips: &'static str,
}

const fn st(abbr: &'static str, name: &'static str, fips: &'static str) -> State {
    State { abbr, name, fips }
}

pub static STATES: &[State] = &[
    st("AL", "ALABAMA", "01"),
    st("AK", "ALASKA", "02"),
    st("AZ", "ARIZONA", "04"),
    st("AR", "ARKANSAS", "05"),
    st("CA", "CALIFORNIA", "06"),
    st("CO", "COLORADO", "08"),
    st("CT", "CONNECTICUT", "09"),
    st("DE", "DELAWARE", "10"),
    st("DC", "DISTRICT OF COLUMBIA", "11"),
    st("FL", "FLORIDA", "12"),
    st("GA", "GEORGIA", "13"),
    st("HI", "HAWAII", "15"),
    st("ID", "IDAHO", "16"),
    st("IL", "ILLINOIS", "17"),
    st("IN", "INDIANA", "18"),
    st("IA", "IOWA", "19"),
    st("KS", "KANSAS", "20"),
    st("KY", "KENTUCKY", "21"),
    st("LA", "LOUISIANA", "22"),
    st("ME", "MAINE", "23"),
    st("MD", "MARYLAND", "24"),
    st("MA", "MASSACHUSETTS", "25"),
    st("MI", "MICHIGAN", "26"),
    st("MN", "MINNESOTA", "27"),
    st("MS", "MISSISSIPPI", "28"),
    st("MO", "MISSOURI", "29"),
    st("MT", "MONTANA", "30"),
    st("NE", "NEBRASKA", "31"),
    st("NV", "NEVADA", "32"),
    st("NH", "NEW HAMPSHIRE", "33"),
    st("NJ", "NEW JERSEY", "34"),
    st("NM", "NEW MEXICO", "35"),
    st("NY", "NEW YORK", "36"),
    st("NC", "NORTH CAROLINA", "37"),
    st("ND", "NORTH DAKOTA", "38"),
    st("OH", "OHIO", "39"),
    st("OK", "OKLAHOMA", "40"),
    st("OR", "OREGON", "41"),
    st("PA", "PENNSYLVANIA", "42"),
    st("RI", "RHODE ISLAND", "44"),
    st("SC", "SOUTH CAROLINA", "45"),
    st("SD", "SOUTH DAKOTA", "46"),
    st("TN", "TENNESSEE", "47"),
    st("TX", "TEXAS", "48"),
    st("UT", "UTAH", "49"),
    st("VT", "VERMONT", "50"),
    st("VA", "VIRGINIA", "51"),
    st("WA", "WASHINGTON", "53"),
    st("WV", "WEST VIRGINIA", "54"),
    st("WI", "WISCONSIN", "55"),
    st("WY", "WYOMING", "56"),
    st("AS", "AMERICAN SAMOA", "60"),
    st("GU", "GUAM", "66"),
    st("MP", "NORTHERN MARIANA ISLANDS", "69"),
    st("PR", "PUERTO RICO", "72"),
    st("VI", "U.S. VIRGIN ISLANDS", "78"),
];

/// 新英格蘭六州的 county 欄位常填城鎮名
pub const NEW_ENGLAND: [&str; 6] = ["CT", "ME", "MA", "NH", "RI", "VT"];

/// 接受兩字母縮寫、全名或兩位數 FIPS 代碼；無法辨識時回傳 None
pub fn lookup(input: &str) -> Option<&'static State> {
    let key = input.trim().to_uppercase();
    if key.is_empty() {
        return None;
    }

    let key = key.trim_end_matches('.');
    if key.len() == 2 {
        if key.bytes().all(|b| b.is_ascii_digit()) {
            return by_fips_prefix(key);
        }
        return by_abbr(key);
    }

    let collapsed = key.split_whitespace().collect::<Vec<_>>().join(" ");
    let collapsed = match collapsed.as_str() {
        "WASHINGTON DC" | "WASHINGTON D.C" | "D.C" => "DISTRICT OF COLUMBIA",
        "VIRGIN ISLANDS" | "US VIRGIN ISLANDS" => "U.S. VIRGIN ISLANDS",
        other => other,
    };
    STATES.iter().find(|s| s.name == collapsed)
}

pub fn by_abbr(abbr: &str) -> Option<&'static State> {
    STATES.iter().find(|s| s.abbr == abbr)
}

pub fn by_fips_prefix(prefix: &str) -> Option<&'static State> {
    STATES.iter().find(|s| s.fips == prefix)
}

/// 由五位數郡 FIPS 推得所屬州
pub fn state_of_county_fips(fips: &str) -> Option<&'static State> {
    if fips.len() != 5 || !fips.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    by_fips_prefix(&fips[..2])
}

pub fn is_new_england(state: &State) -> bool {
    NEW_ENGLAND.contains(&state.abbr)
}
