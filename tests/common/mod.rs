#![allow(dead_code)]

use clap::Parser;
use fips_etl::CliConfig;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const COUNTIES: &str = "\
STATE|STATEFP|COUNTYFP|COUNTYNS|COUNTYNAME|CLASSFP|FUNCSTAT
ME|23|013|00581292|Knox County|H1|A
ME|23|019|00581295|Penobscot County|H1|A
KY|21|017|00516855|Bourbon County|H1|A
KY|21|047|00516870|Christian County|H1|A
KY|21|097|00516895|Harrison County|H1|A
RI|44|001|01219777|Bristol County|H4|N
RI|44|009|01219781|Washington County|H4|N
TN|47|161|01639791|Stewart County|H1|A
";

pub const PLACES: &str = "\
STATE|STATEFP|COUNTYFP|COUNTYNAME|PLACEFP|PLACENS|PLACENAME|TYPE|CLASSFP|FUNCSTAT
ME|23|019|Penobscot County|02795|02378453|Bangor city|INCORPORATED PLACE|C5|A
KY|21|017|Bourbon County|58836|02404474|Paris city|INCORPORATED PLACE|C1|A
RI|44|009|Washington County|80780|01220017|Westerly town|COUNTY SUBDIVISION|T1|A
";

pub const ZCTAS: &str = "\
OID_ZCTA5_20|GEOID_ZCTA5_20|NAMELSAD_ZCTA5_20|OID_COUNTY_20|GEOID_COUNTY_20|NAMELSAD_COUNTY_20
1|04843|ZCTA5 04843|2|23013|Knox County
3|42223|ZCTA5 42223|4|21047|Christian County
3|42223|ZCTA5 42223|5|47161|Stewart County
";

/// 暫存目錄中的參考表、輸入檔與輸出目錄
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new(input: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let reference = dir.path().join("reference");
        std::fs::create_dir_all(&reference).unwrap();
        std::fs::write(reference.join("national_county2020.txt"), COUNTIES).unwrap();
        std::fs::write(reference.join("national_place_by_county2020.txt"), PLACES).unwrap();
        std::fs::write(reference.join("tab20_zcta520_county20_natl.txt"), ZCTAS).unwrap();
        std::fs::write(dir.path().join("input.csv"), input).unwrap();
        Self { dir }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn out(&self, name: &str) -> PathBuf {
        self.dir.path().join("out").join(name)
    }

    pub fn config(&self, extra: &[&str]) -> CliConfig {
        let input = self.path("input.csv");
        let reference = self.path("reference");
        let output = self.path("out");
        let mut argv = vec![
            "fips-etl".to_string(),
            "--input".to_string(),
            path_str(&input),
            "--reference-dir".to_string(),
            path_str(&reference),
            "--output-path".to_string(),
            path_str(&output),
        ];
        argv.extend(extra.iter().map(|s| s.to_string()));
        CliConfig::parse_from(argv)
    }

    /// 讀回輸出 CSV 的 (標頭, 列)
    pub fn read_csv(&self, name: &str) -> (Vec<String>, Vec<Vec<String>>) {
        let mut reader = csv::Reader::from_path(self.out(name)).unwrap();
        let headers = reader.headers().unwrap().iter().map(String::from).collect();
        let rows = reader
            .records()
            .map(|r| r.unwrap().iter().map(String::from).collect())
            .collect();
        (headers, rows)
    }

    pub fn report(&self) -> serde_json::Value {
        let bytes = std::fs::read(self.out("resolution_report.json")).unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }
}

pub fn path_str(path: &Path) -> String {
    path.to_str().unwrap().to_string()
}
