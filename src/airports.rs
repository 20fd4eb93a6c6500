//! Airport reference dataset and time zone resolution.
//!
//! The dataset ships embedded (`data/airports.csv`) and can be replaced at
//! runtime with a file of the same shape (`iata,name,city,country_code,tz`).
//! Offsets are always computed for a concrete local date so that DST is
//! reflected, never for "now".

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone};
use chrono_tz::Tz;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::UnknownAirport;
use crate::models::flight::AirportCode;

const EMBEDDED_AIRPORTS: &str = include_str!("../data/airports.csv");

#[derive(Debug, Deserialize)]
struct AirportRow {
    iata: String,
    name: String,
    city: String,
    country_code: String,
    tz: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Airport {
    pub code: AirportCode,
    pub name: String,
    pub city: String,
    /// ISO 3166-1 alpha-2, may be empty when the dataset does not know it.
    pub country_code: String,
    pub tz: Tz,
}

#[derive(Debug, Clone)]
pub struct AirportCatalog {
    airports: HashMap<AirportCode, Airport>,
}

impl AirportCatalog {
    pub fn embedded() -> Result<Self, String> {
        Self::from_reader(EMBEDDED_AIRPORTS.as_bytes())
    }

    pub fn from_path(path: &Path) -> Result<Self, String> {
        let file = File::open(path).map_err(|e| format!("failed to open {}: {}", path.display(), e))?;
        Self::from_reader(file).map_err(|e| format!("{}: {}", path.display(), e))
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, String> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut airports = HashMap::new();
        for (index, result) in rdr.deserialize::<AirportRow>().enumerate() {
            // +2: one for the header, one for 1-based line numbers
            let line = index + 2;
            let row = result.map_err(|e| format!("line {}: {}", line, e))?;
            let code = AirportCode::parse(&row.iata)
                .ok_or_else(|| format!("line {}: invalid IATA code {:?}", line, row.iata))?;
            let tz: Tz = row
                .tz
                .parse()
                .map_err(|e| format!("line {}: unknown time zone {:?}: {}", line, row.tz, e))?;
            airports.insert(
                code.clone(),
                Airport {
                    code,
                    name: row.name,
                    city: row.city,
                    country_code: row.country_code.to_ascii_uppercase(),
                    tz,
                },
            );
        }

        if airports.is_empty() {
            return Err("airport dataset is empty".to_string());
        }
        Ok(AirportCatalog { airports })
    }

    pub fn len(&self) -> usize {
        self.airports.len()
    }

    pub fn lookup(&self, code: &AirportCode) -> Result<&Airport, UnknownAirport> {
        self.airports
            .get(code)
            .ok_or_else(|| UnknownAirport(code.as_str().to_string()))
    }

    /// Time zone name and UTC offset (minutes) in effect at the airport on `date`.
    ///
    /// The offset is sampled at local noon, which is never inside a DST transition.
    pub fn resolve(&self, code: &AirportCode, date: NaiveDate) -> Result<(String, i32), UnknownAirport> {
        let airport = self.lookup(code)?;
        let noon = localize_in(airport.tz, date.and_time(NaiveTime::MIN + Duration::hours(12)));
        Ok((airport.tz.name().to_string(), noon.offset().fix().local_minus_utc() / 60))
    }

    /// Attach the airport's zone to a local wall-clock value on `date`.
    pub fn localize(
        &self,
        code: &AirportCode,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<DateTime<Tz>, UnknownAirport> {
        let airport = self.lookup(code)?;
        Ok(localize_in(airport.tz, date.and_time(time)))
    }
}

/// Fold: earlier instant wins. Gap: the wall clock is moved forward an hour.
pub fn localize_in(tz: Tz, naive: NaiveDateTime) -> DateTime<Tz> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => tz
            .from_local_datetime(&(naive + Duration::hours(1)))
            .earliest()
            .unwrap_or_else(|| tz.from_utc_datetime(&naive)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn code(s: &str) -> AirportCode {
        AirportCode::parse(s).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn embedded_dataset_loads() {
        let catalog = AirportCatalog::embedded().unwrap();
        assert!(catalog.len() > 100);
        let fra = catalog.lookup(&code("FRA")).unwrap();
        assert_eq!(fra.city, "Frankfurt");
        assert_eq!(fra.country_code, "DE");
        assert_eq!(fra.tz, chrono_tz::Europe::Berlin);
    }

    #[test]
    fn embedded_catalog_covers_regional_airports() {
        let catalog = AirportCatalog::embedded().unwrap();
        assert!(catalog.len() > 2000);
        for iata in ["LGA", "MCO", "CLT"] {
            assert_eq!(catalog.lookup(&code(iata)).unwrap().tz, chrono_tz::America::New_York, "{iata}");
        }
        assert_eq!(catalog.lookup(&code("BOI")).unwrap().tz, chrono_tz::America::Boise);
        assert_eq!(catalog.lookup(&code("IMT")).unwrap().tz, chrono_tz::America::Menominee);
        assert_eq!(catalog.lookup(&code("HAN")).unwrap().tz, chrono_tz::Asia::Ho_Chi_Minh);
        assert_eq!(catalog.lookup(&code("KNS")).unwrap().tz, chrono_tz::Australia::Currie);
        assert_eq!(catalog.resolve(&code("CHT"), date(2025, 7, 15)).unwrap().1, 765);
    }

    #[test]
    fn offset_follows_dst_of_the_requested_date() {
        let catalog = AirportCatalog::embedded().unwrap();
        assert_eq!(
            catalog.resolve(&code("FRA"), date(2025, 1, 15)).unwrap(),
            ("Europe/Berlin".to_string(), 60)
        );
        assert_eq!(
            catalog.resolve(&code("FRA"), date(2025, 7, 15)).unwrap(),
            ("Europe/Berlin".to_string(), 120)
        );
        assert_eq!(catalog.resolve(&code("JFK"), date(2025, 7, 15)).unwrap().1, -240);
        assert_eq!(catalog.resolve(&code("DEL"), date(2025, 7, 15)).unwrap().1, 330);
    }

    #[test]
    fn unknown_airport_is_reported() {
        let catalog = AirportCatalog::embedded().unwrap();
        let err = catalog.resolve(&code("QQQ"), date(2025, 1, 1)).unwrap_err();
        assert_eq!(err, UnknownAirport("QQQ".into()));
    }

    #[test]
    fn spring_gap_moves_forward() {
        let catalog = AirportCatalog::embedded().unwrap();
        let t = NaiveTime::from_hms_opt(2, 30, 0).unwrap();
        let dt = catalog.localize(&code("FRA"), date(2025, 3, 30), t).unwrap();
        assert_eq!(dt.format("%H:%M").to_string(), "03:30");
        assert_eq!(dt.offset().fix().local_minus_utc(), 7200);
    }

    #[test]
    fn autumn_fold_takes_earlier_instant() {
        let catalog = AirportCatalog::embedded().unwrap();
        let t = NaiveTime::from_hms_opt(2, 30, 0).unwrap();
        let dt = catalog.localize(&code("FRA"), date(2025, 10, 26), t).unwrap();
        assert_eq!(dt.offset().fix().local_minus_utc(), 7200);
    }

    #[test]
    fn loads_dataset_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "iata,name,city,country_code,tz").unwrap();
        writeln!(file, "XYZ, Test Field , Testville ,de,Europe/Berlin").unwrap();
        let catalog = AirportCatalog::from_path(file.path()).unwrap();
        let xyz = catalog.lookup(&code("XYZ")).unwrap();
        assert_eq!(xyz.city, "Testville");
        assert_eq!(xyz.country_code, "DE");
    }

    #[test]
    fn rejects_bad_time_zone() {
        let data = "iata,name,city,country_code,tz\nXYZ,Test,Town,DE,Mars/Olympus\n";
        let err = AirportCatalog::from_reader(data.as_bytes()).unwrap_err();
        assert!(err.contains("line 2"), "{err}");
    }
}
