//! The normalized flight record built from one scraped page.
//!
//! A record is rebuilt from scratch on every scrape and only lives long enough
//! to drive one calendar upsert and one row write-back.

use chrono::{DateTime, Duration, NaiveDate};
use chrono_tz::Tz;
use std::fmt;

use crate::utils::{flag_emoji, format_offset};

/// Carrier code plus numeric designator, uppercased with no internal spaces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FlightNumber(String);

impl FlightNumber {
    /// Normalize user or page input ("lh 2206" -> "LH2206"). Blank input yields `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let compact: String = raw
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| c.to_ascii_uppercase())
            .collect();
        let valid = (3..=8).contains(&compact.len())
            && compact.chars().all(|c| c.is_ascii_alphanumeric())
            && compact.chars().any(|c| c.is_ascii_digit());
        valid.then_some(FlightNumber(compact))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether both name the same flight, ignoring zero padding of the numeric
    /// designator ("LH02206" and "LH2206").
    pub fn same_flight(&self, other: &FlightNumber) -> bool {
        self.unpadded() == other.unpadded()
    }

    /// Carrier code and designator with leading zeros dropped. Carriers are two
    /// characters, or three letters for ICAO-style numbers such as "DLH2206".
    fn unpadded(&self) -> (&str, &str) {
        let bytes = self.0.as_bytes();
        let carrier_len = if bytes.len() > 3 && bytes[..3].iter().all(u8::is_ascii_alphabetic) {
            3
        } else {
            2
        };
        let (carrier, designator) = self.0.split_at(carrier_len);
        match designator.trim_start_matches('0') {
            "" => (carrier, "0"),
            trimmed => (carrier, trimmed),
        }
    }
}

impl fmt::Display for FlightNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Three-letter IATA airport code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AirportCode(String);

impl AirportCode {
    pub fn parse(raw: &str) -> Option<Self> {
        let code = raw.trim().to_ascii_uppercase();
        (code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic())).then_some(AirportCode(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AirportCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One end of a flight.
#[derive(Debug, Clone, PartialEq)]
pub struct Stop {
    pub airport: AirportCode,
    pub city: String,
    /// Title-cased display name as shown on the page.
    pub country: String,
    /// ISO alpha-2 from the airport dataset, used for the flag.
    pub country_code: String,
    /// `None` when the airport or flight has no published terminal.
    pub terminal: Option<String>,
    /// Local wall-clock time with the airport's zone for that date.
    pub time: DateTime<Tz>,
}

impl Stop {
    pub fn flag(&self) -> String {
        flag_emoji(&self.country_code)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlightRecord {
    pub flight_number: FlightNumber,
    pub flight_date: NaiveDate,
    pub airline: String,
    pub aircraft: Option<String>,
    pub departure: Stop,
    pub arrival: Stop,
    /// Elapsed minutes, always positive.
    pub duration_minutes: u32,
}

impl FlightRecord {
    /// Calendar title, e.g. "✈️ FRA → LHR LH2206".
    pub fn title(&self) -> String {
        format!(
            "\u{2708}\u{fe0f} {} \u{2192} {} {}",
            self.departure.airport, self.arrival.airport, self.flight_number
        )
    }

    /// Event window. The end is departure plus duration, expressed in the arrival zone,
    /// so it never precedes the start and may fall on a later calendar date.
    pub fn event_window(&self) -> (DateTime<Tz>, DateTime<Tz>) {
        let start = self.departure.time;
        let end =
            (start + Duration::minutes(i64::from(self.duration_minutes))).with_timezone(&self.arrival.time.timezone());
        (start, end)
    }

    pub fn formatted_duration(&self) -> String {
        format!("{:02}:{:02}", self.duration_minutes / 60, self.duration_minutes % 60)
    }

    pub fn description(&self) -> String {
        let dep = &self.departure;
        let arr = &self.arrival;
        let mut out = String::new();
        out.push_str(&format!("{} Flight Details {}\n", dep.flag(), arr.flag()));
        out.push_str(&format!("\u{2708}\u{fe0f} Airline: {} ({})\n", self.airline, self.flight_number));
        out.push_str(&format!("\u{23f1}\u{fe0f} Duration: {}\n", self.formatted_duration()));
        out.push_str(&format!(
            "\u{1f6e9}\u{fe0f} Aircraft: {}\n",
            self.aircraft.as_deref().unwrap_or("TBD")
        ));
        for (label, stop, icon) in [("Departure", dep, "\u{1f6eb}"), ("Arrival", arr, "\u{1f6ec}")] {
            let terminal = stop.terminal.as_ref().map(|t| format!(" ({t})")).unwrap_or_default();
            out.push_str(&format!("\u{1f4cd} {label}:\n"));
            out.push_str(&format!(
                "\t{} {}, {} {}{}\n",
                stop.flag(),
                stop.airport,
                stop.city,
                stop.country,
                terminal
            ));
            out.push_str(&format!("\t{} {}\n", icon, format_datetime_with_offset(&stop.time)));
        }
        out
    }
}

/// "14:30 (CEST +2)"
pub fn format_time_with_offset(dt: &DateTime<Tz>) -> String {
    format!("{} ({})", dt.format("%H:%M"), zone_label(dt))
}

/// "2025-06-01 14:30 (CEST +2)"
pub fn format_datetime_with_offset(dt: &DateTime<Tz>) -> String {
    format!("{} ({})", dt.format("%Y-%m-%d %H:%M"), zone_label(dt))
}

/// Zones without a letter abbreviation (tzdata uses "+04") read as "UTC+4".
fn zone_label(dt: &DateTime<Tz>) -> String {
    let offset = format_offset(dt.fixed_offset().offset().local_minus_utc());
    let abbreviation = dt.format("%Z").to_string();
    if abbreviation.starts_with(['+', '-']) {
        format!("UTC{offset}")
    } else {
        format!("{abbreviation} {offset}")
    }
}
