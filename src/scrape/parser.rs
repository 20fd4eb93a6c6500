//! Flight page parsing.
//!
//! A page lists one or more flight blocks for a flight number. Each block has
//! the flight number (`div.stn`), airline (`div.sta`), two airports
//! (`div.stp.stz`, "City (IATA)"), two local clock times (`div.stv`), a run of
//! `div.stp` cells (countries, optional terminals, departure and arrival
//! dates without a year) and `div.stg.stu` detail cells (duration, aircraft).

use chrono::{Datelike, Duration, NaiveDate, NaiveTime};
use log::debug;
use scraper::{ElementRef, Html, Selector};

use crate::airports::AirportCatalog;
use crate::error::{RecordError, ScrapeFailure};
use crate::models::flight::{AirportCode, FlightNumber, FlightRecord, Stop};
use crate::utils::{collapse_whitespace, format_offset, title_case};

const DURATION_PREFIX: &str = "flight duration";

/// Text fields of one flight block, before any interpretation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawFlight {
    pub flight_number: String,
    pub airline: String,
    pub departure_airport: String,
    pub arrival_airport: String,
    pub departure_time: String,
    pub arrival_time: String,
    pub departure_country: String,
    pub arrival_country: String,
    pub departure_terminal: Option<String>,
    pub arrival_terminal: Option<String>,
    pub departure_date: String,
    pub arrival_date: String,
    pub duration: Option<String>,
    pub aircraft: Option<String>,
}

struct Selectors {
    number: Selector,
    airline: Selector,
    airport: Selector,
    time: Selector,
    cell: Selector,
    detail: Selector,
}

impl Selectors {
    fn new() -> Result<Self, ScrapeFailure> {
        let parse = |css: &str| {
            Selector::parse(css).map_err(|e| ScrapeFailure::MalformedResponse(format!("selector {css}: {e}")))
        };
        Ok(Selectors {
            number: parse("div.stn")?,
            airline: parse("div.sta")?,
            airport: parse("div.stp.stz")?,
            time: parse("div.stv")?,
            cell: parse("div.stp:not(.stz)")?,
            detail: parse("div.stg.stu")?,
        })
    }
}

pub struct FlightPageParser<'a> {
    airports: &'a AirportCatalog,
}

impl<'a> FlightPageParser<'a> {
    pub fn new(airports: &'a AirportCatalog) -> Self {
        FlightPageParser { airports }
    }

    /// Build the record for `flight` departing on `date`.
    ///
    /// Only a block whose departure date equals `date` is accepted; a page that
    /// only lists the number on other days is `NotFound`.
    pub fn parse(&self, html: &str, flight: &FlightNumber, date: NaiveDate) -> Result<FlightRecord, RecordError> {
        let blocks = extract_flights(html)?;
        if blocks.is_empty() {
            return Err(ScrapeFailure::NotFound(format!("no flights listed for {flight}")).into());
        }

        let mut unreadable = None;
        for raw in &blocks {
            // Codeshare listings under another number are not this flight.
            if FlightNumber::parse(&raw.flight_number).is_some_and(|listed| !listed.same_flight(flight)) {
                debug!("{flight}: skipping listing for {}", raw.flight_number);
                continue;
            }
            match month_day_in_year(&raw.departure_date, date.year()) {
                Some(day) if day == date => return self.build(raw, flight, date),
                Some(day) => debug!("{flight}: skipping listing departing {day}"),
                None => unreadable = Some(raw.departure_date.clone()),
            }
        }

        let err = match unreadable {
            Some(text) => ScrapeFailure::MalformedResponse(format!("unreadable departure date {text:?}")),
            None => ScrapeFailure::NotFound(format!("{flight} does not depart on {date}")),
        };
        Err(err.into())
    }

    fn build(&self, raw: &RawFlight, flight: &FlightNumber, date: NaiveDate) -> Result<FlightRecord, RecordError> {
        let dep_airport = self.airports.lookup(&airport_code(&raw.departure_airport)?)?;
        let arr_airport = self.airports.lookup(&airport_code(&raw.arrival_airport)?)?;

        let arrival_date = arrival_date(&raw.arrival_date, date)
            .ok_or_else(|| malformed(format!("unreadable arrival date {:?}", raw.arrival_date)))?;
        let departure = self.airports.localize(&dep_airport.code, date, clock_time(&raw.departure_time)?)?;
        let mut arrival = self
            .airports
            .localize(&arr_airport.code, arrival_date, clock_time(&raw.arrival_time)?)?;
        // Logged only; the record's offsets come from the localized instants above.
        for (airport, day) in [(dep_airport, date), (arr_airport, arrival_date)] {
            let (zone, offset_minutes) = self.airports.resolve(&airport.code, day)?;
            debug!(
                "{flight}: {} ({}) on {day} is {zone} UTC{}",
                airport.name,
                airport.code,
                format_offset(offset_minutes * 60)
            );
        }

        let elapsed = arrival.signed_duration_since(departure).num_minutes();
        let duration_minutes = match raw.duration.as_deref() {
            Some(text) => duration_minutes(text).ok_or_else(|| malformed(format!("unreadable duration {text:?}")))?,
            None => u32::try_from(elapsed)
                .ok()
                .filter(|m| *m > 0)
                .ok_or_else(|| malformed("no duration and arrival is not after departure".to_string()))?,
        };
        if elapsed <= 0 {
            arrival = (departure + Duration::minutes(i64::from(duration_minutes))).with_timezone(&arr_airport.tz);
        }

        Ok(FlightRecord {
            flight_number: flight.clone(),
            flight_date: date,
            airline: raw.airline.clone(),
            aircraft: raw.aircraft.clone(),
            departure: Stop {
                airport: dep_airport.code.clone(),
                city: dep_airport.city.clone(),
                country: country_name(&raw.departure_country),
                country_code: dep_airport.country_code.clone(),
                terminal: raw.departure_terminal.as_deref().and_then(normalize_terminal),
                time: departure,
            },
            arrival: Stop {
                airport: arr_airport.code.clone(),
                city: arr_airport.city.clone(),
                country: country_name(&raw.arrival_country),
                country_code: arr_airport.country_code.clone(),
                terminal: raw.arrival_terminal.as_deref().and_then(normalize_terminal),
                time: arrival,
            },
            duration_minutes,
        })
    }
}

/// Split the page into flight blocks.
///
/// A block is the smallest ancestor of a flight number element that holds both
/// airports. Pages with no flight numbers yield an empty list.
pub fn extract_flights(html: &str) -> Result<Vec<RawFlight>, ScrapeFailure> {
    let sel = Selectors::new()?;
    let document = Html::parse_document(html);

    let mut blocks: Vec<ElementRef<'_>> = Vec::new();
    for number in document.select(&sel.number) {
        let block = number
            .ancestors()
            .filter_map(ElementRef::wrap)
            .find(|el| el.select(&sel.airport).count() >= 2)
            .ok_or_else(|| malformed_scrape("flight number without airports".to_string()))?;
        if block.select(&sel.number).count() > 1 {
            return Err(malformed_scrape("flight listings are not separable".to_string()));
        }
        if !blocks.iter().any(|b| b.id() == block.id()) {
            blocks.push(block);
        }
    }

    blocks.into_iter().map(|block| read_block(block, &sel)).collect()
}

fn read_block(block: ElementRef<'_>, sel: &Selectors) -> Result<RawFlight, ScrapeFailure> {
    let texts = |selector: &Selector| block.select(selector).map(element_text).collect::<Vec<_>>();

    let airports = texts(&sel.airport);
    let times = texts(&sel.time);
    let cells = texts(&sel.cell);
    if times.len() < 2 {
        return Err(malformed_scrape(format!("expected 2 clock times, found {}", times.len())));
    }
    if cells.len() < 4 {
        return Err(malformed_scrape(format!("expected at least 4 detail cells, found {}", cells.len())));
    }

    // countries, [terminals,] departure date, arrival date
    let (departure_terminal, arrival_terminal) = if cells.len() >= 6 {
        (non_empty(&cells[2]), non_empty(&cells[3]))
    } else {
        (None, None)
    };

    let mut duration = None;
    let mut aircraft = None;
    for detail in texts(&sel.detail) {
        let lowered = detail.to_lowercase();
        if let Some(rest) = lowered.strip_prefix(DURATION_PREFIX) {
            duration = non_empty(rest.trim_start_matches(':'));
        } else if aircraft.is_none() {
            aircraft = non_empty(&detail);
        }
    }

    Ok(RawFlight {
        flight_number: texts(&sel.number).into_iter().next().unwrap_or_default(),
        airline: texts(&sel.airline).into_iter().next().unwrap_or_default(),
        departure_airport: airports[0].clone(),
        arrival_airport: airports[1].clone(),
        departure_time: times[0].clone(),
        arrival_time: times[1].clone(),
        departure_country: cells[0].clone(),
        arrival_country: cells[1].clone(),
        departure_terminal,
        arrival_terminal,
        departure_date: cells[cells.len() - 2].clone(),
        arrival_date: cells[cells.len() - 1].clone(),
        duration,
        aircraft,
    })
}

fn element_text(el: ElementRef<'_>) -> String {
    collapse_whitespace(&el.text().collect::<Vec<_>>().join(" "))
}

fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn malformed(message: String) -> RecordError {
    RecordError::Scrape(ScrapeFailure::MalformedResponse(message))
}

fn malformed_scrape(message: String) -> ScrapeFailure {
    ScrapeFailure::MalformedResponse(message)
}

/// "Frankfurt (FRA)" -> FRA
fn airport_code(text: &str) -> Result<AirportCode, RecordError> {
    let inner = match text.rsplit_once('(') {
        Some((_, rest)) => rest.trim_end().trim_end_matches(')'),
        None => text,
    };
    AirportCode::parse(inner).ok_or_else(|| malformed(format!("no IATA code in {text:?}")))
}

fn clock_time(text: &str) -> Result<NaiveTime, RecordError> {
    NaiveTime::parse_from_str(text.trim(), "%H:%M").map_err(|_| malformed(format!("unreadable time {text:?}")))
}

/// "June 1, Sunday" in `year`. The weekday is ignored.
fn month_day_in_year(text: &str, year: i32) -> Option<NaiveDate> {
    let month_day = text.split(',').next()?.trim();
    NaiveDate::parse_from_str(&format!("{month_day} {year}"), "%B %d %Y").ok()
}

/// Arrival carries no year either; it is the first candidate not before departure.
fn arrival_date(text: &str, departure: NaiveDate) -> Option<NaiveDate> {
    let same_year = month_day_in_year(text, departure.year())?;
    if same_year >= departure {
        Some(same_year)
    } else {
        month_day_in_year(text, departure.year() + 1)
    }
}

/// "1h 25m", "55m", "2h", "1h 5min"
fn duration_minutes(text: &str) -> Option<u32> {
    let mut total = 0u32;
    let mut digits = String::new();
    let mut seen_unit = false;
    for c in text.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
        } else if (c == 'h' || c == 'm') && !digits.is_empty() {
            let n: u32 = digits.parse().ok()?;
            total = total.checked_add(if c == 'h' { n.checked_mul(60)? } else { n })?;
            digits.clear();
            seen_unit = true;
        } else if !c.is_whitespace() && !c.is_alphabetic() {
            return None;
        }
    }
    (seen_unit && digits.is_empty() && total > 0).then_some(total)
}

/// Country display name: text after the last comma ("Frankfurt, GERMANY" -> "Germany").
fn country_name(text: &str) -> String {
    let name = text.rsplit_once(',').map(|(_, c)| c).unwrap_or(text);
    title_case(name.trim())
}

/// A bare number or single letter becomes "Terminal X"; blank is no terminal.
fn normalize_terminal(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed == "-" {
        return None;
    }
    let bare = trimmed.chars().all(|c| c.is_ascii_digit())
        || (trimmed.chars().count() == 1 && trimmed.chars().all(char::is_alphabetic));
    Some(if bare { format!("Terminal {}", trimmed.to_uppercase()) } else { trimmed.to_string() })
}
