//! Typed view over the loosely-typed itinerary sheet.
//!
//! Columns are addressed through [`ColumnMap`], a `{field -> header}` table
//! validated once against the header row. Scheduling columns (year, month,
//! day, weekday) and `note` are read-only as far as the sync is concerned.

use chrono::NaiveDate;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::models::flight::{FlightNumber, FlightRecord, format_time_with_offset};
use crate::utils::parse_sheet_date;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Date,
    FlightNumber,
    DepartureAirport,
    ArrivalAirport,
    DepartureTime,
    ArrivalTime,
    Duration,
    Origin,
    Destination,
    GcalEventId,
    Note,
    DurationSeconds,
    Airline,
    Aircraft,
    DepartureCountry,
    ArrivalCountry,
    DepartureTerminal,
    ArrivalTerminal,
}

impl Field {
    pub const ALL: [Field; 18] = [
        Field::Date,
        Field::FlightNumber,
        Field::DepartureAirport,
        Field::ArrivalAirport,
        Field::DepartureTime,
        Field::ArrivalTime,
        Field::Duration,
        Field::Origin,
        Field::Destination,
        Field::GcalEventId,
        Field::Note,
        Field::DurationSeconds,
        Field::Airline,
        Field::Aircraft,
        Field::DepartureCountry,
        Field::ArrivalCountry,
        Field::DepartureTerminal,
        Field::ArrivalTerminal,
    ];

    pub fn header(self) -> &'static str {
        match self {
            Field::Date => "Date",
            Field::FlightNumber => "Flight #",
            Field::DepartureAirport => "Departure Airport",
            Field::ArrivalAirport => "Arrival Airport",
            Field::DepartureTime => "Departure Time",
            Field::ArrivalTime => "Arrival Time",
            Field::Duration => "Duration",
            Field::Origin => "Origin",
            Field::Destination => "Destination",
            Field::GcalEventId => "gcal_event_id",
            Field::Note => "note",
            Field::DurationSeconds => "duration_s",
            Field::Airline => "airline",
            Field::Aircraft => "aircraft",
            Field::DepartureCountry => "departure_country",
            Field::ArrivalCountry => "arrival_country",
            Field::DepartureTerminal => "departure_terminal",
            Field::ArrivalTerminal => "arrival_terminal",
        }
    }

    /// Columns the sync cannot work without. Everything else is written when present.
    pub fn is_required(self) -> bool {
        matches!(
            self,
            Field::Date
                | Field::FlightNumber
                | Field::GcalEventId
                | Field::DepartureAirport
                | Field::ArrivalAirport
                | Field::DepartureTime
                | Field::ArrivalTime
                | Field::Duration
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ColumnMapError {
    #[error("sheet has no header row")]
    EmptySheet,
    #[error("missing required column(s): {}", .0.join(", "))]
    MissingHeaders(Vec<String>),
    #[error("column {header:?} appears more than once")]
    DuplicateHeader { header: String },
}

/// Resolved zero-based column positions for each known field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    columns: BTreeMap<Field, usize>,
}

impl ColumnMap {
    pub fn from_header(header: &[String]) -> Result<Self, ColumnMapError> {
        if header.iter().all(|h| h.trim().is_empty()) {
            return Err(ColumnMapError::EmptySheet);
        }

        let mut columns = BTreeMap::new();
        for field in Field::ALL {
            let mut positions = header.iter().enumerate().filter(|(_, h)| h.trim() == field.header());
            if let Some((index, _)) = positions.next() {
                if positions.next().is_some() {
                    return Err(ColumnMapError::DuplicateHeader {
                        header: field.header().to_string(),
                    });
                }
                columns.insert(field, index);
            }
        }

        let missing = Field::ALL
            .iter()
            .filter(|f| f.is_required() && !columns.contains_key(f))
            .map(|f| f.header().to_string())
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            return Err(ColumnMapError::MissingHeaders(missing));
        }

        Ok(ColumnMap { columns })
    }

    pub fn index(&self, field: Field) -> Option<usize> {
        self.columns.get(&field).copied()
    }
}

/// One data row, identified by its 1-based row number in the sheet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SheetRow {
    pub number: usize,
    cells: BTreeMap<Field, String>,
}

impl SheetRow {
    pub fn new(number: usize) -> Self {
        SheetRow {
            number,
            cells: BTreeMap::new(),
        }
    }

    pub fn from_values(number: usize, values: &[String], columns: &ColumnMap) -> Self {
        let cells = Field::ALL
            .iter()
            .filter_map(|field| {
                let index = columns.index(*field)?;
                let value = values.get(index)?.trim();
                (!value.is_empty()).then(|| (*field, value.to_string()))
            })
            .collect();
        SheetRow { number, cells }
    }

    pub fn with(mut self, field: Field, value: impl Into<String>) -> Self {
        self.cells.insert(field, value.into());
        self
    }

    pub fn get(&self, field: Field) -> &str {
        self.cells.get(&field).map(String::as_str).unwrap_or("")
    }

    pub fn flight_number(&self) -> Option<FlightNumber> {
        FlightNumber::parse(self.get(Field::FlightNumber))
    }

    pub fn flight_date(&self) -> Option<NaiveDate> {
        parse_sheet_date(self.get(Field::Date))
    }

    pub fn event_id(&self) -> Option<&str> {
        Some(self.get(Field::GcalEventId)).filter(|id| !id.is_empty())
    }
}

/// A partial row update: only the listed fields are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowUpdate {
    pub row: usize,
    pub cells: Vec<(Field, String)>,
}

impl RowUpdate {
    /// Every enriched field for `record` plus the calendar link.
    pub fn enriched(row: usize, record: &FlightRecord, event_id: &str) -> Self {
        let dep = &record.departure;
        let arr = &record.arrival;
        let cells = vec![
            (Field::DepartureAirport, dep.airport.to_string()),
            (Field::ArrivalAirport, arr.airport.to_string()),
            (Field::DepartureTime, format_time_with_offset(&dep.time)),
            (Field::ArrivalTime, format_time_with_offset(&arr.time)),
            (Field::Duration, record.formatted_duration()),
            (Field::Origin, dep.city.clone()),
            (Field::Destination, arr.city.clone()),
            (Field::GcalEventId, event_id.to_string()),
            (Field::DurationSeconds, (u64::from(record.duration_minutes) * 60).to_string()),
            (Field::Airline, record.airline.clone()),
            (Field::Aircraft, record.aircraft.clone().unwrap_or_default()),
            (Field::DepartureCountry, dep.country.clone()),
            (Field::ArrivalCountry, arr.country.clone()),
            (Field::DepartureTerminal, dep.terminal.clone().unwrap_or_default()),
            (Field::ArrivalTerminal, arr.terminal.clone().unwrap_or_default()),
        ];
        RowUpdate { row, cells }
    }

    /// Resolve fields to column positions, dropping optional fields the sheet lacks.
    pub fn to_columns(&self, columns: &ColumnMap) -> Vec<(usize, String)> {
        self.cells
            .iter()
            .filter_map(|(field, value)| columns.index(*field).map(|i| (i, value.clone())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::flight::fixtures::winter_fra_lhr;

    fn header(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn full_header() -> Vec<String> {
        let mut names = vec!["Year", "Month", "Day", "Weekday"];
        names.extend(Field::ALL.iter().map(|f| f.header()));
        names.push("Flighty");
        header(&names)
    }

    #[test]
    fn maps_all_known_columns() {
        let columns = ColumnMap::from_header(&full_header()).unwrap();
        assert_eq!(columns.index(Field::Date), Some(4));
        assert_eq!(columns.index(Field::ArrivalTerminal), Some(4 + 17));
    }

    #[test]
    fn missing_required_header_fails_fast() {
        let err = ColumnMap::from_header(&header(&["Date", "Flight #", "note"])).unwrap_err();
        match err {
            ColumnMapError::MissingHeaders(missing) => {
                assert!(missing.contains(&"gcal_event_id".to_string()));
                assert!(missing.contains(&"Departure Airport".to_string()));
                assert!(!missing.contains(&"note".to_string()));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn optional_headers_may_be_absent() {
        let names = Field::ALL
            .iter()
            .filter(|f| f.is_required())
            .map(|f| f.header())
            .collect::<Vec<_>>();
        let columns = ColumnMap::from_header(&header(&names)).unwrap();
        assert_eq!(columns.index(Field::Aircraft), None);
    }

    #[test]
    fn duplicate_header_is_rejected() {
        let mut names = full_header();
        names.push("Flight #".to_string());
        assert!(matches!(
            ColumnMap::from_header(&names),
            Err(ColumnMapError::DuplicateHeader { .. })
        ));
    }

    #[test]
    fn empty_header_is_rejected() {
        assert_eq!(ColumnMap::from_header(&[]), Err(ColumnMapError::EmptySheet));
    }

    #[test]
    fn row_values_are_read_by_header() {
        let columns = ColumnMap::from_header(&full_header()).unwrap();
        let mut values = vec![String::new(); 5];
        values[4] = "45809".into();
        values.push(" ba 999 ".into());
        let row = SheetRow::from_values(7, &values, &columns);
        assert_eq!(row.number, 7);
        assert_eq!(row.flight_number().unwrap().as_str(), "BA999");
        assert_eq!(row.flight_date(), NaiveDate::from_ymd_opt(2025, 6, 1));
        assert_eq!(row.event_id(), None);
    }

    #[test]
    fn enriched_update_skips_note_and_missing_columns() {
        let names = Field::ALL
            .iter()
            .filter(|f| f.is_required())
            .map(|f| f.header())
            .collect::<Vec<_>>();
        let columns = ColumnMap::from_header(&header(&names)).unwrap();
        let update = RowUpdate::enriched(3, &winter_fra_lhr(), "evt1");
        assert!(update.cells.iter().all(|(f, _)| *f != Field::Note && *f != Field::Date));

        let resolved = update.to_columns(&columns);
        assert_eq!(resolved.len(), 6);
        let event_col = columns.index(Field::GcalEventId).unwrap();
        assert!(resolved.contains(&(event_col, "evt1".to_string())));
        let dep_col = columns.index(Field::DepartureTime).unwrap();
        assert!(resolved.contains(&(dep_col, "10:00 (CET +1)".to_string())));
    }

    #[test]
    fn enriched_update_writes_empty_terminal() {
        let update = RowUpdate::enriched(3, &winter_fra_lhr(), "evt1");
        assert!(update.cells.contains(&(Field::ArrivalTerminal, String::new())));
        assert!(update.cells.contains(&(Field::DurationSeconds, "7200".to_string())));
    }
}
