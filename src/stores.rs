//! Seams to the external collaborators: the itinerary sheet, the calendar and
//! the flight page source. Production implementations live in
//! `crate::google` and `crate::scrape::transport`.

use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;

use crate::error::{ScrapeFailure, StoreError};
use crate::models::flight::{FlightNumber, FlightRecord};

/// Tabular store holding the itinerary.
pub trait SheetStore {
    /// All rows of the configured range in sheet order, header first, cells as text.
    fn read_values(&self) -> Result<Vec<Vec<String>>, StoreError>;

    /// Write only the given `(zero-based column, value)` cells of one 1-based row.
    fn write_cells(&self, row: usize, cells: &[(usize, String)]) -> Result<(), StoreError>;
}

/// Attributes of a calendar event as set by the sync.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarEvent {
    pub title: String,
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
    pub description: String,
}

impl CalendarEvent {
    pub fn for_flight(record: &FlightRecord) -> Self {
        let (start, end) = record.event_window();
        CalendarEvent {
            title: record.title(),
            start,
            end,
            description: record.description(),
        }
    }
}

pub trait CalendarStore {
    /// Create an event and return its identifier.
    fn create_event(&self, event: &CalendarEvent) -> Result<String, StoreError>;

    /// Overwrite an existing event in place. `StoreError::NotFound` when the ID is gone.
    fn update_event(&self, event_id: &str, event: &CalendarEvent) -> Result<(), StoreError>;
}

/// Raw flight page for a flight number on a date.
pub trait FlightPageSource {
    fn fetch(&self, flight: &FlightNumber, date: NaiveDate) -> Result<String, ScrapeFailure>;
}
