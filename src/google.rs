//! Sheet and calendar stores backed by [`GoogleClient`].

use log::debug;
use std::fmt;

use crate::client::{GoogleClient, GoogleClientError};
use crate::error::StoreError;
use crate::models::google::{BatchUpdateValuesRequest, CellValue, Event, EventDateTime, ValueRange};
use crate::stores::{CalendarEvent, CalendarStore, SheetStore};
use crate::utils::{column_index, column_letter};

/// An A1 range such as `raw!A1:ZZ`. Only the sheet name and the top-left
/// corner matter for addressing cells; the rest is passed through on reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetRange {
    pub sheet: String,
    /// Zero-based column of the range's first cell.
    pub first_column: usize,
    /// 1-based row of the range's first cell.
    pub first_row: usize,
    raw: String,
}

impl SheetRange {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let raw = raw.trim();
        let (sheet, cells) = raw
            .rsplit_once('!')
            .ok_or_else(|| format!("range {raw:?} has no sheet name (expected e.g. raw!A1:ZZ)"))?;
        let sheet = sheet.trim_matches('\'');
        if sheet.is_empty() {
            return Err(format!("range {raw:?} has an empty sheet name"));
        }
        let start = cells.split(':').next().unwrap_or_default();
        let letters = start.chars().take_while(|c| c.is_ascii_alphabetic()).collect::<String>();
        let digits = &start[letters.len()..];
        let first_column = column_index(&letters).ok_or_else(|| format!("range {raw:?} has no start column"))?;
        let first_row = if digits.is_empty() {
            1
        } else {
            digits
                .parse::<usize>()
                .ok()
                .filter(|r| *r > 0)
                .ok_or_else(|| format!("range {raw:?} has an invalid start row"))?
        };
        Ok(SheetRange {
            sheet: sheet.to_string(),
            first_column,
            first_row,
            raw: raw.to_string(),
        })
    }

    /// A1 address of a single cell given as a sheet row and a column relative
    /// to the range start.
    pub fn cell(&self, row: usize, column: usize) -> String {
        format!(
            "'{}'!{}{}",
            self.sheet.replace('\'', "''"),
            column_letter(self.first_column + column),
            row
        )
    }
}

impl fmt::Display for SheetRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

pub struct GoogleSheet<'a> {
    client: &'a GoogleClient,
    spreadsheet_id: String,
    range: SheetRange,
}

impl<'a> GoogleSheet<'a> {
    pub fn new(client: &'a GoogleClient, spreadsheet_id: impl Into<String>, range: SheetRange) -> Self {
        GoogleSheet {
            client,
            spreadsheet_id: spreadsheet_id.into(),
            range,
        }
    }

    /// Startup check that the spreadsheet and range are readable.
    pub fn probe(&self) -> Result<usize, StoreError> {
        self.read_values().map(|rows| rows.len())
    }
}

impl SheetStore for GoogleSheet<'_> {
    fn read_values(&self) -> Result<Vec<Vec<String>>, StoreError> {
        let range = self
            .client
            .get_values(&self.spreadsheet_id, &self.range.to_string())
            .map_err(|e| store_error(e, StoreError::ReadFailure))?;
        debug!("Read {} row(s) from {}", range.values.len(), self.range);
        // Rows above the range start are not returned, so pad to keep row numbers aligned.
        let mut rows = vec![Vec::new(); self.range.first_row - 1];
        rows.extend(
            range
                .values
                .iter()
                .map(|row| row.iter().map(CellValue::to_text).collect::<Vec<_>>()),
        );
        Ok(rows)
    }

    fn write_cells(&self, row: usize, cells: &[(usize, String)]) -> Result<(), StoreError> {
        if cells.is_empty() {
            return Ok(());
        }
        let data = cells
            .iter()
            .map(|(column, value)| ValueRange {
                range: self.range.cell(row, *column),
                major_dimension: None,
                values: vec![vec![CellValue::Text(value.clone())]],
            })
            .collect();
        let request = BatchUpdateValuesRequest {
            value_input_option: "RAW",
            data,
        };
        let resp = self
            .client
            .batch_update_values(&self.spreadsheet_id, &request)
            .map_err(|e| store_error(e, StoreError::WriteFailure))?;
        debug!("Row {}: updated {} cell(s)", row, resp.total_updated_cells.unwrap_or(0));
        Ok(())
    }
}

pub struct GoogleCalendar<'a> {
    client: &'a GoogleClient,
    calendar_id: String,
}

impl<'a> GoogleCalendar<'a> {
    pub fn new(client: &'a GoogleClient, calendar_id: impl Into<String>) -> Self {
        GoogleCalendar {
            client,
            calendar_id: calendar_id.into(),
        }
    }

    /// Startup check that the calendar exists and is accessible.
    pub fn probe(&self) -> Result<String, StoreError> {
        self.client
            .get_calendar(&self.calendar_id)
            .map(|c| {
                let name = c.summary.unwrap_or(c.id);
                match c.time_zone {
                    Some(tz) => format!("{name} ({tz})"),
                    None => name,
                }
            })
            .map_err(|e| store_error(e, StoreError::ReadFailure))
    }
}

impl CalendarStore for GoogleCalendar<'_> {
    fn create_event(&self, event: &CalendarEvent) -> Result<String, StoreError> {
        let created = self
            .client
            .insert_event(&self.calendar_id, &to_wire(event))
            .map_err(|e| store_error(e, StoreError::WriteFailure))?;
        created
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| StoreError::WriteFailure("created event has no id".into()))
    }

    fn update_event(&self, event_id: &str, event: &CalendarEvent) -> Result<(), StoreError> {
        self.client
            .update_event(&self.calendar_id, event_id, &to_wire(event))
            .map(|_| ())
            .map_err(|e| store_error(e, StoreError::WriteFailure))
    }
}

/// Deleted events must come back as visible ones, hence the explicit status.
fn to_wire(event: &CalendarEvent) -> Event {
    Event {
        id: None,
        status: Some("confirmed".to_string()),
        summary: event.title.clone(),
        description: event.description.clone(),
        start: EventDateTime {
            date_time: event.start.fixed_offset(),
            time_zone: Some(event.start.timezone().name().to_string()),
        },
        end: EventDateTime {
            date_time: event.end.fixed_offset(),
            time_zone: Some(event.end.timezone().name().to_string()),
        },
    }
}

fn store_error(err: GoogleClientError, otherwise: fn(String) -> StoreError) -> StoreError {
    match err.status() {
        Some(404) | Some(410) => StoreError::NotFound(err.to_string()),
        _ => otherwise(err.to_string()),
    }
}
