//! Per-row reconciliation: classify a sheet row, scrape its flight, upsert
//! the calendar event and write the enriched fields back.
//!
//! Rows with a stored event ID are refreshed on every eligible run; there is
//! no change detection, so an unchanged flight still produces one calendar
//! update and one row write per run.

use chrono::NaiveDate;
use log::{debug, info, warn};

use crate::airports::AirportCatalog;
use crate::db::journal::LinkJournal;
use crate::error::{RowError, ScrapeFailure, StoreError};
use crate::models::flight::{FlightNumber, FlightRecord};
use crate::models::sheet::{ColumnMap, Field, RowUpdate, SheetRow};
use crate::scrape::parser::FlightPageParser;
use crate::stores::{CalendarEvent, CalendarStore, FlightPageSource, SheetStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowState {
    Ineligible(&'static str),
    /// Eligible by date, but the flight number is not one we can look up.
    InvalidFlightNumber(String),
    NeedsCreate {
        flight: FlightNumber,
        date: NaiveDate,
    },
    NeedsUpdate {
        flight: FlightNumber,
        date: NaiveDate,
        event_id: String,
    },
}

/// Decide what a row needs, relative to `today`.
pub fn classify(row: &SheetRow, today: NaiveDate) -> RowState {
    if row.get(Field::FlightNumber).is_empty() {
        return RowState::Ineligible("blank flight number");
    }
    let Some(date) = row.flight_date() else {
        return RowState::Ineligible("no readable flight date");
    };
    if date < today {
        return RowState::Ineligible("flight date in the past");
    }
    let Some(flight) = row.flight_number() else {
        return RowState::InvalidFlightNumber(row.get(Field::FlightNumber).trim().to_string());
    };
    match row.event_id() {
        Some(id) => RowState::NeedsUpdate {
            flight,
            date,
            event_id: id.to_string(),
        },
        None => RowState::NeedsCreate { flight, date },
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    Skipped { reason: &'static str },
    Created { event_id: String },
    Updated { event_id: String },
    Failed { reason: RowError },
}

impl RowOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            RowOutcome::Skipped { .. } => "skipped",
            RowOutcome::Created { .. } => "created",
            RowOutcome::Updated { .. } => "updated",
            RowOutcome::Failed { .. } => "failed",
        }
    }
}

/// How the calendar side of a row was satisfied.
enum Upsert {
    /// The row's stored event was updated in place.
    Updated(String),
    /// A new event was created, or a pending one from an earlier run reused.
    Linked(String),
    /// The stored event was gone, so the row was relinked to a new one.
    Replaced(String),
}

pub struct ReconciliationEngine<'a> {
    source: &'a dyn FlightPageSource,
    parser: FlightPageParser<'a>,
    calendar: &'a dyn CalendarStore,
    sheet: &'a dyn SheetStore,
    journal: &'a dyn LinkJournal,
}

impl<'a> ReconciliationEngine<'a> {
    pub fn new(
        source: &'a dyn FlightPageSource,
        airports: &'a AirportCatalog,
        calendar: &'a dyn CalendarStore,
        sheet: &'a dyn SheetStore,
        journal: &'a dyn LinkJournal,
    ) -> Self {
        ReconciliationEngine {
            source,
            parser: FlightPageParser::new(airports),
            calendar,
            sheet,
            journal,
        }
    }

    /// Reconcile one row. Failures are returned as an outcome, never raised.
    pub fn process(&self, row: &SheetRow, columns: &ColumnMap, today: NaiveDate) -> RowOutcome {
        let (flight, date, existing) = match classify(row, today) {
            RowState::Ineligible(reason) => {
                debug!("row {}: skipped ({})", row.number, reason);
                return RowOutcome::Skipped { reason };
            }
            RowState::InvalidFlightNumber(raw) => {
                return RowOutcome::Failed {
                    reason: RowError::InvalidFlightNumber(raw),
                };
            }
            RowState::NeedsCreate { flight, date } => (flight, date, None),
            RowState::NeedsUpdate { flight, date, event_id } => (flight, date, Some(event_id)),
        };

        match self.reconcile(row.number, &flight, date, existing.as_deref(), columns) {
            Ok(outcome) => outcome,
            Err(reason) => RowOutcome::Failed { reason },
        }
    }

    fn reconcile(
        &self,
        row: usize,
        flight: &FlightNumber,
        date: NaiveDate,
        existing: Option<&str>,
        columns: &ColumnMap,
    ) -> Result<RowOutcome, RowError> {
        let record = self.scrape(flight, date)?;
        let event = CalendarEvent::for_flight(&record);

        let upsert = match existing {
            Some(event_id) => match self.calendar.update_event(event_id, &event) {
                Ok(()) => Upsert::Updated(event_id.to_string()),
                Err(StoreError::NotFound(_)) => {
                    warn!("row {row} {flight} {date}: event {event_id} no longer exists; recreating");
                    Upsert::Replaced(self.link_event(row, flight, date, &event)?)
                }
                Err(e) => return Err(RowError::Calendar(e)),
            },
            None => Upsert::Linked(self.link_event(row, flight, date, &event)?),
        };

        let event_id = match &upsert {
            Upsert::Updated(id) | Upsert::Linked(id) | Upsert::Replaced(id) => id.clone(),
        };
        let update = RowUpdate::enriched(row, &record, &event_id);
        self.sheet
            .write_cells(row, &update.to_columns(columns))
            .map_err(RowError::Sheet)?;

        if matches!(upsert, Upsert::Linked(_) | Upsert::Replaced(_))
            && let Err(e) = self.journal.clear(flight, date, row)
        {
            warn!("row {row} {flight} {date}: could not clear pending link: {e}");
        }

        // A row that already carried a link keeps reporting as an update, even
        // when its event had to be recreated under a new ID.
        Ok(match upsert {
            Upsert::Linked(event_id) => RowOutcome::Created { event_id },
            Upsert::Updated(event_id) | Upsert::Replaced(event_id) => RowOutcome::Updated { event_id },
        })
    }

    fn scrape(&self, flight: &FlightNumber, date: NaiveDate) -> Result<FlightRecord, RowError> {
        let html = self.source.fetch(flight, date)?;
        let record = self.parser.parse(&html, flight, date)?;
        if record.flight_date != date {
            return Err(ScrapeFailure::NotFound(format!(
                "{flight} scraped for {} instead of {date}",
                record.flight_date
            ))
            .into());
        }
        Ok(record)
    }

    /// Give the row an event: reuse one left pending by an earlier run, else create one.
    fn link_event(
        &self,
        row: usize,
        flight: &FlightNumber,
        date: NaiveDate,
        event: &CalendarEvent,
    ) -> Result<String, RowError> {
        if let Some(pending) = self.journal.pending_event(flight, date, row)? {
            match self.calendar.update_event(&pending, event) {
                Ok(()) => {
                    info!("row {row} {flight} {date}: reusing pending event {pending}");
                    return Ok(pending);
                }
                Err(StoreError::NotFound(_)) => debug!("row {row}: pending event {pending} is gone"),
                Err(e) => return Err(RowError::Calendar(e)),
            }
        }

        let event_id = self.calendar.create_event(event).map_err(RowError::Calendar)?;
        if let Err(e) = self.journal.record_pending(flight, date, &event_id, row) {
            warn!("row {row} {flight} {date}: could not record pending event {event_id}: {e}");
        }
        Ok(event_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::journal::testing::MemoryJournal;
    use crate::error::UnknownAirport;
    use crate::stores::testing::{FakeCalendar, FakeSheet, FakeSource};
    use chrono::TimeZone;

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/data/{name}")).expect("fixture present")
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn header() -> Vec<String> {
        Field::ALL.iter().map(|f| f.header().to_string()).collect()
    }

    fn columns() -> ColumnMap {
        ColumnMap::from_header(&header()).unwrap()
    }

    fn col(field: Field) -> usize {
        columns().index(field).unwrap()
    }

    /// Sheet with the header on row 1 and one itinerary row on row 2.
    fn sheet_with(date: &str, flight: &str, event_id: &str, note: &str) -> FakeSheet {
        let mut row = vec![""; Field::ALL.len()];
        row[col(Field::Date)] = date;
        row[col(Field::FlightNumber)] = flight;
        row[col(Field::GcalEventId)] = event_id;
        row[col(Field::Note)] = note;
        let header = header();
        FakeSheet::with_values(vec![header.iter().map(String::as_str).collect(), row])
    }

    fn row_of(sheet: &FakeSheet) -> SheetRow {
        SheetRow::from_values(2, &sheet.values.borrow()[1], &columns())
    }

    struct Harness {
        airports: AirportCatalog,
        source: FakeSource,
        calendar: FakeCalendar,
        sheet: FakeSheet,
        journal: MemoryJournal,
    }

    impl Harness {
        fn new(source: FakeSource, sheet: FakeSheet) -> Self {
            Harness {
                airports: AirportCatalog::embedded().unwrap(),
                source,
                calendar: FakeCalendar::default(),
                sheet,
                journal: MemoryJournal::default(),
            }
        }

        fn run(&self, today: NaiveDate) -> RowOutcome {
            let engine = ReconciliationEngine::new(
                &self.source,
                &self.airports,
                &self.calendar,
                &self.sheet,
                &self.journal,
            );
            engine.process(&row_of(&self.sheet), &columns(), today)
        }
    }

    fn ba999() -> FakeSource {
        FakeSource::with_page("BA999", fixture("flight-page-multi.html"))
    }

    fn today() -> NaiveDate {
        date(2025, 5, 20)
    }

    #[test]
    fn classifies_rows() {
        let row = SheetRow::new(2).with(Field::Date, "2025-06-01").with(Field::FlightNumber, "BA999");
        assert!(matches!(classify(&row, today()), RowState::NeedsCreate { .. }));
        assert!(matches!(
            classify(&row.clone().with(Field::GcalEventId, "abc123"), today()),
            RowState::NeedsUpdate { ref event_id, .. } if event_id == "abc123"
        ));
        assert_eq!(classify(&row, date(2025, 6, 2)), RowState::Ineligible("flight date in the past"));
        // Today is still eligible.
        assert!(matches!(classify(&row, date(2025, 6, 1)), RowState::NeedsCreate { .. }));
        assert_eq!(
            classify(&SheetRow::new(3).with(Field::Date, "2025-06-01"), today()),
            RowState::Ineligible("blank flight number")
        );
        assert_eq!(
            classify(&SheetRow::new(4).with(Field::FlightNumber, "BA999"), today()),
            RowState::Ineligible("no readable flight date")
        );
        assert_eq!(
            classify(&row.clone().with(Field::FlightNumber, " BA-999 "), today()),
            RowState::InvalidFlightNumber("BA-999".into())
        );
        // A typo on a past row is not worth reporting.
        assert_eq!(
            classify(&row.with(Field::FlightNumber, "BA-999"), date(2025, 6, 2)),
            RowState::Ineligible("flight date in the past")
        );
    }

    #[test]
    fn invalid_flight_number_fails_the_row_without_scraping() {
        let h = Harness::new(ba999(), sheet_with("2025-06-01", "LH22060001", "", ""));
        let outcome = h.run(today());
        assert_eq!(
            outcome,
            RowOutcome::Failed {
                reason: RowError::InvalidFlightNumber("LH22060001".into())
            }
        );
        assert_eq!(outcome.label(), "failed");
        assert!(h.source.fetches.borrow().is_empty());
        assert!(h.sheet.writes.borrow().is_empty());
    }

    #[test]
    fn blank_flight_number_is_ineligible_for_any_date() {
        for d in ["2020-01-01", "2025-06-01", "2040-12-31", ""] {
            let row = SheetRow::new(2).with(Field::Date, d).with(Field::FlightNumber, "   ");
            assert!(matches!(classify(&row, today()), RowState::Ineligible(_)), "{d}");
        }
    }

    #[test]
    fn new_row_creates_event_and_writes_back() {
        let h = Harness::new(ba999(), sheet_with("2025-06-01", "BA999", "", "window seat"));
        let outcome = h.run(today());

        assert_eq!(outcome, RowOutcome::Created { event_id: "evt1".into() });
        assert_eq!(h.calendar.creates.borrow().len(), 1);
        assert!(h.calendar.updates.borrow().is_empty());
        assert_eq!(h.calendar.creates.borrow()[0].title, "✈️ LHR → DXB BA999");

        assert_eq!(h.sheet.cell(2, col(Field::GcalEventId)), "evt1");
        assert_eq!(h.sheet.cell(2, col(Field::DepartureAirport)), "LHR");
        assert_eq!(h.sheet.cell(2, col(Field::ArrivalAirport)), "DXB");
        assert_eq!(h.sheet.cell(2, col(Field::DepartureTime)), "21:40 (BST +1)");
        assert_eq!(h.sheet.cell(2, col(Field::ArrivalTime)), "07:35 (UTC+4)");
        assert_eq!(h.sheet.cell(2, col(Field::Duration)), "06:55");
        assert_eq!(h.sheet.cell(2, col(Field::Aircraft)), "Boeing 777-300ER");
        assert_eq!(h.sheet.cell(2, col(Field::Note)), "window seat");
        assert_eq!(h.sheet.cell(2, col(Field::Date)), "2025-06-01");

        let written = h.sheet.writes.borrow();
        assert_eq!(written.len(), 1);
        assert!(written[0].1.iter().all(|(c, _)| *c != col(Field::Note) && *c != col(Field::Date)));
        assert!(h.journal.links.borrow().is_empty());
    }

    #[test]
    fn rerun_reuses_event_id() {
        let h = Harness::new(ba999(), sheet_with("2025-06-01", "BA999", "", ""));
        assert_eq!(h.run(today()), RowOutcome::Created { event_id: "evt1".into() });
        assert_eq!(h.run(today()), RowOutcome::Updated { event_id: "evt1".into() });

        assert_eq!(h.calendar.creates.borrow().len(), 1);
        assert_eq!(h.calendar.updates.borrow().len(), 1);
        assert_eq!(h.calendar.events.borrow().len(), 1);
        assert_eq!(h.sheet.cell(2, col(Field::GcalEventId)), "evt1");
    }

    #[test]
    fn stored_event_is_updated_in_place() {
        let mut h = Harness::new(ba999(), sheet_with("2025-06-01", "BA999", "abc123", ""));
        let stale = CalendarEvent {
            title: "old".into(),
            start: chrono_tz::UTC.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(),
            end: chrono_tz::UTC.with_ymd_and_hms(2025, 6, 1, 1, 0, 0).unwrap(),
            description: String::new(),
        };
        h.calendar = FakeCalendar::with_event("abc123", stale);

        assert_eq!(h.run(today()), RowOutcome::Updated { event_id: "abc123".into() });
        assert!(h.calendar.creates.borrow().is_empty());
        let updates = h.calendar.updates.borrow();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].0, "abc123");
        assert_eq!(h.calendar.events.borrow()["abc123"].title, "✈️ LHR → DXB BA999");
        assert_eq!(h.sheet.cell(2, col(Field::GcalEventId)), "abc123");
    }

    #[test]
    fn deleted_event_is_recreated_as_an_update() {
        let h = Harness::new(ba999(), sheet_with("2025-06-01", "BA999", "gone42", ""));
        assert_eq!(h.run(today()), RowOutcome::Updated { event_id: "evt1".into() });
        assert_eq!(h.calendar.updates.borrow()[0].0, "gone42");
        assert_eq!(h.calendar.creates.borrow().len(), 1);
        assert_eq!(h.sheet.cell(2, col(Field::GcalEventId)), "evt1");
        assert!(h.journal.links.borrow().is_empty());
    }

    #[test]
    fn missing_flight_leaves_row_untouched() {
        let h = Harness::new(FakeSource::default(), sheet_with("2025-06-01", "XX000", "", ""));
        let before = h.sheet.values.borrow().clone();

        let outcome = h.run(today());
        assert!(matches!(
            outcome,
            RowOutcome::Failed {
                reason: RowError::Scrape(ScrapeFailure::NotFound(_))
            }
        ));
        assert!(h.calendar.creates.borrow().is_empty());
        assert!(h.calendar.updates.borrow().is_empty());
        assert!(h.sheet.writes.borrow().is_empty());
        assert_eq!(*h.sheet.values.borrow(), before);
    }

    #[test]
    fn unknown_airport_leaves_row_untouched() {
        let html = fixture("flight-page-multi.html").replace("(DXB)", "(QQQ)");
        let h = Harness::new(FakeSource::with_page("BA999", html), sheet_with("2025-06-01", "BA999", "", ""));

        let outcome = h.run(today());
        assert_eq!(
            outcome,
            RowOutcome::Failed {
                reason: RowError::UnknownAirport(UnknownAirport("QQQ".into()))
            }
        );
        assert!(h.calendar.creates.borrow().is_empty());
        assert!(h.sheet.writes.borrow().is_empty());
    }

    #[test]
    fn past_rows_are_never_scraped() {
        let h = Harness::new(ba999(), sheet_with("2025-06-01", "BA999", "abc123", ""));
        assert_eq!(
            h.run(date(2025, 7, 1)),
            RowOutcome::Skipped {
                reason: "flight date in the past"
            }
        );
        assert!(h.source.fetches.borrow().is_empty());
        assert!(h.calendar.updates.borrow().is_empty());
        assert!(h.sheet.writes.borrow().is_empty());
    }

    #[test]
    fn wrong_day_listing_is_not_substituted() {
        // Only May 31 and June 1 are listed.
        let h = Harness::new(ba999(), sheet_with("2025-06-03", "BA999", "", ""));
        assert!(matches!(
            h.run(today()),
            RowOutcome::Failed {
                reason: RowError::Scrape(ScrapeFailure::NotFound(_))
            }
        ));
        assert!(h.calendar.creates.borrow().is_empty());
    }

    #[test]
    fn failed_write_back_reuses_pending_event_next_run() {
        let h = Harness::new(ba999(), sheet_with("2025-06-01", "BA999", "", ""));
        h.sheet.fail_writes.set(true);
        assert!(matches!(
            h.run(today()),
            RowOutcome::Failed {
                reason: RowError::Sheet(_)
            }
        ));
        assert_eq!(h.calendar.creates.borrow().len(), 1);
        assert_eq!(h.sheet.cell(2, col(Field::GcalEventId)), "");
        assert_eq!(
            h.journal.links.borrow().get(&("BA999".to_string(), date(2025, 6, 1), 2)),
            Some(&"evt1".to_string())
        );

        h.sheet.fail_writes.set(false);
        assert_eq!(h.run(today()), RowOutcome::Created { event_id: "evt1".into() });
        assert_eq!(h.calendar.creates.borrow().len(), 1);
        assert_eq!(h.calendar.updates.borrow()[0].0, "evt1");
        assert_eq!(h.sheet.cell(2, col(Field::GcalEventId)), "evt1");
        assert!(h.journal.links.borrow().is_empty());
    }

    #[test]
    fn pending_event_of_another_row_is_not_adopted() {
        let h = Harness::new(ba999(), sheet_with("2025-06-01", "BA999", "", ""));
        h.calendar.events.borrow_mut().insert(
            "other7".into(),
            CalendarEvent {
                title: "row 9".into(),
                start: chrono_tz::UTC.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(),
                end: chrono_tz::UTC.with_ymd_and_hms(2025, 6, 1, 1, 0, 0).unwrap(),
                description: String::new(),
            },
        );
        h.journal
            .links
            .borrow_mut()
            .insert(("BA999".to_string(), date(2025, 6, 1), 9), "other7".to_string());

        assert_eq!(h.run(today()), RowOutcome::Created { event_id: "evt1".into() });
        assert!(h.calendar.updates.borrow().is_empty());
        assert_eq!(h.calendar.events.borrow()["other7"].title, "row 9");
        assert_eq!(h.sheet.cell(2, col(Field::GcalEventId)), "evt1");
        // Row 9 keeps its own pending link.
        assert_eq!(h.journal.links.borrow().len(), 1);
    }

    #[test]
    fn calendar_failure_writes_nothing() {
        let h = Harness::new(ba999(), sheet_with("2025-06-01", "BA999", "", ""));
        h.calendar.fail_writes.set(true);
        assert!(matches!(
            h.run(today()),
            RowOutcome::Failed {
                reason: RowError::Calendar(StoreError::WriteFailure(_))
            }
        ));
        assert!(h.sheet.writes.borrow().is_empty());
        assert!(h.journal.links.borrow().is_empty());
    }

    #[test]
    fn unreadable_journal_fails_the_row_before_creating() {
        let h = Harness::new(ba999(), sheet_with("2025-06-01", "BA999", "", ""));
        h.journal.fail_reads.set(true);
        assert!(matches!(
            h.run(today()),
            RowOutcome::Failed {
                reason: RowError::Journal(_)
            }
        ));
        assert!(h.calendar.creates.borrow().is_empty());
    }

    #[test]
    fn journal_write_failure_does_not_fail_the_row() {
        let h = Harness::new(ba999(), sheet_with("2025-06-01", "BA999", "", ""));
        h.journal.fail_writes.set(true);
        assert_eq!(h.run(today()), RowOutcome::Created { event_id: "evt1".into() });
        assert_eq!(h.sheet.cell(2, col(Field::GcalEventId)), "evt1");
    }

    #[test]
    fn event_end_is_start_plus_duration() {
        let h = Harness::new(ba999(), sheet_with("2025-06-01", "BA999", "", ""));
        h.run(today());
        let event = h.calendar.creates.borrow()[0].clone();
        assert_eq!((event.end - event.start).num_minutes(), 6 * 60 + 55);
        assert_eq!(event.end.date_naive(), date(2025, 6, 2));
    }
}
