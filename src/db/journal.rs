//! Durable "event created, row pending" log plus run history.
//!
//! A calendar event created for a row is recorded here before the row
//! write-back and cleared once the row carries the event ID. When the
//! write-back fails (or the process dies in between), the next run finds the
//! pending link and reuses that event instead of creating a duplicate.

use chrono::{NaiveDate, Utc};
use diesel::PgConnection;
use diesel::prelude::*;
use std::cell::RefCell;

use crate::db::models::{NewPendingLink, NewSyncRun, PendingLink};
use crate::error::JournalError;
use crate::models::flight::FlightNumber;
use crate::schema;
use crate::services::sync::RunSummary;

pub trait LinkJournal {
    /// Event ID created for this flight on this sheet row whose write-back has
    /// not been confirmed. Links are per row, so two rows holding the same
    /// flight never adopt each other's event.
    fn pending_event(&self, flight: &FlightNumber, date: NaiveDate, row: usize)
    -> Result<Option<String>, JournalError>;

    fn record_pending(&self, flight: &FlightNumber, date: NaiveDate, event_id: &str, row: usize)
    -> Result<(), JournalError>;

    fn clear(&self, flight: &FlightNumber, date: NaiveDate, row: usize) -> Result<(), JournalError>;

    fn record_run(&self, summary: &RunSummary) -> Result<(), JournalError>;
}

pub struct PgJournal {
    conn: RefCell<PgConnection>,
}

impl PgJournal {
    pub fn new(conn: PgConnection) -> Self {
        PgJournal {
            conn: RefCell::new(conn),
        }
    }
}

impl LinkJournal for PgJournal {
    fn pending_event(
        &self,
        flight: &FlightNumber,
        date: NaiveDate,
        row: usize,
    ) -> Result<Option<String>, JournalError> {
        use schema::pending_event_links::dsl as P;

        let sheet_row = sheet_row(row)?;
        let conn = &mut *self.conn.borrow_mut();
        let link: Option<PendingLink> = P::pending_event_links
            .filter(P::flight_number.eq(flight.as_str()))
            .filter(P::flight_date.eq(date))
            .filter(P::sheet_row.eq(sheet_row))
            .select(PendingLink::as_select())
            .first(conn)
            .optional()
            .map_err(|e| JournalError(format!("fetch pending link failed: {}", e)))?;
        Ok(link.map(|l| l.event_id))
    }

    fn record_pending(
        &self,
        flight: &FlightNumber,
        date: NaiveDate,
        event_id: &str,
        row: usize,
    ) -> Result<(), JournalError> {
        use schema::pending_event_links::dsl as P;

        let new_row = NewPendingLink {
            flight_number: flight.to_string(),
            flight_date: date,
            event_id: event_id.to_string(),
            sheet_row: sheet_row(row)?,
            created_at: Utc::now(),
        };
        let conn = &mut *self.conn.borrow_mut();
        diesel::insert_into(P::pending_event_links)
            .values(&new_row)
            .on_conflict((P::flight_number, P::flight_date, P::sheet_row))
            .do_update()
            .set((P::event_id.eq(new_row.event_id.clone()), P::created_at.eq(new_row.created_at)))
            .execute(conn)
            .map_err(|e| JournalError(format!("upsert pending link failed: {}", e)))?;
        Ok(())
    }

    fn clear(&self, flight: &FlightNumber, date: NaiveDate, row: usize) -> Result<(), JournalError> {
        use schema::pending_event_links::dsl as P;

        let sheet_row = sheet_row(row)?;
        let conn = &mut *self.conn.borrow_mut();
        let link = P::pending_event_links
            .filter(P::flight_number.eq(flight.as_str()))
            .filter(P::flight_date.eq(date))
            .filter(P::sheet_row.eq(sheet_row));
        diesel::delete(link)
            .execute(conn)
            .map_err(|e| JournalError(format!("delete pending link failed: {}", e)))?;
        Ok(())
    }

    fn record_run(&self, summary: &RunSummary) -> Result<(), JournalError> {
        use schema::sync_runs::dsl as S;

        let row = new_sync_run(summary)?;
        let conn = &mut *self.conn.borrow_mut();
        diesel::insert_into(S::sync_runs)
            .values(&row)
            .execute(conn)
            .map_err(|e| JournalError(format!("insert sync run failed: {}", e)))?;
        Ok(())
    }
}

fn sheet_row(row: usize) -> Result<i32, JournalError> {
    i32::try_from(row).map_err(|_| JournalError(format!("row {row} out of range")))
}

fn new_sync_run(summary: &RunSummary) -> Result<NewSyncRun, JournalError> {
    let count = |n: usize| i32::try_from(n).map_err(|_| JournalError(format!("count {n} out of range")));
    Ok(NewSyncRun {
        started_at: summary.started_at,
        finished_at: summary.finished_at,
        created: count(summary.created)?,
        updated: count(summary.updated)?,
        skipped: count(summary.skipped)?,
        failed: count(summary.failed)?,
        outcomes: serde_json::to_value(&summary.rows)
            .map_err(|e| JournalError(format!("serialize outcomes failed: {}", e)))?,
    })
}
