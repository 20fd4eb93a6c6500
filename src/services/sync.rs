//! One sync run over the whole sheet.

use chrono::{DateTime, NaiveDate, Utc};
use log::{error, info, warn};
use serde::Serialize;
use thiserror::Error;

use crate::db::journal::LinkJournal;
use crate::error::StoreError;
use crate::models::sheet::{ColumnMap, ColumnMapError, Field, SheetRow};
use crate::services::reconcile::{ReconciliationEngine, RowOutcome};
use crate::stores::SheetStore;

/// Failures that prevent a run from starting. Row failures never end up here.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("reading the sheet failed: {0}")]
    Read(#[from] StoreError),
    #[error("sheet header does not match: {0}")]
    Columns(#[from] ColumnMapError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowReport {
    pub row: usize,
    pub flight_number: Option<String>,
    pub flight_date: Option<NaiveDate>,
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    /// Skip reason or failure message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub rows: Vec<RowReport>,
}

impl RunSummary {
    fn record(&mut self, row: &SheetRow, outcome: &RowOutcome) {
        let (event_id, detail) = match outcome {
            RowOutcome::Skipped { reason } => {
                self.skipped += 1;
                (None, Some(reason.to_string()))
            }
            RowOutcome::Created { event_id } => {
                self.created += 1;
                (Some(event_id.clone()), None)
            }
            RowOutcome::Updated { event_id } => {
                self.updated += 1;
                (Some(event_id.clone()), None)
            }
            RowOutcome::Failed { reason } => {
                self.failed += 1;
                (None, Some(format!("{}: {}", reason.kind(), reason)))
            }
        };
        self.rows.push(RowReport {
            row: row.number,
            flight_number: row.flight_number().map(|f| f.to_string()),
            flight_date: row.flight_date(),
            outcome: outcome.label(),
            event_id,
            detail,
        });
    }
}

pub struct SyncOrchestrator<'a> {
    sheet: &'a dyn SheetStore,
    engine: ReconciliationEngine<'a>,
    journal: &'a dyn LinkJournal,
}

impl<'a> SyncOrchestrator<'a> {
    pub fn new(sheet: &'a dyn SheetStore, engine: ReconciliationEngine<'a>, journal: &'a dyn LinkJournal) -> Self {
        SyncOrchestrator { sheet, engine, journal }
    }

    /// Read the sheet, reconcile every row top to bottom and report.
    ///
    /// The first non-empty row is the header. Each row's writes are committed
    /// before the next row starts.
    pub fn run_once(&self, today: NaiveDate) -> Result<RunSummary, SyncError> {
        let started_at = Utc::now();
        let values = self.sheet.read_values()?;

        let header_index = values
            .iter()
            .position(|row| row.iter().any(|cell| !cell.trim().is_empty()))
            .ok_or(ColumnMapError::EmptySheet)?;
        let columns = ColumnMap::from_header(&values[header_index])?;

        let mut summary = RunSummary {
            started_at,
            finished_at: started_at,
            created: 0,
            updated: 0,
            skipped: 0,
            failed: 0,
            rows: Vec::new(),
        };
        for (index, cells) in values.iter().enumerate().skip(header_index + 1) {
            let row = SheetRow::from_values(index + 1, cells, &columns);
            let outcome = self.engine.process(&row, &columns, today);
            log_outcome(&row, &outcome);
            summary.record(&row, &outcome);
        }
        summary.finished_at = Utc::now();

        info!(
            "Sync finished: created={}, updated={}, skipped={}, failed={}",
            summary.created, summary.updated, summary.skipped, summary.failed
        );
        if let Err(e) = self.journal.record_run(&summary) {
            warn!("Could not store run summary: {}", e);
        }
        Ok(summary)
    }
}

fn log_outcome(row: &SheetRow, outcome: &RowOutcome) {
    let flight = row.get(Field::FlightNumber);
    let date = row.flight_date().map(|d| d.to_string()).unwrap_or_else(|| "-".to_string());
    match outcome {
        RowOutcome::Skipped { .. } => {}
        RowOutcome::Created { event_id } => info!("row {} {} {}: created event {}", row.number, flight, date, event_id),
        RowOutcome::Updated { event_id } => info!("row {} {} {}: updated event {}", row.number, flight, date, event_id),
        RowOutcome::Failed { reason } => {
            error!("row {} {} {}: failed ({}): {}", row.number, flight, date, reason.kind(), reason)
        }
    }
}
