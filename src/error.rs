//! Error taxonomy shared by the scrape, reconciliation and store layers.

use thiserror::Error;

/// Why a flight page could not be turned into a record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScrapeFailure {
    /// No flight with that number is scheduled on the requested date.
    #[error("flight not found: {0}")]
    NotFound(String),
    /// The page did not have the expected shape.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    /// Network failure or timeout; the row is retried on the next run.
    #[error("transport error: {0}")]
    TransportError(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown airport {0}")]
pub struct UnknownAirport(pub String);

/// Failure while building a flight record from a scraped page.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error(transparent)]
    Scrape(#[from] ScrapeFailure),
    #[error(transparent)]
    UnknownAirport(#[from] UnknownAirport),
}

/// Collaborator-level failure reported by the sheet or calendar store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The addressed entity (e.g. a calendar event) no longer exists.
    #[error("not found: {0}")]
    NotFound(String),
    #[error("read failed: {0}")]
    ReadFailure(String),
    /// Permission, quota or transport failure while writing.
    #[error("write failed: {0}")]
    WriteFailure(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("journal error: {0}")]
pub struct JournalError(pub String);

/// Per-row failure recorded in the run summary. Never fatal to a run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowError {
    #[error(transparent)]
    Scrape(ScrapeFailure),
    #[error(transparent)]
    UnknownAirport(UnknownAirport),
    #[error("calendar store: {0}")]
    Calendar(StoreError),
    #[error("sheet store: {0}")]
    Sheet(StoreError),
    #[error(transparent)]
    Journal(#[from] JournalError),
    /// The row names a flight number that cannot be looked up.
    #[error("invalid flight number {0:?}")]
    InvalidFlightNumber(String),
}

impl RowError {
    /// Stable short label used in logs and the persisted run summary.
    pub fn kind(&self) -> &'static str {
        match self {
            RowError::Scrape(ScrapeFailure::NotFound(_)) => "not_found",
            RowError::Scrape(ScrapeFailure::MalformedResponse(_)) => "malformed_response",
            RowError::Scrape(ScrapeFailure::TransportError(_)) => "transport_error",
            RowError::UnknownAirport(_) => "unknown_airport",
            RowError::Calendar(_) => "calendar_write_failure",
            RowError::Sheet(_) => "sheet_write_failure",
            RowError::Journal(_) => "journal_failure",
            RowError::InvalidFlightNumber(_) => "invalid_flight_number",
        }
    }
}

impl From<RecordError> for RowError {
    fn from(value: RecordError) -> Self {
        match value {
            RecordError::Scrape(e) => RowError::Scrape(e),
            RecordError::UnknownAirport(e) => RowError::UnknownAirport(e),
        }
    }
}

impl From<ScrapeFailure> for RowError {
    fn from(value: ScrapeFailure) -> Self {
        RowError::Scrape(value)
    }
}
