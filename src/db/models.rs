//! Diesel model structs for the link journal and run history.

use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema;

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = schema::pending_event_links)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PendingLink {
    pub flight_number: String,
    pub flight_date: NaiveDate,
    pub event_id: String,
    pub sheet_row: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = schema::pending_event_links)]
pub struct NewPendingLink {
    pub flight_number: String,
    pub flight_date: NaiveDate,
    pub event_id: String,
    pub sheet_row: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = schema::sync_runs)]
pub struct NewSyncRun {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub created: i32,
    pub updated: i32,
    pub skipped: i32,
    pub failed: i32,
    pub outcomes: serde_json::Value,
}
