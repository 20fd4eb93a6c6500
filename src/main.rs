pub mod models {
    pub mod flight;
    pub mod google;
    pub mod sheet;
}

pub mod airports;
pub mod client;
pub mod config;
pub mod db {
    pub mod journal;
    pub mod models;
}
pub mod error;
pub mod google;
pub mod schema;
pub mod scrape {
    pub mod parser;
    pub mod transport;
}
pub mod stores;
pub mod utils;
pub mod services {
    pub mod reconcile;
    pub mod scheduler;
    pub mod sync;
}

use crate::airports::AirportCatalog;
use crate::client::GoogleClient;
use crate::config::Config;
use crate::db::journal::PgJournal;
use crate::google::{GoogleCalendar, GoogleSheet, SheetRange};
use crate::scrape::transport::AviabilityClient;
use crate::services::reconcile::ReconciliationEngine;
use crate::services::scheduler;
use crate::services::sync::SyncOrchestrator;
use chrono::Local;
use diesel::PgConnection;
use diesel::prelude::*;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use log::{error, info};
use std::path::PathBuf;

#[derive(Debug)]
struct LoadedEnvFile {
    path: PathBuf,
    explicit: bool,
}

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

fn apply_database_migrations(conn: &mut PgConnection) -> Result<(), String> {
    match conn.run_pending_migrations(MIGRATIONS) {
        Ok(applied) => {
            if applied.is_empty() {
                info!("Database schema is up to date; no migrations were applied");
            } else {
                let names = applied.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ");
                info!("Applied {} database migration(s): {}", applied.len(), names);
            }
            Ok(())
        }
        Err(e) => Err(format!("Applying database migrations failed: {}", e)),
    }
}

pub fn run() -> Result<(), String> {
    // 1) Load config
    let cfg = Config::from_env()?;
    info!(
        "Config loaded (sheet_range={}, calendar={}, scrape_timeout={}s, store_timeout={}s, max_request_retries={}, interval={})",
        cfg.sheet_range,
        cfg.calendar_id,
        cfg.scrape_timeout.as_secs(),
        cfg.store_timeout.as_secs(),
        cfg.max_request_retries.get(),
        cfg.sync_interval
            .map(|d| format!("{}s", d.as_secs()))
            .unwrap_or_else(|| "once".to_string())
    );
    let range = SheetRange::parse(&cfg.sheet_range).map_err(|e| format!("SHEET_RANGE invalid: {}", e))?;

    // 2) Airport reference data
    let airports = match &cfg.airports_file {
        Some(path) => AirportCatalog::from_path(path)?,
        None => AirportCatalog::embedded()?,
    };
    info!("Loaded {} airport(s)", airports.len());

    // 3) Connect DB and apply pending migrations
    let mut conn = PgConnection::establish(&cfg.database_url).map_err(|e| format!("DB connection failed: {}", e))?;
    info!("Connected to database");
    apply_database_migrations(&mut conn)?;
    let journal = PgJournal::new(conn);

    // 4) Google stores; unreachable stores are fatal
    let client = GoogleClient::new(cfg.google.clone(), cfg.store_timeout, cfg.max_request_retries)
        .map_err(|e| format!("Google auth failed (refresh token invalid/expired?): {}", e))?;
    info!("Authenticated to Google APIs");

    let sheet = GoogleSheet::new(&client, cfg.spreadsheet_id.clone(), range);
    let rows = sheet.probe().map_err(|e| format!("Spreadsheet unreachable: {}", e))?;
    info!("Spreadsheet reachable ({} row(s) in range)", rows);
    let calendar = GoogleCalendar::new(&client, cfg.calendar_id.clone());
    let calendar_name = calendar.probe().map_err(|e| format!("Calendar unreachable: {}", e))?;
    info!("Calendar reachable: {}", calendar_name);

    // 5) Flight page source
    let source = AviabilityClient::new(cfg.scrape_timeout);

    let engine = ReconciliationEngine::new(&source, &airports, &calendar, &sheet, &journal);
    let orchestrator = SyncOrchestrator::new(&sheet, engine, &journal);

    // 6) Run once, or keep running at a steady cadence
    match cfg.sync_interval {
        Some(interval) => {
            info!("Starting sync loop: interval={}s", interval.as_secs());
            scheduler::run_loop(&orchestrator, interval)
        }
        None => {
            let summary = orchestrator
                .run_once(Local::now().date_naive())
                .map_err(|e| format!("Sync run aborted: {}", e))?;
            if summary.failed > 0 {
                info!("{} row(s) failed and will be retried on the next run", summary.failed);
            }
            Ok(())
        }
    }
}

fn configure_env_from_cli() -> Result<Option<LoadedEnvFile>, String> {
    let mut args = std::env::args_os();
    args.next(); // skip program name

    let mut env_file: Option<PathBuf> = None;

    while let Some(arg) = args.next() {
        match arg.to_str() {
            Some("--env-file") => {
                if env_file.is_some() {
                    return Err("`--env-file` provided more than once".to_string());
                }
                let value = args
                    .next()
                    .ok_or_else(|| "`--env-file` requires a path argument".to_string())?;
                env_file = Some(PathBuf::from(value));
            }
            Some(s) if s.starts_with("--env-file=") => {
                if env_file.is_some() {
                    return Err("`--env-file` provided more than once".to_string());
                }
                let path_str = &s["--env-file=".len()..];
                if path_str.is_empty() {
                    return Err("`--env-file` requires a path argument".to_string());
                }
                env_file = Some(PathBuf::from(path_str));
            }
            Some("--") => break,
            Some(other) => return Err(format!("unrecognised argument: {}", other)),
            None => return Err("argument contains invalid UTF-8".to_string()),
        }
    }

    // Values already in the process environment win over the file.
    match env_file {
        Some(path) => {
            if !path.is_file() {
                return Err(format!("env file not found: {}", path.display()));
            }
            dotenvy::from_path(&path).map_err(|e| format!("failed to load {}: {}", path.display(), e))?;
            Ok(Some(LoadedEnvFile { path, explicit: true }))
        }
        None => match dotenvy::dotenv() {
            Ok(path) => Ok(Some(LoadedEnvFile { path, explicit: false })),
            Err(e) if e.not_found() => Ok(None),
            Err(e) => Err(format!("failed to load .env: {}", e)),
        },
    }
}

fn main() {
    let loaded_env = match configure_env_from_cli() {
        Ok(info) => info,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };

    // Init logging after environment so RUST_LOG from .env is respected.
    let default_filter = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(default_filter)
        .format_timestamp_secs()
        .init();

    if let Some(info) = loaded_env.as_ref() {
        let origin = if info.explicit { "CLI-specified" } else { "default" };
        info!("Environment loaded from {} .env file: {}", origin, info.path.display());
    }

    info!(
        "flight-sheet-sync {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );
    if let Err(e) = run() {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}
