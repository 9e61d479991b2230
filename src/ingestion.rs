// 🚪 Ingestion Boundary - the single entry point for cities and listings
//
// Every city and listing in the directory is created here. Callers hand in
// data that is already normalized: nothing in this module rewrites fields,
// and nothing here decides whether a listing is approved.

use chrono::{DateTime, Utc};
use rusqlite::ErrorCode;
use serde::{Deserialize, Serialize};

use crate::address::slugify;
use crate::db::Store;
use crate::entities::{City, NewListing};
use crate::error::{IngestError, Result};

// ============================================================================
// SOURCES & ACTIONS
// ============================================================================

/// Upstream system a record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IngestionSource {
    Prospector,
    Outscraper,
    Submission,
    Manual,
}

impl IngestionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestionSource::Prospector => "prospector",
            IngestionSource::Outscraper => "outscraper",
            IngestionSource::Submission => "submission",
            IngestionSource::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "prospector" => Some(IngestionSource::Prospector),
            "outscraper" => Some(IngestionSource::Outscraper),
            "submission" => Some(IngestionSource::Submission),
            "manual" => Some(IngestionSource::Manual),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IngestionAction {
    Import,
    SubmissionApproved,
    CityCreated,
}

impl IngestionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestionAction::Import => "import",
            IngestionAction::SubmissionApproved => "submission_approved",
            IngestionAction::CityCreated => "city_created",
        }
    }
}

// ============================================================================
// AUDIT LOG
// ============================================================================

/// One row of the `ingestion_log` audit table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionLogEntry {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub action: String,
    pub details: String,
    pub records_affected: i64,
}

impl IngestionLogEntry {
    pub fn new(
        source: IngestionSource,
        action: IngestionAction,
        details: &str,
        records_affected: i64,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            source: source.as_str().to_string(),
            action: action.as_str().to_string(),
            details: details.to_string(),
            records_affected,
        }
    }
}

/// Record an ingestion event. Always traced; the durable row is best-effort
/// and a failed write never reaches the caller.
pub fn log_ingestion(
    store: &Store,
    source: IngestionSource,
    action: IngestionAction,
    details: &str,
    records_affected: i64,
) {
    let entry = IngestionLogEntry::new(source, action, details, records_affected);

    tracing::info!(
        source = source.as_str(),
        action = action.as_str(),
        records_affected,
        "[Ingestion] {}",
        details
    );

    if let Err(e) = store.insert_ingestion_log(&entry) {
        tracing::warn!(event_id = %entry.event_id, error = %e, "ingestion_log write failed");
    }
}

// ============================================================================
// CITIES
// ============================================================================

/// Find a city by (state, name) case-insensitively, creating it if absent.
///
/// This is the only city-creation path. Concurrent callers racing on the same
/// key are resolved by the store's unique index: the loser of the insert
/// re-reads the winner's row.
pub fn ensure_city(
    store: &Store,
    state_id: i64,
    state_code: &str,
    city_name: &str,
    lat: Option<f64>,
    lng: Option<f64>,
) -> Result<City> {
    let name = city_name.trim();

    if let Some(existing) = store.find_city(state_id, name)? {
        return Ok(existing);
    }

    create_city_or_fetch(store, state_id, state_code, name, lat, lng)
}

/// Insert a city; on a uniqueness conflict return the row that won.
pub(crate) fn create_city_or_fetch(
    store: &Store,
    state_id: i64,
    state_code: &str,
    name: &str,
    lat: Option<f64>,
    lng: Option<f64>,
) -> Result<City> {
    let slug = slugify(name);
    let code = state_code.to_lowercase();

    match store.insert_city(&slug, name, state_id, &code, lat, lng) {
        Ok(id) => {
            log_ingestion(
                store,
                IngestionSource::Manual,
                IngestionAction::CityCreated,
                &format!("Created city: {} ({})", name, code),
                1,
            );

            Ok(City {
                id,
                slug,
                name: name.to_string(),
                state_id,
                state_code: code,
                lat,
                lng,
                store_count: 0,
            })
        }
        Err(rusqlite::Error::SqliteFailure(err, _)) if err.code == ErrorCode::ConstraintViolation => {
            tracing::debug!(state_id, city = name, "city insert lost race, re-reading");
            store.find_city(state_id, name)?.ok_or_else(|| {
                IngestError::Resolution(format!(
                    "city '{}' conflicted on insert but could not be re-read (state_id={})",
                    name, state_id
                ))
            })
        }
        Err(e) => Err(e.into()),
    }
}

// ============================================================================
// LISTINGS
// ============================================================================

/// Insert a listing exactly as given and return its id.
///
/// A clash on `external_id` surfaces as `IngestError::Duplicate`.
pub fn import_repair_company(store: &Store, listing: &NewListing) -> Result<i64> {
    match store.insert_listing(listing) {
        Ok(id) => Ok(id),
        Err(rusqlite::Error::SqliteFailure(err, msg))
            if err.code == ErrorCode::ConstraintViolation && listing.external_id.is_some() =>
        {
            tracing::debug!(detail = ?msg, "listing insert hit a uniqueness constraint");
            Err(IngestError::Duplicate {
                external_id: listing.external_id.clone().unwrap_or_default(),
            })
        }
        Err(e) => Err(e.into()),
    }
}
