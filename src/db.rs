// 🗄️ Directory Store - SQLite persistence for states, cities and listings
//
// The connection is private and every write is pub(crate): outside this
// library the only way to create or change a City or Listing is through
// `ingestion`, `merge` or `counts`.

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::entities::{City, Listing, ListingSummary, NewListing, State, US_STATES};
use crate::error::{IngestError, Result};
use crate::ingestion::IngestionLogEntry;

/// Rows fetched per page when scanning all listings
pub const PAGE_SIZE: i64 = 1000;

/// How long a writer waits on a locked database before giving up
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const LISTING_COLUMNS: &str = "id, name, slug, address, city_id, state_id, zip, phone, website,
     description, services, rating, review_count, lat, lng, is_approved,
     external_id, source, batch_id, created_at, updated_at";

const CITY_COLUMNS: &str = "id, slug, name, state_id, state_code, lat, lng, store_count";

const STATE_COLUMNS: &str = "id, slug, name, code, store_count, city_count";

pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) a database file and make sure the schema exists
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open a database that `setup` already created. Never creates a file or
    /// touches the schema, so a mistyped path is a configuration error.
    pub fn open_existing(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(IngestError::Configuration(format!(
                "database {} does not exist (run setup first)",
                path.display()
            )));
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        let tables: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master
             WHERE type = 'table' AND name IN ('states', 'cities', 'listings', 'ingestion_log')",
            [],
            |row| row.get(0),
        )?;
        if tables < 4 {
            return Err(IngestError::Configuration(format!(
                "database {} is not initialised (run setup first)",
                path.display()
            )));
        }

        Ok(Store { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;

        // WAL for crash recovery and concurrent readers ("memory" for in-memory DBs)
        let _mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;

        let store = Store { conn };
        store.setup_schema()?;
        Ok(store)
    }

    fn setup_schema(&self) -> Result<()> {
        // ==========================================================================
        // Geography
        // ==========================================================================
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS states (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                slug TEXT UNIQUE NOT NULL,
                name TEXT NOT NULL,
                code TEXT NOT NULL,
                store_count INTEGER NOT NULL DEFAULT 0,
                city_count INTEGER NOT NULL DEFAULT 0,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS cities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                slug TEXT NOT NULL,
                name TEXT NOT NULL,
                state_id INTEGER NOT NULL,
                state_code TEXT NOT NULL,
                lat REAL,
                lng REAL,
                store_count INTEGER NOT NULL DEFAULT 0,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        // ensure_city relies on this for fetch-on-conflict
        self.conn.execute(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_cities_state_name
             ON cities(state_id, name COLLATE NOCASE)",
            [],
        )?;

        // ==========================================================================
        // Listings
        // Referential integrity is checked by the integrity pass, not enforced here
        // ==========================================================================
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS listings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                slug TEXT NOT NULL,
                address TEXT,
                city_id INTEGER,
                state_id INTEGER,
                zip TEXT,
                phone TEXT,
                website TEXT,
                description TEXT,
                services TEXT,
                rating REAL,
                review_count INTEGER,
                lat REAL,
                lng REAL,
                is_approved INTEGER NOT NULL DEFAULT 0,
                external_id TEXT UNIQUE,
                source TEXT,
                batch_id TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_listings_city ON listings(city_id)",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_listings_state ON listings(state_id)",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_listings_batch ON listings(batch_id)",
            [],
        )?;

        // ==========================================================================
        // Ingestion audit log
        // ==========================================================================
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS ingestion_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_id TEXT UNIQUE NOT NULL,
                timestamp TEXT NOT NULL,
                source TEXT NOT NULL,
                action TEXT NOT NULL,
                details TEXT NOT NULL,
                records_affected INTEGER NOT NULL DEFAULT 0
            )",
            [],
        )?;

        Ok(())
    }

    /// Insert the 50 states plus DC. Safe to run repeatedly.
    pub fn seed_states(&self) -> Result<usize> {
        let mut inserted = 0;

        for state in US_STATES {
            inserted += self.conn.execute(
                "INSERT OR IGNORE INTO states (slug, name, code) VALUES (?1, ?2, ?3)",
                params![state.slug(), state.name, state.code],
            )?;
        }

        Ok(inserted)
    }

    // ========================================================================
    // STATES
    // ========================================================================

    pub fn get_state_by_slug(&self, slug: &str) -> Result<Option<State>> {
        let sql = format!("SELECT {} FROM states WHERE slug = ?1", STATE_COLUMNS);
        let state = self
            .conn
            .query_row(&sql, params![slug], state_from_row)
            .optional()?;
        Ok(state)
    }

    pub fn get_state(&self, id: i64) -> Result<Option<State>> {
        let sql = format!("SELECT {} FROM states WHERE id = ?1", STATE_COLUMNS);
        let state = self
            .conn
            .query_row(&sql, params![id], state_from_row)
            .optional()?;
        Ok(state)
    }

    pub fn list_states(&self) -> Result<Vec<State>> {
        let sql = format!("SELECT {} FROM states ORDER BY id", STATE_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let states = stmt
            .query_map([], state_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(states)
    }

    // ========================================================================
    // CITIES
    // ========================================================================

    /// Case-insensitive lookup by (name, state)
    pub fn find_city(&self, state_id: i64, name: &str) -> Result<Option<City>> {
        let sql = format!(
            "SELECT {} FROM cities WHERE state_id = ?1 AND name = ?2 COLLATE NOCASE",
            CITY_COLUMNS
        );
        let city = self
            .conn
            .query_row(&sql, params![state_id, name], city_from_row)
            .optional()?;
        Ok(city)
    }

    pub fn get_city(&self, id: i64) -> Result<Option<City>> {
        let sql = format!("SELECT {} FROM cities WHERE id = ?1", CITY_COLUMNS);
        let city = self
            .conn
            .query_row(&sql, params![id], city_from_row)
            .optional()?;
        Ok(city)
    }

    pub fn list_cities(&self) -> Result<Vec<City>> {
        let sql = format!("SELECT {} FROM cities ORDER BY id", CITY_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let cities = stmt
            .query_map([], city_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(cities)
    }

    pub fn count_cities(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM cities", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Raw insert. Returns the rusqlite error untouched so the caller can
    /// recognise a uniqueness conflict.
    pub(crate) fn insert_city(
        &self,
        slug: &str,
        name: &str,
        state_id: i64,
        state_code: &str,
        lat: Option<f64>,
        lng: Option<f64>,
    ) -> rusqlite::Result<i64> {
        self.conn.execute(
            "INSERT INTO cities (slug, name, state_id, state_code, lat, lng)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![slug, name, state_id, state_code, lat, lng],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    // ========================================================================
    // LISTINGS
    // ========================================================================

    pub fn get_listing(&self, id: i64) -> Result<Option<Listing>> {
        let sql = format!("SELECT {} FROM listings WHERE id = ?1", LISTING_COLUMNS);
        let listing = self
            .conn
            .query_row(&sql, params![id], listing_from_row)
            .optional()?;
        Ok(listing)
    }

    pub fn listing_exists_by_external_id(&self, external_id: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM listings WHERE external_id = ?1",
                params![external_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn count_listings(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM listings", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn list_listings_by_batch(&self, batch_id: &str) -> Result<Vec<Listing>> {
        let sql = format!(
            "SELECT {} FROM listings WHERE batch_id = ?1 ORDER BY id",
            LISTING_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let listings = stmt
            .query_map(params![batch_id], listing_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(listings)
    }

    /// One page of listings joined with city/state display names, ordered by id
    pub fn listing_summaries_page(&self, offset: i64, limit: i64) -> Result<Vec<ListingSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT l.id, l.name, l.address, l.phone, l.city_id,
                    COALESCE(c.name, ''), COALESCE(s.name, ''),
                    l.external_id, l.is_approved, l.created_at
             FROM listings l
             LEFT JOIN cities c ON c.id = l.city_id
             LEFT JOIN states s ON s.id = l.state_id
             ORDER BY l.id
             LIMIT ?1 OFFSET ?2",
        )?;

        let summaries = stmt
            .query_map(params![limit, offset], |row| {
                let created_at: String = row.get(9)?;
                Ok(ListingSummary {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    address: row.get(2)?,
                    phone: row.get(3)?,
                    city_id: row.get(4)?,
                    city_name: row.get(5)?,
                    state_name: row.get(6)?,
                    external_id: row.get(7)?,
                    is_approved: row.get(8)?,
                    created_at: parse_timestamp(9, &created_at)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(summaries)
    }

    /// All listings, fetched page by page
    pub fn all_listing_summaries(&self) -> Result<Vec<ListingSummary>> {
        let mut all = Vec::new();
        let mut offset = 0;

        loop {
            let page = self.listing_summaries_page(offset, PAGE_SIZE)?;
            let fetched = page.len() as i64;
            all.extend(page);

            if fetched < PAGE_SIZE {
                break;
            }
            offset += PAGE_SIZE;
            tracing::debug!(fetched = all.len(), "fetched listing page");
        }

        Ok(all)
    }

    pub(crate) fn insert_listing(&self, listing: &NewListing) -> rusqlite::Result<i64> {
        let services_json = services_to_json(&listing.services)?;
        let now = Utc::now().to_rfc3339();

        self.conn.execute(
            "INSERT INTO listings (
                name, slug, address, city_id, state_id, zip, phone, website,
                description, services, rating, review_count, lat, lng, is_approved,
                external_id, source, batch_id, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?19)",
            params![
                listing.name,
                listing.slug,
                listing.address,
                listing.city_id,
                listing.state_id,
                listing.zip,
                listing.phone,
                listing.website,
                listing.description,
                services_json,
                listing.rating,
                listing.review_count,
                listing.lat,
                listing.lng,
                listing.is_approved,
                listing.external_id,
                listing.source,
                listing.batch_id,
                now,
            ],
        )?;

        Ok(self.conn.last_insert_rowid())
    }

    /// Delete `remove_id` and write the fillable fields of `merged` in one
    /// transaction. The delete runs first so a filled external_id cannot
    /// collide with the row it came from.
    pub(crate) fn apply_merge(&self, merged: &Listing, remove_id: i64) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;

        let deleted = tx.execute("DELETE FROM listings WHERE id = ?1", params![remove_id])?;
        if deleted == 0 {
            return Err(IngestError::Resolution(format!(
                "remove_id={} disappeared before delete",
                remove_id
            )));
        }

        let services_json = services_to_json(&merged.services)?;
        let updated = tx.execute(
            "UPDATE listings SET
                address = ?1, phone = ?2, website = ?3, description = ?4, zip = ?5,
                lat = ?6, lng = ?7, rating = ?8, review_count = ?9, services = ?10,
                external_id = ?11, source = ?12, updated_at = ?13
             WHERE id = ?14",
            params![
                merged.address,
                merged.phone,
                merged.website,
                merged.description,
                merged.zip,
                merged.lat,
                merged.lng,
                merged.rating,
                merged.review_count,
                services_json,
                merged.external_id,
                merged.source,
                Utc::now().to_rfc3339(),
                merged.id,
            ],
        )?;
        if updated == 0 {
            return Err(IngestError::Resolution(format!(
                "keep_id={} disappeared before update",
                merged.id
            )));
        }

        tx.commit()?;
        Ok(())
    }

    // ========================================================================
    // AGGREGATES
    // ========================================================================

    /// city_id → number of approved listings
    pub fn approved_counts_by_city(&self) -> Result<HashMap<i64, i64>> {
        self.grouped_counts(
            "SELECT city_id, COUNT(*) FROM listings
             WHERE is_approved = 1 AND city_id IS NOT NULL
             GROUP BY city_id",
        )
    }

    /// state_id → number of approved listings
    pub fn approved_counts_by_state(&self) -> Result<HashMap<i64, i64>> {
        self.grouped_counts(
            "SELECT state_id, COUNT(*) FROM listings
             WHERE is_approved = 1 AND state_id IS NOT NULL
             GROUP BY state_id",
        )
    }

    fn grouped_counts(&self, sql: &str) -> Result<HashMap<i64, i64>> {
        let mut stmt = self.conn.prepare(sql)?;
        let counts = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<std::result::Result<HashMap<_, _>, _>>()?;
        Ok(counts)
    }

    pub(crate) fn update_city_store_count(&self, city_id: i64, store_count: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE cities SET store_count = ?1 WHERE id = ?2",
            params![store_count, city_id],
        )?;
        Ok(())
    }

    pub(crate) fn update_state_store_count(&self, state_id: i64, store_count: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE states SET store_count = ?1 WHERE id = ?2",
            params![store_count, state_id],
        )?;
        Ok(())
    }

    pub(crate) fn update_state_city_count(&self, state_id: i64, city_count: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE states SET city_count = ?1 WHERE id = ?2",
            params![city_count, state_id],
        )?;
        Ok(())
    }

    // ========================================================================
    // INTEGRITY QUERIES
    // ========================================================================

    /// Listings whose non-null city_id matches no city
    pub fn orphaned_listing_ids(&self) -> Result<Vec<i64>> {
        self.ids(
            "SELECT l.id FROM listings l
             LEFT JOIN cities c ON c.id = l.city_id
             WHERE l.city_id IS NOT NULL AND c.id IS NULL
             ORDER BY l.id",
        )
    }

    /// Cities whose state_id matches no state
    pub fn orphaned_cities(&self) -> Result<Vec<City>> {
        let sql = format!(
            "SELECT {} FROM cities
             WHERE state_id NOT IN (SELECT id FROM states)
             ORDER BY id",
            CITY_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let cities = stmt
            .query_map([], city_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(cities)
    }

    /// Count plus up to `sample` ids of listings matching a fixed predicate
    pub(crate) fn listings_where(
        &self,
        predicate: &'static str,
        sample: usize,
    ) -> Result<(i64, Vec<i64>)> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM listings WHERE {}", predicate),
            [],
            |row| row.get(0),
        )?;

        let ids = if count > 0 && sample > 0 {
            self.ids(&format!(
                "SELECT id FROM listings WHERE {} ORDER BY id LIMIT {}",
                predicate, sample
            ))?
        } else {
            Vec::new()
        };

        Ok((count, ids))
    }

    fn ids(&self, sql: &str) -> Result<Vec<i64>> {
        let mut stmt = self.conn.prepare(sql)?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    // ========================================================================
    // INGESTION LOG
    // ========================================================================

    pub(crate) fn insert_ingestion_log(&self, entry: &IngestionLogEntry) -> Result<()> {
        self.conn.execute(
            "INSERT INTO ingestion_log (
                event_id, timestamp, source, action, details, records_affected
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.event_id,
                entry.timestamp.to_rfc3339(),
                entry.source,
                entry.action,
                entry.details,
                entry.records_affected,
            ],
        )?;
        Ok(())
    }

    /// Most recent audit entries first
    pub fn recent_ingestion_log(&self, limit: i64) -> Result<Vec<IngestionLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT event_id, timestamp, source, action, details, records_affected
             FROM ingestion_log
             ORDER BY id DESC
             LIMIT ?1",
        )?;

        let entries = stmt
            .query_map(params![limit], |row| {
                let timestamp: String = row.get(1)?;
                Ok(IngestionLogEntry {
                    event_id: row.get(0)?,
                    timestamp: parse_timestamp(1, &timestamp)?,
                    source: row.get(2)?,
                    action: row.get(3)?,
                    details: row.get(4)?,
                    records_affected: row.get(5)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(entries)
    }
}

// ============================================================================
// ROW MAPPING
// ============================================================================

fn state_from_row(row: &Row<'_>) -> rusqlite::Result<State> {
    Ok(State {
        id: row.get(0)?,
        slug: row.get(1)?,
        name: row.get(2)?,
        code: row.get(3)?,
        store_count: row.get(4)?,
        city_count: row.get(5)?,
    })
}

fn city_from_row(row: &Row<'_>) -> rusqlite::Result<City> {
    Ok(City {
        id: row.get(0)?,
        slug: row.get(1)?,
        name: row.get(2)?,
        state_id: row.get(3)?,
        state_code: row.get(4)?,
        lat: row.get(5)?,
        lng: row.get(6)?,
        store_count: row.get(7)?,
    })
}

fn listing_from_row(row: &Row<'_>) -> rusqlite::Result<Listing> {
    let services_json: Option<String> = row.get(10)?;
    let services = services_json
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(10, Type::Text, Box::new(e)))?;
    let created_at: String = row.get(19)?;
    let updated_at: String = row.get(20)?;

    Ok(Listing {
        id: row.get(0)?,
        name: row.get(1)?,
        slug: row.get(2)?,
        address: row.get(3)?,
        city_id: row.get(4)?,
        state_id: row.get(5)?,
        zip: row.get(6)?,
        phone: row.get(7)?,
        website: row.get(8)?,
        description: row.get(9)?,
        services,
        rating: row.get(11)?,
        review_count: row.get(12)?,
        lat: row.get(13)?,
        lng: row.get(14)?,
        is_approved: row.get(15)?,
        external_id: row.get(16)?,
        source: row.get(17)?,
        batch_id: row.get(18)?,
        created_at: parse_timestamp(19, &created_at)?,
        updated_at: parse_timestamp(20, &updated_at)?,
    })
}

fn parse_timestamp(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn services_to_json(services: &Option<Vec<String>>) -> rusqlite::Result<Option<String>> {
    services
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{new_listing, seeded_store};

    #[test]
    fn test_setup_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        store.setup_schema().unwrap();
        store.setup_schema().unwrap();

        assert_eq!(store.seed_states().unwrap(), 51);
        assert_eq!(store.seed_states().unwrap(), 0);
        assert_eq!(store.list_states().unwrap().len(), 51);
    }

    #[test]
    fn test_state_lookup_by_slug() {
        let store = seeded_store();

        let nc = store.get_state_by_slug("north-carolina").unwrap().unwrap();
        assert_eq!(nc.name, "North Carolina");
        assert_eq!(nc.code, "NC");
        assert_eq!(nc.store_count, 0);

        assert!(store.get_state_by_slug("atlantis").unwrap().is_none());
    }

    #[test]
    fn test_listing_roundtrip_preserves_services() {
        let store = seeded_store();
        let mut listing = new_listing("Cool Fix", Some(1), Some(1));
        listing.services = Some(vec!["Washer".to_string(), "Dryer".to_string()]);
        listing.external_id = Some("place-1".to_string());

        let id = store.insert_listing(&listing).unwrap();
        let loaded = store.get_listing(id).unwrap().unwrap();

        assert_eq!(loaded.name, "Cool Fix");
        assert_eq!(
            loaded.services,
            Some(vec!["Washer".to_string(), "Dryer".to_string()])
        );
        assert!(store.listing_exists_by_external_id("place-1").unwrap());
        assert!(!store.listing_exists_by_external_id("place-2").unwrap());
    }

    #[test]
    fn test_external_id_is_unique() {
        let store = seeded_store();
        let mut listing = new_listing("Cool Fix", Some(1), Some(1));
        listing.external_id = Some("place-1".to_string());

        store.insert_listing(&listing).unwrap();
        let second = store.insert_listing(&listing);

        assert!(matches!(
            second,
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation
        ));
    }

    #[test]
    fn test_open_existing_never_creates() {
        let dir = tempfile::tempdir().unwrap();
        let typo = dir.path().join("typo.db");

        let err = Store::open_existing(&typo).err().unwrap();
        assert!(err.is_fatal());
        assert!(!typo.exists());

        let empty = dir.path().join("empty.db");
        std::fs::write(&empty, b"").unwrap();
        let err = Store::open_existing(&empty).err().unwrap();
        assert!(err.to_string().contains("not initialised"));

        let path = dir.path().join("directory.db");
        Store::open(&path).unwrap().seed_states().unwrap();
        let store = Store::open_existing(&path).unwrap();
        assert_eq!(store.list_states().unwrap().len(), 51);
    }

    #[test]
    fn test_malformed_services_is_a_read_error() {
        let store = seeded_store();
        let id = store.insert_listing(&new_listing("Cool Fix", Some(1), Some(1))).unwrap();
        store
            .conn
            .execute("UPDATE listings SET services = 'not json' WHERE id = ?1", params![id])
            .unwrap();

        let err = store.get_listing(id).err().unwrap();
        assert!(matches!(
            err,
            IngestError::Store(rusqlite::Error::FromSqlConversionFailure(10, Type::Text, _))
        ));
    }

    #[test]
    fn test_summaries_paginate_past_one_page() {
        let store = seeded_store();
        let total = PAGE_SIZE + 5;
        for i in 0..total {
            store
                .insert_listing(&new_listing(&format!("Shop {}", i), Some(1), Some(1)))
                .unwrap();
        }

        let all = store.all_listing_summaries().unwrap();

        assert_eq!(all.len() as i64, total);
        assert!(all.windows(2).all(|w| w[0].id < w[1].id));
    }
}
