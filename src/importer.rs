// 📥 Canonical Importer - batch import of externally collected candidates
//
// Candidates are filtered by confidence, truncated to the limit, then each
// one runs validate → duplicate-check → resolve state → ensure city → insert
// on its own. A failing record is counted and the batch moves on.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::address::{extract_zip_from_address, slugify};
use crate::db::Store;
use crate::entities::{resolve_state_code, state_slug_for_code, NewListing};
use crate::error::{IngestError, Result, SkipReason};
use crate::ingestion::{
    ensure_city, import_repair_company, log_ingestion, IngestionAction, IngestionSource,
};

pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.85;

/// Eligible records shown by a dry run
pub const PREVIEW_LIMIT: usize = 10;

// ============================================================================
// CANDIDATE RECORD
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExternalIds {
    #[serde(default)]
    pub google_place_id: Option<String>,
}

/// Untrusted record produced by the upstream collector.
/// Every field may be absent; validation decides what is usable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,

    /// Full name ("North Carolina") or code ("NC")
    #[serde(default)]
    pub state: Option<String>,

    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub categories: Option<Vec<String>>,

    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub external_ids: Option<ExternalIds>,

    #[serde(default)]
    pub confidence: Option<f64>,
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl CandidateRecord {
    /// Top-level `external_id`, falling back to `external_ids.google_place_id`
    pub fn external_id(&self) -> Option<&str> {
        non_blank(&self.external_id).or_else(|| {
            self.external_ids
                .as_ref()
                .and_then(|ids| non_blank(&ids.google_place_id))
        })
    }

    /// Missing confidence counts as 0
    pub fn confidence(&self) -> f64 {
        self.confidence.unwrap_or(0.0)
    }

    pub fn display_name(&self) -> &str {
        non_blank(&self.name).unwrap_or("(unnamed)")
    }

    /// First missing required field, in check order
    pub fn validate(&self) -> std::result::Result<(), SkipReason> {
        if self.external_id().is_none() {
            return Err(SkipReason::MissingExternalId);
        }
        if non_blank(&self.name).is_none() {
            return Err(SkipReason::EmptyName);
        }
        if non_blank(&self.address).is_none() {
            return Err(SkipReason::EmptyAddress);
        }
        if non_blank(&self.state).is_none() {
            return Err(SkipReason::EmptyState);
        }
        Ok(())
    }

    /// Categories → services: blanks dropped, empty list → None
    pub fn services(&self) -> Option<Vec<String>> {
        let services: Vec<String> = self
            .categories
            .iter()
            .flatten()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();

        if services.is_empty() {
            None
        } else {
            Some(services)
        }
    }
}

/// Read a JSON array of candidates
pub fn load_candidates(path: &Path) -> Result<Vec<CandidateRecord>> {
    let raw = std::fs::read_to_string(path)?;
    let records = serde_json::from_str(&raw)?;
    Ok(records)
}

// ============================================================================
// OPTIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ImportOptions {
    /// Opaque tag stamped on every inserted listing
    pub batch_id: String,
    pub confidence_threshold: f64,
    /// None = unbounded
    pub limit: Option<usize>,
    pub dry_run: bool,
    pub source: IngestionSource,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            batch_id: String::new(),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            limit: None,
            dry_run: false,
            source: IngestionSource::Outscraper,
        }
    }
}

impl ImportOptions {
    pub fn validate(&self) -> Result<()> {
        if self.batch_id.trim().is_empty() {
            return Err(IngestError::Configuration(
                "--batch-id is required".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(IngestError::Configuration(format!(
                "--confidence must be between 0 and 1 (got {})",
                self.confidence_threshold
            )));
        }
        Ok(())
    }
}

// ============================================================================
// REPORT
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportStats {
    pub total: usize,
    pub eligible: usize,
    pub inserted: usize,
    pub skipped: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkipReasons {
    pub missing_external_id: usize,
    pub empty_name: usize,
    pub empty_address: usize,
    pub empty_state: usize,
    pub empty_city: usize,
    pub already_exists: usize,
}

impl SkipReasons {
    pub fn record(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::MissingExternalId => self.missing_external_id += 1,
            SkipReason::EmptyName => self.empty_name += 1,
            SkipReason::EmptyAddress => self.empty_address += 1,
            SkipReason::EmptyState => self.empty_state += 1,
            SkipReason::EmptyCity => self.empty_city += 1,
            SkipReason::AlreadyExists => self.already_exists += 1,
        }
    }

    /// Non-zero reasons, most common upstream causes first
    pub fn breakdown(&self) -> Vec<(SkipReason, usize)> {
        [
            (SkipReason::AlreadyExists, self.already_exists),
            (SkipReason::EmptyCity, self.empty_city),
            (SkipReason::MissingExternalId, self.missing_external_id),
            (SkipReason::EmptyName, self.empty_name),
            (SkipReason::EmptyAddress, self.empty_address),
            (SkipReason::EmptyState, self.empty_state),
        ]
        .into_iter()
        .filter(|(_, n)| *n > 0)
        .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RecordOutcome {
    Inserted { listing_id: i64 },
    Skipped(SkipReason),
    Errored(String),
}

/// One line of the dry-run preview
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewRow {
    pub name: String,
    pub city: String,
    /// Resolved code, or the raw designation when it does not resolve
    pub state: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportReport {
    pub batch_id: String,
    pub dry_run: bool,
    pub stats: ImportStats,
    pub skip_reasons: SkipReasons,
    /// (candidate name, outcome) in processing order; empty for dry runs
    pub outcomes: Vec<(String, RecordOutcome)>,
    pub preview: Vec<PreviewRow>,
}

impl ImportReport {
    pub fn has_errors(&self) -> bool {
        self.stats.errors > 0
    }

    /// Eligible records beyond the preview
    pub fn preview_remainder(&self) -> usize {
        self.stats.eligible.saturating_sub(self.preview.len())
    }

    pub fn summary(&self) -> String {
        format!(
            "Batch {}{}: {} total, {} eligible, {} inserted, {} skipped, {} errors",
            self.batch_id,
            if self.dry_run { " (dry run)" } else { "" },
            self.stats.total,
            self.stats.eligible,
            self.stats.inserted,
            self.stats.skipped,
            self.stats.errors
        )
    }
}

// ============================================================================
// IMPORTER
// ============================================================================

pub struct CanonicalImporter<'a> {
    store: &'a Store,
    options: ImportOptions,
}

impl<'a> CanonicalImporter<'a> {
    /// Fails with a configuration error before touching any record
    pub fn new(store: &'a Store, options: ImportOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self { store, options })
    }

    /// Confidence filter (order preserved), then limit
    pub fn select_eligible<'c>(&self, candidates: &'c [CandidateRecord]) -> Vec<&'c CandidateRecord> {
        let threshold = self.options.confidence_threshold;
        let meets = candidates.iter().filter(|c| c.confidence() >= threshold);

        match self.options.limit {
            Some(limit) if limit > 0 => meets.take(limit).collect(),
            _ => meets.collect(),
        }
    }

    pub fn run(&self, candidates: &[CandidateRecord]) -> ImportReport {
        let eligible = self.select_eligible(candidates);

        let mut report = ImportReport {
            batch_id: self.options.batch_id.clone(),
            dry_run: self.options.dry_run,
            stats: ImportStats {
                total: candidates.len(),
                eligible: eligible.len(),
                ..Default::default()
            },
            skip_reasons: SkipReasons::default(),
            outcomes: Vec::new(),
            preview: Vec::new(),
        };

        tracing::info!(
            batch_id = %self.options.batch_id,
            total = report.stats.total,
            eligible = report.stats.eligible,
            threshold = self.options.confidence_threshold,
            dry_run = self.options.dry_run,
            "starting import"
        );

        if self.options.dry_run {
            report.preview = eligible.iter().take(PREVIEW_LIMIT).map(|c| preview_row(c)).collect();
            return report;
        }

        for candidate in eligible {
            let name = candidate.display_name().to_string();

            let outcome = match self.import_one(candidate) {
                Ok(listing_id) => {
                    tracing::info!(listing_id, name = %name, "INSERT");
                    report.stats.inserted += 1;
                    RecordOutcome::Inserted { listing_id }
                }
                Err(e) => match e.skip_reason() {
                    Some(reason) => {
                        tracing::info!(name = %name, reason = %reason, "SKIP");
                        report.stats.skipped += 1;
                        report.skip_reasons.record(reason);
                        RecordOutcome::Skipped(reason)
                    }
                    None => {
                        let message = e.detailed_message();
                        tracing::error!(
                            name = %name,
                            city = candidate.city.as_deref().unwrap_or("no city"),
                            state = candidate.state.as_deref().unwrap_or("no state"),
                            external_id = candidate.external_id().unwrap_or(""),
                            error = %message,
                            "ERROR"
                        );
                        report.stats.errors += 1;
                        RecordOutcome::Errored(message)
                    }
                },
            };

            report.outcomes.push((name, outcome));
        }

        if report.stats.inserted > 0 {
            log_ingestion(
                self.store,
                self.options.source,
                IngestionAction::Import,
                &format!(
                    "Batch {}: imported {} repair companies",
                    self.options.batch_id, report.stats.inserted
                ),
                report.stats.inserted as i64,
            );
        }

        report
    }

    fn import_one(&self, candidate: &CandidateRecord) -> Result<i64> {
        candidate.validate().map_err(IngestError::Validation)?;

        // validate() guarantees these are present
        let external_id = candidate.external_id().unwrap_or_default();
        let name = non_blank(&candidate.name).unwrap_or_default();
        let address = non_blank(&candidate.address).unwrap_or_default();
        let designation = non_blank(&candidate.state).unwrap_or_default();

        if self.store.listing_exists_by_external_id(external_id)? {
            return Err(IngestError::Duplicate {
                external_id: external_id.to_string(),
            });
        }

        let code = resolve_state_code(designation)
            .ok_or_else(|| IngestError::Resolution(format!("Unknown state: {}", designation)))?;
        let slug = state_slug_for_code(code)
            .ok_or_else(|| IngestError::Resolution(format!("Unknown state code: {}", code)))?;
        let state = self
            .store
            .get_state_by_slug(&slug)?
            .ok_or_else(|| IngestError::Resolution(format!("State not found: {}", slug)))?;

        let city_name = non_blank(&candidate.city).ok_or(IngestError::Validation(SkipReason::EmptyCity))?;
        let city = ensure_city(self.store, state.id, code, city_name, candidate.lat, candidate.lng)?;

        let raw_city = candidate.city.as_deref().unwrap_or_default();
        let listing = NewListing {
            name: name.to_string(),
            slug: slugify(&format!("{}-{}", name, raw_city)),
            address: Some(address.to_string()),
            city_id: Some(city.id),
            state_id: Some(state.id),
            zip: extract_zip_from_address(address),
            phone: non_blank(&candidate.phone).map(str::to_string),
            website: non_blank(&candidate.website).map(str::to_string),
            description: None,
            services: candidate.services(),
            rating: None,
            review_count: None,
            lat: candidate.lat,
            lng: candidate.lng,
            // Batch data is pre-vetted; other ingestion paths start unapproved
            is_approved: true,
            external_id: Some(external_id.to_string()),
            source: Some(self.options.source.as_str().to_string()),
            batch_id: Some(self.options.batch_id.clone()),
        };

        import_repair_company(self.store, &listing)
    }
}

fn preview_row(candidate: &CandidateRecord) -> PreviewRow {
    let raw_state = candidate.state.clone().unwrap_or_default();
    PreviewRow {
        name: candidate.display_name().to_string(),
        city: candidate.city.clone().unwrap_or_default(),
        state: resolve_state_code(&raw_state)
            .map(str::to_string)
            .unwrap_or(raw_state),
        confidence: candidate.confidence(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::seeded_store;

    fn candidate(n: usize, confidence: f64) -> CandidateRecord {
        CandidateRecord {
            name: Some(format!("Repair Shop {}", n)),
            address: Some(format!("{} Main St, Raleigh, NC 27601", n)),
            city: Some("Raleigh".to_string()),
            state: Some("North Carolina".to_string()),
            lat: Some(35.78),
            lng: Some(-78.64),
            phone: Some("(919) 555-0100".to_string()),
            website: None,
            categories: Some(vec!["Appliance repair service".to_string(), " ".to_string()]),
            external_id: None,
            external_ids: Some(ExternalIds {
                google_place_id: Some(format!("place-{}", n)),
            }),
            confidence: Some(confidence),
        }
    }

    fn ten_candidates() -> Vec<CandidateRecord> {
        (0..10)
            .map(|n| candidate(n, if n % 3 == 1 { 0.5 } else { 0.9 }))
            .collect()
    }

    fn options(batch_id: &str) -> ImportOptions {
        ImportOptions {
            batch_id: batch_id.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_confidence_filter() {
        let store = seeded_store();
        let report = CanonicalImporter::new(&store, options("b1"))
            .unwrap()
            .run(&ten_candidates());

        assert_eq!(report.stats.total, 10);
        assert_eq!(report.stats.eligible, 7);
        assert_eq!(report.stats.inserted, 7);
        assert!(!report.has_errors());
        println!("✅ {}", report.summary());
    }

    #[test]
    fn test_limit_bounds_processing() {
        let store = seeded_store();
        let opts = ImportOptions {
            limit: Some(5),
            ..options("b1")
        };
        let report = CanonicalImporter::new(&store, opts).unwrap().run(&ten_candidates());

        let processed = report.stats.inserted + report.stats.skipped + report.stats.errors;
        assert!(processed <= 5);
        assert_eq!(report.stats.eligible, 5);
    }

    #[test]
    fn test_zero_limit_is_unbounded() {
        let store = seeded_store();
        let opts = ImportOptions {
            limit: Some(0),
            ..options("b1")
        };
        let importer = CanonicalImporter::new(&store, opts).unwrap();
        assert_eq!(importer.select_eligible(&ten_candidates()).len(), 7);
    }

    #[test]
    fn test_existing_external_id_is_skipped() {
        let store = seeded_store();
        let importer = CanonicalImporter::new(&store, options("b1")).unwrap();
        importer.run(&[candidate(1, 0.9)]);

        let again = CanonicalImporter::new(&store, options("b2"))
            .unwrap()
            .run(&[candidate(1, 0.9)]);

        assert_eq!(again.stats.inserted, 0);
        assert_eq!(again.stats.skipped, 1);
        assert_eq!(again.stats.errors, 0);
        assert_eq!(again.skip_reasons.already_exists, 1);
        assert_eq!(store.count_listings().unwrap(), 1);
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let store = seeded_store();
        let opts = ImportOptions {
            dry_run: true,
            ..options("b1")
        };
        let candidates: Vec<_> = (0..12).map(|n| candidate(n, 0.95)).collect();
        let report = CanonicalImporter::new(&store, opts).unwrap().run(&candidates);

        assert_eq!(store.count_listings().unwrap(), 0);
        assert_eq!(store.count_cities().unwrap(), 0);
        assert_eq!(report.preview.len(), PREVIEW_LIMIT);
        assert_eq!(report.preview_remainder(), 2);
        assert_eq!(report.preview[0].state, "NC");
    }

    #[test]
    fn test_unknown_state_is_an_error_not_a_skip() {
        let store = seeded_store();
        let mut bad = candidate(1, 0.9);
        bad.state = Some("Atlantis".to_string());

        let report = CanonicalImporter::new(&store, options("b1")).unwrap().run(&[bad, candidate(2, 0.9)]);

        assert_eq!(report.stats.errors, 1);
        assert_eq!(report.stats.inserted, 1);
        assert!(report.has_errors());
        assert!(matches!(report.outcomes[0].1, RecordOutcome::Errored(ref m) if m.contains("Atlantis")));
    }

    #[test]
    fn test_skip_reasons_are_typed() {
        let store = seeded_store();
        let mut no_id = candidate(1, 0.9);
        no_id.external_ids = None;
        let mut no_name = candidate(2, 0.9);
        no_name.name = Some("   ".to_string());
        let mut no_city = candidate(3, 0.9);
        no_city.city = None;

        let report = CanonicalImporter::new(&store, options("b1"))
            .unwrap()
            .run(&[no_id, no_name, no_city]);

        assert_eq!(report.stats.skipped, 3);
        assert_eq!(report.skip_reasons.missing_external_id, 1);
        assert_eq!(report.skip_reasons.empty_name, 1);
        assert_eq!(report.skip_reasons.empty_city, 1);
        assert!(!report.has_errors());
    }

    #[test]
    fn test_inserted_listing_shape() {
        let store = seeded_store();
        let report = CanonicalImporter::new(&store, options("atf-batch-0-1"))
            .unwrap()
            .run(&[candidate(7, 0.9)]);

        let id = match report.outcomes[0].1 {
            RecordOutcome::Inserted { listing_id } => listing_id,
            ref other => panic!("unexpected outcome {:?}", other),
        };
        let listing = store.get_listing(id).unwrap().unwrap();

        assert!(listing.is_approved);
        assert_eq!(listing.slug, "repair-shop-7-raleigh");
        assert_eq!(listing.zip.as_deref(), Some("27601"));
        assert_eq!(listing.services, Some(vec!["Appliance repair service".to_string()]));
        assert_eq!(listing.external_id.as_deref(), Some("place-7"));
        assert_eq!(listing.batch_id.as_deref(), Some("atf-batch-0-1"));
        assert_eq!(listing.source.as_deref(), Some("outscraper"));

        let log = store.recent_ingestion_log(1).unwrap();
        assert_eq!(log[0].action, "import");
        assert_eq!(log[0].records_affected, 1);
    }

    #[test]
    fn test_batches_are_auditable() {
        let store = seeded_store();
        CanonicalImporter::new(&store, options("b1"))
            .unwrap()
            .run(&[candidate(1, 0.9), candidate(2, 0.9)]);
        CanonicalImporter::new(&store, options("b2"))
            .unwrap()
            .run(&[candidate(3, 0.9)]);

        let b1 = store.list_listings_by_batch("b1").unwrap();
        assert_eq!(b1.len(), 2);
        assert!(b1.iter().all(|l| l.batch_id.as_deref() == Some("b1")));
        assert_eq!(store.list_listings_by_batch("b2").unwrap().len(), 1);
        assert!(store.list_listings_by_batch("b3").unwrap().is_empty());
    }

    #[test]
    fn test_top_level_external_id_wins() {
        let json = r#"[{"name":"A","external_id":"top","external_ids":{"google_place_id":"nested"},"confidence":0.9},
                       {"name":"B","external_ids":{"google_place_id":"nested"},"phone":null}]"#;
        let records: Vec<CandidateRecord> = serde_json::from_str(json).unwrap();

        assert_eq!(records[0].external_id(), Some("top"));
        assert_eq!(records[1].external_id(), Some("nested"));
        assert_eq!(records[1].confidence(), 0.0);
    }

    #[test]
    fn test_missing_batch_id_is_configuration_error() {
        let store = seeded_store();
        let err = CanonicalImporter::new(&store, ImportOptions::default()).err().unwrap();
        assert!(err.is_fatal());

        let opts = ImportOptions {
            confidence_threshold: 1.5,
            ..options("b1")
        };
        assert!(CanonicalImporter::new(&store, opts).is_err());
    }
}
