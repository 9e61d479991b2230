// 🩺 Integrity Checker - read-only verification of the directory tables
//
// Checks:
//   1. Listings whose city_id references no city       (error)
//   2. Cities whose state_id references no state       (error)
//   3. City store_count mismatches                     (warning)
//   4. State store_count / city_count mismatches       (warning)
//   5. Listings missing required fields                (error or warning per field)
// Nothing is corrected here; count drift is fixed by the counts recompute.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::counts::{plan_corrections, CountField};
use crate::db::Store;
use crate::error::Result;

/// Sample ids kept per finding
pub const SAMPLE_LIMIT: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    /// Broken data: fails the check run
    Error,
    /// Worth a look, does not fail the run
    Warning,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
        }
    }
}

// ============================================================================
// REQUIRED FIELDS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequiredField {
    Name,
    CityId,
    StateId,
    Slug,
    Address,
    Phone,
}

impl RequiredField {
    pub const ALL: [RequiredField; 6] = [
        RequiredField::Name,
        RequiredField::CityId,
        RequiredField::StateId,
        RequiredField::Slug,
        RequiredField::Address,
        RequiredField::Phone,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequiredField::Name => "name",
            RequiredField::CityId => "city_id",
            RequiredField::StateId => "state_id",
            RequiredField::Slug => "slug",
            RequiredField::Address => "address",
            RequiredField::Phone => "phone",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            RequiredField::Address | RequiredField::Phone => Severity::Warning,
            _ => Severity::Error,
        }
    }

    fn missing_predicate(&self) -> &'static str {
        match self {
            RequiredField::Name => "name IS NULL OR TRIM(name) = ''",
            RequiredField::CityId => "city_id IS NULL",
            RequiredField::StateId => "state_id IS NULL",
            RequiredField::Slug => "slug IS NULL OR TRIM(slug) = ''",
            RequiredField::Address => "address IS NULL OR TRIM(address) = ''",
            RequiredField::Phone => "phone IS NULL OR TRIM(phone) = ''",
        }
    }
}

// ============================================================================
// REPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrityIssue {
    pub check: String,
    pub severity: Severity,
    pub message: String,
    pub count: usize,
    /// At most SAMPLE_LIMIT ids
    pub sample_ids: Vec<i64>,
    /// Extra human-readable lines (e.g. recorded vs actual counts)
    pub details: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub issues: Vec<IntegrityIssue>,
}

impl IntegrityReport {
    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Error)
    }

    pub fn error_count(&self) -> usize {
        self.issues.iter().filter(|i| i.severity == Severity::Error).count()
    }

    pub fn warning_count(&self) -> usize {
        self.issues.iter().filter(|i| i.severity == Severity::Warning).count()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} issues ({} errors, {} warnings)",
            self.issues.len(),
            self.error_count(),
            self.warning_count()
        )
    }

    pub fn find(&self, check: &str) -> Option<&IntegrityIssue> {
        self.issues.iter().find(|i| i.check == check)
    }
}

// ============================================================================
// CHECKER
// ============================================================================

pub fn check_integrity(store: &Store) -> Result<IntegrityReport> {
    let mut report = IntegrityReport::default();

    // 1. Orphaned listings
    let orphans = store.orphaned_listing_ids()?;
    tracing::info!(count = orphans.len(), "check: orphaned listings");
    if !orphans.is_empty() {
        report.issues.push(IntegrityIssue {
            check: "orphaned_listings".to_string(),
            severity: Severity::Error,
            message: format!("{} listings have city_id not in cities table", orphans.len()),
            count: orphans.len(),
            sample_ids: orphans.iter().take(SAMPLE_LIMIT).copied().collect(),
            details: Vec::new(),
        });
    }

    // 2. Orphaned cities
    let cities = store.orphaned_cities()?;
    tracing::info!(count = cities.len(), "check: orphaned cities");
    if !cities.is_empty() {
        report.issues.push(IntegrityIssue {
            check: "orphaned_cities".to_string(),
            severity: Severity::Error,
            message: format!("{} cities have state_id not in states table", cities.len()),
            count: cities.len(),
            sample_ids: cities.iter().take(SAMPLE_LIMIT).map(|c| c.id).collect(),
            details: cities
                .iter()
                .take(5)
                .map(|c| format!("[{}] {} (state_id={})", c.id, c.name, c.state_id))
                .collect(),
        });
    }

    // 3 + 4. Aggregate drift
    let corrections = plan_corrections(store)?;
    let (city_drift, state_drift): (Vec<_>, Vec<_>) = corrections
        .iter()
        .partition(|c| c.field == CountField::CityStoreCount);
    tracing::info!(
        cities = city_drift.len(),
        states = state_drift.len(),
        "check: count accuracy"
    );

    if !city_drift.is_empty() {
        report.issues.push(IntegrityIssue {
            check: "city_store_count_mismatch".to_string(),
            severity: Severity::Warning,
            message: format!("{} cities have incorrect store_count", city_drift.len()),
            count: city_drift.len(),
            sample_ids: city_drift.iter().take(SAMPLE_LIMIT).map(|c| c.entity_id).collect(),
            details: city_drift.iter().take(5).map(|c| c.describe()).collect(),
        });
    }

    if !state_drift.is_empty() {
        let ids: BTreeSet<i64> = state_drift.iter().map(|c| c.entity_id).collect();
        report.issues.push(IntegrityIssue {
            check: "state_count_mismatch".to_string(),
            severity: Severity::Warning,
            message: format!("{} state count mismatches", state_drift.len()),
            count: state_drift.len(),
            sample_ids: ids.into_iter().take(SAMPLE_LIMIT).collect(),
            details: state_drift.iter().take(10).map(|c| c.describe()).collect(),
        });
    }

    // 5. Missing required fields
    for field in RequiredField::ALL {
        let (count, sample_ids) = store.listings_where(field.missing_predicate(), SAMPLE_LIMIT)?;
        if count == 0 {
            continue;
        }

        tracing::info!(field = field.as_str(), count, "check: missing field");
        report.issues.push(IntegrityIssue {
            check: format!("missing_{}", field.as_str()),
            severity: field.severity(),
            message: format!("{} listings missing {}", count, field.as_str()),
            count: count as usize,
            sample_ids,
            details: Vec::new(),
        });
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counts::recompute_counts;
    use crate::ingestion::ensure_city;
    use crate::test_support::{insert, new_listing, seeded_store, state_id};

    #[test]
    fn test_orphaned_listing_is_an_error() {
        let store = seeded_store();
        let il = state_id(&store, "illinois");
        let id = insert(&store, &new_listing("Ghost Town Repair", Some(999), Some(il)));

        let report = check_integrity(&store).unwrap();

        let orphan = report.find("orphaned_listings").unwrap();
        assert_eq!(orphan.severity, Severity::Error);
        assert_eq!(orphan.sample_ids, vec![id]);
        assert!(report.has_errors());
    }

    #[test]
    fn test_orphaned_city_is_an_error() {
        let store = seeded_store();
        ensure_city(&store, 4242, "ZZ", "Nowhere", None, None).unwrap();

        let report = check_integrity(&store).unwrap();

        assert_eq!(report.find("orphaned_cities").unwrap().severity, Severity::Error);
    }

    #[test]
    fn test_missing_fields_by_severity() {
        let store = seeded_store();
        let il = state_id(&store, "illinois");
        let city = ensure_city(&store, il, "IL", "Peoria", None, None).unwrap();
        let mut no_phone = new_listing("Has No Phone", Some(city.id), Some(il));
        no_phone.phone = None;
        insert(&store, &no_phone);
        recompute_counts(&store, false).unwrap();

        let report = check_integrity(&store).unwrap();
        assert_eq!(report.find("missing_phone").unwrap().severity, Severity::Warning);
        assert!(!report.has_errors());

        let mut no_city = new_listing("Has No City", None, Some(il));
        no_city.phone = Some("555-0100".to_string());
        insert(&store, &no_city);

        let report = check_integrity(&store).unwrap();
        assert_eq!(report.find("missing_city_id").unwrap().severity, Severity::Error);
        assert!(report.has_errors());
    }

    #[test]
    fn test_count_drift_is_a_warning() {
        let store = seeded_store();
        let il = state_id(&store, "illinois");
        let city = ensure_city(&store, il, "IL", "Peoria", None, None).unwrap();
        let mut listing = new_listing("Shop", Some(city.id), Some(il));
        listing.phone = Some("555-0100".to_string());
        insert(&store, &listing);

        let report = check_integrity(&store).unwrap();
        assert_eq!(
            report.find("city_store_count_mismatch").unwrap().severity,
            Severity::Warning
        );
        assert_eq!(report.find("state_count_mismatch").unwrap().sample_ids, vec![il]);
        assert!(!report.has_errors());

        recompute_counts(&store, false).unwrap();
        let clean = check_integrity(&store).unwrap();
        assert!(clean.issues.is_empty());
        println!("✅ {}", clean.summary());
    }
}
