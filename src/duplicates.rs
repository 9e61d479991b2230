// 🔍 Duplicate Detector - read-only grouping of likely duplicate listings
//
// Three independent strategies, each a separate producer:
//   1. Name + city_id  (strong)  normalized business name within one city row
//   2. Phone           (strong)  normalized US phone
//   3. Exact name+city (soft)    raw lowercase name + city display name
//
// Nothing here merges anything. Output is counts plus an optional CSV export
// that reviewers turn into explicit merge directives.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::address::{normalize_business_name, normalize_phone};
use crate::db::Store;
use crate::entities::ListingSummary;
use crate::error::Result;

/// Groups printed per strategy in the console report
pub const CONSOLE_GROUP_LIMIT: usize = 5;

// ============================================================================
// MATCH STRATEGY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchStrategy {
    /// normalize_business_name(name) + city_id
    NameCity,

    /// normalize_phone(phone); listings without a usable phone are left out
    Phone,

    /// lowercase name + lowercase city display name, catches split city rows
    ExactNameCity,
}

impl MatchStrategy {
    pub const ALL: [MatchStrategy; 3] = [
        MatchStrategy::NameCity,
        MatchStrategy::Phone,
        MatchStrategy::ExactNameCity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStrategy::NameCity => "name_city",
            MatchStrategy::Phone => "phone",
            MatchStrategy::ExactNameCity => "exact_name_city",
        }
    }

    /// Strong signals are reliable enough to recommend a merge on
    pub fn is_strong(&self) -> bool {
        !matches!(self, MatchStrategy::ExactNameCity)
    }

    pub fn title(&self) -> &'static str {
        match self {
            MatchStrategy::NameCity => "NAME + CITY DUPLICATES (Strong Match)",
            MatchStrategy::Phone => "PHONE NUMBER DUPLICATES (Strong Match)",
            MatchStrategy::ExactNameCity => "SAME EXACT NAME + CITY NAME (Soft Match - Manual Review)",
        }
    }

    pub fn export_file_name(&self) -> &'static str {
        match self {
            MatchStrategy::NameCity => "name-city-duplicates.csv",
            MatchStrategy::Phone => "phone-duplicates.csv",
            MatchStrategy::ExactNameCity => "exact-name-city-duplicates.csv",
        }
    }
}

// ============================================================================
// DUPLICATE GROUP
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub strategy: MatchStrategy,
    pub key: String,

    /// For name+city groups, ordered by `keep_order` (first = recommended keep)
    pub listings: Vec<ListingSummary>,
}

impl DuplicateGroup {
    pub fn listing_ids(&self) -> Vec<i64> {
        self.listings.iter().map(|l| l.id).collect()
    }

    /// Advisory only, and only for the name+city strategy
    pub fn recommended_keep(&self) -> Option<&ListingSummary> {
        match self.strategy {
            MatchStrategy::NameCity => self.listings.first(),
            _ => None,
        }
    }
}

/// Approved first, then with external id, then oldest, then lowest id
pub fn keep_order(a: &ListingSummary, b: &ListingSummary) -> Ordering {
    b.is_approved
        .cmp(&a.is_approved)
        .then_with(|| b.external_id.is_some().cmp(&a.external_id.is_some()))
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// Bucket listings by key, keeping first-seen order; only buckets of 2+ survive
fn collect_groups<F>(strategy: MatchStrategy, listings: &[ListingSummary], key_of: F) -> Vec<DuplicateGroup>
where
    F: Fn(&ListingSummary) -> Option<String>,
{
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut buckets: Vec<DuplicateGroup> = Vec::new();

    for listing in listings {
        let Some(key) = key_of(listing) else {
            continue;
        };

        let slot = *index.entry(key.clone()).or_insert_with(|| {
            buckets.push(DuplicateGroup {
                strategy,
                key,
                listings: Vec::new(),
            });
            buckets.len() - 1
        });
        buckets[slot].listings.push(listing.clone());
    }

    buckets.retain(|g| g.listings.len() > 1);
    buckets
}

// ============================================================================
// STRATEGIES
// ============================================================================

/// Strategy 1: normalized name within the same city row.
/// Generic names that normalize to "" still group, keyed as "|<city_id>".
pub fn group_by_name_city(listings: &[ListingSummary]) -> Vec<DuplicateGroup> {
    let mut groups = collect_groups(MatchStrategy::NameCity, listings, |l| {
        let city_id = l.city_id?;
        Some(format!("{}|{}", normalize_business_name(&l.name), city_id))
    });

    for group in &mut groups {
        group.listings.sort_by(keep_order);
    }
    groups
}

/// Strategy 2: same normalized phone
pub fn group_by_phone(listings: &[ListingSummary]) -> Vec<DuplicateGroup> {
    collect_groups(MatchStrategy::Phone, listings, |l| {
        l.phone.as_deref().and_then(normalize_phone)
    })
}

/// Strategy 3: same raw name and city display name, regardless of city_id
pub fn group_by_exact_name_city(listings: &[ListingSummary]) -> Vec<DuplicateGroup> {
    collect_groups(MatchStrategy::ExactNameCity, listings, |l| {
        Some(format!(
            "{}|{}",
            l.name.trim().to_lowercase(),
            l.city_name.trim().to_lowercase()
        ))
    })
}

// ============================================================================
// REPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateReport {
    pub total_listings: usize,
    pub name_city: Vec<DuplicateGroup>,
    pub phone: Vec<DuplicateGroup>,
    pub exact_name_city: Vec<DuplicateGroup>,
}

impl DuplicateReport {
    pub fn build(listings: &[ListingSummary]) -> Self {
        Self {
            total_listings: listings.len(),
            name_city: group_by_name_city(listings),
            phone: group_by_phone(listings),
            exact_name_city: group_by_exact_name_city(listings),
        }
    }

    pub fn groups(&self, strategy: MatchStrategy) -> &[DuplicateGroup] {
        match strategy {
            MatchStrategy::NameCity => &self.name_city,
            MatchStrategy::Phone => &self.phone,
            MatchStrategy::ExactNameCity => &self.exact_name_city,
        }
    }

    /// Listings that sit in some name+city group
    pub fn name_city_listing_count(&self) -> usize {
        self.name_city.iter().map(|g| g.listings.len()).sum()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} listings: {} name+city groups ({} listings), {} phone groups, {} exact name+city groups",
            self.total_listings,
            self.name_city.len(),
            self.name_city_listing_count(),
            self.phone.len(),
            self.exact_name_city.len()
        )
    }

    /// Write one CSV per strategy into `dir` (created if missing).
    /// Every file gets its header line, even when the strategy found nothing.
    pub fn export_csv(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)?;
        let mut written = Vec::new();

        let path = dir.join(MatchStrategy::NameCity.export_file_name());
        let mut wtr = csv_writer(&path, &NAME_CITY_HEADER)?;
        for (idx, group) in self.name_city.iter().enumerate() {
            for (pos, l) in group.listings.iter().enumerate() {
                wtr.serialize(NameCityRow {
                    group_id: idx + 1,
                    normalized_key: &group.key,
                    listing_id: l.id,
                    name: &l.name,
                    address: l.address.as_deref().unwrap_or(""),
                    city: &l.city_name,
                    state: &l.state_name,
                    approved: yes_no(l.is_approved),
                    external_id: l.external_id.as_deref().unwrap_or(""),
                    recommended_keep: yes_no(pos == 0),
                })?;
            }
        }
        wtr.flush()?;
        written.push(path);

        let path = dir.join(MatchStrategy::Phone.export_file_name());
        let mut wtr = csv_writer(&path, &PHONE_HEADER)?;
        for (idx, group) in self.phone.iter().enumerate() {
            for l in &group.listings {
                wtr.serialize(PhoneRow {
                    group_id: idx + 1,
                    phone: &group.key,
                    listing_id: l.id,
                    name: &l.name,
                    address: l.address.as_deref().unwrap_or(""),
                    city: &l.city_name,
                    state: &l.state_name,
                })?;
            }
        }
        wtr.flush()?;
        written.push(path);

        let path = dir.join(MatchStrategy::ExactNameCity.export_file_name());
        let mut wtr = csv_writer(&path, &EXACT_NAME_CITY_HEADER)?;
        for (idx, group) in self.exact_name_city.iter().enumerate() {
            for l in &group.listings {
                wtr.serialize(ExactNameCityRow {
                    group_id: idx + 1,
                    name: &l.name,
                    city: &l.city_name,
                    listing_id: l.id,
                    address: l.address.as_deref().unwrap_or(""),
                    approved: yes_no(l.is_approved),
                })?;
            }
        }
        wtr.flush()?;
        written.push(path);

        Ok(written)
    }
}

// Column order must match the field order of the row structs below
const NAME_CITY_HEADER: [&str; 10] = [
    "group_id",
    "normalized_key",
    "listing_id",
    "name",
    "address",
    "city",
    "state",
    "approved",
    "external_id",
    "recommended_keep",
];
const PHONE_HEADER: [&str; 7] = [
    "group_id", "phone", "listing_id", "name", "address", "city", "state",
];
const EXACT_NAME_CITY_HEADER: [&str; 6] = [
    "group_id", "name", "city", "listing_id", "address", "approved",
];

/// Writer with the header already written; rows are serialized without one
fn csv_writer(path: &Path, header: &[&str]) -> Result<csv::Writer<std::fs::File>> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    wtr.write_record(header)?;
    Ok(wtr)
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "Yes"
    } else {
        "No"
    }
}

#[derive(Serialize)]
struct NameCityRow<'a> {
    group_id: usize,
    normalized_key: &'a str,
    listing_id: i64,
    name: &'a str,
    address: &'a str,
    city: &'a str,
    state: &'a str,
    approved: &'a str,
    external_id: &'a str,
    recommended_keep: &'a str,
}

#[derive(Serialize)]
struct PhoneRow<'a> {
    group_id: usize,
    phone: &'a str,
    listing_id: i64,
    name: &'a str,
    address: &'a str,
    city: &'a str,
    state: &'a str,
}

#[derive(Serialize)]
struct ExactNameCityRow<'a> {
    group_id: usize,
    name: &'a str,
    city: &'a str,
    listing_id: i64,
    address: &'a str,
    approved: &'a str,
}

/// Load every listing (paginated) and group it
pub fn detect_duplicates(store: &Store) -> Result<DuplicateReport> {
    let listings = store.all_listing_summaries()?;
    tracing::info!(listings = listings.len(), "loaded listings for duplicate detection");

    let report = DuplicateReport::build(&listings);
    tracing::info!(
        name_city = report.name_city.len(),
        phone = report.phone.len(),
        exact_name_city = report.exact_name_city.len(),
        "duplicate detection complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::ensure_city;
    use crate::test_support::{insert, new_listing, seeded_store, state_id};
    use chrono::{Duration, Utc};

    fn summary(id: i64, name: &str, city_id: Option<i64>, city_name: &str) -> ListingSummary {
        ListingSummary {
            id,
            name: name.to_string(),
            address: None,
            phone: None,
            city_id,
            city_name: city_name.to_string(),
            state_name: "Illinois".to_string(),
            external_id: None,
            is_approved: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_name_city_and_soft_groups_from_store() {
        let store = seeded_store();
        let il = state_id(&store, "illinois");
        let mo = state_id(&store, "missouri");
        let springfield_il = ensure_city(&store, il, "IL", "Springfield", None, None).unwrap();
        let springfield_mo = ensure_city(&store, mo, "MO", "Springfield", None, None).unwrap();

        let a = insert(&store, &new_listing("ABC Appliance Repair LLC", Some(springfield_il.id), Some(il)));
        let b = insert(&store, &new_listing("Abc Appliance", Some(springfield_il.id), Some(il)));
        let c = insert(&store, &new_listing("ABC Appliance Repair LLC", Some(springfield_mo.id), Some(mo)));

        let report = detect_duplicates(&store).unwrap();

        assert_eq!(report.name_city.len(), 1);
        assert_eq!(report.name_city[0].listing_ids(), vec![a, b]);
        assert!(!report.name_city[0].listing_ids().contains(&c));

        assert_eq!(report.exact_name_city.len(), 1);
        assert_eq!(report.exact_name_city[0].listing_ids(), vec![a, c]);
        println!("✅ {}", report.summary());
    }

    #[test]
    fn test_keep_order() {
        let now = Utc::now();
        let mut unapproved = summary(1, "Fixit", Some(1), "Peoria");
        unapproved.is_approved = false;
        let mut newer = summary(2, "Fixit", Some(1), "Peoria");
        newer.created_at = now;
        let mut older = summary(3, "Fixit", Some(1), "Peoria");
        older.created_at = now - Duration::days(3);
        let mut with_place = summary(4, "Fixit", Some(1), "Peoria");
        with_place.created_at = now;
        with_place.external_id = Some("place".to_string());

        let groups = group_by_name_city(&[unapproved, newer, older, with_place]);

        assert_eq!(groups[0].listing_ids(), vec![4, 3, 2, 1]);
        assert_eq!(groups[0].recommended_keep().map(|l| l.id), Some(4));
    }

    #[test]
    fn test_phone_groups_skip_unusable_numbers() {
        let mut a = summary(1, "One", Some(1), "Peoria");
        a.phone = Some("(555) 123-4567".to_string());
        let mut b = summary(2, "Two", Some(2), "Austin");
        b.phone = Some("15551234567".to_string());
        let mut c = summary(3, "Three", Some(3), "Boise");
        c.phone = Some("+44 20 7946 0958".to_string());
        let mut d = summary(4, "Four", Some(3), "Boise");
        d.phone = Some("n/a".to_string());

        let groups = group_by_phone(&[a, b, c, d]);

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].key, "+15551234567");
        assert_eq!(groups[0].listing_ids(), vec![1, 2]);
        assert!(groups[0].recommended_keep().is_none());
        assert!(MatchStrategy::Phone.is_strong());
        assert!(!MatchStrategy::ExactNameCity.is_strong());
    }

    #[test]
    fn test_generic_names_group_within_city() {
        assert_eq!(normalize_business_name("Appliance Repair Service"), "");
        assert_eq!(normalize_business_name("The Appliance Repair Co."), "");

        let groups = group_by_name_city(&[
            summary(1, "Appliance Repair Service", Some(1), "Peoria"),
            summary(2, "The Appliance Repair Co.", Some(1), "Peoria"),
            summary(3, "Appliance Repair Service", Some(2), "Austin"),
        ]);

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].key, "|1");
        assert_eq!(groups[0].listing_ids(), vec![1, 2]);
    }

    #[test]
    fn test_export_writes_three_files() {
        let listings = vec![
            summary(1, "ABC Appliance Repair LLC", Some(1), "Springfield"),
            summary(2, "Abc Appliance", Some(1), "Springfield"),
        ];
        let report = DuplicateReport::build(&listings);
        let dir = tempfile::tempdir().unwrap();

        let written = report.export_csv(dir.path()).unwrap();
        assert_eq!(written.len(), 3);

        let body = std::fs::read_to_string(dir.path().join("name-city-duplicates.csv")).unwrap();
        let mut lines = body.lines();
        assert_eq!(
            lines.next(),
            Some("group_id,normalized_key,listing_id,name,address,city,state,approved,external_id,recommended_keep")
        );
        assert_eq!(body.lines().count(), 3);
        assert!(body.lines().nth(1).unwrap().ends_with(",Yes"));

        let phone = std::fs::read_to_string(dir.path().join("phone-duplicates.csv")).unwrap();
        assert_eq!(phone, "group_id,phone,listing_id,name,address,city,state\n");
    }

    #[test]
    fn test_empty_report_exports_headers_only() {
        let report = DuplicateReport::build(&[]);
        let dir = tempfile::tempdir().unwrap();

        for path in report.export_csv(dir.path()).unwrap() {
            let body = std::fs::read_to_string(&path).unwrap();
            assert_eq!(body.lines().count(), 1, "{}", path.display());
            assert!(body.starts_with("group_id,"));
        }
    }
}
