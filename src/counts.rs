// 🧮 Counts Recomputer - rebuild derived City/State aggregates
//
// Recorded counts are compared against what the listings table says:
//   city.store_count  = approved listings with that city_id
//   state.store_count = approved listings with that state_id
//   state.city_count  = cities of that state whose recomputed store_count > 0
// Only differing values are written, each one logged.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::db::Store;
use crate::error::Result;

// ============================================================================
// CORRECTIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CountField {
    CityStoreCount,
    StateStoreCount,
    StateCityCount,
}

impl CountField {
    pub fn as_str(&self) -> &'static str {
        match self {
            CountField::CityStoreCount => "city.store_count",
            CountField::StateStoreCount => "state.store_count",
            CountField::StateCityCount => "state.city_count",
        }
    }
}

/// A recorded aggregate that disagrees with the listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountCorrection {
    pub field: CountField,
    pub entity_id: i64,
    pub entity_name: String,
    pub recorded: i64,
    pub actual: i64,
}

impl CountCorrection {
    pub fn describe(&self) -> String {
        format!(
            "[{}] {} {}: {} -> {}",
            self.entity_id,
            self.entity_name,
            self.field.as_str(),
            self.recorded,
            self.actual
        )
    }
}

/// Every correction the current data calls for. Read-only.
///
/// State city_count is derived from the recomputed city counts, so a dry run
/// reports exactly what a live run writes.
pub fn plan_corrections(store: &Store) -> Result<Vec<CountCorrection>> {
    let mut corrections = Vec::new();

    let by_city = store.approved_counts_by_city()?;
    let mut active_cities: HashMap<i64, i64> = HashMap::new();

    for city in store.list_cities()? {
        let actual = by_city.get(&city.id).copied().unwrap_or(0);
        if actual > 0 {
            *active_cities.entry(city.state_id).or_insert(0) += 1;
        }
        if actual != city.store_count {
            corrections.push(CountCorrection {
                field: CountField::CityStoreCount,
                entity_id: city.id,
                entity_name: city.name,
                recorded: city.store_count,
                actual,
            });
        }
    }

    let by_state = store.approved_counts_by_state()?;

    for state in store.list_states()? {
        let stores = by_state.get(&state.id).copied().unwrap_or(0);
        if stores != state.store_count {
            corrections.push(CountCorrection {
                field: CountField::StateStoreCount,
                entity_id: state.id,
                entity_name: state.name.clone(),
                recorded: state.store_count,
                actual: stores,
            });
        }

        let cities = active_cities.get(&state.id).copied().unwrap_or(0);
        if cities != state.city_count {
            corrections.push(CountCorrection {
                field: CountField::StateCityCount,
                entity_id: state.id,
                entity_name: state.name,
                recorded: state.city_count,
                actual: cities,
            });
        }
    }

    Ok(corrections)
}

// ============================================================================
// REPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountsReport {
    pub dry_run: bool,
    pub corrections: Vec<CountCorrection>,
    /// Corrections whose write failed (live runs only)
    pub errors: usize,
}

impl CountsReport {
    pub fn count_of(&self, field: CountField) -> usize {
        self.corrections.iter().filter(|c| c.field == field).count()
    }

    pub fn is_clean(&self) -> bool {
        self.corrections.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "City store_count updates: {}, State store_count updates: {}, State city_count updates: {}",
            self.count_of(CountField::CityStoreCount),
            self.count_of(CountField::StateStoreCount),
            self.count_of(CountField::StateCityCount)
        )
    }
}

// ============================================================================
// RECOMPUTE
// ============================================================================

pub fn recompute_counts(store: &Store, dry_run: bool) -> Result<CountsReport> {
    let corrections = plan_corrections(store)?;
    let mut errors = 0;

    for correction in &corrections {
        tracing::info!(
            field = correction.field.as_str(),
            id = correction.entity_id,
            name = %correction.entity_name,
            recorded = correction.recorded,
            actual = correction.actual,
            dry_run,
            "count correction"
        );

        if dry_run {
            continue;
        }

        let written = match correction.field {
            CountField::CityStoreCount => {
                store.update_city_store_count(correction.entity_id, correction.actual)
            }
            CountField::StateStoreCount => {
                store.update_state_store_count(correction.entity_id, correction.actual)
            }
            CountField::StateCityCount => {
                store.update_state_city_count(correction.entity_id, correction.actual)
            }
        };

        if let Err(e) = written {
            tracing::error!(
                field = correction.field.as_str(),
                id = correction.entity_id,
                error = %e.detailed_message(),
                "count update failed"
            );
            errors += 1;
        }
    }

    Ok(CountsReport {
        dry_run,
        corrections,
        errors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::ensure_city;
    use crate::test_support::{insert, new_listing, seeded_store, state_id};

    #[test]
    fn test_three_approved_listings_fix_one_city() {
        let store = seeded_store();
        let il = state_id(&store, "illinois");
        let city = ensure_city(&store, il, "IL", "Springfield", None, None).unwrap();
        for n in 0..3 {
            insert(&store, &new_listing(&format!("Shop {}", n), Some(city.id), Some(il)));
        }

        let report = recompute_counts(&store, false).unwrap();

        assert_eq!(report.count_of(CountField::CityStoreCount), 1);
        assert_eq!(store.get_city(city.id).unwrap().unwrap().store_count, 3);

        let state = store.get_state(il).unwrap().unwrap();
        assert_eq!(state.store_count, 3);
        assert_eq!(state.city_count, 1);
        println!("✅ {}", report.summary());
    }

    #[test]
    fn test_unapproved_listings_are_not_counted() {
        let store = seeded_store();
        let il = state_id(&store, "illinois");
        let city = ensure_city(&store, il, "IL", "Peoria", None, None).unwrap();
        let mut pending = new_listing("Pending", Some(city.id), Some(il));
        pending.is_approved = false;
        insert(&store, &pending);

        let report = recompute_counts(&store, false).unwrap();

        assert!(report.is_clean());
    }

    #[test]
    fn test_dry_run_reports_without_writing() {
        let store = seeded_store();
        let il = state_id(&store, "illinois");
        let city = ensure_city(&store, il, "IL", "Peoria", None, None).unwrap();
        insert(&store, &new_listing("Shop", Some(city.id), Some(il)));

        let dry = recompute_counts(&store, true).unwrap();
        assert_eq!(dry.corrections.len(), 3);
        assert_eq!(store.get_city(city.id).unwrap().unwrap().store_count, 0);

        let live = recompute_counts(&store, false).unwrap();
        assert_eq!(live.corrections, dry.corrections);

        let again = recompute_counts(&store, false).unwrap();
        assert!(again.is_clean());
    }
}
