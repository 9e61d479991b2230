// Shared fixtures for in-crate tests

use crate::db::Store;
use crate::entities::NewListing;

/// In-memory store with the states table seeded
pub(crate) fn seeded_store() -> Store {
    let store = Store::open_in_memory().unwrap();
    store.seed_states().unwrap();
    store
}

pub(crate) fn state_id(store: &Store, slug: &str) -> i64 {
    store.get_state_by_slug(slug).unwrap().unwrap().id
}

/// Approved listing with only the required fields set
pub(crate) fn new_listing(name: &str, city_id: Option<i64>, state_id: Option<i64>) -> NewListing {
    NewListing {
        name: name.to_string(),
        slug: crate::address::slugify(name),
        address: Some("1 Main St".to_string()),
        city_id,
        state_id,
        is_approved: true,
        ..Default::default()
    }
}

/// Insert a listing through the boundary and return its id
pub(crate) fn insert(store: &Store, listing: &NewListing) -> i64 {
    crate::ingestion::import_repair_company(store, listing).unwrap()
}
