// 🏙️ City Entity

use serde::{Deserialize, Serialize};

/// A city within a state.
///
/// Identity is (state_id, name) compared case-insensitively; the store holds
/// a unique index on exactly that pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct City {
    pub id: i64,

    /// Deterministic from name (see `address::slugify`)
    pub slug: String,

    pub name: String,
    pub state_id: i64,

    /// Lowercase 2-letter code
    pub state_code: String,

    pub lat: Option<f64>,
    pub lng: Option<f64>,

    /// Approved listings with this city_id
    pub store_count: i64,
}
