// 🗺️ State Entity - US states and designation resolution
//
// "North Carolina", "north  carolina", "NC" and "nc" all resolve to the same
// State. Candidate records carry whichever form the upstream collector saw.

use serde::{Deserialize, Serialize};

// ============================================================================
// STATE ENTITY
// ============================================================================

/// A US state row.
///
/// `store_count` and `city_count` are derived aggregates maintained by the
/// counts recomputer, never by ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub code: String,

    /// Approved listings in this state
    pub store_count: i64,

    /// Cities in this state with store_count > 0
    pub city_count: i64,
}

// ============================================================================
// STATIC STATE TABLE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsState {
    pub name: &'static str,
    pub code: &'static str,
}

impl UsState {
    /// Store slug: lowercase name, spaces → hyphens
    pub fn slug(&self) -> String {
        self.name.to_lowercase().replace(' ', "-")
    }
}

const fn us(name: &'static str, code: &'static str) -> UsState {
    UsState { name, code }
}

pub const US_STATES: &[UsState] = &[
    us("Alabama", "AL"),
    us("Alaska", "AK"),
    us("Arizona", "AZ"),
    us("Arkansas", "AR"),
    us("California", "CA"),
    us("Colorado", "CO"),
    us("Connecticut", "CT"),
    us("Delaware", "DE"),
    us("District of Columbia", "DC"),
    us("Florida", "FL"),
    us("Georgia", "GA"),
    us("Hawaii", "HI"),
    us("Idaho", "ID"),
    us("Illinois", "IL"),
    us("Indiana", "IN"),
    us("Iowa", "IA"),
    us("Kansas", "KS"),
    us("Kentucky", "KY"),
    us("Louisiana", "LA"),
    us("Maine", "ME"),
    us("Maryland", "MD"),
    us("Massachusetts", "MA"),
    us("Michigan", "MI"),
    us("Minnesota", "MN"),
    us("Mississippi", "MS"),
    us("Missouri", "MO"),
    us("Montana", "MT"),
    us("Nebraska", "NE"),
    us("Nevada", "NV"),
    us("New Hampshire", "NH"),
    us("New Jersey", "NJ"),
    us("New Mexico", "NM"),
    us("New York", "NY"),
    us("North Carolina", "NC"),
    us("North Dakota", "ND"),
    us("Ohio", "OH"),
    us("Oklahoma", "OK"),
    us("Oregon", "OR"),
    us("Pennsylvania", "PA"),
    us("Rhode Island", "RI"),
    us("South Carolina", "SC"),
    us("South Dakota", "SD"),
    us("Tennessee", "TN"),
    us("Texas", "TX"),
    us("Utah", "UT"),
    us("Vermont", "VT"),
    us("Virginia", "VA"),
    us("Washington", "WA"),
    us("West Virginia", "WV"),
    us("Wisconsin", "WI"),
    us("Wyoming", "WY"),
];

// ============================================================================
// LOOKUPS
// ============================================================================

/// Case-insensitive 2-letter code check
pub fn is_state_code(code: &str) -> bool {
    US_STATES.iter().any(|s| s.code.eq_ignore_ascii_case(code))
}

/// Full state name (any case, any internal whitespace) → uppercase code
pub fn code_for_state_name(name: &str) -> Option<&'static str> {
    let wanted = collapse_whitespace(name);
    US_STATES
        .iter()
        .find(|s| s.name.eq_ignore_ascii_case(&wanted))
        .map(|s| s.code)
}

/// State designation (code or full name) → uppercase code
pub fn resolve_state_code(designation: &str) -> Option<&'static str> {
    let trimmed = designation.trim();

    if trimmed.len() == 2 {
        return US_STATES
            .iter()
            .find(|s| s.code.eq_ignore_ascii_case(trimmed))
            .map(|s| s.code);
    }

    code_for_state_name(trimmed)
}

/// Uppercase code → store slug ("NC" → "north-carolina")
pub fn state_slug_for_code(code: &str) -> Option<String> {
    US_STATES
        .iter()
        .find(|s| s.code.eq_ignore_ascii_case(code))
        .map(|s| s.slug())
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
