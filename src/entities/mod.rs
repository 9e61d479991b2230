// Entity Models
//
// State and City are geography, created once by the ingestion boundary and
// afterwards mutated only by count recomputation. Listing is the canonical
// business record.

pub mod city;
pub mod listing;
pub mod state;

pub use city::City;
pub use listing::{FillableField, Listing, ListingSummary, NewListing};
pub use state::{resolve_state_code, state_slug_for_code, State, UsState, US_STATES};
