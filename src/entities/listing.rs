// 🔧 Listing Entity - Canonical, directory-visible business record
//
// Created only through the ingestion boundary. Mutated by merge (null-field
// fill) and deleted only as the "remove" side of a merge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// LISTING
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub address: Option<String>,
    pub city_id: Option<i64>,
    pub state_id: Option<i64>,
    pub zip: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub description: Option<String>,
    pub services: Option<Vec<String>>,
    pub rating: Option<f64>,
    pub review_count: Option<i64>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub is_approved: bool,

    // ========================================================================
    // PROVENANCE
    // ========================================================================
    /// Upstream identity (e.g. a Google place id), unique when present
    pub external_id: Option<String>,

    /// Which collector produced the record
    pub source: Option<String>,

    /// Import run that inserted the record, for audit/rollback
    pub batch_id: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Nullable fields a merge may copy from the removed record into the kept one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FillableField {
    Address,
    Phone,
    Website,
    Description,
    Zip,
    Lat,
    Lng,
    Rating,
    ReviewCount,
    Services,
    ExternalId,
    Source,
}

impl FillableField {
    pub const ALL: [FillableField; 12] = [
        FillableField::Address,
        FillableField::Phone,
        FillableField::Website,
        FillableField::Description,
        FillableField::Zip,
        FillableField::Lat,
        FillableField::Lng,
        FillableField::Rating,
        FillableField::ReviewCount,
        FillableField::Services,
        FillableField::ExternalId,
        FillableField::Source,
    ];

    /// Column name in the listings table
    pub fn as_str(&self) -> &'static str {
        match self {
            FillableField::Address => "address",
            FillableField::Phone => "phone",
            FillableField::Website => "website",
            FillableField::Description => "description",
            FillableField::Zip => "zip",
            FillableField::Lat => "lat",
            FillableField::Lng => "lng",
            FillableField::Rating => "rating",
            FillableField::ReviewCount => "review_count",
            FillableField::Services => "services",
            FillableField::ExternalId => "external_id",
            FillableField::Source => "source",
        }
    }
}

/// Copy `src` into `dst` only when `dst` is empty and `src` is present
fn fill<T: Clone>(dst: &mut Option<T>, src: &Option<T>) -> bool {
    if dst.is_none() && src.is_some() {
        *dst = src.clone();
        true
    } else {
        false
    }
}

impl Listing {
    /// Stage a merge: every fillable field that is null here but present on
    /// `other` is copied over. Fields present on both are never overwritten.
    ///
    /// Returns the merged record and the fields that were filled.
    pub fn fill_nulls_from(&self, other: &Listing) -> (Listing, Vec<FillableField>) {
        let mut merged = self.clone();
        let mut filled = Vec::new();

        for field in FillableField::ALL {
            let changed = match field {
                FillableField::Address => fill(&mut merged.address, &other.address),
                FillableField::Phone => fill(&mut merged.phone, &other.phone),
                FillableField::Website => fill(&mut merged.website, &other.website),
                FillableField::Description => fill(&mut merged.description, &other.description),
                FillableField::Zip => fill(&mut merged.zip, &other.zip),
                FillableField::Lat => fill(&mut merged.lat, &other.lat),
                FillableField::Lng => fill(&mut merged.lng, &other.lng),
                FillableField::Rating => fill(&mut merged.rating, &other.rating),
                FillableField::ReviewCount => fill(&mut merged.review_count, &other.review_count),
                FillableField::Services => fill(&mut merged.services, &other.services),
                FillableField::ExternalId => fill(&mut merged.external_id, &other.external_id),
                FillableField::Source => fill(&mut merged.source, &other.source),
            };

            if changed {
                filled.push(field);
            }
        }

        (merged, filled)
    }

    /// Display value of a fillable field (for merge previews)
    pub fn field_preview(&self, field: FillableField) -> String {
        let value = match field {
            FillableField::Address => serde_json::json!(self.address),
            FillableField::Phone => serde_json::json!(self.phone),
            FillableField::Website => serde_json::json!(self.website),
            FillableField::Description => serde_json::json!(self.description),
            FillableField::Zip => serde_json::json!(self.zip),
            FillableField::Lat => serde_json::json!(self.lat),
            FillableField::Lng => serde_json::json!(self.lng),
            FillableField::Rating => serde_json::json!(self.rating),
            FillableField::ReviewCount => serde_json::json!(self.review_count),
            FillableField::Services => serde_json::json!(self.services),
            FillableField::ExternalId => serde_json::json!(self.external_id),
            FillableField::Source => serde_json::json!(self.source),
        };
        value.to_string().chars().take(60).collect()
    }
}

// ============================================================================
// NEW LISTING (insert payload)
// ============================================================================

/// Insert payload for the ingestion boundary.
///
/// Stored exactly as given: normalization and the approval decision belong
/// to the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewListing {
    pub name: String,
    pub slug: String,
    pub address: Option<String>,
    pub city_id: Option<i64>,
    pub state_id: Option<i64>,
    pub zip: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub description: Option<String>,
    pub services: Option<Vec<String>>,
    pub rating: Option<f64>,
    pub review_count: Option<i64>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub is_approved: bool,
    pub external_id: Option<String>,
    pub source: Option<String>,
    pub batch_id: Option<String>,
}

// ============================================================================
// LISTING SUMMARY (denormalized read model)
// ============================================================================

/// Listing joined with its city and state display names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingSummary {
    pub id: i64,
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub city_id: Option<i64>,

    /// "" when the city is missing or orphaned
    pub city_name: String,
    pub state_name: String,

    pub external_id: Option<String>,
    pub is_approved: bool,
    pub created_at: DateTime<Utc>,
}
