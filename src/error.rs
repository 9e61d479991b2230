// Error taxonomy for the ingestion pipeline
//
// Validation and Duplicate are skips, Resolution and Store are batch errors,
// Configuration aborts before any record is processed.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IngestError>;

// ============================================================================
// SKIP REASONS
// ============================================================================

/// Why a candidate record was skipped instead of inserted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SkipReason {
    MissingExternalId,
    EmptyName,
    EmptyAddress,
    EmptyState,
    EmptyCity,
    AlreadyExists,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::MissingExternalId => "Missing external id",
            SkipReason::EmptyName => "Empty name",
            SkipReason::EmptyAddress => "Empty address",
            SkipReason::EmptyState => "Empty state",
            SkipReason::EmptyCity => "Empty city",
            SkipReason::AlreadyExists => "Already exists",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// INGEST ERROR
// ============================================================================

#[derive(Error, Debug)]
pub enum IngestError {
    /// Missing or malformed candidate field (always a skip)
    #[error("Validation failed: {0}")]
    Validation(SkipReason),

    /// External id already present in the store (always a skip)
    #[error("Duplicate external id: {external_id}")]
    Duplicate { external_id: String },

    /// Unknown state or dangling reference (batch error, not fatal)
    #[error("Resolution failed: {0}")]
    Resolution(String),

    /// Single-record persistence failure (batch error, not fatal)
    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// Missing CLI input or credentials (fatal, aborts the run)
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl IngestError {
    /// Skips are expected outcomes and never fail a batch
    pub fn is_skip(&self) -> bool {
        matches!(self, IngestError::Validation(_) | IngestError::Duplicate { .. })
    }

    /// Only configuration problems abort a whole command
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            IngestError::Configuration(_) | IngestError::Io(_) | IngestError::Json(_)
        )
    }

    /// Skip reason for skip-class errors
    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            IngestError::Validation(reason) => Some(*reason),
            IngestError::Duplicate { .. } => Some(SkipReason::AlreadyExists),
            _ => None,
        }
    }

    /// Message with the store-provided detail (extended sqlite code) when present
    pub fn detailed_message(&self) -> String {
        match self {
            IngestError::Store(rusqlite::Error::SqliteFailure(err, msg)) => format!(
                "{} | Code: {:?} ({})",
                msg.as_deref().unwrap_or("sqlite failure"),
                err.code,
                err.extended_code
            ),
            other => other.to_string(),
        }
    }
}
