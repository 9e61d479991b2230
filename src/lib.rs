// Directory Ingest - Core Library
// Ingestion, deduplication and count maintenance for the business directory

pub mod address;
pub mod config;
pub mod counts;
pub mod db;
pub mod duplicates;
pub mod entities;
pub mod error;
pub mod importer;
pub mod ingestion;
pub mod integrity;
pub mod merge;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use address::{
    extract_zip_from_address, hash_address, normalize_address, normalize_business_name,
    normalize_phone, slugify,
};
pub use counts::{recompute_counts, CountCorrection, CountField, CountsReport};
pub use db::Store;
pub use duplicates::{detect_duplicates, DuplicateGroup, DuplicateReport, MatchStrategy};
pub use entities::{City, FillableField, Listing, ListingSummary, NewListing, State};
pub use error::{IngestError, Result, SkipReason};
pub use importer::{CandidateRecord, CanonicalImporter, ImportOptions, ImportReport};
pub use ingestion::{ensure_city, import_repair_company, log_ingestion, IngestionAction, IngestionSource};
pub use integrity::{check_integrity, IntegrityIssue, IntegrityReport, Severity};
pub use merge::{MergeDirective, MergeEngine, MergeOptions, MergeReport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
