// 🔀 Merge Engine - apply human-reviewed (keep, remove) decisions
//
// Dry run unless explicitly executed. For each pair the kept listing gains
// every fillable field it lacks and the removed listing has; nothing present
// on the kept listing is overwritten. City/State counts are left alone:
// run the counts recompute afterwards.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::db::Store;
use crate::entities::FillableField;
use crate::error::{IngestError, Result};

// ============================================================================
// INPUT
// ============================================================================

/// Explicit reviewer decision, never derived automatically
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeDirective {
    pub keep_id: i64,
    pub remove_id: i64,
}

/// Read a JSON array of `{ "keep_id": .., "remove_id": .. }`
pub fn load_directives(path: &Path) -> Result<Vec<MergeDirective>> {
    let raw = std::fs::read_to_string(path)?;
    let directives = serde_json::from_str(&raw)?;
    Ok(directives)
}

/// Whole-input checks, run before any pair is touched
pub fn validate_directives(directives: &[MergeDirective]) -> Result<()> {
    if directives.is_empty() {
        return Err(IngestError::Configuration(
            "input must be a non-empty JSON array of { keep_id, remove_id } objects".to_string(),
        ));
    }

    for d in directives {
        if d.keep_id <= 0 || d.remove_id <= 0 {
            return Err(IngestError::Configuration(format!(
                "invalid pair keep_id={} remove_id={}: ids must be positive",
                d.keep_id, d.remove_id
            )));
        }
        if d.keep_id == d.remove_id {
            return Err(IngestError::Configuration(format!(
                "invalid pair: keep_id and remove_id are the same ({})",
                d.keep_id
            )));
        }
    }

    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOptions {
    pub dry_run: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self { dry_run: true }
    }
}

// ============================================================================
// REPORT
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergeStats {
    pub pairs_processed: usize,
    pub pairs_skipped: usize,
    pub fields_filled: usize,
    /// In a dry run: records that would be deleted
    pub records_deleted: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldFill {
    pub field: FillableField,
    /// Truncated JSON of the copied value
    pub preview: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PairOutcome {
    Merged { keep_name: String, remove_name: String, fills: Vec<FieldFill> },
    Skipped(String),
    Errored(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairResult {
    pub directive: MergeDirective,
    pub outcome: PairOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeReport {
    pub dry_run: bool,
    pub stats: MergeStats,
    pub pairs: Vec<PairResult>,
}

impl MergeReport {
    pub fn has_errors(&self) -> bool {
        self.stats.errors > 0
    }

    pub fn summary(&self) -> String {
        format!(
            "{}: {} processed, {} skipped, {} fields filled, {} deleted, {} errors",
            if self.dry_run { "DRY RUN" } else { "LIVE" },
            self.stats.pairs_processed,
            self.stats.pairs_skipped,
            self.stats.fields_filled,
            self.stats.records_deleted,
            self.stats.errors
        )
    }
}

// ============================================================================
// ENGINE
// ============================================================================

pub struct MergeEngine<'a> {
    store: &'a Store,
    options: MergeOptions,
}

impl<'a> MergeEngine<'a> {
    pub fn new(store: &'a Store, options: MergeOptions) -> Self {
        Self { store, options }
    }

    /// Validate the whole input, then process pairs independently
    pub fn run(&self, directives: &[MergeDirective]) -> Result<MergeReport> {
        validate_directives(directives)?;

        let mut report = MergeReport {
            dry_run: self.options.dry_run,
            stats: MergeStats::default(),
            pairs: Vec::with_capacity(directives.len()),
        };

        for directive in directives {
            let outcome = match self.merge_pair(directive) {
                Ok(outcome) => outcome,
                Err(e) => {
                    let message = e.detailed_message();
                    tracing::error!(
                        keep_id = directive.keep_id,
                        remove_id = directive.remove_id,
                        error = %message,
                        "merge failed"
                    );
                    PairOutcome::Errored(message)
                }
            };

            match &outcome {
                PairOutcome::Merged { fills, .. } => {
                    report.stats.pairs_processed += 1;
                    report.stats.records_deleted += 1;
                    report.stats.fields_filled += fills.len();
                }
                PairOutcome::Skipped(_) => report.stats.pairs_skipped += 1,
                PairOutcome::Errored(_) => report.stats.errors += 1,
            }

            report.pairs.push(PairResult {
                directive: *directive,
                outcome,
            });
        }

        Ok(report)
    }

    fn merge_pair(&self, directive: &MergeDirective) -> Result<PairOutcome> {
        let Some(keep) = self.store.get_listing(directive.keep_id)? else {
            tracing::warn!(keep_id = directive.keep_id, "SKIP: keep listing not found");
            return Ok(PairOutcome::Skipped(format!("keep_id={} not found", directive.keep_id)));
        };
        let Some(remove) = self.store.get_listing(directive.remove_id)? else {
            tracing::warn!(remove_id = directive.remove_id, "SKIP: remove listing not found");
            return Ok(PairOutcome::Skipped(format!("remove_id={} not found", directive.remove_id)));
        };

        let (merged, filled) = keep.fill_nulls_from(&remove);
        let fills: Vec<FieldFill> = filled
            .iter()
            .map(|&field| FieldFill {
                field,
                preview: merged.field_preview(field),
            })
            .collect();

        for fill in &fills {
            tracing::debug!(keep_id = keep.id, field = fill.field.as_str(), value = %fill.preview, "fill");
        }

        if self.options.dry_run {
            tracing::info!(
                keep_id = keep.id,
                remove_id = remove.id,
                fields = fills.len(),
                "[DRY RUN] would update and delete"
            );
        } else {
            self.store.apply_merge(&merged, remove.id)?;
            tracing::info!(keep_id = keep.id, remove_id = remove.id, fields = fills.len(), "merged");
        }

        Ok(PairOutcome::Merged {
            keep_name: keep.name,
            remove_name: remove.name,
            fills,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{insert, new_listing, seeded_store};

    fn live() -> MergeOptions {
        MergeOptions { dry_run: false }
    }

    fn pair(keep_id: i64, remove_id: i64) -> MergeDirective {
        MergeDirective { keep_id, remove_id }
    }

    #[test]
    fn test_live_merge_fills_phone_and_deletes() {
        let store = seeded_store();
        let keep = insert(&store, &new_listing("Fixers", Some(1), Some(1)));
        let mut other = new_listing("Fixers Inc", Some(1), Some(1));
        other.phone = Some("555-1111".to_string());
        let remove = insert(&store, &other);

        let report = MergeEngine::new(&store, live()).run(&[pair(keep, remove)]).unwrap();

        let kept = store.get_listing(keep).unwrap().unwrap();
        assert_eq!(kept.phone.as_deref(), Some("555-1111"));
        assert!(store.get_listing(remove).unwrap().is_none());
        assert_eq!(report.stats.pairs_processed, 1);
        assert_eq!(report.stats.records_deleted, 1);
        assert_eq!(report.stats.fields_filled, 1);
        println!("✅ {}", report.summary());
    }

    #[test]
    fn test_live_merge_never_overwrites() {
        let store = seeded_store();
        let mut a = new_listing("Fixers", Some(1), Some(1));
        a.phone = Some("555-2222".to_string());
        let keep = insert(&store, &a);
        let mut b = new_listing("Fixers", Some(1), Some(1));
        b.phone = Some("555-1111".to_string());
        let remove = insert(&store, &b);

        MergeEngine::new(&store, live()).run(&[pair(keep, remove)]).unwrap();

        let kept = store.get_listing(keep).unwrap().unwrap();
        assert_eq!(kept.phone.as_deref(), Some("555-2222"));
    }

    #[test]
    fn test_external_id_moves_to_kept_listing() {
        let store = seeded_store();
        let keep = insert(&store, &new_listing("Fixers", Some(1), Some(1)));
        let mut b = new_listing("Fixers", Some(1), Some(1));
        b.external_id = Some("place-9".to_string());
        let remove = insert(&store, &b);

        let report = MergeEngine::new(&store, live()).run(&[pair(keep, remove)]).unwrap();

        assert!(!report.has_errors());
        let kept = store.get_listing(keep).unwrap().unwrap();
        assert_eq!(kept.external_id.as_deref(), Some("place-9"));
    }

    #[test]
    fn test_missing_listing_skips_pair_and_continues() {
        let store = seeded_store();
        let keep = insert(&store, &new_listing("A", Some(1), Some(1)));
        let remove = insert(&store, &new_listing("B", Some(1), Some(1)));

        let report = MergeEngine::new(&store, live())
            .run(&[pair(keep, 999), pair(keep, remove)])
            .unwrap();

        assert_eq!(report.stats.pairs_skipped, 1);
        assert_eq!(report.stats.pairs_processed, 1);
        assert!(matches!(report.pairs[0].outcome, PairOutcome::Skipped(_)));
    }

    #[test]
    fn test_dry_run_changes_nothing() {
        let store = seeded_store();
        let keep = insert(&store, &new_listing("A", Some(1), Some(1)));
        let mut b = new_listing("B", Some(1), Some(1));
        b.website = Some("https://b.example".to_string());
        let remove = insert(&store, &b);

        let report = MergeEngine::new(&store, MergeOptions::default())
            .run(&[pair(keep, remove)])
            .unwrap();

        assert!(report.dry_run);
        assert_eq!(report.stats.fields_filled, 1);
        assert_eq!(store.count_listings().unwrap(), 2);
        assert!(store.get_listing(keep).unwrap().unwrap().website.is_none());
    }

    #[test]
    fn test_invalid_input_is_rejected_up_front() {
        assert!(validate_directives(&[]).is_err());
        assert!(validate_directives(&[pair(1, 1)]).is_err());
        assert!(validate_directives(&[pair(1, 2), pair(0, 3)]).is_err());
        assert!(validate_directives(&[pair(1, 2)]).is_ok());

        let store = seeded_store();
        let err = MergeEngine::new(&store, live()).run(&[pair(2, 2)]).unwrap_err();
        assert!(err.is_fatal());
    }
}
