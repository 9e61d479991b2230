// Directory ingestion CLI
//
//   directory-ingest setup
//   directory-ingest import --file canonical.json --batch-id atf-batch-0-1 [--dry-run]
//   directory-ingest detect-duplicates [--export /tmp/dedup]
//   directory-ingest merge pairs.json [--execute]
//   directory-ingest recompute-counts [--dry-run]
//   directory-ingest integrity-check

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use directory_ingest::config::{load_env_files, Config};
use directory_ingest::counts::{recompute_counts, CountField};
use directory_ingest::duplicates::{detect_duplicates, MatchStrategy, CONSOLE_GROUP_LIMIT};
use directory_ingest::error::IngestError;
use directory_ingest::importer::{load_candidates, CanonicalImporter, ImportOptions};
use directory_ingest::ingestion::IngestionSource;
use directory_ingest::integrity::check_integrity;
use directory_ingest::merge::{load_directives, validate_directives, MergeEngine, MergeOptions, PairOutcome};
use directory_ingest::Store;

const CANCEL_WINDOW_SECS: u64 = 5;

#[derive(Parser)]
#[command(name = "directory-ingest")]
#[command(version, about = "Directory data ingestion & deduplication pipeline")]
struct Cli {
    /// SQLite database file
    #[arg(long, global = true, env = "DIRECTORY_DB")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the schema and seed the 50 states plus DC
    Setup,

    /// Import a JSON array of candidate records
    Import {
        /// Path to canonical.json
        #[arg(long)]
        file: Option<PathBuf>,

        /// Batch identifier stamped on every inserted listing (required)
        #[arg(long)]
        batch_id: Option<String>,

        /// Preview without writing to the database
        #[arg(long)]
        dry_run: bool,

        /// Minimum confidence threshold
        #[arg(long, default_value_t = directory_ingest::importer::DEFAULT_CONFIDENCE_THRESHOLD)]
        confidence: f64,

        /// Maximum records to import (0 = no limit)
        #[arg(long)]
        limit: Option<usize>,

        /// Provenance recorded on inserted listings
        #[arg(long, default_value = "outscraper")]
        source: String,
    },

    /// Report likely duplicate listings (read-only)
    DetectDuplicates {
        /// Write one CSV per strategy into this directory
        #[arg(long)]
        export: Option<PathBuf>,
    },

    /// Apply reviewed merge pairs from a JSON file
    Merge {
        /// JSON array of { "keep_id": .., "remove_id": .. }
        path: PathBuf,

        /// Write changes (default is a dry run)
        #[arg(long)]
        execute: bool,

        /// Skip the cancellation window before live writes
        #[arg(long)]
        no_wait: bool,
    },

    /// Recompute city/state store_count and city_count
    RecomputeCounts {
        #[arg(long)]
        dry_run: bool,
    },

    /// Check referential integrity, counts and required fields (read-only)
    IntegrityCheck,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    load_env_files();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("❌ {:#}", e);
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config = Config::resolve(cli.db)?;

    match cli.command {
        Commands::Setup => run_setup(&config),
        Commands::Import {
            file,
            batch_id,
            dry_run,
            confidence,
            limit,
            source,
        } => {
            let file = file.ok_or_else(|| IngestError::Configuration("--file is required".to_string()))?;
            let source = IngestionSource::parse(&source).ok_or_else(|| {
                IngestError::Configuration(format!("unknown --source '{}'", source))
            })?;
            let options = ImportOptions {
                batch_id: batch_id.unwrap_or_default(),
                confidence_threshold: confidence,
                limit: limit.filter(|&n| n > 0),
                dry_run,
                source,
            };
            options.validate()?;
            run_import(&config, &file, options)
        }
        Commands::DetectDuplicates { export } => run_detect(&config, export.as_deref()),
        Commands::Merge {
            path,
            execute,
            no_wait,
        } => run_merge(&config, &path, execute, no_wait),
        Commands::RecomputeCounts { dry_run } => run_recompute(&config, dry_run),
        Commands::IntegrityCheck => run_integrity(&config),
    }
}

/// Every command except setup works on an existing, initialised database
fn open_store(config: &Config) -> Result<Store> {
    Store::open_existing(&config.db_path)
        .with_context(|| format!("opening database {}", config.db_path.display()))
}

fn banner(title: &str) {
    println!("{}", "=".repeat(60));
    println!("  {}", title);
    println!("{}", "=".repeat(60));
}

// ============================================================================
// SETUP
// ============================================================================

fn run_setup(config: &Config) -> Result<ExitCode> {
    banner("🔧 SETUP");
    let store = Store::open(&config.db_path)
        .with_context(|| format!("creating database {}", config.db_path.display()))?;
    println!("✓ Schema ready at {} (WAL mode)", config.db_path.display());

    let inserted = store.seed_states()?;
    println!("✓ Seeded {} new states ({} total)", inserted, store.list_states()?.len());

    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// IMPORT
// ============================================================================

fn run_import(config: &Config, file: &Path, options: ImportOptions) -> Result<ExitCode> {
    banner("📥 IMPORT CANONICAL DATA");
    println!("  File:                 {}", file.display());
    println!("  Batch ID:             {}", options.batch_id);
    println!("  Confidence Threshold: {}", options.confidence_threshold);
    println!(
        "  Limit:                {}",
        options.limit.map(|n| n.to_string()).unwrap_or_else(|| "none".to_string())
    );
    println!("  Source:               {}", options.source.as_str());
    println!("  Mode:                 {}", if options.dry_run { "DRY RUN" } else { "LIVE" });
    println!("{}", "=".repeat(60));

    let candidates = load_candidates(file)
        .with_context(|| format!("reading candidates from {}", file.display()))?;
    println!("\n📂 Total records: {}", candidates.len());

    let store = open_store(config)?;
    let importer = CanonicalImporter::new(&store, options)?;
    let report = importer.run(&candidates);

    if report.dry_run {
        println!("\n🔍 DRY RUN - No database writes\n");
        println!("Preview (first {}):", report.preview.len());
        for row in &report.preview {
            println!("   {} ({}, {}) [{}]", row.name, row.city, row.state, row.confidence);
        }
        if report.preview_remainder() > 0 {
            println!("   ... and {} more", report.preview_remainder());
        }
    }

    println!();
    banner("RESULTS");
    println!("  Total records:    {}", report.stats.total);
    println!("  Eligible:         {}", report.stats.eligible);
    println!("  Inserted:         {}", report.stats.inserted);
    println!("  Skipped:          {}", report.stats.skipped);
    println!("  Errors:           {}", report.stats.errors);

    let breakdown = report.skip_reasons.breakdown();
    if !breakdown.is_empty() {
        println!("\n  Skipped breakdown:");
        for (reason, count) in breakdown {
            println!("    - {}: {}", reason, count);
        }
    }
    println!("{}", "=".repeat(60));

    if report.has_errors() {
        println!("⚠️  {} record(s) errored - review the log above", report.stats.errors);
        return Ok(ExitCode::from(1));
    }

    println!("✅ {}", report.summary());
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// DUPLICATES
// ============================================================================

fn run_detect(config: &Config, export: Option<&Path>) -> Result<ExitCode> {
    banner("🔍 DUPLICATE LISTING DETECTION");
    let store = open_store(config)?;
    let report = detect_duplicates(&store)?;

    if report.total_listings == 0 {
        println!("No listings found.");
        return Ok(ExitCode::SUCCESS);
    }

    for (n, strategy) in MatchStrategy::ALL.iter().enumerate() {
        let groups = report.groups(*strategy);
        println!("\n{}", "-".repeat(60));
        println!("{}. {}", n + 1, strategy.title());
        println!("{}", "-".repeat(60));
        println!("Found {} groups\n", groups.len());

        for group in groups.iter().take(CONSOLE_GROUP_LIMIT) {
            println!("  Key: \"{}\"", group.key);
            let keep_id = group.recommended_keep().map(|l| l.id);
            if !strategy.is_strong() {
                println!("  (soft match - verify before merging)");
            }
            for l in &group.listings {
                let marker = if Some(l.id) == keep_id { "KEEP" } else { "    " };
                println!("  {} [{}] {}", marker, l.id, l.name);
                println!(
                    "        {}, {}, {}",
                    l.address.as_deref().unwrap_or("no address"),
                    l.city_name,
                    l.state_name
                );
                if *strategy == MatchStrategy::NameCity {
                    println!(
                        "        Approved: {} | External id: {}",
                        if l.is_approved { "Yes" } else { "No" },
                        if l.external_id.is_some() { "Yes" } else { "No" }
                    );
                }
            }
            println!();
        }
        if groups.len() > CONSOLE_GROUP_LIMIT {
            println!("  ... and {} more groups", groups.len() - CONSOLE_GROUP_LIMIT);
        }
    }

    println!();
    banner("Summary");
    println!("  Total listings:             {}", report.total_listings);
    println!(
        "  Name+city duplicates:       {} groups ({} listings)",
        report.name_city.len(),
        report.name_city_listing_count()
    );
    println!("  Phone duplicates:           {} groups", report.phone.len());
    println!("  Exact name+city duplicates: {} groups", report.exact_name_city.len());

    if let Some(dir) = export {
        for path in report.export_csv(dir)? {
            println!("📄 Exported: {}", path.display());
        }
    }

    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// MERGE
// ============================================================================

fn run_merge(config: &Config, path: &Path, execute: bool, no_wait: bool) -> Result<ExitCode> {
    let directives = load_directives(path)
        .with_context(|| format!("reading merge pairs from {}", path.display()))?;
    validate_directives(&directives)?;

    banner("🔀 MERGE DUPLICATE LISTINGS");
    println!("  Mode:   {}", if execute { "LIVE EXECUTION" } else { "DRY RUN (no changes)" });
    println!("  Input:  {}", path.display());
    println!("  Pairs:  {}", directives.len());
    println!();

    if execute && !no_wait {
        println!("⚠️  WARNING: This will modify the database!");
        println!("Press Ctrl+C within {} seconds to cancel...", CANCEL_WINDOW_SECS);
        std::thread::sleep(Duration::from_secs(CANCEL_WINDOW_SECS));
        println!();
    }

    let store = open_store(config)?;
    let engine = MergeEngine::new(&store, MergeOptions { dry_run: !execute });
    let report = engine.run(&directives)?;

    for pair in &report.pairs {
        println!(
            "--- Pair: keep={}, remove={} ---",
            pair.directive.keep_id, pair.directive.remove_id
        );
        match &pair.outcome {
            PairOutcome::Merged {
                keep_name,
                remove_name,
                fills,
            } => {
                println!("  Keep:   [{}] {}", pair.directive.keep_id, keep_name);
                println!("  Remove: [{}] {}", pair.directive.remove_id, remove_name);
                for fill in fills {
                    println!("  Fill: {} = {}", fill.field.as_str(), fill.preview);
                }
                if report.dry_run {
                    println!(
                        "  [DRY RUN] Would update {} field(s) and delete record {}",
                        fills.len(),
                        pair.directive.remove_id
                    );
                } else {
                    println!("  Deleted record {}", pair.directive.remove_id);
                }
            }
            PairOutcome::Skipped(reason) => println!("  SKIP: {}", reason),
            PairOutcome::Errored(message) => println!("  ERROR: {}", message),
        }
    }

    println!();
    banner("Summary");
    println!("  Mode:              {}", if report.dry_run { "DRY RUN" } else { "LIVE" });
    println!("  Pairs processed:   {}", report.stats.pairs_processed);
    println!("  Pairs skipped:     {}", report.stats.pairs_skipped);
    println!("  Fields filled:     {}", report.stats.fields_filled);
    println!("  Records deleted:   {}", report.stats.records_deleted);
    println!("  Errors:            {}", report.stats.errors);

    if report.dry_run {
        println!("\n[DRY RUN] No changes made. Use --execute to apply.");
    } else if !report.has_errors() {
        println!("\n✅ Merge complete! Run recompute-counts to update city/state counts.");
    } else {
        println!("\n⚠️  Merge completed with errors. Review output above.");
        return Ok(ExitCode::from(1));
    }

    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// COUNTS
// ============================================================================

fn run_recompute(config: &Config, dry_run: bool) -> Result<ExitCode> {
    banner("🧮 RECOMPUTE STORE & CITY COUNTS");
    if dry_run {
        println!("(DRY RUN - no changes will be made)");
    }
    println!();

    let store = open_store(config)?;
    let report = recompute_counts(&store, dry_run)?;

    for correction in &report.corrections {
        println!("  {}", correction.describe());
    }

    println!();
    banner("Summary");
    println!("  City store_count updates:  {}", report.count_of(CountField::CityStoreCount));
    println!("  State store_count updates: {}", report.count_of(CountField::StateStoreCount));
    println!("  State city_count updates:  {}", report.count_of(CountField::StateCityCount));
    println!("{}", "=".repeat(60));

    if report.dry_run {
        println!("\n(DRY RUN complete - no changes were made)");
    } else if report.errors > 0 {
        println!("\n⚠️  {} update(s) failed. Review output above.", report.errors);
        return Ok(ExitCode::from(1));
    } else if report.is_clean() {
        println!("\n✅ All counts are already correct!");
    } else {
        println!("\n✅ Counts recomputed successfully.");
    }

    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// INTEGRITY
// ============================================================================

fn run_integrity(config: &Config) -> Result<ExitCode> {
    banner("🩺 DATA INTEGRITY CHECK");
    let store = open_store(config)?;
    let report = check_integrity(&store)?;

    if report.issues.is_empty() {
        println!("\n✅ All checks passed.");
        return Ok(ExitCode::SUCCESS);
    }

    for issue in &report.issues {
        let icon = match issue.severity {
            directory_ingest::integrity::Severity::Error => "❌",
            directory_ingest::integrity::Severity::Warning => "⚠️ ",
        };
        println!("\n{} [{}] {}", icon, issue.severity.as_str().to_uppercase(), issue.check);
        println!("   {}", issue.message);
        for line in &issue.details {
            println!("   {}", line);
        }
        if !issue.sample_ids.is_empty() {
            println!("   Sample ids: {:?}", issue.sample_ids);
        }
    }

    println!();
    banner("Summary");
    println!("  {}", report.summary());

    if report.has_errors() {
        return Ok(ExitCode::from(1));
    }
    Ok(ExitCode::SUCCESS)
}
