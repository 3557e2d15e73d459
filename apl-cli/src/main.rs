//! apl - paper list maintenance tool
//!
//! Batch entry point over `apl-common`: validates contributor submissions,
//! merges them into the canonical store, renders the public list and checks
//! store consistency. Every command that changes the store goes through the
//! one merge engine.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use apl_common::config::{load_config, TomlConfig};
use apl_common::merge::{CanonicalSet, Decision, OrphanPolicy};
use apl_common::store::{load_submission_files, open_store, AnyStore, StoreKind};
use apl_common::validate::{prepare_batch, PreparedBatch};
use apl_common::{report, time, MergeEngine, MergePolicy, RecordStore, SchemaRegistry};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

/// Command-line arguments for apl
#[derive(Parser, Debug)]
#[command(name = "apl")]
#[command(about = "Maintain a curated paper list from contributor submissions")]
#[command(version)]
struct Args {
    /// Config file (TOML)
    #[arg(short, long, env = "APL_CONFIG")]
    config: Option<PathBuf>,

    /// Canonical store path (overrides the config file)
    #[arg(short, long)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Merge submission files into the canonical store
    Update {
        /// Submission files (.json or .csv)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Conflict policy: mark, skip or replace
        #[arg(long)]
        policy: Option<MergePolicy>,

        /// Compute the merge without saving
        #[arg(long)]
        dry_run: bool,
    },

    /// Validate submission files without merging
    Validate {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Render the Markdown list from the canonical store
    Render {
        /// Output path (defaults to the config's report output)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Report identity groups, conflict shadows and orphans in the store
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref()).context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .with_writer(std::io::stderr)
        .init();

    info!(
        "Starting apl v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("APL_GIT_HASH"),
        env!("APL_BUILD_TIMESTAMP"),
        env!("APL_BUILD_PROFILE")
    );

    SchemaRegistry::install(config.schema_registry().context("Invalid schema in configuration")?)
        .context("Failed to install schema registry")?;
    let registry = SchemaRegistry::global();

    let store = open_configured_store(&config, args.store.as_deref(), registry).await?;
    info!(store = %store.describe(), "Using canonical store");

    match args.command {
        Command::Update {
            files,
            policy,
            dry_run,
        } => update(&config, registry, &store, &files, policy, dry_run).await,
        Command::Validate { files } => validate(&config, registry, &files).await,
        Command::Render { output } => {
            let output = output.unwrap_or_else(|| config.report.output.clone());
            render(registry, &store, &output).await
        }
        Command::Check => check(&config, &store).await,
    }
}

async fn open_configured_store<'r>(
    config: &TomlConfig,
    override_path: Option<&Path>,
    registry: &'r SchemaRegistry,
) -> Result<AnyStore<'r>> {
    let (kind, path) = match override_path {
        Some(path) => (
            StoreKind::from_path(path).unwrap_or_else(|| config.store.resolved_kind()),
            path.to_path_buf(),
        ),
        None => (config.store.resolved_kind(), config.store.path.clone()),
    };
    open_store(kind, &path, config.store.backup, registry)
        .await
        .with_context(|| format!("Failed to open store {}", path.display()))
}

async fn prepared_submissions(
    config: &TomlConfig,
    registry: &SchemaRegistry,
    files: &[PathBuf],
) -> Result<PreparedBatch> {
    let submissions = load_submission_files(registry, files)
        .await
        .context("Failed to read submissions")?;
    let batch = prepare_batch(registry, &config.identity_resolver(), submissions);

    for rejected in &batch.rejected {
        for issue in &rejected.issues {
            println!("rejected '{}': {}", rejected.record.title(), issue);
        }
    }
    for duplicate in &batch.duplicates {
        println!("duplicate within batch: '{}'", duplicate.title());
    }
    Ok(batch)
}

async fn update(
    config: &TomlConfig,
    registry: &SchemaRegistry,
    store: &AnyStore<'_>,
    files: &[PathBuf],
    policy: Option<MergePolicy>,
    dry_run: bool,
) -> Result<()> {
    let batch = prepared_submissions(config, registry, files).await?;
    if batch.accepted.is_empty() {
        warn!("No valid submissions to merge");
        return Ok(());
    }

    let mut engine = MergeEngine::new(registry, config.identity_resolver(), config.merge_options());
    if let Some(policy) = policy {
        engine = engine.with_policy(policy);
    }
    info!(policy = %engine.options().policy, submissions = batch.accepted.len(), "Merging");

    if dry_run {
        let outcome = engine
            .dry_run(store, batch.accepted)
            .await
            .context("Dry run failed")?;
        println!("dry run ({} policy):", engine.options().policy);
        println!("  added:      {}", outcome.count(|d| *d == Decision::Added));
        println!("  conflicts:  {}", outcome.count(|d| *d == Decision::Conflict));
        println!("  duplicates: {}", outcome.count(|d| *d == Decision::Duplicate));
        println!("  skipped:    {}", outcome.count(|d| *d == Decision::Skipped));
        println!(
            "  replaced:   {}",
            outcome.count(|d| matches!(d, Decision::Replaced { .. }))
        );
        println!("  records after merge: {}", outcome.canonical.len());
        return Ok(());
    }

    let report = engine.merge_and_persist(store, batch.accepted).await;
    if let Some(reason) = &report.failure {
        bail!(
            "Merge not applied ({}); {} submissions left unresolved",
            reason,
            report.conflicts.len()
        );
    }

    println!("added {} records", report.added.len());
    for conflict in &report.conflicts {
        println!("conflict: '{}' ({})", conflict.title(), conflict.doi());
    }
    Ok(())
}

async fn validate(config: &TomlConfig, registry: &SchemaRegistry, files: &[PathBuf]) -> Result<()> {
    let batch = prepared_submissions(config, registry, files).await?;
    if !batch.is_clean() {
        bail!("{} submissions failed validation", batch.rejected.len());
    }
    println!("{} submissions valid", batch.accepted.len() + batch.duplicates.len());
    Ok(())
}

async fn render(registry: &SchemaRegistry, store: &AnyStore<'_>, output: &Path) -> Result<()> {
    let records = store.load().await.context("Failed to load canonical store")?;
    let markdown = report::render_markdown(registry, &records);
    tokio::fs::write(output, markdown)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;
    info!(output = %output.display(), records = records.len(), "Report written");
    Ok(())
}

async fn check(config: &TomlConfig, store: &AnyStore<'_>) -> Result<()> {
    let records = store.load().await.context("Failed to load canonical store")?;
    let resolver = config.identity_resolver();

    let bad_times = records
        .iter()
        .filter_map(|r| r.submission_time())
        .filter(|t| time::parse_submission_time(t).is_none())
        .count();
    let summary = CanonicalSet::summarize(records, &resolver)?;
    let orphans = summary.orphans;

    println!("records:          {}", summary.records);
    println!("identity groups:  {}", summary.groups);
    println!("conflict shadows: {}", summary.shadows);
    println!("orphan shadows:   {}", orphans);
    if bad_times > 0 {
        warn!(count = bad_times, "Records with unreadable submission time sort unpredictably");
    }

    if orphans > 0 && config.merge.orphan_shadows == OrphanPolicy::Fail {
        bail!("{} orphan conflict shadows; merges will be refused", orphans);
    }
    Ok(())
}
