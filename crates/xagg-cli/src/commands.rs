//! Subcommand implementations.

use crate::{Cli, Command, FilterArgs, RunArgs};
use anyhow::{bail, Context, Result};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};
use xagg_core::config::ArtifactConfig;
use xagg_core::reconcile::{self, MaintenanceReport};
use xagg_core::{CatalogStore, Reconciler, RunContext, RunOverrides, RunSettings};

pub(crate) async fn dispatch(cli: Cli) -> Result<()> {
    let settings = match &cli.settings {
        Some(path) => RunSettings::load(path)?,
        None => RunSettings::default(),
    };
    let mut overrides = RunOverrides {
        database: cli.database.clone(),
        ..Default::default()
    };
    if let Command::Run(args) = &cli.command {
        overrides.output_directory = args.output_directory.clone();
        overrides.workers = args.num_processors;
        overrides.variables = args.variable.clone();
        overrides.experiments = args.experiment.clone();
        overrides.frequencies = args.frequency.clone();
    }
    let context = RunContext::new(settings, overrides)?;

    match &cli.command {
        Command::Run(args) => run(&context, args).await,
        Command::Retract { list } => retract(&context, list),
        Command::Reset(filter) => maintain(&context, filter, Maintenance::Reset),
        Command::Ignore(filter) => maintain(&context, filter, Maintenance::Ignore),
        Command::Purge(filter) => maintain(&context, filter, Maintenance::Purge),
        Command::Runs { limit, json } => runs(&context, *limit, *json),
    }
}

async fn run(context: &RunContext, args: &RunArgs) -> Result<()> {
    let _lock = context.acquire_lock()?;
    let store = context.open_store()?;
    info!("Using catalog {}", store.db_path().display());

    if args.update_paths {
        update_paths(context, &store).await?;
    }
    if args.update_scans {
        update_scans(context, &store).await?;
    }
    if args.count_stats {
        for stat in store.write_stats(Utc::now())? {
            info!("{}: {}", stat.indicator, stat.value);
        }
    }
    Ok(())
}

async fn update_paths(context: &RunContext, store: &CatalogStore) -> Result<()> {
    let roots = context.scan_roots();
    let inventory = context.scanner().scan(&roots).await;
    for failure in &inventory.failures {
        warn!("Could not scan {}: {}", failure.root.display(), failure.message);
    }

    let resolver = context.open_resolver()?;
    if !context.settings().metadata_cache.exists() {
        resolver.prime(inventory.paths());
    }

    Reconciler::new(store, &resolver).reconcile(&inventory, Utc::now())?;
    if let Err(e) = context.save_resolver(&resolver) {
        warn!("Failed to save table cache: {}", e);
    }
    Ok(())
}

async fn update_scans(context: &RunContext, store: &CatalogStore) -> Result<()> {
    let targets = store.select_for_scan(&context.scan_filters(), Utc::now())?;
    if targets.is_empty() {
        return Ok(());
    }
    let generator = Arc::new(context.generator()?);
    let chunks = targets.len().div_ceil(ArtifactConfig::CHUNK_SIZE);
    for (index, chunk) in targets.chunks(ArtifactConfig::CHUNK_SIZE).enumerate() {
        info!("Generating artifacts for chunk {} of {}", index + 1, chunks);
        let records = generator.generate_all(chunk).await;
        store.record_artifacts(&records)?;
    }
    Ok(())
}

fn retract(context: &RunContext, list: &std::path::Path) -> Result<()> {
    let _lock = context.acquire_lock()?;
    let store = context.open_store()?;
    let resolver = context.open_resolver()?;

    let ids = reconcile::read_retraction_list(list)
        .with_context(|| format!("reading retraction list {}", list.display()))?;
    info!("Loaded {} retracted dataset ids", ids.len());
    let keys = reconcile::retracted_keys(&resolver, &ids);

    let settings = context.settings();
    let report = reconcile::reconcile_retractions(
        &store,
        &keys,
        &settings.output_directory,
        &settings.archive_directory,
        Utc::now(),
    )?;
    println!(
        "retracted {} entries, archived {} artifacts, restored {} entries",
        report.retracted, report.archived, report.restored
    );
    if let Err(e) = context.save_resolver(&resolver) {
        warn!("Failed to save table cache: {}", e);
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
enum Maintenance {
    Reset,
    Ignore,
    Purge,
}

impl Maintenance {
    fn as_str(self) -> &'static str {
        match self {
            Maintenance::Reset => "reset",
            Maintenance::Ignore => "ignore",
            Maintenance::Purge => "purge",
        }
    }
}

fn maintain(context: &RunContext, args: &FilterArgs, operation: Maintenance) -> Result<()> {
    let filter = args.to_filter();
    if filter.is_unrestricted() && !args.all {
        bail!(
            "refusing to {} the whole catalog without --all",
            operation.as_str()
        );
    }

    let _lock = context.acquire_lock()?;
    let store = context.open_store()?;
    let MaintenanceReport {
        matched,
        deleted_artifacts,
    } = match operation {
        Maintenance::Reset => reconcile::reset(&store, &filter)?,
        Maintenance::Ignore => reconcile::ignore(&store, &filter, Utc::now())?,
        Maintenance::Purge => reconcile::purge(&store, &filter)?,
    };
    println!(
        "{}: {} entries, {} artifacts deleted",
        operation.as_str(),
        matched,
        deleted_artifacts
    );
    Ok(())
}

fn runs(context: &RunContext, limit: usize, json: bool) -> Result<()> {
    let store = context.open_store()?;
    let runs = store.list_runs(limit)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&runs)?);
        return Ok(());
    }
    println!(
        "{:<20} {:>9} {:>7} {:>7} {:>8} {:>7} {:>8} {:>7}",
        "time", "total", "new", "invalid", "modified", "missing", "returned", "deleted"
    );
    for run in runs {
        println!(
            "{:<20} {:>9} {:>7} {:>7} {:>8} {:>7} {:>8} {:>7}",
            xagg_core::catalog::format_timestamp(&run.time),
            run.total,
            run.new,
            run.invalid,
            run.modified,
            run.missing,
            run.returned,
            run.deleted
        );
    }
    Ok(())
}
