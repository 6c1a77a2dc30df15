//! asof CLI: prepare as-of datasets and inspect cache health.
//!
//! Commands:
//! - `prepare`: assemble one entity's dataset as of a date
//! - `batch`: prepare every entity listed in a file
//! - `cache check`: read-only health report per entity and kind
//! - `cache kinds`: print the effective cache registry

use anyhow::{anyhow, bail, Context, Result};
use asof_access::{
    applicable_kinds, parse_as_of, prepare_many, BundleOrigin, DataBundle, DatasetAssembler, PrepareOptions,
    PreparedDataset, StderrProgress,
};
use asof_core::config::AccessConfig;
use asof_core::data::{
    CacheRegistry, CacheState, CircuitBreaker, CsvImportProvider, FetcherSet, HttpJsonProvider, MarketDataProvider,
    RateLimiter,
};
use asof_core::domain::{CacheKind, EntityClass, EntityId};
use asof_core::logging::{init_logging, LogConfig};
use asof_core::{Clock, SystemClock};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "asof", about = "asof: causality-safe market data cache")]
struct Cli {
    /// TOML config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Cache root directory. Overrides the config file.
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble one entity's dataset as of a date.
    Prepare {
        /// Symbol in CODE.SUFFIX form (e.g., 600000.SH, 00700.HK, 000300.IDX).
        symbol: String,

        /// As-of date (YYYY-MM-DD).
        #[arg(long)]
        as_of: String,

        /// Display name, used in the storage directory.
        #[arg(long)]
        name: Option<String>,

        /// Asset class override: equity, index, or etf.
        #[arg(long)]
        class: Option<String>,

        #[command(flatten)]
        flags: PrepareFlags,

        /// Print the dataset as JSON instead of a summary.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Prepare every entity listed in a file (one `SYMBOL[,NAME]` per line).
    Batch {
        #[arg(long)]
        file: PathBuf,

        /// As-of date (YYYY-MM-DD).
        #[arg(long)]
        as_of: String,

        /// Worker threads. Defaults to the config's batch.workers.
        #[arg(long)]
        workers: Option<usize>,

        #[command(flatten)]
        flags: PrepareFlags,
    },
    /// Cache inspection commands.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(clap::Args)]
struct PrepareFlags {
    /// Re-fetch every applicable kind.
    #[arg(long, default_value_t = false)]
    force: bool,

    /// Re-fetch financial statements only.
    #[arg(long, default_value_t = false)]
    force_financials: bool,

    /// Re-fetch only these kinds (comma-separated, e.g. prices,share_capital).
    #[arg(long = "force-kind", value_delimiter = ',')]
    force_kinds: Vec<CacheKind>,

    /// Include the disclosure list.
    #[arg(long, default_value_t = false)]
    disclosures: bool,

    /// Disclosure window in days, overriding the registry.
    #[arg(long)]
    disclosure_days: Option<u32>,

    /// Never contact providers.
    #[arg(long, default_value_t = false)]
    offline: bool,

    /// Serve an outdated cache when refresh fails.
    #[arg(long, default_value_t = false)]
    allow_stale: bool,
}

#[derive(Subcommand)]
enum CacheAction {
    /// Report cache state for entities without refreshing anything.
    Check {
        /// Targets as SYMBOL or SYMBOL,NAME.
        #[arg(required = true)]
        targets: Vec<String>,

        /// Kinds to check (comma-separated). Defaults to every applicable kind.
        #[arg(long, value_delimiter = ',')]
        kinds: Vec<String>,

        #[arg(long, default_value_t = false)]
        json: bool,

        /// Exit non-zero if any location is absent or incomplete.
        #[arg(long, default_value_t = false)]
        fail_on_missing: bool,

        /// Exit non-zero if any location is stale or corrupt.
        #[arg(long, default_value_t = false)]
        fail_on_stale: bool,
    },
    /// Print the effective cache registry.
    Kinds {
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&LogConfig::from_env()).map_err(|e| anyhow!(e))?;

    let mut config = match &cli.config {
        Some(path) => AccessConfig::from_file(path)?,
        None => AccessConfig::default(),
    };
    if let Some(root) = cli.root {
        config.root = root;
    }

    match cli.command {
        Commands::Prepare {
            symbol,
            as_of,
            name,
            class,
            flags,
            json,
        } => run_prepare(&config, &symbol, &as_of, name, class, &flags, json),
        Commands::Batch {
            file,
            as_of,
            workers,
            flags,
        } => run_batch(&config, &file, &as_of, workers, &flags),
        Commands::Cache { action } => match action {
            CacheAction::Check {
                targets,
                kinds,
                json,
                fail_on_missing,
                fail_on_stale,
            } => run_cache_check(&config, &targets, &kinds, json, fail_on_missing, fail_on_stale),
            CacheAction::Kinds { json } => run_cache_kinds(&config, json),
        },
    }
}

fn prepare_options(config: &AccessConfig, flags: &PrepareFlags) -> PrepareOptions {
    PrepareOptions {
        force_refresh: flags.force,
        force_refresh_financials: flags.force_financials,
        force_kinds: flags.force_kinds.iter().copied().collect(),
        include_disclosures: flags.disclosures,
        disclosure_window_days: flags.disclosure_days,
        offline: flags.offline || config.offline,
        allow_stale: flags.allow_stale,
    }
}

/// Registry, provider stack, and fetchers for online use.
fn build_assembler(config: &AccessConfig) -> Result<DatasetAssembler> {
    let registry = config.build_registry()?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let limiter = Arc::new(RateLimiter::new(config.fetch.min_request_interval()));
    let breaker = Arc::new(CircuitBreaker::new(
        config.fetch.circuit_breaker_cooldown(),
        config.fetch.circuit_breaker_threshold,
    ));

    let import = config
        .provider
        .import_dir
        .as_ref()
        .map(|dir| Arc::new(CsvImportProvider::new(dir)) as Arc<dyn MarketDataProvider>);
    let (primary, fallbacks): (Option<Arc<dyn MarketDataProvider>>, Vec<_>) = match (&config.provider.base_url, import) {
        (Some(url), import) => {
            let http = HttpJsonProvider::new(url, config.fetch.request_timeout(), breaker)?;
            (Some(Arc::new(http)), import.into_iter().collect())
        }
        (None, Some(import)) => (Some(import), Vec::new()),
        (None, None) => (None, Vec::new()),
    };

    let fetchers = match primary {
        Some(primary) => FetcherSet::standard(
            &registry,
            primary,
            fallbacks,
            limiter,
            config.fetch.retry_policy(),
            Arc::clone(&clock),
        )?,
        None => {
            tracing::warn!("no provider configured; serving from cache only");
            FetcherSet::new()
        }
    };

    Ok(DatasetAssembler::new(Arc::new(registry), fetchers, clock))
}

/// `SYMBOL` or `SYMBOL,NAME`.
fn parse_target(raw: &str) -> Result<EntityId> {
    let entity = match raw.split_once(',') {
        Some((symbol, name)) => EntityId::parse(symbol)?.with_name(name.trim()),
        None => EntityId::parse(raw)?,
    };
    Ok(entity)
}

fn read_targets(path: &Path) -> Result<Vec<EntityId>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let mut targets = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let entity = parse_target(line).with_context(|| format!("{}:{}", path.display(), idx + 1))?;
        targets.push(entity);
    }
    Ok(targets)
}

fn run_prepare(
    config: &AccessConfig,
    symbol: &str,
    as_of: &str,
    name: Option<String>,
    class: Option<String>,
    flags: &PrepareFlags,
    json: bool,
) -> Result<()> {
    let mut entity = EntityId::parse(symbol)?;
    if let Some(name) = name {
        entity = entity.with_name(&name);
    }
    if let Some(class) = class {
        entity = entity.with_class(class.parse::<EntityClass>()?);
    }

    let assembler = build_assembler(config)?;
    let opts = prepare_options(config, flags);
    let dataset = match assembler.prepare_dataset(&entity, as_of, &opts) {
        Ok(ds) => ds,
        Err(e) => {
            eprintln!("Error for {entity}: {e}");
            std::process::exit(1);
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&dataset)?);
    } else {
        print_dataset(&dataset);
    }
    Ok(())
}

fn run_batch(
    config: &AccessConfig,
    file: &Path,
    as_of: &str,
    workers: Option<usize>,
    flags: &PrepareFlags,
) -> Result<()> {
    let as_of = parse_as_of(as_of)?;
    let targets = read_targets(file)?;
    if targets.is_empty() {
        bail!("no targets in {}", file.display());
    }

    let assembler = build_assembler(config)?;
    let opts = prepare_options(config, flags);
    let workers = workers.unwrap_or(config.batch.workers);
    let summary = prepare_many(&assembler, &targets, as_of, &opts, workers, &StderrProgress)?;

    if summary.failed() > 0 {
        for (entity, err) in summary.failures() {
            eprintln!("Error for {entity}: {err}");
        }
        std::process::exit(1);
    }
    Ok(())
}

#[derive(Serialize)]
struct CheckRow {
    entity: String,
    kind: CacheKind,
    #[serde(flatten)]
    state: CacheState,
}

fn run_cache_check(
    config: &AccessConfig,
    targets: &[String],
    kinds: &[String],
    json: bool,
    fail_on_missing: bool,
    fail_on_stale: bool,
) -> Result<()> {
    let requested: Vec<CacheKind> = kinds.iter().map(|k| k.parse::<CacheKind>()).collect::<Result<_, _>>()?;
    let registry = config.build_registry()?;
    // No fetchers: checking never refreshes.
    let assembler = DatasetAssembler::new(Arc::new(registry), FetcherSet::new(), Arc::new(SystemClock));

    let mut rows = Vec::new();
    for raw in targets {
        let entity = parse_target(raw)?;
        let kinds = if requested.is_empty() {
            applicable_kinds(&entity, true)
        } else {
            requested
                .iter()
                .copied()
                .filter(|k| k.applies_to(entity.class()))
                .collect()
        };
        for kind in kinds {
            let state = assembler.check_entity(&entity, kind)?;
            rows.push(CheckRow {
                entity: entity.symbol(),
                kind,
                state,
            });
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        println!("Cache: {}", assembler.registry().root().display());
        println!();
        println!("{:<12} {:<14} {:<10} {:>8}  {}", "Entity", "Kind", "Status", "Age", "Path");
        println!("{}", "-".repeat(72));
        for row in &rows {
            println!(
                "{:<12} {:<14} {:<10} {:>8}  {}",
                row.entity,
                row.kind.to_string(),
                status_label(&row.state),
                row.state.age_secs.map(format_age).unwrap_or_else(|| "-".into()),
                row.state.path.display()
            );
        }
    }

    let missing = rows.iter().any(|r| !r.state.exists || !r.state.missing.is_empty());
    let stale = rows.iter().any(|r| r.state.stale || r.state.corrupt);
    if (fail_on_missing && missing) || (fail_on_stale && stale) {
        std::process::exit(1);
    }
    Ok(())
}

fn run_cache_kinds(config: &AccessConfig, json: bool) -> Result<()> {
    let registry: CacheRegistry = config.build_registry()?;
    if json {
        let specs: Vec<_> = registry.specs().collect();
        println!("{}", serde_json::to_string_pretty(&specs)?);
        return Ok(());
    }

    println!("Cache root: {}", registry.root().display());
    println!();
    for spec in registry.specs() {
        println!("{} ({})", spec.kind, spec.description);
        println!("  path:      {}", spec.path_template);
        println!("  ttl:       {}", format_age(spec.ttl().num_seconds()));
        println!("  required:  {}", spec.required_files.join(", "));
        if !spec.optional_files.is_empty() {
            println!("  optional:  {}", spec.optional_files.join(", "));
        }
        if let Some(lookback) = &spec.acquisition_lookback {
            println!("  lookback:  {lookback:?}");
        }
        if let Some(days) = spec.consumption_window_days {
            println!("  window:    {days}d");
        }
    }
    Ok(())
}

fn status_label(state: &CacheState) -> &'static str {
    if !state.exists {
        "absent"
    } else if state.corrupt {
        "corrupt"
    } else if !state.missing.is_empty() {
        "missing"
    } else if state.stale {
        "stale"
    } else {
        "ok"
    }
}

fn origin_label(origin: &BundleOrigin) -> &'static str {
    match origin {
        BundleOrigin::Fetched => "fetched",
        BundleOrigin::Cached => "cached",
        BundleOrigin::StaleFallback { .. } => "stale",
        BundleOrigin::NotApplicable => "n/a",
    }
}

fn format_age(secs: i64) -> String {
    if secs < 3_600 {
        format!("{}m", secs / 60)
    } else if secs < 86_400 {
        format!("{}h", secs / 3_600)
    } else {
        format!("{}d", secs / 86_400)
    }
}

fn print_bundle(bundle: &DataBundle) {
    let latest = bundle
        .max_date()
        .map(|d| d.to_string())
        .unwrap_or_else(|| "-".into());
    println!(
        "{:<14} {:<8} {:>8}  {:<10}",
        bundle.kind.to_string(),
        origin_label(&bundle.origin),
        bundle.row_count(),
        latest
    );
    if let BundleOrigin::StaleFallback { reason } = &bundle.origin {
        println!("WARNING: {} served stale: {reason}", bundle.kind);
    }
}

fn print_dataset(dataset: &PreparedDataset) {
    println!();
    println!("=== {} ({}) as of {} ===", dataset.entity, dataset.entity.name(), dataset.as_of);
    println!("{:<14} {:<8} {:>8}  {:<10}", "Kind", "Origin", "Rows", "Latest");
    println!("{}", "-".repeat(44));
    for bundle in dataset.bundles() {
        print_bundle(bundle);
    }
    println!();
}
