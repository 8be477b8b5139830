//! candlekeep CLI — fetch, status and export commands.
//!
//! Commands:
//! - `fetch` — download candles into the local store, resuming where the last run stopped
//! - `status` — report row count and time range of a store
//! - `export` — write a store as CSV

use anyhow::{Context, Result};
use candlekeep_core::data::connect;
use candlekeep_core::domain::{format_millis, Timeframe};
use candlekeep_core::ingest::{
    parse_iso8601, preflight, BatchFetcher, CursorSource, IngestReport, IngestionLoop, Shutdown,
};
use candlekeep_core::store::{store_path, OrderedStore, SqliteStore};
use candlekeep_core::{ConfigError, IngestError, RunMode, Settings};
use clap::{Args, Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "candlekeep",
    about = "candlekeep — resumable OHLCV candle downloader"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Which store a command works on.
#[derive(Args)]
struct Target {
    /// Symbol of the instrument or currency pair (e.g. BTC/USDT).
    #[arg(short, long)]
    symbol: String,

    /// Exchange to download from (binance, binanceus).
    #[arg(short, long)]
    exchange: String,

    /// Bar timeframe (e.g. 1m, 4h, 1d, 1M).
    #[arg(short, long, default_value = "1d")]
    timeframe: String,

    /// Root directory for store files. Overrides the settings file.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// TOML settings file.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Download candles into the local store.
    Fetch {
        #[command(flatten)]
        target: Target,

        /// ISO 8601 start time, e.g. 2018-01-01T00:00:00Z. Defaults to resuming from the store.
        #[arg(long)]
        since: Option<String>,

        /// Percentage added to the exchange rate limit (e.g. 20 for 20% slower requests).
        #[arg(short = 'r', long = "rate-limit")]
        rate_limit: Option<u32>,

        /// Keep running and append new candles as they close.
        #[arg(long, default_value_t = false)]
        follow: bool,

        /// Log every stored candle.
        #[arg(long, default_value_t = false)]
        debug: bool,
    },
    /// Report row count and time range of a store.
    Status {
        #[command(flatten)]
        target: Target,
    },
    /// Write a store as CSV.
    Export {
        #[command(flatten)]
        target: Target,

        /// Output file. Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let debug = matches!(cli.command, Commands::Fetch { debug: true, .. });
    init_tracing(debug);

    match cli.command {
        Commands::Fetch {
            target,
            since,
            rate_limit,
            follow,
            debug: _,
        } => run_fetch(target, since, rate_limit, follow),
        Commands::Status { target } => run_status(&target),
        Commands::Export { target, output } => run_export(&target, output),
    }
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Settings file (if any) with command-line overrides applied.
fn load_settings(target: &Target) -> Result<Settings, ConfigError> {
    let mut settings = match &target.config {
        Some(path) => Settings::from_file(path)?,
        None => Settings::default(),
    };
    if let Some(dir) = &target.data_dir {
        settings.data_dir = dir.clone();
    }
    Ok(settings)
}

fn run_fetch(
    target: Target,
    since: Option<String>,
    rate_limit: Option<u32>,
    follow: bool,
) -> Result<()> {
    let mode = if follow {
        RunMode::Continuous
    } else {
        RunMode::OneShot
    };

    let shutdown = Arc::new(Shutdown::new());
    let worker_shutdown = Arc::clone(&shutdown);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start runtime")?;

    // The provider's blocking HTTP client must live on a blocking thread.
    let joined = runtime.block_on(async move {
        let mut worker = tokio::task::spawn_blocking(move || {
            ingest(target, since, rate_limit, mode, &worker_shutdown)
        });
        tokio::select! {
            joined = &mut worker => joined,
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received; closing the store");
                shutdown.trigger();
                worker.await
            }
        }
    });

    match joined.context("ingestion worker panicked")? {
        Ok(report) => {
            print_report(&report);
            Ok(())
        }
        Err(err) => exit_with(err),
    }
}

/// Validate, open the store and run the loop. Runs on a blocking thread.
fn ingest(
    target: Target,
    since: Option<String>,
    rate_limit: Option<u32>,
    mode: RunMode,
    shutdown: &Shutdown,
) -> Result<IngestReport, IngestError> {
    // Everything that needs no network is checked first.
    let mut settings = load_settings(&target)?;
    if let Some(pct) = rate_limit {
        settings.rate_limit_surcharge_pct = pct;
    }
    settings.validate()?;
    let timeframe = Timeframe::parse(&target.timeframe)?;
    if let Some(raw) = since.as_deref() {
        if parse_iso8601(raw).is_none() {
            return Err(ConfigError::InvalidStartTime {
                value: raw.to_string(),
            }
            .into());
        }
    }

    let provider = connect(&target.exchange, settings.page_limit)?;
    let config = settings.ingest_config(mode, provider.rate_limit())?;
    preflight(
        &BatchFetcher::new(provider.as_ref(), shutdown, &config),
        &target.symbol,
        &timeframe,
    )?;

    let path = store_path(&settings.data_dir, &target.exchange, &target.symbol, &timeframe);
    let mut store = SqliteStore::open(&path)?;
    info!(path = %path.display(), "opened store");

    let result = IngestionLoop::new(
        provider.as_ref(),
        &mut store,
        shutdown,
        &config,
        &target.symbol,
        timeframe,
    )
    .run(since.as_deref());

    let closed = store.close();
    let report = result?;
    closed?;
    Ok(report)
}

fn print_report(report: &IngestReport) {
    let started = match report.start.source {
        CursorSource::Explicit => "requested start",
        CursorSource::Store => "last stored candle",
        CursorSource::DefaultEpoch => "default epoch",
    };
    println!(
        "Caught up: {} new candles in {} batches ({} already stored), from {} ({started}) to {}",
        report.inserted,
        report.batches,
        report.duplicates,
        format_millis(report.start.cursor),
        format_millis(report.cursor),
    );
}

fn exit_with(err: IngestError) -> ! {
    match &err {
        IngestError::Interrupted => eprintln!("Program interrupted"),
        IngestError::Config(ConfigError::SymbolUnavailable {
            symbol,
            exchange,
            available,
        }) => {
            eprintln!("ERROR: the requested symbol ({symbol}) is not available from {exchange}\n");
            eprintln!("Available symbols are:");
            for s in available {
                eprintln!("  - {s}");
            }
        }
        other => eprintln!("ERROR: {other}"),
    }
    std::process::exit(err.exit_code());
}

fn run_status(target: &Target) -> Result<()> {
    let settings = load_settings(target)?;
    let timeframe = Timeframe::parse(&target.timeframe)?;
    let path = store_path(&settings.data_dir, &target.exchange, &target.symbol, &timeframe);

    println!("Store: {}", path.display());
    if !path.exists() {
        println!("  no data yet");
        return Ok(());
    }

    let store = SqliteStore::open(&path)?;
    let summary = store.summary()?;
    println!("  candles: {}", summary.rows);
    if let (Some(first), Some(last)) = (summary.first, summary.last) {
        println!("  first:   {}", format_millis(first));
        println!("  last:    {}", format_millis(last));
    }
    store.close()?;
    Ok(())
}

fn run_export(target: &Target, output: Option<PathBuf>) -> Result<()> {
    let settings = load_settings(target)?;
    let timeframe = Timeframe::parse(&target.timeframe)?;
    let path = store_path(&settings.data_dir, &target.exchange, &target.symbol, &timeframe);
    if !path.exists() {
        anyhow::bail!("no store at {}; run `fetch` first", path.display());
    }

    let store = SqliteStore::open(&path)?;
    let candles = store.scan()?;
    store.close()?;

    let sink: Box<dyn Write> = match &output {
        Some(file) => Box::new(
            std::fs::File::create(file)
                .with_context(|| format!("cannot create {}", file.display()))?,
        ),
        None => Box::new(std::io::stdout().lock()),
    };
    let mut writer = csv::Writer::from_writer(sink);
    for candle in &candles {
        writer.serialize(candle)?;
    }
    writer.flush()?;

    if let Some(file) = output {
        eprintln!("Exported {} candles to {}", candles.len(), file.display());
    }
    Ok(())
}
