//! bndl: content-delivery asset-bundle client
//!
//! Commands:
//!   fetch          - download and decrypt every bundle in the catalog
//!   master         - download and decrypt the master-data blob
//!   list           - print a catalog summary
//!   config show    - display the effective configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;

use bndl_core::config::BndlConfig;
use bndl_fetch::{Catalog, Downloader, HttpTransport, Transport};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "bndl",
    version,
    about = "content-delivery asset bundle client",
    long_about = "bndl: fetch, verify, and decrypt asset bundles from a CDN endpoint"
)]
struct Cli {
    /// Path to bndl.toml configuration file
    #[arg(long, short = 'c', env = "BNDL_CONFIG", default_value = "bndl.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Download and decrypt every bundle in the catalog
    ///
    /// Already-materialized files are size-verified first and only stale
    /// or missing bundles are fetched. Failed bundles are retried with
    /// concurrency reduced to 1 until the run is clean.
    Fetch {
        /// Read the catalog from a local file instead of the endpoint
        #[arg(long)]
        catalog: Option<PathBuf>,
        /// Output root (overrides config)
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,
        /// Concurrent workers, 0 = cpu count (overrides config)
        #[arg(long, short = 'j')]
        workers: Option<usize>,
    },

    /// Download and decrypt the master-data blob
    Master {
        /// Output file for the decrypted blob
        #[arg(long, short = 'o', default_value = "master.db")]
        out: PathBuf,
    },

    /// Print a catalog summary
    List {
        /// Read the catalog from a local file instead of the endpoint
        #[arg(long)]
        catalog: Option<PathBuf>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    init_logging(&config.log.level, &config.log.format);

    match cli.command {
        Commands::Fetch {
            catalog,
            out,
            workers,
        } => cmd_fetch(&config, catalog.as_deref(), out, workers).await,
        Commands::Master { out } => cmd_master(&config, &out).await,
        Commands::List { catalog } => cmd_list(&config, catalog.as_deref()).await,
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config),
    }
}

// ── Config and logging ─────────────────────────────────────────────────────────

fn load_config(path: &Path) -> Result<BndlConfig> {
    if path.exists() {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing config: {}", path.display()))
    } else {
        // no config file is fine: defaults plus flags cover the common case
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Ok(BndlConfig::default())
    }
}

fn init_logging(level: &str, format: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}

// ── Progress bar helpers ───────────────────────────────────────────────────────

fn make_progress_bar(total: u64, prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::with_template("{prefix:.bold} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("=>-"),
    );
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

// ── Catalog loading ────────────────────────────────────────────────────────────

async fn load_catalog(
    transport: &HttpTransport,
    config: &BndlConfig,
    local: Option<&Path>,
) -> Result<Catalog> {
    let bytes = match local {
        Some(path) => std::fs::read(path)
            .with_context(|| format!("reading catalog: {}", path.display()))?,
        None => transport
            .fetch(&config.endpoint.catalog_path)
            .await
            .with_context(|| format!("fetching catalog: {}", config.endpoint.catalog_path))?,
    };
    Catalog::from_json(&bytes)
}

// ── `bndl fetch` ───────────────────────────────────────────────────────────────

async fn cmd_fetch(
    config: &BndlConfig,
    catalog_override: Option<&Path>,
    out: Option<PathBuf>,
    workers: Option<usize>,
) -> Result<()> {
    let transport = HttpTransport::new(&config.endpoint.base_url)?;
    let catalog = load_catalog(&transport, config, catalog_override).await?;
    let out_root = out.unwrap_or_else(|| config.output.root.clone());
    let workers = workers.unwrap_or(config.download.workers);

    println!(
        "Fetching {} bundles ({}) → {} (endpoint: {})",
        catalog.bundles.len(),
        fmt_bytes(catalog.total_bytes()),
        out_root.display(),
        config.endpoint.base_url,
    );

    let downloader = Downloader::new(transport, &out_root, workers)
        .with_max_passes(config.download.max_passes);
    let progress = downloader.progress();

    let pb = make_progress_bar(catalog.bundles.len() as u64, "fetch");
    let pb_ticker = pb.clone();
    let ticker = tokio::spawn(async move {
        loop {
            let total = progress.total();
            if total > 0 {
                pb_ticker.set_length(total);
                pb_ticker.set_position(progress.completed());
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    });

    let result = downloader.run(&catalog.bundles).await;
    ticker.abort();

    let stats = result.context("fetch run failed")?;
    pb.finish_with_message("done");

    println!();
    println!("Fetch complete:");
    println!("  current:    {} files verified in place", stats.verified_ok);
    println!("  downloaded: {} files", stats.downloaded);
    println!("  passes:     {}", stats.passes);
    Ok(())
}

// ── `bndl master` ──────────────────────────────────────────────────────────────

async fn cmd_master(config: &BndlConfig, out: &Path) -> Result<()> {
    let key = config.master.key()?;
    let iv = config.master.iv()?;

    let transport = HttpTransport::new(&config.endpoint.base_url)?;
    let blob = transport
        .fetch(&config.endpoint.master_path)
        .await
        .with_context(|| format!("fetching master data: {}", config.endpoint.master_path))?;

    let plain = bndl_crypto::decrypt_master(&key, &iv, &blob)?;
    std::fs::write(out, &plain).with_context(|| format!("writing: {}", out.display()))?;

    println!(
        "Master data: {} encrypted → {} decrypted → {}",
        fmt_bytes(blob.len() as u64),
        fmt_bytes(plain.len() as u64),
        out.display()
    );
    Ok(())
}

// ── `bndl list` ────────────────────────────────────────────────────────────────

async fn cmd_list(config: &BndlConfig, catalog_override: Option<&Path>) -> Result<()> {
    let transport = HttpTransport::new(&config.endpoint.base_url)?;
    let catalog = load_catalog(&transport, config, catalog_override).await?;

    println!("Catalog: {} bundles", catalog.bundles.len());
    println!("  packed:   {}", catalog.packed_count());
    println!(
        "  verbatim: {}",
        catalog.bundles.len() - catalog.packed_count()
    );
    println!("  on-wire:  {}", fmt_bytes(catalog.total_bytes()));
    Ok(())
}

// ── `bndl config show` ─────────────────────────────────────────────────────────

fn cmd_config_show(config: &BndlConfig) -> Result<()> {
    let rendered = toml::to_string_pretty(config).context("serializing config")?;
    print!("{rendered}");
    Ok(())
}

// ── Formatting helpers ─────────────────────────────────────────────────────────

fn fmt_bytes(n: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = n as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{n} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fmt_bytes() {
        assert_eq!(fmt_bytes(0), "0 B");
        assert_eq!(fmt_bytes(1023), "1023 B");
        assert_eq!(fmt_bytes(1024), "1.0 KiB");
        assert_eq!(fmt_bytes(1536), "1.5 KiB");
        assert_eq!(fmt_bytes(3 * 1024 * 1024), "3.0 MiB");
    }

    #[test]
    fn test_cli_parses_fetch_flags() {
        let cli = Cli::parse_from(["bndl", "fetch", "-j", "8", "-o", "/tmp/out"]);
        match cli.command {
            Commands::Fetch { workers, out, .. } => {
                assert_eq!(workers, Some(8));
                assert_eq!(out, Some(PathBuf::from("/tmp/out")));
            }
            other => panic!("parsed wrong command: {other:?}"),
        }
    }

    #[test]
    fn test_load_config_defaults_when_missing() {
        let config = load_config(Path::new("/definitely/not/here/bndl.toml")).unwrap();
        assert_eq!(config.endpoint.catalog_path, "catalog.json");
    }
}
