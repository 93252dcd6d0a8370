//! ELog Zulip Publisher: posts new logbook entries to Zulip streams.
//!
//! Reads one TOML file describing every logbook, then publishes the new entries of
//! each logbook in turn through `elog-zulip-core`.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use elog_zulip_core::config::{MetaConfig, Rotation};
use elog_zulip_core::{Config, LogbookConfig, Publisher};
use tracing_subscriber::prelude::*;

/// Publish ELog entries to Zulip
#[derive(Parser)]
#[command(name = "elog-zulip-publisher", version)]
struct Args {
    /// TOML configuration file
    config: PathBuf,

    /// Connect to the logbook, but mock the database and Zulip
    #[arg(long)]
    dry_run: bool,
}

/// Default tracing directives enabling info-level logs for this crate and elog-zulip-core.
const DEFAULT_DIRECTIVES: &[&str] = &["elog_zulip_publisher=info", "elog_zulip_core=info"];

/// Prefix of the log file when the configured path has no usable file name.
const DEFAULT_LOG_PREFIX: &str = "elog-zulip-publisher";

/// Build the default `EnvFilter`: RUST_LOG (if set) plus our default directives.
fn default_env_filter() -> anyhow::Result<tracing_subscriber::EnvFilter> {
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    for directive in DEFAULT_DIRECTIVES {
        filter = filter.add_directive(directive.parse()?);
    }
    Ok(filter)
}

/// Filter for the log file: `log-level` for both crates.
fn file_env_filter(level: &str) -> anyhow::Result<tracing_subscriber::EnvFilter> {
    let level = level.to_ascii_lowercase();
    tracing_subscriber::EnvFilter::try_new(format!(
        "elog_zulip_publisher={level},elog_zulip_core={level}"
    ))
    .with_context(|| format!("Invalid log-level '{}'", level))
}

/// Initialize the tracing subscriber.
///
/// Logs always go to stdout. When `log-file` is set, they are also written to a rolling
/// file next to it, filtered by `log-level`.
///
/// Returns the non-blocking writer guard that must be held for the process lifetime.
fn init_tracing(
    meta: &MetaConfig,
) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(log_file) = meta.log_file.as_deref() else {
        tracing_subscriber::fmt()
            .with_env_filter(default_env_filter()?)
            .init();
        return Ok(None);
    };

    let directory = log_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    if let Err(e) = std::fs::create_dir_all(directory) {
        eprintln!(
            "Warning: Failed to create log directory '{}': {}. Falling back to stdout-only.",
            directory.display(),
            e
        );
        tracing_subscriber::fmt()
            .with_env_filter(default_env_filter()?)
            .init();
        return Ok(None);
    }

    let rotation = match meta.log_rotation {
        Rotation::Daily => tracing_appender::rolling::Rotation::DAILY,
        Rotation::Hourly => tracing_appender::rolling::Rotation::HOURLY,
        Rotation::Never => tracing_appender::rolling::Rotation::NEVER,
    };
    let prefix = log_file
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(DEFAULT_LOG_PREFIX);

    let file_appender = tracing_appender::rolling::RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .max_log_files(meta.log_retention.max(1))
        .build(directory)
        .context("Failed to create rolling file appender")?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let stdout_layer = tracing_subscriber::fmt::layer().with_filter(default_env_filter()?);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_filter(file_env_filter(&meta.log_level)?);

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .init();

    Ok(Some(guard))
}

/// Publish the new entries of one logbook.
async fn run_logbook(config: LogbookConfig, dry_run: bool) -> anyhow::Result<()> {
    let name = config.name.clone();
    let publisher = Publisher::connect(config, dry_run)
        .await
        .context("Failed to set up publisher")?;

    let summary = publisher
        .publish()
        .await
        .context("Failed to determine pending entries")?;

    tracing::info!(
        "Logbook '{}': {} published, {} failed",
        name,
        summary.published.len(),
        summary.failed.len()
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Configuration first: tracing depends on [META].
    let config = Config::load_from(&args.config).context("Failed to load config")?;

    let _guard = init_tracing(&config.meta)?;

    let logbooks = config.logbooks().context("Invalid logbook configuration")?;
    tracing::info!(
        "Publishing {} logbooks{}",
        logbooks.len(),
        if args.dry_run { " (dry run)" } else { "" }
    );

    for logbook in logbooks {
        let name = logbook.name.clone();
        if let Err(e) = run_logbook(logbook, args.dry_run).await {
            tracing::error!("Logbook '{}' failed: {:#}", name, e);
        }
    }

    Ok(())
}
