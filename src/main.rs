use std::fs::File;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

use clustertop::config::Config;
use clustertop::decode::{Decoder, DecoderKind};
use clustertop::ingest::Ingestor;
use clustertop::scheduler::{Scheduler, TickOutcome};
use clustertop::store::NodeStore;
use clustertop::transport::{self, Subscriber};
use clustertop::ui::{self, Dashboard, Render, TerminalRenderer, TextRenderer};

/// Live terminal dashboard for cluster metric snapshots.
#[derive(Parser)]
#[command(name = "clustertop", about)]
struct Cli {
    /// Path to an optional YAML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Broker address (host:port). Overrides the config file.
    #[arg(short, long)]
    broker: Option<String>,

    /// Subscription key. Overrides the config file.
    #[arg(short, long)]
    key: Option<String>,

    /// Channel appended to the key. Overrides the config file.
    #[arg(long)]
    channel: Option<String>,

    /// Redraw period, e.g. "100ms". Overrides the config file.
    #[arg(long, value_parser = humantime::parse_duration)]
    period: Option<Duration>,

    /// Limit on each broker connect, e.g. "5s". Overrides the config file.
    #[arg(long, value_parser = humantime::parse_duration)]
    connect_timeout: Option<Duration>,

    /// Payload decoder (binary, json). Overrides the config file.
    #[arg(long)]
    decoder: Option<DecoderKind>,

    /// Print plain text frames to stdout instead of the full-screen table.
    #[arg(long)]
    plain: bool,

    /// Logging verbosity level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Write logs to this file. Without it logs go to stderr in plain mode
    /// and are discarded otherwise.
    #[arg(long)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Print version information and exit.
    Version,
}

/// Build-time version info.
mod version {
    pub const RELEASE: &str = env!("CARGO_PKG_VERSION");

    /// Git commit hash (set at build time via env, or "unknown").
    pub fn git_commit() -> &'static str {
        option_env!("GIT_COMMIT").unwrap_or("unknown")
    }

    /// Full version string with platform info.
    pub fn full() -> String {
        format!(
            "{} (commit: {}, {}/{})",
            RELEASE,
            git_commit(),
            std::env::consts::OS,
            std::env::consts::ARCH,
        )
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Command::Version) = &cli.command {
        println!("clustertop {}", version::full());
        return Ok(());
    }

    init_tracing(&cli)?;

    let cfg = build_config(&cli)?;

    tracing::info!(
        version = version::RELEASE,
        commit = version::git_commit(),
        broker = %cfg.broker,
        key = %cfg.key,
        decoder = %cfg.decoder,
        "starting clustertop",
    );

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    rt.block_on(run(cfg, cli.plain))
}

/// The full-screen table owns stdout, so logs go to a file, to stderr in
/// plain mode, or nowhere.
fn init_tracing(cli: &Cli) -> Result<()> {
    let filter = log_filter(&cli.log_level, cli.log_file.is_some(), cli.plain)?;
    let builder = fmt().with_env_filter(filter).with_target(true);

    match (&cli.log_file, cli.plain) {
        (Some(path), _) => {
            let file = File::options()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        (None, true) => builder.with_writer(std::io::stderr).init(),
        (None, false) => builder.with_writer(std::io::sink).init(),
    }

    Ok(())
}

/// Filter for `--log-level`; `off` when there is nowhere to write. The level
/// is parsed either way so a typo is still reported.
fn log_filter(level: &str, has_log_file: bool, plain: bool) -> Result<EnvFilter> {
    let filter =
        EnvFilter::try_new(level).with_context(|| format!("invalid log level: {level}"))?;

    if has_log_file || plain {
        Ok(filter)
    } else {
        Ok(EnvFilter::new("off"))
    }
}

/// Loads the optional config file and applies command-line overrides.
fn build_config(cli: &Cli) -> Result<Config> {
    let mut cfg = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };

    if let Some(broker) = &cli.broker {
        cfg.broker = broker.clone();
    }
    if let Some(key) = &cli.key {
        cfg.key = key.clone();
    }
    if let Some(channel) = &cli.channel {
        cfg.channel = channel.clone();
    }
    if let Some(period) = cli.period {
        cfg.period = period;
    }
    if let Some(timeout) = cli.connect_timeout {
        cfg.connect_timeout = timeout;
    }
    if let Some(decoder) = cli.decoder {
        cfg.decoder = decoder;
    }

    cfg.validate().context("invalid configuration")?;

    Ok(cfg)
}

async fn run(cfg: Config, plain: bool) -> Result<()> {
    let cancel = CancellationToken::new();
    tokio::spawn(watch_signals(cancel.clone()));

    let store = Arc::new(NodeStore::new());
    let ingestor = Ingestor::new(Decoder::from_kind(cfg.decoder), Arc::clone(&store));

    let url = transport::subscription_url(&cfg.broker, &cfg.key, &cfg.channel);
    let subscriber = match Subscriber::connect(&url, cfg.connect_timeout, &cancel).await {
        Ok(subscriber) => subscriber,
        Err(_) if cancel.is_cancelled() => {
            tracing::info!("shutdown requested before subscribing, clustertop stopped");
            return Ok(());
        }
        Err(e) => {
            return Err(e).with_context(|| format!("connecting to broker {}", cfg.broker));
        }
    };
    let subscription = tokio::spawn(subscriber.run(ingestor.clone(), cancel.clone()));

    let dashboard = Dashboard::new(
        cfg.column_set(),
        Arc::clone(ingestor.store()),
        Arc::clone(ingestor.stats()),
    );
    let scheduler = Scheduler::new(cfg.period, cancel.clone())?;

    let ticks = if plain {
        render_loop(&scheduler, &dashboard, TextRenderer::new(std::io::stdout())).await
    } else {
        let renderer = TerminalRenderer::new()?;
        tokio::spawn(ui::watch_keys(cancel.clone()));
        // The renderer is dropped when the loop returns, restoring the terminal.
        render_loop(&scheduler, &dashboard, renderer).await
    };

    cancel.cancel();

    match subscription.await {
        Ok(frames) => tracing::info!(frames, ticks, "subscription drained"),
        Err(e) => tracing::warn!(error = %e, "subscription task failed"),
    }

    let counts = ingestor.stats().snapshot();
    tracing::info!(
        nodes = store.len(),
        received = counts.received,
        dropped = counts.dropped(),
        "clustertop stopped",
    );

    Ok(())
}

async fn render_loop<R: Render>(scheduler: &Scheduler, dashboard: &Dashboard, mut renderer: R) -> u64 {
    scheduler
        .run(|| {
            let result = dashboard.tick(&mut renderer).map(|()| TickOutcome::Continue);
            std::future::ready(result)
        })
        .await
}

/// Cancels on SIGINT or SIGTERM.
async fn watch_signals(cancel: CancellationToken) {
    let ctrl_c = tokio::signal::ctrl_c();

    let mut sigterm =
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => Some(sigterm),
            Err(e) => {
                tracing::warn!(error = %e, "failed to register SIGTERM handler");
                None
            }
        };

    let sigterm_recv = async {
        match sigterm.as_mut() {
            Some(sigterm) => {
                sigterm.recv().await;
            }
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received SIGINT, shutting down");
        }
        _ = sigterm_recv => {
            tracing::info!("received SIGTERM, shutting down");
        }
        _ = cancel.cancelled() => return,
    }

    cancel.cancel();
}

#[cfg(test)]
mod tests {
    use tracing_subscriber::filter::LevelFilter;

    use super::*;

    #[test]
    fn test_log_filter_off_in_full_screen_mode() {
        let filter = log_filter("debug", false, false).expect("valid level");
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::OFF));
    }

    #[test]
    fn test_log_filter_keeps_level_with_a_sink() {
        let plain = log_filter("debug", false, true).expect("valid level");
        assert_eq!(plain.max_level_hint(), Some(LevelFilter::DEBUG));

        let file = log_filter("warn", true, false).expect("valid level");
        assert_eq!(file.max_level_hint(), Some(LevelFilter::WARN));
    }

    #[test]
    fn test_log_filter_rejects_bad_level_in_any_mode() {
        assert!(log_filter("clustertop=loud", false, false).is_err());
    }

    #[test]
    fn test_cli_connect_timeout_overrides_default() {
        let cli = Cli::parse_from(["clustertop", "--key", "k", "--connect-timeout", "750ms"]);
        let cfg = build_config(&cli).expect("valid config");
        assert_eq!(cfg.connect_timeout, Duration::from_millis(750));
    }
}
