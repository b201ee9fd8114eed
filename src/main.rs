mod collectors;
mod config;
mod report;
mod scheduler;
mod snapshot;
mod store;
#[cfg(test)]
mod test_support;

use clap::Parser;
use collectors::system::HostSource;
use collectors::Collector;
use config::{Config, ConfigError};
use report::Reporter;
use scheduler::Scheduler;
use std::path::PathBuf;
use std::time::Duration;
use store::SnapshotStore;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Long flags that older deployments pass with a single dash (`-url x`).
const LEGACY_FLAGS: &[&str] = &["url", "token", "freq", "config", "db", "timeout", "insecure"];

#[derive(Parser, Debug)]
#[command(name = "hostpulse")]
#[command(version, about = "Periodic host telemetry: collect, store locally, report over HTTPS")]
struct Cli {
    /// Collector endpoint receiving the snapshots
    #[arg(long)]
    url: Option<String>,
    /// Bearer token sent with every report
    #[arg(long)]
    token: Option<String>,
    /// Minutes between cycles
    #[arg(long)]
    freq: Option<u64>,
    /// Optional YAML config file
    #[arg(long)]
    config: Option<PathBuf>,
    /// SQLite file for the local snapshot log
    #[arg(long)]
    db: Option<PathBuf>,
    /// Request timeout, e.g. `30s`. Unset waits forever
    #[arg(long, value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,
    /// Skip TLS certificate verification
    #[arg(long)]
    insecure: bool,
    #[arg(long)]
    print_default_config: bool,
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse_from(normalize_legacy_flags(std::env::args()));
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }

    let cfg = match build_config(&cli) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(error = %err, "failed to load configuration");
            std::process::exit(1);
        }
    };

    let store = match open_store(&cfg) {
        Ok(store) => store,
        Err(err) => {
            error!(error = %err, path = %cfg.db_path.display(), "failed to prepare snapshot store");
            std::process::exit(1);
        }
    };

    let reporter = match Reporter::new(&cfg) {
        Ok(r) => r,
        Err(err) => {
            error!(error = %err, "failed to set up reporter");
            std::process::exit(1);
        }
    };
    if cfg.insecure_skip_verify {
        warn!(url = %cfg.url, "TLS certificate verification is disabled");
    }

    info!(
        url = %cfg.url,
        freq_minutes = cfg.freq_minutes,
        db = %cfg.db_path.display(),
        "starting hostpulse"
    );

    let scheduler = Scheduler::new(
        Collector::new(HostSource::new()),
        store,
        reporter,
        cfg.interval(),
    );

    tokio::select! {
        _ = scheduler.run() => {}
        res = tokio::signal::ctrl_c() => {
            if let Err(err) = res {
                error!(error = %err, "failed to listen for Ctrl+C");
            }
            info!("received Ctrl+C, exiting");
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn open_store(cfg: &Config) -> Result<SnapshotStore, store::StoreError> {
    let store = SnapshotStore::open(&cfg.db_path)?;
    store.ensure_schema()?;
    Ok(store)
}

/// Defaults, then the YAML file, then the token env var, then CLI flags.
fn build_config(cli: &Cli) -> Result<Config, ConfigError> {
    let mut cfg = match &cli.config {
        Some(path) => Config::load_from_file(path)?,
        None => Config::default(),
    };

    if let Some(token) = resolve_token_from_env(&cfg.token_env) {
        cfg.token = token;
    }
    if let Some(url) = &cli.url {
        cfg.url = url.clone();
    }
    if let Some(token) = &cli.token {
        cfg.token = token.clone();
    }
    if let Some(freq) = cli.freq {
        cfg.freq_minutes = freq;
    }
    if let Some(db) = &cli.db {
        cfg.db_path = db.clone();
    }
    if let Some(timeout) = cli.timeout {
        cfg.request_timeout_secs = Some(timeout.as_secs().max(1));
    }
    if cli.insecure {
        cfg.insecure_skip_verify = true;
    }

    cfg.validate()?;
    Ok(cfg)
}

fn resolve_token_from_env(env_name: &str) -> Option<String> {
    if let Ok(v) = std::env::var(env_name) {
        if !v.trim().is_empty() {
            return Some(v);
        }
    }
    None
}

fn normalize_legacy_flags(args: impl IntoIterator<Item = String>) -> Vec<String> {
    args.into_iter()
        .enumerate()
        .map(|(i, arg)| {
            if i == 0 {
                return arg;
            }
            let is_legacy = arg
                .strip_prefix('-')
                .filter(|rest| !rest.starts_with('-'))
                .map(|rest| rest.split('=').next().unwrap_or(rest))
                .is_some_and(|name| LEGACY_FLAGS.contains(&name));
            if is_legacy {
                format!("-{arg}")
            } else {
                arg
            }
        })
        .collect()
}
