use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use meshsplice_core::config::Config;
use meshsplice_core::sim::{SimHost, SocketId, Trace};
use meshsplice_core::{Accelerator, PinRegistry};

#[cfg(target_os = "linux")]
mod pinned;

#[derive(Parser)]
#[command(name = "meshsplice")]
#[command(about = "meshsplice - sidecar connection splicing")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "meshsplice.yaml")]
    config: PathBuf,

    /// Log file directory (enables file logging)
    #[arg(long)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a default configuration file
    Init,
    /// Validate the configuration file
    Validate,
    /// Replay a recorded event trace through the fast path and report decisions
    Replay {
        /// YAML trace of active_open/passive_open/close/message events
        trace: PathBuf,
    },
    /// Inspect or configure the pinned kernel tables (requires root)
    #[cfg(target_os = "linux")]
    Debug {
        #[command(subcommand)]
        action: DebugAction,
    },
}

#[cfg(target_os = "linux")]
#[derive(Subcommand)]
enum DebugAction {
    /// Set the kernel diagnostic verbosity (0 off, 1 records, 2 records + counting)
    Level { level: u32 },
    /// Show table occupancy and the redirect counter
    Stats,
    /// Dump the proxy pairing table
    Pairs,
    /// Print the redirect counter periodically until Ctrl+C
    Watch {
        /// Seconds between samples
        #[arg(short, long, default_value = "1")]
        interval: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise the config's level, if the config parses.
    // Nothing can be logged yet, so a config error is reported after init.
    let configured = config_log_level(&cli.config);
    let level = configured.as_deref().unwrap_or("info");
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(format!("meshsplice_core={level},meshsplice={level}"))?,
    };

    let fmt_layer = tracing_subscriber::fmt::layer();

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer);

    // Optional file logging
    let _guard = if let Some(ref log_dir) = cli.log_dir {
        let file_appender = tracing_appender::rolling::daily(log_dir, "meshsplice.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false);
        registry.with(file_layer).init();
        Some(guard)
    } else {
        registry.init();
        None
    };

    if let Err(ref e) = configured {
        tracing::warn!(
            path = %cli.config.display(),
            error = %e,
            "config unreadable, logging at info"
        );
    }

    match cli.command {
        Commands::Init => cmd_init(&cli.config),
        Commands::Validate => cmd_validate(&cli.config),
        Commands::Replay { ref trace } => cmd_replay(&cli.config, trace),
        #[cfg(target_os = "linux")]
        Commands::Debug { ref action } => cmd_debug(&cli.config, action).await,
    }
}

fn cmd_init(config_path: &PathBuf) -> Result<()> {
    if config_path.exists() {
        anyhow::bail!("config file already exists: {}", config_path.display());
    }

    let config = Config::default_config();
    let yaml = serde_yaml::to_string(&config)?;
    std::fs::write(config_path, yaml)?;
    println!("Default config written to {}", config_path.display());
    Ok(())
}

fn cmd_validate(config_path: &PathBuf) -> Result<()> {
    let config = Config::load(config_path)?;
    println!("Configuration is valid.");
    println!("  Table capacity: {}", config.tables.capacity);
    println!("  Pin name: {}", config.tables.pin_name);
    println!("  Verbosity: {}", config.debug.verbosity.0);
    println!("  Pin dir: {}", config.bpf.pin_dir.display());
    Ok(())
}

/// Log level from the config file, or the default if there is none. Must not
/// log: it runs before the subscriber exists.
fn config_log_level(config_path: &Path) -> Result<String> {
    let config = if config_path.exists() {
        Config::load(config_path)?
    } else {
        Config::default_config()
    };
    Ok(config.general.log_level)
}

/// Load the config if present, otherwise run with defaults.
fn load_or_default(config_path: &PathBuf) -> Result<Config> {
    if config_path.exists() {
        Config::load(config_path)
    } else {
        tracing::debug!(path = %config_path.display(), "no config file, using defaults");
        Ok(Config::default_config())
    }
}

fn cmd_replay(config_path: &PathBuf, trace_path: &PathBuf) -> Result<()> {
    let config = load_or_default(config_path)?;
    let trace = Trace::load(trace_path)?;

    let registry: PinRegistry<SocketId> = PinRegistry::new();
    let tables = registry.load(&config.tables);
    tables.debug.set_verbosity(config.debug.verbosity);

    tracing::info!(
        events = trace.events.len(),
        capacity = config.tables.capacity,
        verbosity = config.debug.verbosity.0,
        "replaying trace"
    );

    let accel = Accelerator::new(tables, Arc::new(SimHost::new()));
    let report = trace.replay(&accel);

    print!("{}", serde_yaml::to_string(&report)?);
    println!(
        "\n{}/{} messages redirected.",
        report.redirected(),
        report.messages.len()
    );
    Ok(())
}

#[cfg(target_os = "linux")]
async fn cmd_debug(config_path: &PathBuf, action: &DebugAction) -> Result<()> {
    let config = load_or_default(config_path)?;
    let pin_dir = config.bpf.pin_dir.as_path();

    match *action {
        DebugAction::Level { level } => pinned::set_level(pin_dir, level),
        DebugAction::Stats => pinned::stats(pin_dir),
        DebugAction::Pairs => pinned::pairs(pin_dir),
        DebugAction::Watch { interval } => {
            pinned::watch(pin_dir, std::time::Duration::from_secs(interval.max(1))).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "meshsplice-cli-{}-{}.yaml",
            name,
            std::process::id()
        ));
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_log_level_defaults_without_config() {
        let path = std::env::temp_dir().join("meshsplice-cli-missing.yaml");
        assert_eq!(config_log_level(&path).unwrap(), "info");
    }

    #[test]
    fn test_log_level_from_config() {
        let path = temp_config("level", "general:\n  log_level: debug\n");
        let level = config_log_level(&path);
        std::fs::remove_file(&path).ok();
        assert_eq!(level.unwrap(), "debug");
    }

    #[test]
    fn test_log_level_reports_broken_config() {
        let path = temp_config("broken", "tables:\n  capacity: 0\n");
        let level = config_log_level(&path);
        std::fs::remove_file(&path).ok();
        assert!(level.is_err());
    }
}
