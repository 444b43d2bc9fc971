//! stealwatch daemon entry point.
//!
//! Resolves configuration, optionally detaches, raises its own scheduling
//! priority, and runs the measurement loop until SIGINT or SIGTERM.

mod daemonize;
mod logging;
mod realtime;
mod signals;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use stealwatch_common::config::{
    resolve_config_path, MonitorConfig, CONFIG_ENV_VAR, SYSTEM_CONFIG_PATH,
};
use stealwatch_common::error::ExitStatus;
use stealwatch_core::control::ControlFlags;
use tracing::{error, info};

use crate::logging::{init_logging, LogSink};

/// stealwatchd command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "stealwatchd",
    about = "Reports missed wakeups and how much CPU the hypervisor stole",
    version,
    long_about = None
)]
struct Args {
    /// Maximum allowed gap between wakeups, in milliseconds (1..=3600000).
    #[arg(long, short = 't', value_name = "MS")]
    timeout: Option<u64>,

    /// Steal percentage above which a missed wakeup is blamed on the host.
    #[arg(long = "steal-threshold", short = 'm', value_name = "PERCENT")]
    steal_threshold: Option<f64>,

    /// More verbose logging; repeat for trace.
    #[arg(long, short = 'd', action = clap::ArgAction::Count)]
    debug: u8,

    /// Detach from the terminal and log to syslog.
    #[arg(long, short = 'D')]
    daemonize: bool,

    /// Stay in the foreground and log to stderr (overrides --daemonize).
    #[arg(long, short = 'f')]
    foreground: bool,

    /// Do not request SCHED_RR.
    #[arg(long = "no-priority", short = 'p')]
    no_priority: bool,

    /// Path to a configuration file (TOML).
    #[arg(long, short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitStatus::ConfigError.into()
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let (config, source) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("stealwatchd: {e:#}");
            return ExitStatus::ConfigError.into();
        }
    };
    let loop_config = match config.validate() {
        Ok(loop_config) => loop_config,
        Err(e) => {
            eprintln!("stealwatchd: {e}");
            return ExitStatus::ConfigError.into();
        }
    };

    let sink = if config.logging.daemonize {
        if let Err(e) = daemonize::daemonize() {
            eprintln!("stealwatchd: {e}");
            return ExitStatus::ConfigError.into();
        }
        LogSink::Syslog
    } else {
        LogSink::Stderr
    };
    init_logging(config.logging.level(), sink);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting stealwatchd");
    match &source {
        Some(path) => info!(path = %path.display(), "Configuration loaded"),
        None => info!("No config file found, using built-in defaults"),
    }
    info!(
        timeout_ms = loop_config.timeout_ms(),
        steal_threshold_percent = ?loop_config.steal_threshold_override(),
        ?sink,
        "Configuration"
    );

    realtime::init_realtime(config.realtime.lock_memory, loop_config.priority_elevation_enabled());

    let flags = Arc::new(ControlFlags::new());
    if let Err(e) = signals::install(Arc::clone(&flags)) {
        error!(error = %e, "Failed to set up signal handlers");
        return ExitStatus::ConfigError.into();
    }

    let status = stealwatch_core::run(&loop_config, flags);
    info!(code = status.code(), "stealwatchd exiting");
    status.into()
}

/// Load the configuration file, if any, and apply command-line overrides.
///
/// Resolution priority (first existing file wins):
/// 1. Command-line `--config` argument
/// 2. `STEALWATCH_CONFIG` environment variable
/// 3. `/etc/stealwatch/config.toml` (system path)
/// 4. Built-in defaults
fn load_config(args: &Args) -> Result<(MonitorConfig, Option<PathBuf>)> {
    let env_value = std::env::var(CONFIG_ENV_VAR).ok();
    let source = resolve_config_path(
        args.config.as_deref(),
        env_value.as_deref(),
        Path::new(SYSTEM_CONFIG_PATH),
    );

    let mut config = match &source {
        Some(path) => MonitorConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => MonitorConfig::default(),
    };
    apply_overrides(&mut config, args);
    Ok((config, source))
}

fn apply_overrides(config: &mut MonitorConfig, args: &Args) {
    if let Some(timeout_ms) = args.timeout {
        config.timeout = Duration::from_millis(timeout_ms);
    }
    if let Some(threshold) = args.steal_threshold {
        config.steal_threshold_percent = Some(threshold);
    }
    if args.debug > 0 {
        config.logging.verbosity = args.debug;
    }
    if args.daemonize {
        config.logging.daemonize = true;
    }
    if args.foreground {
        config.logging.daemonize = false;
    }
    if args.no_priority {
        config.realtime.set_priority = false;
    }
}
