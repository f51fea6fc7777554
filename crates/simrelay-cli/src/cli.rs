use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use simrelay_core::{Action, FatalAction, RelayConfig, SeverityLevel};
use tracing_subscriber::filter::LevelFilter;

/// Log level options for CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// No logging output
    Off,
    /// Error messages only
    Error,
    /// Warnings and errors
    Warn,
    /// Informational messages
    Info,
    /// Debug messages
    Debug,
    /// Trace-level messages (most verbose)
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// What a fatal severity ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OnFatal {
    /// Print a banner and exit with status 1
    ExitProcess,
    /// Stop only the simulation and report it
    StopWorker,
}

impl From<OnFatal> for FatalAction {
    fn from(value: OnFatal) -> Self {
        match value {
            OnFatal::ExitProcess => FatalAction::ExitProcess,
            OnFatal::StopWorker => FatalAction::StopWorker,
        }
    }
}

/// A `<level>=<action>` override
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionOverride {
    pub level: SeverityLevel,
    pub action: Action,
}

impl FromStr for ActionOverride {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (level, action) = s
            .split_once('=')
            .ok_or_else(|| format!("expected <level>=<action>, got '{s}'"))?;
        Ok(Self {
            level: level.trim().parse()?,
            action: action.trim().parse()?,
        })
    }
}

#[derive(Debug, Parser)]
#[command(name = "simrelay")]
#[command(about = "simrelay - run a demo engine behind a console controller")]
#[command(version)]
pub struct Cli {
    /// Config file path (TOML)
    #[arg(short = 'C', long)]
    pub config: Option<PathBuf>,

    /// Simulator log file ("-" for stderr)
    #[arg(long)]
    pub log_file: Option<String>,

    /// Log prefix template (%t ticks, %i instruction pointer, %e level, %d device)
    #[arg(long)]
    pub log_prefix: Option<String>,

    /// Per-level action override, e.g. `panic=fatal` (repeatable)
    #[arg(long = "action", value_name = "LEVEL=ACTION")]
    pub actions: Vec<ActionOverride>,

    /// Run without asking anything; panics become fatal unless overridden
    #[arg(long)]
    pub non_interactive: bool,

    /// Offer the debugger choice on severity asks
    #[arg(long)]
    pub debugger: bool,

    /// What a fatal severity ends
    #[arg(long, value_enum)]
    pub on_fatal: Option<OnFatal>,

    /// Number of ticks the demo engine runs
    #[arg(long, default_value = "200")]
    pub ticks: u64,

    /// Raise a PANIC at this tick
    #[arg(long)]
    pub panic_at: Option<u64>,

    /// Ask for a new boot device at this tick
    #[arg(long)]
    pub ask_at: Option<u64>,

    /// Milliseconds each demo tick takes
    #[arg(long, default_value = "5")]
    pub tick_ms: u64,

    /// Request a stop after this many milliseconds
    #[arg(long)]
    pub stop_after_ms: Option<u64>,

    /// Set log level (off, error, warn, info, debug, trace)
    #[arg(short = 'l', long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Enable verbose logging (shortcut for --log-level=debug)
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Diagnostic level for the tracing subscriber
    pub fn level_filter(&self) -> LevelFilter {
        match (self.log_level, self.verbose) {
            (Some(level), _) => level.into(),
            (None, true) => LevelFilter::DEBUG,
            (None, false) => LevelFilter::WARN,
        }
    }

    /// Load the config file (or defaults) and layer the flags on top
    pub fn relay_config(&self) -> anyhow::Result<RelayConfig> {
        let mut config = match &self.config {
            Some(path) => RelayConfig::load(path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None => RelayConfig::default(),
        };
        self.apply(&mut config);
        config.validate().context("invalid configuration")?;
        Ok(config)
    }

    fn apply(&self, config: &mut RelayConfig) {
        if self.non_interactive {
            config.interactive = false;
        }
        if self.debugger {
            config.debugger = true;
        }
        if let Some(on_fatal) = self.on_fatal {
            config.on_fatal = on_fatal.into();
        }
        if let Some(file) = &self.log_file {
            config.log.file = file.clone();
        }
        if let Some(prefix) = &self.log_prefix {
            config.log.prefix = prefix.clone();
        }
        for o in &self.actions {
            config.log.actions.set(o.level, o.action);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["simrelay"]).unwrap();
        assert_eq!(cli.ticks, 200);
        assert!(cli.actions.is_empty());
        assert_eq!(cli.level_filter(), LevelFilter::WARN);

        let config = cli.relay_config().unwrap();
        assert_eq!(config, RelayConfig::default());
    }

    #[test]
    fn test_action_overrides() {
        let cli = Cli::try_parse_from([
            "simrelay",
            "--action",
            "panic=fatal",
            "--action",
            "debug=report",
        ])
        .unwrap();
        let config = cli.relay_config().unwrap();
        assert_eq!(config.log.actions.panic, Some(Action::Fatal));
        assert_eq!(config.log.actions.debug, Some(Action::Report));
    }

    #[test]
    fn test_bad_action_is_rejected() {
        assert!(Cli::try_parse_from(["simrelay", "--action", "panic"]).is_err());
        assert!(Cli::try_parse_from(["simrelay", "--action", "loud=ask"]).is_err());
    }

    #[test]
    fn test_flags_override_config_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("relay.toml");
        std::fs::write(&path, "on_fatal = \"exit-process\"\n[log]\nprefix = \"%e%d\"\n").unwrap();

        let cli = Cli::try_parse_from([
            "simrelay",
            "--config",
            path.to_str().unwrap(),
            "--on-fatal",
            "stop-worker",
            "--non-interactive",
            "-v",
        ])
        .unwrap();
        let config = cli.relay_config().unwrap();
        assert_eq!(config.on_fatal, FatalAction::StopWorker);
        assert!(!config.interactive);
        assert_eq!(config.log.prefix, "%e%d");
        assert_eq!(cli.level_filter(), LevelFilter::DEBUG);
    }

    #[test]
    fn test_empty_prefix_is_invalid() {
        let cli = Cli::try_parse_from(["simrelay", "--log-prefix", ""]).unwrap();
        assert!(cli.relay_config().is_err());
    }
}
