//! Relay configuration
//!
//! Loaded from TOML. Every field has a default, so an empty file is valid:
//!
//! ```toml
//! interactive = true
//! debugger = false
//! on_fatal = "exit-process"
//! forward_reports = false
//!
//! [log]
//! file = "-"
//! prefix = "%t%e%d"
//!
//! [log.actions]
//! panic = "ask"
//!
//! [controller]
//! dispatch_batch = 32
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::prefix::DEFAULT_PREFIX;
use crate::severity::{Action, ActionTable, FatalReason, SeverityLevel};

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// What happens when a device raises a fatal severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FatalAction {
    /// Print a banner and end the process with status 1 right where the
    /// fatal is raised
    ExitProcess,
    /// End only the worker and report the fatal in its exit
    ///
    /// A dump-core answer still aborts the process.
    StopWorker,
}

impl FatalAction {
    /// Whether a fatal for `reason` ends the whole process
    pub fn ends_process(self, reason: FatalReason) -> bool {
        self == FatalAction::ExitProcess || reason == FatalReason::DumpCore
    }
}

/// Top-level relay configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Whether a front end can answer asks
    pub interactive: bool,
    /// Whether the debug choice is offered on asks
    pub debugger: bool,
    pub on_fatal: FatalAction,
    /// Also deliver REPORT records to the controller as notifications
    pub forward_reports: bool,
    pub log: LogConfig,
    pub controller: ControllerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log file path; `-` is stderr
    pub file: String,
    /// Prefix template
    pub prefix: String,
    pub actions: LogActions,
}

/// Per-level action overrides; unset levels keep their defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogActions {
    pub debug: Option<Action>,
    pub info: Option<Action>,
    pub error: Option<Action>,
    pub panic: Option<Action>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Maximum events handled per dispatch pass
    pub dispatch_batch: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            interactive: true,
            debugger: false,
            on_fatal: FatalAction::ExitProcess,
            forward_reports: false,
            log: LogConfig::default(),
            controller: ControllerConfig::default(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file: "-".to_string(),
            prefix: DEFAULT_PREFIX.to_string(),
            actions: LogActions::default(),
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self { dispatch_batch: 32 }
    }
}

impl LogActions {
    /// Override for a level
    pub fn get(&self, level: SeverityLevel) -> Option<Action> {
        match level {
            SeverityLevel::Debug => self.debug,
            SeverityLevel::Info => self.info,
            SeverityLevel::Error => self.error,
            SeverityLevel::Panic => self.panic,
        }
    }

    /// Set the override for a level
    pub fn set(&mut self, level: SeverityLevel, action: Action) {
        let slot = match level {
            SeverityLevel::Debug => &mut self.debug,
            SeverityLevel::Info => &mut self.info,
            SeverityLevel::Error => &mut self.error,
            SeverityLevel::Panic => &mut self.panic,
        };
        *slot = Some(action);
    }
}

impl RelayConfig {
    /// Defaults for running without a front end
    pub fn non_interactive() -> Self {
        Self {
            interactive: false,
            ..Self::default()
        }
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.controller.dispatch_batch == 0 {
            return Err(ConfigError::Invalid(
                "controller.dispatch_batch must be at least 1".to_string(),
            ));
        }
        if self.log.prefix.is_empty() {
            return Err(ConfigError::Invalid("log.prefix must not be empty".to_string()));
        }
        Ok(())
    }

    /// Action table with the defaults and then the overrides applied
    pub fn action_table(&self) -> ActionTable {
        let table = ActionTable::defaults(self.interactive);
        for level in SeverityLevel::ALL {
            if let Some(action) = self.log.actions.get(level) {
                table.set(level, action);
            }
        }
        table
    }
}
