//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/tokenledger/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/tokenledger/` (~/.config/tokenledger/)
//! - State/Logs: `$XDG_STATE_HOME/tokenledger/` (~/.local/state/tokenledger/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Returns a best-effort home directory path.
pub(crate) fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Context budget the percentages are computed against
    #[serde(default)]
    pub budget: BudgetConfig,

    /// Transcript location overrides
    #[serde(default)]
    pub sources: SourcesConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Context budget configuration
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct BudgetConfig {
    /// Cumulative context tokens the agent allows before it compacts the
    /// conversation
    #[serde(default = "default_context_tokens")]
    pub context_tokens: u64,

    /// Full context window of the backing model
    #[serde(default = "default_context_window")]
    pub context_window: u64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            context_tokens: default_context_tokens(),
            context_window: default_context_window(),
        }
    }
}

fn default_context_tokens() -> u64 {
    165_000
}

fn default_context_window() -> u64 {
    200_000
}

/// Override paths for transcript sources
#[derive(Debug, Deserialize, Default, Clone)]
pub struct SourcesConfig {
    /// Override path for the agent data root (defaults to `~/.claude`)
    pub claude_root: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the analysis cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.budget.context_tokens == 0 {
            return Err(Error::Budget(
                "budget.context_tokens must be greater than zero".to_string(),
            ));
        }
        if self.budget.context_window < self.budget.context_tokens {
            return Err(Error::Config(
                "budget.context_window must not be smaller than budget.context_tokens".to_string(),
            ));
        }
        Ok(())
    }

    /// Root of the agent's data directory (`~/.claude` unless overridden).
    pub fn claude_root(&self) -> PathBuf {
        self.sources
            .claude_root
            .clone()
            .unwrap_or_else(|| home_dir().join(".claude"))
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/tokenledger/config.toml` (~/.config/tokenledger/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("tokenledger").join("config.toml")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/tokenledger/` (~/.local/state/tokenledger/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("tokenledger")
    }

    /// Returns the log file path
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("tokenledger.log")
    }
}
