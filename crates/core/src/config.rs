//! Daemon configuration
//!
//! Loaded from `<config_dir>/nudge/config.toml` unless a path is given
//! explicitly. Every value has a default so a partial file is valid, but the
//! daemon refuses to start without at least one target.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

const APP_DIR: &str = "nudge";
const CONFIG_FILE: &str = "config.toml";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine the user configuration directory")]
    NoConfigDir,

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NudgeConfig {
    /// Maximum number of tasks processed at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// How long a worker waits for one agent session
    #[serde(default = "default_agent_timeout_secs")]
    pub agent_timeout_secs: u64,

    /// How long shutdown waits for active tasks
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,

    /// Directory for rolling daemon logs (stderr only when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,

    /// Watched trees, keyed by target name
    #[serde(default)]
    pub targets: BTreeMap<String, TargetConfig>,

    /// Agent commands, keyed by agent type
    #[serde(default)]
    pub agents: BTreeMap<String, AgentCommandConfig>,
}

impl Default for NudgeConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            agent_timeout_secs: default_agent_timeout_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            log_dir: None,
            targets: BTreeMap::new(),
            agents: BTreeMap::new(),
        }
    }
}

/// One watched file tree
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TargetConfig {
    pub root: PathBuf,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Quiet period after the last edit before a file is processed
    #[serde(default = "default_stability_threshold_ms")]
    pub stability_threshold_ms: u64,

    pub agent_type: String,

    /// Poll the tree instead of using native notifications
    #[serde(default)]
    pub polling: bool,

    #[serde(default)]
    pub ignore: IgnoreConfig,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            poll_interval_ms: default_poll_interval_ms(),
            stability_threshold_ms: default_stability_threshold_ms(),
            agent_type: "aider".to_string(),
            polling: false,
            ignore: IgnoreConfig::default(),
        }
    }
}

/// Ignore configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IgnoreConfig {
    /// Use .gitignore patterns (default: true)
    #[serde(default = "default_true")]
    pub use_gitignore: bool,

    /// Use .nudgeignore patterns (default: true)
    #[serde(default = "default_true")]
    pub use_nudgeignore: bool,

    /// Additional gitignore-style patterns
    #[serde(default)]
    pub additional_patterns: Vec<String>,
}

impl Default for IgnoreConfig {
    fn default() -> Self {
        Self {
            use_gitignore: true,
            use_nudgeignore: true,
            additional_patterns: vec![],
        }
    }
}

/// External command backing an agent type
///
/// `args` may contain `{file}`, `{prompt}` and `{prompt_file}` placeholders.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentCommandConfig {
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Pipe the instruction payload on stdin
    #[serde(default)]
    pub stdin: bool,

    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

fn default_concurrency() -> usize {
    1
}

fn default_agent_timeout_secs() -> u64 {
    600
}

fn default_shutdown_grace_secs() -> u64 {
    10
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_stability_threshold_ms() -> u64 {
    2000
}

fn default_true() -> bool {
    true
}

impl NudgeConfig {
    /// Check value ranges and cross references
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=64).contains(&self.concurrency) {
            return Err(ConfigError::Invalid(format!(
                "concurrency must be between 1 and 64 (got {})",
                self.concurrency
            )));
        }

        if !(1..=86_400).contains(&self.agent_timeout_secs) {
            return Err(ConfigError::Invalid(format!(
                "agent_timeout_secs must be between 1 and 86400 (got {})",
                self.agent_timeout_secs
            )));
        }

        if self.shutdown_grace_secs > 3600 {
            return Err(ConfigError::Invalid(format!(
                "shutdown_grace_secs must be at most 3600 (got {})",
                self.shutdown_grace_secs
            )));
        }

        for (name, target) in &self.targets {
            if !target.root.is_absolute() {
                return Err(ConfigError::Invalid(format!(
                    "targets.{}.root must be an absolute path (got {})",
                    name,
                    target.root.display()
                )));
            }

            if !(10..=60_000).contains(&target.poll_interval_ms) {
                return Err(ConfigError::Invalid(format!(
                    "targets.{}.poll_interval_ms must be between 10 and 60000 (got {})",
                    name, target.poll_interval_ms
                )));
            }

            if target.stability_threshold_ms > 600_000 {
                return Err(ConfigError::Invalid(format!(
                    "targets.{}.stability_threshold_ms must be at most 600000 (got {})",
                    name, target.stability_threshold_ms
                )));
            }

            if !self.agents.contains_key(&target.agent_type) {
                return Err(ConfigError::Invalid(format!(
                    "targets.{}.agent_type '{}' has no [agents.{}] entry",
                    name, target.agent_type, target.agent_type
                )));
            }
        }

        for (name, agent) in &self.agents {
            if agent.command.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "agents.{}.command must not be empty",
                    name
                )));
            }
        }

        Ok(())
    }

    /// Parse configuration text; `path` is only used in error messages
    pub fn from_toml(text: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Default location of the config file
pub fn config_file_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
}

/// Directory for the daemon lock and background logs
pub fn state_dir() -> Option<PathBuf> {
    dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .map(|dir| dir.join(APP_DIR))
}

/// Load and validate configuration from `path`
pub fn load(path: &Path) -> Result<NudgeConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let config = NudgeConfig::from_toml(&text, path)?;
    config.validate()?;
    Ok(config)
}

/// Load from `path`, or return defaults if the file does not exist
pub fn load_or_default(path: &Path) -> Result<NudgeConfig, ConfigError> {
    if path.exists() {
        load(path)
    } else {
        Ok(NudgeConfig::default())
    }
}

/// Write configuration to `path`, creating parent directories
pub fn save(config: &NudgeConfig, path: &Path) -> Result<(), ConfigError> {
    config.validate()?;
    let text = config.to_toml()?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    std::fs::write(path, text).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Create the config file with the commented example if it is missing
///
/// Returns true if a file was created.
pub fn init_if_missing(path: &Path) -> Result<bool, ConfigError> {
    if path.exists() {
        return Ok(false);
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    std::fs::write(path, example_config()).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(true)
}

/// Commented example configuration
pub fn example_config() -> &'static str {
    r#"# nudge configuration

# Maximum number of files processed at once (1-64)
concurrency = 2

# Seconds a worker waits for one agent session before giving up on it
agent_timeout_secs = 600

# Seconds shutdown waits for active tasks
shutdown_grace_secs = 10

# Uncomment to also write daily rolling logs
# log_dir = "/var/log/nudge"

[targets.app]
root = "/home/me/src/app"
poll_interval_ms = 100
stability_threshold_ms = 2000
agent_type = "aider"
polling = false

[targets.app.ignore]
use_gitignore = true
use_nudgeignore = true
additional_patterns = ["*.lock"]

[agents.aider]
command = "aider"
args = ["--yes-always", "--no-auto-commits", "--message-file", "{prompt_file}", "{file}"]
stdin = false
"#
}
