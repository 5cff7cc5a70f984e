//! Watch targets: one monitored file tree each

use crate::config::{IgnoreConfig, NudgeConfig, TargetConfig};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Name of a watch target, as written in the `[targets]` table
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchTargetId(Arc<str>);

impl WatchTargetId {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WatchTargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WatchTargetId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// An immutable, fully resolved watch target
#[derive(Debug, Clone)]
pub struct WatchTarget {
    pub id: WatchTargetId,
    pub root: PathBuf,
    pub poll_interval: Duration,
    pub stability_threshold: Duration,
    pub agent_type: String,
    /// Use a polling backend instead of native OS notifications
    pub polling: bool,
    pub ignore: IgnoreConfig,
}

impl WatchTarget {
    pub fn from_config(name: &str, config: &TargetConfig) -> Self {
        Self {
            id: WatchTargetId::new(name),
            root: config.root.clone(),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            stability_threshold: Duration::from_millis(config.stability_threshold_ms),
            agent_type: config.agent_type.clone(),
            polling: config.polling,
            ignore: config.ignore.clone(),
        }
    }

    /// Build every target declared in the configuration, in name order
    pub fn all_from(config: &NudgeConfig) -> Vec<WatchTarget> {
        config
            .targets
            .iter()
            .map(|(name, target)| Self::from_config(name, target))
            .collect()
    }

    /// Path relative to the target root, if it lives under it
    pub fn relative<'a>(&self, path: &'a Path) -> Option<&'a Path> {
        path.strip_prefix(&self.root).ok()
    }
}
