//! Session configuration
//!
//! The session reads a fresh [`LivePatchConfig`] snapshot from its
//! [`ConfigSource`] on every tick, so hosts can change settings while a
//! session runs.

use livepatch_compile::CompileOptions;
use livepatch_watch::PathFilter;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        /// Config path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// File is not valid TOML for this schema
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Live patch settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LivePatchConfig {
    /// Root-relative path prefixes to watch
    pub include_prefixes: Vec<String>,
    /// Root-relative path prefixes to ignore
    pub exclude_prefixes: Vec<String>,
    /// Source file extensions; empty accepts any file
    pub source_extensions: Vec<String>,
    /// Modules compiled against and searched for originals; empty means all
    pub included_modules: Vec<String>,
    /// Compile and patch automatically when changes settle
    pub auto_apply: bool,
    /// Quiet period before a batch is released
    pub debounce_ms: u64,
    /// Check the environment on session entry
    pub check_environment_health: bool,
    /// Compiler settings
    pub compile: CompileOptions,
}

impl Default for LivePatchConfig {
    fn default() -> Self {
        Self {
            include_prefixes: vec!["src/".to_string()],
            exclude_prefixes: vec!["target/".to_string(), ".git/".to_string()],
            source_extensions: vec!["src".to_string()],
            included_modules: Vec::new(),
            auto_apply: true,
            debounce_ms: 500,
            check_environment_health: true,
            compile: CompileOptions::default(),
        }
    }
}

impl LivePatchConfig {
    /// Default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse TOML; missing keys take their defaults
    ///
    /// # Errors
    /// Returns error if the text is not valid TOML for this schema.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load a TOML file
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Set auto-apply
    #[inline]
    #[must_use]
    pub fn with_auto_apply(mut self, auto_apply: bool) -> Self {
        self.auto_apply = auto_apply;
        self
    }

    /// Set the debounce interval in milliseconds
    #[inline]
    #[must_use]
    pub fn with_debounce_ms(mut self, debounce_ms: u64) -> Self {
        self.debounce_ms = debounce_ms;
        self
    }

    /// Set the include prefixes
    #[must_use]
    pub fn with_include_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include_prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }

    /// Path filter for the change aggregator
    #[must_use]
    pub fn path_filter(&self) -> PathFilter {
        PathFilter::new(self.include_prefixes.iter().cloned(), self.exclude_prefixes.iter().cloned())
            .with_extensions(self.source_extensions.iter().cloned())
    }

    /// Debounce interval
    #[inline]
    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Supplies configuration snapshots
pub trait ConfigSource: Send {
    /// Current settings
    fn snapshot(&self) -> LivePatchConfig;
}

impl ConfigSource for LivePatchConfig {
    fn snapshot(&self) -> LivePatchConfig {
        self.clone()
    }
}

/// Configuration shared between the host and a session
///
/// Clones share the same settings; updates are seen on the session's next
/// tick.
#[derive(Debug, Clone, Default)]
pub struct SharedConfig {
    inner: Arc<RwLock<LivePatchConfig>>,
}

impl SharedConfig {
    /// Share `config`
    #[must_use]
    pub fn new(config: LivePatchConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// Copy of the current settings
    #[must_use]
    pub fn get(&self) -> LivePatchConfig {
        self.inner.read().clone()
    }

    /// Modify the settings in place
    pub fn update(&self, f: impl FnOnce(&mut LivePatchConfig)) {
        f(&mut self.inner.write());
    }

    /// Toggle automatic compile-and-patch
    pub fn set_auto_apply(&self, auto_apply: bool) {
        self.update(|c| c.auto_apply = auto_apply);
    }
}

impl ConfigSource for SharedConfig {
    fn snapshot(&self) -> LivePatchConfig {
        self.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use livepatch_compile::OptimizationLevel;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = LivePatchConfig::from_toml_str(
            r#"
            auto_apply = false
            include_prefixes = ["game/"]

            [compile]
            optimization = "release"
            "#,
        )
        .unwrap();

        assert!(!config.auto_apply);
        assert_eq!(config.include_prefixes, vec!["game/"]);
        assert_eq!(config.debounce_ms, 500);
        assert_eq!(config.compile.optimization, OptimizationLevel::Release);
        assert!(config.compile.allow_unsafe);
    }

    #[test]
    fn bad_toml_is_an_error() {
        assert!(matches!(
            LivePatchConfig::from_toml_str("debounce_ms = \"soon\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn filter_follows_settings() {
        let config = LivePatchConfig::default();
        let filter = config.path_filter();
        assert!(filter.accepts("src/a.src"));
        assert!(!filter.accepts("src/a.txt"));
        assert!(!filter.accepts("target/a.src"));
        assert_eq!(config.debounce(), Duration::from_millis(500));
    }

    #[test]
    fn shared_config_updates_are_visible() {
        let shared = SharedConfig::new(LivePatchConfig::default());
        let handle = shared.clone();
        handle.set_auto_apply(false);
        assert!(!shared.snapshot().auto_apply);
    }
}
