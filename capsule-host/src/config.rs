//! Configuration file loading and management
//!
//! This module handles loading and parsing the host configuration from
//! `$XDG_CONFIG_HOME/capsule/config.toml`. If the configuration file doesn't
//! exist, a default configuration is created with documented comments.

use anyhow::{Context, Result};
use capsule_runtime::{Rights, SuffixRules};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main host configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Unit roots, preloads and artifact suffixes
    #[serde(default)]
    pub loader: LoaderConfig,
    /// Rights granted to every root handle
    #[serde(default)]
    pub rights: RightsConfig,
    /// Restricted-mode sequence settings
    #[serde(default)]
    pub restrict: RestrictConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Loader configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LoaderConfig {
    /// Root directories searched for units, in order
    #[serde(default)]
    pub roots: Vec<PathBuf>,
    /// Units imported through the ambient chain before installation
    #[serde(default)]
    pub preload: Vec<String>,
    /// Artifact suffixes and the container initializer stem
    #[serde(flatten)]
    pub suffixes: SuffixRules,
}

/// Rights configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RightsConfig {
    /// Names of the rights left on root handles
    /// Default: every right needed to load all artifact kinds
    pub granted: Vec<String>,
}

/// Restricted-mode configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RestrictConfig {
    /// Environment variable that, when set, skips the whole sequence
    /// Default: "CAPSULE_UNRESTRICT"
    pub skip_env: String,
    /// Units evicted from the registry after entering restricted mode
    #[serde(default)]
    pub evict_after: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    /// Default: "info"
    pub level: String,
}

impl Default for RightsConfig {
    fn default() -> Self {
        let mut granted: Vec<String> = Rights::loader_default()
            .iter()
            .map(|r| r.as_str().to_string())
            .collect();
        granted.sort();
        Self { granted }
    }
}

impl Default for RestrictConfig {
    fn default() -> Self {
        Self {
            skip_env: "CAPSULE_UNRESTRICT".to_string(),
            evict_after: Vec::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl RightsConfig {
    /// The configured rights as a set.
    pub fn to_rights(&self) -> Rights {
        Rights::from_strings(&self.granted)
    }
}

impl Config {
    /// Load configuration from the specified path
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the default XDG config location
    ///
    /// If the configuration file doesn't exist, creates a default configuration
    /// file with documented comments.
    pub fn load_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if !config_path.exists() {
            Self::create_default_file(&config_path)?;
        }

        Self::load(&config_path)
    }

    /// Get the default configuration file path
    ///
    /// Returns `$XDG_CONFIG_HOME/capsule/config.toml`
    pub fn default_config_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("", "raibid-labs", "capsule")
            .context("Failed to determine project directories")?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    fn create_default_file(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, Self::default_config_content())
            .with_context(|| format!("Failed to write default config file: {}", path.display()))?;

        tracing::info!("Created default configuration file at: {}", path.display());
        Ok(())
    }

    /// Generate the default configuration file content with comments
    fn default_config_content() -> String {
        r#"# Capsule Host Configuration
# This file configures how units are found and loaded after the host
# enters restricted mode.

[loader]
# Root directories searched for units, in order. The first root with any
# matching artifact wins.
roots = []

# Units imported before restricted mode is entered, so their own
# dependencies are loaded while path-based access still works.
preload = []

# Artifact suffixes, probed in this order: native, source, compiled.
native = [".so"]
source = [".src"]
compiled = [".cache"]

# File stem of a container's initializer (pkg/__init__.src)
initializer = "__init__"

[rights]
# Rights left on every root handle.
# Available: read, lookup, fstat, seek, mmap, mmap_rx, fcntl, fstatfs, ioctl
granted = ["fcntl", "fstat", "fstatfs", "lookup", "mmap", "mmap_rx", "read", "seek"]

[restrict]
# When this environment variable is set, the host stays unrestricted.
skip_env = "CAPSULE_UNRESTRICT"

# Units dropped from the registry once restricted mode is entered.
# evict_after = ["bootstrap"]

[logging]
# Log level: trace, debug, info, warn, error
# Default: "info"
level = "info"
"#
        .to_string()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.as_str()) {
            anyhow::bail!(
                "Invalid logging.level: {}. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            );
        }

        let rules = &self.loader.suffixes;
        if rules.source.is_empty() {
            anyhow::bail!("loader.source must list at least one suffix");
        }
        for suffix in rules.native.iter().chain(&rules.source).chain(&rules.compiled) {
            if suffix.len() < 2 || !suffix.starts_with('.') || suffix.contains('/') {
                anyhow::bail!("Invalid suffix '{}': must be '.' followed by a name", suffix);
            }
        }

        if rules.initializer.is_empty() || rules.initializer.contains(['/', '.']) {
            anyhow::bail!("Invalid loader.initializer: '{}'", rules.initializer);
        }

        for name in self.loader.preload.iter().chain(&self.restrict.evict_after) {
            if name.is_empty() || name.split('.').any(str::is_empty) {
                anyhow::bail!("Invalid unit name in configuration: '{}'", name);
            }
        }

        if self.rights.granted.iter().any(|r| r.trim().is_empty()) {
            anyhow::bail!("rights.granted must not contain empty names");
        }

        if self.restrict.skip_env.is_empty() {
            anyhow::bail!("restrict.skip_env must not be empty");
        }

        Ok(())
    }
}
