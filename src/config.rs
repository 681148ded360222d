//! Coordinator configuration.
//!
//! Handles loading, validating, and merging `cms-rebuild.toml`. Stock
//! defaults are the base layer; the user file only needs the keys it wants
//! to change. A missing file means "run with defaults".
//!
//! ## Configuration Options
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:3001"       # Address for the HTTP API
//! serve_site = true             # Serve the published site at /
//!
//! [paths]
//! export_dir = "site/src/data"  # Where artifact JSON files are written
//! snapshot_file = "data/cms-snapshot.json"
//! site_dir = "site"             # Downstream static-site project
//! site_output = "dist"          # Build output, relative to site_dir
//! publish_dir = "public"        # Directory served to visitors
//!
//! [build]
//! install_command = "npm install"
//! build_command = "npm run build"
//! dependency_dir = "node_modules"
//! timeout_secs = 600
//! requeue_delay_ms = 1000
//! queue_policy = "coalesce"     # or "reject"
//! ```
//!
//! Relative paths are resolved against the directory containing the config
//! file. Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Coordinator configuration loaded from `cms-rebuild.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP listener settings.
    pub server: ServerConfig,
    /// Filesystem layout.
    pub paths: PathsConfig,
    /// External commands and sequencing.
    pub build: BuildConfig,
}

impl Config {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.bind.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::Validation(format!(
                "server.bind must be a socket address, got '{}'",
                self.server.bind
            )));
        }
        if self.build.build_command.trim().is_empty() {
            return Err(ConfigError::Validation(
                "build.build_command must not be empty".into(),
            ));
        }
        if self.build.install_command.trim().is_empty() {
            return Err(ConfigError::Validation(
                "build.install_command must not be empty".into(),
            ));
        }
        if self.build.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "build.timeout_secs must be non-zero".into(),
            ));
        }
        if self.paths.publish_dir.file_name().is_none() {
            return Err(ConfigError::Validation(
                "paths.publish_dir must name a directory".into(),
            ));
        }
        Ok(())
    }

    /// Resolve every relative path against `base`.
    ///
    /// `site_output` stays relative to `site_dir` unless it is absolute.
    pub fn resolve_paths(mut self, base: &Path) -> Self {
        let p = &mut self.paths;
        p.export_dir = absolutize(base, &p.export_dir);
        p.snapshot_file = absolutize(base, &p.snapshot_file);
        p.site_dir = absolutize(base, &p.site_dir);
        p.publish_dir = absolutize(base, &p.publish_dir);
        self
    }
}

fn absolutize(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Socket address for the HTTP API.
    pub bind: String,
    /// Serve `paths.publish_dir` as static files on the same listener.
    pub serve_site: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3001".to_string(),
            serve_site: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    /// Directory receiving one JSON artifact per data category.
    pub export_dir: PathBuf,
    /// Consolidated copy of the last payload.
    pub snapshot_file: PathBuf,
    /// Root of the downstream static-site project.
    pub site_dir: PathBuf,
    /// Build output directory, relative to `site_dir`.
    pub site_output: PathBuf,
    /// Directory served to visitors; replaced on every successful build.
    pub publish_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            export_dir: PathBuf::from("site/src/data"),
            snapshot_file: PathBuf::from("data/cms-snapshot.json"),
            site_dir: PathBuf::from("site"),
            site_output: PathBuf::from("dist"),
            publish_dir: PathBuf::from("public"),
        }
    }
}

impl PathsConfig {
    /// Absolute location of the downstream build output.
    pub fn build_output(&self) -> PathBuf {
        absolutize(&self.site_dir, &self.site_output)
    }
}

/// How the coordinator treats requests that arrive during a build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueuePolicy {
    /// Fold all overlapping requests into one follow-up build.
    #[default]
    Coalesce,
    /// Answer overlapping requests with a conflict.
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Shell command installing the site's dependencies.
    pub install_command: String,
    /// Shell command producing `paths.site_output`.
    pub build_command: String,
    /// Directory (relative to `site_dir`) whose presence means "installed".
    pub dependency_dir: PathBuf,
    /// Upper bound for each install or build command.
    pub timeout_secs: u64,
    /// Pause before an owed follow-up build starts.
    pub requeue_delay_ms: u64,
    pub queue_policy: QueuePolicy,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            install_command: "npm install".to_string(),
            build_command: "npm run build".to_string(),
            dependency_dir: PathBuf::from("node_modules"),
            timeout_secs: 600,
            requeue_delay_ms: 1000,
            queue_policy: QueuePolicy::Coalesce,
        }
    }
}

impl BuildConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn requeue_delay(&self) -> Duration {
        Duration::from_millis(self.requeue_delay_ms)
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(Config::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load the config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto the stock defaults, then deserialize and
/// validate.
pub fn resolve_config(overlay: Option<toml::Value>) -> Result<Config, ConfigError> {
    let base = stock_defaults_value()?;
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: Config = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load, validate, and resolve the config at `path`.
///
/// Relative paths inside the file are anchored at the file's directory.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let config = resolve_config(load_raw_config(path)?)?;
    let base = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => std::env::current_dir()?,
    };
    Ok(config.resolve_paths(&base))
}

/// Returns a fully-commented stock config with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# cms-rebuild configuration
# =========================
# All settings are optional. Values shown below are the defaults.
# Relative paths are resolved against the directory holding this file.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# HTTP API
# ---------------------------------------------------------------------------
[server]
# Address the API listens on.
bind = "127.0.0.1:3001"

# Also serve the published site (paths.publish_dir) at "/".
serve_site = true

# ---------------------------------------------------------------------------
# Filesystem layout
# ---------------------------------------------------------------------------
[paths]
# One JSON file per CMS category is written here on every build:
# pages.json, blog-articles.json, cat-rows.json, settings.json
export_dir = "site/src/data"

# Last full payload. Requests without data fall back to it.
snapshot_file = "data/cms-snapshot.json"

# The downstream static-site project that gets rebuilt.
site_dir = "site"

# Where the build command writes its output, relative to site_dir.
site_output = "dist"

# Directory served to visitors. Replaced wholesale after each successful build.
publish_dir = "public"

# ---------------------------------------------------------------------------
# Build commands and sequencing
# ---------------------------------------------------------------------------
[build]
# Run in site_dir when dependency_dir is missing or package.json changed.
install_command = "npm install"

# Run in site_dir to produce site_output.
build_command = "npm run build"

# Presence of this directory (relative to site_dir) means "installed".
dependency_dir = "node_modules"

# Each command is killed after this many seconds.
timeout_secs = 600

# Pause before the owed follow-up build starts.
requeue_delay_ms = 1000

# What to do with requests that arrive while a build runs:
#   "coalesce" - answer 202 and run one follow-up build afterwards
#   "reject"   - answer 409
queue_policy = "coalesce"
"##
}
