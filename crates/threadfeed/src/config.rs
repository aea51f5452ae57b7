//! Configuration loading.
//!
//! Layered with the `config` crate: built-in defaults, then the TOML file,
//! then `THREADFEED__*` environment variables (`__` separates nesting, e.g.
//! `THREADFEED__FEED__MAX_ITEMS=200`).

use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use config::{Config, Environment, File, FileFormat};
use log::info;
use serde::{Deserialize, Serialize};

use crate::ids::{SystemClock, UuidIds};
use crate::reducer::DEFAULT_PREVIEW_CHARS;
use crate::session::{DEFAULT_MAX_ITEMS, RegistryOptions};

pub const APP_NAME: &str = "threadfeed";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub feed: FeedConfig,
    pub paths: PathsConfig,
    pub transcripts: TranscriptsConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            feed: FeedConfig::default(),
            paths: PathsConfig::default(),
            transcripts: TranscriptsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Also append logs to this file.
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// Feed reconstruction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Maximum items kept in a live feed; 0 keeps everything.
    pub max_items: usize,
    /// Characters of payload shown for unhandled stream parts.
    pub unknown_preview_chars: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            max_items: DEFAULT_MAX_ITEMS,
            unknown_preview_chars: DEFAULT_PREVIEW_CHARS,
        }
    }
}

impl FeedConfig {
    /// Session options using real ids and wall-clock time.
    pub fn registry_options(&self) -> RegistryOptions {
        RegistryOptions {
            ids: Arc::new(UuidIds),
            clock: Arc::new(SystemClock),
            max_items: self.max_items,
            preview_chars: self.unknown_preview_chars,
            tool_settled: None,
        }
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub data_dir: Option<String>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptsConfig {
    /// Defaults to `<data_dir>/transcripts`.
    pub dir: Option<String>,
}

/// Resolved on-disk locations.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_file: PathBuf,
    pub data_dir: PathBuf,
    pub transcripts_dir: PathBuf,
}

impl AppPaths {
    pub fn discover(override_path: Option<PathBuf>) -> Result<Self> {
        let config_file = match override_path {
            Some(path) => {
                let expanded = expand_path(path)?;
                if expanded.is_dir() {
                    expanded.join("config.toml")
                } else {
                    expanded
                }
            }
            None => default_config_dir()?.join("config.toml"),
        };

        if config_file.parent().is_none() {
            return Err(anyhow!("invalid config file path: {config_file:?}"));
        }

        let data_dir = default_data_dir()?;
        let transcripts_dir = data_dir.join("transcripts");

        Ok(Self {
            config_file,
            data_dir,
            transcripts_dir,
        })
    }

    pub fn apply_overrides(mut self, cfg: &AppConfig) -> Result<Self> {
        if let Some(ref data_override) = cfg.paths.data_dir {
            self.data_dir = expand_str_path(data_override)?;
            self.transcripts_dir = self.data_dir.join("transcripts");
        }
        if let Some(ref transcripts_override) = cfg.transcripts.dir {
            self.transcripts_dir = expand_str_path(transcripts_override)?;
        }
        Ok(self)
    }
}

impl fmt::Display for AppPaths {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "config: {}, data: {}, transcripts: {}",
            self.config_file.display(),
            self.data_dir.display(),
            self.transcripts_dir.display()
        )
    }
}

/// Load the layered configuration.
///
/// When `create_missing` is set and no config file exists yet, the defaults
/// are written there first.
pub fn load_config(config_file: &Path, create_missing: bool) -> Result<AppConfig> {
    if !config_file.exists() {
        if create_missing {
            write_default_config(config_file)?;
        } else {
            info!(
                "no config at {}, using defaults",
                config_file.display()
            );
        }
    }

    let env_prefix = env_prefix();
    let built = Config::builder()
        .set_default("logging.level", "info")?
        .set_default("feed.max_items", DEFAULT_MAX_ITEMS as i64)?
        .set_default("feed.unknown_preview_chars", DEFAULT_PREVIEW_CHARS as i64)?
        .add_source(
            File::from(config_file)
                .format(FileFormat::Toml)
                .required(false),
        )
        .add_source(Environment::with_prefix(env_prefix.as_str()).separator("__"))
        .build()
        .with_context(|| format!("loading config from {}", config_file.display()))?;

    let mut config: AppConfig = built
        .try_deserialize()
        .context("deserializing configuration")?;

    if let Some(ref file) = config.logging.file {
        let expanded = expand_str_path(file)?;
        config.logging.file = Some(expanded.display().to_string());
    }

    Ok(config)
}

pub fn write_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating config directory {parent:?}"))?;
    }

    let config = AppConfig::default();
    let toml = toml::to_string_pretty(&config).context("serializing default config to TOML")?;
    let mut body = default_config_header(path);
    body.push_str(&toml);
    fs::write(path, body).with_context(|| format!("writing config file to {}", path.display()))
}

fn default_config_header(path: &Path) -> String {
    format!(
        "# Configuration for {APP_NAME}\n# File: {}\n\n",
        path.display()
    )
}

pub fn expand_path(path: PathBuf) -> Result<PathBuf> {
    if let Some(text) = path.to_str() {
        expand_str_path(text)
    } else {
        Ok(path)
    }
}

pub fn expand_str_path(text: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(text).context("expanding path")?;
    Ok(PathBuf::from(expanded.to_string()))
}

fn default_config_dir() -> Result<PathBuf> {
    if let Some(dir) = env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir).join(APP_NAME));
    }

    if let Some(mut dir) = dirs::config_dir() {
        dir.push(APP_NAME);
        return Ok(dir);
    }

    dirs::home_dir()
        .map(|home| home.join(".config").join(APP_NAME))
        .ok_or_else(|| anyhow!("unable to determine configuration directory"))
}

fn default_data_dir() -> Result<PathBuf> {
    if let Some(dir) = env::var_os("XDG_DATA_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir).join(APP_NAME));
    }

    if let Some(mut dir) = dirs::data_dir() {
        dir.push(APP_NAME);
        return Ok(dir);
    }

    dirs::home_dir()
        .map(|home| home.join(".local").join("share").join(APP_NAME))
        .ok_or_else(|| anyhow!("unable to determine data directory"))
}

/// `THREADFEED`, used as `THREADFEED__SECTION__KEY`.
pub fn env_prefix() -> String {
    APP_NAME
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}
