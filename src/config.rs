//! Run settings, layered as defaults < TOML settings file < command line.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::Deserialize;

use crate::cascade::Mode;
use crate::cli::Cli;
use crate::scanner::Filters;
use crate::utils::parse_size;

pub const DEFAULT_MIN_SIZE: u64 = 3 * 1024;
pub const DEFAULT_MAX_SIZE: u64 = 300 * 1024 * 1024;

/// Size written either as a byte count or as a string like `"64K"`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SizeSetting {
    Bytes(u64),
    Text(String),
}

impl SizeSetting {
    fn to_bytes(&self) -> Result<u64> {
        match self {
            SizeSetting::Bytes(bytes) => Ok(*bytes),
            SizeSetting::Text(text) => parse_size(text),
        }
    }
}

/// Contents of a settings file. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileSettings {
    pub mode: Option<Mode>,
    pub min_size: Option<SizeSetting>,
    pub max_size: Option<SizeSetting>,
    pub extensions: Option<Vec<String>>,
    pub threads: Option<usize>,
    pub stats: Option<bool>,
}

impl FileSettings {
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid settings file")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file '{}'", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("In '{}'", path.display()))
    }

    /// Settings file in the current directory, named after the package.
    pub fn default_path() -> Result<PathBuf> {
        Ok(std::env::current_dir()
            .context("Failed to get current directory")?
            .join(format!("{}.toml", env!("CARGO_PKG_NAME"))))
    }

    /// Loads the implicit settings file at `path`. A missing file means
    /// defaults; a broken one is logged and ignored.
    pub fn load_default(path: &Path) -> Self {
        if !path.exists() {
            debug!("No settings file at {}, using defaults", path.display());
            return Self::default();
        }
        match Self::load(path) {
            Ok(settings) => {
                info!("Using settings file {}", path.display());
                settings
            }
            Err(e) => {
                warn!("Ignoring settings file: {:#}", e);
                Self::default()
            }
        }
    }
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub root: PathBuf,
    pub mode: Mode,
    pub filters: Filters,
    pub threads: Option<usize>,
    pub find_duplicates: bool,
    pub stats: bool,
    pub json: bool,
}

impl Settings {
    /// Loads the settings file named on the command line, or the default one
    /// if it exists, and applies the command line on top.
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let file = match &cli.config {
            Some(path) => {
                info!("Using settings file {}", path.display());
                FileSettings::load(path)?
            }
            None => FileSettings::load_default(&FileSettings::default_path()?),
        };
        Self::merge(cli, file)
    }

    pub fn merge(cli: &Cli, file: FileSettings) -> Result<Self> {
        let min_size = match (cli.min_size, &file.min_size) {
            (Some(size), _) => size,
            (None, Some(setting)) => setting.to_bytes().context("Invalid min_size")?,
            (None, None) => DEFAULT_MIN_SIZE,
        };
        let max_size = match (cli.max_size, &file.max_size) {
            (Some(size), _) => size,
            (None, Some(setting)) => setting.to_bytes().context("Invalid max_size")?,
            (None, None) => DEFAULT_MAX_SIZE,
        };
        let extensions = if cli.extensions.is_empty() {
            file.extensions.unwrap_or_default()
        } else {
            cli.extensions.clone()
        };

        Ok(Self {
            root: cli.path.clone(),
            mode: cli.mode().or(file.mode).unwrap_or_default(),
            filters: Filters {
                min_size: Some(min_size),
                max_size: Some(max_size),
                extensions: normalize_extensions(&extensions),
            },
            threads: cli.threads.or(file.threads),
            find_duplicates: cli.find,
            stats: !cli.no_stats && file.stats.unwrap_or(true),
            json: cli.json,
        })
    }
}

/// Adds the leading dot where missing and drops blanks and repeats, keeping
/// the first occurrence.
pub fn normalize_extensions(extensions: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::new();
    for ext in extensions {
        let ext = ext.trim();
        if ext.is_empty() || ext == "." {
            continue;
        }
        let ext = if ext.starts_with('.') {
            ext.to_string()
        } else {
            format!(".{ext}")
        };
        if !normalized.iter().any(|seen| seen.eq_ignore_ascii_case(&ext)) {
            normalized.push(ext);
        }
    }
    normalized
}
