//! Configuration structures for the mlib scanner.
//!
//! - [`ScanConfig`] - Scanner settings (worker count, media extensions, traversal)
//! - [`CliConfig`] - Command-line front end settings (status polling)
//! - [`Config`] - Root configuration combining all settings
//!
//! All configuration types implement [`Default`]. Files are JSON and may
//! omit any field; missing fields take their default value.

use std::fs;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Number of import workers used when nothing else is configured.
pub const DEFAULT_WORKER_COUNT: usize = 10;

/// Configuration for library scanning.
///
/// # Examples
///
/// ```
/// use mlib_core::ScanConfig;
///
/// let config = ScanConfig::default();
/// assert_eq!(config.worker_count, 10);
/// assert!(config.is_song_extension("mp3"));
/// assert!(config.is_image_extension("JPG"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Number of worker threads importing songs in parallel.
    pub worker_count: usize,

    /// File extensions treated as songs (without the leading dot).
    pub song_extensions: Vec<String>,

    /// File extensions treated as artwork images (without the leading dot).
    pub image_extensions: Vec<String>,

    /// Directory names skipped during traversal, in addition to hidden ones.
    pub skip_dirs: Vec<String>,

    /// Whether to follow symbolic links while walking folders.
    pub follow_links: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            song_extensions: ["mp3", "flac", "ogg", "m4a", "aac", "wav", "opus"]
                .map(str::to_owned)
                .to_vec(),
            image_extensions: ["jpg", "jpeg", "png", "gif"].map(str::to_owned).to_vec(),
            skip_dirs: Vec::new(),
            follow_links: false,
        }
    }
}

impl ScanConfig {
    /// Returns `true` if `ext` is a configured song extension (case-insensitive).
    #[must_use]
    pub fn is_song_extension(&self, ext: &str) -> bool {
        self.song_extensions
            .iter()
            .any(|known| known.eq_ignore_ascii_case(ext))
    }

    /// Returns `true` if `ext` is a configured image extension (case-insensitive).
    #[must_use]
    pub fn is_image_extension(&self, ext: &str) -> bool {
        self.image_extensions
            .iter()
            .any(|known| known.eq_ignore_ascii_case(ext))
    }
}

/// Configuration for the command-line front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// How often the running scan's status is polled, in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 250,
        }
    }
}

/// Root configuration for mlib.
///
/// # Examples
///
/// ```
/// use mlib_core::Config;
///
/// let config = Config::default();
/// assert!(config.validate().is_ok());
///
/// let json = serde_json::to_string_pretty(&config).unwrap();
/// assert!(json.contains("worker_count"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Scanner configuration.
    pub scan: ScanConfig,

    /// CLI configuration.
    pub cli: CliConfig,
}

impl Config {
    /// Loads and validates a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::NotFound`] if the file does not exist
    /// - [`ConfigError::Io`] if it cannot be read
    /// - [`ConfigError::Parse`] if it is not valid JSON for [`Config`]
    /// - [`ConfigError::InvalidOption`] if validation fails
    pub fn from_json_file(path: &Utf8Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_owned()));
        }

        let raw = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every option holds a usable value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOption`] naming the first offending option.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scan.worker_count == 0 {
            return Err(ConfigError::invalid_option(
                "scan.worker_count",
                "must be at least 1",
            ));
        }
        if self.scan.song_extensions.is_empty() {
            return Err(ConfigError::invalid_option(
                "scan.song_extensions",
                "must list at least one extension",
            ));
        }
        if self.cli.poll_interval_ms == 0 {
            return Err(ConfigError::invalid_option(
                "cli.poll_interval_ms",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}
