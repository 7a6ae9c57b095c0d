//! Configuration management for Bibliotecario.
//!
//! Two layers, as usual:
//! - [`Config`] mirrors the config file; every field is optional.
//! - [`Settings`] holds the resolved values the rest of the crate uses.
//!
//! Resolution order (later wins): built-in defaults, discovered or explicit
//! config file, `--data-dir`, environment.

use std::fs;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default upload ceiling (100 MB).
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;

/// Default rows per processing chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 5000;

/// Accepted chunk sizes on the upload form.
pub const CHUNK_SIZE_RANGE: RangeInclusive<usize> = 100..=10000;

/// Sessions and their files are kept this long.
pub const DEFAULT_RETENTION_HOURS: u64 = 24;

const UPLOADS_SUBDIR: &str = "uploads";
const DOWNLOADS_SUBDIR: &str = "downloads";

/// Errors raised while loading configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {format} config: {message}")]
    Parse { format: &'static str, message: String },
}

/// Timings for the status poller. Fields missing from a config file keep
/// their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerSettings {
    /// Delay between the end of one poll and the start of the next.
    pub interval_ms: u64,
    /// How long the success indicator shows before navigating.
    pub completion_delay_ms: u64,
    /// Backoff before resuming after a transport failure.
    pub recovery_backoff_ms: u64,
    /// Per-request timeout; expiry counts as a transport failure.
    pub request_timeout_ms: u64,
    /// Give up after this many consecutive transport failures (None = never).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_recoveries: Option<u32>,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            interval_ms: 2000,
            completion_delay_ms: 2000,
            recovery_backoff_ms: 5000,
            request_timeout_ms: 10_000,
            max_recoveries: None,
        }
    }
}

impl PollerSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn completion_delay(&self) -> Duration {
        Duration::from_millis(self.completion_delay_ms)
    }

    pub fn recovery_backoff(&self) -> Duration {
        Duration::from_millis(self.recovery_backoff_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Application settings.
#[derive(Debug, Clone, Serialize)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Where accepted uploads are stored until processed.
    pub upload_dir: PathBuf,
    /// Where exports are written.
    pub download_dir: PathBuf,
    /// Largest accepted upload in bytes.
    pub max_upload_bytes: u64,
    /// Chunk size used when the form leaves it blank.
    pub default_chunk_size: usize,
    /// Hours before sessions and files expire.
    pub retention_hours: u64,
    /// Seconds between retention sweeps.
    pub cleanup_interval_secs: u64,
    /// Base URL the CLI uses to reach a running server.
    pub server_url: String,
    /// Status poller timings.
    pub poller: PollerSettings,
}

impl Default for Settings {
    fn default() -> Self {
        // Default to ~/Documents/bibliotecario/
        // Falls back gracefully: Documents dir -> Home dir -> Current dir
        let data_dir = dirs::document_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("bibliotecario");
        Self::with_data_dir(data_dir)
    }
}

impl Settings {
    /// Create settings rooted at a custom data directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            upload_dir: data_dir.join(UPLOADS_SUBDIR),
            download_dir: data_dir.join(DOWNLOADS_SUBDIR),
            data_dir,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            default_chunk_size: DEFAULT_CHUNK_SIZE,
            retention_hours: DEFAULT_RETENTION_HOURS,
            cleanup_interval_secs: 3600,
            server_url: "http://127.0.0.1:5000".to_string(),
            poller: PollerSettings::default(),
        }
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_hours * 3600)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs.max(1))
    }

    /// Ensure upload and download directories exist.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        for (label, dir) in [
            ("data", &self.data_dir),
            ("upload", &self.upload_dir),
            ("download", &self.download_dir),
        ] {
            fs::create_dir_all(dir).map_err(|e| {
                std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create {} directory '{}': {}",
                        label,
                        dir.display(),
                        e
                    ),
                )
            })?;
        }
        Ok(())
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Data directory path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    /// Upload directory (defaults to `<data_dir>/uploads`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_dir: Option<String>,
    /// Download directory (defaults to `<data_dir>/downloads`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_dir: Option<String>,
    /// Maximum upload size in megabytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_upload_mb: Option<u64>,
    /// Default chunk size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<usize>,
    /// Session/file retention in hours.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention_hours: Option<u64>,
    /// Seconds between retention sweeps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleanup_interval_secs: Option<u64>,
    /// Server URL used by `submit` and `watch`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,
    /// Poller timing overrides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poller: Option<PollerSettings>,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer crate for discovery.
    /// Automatically discovers bibliotecario config files in standard locations.
    pub async fn load() -> Self {
        match prefer::load("bibliotecario").await {
            Ok(pref_config) => match pref_config.source_path() {
                Some(path) => Self::load_from_path(path).await.unwrap_or_else(|e| {
                    tracing::warn!("Ignoring config file: {}", e);
                    Self::default()
                }),
                None => Self::default(),
            },
            // No config file found, use defaults
            Err(_) => Self::default(),
        }
    }

    /// Load configuration from a specific file path.
    /// Supports JSON, TOML and YAML based on file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let mut config = Self::parse(&contents, ext)?;
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Parse config text in the format implied by `ext`.
    pub fn parse(contents: &str, ext: &str) -> Result<Self, ConfigError> {
        match ext {
            "toml" => toml::from_str(contents).map_err(|e| ConfigError::Parse {
                format: "TOML",
                message: e.to_string(),
            }),
            "yaml" | "yml" => serde_yaml::from_str(contents).map_err(|e| ConfigError::Parse {
                format: "YAML",
                message: e.to_string(),
            }),
            _ => serde_json::from_str(contents).map_err(|e| ConfigError::Parse {
                format: "JSON",
                message: e.to_string(),
            }),
        }
    }

    /// Directory containing the config file, for resolving relative paths.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let path = Path::new(path_str);
        if path.is_absolute() {
            path.to_path_buf()
        } else if let Some(rest) = path_str.strip_prefix("~/") {
            dirs::home_dir()
                .map(|home| home.join(rest))
                .unwrap_or_else(|| base_dir.join(path))
        } else {
            base_dir.join(path)
        }
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref data_dir) = self.data_dir {
            let poller = settings.poller.clone();
            let server_url = settings.server_url.clone();
            *settings = Settings::with_data_dir(self.resolve_path(data_dir, base_dir));
            settings.poller = poller;
            settings.server_url = server_url;
        }
        if let Some(ref dir) = self.upload_dir {
            settings.upload_dir = self.resolve_path(dir, base_dir);
        }
        if let Some(ref dir) = self.download_dir {
            settings.download_dir = self.resolve_path(dir, base_dir);
        }
        if let Some(mb) = self.max_upload_mb {
            settings.max_upload_bytes = mb * 1024 * 1024;
        }
        if let Some(chunk_size) = self.chunk_size {
            if CHUNK_SIZE_RANGE.contains(&chunk_size) {
                settings.default_chunk_size = chunk_size;
            } else {
                tracing::warn!(
                    "Ignoring chunk_size {} outside {:?}",
                    chunk_size,
                    CHUNK_SIZE_RANGE
                );
            }
        }
        if let Some(hours) = self.retention_hours {
            settings.retention_hours = hours;
        }
        if let Some(secs) = self.cleanup_interval_secs {
            settings.cleanup_interval_secs = secs;
        }
        if let Some(ref url) = self.server_url {
            settings.server_url = url.trim_end_matches('/').to_string();
        }
        if let Some(ref poller) = self.poller {
            settings.poller = poller.clone();
        }
    }
}

/// Options controlling how settings are loaded.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file (`--config`).
    pub config_path: Option<PathBuf>,
    /// Data directory override (`--data-dir`).
    pub data_dir: Option<PathBuf>,
}

/// Look for a config file inside the data directory.
fn find_config_in_data_dir(data_dir: &Path) -> Option<PathBuf> {
    let extensions = ["toml", "json", "yaml", "yml"];
    let basenames = ["bibliotecario", "config"];

    for basename in basenames {
        for ext in extensions {
            let path = data_dir.join(format!("{}.{}", basename, ext));
            if path.exists() {
                return Some(path);
            }
        }
    }
    None
}

/// Load config from file sources.
async fn load_file_config(options: &LoadOptions) -> Config {
    // Priority 1: Explicit --config flag
    if let Some(ref config_path) = options.config_path {
        return Config::load_from_path(config_path)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("{}", e);
                Config::default()
            });
    }

    // Priority 2: Config inside the data dir
    if let Some(ref data_dir) = options.data_dir {
        if let Some(config_path) = find_config_in_data_dir(data_dir) {
            tracing::debug!("Found config in data dir: {}", config_path.display());
            return Config::load_from_path(&config_path)
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!("{}", e);
                    Config::default()
                });
        }
    }

    // Priority 3: Auto-discover via prefer
    Config::load().await
}

/// Load settings with explicit options.
/// Returns (Settings, Config) tuple.
pub async fn load_settings_with_options(options: LoadOptions) -> (Settings, Config) {
    let config = load_file_config(&options).await;
    let mut settings = Settings::default();

    let base_dir = config
        .base_dir()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    config.apply_to_settings(&mut settings, &base_dir);

    // --data-dir takes precedence over the file
    if let Some(data_dir) = options.data_dir {
        settings.upload_dir = data_dir.join(UPLOADS_SUBDIR);
        settings.download_dir = data_dir.join(DOWNLOADS_SUBDIR);
        settings.data_dir = data_dir;
    }

    // BIBLIOTECARIO_SERVER_URL takes precedence over config
    if let Some(url) = std::env::var("BIBLIOTECARIO_SERVER_URL")
        .ok()
        .filter(|s| !s.is_empty())
    {
        tracing::debug!("Using BIBLIOTECARIO_SERVER_URL from environment: {}", url);
        settings.server_url = url.trim_end_matches('/').to_string();
    }

    (settings, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_upload_limits() {
        let settings = Settings::with_data_dir(PathBuf::from("/srv/bib"));
        assert_eq!(settings.max_upload_bytes, 100 * 1024 * 1024);
        assert_eq!(settings.default_chunk_size, 5000);
        assert_eq!(settings.upload_dir, PathBuf::from("/srv/bib/uploads"));
        assert_eq!(settings.download_dir, PathBuf::from("/srv/bib/downloads"));
        assert_eq!(settings.retention(), Duration::from_secs(24 * 3600));
    }

    #[test]
    fn test_poller_defaults() {
        let poller = PollerSettings::default();
        assert_eq!(poller.interval(), Duration::from_millis(2000));
        assert_eq!(poller.completion_delay(), Duration::from_millis(2000));
        assert_eq!(poller.recovery_backoff(), Duration::from_millis(5000));
        assert_eq!(poller.request_timeout(), Duration::from_secs(10));
        assert!(poller.max_recoveries.is_none());
    }

    #[test]
    fn test_parse_toml_and_apply() {
        let config = Config::parse(
            r#"
            data_dir = "state"
            max_upload_mb = 10
            chunk_size = 250
            server_url = "http://localhost:8080/"

            [poller]
            interval_ms = 500
            completion_delay_ms = 100
            recovery_backoff_ms = 1000
            request_timeout_ms = 3000
            max_recoveries = 4
            "#,
            "toml",
        )
        .unwrap();

        let mut settings = Settings::with_data_dir(PathBuf::from("/unused"));
        config.apply_to_settings(&mut settings, Path::new("/etc/bib"));

        assert_eq!(settings.data_dir, PathBuf::from("/etc/bib/state"));
        assert_eq!(settings.upload_dir, PathBuf::from("/etc/bib/state/uploads"));
        assert_eq!(settings.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(settings.default_chunk_size, 250);
        assert_eq!(settings.server_url, "http://localhost:8080");
        assert_eq!(settings.poller.interval_ms, 500);
        assert_eq!(settings.poller.max_recoveries, Some(4));
    }

    #[test]
    fn test_partial_poller_table_keeps_defaults() {
        let config = Config::parse("retention_hours = 6\n\n[poller]\nmax_recoveries = 3\n", "toml")
            .unwrap();
        assert_eq!(config.retention_hours, Some(6));

        let poller = config.poller.unwrap();
        assert_eq!(poller.max_recoveries, Some(3));
        assert_eq!(poller.interval_ms, 2000);
        assert_eq!(poller.recovery_backoff_ms, 5000);
        assert_eq!(poller.request_timeout_ms, 10_000);
    }

    #[test]
    fn test_out_of_range_chunk_size_ignored() {
        let config = Config {
            chunk_size: Some(50),
            ..Default::default()
        };
        let mut settings = Settings::with_data_dir(PathBuf::from("/x"));
        config.apply_to_settings(&mut settings, Path::new("/"));
        assert_eq!(settings.default_chunk_size, DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn test_parse_json_and_yaml() {
        let json = Config::parse(r#"{"retention_hours": 6}"#, "json").unwrap();
        assert_eq!(json.retention_hours, Some(6));

        let yaml = Config::parse("retention_hours: 12\n", "yml").unwrap();
        assert_eq!(yaml.retention_hours, Some(12));
    }

    #[test]
    fn test_parse_error_names_format() {
        let err = Config::parse("not = [valid", "toml").unwrap_err();
        assert!(err.to_string().contains("TOML"));
    }

    #[tokio::test]
    async fn test_data_dir_override_wins() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("bibliotecario.toml"),
            "retention_hours = 2\n",
        )
        .unwrap();

        let (settings, config) = load_settings_with_options(LoadOptions {
            config_path: None,
            data_dir: Some(dir.path().to_path_buf()),
        })
        .await;

        assert_eq!(config.retention_hours, Some(2));
        assert_eq!(settings.retention_hours, 2);
        assert_eq!(settings.data_dir, dir.path());
        assert_eq!(settings.upload_dir, dir.path().join("uploads"));
    }
}
