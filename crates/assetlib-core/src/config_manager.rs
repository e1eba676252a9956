use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Failed to read config: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration for the asset library
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct AssetLibConfig {
    /// Library location and persistence
    #[serde(default)]
    pub library: LibraryConfig,

    /// Read cache sizing and expiry
    #[serde(default)]
    pub cache: CacheSettings,

    /// Search defaults
    #[serde(default)]
    pub search: SearchSettings,

    /// Export defaults
    #[serde(default)]
    pub export: ExportSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LibraryConfig {
    /// Root directory for persisted assets, versions, branches and exports.
    /// `None` keeps everything in memory.
    #[serde(default)]
    pub root: Option<PathBuf>,

    /// Write every mutation through to the local store
    #[serde(default = "default_persist")]
    pub persist: bool,

    /// Author recorded on versions when the caller does not supply one
    #[serde(default = "default_author")]
    pub default_author: String,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            root: None,
            persist: default_persist(),
            default_author: default_author(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    #[default]
    Lru,
    /// Declared for configuration compatibility; no eviction branch exists.
    Lfu,
    /// Declared for configuration compatibility; no eviction branch exists.
    Fifo,
}

impl std::str::FromStr for EvictionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lru" => Ok(EvictionPolicy::Lru),
            "lfu" => Ok(EvictionPolicy::Lfu),
            "fifo" => Ok(EvictionPolicy::Fifo),
            other => Err(format!("unknown eviction policy: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheSettings {
    /// Budget for the sum of approximate entry sizes
    #[serde(default = "default_cache_max_size")]
    pub max_size_bytes: usize,

    /// Default time-to-live for entries
    #[serde(default = "default_cache_ttl_secs")]
    pub default_ttl_secs: u64,

    #[serde(default)]
    pub policy: EvictionPolicy,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_size_bytes: default_cache_max_size(),
            default_ttl_secs: default_cache_ttl_secs(),
            policy: EvictionPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchSettings {
    #[serde(default = "default_search_limit")]
    pub default_limit: usize,

    /// Characters kept on each side of a highlight match
    #[serde(default = "default_highlight_window")]
    pub highlight_window: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            default_limit: default_search_limit(),
            highlight_window: default_highlight_window(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportSettings {
    /// "json" or "zip" (a single gzip stream)
    #[serde(default = "default_export_format")]
    pub default_format: String,

    #[serde(default = "default_exporter")]
    pub exporter: String,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            default_format: default_export_format(),
            exporter: default_exporter(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "pretty", "compact"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_persist() -> bool {
    true
}
fn default_author() -> String {
    "system".to_string()
}
fn default_cache_max_size() -> usize {
    50 * 1024 * 1024
}
fn default_cache_ttl_secs() -> u64 {
    3600
}
fn default_search_limit() -> usize {
    20
}
fn default_highlight_window() -> usize {
    20
}
fn default_export_format() -> String {
    "json".to_string()
}
fn default_exporter() -> String {
    "assetlib".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}

/// Configuration manager with layered sources
pub struct ConfigManager {
    config: AssetLibConfig,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with the following precedence:
    /// 1. Environment variables (.env file)
    /// 2. Config file (.assetlib.toml)
    /// 3. Defaults
    pub fn load() -> Result<Self, ConfigError> {
        info!("Loading asset library configuration");

        Self::load_dotenv();

        let (config, config_path) = Self::load_config_file()?;
        let config = Self::apply_env_overrides(config);
        Self::validate_config(&config)?;

        match config_path {
            Some(ref path) => info!("Config file: {}", path.display()),
            None => info!("Config file: NONE (using defaults)"),
        }
        info!(
            root = ?config.library.root,
            cache_bytes = config.cache.max_size_bytes,
            "Configuration loaded"
        );

        Ok(Self {
            config,
            config_path,
        })
    }

    /// Load from an explicit file, still honouring environment overrides.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let config = Self::apply_env_overrides(Self::read_toml_file(path)?);
        Self::validate_config(&config)?;
        Ok(Self {
            config,
            config_path: Some(path.to_path_buf()),
        })
    }

    fn load_dotenv() {
        if Path::new(".env").exists() {
            if let Err(e) = dotenv::from_filename(".env") {
                warn!("Failed to load .env file: {}", e);
            }
            return;
        }

        if let Some(home) = dirs::home_dir() {
            let home_env = home.join(".assetlib.env");
            if home_env.exists() {
                if let Err(e) = dotenv::from_path(&home_env) {
                    warn!("Failed to load .assetlib.env: {}", e);
                }
            }
        }
    }

    /// Search order:
    /// 1. ./.assetlib.toml
    /// 2. ~/.assetlib/config.toml
    /// 3. Defaults
    fn load_config_file() -> Result<(AssetLibConfig, Option<PathBuf>), ConfigError> {
        let local_config = Path::new(".assetlib.toml");
        if local_config.exists() {
            let config = Self::read_toml_file(local_config)?;
            return Ok((config, Some(local_config.to_path_buf())));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".assetlib").join("config.toml");
            if user_config.exists() {
                let config = Self::read_toml_file(&user_config)?;
                return Ok((config, Some(user_config)));
            }
        }

        Ok((AssetLibConfig::default(), None))
    }

    fn read_toml_file(path: &Path) -> Result<AssetLibConfig, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    fn apply_env_overrides(mut config: AssetLibConfig) -> AssetLibConfig {
        if let Ok(root) = std::env::var("ASSETLIB_LIBRARY_ROOT") {
            config.library.root = Some(PathBuf::from(root));
        }
        if let Ok(persist) = std::env::var("ASSETLIB_PERSIST") {
            config.library.persist = persist == "true" || persist == "1";
        }
        if let Ok(author) = std::env::var("ASSETLIB_DEFAULT_AUTHOR") {
            config.library.default_author = author;
        }
        if let Ok(size) = std::env::var("ASSETLIB_CACHE_MAX_SIZE") {
            match size.parse() {
                Ok(size) => config.cache.max_size_bytes = size,
                Err(_) => warn!("Ignoring invalid ASSETLIB_CACHE_MAX_SIZE: {}", size),
            }
        }
        if let Ok(ttl) = std::env::var("ASSETLIB_CACHE_TTL_SECS") {
            match ttl.parse() {
                Ok(ttl) => config.cache.default_ttl_secs = ttl,
                Err(_) => warn!("Ignoring invalid ASSETLIB_CACHE_TTL_SECS: {}", ttl),
            }
        }
        if let Ok(policy) = std::env::var("ASSETLIB_CACHE_POLICY") {
            match policy.parse() {
                Ok(policy) => config.cache.policy = policy,
                Err(e) => warn!("Ignoring ASSETLIB_CACHE_POLICY: {}", e),
            }
        }
        if let Ok(limit) = std::env::var("ASSETLIB_SEARCH_LIMIT") {
            if let Ok(limit) = limit.parse() {
                config.search.default_limit = limit;
            }
        }
        if let Ok(format) = std::env::var("ASSETLIB_EXPORT_FORMAT") {
            config.export.default_format = format.to_lowercase();
        }
        if let Ok(level) = std::env::var("ASSETLIB_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(format) = std::env::var("ASSETLIB_LOG_FORMAT") {
            config.logging.format = format;
        }
        config
    }

    pub fn validate_config(config: &AssetLibConfig) -> Result<(), ConfigError> {
        if config.cache.max_size_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "cache.max_size_bytes must be greater than zero".to_string(),
            ));
        }
        if config.search.default_limit == 0 {
            return Err(ConfigError::ValidationError(
                "search.default_limit must be greater than zero".to_string(),
            ));
        }
        if !["json", "zip"].contains(&config.export.default_format.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "export.default_format must be 'json' or 'zip', got '{}'",
                config.export.default_format
            )));
        }
        if !["trace", "debug", "info", "warn", "error"].contains(&config.logging.level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "unknown log level '{}'",
                config.logging.level
            )));
        }
        if !["pretty", "compact"].contains(&config.logging.format.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "unknown log format '{}'",
                config.logging.format
            )));
        }
        Ok(())
    }

    pub fn config(&self) -> &AssetLibConfig {
        &self.config
    }

    pub fn into_config(self) -> AssetLibConfig {
        self.config
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Create a default config file
    pub fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        let config = AssetLibConfig::default();
        let toml_str =
            toml::to_string_pretty(&config).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::ReadError(e.to_string()))?;
        }

        std::fs::write(path, toml_str).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        Ok(())
    }
}
