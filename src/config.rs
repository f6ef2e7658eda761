//! Configuration
//!
//! Layered configuration built with the `config` crate. Precedence, lowest
//! first: defaults, the user config file, the working copy's
//! `.cvc/config.toml`, `CONSERVATOR_*` environment variables, then explicit
//! overrides (command line flags). The resolved `ConservatorConfig` is passed
//! to everything that needs it at construction.

use crate::dataset::write_atomic;
use crate::error::ApiError;
use crate::logging::LoggingConfig;
use crate::pool::worker_count;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

mod merge;
mod sources;

pub use merge::merge_policy::{DEFAULT_CACHE_PATH, DEFAULT_MAX_RETRIES, DEFAULT_URL};
pub use sources::global_file::global_config_path;
pub use sources::workspace_file::workspace_config_path;

/// Prefix of the environment variables read as configuration.
pub const ENV_PREFIX: &str = "CONSERVATOR";

/// Resolved client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConservatorConfig {
    /// Base URL of the Conservator instance
    #[serde(default = "default_url")]
    pub url: String,

    /// API key sent with every request
    #[serde(default)]
    pub api_key: Option<String>,

    /// Recorded as commit author
    #[serde(default)]
    pub email: Option<String>,

    /// Blob cache directory; relative paths resolve against the working copy
    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,

    /// Attempts per request on transport failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Hashing and upload threads; available parallelism when unset
    #[serde(default)]
    pub workers: Option<usize>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_url() -> String {
    DEFAULT_URL.to_string()
}

fn default_cache_path() -> PathBuf {
    PathBuf::from(DEFAULT_CACHE_PATH)
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES as u32
}

impl Default for ConservatorConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            api_key: None,
            email: None,
            cache_path: default_cache_path(),
            max_retries: default_max_retries(),
            workers: None,
            logging: LoggingConfig::default(),
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    MissingUrl,
    InvalidUrl(String),
    MissingApiKey,
    ZeroRetries,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::MissingUrl => write!(f, "url is not set"),
            ValidationError::InvalidUrl(url) => {
                write!(f, "url '{}' must start with http:// or https://", url)
            }
            ValidationError::MissingApiKey => write!(f, "api_key is not set"),
            ValidationError::ZeroRetries => write!(f, "max_retries must be at least 1"),
        }
    }
}

impl std::error::Error for ValidationError {}

impl ConservatorConfig {
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        let url = self.url.trim();
        if url.is_empty() {
            errors.push(ValidationError::MissingUrl);
        } else if !url.starts_with("http://") && !url.starts_with("https://") {
            errors.push(ValidationError::InvalidUrl(url.to_string()));
        }
        if self.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
            errors.push(ValidationError::MissingApiKey);
        }
        if self.max_retries == 0 {
            errors.push(ValidationError::ZeroRetries);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// `validate` folded into a single `ConfigError`.
    pub fn ensure_valid(&self) -> Result<(), ApiError> {
        self.validate().map_err(|errors| {
            let msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ApiError::ConfigError(format!("Invalid configuration: {}", msgs.join("; ")))
        })
    }

    /// The API key, or a `ConfigError` naming how to set it.
    pub fn api_key(&self) -> Result<&str, ApiError> {
        self.api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                ApiError::ConfigError(format!(
                    "No API key configured; set {}_API_KEY or run `cvc config`",
                    ENV_PREFIX
                ))
            })
    }

    /// Cache directory for a working copy at `root`.
    pub fn resolved_cache_path(&self, root: &Path) -> PathBuf {
        if self.cache_path.is_absolute() {
            self.cache_path.clone()
        } else {
            root.join(&self.cache_path)
        }
    }

    pub fn worker_count(&self) -> usize {
        worker_count(self.workers)
    }

    pub fn to_toml(&self) -> Result<String, ApiError> {
        toml::to_string_pretty(self)
            .map_err(|e| ApiError::ConfigError(format!("Failed to serialize config: {}", e)))
    }

    /// Writes the config as TOML, replacing `path` atomically.
    pub fn save(&self, path: &Path) -> Result<(), ApiError> {
        write_atomic(path, self.to_toml()?.as_bytes())?;
        debug!(config_path = %path.display(), "Saved config");
        Ok(())
    }
}

/// Values given explicitly, e.g. on the command line. Highest precedence.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub email: Option<String>,
    pub cache_path: Option<PathBuf>,
    pub max_retries: Option<u32>,
    pub workers: Option<usize>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Defaults only.
    #[allow(clippy::should_implement_trait)]
    pub fn default() -> ConservatorConfig {
        ConservatorConfig::default()
    }

    /// Every source, for a working copy at `root` (or none).
    pub fn load(root: Option<&Path>) -> Result<ConservatorConfig, ApiError> {
        Self::load_with(root, &ConfigOverrides::default())
    }

    pub fn load_with(
        root: Option<&Path>,
        overrides: &ConfigOverrides,
    ) -> Result<ConservatorConfig, ApiError> {
        let mut builder = merge::merge_policy::builder_with_defaults()?;
        builder = sources::global_file::add_to_builder(builder)?;
        if let Some(root) = root {
            builder = sources::workspace_file::add_to_builder(builder, root)?;
        }
        builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true));

        builder = builder
            .set_override_option("url", overrides.url.clone())?
            .set_override_option("api_key", overrides.api_key.clone())?
            .set_override_option("email", overrides.email.clone())?
            .set_override_option(
                "cache_path",
                overrides
                    .cache_path
                    .as_ref()
                    .map(|p| p.to_string_lossy().to_string()),
            )?
            .set_override_option("max_retries", overrides.max_retries.map(i64::from))?
            .set_override_option("workers", overrides.workers.map(|w| w as i64))?;

        let config: ConservatorConfig = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// A single TOML file over the defaults; no environment or user file.
    pub fn load_from_file(path: &Path) -> Result<ConservatorConfig, ApiError> {
        if !path.exists() {
            return Err(ApiError::ConfigError(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        let config = Config::builder()
            .add_source(File::from(path.to_path_buf()).format(FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn valid() -> ConservatorConfig {
        ConservatorConfig {
            api_key: Some("key".to_string()),
            ..ConservatorConfig::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = ConfigLoader::default();
        assert_eq!(config.url, DEFAULT_URL);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.cache_path, PathBuf::from(".cvc/cache"));
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_validation() {
        assert!(valid().validate().is_ok());

        let mut config = valid();
        config.api_key = Some("  ".to_string());
        config.max_retries = 0;
        config.url = "ftp://x".to_string();
        let errors = config.validate().unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::InvalidUrl("ftp://x".to_string()),
                ValidationError::MissingApiKey,
                ValidationError::ZeroRetries
            ]
        );
        assert!(matches!(config.ensure_valid(), Err(ApiError::ConfigError(_))));
    }

    #[test]
    fn test_cache_path_resolution() {
        let config = ConservatorConfig::default();
        assert_eq!(
            config.resolved_cache_path(Path::new("/data/ds")),
            PathBuf::from("/data/ds/.cvc/cache")
        );

        let config = ConservatorConfig {
            cache_path: PathBuf::from("/var/cache/cvc"),
            ..ConservatorConfig::default()
        };
        assert_eq!(
            config.resolved_cache_path(Path::new("/data/ds")),
            PathBuf::from("/var/cache/cvc")
        );
    }

    #[test]
    fn test_save_and_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");

        let mut config = valid();
        config.email = Some("someone@example.com".to_string());
        config.workers = Some(3);
        config.logging.level = "debug".to_string();
        config.save(&path).unwrap();

        let loaded = ConfigLoader::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "api_key = \"abc\"\nmax_retries = 2\n").unwrap();

        let config = ConfigLoader::load_from_file(&path).unwrap();
        assert_eq!(config.api_key.as_deref(), Some("abc"));
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.url, DEFAULT_URL);
    }

    #[test]
    fn test_workspace_file_and_overrides() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        std::fs::create_dir_all(root.join(".cvc")).unwrap();
        std::fs::write(
            workspace_config_path(root),
            "url = \"https://workspace.example\"\ncache_path = \"/tmp/cvc-cache\"\n",
        )
        .unwrap();

        let config = ConfigLoader::load(Some(root)).unwrap();
        assert_eq!(config.cache_path, PathBuf::from("/tmp/cvc-cache"));

        let overrides = ConfigOverrides {
            url: Some("https://override.example".to_string()),
            workers: Some(2),
            ..ConfigOverrides::default()
        };
        let config = ConfigLoader::load_with(Some(root), &overrides).unwrap();
        assert_eq!(config.url, "https://override.example");
        assert_eq!(config.workers, Some(2));
        assert_eq!(config.worker_count(), 2);
    }

    #[test]
    fn test_missing_file() {
        let err = ConfigLoader::load_from_file(Path::new("/nonexistent/cvc.toml")).unwrap_err();
        assert!(matches!(err, ApiError::ConfigError(_)));
    }
}
