//! Defaults underneath every other source.

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError};

pub const DEFAULT_URL: &str = "https://flirconservator.com/";
/// Relative cache paths resolve against the working copy root.
pub const DEFAULT_CACHE_PATH: &str = ".cvc/cache";
pub const DEFAULT_MAX_RETRIES: i64 = 5;

/// Config builder with the defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("url", DEFAULT_URL)?
        .set_default("cache_path", DEFAULT_CACHE_PATH)?
        .set_default("max_retries", DEFAULT_MAX_RETRIES)
}
