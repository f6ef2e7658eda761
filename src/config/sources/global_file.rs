//! User config file: `$XDG_CONFIG_HOME/conservator/config.toml` on Linux, the
//! platform config directory elsewhere.

use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, File, FileFormat};
use directories::ProjectDirs;
use std::path::PathBuf;
use tracing::debug;

/// Path to the user config file, when a home directory is known.
pub fn global_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "conservator").map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Adds the user config file to `builder` if it exists.
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    match global_config_path() {
        Some(path) if path.exists() => {
            debug!(config_path = %path.display(), "Loading user config");
            Ok(builder.add_source(File::from(path).format(FileFormat::Toml).required(false)))
        }
        Some(path) => {
            debug!(config_path = %path.display(), "No user config file");
            Ok(builder)
        }
        None => Ok(builder),
    }
}
