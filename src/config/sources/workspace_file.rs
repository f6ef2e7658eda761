//! Working copy config file: `<root>/.cvc/config.toml`.

use crate::dataset::META_DIR;
use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, File, FileFormat};
use std::path::{Path, PathBuf};

pub fn workspace_config_path(root: &Path) -> PathBuf {
    root.join(META_DIR).join("config.toml")
}

/// Adds the working copy config file to `builder` if it exists.
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
    root: &Path,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let path = workspace_config_path(root);
    if path.exists() {
        return Ok(builder.add_source(File::from(path).format(FileFormat::Toml).required(false)));
    }
    Ok(builder)
}
