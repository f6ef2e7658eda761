//! Working copy walker

use crate::dataset::path::relative_key;
use crate::dataset::META_DIR;
use crate::error::StorageError;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// A regular file found in the working copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkedFile {
    pub key: String,
    pub path: PathBuf,
    pub size: u64,
}

/// Walker configuration
#[derive(Debug, Clone)]
pub struct WalkerConfig {
    /// Whether to follow symbolic links
    pub follow_symlinks: bool,
    /// Top-level names skipped entirely (the metadata directory is always skipped)
    pub ignore_names: Vec<String>,
    /// Directories skipped at any depth, compared against walked paths
    pub ignore_paths: Vec<PathBuf>,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            follow_symlinks: false,
            ignore_names: vec![".git".to_string()],
            ignore_paths: Vec::new(),
        }
    }
}

pub struct Walker {
    root: PathBuf,
    config: WalkerConfig,
}

impl Walker {
    pub fn new(root: &Path) -> Self {
        Self::with_config(root, WalkerConfig::default())
    }

    pub fn with_config(root: &Path, config: WalkerConfig) -> Self {
        Self {
            root: root.to_path_buf(),
            config,
        }
    }

    /// Collects every regular file, sorted by key.
    pub fn walk(&self) -> Result<Vec<WalkedFile>, StorageError> {
        let mut files = Vec::new();
        let walker = WalkDir::new(&self.root)
            .follow_links(self.config.follow_symlinks)
            .into_iter()
            .filter_entry(|e| !self.should_ignore(e));

        for entry in walker {
            let entry = entry.map_err(|e| {
                StorageError::IoError(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("Failed to walk directory: {}", e),
                ))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let metadata = entry.metadata().map_err(|e| {
                StorageError::IoError(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("Failed to read metadata for {:?}: {}", entry.path(), e),
                ))
            })?;
            files.push(WalkedFile {
                key: relative_key(&self.root, entry.path())?,
                path: entry.path().to_path_buf(),
                size: metadata.len(),
            });
        }

        files.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(files)
    }

    fn should_ignore(&self, entry: &DirEntry) -> bool {
        if entry.file_type().is_dir()
            && self.config.ignore_paths.iter().any(|p| p == entry.path())
        {
            return true;
        }
        if entry.depth() != 1 {
            return false;
        }
        let name = entry.file_name().to_string_lossy();
        name == META_DIR || self.config.ignore_names.iter().any(|n| *n == name)
    }
}
