//! Shared test utilities for integration tests
//!
//! Working copy fixtures over an in-memory remote, plus isolation of the
//! environment variables the config loader reads.

use conservator::dataset::image::minimal_jpeg;
use conservator::dataset::{LocalDataset, SyncContext};
use conservator::remote::MemoryRemote;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const DATASET_ID: &str = "ds1";

/// Global mutex to serialize environment variable access across tests
static ENV_MUTEX: Mutex<()> = Mutex::new(());

const ISOLATED_VARS: &[&str] = &[
    "HOME",
    "XDG_CONFIG_HOME",
    "CONSERVATOR_URL",
    "CONSERVATOR_API_KEY",
    "CONSERVATOR_EMAIL",
    "CONSERVATOR_MAX_RETRIES",
    "CONSERVATOR_WORKERS",
];

/// Runs `f` with HOME and XDG_CONFIG_HOME inside `test_dir` and no
/// `CONSERVATOR_*` variables set. The previous environment is restored.
pub fn with_isolated_env<F, R>(test_dir: &TempDir, f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let saved: Vec<(&str, Option<String>)> = ISOLATED_VARS
        .iter()
        .map(|name| (*name, std::env::var(name).ok()))
        .collect();

    let home = test_dir.path().join("home");
    let config_home = test_dir.path().join("xdg");
    std::fs::create_dir_all(&home).unwrap();
    std::fs::create_dir_all(&config_home).unwrap();
    for name in ISOLATED_VARS {
        std::env::remove_var(name);
    }
    std::env::set_var("HOME", &home);
    std::env::set_var("XDG_CONFIG_HOME", &config_home);

    let result = f();

    for (name, value) in saved {
        match value {
            Some(v) => std::env::set_var(name, v),
            None => std::env::remove_var(name),
        }
    }
    result
}

/// A temp directory with one in-memory remote shared by every working copy.
pub struct Workspace {
    _dir: TempDir,
    pub base: PathBuf,
    pub remote: Arc<MemoryRemote>,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let base = dir.path().to_path_buf();
        Self {
            _dir: dir,
            base,
            remote: Arc::new(MemoryRemote::new()),
        }
    }

    /// Context whose blob cache is private to `name`.
    pub fn ctx(&self, name: &str) -> SyncContext {
        SyncContext::new(
            self.remote.clone(),
            self.remote.clone(),
            self.base.join("caches").join(name),
            2,
        )
    }

    pub fn clone_dataset(&self, name: &str) -> LocalDataset {
        LocalDataset::clone(self.ctx(name), DATASET_ID, &self.base.join(name)).unwrap()
    }

    pub fn open_dataset(&self, name: &str) -> LocalDataset {
        LocalDataset::open(self.ctx(name), &self.base.join(name)).unwrap()
    }

    /// Writes a small JPEG outside every working copy.
    pub fn incoming_image(&self, file_name: &str, salt: u8) -> PathBuf {
        let dir = self.base.join("incoming");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(file_name);
        std::fs::write(&path, minimal_jpeg(32, 24, salt)).unwrap();
        path
    }
}

/// Writes `bytes` to `key` inside the working copy at `root`.
pub fn write_file(root: &Path, key: &str, bytes: &[u8]) {
    let path = root.join(key);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, bytes).unwrap();
}
