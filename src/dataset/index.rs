//! Working copy index
//!
//! The index records the tree of the checked-out commit, the changes staged on
//! top of it, and the images staged for upload. It is stored as versioned JSON
//! at `.cvc/index.json` with keys in sorted order.

use crate::dataset::PendingWrite;
use crate::error::StorageError;
use crate::types::ContentHash;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const INDEX_VERSION: u32 = 1;

/// Link between a data file and its remote dataset frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameLink {
    pub dataset_frame_id: String,
    /// Equal to `dataset_frame_id` for frames uploaded directly to the dataset.
    pub frame_id: Option<String>,
    pub video_id: String,
    pub frame_index: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl FrameLink {
    /// Whether the frame was uploaded straight into the dataset rather than
    /// taken from a video.
    pub fn is_direct_upload(&self) -> bool {
        self.frame_id.as_deref() == Some(self.dataset_frame_id.as_str())
    }

    /// File name used for the frame under the data directory.
    pub fn file_name(&self) -> String {
        format!(
            "video-{}-frame-{:06}-{}.jpg",
            self.video_id, self.frame_index, self.dataset_frame_id
        )
    }

    /// Parses `video-<video>-frame-<index>-<dataset frame>.jpg`.
    pub fn parse_file_name(name: &str) -> Option<Self> {
        let stem = name.strip_suffix(".jpg")?;
        let rest = stem.strip_prefix("video-")?;
        let (video_id, rest) = rest.split_once("-frame-")?;
        let (index, dataset_frame_id) = rest.split_once('-')?;
        if video_id.is_empty() || dataset_frame_id.is_empty() {
            return None;
        }
        Some(Self {
            dataset_frame_id: dataset_frame_id.to_string(),
            frame_id: None,
            video_id: video_id.to_string(),
            frame_index: index.parse().ok()?,
            width: None,
            height: None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub hash: ContentHash,
    pub size: u64,
    pub frame: Option<FrameLink>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "change", content = "entry", rename_all = "snake_case")]
pub enum StagedChange {
    Added(IndexEntry),
    Modified(IndexEntry),
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Index {
    pub version: u32,
    /// Tree of the checked-out commit.
    pub entries: BTreeMap<String, IndexEntry>,
    /// Changes staged for the next commit.
    pub staged: BTreeMap<String, StagedChange>,
    /// Absolute paths of images waiting to be uploaded.
    pub staged_images: Vec<PathBuf>,
}

impl Index {
    pub fn new() -> Self {
        Self {
            version: INDEX_VERSION,
            ..Default::default()
        }
    }

    pub fn from_tree(entries: BTreeMap<String, IndexEntry>) -> Self {
        Self {
            version: INDEX_VERSION,
            entries,
            ..Default::default()
        }
    }

    pub fn load(path: &Path) -> Result<Self, StorageError> {
        let bytes = fs::read(path).map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                e.kind(),
                format!("Failed to read index from {:?}: {}", path, e),
            ))
        })?;
        let index: Index = serde_json::from_slice(&bytes)
            .map_err(|e| StorageError::Corrupt(format!("Invalid index {:?}: {}", path, e)))?;
        if index.version != INDEX_VERSION {
            return Err(StorageError::Corrupt(format!(
                "Unsupported index version {} in {:?}",
                index.version, path
            )));
        }
        Ok(index)
    }

    pub(crate) fn prepare_save(&self, path: &Path) -> Result<PendingWrite, StorageError> {
        let bytes = serde_json::to_vec_pretty(self)
            .map_err(|e| StorageError::Corrupt(format!("Failed to serialize index: {}", e)))?;
        PendingWrite::prepare(path, &bytes)
    }

    pub fn save(&self, path: &Path) -> Result<(), StorageError> {
        self.prepare_save(path)?.commit()
    }

    pub fn has_staged_changes(&self) -> bool {
        !self.staged.is_empty()
    }

    /// The committed tree with staged changes applied.
    pub fn staged_tree(&self) -> BTreeMap<String, IndexEntry> {
        let mut tree = self.entries.clone();
        for (key, change) in &self.staged {
            match change {
                StagedChange::Added(entry) | StagedChange::Modified(entry) => {
                    tree.insert(key.clone(), entry.clone());
                }
                StagedChange::Removed => {
                    tree.remove(key);
                }
            }
        }
        tree
    }

    /// Highest frame index among frames uploaded directly to the dataset,
    /// staged ones included; 0 when there are none.
    pub fn max_frame_index(&self) -> u64 {
        self.staged_tree()
            .values()
            .filter_map(|e| e.frame.as_ref())
            .filter(|f| f.is_direct_upload())
            .map(|f| f.frame_index)
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::hasher::hash_bytes;
    use tempfile::TempDir;

    fn entry(bytes: &[u8], frame: Option<FrameLink>) -> IndexEntry {
        IndexEntry {
            hash: hash_bytes(bytes),
            size: bytes.len() as u64,
            frame,
        }
    }

    fn link(id: &str, frame_id: Option<&str>, index: u64) -> FrameLink {
        FrameLink {
            dataset_frame_id: id.to_string(),
            frame_id: frame_id.map(str::to_string),
            video_id: "ds1".to_string(),
            frame_index: index,
            width: Some(4),
            height: Some(2),
        }
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".cvc").join("index.json");

        let mut index = Index::new();
        index
            .entries
            .insert("a.jpg".into(), entry(b"a", Some(link("f1", Some("f1"), 1))));
        index
            .staged
            .insert("b.jpg".into(), StagedChange::Added(entry(b"b", None)));
        index.staged.insert("a.jpg".into(), StagedChange::Removed);
        index.staged_images.push(PathBuf::from("/tmp/c.jpg"));

        index.save(&path).unwrap();
        assert_eq!(Index::load(&path).unwrap(), index);
    }

    #[test]
    fn test_load_rejects_unknown_version() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.json");
        let mut index = Index::new();
        index.version = 99;
        index.save(&path).unwrap();
        assert!(matches!(Index::load(&path), Err(StorageError::Corrupt(_))));
    }

    #[test]
    fn test_staged_tree_applies_changes() {
        let mut index = Index::new();
        index.entries.insert("a.jpg".into(), entry(b"a", None));
        index.entries.insert("b.jpg".into(), entry(b"b", None));
        index
            .staged
            .insert("a.jpg".into(), StagedChange::Modified(entry(b"a2", None)));
        index.staged.insert("b.jpg".into(), StagedChange::Removed);
        index
            .staged
            .insert("c.jpg".into(), StagedChange::Added(entry(b"c", None)));

        let tree = index.staged_tree();
        let keys: Vec<&str> = tree.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["a.jpg", "c.jpg"]);
        assert_eq!(tree["a.jpg"].hash, hash_bytes(b"a2"));
    }

    #[test]
    fn test_max_frame_index_counts_direct_uploads_only() {
        let mut index = Index::new();
        assert_eq!(index.max_frame_index(), 0);

        index
            .entries
            .insert("a.jpg".into(), entry(b"a", Some(link("f1", Some("f1"), 3))));
        index
            .entries
            .insert("b.jpg".into(), entry(b"b", Some(link("f2", Some("other"), 9))));
        index.staged.insert(
            "c.jpg".into(),
            StagedChange::Added(entry(b"c", Some(link("f3", Some("f3"), 5)))),
        );
        assert_eq!(index.max_frame_index(), 5);
    }

    #[test]
    fn test_frame_file_names() {
        let link = link("abc", Some("abc"), 7);
        let name = link.file_name();
        assert_eq!(name, "video-ds1-frame-000007-abc.jpg");
        let parsed = FrameLink::parse_file_name(&name).unwrap();
        assert_eq!(parsed.video_id, "ds1");
        assert_eq!(parsed.frame_index, 7);
        assert_eq!(parsed.dataset_frame_id, "abc");
        assert!(FrameLink::parse_file_name("a.jpg").is_none());
        assert!(FrameLink::parse_file_name("video-x-frame-notanumber-y.jpg").is_none());
    }
}
