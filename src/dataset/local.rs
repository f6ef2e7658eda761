//! Local dataset working copy
//!
//! `LocalDataset` drives the working copy state machine: clone, stage, commit,
//! push, pull and checkout over a linear commit chain. Index and HEAD updates
//! are all-or-nothing: new state is written to temporary files, renamed into
//! place, and only then adopted in memory.

use crate::dataset::image::{inspect, ImageInfo};
use crate::dataset::index::{FrameLink, Index, IndexEntry, StagedChange};
use crate::dataset::objects::{BlobCache, ObjectStore};
use crate::dataset::path::{canonicalize, resolve_key};
use crate::dataset::walker::{WalkedFile, Walker, WalkerConfig};
use crate::dataset::{commit_all, Commit, Heads, DATA_DIR, META_DIR};
use crate::dataset::hasher::{hash_bytes, hash_file};
use crate::error::{ApiError, StorageError};
use crate::pool::parallel_map;
use crate::processing::wait_until;
use crate::remote::{non_linear, BlobStore, DatasetRemote, COMMITTED_STATE};
use crate::types::{CommitHash, ContentHash};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Hashes per existence check.
pub const EXISTS_BATCH_SIZE: usize = 100;

const INDEX_FILE: &str = "index.json";
const HEAD_FILE: &str = "HEAD.json";
const OBJECTS_DIR: &str = "objects";

/// Remote collaborators and local resources shared by working copies.
#[derive(Clone)]
pub struct SyncContext {
    pub remote: Arc<dyn DatasetRemote>,
    pub blobs: Arc<dyn BlobStore>,
    pub cache_path: PathBuf,
    pub workers: usize,
}

impl SyncContext {
    pub fn new(
        remote: Arc<dyn DatasetRemote>,
        blobs: Arc<dyn BlobStore>,
        cache_path: impl AsRef<Path>,
        workers: usize,
    ) -> Self {
        Self {
            remote,
            blobs,
            cache_path: cache_path.as_ref().to_path_buf(),
            workers: workers.max(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

impl From<&StagedChange> for ChangeKind {
    fn from(change: &StagedChange) -> Self {
        match change {
            StagedChange::Added(_) => ChangeKind::Added,
            StagedChange::Modified(_) => ChangeKind::Modified,
            StagedChange::Removed => ChangeKind::Removed,
        }
    }
}

/// Result of `status`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatusReport {
    /// Changes staged for the next commit.
    pub staged: Vec<(String, ChangeKind)>,
    /// Differences between the working tree and the staged tree.
    pub unstaged: Vec<(String, ChangeKind)>,
    pub staged_images: usize,
    pub head: Option<CommitHash>,
    /// Whether local commits have not been pushed.
    pub unpushed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexProblem {
    Missing { key: String },
    HashMismatch { key: String, expected: ContentHash, actual: ContentHash },
}

impl IndexProblem {
    pub fn key(&self) -> &str {
        match self {
            IndexProblem::Missing { key } | IndexProblem::HashMismatch { key, .. } => key,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PushReport {
    pub commits: usize,
    pub blobs_uploaded: usize,
    pub head: Option<CommitHash>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PullReport {
    pub commits: usize,
    pub head: Option<CommitHash>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ImagePushReport {
    pub uploaded: usize,
    pub skipped: usize,
    /// Data files created, one per staged image.
    pub frames: Vec<String>,
}

pub struct LocalDataset {
    root: PathBuf,
    index: Index,
    heads: Heads,
    objects: ObjectStore,
    cache: BlobCache,
    ctx: SyncContext,
}

fn meta_dir(root: &Path) -> PathBuf {
    root.join(META_DIR)
}

impl LocalDataset {
    /// Creates a working copy of `dataset_id` at `path`, checked out at the
    /// remote HEAD. `path` must not exist or be an empty directory.
    pub fn clone(ctx: SyncContext, dataset_id: &str, path: &Path) -> Result<Self, ApiError> {
        if path.exists() {
            let occupied = !path.is_dir() || fs::read_dir(path)?.next().is_some();
            if occupied {
                return Err(StorageError::PathExists(path.to_path_buf()).into());
            }
        }
        fs::create_dir_all(meta_dir(path))?;
        fs::create_dir_all(path.join(DATA_DIR))?;

        let root = canonicalize(path)?;
        let head = ctx.remote.head(dataset_id)?;
        info!(dataset_id, path = %root.display(), head = ?head.map(|h| h.short()), "Cloning dataset");

        let mut dataset = Self {
            objects: ObjectStore::new(meta_dir(&root).join(OBJECTS_DIR)),
            cache: BlobCache::new(&ctx.cache_path),
            index: Index::new(),
            heads: Heads::new(dataset_id, None),
            root,
            ctx,
        };

        let fetched = dataset.fetch_chain(head, None)?;
        let tree = match fetched.first() {
            Some(tip) => tip.tree.clone(),
            None => BTreeMap::new(),
        };
        dataset.materialize(&tree)?;

        let index = Index::from_tree(tree);
        let heads = Heads::new(dataset_id, head);
        dataset.write_state(&index, &heads)?;
        dataset.index = index;
        dataset.heads = heads;
        Ok(dataset)
    }

    /// Opens an existing working copy.
    pub fn open(ctx: SyncContext, path: &Path) -> Result<Self, ApiError> {
        let meta = meta_dir(path);
        if !meta.is_dir() {
            return Err(StorageError::InvalidLocalDataset(path.to_path_buf()).into());
        }
        let root = canonicalize(path)?;
        let meta = meta_dir(&root);
        let index = Index::load(&meta.join(INDEX_FILE))?;
        let heads = Heads::load(&meta.join(HEAD_FILE))?;
        Ok(Self {
            objects: ObjectStore::new(meta.join(OBJECTS_DIR)),
            cache: BlobCache::new(&ctx.cache_path),
            root,
            index,
            heads,
            ctx,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dataset_id(&self) -> &str {
        &self.heads.dataset_id
    }

    pub fn head(&self) -> Option<CommitHash> {
        self.heads.head
    }

    pub fn heads(&self) -> &Heads {
        &self.heads
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    fn index_path(&self) -> PathBuf {
        meta_dir(&self.root).join(INDEX_FILE)
    }

    fn heads_path(&self) -> PathBuf {
        meta_dir(&self.root).join(HEAD_FILE)
    }

    /// Persists index and HEAD together; either both files change or neither.
    fn write_state(&self, index: &Index, heads: &Heads) -> Result<(), StorageError> {
        commit_all(vec![
            index.prepare_save(&self.index_path()),
            heads.prepare_save(&self.heads_path()),
        ])
    }

    fn write_index(&self, index: &Index) -> Result<(), StorageError> {
        index.save(&self.index_path())
    }

    /// Hashes every file in the working tree.
    fn scan(&self) -> Result<BTreeMap<String, (WalkedFile, ContentHash)>, StorageError> {
        let mut config = WalkerConfig::default();
        if let Ok(cache) = canonicalize(&self.ctx.cache_path) {
            if cache != self.root && cache.starts_with(&self.root) {
                config.ignore_paths.push(cache);
            }
        }
        let files = Walker::with_config(&self.root, config).walk()?;
        let hashed = parallel_map(
            files,
            self.ctx.workers,
            |file| -> Result<(WalkedFile, ContentHash), StorageError> {
                let hash = hash_file(&file.path)?;
                Ok((file, hash))
            },
        );
        let mut scanned = BTreeMap::new();
        for result in hashed {
            let (file, hash) = result?;
            scanned.insert(file.key.clone(), (file, hash));
        }
        Ok(scanned)
    }

    /// Differences from `tree` to the scanned working tree.
    fn diff(
        &self,
        tree: &BTreeMap<String, IndexEntry>,
        scanned: &BTreeMap<String, (WalkedFile, ContentHash)>,
    ) -> BTreeMap<String, StagedChange> {
        let mut changes = BTreeMap::new();
        for (key, (file, hash)) in scanned {
            let frame = self.frame_link_for(key);
            let entry = IndexEntry {
                hash: *hash,
                size: file.size,
                frame,
            };
            match tree.get(key) {
                None => {
                    changes.insert(key.clone(), StagedChange::Added(entry));
                }
                Some(existing) if existing.hash != *hash => {
                    changes.insert(key.clone(), StagedChange::Modified(entry));
                }
                Some(_) => {}
            }
        }
        for key in tree.keys() {
            if !scanned.contains_key(key) {
                changes.insert(key.clone(), StagedChange::Removed);
            }
        }
        changes
    }

    /// Frame link for a data file: the one already recorded, else one parsed
    /// from the file name.
    fn frame_link_for(&self, key: &str) -> Option<FrameLink> {
        let recorded = match self.index.staged.get(key) {
            Some(StagedChange::Added(e)) | Some(StagedChange::Modified(e)) => e.frame.clone(),
            _ => self.index.entries.get(key).and_then(|e| e.frame.clone()),
        };
        if recorded.is_some() {
            return recorded;
        }
        let name = key.strip_prefix(DATA_DIR)?.strip_prefix('/')?;
        let mut link = FrameLink::parse_file_name(name)?;
        if link.video_id == self.heads.dataset_id {
            link.frame_id = Some(link.dataset_frame_id.clone());
        }
        Some(link)
    }

    /// Stages every difference between the working tree and the committed
    /// tree, replacing the previous staged set. Returns the number of staged
    /// changes.
    pub fn add_local_changes(&mut self) -> Result<usize, ApiError> {
        let scanned = self.scan()?;
        let staged = self.diff(&self.index.entries, &scanned);

        let mut index = self.index.clone();
        index.staged = staged;
        self.write_index(&index)?;
        self.index = index;

        info!(staged = self.index.staged.len(), "Staged local changes");
        Ok(self.index.staged.len())
    }

    /// Staged and unstaged changes; the index is not modified.
    pub fn status(&self) -> Result<StatusReport, ApiError> {
        let scanned = self.scan()?;
        let unstaged = self
            .diff(&self.index.staged_tree(), &scanned)
            .iter()
            .map(|(k, c)| (k.clone(), ChangeKind::from(c)))
            .collect();
        let staged = self
            .index
            .staged
            .iter()
            .map(|(k, c)| (k.clone(), ChangeKind::from(c)))
            .collect();
        Ok(StatusReport {
            staged,
            unstaged,
            staged_images: self.index.staged_images.len(),
            head: self.heads.head,
            unpushed: self.heads.has_unpushed(),
        })
    }

    /// Commits the staged set on top of HEAD.
    pub fn commit(&mut self, message: &str, author: &str) -> Result<Commit, ApiError> {
        if !self.index.has_staged_changes() {
            return Err(ApiError::EmptyCommit);
        }

        // Keep the bytes of every committed file; this also catches files
        // edited after staging.
        for (key, change) in &self.index.staged {
            if let StagedChange::Added(entry) | StagedChange::Modified(entry) = change {
                let source = resolve_key(&self.root, key)?;
                self.cache.put_file(&source, &entry.hash)?;
            }
        }

        let tree = self.index.staged_tree();
        let commit = Commit::new(self.heads.head, tree.clone(), message, author);
        self.objects.put(&commit)?;

        let mut index = Index::from_tree(tree);
        index.staged_images = self.index.staged_images.clone();
        let mut heads = self.heads.clone();
        heads.head = Some(commit.hash);

        self.write_state(&index, &heads)?;
        self.index = index;
        self.heads = heads;

        info!(hash = %commit.hash.short(), files = commit.tree.len(), msg = message, "Committed");
        Ok(commit)
    }

    /// Commits from HEAD back to (excluding) `base`, oldest first. Fails when
    /// `base` is not an ancestor of HEAD.
    fn unpushed_chain(&self, base: Option<CommitHash>) -> Result<Vec<Commit>, ApiError> {
        let mut chain = Vec::new();
        let mut next = self.heads.head;
        while next != base {
            let Some(hash) = next else {
                return Err(non_linear(self.heads.head.as_ref(), base.as_ref()));
            };
            let commit = self
                .objects
                .get(&hash)?
                .ok_or_else(|| ApiError::CommitNotFound(hash.to_hex()))?;
            next = commit.parent;
            chain.push(commit);
        }
        chain.reverse();
        Ok(chain)
    }

    /// Sends local commits to the remote. The remote HEAD must be an ancestor
    /// of the local HEAD; blobs the remote lacks are uploaded first.
    pub fn push_commits(&mut self) -> Result<PushReport, ApiError> {
        let dataset_id = self.heads.dataset_id.clone();
        let remote_head = self.ctx.remote.head(&dataset_id)?;
        let chain = self.unpushed_chain(remote_head)?;

        if chain.is_empty() {
            debug!(dataset_id = %dataset_id, "Nothing to push");
            self.record_synced(remote_head)?;
            return Ok(PushReport {
                commits: 0,
                blobs_uploaded: 0,
                head: remote_head,
            });
        }

        let mut blobs: BTreeMap<ContentHash, String> = BTreeMap::new();
        for commit in &chain {
            for (key, entry) in &commit.tree {
                blobs.entry(entry.hash).or_insert_with(|| key.clone());
            }
        }
        let sources: Vec<BlobSource> = blobs
            .into_iter()
            .map(|(hash, key)| BlobSource {
                hash,
                filename: key.rsplit('/').next().unwrap_or(&key).to_string(),
                path: self.cache.path_for(&hash),
            })
            .collect();
        let (uploaded, _) = self.ensure_remote_blobs(&sources)?;

        let head = self
            .ctx
            .remote
            .push_commits(&dataset_id, remote_head, &chain)?;
        self.record_synced(Some(head))?;

        info!(dataset_id = %dataset_id, commits = chain.len(), uploaded, head = %head.short(), "Pushed commits");
        Ok(PushReport {
            commits: chain.len(),
            blobs_uploaded: uploaded,
            head: Some(head),
        })
    }

    fn record_synced(&mut self, synced: Option<CommitHash>) -> Result<(), ApiError> {
        if self.heads.synced == synced {
            return Ok(());
        }
        let mut heads = self.heads.clone();
        heads.synced = synced;
        heads.save(&self.heads_path())?;
        self.heads = heads;
        Ok(())
    }

    /// Makes sure the remote has every blob; returns (uploaded, skipped).
    fn ensure_remote_blobs(&self, sources: &[BlobSource]) -> Result<(usize, usize), ApiError> {
        let mut missing = Vec::new();
        for batch in sources.chunks(EXISTS_BATCH_SIZE) {
            let hashes: Vec<ContentHash> = batch.iter().map(|s| s.hash).collect();
            let exists = self.ctx.blobs.exists(&hashes)?;
            if exists.len() != batch.len() {
                return Err(ApiError::MalformedQuery(format!(
                    "Existence check returned {} results for {} hashes",
                    exists.len(),
                    batch.len()
                )));
            }
            for (source, found) in batch.iter().zip(exists) {
                if found {
                    debug!(filename = %source.filename, "Already on remote, skipping upload");
                } else {
                    missing.push(source);
                }
            }
        }
        let skipped = sources.len() - missing.len();

        let blobs = &self.ctx.blobs;
        let results = parallel_map(missing, self.ctx.workers, |source| {
            let outcome = fs::read(&source.path)
                .map_err(ApiError::from)
                .and_then(|bytes| blobs.upload(&source.hash, &bytes, &source.filename));
            (source.filename.clone(), outcome)
        });

        let mut completed = 0;
        let mut failed = Vec::new();
        for (filename, outcome) in results {
            match outcome {
                Ok(()) => completed += 1,
                Err(e) => {
                    warn!(filename = %filename, error = %e, "Upload failed");
                    failed.push(filename);
                }
            }
        }
        if !failed.is_empty() {
            return Err(ApiError::UploadFailed { completed, failed });
        }
        Ok((completed, skipped))
    }

    /// Fetches commits from `tip` back to (excluding) `stop`, newest first,
    /// storing each. Fails when the root is reached without meeting `stop`.
    fn fetch_chain(
        &self,
        tip: Option<CommitHash>,
        stop: Option<CommitHash>,
    ) -> Result<Vec<Commit>, ApiError> {
        let mut chain = Vec::new();
        let mut next = tip;
        while next != stop {
            let Some(hash) = next else {
                return Err(non_linear(stop.as_ref(), tip.as_ref()));
            };
            let commit = match self.objects.get(&hash)? {
                Some(commit) => commit,
                None => {
                    let commit = self.ctx.remote.fetch_commit(&self.heads.dataset_id, &hash)?;
                    if commit.hash != hash {
                        return Err(StorageError::HashMismatch {
                            path: "fetched commit".to_string(),
                            expected: hash.to_hex(),
                            actual: commit.hash.to_hex(),
                        }
                        .into());
                    }
                    self.objects.put(&commit)?;
                    commit
                }
            };
            next = commit.parent;
            chain.push(commit);
        }
        Ok(chain)
    }

    /// Fast-forwards to the remote HEAD.
    pub fn pull(&mut self) -> Result<PullReport, ApiError> {
        if self.index.has_staged_changes() {
            return Err(ApiError::UncommittedChanges(self.index.staged.len()));
        }
        let remote_head = self.ctx.remote.head(&self.heads.dataset_id)?;
        if remote_head == self.heads.head {
            self.record_synced(remote_head)?;
            return Ok(PullReport {
                commits: 0,
                head: remote_head,
            });
        }

        let fetched = self.fetch_chain(remote_head, self.heads.head)?;
        let Some(tip) = fetched.first() else {
            return Ok(PullReport {
                commits: 0,
                head: self.heads.head,
            });
        };
        let tree = tip.tree.clone();
        self.switch_to(tree, remote_head, remote_head)?;

        info!(commits = fetched.len(), head = ?remote_head.map(|h| h.short()), "Pulled");
        Ok(PullReport {
            commits: fetched.len(),
            head: remote_head,
        })
    }

    /// Rewrites the working tree to the tree of `hash`. Staged changes are
    /// only discarded when `discard_staged` is set.
    pub fn checkout(&mut self, hash: &CommitHash, discard_staged: bool) -> Result<(), ApiError> {
        if self.index.has_staged_changes() && !discard_staged {
            return Err(ApiError::UncommittedChanges(self.index.staged.len()));
        }
        let commit = match self.objects.get(hash)? {
            Some(commit) => commit,
            None => match self.ctx.remote.fetch_commit(&self.heads.dataset_id, hash) {
                Ok(commit) if commit.hash == *hash => {
                    self.objects.put(&commit)?;
                    commit
                }
                Ok(_) | Err(ApiError::CommitNotFound(_)) => {
                    return Err(ApiError::CommitNotFound(hash.to_hex()))
                }
                Err(e) => return Err(e),
            },
        };
        let synced = self.heads.synced;
        self.switch_to(commit.tree, Some(*hash), synced)?;
        info!(hash = %hash.short(), "Checked out");
        Ok(())
    }

    /// Materializes `tree`, then adopts it as index and HEAD.
    fn switch_to(
        &mut self,
        tree: BTreeMap<String, IndexEntry>,
        head: Option<CommitHash>,
        synced: Option<CommitHash>,
    ) -> Result<(), ApiError> {
        // Every blob is cached and verified before the working tree changes.
        self.fetch_missing(&tree)?;

        // Tracked files that the target tree drops.
        let mut tracked: BTreeSet<&String> = self.index.entries.keys().collect();
        for (key, change) in &self.index.staged {
            if let StagedChange::Added(_) = change {
                tracked.insert(key);
            }
        }
        for key in tracked {
            if !tree.contains_key(key) {
                let path = resolve_key(&self.root, key)?;
                if path.exists() {
                    fs::remove_file(&path)?;
                }
            }
        }
        self.materialize(&tree)?;

        let mut index = Index::from_tree(tree);
        index.staged_images = self.index.staged_images.clone();
        let mut heads = self.heads.clone();
        heads.head = head;
        heads.synced = synced;

        self.write_state(&index, &heads)?;
        self.index = index;
        self.heads = heads;
        Ok(())
    }

    /// Writes every file of `tree`, downloading blobs missing from the cache.
    fn materialize(&self, tree: &BTreeMap<String, IndexEntry>) -> Result<(), ApiError> {
        self.fetch_missing(tree)?;
        for (key, entry) in tree {
            let dest = resolve_key(&self.root, key)?;
            self.cache.checkout_to(&entry.hash, &dest)?;
        }
        Ok(())
    }

    /// Downloads into the cache every blob of `tree` it lacks, checking
    /// each against its hash.
    fn fetch_missing(&self, tree: &BTreeMap<String, IndexEntry>) -> Result<(), ApiError> {
        let mut to_fetch: Vec<ContentHash> = tree
            .values()
            .map(|e| e.hash)
            .filter(|h| !self.cache.contains(h))
            .collect();
        to_fetch.sort();
        to_fetch.dedup();

        let blobs = &self.ctx.blobs;
        let cache = &self.cache;
        let results = parallel_map(to_fetch, self.ctx.workers, |hash| -> Result<(), ApiError> {
            let bytes = blobs.download(&hash)?;
            let actual = hash_bytes(&bytes);
            if actual != hash {
                return Err(StorageError::HashMismatch {
                    path: format!("blob {}", hash.short()),
                    expected: hash.to_hex(),
                    actual: actual.to_hex(),
                }
                .into());
            }
            cache.put(&bytes)?;
            Ok(())
        });
        for result in results {
            result?;
        }
        Ok(())
    }

    /// Adds image paths to the upload staging list. Every path is checked
    /// before any is added. Returns the number of newly staged paths.
    pub fn stage_local_images(&mut self, paths: &[PathBuf]) -> Result<usize, ApiError> {
        let mut resolved = Vec::with_capacity(paths.len());
        for path in paths {
            if !path.exists() {
                return Err(ApiError::InvalidImage {
                    path: path.clone(),
                    reason: "does not exist".to_string(),
                });
            }
            inspect(path)?;
            resolved.push(canonicalize(path)?);
        }

        let mut index = self.index.clone();
        let mut added = 0;
        for path in resolved {
            if !index.staged_images.contains(&path) {
                info!(path = %path.display(), "Staging image");
                index.staged_images.push(path);
                added += 1;
            }
        }
        self.write_index(&index)?;
        self.index = index;
        Ok(added)
    }

    /// Uploads staged images the remote does not have, then adds one data
    /// file per image with a new frame link and stages it. On upload failure
    /// the index is left untouched.
    pub fn push_staged_images(&mut self) -> Result<ImagePushReport, ApiError> {
        let staged = self.index.staged_images.clone();
        if staged.is_empty() {
            info!("No staged images to push");
            return Ok(ImagePushReport::default());
        }

        let infos: Vec<ImageInfo> = parallel_map(staged, self.ctx.workers, |p| inspect(&p))
            .into_iter()
            .collect::<Result<_, _>>()?;

        let mut seen = HashSet::new();
        let sources: Vec<BlobSource> = infos
            .iter()
            .filter(|info| seen.insert(info.hash))
            .map(|info| BlobSource {
                hash: info.hash,
                filename: info
                    .path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| info.hash.to_hex()),
                path: info.path.clone(),
            })
            .collect();
        let (uploaded, skipped) = self.ensure_remote_blobs(&sources)?;

        let mut index = self.index.clone();
        let mut next_index = index.max_frame_index() + 1;
        let mut frames = Vec::with_capacity(infos.len());
        for info in &infos {
            let id = self.ctx.remote.generate_id()?;
            let link = FrameLink {
                dataset_frame_id: id.clone(),
                frame_id: Some(id),
                video_id: self.heads.dataset_id.clone(),
                frame_index: next_index,
                width: Some(info.width),
                height: Some(info.height),
            };
            next_index += 1;

            let key = format!("{}/{}", DATA_DIR, link.file_name());
            self.cache.put_file(&info.path, &info.hash)?;
            self.cache
                .checkout_to(&info.hash, &resolve_key(&self.root, &key)?)?;
            debug!(key = %key, "Added dataset frame");

            index.staged.insert(
                key.clone(),
                StagedChange::Added(IndexEntry {
                    hash: info.hash,
                    size: info.size,
                    frame: Some(link),
                }),
            );
            frames.push(key);
        }
        index.staged_images.clear();
        self.write_index(&index)?;
        self.index = index;

        info!(uploaded, skipped, frames = frames.len(), "Pushed staged images");
        Ok(ImagePushReport {
            uploaded,
            skipped,
            frames,
        })
    }

    /// Checks every indexed file against its recorded hash. Problems are
    /// reported, never repaired.
    pub fn validate_index(&self) -> Result<Vec<IndexProblem>, ApiError> {
        let tree = self.index.staged_tree();
        let entries: Vec<(String, IndexEntry)> = tree.into_iter().collect();
        let root = &self.root;
        let checked = parallel_map(
            entries,
            self.ctx.workers,
            |(key, entry)| -> Result<Option<IndexProblem>, StorageError> {
                let path = resolve_key(root, &key)?;
                if !path.is_file() {
                    return Ok(Some(IndexProblem::Missing { key }));
                }
                let actual = hash_file(&path)?;
                if actual != entry.hash {
                    return Ok(Some(IndexProblem::HashMismatch {
                        key,
                        expected: entry.hash,
                        actual,
                    }));
                }
                Ok(None)
            },
        );

        let mut problems = Vec::new();
        for result in checked {
            if let Some(problem) = result? {
                warn!(key = problem.key(), "Index problem: {:?}", problem);
                problems.push(problem);
            }
        }
        Ok(problems)
    }

    pub fn get_staged_images(&self) -> &[PathBuf] {
        &self.index.staged_images
    }

    pub fn get_max_frame_index(&self) -> u64 {
        self.index.max_frame_index()
    }

    /// Commits reachable from HEAD, newest first.
    pub fn log(&self) -> Result<Vec<Commit>, ApiError> {
        Ok(self.objects.history(self.heads.head)?)
    }

    /// Waits until the remote has processed the latest push.
    pub fn wait_for_processing(&self, timeout: Duration, interval: Duration) -> Result<(), ApiError> {
        let dataset_id = &self.heads.dataset_id;
        wait_until(
            &format!("dataset {} commit", dataset_id),
            timeout,
            interval,
            || Ok(self.ctx.remote.commit_state(dataset_id)? == COMMITTED_STATE),
        )
    }
}

/// A blob to make available remotely, and where its bytes are.
struct BlobSource {
    hash: ContentHash,
    filename: String,
    path: PathBuf,
}
