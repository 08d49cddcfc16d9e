//! Active storage and recycle bin.
//!
//! Both directories are flat. A filename lives in at most one of them; moves
//! between them are renames performed under the name's lock. Uploads are
//! written to `<active>/.staging/` first and renamed into place, so readers
//! never observe a partial file.
//!
//! ```text
//! {active_dir}/
//! ├── .staging/
//! │   └── 5f0c...-uuid        (in-flight upload)
//! ├── report.pdf
//! └── notes.txt
//! {recycle_dir}/
//! └── old.log               (deletion time kept in RecycleIndex)
//! ```

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::fs::{self, File};
use tokio::io::AsyncRead;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::locks::NameLocks;
use super::name::{validate_filename, STAGING_DIR};
use super::recycle::RecycleIndex;
use super::transfer::stream_exact;
use crate::{FilebinError, Result};

/// Default per-chunk timeout for uploads.
pub const DEFAULT_TRANSFER_TIMEOUT: Duration = Duration::from_secs(60);

/// File store owning the active directory, the recycle bin and their locks.
#[derive(Debug)]
pub struct FileStore {
    active_dir: PathBuf,
    recycle_dir: PathBuf,
    staging_dir: PathBuf,
    locks: NameLocks,
    recycled: RecycleIndex,
    transfer_timeout: Duration,
}

impl FileStore {
    /// Open (creating if needed) the store directories.
    ///
    /// Leftover staging files from an earlier run are removed, and files
    /// already in the recycle bin are tracked as deleted now.
    pub async fn new(
        active_dir: impl Into<PathBuf>,
        recycle_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        let active_dir = active_dir.into();
        let recycle_dir = recycle_dir.into();
        let staging_dir = active_dir.join(STAGING_DIR);

        fs::create_dir_all(&active_dir).await?;
        fs::create_dir_all(&recycle_dir).await?;
        fs::create_dir_all(&staging_dir).await?;

        let store = Self {
            active_dir,
            recycle_dir,
            staging_dir,
            locks: NameLocks::new(),
            recycled: RecycleIndex::new(),
            transfer_timeout: DEFAULT_TRANSFER_TIMEOUT,
        };

        let stale = store.clear_staging().await?;
        let tracked = store.track_untracked_recycled().await?;
        info!(
            active = %store.active_dir.display(),
            recycle = %store.recycle_dir.display(),
            stale_uploads = stale,
            recycled = tracked,
            "File store opened"
        );

        Ok(store)
    }

    /// Set how long an upload may stall on a single chunk.
    pub fn with_transfer_timeout(mut self, timeout: Duration) -> Self {
        self.transfer_timeout = timeout;
        self
    }

    pub fn active_dir(&self) -> &Path {
        &self.active_dir
    }

    pub fn recycle_dir(&self) -> &Path {
        &self.recycle_dir
    }

    /// Store exactly `size` bytes from `reader` under `name`.
    ///
    /// Replaces an active file of the same name and supersedes a recycled one.
    pub async fn put<R>(&self, name: &str, reader: &mut R, size: u64) -> Result<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        validate_filename(name)?;

        let staging = StagingFile::new(self.staging_dir.join(Uuid::new_v4().to_string()));
        let mut file = File::create(staging.path()).await?;
        stream_exact(reader, &mut file, size, self.transfer_timeout).await?;
        file.sync_all().await?;
        drop(file);

        let _guard = self.locks.lock(name).await;
        fs::rename(staging.path(), self.active_dir.join(name)).await?;
        staging.commit();

        if self.recycled.remove(name).is_some() {
            remove_if_exists(&self.recycle_dir.join(name)).await?;
            debug!(file = %name, "Upload superseded recycled copy");
        }

        debug!(file = %name, size = size, "File stored");
        Ok(size)
    }

    /// Open an active file for reading, returning it with its size.
    ///
    /// The handle stays readable even if the name is deleted afterwards.
    pub async fn open(&self, name: &str) -> Result<(File, u64)> {
        validate_filename(name)?;
        let _guard = self.locks.lock(name).await;

        let path = self.active_dir.join(name);
        let file = File::open(&path)
            .await
            .map_err(|e| not_found_or_io(e, name))?;
        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(FilebinError::NotFound(name.to_string()));
        }

        Ok((file, metadata.len()))
    }

    /// Active filenames containing `keyword` (case-insensitive), sorted.
    pub async fn list_active(&self, keyword: &str) -> Result<Vec<String>> {
        list_matching(&self.active_dir, keyword).await
    }

    /// Recycled filenames containing `keyword` (case-insensitive), sorted.
    pub async fn list_recycled(&self, keyword: &str) -> Result<Vec<String>> {
        list_matching(&self.recycle_dir, keyword).await
    }

    /// Move an active file into the recycle bin.
    pub async fn soft_delete(&self, name: &str) -> Result<()> {
        validate_filename(name)?;
        let _guard = self.locks.lock(name).await;

        let source = self.active_dir.join(name);
        ensure_regular_file(&source, name).await?;
        fs::rename(&source, self.recycle_dir.join(name))
            .await
            .map_err(|e| not_found_or_io(e, name))?;
        self.recycled.record(name, Utc::now());

        debug!(file = %name, "File moved to recycle bin");
        Ok(())
    }

    /// Move a recycled file back into active storage.
    pub async fn restore(&self, name: &str) -> Result<()> {
        validate_filename(name)?;
        let _guard = self.locks.lock(name).await;

        let source = self.recycle_dir.join(name);
        ensure_regular_file(&source, name).await?;
        fs::rename(&source, self.active_dir.join(name))
            .await
            .map_err(|e| not_found_or_io(e, name))?;
        self.recycled.remove(name);

        debug!(file = %name, "File restored");
        Ok(())
    }

    /// When `name` was moved into the recycle bin, if it is there.
    pub fn recycled_at(&self, name: &str) -> Option<DateTime<Utc>> {
        self.recycled.get(name)
    }

    /// Permanently remove recycled files deleted more than `age` ago.
    pub async fn purge_older_than(&self, age: Duration) -> Result<usize> {
        let cutoff = chrono::Duration::from_std(age)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age));
        match cutoff {
            Some(cutoff) => self.purge_deleted_before(cutoff).await,
            None => Ok(0),
        }
    }

    /// Permanently remove recycled files deleted before `cutoff`.
    ///
    /// Each candidate is re-checked under its name lock, so an entry restored
    /// or re-deleted in the meantime is left alone.
    pub async fn purge_deleted_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        self.track_untracked_recycled().await?;

        let mut purged = 0;
        for name in self.recycled.deleted_before(cutoff) {
            let _guard = self.locks.lock(&name).await;

            match self.recycled.get(&name) {
                Some(deleted_at) if deleted_at < cutoff => {}
                _ => continue,
            }

            match remove_if_exists(&self.recycle_dir.join(&name)).await {
                Ok(true) => {
                    self.recycled.remove(&name);
                    purged += 1;
                    debug!(file = %name, "Recycled file purged");
                }
                Ok(false) => {
                    self.recycled.remove(&name);
                    debug!(file = %name, "Dropped stale recycle entry");
                }
                Err(e) => {
                    warn!(file = %name, error = %e, "Failed to purge recycled file");
                }
            }
        }

        Ok(purged)
    }

    /// Give a timestamp of now to recycle bin files the index does not know.
    ///
    /// The listing is unlocked, so each name is re-checked on disk under its
    /// lock before it is recorded.
    async fn track_untracked_recycled(&self) -> Result<usize> {
        let now = Utc::now();
        let mut added = 0;
        for name in list_matching(&self.recycle_dir, "").await? {
            if self.recycled.get(&name).is_some() {
                continue;
            }
            let _guard = self.locks.lock(&name).await;
            let still_recycled = matches!(
                fs::symlink_metadata(self.recycle_dir.join(&name)).await,
                Ok(m) if m.is_file()
            );
            if still_recycled && self.recycled.record_if_absent(&name, now) {
                added += 1;
            }
        }
        Ok(added)
    }

    async fn clear_staging(&self) -> Result<usize> {
        let mut removed = 0;
        let mut entries = fs::read_dir(&self.staging_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                fs::remove_file(entry.path()).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Upload in progress; the file is removed on drop unless committed.
struct StagingFile {
    path: PathBuf,
    committed: bool,
}

impl StagingFile {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            committed: false,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for StagingFile {
    fn drop(&mut self) {
        if !self.committed {
            // Drop cannot await; a small unlink is fine to do synchronously.
            if let Err(e) = std::fs::remove_file(&self.path) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(path = %self.path.display(), error = %e, "Failed to remove staging file");
                }
            }
        }
    }
}

async fn list_matching(dir: &Path, keyword: &str) -> Result<Vec<String>> {
    let needle = keyword.to_lowercase();
    let mut names = Vec::new();

    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if name.to_lowercase().contains(&needle) {
            names.push(name);
        }
    }

    names.sort();
    Ok(names)
}

async fn ensure_regular_file(path: &Path, name: &str) -> Result<()> {
    match fs::symlink_metadata(path).await {
        Ok(m) if m.is_file() => Ok(()),
        Ok(_) => Err(FilebinError::NotFound(name.to_string())),
        Err(e) => Err(not_found_or_io(e, name)),
    }
}

async fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

fn not_found_or_io(e: io::Error, name: &str) -> FilebinError {
    if e.kind() == io::ErrorKind::NotFound {
        FilebinError::NotFound(name.to_string())
    } else {
        FilebinError::Io(e)
    }
}
