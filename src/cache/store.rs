use std::{
    ffi::OsStr,
    path::{Component, Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned, de::IgnoredAny};
use tokio::{fs, io::AsyncWriteExt};
use tracing::instrument;

use super::Clock;
use crate::errors::CacheError;

/// Extension of the cache entry files
const ENTRY_EXTENSION: &str = "json";

/// Extension of the files being written
const TMP_EXTENSION: &str = "tmp";

/// A single item stored on disk
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    /// The cached payload
    pub data: T,
    /// When the payload was retrieved
    pub timestamp: DateTime<Utc>,
    pub region: String,
    pub query: String,
    /// When the payload was last rewritten by a background refresh
    #[serde(default)]
    pub last_refresh: Option<DateTime<Utc>>,
    /// Number of background rewrites of this entry
    #[serde(default)]
    pub refresh_attempt: u32,
    /// Whether the entry is past the stale threshold, only meaningful on inspected entries
    #[serde(default)]
    pub is_stale: bool,
}

impl<T> CacheEntry<T> {
    /// Builds a new entry retrieved at the given instant
    pub fn new(data: T, region: impl Into<String>, query: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            data,
            timestamp,
            region: region.into(),
            query: query.into(),
            last_refresh: None,
            refresh_attempt: 0,
            is_stale: false,
        }
    }

    /// Age of the entry at the given instant, entries from the future have no age
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.timestamp).to_std().unwrap_or_default()
    }
}

/// Statistics about the entries on the cache directory
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub total_files: usize,
    pub expired_files: usize,
    pub corrupt_files: usize,
    pub total_bytes: u64,
}

/// Base on-disk cache, one file per key on a single directory.
///
/// Writes go to `<key>.tmp` and are then renamed to `<key>.json`, so readers either see the previous entry or the new
/// one. No lock is held across I/O.
#[derive(Clone)]
pub struct CacheStore {
    dir: PathBuf,
    ttl: Duration,
    max_file_size: u64,
    clock: Arc<dyn Clock>,
}

impl CacheStore {
    /// Opens the store on the given directory, creating it if missing
    pub async fn open(
        dir: impl Into<PathBuf>,
        ttl: Duration,
        max_file_size: u64,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CacheError> {
        let dir: PathBuf = dir.into();
        let dir = normalize(&dir);
        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        builder.mode(0o700);
        builder.create(&dir).await?;
        Ok(Self {
            dir,
            ttl,
            max_file_size,
            clock,
        })
    }

    /// The cache directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Current time according to the store clock
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Resolves the file of an entry, rejecting keys that would escape the cache directory
    pub fn entry_path(&self, key: &str) -> Result<PathBuf, CacheError> {
        self.resolve(key, ENTRY_EXTENSION)
    }

    fn resolve(&self, key: &str, extension: &str) -> Result<PathBuf, CacheError> {
        if key.is_empty() {
            return Err(CacheError::OutsideDirectory);
        }
        let path = normalize(&self.dir.join(format!("{key}.{extension}")));
        if path.parent() != Some(self.dir.as_path()) {
            tracing::warn!("Rejected cache key escaping the cache directory: {key}");
            return Err(CacheError::OutsideDirectory);
        }
        Ok(path)
    }

    /// Reads the entry for the key, regardless of its age.
    ///
    /// Returns `None` when there's no entry, or an error when the entry can't be read, is too large or is corrupt.
    #[instrument(skip(self))]
    pub async fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<CacheEntry<T>>, CacheError> {
        let path = self.entry_path(key)?;
        match fs::metadata(&path).await {
            Ok(meta) if meta.len() > self.max_file_size => Err(CacheError::TooLarge(meta.len())),
            Ok(_) => {
                let bytes = fs::read(&path).await?;
                Ok(Some(serde_json::from_slice(&bytes)?))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Retrieves the data for the key if present and not expired.
    ///
    /// An entry exactly at the TTL boundary is expired. Any error is logged and treated as a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.read::<T>(key).await {
            Ok(Some(entry)) if entry.age(self.now()) < self.ttl => Some(entry.data),
            Ok(_) => None,
            Err(err) => {
                tracing::debug!("Cache read failed for {key}: {err}");
                None
            }
        }
    }

    /// Stores the data for the key, timestamped now
    pub async fn set<T: Serialize>(&self, key: &str, data: &T, region: &str, query: &str) -> Result<(), CacheError> {
        self.write(key, &CacheEntry::new(data, region, query, self.now())).await
    }

    /// Atomically writes an entry
    #[instrument(skip(self, entry))]
    pub async fn write<T: Serialize>(&self, key: &str, entry: &CacheEntry<T>) -> Result<(), CacheError> {
        let path = self.entry_path(key)?;
        let tmp_path = self.resolve(key, TMP_EXTENSION)?;

        let bytes = serde_json::to_vec(entry)?;
        if bytes.len() as u64 > self.max_file_size {
            return Err(CacheError::TooLarge(bytes.len() as u64));
        }

        if let Err(err) = write_private(&tmp_path, &bytes).await {
            fs::remove_file(&tmp_path).await.ok();
            return Err(err.into());
        }
        if let Err(err) = fs::rename(&tmp_path, &path).await {
            fs::remove_file(&tmp_path).await.ok();
            return Err(err.into());
        }
        tracing::trace!("Cache entry written: {}", path.display());
        Ok(())
    }

    /// Removes the entry for the key, if present
    pub async fn delete(&self, key: &str) -> Result<(), CacheError> {
        match fs::remove_file(self.entry_path(key)?).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Removes every entry, returning how many were removed
    #[instrument(skip_all)]
    pub async fn clear(&self) -> Result<usize, CacheError> {
        let mut removed = 0;
        for path in self.files().await? {
            if path.extension() == Some(OsStr::new(ENTRY_EXTENSION)) {
                fs::remove_file(&path).await?;
                removed += 1;
            }
        }
        tracing::info!("Removed {removed} cache entries");
        Ok(removed)
    }

    /// Removes entries older than `max_age`, corrupt or oversized entries and leftover temporary files.
    ///
    /// Returns how many files were removed.
    #[instrument(skip_all)]
    pub async fn cleanup(&self, max_age: Duration) -> Result<usize, CacheError> {
        let now = self.now();
        let mut removed = 0;
        for path in self.files().await? {
            let remove = match path.extension().and_then(OsStr::to_str) {
                Some(TMP_EXTENSION) => true,
                Some(ENTRY_EXTENSION) => match self.read_header(&path).await {
                    Ok(entry) => entry.age(now) > max_age,
                    Err(err) => {
                        tracing::debug!("Removing unreadable cache entry {}: {err}", path.display());
                        true
                    }
                },
                _ => false,
            };
            if remove {
                fs::remove_file(&path).await?;
                removed += 1;
            }
        }
        tracing::info!("Cleaned up {removed} cache files");
        Ok(removed)
    }

    /// Computes statistics about the stored entries
    pub async fn stats(&self) -> Result<StoreStats, CacheError> {
        let now = self.now();
        let mut stats = StoreStats::default();
        for path in self.files().await? {
            if path.extension() != Some(OsStr::new(ENTRY_EXTENSION)) {
                continue;
            }
            stats.total_files += 1;
            stats.total_bytes += fs::metadata(&path).await?.len();
            match self.read_header(&path).await {
                Ok(entry) if entry.age(now) >= self.ttl => stats.expired_files += 1,
                Ok(_) => (),
                Err(_) => stats.corrupt_files += 1,
            }
        }
        Ok(stats)
    }

    /// Reads an entry skipping its payload
    async fn read_header(&self, path: &Path) -> Result<CacheEntry<IgnoredAny>, CacheError> {
        let len = fs::metadata(path).await?.len();
        if len > self.max_file_size {
            return Err(CacheError::TooLarge(len));
        }
        let bytes = fs::read(path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Lists the regular files on the cache directory
    async fn files(&self) -> Result<Vec<PathBuf>, CacheError> {
        let mut files = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                files.push(entry.path());
            }
        }
        Ok(files)
    }
}

/// Writes the file readable by the owner only
async fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut opts = fs::OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    #[cfg(unix)]
    opts.mode(0o600);
    let mut file = opts.open(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

/// Lexically normalizes a path, resolving `.` and `..` components
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => (),
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
