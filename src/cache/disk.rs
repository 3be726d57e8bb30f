use crate::cache::{Cache, CacheStats, EntryStat};
use crate::fingerprint::millis_since_epoch;
use crate::{AlbumError, Result};
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::io::AsyncWriteExt;

const ENTRY_EXT: &str = "jpg";

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Disk-backed store: one `<key>.jpg` file per entry.
///
/// Entries are never mutated or evicted. When a source changes its key
/// changes too, and the old entry is left behind.
#[derive(Debug, Clone)]
pub struct DiskCache {
    dir: PathBuf,
}

impl DiskCache {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || !key.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(AlbumError::Internal(format!("invalid cache key {key:?}")));
        }
        Ok(self.dir.join(format!("{}.{}", key, ENTRY_EXT)))
    }
}

/// Writes `bytes` to a uniquely named, synced, hidden temp file next to
/// `path` and returns the temp path. On failure nothing is left behind.
pub async fn write_temp(path: &Path, bytes: &[u8]) -> Result<PathBuf> {
    let parent = path
        .parent()
        .ok_or_else(|| AlbumError::Internal("atomic write missing parent".into()))?;
    fs::create_dir_all(parent).await?;
    let tmp = parent.join(format!(
        ".{}.tmp.{}.{}",
        path.file_name().and_then(|s| s.to_str()).unwrap_or("file"),
        std::process::id(),
        TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));

    let res = async {
        let mut f = fs::File::create(&tmp).await?;
        f.write_all(bytes).await?;
        f.sync_all().await
    }
    .await;

    if let Err(e) = res {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(tmp)
}

/// Writes `bytes` via [`write_temp`] and renames the result onto `path`, so a
/// partial file is never visible under `path`.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = write_temp(path, bytes).await?;
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

#[async_trait::async_trait]
impl Cache for DiskCache {
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.stat_entry(key).await?.is_some())
    }

    async fn read(&self, key: &str) -> Result<Option<Bytes>> {
        match fs::read(self.path_for(key)?).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, key: &str, bytes: &[u8]) -> Result<EntryStat> {
        let path = self.path_for(key)?;
        write_atomic(&path, bytes).await?;
        let meta = fs::metadata(&path).await?;
        Ok(EntryStat {
            size: meta.len(),
            mtime_ms: millis_since_epoch(meta.modified()?),
        })
    }

    async fn stat_entry(&self, key: &str) -> Result<Option<EntryStat>> {
        match fs::metadata(self.path_for(key)?).await {
            Ok(meta) if meta.is_file() => Ok(Some(EntryStat {
                size: meta.len(),
                mtime_ms: millis_since_epoch(meta.modified()?),
            })),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn stats(&self) -> Result<CacheStats> {
        let mut stats = CacheStats::default();
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(stats),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXT) {
                continue;
            }
            if let Ok(meta) = entry.metadata().await {
                if meta.is_file() {
                    stats.entry_count += 1;
                    stats.total_size_bytes += meta.len();
                }
            }
        }
        Ok(stats)
    }
}
