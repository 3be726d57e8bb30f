// Re-export modules
pub mod disk;
pub mod policy;
pub mod validator;

pub use disk::DiskCache;
pub use policy::CachePolicy;
pub use validator::{compute_validator, is_fresh};

use crate::Result;
use bytes::Bytes;
use serde::Serialize;

/// Content type of every derived artifact.
pub const DERIVED_CONTENT_TYPE: &str = "image/jpeg";

/// Stat snapshot of a stored entry, the input to its validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryStat {
    pub size: u64,
    pub mtime_ms: i64,
}

impl EntryStat {
    pub fn etag(&self) -> String {
        compute_validator(self.size, self.mtime_ms)
    }
}

/// Statistics about the cache
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub total_size_bytes: u64,
    pub entry_count: usize,
}

/// Write-once key/bytes store for derived images.
#[async_trait::async_trait]
pub trait Cache: Send + Sync {
    async fn exists(&self, key: &str) -> Result<bool>;

    /// `None` on a miss.
    async fn read(&self, key: &str) -> Result<Option<Bytes>>;

    /// Stores `bytes` under `key`. Readers see either nothing or the whole entry.
    async fn write(&self, key: &str, bytes: &[u8]) -> Result<EntryStat>;

    async fn stat_entry(&self, key: &str) -> Result<Option<EntryStat>>;

    async fn stats(&self) -> Result<CacheStats>;
}
