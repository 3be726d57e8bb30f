use crate::cache::{Cache, DERIVED_CONTENT_TYPE};
use crate::fingerprint::SourceFile;
use crate::inflight::InFlight;
use crate::metrics::METRICS;
use crate::transform::{ImageTransformer, TransformSpec};
use crate::{AlbumError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::fs;

/// A derived image ready to be served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedImage {
    pub bytes: Bytes,
    pub content_type: &'static str,
    pub etag: String,
}

/// Produces thumbnails and placeholders through the derived-image cache.
///
/// Cheap to clone; all clones share the cache, transformer and in-flight table.
#[derive(Clone)]
pub struct Generator {
    image_dir: PathBuf,
    cache: Arc<dyn Cache>,
    transformer: Arc<dyn ImageTransformer>,
    inflight: Arc<InFlight>,
}

impl Generator {
    pub fn new(
        image_dir: PathBuf,
        cache: Arc<dyn Cache>,
        transformer: Arc<dyn ImageTransformer>,
    ) -> Self {
        Self {
            image_dir,
            cache,
            transformer,
            inflight: Arc::new(InFlight::new()),
        }
    }

    pub fn cache(&self) -> &Arc<dyn Cache> {
        &self.cache
    }

    pub async fn get_thumbnail(&self, name: &str, width: u32) -> Result<DerivedImage> {
        self.get_derived(name, TransformSpec::thumbnail(width))
            .await
    }

    /// Blurred 16px preview as an inline `data:` URI.
    pub async fn get_placeholder(&self, name: &str) -> Result<String> {
        let img = self.get_derived(name, TransformSpec::placeholder()).await?;
        Ok(format!(
            "data:{};base64,{}",
            img.content_type,
            STANDARD.encode(&img.bytes)
        ))
    }

    /// Placeholders for `names` in order, generating at most `concurrency`
    /// at a time. A failed placeholder is logged and comes back as `None`.
    pub async fn placeholders(&self, names: &[String], concurrency: usize) -> Vec<Option<String>> {
        let futures: Vec<_> = names
            .iter()
            .map(|name| async move {
                match self.get_placeholder(name).await {
                    Ok(uri) => Some(uri),
                    Err(e) => {
                        tracing::warn!("Placeholder failed for {}: {}", name, e);
                        None
                    }
                }
            })
            .collect();
        stream::iter(futures)
            .buffered(concurrency.max(1))
            .collect()
            .await
    }

    /// Validator of the cached entry for `name` under `spec`, from a stat of
    /// the entry alone. `None` if nothing is cached yet.
    pub async fn cached_etag(&self, name: &str, spec: TransformSpec) -> Result<Option<String>> {
        let source = SourceFile::stat(&self.image_dir, name).await?;
        let key = source.key_for(&spec);
        Ok(self.cache.stat_entry(&key).await?.map(|stat| stat.etag()))
    }

    /// Cache lookup, generating on a miss.
    ///
    /// There is no freshness check against the source: its mtime is part of
    /// the key, so an edited source always misses.
    pub async fn get_derived(&self, name: &str, spec: TransformSpec) -> Result<DerivedImage> {
        let source = SourceFile::stat(&self.image_dir, name).await?;
        let key = source.key_for(&spec);

        if let Some(hit) = self.lookup(&key).await? {
            tracing::debug!(
                "Cache hit for name={}, spec={}, key={}",
                name,
                spec.canonical(),
                key
            );
            METRICS.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(hit);
        }

        // Generation runs detached so that a client disconnect does not
        // abandon a half-done transform; the result still lands in the cache.
        let this = self.clone();
        tokio::spawn(async move { this.generate(key, source, spec).await })
            .await
            .map_err(|e| AlbumError::Internal(format!("generation task failed: {}", e)))?
    }

    async fn lookup(&self, key: &str) -> Result<Option<DerivedImage>> {
        let Some(stat) = self.cache.stat_entry(key).await? else {
            return Ok(None);
        };
        let Some(bytes) = self.cache.read(key).await? else {
            return Ok(None);
        };
        Ok(Some(DerivedImage {
            bytes,
            content_type: DERIVED_CONTENT_TYPE,
            etag: stat.etag(),
        }))
    }

    async fn generate(
        &self,
        key: String,
        source: SourceFile,
        spec: TransformSpec,
    ) -> Result<DerivedImage> {
        let _guard = self.inflight.acquire(&key).await;

        // Another request may have finished this key while we waited.
        if let Some(hit) = self.lookup(&key).await? {
            tracing::debug!("Cache filled concurrently for key={}", key);
            METRICS.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(hit);
        }

        tracing::info!(
            "Cache miss for name={}, spec={}, key={}",
            source.name,
            spec.canonical(),
            key
        );
        METRICS.cache_misses.fetch_add(1, Ordering::Relaxed);

        let original = match fs::read(&source.path).await {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(AlbumError::NotFound(source.name))
            }
            Err(e) => return Err(e.into()),
        };

        let transformer = self.transformer.clone();
        let encoded = tokio::task::spawn_blocking(move || transformer.render(&original, &spec))
            .await
            .map_err(|e| AlbumError::Internal(format!("transform task failed: {}", e)))??;
        METRICS.transforms.fetch_add(1, Ordering::Relaxed);

        let stat = self.cache.write(&key, &encoded).await?;
        tracing::debug!("Stored key={} ({} bytes)", key, stat.size);

        Ok(DerivedImage {
            bytes: Bytes::from(encoded),
            content_type: DERIVED_CONTENT_TYPE,
            etag: stat.etag(),
        })
    }
}
