//! Cache keys and source file identity.
//!
//! A derived image is addressed by `fingerprint(name, spec, mtime)`. The source
//! mtime is baked into the key, so editing a photo moves it to a fresh key and
//! the previous entry is simply never looked up again.

use crate::transform::TransformSpec;
use crate::{AlbumError, Result};
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs;

/// Deterministic hex key for a derived image.
///
/// The name is length-prefixed so that no choice of name can collide with a
/// different (name, params) split of the same string.
pub fn fingerprint(name: &str, spec: &TransformSpec, mtime_ms: i64) -> String {
    let canonical = format!("{}:{}|{}|{}", name.len(), name, spec.canonical(), mtime_ms);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

/// Milliseconds since the Unix epoch, negative for pre-epoch timestamps.
pub fn millis_since_epoch(t: SystemTime) -> i64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_millis() as i64,
        Err(e) => -(e.duration().as_millis() as i64),
    }
}

/// Checks that `name` is a single, plain path segment.
pub fn validate_name(name: &str) -> Result<()> {
    let invalid = || AlbumError::InvalidPath(name.to_string());
    if name.is_empty() || name.contains(['/', '\\', '\0']) {
        return Err(invalid());
    }
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(invalid()),
    }
}

/// Resolves `name` to an absolute path strictly inside `root`.
///
/// Both sides are canonicalized, so a symlink pointing outside the root is
/// rejected as well. A missing target is `InvalidPath`.
pub async fn resolve_source_path(root: &Path, name: &str) -> Result<PathBuf> {
    validate_name(name)?;
    let root = fs::canonicalize(root).await?;
    let resolved = match fs::canonicalize(root.join(name)).await {
        Ok(p) => p,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(AlbumError::InvalidPath(name.to_string()))
        }
        Err(e) => return Err(e.into()),
    };
    if resolved.parent() != Some(root.as_path()) {
        return Err(AlbumError::InvalidPath(name.to_string()));
    }
    Ok(resolved)
}

/// Stat snapshot of a source image, taken fresh on every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub name: String,
    pub path: PathBuf,
    pub mtime_ms: i64,
    pub size: u64,
}

impl SourceFile {
    /// Resolves and stats `name`. Anything that is not a regular file,
    /// including a file deleted since it was listed, is `NotFound`.
    pub async fn stat(root: &Path, name: &str) -> Result<Self> {
        validate_name(name)?;
        let path = match resolve_source_path(root, name).await {
            Ok(p) => p,
            // A well-formed name that fails to resolve is either missing
            // (or a dangling link) or escapes the root.
            Err(AlbumError::InvalidPath(n)) => {
                return match fs::metadata(root.join(name)).await {
                    Err(e) if e.kind() == ErrorKind::NotFound => Err(AlbumError::NotFound(n)),
                    _ => Err(AlbumError::InvalidPath(n)),
                };
            }
            Err(e) => return Err(e),
        };
        let meta = match fs::metadata(&path).await {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(AlbumError::NotFound(name.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        if !meta.is_file() {
            return Err(AlbumError::NotFound(name.to_string()));
        }
        Ok(Self {
            name: name.to_string(),
            path,
            mtime_ms: millis_since_epoch(meta.modified()?),
            size: meta.len(),
        })
    }

    pub fn key_for(&self, spec: &TransformSpec) -> String {
        fingerprint(&self.name, spec, self.mtime_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn fingerprint_is_deterministic() {
        let spec = TransformSpec::thumbnail(400);
        let a = fingerprint("a.jpg", &spec, 1_700_000_000_000);
        let b = fingerprint("a.jpg", &spec, 1_700_000_000_000);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn fingerprint_changes_with_mtime_width_and_kind() {
        let spec = TransformSpec::thumbnail(400);
        let base = fingerprint("a.jpg", &spec, 1000);
        assert_ne!(base, fingerprint("a.jpg", &spec, 1001));
        assert_ne!(
            base,
            fingerprint("a.jpg", &TransformSpec::thumbnail(200), 1000)
        );
        assert_ne!(
            base,
            fingerprint("a.jpg", &TransformSpec::placeholder(), 1000)
        );
        assert_ne!(base, fingerprint("b.jpg", &spec, 1000));
    }

    #[test]
    fn rejects_traversal_names() {
        for name in [
            "",
            ".",
            "..",
            "../../etc/passwd",
            "/etc/passwd",
            "a/b.jpg",
            "a\\b.jpg",
        ] {
            assert!(
                matches!(validate_name(name), Err(AlbumError::InvalidPath(_))),
                "{name:?} should be rejected"
            );
        }
        assert!(validate_name("img 1.jpg").is_ok());
    }

    #[tokio::test]
    async fn resolves_inside_root_only() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.jpg"), b"x").unwrap();

        let p = resolve_source_path(dir.path(), "a.jpg").await.unwrap();
        assert!(p.ends_with("a.jpg"));

        let missing = resolve_source_path(dir.path(), "missing.jpg").await;
        assert!(matches!(missing, Err(AlbumError::InvalidPath(_))));
        let escape = resolve_source_path(dir.path(), "../../etc/passwd").await;
        assert!(matches!(escape, Err(AlbumError::InvalidPath(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn rejects_symlink_escape() {
        let outside = TempDir::new().unwrap();
        std::fs::write(outside.path().join("secret.jpg"), b"x").unwrap();
        let root = TempDir::new().unwrap();
        std::os::unix::fs::symlink(
            outside.path().join("secret.jpg"),
            root.path().join("link.jpg"),
        )
        .unwrap();

        let res = resolve_source_path(root.path(), "link.jpg").await;
        assert!(matches!(res, Err(AlbumError::InvalidPath(_))));
    }

    #[tokio::test]
    async fn stat_of_missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let res = SourceFile::stat(dir.path(), "gone.jpg").await;
        assert!(matches!(res, Err(AlbumError::NotFound(_))));
    }

    #[tokio::test]
    async fn stat_of_directory_is_not_found() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let res = SourceFile::stat(dir.path(), "sub").await;
        assert!(matches!(res, Err(AlbumError::NotFound(_))));
    }
}
