//! Directory listing with sorting and pagination.

use crate::fingerprint::{millis_since_epoch, resolve_source_path};
use crate::{AlbumError, Result};
use serde::Serialize;
use std::cmp::Ordering;
use std::path::Path;
use std::str::FromStr;
use tokio::fs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Name,
    ModTime,
}

impl FromStr for SortKey {
    type Err = AlbumError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "name" => Ok(SortKey::Name),
            "mtime" => Ok(SortKey::ModTime),
            _ => Err(AlbumError::BadRequest(format!("Invalid sortBy: {}", s))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl FromStr for SortOrder {
    type Err = AlbumError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            _ => Err(AlbumError::BadRequest(format!("Invalid sort: {}", s))),
        }
    }
}

/// A listable source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    pub name: String,
    pub mtime_ms: i64,
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub page: u32,
    pub limit: u32,
    pub total: usize,
    pub total_pages: usize,
    pub items: Vec<T>,
}

impl<T> Page<T> {
    /// Same page metadata over different items.
    pub fn with_items<U>(self, items: Vec<U>) -> Page<U> {
        Page {
            page: self.page,
            limit: self.limit,
            total: self.total,
            total_pages: self.total_pages,
            items,
        }
    }
}

/// Regular files directly inside `dir`, in enumeration order.
///
/// Entries that cannot be statted, are not regular files, have non UTF-8
/// names, are hidden (including in-progress upload temp files) or are links
/// escaping `dir` are skipped rather than failing the whole listing.
pub async fn scan_sources(dir: &Path) -> Result<Vec<SourceEntry>> {
    let mut out = Vec::new();
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        // A link is listed only if it resolves to a file inside `dir`, the
        // same rule the thumbnail and image endpoints apply.
        let is_link =
            matches!(fs::symlink_metadata(entry.path()).await, Ok(m) if m.file_type().is_symlink());
        if is_link && resolve_source_path(dir, &name).await.is_err() {
            tracing::debug!("Skipping {}: link leaves the image directory", name);
            continue;
        }
        let meta = match fs::metadata(entry.path()).await {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!("Skipping {}: {}", name, e);
                continue;
            }
        };
        if !meta.is_file() {
            continue;
        }
        let Ok(modified) = meta.modified() else {
            continue;
        };
        out.push(SourceEntry {
            name,
            mtime_ms: millis_since_epoch(modified),
        });
    }
    Ok(out)
}

/// Stable sort; equal entries keep enumeration order in both directions.
pub fn sort_entries(entries: &mut [SourceEntry], key: SortKey, order: SortOrder) {
    let cmp = |a: &SourceEntry, b: &SourceEntry| match key {
        SortKey::Name => natural_cmp(&a.name, &b.name),
        SortKey::ModTime => a.mtime_ms.cmp(&b.mtime_ms),
    };
    match order {
        SortOrder::Asc => entries.sort_by(cmp),
        SortOrder::Desc => entries.sort_by(|a, b| cmp(b, a)),
    }
}

/// Human ordering for file names: digit runs compare by value and letters
/// compare case-insensitively, so `img2` < `img10` and `a.jpg` < `B.jpg`.
/// Names equal under those rules fall back to a plain byte comparison.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut ai = a.chars().peekable();
    let mut bi = b.chars().peekable();
    loop {
        match (ai.peek().copied(), bi.peek().copied()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let na = take_digits(&mut ai);
                let nb = take_digits(&mut bi);
                let (ta, tb) = (na.trim_start_matches('0'), nb.trim_start_matches('0'));
                let ord = ta.len().cmp(&tb.len()).then_with(|| ta.cmp(tb));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(x), Some(y)) => {
                let ord = fold(x).cmp(&fold(y));
                if ord != Ordering::Equal {
                    return ord;
                }
                ai.next();
                bi.next();
            }
        }
    }
}

fn take_digits(it: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut s = String::new();
    while let Some(c) = it.peek().copied().filter(|c| c.is_ascii_digit()) {
        s.push(c);
        it.next();
    }
    s
}

fn fold(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

/// Slices `items` into page `page` (1-based). Pages past the end are empty.
pub fn paginate<T>(items: Vec<T>, page: u32, limit: u32) -> Page<T> {
    let total = items.len();
    let limit_n = limit.max(1) as usize;
    let offset = (page.max(1) as usize - 1).saturating_mul(limit_n);
    let items = items.into_iter().skip(offset).take(limit_n).collect();
    Page {
        page,
        limit,
        total,
        total_pages: total.div_ceil(limit_n),
        items,
    }
}

/// Lists one page of source names from `dir`.
pub async fn list_page(
    dir: &Path,
    key: SortKey,
    order: SortOrder,
    page: u32,
    limit: u32,
) -> Result<Page<String>> {
    let mut entries = scan_sources(dir).await?;
    sort_entries(&mut entries, key, order);
    let names = entries.into_iter().map(|e| e.name).collect();
    Ok(paginate(names, page, limit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entries(names: &[(&str, i64)]) -> Vec<SourceEntry> {
        names
            .iter()
            .map(|(n, m)| SourceEntry {
                name: n.to_string(),
                mtime_ms: *m,
            })
            .collect()
    }

    fn names(entries: &[SourceEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn natural_sort_is_numeric_aware() {
        let mut e = entries(&[("img2", 0), ("img10", 0), ("img1", 0)]);
        sort_entries(&mut e, SortKey::Name, SortOrder::Asc);
        assert_eq!(names(&e), vec!["img1", "img2", "img10"]);

        sort_entries(&mut e, SortKey::Name, SortOrder::Desc);
        assert_eq!(names(&e), vec!["img10", "img2", "img1"]);
    }

    #[test]
    fn natural_cmp_ignores_case_first() {
        assert_eq!(natural_cmp("a.jpg", "B.jpg"), Ordering::Less);
        assert_eq!(natural_cmp("photo-009.jpg", "photo-10.jpg"), Ordering::Less);
        assert_eq!(natural_cmp("img", "img1"), Ordering::Less);
        assert_eq!(natural_cmp("x", "x"), Ordering::Equal);
    }

    #[test]
    fn mtime_sort_is_stable() {
        let mut e = entries(&[("c", 5), ("a", 1), ("b", 5), ("d", 3)]);
        sort_entries(&mut e, SortKey::ModTime, SortOrder::Asc);
        assert_eq!(names(&e), vec!["a", "d", "c", "b"]);

        let mut e = entries(&[("c", 5), ("a", 1), ("b", 5), ("d", 3)]);
        sort_entries(&mut e, SortKey::ModTime, SortOrder::Desc);
        assert_eq!(names(&e), vec!["c", "b", "d", "a"]);
    }

    #[test]
    fn pagination_math() {
        let items: Vec<u32> = (0..45).collect();
        let p1 = paginate(items.clone(), 1, 20);
        assert_eq!((p1.total, p1.total_pages, p1.items.len()), (45, 3, 20));
        let p3 = paginate(items.clone(), 3, 20);
        assert_eq!(p3.items, (40..45).collect::<Vec<_>>());
        let p4 = paginate(items, 4, 20);
        assert!(p4.items.is_empty());
        assert_eq!(p4.total_pages, 3);
    }

    #[test]
    fn huge_page_does_not_overflow() {
        let p = paginate(vec![1, 2, 3], u32::MAX, u32::MAX);
        assert!(p.items.is_empty());
        assert_eq!(p.total_pages, 1);
    }

    #[test]
    fn empty_listing_has_no_pages() {
        let p = paginate(Vec::<u32>::new(), 1, 20);
        assert_eq!((p.total, p.total_pages), (0, 0));
    }

    #[test]
    fn parses_sort_params() {
        assert_eq!("mtime".parse::<SortKey>().unwrap(), SortKey::ModTime);
        assert_eq!("asc".parse::<SortOrder>().unwrap(), SortOrder::Asc);
        assert!("size".parse::<SortKey>().is_err());
        assert!("up".parse::<SortOrder>().is_err());
    }

    #[tokio::test]
    async fn scan_skips_dirs_and_hidden_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.jpg"), b"x").unwrap();
        std::fs::write(dir.path().join(".a.jpg.tmp.1.0"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let found = scan_sources(dir.path()).await.unwrap();
        assert_eq!(names(&found), vec!["a.jpg"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn scan_skips_dangling_symlinks() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("ok.jpg"), b"x").unwrap();
        std::os::unix::fs::symlink(dir.path().join("nowhere"), dir.path().join("broken.jpg"))
            .unwrap();

        let page = list_page(dir.path(), SortKey::Name, SortOrder::Asc, 1, 10)
            .await
            .unwrap();
        assert_eq!(page.items, vec!["ok.jpg".to_string()]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn scan_skips_links_outside_the_root() {
        let dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        std::fs::write(dir.path().join("ok.jpg"), b"x").unwrap();
        std::fs::write(outside.path().join("secret.jpg"), b"x").unwrap();
        std::os::unix::fs::symlink(
            outside.path().join("secret.jpg"),
            dir.path().join("link.jpg"),
        )
        .unwrap();
        std::os::unix::fs::symlink(dir.path().join("ok.jpg"), dir.path().join("alias.jpg"))
            .unwrap();

        let mut found = scan_sources(dir.path()).await.unwrap();
        sort_entries(&mut found, SortKey::Name, SortOrder::Asc);
        assert_eq!(names(&found), vec!["alias.jpg", "ok.jpg"]);
    }
}
