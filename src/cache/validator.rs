use sha2::{Digest, Sha256};

/// Strong ETag derived from stat metadata. The same size and mtime always
/// produce the same quoted value, across calls and restarts.
pub fn compute_validator(size: u64, mtime_ms: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}-{}", size, mtime_ms).as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("\"{}\"", &digest[..32])
}

/// Exact string comparison; weak validators and lists are not interpreted.
pub fn is_fresh(request_validator: Option<&str>, current: &str) -> bool {
    request_validator == Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validator_is_stable() {
        assert_eq!(
            compute_validator(1024, 1_700_000_000_123),
            compute_validator(1024, 1_700_000_000_123)
        );
    }

    #[test]
    fn validator_tracks_size_and_mtime() {
        let base = compute_validator(1024, 5);
        assert_ne!(base, compute_validator(1025, 5));
        assert_ne!(base, compute_validator(1024, 6));
        assert!(base.starts_with('"') && base.ends_with('"'));
    }

    #[test]
    fn freshness_is_exact_match() {
        let etag = compute_validator(1, 2);
        assert!(is_fresh(Some(&etag), &etag));
        assert!(!is_fresh(None, &etag));
        assert!(!is_fresh(Some(&format!("W/{}", etag)), &etag));
        assert!(!is_fresh(Some(etag.trim_matches('"')), &etag));
    }
}
