/// HTTP caching directives for a class of responses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CachePolicy {
    /// Browser and proxy time-to-live in seconds (max-age).
    pub max_age: u32,

    /// Allow caching by intermediaries (CDNs, proxies).
    pub public: bool,
}

impl CachePolicy {
    /// Policy for thumbnails and placeholders. Their URLs change whenever
    /// the source does, so they can be cached for a long time.
    pub fn for_derived(max_age: u32) -> Self {
        Self {
            max_age,
            public: true,
        }
    }

    pub fn for_originals(max_age: u32) -> Self {
        Self {
            max_age,
            public: true,
        }
    }

    pub fn cache_control_value(&self) -> String {
        if self.max_age == 0 {
            return "no-store, no-cache, must-revalidate".to_string();
        }
        format!(
            "{}, max-age={}",
            if self.public { "public" } else { "private" },
            self.max_age
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DERIVED_MAX_AGE, ORIGINAL_MAX_AGE};

    #[test]
    fn test_derived_cache_control() {
        let value = CachePolicy::for_derived(DERIVED_MAX_AGE).cache_control_value();
        assert_eq!(value, "public, max-age=2592000");
    }

    #[test]
    fn test_original_cache_control() {
        let value = CachePolicy::for_originals(ORIGINAL_MAX_AGE).cache_control_value();
        assert_eq!(value, "public, max-age=604800");
    }

    #[test]
    fn test_no_cache() {
        let value = CachePolicy::for_derived(0).cache_control_value();
        assert_eq!(value, "no-store, no-cache, must-revalidate");
    }
}
