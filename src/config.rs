use std::path::PathBuf;
use thiserror::Error;

/// JPEG quality for thumbnails.
pub const THUMB_QUALITY: u8 = 70;
/// JPEG quality for blur-up placeholders.
pub const PLACEHOLDER_QUALITY: u8 = 40;
/// Placeholders are always rendered at this width.
pub const PLACEHOLDER_WIDTH: u32 = 16;
pub const MIN_THUMB_WIDTH: u32 = 16;
pub const MAX_THUMB_WIDTH: u32 = 2000;

pub const DEFAULT_THUMB_WIDTH: u32 = 400;
pub const DEFAULT_PAGE_LIMIT: u32 = 20;
pub const MAX_PAGE_LIMIT: u32 = 100;
/// Placeholders generated at once while building a listing page.
pub const PLACEHOLDER_CONCURRENCY: usize = 8;

/// 30 days, for thumbnails and placeholders.
pub const DERIVED_MAX_AGE: u32 = 30 * 24 * 60 * 60;
/// 7 days, for original images.
pub const ORIGINAL_MAX_AGE: u32 = 7 * 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// One request of quota is restored every this many milliseconds.
    pub replenish_interval_ms: u64,
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            replenish_interval_ms: 100,
            burst_size: 30,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AlbumConfig {
    /// Directory holding the source images. Only its direct children are served.
    pub image_dir: PathBuf,
    /// Directory holding generated thumbnails and placeholders.
    pub cache_dir: PathBuf,
    pub max_upload_size: usize, // bytes
    pub default_page_limit: u32,
    pub max_page_limit: u32,
    pub default_thumb_width: u32,
    pub derived_max_age: u32,  // seconds
    pub original_max_age: u32, // seconds
    /// `None` disables rate limiting.
    pub rate_limit: Option<RateLimitConfig>,
    /// Optional frontend served for unmatched routes.
    pub static_dir: Option<PathBuf>,
}

impl Default for AlbumConfig {
    fn default() -> Self {
        Self {
            image_dir: PathBuf::from("./photos"),
            cache_dir: PathBuf::from("./cache"),
            max_upload_size: 10 * 1024 * 1024,
            default_page_limit: DEFAULT_PAGE_LIMIT,
            max_page_limit: MAX_PAGE_LIMIT,
            default_thumb_width: DEFAULT_THUMB_WIDTH,
            derived_max_age: DERIVED_MAX_AGE,
            original_max_age: ORIGINAL_MAX_AGE,
            rate_limit: Some(RateLimitConfig::default()),
            static_dir: None,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Image directory cannot be empty")]
    EmptyImageDir,
    #[error("Cache directory cannot be empty")]
    EmptyCacheDir,
    #[error("Cache directory must differ from the image directory")]
    SharedCacheDir,
    #[error("Max upload size must be > 0")]
    InvalidMaxUpload,
    #[error("Page limits must satisfy 1 <= default <= max")]
    InvalidPageLimit,
    #[error("Default thumbnail width must be within [16, 2000]")]
    InvalidThumbWidth,
    #[error("Rate limit values must be > 0")]
    InvalidRateLimit,
}

impl AlbumConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.image_dir.as_os_str().is_empty() {
            return Err(ConfigError::EmptyImageDir);
        }
        if self.cache_dir.as_os_str().is_empty() {
            return Err(ConfigError::EmptyCacheDir);
        }
        if self.cache_dir == self.image_dir {
            return Err(ConfigError::SharedCacheDir);
        }
        if self.max_upload_size == 0 {
            return Err(ConfigError::InvalidMaxUpload);
        }
        if self.default_page_limit == 0 || self.default_page_limit > self.max_page_limit {
            return Err(ConfigError::InvalidPageLimit);
        }
        if !(MIN_THUMB_WIDTH..=MAX_THUMB_WIDTH).contains(&self.default_thumb_width) {
            return Err(ConfigError::InvalidThumbWidth);
        }
        if let Some(rl) = self.rate_limit {
            if rl.replenish_interval_ms == 0 || rl.burst_size == 0 {
                return Err(ConfigError::InvalidRateLimit);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(AlbumConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_shared_cache_dir() {
        let cfg = AlbumConfig {
            cache_dir: PathBuf::from("./photos"),
            ..AlbumConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::SharedCacheDir)));
    }

    #[test]
    fn rejects_bad_page_limits() {
        let cfg = AlbumConfig {
            default_page_limit: 200,
            ..AlbumConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidPageLimit)));
    }

    #[test]
    fn rejects_zero_rate_limit() {
        let cfg = AlbumConfig {
            rate_limit: Some(RateLimitConfig {
                replenish_interval_ms: 0,
                burst_size: 1,
            }),
            ..AlbumConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidRateLimit)));
    }
}
