use crate::config::{
    MAX_THUMB_WIDTH, MIN_THUMB_WIDTH, PLACEHOLDER_QUALITY, PLACEHOLDER_WIDTH, THUMB_QUALITY,
};
use std::fmt;

/// Kind of derived image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransformKind {
    Thumbnail,
    Placeholder,
}

impl fmt::Display for TransformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformKind::Thumbnail => write!(f, "thumb"),
            TransformKind::Placeholder => write!(f, "placeholder"),
        }
    }
}

/// Describes one derived image. Quality, blur and upscaling are fixed per kind,
/// so the only free parameter is the thumbnail width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransformSpec {
    kind: TransformKind,
    width: u32,
}

impl TransformSpec {
    /// Thumbnail of the requested width, clamped to [16, 2000].
    pub fn thumbnail(width: u32) -> Self {
        Self {
            kind: TransformKind::Thumbnail,
            width: width.clamp(MIN_THUMB_WIDTH, MAX_THUMB_WIDTH),
        }
    }

    pub fn placeholder() -> Self {
        Self {
            kind: TransformKind::Placeholder,
            width: PLACEHOLDER_WIDTH,
        }
    }

    pub fn kind(&self) -> TransformKind {
        self.kind
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn quality(&self) -> u8 {
        match self.kind {
            TransformKind::Thumbnail => THUMB_QUALITY,
            TransformKind::Placeholder => PLACEHOLDER_QUALITY,
        }
    }

    pub fn blur(&self) -> bool {
        self.kind == TransformKind::Placeholder
    }

    /// Thumbnails never grow past the source width; placeholders always land on 16px.
    pub fn allow_upscale(&self) -> bool {
        self.kind == TransformKind::Placeholder
    }

    /// Stable textual form used as fingerprint input.
    pub fn canonical(&self) -> String {
        let mut out = format!("{};w={};q={}", self.kind, self.width, self.quality());
        if self.blur() {
            out.push_str(";blur");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thumbnail_width_is_clamped() {
        assert_eq!(TransformSpec::thumbnail(1).width(), 16);
        assert_eq!(TransformSpec::thumbnail(5000).width(), 2000);
        assert_eq!(TransformSpec::thumbnail(400).width(), 400);
    }

    #[test]
    fn placeholder_is_fixed() {
        let spec = TransformSpec::placeholder();
        assert_eq!(spec.width(), 16);
        assert_eq!(spec.quality(), 40);
        assert!(spec.blur());
        assert_eq!(spec.canonical(), "placeholder;w=16;q=40;blur");
    }

    #[test]
    fn canonical_includes_width() {
        assert_eq!(
            TransformSpec::thumbnail(400).canonical(),
            "thumb;w=400;q=70"
        );
        assert_ne!(
            TransformSpec::thumbnail(400).canonical(),
            TransformSpec::thumbnail(401).canonical()
        );
    }
}
