pub mod params;

use crate::AlbumError;
use image::codecs::jpeg::JpegEncoder;
use image::{
    DynamicImage, ExtendedColorType, GenericImageView, ImageDecoder, ImageEncoder, ImageReader,
};
use std::io::Cursor;

pub use params::{TransformKind, TransformSpec};

/// Gaussian sigma for blur-up placeholders. At 16px wide this washes out
/// everything but the dominant colours.
pub const PLACEHOLDER_BLUR_SIGMA: f32 = 1.5;

/// Turns source bytes into an encoded derived image.
///
/// The generator only sees this trait so that tests can count (or fail)
/// transform invocations without touching pixels.
pub trait ImageTransformer: Send + Sync {
    fn render(&self, source: &[u8], spec: &TransformSpec) -> Result<Vec<u8>, AlbumError>;
}

/// Production transformer backed by the `image` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageBackend;

impl ImageTransformer for ImageBackend {
    fn render(&self, source: &[u8], spec: &TransformSpec) -> Result<Vec<u8>, AlbumError> {
        let img = decode_image(source)?;
        let resized = resize_image(img, spec.width(), !spec.allow_upscale());
        let out = if spec.blur() {
            blur_image(&resized, PLACEHOLDER_BLUR_SIGMA)
        } else {
            resized
        };
        encode_jpeg(&out, spec.quality())
    }
}

/// Decodes image bytes and applies the EXIF orientation, so that phone
/// photos come out upright before any resizing.
///
/// # Errors
/// Returns `AlbumError::Transform` if the format cannot be detected or the
/// data is malformed.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, AlbumError> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| AlbumError::Transform(e.to_string()))?;
    let mut decoder = reader
        .into_decoder()
        .map_err(|e| AlbumError::Transform(e.to_string()))?;
    let orientation = decoder
        .orientation()
        .map_err(|e| AlbumError::Transform(e.to_string()))?;
    let mut img =
        DynamicImage::from_decoder(decoder).map_err(|e| AlbumError::Transform(e.to_string()))?;
    img.apply_orientation(orientation);
    Ok(img)
}

/// Resizes to `width`, scaling the height to keep the aspect ratio.
///
/// With `no_upscale` set, an image narrower than `width` is returned
/// unchanged. Uses Lanczos3, which gives the best quality for downsampling.
/// Dimensions are clamped to at least 1 pixel.
pub fn resize_image(img: DynamicImage, width: u32, no_upscale: bool) -> DynamicImage {
    let (orig_w, orig_h) = img.dimensions();
    if orig_w == 0 || orig_h == 0 {
        return img;
    }
    if no_upscale && width >= orig_w {
        return img;
    }

    let ratio = width as f32 / orig_w as f32;
    let target_h = (orig_h as f32 * ratio).round() as u32;

    img.resize_exact(
        width.max(1),
        target_h.max(1),
        image::imageops::FilterType::Lanczos3,
    )
}

pub fn blur_image(img: &DynamicImage, sigma: f32) -> DynamicImage {
    img.blur(sigma)
}

/// Encodes as baseline JPEG in RGB. Quality is clamped to [1, 100].
pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, AlbumError> {
    let mut out = Vec::new();
    let q = quality.clamp(1, 100);
    let rgb = img.to_rgb8();
    let (w, h) = rgb.dimensions();
    let enc = JpegEncoder::new_with_quality(&mut out, q);
    enc.write_image(rgb.as_raw(), w, h, ExtendedColorType::Rgb8)
        .map_err(|e| AlbumError::Transform(e.to_string()))?;
    Ok(out)
}
