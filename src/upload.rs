use crate::cache::disk::write_temp;
use crate::{AlbumError, Result};
use axum::extract::multipart::Field;
use bytes::{Bytes, BytesMut};
use image::{GenericImageView, ImageReader};
use mime::Mime;
use std::io::{Cursor, ErrorKind};
use std::path::Path;
use tokio::fs;

/// Accepts an upload only if both the declared Content-Type and the file
/// extension say image. The extension is what `/image` later serves the file
/// as, so a mismatched name could smuggle non-image content.
pub fn check_media_type(content_type: Option<&str>, file_name: &str) -> Result<()> {
    let declared = content_type
        .and_then(|ct| ct.parse::<Mime>().ok())
        .ok_or_else(|| AlbumError::UnsupportedMediaType("missing content type".into()))?;
    if declared.type_() != mime::IMAGE {
        return Err(AlbumError::UnsupportedMediaType(declared.to_string()));
    }
    match mime_guess::from_path(file_name).first() {
        Some(m) if m.type_() == mime::IMAGE => Ok(()),
        _ => Err(AlbumError::UnsupportedMediaType(format!(
            "{} is not an image file name",
            file_name
        ))),
    }
}

/// Streams a multipart field into memory, enforcing `max_size` chunk by chunk
/// so the limit holds even without a Content-Length.
pub async fn read_limited(mut field: Field<'_>, max_size: usize) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(8192);
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| AlbumError::BadRequest(format!("Invalid upload: {}", e)))?
    {
        if buf.len() + chunk.len() > max_size {
            return Err(AlbumError::BadRequest("File exceeds size limit".into()));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf.freeze())
}

/// Checks the bytes really are a decodable image with non-zero dimensions.
pub fn validate_image_bytes(bytes: &[u8]) -> Result<()> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| AlbumError::BadRequest(e.to_string()))?;
    if reader.format().is_none() {
        return Err(AlbumError::BadRequest(
            "Unable to detect image format".into(),
        ));
    }
    let img = reader
        .decode()
        .map_err(|e| AlbumError::BadRequest(format!("Unable to decode image: {}", e)))?;
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return Err(AlbumError::BadRequest("Invalid image dimensions".into()));
    }
    Ok(())
}

/// Reduces a client-supplied file name to a safe single path segment.
pub fn sanitize_filename(original: &str) -> String {
    let base = original.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Writes an upload into `image_dir` as `<unix_millis>-<sanitized name>` and
/// returns the stored name. An existing file is never replaced: on a clash
/// the name gets a numeric infix, `<unix_millis>-<n>-<sanitized name>`.
pub async fn store_upload(image_dir: &Path, original_name: &str, bytes: &[u8]) -> Result<String> {
    let millis = time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    let stem = sanitize_filename(original_name);

    let tmp = write_temp(&image_dir.join(&stem), bytes).await?;
    let claimed = claim_name(image_dir, &tmp, millis, &stem).await;
    let _ = fs::remove_file(&tmp).await;
    claimed
}

/// Hard-links `tmp` under the first free name. Linking fails with
/// `AlreadyExists` instead of overwriting, so concurrent uploads of the same
/// name cannot take the same slot.
async fn claim_name(image_dir: &Path, tmp: &Path, millis: i128, stem: &str) -> Result<String> {
    for n in 0..MAX_NAME_ATTEMPTS {
        let name = if n == 0 {
            format!("{}-{}", millis, stem)
        } else {
            format!("{}-{}-{}", millis, n, stem)
        };
        match fs::hard_link(tmp, image_dir.join(&name)).await {
            Ok(()) => return Ok(name),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(AlbumError::Internal(format!(
        "no free name for upload {}",
        stem
    )))
}
