//! Image saving utilities.

use std::path::Path;

use image::DynamicImage;

use crate::error::{Error, Result};

use super::Bitmap;

/// Save a bitmap as an image file.
///
/// The format is inferred from the extension. JPEG output is written at
/// `quality` (1-100) and drops any alpha channel; other formats ignore
/// `quality`.
///
/// # Errors
///
/// Returns an error if the bitmap is unbacked or the image cannot be saved.
pub fn save_bitmap<P: AsRef<Path>>(bitmap: &Bitmap, path: P, quality: u8) -> Result<()> {
    let path = path.as_ref();
    let image = bitmap.to_dynamic()?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("png")
        .to_lowercase();

    match extension.as_str() {
        "jpg" | "jpeg" => {
            let mut output = std::fs::File::create(path)?;
            let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut output, quality);
            DynamicImage::ImageRgb8(image.to_rgb8())
                .write_with_encoder(encoder)
                .map_err(|source| Error::ImageSave {
                    path: path.to_path_buf(),
                    source,
                })?;
        }
        _ => {
            image.save(path).map_err(|source| Error::ImageSave {
                path: path.to_path_buf(),
                source,
            })?;
        }
    }

    tracing::debug!(
        "Saved {}x{} image to {}",
        bitmap.width(),
        bitmap.height(),
        path.display()
    );

    Ok(())
}
