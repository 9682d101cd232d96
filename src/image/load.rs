//! Image loading utilities.

use std::path::Path;

use image::{DynamicImage, ImageDecoder, ImageReader};

use crate::error::{Error, Result};

use super::Bitmap;

/// Load an image from disk into a [`Bitmap`].
///
/// The image is:
/// 1. Decoded from the specified path (format guessed from content)
/// 2. Rotated/flipped according to its EXIF orientation, so it is upright
/// 3. Converted to Gray8, RGB8 or RGBA8 depending on the source color type
///
/// # Errors
///
/// Returns an error if the image cannot be read or decoded.
pub fn load_bitmap<P: AsRef<Path>>(path: P) -> Result<Bitmap> {
    let path = path.as_ref();
    let load_err = |source| Error::ImageLoad {
        path: path.to_path_buf(),
        source,
    };

    let reader = ImageReader::open(path)
        .and_then(ImageReader::with_guessed_format)
        .map_err(|e| load_err(image::ImageError::IoError(e)))?;
    let mut decoder = reader.into_decoder().map_err(load_err)?;
    let orientation = decoder.orientation().map_err(load_err)?;
    let mut image = DynamicImage::from_decoder(decoder).map_err(load_err)?;
    image.apply_orientation(orientation);

    tracing::debug!(
        "Loaded {} ({}x{}, {:?})",
        path.display(),
        image.width(),
        image.height(),
        orientation
    );

    Ok(Bitmap::from(image))
}
