//! Conversion between images and NCHW model tensors.

use image::DynamicImage;
use ndarray::Array4;

use crate::error::{Error, Result};

use super::{Bitmap, ChannelOrder, ImageTensor, PixelFormat, TensorFormat, ValueRange};

/// Convert an image to a `(1, C, H, W)` tensor at the image's own size.
///
/// Callers resize beforehand; see [`super::center_crop_and_scale`].
#[allow(clippy::cast_possible_truncation)]
#[must_use]
pub fn image_to_tensor(
    image: &DynamicImage,
    format: TensorFormat,
    range: ValueRange,
) -> ImageTensor {
    let (width, height) = (image.width() as usize, image.height() as usize);
    let mut tensor = Array4::<f32>::zeros((1, format.channels(), height, width));

    match format {
        TensorFormat::Gray => {
            let luma = image.to_luma8();
            for (x, y, pixel) in luma.enumerate_pixels() {
                tensor[[0, 0, y as usize, x as usize]] = range.normalize(pixel[0]);
            }
        }
        TensorFormat::Rgb | TensorFormat::Bgr => {
            let rgb = image.to_rgb8();
            let order: [usize; 3] = if format == TensorFormat::Bgr {
                [2, 1, 0]
            } else {
                [0, 1, 2]
            };
            for (x, y, pixel) in rgb.enumerate_pixels() {
                let (x, y) = (x as usize, y as usize);
                for (channel, &source) in order.iter().enumerate() {
                    tensor[[0, channel, y, x]] = range.normalize(pixel[source]);
                }
            }
        }
    }

    tensor
}

/// Convert a `(1, C, H, W)` tensor into a bitmap.
///
/// One channel produces [`PixelFormat::Gray8`]; three channels produce
/// [`PixelFormat::Rgb8`], reordered from `order`.
///
/// # Errors
///
/// Returns an error if the tensor is not a single image with 1 or 3 channels.
pub fn tensor_to_bitmap(
    tensor: &ImageTensor,
    order: ChannelOrder,
    range: ValueRange,
) -> Result<Bitmap> {
    let (batch, channels, height, width) = tensor.dim();

    if batch != 1 {
        return Err(Error::ShapeMismatch {
            expected: "batch of 1".to_string(),
            actual: format!("batch of {batch}"),
        });
    }
    let format = TensorFormat::for_channels(channels, order).ok_or_else(|| Error::ShapeMismatch {
        expected: "1 or 3 channels".to_string(),
        actual: format!("{channels} channels"),
    })?;
    if width == 0 || height == 0 {
        return Err(Error::ShapeMismatch {
            expected: "non-empty image".to_string(),
            actual: format!("{width}x{height}"),
        });
    }
    let too_large = || Error::ShapeMismatch {
        expected: "dimensions that fit in u32".to_string(),
        actual: format!("{width}x{height}"),
    };
    let bitmap_width = u32::try_from(width).map_err(|_| too_large())?;
    let bitmap_height = u32::try_from(height).map_err(|_| too_large())?;

    let order: &[usize] = match format {
        TensorFormat::Gray => &[0],
        TensorFormat::Rgb => &[0, 1, 2],
        TensorFormat::Bgr => &[2, 1, 0],
    };

    let mut pixels = Vec::with_capacity(width * height * order.len());
    for y in 0..height {
        for x in 0..width {
            for &channel in order {
                pixels.push(range.denormalize(tensor[[0, channel, y, x]]));
            }
        }
    }

    let pixel_format = if format == TensorFormat::Gray {
        PixelFormat::Gray8
    } else {
        PixelFormat::Rgb8
    };

    Bitmap::new(bitmap_width, bitmap_height, pixel_format, pixels)
}
