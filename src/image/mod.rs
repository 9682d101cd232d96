//! Image buffers, loading, saving, and conversion to and from model tensors.

mod adapt;
mod load;
mod save;
mod tensor;

pub use adapt::{center_crop_and_scale, center_crop_geometry, CropGeometry};
pub use load::load_bitmap;
pub use save::save_bitmap;
pub use tensor::{image_to_tensor, tensor_to_bitmap};

use image::{DynamicImage, GrayImage, RgbImage, RgbaImage};
use ndarray::Array4;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Image tensor in NCHW format (batch, channels, height, width).
pub type ImageTensor = Array4<f32>;

/// Number of channels in RGB images.
pub const RGB_CHANNELS: usize = 3;

/// Memory layout of a [`Bitmap`]'s pixels. All formats use 8 bits per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Gray8,
    Rgb8,
    Rgba8,
    Bgra8,
}

impl PixelFormat {
    /// Bytes per pixel.
    #[must_use]
    pub const fn channels(self) -> usize {
        match self {
            Self::Gray8 => 1,
            Self::Rgb8 => 3,
            Self::Rgba8 | Self::Bgra8 => 4,
        }
    }
}

/// Channel order of a three-channel model tensor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOrder {
    #[default]
    Rgb,
    Bgr,
}

/// Numeric range a model expects its pixel values in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueRange {
    /// Raw byte values, `[0, 255]`.
    #[default]
    #[serde(rename = "0..255")]
    ZeroTo255,
    /// `[0, 1]`.
    #[serde(rename = "0..1")]
    ZeroToOne,
    /// `[-1, 1]`.
    #[serde(rename = "-1..1")]
    MinusOneToOne,
}

impl ValueRange {
    /// Map a byte channel value into this range.
    #[inline]
    #[must_use]
    pub fn normalize(self, value: u8) -> f32 {
        let value = f32::from(value);
        match self {
            Self::ZeroTo255 => value,
            Self::ZeroToOne => value / 255.0,
            Self::MinusOneToOne => (value / 127.5) - 1.0,
        }
    }

    /// Map a tensor value in this range back to a byte, clamping out-of-range values.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn denormalize(self, value: f32) -> u8 {
        let scaled = match self {
            Self::ZeroTo255 => value,
            Self::ZeroToOne => value * 255.0,
            Self::MinusOneToOne => (value + 1.0) * 127.5,
        };
        // Safe: clamped to [0, 255] before casting
        scaled.round().clamp(0.0, 255.0) as u8
    }
}

/// Channel layout of a model image tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorFormat {
    Gray,
    Rgb,
    Bgr,
}

impl TensorFormat {
    /// Layout for a tensor with `channels` channels, or `None` if unsupported.
    #[must_use]
    pub const fn for_channels(channels: usize, order: ChannelOrder) -> Option<Self> {
        match (channels, order) {
            (1, _) => Some(Self::Gray),
            (RGB_CHANNELS, ChannelOrder::Rgb) => Some(Self::Rgb),
            (RGB_CHANNELS, ChannelOrder::Bgr) => Some(Self::Bgr),
            _ => None,
        }
    }

    #[must_use]
    pub const fn channels(self) -> usize {
        match self {
            Self::Gray => 1,
            Self::Rgb | Self::Bgr => RGB_CHANNELS,
        }
    }
}

/// An owned, uncompressed image.
///
/// A bitmap may be *unbacked*: it knows its geometry but carries no pixels,
/// the way a photo whose decode failed still has a size. Unbacked bitmaps are
/// rejected by the pipeline instead of being replaced with a placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    width: u32,
    height: u32,
    format: PixelFormat,
    pixels: Option<Vec<u8>>,
}

impl Bitmap {
    /// Create a bitmap from raw, tightly packed pixel bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer length does not match `width * height * channels`.
    pub fn new(width: u32, height: u32, format: PixelFormat, pixels: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * format.channels();
        if pixels.len() != expected {
            return Err(Error::UndecodableImage {
                reason: format!(
                    "{width}x{height} {format:?} needs {expected} bytes, buffer has {}",
                    pixels.len()
                ),
            });
        }

        Ok(Self {
            width,
            height,
            format,
            pixels: Some(pixels),
        })
    }

    /// Create a bitmap with geometry but no pixel data.
    #[must_use]
    pub const fn unbacked(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            format,
            pixels: None,
        }
    }

    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub const fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[must_use]
    pub const fn format(&self) -> PixelFormat {
        self.format
    }

    /// Raw pixel bytes, or `None` for an unbacked bitmap.
    #[must_use]
    pub fn pixels(&self) -> Option<&[u8]> {
        self.pixels.as_deref()
    }

    #[must_use]
    pub const fn is_backed(&self) -> bool {
        self.pixels.is_some()
    }

    #[must_use]
    pub fn into_pixels(self) -> Option<Vec<u8>> {
        self.pixels
    }

    /// Convert into an `image` crate buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the bitmap is unbacked.
    pub fn to_dynamic(&self) -> Result<DynamicImage> {
        let pixels = self.pixels.clone().ok_or_else(|| Error::UndecodableImage {
            reason: format!("{}x{} bitmap has no pixel backing", self.width, self.height),
        })?;
        let (width, height) = (self.width, self.height);

        let image = match self.format {
            PixelFormat::Gray8 => {
                GrayImage::from_raw(width, height, pixels).map(DynamicImage::ImageLuma8)
            }
            PixelFormat::Rgb8 => {
                RgbImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgb8)
            }
            PixelFormat::Rgba8 => {
                RgbaImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgba8)
            }
            PixelFormat::Bgra8 => {
                let mut pixels = pixels;
                for px in pixels.chunks_exact_mut(4) {
                    px.swap(0, 2);
                }
                RgbaImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgba8)
            }
        };

        image.ok_or_else(|| Error::UndecodableImage {
            reason: format!("{width}x{height} {:?} buffer is truncated", self.format),
        })
    }
}

impl From<DynamicImage> for Bitmap {
    fn from(image: DynamicImage) -> Self {
        let (width, height) = (image.width(), image.height());
        let (format, pixels) = match image {
            DynamicImage::ImageLuma8(buf) => (PixelFormat::Gray8, buf.into_raw()),
            DynamicImage::ImageRgb8(buf) => (PixelFormat::Rgb8, buf.into_raw()),
            DynamicImage::ImageRgba8(buf) => (PixelFormat::Rgba8, buf.into_raw()),
            other if other.color().has_alpha() => (PixelFormat::Rgba8, other.to_rgba8().into_raw()),
            other => (PixelFormat::Rgb8, other.to_rgb8().into_raw()),
        };

        Self {
            width,
            height,
            format,
            pixels: Some(pixels),
        }
    }
}
