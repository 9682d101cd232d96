//! Center-crop-and-scale adaptation of source images to a model's input size.

use image::{imageops::FilterType, DynamicImage};

use crate::error::{Error, Result};

/// Where a source image lands after scaling, and which region is kept.
///
/// The image is first resized to `scaled_width` x `scaled_height`, then the
/// `width` x `height` region starting at (`x`, `y`) is cropped out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropGeometry {
    pub scaled_width: u32,
    pub scaled_height: u32,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Compute the center-crop-and-scale geometry for a source and target size.
///
/// The source is scaled so that it covers the target: the relatively shorter
/// side matches the target exactly and the other side overhangs. Scaled sizes
/// are rounded to the nearest pixel; the overhang is split evenly, with the
/// odd pixel going to the right/bottom edge.
///
/// # Errors
///
/// Returns an error if any dimension is zero.
pub fn center_crop_geometry(
    src_width: u32,
    src_height: u32,
    target_width: u32,
    target_height: u32,
) -> Result<CropGeometry> {
    if src_width == 0 || src_height == 0 {
        return Err(Error::UnsupportedDimensions {
            width: src_width,
            height: src_height,
            reason: "source image is empty".to_string(),
        });
    }
    if target_width == 0 || target_height == 0 {
        return Err(Error::UnsupportedDimensions {
            width: target_width,
            height: target_height,
            reason: "target size is empty".to_string(),
        });
    }

    let (sw, sh) = (u128::from(src_width), u128::from(src_height));
    let (tw, th) = (u128::from(target_width), u128::from(target_height));

    // Compare aspect ratios without floating point: sw/sh >= tw/th
    let (scaled_w, scaled_h) = if sw * th >= sh * tw {
        let w = (2 * sw * th + sh) / (2 * sh);
        (w.max(tw), th)
    } else {
        let h = (2 * sh * tw + sw) / (2 * sw);
        (tw, h.max(th))
    };

    let scaled_width = u32::try_from(scaled_w).map_err(|_| Error::UnsupportedDimensions {
        width: src_width,
        height: src_height,
        reason: "scaled width overflows".to_string(),
    })?;
    let scaled_height = u32::try_from(scaled_h).map_err(|_| Error::UnsupportedDimensions {
        width: src_width,
        height: src_height,
        reason: "scaled height overflows".to_string(),
    })?;

    Ok(CropGeometry {
        scaled_width,
        scaled_height,
        x: (scaled_width - target_width) / 2,
        y: (scaled_height - target_height) / 2,
        width: target_width,
        height: target_height,
    })
}

/// Scale `image` to cover `target_width` x `target_height`, then crop the center.
///
/// # Errors
///
/// Returns an error if the source or target size is empty.
pub fn center_crop_and_scale(
    image: &DynamicImage,
    target_width: u32,
    target_height: u32,
) -> Result<(DynamicImage, CropGeometry)> {
    let geometry = center_crop_geometry(
        image.width(),
        image.height(),
        target_width,
        target_height,
    )?;

    tracing::debug!(
        "Center crop {}x{} -> scaled {}x{}, crop at ({}, {})",
        image.width(),
        image.height(),
        geometry.scaled_width,
        geometry.scaled_height,
        geometry.x,
        geometry.y
    );

    let source_size = (image.width(), image.height());
    let scaled = if (geometry.scaled_width, geometry.scaled_height) == source_size {
        image.clone()
    } else {
        image.resize_exact(
            geometry.scaled_width,
            geometry.scaled_height,
            FilterType::Lanczos3,
        )
    };

    let cropped = scaled.crop_imm(geometry.x, geometry.y, geometry.width, geometry.height);

    Ok((cropped, geometry))
}
