// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image preprocessing for the segmentation model

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, RgbImage};

use super::error::{Result, SegmentationError};

/// Divisor applied to each 8-bit channel
pub const IMAGE_MEAN: f32 = 128.0;

/// Subtracted after division, centering values around zero
pub const IMAGE_OFFSET: f32 = 1.0;

/// Size of one encoded tensor element in bytes
pub const FLOAT_TYPE_SIZE: usize = 4;

/// Channels per pixel (RGB)
pub const PIXEL_SIZE: usize = 3;

/// Normalized model input, laid out as (row, column, channel)
#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl InputTensor {
    /// Wrap an already-normalized buffer
    ///
    /// # Errors
    /// Returns [`SegmentationError::InvalidInput`] if `data` does not hold
    /// exactly `width * height * 3` values.
    pub fn from_vec(width: u32, height: u32, data: Vec<f32>) -> Result<Self> {
        let expected = tensor_len(width, height);
        if data.len() != expected {
            return Err(SegmentationError::InvalidInput(format!(
                "input tensor for {}x{} needs {} values, got {}",
                width,
                height,
                expected,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Number of f32 values
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Size of the native-byte-order encoding
    pub fn byte_len(&self) -> usize {
        self.data.len() * FLOAT_TYPE_SIZE
    }

    /// Encode the tensor as native-byte-order f32 values
    pub fn to_ne_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.byte_len());
        for value in &self.data {
            bytes.extend_from_slice(&value.to_ne_bytes());
        }
        bytes
    }
}

/// Number of f32 values in an input tensor of the given size
pub fn tensor_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * PIXEL_SIZE
}

/// Normalize one 8-bit channel value into roughly [-1, 1]
#[inline]
pub fn normalize_channel(channel: u8) -> f32 {
    channel as f32 / IMAGE_MEAN - IMAGE_OFFSET
}

/// Resize `source` to exactly `target_width x target_height` and encode it
///
/// Steps:
/// 1. Unfiltered (nearest-neighbour) resize without preserving aspect ratio
/// 2. Walk pixels in row-major order
/// 3. Normalize R, G, B with `channel / IMAGE_MEAN - IMAGE_OFFSET`
///
/// Returns the resized RGB image (the base for the overlay) together with
/// the tensor.
pub fn resize_and_encode(
    source: &DynamicImage,
    target_width: u32,
    target_height: u32,
) -> Result<(RgbImage, InputTensor)> {
    if target_width == 0 || target_height == 0 {
        return Err(SegmentationError::InvalidInput(format!(
            "target size must be non-zero, got {}x{}",
            target_width, target_height
        )));
    }

    let (src_w, src_h) = source.dimensions();
    if src_w == 0 || src_h == 0 {
        return Err(SegmentationError::InvalidInput(format!(
            "source image is empty ({}x{})",
            src_w, src_h
        )));
    }

    let resized = if (src_w, src_h) == (target_width, target_height) {
        source.to_rgb8()
    } else {
        source
            .resize_exact(target_width, target_height, FilterType::Nearest)
            .to_rgb8()
    };

    let mut data = Vec::with_capacity(tensor_len(target_width, target_height));
    // `pixels()` walks rows top to bottom, left to right within a row
    for pixel in resized.pixels() {
        data.push(normalize_channel(pixel[0]));
        data.push(normalize_channel(pixel[1]));
        data.push(normalize_channel(pixel[2]));
    }

    let tensor = InputTensor::from_vec(target_width, target_height, data)?;
    Ok((resized, tensor))
}
