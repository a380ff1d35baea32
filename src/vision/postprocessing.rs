// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Segmentation post-processing
//!
//! Turns raw per-pixel class logits into a class-index map, the set of
//! labels present, and a semi-transparent color overlay.
//!
//! Axis convention: the output tensor is `[1, d1, d2, classes]`. The
//! segmentation map keeps that order, so `map.get(i, j)` is the class at
//! output position `(i, j)`. Because the input tensor is encoded in image
//! row-major order, `d1` follows image rows and `d2` image columns: image
//! pixel `(x, y)` is colored by `map.get(y, x)`.

use image::{Rgb, RgbImage};
use std::sync::Arc;
use tracing::debug;

use super::error::{Result, SegmentationError};
use super::labels::{LabelColorRegistry, LabelSet};

/// Default overlay opacity (42/255, about 16%)
pub const OVERLAY_ALPHA: u8 = 42;

/// Raw model output: `[1][d1][d2][num_classes]` logits, no softmax applied
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTensor {
    dim1: usize,
    dim2: usize,
    num_classes: usize,
    data: Vec<f32>,
}

impl OutputTensor {
    /// Build from spatial sizes and a flat logits buffer
    pub fn new(dim1: usize, dim2: usize, num_classes: usize, data: Vec<f32>) -> Result<Self> {
        if dim1 == 0 || dim2 == 0 || num_classes == 0 {
            return Err(SegmentationError::InvalidModel(format!(
                "output tensor has an empty dimension: [1, {}, {}, {}]",
                dim1, dim2, num_classes
            )));
        }
        let expected = dim1 * dim2 * num_classes;
        if data.len() != expected {
            return Err(SegmentationError::InvalidModel(format!(
                "output tensor [1, {}, {}, {}] needs {} values, got {}",
                dim1,
                dim2,
                num_classes,
                expected,
                data.len()
            )));
        }
        Ok(Self {
            dim1,
            dim2,
            num_classes,
            data,
        })
    }

    /// Build from a runtime-reported shape, which must be `[1, d1, d2, classes]`
    pub fn from_shape_vec(shape: &[usize], data: Vec<f32>) -> Result<Self> {
        match shape {
            [1, dim1, dim2, classes] => Self::new(*dim1, *dim2, *classes, data),
            other => Err(SegmentationError::InvalidModel(format!(
                "expected output shape [1, width, height, classes], got {:?}",
                other
            ))),
        }
    }

    /// Size of the first spatial axis
    pub fn dim1(&self) -> usize {
        self.dim1
    }

    /// Size of the second spatial axis
    pub fn dim2(&self) -> usize {
        self.dim2
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Class logits at output position `(i, j)`
    pub fn logits(&self, i: usize, j: usize) -> &[f32] {
        let start = (i * self.dim2 + j) * self.num_classes;
        &self.data[start..start + self.num_classes]
    }
}

/// Per-position class indices, in output tensor axis order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentationMap {
    dim1: usize,
    dim2: usize,
    classes: Vec<u8>,
}

impl SegmentationMap {
    /// Build a map from nested rows (`rows[i][j]`)
    ///
    /// # Errors
    /// Returns [`SegmentationError::InvalidInput`] if rows are ragged or empty.
    pub fn from_rows(rows: &[Vec<u8>]) -> Result<Self> {
        let dim1 = rows.len();
        let dim2 = rows.first().map(|row| row.len()).unwrap_or(0);
        if dim1 == 0 || dim2 == 0 {
            return Err(SegmentationError::InvalidInput(
                "segmentation map must not be empty".to_string(),
            ));
        }
        if rows.iter().any(|row| row.len() != dim2) {
            return Err(SegmentationError::InvalidInput(
                "segmentation map rows differ in length".to_string(),
            ));
        }
        Ok(Self {
            dim1,
            dim2,
            classes: rows.concat(),
        })
    }

    /// Outer length (`map.len()`), matched against the image height
    pub fn dim1(&self) -> usize {
        self.dim1
    }

    /// Inner length (`map[0].len()`), matched against the image width
    pub fn dim2(&self) -> usize {
        self.dim2
    }

    /// Class index at `(i, j)`
    pub fn get(&self, i: usize, j: usize) -> usize {
        self.classes[i * self.dim2 + j] as usize
    }

    /// Largest class index in the map
    pub fn max_class(&self) -> usize {
        self.classes.iter().copied().max().unwrap_or(0) as usize
    }

    pub fn to_rows(&self) -> Vec<Vec<u8>> {
        self.classes
            .chunks(self.dim2)
            .map(|row| row.to_vec())
            .collect()
    }

    /// Number of positions assigned to each class index
    pub fn class_histogram(&self, num_classes: usize) -> Vec<usize> {
        let mut counts = vec![0usize; num_classes];
        for &class in &self.classes {
            if let Some(count) = counts.get_mut(class as usize) {
                *count += 1;
            }
        }
        counts
    }
}

/// Index of the largest value, first occurrence wins on ties
///
/// Returns 0 for an empty slice.
pub fn argmax(values: &[f32]) -> usize {
    let mut max = match values.first() {
        Some(&v) => v,
        None => return 0,
    };
    let mut index = 0;
    for (k, &value) in values.iter().enumerate().skip(1) {
        if value > max {
            max = value;
            index = k;
        }
    }
    index
}

/// Blend one channel: `base * (1 - a) + overlay * a` with `a = alpha / 255`
#[inline]
pub fn blend_channel(base: u8, overlay: u8, alpha: u8) -> u8 {
    let a = alpha as u32;
    ((base as u32 * (255 - a) + overlay as u32 * a + 127) / 255) as u8
}

/// Converts model output into class maps, label sets and overlays
#[derive(Debug, Clone)]
pub struct SegmentationPostprocessor {
    registry: Arc<LabelColorRegistry>,
    overlay_alpha: u8,
}

impl SegmentationPostprocessor {
    pub fn new(registry: Arc<LabelColorRegistry>) -> Self {
        Self {
            registry,
            overlay_alpha: OVERLAY_ALPHA,
        }
    }

    pub fn with_overlay_alpha(mut self, alpha: u8) -> Self {
        self.overlay_alpha = alpha;
        self
    }

    pub fn overlay_alpha(&self) -> u8 {
        self.overlay_alpha
    }

    pub fn registry(&self) -> &Arc<LabelColorRegistry> {
        &self.registry
    }

    /// Per-position argmax over the class logits
    ///
    /// Equivalent to `argmax(output, axis = 3)`. Softmax is skipped since it
    /// does not change the argmax.
    ///
    /// # Errors
    /// Returns [`SegmentationError::InvalidModel`] if the output's class count
    /// differs from the registry size.
    pub fn classify(&self, output: &OutputTensor) -> Result<(SegmentationMap, LabelSet)> {
        if output.num_classes() != self.registry.len() {
            return Err(SegmentationError::InvalidModel(format!(
                "model emits {} classes but {} labels are registered",
                output.num_classes(),
                self.registry.len()
            )));
        }

        let (dim1, dim2) = (output.dim1(), output.dim2());
        let mut classes = Vec::with_capacity(dim1 * dim2);
        let mut seen = vec![false; self.registry.len()];

        for i in 0..dim1 {
            for j in 0..dim2 {
                let index = argmax(output.logits(i, j));
                classes.push(index as u8);
                seen[index] = true;
            }
        }

        let labels: LabelSet = seen
            .iter()
            .enumerate()
            .filter_map(|(index, &present)| {
                if present {
                    self.registry.label_for_index(index)
                } else {
                    None
                }
            })
            .map(str::to_string)
            .collect();

        debug!("Classified {}x{} positions, {} labels present", dim1, dim2, labels.len());

        Ok((
            SegmentationMap {
                dim1,
                dim2,
                classes,
            },
            labels,
        ))
    }

    /// Paint each pixel with its class color and blend it over `base`
    ///
    /// # Errors
    /// - [`SegmentationError::DimensionMismatch`] unless
    ///   `base.width() == map.dim2()` and `base.height() == map.dim1()`
    /// - [`SegmentationError::InvalidInput`] if the map holds a class index
    ///   the registry does not know
    pub fn build_overlay(&self, base: &RgbImage, map: &SegmentationMap) -> Result<RgbImage> {
        let (width, height) = base.dimensions();
        if width as usize != map.dim2() || height as usize != map.dim1() {
            return Err(SegmentationError::DimensionMismatch {
                image_width: width,
                image_height: height,
                map_width: map.dim2(),
                map_height: map.dim1(),
            });
        }
        self.check_classes(map)?;

        let alpha = self.overlay_alpha;
        let overlay = RgbImage::from_fn(width, height, |x, y| {
            let base_pixel = base.get_pixel(x, y);
            // Image is (x, y); the map is indexed in tensor order (row, col)
            let color = self.registry.color_for_index(map.get(y as usize, x as usize));
            Rgb([
                blend_channel(base_pixel[0], color.r, alpha),
                blend_channel(base_pixel[1], color.g, alpha),
                blend_channel(base_pixel[2], color.b, alpha),
            ])
        });

        Ok(overlay)
    }

    /// Unblended class-color image, useful for saving masks on their own
    pub fn build_mask(&self, map: &SegmentationMap) -> Result<RgbImage> {
        self.check_classes(map)?;
        Ok(RgbImage::from_fn(map.dim2() as u32, map.dim1() as u32, |x, y| {
            self.registry
                .color_for_index(map.get(y as usize, x as usize))
                .to_rgb()
        }))
    }

    fn check_classes(&self, map: &SegmentationMap) -> Result<()> {
        let max_class = map.max_class();
        if max_class >= self.registry.len() {
            return Err(SegmentationError::InvalidInput(format!(
                "segmentation map holds class {} but only {} labels are registered",
                max_class,
                self.registry.len()
            )));
        }
        Ok(())
    }
}
