// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Label and color registry for the PASCAL VOC segmentation classes
//!
//! The registry is built once and shared behind an `Arc`. Index and name
//! lookups resolve to the same color for every registered label.

use image::Rgb;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use tracing::debug;

use super::error::{Result, SegmentationError};

/// Number of classes the DeepLab model emits per pixel
pub const NUM_CLASSES: usize = 21;

/// Class names, in model output order
pub const LABELS: [&str; NUM_CLASSES] = [
    "background",
    "aeroplane",
    "bicycle",
    "bird",
    "boat",
    "bottle",
    "bus",
    "car",
    "cat",
    "chair",
    "cow",
    "diningtable",
    "dog",
    "horse",
    "motorbike",
    "person",
    "pottedplant",
    "sheep",
    "sofa",
    "train",
    "tv",
];

/// Display color names, parallel to [`LABELS`]
pub const COLOR_NAMES: [&str; NUM_CLASSES] = [
    "black",
    "red",
    "blue",
    "green",
    "gray",
    "cyan",
    "magenta",
    "yellow",
    "grey",
    "aqua",
    "fuchsia",
    "lime",
    "maroon",
    "navy",
    "olive",
    "purple",
    "silver",
    "teal",
    "lightgray",
    "darkgray",
    "white",
];

/// Set of distinct class names present in a segmentation map
pub type LabelSet = BTreeSet<String>;

/// 8-bit RGBA color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    /// Sentinel returned for labels the registry does not know
    pub const TRANSPARENT: Color = Color::rgba(0, 0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 0xFF }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Resolve a color name (case-insensitive) from the fixed named-color table
    pub fn from_name(name: &str) -> Option<Self> {
        let color = match name.to_ascii_lowercase().as_str() {
            "black" => Color::rgb(0x00, 0x00, 0x00),
            "darkgray" | "darkgrey" => Color::rgb(0x44, 0x44, 0x44),
            "gray" | "grey" => Color::rgb(0x88, 0x88, 0x88),
            "lightgray" | "lightgrey" => Color::rgb(0xCC, 0xCC, 0xCC),
            "white" => Color::rgb(0xFF, 0xFF, 0xFF),
            "red" => Color::rgb(0xFF, 0x00, 0x00),
            "green" | "lime" => Color::rgb(0x00, 0xFF, 0x00),
            "blue" => Color::rgb(0x00, 0x00, 0xFF),
            "yellow" => Color::rgb(0xFF, 0xFF, 0x00),
            "cyan" | "aqua" => Color::rgb(0x00, 0xFF, 0xFF),
            "magenta" | "fuchsia" => Color::rgb(0xFF, 0x00, 0xFF),
            "maroon" => Color::rgb(0x80, 0x00, 0x00),
            "navy" => Color::rgb(0x00, 0x00, 0x80),
            "olive" => Color::rgb(0x80, 0x80, 0x00),
            "purple" => Color::rgb(0x80, 0x00, 0x80),
            "silver" => Color::rgb(0xC0, 0xC0, 0xC0),
            "teal" => Color::rgb(0x00, 0x80, 0x80),
            _ => return None,
        };
        Some(color)
    }

    pub fn to_rgb(self) -> Rgb<u8> {
        Rgb([self.r, self.g, self.b])
    }

    /// `#RRGGBB` form, alpha dropped
    pub fn to_hex(self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// One registered class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelEntry {
    pub index: usize,
    pub name: String,
    pub color: Color,
}

/// Label name and color pair as shown in a color legend
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LegendEntry {
    pub label: String,
    pub color: Color,
}

/// Immutable class index ⇄ name ⇄ color mapping
#[derive(Debug, Clone)]
pub struct LabelColorRegistry {
    entries: Vec<LabelEntry>,
    by_name: HashMap<String, usize>,
}

impl LabelColorRegistry {
    /// Registry for the 21 PASCAL VOC classes the DeepLab model predicts
    pub fn pascal_voc() -> Self {
        // The built-in tables are parallel and every color name is in the table
        match Self::from_lists(&LABELS, &COLOR_NAMES) {
            Ok(registry) => registry,
            Err(e) => unreachable!("built-in label tables are inconsistent: {}", e),
        }
    }

    /// Build a registry from parallel label and color-name lists
    ///
    /// # Errors
    /// Returns [`SegmentationError::Config`] if the lists differ in length,
    /// are empty, repeat a label, or name an unknown color.
    pub fn from_lists(labels: &[&str], color_names: &[&str]) -> Result<Self> {
        if labels.len() != color_names.len() {
            return Err(SegmentationError::Config(format!(
                "label list has {} entries but color list has {}",
                labels.len(),
                color_names.len()
            )));
        }
        if labels.is_empty() {
            return Err(SegmentationError::Config("label list is empty".to_string()));
        }
        if labels.len() > u8::MAX as usize + 1 {
            return Err(SegmentationError::Config(format!(
                "at most 256 labels are supported, got {}",
                labels.len()
            )));
        }

        let mut entries = Vec::with_capacity(labels.len());
        let mut by_name = HashMap::with_capacity(labels.len());

        for (index, (label, color_name)) in labels.iter().zip(color_names).enumerate() {
            let color = Color::from_name(color_name).ok_or_else(|| {
                SegmentationError::Config(format!(
                    "unknown color '{}' for label '{}'",
                    color_name, label
                ))
            })?;

            if by_name.insert(label.to_string(), index).is_some() {
                return Err(SegmentationError::Config(format!(
                    "duplicate label '{}'",
                    label
                )));
            }

            entries.push(LabelEntry {
                index,
                name: label.to_string(),
                color,
            });
        }

        Ok(Self { entries, by_name })
    }

    /// Number of registered classes
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[LabelEntry] {
        &self.entries
    }

    /// Label names in index order
    pub fn labels(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|entry| entry.name.as_str())
    }

    /// Color for a class index
    ///
    /// # Panics
    /// Panics if `index >= self.len()`. The postprocessor checks map values
    /// against the registry size before coloring.
    pub fn color_for_index(&self, index: usize) -> Color {
        self.entries[index].color
    }

    /// Color for a class name, or [`Color::TRANSPARENT`] if the name is unknown
    pub fn color_for_label(&self, name: &str) -> Color {
        match self.by_name.get(name) {
            Some(&index) => self.entries[index].color,
            None => {
                debug!("Unknown label '{}', using transparent color", name);
                Color::TRANSPARENT
            }
        }
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn label_for_index(&self, index: usize) -> Option<&str> {
        self.entries.get(index).map(|entry| entry.name.as_str())
    }

    /// Legend rows for the labels found in a segmentation result
    pub fn legend(&self, labels: &LabelSet) -> Vec<LegendEntry> {
        labels
            .iter()
            .map(|label| LegendEntry {
                label: label.clone(),
                color: self.color_for_label(label),
            })
            .collect()
    }
}

impl Default for LabelColorRegistry {
    fn default() -> Self {
        Self::pascal_voc()
    }
}
