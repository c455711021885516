//! Text lookup for captured regions and the text-versus-image decision made
//! before a region is handed to downstream OCR.

use serde::{Deserialize, Serialize};

use crate::geometry::Rect;
use crate::text_layer::TextLayer;

const MATH_SYMBOLS: &str = "∑∫√≤≥≈≠∞π·×÷±→←⇔^_{}|$%#≃≅≡⊂⊃⊆⊇∈∉∧∨∩∪⊥⟂⇒∀∃∴∵\
αβγδθλμνξρστωϕφψΩ=+−*/()[]<>";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionSource {
    /// Extracted text is usable as-is.
    Text,
    /// Text is missing or formula-like; the raster crop should be used.
    Image,
}

pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Heuristic for formula content that plain text extraction mangles.
pub fn looks_like_math(text: &str) -> bool {
    if text.is_empty() {
        return true;
    }
    let symbols = text.chars().filter(|c| MATH_SYMBOLS.contains(*c)).count();
    let alnum = text.chars().filter(|c| c.is_alphanumeric()).count();
    let total = text.chars().count().max(1);
    symbols >= 3 || (alnum > 0 && symbols as f64 / total as f64 > 0.15)
}

/// Joins the text items overlapping `region` (page-space) in layer order.
pub fn region_text(layer: &TextLayer, region: &Rect) -> String {
    let joined = layer
        .items_in(region)
        .map(|item| item.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    normalize_text(&joined)
}

pub fn classify(text: &str) -> RegionSource {
    if looks_like_math(text) {
        RegionSource::Image
    } else {
        RegionSource::Text
    }
}
