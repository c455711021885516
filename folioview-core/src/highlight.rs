use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geometry::{Point, Rect};
use crate::page::PageNumber;
use crate::transform::PageProjection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HighlightId(Uuid);

impl HighlightId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for HighlightId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for HighlightId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HighlightColor {
    #[default]
    Yellow,
    Green,
    Blue,
    Pink,
    Orange,
}

impl HighlightColor {
    pub const ALL: [HighlightColor; 5] = [
        HighlightColor::Yellow,
        HighlightColor::Green,
        HighlightColor::Blue,
        HighlightColor::Pink,
        HighlightColor::Orange,
    ];

    /// Overlay fill, RGBA with partial alpha so the glyphs stay readable.
    pub fn rgba(self) -> [u8; 4] {
        match self {
            HighlightColor::Yellow => [255, 226, 52, 102],
            HighlightColor::Green => [110, 220, 120, 102],
            HighlightColor::Blue => [90, 170, 255, 102],
            HighlightColor::Pink => [255, 120, 190, 102],
            HighlightColor::Orange => [255, 165, 60, 102],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            HighlightColor::Yellow => "yellow",
            HighlightColor::Green => "green",
            HighlightColor::Blue => "blue",
            HighlightColor::Pink => "pink",
            HighlightColor::Orange => "orange",
        }
    }
}

impl FromStr for HighlightColor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HighlightColor::ALL
            .into_iter()
            .find(|color| color.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown highlight color {s:?}"))
    }
}

/// A persisted highlight. `rects` are page-space, so zoom and rotation only
/// change how they are drawn, never what is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighlightRecord {
    pub id: HighlightId,
    pub page_number: PageNumber,
    pub color: HighlightColor,
    pub source_text: String,
    pub rects: Vec<Rect>,
}

impl HighlightRecord {
    pub fn new(
        page_number: PageNumber,
        color: HighlightColor,
        source_text: impl Into<String>,
        rects: Vec<Rect>,
    ) -> Self {
        Self {
            id: HighlightId::generate(),
            page_number,
            color,
            source_text: source_text.into(),
            rects,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FragmentFilter {
    pub min_width: f64,
    pub min_height: f64,
}

impl FragmentFilter {
    fn keeps(&self, rect: &Rect) -> bool {
        rect.width >= self.min_width && rect.height >= self.min_height
    }
}

/// Turns the client rectangles of a finished text selection (screen-space,
/// relative to the page box) into a highlight record.
pub fn capture_highlight(
    page: PageNumber,
    color: HighlightColor,
    selected_text: &str,
    client_rects: &[Rect],
    projection: &PageProjection,
    filter: FragmentFilter,
) -> Option<HighlightRecord> {
    let text = selected_text.trim();
    if text.is_empty() {
        return None;
    }
    let rects: Vec<Rect> = client_rects
        .iter()
        .filter(|rect| filter.keeps(rect))
        .map(|rect| projection.screen_to_page(*rect))
        .collect();
    if rects.is_empty() {
        return None;
    }
    Some(HighlightRecord::new(page, color, text, rects))
}

/// One highlight rectangle projected for drawing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayRect {
    pub id: HighlightId,
    pub color: HighlightColor,
    pub rect: Rect,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovalPrompt {
    pub id: HighlightId,
    pub source_text: String,
}

#[derive(Debug, Clone, Default)]
pub struct HighlightStore {
    records: Vec<HighlightRecord>,
}

impl HighlightStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<HighlightRecord>) -> Self {
        let mut store = Self::new();
        for record in records {
            store.add(record);
        }
        store
    }

    /// Returns false when a record with the same id already exists.
    pub fn add(&mut self, record: HighlightRecord) -> bool {
        if self.records.iter().any(|r| r.id == record.id) {
            return false;
        }
        self.records.push(record);
        true
    }

    pub fn remove(&mut self, id: HighlightId) -> Option<HighlightRecord> {
        let index = self.records.iter().position(|r| r.id == id)?;
        Some(self.records.remove(index))
    }

    pub fn get(&self, id: HighlightId) -> Option<&HighlightRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn list(&self, page: PageNumber) -> Vec<&HighlightRecord> {
        self.records
            .iter()
            .filter(|r| r.page_number == page)
            .collect()
    }

    pub fn all(&self) -> &[HighlightRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn overlay(&self, page: PageNumber, projection: &PageProjection) -> Vec<OverlayRect> {
        self.records
            .iter()
            .filter(|r| r.page_number == page)
            .flat_map(|record| {
                record.rects.iter().map(move |rect| OverlayRect {
                    id: record.id,
                    color: record.color,
                    rect: projection.page_to_screen(*rect),
                })
            })
            .collect()
    }

    /// Topmost highlight under a screen point; later records draw on top.
    pub fn hit_test(
        &self,
        page: PageNumber,
        point: Point,
        projection: &PageProjection,
    ) -> Option<HighlightId> {
        let page_point = projection.screen_point_to_page(point);
        self.records
            .iter()
            .rev()
            .filter(|r| r.page_number == page)
            .find(|r| r.rects.iter().any(|rect| rect.contains(page_point)))
            .map(|r| r.id)
    }

    pub fn removal_prompt(&self, id: HighlightId) -> Option<RemovalPrompt> {
        self.get(id).map(|record| RemovalPrompt {
            id,
            source_text: record.source_text.clone(),
        })
    }
}
