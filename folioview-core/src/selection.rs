//! Drag-box region capture.
//!
//! The gesture is a two-state machine; transitions take the state by value and
//! return the next one, so any event source can drive it.

use serde::Serialize;

use crate::engine::RasterBuffer;
use crate::geometry::{PixelRect, Point, Rect};
use crate::page::PageNumber;
use crate::region::{classify, region_text, RegionSource};
use crate::text_layer::TextLayer;
use crate::transform::{PageProjection, ScaleFactor};

/// Which pointer gesture the page currently interprets. The two capture modes
/// never run at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureMode {
    #[default]
    Off,
    Region,
    Highlight,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum DragState {
    #[default]
    Idle,
    Dragging {
        page: PageNumber,
        origin: Point,
        current: Point,
    },
}

/// A finished drag in screen-space, relative to the page box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragBox {
    pub page: PageNumber,
    pub rect: Rect,
}

impl DragState {
    pub fn pointer_down(self, page: PageNumber, point: Point) -> Self {
        DragState::Dragging {
            page,
            origin: point,
            current: point,
        }
    }

    pub fn pointer_move(self, point: Point) -> Self {
        match self {
            DragState::Idle => DragState::Idle,
            DragState::Dragging { page, origin, .. } => DragState::Dragging {
                page,
                origin,
                current: point,
            },
        }
    }

    pub fn pointer_up(self, point: Point) -> (Self, Option<DragBox>) {
        match self {
            DragState::Idle => (DragState::Idle, None),
            DragState::Dragging { page, origin, .. } => (
                DragState::Idle,
                Some(DragBox {
                    page,
                    rect: Rect::from_corners(origin, point),
                }),
            ),
        }
    }

    pub fn cancel(self) -> Self {
        DragState::Idle
    }

    /// Box to draw while the drag is in progress, always normalized.
    pub fn preview(&self) -> Option<DragBox> {
        match *self {
            DragState::Idle => None,
            DragState::Dragging {
                page,
                origin,
                current,
            } => Some(DragBox {
                page,
                rect: Rect::from_corners(origin, current),
            }),
        }
    }
}

/// Result of a drag-select, handed off to OCR or AI context capture.
#[derive(Debug, Clone, Serialize)]
pub struct RegionSelection {
    pub page_number: PageNumber,
    /// Screen-space box as drawn by the user.
    pub css: Rect,
    /// Page-space box.
    pub pdf: Rect,
    pub scale_factor: ScaleFactor,
    /// Crop box in the raster the image was taken from.
    pub raster_box: Option<PixelRect>,
    #[serde(skip)]
    pub image: Option<RasterBuffer>,
    pub text: String,
    pub source: RegionSource,
}

impl RegionSelection {
    /// Converts a finished drag. `projection` is the current one; `rendered`
    /// is the projection the page raster was produced with, which may differ
    /// in zoom.
    pub fn capture(
        drag: DragBox,
        projection: &PageProjection,
        rendered: Option<(&PageProjection, &RasterBuffer)>,
        text_layer: Option<&TextLayer>,
    ) -> Self {
        let pdf = projection.screen_to_page(drag.rect);
        let (raster_box, image) = match rendered {
            Some((rendered, raster)) => {
                let crop = rendered.page_to_raster(pdf).clamp_to(raster.size());
                (Some(crop), raster.crop(crop))
            }
            None => (None, None),
        };
        let text = text_layer
            .map(|layer| region_text(layer, &pdf))
            .unwrap_or_default();
        let source = classify(&text);
        Self {
            page_number: drag.page,
            css: drag.rect,
            pdf,
            scale_factor: projection.scale,
            raster_box,
            image,
            text,
            source,
        }
    }
}
