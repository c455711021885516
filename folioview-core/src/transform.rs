//! Conversions between the coordinate spaces a page passes through.
//!
//! * page-space: document units at natural size, unrotated, top-left origin
//! * css-space: page-space rotated into view and multiplied by the scale factor
//! * screen-space: css-space multiplied by the ambient zoom of the page stack
//! * raster-space: css-space multiplied by the device pixel ratio, floored
//!
//! Every raster coordinate is produced by `floor` so the raster buffer and the
//! text layer share one pixel grid.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geometry::{PixelRect, PixelSize, Point, Rect, Size};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn from_degrees(degrees: i32) -> Option<Self> {
        match degrees.rem_euclid(360) {
            0 => Some(Self::Deg0),
            90 => Some(Self::Deg90),
            180 => Some(Self::Deg180),
            270 => Some(Self::Deg270),
            _ => None,
        }
    }

    pub fn degrees(self) -> u16 {
        match self {
            Self::Deg0 => 0,
            Self::Deg90 => 90,
            Self::Deg180 => 180,
            Self::Deg270 => 270,
        }
    }

    pub fn clockwise(self) -> Self {
        match self {
            Self::Deg0 => Self::Deg90,
            Self::Deg90 => Self::Deg180,
            Self::Deg180 => Self::Deg270,
            Self::Deg270 => Self::Deg0,
        }
    }

    pub fn counter_clockwise(self) -> Self {
        match self {
            Self::Deg0 => Self::Deg270,
            Self::Deg90 => Self::Deg0,
            Self::Deg180 => Self::Deg90,
            Self::Deg270 => Self::Deg180,
        }
    }

    pub fn is_quarter_turn(self) -> bool {
        matches!(self, Self::Deg90 | Self::Deg270)
    }
}

impl TryFrom<u16> for Rotation {
    type Error = String;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Rotation::from_degrees(i32::from(value))
            .ok_or_else(|| format!("unsupported rotation {value}, expected 0/90/180/270"))
    }
}

impl From<Rotation> for u16 {
    fn from(value: Rotation) -> Self {
        value.degrees()
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

/// Natural size as seen after rotation; quarter turns swap the axes.
pub fn effective_size(natural: Size, rotation: Rotation) -> Size {
    if rotation.is_quarter_turn() {
        natural.transposed()
    } else {
        natural
    }
}

/// Ratio between page-space and css-space for one page.
///
/// Only constructible from finite positive inputs; an unmeasured container
/// yields `None`, which callers treat as "not ready".
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct ScaleFactor(f64);

impl ScaleFactor {
    pub fn new(value: f64) -> Option<Self> {
        (value.is_finite() && value > 0.0).then_some(Self(value))
    }

    pub fn for_container(container_width: f64, effective_width: f64) -> Option<Self> {
        if !(container_width.is_finite() && container_width > 0.0) {
            return None;
        }
        if !(effective_width.is_finite() && effective_width > 0.0) {
            return None;
        }
        Self::new(container_width / effective_width)
    }

    pub fn get(self) -> f64 {
        self.0
    }
}

pub fn to_raster_coord(value: f64, scale: ScaleFactor, dpr: f64) -> i64 {
    (value * scale.get() * dpr).floor() as i64
}

pub fn to_raster(point: Point, scale: ScaleFactor, dpr: f64) -> (i64, i64) {
    (
        to_raster_coord(point.x, scale, dpr),
        to_raster_coord(point.y, scale, dpr),
    )
}

/// Floors both edges independently so adjacent boxes never overlap or gap.
pub fn to_raster_rect(rect: Rect, scale: ScaleFactor, dpr: f64) -> PixelRect {
    let left = to_raster_coord(rect.x, scale, dpr);
    let top = to_raster_coord(rect.y, scale, dpr);
    let right = to_raster_coord(rect.right(), scale, dpr);
    let bottom = to_raster_coord(rect.bottom(), scale, dpr);
    PixelRect::new(left, top, right - left, bottom - top)
}

pub fn raster_size(size: Size, scale: ScaleFactor, dpr: f64) -> PixelSize {
    let width = to_raster_coord(size.width, scale, dpr).max(0);
    let height = to_raster_coord(size.height, scale, dpr).max(0);
    PixelSize::new(
        u32::try_from(width).unwrap_or(u32::MAX),
        u32::try_from(height).unwrap_or(u32::MAX),
    )
}

pub fn to_screen(point: Point, scale: ScaleFactor, zoom: f64) -> Point {
    Point::new(
        point.x * scale.get() * zoom,
        point.y * scale.get() * zoom,
    )
}

/// Zoom is an outer transform on the page stack, so it is divided out first.
pub fn from_screen(point: Point, scale: ScaleFactor, zoom: f64) -> Point {
    Point::new(
        point.x / zoom / scale.get(),
        point.y / zoom / scale.get(),
    )
}

pub fn rect_to_screen(rect: Rect, scale: ScaleFactor, zoom: f64) -> Rect {
    Rect::from_corners(
        to_screen(rect.origin(), scale, zoom),
        to_screen(rect.far_corner(), scale, zoom),
    )
}

pub fn rect_from_screen(rect: Rect, scale: ScaleFactor, zoom: f64) -> Rect {
    Rect::from_corners(
        from_screen(rect.origin(), scale, zoom),
        from_screen(rect.far_corner(), scale, zoom),
    )
}

/// Everything needed to project one page between spaces, captured at a single
/// instant so a render never mixes two viewport states.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageProjection {
    pub natural: Size,
    pub rotation: Rotation,
    pub scale: ScaleFactor,
    pub zoom: f64,
    pub device_pixel_ratio: f64,
}

impl PageProjection {
    pub fn effective_size(&self) -> Size {
        effective_size(self.natural, self.rotation)
    }

    pub fn raster_size(&self) -> PixelSize {
        raster_size(self.effective_size(), self.scale, self.device_pixel_ratio)
    }

    /// Layout size of the page box before zoom.
    pub fn css_size(&self) -> Size {
        let size = self.effective_size();
        Size::new(size.width * self.scale.get(), size.height * self.scale.get())
    }

    pub fn screen_size(&self) -> Size {
        let size = self.css_size();
        Size::new(size.width * self.zoom, size.height * self.zoom)
    }

    /// Unrotated page point into the rotated, still unscaled frame.
    pub fn rotate_into_view(&self, point: Point) -> Point {
        let Size { width, height } = self.natural;
        match self.rotation {
            Rotation::Deg0 => point,
            Rotation::Deg90 => Point::new(height - point.y, point.x),
            Rotation::Deg180 => Point::new(width - point.x, height - point.y),
            Rotation::Deg270 => Point::new(point.y, width - point.x),
        }
    }

    pub fn rotate_out_of_view(&self, point: Point) -> Point {
        let Size { width, height } = self.natural;
        match self.rotation {
            Rotation::Deg0 => point,
            Rotation::Deg90 => Point::new(point.y, height - point.x),
            Rotation::Deg180 => Point::new(width - point.x, height - point.y),
            Rotation::Deg270 => Point::new(width - point.y, point.x),
        }
    }

    pub fn rect_into_view(&self, rect: Rect) -> Rect {
        Rect::from_corners(
            self.rotate_into_view(rect.origin()),
            self.rotate_into_view(rect.far_corner()),
        )
    }

    pub fn rect_out_of_view(&self, rect: Rect) -> Rect {
        Rect::from_corners(
            self.rotate_out_of_view(rect.origin()),
            self.rotate_out_of_view(rect.far_corner()),
        )
    }

    pub fn page_to_screen(&self, rect: Rect) -> Rect {
        rect_to_screen(self.rect_into_view(rect), self.scale, self.zoom)
    }

    pub fn screen_to_page(&self, rect: Rect) -> Rect {
        self.rect_out_of_view(rect_from_screen(rect, self.scale, self.zoom))
    }

    pub fn screen_point_to_page(&self, point: Point) -> Point {
        self.rotate_out_of_view(from_screen(point, self.scale, self.zoom))
    }

    pub fn page_to_raster(&self, rect: Rect) -> PixelRect {
        to_raster_rect(self.rect_into_view(rect), self.scale, self.device_pixel_ratio)
    }

    /// Css-space box that covers exactly the given raster pixels.
    pub fn raster_to_css(&self, rect: PixelRect) -> Rect {
        let dpr = self.device_pixel_ratio;
        Rect::new(
            rect.x as f64 / dpr,
            rect.y as f64 / dpr,
            rect.width as f64 / dpr,
            rect.height as f64 / dpr,
        )
    }
}
