use serde::{Deserialize, Serialize};

use crate::transform::{effective_size, PageProjection, Rotation, ScaleFactor};
use crate::geometry::Size;

pub const MIN_ZOOM: f64 = 0.5;
pub const MAX_ZOOM: f64 = 3.0;

/// Process-wide view parameters for one open document.
///
/// `revision` advances on every mutation that changes a value; cached per-page
/// scale factors compare against it to know when they are stale.
/// Deserialized values go through the same clamping as the setters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "ViewportFields")]
pub struct ViewportState {
    zoom: f64,
    rotation: Rotation,
    container_width: f64,
    device_pixel_ratio: f64,
    max_page_width: f64,
    #[serde(skip)]
    revision: u64,
}

#[derive(Deserialize)]
#[serde(default)]
struct ViewportFields {
    zoom: f64,
    rotation: Rotation,
    container_width: f64,
    device_pixel_ratio: f64,
    max_page_width: f64,
}

impl Default for ViewportFields {
    fn default() -> Self {
        let viewport = ViewportState::default();
        Self {
            zoom: viewport.zoom,
            rotation: viewport.rotation,
            container_width: viewport.container_width,
            device_pixel_ratio: viewport.device_pixel_ratio,
            max_page_width: viewport.max_page_width,
        }
    }
}

impl From<ViewportFields> for ViewportState {
    fn from(fields: ViewportFields) -> Self {
        let max_page_width = if fields.max_page_width.is_finite() {
            fields.max_page_width
        } else {
            ViewportFields::default().max_page_width
        };
        let mut viewport = ViewportState::new(max_page_width);
        viewport.set_rotation(fields.rotation);
        viewport.set_zoom(fields.zoom);
        viewport.set_device_pixel_ratio(fields.device_pixel_ratio);
        viewport.set_container_width(fields.container_width);
        viewport.revision = 0;
        viewport
    }
}

/// Which parts of the viewport a mutation touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ViewportChange {
    pub zoom: bool,
    pub rotation: bool,
    pub layout: bool,
}

impl ViewportChange {
    pub fn is_empty(&self) -> bool {
        !(self.zoom || self.rotation || self.layout)
    }

    /// True when raster dimensions depend on the change and pages must re-render.
    pub fn invalidates_raster(&self) -> bool {
        self.rotation || self.layout
    }
}

impl ViewportState {
    pub fn new(max_page_width: f64) -> Self {
        Self {
            zoom: 1.0,
            rotation: Rotation::Deg0,
            container_width: 0.0,
            device_pixel_ratio: 1.0,
            max_page_width: max_page_width.max(1.0),
            revision: 0,
        }
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn container_width(&self) -> f64 {
        self.container_width
    }

    pub fn device_pixel_ratio(&self) -> f64 {
        self.device_pixel_ratio
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_measured(&self) -> bool {
        self.container_width > 0.0
    }

    pub fn set_zoom(&mut self, zoom: f64) -> ViewportChange {
        let zoom = if zoom.is_finite() {
            zoom.clamp(MIN_ZOOM, MAX_ZOOM)
        } else {
            1.0
        };
        if (self.zoom - zoom).abs() <= f64::EPSILON {
            return ViewportChange::default();
        }
        self.zoom = zoom;
        self.bump();
        ViewportChange {
            zoom: true,
            ..ViewportChange::default()
        }
    }

    pub fn zoom_by(&mut self, factor: f64) -> ViewportChange {
        self.set_zoom(self.zoom * factor)
    }

    pub fn set_rotation(&mut self, rotation: Rotation) -> ViewportChange {
        if self.rotation == rotation {
            return ViewportChange::default();
        }
        self.rotation = rotation;
        self.bump();
        ViewportChange {
            rotation: true,
            ..ViewportChange::default()
        }
    }

    pub fn rotate_clockwise(&mut self) -> ViewportChange {
        self.set_rotation(self.rotation.clockwise())
    }

    pub fn rotate_counter_clockwise(&mut self) -> ViewportChange {
        self.set_rotation(self.rotation.counter_clockwise())
    }

    /// Records the measured container width, capped at the maximum page width.
    /// Non-positive widths mark the viewport as not yet measured.
    pub fn set_container_width(&mut self, width: f64) -> ViewportChange {
        let width = if width.is_finite() && width > 0.0 {
            width.min(self.max_page_width)
        } else {
            0.0
        };
        if (self.container_width - width).abs() <= f64::EPSILON {
            return ViewportChange::default();
        }
        self.container_width = width;
        self.bump();
        ViewportChange {
            layout: true,
            ..ViewportChange::default()
        }
    }

    pub fn set_device_pixel_ratio(&mut self, dpr: f64) -> ViewportChange {
        let dpr = if dpr.is_finite() && dpr > 0.0 { dpr } else { 1.0 };
        if (self.device_pixel_ratio - dpr).abs() <= f64::EPSILON {
            return ViewportChange::default();
        }
        self.device_pixel_ratio = dpr;
        self.bump();
        ViewportChange {
            layout: true,
            ..ViewportChange::default()
        }
    }

    pub fn scale_factor(&self, natural: Size) -> Option<ScaleFactor> {
        let effective = effective_size(natural, self.rotation);
        ScaleFactor::for_container(self.container_width, effective.width)
    }

    pub fn projection(&self, natural: Size) -> Option<PageProjection> {
        let scale = self.scale_factor(natural)?;
        Some(PageProjection {
            natural,
            rotation: self.rotation,
            scale,
            zoom: self.zoom,
            device_pixel_ratio: self.device_pixel_ratio,
        })
    }

    fn bump(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }
}

impl Default for ViewportState {
    fn default() -> Self {
        Self::new(crate::config::ViewerConfig::default().max_page_width)
    }
}
