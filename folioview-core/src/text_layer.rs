use crate::engine::TextRun;
use crate::geometry::{PixelRect, PixelSize, Rect};
use crate::transform::PageProjection;

/// One transparent, selectable element laid over the raster.
#[derive(Debug, Clone, PartialEq)]
pub struct TextItem {
    pub text: String,
    /// Run box in page-space, kept for region lookups.
    pub page_box: Rect,
    /// Box on the raster's pixel grid, always inside the raster bounds.
    pub raster_box: PixelRect,
    /// Layout box covering exactly `raster_box`.
    pub css_box: Rect,
    pub font_size_px: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextLayer {
    pub items: Vec<TextItem>,
    /// False when text extraction failed and only the raster is usable.
    pub interactive: bool,
}

impl TextLayer {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            interactive: false,
        }
    }

    pub fn build(runs: &[TextRun], projection: &PageProjection) -> Self {
        Self::build_within(runs, projection, projection.raster_size())
    }

    /// Like [`TextLayer::build`], with raster boxes clamped to `bounds`
    /// instead of the projected raster size.
    pub fn build_within(runs: &[TextRun], projection: &PageProjection, bounds: PixelSize) -> Self {
        let items = runs
            .iter()
            .filter(|run| !run.text.trim().is_empty())
            .filter_map(|run| {
                let page_box = Rect::new(run.x, run.y, run.width.max(0.0), run.font_size_estimate.max(0.0));
                let raster_box = projection.page_to_raster(page_box).clamp_to(bounds);
                if raster_box.is_empty() {
                    return None;
                }
                Some(TextItem {
                    text: run.text.clone(),
                    page_box,
                    raster_box,
                    css_box: projection.raster_to_css(raster_box),
                    font_size_px: run.font_size_estimate * projection.scale.get(),
                })
            })
            .collect();
        Self {
            items,
            interactive: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items whose page-space box overlaps the region, in layer order.
    pub fn items_in(&self, region: &Rect) -> impl Iterator<Item = &TextItem> {
        let region = *region;
        self.items
            .iter()
            .filter(move |item| item.page_box.intersects(&region))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Size;
    use crate::transform::{Rotation, ScaleFactor};

    fn run(text: &str, x: f64, y: f64, width: f64, size: f64) -> TextRun {
        TextRun {
            text: text.to_string(),
            x,
            y,
            width,
            font_size_estimate: size,
        }
    }

    fn projection(scale: f64, dpr: f64, rotation: Rotation) -> PageProjection {
        PageProjection {
            natural: Size::new(612.0, 792.0),
            rotation,
            scale: ScaleFactor::new(scale).unwrap(),
            zoom: 1.0,
            device_pixel_ratio: dpr,
        }
    }

    #[test]
    fn every_item_stays_inside_the_raster() {
        let runs = vec![
            run("Header", 72.0, 40.0, 200.0, 18.0),
            run("edge", 600.0, 780.0, 12.0, 12.0),
            run("overflow", 590.0, 10.0, 80.0, 11.0),
            run("odd", 0.333, 0.777, 13.1, 9.7),
        ];
        for (scale, dpr) in [(1.0, 1.0), (1.4706, 1.25), (0.73, 3.0), (2.2, 1.5)] {
            for rotation in [Rotation::Deg0, Rotation::Deg90, Rotation::Deg180, Rotation::Deg270] {
                let proj = projection(scale, dpr, rotation);
                let layer = TextLayer::build(&runs, &proj);
                assert!(!layer.is_empty());
                for item in &layer.items {
                    assert!(
                        item.raster_box.lies_within(proj.raster_size()),
                        "{} escapes raster at scale {scale} dpr {dpr} {rotation}",
                        item.text
                    );
                }
            }
        }
    }

    #[test]
    fn css_box_matches_raster_grid() {
        let proj = projection(1.5, 2.0, Rotation::Deg0);
        let layer = TextLayer::build(&[run("x", 10.1, 20.2, 30.3, 10.0)], &proj);
        let item = &layer.items[0];
        assert_eq!(item.raster_box, PixelRect::new(30, 60, 91, 30));
        assert_eq!(item.css_box, Rect::new(15.0, 30.0, 45.5, 15.0));
        assert_eq!(item.font_size_px, 15.0);
    }

    #[test]
    fn whitespace_runs_are_skipped() {
        let proj = projection(1.0, 1.0, Rotation::Deg0);
        let layer = TextLayer::build(&[run("  ", 1.0, 1.0, 5.0, 5.0)], &proj);
        assert!(layer.is_empty());
        assert!(layer.interactive);
    }
}
