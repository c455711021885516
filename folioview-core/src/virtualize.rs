//! Decides which pages are close enough to the visible area to be rendered.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::config::{EvictionPolicy, ViewerConfig};
use crate::page::PageNumber;

/// Vertical placement of one page in the scroll container, in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageBox {
    pub page: PageNumber,
    pub top: f64,
    pub height: f64,
}

impl PageBox {
    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    /// Edge-touching counts as intersecting.
    pub fn intersects_band(&self, band_top: f64, band_bottom: f64) -> bool {
        self.top <= band_bottom && self.bottom() >= band_top
    }
}

/// Stacked page boxes. Empty until the container has been measured.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageLayout {
    boxes: Vec<PageBox>,
}

impl PageLayout {
    /// Stacks pages top to bottom with `gap` between them. Pages without a
    /// screen height (not measured yet) produce an empty layout.
    pub fn stack<I>(heights: I, gap: f64) -> Self
    where
        I: IntoIterator<Item = (PageNumber, Option<f64>)>,
    {
        let mut boxes = Vec::new();
        let mut top = 0.0;
        for (page, height) in heights {
            let Some(height) = height else {
                return Self::default();
            };
            boxes.push(PageBox { page, top, height });
            top += height + gap;
        }
        Self { boxes }
    }

    pub fn from_boxes(boxes: Vec<PageBox>) -> Self {
        Self { boxes }
    }

    pub fn boxes(&self) -> &[PageBox] {
        &self.boxes
    }

    pub fn get(&self, page: PageNumber) -> Option<&PageBox> {
        self.boxes.iter().find(|b| b.page == page)
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn total_height(&self) -> f64 {
        self.boxes.last().map(PageBox::bottom).unwrap_or(0.0)
    }

    /// Pages that intersect `[scroll_top, scroll_top + viewport_height]`, with
    /// their top edge relative to the container top.
    pub fn visible(&self, scroll_top: f64, viewport_height: f64) -> Vec<(PageNumber, f64)> {
        let bottom = scroll_top + viewport_height;
        self.boxes
            .iter()
            .filter(|b| b.top < bottom && b.bottom() > scroll_top)
            .map(|b| (b.page, b.top - scroll_top))
            .collect()
    }
}

pub type VisibilityCallback = Box<dyn FnMut(PageNumber, bool) + Send>;

/// Reports pages entering and leaving a buffered region around the viewport.
pub trait VisibilityObserver: Send {
    fn observe(&mut self, page: PageNumber, callback: VisibilityCallback);
    fn unobserve(&mut self, page: PageNumber);
}

/// Observer driven by explicit scroll offsets and a page layout.
pub struct ScrollMathObserver {
    margin_ratio: f64,
    targets: HashMap<PageNumber, (VisibilityCallback, bool)>,
}

impl ScrollMathObserver {
    pub fn new(margin_ratio: f64) -> Self {
        Self {
            margin_ratio: margin_ratio.max(0.0),
            targets: HashMap::new(),
        }
    }

    pub fn band(&self, scroll_top: f64, viewport_height: f64) -> (f64, f64) {
        let margin = viewport_height * self.margin_ratio;
        (scroll_top - margin, scroll_top + viewport_height + margin)
    }

    /// A viewport without height has no band; every page stays outside.
    pub fn update(&mut self, layout: &PageLayout, scroll_top: f64, viewport_height: f64) {
        let measured = viewport_height.is_finite() && viewport_height > 0.0;
        let (band_top, band_bottom) = self.band(scroll_top, viewport_height);
        for (page, (callback, was_inside)) in &mut self.targets {
            let inside = measured
                && layout
                    .get(*page)
                    .is_some_and(|b| b.intersects_band(band_top, band_bottom));
            if inside != *was_inside {
                *was_inside = inside;
                callback(*page, inside);
            }
        }
    }
}

impl VisibilityObserver for ScrollMathObserver {
    fn observe(&mut self, page: PageNumber, callback: VisibilityCallback) {
        self.targets.insert(page, (callback, false));
    }

    fn unobserve(&mut self, page: PageNumber) {
        self.targets.remove(&page);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowDelta {
    pub entered: Vec<PageNumber>,
    pub left: Vec<PageNumber>,
}

impl WindowDelta {
    pub fn is_empty(&self) -> bool {
        self.entered.is_empty() && self.left.is_empty()
    }
}

pub struct VirtualizationManager {
    observer: ScrollMathObserver,
    changes: Arc<Mutex<Vec<(PageNumber, bool)>>>,
    window: BTreeSet<PageNumber>,
    layout: PageLayout,
    policy: EvictionPolicy,
    scroll_top: f64,
    viewport_height: f64,
}

impl VirtualizationManager {
    pub fn new<I>(pages: I, config: &ViewerConfig) -> Self
    where
        I: IntoIterator<Item = PageNumber>,
    {
        let changes = Arc::new(Mutex::new(Vec::new()));
        let mut observer = ScrollMathObserver::new(config.buffer_ratio);
        for page in pages {
            let sink = Arc::clone(&changes);
            observer.observe(
                page,
                Box::new(move |page, inside| sink.lock().push((page, inside))),
            );
        }
        Self {
            observer,
            changes,
            window: BTreeSet::new(),
            layout: PageLayout::default(),
            policy: config.eviction,
            scroll_top: 0.0,
            viewport_height: 0.0,
        }
    }

    pub fn layout(&self) -> &PageLayout {
        &self.layout
    }

    pub fn scroll_top(&self) -> f64 {
        self.scroll_top
    }

    pub fn viewport_height(&self) -> f64 {
        self.viewport_height
    }

    pub fn set_layout(&mut self, layout: PageLayout) -> WindowDelta {
        self.layout = layout;
        self.refresh()
    }

    pub fn scroll(&mut self, scroll_top: f64, viewport_height: f64) -> WindowDelta {
        self.scroll_top = scroll_top.max(0.0);
        self.viewport_height = viewport_height.max(0.0);
        self.refresh()
    }

    pub fn is_in_window(&self, page: PageNumber) -> bool {
        self.window.contains(&page)
    }

    pub fn window(&self) -> impl Iterator<Item = PageNumber> + '_ {
        self.window.iter().copied()
    }

    pub fn visible(&self) -> Vec<(PageNumber, f64)> {
        self.layout.visible(self.scroll_top, self.viewport_height)
    }

    /// Pages from `delta.left` whose render output should be released.
    pub fn evictions(&self, delta: &WindowDelta) -> Vec<PageNumber> {
        match self.policy {
            EvictionPolicy::Never => Vec::new(),
            EvictionPolicy::OutsideWindow => delta.left.clone(),
        }
    }

    fn refresh(&mut self) -> WindowDelta {
        self.observer
            .update(&self.layout, self.scroll_top, self.viewport_height);
        let mut delta = WindowDelta::default();
        for (page, inside) in self.changes.lock().drain(..) {
            if inside {
                if self.window.insert(page) {
                    delta.entered.push(page);
                }
            } else if self.window.remove(&page) {
                delta.left.push(page);
            }
        }
        delta.entered.sort();
        delta.left.sort();
        if !delta.is_empty() {
            debug!(
                entered = ?delta.entered,
                left = ?delta.left,
                "virtualization window changed"
            );
        }
        delta
    }
}
