//! Per-document API exposed to the host application.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::config::ViewerConfig;
use crate::engine::{DocumentEngine, DocumentHandle, RasterBuffer};
use crate::error::ViewerError;
use crate::geometry::{Point, Rect};
use crate::highlight::{
    capture_highlight, FragmentFilter, HighlightColor, HighlightId, HighlightRecord,
    HighlightStore, OverlayRect, RemovalPrompt,
};
use crate::page::{PageDescriptor, PageNumber};
use crate::pipeline::{PageTable, RenderOutcome, RenderState};
use crate::scroll::ScrollPositionResolver;
use crate::selection::{CaptureMode, DragState, RegionSelection};
use crate::store::{PersistedDocumentState, ViewPreferences};
use crate::text_layer::TextLayer;
use crate::transform::{PageProjection, Rotation};
use crate::viewport::{ViewportChange, ViewportState};
use crate::virtualize::{PageBox, PageLayout, VirtualizationManager, WindowDelta};

#[derive(Debug, Clone)]
pub enum ViewerEvent {
    CurrentPageChanged(PageNumber),
    PageRasterReady(PageNumber),
    PageRenderFailed { page: PageNumber, reason: String },
    TextLayerUnavailable { page: PageNumber, reason: String },
    RegionSelected(RegionSelection),
    HighlightAdded(HighlightId),
    HighlightRemoved(HighlightId),
}

#[derive(Debug, Default)]
struct Interaction {
    mode: CaptureMode,
    drag: DragState,
}

pub struct DocumentView {
    engine: Arc<dyn DocumentEngine>,
    handle: DocumentHandle,
    config: ViewerConfig,
    viewport: Mutex<ViewportState>,
    pages: Mutex<PageTable>,
    virtualization: Mutex<VirtualizationManager>,
    scroll: Mutex<ScrollPositionResolver>,
    highlights: Mutex<HighlightStore>,
    interaction: Mutex<Interaction>,
    events: Arc<Mutex<Vec<ViewerEvent>>>,
    closed: AtomicBool,
}

impl DocumentView {
    /// Opens the document and measures every page. Any failure here is fatal
    /// and releases whatever was acquired.
    #[instrument(skip(engine, bytes, config), fields(bytes = bytes.len()))]
    pub async fn open(
        engine: Arc<dyn DocumentEngine>,
        bytes: Vec<u8>,
        config: ViewerConfig,
    ) -> Result<Self, ViewerError> {
        let handle = engine
            .open_document(bytes)
            .await
            .map_err(ViewerError::DocumentLoad)?;

        let descriptors = match load_descriptors(engine.as_ref(), handle).await {
            Ok(descriptors) => descriptors,
            Err((acquired, err)) => {
                for page in acquired {
                    engine.release_page(page.handle);
                }
                engine.destroy_document(handle);
                return Err(ViewerError::DocumentLoad(err));
            }
        };
        info!(pages = descriptors.len(), "document opened");

        let numbers: Vec<PageNumber> = descriptors.iter().map(|d| d.number).collect();
        Ok(Self {
            engine,
            handle,
            viewport: Mutex::new(ViewportState::new(config.max_page_width)),
            pages: Mutex::new(PageTable::new(descriptors)),
            virtualization: Mutex::new(VirtualizationManager::new(numbers, &config)),
            scroll: Mutex::new(ScrollPositionResolver::new(
                config.scroll_debounce(),
                config.current_page_tolerance,
            )),
            highlights: Mutex::new(HighlightStore::new()),
            interaction: Mutex::new(Interaction::default()),
            events: Arc::new(Mutex::new(Vec::new())),
            closed: AtomicBool::new(false),
            config,
        })
    }

    pub fn events(&self) -> Arc<Mutex<Vec<ViewerEvent>>> {
        Arc::clone(&self.events)
    }

    pub fn drain_events(&self) -> Vec<ViewerEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn page_count(&self) -> usize {
        self.pages.lock().len()
    }

    pub fn page_numbers(&self) -> Vec<PageNumber> {
        self.pages.lock().descriptors().map(|d| d.number).collect()
    }

    pub fn viewport(&self) -> ViewportState {
        *self.viewport.lock()
    }

    pub fn set_zoom(&self, zoom: f64) -> ViewportChange {
        self.update_viewport(|viewport| viewport.set_zoom(zoom))
    }

    pub fn zoom_by(&self, factor: f64) -> ViewportChange {
        self.update_viewport(|viewport| viewport.zoom_by(factor))
    }

    pub fn set_rotation(&self, rotation: Rotation) -> ViewportChange {
        self.update_viewport(|viewport| viewport.set_rotation(rotation))
    }

    pub fn rotate_clockwise(&self) -> ViewportChange {
        self.update_viewport(ViewportState::rotate_clockwise)
    }

    pub fn set_container_width(&self, width: f64) -> ViewportChange {
        self.update_viewport(|viewport| viewport.set_container_width(width))
    }

    pub fn set_device_pixel_ratio(&self, dpr: f64) -> ViewportChange {
        self.update_viewport(|viewport| viewport.set_device_pixel_ratio(dpr))
    }

    fn update_viewport<F>(&self, mutate: F) -> ViewportChange
    where
        F: FnOnce(&mut ViewportState) -> ViewportChange,
    {
        let change = mutate(&mut self.viewport.lock());
        if change.is_empty() {
            return change;
        }
        let stale = self.pages.lock().invalidate(change);
        if !stale.is_empty() {
            debug!(pages = ?stale, "viewport change invalidated rendered pages");
        }
        self.relayout();
        change
    }

    fn relayout(&self) {
        let viewport = *self.viewport.lock();
        let layout = {
            let pages = self.pages.lock();
            PageLayout::stack(
                pages.descriptors().map(|d| {
                    let height = viewport
                        .projection(d.natural_size)
                        .map(|p| p.screen_size().height);
                    (d.number, height)
                }),
                self.config.page_gap * viewport.zoom(),
            )
        };
        let delta = self.virtualization.lock().set_layout(layout);
        self.apply_evictions(&delta);
    }

    /// Feeds a scroll position. Returns the change to the render window; the
    /// caller follows up with [`DocumentView::render_window`].
    pub fn scroll_to(&self, scroll_top: f64, viewport_height: f64, now: Instant) -> WindowDelta {
        let delta = self
            .virtualization
            .lock()
            .scroll(scroll_top, viewport_height);
        self.scroll.lock().on_scroll(now);
        self.apply_evictions(&delta);
        delta
    }

    /// Runs the debounced current-page resolution.
    pub fn tick(&self, now: Instant) -> Option<PageNumber> {
        let visible = self.virtualization.lock().visible();
        let page = self.scroll.lock().poll(now, &visible)?;
        debug!(page = page.get(), "current page changed");
        self.events.lock().push(ViewerEvent::CurrentPageChanged(page));
        Some(page)
    }

    /// Programmatic navigation: scrolls the page to the top of the container
    /// and reports it as current without waiting for the debounce.
    pub fn jump_to_page(&self, page: PageNumber, viewport_height: f64) -> Option<WindowDelta> {
        let top = self.scroll_offset_for(page)?;
        let delta = {
            let mut virtualization = self.virtualization.lock();
            let delta = virtualization.scroll(top, viewport_height);
            let visible = virtualization.visible();
            if let Some(current) = self.scroll.lock().report(&visible) {
                self.events.lock().push(ViewerEvent::CurrentPageChanged(current));
            }
            delta
        };
        self.apply_evictions(&delta);
        Some(delta)
    }

    pub fn current_page(&self) -> Option<PageNumber> {
        self.scroll.lock().current()
    }

    pub fn page_box(&self, page: PageNumber) -> Option<PageBox> {
        self.virtualization.lock().layout().get(page).copied()
    }

    /// Scroll offset that puts the page's top edge at the container top.
    pub fn scroll_offset_for(&self, page: PageNumber) -> Option<f64> {
        self.page_box(page).map(|b| b.top)
    }

    pub fn total_height(&self) -> f64 {
        self.virtualization.lock().layout().total_height()
    }

    pub fn projection(&self, page: PageNumber) -> Option<PageProjection> {
        let viewport = *self.viewport.lock();
        let natural = self.pages.lock().descriptor(page)?.natural_size;
        viewport.projection(natural)
    }

    pub fn render_state(&self, page: PageNumber) -> Option<RenderState> {
        self.pages.lock().state(page)
    }

    pub fn raster(&self, page: PageNumber) -> Option<RasterBuffer> {
        self.pages.lock().raster(page).cloned()
    }

    pub fn text_layer(&self, page: PageNumber) -> Option<TextLayer> {
        self.pages.lock().text_layer(page).cloned()
    }

    pub fn window(&self) -> Vec<PageNumber> {
        self.virtualization.lock().window().collect()
    }

    /// Renders one page if the state machine allows it. Requests for a page
    /// that is already rendering return without touching the engine.
    pub async fn render_page(&self, page: PageNumber) -> Result<RenderState, ViewerError> {
        loop {
            self.ensure_open()?;
            let ticket = {
                let viewport = *self.viewport.lock();
                let in_window = self.virtualization.lock().is_in_window(page);
                let mut pages = self.pages.lock();
                if !pages.contains(page) {
                    return Err(ViewerError::PageOutOfRange(page.get()));
                }
                match pages.begin(page, &viewport, in_window) {
                    Ok(ticket) => ticket,
                    Err(refusal) => {
                        debug!(page = page.get(), ?refusal, "render request skipped");
                        return Ok(pages.state(page).unwrap_or(RenderState::NotRendered));
                    }
                }
            };

            let (raster, runs) = tokio::join!(
                self.engine.render_to_buffer(ticket.handle, ticket.viewport),
                self.engine.get_text_runs(ticket.handle),
            );
            self.ensure_open()?;

            let outcome = self.pages.lock().complete(ticket, raster, runs);
            match outcome {
                RenderOutcome::Rendered { text_error } => {
                    let mut events = self.events.lock();
                    if let Some(source) = text_error {
                        let err = ViewerError::TextLayer { page, source };
                        events.push(ViewerEvent::TextLayerUnavailable {
                            page,
                            reason: format!("{:#}", anyhow::Error::new(err)),
                        });
                    }
                    events.push(ViewerEvent::PageRasterReady(page));
                    return Ok(RenderState::Rendered);
                }
                RenderOutcome::Superseded => {
                    debug!(page = page.get(), "render superseded, retrying with current viewport");
                }
                RenderOutcome::Evicted => return Ok(RenderState::NotRendered),
                RenderOutcome::Failed(source) => {
                    self.events.lock().push(ViewerEvent::PageRenderFailed {
                        page,
                        reason: format!("{source:#}"),
                    });
                    return Err(ViewerError::PageRender { page, source });
                }
            }
        }
    }

    /// Renders every page in the window that needs it. Page failures are
    /// logged and reported as events without stopping sibling pages.
    pub async fn render_window(&self) -> Result<usize, ViewerError> {
        let pending: Vec<PageNumber> = {
            let virtualization = self.virtualization.lock();
            let pages = self.pages.lock();
            virtualization
                .window()
                .filter(|page| pages.needs_render(*page))
                .collect()
        };
        let mut rendered = 0;
        for page in pending {
            match self.render_page(page).await {
                Ok(RenderState::Rendered) => rendered += 1,
                Ok(_) => {}
                Err(err) if err.is_page_scoped() => {
                    warn!(page = page.get(), error = %err, "page left unrendered");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(rendered)
    }

    fn apply_evictions(&self, delta: &WindowDelta) {
        let evictions = self.virtualization.lock().evictions(delta);
        let mut pages = self.pages.lock();
        for page in &delta.entered {
            pages.retain(*page);
        }
        for page in evictions {
            if pages.evict(page) {
                debug!(page = page.get(), "evicted page render output");
            }
        }
    }

    pub fn set_capture_mode(&self, mode: CaptureMode) {
        let mut interaction = self.interaction.lock();
        interaction.mode = mode;
        interaction.drag = interaction.drag.cancel();
    }

    pub fn capture_mode(&self) -> CaptureMode {
        self.interaction.lock().mode
    }

    pub fn drag_state(&self) -> DragState {
        self.interaction.lock().drag
    }

    /// Point is screen-space relative to the page box.
    pub fn pointer_down(&self, page: PageNumber, point: Point) {
        let mut interaction = self.interaction.lock();
        if interaction.mode == CaptureMode::Region {
            interaction.drag = interaction.drag.pointer_down(page, point);
        }
    }

    pub fn pointer_move(&self, point: Point) {
        let mut interaction = self.interaction.lock();
        interaction.drag = interaction.drag.pointer_move(point);
    }

    /// Finishes a drag-select and emits the region if it is large enough.
    pub fn pointer_up(&self, point: Point) -> Option<RegionSelection> {
        let drag = {
            let mut interaction = self.interaction.lock();
            let (next, drag) = interaction.drag.pointer_up(point);
            interaction.drag = next;
            drag?
        };
        let min = self.config.min_region_size;
        if drag.rect.width < min || drag.rect.height < min {
            debug!(page = drag.page.get(), "ignoring region below minimum size");
            return None;
        }
        let projection = self.projection(drag.page)?;
        let mut selection = {
            let pages = self.pages.lock();
            let rendered = pages
                .rendered_projection(drag.page)
                .zip(pages.raster(drag.page));
            RegionSelection::capture(
                drag,
                &projection,
                rendered.as_ref().map(|(p, r)| (p, *r)),
                pages.text_layer(drag.page),
            )
        };
        info!(
            page = selection.page_number.get(),
            source = ?selection.source,
            "region selected"
        );
        // the crop stays with the caller; queued events carry geometry and text only
        let image = selection.image.take();
        self.events
            .lock()
            .push(ViewerEvent::RegionSelected(selection.clone()));
        selection.image = image;
        Some(selection)
    }

    /// Converts a finished text selection into a highlight while highlight
    /// mode is on. `client_rects` are screen-space relative to the page box.
    /// The host clears its native selection when this returns `Some`.
    pub fn complete_text_selection(
        &self,
        page: PageNumber,
        selected_text: &str,
        client_rects: &[Rect],
        color: HighlightColor,
    ) -> Option<HighlightId> {
        if self.capture_mode() != CaptureMode::Highlight {
            return None;
        }
        let projection = self.projection(page)?;
        let filter = FragmentFilter {
            min_width: self.config.min_fragment_width,
            min_height: self.config.min_fragment_height,
        };
        let record = capture_highlight(page, color, selected_text, client_rects, &projection, filter)?;
        let id = record.id;
        match self.add_highlight(record) {
            Ok(()) => Some(id),
            Err(err) => {
                warn!(page = page.get(), error = %err, "highlight rejected");
                None
            }
        }
    }

    pub fn add_highlight(&self, record: HighlightRecord) -> Result<(), ViewerError> {
        if !self.pages.lock().contains(record.page_number) {
            return Err(ViewerError::PageOutOfRange(record.page_number.get()));
        }
        let id = record.id;
        if self.highlights.lock().add(record) {
            self.events.lock().push(ViewerEvent::HighlightAdded(id));
        }
        Ok(())
    }

    pub fn remove_highlight(&self, id: HighlightId) -> Result<HighlightRecord, ViewerError> {
        let record = self
            .highlights
            .lock()
            .remove(id)
            .ok_or(ViewerError::HighlightNotFound(id))?;
        self.events.lock().push(ViewerEvent::HighlightRemoved(id));
        Ok(record)
    }

    pub fn list_highlights(&self, page: PageNumber) -> Vec<HighlightRecord> {
        self.highlights
            .lock()
            .list(page)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Highlight rectangles for the page at the current zoom and rotation.
    pub fn overlay(&self, page: PageNumber) -> Vec<OverlayRect> {
        match self.projection(page) {
            Some(projection) => self.highlights.lock().overlay(page, &projection),
            None => Vec::new(),
        }
    }

    /// Context-menu lookup: the highlight under the pointer and its text for
    /// the removal confirmation.
    pub fn highlight_at(&self, page: PageNumber, point: Point) -> Option<RemovalPrompt> {
        let projection = self.projection(page)?;
        let highlights = self.highlights.lock();
        let id = highlights.hit_test(page, point, &projection)?;
        highlights.removal_prompt(id)
    }

    pub fn persisted_state(&self, sidebar_width: f64) -> PersistedDocumentState {
        PersistedDocumentState {
            current_page: self.current_page(),
            preferences: ViewPreferences::capture(&self.viewport(), sidebar_width),
            highlights: self.highlights.lock().all().to_vec(),
        }
    }

    pub fn restore(&self, state: &PersistedDocumentState) {
        self.set_zoom(state.preferences.zoom);
        self.set_rotation(state.preferences.rotation);
        for record in &state.highlights {
            if let Err(err) = self.add_highlight(record.clone()) {
                warn!(id = %record.id, error = %err, "dropping persisted highlight");
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Releases every page handle and raster, then the document itself.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let handles = self.pages.lock().drain();
        for handle in &handles {
            self.engine.release_page(*handle);
        }
        self.engine.destroy_document(self.handle);
        info!(pages = handles.len(), "document closed");
    }

    fn ensure_open(&self) -> Result<(), ViewerError> {
        if self.is_closed() {
            Err(ViewerError::Closed)
        } else {
            Ok(())
        }
    }
}

impl Drop for DocumentView {
    fn drop(&mut self) {
        self.close();
    }
}

async fn load_descriptors(
    engine: &dyn DocumentEngine,
    handle: DocumentHandle,
) -> Result<Vec<PageDescriptor>, (Vec<PageDescriptor>, anyhow::Error)> {
    let count = engine
        .page_count(handle)
        .map_err(|err| (Vec::new(), err))?;
    let mut descriptors = Vec::with_capacity(count as usize);
    for n in 1..=count {
        let Some(number) = PageNumber::new(n) else {
            continue;
        };
        let page = match engine
            .get_page(handle, number)
            .await
            .with_context(|| format!("failed to load page {number}"))
        {
            Ok(page) => page,
            Err(err) => return Err((descriptors, err)),
        };
        let natural_size = match engine
            .get_viewport(page, 1.0, Rotation::Deg0)
            .with_context(|| format!("failed to measure page {number}"))
        {
            Ok(size) => size,
            Err(err) => {
                engine.release_page(page);
                return Err((descriptors, err));
            }
        };
        descriptors.push(PageDescriptor {
            number,
            handle: page,
            natural_size,
        });
    }
    Ok(descriptors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::config::EvictionPolicy;
    use crate::engine::fake::FakeEngine;
    use crate::engine::TextRun;
    use crate::geometry::Size;

    fn page(n: u32) -> PageNumber {
        PageNumber::new(n).unwrap()
    }

    async fn open(engine: &Arc<FakeEngine>) -> DocumentView {
        DocumentView::open(engine.clone(), b"%PDF".to_vec(), ViewerConfig::default())
            .await
            .unwrap()
    }

    fn letter_engine(count: usize) -> Arc<FakeEngine> {
        Arc::new(FakeEngine::with_pages(count, Size::new(600.0, 800.0)))
    }

    #[tokio::test]
    async fn load_failure_is_fatal() {
        let engine = Arc::new(FakeEngine {
            fail_open: true,
            ..FakeEngine::default()
        });
        let result = DocumentView::open(engine.clone(), b"junk".to_vec(), ViewerConfig::default()).await;
        assert!(matches!(result, Err(ViewerError::DocumentLoad(_))));
        assert!(engine.render_calls.lock().is_empty());
    }

    #[tokio::test]
    async fn nothing_renders_before_container_is_measured() {
        let engine = letter_engine(3);
        let view = open(&engine).await;
        view.scroll_to(0.0, 800.0, Instant::now());
        assert_eq!(view.render_window().await.unwrap(), 0);
        assert_eq!(
            view.render_page(page(1)).await.unwrap(),
            RenderState::NotRendered
        );
        assert!(engine.render_calls.lock().is_empty());
    }

    #[tokio::test]
    async fn concurrent_requests_for_one_page_issue_one_render() {
        let engine = letter_engine(2);
        let view = open(&engine).await;
        view.set_container_width(600.0);
        view.scroll_to(0.0, 800.0, Instant::now());

        let (first, second) = tokio::join!(view.render_page(page(1)), view.render_page(page(1)));
        assert_eq!(first.unwrap(), RenderState::Rendered);
        assert_eq!(second.unwrap(), RenderState::Rendering);
        assert_eq!(engine.render_count(1), 1);
        assert_eq!(engine.text_count(1), 1);

        assert_eq!(view.render_page(page(1)).await.unwrap(), RenderState::Rendered);
        assert_eq!(engine.render_count(1), 1);
    }

    #[tokio::test]
    async fn window_limits_rendering_to_nearby_pages() {
        let engine = letter_engine(20);
        let view = open(&engine).await;
        view.set_container_width(600.0);
        view.scroll_to(0.0, 800.0, Instant::now());

        // pages are 800px tall with 16px gaps; the band reaches down to 2400px
        assert_eq!(view.window(), vec![page(1), page(2), page(3)]);
        assert_eq!(view.render_window().await.unwrap(), 3);
        assert_eq!(view.render_state(page(4)), Some(RenderState::NotRendered));
        assert_eq!(engine.render_calls.lock().len(), 3);

        let ready: Vec<_> = view
            .drain_events()
            .into_iter()
            .filter_map(|event| match event {
                ViewerEvent::PageRasterReady(page) => Some(page),
                _ => None,
            })
            .collect();
        assert_eq!(ready, vec![page(1), page(2), page(3)]);
    }

    #[tokio::test]
    async fn window_stays_empty_until_viewport_height_is_known() {
        let engine = letter_engine(3);
        let view = open(&engine).await;
        view.set_container_width(600.0);
        assert!(view.window().is_empty());
        assert_eq!(view.render_window().await.unwrap(), 0);
        assert!(engine.render_calls.lock().is_empty());

        view.scroll_to(0.0, 800.0, Instant::now());
        assert_eq!(view.window(), vec![page(1), page(2), page(3)]);
    }

    #[tokio::test]
    async fn page_scrolled_away_mid_render_is_left_unrendered() {
        let engine = letter_engine(30);
        let config = ViewerConfig {
            eviction: EvictionPolicy::OutsideWindow,
            ..ViewerConfig::default()
        };
        let view = DocumentView::open(engine.clone(), b"%PDF".to_vec(), config)
            .await
            .unwrap();
        view.set_container_width(600.0);
        view.scroll_to(0.0, 800.0, Instant::now());

        let (state, _) = tokio::join!(view.render_page(page(1)), async {
            tokio::task::yield_now().await;
            view.scroll_to(12000.0, 800.0, Instant::now())
        });
        state.unwrap();
        assert!(!view.window().contains(&page(1)));
        assert!(view.raster(page(1)).is_none());
        assert!(view.text_layer(page(1)).is_none());
        assert_eq!(view.render_state(page(1)), Some(RenderState::NotRendered));

        view.scroll_to(0.0, 800.0, Instant::now());
        assert_eq!(view.render_page(page(1)).await.unwrap(), RenderState::Rendered);
        assert!(view.raster(page(1)).is_some());
    }

    #[tokio::test]
    async fn rotation_rerenders_with_swapped_orientation() {
        let engine = letter_engine(1);
        let view = open(&engine).await;
        view.set_container_width(600.0);
        view.scroll_to(0.0, 800.0, Instant::now());
        view.render_window().await.unwrap();
        let before = view.raster(page(1)).unwrap();
        assert_eq!((before.width, before.height), (600, 800));

        view.rotate_clockwise();
        assert_eq!(view.render_state(page(1)), Some(RenderState::Stale));
        view.render_window().await.unwrap();

        let after = view.raster(page(1)).unwrap();
        assert_eq!(view.render_state(page(1)), Some(RenderState::Rendered));
        assert_eq!((after.width, after.height), (600, 450));
        assert!(before.height > before.width && after.width > after.height);
        let (_, viewport) = engine.render_calls.lock()[1];
        assert_eq!(viewport.rotation, Rotation::Deg90);
    }

    #[tokio::test]
    async fn zoom_never_rerasterizes() {
        let engine = letter_engine(1);
        let view = open(&engine).await;
        view.set_container_width(600.0);
        view.scroll_to(0.0, 800.0, Instant::now());
        view.render_window().await.unwrap();
        view.set_zoom(2.0);
        assert_eq!(view.render_state(page(1)), Some(RenderState::Rendered));
        assert_eq!(view.render_window().await.unwrap(), 0);
        assert_eq!(engine.render_count(1), 1);
        assert_eq!(view.page_box(page(1)).unwrap().height, 1600.0);
    }

    #[tokio::test]
    async fn failing_page_does_not_block_siblings_and_retries() {
        let engine = letter_engine(3);
        engine.failing_rasters.lock().insert(2);
        let view = open(&engine).await;
        view.set_container_width(600.0);
        view.scroll_to(0.0, 800.0, Instant::now());

        assert_eq!(view.render_window().await.unwrap(), 2);
        assert_eq!(view.render_state(page(2)), Some(RenderState::NotRendered));
        assert!(view
            .drain_events()
            .iter()
            .any(|e| matches!(e, ViewerEvent::PageRenderFailed { page: p, .. } if *p == page(2))));

        engine.failing_rasters.lock().clear();
        assert_eq!(view.render_window().await.unwrap(), 1);
        assert_eq!(view.render_state(page(2)), Some(RenderState::Rendered));
    }

    #[tokio::test]
    async fn text_failure_keeps_raster_visible() {
        let engine = letter_engine(1);
        engine.failing_text.lock().insert(1);
        let view = open(&engine).await;
        view.set_container_width(600.0);
        view.scroll_to(0.0, 800.0, Instant::now());

        assert_eq!(view.render_page(page(1)).await.unwrap(), RenderState::Rendered);
        assert!(view.raster(page(1)).is_some());
        assert!(!view.text_layer(page(1)).unwrap().interactive);
        assert!(view
            .drain_events()
            .iter()
            .any(|e| matches!(e, ViewerEvent::TextLayerUnavailable { .. })));
    }

    #[tokio::test]
    async fn region_drag_emits_selection_with_crop() {
        let mut engine = FakeEngine::with_pages(2, Size::new(400.0, 600.0));
        engine.runs.insert(
            1,
            vec![TextRun {
                text: "Theorem 2".into(),
                x: 10.0,
                y: 10.0,
                width: 50.0,
                font_size_estimate: 12.0,
            }],
        );
        let engine = Arc::new(engine);
        let view = open(&engine).await;
        view.set_container_width(600.0);
        view.scroll_to(0.0, 900.0, Instant::now());
        view.render_window().await.unwrap();

        // ignored outside region mode
        view.pointer_down(page(1), Point::new(10.0, 10.0));
        assert!(view.pointer_up(Point::new(110.0, 60.0)).is_none());

        view.set_capture_mode(CaptureMode::Region);
        view.pointer_down(page(1), Point::new(10.0, 10.0));
        view.pointer_move(Point::new(50.0, 30.0));
        let selection = view.pointer_up(Point::new(110.0, 60.0)).unwrap();
        assert!((selection.pdf.x - 6.67).abs() < 0.01);
        assert!((selection.pdf.width - 66.67).abs() < 0.01);
        assert!((selection.pdf.height - 33.33).abs() < 0.01);
        assert_eq!(selection.text, "Theorem 2");
        let image = selection.image.as_ref().unwrap();
        assert_eq!((image.width, image.height), (100, 50));
        assert_eq!(view.drag_state(), DragState::Idle);
        let queued: Vec<_> = view
            .drain_events()
            .into_iter()
            .filter_map(|e| match e {
                ViewerEvent::RegionSelected(selection) => Some(selection),
                _ => None,
            })
            .collect();
        assert_eq!(queued.len(), 1);
        assert!(queued[0].image.is_none());
        assert_eq!(queued[0].pdf, selection.pdf);
        assert_eq!(queued[0].text, "Theorem 2");

        view.pointer_down(page(1), Point::new(10.0, 10.0));
        assert!(view.pointer_up(Point::new(11.0, 11.0)).is_none());
    }

    #[tokio::test]
    async fn highlights_follow_zoom_and_remove_whole_records() {
        let engine = letter_engine(2);
        let view = open(&engine).await;
        view.set_container_width(900.0);

        let rects = [Rect::new(15.0, 30.0, 150.0, 18.0), Rect::new(15.0, 48.0, 0.0, 18.0)];
        assert!(view
            .complete_text_selection(page(1), "ignored", &rects, HighlightColor::Yellow)
            .is_none());

        view.set_capture_mode(CaptureMode::Highlight);
        let id = view
            .complete_text_selection(page(1), "kept text", &rects, HighlightColor::Yellow)
            .unwrap();
        let stored = view.list_highlights(page(1));
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].rects, vec![Rect::new(10.0, 20.0, 100.0, 12.0)]);

        let at_one = view.overlay(page(1));
        view.set_zoom(2.0);
        let at_two = view.overlay(page(1));
        assert_eq!(at_two[0].rect.width, at_one[0].rect.width * 2.0);
        assert_eq!(at_two[0].rect.height, at_one[0].rect.height * 2.0);
        assert_eq!(view.list_highlights(page(1))[0].rects, stored[0].rects);

        let prompt = view.highlight_at(page(1), Point::new(60.0, 70.0)).unwrap();
        assert_eq!(prompt.id, id);
        assert_eq!(prompt.source_text, "kept text");
        view.remove_highlight(id).unwrap();
        assert!(view.list_highlights(page(1)).is_empty());
        assert!(matches!(
            view.remove_highlight(id),
            Err(ViewerError::HighlightNotFound(_))
        ));
    }

    #[tokio::test]
    async fn selection_on_missing_page_adds_no_highlight() {
        let engine = letter_engine(2);
        let view = open(&engine).await;
        view.set_container_width(900.0);
        view.set_capture_mode(CaptureMode::Highlight);
        view.drain_events();

        let rects = [Rect::new(15.0, 30.0, 150.0, 18.0)];
        assert!(view
            .complete_text_selection(page(9), "stray", &rects, HighlightColor::Yellow)
            .is_none());
        assert!(view.list_highlights(page(9)).is_empty());
        assert!(!view
            .drain_events()
            .iter()
            .any(|e| matches!(e, ViewerEvent::HighlightAdded(_))));
    }

    #[tokio::test]
    async fn current_page_resolves_after_debounce() {
        let engine = letter_engine(10);
        let view = open(&engine).await;
        view.set_container_width(600.0);
        let start = Instant::now();

        // page 4 starts at 3 * 816 = 2448; leave its top 20px below the container top
        view.scroll_to(2428.0, 800.0, start);
        assert!(view.tick(start + Duration::from_millis(50)).is_none());
        assert_eq!(view.tick(start + Duration::from_millis(200)), Some(page(4)));
        assert_eq!(view.current_page(), Some(page(4)));
        assert!(view
            .drain_events()
            .iter()
            .any(|e| matches!(e, ViewerEvent::CurrentPageChanged(p) if *p == page(4))));
    }

    #[tokio::test]
    async fn persisted_state_round_trips_through_restore() {
        let engine = letter_engine(3);
        let view = open(&engine).await;
        view.set_zoom(1.5);
        view.add_highlight(HighlightRecord::new(
            page(2),
            HighlightColor::Blue,
            "note",
            vec![Rect::new(1.0, 2.0, 3.0, 4.0)],
        ))
        .unwrap();
        let state = view.persisted_state(300.0);

        let other = open(&letter_engine(3)).await;
        other.restore(&state);
        assert_eq!(other.viewport().zoom(), 1.5);
        assert_eq!(other.list_highlights(page(2)).len(), 1);
        assert!(view
            .add_highlight(HighlightRecord::new(page(9), HighlightColor::Blue, "x", vec![]))
            .is_err());
    }

    #[tokio::test]
    async fn close_releases_every_handle_once() {
        let engine = letter_engine(4);
        let view = open(&engine).await;
        view.set_container_width(600.0);
        view.scroll_to(0.0, 800.0, Instant::now());
        view.render_window().await.unwrap();

        view.close();
        view.close();
        assert_eq!(*engine.released.lock(), vec![1, 2, 3, 4]);
        assert!(*engine.destroyed.lock());
        assert!(matches!(
            view.render_page(page(1)).await,
            Err(ViewerError::Closed)
        ));
        drop(view);
        assert_eq!(engine.released.lock().len(), 4);
    }
}
