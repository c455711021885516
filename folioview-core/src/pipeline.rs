//! Per-page render state machine.
//!
//! `NotRendered -> Rendering -> Rendered`, and `Rendered -> Stale -> Rendering`
//! when the raster no longer matches the viewport. The table only decides
//! transitions; the async driver in `document` performs the engine calls
//! between [`PageTable::begin`] and [`PageTable::complete`].

use anyhow::Error;
use tracing::{debug, warn};

use crate::engine::{PageHandle, RasterBuffer, RenderViewport, TextRun};
use crate::page::{PageDescriptor, PageNumber, ScaleCache};
use crate::text_layer::TextLayer;
use crate::transform::PageProjection;
use crate::viewport::{ViewportChange, ViewportState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    NotRendered,
    Rendering,
    Rendered,
    Stale,
}

#[derive(Debug)]
struct PageSlot {
    descriptor: PageDescriptor,
    state: RenderState,
    in_flight: Option<u64>,
    generation: u64,
    scale: ScaleCache,
    raster: Option<RasterBuffer>,
    text_layer: Option<TextLayer>,
    projection: Option<PageProjection>,
    last_error: Option<String>,
    /// Set when the page was evicted while a render was in flight.
    evict_pending: bool,
}

/// Authorization for one render; carries the viewport snapshot it was issued for.
#[derive(Debug, Clone)]
pub struct RenderTicket {
    pub page: PageNumber,
    pub handle: PageHandle,
    pub generation: u64,
    pub projection: PageProjection,
    pub viewport: RenderViewport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeginRefusal {
    AlreadyRendering,
    AlreadyRendered,
    NotReady,
    OutsideWindow,
}

#[derive(Debug)]
pub enum RenderOutcome {
    /// `text_error` is set when only the raster succeeded.
    Rendered { text_error: Option<Error> },
    /// The viewport moved on while the render was in flight; the result was dropped.
    Superseded,
    /// The page was evicted while the render was in flight; the result was dropped.
    Evicted,
    Failed(Error),
}

#[derive(Debug)]
pub struct PageTable {
    slots: Vec<PageSlot>,
}

impl PageTable {
    pub fn new(descriptors: Vec<PageDescriptor>) -> Self {
        let slots = descriptors
            .into_iter()
            .map(|descriptor| PageSlot {
                descriptor,
                state: RenderState::NotRendered,
                in_flight: None,
                generation: 0,
                scale: ScaleCache::default(),
                raster: None,
                text_layer: None,
                projection: None,
                last_error: None,
                evict_pending: false,
            })
            .collect();
        Self { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, page: PageNumber) -> bool {
        page.index() < self.slots.len()
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &PageDescriptor> {
        self.slots.iter().map(|slot| &slot.descriptor)
    }

    pub fn descriptor(&self, page: PageNumber) -> Option<&PageDescriptor> {
        self.slot(page).map(|slot| &slot.descriptor)
    }

    pub fn state(&self, page: PageNumber) -> Option<RenderState> {
        self.slot(page).map(|slot| slot.state)
    }

    pub fn is_in_flight(&self, page: PageNumber) -> bool {
        self.slot(page).is_some_and(|slot| slot.in_flight.is_some())
    }

    pub fn raster(&self, page: PageNumber) -> Option<&RasterBuffer> {
        self.slot(page).and_then(|slot| slot.raster.as_ref())
    }

    pub fn text_layer(&self, page: PageNumber) -> Option<&TextLayer> {
        self.slot(page).and_then(|slot| slot.text_layer.as_ref())
    }

    /// Projection the current raster was produced with.
    pub fn rendered_projection(&self, page: PageNumber) -> Option<PageProjection> {
        self.slot(page).and_then(|slot| slot.projection)
    }

    pub fn last_error(&self, page: PageNumber) -> Option<&str> {
        self.slot(page).and_then(|slot| slot.last_error.as_deref())
    }

    pub fn scale_factor(
        &mut self,
        page: PageNumber,
        viewport: &ViewportState,
    ) -> Option<crate::transform::ScaleFactor> {
        let slot = self.slot_mut(page)?;
        let natural = slot.descriptor.natural_size;
        slot.scale.get(natural, viewport)
    }

    pub fn needs_render(&self, page: PageNumber) -> bool {
        self.slot(page).is_some_and(|slot| {
            slot.in_flight.is_none()
                && matches!(slot.state, RenderState::NotRendered | RenderState::Stale)
        })
    }

    /// Guards entry into `Rendering`. At most one render per page is in flight;
    /// a stale page whose previous render has not returned yet waits for it.
    pub fn begin(
        &mut self,
        page: PageNumber,
        viewport: &ViewportState,
        in_window: bool,
    ) -> Result<RenderTicket, BeginRefusal> {
        let slot = self.slot_mut(page).ok_or(BeginRefusal::NotReady)?;
        if slot.in_flight.is_some() || slot.state == RenderState::Rendering {
            return Err(BeginRefusal::AlreadyRendering);
        }
        if slot.state == RenderState::Rendered {
            return Err(BeginRefusal::AlreadyRendered);
        }
        if !in_window {
            return Err(BeginRefusal::OutsideWindow);
        }
        let natural = slot.descriptor.natural_size;
        let scale = slot.scale.get(natural, viewport).ok_or(BeginRefusal::NotReady)?;
        let projection = PageProjection {
            natural,
            rotation: viewport.rotation(),
            scale,
            zoom: viewport.zoom(),
            device_pixel_ratio: viewport.device_pixel_ratio(),
        };
        let size = projection.raster_size();
        if size.is_empty() {
            return Err(BeginRefusal::NotReady);
        }

        slot.generation += 1;
        slot.in_flight = Some(slot.generation);
        slot.state = RenderState::Rendering;
        debug!(page = page.get(), generation = slot.generation, "render started");

        Ok(RenderTicket {
            page,
            handle: slot.descriptor.handle,
            generation: slot.generation,
            projection,
            viewport: RenderViewport {
                scale: scale.get() * projection.device_pixel_ratio,
                rotation: projection.rotation,
                width: size.width,
                height: size.height,
            },
        })
    }

    /// Applies the engine results for a ticket. Results for a page that went
    /// stale in the meantime are discarded so a fresh render can be issued.
    pub fn complete(
        &mut self,
        ticket: RenderTicket,
        raster: anyhow::Result<RasterBuffer>,
        runs: anyhow::Result<Vec<TextRun>>,
    ) -> RenderOutcome {
        let Some(slot) = self.slot_mut(ticket.page) else {
            return RenderOutcome::Superseded;
        };
        if slot.in_flight != Some(ticket.generation) {
            return RenderOutcome::Superseded;
        }
        slot.in_flight = None;

        if slot.evict_pending {
            debug!(page = ticket.page.get(), "discarding render for evicted page");
            slot.evict_pending = false;
            slot.state = RenderState::NotRendered;
            return RenderOutcome::Evicted;
        }

        if slot.state == RenderState::Stale {
            debug!(page = ticket.page.get(), "discarding render for stale viewport");
            return RenderOutcome::Superseded;
        }

        let raster = match raster {
            Ok(raster) => raster,
            Err(err) => {
                warn!(page = ticket.page.get(), error = %err, "page render failed");
                slot.state = RenderState::NotRendered;
                slot.last_error = Some(format!("{err:#}"));
                return RenderOutcome::Failed(err);
            }
        };

        let expected = ticket.projection.raster_size();
        if raster.size() != expected {
            warn!(
                page = ticket.page.get(),
                width = raster.width,
                height = raster.height,
                expected_width = expected.width,
                expected_height = expected.height,
                "engine returned raster with unexpected dimensions"
            );
        }

        let (text_layer, text_error) = match runs {
            Ok(runs) => (
                TextLayer::build_within(&runs, &ticket.projection, raster.size()),
                None,
            ),
            Err(err) => {
                warn!(page = ticket.page.get(), error = %err, "text layer unavailable");
                (TextLayer::empty(), Some(err))
            }
        };

        slot.raster = Some(raster);
        slot.text_layer = Some(text_layer);
        slot.projection = Some(ticket.projection);
        slot.last_error = None;
        slot.state = RenderState::Rendered;
        RenderOutcome::Rendered { text_error }
    }

    /// Applies a viewport change. Returns the pages that became stale.
    pub fn invalidate(&mut self, change: ViewportChange) -> Vec<PageNumber> {
        if !change.invalidates_raster() {
            return Vec::new();
        }
        let mut stale = Vec::new();
        for slot in &mut self.slots {
            if matches!(slot.state, RenderState::Rendered | RenderState::Rendering) {
                slot.state = RenderState::Stale;
                stale.push(slot.descriptor.number);
            }
        }
        stale
    }

    /// Drops render output but keeps the descriptor. A render still in flight
    /// is discarded when it completes. Returns false when there was nothing to
    /// release.
    pub fn evict(&mut self, page: PageNumber) -> bool {
        let Some(slot) = self.slot_mut(page) else {
            return false;
        };
        let held = slot.raster.is_some() || slot.text_layer.is_some();
        if slot.in_flight.is_none() && !held {
            return false;
        }
        slot.raster = None;
        slot.text_layer = None;
        slot.projection = None;
        if slot.in_flight.is_some() {
            slot.evict_pending = true;
        } else {
            slot.state = RenderState::NotRendered;
        }
        true
    }

    /// Cancels a deferred eviction for a page that came back into the window.
    pub fn retain(&mut self, page: PageNumber) {
        if let Some(slot) = self.slot_mut(page) {
            slot.evict_pending = false;
        }
    }

    pub fn is_evict_pending(&self, page: PageNumber) -> bool {
        self.slot(page).is_some_and(|slot| slot.evict_pending)
    }

    /// Releases all render output and hands back the page handles for release.
    pub fn drain(&mut self) -> Vec<PageHandle> {
        self.slots
            .drain(..)
            .map(|slot| slot.descriptor.handle)
            .collect()
    }

    fn slot(&self, page: PageNumber) -> Option<&PageSlot> {
        self.slots.get(page.index())
    }

    fn slot_mut(&mut self, page: PageNumber) -> Option<&mut PageSlot> {
        self.slots.get_mut(page.index())
    }
}
