use std::time::{Duration, Instant};

use crate::page::PageNumber;

/// Trailing-edge debounce over explicit timestamps.
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    last_event: Option<Instant>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last_event: None,
        }
    }

    pub fn poke(&mut self, now: Instant) {
        self.last_event = Some(now);
    }

    pub fn is_pending(&self) -> bool {
        self.last_event.is_some()
    }

    /// Fires once the quiet period after the last poke has elapsed.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.last_event {
            Some(last) if now.saturating_duration_since(last) >= self.delay => {
                self.last_event = None;
                true
            }
            _ => false,
        }
    }
}

/// Maps scroll position to the page shown as "current" in navigation UI.
#[derive(Debug, Clone)]
pub struct ScrollPositionResolver {
    debounce: Debouncer,
    tolerance: f64,
    last_reported: Option<PageNumber>,
}

impl ScrollPositionResolver {
    pub fn new(delay: Duration, tolerance: f64) -> Self {
        Self {
            debounce: Debouncer::new(delay),
            tolerance,
            last_reported: None,
        }
    }

    pub fn current(&self) -> Option<PageNumber> {
        self.last_reported
    }

    pub fn on_scroll(&mut self, now: Instant) {
        self.debounce.poke(now);
    }

    /// Resolves after the debounce window. Returns a page only when it differs
    /// from the last reported one.
    pub fn poll(&mut self, now: Instant, visible: &[(PageNumber, f64)]) -> Option<PageNumber> {
        if !self.debounce.fire(now) {
            return None;
        }
        self.report(visible)
    }

    /// Immediate resolution, used for programmatic jumps.
    pub fn report(&mut self, visible: &[(PageNumber, f64)]) -> Option<PageNumber> {
        let page = resolve_current_page(visible, self.tolerance)?;
        if self.last_reported == Some(page) {
            return None;
        }
        self.last_reported = Some(page);
        Some(page)
    }
}

/// Among visible pages, the one whose top edge is nearest the container top
/// without sitting more than `tolerance` below it.
pub fn resolve_current_page(visible: &[(PageNumber, f64)], tolerance: f64) -> Option<PageNumber> {
    visible
        .iter()
        .filter(|(_, top)| *top <= tolerance)
        .min_by(|(_, a), (_, b)| a.abs().total_cmp(&b.abs()))
        .map(|(page, _)| *page)
}
