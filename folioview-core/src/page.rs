use std::fmt;
use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};

use crate::engine::PageHandle;
use crate::geometry::Size;
use crate::transform::ScaleFactor;
use crate::viewport::ViewportState;

/// 1-based page number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageNumber(NonZeroU32);

impl PageNumber {
    pub const FIRST: PageNumber = PageNumber(NonZeroU32::MIN);

    pub fn new(number: u32) -> Option<Self> {
        NonZeroU32::new(number).map(Self)
    }

    pub fn from_index(index: usize) -> Option<Self> {
        u32::try_from(index).ok()?.checked_add(1).and_then(Self::new)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }

    pub fn index(self) -> usize {
        self.0.get() as usize - 1
    }
}

impl fmt::Display for PageNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct PageDescriptor {
    pub number: PageNumber,
    pub handle: PageHandle,
    /// Size at scale 1.0, unrotated.
    pub natural_size: Size,
}

/// Scale factor memoized against the viewport revision it was computed for.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ScaleCache {
    entry: Option<(u64, Option<ScaleFactor>)>,
}

impl ScaleCache {
    pub(crate) fn get(&mut self, natural: Size, viewport: &ViewportState) -> Option<ScaleFactor> {
        match self.entry {
            Some((revision, scale)) if revision == viewport.revision() => scale,
            _ => {
                let scale = viewport.scale_factor(natural);
                self.entry = Some((viewport.revision(), scale));
                scale
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_numbers_are_one_based() {
        assert!(PageNumber::new(0).is_none());
        let third = PageNumber::from_index(2).unwrap();
        assert_eq!(third.get(), 3);
        assert_eq!(third.index(), 2);
        assert_eq!(PageNumber::FIRST.get(), 1);
    }

    #[test]
    fn scale_cache_recomputes_after_viewport_mutation() {
        let natural = Size::new(600.0, 800.0);
        let mut viewport = ViewportState::default();
        let mut cache = ScaleCache::default();
        assert!(cache.get(natural, &viewport).is_none());

        viewport.set_container_width(900.0);
        assert_eq!(cache.get(natural, &viewport).unwrap().get(), 1.5);

        viewport.rotate_clockwise();
        assert_eq!(cache.get(natural, &viewport).unwrap().get(), 900.0 / 800.0);
    }
}
