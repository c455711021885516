use thiserror::Error;

use crate::highlight::HighlightId;
use crate::page::PageNumber;

#[derive(Debug, Error)]
pub enum ViewerError {
    /// Fatal for the whole document; nothing is rendered.
    #[error("failed to load document")]
    DocumentLoad(#[source] anyhow::Error),
    #[error("page {page} failed to render")]
    PageRender {
        page: PageNumber,
        #[source]
        source: anyhow::Error,
    },
    #[error("text layer for page {page} is unavailable")]
    TextLayer {
        page: PageNumber,
        #[source]
        source: anyhow::Error,
    },
    #[error("page {0} does not exist in this document")]
    PageOutOfRange(u32),
    #[error("highlight {0} not found")]
    HighlightNotFound(HighlightId),
    #[error("document has already been closed")]
    Closed,
    #[error("state store failure")]
    Store(#[source] anyhow::Error),
}

impl ViewerError {
    /// Page-scoped failures recover on the next trigger; everything else is terminal.
    pub fn is_page_scoped(&self) -> bool {
        matches!(self, Self::PageRender { .. } | Self::TextLayer { .. })
    }
}
