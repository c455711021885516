//! Engine-agnostic document viewer model: coordinate transforms, per-page
//! render state, virtualization, region capture and highlights.

pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod highlight;
pub mod page;
pub mod pipeline;
pub mod region;
pub mod scroll;
pub mod selection;
pub mod store;
pub mod text_layer;
pub mod transform;
pub mod viewport;
pub mod virtualize;

pub use config::{EvictionPolicy, ViewerConfig};
pub use document::{DocumentView, ViewerEvent};
pub use engine::{DocumentEngine, DocumentHandle, PageHandle, RasterBuffer, RenderViewport, TextRun};
pub use error::ViewerError;
pub use geometry::{PixelRect, PixelSize, Point, Rect, Size};
pub use highlight::{
    HighlightColor, HighlightId, HighlightRecord, HighlightStore, OverlayRect, RemovalPrompt,
};
pub use page::{PageDescriptor, PageNumber};
pub use pipeline::RenderState;
pub use region::RegionSource;
pub use selection::{CaptureMode, DragState, RegionSelection};
pub use store::{
    document_id_for_path, DocumentId, FileStateStore, MemoryStateStore, PersistedDocumentState,
    StateStore, ViewPreferences,
};
pub use text_layer::{TextItem, TextLayer};
pub use transform::{PageProjection, Rotation, ScaleFactor};
pub use viewport::ViewportState;
pub use virtualize::{PageBox, PageLayout, VisibilityObserver, WindowDelta};
