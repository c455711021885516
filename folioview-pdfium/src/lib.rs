//! pdfium-backed rendering for folioview plus raster output helpers.

#[cfg_attr(not(feature = "pdf"), allow(dead_code))]
mod coords;
#[cfg(feature = "pdf")]
mod engine;
mod raster;

#[cfg(feature = "pdf")]
pub use engine::PdfiumEngine;
pub use raster::{encode_png, rotate_raster, save_png};
