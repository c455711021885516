//! Boundary to the external document parsing and rasterization library.

use anyhow::{ensure, Result};
use async_trait::async_trait;

use crate::geometry::{PixelRect, PixelSize, Size};
use crate::page::PageNumber;
use crate::transform::Rotation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageHandle(pub u64);

/// Output bitmap in raster-space, tightly packed RGBA8.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterBuffer {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl RasterBuffer {
    pub const BYTES_PER_PIXEL: usize = 4;

    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * Self::BYTES_PER_PIXEL;
        ensure!(
            pixels.len() == expected,
            "raster of {}x{} needs {} bytes, got {}",
            width,
            height,
            expected,
            pixels.len()
        );
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn size(&self) -> PixelSize {
        PixelSize::new(self.width, self.height)
    }

    /// Copies the sub-rectangle into a new buffer; parts outside the raster
    /// are dropped, so the result may be smaller than requested.
    pub fn crop(&self, rect: PixelRect) -> Option<RasterBuffer> {
        let rect = rect.clamp_to(self.size());
        if rect.is_empty() {
            return None;
        }
        let stride = self.width as usize * Self::BYTES_PER_PIXEL;
        let row_bytes = rect.width as usize * Self::BYTES_PER_PIXEL;
        let mut pixels = Vec::with_capacity(row_bytes * rect.height as usize);
        for row in rect.y..rect.bottom() {
            let start = row as usize * stride + rect.x as usize * Self::BYTES_PER_PIXEL;
            pixels.extend_from_slice(&self.pixels[start..start + row_bytes]);
        }
        Some(RasterBuffer {
            width: rect.width as u32,
            height: rect.height as u32,
            pixels,
        })
    }
}

/// Target of one raster request. `scale` already includes the device pixel ratio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderViewport {
    pub scale: f64,
    pub rotation: Rotation,
    pub width: u32,
    pub height: u32,
}

/// A run of text in page-space: `x`/`y` is the top-left corner of the run at
/// natural size, unrotated.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub font_size_estimate: f64,
}

#[async_trait]
pub trait DocumentEngine: Send + Sync {
    async fn open_document(&self, bytes: Vec<u8>) -> Result<DocumentHandle>;
    fn page_count(&self, document: DocumentHandle) -> Result<u32>;
    async fn get_page(&self, document: DocumentHandle, page: PageNumber) -> Result<PageHandle>;
    fn get_viewport(&self, page: PageHandle, scale: f64, rotation: Rotation) -> Result<Size>;
    async fn render_to_buffer(
        &self,
        page: PageHandle,
        viewport: RenderViewport,
    ) -> Result<RasterBuffer>;
    async fn get_text_runs(&self, page: PageHandle) -> Result<Vec<TextRun>>;
    fn release_page(&self, page: PageHandle);
    fn destroy_document(&self, document: DocumentHandle);
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crop_copies_rows_of_the_sub_rectangle() {
        let mut pixels = Vec::new();
        for y in 0..4u8 {
            for x in 0..4u8 {
                pixels.extend_from_slice(&[x, y, 0, 255]);
            }
        }
        let raster = RasterBuffer::new(4, 4, pixels).unwrap();
        let crop = raster.crop(PixelRect::new(1, 2, 2, 5)).unwrap();
        assert_eq!((crop.width, crop.height), (2, 2));
        assert_eq!(&crop.pixels[0..4], &[1, 2, 0, 255]);
        assert_eq!(&crop.pixels[12..16], &[2, 3, 0, 255]);
    }

    #[test]
    fn crop_outside_raster_is_none() {
        let raster = RasterBuffer::new(2, 2, vec![0; 16]).unwrap();
        assert!(raster.crop(PixelRect::new(5, 5, 3, 3)).is_none());
    }

    #[test]
    fn raster_rejects_mismatched_pixel_data() {
        assert!(RasterBuffer::new(2, 2, vec![0; 10]).is_err());
    }
}
