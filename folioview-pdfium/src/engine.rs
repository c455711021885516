use std::collections::HashMap;
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use folioview_core::{
    DocumentEngine, DocumentHandle, PageHandle, PageNumber, RasterBuffer, RenderViewport,
    Rotation, Size, TextRun,
};
use parking_lot::Mutex;
use pdfium_render::prelude::*;
use tracing::{debug, instrument, warn};

use crate::coords::{self, PdfEdges};
use crate::raster::rotate_raster;

struct PageEntry {
    document: u64,
    index: PdfPageIndex,
    natural: Size,
}

#[derive(Default)]
struct Loaded {
    documents: HashMap<u64, PdfDocument<'static>>,
    pages: HashMap<u64, PageEntry>,
}

/// [`DocumentEngine`] backed by the pdfium library.
pub struct PdfiumEngine {
    // Declared before `pdfium` so every document drops before the bindings.
    loaded: Mutex<Loaded>,
    next_handle: AtomicU64,
    pdfium: Arc<Pdfium>,
}

impl PdfiumEngine {
    pub fn new() -> Result<Self> {
        let pdfium = match bind_pdfium_from_env() {
            Some(pdfium) => pdfium,
            None => bind_pdfium_default()?,
        };
        Ok(Self {
            loaded: Mutex::new(Loaded::default()),
            next_handle: AtomicU64::new(1),
            pdfium: Arc::new(pdfium),
        })
    }

    fn allocate(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }

    fn with_page<R, F>(&self, page: PageHandle, f: F) -> Result<R>
    where
        F: FnOnce(&PdfPage<'_>, &PageEntry) -> Result<R>,
    {
        let loaded = self.loaded.lock();
        let entry = loaded
            .pages
            .get(&page.0)
            .ok_or_else(|| anyhow!("page handle {} is not loaded", page.0))?;
        let document = loaded
            .documents
            .get(&entry.document)
            .ok_or_else(|| anyhow!("document for page handle {} was destroyed", page.0))?;
        let pdf_page = document
            .pages()
            .get(entry.index)
            .with_context(|| format!("page index {} out of range", entry.index))?;
        f(&pdf_page, entry)
    }
}

#[async_trait]
impl DocumentEngine for PdfiumEngine {
    #[instrument(skip(self, bytes), fields(bytes = bytes.len()))]
    async fn open_document(&self, bytes: Vec<u8>) -> Result<DocumentHandle> {
        let document = self
            .pdfium
            .load_pdf_from_byte_vec(bytes, None)
            .context("pdfium could not parse the document")?;
        // SAFETY: the document borrows the bindings owned by `self.pdfium`. It lives in
        // `self.loaded`, which is declared before `pdfium` and therefore dropped first, and
        // `destroy_document` removes it while the bindings are still alive.
        let document = unsafe { mem::transmute::<PdfDocument<'_>, PdfDocument<'static>>(document) };
        let id = self.allocate();
        self.loaded.lock().documents.insert(id, document);
        Ok(DocumentHandle(id))
    }

    fn page_count(&self, document: DocumentHandle) -> Result<u32> {
        let loaded = self.loaded.lock();
        let document = loaded
            .documents
            .get(&document.0)
            .ok_or_else(|| anyhow!("document handle {} is not open", document.0))?;
        u32::try_from(document.pages().len()).context("page count out of range")
    }

    async fn get_page(&self, document: DocumentHandle, page: PageNumber) -> Result<PageHandle> {
        let index = PdfPageIndex::try_from(page.index())
            .map_err(|_| anyhow!("page {page} is out of supported range"))?;
        let natural = {
            let loaded = self.loaded.lock();
            let pdf = loaded
                .documents
                .get(&document.0)
                .ok_or_else(|| anyhow!("document handle {} is not open", document.0))?;
            let pdf_page = pdf
                .pages()
                .get(index)
                .with_context(|| format!("page {page} out of range"))?;
            Size::new(
                f64::from(pdf_page.width().value),
                f64::from(pdf_page.height().value),
            )
        };
        let id = self.allocate();
        self.loaded.lock().pages.insert(
            id,
            PageEntry {
                document: document.0,
                index,
                natural,
            },
        );
        Ok(PageHandle(id))
    }

    fn get_viewport(&self, page: PageHandle, scale: f64, rotation: Rotation) -> Result<Size> {
        let loaded = self.loaded.lock();
        let entry = loaded
            .pages
            .get(&page.0)
            .ok_or_else(|| anyhow!("page handle {} is not loaded", page.0))?;
        let size = Size::new(entry.natural.width * scale, entry.natural.height * scale);
        Ok(if rotation.is_quarter_turn() {
            size.transposed()
        } else {
            size
        })
    }

    #[instrument(skip(self))]
    async fn render_to_buffer(
        &self,
        page: PageHandle,
        viewport: RenderViewport,
    ) -> Result<RasterBuffer> {
        // pdfium renders unrotated; the turn is applied to the bitmap afterwards
        let (width, height) = if viewport.rotation.is_quarter_turn() {
            (viewport.height, viewport.width)
        } else {
            (viewport.width, viewport.height)
        };
        let target_width = i32::try_from(width).context("raster width out of range")?;
        let target_height = i32::try_from(height).context("raster height out of range")?;

        let unrotated = self.with_page(page, |pdf_page, entry| {
            let config = PdfRenderConfig::new().set_target_size(target_width, target_height);
            let bitmap = pdf_page
                .render_with_config(&config)
                .with_context(|| format!("failed to render page index {}", entry.index))?;
            let pixels = bitmap.as_image().to_rgba8().into_raw();
            let rendered_width = u32::try_from(bitmap.width()).unwrap_or_default();
            let rendered_height = u32::try_from(bitmap.height()).unwrap_or_default();
            if (rendered_width, rendered_height) != (width, height) {
                warn!(
                    rendered_width,
                    rendered_height, width, height, "pdfium ignored the requested bitmap size"
                );
            }
            RasterBuffer::new(rendered_width, rendered_height, pixels)
        })?;

        rotate_raster(unrotated, viewport.rotation)
    }

    async fn get_text_runs(&self, page: PageHandle) -> Result<Vec<TextRun>> {
        self.with_page(page, |pdf_page, entry| {
            let text = pdf_page
                .text()
                .with_context(|| format!("failed to extract text for page index {}", entry.index))?;
            let page_box = page_box(pdf_page);
            let runs: Vec<TextRun> = text
                .segments()
                .iter()
                .filter_map(|segment| {
                    let content = segment.text();
                    if content.trim().is_empty() {
                        return None;
                    }
                    Some(coords::text_run(content, edges(&segment.bounds()), page_box))
                })
                .collect();
            debug!(index = entry.index, runs = runs.len(), "extracted text runs");
            Ok(runs)
        })
    }

    fn release_page(&self, page: PageHandle) {
        self.loaded.lock().pages.remove(&page.0);
    }

    fn destroy_document(&self, document: DocumentHandle) {
        let mut loaded = self.loaded.lock();
        loaded.pages.retain(|_, entry| entry.document != document.0);
        loaded.documents.remove(&document.0);
    }
}

fn edges(rect: &PdfRect) -> PdfEdges {
    PdfEdges {
        left: f64::from(rect.left().value),
        bottom: f64::from(rect.bottom().value),
        right: f64::from(rect.right().value),
        top: f64::from(rect.top().value),
    }
}

/// The visible page box: crop box, else media box, else the page size at the origin.
fn page_box(pdf_page: &PdfPage<'_>) -> PdfEdges {
    let boundaries = pdf_page.boundaries();
    match boundaries.crop().or_else(|_| boundaries.media()) {
        Ok(boundary) => edges(&boundary.bounds),
        Err(_) => PdfEdges {
            left: 0.0,
            bottom: 0.0,
            right: f64::from(pdf_page.width().value),
            top: f64::from(pdf_page.height().value),
        },
    }
}

fn bind_pdfium_from_env() -> Option<Pdfium> {
    let path = std::env::var("FOLIOVIEW_PDFIUM_LIBRARY_PATH").ok()?;
    if path.is_empty() {
        return None;
    }
    let library = Pdfium::pdfium_platform_library_name_at_path(&path);
    match Pdfium::bind_to_library(&library) {
        Ok(bindings) => Some(Pdfium::new(bindings)),
        Err(err) => {
            warn!(
                "failed to load Pdfium from {}: {}",
                library.display(),
                err
            );
            None
        }
    }
}

fn bind_pdfium_default() -> Result<Pdfium> {
    let mut errors = Vec::new();

    let cwd_path = Pdfium::pdfium_platform_library_name_at_path("./");
    match Pdfium::bind_to_library(&cwd_path) {
        Ok(bindings) => return Ok(Pdfium::new(bindings)),
        Err(err) => errors.push(format!("{}: {}", cwd_path.display(), err)),
    }

    match Pdfium::bind_to_system_library() {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("system: {err}"));
            Err(anyhow!(
                "failed to bind to a pdfium library; set FOLIOVIEW_PDFIUM_LIBRARY_PATH or install it ({})",
                errors.join(", ")
            ))
        }
    }
}
