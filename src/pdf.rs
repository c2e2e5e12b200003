//! MuPDF-backed document provider

use std::path::Path;
use std::rc::Rc;

use async_trait::async_trait;
use log::debug;
use mupdf::{Colorspace, Document, Matrix, Page, Pixmap};

use crate::error::DocumentError;
use crate::reader::{
    CancellationToken, Canvas, DocumentHandle, DocumentProvider, PageNumber, PageObject,
    RasterTarget, RenderFault, Viewport,
};

#[derive(Debug, Default, Clone, Copy)]
pub struct MupdfProvider;

#[async_trait(?Send)]
impl DocumentProvider for MupdfProvider {
    async fn open(&self, path: &Path) -> Result<Rc<dyn DocumentHandle>, DocumentError> {
        let open_err = |detail: String| DocumentError::Open {
            path: path.to_path_buf(),
            detail,
        };

        let doc = Document::open(path.to_string_lossy().as_ref())
            .map_err(|e| open_err(e.to_string()))?;
        let page_count = doc.page_count().map_err(|e| open_err(e.to_string()))?;
        let page_count = u32::try_from(page_count).map_err(|_| DocumentError::Empty)?;
        debug!("MuPDF opened {path:?}: {page_count} pages");

        Ok(Rc::new(MupdfDocument {
            doc: Rc::new(doc),
            page_count,
        }))
    }
}

pub struct MupdfDocument {
    doc: Rc<Document>,
    page_count: u32,
}

#[async_trait(?Send)]
impl DocumentHandle for MupdfDocument {
    fn page_count(&self) -> u32 {
        self.page_count
    }

    async fn get_page(&self, page: PageNumber) -> Result<Box<dyn PageObject>, DocumentError> {
        let loaded = self
            .doc
            .load_page(page.index() as i32)
            .map_err(|e| DocumentError::Page {
                page,
                detail: e.to_string(),
            })?;
        Ok(Box::new(MupdfPage {
            _doc: self.doc.clone(),
            page: loaded,
        }))
    }
}

struct MupdfPage {
    // Pages must not outlive their document
    _doc: Rc<Document>,
    page: Page,
}

#[async_trait(?Send)]
impl PageObject for MupdfPage {
    fn viewport(&self, scale: f32) -> Result<Viewport, RenderFault> {
        let bounds = self.page.bounds()?;
        Ok(Viewport::new(
            (bounds.x1 - bounds.x0) * scale,
            (bounds.y1 - bounds.y0) * scale,
            scale,
        ))
    }

    async fn render(
        &self,
        canvas: &mut Canvas,
        target: &RasterTarget,
        cancel: &CancellationToken,
    ) -> Result<(), RenderFault> {
        cancel.checkpoint()?;
        let transform = Matrix::new_scale(target.scale, target.scale);
        let pixmap = self
            .page
            .to_pixmap(&transform, &Colorspace::device_rgb(), false, false)?;
        cancel.checkpoint()?;
        blit_rgb(&pixmap, canvas)
    }
}

/// Copy pixmap samples into the canvas, dropping any extra channels
fn blit_rgb(pixmap: &Pixmap, canvas: &mut Canvas) -> Result<(), RenderFault> {
    let n = pixmap.n() as usize;
    if n < 3 {
        return Err(RenderFault::draw(format!(
            "unsupported pixmap format: {n} channels"
        )));
    }

    let width = pixmap.width() as usize;
    let height = pixmap.height() as usize;
    let stride = pixmap.stride() as usize;
    let samples = pixmap.samples();
    let row_bytes = width * n;
    if samples.len() < stride.saturating_mul(height) || row_bytes > stride {
        return Err(RenderFault::draw("pixmap buffer size mismatch"));
    }

    let mut row_rgb = Vec::with_capacity(width * 3);
    for y in 0..height.min(canvas.height() as usize) {
        let row = &samples[y * stride..y * stride + row_bytes];
        row_rgb.clear();
        if n == 3 {
            row_rgb.extend_from_slice(row);
        } else {
            for px in row.chunks_exact(n) {
                row_rgb.extend_from_slice(&px[..3]);
            }
        }
        canvas.write_row(y as u32, &row_rgb);
    }
    Ok(())
}
