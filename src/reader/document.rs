//! Collaborator interfaces the render pipeline consumes
//!
//! The core only ever talks to a document engine and to the presentation
//! layer through these traits. Everything runs on one thread, so the
//! traits are `?Send` and handles are shared with `Rc`.

use std::path::Path;
use std::rc::Rc;

use async_trait::async_trait;

use super::request::{CancellationToken, RenderFault};
use super::types::{Canvas, PageNumber, RasterTarget, Viewport};
use crate::error::DocumentError;

/// Opens documents. Opening is idempotent and retried by the caller.
#[async_trait(?Send)]
pub trait DocumentProvider {
    async fn open(&self, path: &Path) -> Result<Rc<dyn DocumentHandle>, DocumentError>;
}

/// A loaded paginated document; immutable once opened
#[async_trait(?Send)]
pub trait DocumentHandle {
    fn page_count(&self) -> u32;

    async fn get_page(&self, page: PageNumber) -> Result<Box<dyn PageObject>, DocumentError>;
}

/// A single renderable page
#[async_trait(?Send)]
pub trait PageObject {
    /// Page size in CSS pixels at `scale`
    fn viewport(&self, scale: f32) -> Result<Viewport, RenderFault>;

    /// Draw into `canvas`, sized to `target`. Implementations should poll
    /// `cancel` and bail out with [`RenderFault::Cancelled`].
    async fn render(
        &self,
        canvas: &mut Canvas,
        target: &RasterTarget,
        cancel: &CancellationToken,
    ) -> Result<(), RenderFault>;
}

/// Narrow view of the presentation layer.
///
/// The controller asks `is_attached` instead of probing UI element
/// lifetimes; a detached viewer still gets the cache warmed.
pub trait Viewer {
    fn is_attached(&self) -> bool {
        true
    }

    /// In-progress indicator (canvas dimming, spinner)
    fn set_busy(&self, busy: bool);

    /// Show a completed page
    fn present(&self, page: PageNumber, canvas: &Canvas);
}

/// Viewer for headless use
#[derive(Debug, Default, Clone, Copy)]
pub struct Detached;

impl Viewer for Detached {
    fn is_attached(&self) -> bool {
        false
    }

    fn set_busy(&self, _busy: bool) {}

    fn present(&self, _page: PageNumber, _canvas: &Canvas) {}
}
