//! Render job and result types

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::types::{Canvas, EncodedImage, PageNumber};
use crate::error::DocumentError;

/// Unique identifier for render jobs
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequestId(pub u64);

impl RequestId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

/// Cooperative cancellation flag shared between a job and its owner.
///
/// Cancelling is idempotent and never fails; the job observes it at its
/// next checkpoint.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// `Err(RenderFault::Cancelled)` once cancelled
    pub fn checkpoint(&self) -> Result<(), RenderFault> {
        if self.is_cancelled() {
            Err(RenderFault::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Who asked for the render
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobKind {
    /// Targets the visible canvas (high priority)
    Visible,
    /// Off-screen, result goes to the page store only (low priority)
    Prefetch,
}

/// Handle to an in-flight render
#[derive(Clone, Debug)]
pub struct RenderJob {
    pub id: RequestId,
    pub page: PageNumber,
    pub kind: JobKind,
    /// Zoom the job was started with
    pub scale: f32,
    token: CancellationToken,
}

impl RenderJob {
    #[must_use]
    pub fn new(id: RequestId, page: PageNumber, kind: JobKind, scale: f32) -> Self {
        Self {
            id,
            page,
            kind,
            scale,
            token: CancellationToken::new(),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

/// Errors from drawing or encoding a page
#[derive(Debug, thiserror::Error)]
pub enum RenderFault {
    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error("draw failed: {detail}")]
    Draw { detail: String },

    #[error("encode failed: {0}")]
    Encode(#[from] image::ImageError),

    #[cfg(feature = "pdf")]
    #[error("PDF engine: {0}")]
    Pdf(#[from] mupdf::error::Error),

    /// Superseded by a newer request; never reported to the user
    #[error("render cancelled")]
    Cancelled,
}

impl RenderFault {
    pub fn draw(msg: impl Into<String>) -> Self {
        Self::Draw { detail: msg.into() }
    }
}

/// A finished render: the drawn surface and its encoded form
#[derive(Debug)]
pub struct RenderedPage {
    pub page: PageNumber,
    pub canvas: Canvas,
    pub image: EncodedImage,
}

/// Terminal state of a job
#[derive(Debug)]
pub enum JobResult {
    Rendered(RenderedPage),
    Cancelled,
    Failed(RenderFault),
}

/// Message a job posts back to the navigation controller
#[derive(Debug)]
pub struct JobCompletion {
    pub id: RequestId,
    pub page: PageNumber,
    pub kind: JobKind,
    pub scale: f32,
    pub result: JobResult,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_shared_between_clones_and_idempotent() {
        let job = RenderJob::new(
            RequestId::new(7),
            PageNumber::FIRST,
            JobKind::Visible,
            1.0,
        );
        let token = job.token();
        assert!(token.checkpoint().is_ok());

        job.cancel();
        job.cancel();

        assert!(token.is_cancelled());
        assert!(matches!(token.checkpoint(), Err(RenderFault::Cancelled)));
    }
}
