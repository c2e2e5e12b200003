//! Page rendering and navigation pipeline

mod cache;
mod document;
mod prefetch;
mod renderer;
mod request;
mod service;
mod state;
mod types;
mod worker;
mod zoom;

pub use cache::{MAX_CACHED_PAGES, PageStore};
pub use document::{Detached, DocumentHandle, DocumentProvider, PageObject, Viewer};
pub use prefetch::{DEFAULT_PREFETCH_CONCURRENCY, DEFAULT_PREFETCH_RADIUS, Prefetcher};
pub use renderer::Renderer;
pub use request::{
    CancellationToken, JobCompletion, JobKind, JobResult, RenderFault, RenderJob, RenderedPage,
    RequestId,
};
pub use service::{GoTo, Reader, ReaderConfig, ReaderParts};
pub use state::{Command, Effect, NavState, Outcome, Ticket};
pub use types::*;
pub use worker::render_page;
pub use zoom::Zoom;
