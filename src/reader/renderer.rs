//! Visible-page renderer: at most one job may target the canvas

use std::rc::Rc;

use flume::Sender;
use log::debug;

use super::document::DocumentHandle;
use super::request::{JobCompletion, JobKind, RenderJob, RequestId};
use super::types::PageNumber;
use super::worker;

pub struct Renderer {
    document: Rc<dyn DocumentHandle>,
    device_pixel_ratio: f32,
    active: Option<RenderJob>,
    next_id: u64,
}

impl Renderer {
    pub fn new(document: Rc<dyn DocumentHandle>, device_pixel_ratio: f32) -> Self {
        Self {
            document,
            device_pixel_ratio,
            active: None,
            next_id: 1,
        }
    }

    /// Start rendering `page` for the canvas, cancelling any outstanding job
    pub fn render<E>(&mut self, page: PageNumber, scale: f32, events: &Sender<E>) -> RequestId
    where
        E: From<JobCompletion> + 'static,
    {
        self.cancel();

        let id = RequestId::new(self.next_id);
        self.next_id += 1;

        let job = RenderJob::new(id, page, JobKind::Visible, scale);
        debug!("Rendering page {page} at scale {scale} as {id:?}");
        worker::spawn_job(
            self.document.clone(),
            &job,
            self.device_pixel_ratio,
            events.clone(),
        );
        self.active = Some(job);
        id
    }

    /// Whether `id` is the job allowed to write the canvas
    #[must_use]
    pub fn is_current(&self, id: RequestId) -> bool {
        self.active.as_ref().is_some_and(|job| job.id == id)
    }

    /// Retire `id` once its completion has been handled
    pub fn finish(&mut self, id: RequestId) {
        if self.is_current(id) {
            self.active = None;
        }
    }

    /// Cancel the outstanding job, if any. Always safe.
    pub fn cancel(&mut self) {
        if let Some(job) = self.active.take() {
            debug!("Cancelling render of page {}", job.page);
            job.cancel();
        }
    }

    #[must_use]
    pub fn rendering_page(&self) -> Option<PageNumber> {
        self.active.as_ref().map(|job| job.page)
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.active.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::request::JobResult;
    use crate::test_utils::FakeDocument;
    use std::time::Duration;

    fn page(n: u32) -> PageNumber {
        PageNumber::new(n).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn new_render_cancels_the_previous_one() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let doc = FakeDocument::new(10).with_delay(Duration::from_millis(100));
                let mut renderer = Renderer::new(Rc::new(doc.clone()), 1.0);
                let (tx, rx) = flume::unbounded::<JobCompletion>();

                let first = renderer.render(page(5), 1.0, &tx);
                let second = renderer.render(page(6), 1.0, &tx);

                assert!(!renderer.is_current(first));
                assert!(renderer.is_current(second));
                assert_eq!(renderer.rendering_page(), Some(page(6)));

                let mut results = Vec::new();
                for _ in 0..2 {
                    results.push(rx.recv_async().await.unwrap());
                }

                let stale = results.iter().find(|c| c.id == first).unwrap();
                assert!(matches!(stale.result, JobResult::Cancelled));
                let fresh = results.iter().find(|c| c.id == second).unwrap();
                assert!(matches!(fresh.result, JobResult::Rendered(_)));

                renderer.finish(second);
                assert!(renderer.is_idle());
            })
            .await;
    }

    #[test]
    fn cancel_without_job_is_a_no_op() {
        let mut renderer = Renderer::new(Rc::new(FakeDocument::new(1)), 1.0);
        renderer.cancel();
        renderer.finish(RequestId::new(42));
        assert!(renderer.is_idle());
    }
}
