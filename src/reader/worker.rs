//! Render routine shared by visible and prefetch jobs

use std::rc::Rc;

use flume::Sender;
use log::{debug, warn};

use super::document::DocumentHandle;
use super::request::{
    CancellationToken, JobCompletion, JobResult, RenderFault, RenderJob, RenderedPage,
};
use super::types::{Canvas, PageNumber, RasterTarget};

/// Fetch, draw and encode one page into a private canvas.
///
/// The token is checked after the page fetch, after drawing and before
/// encoding, so a superseded job stops at the next of those points.
pub async fn render_page(
    document: &dyn DocumentHandle,
    page: PageNumber,
    scale: f32,
    device_pixel_ratio: f32,
    cancel: &CancellationToken,
) -> Result<RenderedPage, RenderFault> {
    let page_obj = document.get_page(page).await?;
    cancel.checkpoint()?;

    let viewport = page_obj.viewport(scale)?;
    let target = RasterTarget::compute(&viewport, device_pixel_ratio);
    let mut canvas = Canvas::for_target(&target);

    page_obj.render(&mut canvas, &target, cancel).await?;
    cancel.checkpoint()?;

    let image = canvas.encode_png()?;
    Ok(RenderedPage {
        page,
        canvas,
        image,
    })
}

/// Run `job` as a local task and post its completion on `events`
pub fn spawn_job<E>(
    document: Rc<dyn DocumentHandle>,
    job: &RenderJob,
    device_pixel_ratio: f32,
    events: Sender<E>,
) where
    E: From<JobCompletion> + 'static,
{
    let id = job.id;
    let page = job.page;
    let kind = job.kind;
    let scale = job.scale;
    let token = job.token();

    tokio::task::spawn_local(async move {
        let result = match render_page(&*document, page, scale, device_pixel_ratio, &token).await
        {
            Ok(rendered) => JobResult::Rendered(rendered),
            Err(RenderFault::Cancelled) => {
                debug!("Render of page {page} ({kind:?}) cancelled");
                JobResult::Cancelled
            }
            Err(fault) => {
                warn!("Render of page {page} ({kind:?}) failed: {fault}");
                JobResult::Failed(fault)
            }
        };

        let completion = JobCompletion {
            id,
            page,
            kind,
            scale,
            result,
        };
        if events.send(E::from(completion)).is_err() {
            debug!("Controller gone, dropping result for page {page}");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::request::{JobKind, RequestId};
    use crate::test_utils::{FakeDocument, page_tint};

    #[tokio::test]
    async fn renders_and_encodes_at_device_resolution() {
        let doc = FakeDocument::new(3);
        let token = CancellationToken::new();

        let rendered = render_page(&doc, PageNumber::new(2).unwrap(), 1.0, 2.0, &token)
            .await
            .unwrap();

        assert_eq!(rendered.canvas.width(), doc.page_width() * 2);
        assert_eq!(rendered.canvas.pixel(0, 0), Some(page_tint(2)));
        assert_eq!(Canvas::decode(&rendered.image).unwrap(), rendered.canvas);
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_drawing() {
        let doc = FakeDocument::new(3);
        let token = CancellationToken::new();
        token.cancel();

        let result = render_page(&doc, PageNumber::FIRST, 1.0, 1.0, &token).await;
        assert!(matches!(result, Err(RenderFault::Cancelled)));
        assert!(doc.draw_log().is_empty());
    }

    #[tokio::test]
    async fn failing_page_reports_fault() {
        let doc = FakeDocument::new(3).failing_page(3);
        let token = CancellationToken::new();

        let result = render_page(&doc, PageNumber::new(3).unwrap(), 1.0, 1.0, &token).await;
        assert!(matches!(result, Err(RenderFault::Draw { .. })));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn spawned_job_posts_completion() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let doc: Rc<dyn DocumentHandle> = Rc::new(FakeDocument::new(2));
                let (tx, rx) = flume::unbounded::<JobCompletion>();
                let job = RenderJob::new(RequestId::new(1), PageNumber::FIRST, JobKind::Prefetch, 1.0);

                spawn_job(doc, &job, 1.0, tx);
                let done = rx.recv_async().await.unwrap();

                assert_eq!(done.id, RequestId::new(1));
                assert_eq!(done.kind, JobKind::Prefetch);
                assert!(matches!(done.result, JobResult::Rendered(_)));
            })
            .await;
    }
}
