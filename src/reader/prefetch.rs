//! Background rendering of pages around the current one

use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use flume::Sender;
use log::debug;

use super::document::DocumentHandle;
use super::request::{JobCompletion, JobKind, RenderJob, RequestId};
use super::types::PageNumber;
use super::worker;

pub const DEFAULT_PREFETCH_RADIUS: u32 = 2;
pub const DEFAULT_PREFETCH_CONCURRENCY: usize = 2;

// Kept apart from visible render ids
const PREFETCH_ID_BASE: u64 = 1 << 32;

/// Speculative renderer feeding the page store.
///
/// Holds a pending queue that each `schedule` replaces, and a bounded set
/// of running jobs. Results never reach the visible canvas.
pub struct Prefetcher {
    document: Rc<dyn DocumentHandle>,
    device_pixel_ratio: f32,
    radius: u32,
    concurrency: usize,
    queue: VecDeque<PageNumber>,
    in_flight: HashMap<RequestId, RenderJob>,
    next_id: u64,
}

impl Prefetcher {
    pub fn new(
        document: Rc<dyn DocumentHandle>,
        device_pixel_ratio: f32,
        radius: u32,
        concurrency: usize,
    ) -> Self {
        Self {
            document,
            device_pixel_ratio,
            radius,
            concurrency,
            queue: VecDeque::new(),
            in_flight: HashMap::new(),
            next_id: PREFETCH_ID_BASE,
        }
    }

    /// Pages around `center` by increasing distance, forward first
    #[must_use]
    pub fn window(&self, center: PageNumber, page_count: u32) -> Vec<PageNumber> {
        let c = i64::from(center.get());
        let mut pages = Vec::with_capacity(self.radius as usize * 2);
        for offset in 1..=i64::from(self.radius) {
            for candidate in [c + offset, c - offset] {
                if let Some(page) = PageNumber::within(candidate, page_count) {
                    pages.push(page);
                }
            }
        }
        pages
    }

    /// Replace the pending queue with the window around `center`, leaving
    /// out pages `skip` reports as cached or already rendering
    pub fn schedule(
        &mut self,
        center: PageNumber,
        page_count: u32,
        skip: impl Fn(PageNumber) -> bool,
    ) {
        if self.concurrency == 0 {
            self.queue.clear();
            return;
        }
        let window = self.window(center, page_count);
        self.queue = window
            .into_iter()
            .filter(|page| !skip(*page) && !self.is_in_flight(*page))
            .collect();
        debug!("Prefetch around page {center}: {:?}", self.queue);
    }

    /// Start queued jobs up to the concurrency limit
    pub fn pump<E>(&mut self, scale: f32, events: &Sender<E>, skip: impl Fn(PageNumber) -> bool)
    where
        E: From<JobCompletion> + 'static,
    {
        while self.in_flight.len() < self.concurrency {
            let Some(page) = self.queue.pop_front() else {
                break;
            };
            if skip(page) || self.is_in_flight(page) {
                continue;
            }

            let id = RequestId::new(self.next_id);
            self.next_id += 1;
            let job = RenderJob::new(id, page, JobKind::Prefetch, scale);
            worker::spawn_job(
                self.document.clone(),
                &job,
                self.device_pixel_ratio,
                events.clone(),
            );
            self.in_flight.insert(id, job);
        }
    }

    /// Retire a finished job. Returns the job if it was still tracked.
    pub fn finish(&mut self, id: RequestId) -> Option<RenderJob> {
        self.in_flight.remove(&id)
    }

    #[must_use]
    pub fn is_in_flight(&self, page: PageNumber) -> bool {
        self.in_flight.values().any(|job| job.page == page)
    }

    /// Drop the queue and cancel running jobs
    pub fn cancel_all(&mut self) {
        self.queue.clear();
        for (_, job) in self.in_flight.drain() {
            job.cancel();
        }
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.in_flight.is_empty()
    }

    #[must_use]
    pub fn running(&self) -> usize {
        self.in_flight.len()
    }

    #[must_use]
    pub fn queued(&self) -> Vec<PageNumber> {
        self.queue.iter().copied().collect()
    }
}
