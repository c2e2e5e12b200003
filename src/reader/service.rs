//! Navigation controller actor and its public handle
//!
//! One local task owns the current page, the visible canvas, the page
//! store, the renderer, the prefetcher and the progress state. Handle
//! calls, job completions and sync outcomes all arrive on one channel and
//! are handled one at a time.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::rc::Rc;

use flume::{Receiver, Sender};
use log::{debug, info, warn};
use tokio::sync::oneshot;

use super::cache::{MAX_CACHED_PAGES, PageStore};
use super::document::{DocumentHandle, DocumentProvider, Viewer};
use super::prefetch::{DEFAULT_PREFETCH_CONCURRENCY, DEFAULT_PREFETCH_RADIUS, Prefetcher};
use super::renderer::Renderer;
use super::request::{JobCompletion, JobKind, JobResult};
use super::state::{Command, Effect, NavState, Outcome, Ticket};
use super::types::{Canvas, PageChanged, PageNumber};
use super::zoom::Zoom;
use crate::bookmark::Bookmark;
use crate::error::{BookmarkError, DocumentError, ReaderError, ValidationError};
use crate::notification::NotificationSink;
use crate::retry::{Idempotency, RetryPolicy, retry};
use crate::storage::KeyValueStore;
use crate::sync::{ProgressSync, RemoteStore, SessionSnapshot, SyncOutcome, UserId};

/// Tunables for a reader session
#[derive(Debug, Clone, PartialEq)]
pub struct ReaderConfig {
    pub max_cached_pages: usize,
    pub prefetch_radius: u32,
    pub prefetch_concurrency: usize,
    pub default_zoom: f32,
    pub device_pixel_ratio: f32,
    pub open_retry: RetryPolicy,
    pub sync_retry: RetryPolicy,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            max_cached_pages: MAX_CACHED_PAGES,
            prefetch_radius: DEFAULT_PREFETCH_RADIUS,
            prefetch_concurrency: DEFAULT_PREFETCH_CONCURRENCY,
            default_zoom: 1.0,
            device_pixel_ratio: 1.0,
            open_retry: RetryPolicy::document_open(),
            sync_retry: RetryPolicy::remote_sync(),
        }
    }
}

/// Collaborators a reader is assembled from
pub struct ReaderParts {
    pub path: PathBuf,
    pub config: ReaderConfig,
    pub provider: Rc<dyn DocumentProvider>,
    pub storage: Rc<dyn KeyValueStore>,
    pub remote: Option<Rc<dyn RemoteStore>>,
    pub notifier: Rc<dyn NotificationSink>,
    pub viewer: Rc<dyn Viewer>,
    pub user: Option<UserId>,
}

/// Options for [`Reader::go_to`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GoTo {
    /// Drop queued requests and cancel the running render
    pub force: bool,
}

impl GoTo {
    pub const FORCE: Self = Self { force: true };
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ZoomChange {
    Set(f32),
    In,
    Out,
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Status {
    current: PageNumber,
    zoom: f32,
}

enum Message {
    GoTo {
        page: i64,
        opts: GoTo,
        reply: oneshot::Sender<Outcome>,
    },
    Step {
        delta: i64,
        reply: oneshot::Sender<Outcome>,
    },
    JumpToInput {
        text: String,
        reply: oneshot::Sender<Outcome>,
    },
    AddBookmark {
        page: Option<PageNumber>,
        name: String,
        reply: oneshot::Sender<Result<Bookmark, BookmarkError>>,
    },
    RenameBookmark {
        page: PageNumber,
        name: String,
        reply: oneshot::Sender<Result<Bookmark, BookmarkError>>,
    },
    DeleteBookmark {
        page: PageNumber,
        reply: oneshot::Sender<Result<Bookmark, BookmarkError>>,
    },
    JumpToBookmark {
        page: PageNumber,
        reply: oneshot::Sender<Result<Outcome, BookmarkError>>,
    },
    Bookmarks(oneshot::Sender<Vec<Bookmark>>),
    Zoom {
        change: ZoomChange,
        reply: oneshot::Sender<Outcome>,
    },
    SignIn {
        user: UserId,
        reply: oneshot::Sender<PageNumber>,
    },
    SignOut(oneshot::Sender<()>),
    SetOnline(bool),
    Subscribe(Sender<PageChanged>),
    Status(oneshot::Sender<Status>),
    Canvas(oneshot::Sender<Option<Canvas>>),
    Settle(oneshot::Sender<()>),
    Shutdown,
}

enum Event {
    Message(Message),
    Job(JobCompletion),
    Sync(SyncOutcome),
    Session {
        snapshot: SessionSnapshot,
        reply: oneshot::Sender<PageNumber>,
    },
}

impl From<JobCompletion> for Event {
    fn from(done: JobCompletion) -> Self {
        Self::Job(done)
    }
}

impl From<SyncOutcome> for Event {
    fn from(outcome: SyncOutcome) -> Self {
        Self::Sync(outcome)
    }
}

struct Controller {
    page_count: u32,
    nav: NavState,
    zoom: Zoom,
    canvas: Option<Canvas>,
    store: PageStore,
    renderer: Renderer,
    prefetcher: Prefetcher,
    progress: ProgressSync,
    session: Option<UserId>,
    /// Account whose session data is still being fetched. Writes stay
    /// local until it arrives.
    signing_in: Option<UserId>,
    viewer: Rc<dyn Viewer>,
    notifier: Rc<dyn NotificationSink>,
    subscribers: Vec<Sender<PageChanged>>,
    replies: HashMap<Ticket, oneshot::Sender<Outcome>>,
    next_ticket: u64,
    settle_waiters: Vec<oneshot::Sender<()>>,
    events: Sender<Event>,
}

impl Controller {
    async fn run(mut self, events: Receiver<Event>) {
        while let Ok(event) = events.recv_async().await {
            if !self.handle(event) {
                break;
            }
            // Outcomes already queued must be applied before anyone is told
            // the reader is quiet
            if events.is_empty() {
                self.check_settled();
            }
        }

        // Dropping queued requests lets their callers see `Closed`
        let abandoned = events.drain().count();
        if abandoned > 0 {
            debug!("Dropped {abandoned} queued events on shutdown");
        }
        info!("Navigation controller stopped");
        self.renderer.cancel();
        self.prefetcher.cancel_all();
    }

    fn ticket(&mut self, reply: Option<oneshot::Sender<Outcome>>) -> Ticket {
        let ticket = Ticket(self.next_ticket);
        self.next_ticket += 1;
        if let Some(reply) = reply {
            self.replies.insert(ticket, reply);
        }
        ticket
    }

    /// Returns false once the controller should stop
    fn handle(&mut self, event: Event) -> bool {
        match event {
            Event::Message(Message::Shutdown) => return false,
            Event::Message(msg) => self.on_message(msg),
            Event::Job(done) => match done.kind {
                JobKind::Visible => self.on_visible_done(done),
                JobKind::Prefetch => self.on_prefetch_done(done),
            },
            Event::Sync(outcome) => self.progress.apply(outcome),
            Event::Session { snapshot, reply } => self.on_session(snapshot, reply),
        }
        true
    }

    fn on_message(&mut self, msg: Message) {
        match msg {
            Message::GoTo { page, opts, reply } => {
                let ticket = self.ticket(Some(reply));
                self.dispatch(Command::GoTo {
                    ticket,
                    page,
                    force: opts.force,
                });
            }

            Message::Step { delta, reply } => {
                let ticket = self.ticket(Some(reply));
                self.dispatch(Command::Step { ticket, delta });
            }

            Message::JumpToInput { text, reply } => self.jump_to_input(&text, reply),

            Message::AddBookmark { page, name, reply } => {
                let page = page.unwrap_or_else(|| self.nav.current());
                let result = if page.get() > self.page_count {
                    let error = BookmarkError::Invalid(ValidationError::PageOutOfRange {
                        page: i64::from(page.get()),
                        page_count: self.page_count,
                    });
                    self.progress.notify_rejected(&error);
                    Err(error)
                } else {
                    self.progress
                        .save_bookmark(self.session.as_ref(), &name, page)
                };
                let _ = reply.send(result);
            }

            Message::RenameBookmark { page, name, reply } => {
                let result = self
                    .progress
                    .rename_bookmark(self.session.as_ref(), page, &name);
                let _ = reply.send(result);
            }

            Message::DeleteBookmark { page, reply } => {
                let result = self.progress.delete_bookmark(self.session.as_ref(), page);
                if let Ok(bookmark) = &result {
                    self.notifier
                        .info(&format!("Bookmark '{}' deleted.", bookmark.name));
                }
                let _ = reply.send(result);
            }

            Message::JumpToBookmark { page, reply } => {
                if self.progress.bookmarks().contains(page) {
                    let (tx, rx) = oneshot::channel();
                    let ticket = self.ticket(Some(tx));
                    self.dispatch(Command::GoTo {
                        ticket,
                        page: i64::from(page.get()),
                        force: false,
                    });
                    tokio::task::spawn_local(async move {
                        let outcome = rx.await.unwrap_or(Outcome::Closed);
                        let _ = reply.send(Ok(outcome));
                    });
                } else {
                    let _ = reply.send(Err(BookmarkError::NotFound(page)));
                }
            }

            Message::Bookmarks(reply) => {
                let _ = reply.send(self.progress.bookmarks().to_vec());
            }

            Message::Zoom { change, reply } => self.change_zoom(change, reply),

            Message::SignIn { user, reply } => self.sign_in(user, reply),

            Message::SignOut(reply) => {
                self.signing_in = None;
                if let Some(user) = self.session.take() {
                    info!("User {user} signed out");
                }
                self.progress.end_session();
                let _ = reply.send(());
            }

            Message::SetOnline(online) => {
                self.progress.set_online(online);
            }

            Message::Subscribe(tx) => self.subscribers.push(tx),

            Message::Status(reply) => {
                let _ = reply.send(Status {
                    current: self.nav.current(),
                    zoom: self.zoom.factor(),
                });
            }

            Message::Canvas(reply) => {
                let _ = reply.send(self.canvas.clone());
            }

            Message::Settle(reply) => self.settle_waiters.push(reply),

            Message::Shutdown => {}
        }
    }

    fn jump_to_input(&mut self, text: &str, reply: oneshot::Sender<Outcome>) {
        let trimmed = text.trim();
        let rejection = match trimmed.parse::<i64>() {
            Err(_) => Some(ValidationError::NotANumber(trimmed.to_string())),
            Ok(page) if PageNumber::within(page, self.page_count).is_none() => {
                Some(ValidationError::PageOutOfRange {
                    page,
                    page_count: self.page_count,
                })
            }
            Ok(page) => {
                let ticket = self.ticket(Some(reply));
                self.dispatch(Command::GoTo {
                    ticket,
                    page,
                    force: false,
                });
                return;
            }
        };

        if let Some(error) = rejection {
            debug!("Rejected page input {text:?}: {error}");
            self.notifier.warn("Invalid page number.");
            let _ = reply.send(Outcome::Rejected(error));
        }
    }

    fn change_zoom(&mut self, change: ZoomChange, reply: oneshot::Sender<Outcome>) {
        let changed = match change {
            ZoomChange::Set(factor) => self.zoom.set(factor),
            ZoomChange::In => self.zoom.step_in(),
            ZoomChange::Out => self.zoom.step_out(),
            ZoomChange::Reset => self.zoom.reset(),
        };

        if !changed {
            let _ = reply.send(Outcome::Unchanged(self.nav.current()));
            return;
        }

        info!("Zoom set to {:.2}", self.zoom.factor());
        self.prefetcher.cancel_all();
        self.store.rescale(self.zoom.factor());
        let ticket = self.ticket(Some(reply));
        self.dispatch(Command::Refresh { ticket });
    }

    fn sign_in(&mut self, user: UserId, reply: oneshot::Sender<PageNumber>) {
        info!("User {user} signed in");
        self.session = None;
        self.signing_in = Some(user.clone());

        let loader = self.progress.loader();
        let events = self.events.clone();
        tokio::task::spawn_local(async move {
            let snapshot = loader.snapshot(user).await;
            let _ = events.send(Event::Session { snapshot, reply });
        });
    }

    fn on_session(&mut self, snapshot: SessionSnapshot, reply: oneshot::Sender<PageNumber>) {
        if self.signing_in.as_ref() != Some(&snapshot.user) {
            debug!("Session for {} ended before its data arrived", snapshot.user);
            let _ = reply.send(self.nav.current());
            return;
        }
        self.signing_in = None;
        self.session = Some(snapshot.user.clone());

        let resume = self.progress.begin_session(snapshot);
        let resume = clamp_page(resume, self.page_count);
        let ticket = self.ticket(None);
        self.dispatch(Command::GoTo {
            ticket,
            page: i64::from(resume.get()),
            force: false,
        });
        let _ = reply.send(resume);
    }

    fn dispatch(&mut self, cmd: Command) {
        let mut queue = VecDeque::from([cmd]);
        while let Some(cmd) = queue.pop_front() {
            for effect in self.nav.apply(cmd) {
                if let Some(next) = self.perform(effect) {
                    queue.push_back(next);
                }
            }
        }
    }

    fn perform(&mut self, effect: Effect) -> Option<Command> {
        match effect {
            Effect::Begin(page) => {
                self.progress.record_local(self.session.as_ref(), page);
                self.broadcast(page);
                self.show(page)
            }

            Effect::CancelRender => {
                self.renderer.cancel();
                None
            }

            Effect::Resolve { ticket, outcome } => {
                if let Some(reply) = self.replies.remove(&ticket) {
                    let _ = reply.send(outcome);
                }
                None
            }

            Effect::Settled(page) => {
                let page_count = self.page_count;
                let store = &self.store;
                let renderer = &self.renderer;
                self.prefetcher.schedule(page, page_count, |p| {
                    store.contains(p) || renderer.rendering_page() == Some(p)
                });
                self.pump_prefetch();
                self.progress.record_page(self.session.as_ref(), page);
                None
            }
        }
    }

    fn broadcast(&mut self, page: PageNumber) {
        let change = PageChanged {
            page,
            page_count: self.page_count,
        };
        self.subscribers.retain(|tx| tx.send(change).is_ok());
    }

    /// Blit from the store or start a visible render
    fn show(&mut self, page: PageNumber) -> Option<Command> {
        self.renderer.cancel();

        if let Some(image) = self.store.get(page) {
            match Canvas::decode(&image) {
                Ok(canvas) => {
                    debug!("Page {page} served from cache");
                    self.commit(page, canvas);
                    return Some(Command::Displayed(page));
                }
                Err(e) => {
                    warn!("Cached page {page} is unreadable, rendering again: {e}");
                    self.store.invalidate(page);
                }
            }
        }

        self.viewer.set_busy(true);
        self.renderer.render(page, self.zoom.factor(), &self.events);
        None
    }

    /// Make `canvas` the visible surface
    fn commit(&mut self, page: PageNumber, canvas: Canvas) {
        if self.viewer.is_attached() {
            self.viewer.present(page, &canvas);
        }
        self.viewer.set_busy(false);
        self.canvas = Some(canvas);
    }

    fn on_visible_done(&mut self, done: JobCompletion) {
        let current = self.renderer.is_current(done.id);
        self.renderer.finish(done.id);

        match done.result {
            JobResult::Rendered(rendered) => {
                if self.store.accepts_scale(done.scale) {
                    self.store.put(done.page, &rendered.image);
                }
                if current {
                    self.commit(done.page, rendered.canvas);
                    self.dispatch(Command::Displayed(done.page));
                } else {
                    debug!("Discarding superseded render of page {}", done.page);
                }
            }

            JobResult::Cancelled => {}

            JobResult::Failed(fault) if current => {
                self.viewer.set_busy(false);
                self.notifier
                    .error(&format!("Failed to render page {}.", done.page));
                self.dispatch(Command::Failed {
                    page: done.page,
                    reason: fault.to_string(),
                });
                self.pump_prefetch();
            }

            JobResult::Failed(_) => {}
        }
    }

    fn on_prefetch_done(&mut self, done: JobCompletion) {
        let tracked = self.prefetcher.finish(done.id).is_some();

        match done.result {
            JobResult::Rendered(rendered) if tracked && self.store.accepts_scale(done.scale) => {
                debug!("Prefetched page {}", done.page);
                self.store.put(done.page, &rendered.image);
            }
            JobResult::Rendered(_) => debug!("Dropping stale prefetch of page {}", done.page),
            JobResult::Cancelled => {}
            JobResult::Failed(fault) => debug!("Prefetch of page {} failed: {fault}", done.page),
        }

        self.pump_prefetch();
    }

    /// Background work waits while a transition is running
    fn pump_prefetch(&mut self) {
        if self.nav.is_busy() {
            return;
        }
        let store = &self.store;
        let renderer = &self.renderer;
        self.prefetcher
            .pump(self.zoom.factor(), &self.events, |p| {
                store.contains(p) || renderer.rendering_page() == Some(p)
            });
    }

    fn is_settled(&self) -> bool {
        !self.nav.is_busy()
            && self.renderer.is_idle()
            && self.prefetcher.is_idle()
            && self.progress.is_idle()
    }

    fn check_settled(&mut self) {
        if !self.settle_waiters.is_empty() && self.is_settled() {
            for waiter in self.settle_waiters.drain(..) {
                let _ = waiter.send(());
            }
        }
    }
}

fn clamp_page(page: PageNumber, page_count: u32) -> PageNumber {
    if page.get() > page_count {
        PageNumber::new(page_count).unwrap_or(PageNumber::FIRST)
    } else {
        page
    }
}

/// Handle to a running navigation controller. Cheap to clone.
#[derive(Clone)]
pub struct Reader {
    events: Sender<Event>,
    page_count: u32,
}

impl Reader {
    /// Open the document and start the controller on the current
    /// `LocalSet`. The initial page begins rendering before this returns.
    pub async fn open(parts: ReaderParts) -> Result<Self, ReaderError> {
        let ReaderParts {
            path,
            config,
            provider,
            storage,
            remote,
            notifier,
            viewer,
            user,
        } = parts;

        let opened = retry(
            &config.open_retry,
            Idempotency::Idempotent,
            "open document",
            |_| provider.open(&path),
        )
        .await;

        let document: Rc<dyn DocumentHandle> = match opened {
            Ok(document) if document.page_count() == 0 => {
                notifier.error("This document has no pages.");
                return Err(ReaderError::Open(DocumentError::Empty));
            }
            Ok(document) => document,
            Err(e) => {
                notifier.error("Failed to load document. Please try again later.");
                return Err(ReaderError::Open(e));
            }
        };
        let page_count = document.page_count();
        info!("Opened {path:?} with {page_count} pages");

        let (events_tx, events_rx) = flume::unbounded();
        let zoom = Zoom::new(config.default_zoom);
        let store = PageStore::open(storage.clone(), config.max_cached_pages, zoom.factor());
        let mut progress = ProgressSync::new(
            storage,
            remote,
            notifier.clone(),
            config.sync_retry,
            events_tx.clone(),
        );

        let initial = match &user {
            Some(user) => {
                let snapshot = progress.loader().snapshot(user.clone()).await;
                progress.begin_session(snapshot)
            }
            None => progress.load_last_page(None).await,
        };
        let initial = clamp_page(initial, page_count);

        let mut controller = Controller {
            page_count,
            nav: NavState::new(page_count, initial),
            zoom,
            canvas: None,
            store,
            renderer: Renderer::new(document.clone(), config.device_pixel_ratio),
            prefetcher: Prefetcher::new(
                document,
                config.device_pixel_ratio,
                config.prefetch_radius,
                config.prefetch_concurrency,
            ),
            progress,
            session: user,
            signing_in: None,
            viewer,
            notifier,
            subscribers: Vec::new(),
            replies: HashMap::new(),
            next_ticket: 0,
            settle_waiters: Vec::new(),
            events: events_tx.clone(),
        };

        let ticket = controller.ticket(None);
        controller.dispatch(Command::Refresh { ticket });
        tokio::task::spawn_local(controller.run(events_rx));

        Ok(Self {
            events: events_tx,
            page_count,
        })
    }

    async fn call<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Message) -> Option<T> {
        let (tx, rx) = oneshot::channel();
        self.events.send(Event::Message(make(tx))).ok()?;
        rx.await.ok()
    }

    fn post(&self, msg: Message) {
        if self.events.send(Event::Message(msg)).is_err() {
            debug!("Reader already shut down");
        }
    }

    pub async fn go_to(&self, page: i64, opts: GoTo) -> Outcome {
        self.call(|reply| Message::GoTo { page, opts, reply })
            .await
            .unwrap_or(Outcome::Closed)
    }

    pub async fn next_page(&self) -> Outcome {
        self.step(1).await
    }

    pub async fn previous_page(&self) -> Outcome {
        self.step(-1).await
    }

    async fn step(&self, delta: i64) -> Outcome {
        self.call(|reply| Message::Step { delta, reply })
            .await
            .unwrap_or(Outcome::Closed)
    }

    pub async fn first_page(&self) -> Outcome {
        self.go_to(1, GoTo::default()).await
    }

    pub async fn last_page(&self) -> Outcome {
        self.go_to(i64::from(self.page_count), GoTo::default()).await
    }

    /// Parse free text from the page box; bad input notifies and is a no-op
    pub async fn jump_to_input(&self, raw: &str) -> Outcome {
        let text = raw.to_string();
        self.call(|reply| Message::JumpToInput { text, reply })
            .await
            .unwrap_or(Outcome::Closed)
    }

    /// Bookmark the current page
    pub async fn add_bookmark(&self, name: &str) -> Result<Bookmark, BookmarkError> {
        let name = name.to_string();
        self.call(|reply| Message::AddBookmark {
            page: None,
            name,
            reply,
        })
        .await
        .unwrap_or(Err(BookmarkError::Closed))
    }

    pub async fn bookmark_page(
        &self,
        page: PageNumber,
        name: &str,
    ) -> Result<Bookmark, BookmarkError> {
        let name = name.to_string();
        self.call(|reply| Message::AddBookmark {
            page: Some(page),
            name,
            reply,
        })
        .await
        .unwrap_or(Err(BookmarkError::Closed))
    }

    pub async fn rename_bookmark(
        &self,
        page: PageNumber,
        name: &str,
    ) -> Result<Bookmark, BookmarkError> {
        let name = name.to_string();
        self.call(|reply| Message::RenameBookmark { page, name, reply })
            .await
            .unwrap_or(Err(BookmarkError::Closed))
    }

    pub async fn delete_bookmark(&self, page: PageNumber) -> Result<Bookmark, BookmarkError> {
        self.call(|reply| Message::DeleteBookmark { page, reply })
            .await
            .unwrap_or(Err(BookmarkError::Closed))
    }

    pub async fn jump_to_bookmark(&self, page: PageNumber) -> Result<Outcome, BookmarkError> {
        self.call(|reply| Message::JumpToBookmark { page, reply })
            .await
            .unwrap_or(Err(BookmarkError::Closed))
    }

    /// Bookmarks in page order
    pub async fn bookmarks(&self) -> Vec<Bookmark> {
        self.call(Message::Bookmarks).await.unwrap_or_default()
    }

    pub async fn is_bookmarked(&self, page: PageNumber) -> bool {
        self.bookmarks().await.iter().any(|b| b.page == page)
    }

    /// Clamps into range; a changed scale clears the page store and
    /// re-renders the current page
    pub async fn set_zoom(&self, factor: f32) -> Outcome {
        self.zoom_change(ZoomChange::Set(factor)).await
    }

    pub async fn zoom_in(&self) -> Outcome {
        self.zoom_change(ZoomChange::In).await
    }

    pub async fn zoom_out(&self) -> Outcome {
        self.zoom_change(ZoomChange::Out).await
    }

    pub async fn reset_zoom(&self) -> Outcome {
        self.zoom_change(ZoomChange::Reset).await
    }

    async fn zoom_change(&self, change: ZoomChange) -> Outcome {
        self.call(|reply| Message::Zoom { change, reply })
            .await
            .unwrap_or(Outcome::Closed)
    }

    /// Start a session; resolves with the page reading resumes at
    pub async fn sign_in(&self, user: UserId) -> Result<PageNumber, ReaderError> {
        self.call(|reply| Message::SignIn { user, reply })
            .await
            .ok_or(ReaderError::Closed)
    }

    pub async fn sign_out(&self) -> Result<(), ReaderError> {
        self.call(Message::SignOut).await.ok_or(ReaderError::Closed)
    }

    pub fn set_online(&self, online: bool) {
        self.post(Message::SetOnline(online));
    }

    /// Page change notifications, one per accepted transition
    pub fn subscribe(&self) -> Receiver<PageChanged> {
        let (tx, rx) = flume::unbounded();
        self.post(Message::Subscribe(tx));
        rx
    }

    pub async fn current_page(&self) -> Result<PageNumber, ReaderError> {
        self.call(Message::Status)
            .await
            .map(|s| s.current)
            .ok_or(ReaderError::Closed)
    }

    #[must_use]
    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    pub async fn zoom(&self) -> Result<f32, ReaderError> {
        self.call(Message::Status)
            .await
            .map(|s| s.zoom)
            .ok_or(ReaderError::Closed)
    }

    /// Copy of the visible surface
    pub async fn canvas(&self) -> Option<Canvas> {
        self.call(Message::Canvas).await.flatten()
    }

    /// Resolves once nothing is rendering and, while online, the sync queue
    /// is empty
    pub async fn settle(&self) -> Result<(), ReaderError> {
        self.call(Message::Settle).await.ok_or(ReaderError::Closed)
    }

    pub fn shutdown(&self) {
        self.post(Message::Shutdown);
    }
}
