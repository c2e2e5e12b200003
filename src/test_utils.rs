//! In-memory collaborators for exercising the reader without a PDF engine
//! or network.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{DocumentError, StorageError};
use crate::notification::{NotificationLevel, NotificationSink};
use crate::reader::{
    CancellationToken, Canvas, DocumentHandle, DocumentProvider, PageNumber, PageObject,
    RasterTarget, RenderFault, Viewer, Viewport,
};
use crate::storage::{KeyValueStore, MemoryStore};
use crate::sync::{RemoteBookmark, RemoteError, RemoteStore, UserId};

const PAGE_WIDTH: u32 = 20;
const PAGE_HEIGHT: u32 = 30;

/// Solid colour every fake page is drawn with, unique per page below 256
pub fn page_tint(page: u32) -> [u8; 3] {
    [(page % 256) as u8, 0x40, 0x80]
}

#[derive(Default)]
struct DocumentState {
    delay: Duration,
    page_delays: HashMap<u32, Duration>,
    failing: HashSet<u32>,
    draws: Vec<PageNumber>,
}

/// Document whose pages are flat colour fills. Clones share state, so a
/// test can keep one copy to inspect while the reader owns another.
#[derive(Clone)]
pub struct FakeDocument {
    page_count: u32,
    state: Rc<RefCell<DocumentState>>,
}

impl FakeDocument {
    pub fn new(page_count: u32) -> Self {
        Self {
            page_count,
            state: Rc::new(RefCell::new(DocumentState::default())),
        }
    }

    /// Every render takes `delay`
    pub fn with_delay(self, delay: Duration) -> Self {
        self.state.borrow_mut().delay = delay;
        self
    }

    /// Renders of `page` take `delay`
    pub fn delay_page(self, page: u32, delay: Duration) -> Self {
        self.state.borrow_mut().page_delays.insert(page, delay);
        self
    }

    /// Drawing `page` fails
    pub fn failing_page(self, page: u32) -> Self {
        self.state.borrow_mut().failing.insert(page);
        self
    }

    pub fn set_failing(&self, page: u32, failing: bool) {
        let mut state = self.state.borrow_mut();
        if failing {
            state.failing.insert(page);
        } else {
            state.failing.remove(&page);
        }
    }

    pub fn page_width(&self) -> u32 {
        PAGE_WIDTH
    }

    /// Pages that started drawing, in order
    pub fn draw_log(&self) -> Vec<PageNumber> {
        self.state.borrow().draws.clone()
    }

    pub fn draws_of(&self, page: u32) -> usize {
        self.state
            .borrow()
            .draws
            .iter()
            .filter(|p| p.get() == page)
            .count()
    }
}

#[async_trait(?Send)]
impl DocumentHandle for FakeDocument {
    fn page_count(&self) -> u32 {
        self.page_count
    }

    async fn get_page(&self, page: PageNumber) -> Result<Box<dyn PageObject>, DocumentError> {
        if page.get() > self.page_count {
            return Err(DocumentError::Page {
                page,
                detail: "no such page".into(),
            });
        }
        Ok(Box::new(FakePage {
            page,
            state: self.state.clone(),
        }))
    }
}

struct FakePage {
    page: PageNumber,
    state: Rc<RefCell<DocumentState>>,
}

#[async_trait(?Send)]
impl PageObject for FakePage {
    fn viewport(&self, scale: f32) -> Result<Viewport, RenderFault> {
        Ok(Viewport::new(
            PAGE_WIDTH as f32 * scale,
            PAGE_HEIGHT as f32 * scale,
            scale,
        ))
    }

    async fn render(
        &self,
        canvas: &mut Canvas,
        _target: &RasterTarget,
        cancel: &CancellationToken,
    ) -> Result<(), RenderFault> {
        let (delay, failing) = {
            let mut state = self.state.borrow_mut();
            state.draws.push(self.page);
            let delay = state
                .page_delays
                .get(&self.page.get())
                .copied()
                .unwrap_or(state.delay);
            (delay, state.failing.contains(&self.page.get()))
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        cancel.checkpoint()?;

        if failing {
            return Err(RenderFault::draw(format!("page {} is corrupt", self.page)));
        }
        canvas.fill(page_tint(self.page.get()));
        Ok(())
    }
}

/// Provider handing out one fake document, optionally failing first
pub struct FakeProvider {
    document: FakeDocument,
    failures_left: Cell<u32>,
    opens: Cell<u32>,
}

impl FakeProvider {
    pub fn new(document: FakeDocument) -> Self {
        Self {
            document,
            failures_left: Cell::new(0),
            opens: Cell::new(0),
        }
    }

    /// Fail the first `n` opens
    pub fn failing_times(self, n: u32) -> Self {
        self.failures_left.set(n);
        self
    }

    pub fn opens(&self) -> u32 {
        self.opens.get()
    }
}

#[async_trait(?Send)]
impl DocumentProvider for FakeProvider {
    async fn open(&self, path: &Path) -> Result<Rc<dyn DocumentHandle>, DocumentError> {
        self.opens.set(self.opens.get() + 1);
        if self.failures_left.get() > 0 {
            self.failures_left.set(self.failures_left.get() - 1);
            return Err(DocumentError::Open {
                path: path.to_path_buf(),
                detail: "network error".into(),
            });
        }
        Ok(Rc::new(self.document.clone()))
    }
}

/// Memory store whose reads or writes can be made to fail
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    fail_reads: Cell<bool>,
    fail_writes: Cell<bool>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.set(fail);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.set(fail);
    }
}

impl KeyValueStore for FlakyStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        if self.fail_reads.get() {
            return Err(StorageError::Unavailable("reads disabled".into()));
        }
        self.inner.get(key)
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        if self.fail_writes.get() {
            return Err(StorageError::Unavailable("quota exceeded".into()));
        }
        self.inner.put(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        if self.fail_writes.get() {
            return Err(StorageError::Unavailable("quota exceeded".into()));
        }
        self.inner.remove(key)
    }
}

#[derive(Default)]
struct RemoteState {
    last_pages: HashMap<UserId, PageNumber>,
    bookmarks: HashMap<UserId, Vec<RemoteBookmark>>,
    calls: Vec<String>,
    next_id: u32,
}

/// Account store kept in memory; every call is logged
#[derive(Default)]
pub struct FakeRemote {
    state: RefCell<RemoteState>,
    failing: Cell<bool>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with `Unavailable`
    pub fn set_failing(&self, failing: bool) {
        self.failing.set(failing);
    }

    /// Calls made so far, e.g. `set_last_read_page reader-1 5`
    pub fn calls(&self) -> Vec<String> {
        self.state.borrow().calls.clone()
    }

    pub fn last_page(&self, user: &UserId) -> Option<PageNumber> {
        self.state.borrow().last_pages.get(user).copied()
    }

    pub fn bookmarks(&self, user: &UserId) -> Vec<RemoteBookmark> {
        self.state
            .borrow()
            .bookmarks
            .get(user)
            .cloned()
            .unwrap_or_default()
    }

    pub fn seed_last_page(&self, user: &UserId, page: PageNumber) {
        self.state
            .borrow_mut()
            .last_pages
            .insert(user.clone(), page);
    }

    pub fn seed_bookmark(&self, user: &UserId, page: PageNumber, name: &str) -> String {
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        let id = format!("bm-{}", state.next_id);
        state
            .bookmarks
            .entry(user.clone())
            .or_default()
            .push(RemoteBookmark {
                id: id.clone(),
                page,
                name: name.to_string(),
            });
        id
    }

    fn call(&self, entry: String) -> Result<(), RemoteError> {
        self.state.borrow_mut().calls.push(entry);
        if self.failing.get() {
            Err(RemoteError::Unavailable("service down".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait(?Send)]
impl RemoteStore for FakeRemote {
    async fn get_last_read_page(&self, user: &UserId) -> Result<Option<PageNumber>, RemoteError> {
        self.call(format!("get_last_read_page {user}"))?;
        Ok(self.last_page(user))
    }

    async fn set_last_read_page(
        &self,
        user: &UserId,
        page: PageNumber,
    ) -> Result<(), RemoteError> {
        self.call(format!("set_last_read_page {user} {page}"))?;
        self.seed_last_page(user, page);
        Ok(())
    }

    async fn list_bookmarks(&self, user: &UserId) -> Result<Vec<RemoteBookmark>, RemoteError> {
        self.call(format!("list_bookmarks {user}"))?;
        Ok(self.bookmarks(user))
    }

    async fn add_bookmark(
        &self,
        user: &UserId,
        page: PageNumber,
        name: &str,
    ) -> Result<String, RemoteError> {
        self.call(format!("add_bookmark {user} {page} {name}"))?;
        Ok(self.seed_bookmark(user, page, name))
    }

    async fn delete_bookmark(&self, user: &UserId, remote_id: &str) -> Result<(), RemoteError> {
        self.call(format!("delete_bookmark {user} {remote_id}"))?;
        if let Some(list) = self.state.borrow_mut().bookmarks.get_mut(user) {
            list.retain(|b| b.id != remote_id);
        }
        Ok(())
    }
}

/// Notification sink that remembers everything
#[derive(Default)]
pub struct RecordingNotifier {
    entries: RefCell<Vec<(NotificationLevel, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.entries
            .borrow()
            .iter()
            .map(|(_, message)| message.clone())
            .collect()
    }

    pub fn entries(&self) -> Vec<(NotificationLevel, String)> {
        self.entries.borrow().clone()
    }

    pub fn contains(&self, message: &str) -> bool {
        self.entries.borrow().iter().any(|(_, m)| m == message)
    }
}

impl NotificationSink for RecordingNotifier {
    fn notify(&self, level: NotificationLevel, message: &str) {
        self.entries.borrow_mut().push((level, message.to_string()));
    }
}

/// Viewer that records what it was asked to show
#[derive(Default)]
pub struct RecordingViewer {
    detached: Cell<bool>,
    busy: Cell<bool>,
    presented: RefCell<Vec<PageNumber>>,
    last: RefCell<Option<Canvas>>,
}

impl RecordingViewer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn detach(&self) {
        self.detached.set(true);
    }

    pub fn is_busy(&self) -> bool {
        self.busy.get()
    }

    /// Pages presented, in order
    pub fn presented(&self) -> Vec<PageNumber> {
        self.presented.borrow().clone()
    }

    pub fn last_canvas(&self) -> Option<Canvas> {
        self.last.borrow().clone()
    }
}

impl Viewer for RecordingViewer {
    fn is_attached(&self) -> bool {
        !self.detached.get()
    }

    fn set_busy(&self, busy: bool) {
        self.busy.set(busy);
    }

    fn present(&self, page: PageNumber, canvas: &Canvas) {
        self.presented.borrow_mut().push(page);
        *self.last.borrow_mut() = Some(canvas.clone());
    }
}
