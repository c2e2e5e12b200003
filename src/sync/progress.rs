//! Local-first reading progress and bookmark synchronization
//!
//! Every mutation is committed to local storage before anything else
//! happens. When a session exists the matching remote write is queued for
//! a single background worker that drains the queue in order while the
//! device is online. Outcomes come back to the owner as [`SyncOutcome`]s.

use std::cell::Cell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use chrono::{DateTime, Utc};
use flume::{Receiver, Sender};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use super::remote::{RemoteBookmark, RemoteError, RemoteStore, UserId};
use crate::bookmark::{Bookmark, Bookmarks};
use crate::error::{BookmarkError, StorageError};
use crate::notification::NotificationSink;
use crate::reader::PageNumber;
use crate::retry::{Idempotency, RetryPolicy, retry};
use crate::storage::KeyValueStore;

const PROGRESS_KEY: &str = "progress";
const BOOKMARKS_KEY: &str = "bookmarks";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadingProgress {
    pub user_id: Option<UserId>,
    pub last_page: PageNumber,
    pub updated_at: DateTime<Utc>,
}

impl ReadingProgress {
    fn new(user_id: Option<UserId>, last_page: PageNumber) -> Self {
        Self {
            user_id,
            last_page,
            updated_at: Utc::now(),
        }
    }
}

/// Queued remote write
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOp {
    SetLastPage {
        user: UserId,
        page: PageNumber,
    },
    AddBookmark {
        user: UserId,
        page: PageNumber,
        name: String,
    },
    /// Carries the whole bookmark so a failed delete can restore it
    DeleteBookmark {
        user: UserId,
        bookmark: Bookmark,
    },
    /// Remove `previous` from the account, then add it back as `name`
    RenameBookmark {
        user: UserId,
        previous: Bookmark,
        name: String,
    },
}

/// Result of one queued remote write
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    LastPageSaved(PageNumber),
    LastPageFailed {
        page: PageNumber,
        error: RemoteError,
    },
    BookmarkAdded {
        page: PageNumber,
        name: String,
        remote_id: String,
    },
    AddFailed {
        page: PageNumber,
        name: String,
        error: RemoteError,
    },
    BookmarkDeleted(PageNumber),
    DeleteFailed {
        bookmark: Bookmark,
        error: RemoteError,
    },
    /// The old copy is still in the account; nothing new was added
    RenameFailed {
        previous: Bookmark,
        name: String,
        error: RemoteError,
    },
}

fn read_json<T: serde::de::DeserializeOwned>(
    storage: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, StorageError> {
    match storage.get(key)? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

fn write_json<T: Serialize>(
    storage: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let bytes = serde_json::to_vec(value)?;
    storage.put(key, &bytes)
}

fn load_local_progress(storage: &dyn KeyValueStore) -> Option<ReadingProgress> {
    read_json(storage, PROGRESS_KEY).unwrap_or_else(|e| {
        warn!("Failed to load reading progress: {e}");
        None
    })
}

fn load_local_bookmarks(storage: &dyn KeyValueStore) -> Bookmarks {
    read_json(storage, BOOKMARKS_KEY)
        .unwrap_or_else(|e| {
            warn!("Failed to load bookmarks: {e}");
            None
        })
        .unwrap_or_default()
}

/// Read side of progress sync: remote first, then local, then defaults
#[derive(Clone)]
pub struct ProgressLoader {
    storage: Rc<dyn KeyValueStore>,
    remote: Option<Rc<dyn RemoteStore>>,
    online: watch::Receiver<bool>,
}

impl ProgressLoader {
    fn remote_for(&self, user: Option<&UserId>) -> Result<(&dyn RemoteStore, UserId), RemoteError> {
        let (Some(remote), Some(user)) = (self.remote.as_deref(), user) else {
            return Err(RemoteError::Unavailable("no session".into()));
        };
        if !*self.online.borrow() {
            return Err(RemoteError::Offline);
        }
        Ok((remote, user.clone()))
    }

    /// Last page read, falling back to local storage and then page 1
    pub async fn load_last_page(&self, user: Option<&UserId>) -> PageNumber {
        let remote = match self.remote_for(user) {
            Ok((remote, user)) => remote.get_last_read_page(&user).await,
            Err(e) => Err(e),
        };

        match remote {
            Ok(Some(page)) => {
                debug!("Remote last page is {page}");
                page
            }
            other => {
                if let Err(e) = other {
                    debug!("Remote last page unavailable: {e}");
                }
                load_local_progress(&*self.storage)
                    .map(|p| p.last_page)
                    .unwrap_or(PageNumber::FIRST)
            }
        }
    }

    /// Remote bookmark list, or `Err` when the local set should be used
    pub async fn fetch_remote_bookmarks(
        &self,
        user: Option<&UserId>,
    ) -> Result<Vec<RemoteBookmark>, RemoteError> {
        let (remote, user) = self.remote_for(user)?;
        remote.list_bookmarks(&user).await
    }

    /// Bookmarks from the account, falling back to local storage
    pub async fn load_bookmarks(&self, user: Option<&UserId>) -> Bookmarks {
        let local = load_local_bookmarks(&*self.storage);
        match self.fetch_remote_bookmarks(user).await {
            Ok(list) => merge_remote(local, list),
            Err(e) => {
                debug!("Using local bookmarks: {e}");
                local
            }
        }
    }
}

/// Account bookmarks replace the local set; local ones the account never
/// saw survive unless their page is taken
fn merge_remote(local: Bookmarks, remote: Vec<RemoteBookmark>) -> Bookmarks {
    let mut merged = Bookmarks::new();
    for rb in remote {
        let mut bookmark = Bookmark::new(rb.page, rb.name);
        bookmark.remote_id = Some(rb.id);
        if let Some(existing) = local.get(rb.page) {
            if existing.remote_id == bookmark.remote_id {
                bookmark.created_at = existing.created_at;
            }
        }
        merged.restore(bookmark);
    }
    for bookmark in local.unsynced() {
        if !merged.contains(bookmark.page) {
            merged.restore(bookmark.clone());
        }
    }
    merged
}

/// Remote data fetched for a new session
#[derive(Debug)]
pub struct SessionSnapshot {
    pub user: UserId,
    pub last_page: PageNumber,
    pub bookmarks: Result<Vec<RemoteBookmark>, RemoteError>,
}

impl ProgressLoader {
    pub async fn snapshot(&self, user: UserId) -> SessionSnapshot {
        let last_page = self.load_last_page(Some(&user)).await;
        let bookmarks = self.fetch_remote_bookmarks(Some(&user)).await;
        SessionSnapshot {
            user,
            last_page,
            bookmarks,
        }
    }
}

pub struct ProgressSync {
    storage: Rc<dyn KeyValueStore>,
    notifier: Rc<dyn NotificationSink>,
    progress: Option<ReadingProgress>,
    bookmarks: Bookmarks,
    ops: Option<Sender<SyncOp>>,
    online: watch::Sender<bool>,
    loader: ProgressLoader,
    pending: Rc<Cell<usize>>,
    last_queued: Option<(UserId, PageNumber)>,
}

impl ProgressSync {
    /// Restore local state and, when a remote store is configured, start the
    /// background worker. Must be called inside a `LocalSet`.
    pub fn new<E>(
        storage: Rc<dyn KeyValueStore>,
        remote: Option<Rc<dyn RemoteStore>>,
        notifier: Rc<dyn NotificationSink>,
        policy: RetryPolicy,
        outcomes: Sender<E>,
    ) -> Self
    where
        E: From<SyncOutcome> + 'static,
    {
        let (online, online_rx) = watch::channel(true);
        let pending = Rc::new(Cell::new(0));

        let ops = remote.clone().map(|remote| {
            let (tx, rx) = flume::unbounded();
            let worker = SyncWorker {
                remote,
                policy,
                online: online_rx.clone(),
                pending: pending.clone(),
                assigned: HashMap::new(),
            };
            tokio::task::spawn_local(worker.run(rx, outcomes));
            tx
        });

        let progress = load_local_progress(&*storage);
        let bookmarks = load_local_bookmarks(&*storage);
        debug!(
            "Loaded local progress {:?} and {} bookmarks",
            progress.as_ref().map(|p| p.last_page),
            bookmarks.len()
        );

        let loader = ProgressLoader {
            storage: storage.clone(),
            remote,
            online: online_rx,
        };

        Self {
            storage,
            notifier,
            progress,
            bookmarks,
            ops,
            online,
            loader,
            pending,
            last_queued: None,
        }
    }

    #[must_use]
    pub fn loader(&self) -> ProgressLoader {
        self.loader.clone()
    }

    pub async fn load_last_page(&self, user: Option<&UserId>) -> PageNumber {
        self.loader.load_last_page(user).await
    }

    pub async fn load_bookmarks(&self, user: Option<&UserId>) -> Bookmarks {
        self.loader.load_bookmarks(user).await
    }

    #[must_use]
    pub fn last_page(&self) -> Option<PageNumber> {
        self.progress.as_ref().map(|p| p.last_page)
    }

    #[must_use]
    pub fn bookmarks(&self) -> &Bookmarks {
        &self.bookmarks
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        *self.online.borrow()
    }

    /// Remote writes queued or running
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.get()
    }

    /// Nothing left that could make progress right now
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.pending.get() == 0 || !self.is_online()
    }

    fn persist_progress(&self) {
        if let Some(progress) = &self.progress {
            if let Err(e) = write_json(&*self.storage, PROGRESS_KEY, progress) {
                warn!("Failed to save reading progress: {e}");
            }
        }
    }

    fn persist_bookmarks(&self) {
        if let Err(e) = write_json(&*self.storage, BOOKMARKS_KEY, &self.bookmarks) {
            warn!("Failed to save bookmarks: {e}");
        }
    }

    fn enqueue(&self, op: SyncOp) {
        let Some(ops) = &self.ops else {
            return;
        };
        self.pending.set(self.pending.get() + 1);
        if ops.send(op).is_err() {
            warn!("Sync worker is gone; dropping remote write");
            self.pending.set(self.pending.get().saturating_sub(1));
        }
    }

    /// Persist the page locally only
    pub fn record_local(&mut self, user: Option<&UserId>, page: PageNumber) {
        if self.progress.as_ref().map(|p| p.last_page) == Some(page) {
            return;
        }
        self.progress = Some(ReadingProgress::new(user.cloned(), page));
        self.persist_progress();
    }

    /// Persist the page and push it to the account
    pub fn record_page(&mut self, user: Option<&UserId>, page: PageNumber) {
        self.record_local(user, page);

        let Some(user) = user else {
            return;
        };
        if self.last_queued.as_ref() == Some(&(user.clone(), page)) {
            return;
        }
        self.last_queued = Some((user.clone(), page));
        self.enqueue(SyncOp::SetLastPage {
            user: user.clone(),
            page,
        });
    }

    pub fn save_bookmark(
        &mut self,
        user: Option<&UserId>,
        name: &str,
        page: PageNumber,
    ) -> Result<Bookmark, BookmarkError> {
        let bookmark = match self.bookmarks.add(page, name) {
            Ok(bookmark) => bookmark.clone(),
            Err(e) => {
                self.notify_rejected(&e);
                return Err(e);
            }
        };

        self.persist_bookmarks();
        info!("Bookmarked page {page} as '{}'", bookmark.name);
        self.notifier
            .info(&format!("Bookmark '{}' saved on page {page}.", bookmark.name));

        if let Some(user) = user {
            self.enqueue(SyncOp::AddBookmark {
                user: user.clone(),
                page,
                name: bookmark.name.clone(),
            });
        }
        Ok(bookmark)
    }

    pub fn rename_bookmark(
        &mut self,
        user: Option<&UserId>,
        page: PageNumber,
        name: &str,
    ) -> Result<Bookmark, BookmarkError> {
        let previous = match self.bookmarks.rename(page, name) {
            Ok(previous) => previous,
            Err(e) => {
                self.notify_rejected(&e);
                return Err(e);
            }
        };
        self.persist_bookmarks();

        let renamed = self
            .bookmarks
            .get(page)
            .cloned()
            .ok_or(BookmarkError::NotFound(page))?;

        if let Some(user) = user {
            self.enqueue(SyncOp::RenameBookmark {
                user: user.clone(),
                previous,
                name: renamed.name.clone(),
            });
        }
        Ok(renamed)
    }

    /// Remove locally at once; the remote delete follows in the background
    pub fn delete_bookmark(
        &mut self,
        user: Option<&UserId>,
        page: PageNumber,
    ) -> Result<Bookmark, BookmarkError> {
        let Some(bookmark) = self.bookmarks.remove(page) else {
            return Err(BookmarkError::NotFound(page));
        };
        self.persist_bookmarks();
        info!("Deleted bookmark '{}' on page {page}", bookmark.name);

        if let Some(user) = user {
            self.enqueue(SyncOp::DeleteBookmark {
                user: user.clone(),
                bookmark: bookmark.clone(),
            });
        }
        Ok(bookmark)
    }

    pub(crate) fn notify_rejected(&self, error: &BookmarkError) {
        match error {
            BookmarkError::Duplicate { page, name } => self
                .notifier
                .warn(&format!("Bookmark '{name}' already exists on page {page}.")),
            BookmarkError::PageTaken { page, existing } => self
                .notifier
                .warn(&format!("Page {page} already has bookmark '{existing}'.")),
            BookmarkError::Invalid(e) => self.notifier.warn(&format!("Invalid bookmark: {e}.")),
            BookmarkError::NotFound(_) | BookmarkError::Closed => {}
        }
    }

    /// Fold a worker outcome into local state
    pub fn apply(&mut self, outcome: SyncOutcome) {
        match outcome {
            SyncOutcome::LastPageSaved(page) => debug!("Remote last page set to {page}"),

            SyncOutcome::LastPageFailed { page, error } => {
                warn!("Could not save last page {page} remotely: {error}");
                self.notifier
                    .warn(&format!("Sync failed: reading position not saved ({error})."));
            }

            SyncOutcome::BookmarkAdded {
                page,
                name,
                remote_id,
            } => {
                if self.bookmarks.assign_remote_id(page, &name, remote_id) {
                    self.persist_bookmarks();
                } else {
                    debug!("Bookmark on page {page} changed before its add completed");
                }
            }

            SyncOutcome::AddFailed { page, name, error } => {
                warn!("Could not add bookmark '{name}' on page {page} remotely: {error}");
                self.notifier
                    .warn(&format!("Sync failed: bookmark '{name}' not saved to your account ({error})."));
            }

            SyncOutcome::BookmarkDeleted(page) => debug!("Remote bookmark on page {page} deleted"),

            SyncOutcome::DeleteFailed { bookmark, error } => {
                warn!(
                    "Could not delete bookmark '{}' remotely: {error}; restoring",
                    bookmark.name
                );
                let name = bookmark.name.clone();
                if self.bookmarks.contains(bookmark.page) {
                    debug!("Page {} was bookmarked again, not restoring", bookmark.page);
                    self.notifier.error(&format!(
                        "Could not delete bookmark '{name}' from your account."
                    ));
                } else {
                    self.bookmarks.restore(bookmark);
                    self.persist_bookmarks();
                    self.notifier.error(&format!(
                        "Could not delete bookmark '{name}' from your account; restored."
                    ));
                }
            }

            SyncOutcome::RenameFailed {
                previous,
                name,
                error,
            } => {
                warn!(
                    "Could not rename bookmark '{}' to '{name}' remotely: {error}",
                    previous.name
                );
                let old = previous.name.clone();
                let unchanged = self
                    .bookmarks
                    .get(previous.page)
                    .is_some_and(|b| b.name == name && !b.is_synced());
                if unchanged {
                    self.bookmarks.restore(previous);
                    self.persist_bookmarks();
                    self.notifier.error(&format!(
                        "Could not rename bookmark '{old}' in your account; kept '{old}'."
                    ));
                } else {
                    debug!("Bookmark on page {} changed again, keeping it", previous.page);
                    self.notifier.error(&format!(
                        "Could not rename bookmark '{old}' in your account."
                    ));
                }
            }
        }
    }

    /// Adopt data fetched for a new session. Returns the page to resume at.
    pub fn begin_session(&mut self, snapshot: SessionSnapshot) -> PageNumber {
        self.last_queued = None;
        match snapshot.bookmarks {
            Ok(list) => {
                let local = std::mem::take(&mut self.bookmarks);
                self.bookmarks = merge_remote(local, list);
                self.persist_bookmarks();

                let unsynced: Vec<_> = self.bookmarks.unsynced().cloned().collect();
                for bookmark in unsynced {
                    self.enqueue(SyncOp::AddBookmark {
                        user: snapshot.user.clone(),
                        page: bookmark.page,
                        name: bookmark.name,
                    });
                }
            }
            Err(e) => debug!("Keeping local bookmarks: {e}"),
        }
        snapshot.last_page
    }

    /// Sign-out forgets the account's bookmarks on this device
    pub fn end_session(&mut self) {
        self.last_queued = None;
        self.bookmarks.clear();
        self.persist_bookmarks();
    }

    /// Returns whether connectivity changed
    pub fn set_online(&mut self, online: bool) -> bool {
        if self.is_online() == online {
            return false;
        }
        self.online.send_replace(online);
        if online {
            info!("Back online");
            self.notifier.info("Back online");
        } else {
            info!("Working offline");
            self.notifier.warn("Working offline");
        }
        true
    }
}

/// Background consumer of the remote write queue
struct SyncWorker {
    remote: Rc<dyn RemoteStore>,
    policy: RetryPolicy,
    online: watch::Receiver<bool>,
    pending: Rc<Cell<usize>>,
    /// Ids handed out by adds this worker ran, for deletes queued before
    /// the owner learned them
    assigned: HashMap<PageNumber, String>,
}

impl SyncWorker {
    async fn run<E>(mut self, ops: Receiver<SyncOp>, outcomes: Sender<E>)
    where
        E: From<SyncOutcome>,
    {
        let mut backlog = VecDeque::new();
        loop {
            if backlog.is_empty() {
                match ops.recv_async().await {
                    Ok(op) => backlog.push_back(op),
                    Err(_) => break,
                }
            }

            if self.online.wait_for(|online| *online).await.is_err() {
                break;
            }
            backlog.extend(ops.try_iter());

            let Some(op) = backlog.pop_front() else {
                continue;
            };

            if let SyncOp::SetLastPage { user, .. } = &op {
                let superseded = matches!(
                    backlog.front(),
                    Some(SyncOp::SetLastPage { user: next, .. }) if next == user
                );
                if superseded {
                    self.done();
                    continue;
                }
            }

            let outcome = self.execute(op).await;
            self.done();
            if outcomes.send(E::from(outcome)).is_err() {
                break;
            }
        }
        debug!("Sync worker stopped");
    }

    fn done(&self) {
        self.pending.set(self.pending.get().saturating_sub(1));
    }

    async fn execute(&mut self, op: SyncOp) -> SyncOutcome {
        let remote = self.remote.clone();
        match op {
            SyncOp::SetLastPage { user, page } => {
                let result = retry(
                    &self.policy,
                    Idempotency::Idempotent,
                    "set last read page",
                    |_| remote.set_last_read_page(&user, page),
                )
                .await;
                match result {
                    Ok(()) => SyncOutcome::LastPageSaved(page),
                    Err(error) => SyncOutcome::LastPageFailed { page, error },
                }
            }

            SyncOp::AddBookmark { user, page, name } => self.add(&user, page, name).await,

            SyncOp::DeleteBookmark { user, bookmark } => {
                let known = self.assigned.remove(&bookmark.page);
                let Some(remote_id) = bookmark.remote_id.clone().or(known) else {
                    debug!("Bookmark on page {} never reached the account", bookmark.page);
                    return SyncOutcome::BookmarkDeleted(bookmark.page);
                };

                let result = retry(
                    &self.policy,
                    Idempotency::Idempotent,
                    "delete bookmark",
                    |_| remote.delete_bookmark(&user, &remote_id),
                )
                .await;
                match result {
                    Ok(()) => SyncOutcome::BookmarkDeleted(bookmark.page),
                    Err(error) => {
                        let mut bookmark = bookmark;
                        bookmark.remote_id = Some(remote_id);
                        SyncOutcome::DeleteFailed { bookmark, error }
                    }
                }
            }

            SyncOp::RenameBookmark {
                user,
                previous,
                name,
            } => {
                let page = previous.page;
                let known = self.assigned.remove(&page);
                if let Some(remote_id) = previous.remote_id.clone().or(known) {
                    let result = retry(
                        &self.policy,
                        Idempotency::Idempotent,
                        "delete renamed bookmark",
                        |_| remote.delete_bookmark(&user, &remote_id),
                    )
                    .await;
                    if let Err(error) = result {
                        // A later delete of this page must still find the old copy
                        self.assigned.insert(page, remote_id.clone());
                        let mut previous = previous;
                        previous.remote_id = Some(remote_id);
                        return SyncOutcome::RenameFailed {
                            previous,
                            name,
                            error,
                        };
                    }
                }
                self.add(&user, page, name).await
            }
        }
    }

    async fn add(&mut self, user: &UserId, page: PageNumber, name: String) -> SyncOutcome {
        let remote = self.remote.clone();
        let result = retry(
            &self.policy,
            Idempotency::NonIdempotent,
            "add bookmark",
            |_| remote.add_bookmark(user, page, &name),
        )
        .await;
        match result {
            Ok(remote_id) => {
                self.assigned.insert(page, remote_id.clone());
                SyncOutcome::BookmarkAdded {
                    page,
                    name,
                    remote_id,
                }
            }
            Err(error) => SyncOutcome::AddFailed { page, name, error },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::test_utils::{FakeRemote, RecordingNotifier};
    use std::time::Duration;

    fn page(n: u32) -> PageNumber {
        PageNumber::new(n).unwrap()
    }

    struct Harness {
        storage: Rc<MemoryStore>,
        remote: Rc<FakeRemote>,
        notes: Rc<RecordingNotifier>,
        sync: ProgressSync,
        outcomes: Receiver<SyncOutcome>,
    }

    fn harness_with(storage: Rc<MemoryStore>, remote: Rc<FakeRemote>) -> Harness {
        let notes = Rc::new(RecordingNotifier::new());
        let (tx, outcomes) = flume::unbounded();
        let sync = ProgressSync::new(
            storage.clone(),
            Some(remote.clone() as Rc<dyn RemoteStore>),
            notes.clone(),
            RetryPolicy::remote_sync(),
            tx,
        );
        Harness {
            storage,
            remote,
            notes,
            sync,
            outcomes,
        }
    }

    fn harness() -> Harness {
        harness_with(Rc::new(MemoryStore::new()), Rc::new(FakeRemote::new()))
    }

    impl Harness {
        /// Apply outcomes until the queue is drained
        async fn drain(&mut self) {
            while self.sync.pending() > 0 {
                let outcome = self.outcomes.recv_async().await.unwrap();
                self.sync.apply(outcome);
            }
            while let Ok(outcome) = self.outcomes.try_recv() {
                self.sync.apply(outcome);
            }
        }
    }

    fn user() -> UserId {
        UserId::new("reader-1")
    }

    async fn local<F: std::future::Future>(f: F) -> F::Output {
        tokio::task::LocalSet::new().run_until(f).await
    }

    #[tokio::test(start_paused = true)]
    async fn local_write_happens_before_remote() {
        local(async {
            let mut h = harness();
            h.sync.record_page(Some(&user()), page(12));

            let stored: ReadingProgress = read_json(&*h.storage, PROGRESS_KEY).unwrap().unwrap();
            assert_eq!(stored.last_page, page(12));
            assert_eq!(h.sync.pending(), 1);

            h.drain().await;
            assert_eq!(h.remote.last_page(&user()), Some(page(12)));
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn anonymous_progress_stays_local() {
        local(async {
            let mut h = harness();
            h.sync.record_page(None, page(4));
            assert_eq!(h.sync.pending(), 0);
            assert_eq!(h.sync.last_page(), Some(page(4)));
            assert!(h.remote.calls().is_empty());
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn queued_last_pages_coalesce_while_offline() {
        local(async {
            let mut h = harness();
            h.sync.set_online(false);
            for n in 1..=5 {
                h.sync.record_page(Some(&user()), page(n));
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
            assert!(h.remote.calls().is_empty());
            assert!(h.sync.is_idle());

            h.sync.set_online(true);
            h.drain().await;

            assert_eq!(h.remote.calls(), vec!["set_last_read_page reader-1 5".to_string()]);
            assert_eq!(
                h.notes.messages(),
                vec!["Working offline".to_string(), "Back online".to_string()]
            );
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_bookmark_notifies_and_keeps_one() {
        local(async {
            let mut h = harness();
            h.sync.save_bookmark(None, "X", page(10)).unwrap();

            let err = h.sync.save_bookmark(None, "X", page(10)).unwrap_err();
            assert!(matches!(err, BookmarkError::Duplicate { .. }));
            assert_eq!(h.sync.bookmarks().len(), 1);
            assert_eq!(
                h.notes.messages().last().map(String::as_str),
                Some("Bookmark 'X' already exists on page 10.")
            );
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn added_bookmark_receives_remote_id() {
        local(async {
            let mut h = harness();
            h.sync.save_bookmark(Some(&user()), "Intro", page(3)).unwrap();
            h.drain().await;

            let bookmark = h.sync.bookmarks().get(page(3)).unwrap();
            assert!(bookmark.remote_id.is_some());
            let stored: Bookmarks = read_json(&*h.storage, BOOKMARKS_KEY).unwrap().unwrap();
            assert_eq!(stored.get(page(3)).unwrap().remote_id, bookmark.remote_id);
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn failed_remote_delete_restores_bookmark() {
        local(async {
            let mut h = harness();
            h.sync.save_bookmark(Some(&user()), "Keep", page(7)).unwrap();
            h.drain().await;

            h.sync.set_online(false);
            h.sync.delete_bookmark(Some(&user()), page(7)).unwrap();
            assert!(!h.sync.bookmarks().contains(page(7)));

            h.remote.set_failing(true);
            h.sync.set_online(true);
            h.drain().await;

            let restored = h.sync.bookmarks().get(page(7)).unwrap();
            assert_eq!(restored.name, "Keep");
            assert!(restored.remote_id.is_some());
            assert!(h.notes.messages().contains(
                &"Could not delete bookmark 'Keep' from your account; restored.".to_string()
            ));
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn failed_delete_of_rebookmarked_page_is_not_restored() {
        local(async {
            let mut h = harness();
            h.sync.save_bookmark(Some(&user()), "Keep", page(7)).unwrap();
            h.drain().await;

            h.sync.set_online(false);
            h.sync.delete_bookmark(Some(&user()), page(7)).unwrap();
            h.sync.save_bookmark(Some(&user()), "Other", page(7)).unwrap();

            h.remote.set_failing(true);
            h.sync.set_online(true);
            h.drain().await;

            assert_eq!(h.sync.bookmarks().get(page(7)).unwrap().name, "Other");
            assert!(h.notes.contains("Could not delete bookmark 'Keep' from your account."));
            assert!(!h.notes.messages().iter().any(|m| m.ends_with("restored.")));
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn failed_rename_keeps_previous_name() {
        local(async {
            let mut h = harness();
            h.sync.save_bookmark(Some(&user()), "Draft", page(2)).unwrap();
            h.drain().await;
            let id = h.sync.bookmarks().get(page(2)).unwrap().remote_id.clone();

            h.sync.set_online(false);
            h.sync.rename_bookmark(Some(&user()), page(2), "Final").unwrap();
            h.remote.set_failing(true);
            h.sync.set_online(true);
            h.drain().await;

            let kept = h.sync.bookmarks().get(page(2)).unwrap();
            assert_eq!(kept.name, "Draft");
            assert_eq!(kept.remote_id, id);
            let stored: Bookmarks = read_json(&*h.storage, BOOKMARKS_KEY).unwrap().unwrap();
            assert_eq!(stored.get(page(2)).unwrap().name, "Draft");
            assert!(h.notes.contains("Could not rename bookmark 'Draft' in your account; kept 'Draft'."));

            let remote = h.remote.bookmarks(&user());
            assert_eq!(remote.len(), 1);
            assert_eq!(remote[0].name, "Draft");
            assert!(!h.remote.calls().iter().any(|c| c.contains("Final")));
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn delete_before_add_completes_uses_assigned_id() {
        local(async {
            let mut h = harness();
            h.sync.save_bookmark(Some(&user()), "Soon gone", page(2)).unwrap();
            h.sync.delete_bookmark(Some(&user()), page(2)).unwrap();
            h.drain().await;

            assert!(h.remote.bookmarks(&user()).is_empty());
            assert!(!h.sync.bookmarks().contains(page(2)));
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn rename_replaces_remote_bookmark() {
        local(async {
            let mut h = harness();
            h.sync.save_bookmark(Some(&user()), "Old", page(5)).unwrap();
            h.drain().await;

            h.sync.rename_bookmark(Some(&user()), page(5), "New").unwrap();
            h.drain().await;

            let remote = h.remote.bookmarks(&user());
            assert_eq!(remote.len(), 1);
            assert_eq!(remote[0].name, "New");
            assert_eq!(
                h.sync.bookmarks().get(page(5)).unwrap().remote_id.as_deref(),
                Some(remote[0].id.as_str())
            );
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn loads_fall_back_remote_then_local_then_default() {
        local(async {
            let storage = Rc::new(MemoryStore::new());
            let remote = Rc::new(FakeRemote::new());

            let h = harness_with(storage.clone(), remote.clone());
            assert_eq!(h.sync.load_last_page(Some(&user())).await, PageNumber::FIRST);
            drop(h);

            let mut h = harness_with(storage.clone(), remote.clone());
            h.sync.record_local(None, page(30));
            assert_eq!(h.sync.load_last_page(Some(&user())).await, page(30));

            remote.seed_last_page(&user(), page(44));
            assert_eq!(h.sync.load_last_page(Some(&user())).await, page(44));

            remote.set_failing(true);
            assert_eq!(h.sync.load_last_page(Some(&user())).await, page(30));
            assert!(h.sync.load_bookmarks(Some(&user())).await.is_empty());
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn session_adopts_remote_bookmarks_and_uploads_local_ones() {
        local(async {
            let mut h = harness();
            h.sync.save_bookmark(None, "Offline note", page(8)).unwrap();
            h.remote.seed_bookmark(&user(), page(2), "From account");

            let snapshot = h.sync.loader().snapshot(user()).await;
            let resume = h.sync.begin_session(snapshot);
            assert_eq!(resume, PageNumber::FIRST);

            let names: Vec<_> = h.sync.bookmarks().iter().map(|b| b.name.clone()).collect();
            assert_eq!(names, vec!["From account", "Offline note"]);

            h.drain().await;
            assert_eq!(h.remote.bookmarks(&user()).len(), 2);
            assert!(h.sync.bookmarks().unsynced().next().is_none());

            h.sync.end_session();
            assert!(h.sync.bookmarks().is_empty());
        })
        .await;
    }
}
