#![allow(dead_code)]

use std::future::Future;
use std::path::PathBuf;
use std::rc::Rc;

use folio::reader::{DocumentProvider, PageStore, Reader, ReaderConfig, ReaderParts};
use folio::storage::MemoryStore;
use folio::sync::UserId;
use folio::test_utils::{FakeDocument, FakeProvider, FakeRemote, RecordingNotifier, RecordingViewer};
use folio::PageNumber;

pub async fn local<F: Future>(f: F) -> F::Output {
    tokio::task::LocalSet::new().run_until(f).await
}

pub fn page(n: u32) -> PageNumber {
    PageNumber::new(n).unwrap()
}

/// Defaults with background prefetch switched off
pub fn no_prefetch() -> ReaderConfig {
    ReaderConfig {
        prefetch_concurrency: 0,
        ..ReaderConfig::default()
    }
}

pub fn reader_one() -> UserId {
    UserId::new("reader-1")
}

/// Collaborators shared between a test and the reader under test
pub struct Fixture {
    pub document: FakeDocument,
    pub storage: Rc<MemoryStore>,
    pub remote: Rc<FakeRemote>,
    pub notifier: Rc<RecordingNotifier>,
    pub viewer: Rc<RecordingViewer>,
}

impl Fixture {
    pub fn new(document: FakeDocument) -> Self {
        Self {
            document,
            storage: Rc::new(MemoryStore::new()),
            remote: Rc::new(FakeRemote::new()),
            notifier: Rc::new(RecordingNotifier::new()),
            viewer: Rc::new(RecordingViewer::new()),
        }
    }

    pub fn parts(
        &self,
        config: ReaderConfig,
        provider: Rc<dyn DocumentProvider>,
        user: Option<UserId>,
    ) -> ReaderParts {
        ReaderParts {
            path: PathBuf::from("book.pdf"),
            config,
            provider,
            storage: self.storage.clone(),
            remote: Some(self.remote.clone()),
            notifier: self.notifier.clone(),
            viewer: self.viewer.clone(),
            user,
        }
    }

    /// Open anonymously and wait for the first page
    pub async fn open(&self, config: ReaderConfig) -> Reader {
        self.open_as(config, None).await
    }

    pub async fn open_as(&self, config: ReaderConfig, user: Option<UserId>) -> Reader {
        let provider = Rc::new(FakeProvider::new(self.document.clone()));
        let reader = Reader::open(self.parts(config, provider, user))
            .await
            .unwrap();
        reader.settle().await.unwrap();
        reader
    }

    /// Page store index as persisted, read back at `scale`
    pub fn cached_pages(&self, scale: f32) -> Vec<u32> {
        PageStore::open(self.storage.clone(), usize::MAX, scale)
            .pages()
            .map(PageNumber::get)
            .collect()
    }
}
