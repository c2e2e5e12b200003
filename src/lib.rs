pub mod bookmark;
pub mod debounce;
pub mod error;
pub mod notification;
pub mod panic_handler;
pub mod reader;
pub mod retry;
pub mod settings;
pub mod storage;
pub mod sync;

#[cfg(feature = "pdf")]
pub mod pdf;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use error::{BookmarkError, DocumentError, ReaderError, StorageError, ValidationError};
pub use reader::{GoTo, Outcome, PageChanged, PageNumber, Reader, ReaderConfig, ReaderParts};
