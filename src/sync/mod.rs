//! Reading position and bookmark persistence, local and remote

mod progress;
mod remote;

pub use progress::{
    ProgressLoader, ProgressSync, ReadingProgress, SessionSnapshot, SyncOp, SyncOutcome,
};
pub use remote::{RemoteBookmark, RemoteError, RemoteStore, UserId};
