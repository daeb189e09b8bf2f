//! Synchronization layer
//!
//! Keeps a client-held snapshot converging on the authoritative one. The
//! default strategy re-reads the full snapshot on a timer while any node is
//! in progress and swaps it in only when it differs. There is no merging:
//! the newest full snapshot wins, so a local edit that has not been saved
//! yet is overwritten by the next differing read.

mod error;
mod polling;
mod source;
mod view;

#[allow(unused_imports)]
pub use error::SyncError;
pub use polling::{PollingSync, StopReason, SyncOutcome, SyncStrategy};
pub use source::{HttpSnapshotSource, SnapshotSource};
pub use view::ClientView;
