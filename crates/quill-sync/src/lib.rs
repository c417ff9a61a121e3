//! Publish synchronization for Quill.
//!
//! Keeps the denormalized search index eventually consistent with the
//! canonical proposal store through an outbox:
//!
//! - [`Outbox`] is the staging half. Every mutating component calls
//!   [`Outbox::stage_change`] while building its [`quill_storage::WriteBatch`],
//!   so the snapshot row is committed atomically with the change it describes.
//! - [`PublishSync`] is the delivery half. It reads pending rows, pushes them
//!   to a [`SearchIndex`] with bounded exponential-backoff retries, and marks
//!   rows it cannot deliver as failed, raising an [`AlertSink`] alert.
//! - [`SyncWorker`] runs delivery in the background.

mod alert;
mod error;
mod http;
mod index;
mod outbox;
mod publish;
mod retry;
mod snapshot;
mod worker;

pub use alert::{AlertSink, LogAlertSink, MemoryAlertSink, SyncAlert};
pub use error::SyncError;
pub use http::HttpSearchIndex;
pub use index::{MemorySearchIndex, SearchIndex, SearchOrder, SearchPage, SearchQuery};
pub use outbox::Outbox;
pub use publish::{Delivery, DrainReport, PublishSync, DEFAULT_BATCH_SIZE};
pub use retry::RetryPolicy;
pub use snapshot::{PublishSnapshot, SnapshotContributor};
pub use worker::{SyncWorker, DEFAULT_POLL_INTERVAL};

/// Result type for synchronization operations.
pub type Result<T> = std::result::Result<T, SyncError>;
