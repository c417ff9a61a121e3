//! Proposal storage for Quill.
//!
//! This crate is the persistence port of the engine: an append-only,
//! content-addressed commit graph per proposal, mutable branch-head pointers,
//! proposal / contributor / pull-request records and the outbox of pending
//! search-index notifications.
//!
//! All writes go through [`ProposalStore::apply`], which applies a
//! [`WriteBatch`] atomically: either every write lands (branch heads advanced,
//! commits recorded, outbox rows enqueued) or none does. Branch-head updates
//! carry the head they expect to replace, so a batch built from a stale read
//! is rejected with [`StorageError::HeadMoved`].

mod batch;
mod error;
mod lock;
mod memory;
mod object;
mod outbox;
mod query;
mod refs;
mod traits;

pub use batch::{BatchView, BranchUpdate, WriteBatch};
pub use error::StorageError;
pub use lock::ProposalLocks;
pub use memory::MemoryStore;
pub use object::{Blob, Commit};
pub use outbox::{NewOutboxEntry, OutboxKind, OutboxRecord, OutboxStatus};
pub use query::{Cursor, Page, ProposalQuery, SortKey, SortOrder, DEFAULT_LIMIT, MAX_LIMIT};
pub use refs::Branch;
pub use traits::{Applied, IdSpace, ProposalStore};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
