//! # Quill Version Control
//!
//! Per-proposal history management:
//!
//! - **Commits**: content edits on `main` or a contributor's working branch,
//!   each advancing the branch head with a compare-and-swap.
//! - **Diff**: line- or word-level structural diffs between commits.
//! - **Merge**: three-way merges with a configurable conflict policy; clean
//!   merges always record a two-parent merge commit.
//! - **Proposals**: creation, titles, votes and archiving.
//!
//! ## Example
//!
//! ```
//! use quill_vcs::{merge3, MergeOptions, MergeOutcome};
//!
//! let base = "intro\nbody\nend\n";
//! let ours = "INTRO\nbody\nend\n";
//! let theirs = "intro\nbody\nEND\n";
//! let options = MergeOptions::default();
//! assert_eq!(
//!     merge3(base, ours, theirs, &options),
//!     MergeOutcome::Clean("INTRO\nbody\nEND\n".to_string())
//! );
//! ```

mod diff;
mod engine;
mod error;
mod graph;
mod merge;
mod proposal;

pub use diff::{diff, tokenize, Diff, Granularity, Hunk};
pub use engine::{MergePlan, MergeResult, VersionControlEngine};
pub use error::{Result, VcsError};
pub use merge::{merge3, ConflictRegion, MergeOptions, MergeOutcome};
pub use tokio_util::sync::CancellationToken;
