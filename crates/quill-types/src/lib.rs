//! Common types used throughout Quill.
//!
//! Quill keeps text proposals under version control: every proposal has a
//! `main` branch plus one working branch per contributor, and changes reach
//! `main` through pull requests. This crate holds the plain data records and
//! the policy objects shared by the storage, registry, engine and
//! collaboration crates.

mod branch;
mod contributor;
mod error;
mod hash;
mod id;
mod proposal;
mod pull_request;
mod status;
mod timestamp;

pub use branch::{BranchName, MAIN_BRANCH};
pub use contributor::{Contributor, ContributorRole, ContributorStatus};
pub use error::{ErrorKind, TransitionError};
pub use hash::ObjectId;
pub use id::{ContributorId, ProposalId, PullRequestId, UserId};
pub use proposal::{stats, Proposal, ProposalStatus, TitleChange, UserRef};
pub use pull_request::{PullRequest, PullRequestStatus};
pub use status::{DefaultStatusPolicy, StatusInputs, StatusPolicy};
pub use timestamp::Timestamp;
