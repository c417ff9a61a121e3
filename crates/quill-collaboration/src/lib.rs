//! Pull requests for Quill.
//!
//! A contributor proposes their working branch for inclusion in `main` by
//! opening a pull request. The pull request records `main`'s head at that
//! moment; it can only be merged while `main` still points there; otherwise
//! it turns STALE and the contributor opens a new one.

mod error;
mod pull_request;

pub use error::{CollaborationError, Result};
pub use pull_request::PullRequestManager;
