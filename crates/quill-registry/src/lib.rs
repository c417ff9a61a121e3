//! # Quill Contributor Registry
//!
//! Membership of proposals: who contributes, with which role
//! (EDITOR < MAINTAINER < OWNER) and in which state (PENDING, ACTIVE,
//! REMOVED). Every change is serialized per proposal and committed together
//! with its publish snapshot.

mod error;
mod registry;

pub use error::{RegistryError, Result};
pub use registry::ContributorRegistry;
