//! # Quill Node
//!
//! A single-process Quill deployment: the proposal engine, contributor
//! registry and pull request manager over the in-memory store, an axum HTTP
//! API in front of them, and a background worker publishing proposal
//! snapshots to the search index.
//!
//! ```text
//!   HTTP API (axum) ──> VersionControlEngine ─┐
//!                   ──> PullRequestManager  ──┼──> ProposalStore (+ outbox)
//!                   ──> ContributorRegistry ──┘          │
//!                                                        v
//!                                   SyncWorker ──> PublishSync ──> SearchIndex
//! ```
//!
//! ## Modules
//!
//! - [`api`] - Proposal, commit and contributor endpoints
//! - [`collaboration_api`] - Pull request endpoints
//! - [`search_api`] - Search and sync administration endpoints
//! - [`config`] - Node configuration
//! - [`node`] - Component wiring and server lifecycle
//! - [`observability`] - Structured logging

pub mod api;
pub mod collaboration_api;
pub mod config;
pub mod node;
pub mod observability;
pub mod search_api;

pub use node::Node;
