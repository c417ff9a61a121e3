//! Logging for the Quill node.
//!
//! Every crate emits `tracing` events with structured fields (`proposal_id`,
//! `branch`, `commit`, `pull_request_id`, `attempt`); this module installs the
//! subscriber that renders them. HTTP requests are traced by the
//! `tower_http` layer installed in [`crate::api::create_router`].

mod logging;

pub use logging::{default_filter, init_logging};
