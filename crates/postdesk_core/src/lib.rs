//! Core domain logic for postdesk.
//! This crate is the single source of truth for post invariants and slug
//! allocation.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod slug;

pub use logging::{default_log_level, init_logging, logging_status, LoggingConfig};
pub use model::post::{Post, PostId, PostValidationError};
pub use repo::post_repo::{PostRepository, RepoError, RepoResult, SqlitePostRepository};
pub use service::post_service::{PostPatch, PostService, PostServiceError};
pub use slug::{derive_slug, next_slug};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
