//! Domain model for blog posts.
//!
//! # Responsibility
//! - Define canonical data structures used by core business logic.
//!
//! # Invariants
//! - Every persisted post is identified by a store-assigned `PostId`.
//! - Deletion is permanent; there is no tombstone state.

pub mod post;
