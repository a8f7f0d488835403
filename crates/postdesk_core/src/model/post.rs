//! Post domain model.
//!
//! # Responsibility
//! - Define the canonical blog post record.
//! - Enforce publish-state transitions locally.
//!
//! # Invariants
//! - `id` is assigned by the store and never changes afterwards.
//! - `slug` is only changed through allocator output supplied by the store.
//! - `is_published == true` implies `published_at.is_some()`.
//! - `publish()` leaves an unpublished post with a stale `published_at`
//!   untouched.

use crate::slug::{derive_slug, is_valid_slug};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Store-assigned primary key.
pub type PostId = i64;

/// Upper bound for `title`, in characters.
pub const TITLE_MAX_CHARS: usize = 255;

/// Validation errors for post write paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostValidationError {
    EmptyTitle,
    TitleTooLong { max_chars: usize, actual_chars: usize },
    InvalidSlug(String),
}

impl Display for PostValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyTitle => write!(f, "title cannot be empty"),
            Self::TitleTooLong {
                max_chars,
                actual_chars,
            } => write!(
                f,
                "title may not be greater than {max_chars} characters, got {actual_chars}"
            ),
            Self::InvalidSlug(slug) => write!(f, "slug `{slug}` is not lowercase kebab-case"),
        }
    }
}

impl Error for PostValidationError {}

/// Canonical blog post record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    /// `None` until the store persists the post.
    pub id: Option<PostId>,
    pub title: String,
    /// Unique across all posts.
    pub slug: String,
    pub content: String,
    pub is_published: bool,
    pub published_at: Option<DateTime<Utc>>,
    /// Maintained by the store; `None` on unsaved drafts.
    pub created_at: Option<DateTime<Utc>>,
    /// Maintained by the store; `None` on unsaved drafts.
    pub updated_at: Option<DateTime<Utc>>,
}

impl Post {
    /// Creates an unsaved, unpublished post with a base slug derived from
    /// `title`.
    ///
    /// The slug is a candidate only; the store resolves collisions before
    /// persisting.
    pub fn draft(title: impl Into<String>, content: impl Into<String>) -> Self {
        let title = title.into();
        let slug = derive_slug(&title);
        Self {
            id: None,
            title,
            slug,
            content: content.into(),
            is_published: false,
            published_at: None,
            created_at: None,
            updated_at: None,
        }
    }

    /// Sets title and slug together. Slug computation belongs to the caller.
    pub fn set_title_and_slug(&mut self, title: impl Into<String>, slug: impl Into<String>) {
        self.title = title.into();
        self.slug = slug.into();
    }

    /// Replaces the slug with an allocator-provided value.
    pub fn assign_slug(&mut self, slug: impl Into<String>) {
        self.slug = slug.into();
    }

    pub fn set_content(&mut self, content: impl Into<String>) {
        self.content = content.into();
    }

    /// Returns whether the post is in the "not yet published" state.
    ///
    /// Both the flag and the timestamp must be unset.
    pub fn is_publish_pending(&self) -> bool {
        !self.is_published && self.published_at.is_none()
    }

    /// Publishes the post at `now` when it is not yet published.
    ///
    /// Returns `true` when state changed. Calling it on an already published
    /// post, or on an unpublished post that still carries `published_at`, is
    /// a no-op.
    pub fn publish(&mut self, now: DateTime<Utc>) -> bool {
        if !self.is_publish_pending() {
            return false;
        }
        self.is_published = true;
        self.published_at = Some(now);
        true
    }

    /// Clears publish state unconditionally.
    pub fn unpublish(&mut self) {
        self.is_published = false;
        self.published_at = None;
    }

    /// Validates write-path invariants.
    pub fn validate(&self) -> Result<(), PostValidationError> {
        if self.title.trim().is_empty() {
            return Err(PostValidationError::EmptyTitle);
        }

        let actual_chars = self.title.chars().count();
        if actual_chars > TITLE_MAX_CHARS {
            return Err(PostValidationError::TitleTooLong {
                max_chars: TITLE_MAX_CHARS,
                actual_chars,
            });
        }

        if !is_valid_slug(&self.slug) {
            return Err(PostValidationError::InvalidSlug(self.slug.clone()));
        }

        Ok(())
    }
}
