//! Post use-case service.
//!
//! # Responsibility
//! - Expose the store contract: `create`, `update`, `find_by_id`, `all`,
//!   `delete`.
//! - Resolve slug collisions before every title write.
//! - Retry allocation when persistence reports a slug conflict.
//!
//! # Invariants
//! - Probes (slug and, when enabled, title) and the write run inside one
//!   repository transaction.
//! - The next slug candidate is computed from the colliding post's slug.
//! - Collision probing and conflict retries are both bounded; running out of
//!   probes is final and never retried.
//! - Omitted update fields keep their previous values.

use crate::model::post::{Post, PostId, PostValidationError};
use crate::repo::post_repo::{PostRepository, RepoError};
use crate::slug::{derive_slug, next_slug};
use chrono::Utc;
use log::warn;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Upper bound on slug probes within one allocation.
pub const MAX_SLUG_PROBES: usize = 1000;
/// Upper bound on whole create/update attempts after persist-time conflicts.
pub const MAX_PERSIST_ATTEMPTS: usize = 5;

/// Service error for post use-cases.
#[derive(Debug)]
pub enum PostServiceError {
    /// Target post does not exist.
    NotFound(PostId),
    /// Entity invariants rejected the write.
    Validation(PostValidationError),
    /// Another post already uses this title (only with unique titles on).
    TitleTaken(String),
    /// No free slug could be allocated within the probe or retry budget.
    SlugAllocationExhausted { slug: String, attempts: usize },
    /// Persistence-layer failure.
    Repo(RepoError),
    /// Internal consistency mismatch between write and read-back.
    InconsistentState(&'static str),
}

impl Display for PostServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "Entity #{id} not found"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::TitleTaken(title) => write!(f, "title `{title}` is already taken"),
            Self::SlugAllocationExhausted { slug, attempts } => write!(
                f,
                "could not allocate a unique slug from `{slug}` after {attempts} attempts"
            ),
            Self::Repo(err) => write!(f, "{err}"),
            Self::InconsistentState(details) => write!(f, "inconsistent post state: {details}"),
        }
    }
}

impl Error for PostServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for PostServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(id) => Self::NotFound(id),
            RepoError::Validation(err) => Self::Validation(err),
            other => Self::Repo(other),
        }
    }
}

/// Partial update input. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostPatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub is_published: Option<bool>,
}

impl PostPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none() && self.is_published.is_none()
    }
}

/// Post service facade over repository implementations.
pub struct PostService<R: PostRepository> {
    repo: R,
    unique_titles: bool,
}

impl<R: PostRepository> PostService<R> {
    /// Creates a service using the provided repository implementation.
    ///
    /// Titles may repeat; slugs stay unique either way.
    pub fn new(repo: R) -> Self {
        Self {
            repo,
            unique_titles: false,
        }
    }

    /// Makes `create` and `update` fail with `TitleTaken` when another post
    /// already has the requested title.
    ///
    /// The title probe shares the write transaction, so it also holds across
    /// connections to the same database file.
    pub fn reject_duplicate_titles(mut self) -> Self {
        self.unique_titles = true;
        self
    }

    /// Lists all posts in insertion order.
    pub fn all(&self) -> Result<Vec<Post>, PostServiceError> {
        Ok(self.repo.list_posts()?)
    }

    /// Gets one post or fails with `NotFound`.
    pub fn find_by_id(&self, id: PostId) -> Result<Post, PostServiceError> {
        self.repo
            .get_post(id)?
            .ok_or(PostServiceError::NotFound(id))
    }

    /// Creates a post with a unique slug derived from `title`.
    pub fn create(
        &self,
        title: &str,
        content: &str,
        published: bool,
    ) -> Result<Post, PostServiceError> {
        let unique_titles = self.unique_titles;
        let id = self.with_conflict_retry(|repo| {
            if unique_titles {
                ensure_title_free(repo, title, None)?;
            }
            let mut post = Post::draft(title, content);
            resolve_unique_slug(repo, &mut post)?;
            apply_publish_flag(&mut post, Some(published));
            Ok(repo.insert_post(&post)?)
        })?;

        self.read_back(id, "created post not found in read-back")
    }

    /// Applies a partial update to an existing post.
    ///
    /// An empty patch writes nothing and returns the stored post.
    pub fn update(&self, id: PostId, patch: &PostPatch) -> Result<Post, PostServiceError> {
        if patch.is_empty() {
            return self.find_by_id(id);
        }

        let unique_titles = self.unique_titles;
        self.with_conflict_retry(|repo| {
            let mut post = repo.get_post(id)?.ok_or(PostServiceError::NotFound(id))?;

            if let Some(title) = patch.title.as_deref() {
                if unique_titles {
                    ensure_title_free(repo, title, Some(id))?;
                }
                post.set_title_and_slug(title, derive_slug(title));
                resolve_unique_slug(repo, &mut post)?;
            }
            if let Some(content) = patch.content.as_deref() {
                post.set_content(content);
            }
            apply_publish_flag(&mut post, patch.is_published);

            repo.update_post(&post)?;
            Ok(id)
        })?;

        self.read_back(id, "updated post not found in read-back")
    }

    /// Permanently deletes a post or fails with `NotFound`.
    pub fn delete(&self, id: PostId) -> Result<(), PostServiceError> {
        Ok(self.repo.delete_post(id)?)
    }

    fn read_back(&self, id: PostId, details: &'static str) -> Result<Post, PostServiceError> {
        self.repo
            .get_post(id)?
            .ok_or(PostServiceError::InconsistentState(details))
    }

    /// Runs one transactional write, starting over when persistence reports
    /// a slug conflict.
    fn with_conflict_retry<F>(&self, mut op: F) -> Result<PostId, PostServiceError>
    where
        F: FnMut(&R) -> Result<PostId, PostServiceError>,
    {
        let mut last_conflict = String::new();
        for attempt in 1..=MAX_PERSIST_ATTEMPTS {
            match self.repo.atomically(|repo| op(repo)) {
                Err(PostServiceError::Repo(RepoError::SlugConflict(slug))) => {
                    warn!(
                        "event=slug_conflict module=store status=retry attempt={} \
                         max_attempts={} slug={}",
                        attempt, MAX_PERSIST_ATTEMPTS, slug
                    );
                    last_conflict = slug;
                }
                other => return other,
            }
        }

        Err(PostServiceError::SlugAllocationExhausted {
            slug: last_conflict,
            attempts: MAX_PERSIST_ATTEMPTS,
        })
    }
}

fn ensure_title_free<R: PostRepository>(
    repo: &R,
    title: &str,
    exclude_id: Option<PostId>,
) -> Result<(), PostServiceError> {
    if repo.title_taken(title, exclude_id)? {
        return Err(PostServiceError::TitleTaken(title.to_string()));
    }
    Ok(())
}

/// Moves `post.slug` forward until no other post holds it.
///
/// The post's own id is excluded, so re-saving a post never collides with
/// itself. The walk is deterministic, so running out of probes ends the
/// allocation instead of feeding the conflict retry.
fn resolve_unique_slug<R: PostRepository>(
    repo: &R,
    post: &mut Post,
) -> Result<(), PostServiceError> {
    for _ in 0..MAX_SLUG_PROBES {
        match repo.find_post_by_slug(&post.slug, post.id)? {
            Some(colliding) => post.assign_slug(next_slug(&colliding.slug)),
            None => return Ok(()),
        }
    }

    Err(PostServiceError::SlugAllocationExhausted {
        slug: post.slug.clone(),
        attempts: MAX_SLUG_PROBES,
    })
}

fn apply_publish_flag(post: &mut Post, published: Option<bool>) {
    match published {
        Some(true) => {
            post.publish(Utc::now());
        }
        Some(false) => post.unpublish(),
        None => {}
    }
}
