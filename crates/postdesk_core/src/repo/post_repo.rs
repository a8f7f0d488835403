//! Post repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide CRUD and slug/title probes over canonical `posts` storage.
//! - Keep SQL details, transactions and unique-constraint handling inside the
//!   persistence boundary.
//!
//! # Invariants
//! - Write paths must call `Post::validate()` before SQL mutations.
//! - A `UNIQUE` violation on `posts.slug` surfaces as
//!   `RepoError::SlugConflict`, never as a raw SQLite error.
//! - Read paths reject invalid persisted state instead of masking it.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::post::{Post, PostId, PostValidationError};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, Row, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};

const POST_SELECT_SQL: &str = "SELECT
    id,
    title,
    slug,
    content,
    is_published,
    published_at,
    created_at,
    updated_at
FROM posts";

const REQUIRED_POST_COLUMNS: [&str; 8] = [
    "id",
    "title",
    "slug",
    "content",
    "is_published",
    "published_at",
    "created_at",
    "updated_at",
];

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for post persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(PostValidationError),
    Db(DbError),
    NotFound(PostId),
    /// Another row already holds this slug.
    SlugConflict(String),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "post not found: {id}"),
            Self::SlugConflict(slug) => write!(f, "slug already taken: {slug}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "post repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "post repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "post repository requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted post data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<PostValidationError> for RepoError {
    fn from(value: PostValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Repository interface for post persistence.
pub trait PostRepository {
    /// Runs `op` inside one write transaction.
    ///
    /// Everything `op` wrote is rolled back when it returns an error. `E` lets
    /// callers fail with their own error type from inside the transaction.
    fn atomically<T, E, F>(&self, op: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<RepoError>;
    /// Inserts a new post and returns the store-assigned id.
    fn insert_post(&self, post: &Post) -> RepoResult<PostId>;
    /// Overwrites all mutable columns of an existing post.
    fn update_post(&self, post: &Post) -> RepoResult<()>;
    fn get_post(&self, id: PostId) -> RepoResult<Option<Post>>;
    /// Finds the post holding exactly `slug`, ignoring `exclude_id`.
    fn find_post_by_slug(&self, slug: &str, exclude_id: Option<PostId>)
        -> RepoResult<Option<Post>>;
    /// Returns whether any post other than `exclude_id` has this exact title.
    fn title_taken(&self, title: &str, exclude_id: Option<PostId>) -> RepoResult<bool>;
    /// Lists all posts in insertion order.
    fn list_posts(&self) -> RepoResult<Vec<Post>>;
    /// Permanently removes a post.
    fn delete_post(&self, id: PostId) -> RepoResult<()>;
}

/// SQLite-backed post repository.
pub struct SqlitePostRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqlitePostRepository<'conn> {
    /// Constructs a repository from a migrated/ready connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_post_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl PostRepository for SqlitePostRepository<'_> {
    fn atomically<T, E, F>(&self, op: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<RepoError>,
    {
        // IMMEDIATE takes the write lock up front, so probes and the
        // following write see the same snapshot.
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)
            .map_err(RepoError::from)?;
        let value = op(self)?;
        tx.commit().map_err(RepoError::from)?;
        Ok(value)
    }

    fn insert_post(&self, post: &Post) -> RepoResult<PostId> {
        post.validate()?;

        self.conn
            .execute(
                "INSERT INTO posts (
                    title,
                    slug,
                    content,
                    is_published,
                    published_at
                ) VALUES (?1, ?2, ?3, ?4, ?5);",
                params![
                    post.title.as_str(),
                    post.slug.as_str(),
                    post.content.as_str(),
                    bool_to_int(post.is_published),
                    post.published_at.map(|at| at.timestamp_millis()),
                ],
            )
            .map_err(|err| map_slug_conflict(err, &post.slug))?;

        Ok(self.conn.last_insert_rowid())
    }

    fn update_post(&self, post: &Post) -> RepoResult<()> {
        post.validate()?;
        let id = post
            .id
            .ok_or_else(|| RepoError::InvalidData("cannot update an unsaved post".to_string()))?;

        let changed = self
            .conn
            .execute(
                "UPDATE posts
                 SET
                    title = ?1,
                    slug = ?2,
                    content = ?3,
                    is_published = ?4,
                    published_at = ?5,
                    updated_at = (CAST(strftime('%s', 'now') AS INTEGER) * 1000)
                 WHERE id = ?6;",
                params![
                    post.title.as_str(),
                    post.slug.as_str(),
                    post.content.as_str(),
                    bool_to_int(post.is_published),
                    post.published_at.map(|at| at.timestamp_millis()),
                    id,
                ],
            )
            .map_err(|err| map_slug_conflict(err, &post.slug))?;

        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }

        Ok(())
    }

    fn get_post(&self, id: PostId) -> RepoResult<Option<Post>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{POST_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_post_row(row)?));
        }

        Ok(None)
    }

    fn find_post_by_slug(
        &self,
        slug: &str,
        exclude_id: Option<PostId>,
    ) -> RepoResult<Option<Post>> {
        let mut stmt = self.conn.prepare(&format!(
            "{POST_SELECT_SQL}
             WHERE slug = ?1
               AND (?2 IS NULL OR id <> ?2)
             ORDER BY id ASC
             LIMIT 1;"
        ))?;
        let mut rows = stmt.query(params![slug, exclude_id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_post_row(row)?));
        }

        Ok(None)
    }

    fn title_taken(&self, title: &str, exclude_id: Option<PostId>) -> RepoResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM posts
                WHERE title = ?1
                  AND (?2 IS NULL OR id <> ?2)
            );",
            params![title, exclude_id],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    fn list_posts(&self) -> RepoResult<Vec<Post>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{POST_SELECT_SQL} ORDER BY id ASC;"))?;
        let mut rows = stmt.query([])?;
        let mut posts = Vec::new();
        while let Some(row) = rows.next()? {
            posts.push(parse_post_row(row)?);
        }

        Ok(posts)
    }

    fn delete_post(&self, id: PostId) -> RepoResult<()> {
        let changed = self.conn.execute("DELETE FROM posts WHERE id = ?1;", [id])?;
        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }

        Ok(())
    }
}

fn map_slug_conflict(err: rusqlite::Error, slug: &str) -> RepoError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::ConstraintViolation
                && failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            RepoError::SlugConflict(slug.to_string())
        }
        _ => err.into(),
    }
}

fn parse_post_row(row: &Row<'_>) -> RepoResult<Post> {
    let id: PostId = row.get("id")?;

    let is_published = match row.get::<_, i64>("is_published")? {
        0 => false,
        1 => true,
        other => {
            return Err(RepoError::InvalidData(format!(
                "invalid is_published value `{other}` in posts.is_published for post {id}"
            )));
        }
    };

    let published_at = match row.get::<_, Option<i64>>("published_at")? {
        Some(millis) => Some(millis_to_datetime(millis, "published_at")?),
        None => None,
    };

    Ok(Post {
        id: Some(id),
        title: row.get("title")?,
        slug: row.get("slug")?,
        content: row.get("content")?,
        is_published,
        published_at,
        created_at: Some(millis_to_datetime(row.get("created_at")?, "created_at")?),
        updated_at: Some(millis_to_datetime(row.get("updated_at")?, "updated_at")?),
    })
}

fn millis_to_datetime(millis: i64, column: &'static str) -> RepoResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid timestamp `{millis}` in posts.{column}"))
    })
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

fn ensure_post_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    if !table_exists(conn, "posts")? {
        return Err(RepoError::MissingRequiredTable("posts"));
    }

    for column in REQUIRED_POST_COLUMNS {
        if !table_has_column(conn, "posts", column)? {
            return Err(RepoError::MissingRequiredColumn {
                table: "posts",
                column,
            });
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> RepoResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}
