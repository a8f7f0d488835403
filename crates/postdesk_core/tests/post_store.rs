use chrono::{Duration, Utc};
use postdesk_core::db::{open_db, open_db_in_memory};
use postdesk_core::{
    PostPatch, PostRepository, PostService, PostServiceError, SqlitePostRepository,
};
use rusqlite::Connection;
use std::collections::HashSet;
use std::sync::{Arc, Barrier};

fn store(conn: &Connection) -> PostService<SqlitePostRepository<'_>> {
    PostService::new(SqlitePostRepository::try_new(conn).expect("repo should accept migrated db"))
}

#[test]
fn create_returns_published_post() {
    let conn = open_db_in_memory().expect("in-memory db should open");
    let service = store(&conn);

    let post = service
        .create("New Post Title", "New post content", true)
        .unwrap();

    assert!(post.id.is_some());
    assert_eq!(post.title, "New Post Title");
    assert_eq!(post.slug, "new-post-title");
    assert_eq!(post.content, "New post content");
    assert!(post.is_published);
    assert!(post.published_at.is_some());
}

#[test]
fn create_unpublished_post_has_no_published_at() {
    let conn = open_db_in_memory().expect("in-memory db should open");
    let service = store(&conn);

    let post = service
        .create("Unpublished Post", "This post is not published", false)
        .unwrap();

    assert_eq!(post.slug, "unpublished-post");
    assert!(!post.is_published);
    assert_eq!(post.published_at, None);
}

#[test]
fn create_then_find_by_id_roundtrip() {
    let conn = open_db_in_memory().expect("in-memory db should open");
    let service = store(&conn);

    let created = service
        .create("Round Trip", "content body", true)
        .unwrap();
    let found = service.find_by_id(created.id.unwrap()).unwrap();

    assert_eq!(found, created);
    assert!(found.is_published);
    assert!(found.published_at.is_some());
}

#[test]
fn create_with_special_characters_in_title() {
    let conn = open_db_in_memory().expect("in-memory db should open");
    let service = store(&conn);

    let post = service
        .create(
            "Post with Special Characters! @#$%",
            "Content with special characters",
            false,
        )
        .unwrap();

    assert_eq!(post.title, "Post with Special Characters! @#$%");
    assert_eq!(post.slug, "post-with-special-characters-at");
}

#[test]
fn duplicate_titles_get_incrementing_slugs() {
    let conn = open_db_in_memory().expect("in-memory db should open");
    let service = store(&conn);

    let slugs: Vec<String> = (0..3)
        .map(|index| {
            service
                .create("Test Post", &format!("post content {index}"), false)
                .unwrap()
                .slug
        })
        .collect();

    assert_eq!(slugs, ["test-post", "test-post-1", "test-post-2"]);
}

#[test]
fn collision_resolution_continues_from_existing_numbered_slug() {
    let conn = open_db_in_memory().expect("in-memory db should open");
    let service = store(&conn);

    service.create("Report", "content body", false).unwrap();
    service.create("Report 1", "content body", false).unwrap();
    service.create("Report 2", "content body", false).unwrap();

    let post = service.create("Report", "content body", false).unwrap();
    assert_eq!(post.slug, "report-3");
}

#[test]
fn update_all_fields() {
    let conn = open_db_in_memory().expect("in-memory db should open");
    let service = store(&conn);

    let original = service
        .create("Original Title", "Original content", false)
        .unwrap();
    let id = original.id.unwrap();

    let updated = service
        .update(
            id,
            &PostPatch {
                title: Some("Updated Title".to_string()),
                content: Some("Updated content".to_string()),
                is_published: Some(true),
            },
        )
        .unwrap();

    assert_eq!(updated.id, Some(id));
    assert_eq!(updated.title, "Updated Title");
    assert_eq!(updated.slug, "updated-title");
    assert_eq!(updated.content, "Updated content");
    assert!(updated.is_published);
    assert!(updated.published_at.is_some());
    assert_eq!(service.find_by_id(id).unwrap(), updated);
}

#[test]
fn update_only_title() {
    let conn = open_db_in_memory().expect("in-memory db should open");
    let service = store(&conn);
    let id = service
        .create("Original Title", "Original content", false)
        .unwrap()
        .id
        .unwrap();

    let updated = service
        .update(
            id,
            &PostPatch {
                title: Some("Updated Title Only".to_string()),
                ..PostPatch::default()
            },
        )
        .unwrap();

    assert_eq!(updated.title, "Updated Title Only");
    assert_eq!(updated.slug, "updated-title-only");
    assert_eq!(updated.content, "Original content");
    assert!(!updated.is_published);
}

#[test]
fn update_only_content() {
    let conn = open_db_in_memory().expect("in-memory db should open");
    let service = store(&conn);
    let id = service
        .create("Original Title", "Original content", false)
        .unwrap()
        .id
        .unwrap();

    let updated = service
        .update(
            id,
            &PostPatch {
                content: Some("Updated content only".to_string()),
                ..PostPatch::default()
            },
        )
        .unwrap();

    assert_eq!(updated.title, "Original Title");
    assert_eq!(updated.slug, "original-title");
    assert_eq!(updated.content, "Updated content only");
    assert!(!updated.is_published);
}

#[test]
fn update_only_published_status() {
    let conn = open_db_in_memory().expect("in-memory db should open");
    let service = store(&conn);
    let id = service
        .create("Original Title", "Original content", false)
        .unwrap()
        .id
        .unwrap();

    let updated = service
        .update(
            id,
            &PostPatch {
                is_published: Some(true),
                ..PostPatch::default()
            },
        )
        .unwrap();

    assert_eq!(updated.title, "Original Title");
    assert_eq!(updated.slug, "original-title");
    assert_eq!(updated.content, "Original content");
    assert!(updated.is_published);
    assert!(updated.published_at.is_some());
}

#[test]
fn republishing_keeps_original_published_at() {
    let conn = open_db_in_memory().expect("in-memory db should open");
    let service = store(&conn);
    let created = service.create("Stable", "content body", true).unwrap();
    let id = created.id.unwrap();

    let republished = service
        .update(
            id,
            &PostPatch {
                is_published: Some(true),
                ..PostPatch::default()
            },
        )
        .unwrap();
    assert_eq!(republished.published_at, created.published_at);
}

#[test]
fn unpublish_clears_published_at() {
    let conn = open_db_in_memory().expect("in-memory db should open");
    let service = store(&conn);
    let id = service
        .create("Live", "content body", true)
        .unwrap()
        .id
        .unwrap();

    let updated = service
        .update(
            id,
            &PostPatch {
                is_published: Some(false),
                ..PostPatch::default()
            },
        )
        .unwrap();
    assert!(!updated.is_published);
    assert_eq!(updated.published_at, None);
}

#[test]
fn publish_leaves_stale_published_at_untouched() {
    let conn = open_db_in_memory().expect("in-memory db should open");
    let repo = SqlitePostRepository::try_new(&conn).expect("repo should accept migrated db");
    let service = store(&conn);
    let id = service
        .create("Stale", "content body", false)
        .unwrap()
        .id
        .unwrap();

    let stale = Utc::now() - Duration::days(1);
    conn.execute(
        "UPDATE posts SET published_at = ?1 WHERE id = ?2",
        (stale.timestamp_millis(), id),
    )
    .unwrap();

    let updated = service
        .update(
            id,
            &PostPatch {
                is_published: Some(true),
                ..PostPatch::default()
            },
        )
        .unwrap();
    assert!(!updated.is_published);
    assert_eq!(
        updated.published_at.map(|at| at.timestamp_millis()),
        Some(stale.timestamp_millis())
    );
    assert_eq!(repo.get_post(id).unwrap().unwrap(), updated);
}

#[test]
fn renaming_to_own_title_keeps_slug() {
    let conn = open_db_in_memory().expect("in-memory db should open");
    let service = store(&conn);
    let id = service
        .create("Same Title", "content body", false)
        .unwrap()
        .id
        .unwrap();

    let updated = service
        .update(
            id,
            &PostPatch {
                title: Some("Same Title".to_string()),
                ..PostPatch::default()
            },
        )
        .unwrap();
    assert_eq!(updated.slug, "same-title");
}

#[test]
fn renaming_onto_taken_slug_allocates_next_one() {
    let conn = open_db_in_memory().expect("in-memory db should open");
    let service = store(&conn);
    service.create("Alpha", "content body", false).unwrap();
    let beta = service.create("Beta", "content body", false).unwrap();

    let updated = service
        .update(
            beta.id.unwrap(),
            &PostPatch {
                title: Some("Alpha".to_string()),
                ..PostPatch::default()
            },
        )
        .unwrap();
    assert_eq!(updated.slug, "alpha-1");
}

#[test]
fn missing_ids_fail_with_not_found() {
    let conn = open_db_in_memory().expect("in-memory db should open");
    let service = store(&conn);

    assert!(matches!(
        service.find_by_id(999),
        Err(PostServiceError::NotFound(999))
    ));
    assert!(matches!(
        service.delete(999),
        Err(PostServiceError::NotFound(999))
    ));
    assert!(matches!(
        service.update(
            999,
            &PostPatch {
                title: Some("Title".to_string()),
                content: Some("Content".to_string()),
                is_published: Some(true),
            }
        ),
        Err(PostServiceError::NotFound(999))
    ));
}

#[test]
fn delete_removes_post() {
    let conn = open_db_in_memory().expect("in-memory db should open");
    let service = store(&conn);
    let keep = service.create("Keep", "content body", false).unwrap();
    let gone = service.create("Gone", "content body", false).unwrap();

    service.delete(gone.id.unwrap()).unwrap();

    let remaining = service.all().unwrap();
    assert_eq!(remaining, vec![keep]);
}

#[test]
fn all_returns_posts_in_insertion_order() {
    let conn = open_db_in_memory().expect("in-memory db should open");
    let service = store(&conn);
    assert!(service.all().unwrap().is_empty());

    service.create("First Post", "content one", true).unwrap();
    service.create("Second Post", "content two", false).unwrap();

    let posts = service.all().unwrap();
    assert_eq!(posts.len(), 2);
    assert_eq!(posts[0].title, "First Post");
    assert_eq!(posts[1].title, "Second Post");
}

#[test]
fn concurrent_creates_with_same_title_get_distinct_slugs() {
    const WRITERS: usize = 4;

    let dir = tempfile::tempdir().expect("temp dir should be created");
    let path = dir.path().join("posts.sqlite3");
    drop(open_db(&path).unwrap());

    let barrier = Arc::new(Barrier::new(WRITERS));
    let handles: Vec<_> = (0..WRITERS)
        .map(|index| {
            let path = path.clone();
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                let conn = open_db(&path).unwrap();
                let service = store(&conn);
                barrier.wait();
                service
                    .create("Race", &format!("writer {index} content"), false)
                    .unwrap()
                    .slug
            })
        })
        .collect();

    let slugs: HashSet<String> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();
    let expected: HashSet<String> = ["race", "race-1", "race-2", "race-3"]
        .into_iter()
        .map(String::from)
        .collect();
    assert_eq!(slugs, expected);
}

#[test]
fn unique_title_store_rejects_duplicates_but_allows_own_title() {
    let conn = open_db_in_memory().expect("in-memory db should open");
    let service = store(&conn).reject_duplicate_titles();
    service.create("Alpha", "content body", false).unwrap();
    let beta = service.create("Beta", "content body", false).unwrap();
    let beta_id = beta.id.unwrap();

    assert!(matches!(
        service.create("Alpha", "other content", false),
        Err(PostServiceError::TitleTaken(ref title)) if title == "Alpha"
    ));

    let rename = PostPatch {
        title: Some("Alpha".to_string()),
        ..PostPatch::default()
    };
    assert!(matches!(
        service.update(beta_id, &rename),
        Err(PostServiceError::TitleTaken(_))
    ));
    assert!(matches!(
        service.update(999, &rename),
        Err(PostServiceError::NotFound(999))
    ));

    let same = PostPatch {
        title: Some("Beta".to_string()),
        ..PostPatch::default()
    };
    assert_eq!(service.update(beta_id, &same).unwrap().slug, "beta");
    assert_eq!(service.all().unwrap().len(), 2);
}

#[test]
fn concurrent_unique_title_creates_admit_exactly_one() {
    const WRITERS: usize = 4;

    let dir = tempfile::tempdir().expect("temp dir should be created");
    let path = dir.path().join("titles.sqlite3");
    drop(open_db(&path).unwrap());

    let barrier = Arc::new(Barrier::new(WRITERS));
    let handles: Vec<_> = (0..WRITERS)
        .map(|index| {
            let path = path.clone();
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                let conn = open_db(&path).unwrap();
                let service = store(&conn).reject_duplicate_titles();
                barrier.wait();
                service
                    .create("Headline", &format!("writer {index} content"), false)
                    .map(|post| post.slug)
            })
        })
        .collect();

    let mut created = Vec::new();
    let mut rejected = 0;
    for handle in handles {
        match handle.join().unwrap() {
            Ok(slug) => created.push(slug),
            Err(PostServiceError::TitleTaken(_)) => rejected += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(created, ["headline"]);
    assert_eq!(rejected, WRITERS - 1);
}
