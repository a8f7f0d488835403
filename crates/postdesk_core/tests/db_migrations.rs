use postdesk_core::db::migrations::{current_version, latest_version};
use postdesk_core::db::{open_db, open_db_in_memory, DbError, IN_MEMORY_PATH};
use rusqlite::Connection;

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().expect("in-memory db should open");

    assert_eq!(current_version(&conn).unwrap(), latest_version());
    assert_table_exists(&conn, "posts");
    assert_index_exists(&conn, "posts_slug_unique");
}

#[test]
fn memory_path_opens_in_memory_database() {
    let conn = open_db(IN_MEMORY_PATH).unwrap();
    assert_eq!(current_version(&conn).unwrap(), latest_version());
    assert!(!std::path::Path::new(IN_MEMORY_PATH).exists());
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let path = dir.path().join("postdesk.sqlite3");

    let conn_first = open_db(&path).unwrap();
    conn_first
        .execute(
            "INSERT INTO posts (title, slug, content) VALUES ('Kept', 'kept', 'survives reopen');",
            [],
        )
        .unwrap();
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(current_version(&conn_second).unwrap(), latest_version());
    let rows: i64 = conn_second
        .query_row("SELECT COUNT(*) FROM posts;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(rows, 1);
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let path = dir.path().join("future.sqlite3");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    match open_db(&path).unwrap_err() {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn slug_column_is_unique_at_storage_level() {
    let conn = open_db_in_memory().expect("in-memory db should open");
    conn.execute(
        "INSERT INTO posts (title, slug, content) VALUES ('A', 'same', 'first');",
        [],
    )
    .unwrap();

    let duplicate = conn.execute(
        "INSERT INTO posts (title, slug, content) VALUES ('B', 'same', 'second');",
        [],
    );
    assert!(duplicate.is_err());
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    assert_schema_object(conn, "table", table_name);
}

fn assert_index_exists(conn: &Connection, index_name: &str) {
    assert_schema_object(conn, "index", index_name);
}

fn assert_schema_object(conn: &Connection, kind: &str, name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = ?1 AND name = ?2
            );",
            [kind, name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "{kind} {name} does not exist");
}
