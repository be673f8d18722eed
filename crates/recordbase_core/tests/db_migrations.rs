use recordbase_core::db::{
    latest_version, open_db, open_db_in_memory, schema_version as stored_version, DbError,
};
use rusqlite::Connection;

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    for table in [
        "users",
        "modules",
        "fields",
        "records",
        "record_history",
        "record_views",
        "record_images",
        "record_documents",
        "record_links",
        "user_groups",
        "user_group_members",
        "user_group_modules",
        "user_group_menu_items",
        "module_permissions",
    ] {
        assert_table_exists(&conn, table);
    }
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("recordbase.db");

    let conn_first = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_first), latest_version());
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    assert_table_exists(&conn_second, "records");
}

#[test]
fn file_databases_use_wal_journal() {
    let dir = tempfile::tempdir().unwrap();
    let conn = open_db(dir.path().join("wal.db")).unwrap();
    let mode: String = conn
        .query_row("PRAGMA journal_mode;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(mode, "wal");
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    match err {
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
fn foreign_keys_are_enforced() {
    let conn = open_db_in_memory().unwrap();
    let enabled: i64 = conn
        .query_row("PRAGMA foreign_keys;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(enabled, 1);

    let err = conn
        .execute(
            "INSERT INTO records (module_id, name, status, data) VALUES (4242, 'x', 'open', '{}');",
            [],
        )
        .unwrap_err();
    assert!(err.to_string().contains("FOREIGN KEY"));
}

#[test]
fn history_rows_cannot_be_rewritten() {
    let conn = open_db_in_memory().unwrap();
    conn.execute_batch(
        "INSERT INTO modules (name, display_name) VALUES ('tickets', 'Tickets');
         INSERT INTO records (module_id, name, status, data) VALUES (1, 'a', 'open', '{}');
         INSERT INTO record_history (record_id, action, description) VALUES (1, 'note', 'hi');",
    )
    .unwrap();

    let err = conn
        .execute("UPDATE record_history SET description = 'edited';", [])
        .unwrap_err();
    assert!(err.to_string().contains("immutable"), "{err}");
}

#[test]
fn record_module_cannot_change() {
    let conn = open_db_in_memory().unwrap();
    conn.execute_batch(
        "INSERT INTO modules (name, display_name) VALUES ('tickets', 'Tickets');
         INSERT INTO modules (name, display_name) VALUES ('orders', 'Orders');
         INSERT INTO records (module_id, name, status, data) VALUES (1, 'a', 'open', '{}');",
    )
    .unwrap();

    let err = conn
        .execute("UPDATE records SET module_id = 2 WHERE id = 1;", [])
        .unwrap_err();
    assert!(err.to_string().contains("immutable"), "{err}");

    let module_id: i64 = conn
        .query_row("SELECT module_id FROM records WHERE id = 1;", [], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(module_id, 1);

    // Same-value writes pass the trigger.
    conn.execute("UPDATE records SET module_id = 1, name = 'b' WHERE id = 1;", [])
        .unwrap();
}

fn schema_version(conn: &Connection) -> u32 {
    stored_version(conn).unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}
