//! Connection bootstrap for the record store.
//!
//! Every returned connection has `foreign_keys=ON`, a busy timeout, and a
//! fully migrated schema. File databases additionally run in WAL mode.

use super::migrations::{apply_migrations, schema_version};
use super::DbResult;
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    File,
    Memory,
}

impl Target {
    fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Memory => "memory",
        }
    }
}

/// Opens (creating when missing) a database file and migrates it.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    open_target(Target::File, || Connection::open(path))
}

/// Opens a private in-memory database; contents vanish with the connection.
pub fn open_db_in_memory() -> DbResult<Connection> {
    open_target(Target::Memory, Connection::open_in_memory)
}

fn open_target(
    target: Target,
    connect: impl FnOnce() -> rusqlite::Result<Connection>,
) -> DbResult<Connection> {
    let started_at = Instant::now();
    let result = connect()
        .map_err(Into::into)
        .and_then(|mut conn| prepare(target, &mut conn).map(|()| conn));

    match result {
        Ok(conn) => {
            info!(
                "event=db_open module=db status=ok target={} schema_version={} duration_ms={}",
                target.as_str(),
                schema_version(&conn).unwrap_or_default(),
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error target={} duration_ms={} error_code={} error={}",
                target.as_str(),
                started_at.elapsed().as_millis(),
                err.code(),
                err
            );
            Err(err)
        }
    }
}

fn prepare(target: Target, conn: &mut Connection) -> DbResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    if target == Target::File {
        // journal_mode answers with a row, so it cannot go through execute_batch.
        conn.query_row("PRAGMA journal_mode = WAL;", [], |_| Ok(()))?;
    }
    apply_migrations(conn)
}
