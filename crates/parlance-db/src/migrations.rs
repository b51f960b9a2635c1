//! Schema migrations compiled into the binary.
//!
//! Applied migrations are recorded by name in `_parlance_migrations`. Each
//! pending migration and its record are committed together, so a failure
//! leaves neither behind.

use rusqlite::{Connection, Transaction};
use std::collections::HashSet;
use thiserror::Error;

type Migration = (&'static str, &'static str);

/// Ordered `(name, sql)` pairs. Append only; never edit a released entry.
const MIGRATIONS: &[Migration] = &[
    (
        "000_conversations",
        include_str!("migrations/000_conversations.sql"),
    ),
    (
        "001_conversation_messages",
        include_str!("migrations/001_conversation_messages.sql"),
    ),
];

const TRACKING_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS _parlance_migrations (
    name TEXT PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
)";

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("cannot read applied migrations: {0}")]
    Tracking(#[source] rusqlite::Error),

    #[error("migration {name} failed: {source}")]
    Apply {
        name: &'static str,
        #[source]
        source: rusqlite::Error,
    },
}

/// Brings the schema up to date.
///
/// Returns how many migrations this call applied; zero when the database is
/// already current.
///
/// # Errors
///
/// Returns `MigrationError::Tracking` if the bookkeeping table cannot be
/// created or read, and `MigrationError::Apply` naming the first migration
/// that failed. Migrations before it stay applied.
pub fn run_migrations(conn: &Connection) -> Result<usize, MigrationError> {
    apply_pending(conn, MIGRATIONS)
}

fn applied_names(conn: &Connection) -> rusqlite::Result<HashSet<String>> {
    conn.execute_batch(TRACKING_TABLE_SQL)?;
    let mut stmt = conn.prepare("SELECT name FROM _parlance_migrations")?;
    let names = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<HashSet<String>>>()?;
    Ok(names)
}

fn apply_one(tx: &Transaction<'_>, (name, sql): Migration) -> rusqlite::Result<()> {
    tx.execute_batch(sql)?;
    tx.execute("INSERT INTO _parlance_migrations (name) VALUES (?1)", [name])?;
    Ok(())
}

fn apply_pending(conn: &Connection, migrations: &[Migration]) -> Result<usize, MigrationError> {
    let done = applied_names(conn).map_err(MigrationError::Tracking)?;

    let pending: Vec<Migration> = migrations
        .iter()
        .copied()
        .filter(|(name, _)| !done.contains(*name))
        .collect();

    for &migration in &pending {
        let name = migration.0;
        tracing::info!(migration = name, "applying schema migration");

        conn.unchecked_transaction()
            .and_then(|tx| {
                apply_one(&tx, migration)?;
                tx.commit()
            })
            .map_err(|source| MigrationError::Apply { name, source })?;
    }

    if pending.is_empty() {
        tracing::debug!("schema is current");
    }
    Ok(pending.len())
}
