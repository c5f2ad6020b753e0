//! Catalogue schema definition and versioning.
//!
//! Schema is applied with a single `execute_batch` the way the pack's
//! SQLite catalog creates its tables, plus a `schema_meta` row recording
//! the applied version so a future schema change can detect and migrate
//! an older database file instead of silently reinterpreting its columns.

use rusqlite::{Connection, OptionalExtension};

use crate::error::{EpidError, EpidResult};

/// Current schema version, encoded as `major * 1000 + minor`. A reader
/// refuses to open a database whose major component is newer than its own
/// (§6: "an older reader must refuse an unknown major-version schema");
/// minor-version bumps are migrated forward idempotently at open time.
pub const SCHEMA_VERSION: i64 = 1_000;

fn major(version: i64) -> i64 {
    version / 1000
}

pub fn migrate(conn: &Connection) -> EpidResult<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;

        CREATE TABLE IF NOT EXISTS schema_meta (
            id INTEGER PRIMARY KEY CHECK (id = 0),
            version INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS labelled_entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            series TEXT NOT NULL,
            season TEXT NOT NULL,
            episode TEXT NOT NULL,
            episode_name TEXT,
            original_text TEXT NOT NULL,
            no_timecodes_text TEXT NOT NULL,
            no_html_text TEXT NOT NULL,
            clean_text TEXT NOT NULL,
            original_hash TEXT NOT NULL,
            no_timecodes_hash TEXT NOT NULL,
            no_html_hash TEXT NOT NULL,
            clean_hash TEXT NOT NULL UNIQUE,
            embedding BLOB
        );

        CREATE INDEX IF NOT EXISTS idx_labelled_entries_series_season
            ON labelled_entries (LOWER(series), season);
        "#,
    )?;

    let existing: Option<i64> = conn
        .query_row("SELECT version FROM schema_meta WHERE id = 0", [], |r| r.get(0))
        .optional()?;

    if let Some(found) = existing {
        if major(found) > major(SCHEMA_VERSION) {
            return Err(EpidError::invalid_input(format!(
                "catalogue schema version {found} is newer than this build supports ({SCHEMA_VERSION})"
            )));
        }
    }

    conn.execute(
        "INSERT INTO schema_meta (id, version) VALUES (0, ?1)
         ON CONFLICT(id) DO UPDATE SET version = excluded.version",
        [SCHEMA_VERSION],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
        let version: i64 = conn
            .query_row("SELECT version FROM schema_meta WHERE id = 0", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn future_major_version_is_refused() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        conn.execute("UPDATE schema_meta SET version = ?1", [SCHEMA_VERSION + 5000])
            .unwrap();
        let err = migrate(&conn).unwrap_err();
        assert!(matches!(err, EpidError::InvalidInput(_)));
    }
}
