//! Schema migration system.
//!
//! Migrations are static SQL strings keyed by version number. The current
//! version is tracked in a `_migrations` table so migrations are idempotent
//! and only run once.

use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};

/// A single migration definition.
struct Migration {
    /// Monotonically increasing version number (1, 2, 3, ...).
    version: u32,
    /// Human-readable description.
    description: &'static str,
    /// Raw SQL to execute. May contain multiple statements separated by `;`.
    sql: &'static str,
}

/// All migrations in order. Add new migrations to the end of this array.
///
/// The `storage.expiration` default and the `quantity` default are the
/// persistence sentinels for "no expiration" and "no quantity tracked";
/// they keep the (user, name, expiration) merge key well-defined. The
/// public API never exposes them.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "initial schema — users, shopping, ideas, storage, menus",
        sql: r#"
            CREATE TABLE users (
                uid      INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                email    TEXT NOT NULL UNIQUE,
                password TEXT NOT NULL,
                token    TEXT
            );

            CREATE TABLE shopping (
                user INTEGER NOT NULL REFERENCES users(uid) ON DELETE CASCADE,
                id   INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                UNIQUE (user, name)
            );
            CREATE INDEX idx_shopping_user ON shopping(user);

            CREATE TABLE ideas (
                user INTEGER NOT NULL REFERENCES users(uid) ON DELETE CASCADE,
                id   INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                UNIQUE (user, name)
            );
            CREATE INDEX idx_ideas_user ON ideas(user);

            CREATE TABLE storage (
                user       INTEGER NOT NULL REFERENCES users(uid) ON DELETE CASCADE,
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                name       TEXT NOT NULL,
                expiration TEXT NOT NULL DEFAULT '2004-02-05',
                quantity   INTEGER NOT NULL DEFAULT 0,
                UNIQUE (user, name, expiration)
            );
            CREATE INDEX idx_storage_user ON storage(user);

            CREATE TABLE menus (
                user    INTEGER NOT NULL REFERENCES users(uid) ON DELETE CASCADE,
                mid     INTEGER NOT NULL,
                content TEXT NOT NULL,
                prev    INTEGER,
                next    INTEGER,
                PRIMARY KEY (user, mid)
            );
        "#,
    },
    Migration {
        version: 2,
        description: "newsletter opt-in flag on users",
        sql: r#"
            ALTER TABLE users ADD COLUMN newsletter BOOLEAN DEFAULT 1;
        "#,
    },
];

// ── public API ───────────────────────────────────────────────────────

/// Run all pending migrations against `conn`.
///
/// This is a **synchronous** function — call it from `spawn_blocking`.
pub fn run_all(conn: &Connection) -> StoreResult<()> {
    ensure_migrations_table(conn)?;

    let current = current_version(conn)?;
    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > current).collect();

    if pending.is_empty() {
        debug!(current_version = current, "database schema is up to date");
        return Ok(());
    }

    info!(
        current_version = current,
        pending = pending.len(),
        "running pending migrations"
    );

    for migration in pending {
        apply(conn, migration)?;
    }

    Ok(())
}

/// Return the latest applied migration version, or 0 if none.
pub fn current_version(conn: &Connection) -> StoreResult<u32> {
    let version: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM _migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| StoreError::Migration {
            version: 0,
            message: format!("failed to read current version: {e}"),
        })?;
    Ok(version)
}

// ── internals ────────────────────────────────────────────────────────

fn ensure_migrations_table(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version     INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at  INTEGER NOT NULL
        );",
    )
    .map_err(|e| StoreError::Migration {
        version: 0,
        message: format!("failed to create _migrations table: {e}"),
    })?;
    Ok(())
}

/// Apply a single migration inside a transaction.
fn apply(conn: &Connection, migration: &Migration) -> StoreResult<()> {
    info!(
        version = migration.version,
        description = migration.description,
        "applying migration"
    );

    conn.execute_batch("BEGIN IMMEDIATE;")
        .map_err(|e| StoreError::Migration {
            version: migration.version,
            message: format!("failed to begin transaction: {e}"),
        })?;

    let result = (|| -> StoreResult<()> {
        conn.execute_batch(migration.sql)
            .map_err(|e| StoreError::Migration {
                version: migration.version,
                message: format!("SQL execution failed: {e}"),
            })?;

        let now = chrono::Utc::now().timestamp();
        conn.execute(
            "INSERT INTO _migrations (version, description, applied_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![migration.version, migration.description, now],
        )
        .map_err(|e| StoreError::Migration {
            version: migration.version,
            message: format!("failed to record migration: {e}"),
        })?;

        Ok(())
    })();

    match &result {
        Ok(()) => {
            conn.execute_batch("COMMIT;")
                .map_err(|e| StoreError::Migration {
                    version: migration.version,
                    message: format!("failed to commit: {e}"),
                })?;
        }
        Err(err) => {
            warn!(version = migration.version, %err, "migration failed, rolling back");
            let _ = conn.execute_batch("ROLLBACK;");
        }
    }

    result
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// The expected latest migration version (update when adding migrations).
    const LATEST_VERSION: u32 = 2;

    fn setup_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "foreign_keys", "ON").unwrap();
        conn
    }

    #[test]
    fn migrations_are_ordered() {
        for window in MIGRATIONS.windows(2) {
            assert!(
                window[1].version > window[0].version,
                "migration versions must be strictly increasing: {} >= {}",
                window[0].version,
                window[1].version,
            );
        }
    }

    #[test]
    fn run_all_on_fresh_db() {
        let conn = setup_conn();
        run_all(&conn).unwrap();

        assert_eq!(current_version(&conn).unwrap(), LATEST_VERSION);
    }

    #[test]
    fn run_all_is_idempotent() {
        let conn = setup_conn();
        run_all(&conn).unwrap();
        run_all(&conn).unwrap();

        assert_eq!(current_version(&conn).unwrap(), LATEST_VERSION);
    }

    #[test]
    fn migrations_create_all_tables() {
        let conn = setup_conn();
        run_all(&conn).unwrap();

        let tables: Vec<String> = {
            let mut stmt = conn
                .prepare(
                    "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE '\\_%' ESCAPE '\\' ORDER BY name",
                )
                .unwrap();
            stmt.query_map([], |row| row.get(0))
                .unwrap()
                .map(|r| r.unwrap())
                .collect()
        };

        for table in ["users", "shopping", "ideas", "storage", "menus"] {
            assert!(tables.contains(&table.to_string()), "missing {table}");
        }
    }

    #[test]
    fn user_deletion_cascades() {
        let conn = setup_conn();
        run_all(&conn).unwrap();

        conn.execute(
            "INSERT INTO users (username, email, password) VALUES ('ada', 'ada@example.com', 'x')",
            [],
        )
        .unwrap();
        let uid = conn.last_insert_rowid();

        conn.execute(
            "INSERT INTO shopping (user, name) VALUES (?1, 'bread')",
            rusqlite::params![uid],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO storage (user, name) VALUES (?1, 'flour')",
            rusqlite::params![uid],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO menus (user, mid, content) VALUES (?1, 1, ';;;;;;;;;;;;;')",
            rusqlite::params![uid],
        )
        .unwrap();

        conn.execute("DELETE FROM users WHERE uid = ?1", rusqlite::params![uid])
            .unwrap();

        for table in ["shopping", "storage", "menus"] {
            let count: i64 = conn
                .query_row(&format!("SELECT count(*) FROM {table}"), [], |row| {
                    row.get(0)
                })
                .unwrap();
            assert_eq!(count, 0, "{table} rows should cascade away");
        }
    }

    #[test]
    fn storage_merge_key_includes_expiration() {
        let conn = setup_conn();
        run_all(&conn).unwrap();

        conn.execute(
            "INSERT INTO users (username, email, password) VALUES ('ada', 'ada@example.com', 'x')",
            [],
        )
        .unwrap();
        let uid = conn.last_insert_rowid();

        // Same name with a different expiration is a distinct row; the
        // same (name, expiration) pair is rejected by the unique key.
        conn.execute(
            "INSERT INTO storage (user, name, expiration) VALUES (?1, 'milk', '2024-05-01')",
            rusqlite::params![uid],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO storage (user, name, expiration) VALUES (?1, 'milk', '2024-06-01')",
            rusqlite::params![uid],
        )
        .unwrap();
        let duplicate = conn.execute(
            "INSERT INTO storage (user, name, expiration) VALUES (?1, 'milk', '2024-05-01')",
            rusqlite::params![uid],
        );
        assert!(duplicate.is_err());
    }
}
