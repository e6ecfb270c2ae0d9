//! The two named lists: shopping and ideas.
//!
//! One engine serves both, parameterized by [`ListKind`]. Entry ids reach
//! this layer as the raw text the web layer collected, so every operation
//! re-parses them; appending a name that is already on the list is a
//! silent no-op, and batch removal is atomic — if any requested id is
//! missing, nothing is removed.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::db::Database;
use crate::error::{StoreError, StoreResult};
use crate::user_store::ensure_user;

// ═══════════════════════════════════════════════════════════════════════
//  Types
// ═══════════════════════════════════════════════════════════════════════

/// Which of the two fixed lists an operation targets. There is no third
/// kind; free-form list names do not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListKind {
    /// The shopping list.
    Shopping,
    /// The recipe-ideas list.
    Ideas,
}

impl ListKind {
    /// The backing table. Table names come from this enum only, never
    /// from caller input.
    fn table(self) -> &'static str {
        match self {
            Self::Shopping => "shopping",
            Self::Ideas => "ideas",
        }
    }
}

impl std::fmt::Display for ListKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.table())
    }
}

/// A single list entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Surrogate numeric id.
    pub id: i64,
    /// Entry text.
    pub name: String,
}

/// Parse an entry id from the raw text the web layer collected.
///
/// Only non-negative decimal integers are accepted.
fn parse_id(raw: &str, message: &'static str) -> StoreResult<i64> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(StoreError::invalid(message));
    }
    raw.parse().map_err(|_| StoreError::invalid(message))
}

// ═══════════════════════════════════════════════════════════════════════
//  ListStore
// ═══════════════════════════════════════════════════════════════════════

/// CRUD operations on the shopping and ideas lists.
#[derive(Clone)]
pub struct ListStore {
    db: Database,
}

impl ListStore {
    /// Create a new list store backed by `db`.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Fetch the whole list, ordered by insertion.
    #[instrument(skip(self))]
    pub async fn get(&self, uid: i64, kind: ListKind) -> StoreResult<Vec<Entry>> {
        self.db
            .execute(move |conn| {
                ensure_user(conn, uid)?;
                let mut stmt = conn.prepare(&format!(
                    "SELECT id, name FROM {} WHERE user = ?1 ORDER BY id",
                    kind.table()
                ))?;
                let entries = stmt
                    .query_map(rusqlite::params![uid], |row| {
                        Ok(Entry {
                            id: row.get(0)?,
                            name: row.get(1)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(entries)
            })
            .await
    }

    /// Fetch a single entry by id.
    #[instrument(skip(self))]
    pub async fn get_entry(&self, uid: i64, kind: ListKind, id: &str) -> StoreResult<Entry> {
        let id = parse_id(id, "invalid element")?;
        self.db
            .execute(move |conn| {
                ensure_user(conn, uid)?;
                let row = conn.query_row(
                    &format!(
                        "SELECT id, name FROM {} WHERE user = ?1 AND id = ?2",
                        kind.table()
                    ),
                    rusqlite::params![uid, id],
                    |row| {
                        Ok(Entry {
                            id: row.get(0)?,
                            name: row.get(1)?,
                        })
                    },
                );
                match row {
                    Ok(entry) => Ok(entry),
                    Err(rusqlite::Error::QueryReturnedNoRows) => {
                        Err(StoreError::invalid("element not in list"))
                    }
                    Err(e) => Err(e.into()),
                }
            })
            .await
    }

    /// Append entries to the list. Empty names are dropped, and names
    /// already on the list are silently ignored — appending is idempotent.
    #[instrument(skip(self, names))]
    pub async fn append(&self, uid: i64, kind: ListKind, names: &[String]) -> StoreResult<()> {
        let names: Vec<String> = names.iter().filter(|n| !n.is_empty()).cloned().collect();
        self.db
            .execute(move |conn| {
                ensure_user(conn, uid)?;
                if names.is_empty() {
                    return Ok(());
                }
                let mut stmt = conn.prepare(&format!(
                    "INSERT OR IGNORE INTO {} (user, name) VALUES (?1, ?2)",
                    kind.table()
                ))?;
                for name in &names {
                    stmt.execute(rusqlite::params![uid, name])?;
                }
                debug!(uid, %kind, appended = names.len(), "list append");
                Ok(())
            })
            .await
    }

    /// Remove a batch of entries by id, atomically.
    ///
    /// Empty ids are skipped; a non-numeric id aborts the call before
    /// the database is touched. If any requested id does not belong to
    /// this user's list the whole transaction rolls back and nothing is
    /// removed.
    #[instrument(skip(self, ids))]
    pub async fn remove(&self, uid: i64, kind: ListKind, ids: &[String]) -> StoreResult<()> {
        let mut parsed = BTreeSet::new();
        for raw in ids {
            if raw.is_empty() {
                continue;
            }
            parsed.insert(parse_id(raw, "invalid element(s)")?);
        }

        self.db
            .execute_mut(move |conn| {
                ensure_user(conn, uid)?;
                if parsed.is_empty() {
                    return Ok(());
                }

                let tx = conn.transaction()?;
                let mut deleted = 0;
                {
                    let mut stmt = tx.prepare(&format!(
                        "DELETE FROM {} WHERE user = ?1 AND id = ?2",
                        kind.table()
                    ))?;
                    for id in &parsed {
                        deleted += stmt.execute(rusqlite::params![uid, id])?;
                    }
                }
                if deleted != parsed.len() {
                    // Dropping the transaction rolls everything back.
                    return Err(StoreError::invalid("element(s) not found"));
                }
                tx.commit()?;
                debug!(uid, %kind, removed = deleted, "list remove");
                Ok(())
            })
            .await
    }

    /// Rename an entry.
    ///
    /// A rename to the current name is a no-op; an empty name and a
    /// collision with another entry of the same list are rejected.
    #[instrument(skip(self))]
    pub async fn edit(
        &self,
        uid: i64,
        kind: ListKind,
        id: &str,
        new_name: &str,
    ) -> StoreResult<()> {
        let id = parse_id(id, "invalid element")?;
        let new_name = new_name.to_string();

        self.db
            .execute(move |conn| {
                ensure_user(conn, uid)?;
                let current = conn.query_row(
                    &format!(
                        "SELECT name FROM {} WHERE user = ?1 AND id = ?2",
                        kind.table()
                    ),
                    rusqlite::params![uid, id],
                    |row| row.get::<_, String>(0),
                );
                let current = match current {
                    Ok(name) => name,
                    Err(rusqlite::Error::QueryReturnedNoRows) => {
                        return Err(StoreError::invalid("element not found"));
                    }
                    Err(e) => return Err(e.into()),
                };

                if current == new_name {
                    return Ok(());
                }
                if new_name.is_empty() {
                    return Err(StoreError::invalid("invalid new name"));
                }

                let collision = conn.query_row(
                    &format!(
                        "SELECT 1 FROM {} WHERE user = ?1 AND name = ?2",
                        kind.table()
                    ),
                    rusqlite::params![uid, new_name],
                    |_| Ok(()),
                );
                match collision {
                    Ok(()) => return Err(StoreError::invalid("element already in list")),
                    Err(rusqlite::Error::QueryReturnedNoRows) => {}
                    Err(e) => return Err(e.into()),
                }

                conn.execute(
                    &format!("UPDATE {} SET name = ?1 WHERE id = ?2", kind.table()),
                    rusqlite::params![new_name, id],
                )?;
                Ok(())
            })
            .await
    }
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[path = "list_store_tests.rs"]
mod tests;
