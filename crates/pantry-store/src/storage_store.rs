//! Pantry inventory: articles with optional expiration dates and
//! quantities.
//!
//! Articles are keyed by (owner, name, expiration); appending a record
//! that collides on this key increments the existing quantity instead of
//! creating a duplicate row. The API exposes `Option<NaiveDate>` and
//! `Option<u32>`; the sentinel values that keep the merge key well-defined
//! (`2004-02-05`, quantity `0`) exist only in the persistence mapping.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::db::Database;
use crate::error::{StoreError, StoreResult};
use crate::user_store::ensure_user;

// ═══════════════════════════════════════════════════════════════════════
//  Types
// ═══════════════════════════════════════════════════════════════════════

/// Stored date marking "no expiration". Chosen so the unique
/// (user, name, expiration) key still merges rows without a real date.
const NO_EXPIRATION: &str = "2004-02-05";

/// Stored quantity marking "no quantity tracked".
const NO_QUANTITY: i64 = 0;

/// A pantry article as returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    /// Surrogate numeric id.
    pub id: i64,
    /// Article name.
    pub name: String,
    /// Expiration date, if tracked.
    pub expiration: Option<NaiveDate>,
    /// Quantity, if tracked.
    pub quantity: Option<u32>,
}

/// An article as collected by the web layer: raw text fields, empty or
/// absent meaning "not tracked".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewArticle {
    /// Article name; required.
    pub name: String,
    /// ISO calendar date (`YYYY-MM-DD`), if tracked.
    pub expiration: Option<String>,
    /// Non-negative integer, if tracked.
    pub quantity: Option<String>,
}

/// A validated record in its stored form.
struct ArticleRow {
    name: String,
    expiration: String,
    quantity: i64,
}

fn validate(record: &NewArticle) -> StoreResult<ArticleRow> {
    if record.name.is_empty() {
        return Err(StoreError::invalid("invalid article"));
    }

    let quantity = match record.quantity.as_deref() {
        None | Some("") => NO_QUANTITY,
        Some(raw) => {
            if !raw.bytes().all(|b| b.is_ascii_digit()) {
                return Err(StoreError::invalid("invalid quantity"));
            }
            raw.parse()
                .map_err(|_| StoreError::invalid("invalid quantity"))?
        }
    };

    let expiration = match record.expiration.as_deref() {
        None | Some("") => NO_EXPIRATION.to_string(),
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map_err(|_| StoreError::invalid("invalid expiration"))?
            .format("%Y-%m-%d")
            .to_string(),
    };

    Ok(ArticleRow {
        name: record.name.clone(),
        expiration,
        quantity,
    })
}

/// Map a stored row back to the caller-facing representation.
fn read_article(row: &rusqlite::Row<'_>) -> rusqlite::Result<(i64, String, String, i64)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn to_article(id: i64, name: String, expiration: String, quantity: i64) -> StoreResult<Article> {
    let expiration = if expiration == NO_EXPIRATION {
        None
    } else {
        Some(
            NaiveDate::parse_from_str(&expiration, "%Y-%m-%d").map_err(|e| {
                StoreError::Database(format!("corrupt expiration {expiration:?}: {e}"))
            })?,
        )
    };
    let quantity = if quantity == NO_QUANTITY {
        None
    } else {
        u32::try_from(quantity)
            .map(Some)
            .map_err(|_| StoreError::Database(format!("corrupt quantity {quantity}")))?
    };
    Ok(Article {
        id,
        name,
        expiration,
        quantity,
    })
}

fn parse_id(raw: &str, message: &'static str) -> StoreResult<i64> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(StoreError::invalid(message));
    }
    raw.parse().map_err(|_| StoreError::invalid(message))
}

/// Parse a `+N` / `-N` quantity adjustment.
fn parse_delta(raw: &str) -> StoreResult<i64> {
    let (negative, digits) = match raw.as_bytes().first() {
        Some(b'+') => (false, &raw[1..]),
        Some(b'-') => (true, &raw[1..]),
        _ => return Err(StoreError::invalid("invalid adjustment")),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(StoreError::invalid("invalid adjustment"));
    }
    let value: i64 = digits
        .parse()
        .map_err(|_| StoreError::invalid("invalid adjustment"))?;
    Ok(if negative { -value } else { value })
}

// ═══════════════════════════════════════════════════════════════════════
//  StorageStore
// ═══════════════════════════════════════════════════════════════════════

/// CRUD and quantity arithmetic on the pantry inventory.
#[derive(Clone)]
pub struct StorageStore {
    db: Database,
}

impl StorageStore {
    /// Create a new pantry store backed by `db`.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Fetch the pantry ordered by expiration, optionally filtered by a
    /// substring of the name.
    #[instrument(skip(self))]
    pub async fn get(&self, uid: i64, name_filter: &str) -> StoreResult<Vec<Article>> {
        let filter = name_filter.to_string();
        self.db
            .execute(move |conn| {
                ensure_user(conn, uid)?;
                let mut stmt = conn.prepare(
                    "SELECT id, name, expiration, quantity FROM storage \
                     WHERE user = ?1 AND (?2 = '' OR instr(name, ?2) > 0) \
                     ORDER BY expiration, id",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![uid, filter], read_article)?
                    .collect::<Result<Vec<_>, _>>()?;

                rows.into_iter()
                    .map(|(id, name, expiration, quantity)| {
                        to_article(id, name, expiration, quantity)
                    })
                    .collect()
            })
            .await
    }

    /// Fetch a single article by id.
    #[instrument(skip(self))]
    pub async fn get_article(&self, uid: i64, id: &str) -> StoreResult<Article> {
        let id = parse_id(id, "invalid article")?;
        self.db
            .execute(move |conn| {
                ensure_user(conn, uid)?;
                let row = conn.query_row(
                    "SELECT id, name, expiration, quantity FROM storage \
                     WHERE user = ?1 AND id = ?2",
                    rusqlite::params![uid, id],
                    read_article,
                );
                match row {
                    Ok((id, name, expiration, quantity)) => {
                        to_article(id, name, expiration, quantity)
                    }
                    Err(rusqlite::Error::QueryReturnedNoRows) => {
                        Err(StoreError::invalid("article not found"))
                    }
                    Err(e) => Err(e.into()),
                }
            })
            .await
    }

    /// Add articles to the pantry, merging quantities on collision.
    ///
    /// Every record is validated before the first insert. A record whose
    /// (name, expiration) matches an existing row increments that row's
    /// quantity instead of creating a duplicate.
    #[instrument(skip(self, records))]
    pub async fn append(&self, uid: i64, records: &[NewArticle]) -> StoreResult<()> {
        let rows = records.iter().map(validate).collect::<StoreResult<Vec<_>>>()?;

        self.db
            .execute(move |conn| {
                ensure_user(conn, uid)?;
                if rows.is_empty() {
                    return Ok(());
                }
                let mut stmt = conn.prepare(
                    "INSERT INTO storage (user, name, expiration, quantity) \
                     VALUES (?1, ?2, ?3, ?4) \
                     ON CONFLICT (user, name, expiration) \
                     DO UPDATE SET quantity = quantity + excluded.quantity",
                )?;
                for row in &rows {
                    stmt.execute(rusqlite::params![uid, row.name, row.expiration, row.quantity])?;
                }
                debug!(uid, appended = rows.len(), "pantry append");
                Ok(())
            })
            .await
    }

    /// Remove a batch of articles by id, atomically: if any requested id
    /// does not exist, the transaction rolls back and nothing is removed.
    #[instrument(skip(self, ids))]
    pub async fn remove(&self, uid: i64, ids: &[String]) -> StoreResult<()> {
        let mut parsed = BTreeSet::new();
        for raw in ids {
            if raw.is_empty() {
                continue;
            }
            parsed.insert(parse_id(raw, "invalid article(s)")?);
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
                    let mut stmt =
                        tx.prepare("DELETE FROM storage WHERE user = ?1 AND id = ?2")?;
                    for id in &parsed {
                        deleted += stmt.execute(rusqlite::params![uid, id])?;
                    }
                }
                if deleted != parsed.len() {
                    return Err(StoreError::invalid("article(s) not found"));
                }
                tx.commit()?;
                debug!(uid, removed = deleted, "pantry remove");
                Ok(())
            })
            .await
    }

    /// Overwrite an article's name, expiration, and quantity in place.
    ///
    /// The record is validated exactly as in [`StorageStore::append`],
    /// but this is a full overwrite — no quantity merge. Rewriting onto
    /// another row's (name, expiration) key is rejected.
    #[instrument(skip(self, record))]
    pub async fn edit(&self, uid: i64, id: &str, record: &NewArticle) -> StoreResult<()> {
        let id = parse_id(id, "invalid article")?;
        let row = validate(record)?;

        self.db
            .execute(move |conn| {
                ensure_user(conn, uid)?;
                let current = conn.query_row(
                    "SELECT name, expiration, quantity FROM storage \
                     WHERE user = ?1 AND id = ?2",
                    rusqlite::params![uid, id],
                    |r| {
                        Ok((
                            r.get::<_, String>(0)?,
                            r.get::<_, String>(1)?,
                            r.get::<_, i64>(2)?,
                        ))
                    },
                );
                let (name, expiration, quantity) = match current {
                    Ok(data) => data,
                    Err(rusqlite::Error::QueryReturnedNoRows) => {
                        return Err(StoreError::invalid("article not found"));
                    }
                    Err(e) => return Err(e.into()),
                };

                if name == row.name && expiration == row.expiration && quantity == row.quantity {
                    return Ok(());
                }

                let collision = conn.query_row(
                    "SELECT 1 FROM storage \
                     WHERE user = ?1 AND name = ?2 AND expiration = ?3 AND id != ?4",
                    rusqlite::params![uid, row.name, row.expiration, id],
                    |_| Ok(()),
                );
                match collision {
                    Ok(()) => return Err(StoreError::invalid("article already present")),
                    Err(rusqlite::Error::QueryReturnedNoRows) => {}
                    Err(e) => return Err(e.into()),
                }

                conn.execute(
                    "UPDATE storage SET name = ?1, expiration = ?2, quantity = ?3 WHERE id = ?4",
                    rusqlite::params![row.name, row.expiration, row.quantity, id],
                )?;
                Ok(())
            })
            .await
    }

    /// Apply a `+N` / `-N` adjustment to an article's quantity.
    ///
    /// The result is floored at zero; an article whose quantity reaches
    /// zero is removed from the pantry.
    #[instrument(skip(self))]
    pub async fn adjust_quantity(&self, uid: i64, id: &str, delta: &str) -> StoreResult<()> {
        let id = parse_id(id, "invalid article")?;
        let delta = parse_delta(delta)?;

        self.db
            .execute(move |conn| {
                ensure_user(conn, uid)?;
                let quantity = conn.query_row(
                    "SELECT quantity FROM storage WHERE user = ?1 AND id = ?2",
                    rusqlite::params![uid, id],
                    |row| row.get::<_, i64>(0),
                );
                let quantity = match quantity {
                    Ok(q) => q,
                    Err(rusqlite::Error::QueryReturnedNoRows) => {
                        return Err(StoreError::invalid("article not found"));
                    }
                    Err(e) => return Err(e.into()),
                };

                let adjusted = quantity.saturating_add(delta).max(0);
                if adjusted == 0 {
                    conn.execute(
                        "DELETE FROM storage WHERE user = ?1 AND id = ?2",
                        rusqlite::params![uid, id],
                    )?;
                    debug!(uid, id, "article exhausted, removed");
                } else {
                    conn.execute(
                        "UPDATE storage SET quantity = ?1 WHERE user = ?2 AND id = ?3",
                        rusqlite::params![adjusted, uid, id],
                    )?;
                }
                Ok(())
            })
            .await
    }
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[path = "storage_store_tests.rs"]
mod tests;
