//! Weekly menus: per-user, ordered, doubly linked.
//!
//! A menu is fourteen meal slots (lunch and dinner for seven days) stored
//! as a single `;`-joined text column. Ids are per-user and monotonically
//! increasing; new menus always append at the tail, and deletion splices
//! the neighbors back together. The returned neighbor links are computed
//! from the id order, so they survive any gaps deletion leaves behind.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::db::Database;
use crate::error::{StoreError, StoreResult};
use crate::user_store::ensure_user;

// ═══════════════════════════════════════════════════════════════════════
//  Types
// ═══════════════════════════════════════════════════════════════════════

/// Number of meal slots in a menu: lunch and dinner, seven days.
pub const MENU_SLOTS: usize = 14;

/// A menu with its position in the owner's collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Menu {
    /// Per-user menu id.
    pub mid: i64,
    /// The fourteen meal slots, in day order.
    pub content: [String; MENU_SLOTS],
    /// Id of the previous menu, if any.
    pub prev: Option<i64>,
    /// Id of the next menu, if any.
    pub next: Option<i64>,
}

/// Join the slots into the stored form. The separator may not appear
/// inside a slot.
fn encode_content(content: &[String; MENU_SLOTS]) -> StoreResult<String> {
    if content.iter().any(|slot| slot.contains(';')) {
        return Err(StoreError::invalid("invalid menu"));
    }
    Ok(content.join(";"))
}

/// Split a stored menu back into its slots.
fn decode_content(raw: &str) -> StoreResult<[String; MENU_SLOTS]> {
    let fields: Vec<String> = raw.split(';').map(str::to_string).collect();
    <[String; MENU_SLOTS]>::try_from(fields)
        .map_err(|fields| StoreError::Database(format!("menu has {} slots", fields.len())))
}

fn empty_content() -> [String; MENU_SLOTS] {
    std::array::from_fn(|_| String::new())
}

// ═══════════════════════════════════════════════════════════════════════
//  MenuStore
// ═══════════════════════════════════════════════════════════════════════

/// CRUD operations on the menu collection.
#[derive(Clone)]
pub struct MenuStore {
    db: Database,
}

impl MenuStore {
    /// Create a new menu store backed by `db`.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Ids of all the user's menus, oldest first.
    #[instrument(skip(self))]
    pub async fn get_ids(&self, uid: i64) -> StoreResult<Vec<i64>> {
        self.db
            .execute(move |conn| {
                ensure_user(conn, uid)?;
                let mut stmt =
                    conn.prepare("SELECT mid FROM menus WHERE user = ?1 ORDER BY mid")?;
                let ids = stmt
                    .query_map(rusqlite::params![uid], |row| row.get(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(ids)
            })
            .await
    }

    /// Fetch a menu with its neighbor links.
    ///
    /// With `mid = None` the newest menu is returned; a user with no
    /// menus gets an empty placeholder with id 0 and no neighbors.
    /// Asking for id 0 explicitly is an error, the placeholder is never
    /// addressable.
    #[instrument(skip(self))]
    pub async fn get(&self, uid: i64, mid: Option<i64>) -> StoreResult<Menu> {
        let explicit = mid.is_some();
        self.db
            .execute(move |conn| {
                ensure_user(conn, uid)?;
                let mid = match mid {
                    Some(mid) => mid,
                    None => conn.query_row(
                        "SELECT COALESCE(MAX(mid), 0) FROM menus WHERE user = ?1",
                        rusqlite::params![uid],
                        |row| row.get(0),
                    )?,
                };
                if mid == 0 {
                    if explicit {
                        return Err(StoreError::invalid("menu not found"));
                    }
                    return Ok(Menu {
                        mid: 0,
                        content: empty_content(),
                        prev: None,
                        next: None,
                    });
                }

                let raw = conn.query_row(
                    "SELECT content FROM menus WHERE user = ?1 AND mid = ?2",
                    rusqlite::params![uid, mid],
                    |row| row.get::<_, String>(0),
                );
                let raw = match raw {
                    Ok(raw) => raw,
                    Err(rusqlite::Error::QueryReturnedNoRows) => {
                        return Err(StoreError::invalid("menu not found"));
                    }
                    Err(e) => return Err(e.into()),
                };

                let prev: Option<i64> = conn.query_row(
                    "SELECT MAX(mid) FROM menus WHERE user = ?1 AND mid < ?2",
                    rusqlite::params![uid, mid],
                    |row| row.get(0),
                )?;
                let next: Option<i64> = conn.query_row(
                    "SELECT MIN(mid) FROM menus WHERE user = ?1 AND mid > ?2",
                    rusqlite::params![uid, mid],
                    |row| row.get(0),
                )?;

                Ok(Menu {
                    mid,
                    content: decode_content(&raw)?,
                    prev,
                    next,
                })
            })
            .await
    }

    /// Create an empty menu at the tail of the collection and return
    /// its id.
    #[instrument(skip(self))]
    pub async fn create(&self, uid: i64) -> StoreResult<i64> {
        self.db
            .execute_mut(move |conn| {
                ensure_user(conn, uid)?;
                let tx = conn.transaction()?;

                let tail: Option<i64> = tx.query_row(
                    "SELECT MAX(mid) FROM menus WHERE user = ?1",
                    rusqlite::params![uid],
                    |row| row.get(0),
                )?;
                let mid = tail.unwrap_or(0) + 1;

                tx.execute(
                    "INSERT INTO menus (user, mid, content, prev, next) \
                     VALUES (?1, ?2, ?3, ?4, NULL)",
                    rusqlite::params![uid, mid, ";".repeat(MENU_SLOTS - 1), tail],
                )?;
                if let Some(tail) = tail {
                    tx.execute(
                        "UPDATE menus SET next = ?1 WHERE user = ?2 AND mid = ?3",
                        rusqlite::params![mid, uid, tail],
                    )?;
                }

                tx.commit()?;
                debug!(uid, mid, "menu created");
                Ok(mid)
            })
            .await
    }

    /// Replace a menu's slots.
    #[instrument(skip(self, content))]
    pub async fn update(
        &self,
        uid: i64,
        mid: i64,
        content: &[String; MENU_SLOTS],
    ) -> StoreResult<()> {
        let encoded = encode_content(content)?;
        self.db
            .execute(move |conn| {
                ensure_user(conn, uid)?;
                let changed = conn.execute(
                    "UPDATE menus SET content = ?1 WHERE user = ?2 AND mid = ?3",
                    rusqlite::params![encoded, uid, mid],
                )?;
                if changed == 0 {
                    return Err(StoreError::invalid("menu not found"));
                }
                Ok(())
            })
            .await
    }

    /// Delete a menu, splicing its neighbors together.
    #[instrument(skip(self))]
    pub async fn delete(&self, uid: i64, mid: i64) -> StoreResult<()> {
        self.db
            .execute_mut(move |conn| {
                ensure_user(conn, uid)?;
                let tx = conn.transaction()?;

                let links = tx.query_row(
                    "SELECT prev, next FROM menus WHERE user = ?1 AND mid = ?2",
                    rusqlite::params![uid, mid],
                    |row| Ok((row.get::<_, Option<i64>>(0)?, row.get::<_, Option<i64>>(1)?)),
                );
                let (prev, next) = match links {
                    Ok(links) => links,
                    Err(rusqlite::Error::QueryReturnedNoRows) => {
                        return Err(StoreError::invalid("menu not found"));
                    }
                    Err(e) => return Err(e.into()),
                };

                if let Some(prev) = prev {
                    tx.execute(
                        "UPDATE menus SET next = ?1 WHERE user = ?2 AND mid = ?3",
                        rusqlite::params![next, uid, prev],
                    )?;
                }
                if let Some(next) = next {
                    tx.execute(
                        "UPDATE menus SET prev = ?1 WHERE user = ?2 AND mid = ?3",
                        rusqlite::params![prev, uid, next],
                    )?;
                }
                tx.execute(
                    "DELETE FROM menus WHERE user = ?1 AND mid = ?2",
                    rusqlite::params![uid, mid],
                )?;

                tx.commit()?;
                debug!(uid, mid, "menu deleted");
                Ok(())
            })
            .await
    }

    /// Copy a menu's content into a new menu at the tail and return the
    /// new id.
    #[instrument(skip(self))]
    pub async fn duplicate(&self, uid: i64, mid: i64) -> StoreResult<i64> {
        self.db
            .execute_mut(move |conn| {
                ensure_user(conn, uid)?;
                let tx = conn.transaction()?;

                let content = tx.query_row(
                    "SELECT content FROM menus WHERE user = ?1 AND mid = ?2",
                    rusqlite::params![uid, mid],
                    |row| row.get::<_, String>(0),
                );
                let content = match content {
                    Ok(content) => content,
                    Err(rusqlite::Error::QueryReturnedNoRows) => {
                        return Err(StoreError::invalid("menu not found"));
                    }
                    Err(e) => return Err(e.into()),
                };

                let tail: Option<i64> = tx.query_row(
                    "SELECT MAX(mid) FROM menus WHERE user = ?1",
                    rusqlite::params![uid],
                    |row| row.get(0),
                )?;
                // The source exists, so the collection is non-empty.
                let tail = tail.ok_or_else(|| {
                    StoreError::Database("menu table lost its rows mid-transaction".into())
                })?;
                let new_mid = tail + 1;

                tx.execute(
                    "INSERT INTO menus (user, mid, content, prev, next) \
                     VALUES (?1, ?2, ?3, ?4, NULL)",
                    rusqlite::params![uid, new_mid, content, tail],
                )?;
                tx.execute(
                    "UPDATE menus SET next = ?1 WHERE user = ?2 AND mid = ?3",
                    rusqlite::params![new_mid, uid, tail],
                )?;

                tx.commit()?;
                debug!(uid, mid, new_mid, "menu duplicated");
                Ok(new_mid)
            })
            .await
    }
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[path = "menu_store_tests.rs"]
mod tests;
