//! User accounts: registration, authentication, credential and token
//! management.
//!
//! Passwords and account tokens are stored only as PBKDF2-HMAC-SHA256
//! hashes (`base64(salt):base64(hash)`, per-value random salt, 600 000
//! iterations per OWASP 2023). The plaintext account token is returned
//! exactly once from [`UserStore::generate_token`] and is required to
//! delete the account or reset a password; a successful use clears it.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use rusqlite::Connection;
use tracing::{debug, instrument};

use crate::db::Database;
use crate::error::{StoreError, StoreResult};

// ═══════════════════════════════════════════════════════════════════════
//  Types
// ═══════════════════════════════════════════════════════════════════════

/// A full user record, as stored. `password` and `token` are hashes,
/// never plaintext.
#[derive(Debug, Clone)]
pub struct User {
    /// Surrogate numeric id, assigned at creation.
    pub uid: i64,
    /// Unique login name.
    pub username: String,
    /// Unique contact address.
    pub email: String,
    /// Password hash.
    pub password: String,
    /// Account token hash, if one has been generated and not yet used.
    pub token: Option<String>,
}

// ═══════════════════════════════════════════════════════════════════════
//  Hashing
// ═══════════════════════════════════════════════════════════════════════

/// PBKDF2-HMAC-SHA256 with 600 000 iterations (OWASP 2023).
const PBKDF2_ITERATIONS: std::num::NonZeroU32 = std::num::NonZeroU32::new(600_000).unwrap();

/// Salt and derived-key lengths in bytes.
const SALT_LEN: usize = 32;
const KEY_LEN: usize = 32;

/// Account tokens are 18 random bytes, base64-encoded for transport.
const TOKEN_LEN: usize = 18;

static PBKDF2_ALG: pbkdf2::Algorithm = pbkdf2::PBKDF2_HMAC_SHA256;

/// Hash a secret into a storable `base64(salt):base64(hash)` string.
fn hash_secret(secret: &str) -> StoreResult<String> {
    let rng = SystemRandom::new();

    let mut salt = [0u8; SALT_LEN];
    rng.fill(&mut salt)
        .map_err(|_| StoreError::Database("failed to generate random salt".into()))?;

    let mut hash = [0u8; KEY_LEN];
    pbkdf2::derive(PBKDF2_ALG, PBKDF2_ITERATIONS, &salt, secret.as_bytes(), &mut hash);

    Ok(format!("{}:{}", BASE64.encode(salt), BASE64.encode(hash)))
}

/// Verify a secret against a stored `base64(salt):base64(hash)` string.
///
/// Malformed stored values verify as `false` rather than erroring, so
/// every authentication failure collapses into the same caller-visible
/// outcome.
fn verify_secret(secret: &str, stored: &str) -> bool {
    let Some((salt, expected)) = stored.split_once(':') else {
        return false;
    };
    let (Ok(salt), Ok(expected)) = (BASE64.decode(salt), BASE64.decode(expected)) else {
        return false;
    };

    pbkdf2::verify(PBKDF2_ALG, PBKDF2_ITERATIONS, &salt, secret.as_bytes(), &expected).is_ok()
}

/// Generate a fresh plaintext account token.
fn new_token() -> StoreResult<String> {
    let rng = SystemRandom::new();
    let mut bytes = [0u8; TOKEN_LEN];
    rng.fill(&mut bytes)
        .map_err(|_| StoreError::Database("failed to generate random token".into()))?;
    Ok(BASE64.encode(bytes))
}

// ═══════════════════════════════════════════════════════════════════════
//  Owner pre-validation
// ═══════════════════════════════════════════════════════════════════════

/// Ensure `uid` resolves to an existing account.
///
/// Every list, pantry, and menu operation calls this at the top of its
/// connection closure; a missing owner is the fatal condition.
pub(crate) fn ensure_user(conn: &Connection, uid: i64) -> StoreResult<()> {
    let found = conn.query_row(
        "SELECT 1 FROM users WHERE uid = ?1",
        rusqlite::params![uid],
        |_| Ok(()),
    );
    match found {
        Ok(()) => Ok(()),
        Err(rusqlite::Error::QueryReturnedNoRows) => Err(StoreError::UnknownUser),
        Err(e) => Err(e.into()),
    }
}

/// Translate a uniqueness violation on the users table into the
/// recoverable message naming the colliding column.
fn map_user_collision(err: rusqlite::Error) -> StoreError {
    if let rusqlite::Error::SqliteFailure(ref failure, Some(ref message)) = err
        && failure.code == rusqlite::ErrorCode::ConstraintViolation
    {
        if message.contains("users.email") {
            return StoreError::invalid("email not available");
        }
        if message.contains("users.username") {
            return StoreError::invalid("username not available");
        }
        return StoreError::invalid("unknown error");
    }
    err.into()
}

fn read_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        uid: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        token: row.get(4)?,
    })
}

// ═══════════════════════════════════════════════════════════════════════
//  UserStore
// ═══════════════════════════════════════════════════════════════════════

/// Account lifecycle and credential operations.
#[derive(Clone)]
pub struct UserStore {
    db: Database,
}

impl UserStore {
    /// Create a new user store backed by `db`.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Register a new account and return its id.
    ///
    /// The username must be at least 3 characters of letters, digits, or
    /// `_`; the password at least 5 characters. The password is hashed
    /// before it reaches the database.
    #[instrument(skip(self, password))]
    pub async fn create(&self, username: &str, email: &str, password: &str) -> StoreResult<i64> {
        if username.chars().count() < 3 {
            return Err(StoreError::invalid(
                "invalid username: at least 3 characters required",
            ));
        }
        if !username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(StoreError::invalid(
                "invalid username: only letters, digits and '_' allowed",
            ));
        }
        if password.chars().count() < 5 {
            return Err(StoreError::invalid(
                "invalid password: at least 5 characters required",
            ));
        }

        let password_hash = hash_secret(password)?;
        let username = username.to_string();
        let email = email.to_string();

        let uid = self
            .db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO users (username, email, password) VALUES (?1, ?2, ?3)",
                    rusqlite::params![username, email, password_hash],
                )
                .map_err(map_user_collision)?;
                Ok(conn.last_insert_rowid())
            })
            .await?;

        debug!(uid, "user created");
        Ok(uid)
    }

    /// Authenticate by username and password, returning the user id.
    ///
    /// An unknown username and a wrong password yield the identical
    /// "invalid credentials" error; the store never reveals which half
    /// failed.
    #[instrument(skip(self, password))]
    pub async fn login(&self, username: &str, password: &str) -> StoreResult<i64> {
        let username = username.to_string();
        let password = password.to_string();

        self.db
            .execute(move |conn| {
                let row = conn.query_row(
                    "SELECT uid, password FROM users WHERE username = ?1",
                    rusqlite::params![username],
                    |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
                );
                match row {
                    Ok((uid, hash)) if verify_secret(&password, &hash) => Ok(uid),
                    Ok(_) | Err(rusqlite::Error::QueryReturnedNoRows) => {
                        Err(StoreError::invalid("invalid credentials"))
                    }
                    Err(e) => Err(e.into()),
                }
            })
            .await
    }

    /// Fetch the full record for `uid`. Missing accounts are the fatal
    /// condition, not a recoverable error.
    #[instrument(skip(self))]
    pub async fn get_data(&self, uid: i64) -> StoreResult<User> {
        self.db
            .execute(move |conn| {
                let row = conn.query_row(
                    "SELECT uid, username, email, password, token FROM users WHERE uid = ?1",
                    rusqlite::params![uid],
                    read_user,
                );
                match row {
                    Ok(user) => Ok(user),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Err(StoreError::UnknownUser),
                    Err(e) => Err(e.into()),
                }
            })
            .await
    }

    /// Fetch the full record by email. Missing accounts are fatal, as
    /// with [`UserStore::get_data`].
    #[instrument(skip(self))]
    pub async fn get_data_by_email(&self, email: &str) -> StoreResult<User> {
        let email = email.to_string();
        self.db
            .execute(move |conn| {
                let row = conn.query_row(
                    "SELECT uid, username, email, password, token FROM users WHERE email = ?1",
                    rusqlite::params![email],
                    read_user,
                );
                match row {
                    Ok(user) => Ok(user),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Err(StoreError::UnknownUser),
                    Err(e) => Err(e.into()),
                }
            })
            .await
    }

    /// Generate a fresh account token, persist its hash, and return the
    /// plaintext. The plaintext is never retrievable again.
    #[instrument(skip(self))]
    pub async fn generate_token(&self, uid: i64) -> StoreResult<String> {
        let token = new_token()?;
        let token_hash = hash_secret(&token)?;

        self.db
            .execute(move |conn| {
                ensure_user(conn, uid)?;
                conn.execute(
                    "UPDATE users SET token = ?1 WHERE uid = ?2",
                    rusqlite::params![token_hash, uid],
                )?;
                Ok(())
            })
            .await?;

        debug!(uid, "account token generated");
        Ok(token)
    }

    /// Delete the account after verifying the plaintext `token` against
    /// the stored hash. Lists, pantry rows, and menus cascade away with
    /// the user row.
    #[instrument(skip(self, token))]
    pub async fn delete(&self, uid: i64, token: &str) -> StoreResult<()> {
        let token = token.to_string();
        self.db
            .execute(move |conn| {
                ensure_user(conn, uid)?;
                let stored: Option<String> = conn.query_row(
                    "SELECT token FROM users WHERE uid = ?1",
                    rusqlite::params![uid],
                    |row| row.get(0),
                )?;
                match stored {
                    Some(hash) if verify_secret(&token, &hash) => {
                        conn.execute("DELETE FROM users WHERE uid = ?1", rusqlite::params![uid])?;
                        debug!(uid, "user deleted");
                        Ok(())
                    }
                    _ => Err(StoreError::invalid("deletion failed, try again")),
                }
            })
            .await
    }

    /// Change the username. A no-op when unchanged; a collision with
    /// another account is recoverable.
    #[instrument(skip(self))]
    pub async fn change_username(&self, uid: i64, new: &str) -> StoreResult<()> {
        let new = new.to_string();
        self.db
            .execute(move |conn| {
                ensure_user(conn, uid)?;
                let current: String = conn.query_row(
                    "SELECT username FROM users WHERE uid = ?1",
                    rusqlite::params![uid],
                    |row| row.get(0),
                )?;
                if current == new {
                    return Ok(());
                }
                conn.execute(
                    "UPDATE users SET username = ?1 WHERE uid = ?2",
                    rusqlite::params![new, uid],
                )
                .map_err(|_| StoreError::invalid("username not available"))?;
                Ok(())
            })
            .await
    }

    /// Change the email. Same rules as [`UserStore::change_username`].
    #[instrument(skip(self))]
    pub async fn change_email(&self, uid: i64, new: &str) -> StoreResult<()> {
        let new = new.to_string();
        self.db
            .execute(move |conn| {
                ensure_user(conn, uid)?;
                let current: String = conn.query_row(
                    "SELECT email FROM users WHERE uid = ?1",
                    rusqlite::params![uid],
                    |row| row.get(0),
                )?;
                if current == new {
                    return Ok(());
                }
                conn.execute(
                    "UPDATE users SET email = ?1 WHERE uid = ?2",
                    rusqlite::params![new, uid],
                )
                .map_err(|_| StoreError::invalid("email not available"))?;
                Ok(())
            })
            .await
    }

    /// Change the password after verifying the old one.
    #[instrument(skip(self, old, new))]
    pub async fn change_password(&self, uid: i64, old: &str, new: &str) -> StoreResult<()> {
        if new.chars().count() < 5 {
            return Err(StoreError::invalid(
                "invalid password: at least 5 characters required",
            ));
        }

        let old = old.to_string();
        let new_hash = hash_secret(new)?;

        self.db
            .execute(move |conn| {
                ensure_user(conn, uid)?;
                let stored: String = conn.query_row(
                    "SELECT password FROM users WHERE uid = ?1",
                    rusqlite::params![uid],
                    |row| row.get(0),
                )?;
                if !verify_secret(&old, &stored) {
                    return Err(StoreError::invalid("invalid credentials"));
                }
                conn.execute(
                    "UPDATE users SET password = ?1 WHERE uid = ?2",
                    rusqlite::params![new_hash, uid],
                )?;
                debug!(uid, "password changed");
                Ok(())
            })
            .await
    }

    /// Overwrite the password for the account registered under `email`,
    /// authorized by a previously generated token. The token is cleared
    /// on success so it cannot be reused.
    #[instrument(skip(self, token, new))]
    pub async fn reset_password(&self, email: &str, token: &str, new: &str) -> StoreResult<()> {
        let email = email.to_string();
        let token = token.to_string();
        let new_hash = hash_secret(new)?;

        self.db
            .execute(move |conn| {
                let row = conn.query_row(
                    "SELECT uid, token FROM users WHERE email = ?1",
                    rusqlite::params![email],
                    |row| Ok((row.get::<_, i64>(0)?, row.get::<_, Option<String>>(1)?)),
                );
                let (uid, stored) = match row {
                    Ok(data) => data,
                    Err(rusqlite::Error::QueryReturnedNoRows) => {
                        return Err(StoreError::UnknownUser);
                    }
                    Err(e) => return Err(e.into()),
                };
                match stored {
                    Some(hash) if verify_secret(&token, &hash) => {
                        conn.execute(
                            "UPDATE users SET password = ?1, token = NULL WHERE uid = ?2",
                            rusqlite::params![new_hash, uid],
                        )?;
                        debug!(uid, "password reset");
                        Ok(())
                    }
                    _ => Err(StoreError::invalid("password reset failed, try again")),
                }
            })
            .await
    }

    /// Return the total number of accounts.
    #[instrument(skip(self))]
    pub async fn count(&self) -> StoreResult<i64> {
        self.db
            .execute(|conn| {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
                Ok(count)
            })
            .await
    }

    /// Return the email of every account subscribed to the newsletter,
    /// for the operator broadcast script.
    #[instrument(skip(self))]
    pub async fn list_emails(&self) -> StoreResult<Vec<String>> {
        self.db
            .execute(|conn| {
                let mut stmt =
                    conn.prepare("SELECT email FROM users WHERE newsletter = 1 ORDER BY uid")?;
                let emails = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(emails)
            })
            .await
    }

    /// Opt an account in or out of the newsletter. New accounts start
    /// opted in.
    #[instrument(skip(self))]
    pub async fn set_newsletter(&self, uid: i64, enabled: bool) -> StoreResult<()> {
        self.db
            .execute(move |conn| {
                ensure_user(conn, uid)?;
                conn.execute(
                    "UPDATE users SET newsletter = ?1 WHERE uid = ?2",
                    rusqlite::params![enabled, uid],
                )?;
                Ok(())
            })
            .await
    }
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[path = "user_store_tests.rs"]
mod tests;
