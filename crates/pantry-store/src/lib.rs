//! # pantry-store
//!
//! Storage engine for a personal kitchen manager.
//!
//! Provides SQLite-backed persistence with WAL mode, versioned
//! transactional migrations, and one store per domain area: user
//! accounts and credentials, the shopping and ideas lists, the pantry
//! inventory, and the weekly menu collection.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  UserStore    (accounts, PBKDF2, tokens) │
//! │  ListStore    (shopping / ideas)         │
//! │  StorageStore (pantry, quantity merge)   │
//! │  MenuStore    (linked weekly menus)      │
//! ├─────────────────────────────────────────┤
//! │  Database (rusqlite WAL, spawn_blocking) │
//! │  Migrations (versioned, transactional)   │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```ignore
//! use pantry_store::{Database, ListKind, ListStore, UserStore};
//!
//! let db = Database::open_and_migrate("data/pantry.db").await?;
//! let users = UserStore::new(db.clone());
//! let lists = ListStore::new(db.clone());
//!
//! let uid = users.create("francesco", "francesco@example.com", "secret1").await?;
//! lists.append(uid, ListKind::Shopping, &["bread".into()]).await?;
//! ```
//!
//! Every error is either recoverable, carrying a message meant for the
//! end user, or fatal; see [`StoreError::is_fatal`].

pub mod db;
pub mod error;
pub mod list_store;
pub mod menu_store;
pub mod migration;
pub mod storage_store;
pub mod user_store;

// ── re-exports ───────────────────────────────────────────────────────

pub use db::Database;
pub use error::{StoreError, StoreResult};
pub use list_store::{Entry, ListKind, ListStore};
pub use menu_store::{Menu, MenuStore, MENU_SLOTS};
pub use storage_store::{Article, NewArticle, StorageStore};
pub use user_store::{User, UserStore};
