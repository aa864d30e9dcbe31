//! # Chainge Interact Store
//!
//! Durable token log for Chainge Interact.
//!
//! ## Overview
//!
//! Interactions are never persisted as objects. Every accepted token is
//! appended to a log behind the [`TokenStore`] trait, and an interaction is
//! recovered by replaying the tokens that share its nonce. The primary
//! implementation is [`SqliteTokenStore`]; [`MemoryTokenStore`] has the same
//! semantics without persistence.
//!
//! ## Key Types
//!
//! - [`TokenStore`] - The async trait for all storage operations
//! - [`SqliteTokenStore`] - SQLite-based persistent storage
//! - [`MemoryTokenStore`] - In-memory storage
//! - [`InsertResult`] - Result of inserting a token
//! - [`StoredToken`] - A logged token with its local receive time
//! - [`InteractionQuery`] - Filter and paging for interaction listing
//!
//! ## Usage
//!
//! ```rust,no_run
//! use chainge_interact_store::{InteractionQuery, SqliteTokenStore, TokenStore};
//!
//! async fn example() {
//!     let store = SqliteTokenStore::open("interact.db").unwrap();
//!     let newest = store
//!         .list_interaction_ids(&InteractionQuery::new().reverse(true).take(10))
//!         .await
//!         .unwrap();
//!     for nonce in newest {
//!         let tokens = store.get_tokens(&nonce).await.unwrap();
//!         let last = tokens.last().map(|t| t.received_at);
//!         println!("{nonce}: {} tokens, last received {last:?}", tokens.len());
//!     }
//! }
//! ```

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryTokenStore;
pub use sqlite::SqliteTokenStore;
pub use traits::{InsertResult, InteractionQuery, StoredToken, TokenStore};
