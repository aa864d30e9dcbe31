//! SQLite implementation of the TokenStore trait.
//!
//! Uses rusqlite with bundled SQLite, wrapped in async via
//! `tokio::task::spawn_blocking`. Tokens are stored as canonical bytes and
//! decoded on read; the other columns exist for indexing.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use chainge_interact_core::{canonical_bytes, decode_token, Nonce, Token, TokenId};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{InsertResult, InteractionQuery, StoredToken, TokenStore};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex.
#[derive(Clone)]
pub struct SqliteTokenStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteTokenStore {
    /// Open a SQLite database at the given path, creating and migrating it
    /// if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|_| StoreError::Poisoned)?;
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

fn token_id_from_blob(bytes: Vec<u8>) -> Result<TokenId> {
    let arr: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| StoreError::Corrupt {
        token_id: hex_prefix(&b),
        reason: "token id is not 32 bytes".into(),
    })?;
    Ok(TokenId::from_bytes(arr))
}

fn decode_row(token_id: Vec<u8>, canonical: Vec<u8>) -> Result<Token> {
    decode_token(&canonical).map_err(|e| StoreError::Corrupt {
        token_id: hex_prefix(&token_id),
        reason: e.to_string(),
    })
}

fn hex_prefix(bytes: &[u8]) -> String {
    bytes.iter().take(8).map(|b| format!("{b:02x}")).collect()
}

#[async_trait]
impl TokenStore for SqliteTokenStore {
    async fn insert_token(&self, token: &Token, received_at: i64) -> Result<InsertResult> {
        let token = token.clone();

        self.blocking(move |conn| {
            let token_id = token.compute_id();

            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM tokens WHERE token_id = ?1)",
                params![token_id.as_bytes().as_slice()],
                |row| row.get(0),
            )?;
            if exists {
                return Ok(InsertResult::AlreadyExists);
            }

            let existing_at_pos: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT token_id FROM tokens WHERE nonce = ?1 AND seq = ?2",
                    params![token.nonce().as_str(), token.seq()],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(existing) = existing_at_pos {
                let existing = token_id_from_blob(existing)?;
                tracing::debug!(nonce = %token.nonce(), seq = token.seq(), %existing, "token conflicts with stored token");
                return Ok(InsertResult::Conflict { existing });
            }

            conn.execute(
                "INSERT INTO tokens (
                    token_id, nonce, seq, interaction_type, issuer, issued_at,
                    canonical_bytes, ingested_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    token_id.as_bytes().as_slice(),
                    token.nonce().as_str(),
                    token.seq(),
                    token.interaction_type().to_u16(),
                    token.issuer().as_str(),
                    token.header.issued_at,
                    canonical_bytes(&token),
                    received_at,
                ],
            )?;

            Ok(InsertResult::Inserted)
        })
        .await
    }

    async fn get_token(&self, id: &TokenId) -> Result<Option<Token>> {
        let id = *id;

        self.blocking(move |conn| {
            let row: Option<(Vec<u8>, Vec<u8>)> = conn
                .query_row(
                    "SELECT token_id, canonical_bytes FROM tokens WHERE token_id = ?1",
                    params![id.as_bytes().as_slice()],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            row.map(|(token_id, canonical)| decode_row(token_id, canonical))
                .transpose()
        })
        .await
    }

    async fn get_tokens(&self, nonce: &Nonce) -> Result<Vec<StoredToken>> {
        let nonce = nonce.clone();

        self.blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT token_id, canonical_bytes, ingested_at FROM tokens
                 WHERE nonce = ?1
                 ORDER BY seq",
            )?;

            let rows = stmt
                .query_map(params![nonce.as_str()], |row| {
                    Ok((
                        row.get::<_, Vec<u8>>(0)?,
                        row.get::<_, Vec<u8>>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            rows.into_iter()
                .map(|(token_id, canonical, received_at)| {
                    Ok(StoredToken::new(decode_row(token_id, canonical)?, received_at))
                })
                .collect()
        })
        .await
    }

    async fn has_interaction(&self, nonce: &Nonce) -> Result<bool> {
        let nonce = nonce.clone();

        self.blocking(move |conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM tokens WHERE nonce = ?1)",
                params![nonce.as_str()],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
        .await
    }

    async fn list_interaction_ids(&self, query: &InteractionQuery) -> Result<Vec<Nonce>> {
        let query = query.clone();

        self.blocking(move |conn| {
            // seq = 1 rows are inserted before any other token of the same
            // interaction, so their rowid order is first-seen order.
            let mut sql = String::from("SELECT nonce FROM tokens WHERE seq = 1");
            let mut args: Vec<i64> = Vec::new();

            if let Some(types) = &query.first_types {
                if types.is_empty() {
                    return Ok(Vec::new());
                }
                let placeholders = vec!["?"; types.len()].join(", ");
                sql.push_str(&format!(" AND interaction_type IN ({placeholders})"));
                args.extend(types.iter().map(|t| i64::from(t.to_u16())));
            }

            sql.push_str(if query.reverse {
                " ORDER BY rowid DESC"
            } else {
                " ORDER BY rowid ASC"
            });
            sql.push_str(" LIMIT ? OFFSET ?");
            args.push(query.take.map_or(-1, |t| i64::try_from(t).unwrap_or(i64::MAX)));
            args.push(i64::try_from(query.skip).unwrap_or(i64::MAX));

            let mut stmt = conn.prepare(&sql)?;
            let nonces = stmt
                .query_map(params_from_iter(args), |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            nonces
                .into_iter()
                .map(|n| {
                    Nonce::new(n).map_err(|e| StoreError::Corrupt {
                        token_id: String::new(),
                        reason: e.to_string(),
                    })
                })
                .collect()
        })
        .await
    }
}
