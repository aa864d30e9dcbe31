//! TokenStore trait: the abstract interface for token persistence.
//!
//! The store is a log. Interactions are never stored as objects; they are
//! rebuilt by replaying the tokens sharing a nonce.

use async_trait::async_trait;
use chainge_interact_core::{InteractionType, Nonce, Token, TokenId};

use crate::error::Result;

/// Result of inserting a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertResult {
    /// Token was inserted successfully.
    Inserted,
    /// Token already exists (idempotent - not an error).
    AlreadyExists,
    /// Conflict: a different token exists at the same (nonce, seq).
    Conflict {
        /// The existing token ID at this position.
        existing: TokenId,
    },
}

/// A logged token with the local time it was accepted.
///
/// Replay evaluates each token at `received_at`, the clock the live path
/// used, never at the issuer-claimed `issued_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredToken {
    pub token: Token,
    /// Local Unix ms at which the token was processed.
    pub received_at: i64,
}

impl StoredToken {
    pub fn new(token: Token, received_at: i64) -> Self {
        Self { token, received_at }
    }
}

/// Filter and page for [`TokenStore::list_interaction_ids`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InteractionQuery {
    /// Only interactions whose first token has one of these types.
    /// `None` matches everything.
    pub first_types: Option<Vec<InteractionType>>,
    pub take: Option<usize>,
    pub skip: usize,
    /// Newest first instead of oldest first.
    pub reverse: bool,
}

impl InteractionQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn first_types(mut self, types: Vec<InteractionType>) -> Self {
        self.first_types = Some(types);
        self
    }

    pub fn take(mut self, take: usize) -> Self {
        self.take = Some(take);
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    pub fn reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    pub(crate) fn matches(&self, first_type: InteractionType) -> bool {
        self.first_types
            .as_ref()
            .map_or(true, |types| types.contains(&first_type))
    }
}

/// The TokenStore trait: async interface for token persistence.
///
/// # Design Notes
///
/// - **Idempotent inserts**: Inserting the same token twice returns `AlreadyExists`.
/// - **Conflict detection**: A different token at an occupied (nonce, seq)
///   returns `Conflict` with the existing token ID.
/// - **Ordering**: interactions are listed in the order their first token
///   was stored.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Insert a token into the log, stamped with the local time it was
    /// processed. An `AlreadyExists` insert keeps the original stamp.
    async fn insert_token(&self, token: &Token, received_at: i64) -> Result<InsertResult>;

    /// Get a token by its content-addressed ID.
    async fn get_token(&self, id: &TokenId) -> Result<Option<Token>>;

    /// All tokens of one interaction with their receive times, ordered by seq.
    async fn get_tokens(&self, nonce: &Nonce) -> Result<Vec<StoredToken>>;

    /// Whether any token with this nonce is stored.
    async fn has_interaction(&self, nonce: &Nonce) -> Result<bool>;

    /// Interaction ids matching the query, filtered, ordered, then paged.
    async fn list_interaction_ids(&self, query: &InteractionQuery) -> Result<Vec<Nonce>>;
}
