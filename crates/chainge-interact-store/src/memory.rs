//! In-memory implementation of the TokenStore trait.
//!
//! Same semantics as SQLite but nothing survives a drop.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use chainge_interact_core::{InteractionType, Nonce, Token, TokenId};

use crate::error::{Result, StoreError};
use crate::traits::{InsertResult, InteractionQuery, StoredToken, TokenStore};

/// In-memory store implementation. Thread-safe via RwLock.
#[derive(Default)]
pub struct MemoryTokenStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Tokens indexed by ID.
    tokens: HashMap<TokenId, StoredToken>,

    /// Per-interaction position index: seq -> token id.
    interactions: HashMap<Nonce, BTreeMap<u32, TokenId>>,

    /// Interactions in first-seen order, with the type of their first token.
    order: Vec<(Nonce, InteractionType)>,
}

impl MemoryTokenStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored tokens.
    pub fn len(&self) -> usize {
        self.inner.read().map(|i| i.tokens.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn insert_token(&self, token: &Token, received_at: i64) -> Result<InsertResult> {
        let mut inner = self.inner.write().map_err(|_| StoreError::Poisoned)?;

        let token_id = token.compute_id();
        if inner.tokens.contains_key(&token_id) {
            return Ok(InsertResult::AlreadyExists);
        }

        let nonce = token.nonce().clone();
        if let Some(existing) = inner
            .interactions
            .get(&nonce)
            .and_then(|positions| positions.get(&token.seq()))
        {
            return Ok(InsertResult::Conflict {
                existing: *existing,
            });
        }

        if !inner.interactions.contains_key(&nonce) {
            inner
                .order
                .push((nonce.clone(), token.interaction_type()));
        }
        inner
            .interactions
            .entry(nonce)
            .or_default()
            .insert(token.seq(), token_id);
        inner
            .tokens
            .insert(token_id, StoredToken::new(token.clone(), received_at));

        Ok(InsertResult::Inserted)
    }

    async fn get_token(&self, id: &TokenId) -> Result<Option<Token>> {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(inner.tokens.get(id).map(|stored| stored.token.clone()))
    }

    async fn get_tokens(&self, nonce: &Nonce) -> Result<Vec<StoredToken>> {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(inner
            .interactions
            .get(nonce)
            .map(|positions| {
                positions
                    .values()
                    .filter_map(|id| inner.tokens.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn has_interaction(&self, nonce: &Nonce) -> Result<bool> {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(inner.interactions.contains_key(nonce))
    }

    async fn list_interaction_ids(&self, query: &InteractionQuery) -> Result<Vec<Nonce>> {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;

        let matching = inner
            .order
            .iter()
            .filter(|(_, first_type)| query.matches(*first_type))
            .map(|(nonce, _)| nonce.clone());

        let ordered: Vec<Nonce> = if query.reverse {
            matching.rev().collect()
        } else {
            matching.collect()
        };

        Ok(ordered
            .into_iter()
            .skip(query.skip)
            .take(query.take.unwrap_or(usize::MAX))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[tokio::test]
    async fn test_insert_and_replay() {
        test_support::insert_and_replay(&MemoryTokenStore::new()).await;
    }

    #[tokio::test]
    async fn test_idempotent_and_conflict() {
        test_support::idempotent_and_conflict(&MemoryTokenStore::new()).await;
    }

    #[tokio::test]
    async fn test_listing() {
        test_support::listing(&MemoryTokenStore::new()).await;
    }

    #[tokio::test]
    async fn test_len() {
        let store = MemoryTokenStore::new();
        assert!(store.is_empty());
        let chain = test_support::chain(3);
        for token in &chain {
            store.insert_token(token, 1_000).await.unwrap();
        }
        assert_eq!(store.len(), 3);
    }
}
