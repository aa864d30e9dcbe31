//! Registry of interactions, backed by the token log.
//!
//! The registry is a cache: any interaction with tokens in the log can be
//! rebuilt on demand, so entries are never required to stay resident.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chainge_interact_core::{Nonce, Token};
use chainge_interact_flow::FlowType;
use chainge_interact_store::InteractionQuery;
use chainge_interact_transport::TransportApi;
use tokio::sync::Mutex;

use crate::context::AgentContext;
use crate::error::{InteractionError, Result};
use crate::events::{InteractionEvent, InteractionEventKind};
use crate::interaction::Interaction;

/// An interaction shared between the registry and its users. The lock
/// serializes token processing per interaction.
pub type SharedInteraction = Arc<Mutex<Interaction>>;

/// Filter and paging for [`InteractionManager::list_interactions`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub flows: Option<Vec<FlowType>>,
    pub take: Option<usize>,
    pub skip: usize,
    pub reverse: bool,
}

impl ListOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flows(mut self, flows: Vec<FlowType>) -> Self {
        self.flows = Some(flows);
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

    fn to_query(&self) -> InteractionQuery {
        let mut query = InteractionQuery::new().skip(self.skip).reverse(self.reverse);
        if let Some(flows) = &self.flows {
            query = query.first_types(flows.iter().map(|f| f.first_message_type()).collect());
        }
        if let Some(take) = self.take {
            query = query.take(take);
        }
        query
    }
}

/// Creates, resumes and lists interactions.
pub struct InteractionManager {
    ctx: Arc<AgentContext>,
    interactions: RwLock<HashMap<Nonce, SharedInteraction>>,
}

impl InteractionManager {
    pub fn new(ctx: Arc<AgentContext>) -> Self {
        Self {
            ctx,
            interactions: RwLock::new(HashMap::new()),
        }
    }

    pub fn context(&self) -> &Arc<AgentContext> {
        &self.ctx
    }

    fn cached(&self, id: &Nonce) -> Option<SharedInteraction> {
        self.interactions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Insert unless another task got there first; the resident entry wins.
    fn insert(&self, id: Nonce, interaction: Interaction) -> (SharedInteraction, bool) {
        let mut map = self
            .interactions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match map.get(&id) {
            Some(existing) => (Arc::clone(existing), false),
            None => {
                let shared = Arc::new(Mutex::new(interaction));
                map.insert(id, Arc::clone(&shared));
                (shared, true)
            }
        }
    }

    fn emit(&self, kind: InteractionEventKind, interaction: &Interaction) {
        self.ctx.events.emit(&InteractionEvent {
            kind,
            id: interaction.id().clone(),
            flow: interaction.flow_type(),
            message_count: interaction.messages().len(),
        });
    }

    /// Whether `id` is resident or has tokens in the log.
    pub async fn knows(&self, id: &Nonce) -> Result<bool> {
        if self.cached(id).is_some() {
            return Ok(true);
        }
        Ok(self.ctx.store.has_interaction(id).await?)
    }

    /// Start a new interaction from its first token.
    pub async fn start(
        &self,
        token: &Token,
        transport: Option<TransportApi>,
    ) -> Result<SharedInteraction> {
        let id = token.nonce().clone();
        if self.knows(&id).await? {
            return Err(InteractionError::InteractionExists(id));
        }

        let mut interaction = Interaction::new(token)?;
        if let Some(transport) = transport {
            interaction.set_transport(transport);
        }
        if !interaction.process_interaction_token(token, &self.ctx).await? {
            return Err(InteractionError::Rejected(id));
        }

        let (shared, inserted) = self.insert(id.clone(), interaction);
        if !inserted {
            return Err(InteractionError::InteractionExists(id));
        }

        tracing::info!(%id, flow = %token.interaction_type(), "interaction started");
        self.emit(InteractionEventKind::Created, &*shared.lock().await);
        Ok(shared)
    }

    /// Look up an interaction, rebuilding it from the log if it is not
    /// resident.
    pub async fn get_interaction(&self, id: &Nonce) -> Result<SharedInteraction> {
        if let Some(shared) = self.cached(id) {
            return Ok(shared);
        }

        let tokens = self.ctx.store.get_tokens(id).await?;
        if tokens.is_empty() {
            return Err(InteractionError::NoSuchInteraction(id.clone()));
        }
        let interaction = Interaction::from_messages(&tokens, &self.ctx).await?;

        let (shared, inserted) = self.insert(id.clone(), interaction);
        if inserted {
            tracing::debug!(%id, tokens = tokens.len(), "interaction resumed from log");
            self.emit(InteractionEventKind::Resumed, &*shared.lock().await);
        }
        Ok(shared)
    }

    /// Process a continuation token on an existing interaction.
    pub async fn process(&self, token: &Token) -> Result<(SharedInteraction, bool)> {
        let shared = self.get_interaction(token.nonce()).await?;
        let accepted = self.process_on(&shared, token).await?;
        Ok((shared, accepted))
    }

    /// Process a token on a specific interaction handle.
    pub async fn process_on(&self, shared: &SharedInteraction, token: &Token) -> Result<bool> {
        let mut interaction = shared.lock().await;
        let accepted = interaction
            .process_interaction_token(token, &self.ctx)
            .await?;
        if accepted {
            self.emit(InteractionEventKind::Updated, &interaction);
        }
        Ok(accepted)
    }

    /// Decode a wire token and route it: continuation for a known nonce,
    /// otherwise a new interaction.
    pub async fn process_jwt(
        &self,
        raw: &str,
        transport: Option<TransportApi>,
    ) -> Result<(SharedInteraction, bool)> {
        let token = Token::decode(raw).map_err(InteractionError::invalid)?;

        if self.knows(token.nonce()).await? {
            let (shared, accepted) = self.process(&token).await?;
            if let Some(transport) = transport {
                let mut interaction = shared.lock().await;
                if interaction.transport().is_none() {
                    interaction.set_transport(transport);
                }
            }
            Ok((shared, accepted))
        } else {
            Ok((self.start(&token, transport).await?, true))
        }
    }

    /// Interactions in first-seen order, filtered by flow and paged.
    pub async fn list_interactions(&self, options: &ListOptions) -> Result<Vec<SharedInteraction>> {
        let ids = self
            .ctx
            .store
            .list_interaction_ids(&options.to_query())
            .await?;

        let mut interactions = Vec::with_capacity(ids.len());
        for id in &ids {
            interactions.push(self.get_interaction(id).await?);
        }
        Ok(interactions)
    }

    /// Drop a resident interaction. The log is untouched, so it can still be
    /// resumed.
    pub fn evict(&self, id: &Nonce) -> bool {
        self.interactions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .is_some()
    }

    /// Number of resident interactions.
    pub fn resident(&self) -> usize {
        self.interactions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Party;
    use chainge_interact_core::{
        AuthenticationBody, Message, ResolutionRequest, RpcPayload, RpcRequest,
    };
    use std::sync::Mutex as StdMutex;

    fn auth() -> Message {
        Message::Authentication(AuthenticationBody {
            description: "login".into(),
            callback_url: None,
        })
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let alice = Party::new(1);
        let manager = InteractionManager::new(alice.shared_context());

        let token = alice.request(auth()).await;
        manager.start(&token, None).await.unwrap();
        assert!(matches!(
            manager.start(&token, None).await,
            Err(InteractionError::InteractionExists(_))
        ));

        // also when only the log knows it
        manager.evict(token.nonce());
        assert!(matches!(
            manager.start(&token, None).await,
            Err(InteractionError::InteractionExists(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_interaction() {
        let alice = Party::new(1);
        let manager = InteractionManager::new(alice.shared_context());
        assert!(matches!(
            manager.get_interaction(&Nonce::random()).await,
            Err(InteractionError::NoSuchInteraction(_))
        ));
    }

    #[tokio::test]
    async fn test_events_and_resume() {
        let alice = Party::new(1);
        let bob = Party::new(2);
        let ctx = bob.shared_context();
        let manager = InteractionManager::new(Arc::clone(&ctx));

        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        ctx.events
            .subscribe(move |e| sink.lock().unwrap().push((e.kind, e.message_count)));

        let request = alice.request(auth()).await;
        let (shared, accepted) = manager.process_jwt(&request.encode(), None).await.unwrap();
        assert!(accepted);

        let response = shared
            .lock()
            .await
            .create_authentication_response(&ctx)
            .await
            .unwrap();
        let (_, accepted) = manager.process(&response).await.unwrap();
        assert!(accepted);

        assert!(manager.evict(request.nonce()));
        assert_eq!(manager.resident(), 0);
        let resumed = manager.get_interaction(request.nonce()).await.unwrap();
        assert_eq!(resumed.lock().await.messages().len(), 2);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (InteractionEventKind::Created, 1),
                (InteractionEventKind::Updated, 2),
                (InteractionEventKind::Resumed, 2),
            ]
        );
    }

    #[tokio::test]
    async fn test_rejected_continuation_emits_nothing() {
        let alice = Party::new(1);
        let bob = Party::new(2);
        let ctx = bob.shared_context();
        let manager = InteractionManager::new(Arc::clone(&ctx));

        let request = alice.request(auth()).await;
        manager.start(&request, None).await.unwrap();

        let count = Arc::new(StdMutex::new(0usize));
        let counter = Arc::clone(&count);
        ctx.events.subscribe(move |_| *counter.lock().unwrap() += 1);

        let mismatched = bob
            .sign(chainge_interact_core::TokenBuilder::reply(
                Message::Authentication(AuthenticationBody {
                    description: "other".into(),
                    callback_url: None,
                }),
                &request,
            ))
            .await;
        let (shared, accepted) = manager.process(&mismatched).await.unwrap();
        assert!(!accepted);
        assert_eq!(shared.lock().await.messages().len(), 1);
        assert_eq!(*count.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_list_filters_and_pages() {
        let alice = Party::new(1);
        let manager = InteractionManager::new(alice.shared_context());

        let first = alice.request(auth()).await;
        let second = alice
            .request(Message::ResolutionRequest(ResolutionRequest::default()))
            .await;
        let third = alice
            .request(Message::SigningRequest(RpcRequest {
                callback_url: "http://127.0.0.1:9/sign".into(),
                request: RpcPayload {
                    target: None,
                    data: b"data".to_vec(),
                },
            }))
            .await;
        for token in [&first, &second, &third] {
            manager.start(token, None).await.unwrap();
        }

        async fn ids(manager: &InteractionManager, options: ListOptions) -> Vec<Nonce> {
            let mut out = Vec::new();
            for shared in manager.list_interactions(&options).await.unwrap() {
                out.push(shared.lock().await.id().clone());
            }
            out
        }

        assert_eq!(
            ids(&manager, ListOptions::new()).await,
            vec![first.nonce().clone(), second.nonce().clone(), third.nonce().clone()]
        );
        assert_eq!(
            ids(&manager, ListOptions::new().reverse(true).take(1)).await,
            vec![third.nonce().clone()]
        );
        assert_eq!(
            ids(&manager, ListOptions::new().skip(1).take(1)).await,
            vec![second.nonce().clone()]
        );
        assert_eq!(
            ids(
                &manager,
                ListOptions::new().flows(vec![FlowType::Sign, FlowType::Authentication])
            )
            .await,
            vec![first.nonce().clone(), third.nonce().clone()]
        );
    }
}
