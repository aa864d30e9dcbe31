//! The host-facing entry point: one identity with its store, transports and
//! registries.

use std::sync::Arc;

use chainge_interact_core::{Did, Message, Token, TokenBuilder};
use chainge_interact_store::TokenStore;
use chainge_interact_transport::{InboundSink, TransportApi, TransportKeeper};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::channel::ChannelKeeper;
use crate::config::AgentConfig;
use crate::context::AgentContext;
use crate::error::{InteractionError, Result};
use crate::events::EventBus;
use crate::identity::{IdentityWallet, Resolver};
use crate::manager::{InteractionManager, SharedInteraction};

/// An identity taking part in interactions.
///
/// Tokens that arrive on lazily bound transports (HTTP callback replies)
/// are queued; [`Agent::spawn_inbound`] drains the queue into
/// [`Agent::process_jwt`].
pub struct Agent {
    ctx: Arc<AgentContext>,
    manager: Arc<InteractionManager>,
    channels: ChannelKeeper,
    inbound: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
}

impl Agent {
    pub fn new(
        wallet: Arc<dyn IdentityWallet>,
        resolver: Arc<dyn Resolver>,
        store: Arc<dyn TokenStore>,
        config: AgentConfig,
    ) -> Self {
        let transports = Arc::new(TransportKeeper::with_defaults(config.http.clone()));
        Self::with_transports(wallet, resolver, store, transports, config)
    }

    /// Like [`Agent::new`] with a caller-provided transport registry.
    pub fn with_transports(
        wallet: Arc<dyn IdentityWallet>,
        resolver: Arc<dyn Resolver>,
        store: Arc<dyn TokenStore>,
        transports: Arc<TransportKeeper>,
        config: AgentConfig,
    ) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let ctx = Arc::new(AgentContext {
            wallet,
            resolver,
            store,
            transports,
            events: Arc::new(EventBus::new()),
            config,
            inbound: inbound_tx,
        });
        let manager = Arc::new(InteractionManager::new(Arc::clone(&ctx)));
        let channels = ChannelKeeper::new(Arc::clone(&manager));
        tracing::debug!(did = %ctx.wallet.did(), "agent created");
        Self {
            ctx,
            manager,
            channels,
            inbound: Mutex::new(Some(inbound_rx)),
        }
    }

    pub fn did(&self) -> &Did {
        self.ctx.wallet.did()
    }

    pub fn context(&self) -> &Arc<AgentContext> {
        &self.ctx
    }

    pub fn manager(&self) -> &Arc<InteractionManager> {
        &self.manager
    }

    pub fn channels(&self) -> &ChannelKeeper {
        &self.channels
    }

    pub fn events(&self) -> &EventBus {
        &self.ctx.events
    }

    pub fn transports(&self) -> &TransportKeeper {
        &self.ctx.transports
    }

    /// Sender for the agent's inbound queue.
    pub fn inbound_sink(&self) -> InboundSink {
        self.ctx.inbound.clone()
    }

    /// Sign a first token for `message` and start its interaction locally.
    /// The token is not sent; deliver it out of band or with
    /// [`Interaction::send`](crate::Interaction::send).
    pub async fn request(
        &self,
        message: Message,
        audience: Option<Did>,
    ) -> Result<(Token, SharedInteraction)> {
        let mut builder = TokenBuilder::request(message).audience(audience);
        if let Some(ttl) = self.ctx.config.token_ttl_millis() {
            builder = builder.ttl_millis(ttl);
        }
        let token = self.ctx.wallet.sign_token(builder).await?;
        let shared = self.manager.start(&token, None).await?;
        Ok((token, shared))
    }

    /// Accept a locally built token on `shared` and send it to the
    /// counterparty.
    pub async fn respond(&self, shared: &SharedInteraction, token: &Token) -> Result<()> {
        if !self.manager.process_on(shared, token).await? {
            return Err(InteractionError::Rejected(token.nonce().clone()));
        }
        shared.lock().await.send(token, &self.ctx).await
    }

    /// Process a raw token from any source.
    pub async fn process_jwt(
        &self,
        raw: &str,
        transport: Option<TransportApi>,
    ) -> Result<(SharedInteraction, bool)> {
        self.manager.process_jwt(raw, transport).await
    }

    /// Drain the inbound queue in a background task. Returns `None` if the
    /// queue is already being drained.
    pub async fn spawn_inbound(&self) -> Option<JoinHandle<()>> {
        let mut rx = self.inbound.lock().await.take()?;
        let manager = Arc::clone(&self.manager);
        Some(tokio::spawn(async move {
            while let Some(raw) = rx.recv().await {
                match manager.process_jwt(&raw, None).await {
                    Ok((shared, accepted)) => {
                        let id = shared.lock().await.id().clone();
                        tracing::debug!(%id, accepted, "processed inbound token");
                    }
                    Err(e) => tracing::warn!(error = %e, "dropping inbound token"),
                }
            }
        }))
    }
}
