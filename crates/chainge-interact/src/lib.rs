//! # Chainge Interact
//!
//! Multi-step, signed exchanges between two identities.
//!
//! ## Overview
//!
//! An exchange is an *interaction*: an ordered chain of signed tokens that
//! share a nonce. Each token is validated against the one before it, run
//! through the interaction's flow state machine, and persisted. Nothing else
//! is stored; interactions are rebuilt from the token log on demand.
//!
//! - **Interactions**: one nonce, one [`Flow`](chainge_interact_flow::Flow)
//! - **Manager**: creates, resumes, lists and routes interactions
//! - **Channels**: a negotiated duplex transport carrying many interactions
//! - **Agent**: an identity with its wallet, resolver, store and transports
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use chainge_interact::core::{AuthenticationBody, Message};
//! use chainge_interact::store::SqliteTokenStore;
//! use chainge_interact::{Agent, AgentConfig, MemoryResolver, SoftwareWallet};
//!
//! async fn example() {
//!     let agent = Agent::new(
//!         Arc::new(SoftwareWallet::generate()),
//!         Arc::new(MemoryResolver::new()),
//!         Arc::new(SqliteTokenStore::open("interact.db").unwrap()),
//!         AgentConfig::default(),
//!     );
//!
//!     let (token, _interaction) = agent
//!         .request(
//!             Message::Authentication(AuthenticationBody {
//!                 description: "log in".into(),
//!                 callback_url: Some("https://example.com/callback".into()),
//!             }),
//!             None,
//!         )
//!         .await
//!         .unwrap();
//!
//!     // hand `token.encode()` to the other party, e.g. as a QR code
//!     println!("{}", token.encode());
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `chainge_interact::core` - Tokens, messages and credentials
//! - `chainge_interact::flow` - Flow state machines
//! - `chainge_interact::store` - Token log
//! - `chainge_interact::transport` - Transports

pub mod agent;
pub mod channel;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod identity;
pub mod interaction;
pub mod manager;

pub use chainge_interact_core as core;
pub use chainge_interact_flow as flow;
pub use chainge_interact_store as store;
pub use chainge_interact_transport as transport;

pub use agent::Agent;
pub use channel::{Channel, ChannelKeeper, InteractionCallback, PendingThread};
pub use config::AgentConfig;
pub use context::AgentContext;
pub use error::{ChannelError, IdentityError, InteractionError, Result};
pub use events::{EventBus, InteractionEvent, InteractionEventKind, SubscriptionId};
pub use identity::{
    EncryptionPublicKey, Identity, IdentityWallet, MemoryResolver, Resolver, SoftwareWallet,
};
pub use interaction::{Interaction, InteractionSummary, ParticipantSummary, Participants, Role};
pub use manager::{InteractionManager, ListOptions, SharedInteraction};

/// Parties and contexts shared by the unit tests.
#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use chainge_interact_core::{Did, Message, Token, TokenBuilder};
    use chainge_interact_store::MemoryTokenStore;
    use chainge_interact_transport::TransportKeeper;
    use tokio::sync::mpsc;

    use crate::config::AgentConfig;
    use crate::context::AgentContext;
    use crate::events::EventBus;
    use crate::identity::{IdentityWallet, MemoryResolver, SoftwareWallet};

    /// A context around `wallet` with a memory store and a resolver that
    /// knows the wallet's full identity.
    pub fn context(wallet: SoftwareWallet) -> (AgentContext, mpsc::UnboundedReceiver<String>) {
        let resolver = MemoryResolver::new();
        resolver.register(wallet.identity());
        let (inbound, rx) = mpsc::unbounded_channel();
        let ctx = AgentContext {
            wallet: Arc::new(wallet),
            resolver: Arc::new(resolver),
            store: Arc::new(MemoryTokenStore::new()),
            transports: Arc::new(TransportKeeper::with_defaults(Default::default())),
            events: Arc::new(EventBus::new()),
            config: AgentConfig::default(),
            inbound,
        };
        (ctx, rx)
    }

    pub struct Party {
        pub ctx: Arc<AgentContext>,
        pub inbound: mpsc::UnboundedReceiver<String>,
    }

    impl Party {
        pub fn new(seed: u8) -> Self {
            let (ctx, inbound) = context(SoftwareWallet::from_seed(&[seed; 32]));
            Self {
                ctx: Arc::new(ctx),
                inbound,
            }
        }

        pub fn did(&self) -> &Did {
            self.ctx.wallet.did()
        }

        pub fn shared_context(&self) -> Arc<AgentContext> {
            Arc::clone(&self.ctx)
        }

        pub async fn sign(&self, builder: TokenBuilder) -> Token {
            self.ctx.wallet.sign_token(builder).await.unwrap()
        }

        /// A signed first token for `message`.
        pub async fn request(&self, message: Message) -> Token {
            let ttl = self.ctx.config.token_ttl_millis().unwrap();
            self.sign(TokenBuilder::request(message).ttl_millis(ttl))
                .await
        }
    }
}
