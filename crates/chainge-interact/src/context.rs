//! Shared collaborators handed to interaction methods.

use std::sync::Arc;

use chainge_interact_store::TokenStore;
use chainge_interact_transport::{InboundSink, TransportKeeper};

use crate::config::AgentConfig;
use crate::events::EventBus;
use crate::identity::{IdentityWallet, Resolver};

/// Everything an interaction needs from its agent.
///
/// Interactions never hold this; it is passed to each call.
pub struct AgentContext {
    pub wallet: Arc<dyn IdentityWallet>,
    pub resolver: Arc<dyn Resolver>,
    pub store: Arc<dyn TokenStore>,
    pub transports: Arc<TransportKeeper>,
    pub events: Arc<EventBus>,
    pub config: AgentConfig,
    /// Where lazily bound transports deliver the tokens they receive.
    pub inbound: InboundSink,
}
