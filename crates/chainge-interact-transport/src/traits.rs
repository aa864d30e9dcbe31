//! Transport abstraction.
//!
//! A [`TransportHandler`] turns a [`TransportDescriptor`] into a live
//! [`TransportLink`]. Inbound raw tokens are pushed into an [`InboundSink`]
//! supplied by whoever started the link.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chainge_interact_core::TransportDescriptor;
use tokio::sync::mpsc;

use crate::error::Result;

/// Receives every raw token that arrives over a link.
pub type InboundSink = mpsc::UnboundedSender<String>;

/// A started transport: the `{send, ready?, stop?}` capability.
#[async_trait]
pub trait TransportLink: Send + Sync {
    /// Deliver an encoded token to the other side.
    async fn send(&self, token: &str) -> Result<()>;

    /// Resolve once the link is usable. Links that are usable as soon as
    /// they are started keep the default.
    async fn ready(&self) -> Result<()> {
        Ok(())
    }

    /// Tear the link down. Must be idempotent.
    async fn stop(&self) -> Result<()> {
        Ok(())
    }
}

/// Factory for links of one transport type.
#[async_trait]
pub trait TransportHandler: Send + Sync {
    /// The descriptor `type` this handler serves.
    fn transport_type(&self) -> &str;

    /// Start a link for `desc`, feeding inbound tokens into `on_message`.
    async fn start(
        &self,
        desc: &TransportDescriptor,
        on_message: InboundSink,
    ) -> Result<Arc<dyn TransportLink>>;
}

/// A started link stamped with the descriptor it was started from.
#[derive(Clone)]
pub struct TransportApi {
    desc: TransportDescriptor,
    link: Arc<dyn TransportLink>,
}

impl TransportApi {
    pub fn new(desc: TransportDescriptor, link: Arc<dyn TransportLink>) -> Self {
        Self { desc, link }
    }

    /// The descriptor this link was started from.
    pub fn descriptor(&self) -> &TransportDescriptor {
        &self.desc
    }

    pub async fn send(&self, token: &str) -> Result<()> {
        tracing::debug!(transport = %self.desc.kind, len = token.len(), "sending token");
        self.link.send(token).await
    }

    pub async fn ready(&self) -> Result<()> {
        self.link.ready().await
    }

    pub async fn stop(&self) -> Result<()> {
        tracing::debug!(transport = %self.desc.kind, "stopping transport");
        self.link.stop().await
    }
}

impl fmt::Debug for TransportApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportApi")
            .field("desc", &self.desc)
            .finish_non_exhaustive()
    }
}
