//! In-memory relay transport.
//!
//! A [`MemoryHub`] is a set of named rooms. Every link started with
//! `{"endpoint": name}` joins room `name`; a token sent on a link is
//! delivered to every other member of the same room. Both parties of a
//! channel can therefore start links from the same descriptor.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chainge_interact_core::TransportDescriptor;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::{Result, TransportError};
use crate::traits::{InboundSink, TransportHandler, TransportLink};

/// Transport type name of the in-memory relay.
pub const MEMORY_TRANSPORT: &str = "memory";

/// Shared state for the in-memory relay.
#[derive(Default)]
pub struct MemoryHub {
    rooms: RwLock<HashMap<String, Vec<(u64, InboundSink)>>>,
    next_member: AtomicU64,
}

impl MemoryHub {
    /// Create a new hub.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Handler for `memory` descriptors backed by this hub.
    pub fn handler(self: &Arc<Self>) -> MemoryTransport {
        MemoryTransport {
            hub: Arc::clone(self),
        }
    }

    /// Join `endpoint`, returning the member id used to leave it.
    pub async fn join(&self, endpoint: &str, sink: InboundSink) -> u64 {
        let member = self.next_member.fetch_add(1, Ordering::Relaxed);
        self.rooms
            .write()
            .await
            .entry(endpoint.to_owned())
            .or_default()
            .push((member, sink));
        member
    }

    pub async fn leave(&self, endpoint: &str, member: u64) {
        let mut rooms = self.rooms.write().await;
        if let Some(members) = rooms.get_mut(endpoint) {
            members.retain(|(id, _)| *id != member);
            if members.is_empty() {
                rooms.remove(endpoint);
            }
        }
    }

    /// Deliver `token` to every member of `endpoint` except `from`.
    pub async fn publish(&self, endpoint: &str, from: u64, token: &str) -> Result<()> {
        let rooms = self.rooms.read().await;
        let mut delivered = 0usize;
        for (_, sink) in rooms
            .get(endpoint)
            .into_iter()
            .flatten()
            .filter(|(id, _)| *id != from)
        {
            if sink.send(token.to_owned()).is_ok() {
                delivered += 1;
            }
        }

        if delivered == 0 {
            return Err(TransportError::NoPeer(endpoint.to_owned()));
        }
        Ok(())
    }

    /// Number of members currently in `endpoint`.
    pub async fn members(&self, endpoint: &str) -> usize {
        self.rooms.read().await.get(endpoint).map_or(0, Vec::len)
    }
}

/// Handler for `memory` descriptors.
#[derive(Clone)]
pub struct MemoryTransport {
    hub: Arc<MemoryHub>,
}

fn endpoint_name(config: &Value) -> Result<String> {
    config
        .get("endpoint")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| TransportError::InvalidConfig("missing `endpoint`".into()))
}

#[async_trait]
impl TransportHandler for MemoryTransport {
    fn transport_type(&self) -> &str {
        MEMORY_TRANSPORT
    }

    async fn start(
        &self,
        desc: &TransportDescriptor,
        on_message: InboundSink,
    ) -> Result<Arc<dyn TransportLink>> {
        let endpoint = endpoint_name(&desc.config)?;
        let member = self.hub.join(&endpoint, on_message).await;
        Ok(Arc::new(MemoryLink {
            hub: Arc::clone(&self.hub),
            endpoint,
            member,
            stopped: AtomicBool::new(false),
        }))
    }
}

struct MemoryLink {
    hub: Arc<MemoryHub>,
    endpoint: String,
    member: u64,
    stopped: AtomicBool,
}

#[async_trait]
impl TransportLink for MemoryLink {
    async fn send(&self, token: &str) -> Result<()> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        self.hub.publish(&self.endpoint, self.member, token).await
    }

    async fn stop(&self) -> Result<()> {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            self.hub.leave(&self.endpoint, self.member).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn desc(endpoint: &str) -> TransportDescriptor {
        TransportDescriptor::new(MEMORY_TRANSPORT, json!({ "endpoint": endpoint }))
    }

    #[tokio::test]
    async fn test_relay_between_members() {
        let hub = MemoryHub::new();
        let handler = hub.handler();

        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let a = handler.start(&desc("room"), tx_a).await.unwrap();
        let b = handler.start(&desc("room"), tx_b).await.unwrap();

        a.send("from-a").await.unwrap();
        b.send("from-b").await.unwrap();

        assert_eq!(rx_b.recv().await.unwrap(), "from-a");
        assert_eq!(rx_a.recv().await.unwrap(), "from-b");
        // no echo to the sender
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_without_peer() {
        let hub = MemoryHub::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let lonely = hub.handler().start(&desc("empty"), tx).await.unwrap();

        assert!(matches!(
            lonely.send("x").await,
            Err(TransportError::NoPeer(_))
        ));
    }

    #[tokio::test]
    async fn test_stop_leaves_room() {
        let hub = MemoryHub::new();
        let handler = hub.handler();
        let (tx_a, _rx_a) = mpsc::unbounded_channel();
        let (tx_b, _rx_b) = mpsc::unbounded_channel();
        let a = handler.start(&desc("room"), tx_a).await.unwrap();
        let _b = handler.start(&desc("room"), tx_b).await.unwrap();
        assert_eq!(hub.members("room").await, 2);

        a.stop().await.unwrap();
        a.stop().await.unwrap();
        assert_eq!(hub.members("room").await, 1);
        assert!(matches!(a.send("x").await, Err(TransportError::Closed)));
    }

    #[tokio::test]
    async fn test_missing_endpoint() {
        let hub = MemoryHub::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = hub
            .handler()
            .start(&TransportDescriptor::new(MEMORY_TRANSPORT, json!({})), tx)
            .await;
        assert!(matches!(result, Err(TransportError::InvalidConfig(_))));
    }
}
