//! Registry of transport handlers keyed by transport type.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chainge_interact_core::TransportDescriptor;

use crate::config::HttpConfig;
use crate::error::{Result, TransportError};
use crate::http::HttpTransport;
use crate::traits::{InboundSink, TransportApi, TransportHandler};
use crate::websocket::WebSocketTransport;

/// Looks up a handler by `desc.type` and starts links with it.
#[derive(Default)]
pub struct TransportKeeper {
    handlers: RwLock<HashMap<String, Arc<dyn TransportHandler>>>,
}

impl TransportKeeper {
    /// A keeper with no handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// A keeper with the HTTP callback and WebSocket handlers registered.
    pub fn with_defaults(http: HttpConfig) -> Self {
        let keeper = Self::new();
        keeper.register(Arc::new(HttpTransport::new(http)));
        keeper.register(Arc::new(WebSocketTransport));
        keeper
    }

    /// Register `handler` under its transport type, replacing any previous
    /// handler for that type.
    pub fn register(&self, handler: Arc<dyn TransportHandler>) {
        let kind = handler.transport_type().to_owned();
        tracing::debug!(transport = %kind, "registered transport handler");
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kind, handler);
    }

    pub fn supports(&self, kind: &str) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(kind)
    }

    /// Start a link for `desc`, stamping it with the descriptor.
    pub async fn start(
        &self,
        desc: &TransportDescriptor,
        on_message: InboundSink,
    ) -> Result<TransportApi> {
        let handler = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&desc.kind)
            .cloned()
            .ok_or_else(|| TransportError::NotSupported(desc.kind.clone()))?;

        let link = handler.start(desc, on_message).await?;
        tracing::debug!(transport = %desc.kind, "started transport");
        Ok(TransportApi::new(desc.clone(), link))
    }
}
