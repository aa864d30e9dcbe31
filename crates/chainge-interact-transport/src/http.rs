//! HTTP callback transport.
//!
//! `send` POSTs `{"token": ...}` to the callback URL. A non-empty success
//! body must be JSON with a `token` field, which is fed back as an inbound
//! message.

use std::sync::Arc;

use async_trait::async_trait;
use chainge_interact_core::TransportDescriptor;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::{endpoint_url, HttpConfig};
use crate::error::{Result, TransportError};
use crate::traits::{InboundSink, TransportHandler, TransportLink};

/// Transport type name of the HTTP callback transport.
pub const HTTP_TRANSPORT: &str = "http";

#[derive(Debug, Serialize, Deserialize)]
struct TokenEnvelope {
    token: String,
}

#[derive(Debug, Deserialize)]
struct CallbackReply {
    token: Option<String>,
}

/// Handler for `http` descriptors.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    config: HttpConfig,
}

impl HttpTransport {
    pub fn new(config: HttpConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl TransportHandler for HttpTransport {
    fn transport_type(&self) -> &str {
        HTTP_TRANSPORT
    }

    async fn start(
        &self,
        desc: &TransportDescriptor,
        on_message: InboundSink,
    ) -> Result<Arc<dyn TransportLink>> {
        let url = endpoint_url(&desc.config)?;
        let client = reqwest::Client::builder()
            .timeout(self.config.request_timeout)
            .build()?;
        Ok(Arc::new(HttpLink {
            client,
            url,
            on_message,
        }))
    }
}

struct HttpLink {
    client: reqwest::Client,
    url: Url,
    on_message: InboundSink,
}

#[async_trait]
impl TransportLink for HttpLink {
    async fn send(&self, token: &str) -> Result<()> {
        let response = self
            .client
            .post(self.url.clone())
            .json(&TokenEnvelope {
                token: token.to_owned(),
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::HttpStatus {
                status: status.as_u16(),
                url: self.url.to_string(),
            });
        }

        let body = response.bytes().await?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(());
        }

        let reply: CallbackReply = serde_json::from_slice(&body)?;
        let token = reply.token.ok_or(TransportError::MissingToken)?;
        tracing::debug!(url = %self.url, "callback answered with a token");
        self.on_message
            .send(token)
            .map_err(|_| TransportError::Closed)
    }
}
