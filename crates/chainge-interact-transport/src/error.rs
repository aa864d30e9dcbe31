//! Error types for the transport module.

use thiserror::Error;

/// Errors that can occur while starting or using a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No handler is registered for the descriptor's type.
    #[error("transport not supported: {0}")]
    NotSupported(String),

    /// The descriptor's config has the wrong shape for its handler.
    #[error("invalid transport config: {0}")]
    InvalidConfig(String),

    /// Endpoint URL could not be parsed.
    #[error("invalid endpoint url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// HTTP client failure (connect, timeout, body read).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The callback endpoint answered with a non-success status.
    #[error("http status {status} from {url}")]
    HttpStatus { status: u16, url: String },

    /// A non-empty callback response did not carry a token.
    #[error("callback response has no token")]
    MissingToken,

    /// A response body was not valid JSON.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket protocol or connection failure.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The connection could not be established.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// No peer is listening on a relay endpoint.
    #[error("no peer on endpoint: {0}")]
    NoPeer(String),

    /// The link was stopped or its inbound consumer went away.
    #[error("transport closed")]
    Closed,
}

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;
