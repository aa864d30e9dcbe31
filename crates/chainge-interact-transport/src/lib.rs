//! # Chainge Interact Transport
//!
//! Message transports for Chainge Interact.
//!
//! A transport is started from a [`TransportDescriptor`] (`{type, config}`)
//! and yields a link that can `send` raw tokens, optionally signal `ready`,
//! and be `stop`ped. Inbound tokens are pushed into an [`InboundSink`].
//!
//! ## Built-in transports
//!
//! | Type | Handler | Config |
//! |------|---------|--------|
//! | `http` | [`HttpTransport`] | URL string or `{ "url": ... }` |
//! | `websocket` | [`WebSocketTransport`] | `ws://`/`wss://` URL string or `{ "url": ... }` |
//! | `memory` | [`MemoryTransport`] | `{ "endpoint": name }` |
//!
//! [`TransportKeeper::with_defaults`] registers `http` and `websocket`. The
//! in-memory relay is registered explicitly from a [`MemoryHub`].
//!
//! [`TransportDescriptor`]: chainge_interact_core::TransportDescriptor

pub mod config;
pub mod error;
pub mod http;
pub mod keeper;
pub mod memory;
pub mod traits;
pub mod websocket;

pub use config::{endpoint_url, HttpConfig};
pub use error::{Result, TransportError};
pub use http::{HttpTransport, HTTP_TRANSPORT};
pub use keeper::TransportKeeper;
pub use memory::{MemoryHub, MemoryTransport, MEMORY_TRANSPORT};
pub use traits::{InboundSink, TransportApi, TransportHandler, TransportLink};
pub use websocket::{WebSocketTransport, WEBSOCKET_TRANSPORT};
