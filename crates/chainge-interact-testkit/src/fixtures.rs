//! Test fixtures and helpers.
//!
//! A [`TestNetwork`] is a shared resolver and in-memory relay; every
//! [`TestParty`] created from it can resolve the others and reach them over
//! `memory` transports.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use chainge_interact::{
    Agent, AgentConfig, AgentContext, IdentityWallet, InteractionError, InteractionManager,
    MemoryResolver, Resolver, SharedInteraction, SoftwareWallet,
};
use chainge_interact_core::{
    now_millis, AuthenticationBody, AuthorizationRequest, CredentialOffer, CredentialOfferRequest,
    CredentialRequest, CredentialRequirement, Did, EstablishChannelRequest, Message, Nonce,
    ResolutionRequest, RpcPayload, RpcRequest, SignedCredential, Token, TokenBuilder,
    TransportDescriptor, UnsignedCredential,
};
use chainge_interact_flow::FlowType;
use chainge_interact_store::{MemoryTokenStore, TokenStore};
use chainge_interact_transport::{InboundSink, MemoryHub, TransportKeeper, MEMORY_TRANSPORT};

/// Callback URL for requests whose replies are delivered by hand.
pub const UNUSED_CALLBACK: &str = "http://127.0.0.1:9/callback";

/// Shared resolver and relay for a group of parties.
pub struct TestNetwork {
    pub resolver: Arc<MemoryResolver>,
    pub hub: Arc<MemoryHub>,
}

impl TestNetwork {
    pub fn new() -> Self {
        Self {
            resolver: Arc::new(MemoryResolver::new()),
            hub: MemoryHub::new(),
        }
    }

    /// A party with a deterministic wallet and a memory store.
    pub fn party(&self, seed: u8) -> TestParty {
        self.party_with(seed, Arc::new(MemoryTokenStore::new()), AgentConfig::default())
    }

    pub fn party_with(
        &self,
        seed: u8,
        store: Arc<dyn TokenStore>,
        config: AgentConfig,
    ) -> TestParty {
        let wallet = Arc::new(SoftwareWallet::from_seed(&[seed; 32]));
        self.resolver.register(wallet.identity());

        let transports = Arc::new(TransportKeeper::with_defaults(config.http.clone()));
        transports.register(Arc::new(self.hub.handler()));

        let agent = Agent::with_transports(
            Arc::clone(&wallet) as Arc<dyn IdentityWallet>,
            Arc::clone(&self.resolver) as Arc<dyn Resolver>,
            store,
            transports,
            config,
        );
        TestParty { agent, wallet }
    }
}

impl Default for TestNetwork {
    fn default() -> Self {
        Self::new()
    }
}

/// An agent plus direct access to its wallet.
pub struct TestParty {
    pub agent: Agent,
    pub wallet: Arc<SoftwareWallet>,
}

impl TestParty {
    pub fn did(&self) -> &Did {
        self.agent.did()
    }

    pub fn ctx(&self) -> &AgentContext {
        self.agent.context()
    }

    pub fn manager(&self) -> &Arc<InteractionManager> {
        self.agent.manager()
    }

    /// Sign and start a first token for `message`.
    pub async fn request(
        &self,
        message: Message,
    ) -> chainge_interact::Result<(Token, SharedInteraction)> {
        self.agent.request(message, None).await
    }

    /// Sign a token from an arbitrary builder without processing it.
    pub async fn sign(&self, builder: TokenBuilder) -> chainge_interact::Result<Token> {
        Ok(self.wallet.sign_token(builder).await?)
    }

    /// Process a token as if it arrived over the wire. A refused token is an
    /// error here.
    pub async fn deliver(&self, token: &Token) -> chainge_interact::Result<SharedInteraction> {
        let (shared, accepted) = self.agent.process_jwt(&token.encode(), None).await?;
        if accepted {
            Ok(shared)
        } else {
            Err(InteractionError::Rejected(token.nonce().clone()))
        }
    }

    /// Accept a locally built token without sending it.
    pub async fn accept(
        &self,
        shared: &SharedInteraction,
        token: &Token,
    ) -> chainge_interact::Result<()> {
        if self.manager().process_on(shared, token).await? {
            Ok(())
        } else {
            Err(InteractionError::Rejected(token.nonce().clone()))
        }
    }

    /// Issue a credential of `kind` about `subject`.
    pub async fn issue(
        &self,
        kind: &str,
        subject: &Did,
        claim: Value,
        expires: Option<i64>,
    ) -> chainge_interact::Result<SignedCredential> {
        let credential = UnsignedCredential {
            id: format!("urn:chainge:credential:{}", Nonce::random()),
            kind: kind.to_owned(),
            issuer: self.did().clone(),
            subject: subject.clone(),
            claim,
            issued: now_millis(),
            expires,
        };
        Ok(self.wallet.sign_credential(credential).await?)
    }
}

/// A first message for every flow, with fixed contents.
pub fn first_message(flow: FlowType) -> Message {
    let rpc = |data: &[u8]| RpcRequest {
        callback_url: UNUSED_CALLBACK.into(),
        request: RpcPayload {
            target: None,
            data: data.to_vec(),
        },
    };

    match flow {
        FlowType::Authentication => Message::Authentication(AuthenticationBody {
            description: "log in".into(),
            callback_url: None,
        }),
        FlowType::Authorization => Message::AuthorizationRequest(AuthorizationRequest {
            description: "open the door".into(),
            image_url: None,
            action: Some("unlock".into()),
            callback_url: UNUSED_CALLBACK.into(),
        }),
        FlowType::CredentialOffer => Message::CredentialOfferRequest(CredentialOfferRequest {
            callback_url: UNUSED_CALLBACK.into(),
            offered_credentials: vec![CredentialOffer::new("dummy")],
        }),
        FlowType::CredentialShare => Message::CredentialRequest(CredentialRequest {
            callback_url: UNUSED_CALLBACK.into(),
            credential_requirements: vec![CredentialRequirement::new("dummy")],
        }),
        FlowType::EstablishChannel => Message::EstablishChannelRequest(EstablishChannelRequest {
            description: "duplex".into(),
            transports: vec![memory_transport("room")],
        }),
        FlowType::Encrypt => Message::EncryptionRequest(rpc(b"plaintext")),
        FlowType::Decrypt => Message::DecryptionRequest(rpc(b"ciphertext")),
        FlowType::Sign => Message::SigningRequest(rpc(b"document")),
        FlowType::Resolution => Message::ResolutionRequest(ResolutionRequest::default()),
    }
}

/// A `memory` transport descriptor for `endpoint`.
pub fn memory_transport(endpoint: &str) -> TransportDescriptor {
    TransportDescriptor::new(MEMORY_TRANSPORT, json!({ "endpoint": endpoint }))
}

/// Install a test subscriber. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

// ─────────────────────────────────────────────────────────────────────────────
// Callback server
// ─────────────────────────────────────────────────────────────────────────────

/// HTTP endpoint for callback URLs. Every `POST /callback` body's `token`
/// is pushed into the sink and answered with `204 No Content`.
pub struct CallbackServer {
    addr: SocketAddr,
    url: String,
    handle: JoinHandle<()>,
}

impl CallbackServer {
    pub async fn spawn(sink: InboundSink) -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let url = format!("http://{addr}/callback");

        let app = Router::new()
            .route("/callback", post(forward))
            .with_state(sink);
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::warn!(error = %e, "callback server stopped");
            }
        });

        Ok(Self { addr, url, handle })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Drop for CallbackServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[derive(Deserialize)]
struct Callback {
    token: String,
}

async fn forward(State(sink): State<InboundSink>, Json(body): Json<Callback>) -> StatusCode {
    match sink.send(body.token) {
        Ok(()) => StatusCode::NO_CONTENT,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainge_interact_transport::{HttpTransport, TransportHandler, HTTP_TRANSPORT};
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_parties_resolve_each_other() {
        let network = TestNetwork::new();
        let alice = network.party(1);
        let bob = network.party(2);

        let resolved = alice.ctx().resolver.resolve(bob.did()).await.unwrap();
        assert_eq!(resolved.encryption_key, Some(bob.wallet.encryption_key()));
        assert!(alice.agent.transports().supports(MEMORY_TRANSPORT));
    }

    #[tokio::test]
    async fn test_first_messages_open_their_flow() {
        for flow in FlowType::ALL {
            assert_eq!(
                first_message(flow).interaction_type(),
                flow.first_message_type()
            );
        }
    }

    #[tokio::test]
    async fn test_callback_server_forwards_tokens() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let server = CallbackServer::spawn(tx).await.unwrap();
        assert_eq!(server.url(), format!("http://{}/callback", server.addr()));

        // the server answers with no body, so nothing comes back inbound
        let (reply_tx, mut replies) = mpsc::unbounded_channel();
        let link = HttpTransport::default()
            .start(&TransportDescriptor::new(HTTP_TRANSPORT, json!(server.url())), reply_tx)
            .await
            .unwrap();
        link.send("abc").await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), "abc");
        assert!(replies.try_recv().is_err());
    }
}
