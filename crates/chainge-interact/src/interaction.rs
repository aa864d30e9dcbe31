//! A single exchange between two identities.
//!
//! An [`Interaction`] owns the ordered tokens of one nonce, the [`Flow`] they
//! drive, and the identities that signed them. Tokens are validated against
//! the previous one, dispatched to the flow, and only then appended and
//! persisted. A refused token leaves the interaction exactly as it was.

use serde::{Deserialize, Serialize};
use serde_json::json;

use chainge_interact_core::{
    now_millis, validate_first, validate_successor, validate_token, AuthenticationBody,
    AuthorizationDetails, CredentialOfferResponse, CredentialResponse, CredentialsReceive, Did,
    EstablishChannelResponse, InteractionType, Message, Nonce, ResolutionResponse, RpcRequest,
    RpcResponse, SelectedCredential, SignedCredential, Token, TokenBuilder, TransportDescriptor,
    ValidationError,
};
use chainge_interact_flow::{CredentialCheck, Flow, FlowType, Outcome, TransitionContext};
use chainge_interact_store::{InsertResult, StoredToken};
use chainge_interact_transport::{TransportApi, HTTP_TRANSPORT};

use crate::context::AgentContext;
use crate::error::{InteractionError, Result};
use crate::identity::Identity;

/// Which side of an interaction the local identity is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    Requester,
    Responder,
}

/// Signers of an interaction, filled in as their tokens are accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Participants {
    pub requester: Option<Identity>,
    pub responder: Option<Identity>,
}

impl Participants {
    /// The first signer is the requester, the next distinct one the responder.
    fn admit(&mut self, signer: &Identity) {
        match &self.requester {
            None => self.requester = Some(signer.clone()),
            Some(requester) if requester.did != signer.did && self.responder.is_none() => {
                self.responder = Some(signer.clone())
            }
            Some(_) => {}
        }
    }

    fn role_of(&self, did: &Did) -> Option<Role> {
        if self.requester.as_ref().is_some_and(|r| &r.did == did) {
            Some(Role::Requester)
        } else if self.responder.as_ref().is_some_and(|r| &r.did == did) {
            Some(Role::Responder)
        } else {
            None
        }
    }

    fn dids(&self) -> (Option<Did>, Option<Did>) {
        (
            self.requester.as_ref().map(|i| i.did.clone()),
            self.responder.as_ref().map(|i| i.did.clone()),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParticipantSummary {
    pub requester: Option<Did>,
    pub responder: Option<Did>,
}

/// Serializable snapshot of an interaction for hosts.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionSummary {
    pub id: Nonce,
    pub flow: FlowType,
    pub state: Flow,
    pub participants: ParticipantSummary,
    pub role: Option<Role>,
    pub message_count: usize,
}

/// Everything a token changes, computed before anything is committed.
struct Staged {
    flow: Flow,
    participants: Participants,
    role: Option<Role>,
}

/// One exchange, identified by the nonce of its first token.
#[derive(Debug)]
pub struct Interaction {
    id: Nonce,
    messages: Vec<Token>,
    flow: Flow,
    participants: Participants,
    role: Option<Role>,
    transport: Option<TransportApi>,
}

impl Interaction {
    /// An empty interaction for the flow `first` opens. `first` is not
    /// processed.
    pub(crate) fn new(first: &Token) -> Result<Self> {
        let flow = Flow::for_first_message(first.interaction_type())
            .ok_or(InteractionError::NotAFirstMessage(first.interaction_type()))?;
        Ok(Self {
            id: first.nonce().clone(),
            messages: Vec::new(),
            flow,
            participants: Participants::default(),
            role: None,
            transport: None,
        })
    }

    /// Rebuild an interaction by replaying stored tokens through the same
    /// checks as live processing, without persisting them again.
    ///
    /// Time-dependent checks run at each token's `received_at`, the clock
    /// it was accepted at, so a log accepted live still replays after its
    /// tokens expire.
    pub async fn from_messages(tokens: &[StoredToken], ctx: &AgentContext) -> Result<Self> {
        let first = tokens.first().ok_or(InteractionError::NoTokens)?;
        let mut interaction = Self::new(&first.token)?;

        for StoredToken { token, received_at } in tokens {
            let staged = interaction
                .evaluate(token, ctx, *received_at)
                .await?
                .ok_or_else(|| InteractionError::CorruptLog {
                    id: interaction.id.clone(),
                    seq: token.seq(),
                })?;
            interaction.commit(token, staged);
        }

        Ok(interaction)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn id(&self) -> &Nonce {
        &self.id
    }

    pub fn messages(&self) -> &[Token] {
        &self.messages
    }

    pub fn first_message(&self) -> Option<&Token> {
        self.messages.first()
    }

    pub fn last_message(&self) -> Option<&Token> {
        self.messages.last()
    }

    pub fn flow(&self) -> &Flow {
        &self.flow
    }

    pub fn flow_type(&self) -> FlowType {
        self.flow.flow_type()
    }

    pub fn participants(&self) -> &Participants {
        &self.participants
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    /// The party on the other side from the local identity.
    ///
    /// Until the local identity has signed a token here, it can only be the
    /// responder, so the counterparty is the requester.
    pub fn counterparty(&self) -> Option<&Identity> {
        match self.role {
            Some(Role::Requester) => self.participants.responder.as_ref(),
            Some(Role::Responder) | None => self.participants.requester.as_ref(),
        }
    }

    pub fn transport(&self) -> Option<&TransportApi> {
        self.transport.as_ref()
    }

    pub fn set_transport(&mut self, transport: TransportApi) {
        self.transport = Some(transport);
    }

    pub fn summary(&self) -> InteractionSummary {
        let (requester, responder) = self.participants.dids();
        InteractionSummary {
            id: self.id.clone(),
            flow: self.flow.flow_type(),
            state: self.flow.clone(),
            participants: ParticipantSummary {
                requester,
                responder,
            },
            role: self.role,
            message_count: self.messages.len(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Processing
    // ─────────────────────────────────────────────────────────────────────────

    /// Validate, dispatch, persist and append a token.
    ///
    /// Returns `false` when the flow refuses the token; nothing changes in
    /// that case. Chain, signature and structure failures are
    /// [`InteractionError::InvalidToken`].
    pub async fn process_interaction_token(
        &mut self,
        token: &Token,
        ctx: &AgentContext,
    ) -> Result<bool> {
        let now = now_millis();
        let Some(staged) = self.evaluate(token, ctx, now).await? else {
            tracing::debug!(id = %self.id, seq = token.seq(), kind = %token.interaction_type(), "token rejected by flow");
            return Ok(false);
        };

        match ctx.store.insert_token(token, now).await? {
            InsertResult::Inserted | InsertResult::AlreadyExists => {}
            InsertResult::Conflict { existing } => {
                return Err(InteractionError::Conflict {
                    id: self.id.clone(),
                    seq: token.seq(),
                    existing,
                })
            }
        }

        self.commit(token, staged);
        tracing::debug!(id = %self.id, seq = token.seq(), kind = %token.interaction_type(), "token accepted");

        if self.transport.is_none() {
            self.bind_callback(token, ctx).await;
        }
        Ok(true)
    }

    async fn evaluate(&self, token: &Token, ctx: &AgentContext, now: i64) -> Result<Option<Staged>> {
        match self.messages.last() {
            None => {
                validate_first(token).map_err(InteractionError::invalid)?;
                if token.nonce() != &self.id {
                    return Err(InteractionError::invalid(ValidationError::NonceMismatch {
                        expected: self.id.to_string(),
                        got: token.nonce().to_string(),
                    }));
                }
            }
            Some(prev) => validate_successor(token, prev).map_err(InteractionError::invalid)?,
        }

        let signer = ctx.resolver.resolve(token.issuer()).await.map_err(|e| {
            InteractionError::invalid(ValidationError::UnknownIssuer(format!(
                "{}: {e}",
                token.issuer()
            )))
        })?;
        validate_token(token, &signer.signing_key, now).map_err(InteractionError::invalid)?;
        let message = token.message().map_err(InteractionError::invalid)?;

        let mut participants = self.participants.clone();
        participants.admit(&signer);

        let (requester, responder) = participants.dids();
        let transition = TransitionContext::new(now)
            .with_participants(requester, responder)
            .with_credential_checks(check_credentials(&message, ctx).await);

        Ok(match self.flow.apply(&message, &transition)? {
            Outcome::Accepted(flow) => {
                let role = self
                    .role
                    .or_else(|| participants.role_of(ctx.wallet.did()));
                Some(Staged {
                    flow,
                    participants,
                    role,
                })
            }
            Outcome::Rejected => None,
        })
    }

    fn commit(&mut self, token: &Token, staged: Staged) {
        self.flow = staged.flow;
        self.participants = staged.participants;
        self.role = staged.role;
        self.messages.push(token.clone());
    }

    /// Bind an HTTP transport to the callback a counterparty token names.
    async fn bind_callback(&mut self, token: &Token, ctx: &AgentContext) {
        if token.issuer() == ctx.wallet.did() {
            return;
        }
        let Some(url) = token
            .message()
            .ok()
            .and_then(|m| m.callback_url().map(str::to_owned))
        else {
            return;
        };
        if let Err(e) = self.bind_http(&url, ctx).await {
            tracing::warn!(id = %self.id, %url, error = %e, "could not bind callback transport");
        }
    }

    async fn bind_http(&mut self, url: &str, ctx: &AgentContext) -> Result<TransportApi> {
        let desc = TransportDescriptor::new(HTTP_TRANSPORT, json!(url));
        let api = ctx.transports.start(&desc, ctx.inbound.clone()).await?;
        tracing::debug!(id = %self.id, %url, "bound callback transport");
        self.transport = Some(api.clone());
        Ok(api)
    }

    /// Callback URL from the first counterparty token that carries one.
    fn counterparty_callback(&self, me: &Did) -> Option<String> {
        self.messages
            .iter()
            .filter(|t| t.issuer() != me)
            .find_map(|t| t.message().ok()?.callback_url().map(str::to_owned))
    }

    /// Deliver a token over the bound transport, binding one from the
    /// counterparty's callback if none is bound yet.
    pub async fn send(&mut self, token: &Token, ctx: &AgentContext) -> Result<()> {
        let transport = match &self.transport {
            Some(transport) => transport.clone(),
            None => {
                let url = self
                    .counterparty_callback(ctx.wallet.did())
                    .ok_or_else(|| InteractionError::MissingTransport(self.id.clone()))?;
                self.bind_http(&url, ctx).await?
            }
        };
        transport.send(&token.encode()).await?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Response builders
    //
    // These sign the next token of the interaction. They never change state;
    // the caller processes the token like any other.
    // ─────────────────────────────────────────────────────────────────────────

    fn expect_flow(&self, operation: &'static str, expected: FlowType) -> Result<()> {
        let actual = self.flow.flow_type();
        if actual == expected {
            Ok(())
        } else {
            Err(InteractionError::WrongFlow { operation, actual })
        }
    }

    /// The latest token of `kind` and its decoded body.
    fn find_request<T>(
        &self,
        kind: InteractionType,
        extract: impl FnOnce(Message) -> Option<T>,
    ) -> Result<(&Token, T)> {
        let token = self
            .messages
            .iter()
            .rev()
            .find(|t| t.interaction_type() == kind)
            .ok_or(InteractionError::MissingRequest(kind))?;
        let body = extract(token.message()?).ok_or(InteractionError::MissingRequest(kind))?;
        Ok((token, body))
    }

    async fn reply(&self, message: Message, ctx: &AgentContext) -> Result<Token> {
        let last = self.messages.last().ok_or(InteractionError::MissingRequest(
            self.flow.flow_type().first_message_type(),
        ))?;
        let mut builder = TokenBuilder::reply(message, last);
        if let Some(ttl) = ctx.config.token_ttl_millis() {
            builder = builder.ttl_millis(ttl);
        }
        Ok(ctx.wallet.sign_token(builder).await?)
    }

    pub async fn create_authentication_response(&self, ctx: &AgentContext) -> Result<Token> {
        self.expect_flow("authentication response", FlowType::Authentication)?;
        let (_, request) = self.find_request(InteractionType::Authentication, |m| match m {
            Message::Authentication(body) => Some(body),
            _ => None,
        })?;
        let body = AuthenticationBody {
            description: request.description,
            callback_url: None,
        };
        self.reply(Message::Authentication(body), ctx).await
    }

    pub async fn create_authorization_response(&self, ctx: &AgentContext) -> Result<Token> {
        self.expect_flow("authorization response", FlowType::Authorization)?;
        let (_, request) = self.find_request(InteractionType::AuthorizationRequest, |m| match m {
            Message::AuthorizationRequest(body) => Some(body),
            _ => None,
        })?;
        let details = AuthorizationDetails::from(&request);
        self.reply(Message::AuthorizationResponse(details), ctx).await
    }

    /// Select the transport at `index` of the offered list.
    pub async fn create_establish_channel_response(
        &self,
        index: usize,
        ctx: &AgentContext,
    ) -> Result<Token> {
        self.expect_flow("establish channel response", FlowType::EstablishChannel)?;
        self.find_request(InteractionType::EstablishChannelRequest, |m| match m {
            Message::EstablishChannelRequest(body) => Some(body),
            _ => None,
        })?;
        let body = EstablishChannelResponse {
            transport_idx: i64::try_from(index).unwrap_or(i64::MAX),
        };
        self.reply(Message::EstablishChannelResponse(body), ctx).await
    }

    /// Select offered credential types.
    pub async fn create_credential_offer_response(
        &self,
        types: &[&str],
        ctx: &AgentContext,
    ) -> Result<Token> {
        self.expect_flow("credential offer response", FlowType::CredentialOffer)?;
        self.find_request(InteractionType::CredentialOfferRequest, |m| match m {
            Message::CredentialOfferRequest(body) => Some(body),
            _ => None,
        })?;
        let body = CredentialOfferResponse {
            selected_credentials: types.iter().copied().map(SelectedCredential::new).collect(),
        };
        self.reply(Message::CredentialOfferResponse(body), ctx).await
    }

    /// Issue credentials for the counterparty's selection.
    pub async fn create_credentials_receive(
        &self,
        credentials: Vec<SignedCredential>,
        ctx: &AgentContext,
    ) -> Result<Token> {
        self.expect_flow("credentials receive", FlowType::CredentialOffer)?;
        self.find_request(InteractionType::CredentialOfferResponse, |m| match m {
            Message::CredentialOfferResponse(body) => Some(body),
            _ => None,
        })?;
        let body = CredentialsReceive {
            signed_credentials: credentials,
        };
        self.reply(Message::CredentialsReceive(body), ctx).await
    }

    /// Supply credentials for the latest credential request.
    pub async fn create_credential_response(
        &self,
        credentials: Vec<SignedCredential>,
        ctx: &AgentContext,
    ) -> Result<Token> {
        self.expect_flow("credential response", FlowType::CredentialShare)?;
        self.find_request(InteractionType::CredentialRequest, |m| match m {
            Message::CredentialRequest(body) => Some(body),
            _ => None,
        })?;
        let body = CredentialResponse {
            supplied_credentials: credentials,
        };
        self.reply(Message::CredentialResponse(body), ctx).await
    }

    fn rpc_request(&self, kind: InteractionType) -> Result<(&Token, RpcRequest)> {
        self.find_request(kind, |m| match m {
            Message::EncryptionRequest(body)
            | Message::DecryptionRequest(body)
            | Message::SigningRequest(body) => Some(body),
            _ => None,
        })
    }

    /// Encrypt the requested data to its target, or to the requester when
    /// no target is named.
    pub async fn create_encryption_response(&self, ctx: &AgentContext) -> Result<Token> {
        self.expect_flow("encryption response", FlowType::Encrypt)?;
        let (token, request) = self.rpc_request(InteractionType::EncryptionRequest)?;
        let target = request
            .request
            .target
            .as_ref()
            .unwrap_or_else(|| token.issuer());
        let recipient = ctx.resolver.resolve(target).await?;
        let result = ctx.wallet.encrypt(&recipient, &request.request.data).await?;
        self.reply(Message::EncryptionResponse(RpcResponse { result }), ctx)
            .await
    }

    pub async fn create_decryption_response(&self, ctx: &AgentContext) -> Result<Token> {
        self.expect_flow("decryption response", FlowType::Decrypt)?;
        let (_, request) = self.rpc_request(InteractionType::DecryptionRequest)?;
        let result = ctx.wallet.decrypt(&request.request.data).await?;
        self.reply(Message::DecryptionResponse(RpcResponse { result }), ctx)
            .await
    }

    pub async fn create_signing_response(&self, ctx: &AgentContext) -> Result<Token> {
        self.expect_flow("signing response", FlowType::Sign)?;
        let (_, request) = self.rpc_request(InteractionType::SigningRequest)?;
        let signature = ctx.wallet.sign_data(&request.request.data).await?;
        let result = signature.as_bytes().to_vec();
        self.reply(Message::SigningResponse(RpcResponse { result }), ctx)
            .await
    }

    /// Resolve the requested URI, or the local identity when none is given.
    pub async fn create_resolution_response(&self, ctx: &AgentContext) -> Result<Token> {
        self.expect_flow("resolution response", FlowType::Resolution)?;
        let (_, request) = self.find_request(InteractionType::ResolutionRequest, |m| match m {
            Message::ResolutionRequest(body) => Some(body),
            _ => None,
        })?;

        let did: Did = match request.uri {
            Some(uri) => uri.parse()?,
            None => ctx.wallet.did().clone(),
        };
        let identity = if &did == ctx.wallet.did() {
            ctx.wallet.identity()
        } else {
            ctx.resolver.resolve(&did).await?
        };

        let body = ResolutionResponse {
            context: json!("https://w3id.org/did-resolution/v1"),
            did_document: identity.did_document(),
            resolver_metadata: json!({}),
            method_metadata: json!({ "method": did.method() }),
        };
        self.reply(Message::ResolutionResponse(body), ctx).await
    }
}

/// Check the issuer signature of every credential a message carries.
async fn check_credentials(message: &Message, ctx: &AgentContext) -> Vec<CredentialCheck> {
    let mut checks = Vec::with_capacity(message.credentials().len());
    for credential in message.credentials() {
        let signature_valid = if ctx.config.verify_credentials {
            match ctx.resolver.resolve(&credential.issuer).await {
                Ok(issuer) => credential.verify(&issuer.signing_key).is_ok(),
                Err(e) => {
                    tracing::debug!(issuer = %credential.issuer, error = %e, "credential issuer did not resolve");
                    false
                }
            }
        } else {
            true
        };
        checks.push(CredentialCheck { signature_valid });
    }
    checks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{IdentityWallet, SoftwareWallet};
    use crate::test_support::{context, Party};
    use chainge_interact_core::{
        AuthorizationRequest, CredentialOffer, CredentialOfferRequest, Ed25519Signature,
    };

    fn auth(description: &str, callback: Option<&str>) -> Message {
        Message::Authentication(AuthenticationBody {
            description: description.into(),
            callback_url: callback.map(str::to_owned),
        })
    }

    async fn started(party: &Party, token: &Token) -> Interaction {
        let mut interaction = Interaction::new(token).unwrap();
        assert!(interaction
            .process_interaction_token(token, &party.ctx)
            .await
            .unwrap());
        interaction
    }

    #[tokio::test]
    async fn test_authentication_exchange() {
        let alice = Party::new(1);
        let bob = Party::new(2);

        let request = alice.request(auth("login", None)).await;
        let mut at_bob = started(&bob, &request).await;
        assert_eq!(at_bob.role(), None);
        assert_eq!(at_bob.counterparty().map(|i| &i.did), Some(alice.did()));

        let response = at_bob.create_authentication_response(&bob.ctx).await.unwrap();
        assert!(at_bob
            .process_interaction_token(&response, &bob.ctx)
            .await
            .unwrap());

        assert_eq!(at_bob.messages().len(), 2);
        assert_eq!(at_bob.role(), Some(Role::Responder));
        assert_eq!(
            at_bob.participants().responder.as_ref().map(|i| &i.did),
            Some(bob.did())
        );
        assert_eq!(at_bob.counterparty().map(|i| &i.did), Some(alice.did()));

        let mut at_alice = started(&alice, &request).await;
        assert_eq!(at_alice.role(), Some(Role::Requester));
        assert!(at_alice
            .process_interaction_token(&response, &alice.ctx)
            .await
            .unwrap());
        assert_eq!(at_alice.counterparty().map(|i| &i.did), Some(bob.did()));
        assert_eq!(at_alice.flow(), at_bob.flow());
    }

    #[tokio::test]
    async fn test_rejected_token_changes_nothing() {
        let alice = Party::new(1);
        let bob = Party::new(2);

        let request = alice.request(auth("login", None)).await;
        let mut interaction = started(&bob, &request).await;
        let before = interaction.summary();

        let wrong = bob
            .ctx
            .wallet
            .sign_token(TokenBuilder::reply(auth("something else", None), &request))
            .await
            .unwrap();
        assert!(!interaction
            .process_interaction_token(&wrong, &bob.ctx)
            .await
            .unwrap());

        assert_eq!(interaction.summary(), before);
        assert!(bob.ctx.store.get_token(&wrong.compute_id()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_tampered_token_is_invalid() {
        let alice = Party::new(1);
        let bob = Party::new(2);

        let mut request = alice.request(auth("login", None)).await;
        request.signature = Ed25519Signature::ZERO;

        let mut interaction = Interaction::new(&request).unwrap();
        let err = interaction
            .process_interaction_token(&request, &bob.ctx)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            InteractionError::InvalidToken(ValidationError::SignatureFailed)
        ));
        assert!(interaction.messages().is_empty());
    }

    #[tokio::test]
    async fn test_out_of_order_token_is_invalid() {
        let alice = Party::new(1);
        let bob = Party::new(2);

        let request = alice.request(auth("login", None)).await;
        let response = bob
            .ctx
            .wallet
            .sign_token(TokenBuilder::reply(auth("login", None), &request))
            .await
            .unwrap();
        let late = alice
            .ctx
            .wallet
            .sign_token(TokenBuilder::reply(auth("login", None), &response))
            .await
            .unwrap();

        let mut interaction = started(&bob, &request).await;
        let err = interaction
            .process_interaction_token(&late, &bob.ctx)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            InteractionError::InvalidToken(ValidationError::InvalidSequence { expected: 2, got: 3 })
        ));
    }

    #[tokio::test]
    async fn test_builders_check_flow_and_request() {
        let alice = Party::new(1);
        let bob = Party::new(2);

        let request = alice.request(auth("login", None)).await;
        let interaction = started(&bob, &request).await;
        assert!(matches!(
            interaction.create_signing_response(&bob.ctx).await,
            Err(InteractionError::WrongFlow {
                actual: FlowType::Authentication,
                ..
            })
        ));

        let offer = alice
            .request(Message::CredentialOfferRequest(CredentialOfferRequest {
                callback_url: "http://127.0.0.1:9/offer".into(),
                offered_credentials: vec![CredentialOffer::new("email")],
            }))
            .await;
        let offered = started(&bob, &offer).await;
        assert!(matches!(
            offered.create_credentials_receive(vec![], &bob.ctx).await,
            Err(InteractionError::MissingRequest(
                InteractionType::CredentialOfferResponse
            ))
        ));
    }

    #[tokio::test]
    async fn test_replay_matches_live() {
        let alice = Party::new(1);
        let bob = Party::new(2);

        let request = alice
            .request(Message::AuthorizationRequest(AuthorizationRequest {
                description: "open door".into(),
                image_url: None,
                action: Some("unlock".into()),
                callback_url: "http://127.0.0.1:9/authz".into(),
            }))
            .await;
        let mut live = started(&bob, &request).await;
        let response = live.create_authorization_response(&bob.ctx).await.unwrap();
        assert!(live
            .process_interaction_token(&response, &bob.ctx)
            .await
            .unwrap());

        let stored = bob.ctx.store.get_tokens(request.nonce()).await.unwrap();
        let replayed = Interaction::from_messages(&stored, &bob.ctx).await.unwrap();

        assert_eq!(replayed.summary(), live.summary());
        assert!(replayed.transport().is_none());
    }

    #[tokio::test]
    async fn test_callback_binds_for_counterparty_only() {
        let alice = Party::new(1);
        let bob = Party::new(2);

        let request = alice
            .request(auth("login", Some("http://127.0.0.1:9/callback")))
            .await;

        let at_alice = started(&alice, &request).await;
        assert!(at_alice.transport().is_none());

        let at_bob = started(&bob, &request).await;
        let bound = at_bob.transport().unwrap();
        assert_eq!(bound.descriptor().kind, HTTP_TRANSPORT);
        assert_eq!(bound.descriptor().config, json!("http://127.0.0.1:9/callback"));
    }

    #[tokio::test]
    async fn test_send_without_callback() {
        let alice = Party::new(1);
        let bob = Party::new(2);

        let request = alice.request(auth("login", None)).await;
        let mut interaction = started(&bob, &request).await;
        let response = interaction
            .create_authentication_response(&bob.ctx)
            .await
            .unwrap();

        assert!(matches!(
            interaction.send(&response, &bob.ctx).await,
            Err(InteractionError::MissingTransport(_))
        ));
    }

    #[tokio::test]
    async fn test_first_token_must_open_a_flow() {
        let wallet = SoftwareWallet::from_seed(&[7; 32]);
        let (ctx, _inbound) = context(SoftwareWallet::from_seed(&[8; 32]));
        let request = wallet
            .sign_token(TokenBuilder::request(auth("x", None)))
            .await
            .unwrap();
        let response = wallet
            .sign_token(TokenBuilder::reply(
                Message::SigningResponse(RpcResponse { result: vec![1] }),
                &request,
            ))
            .await
            .unwrap();

        assert!(matches!(
            Interaction::new(&response),
            Err(InteractionError::NotAFirstMessage(InteractionType::SigningResponse))
        ));
        assert!(matches!(
            Interaction::from_messages(&[], &ctx).await,
            Err(InteractionError::NoTokens)
        ));
    }
}
