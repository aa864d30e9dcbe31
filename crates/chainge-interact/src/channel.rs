//! Long-lived duplex channels negotiated by an establishChannel interaction.
//!
//! The establishChannel interaction is the channel's control interaction.
//! Until its response has been accepted the channel is unauthenticated and
//! refuses every other token. Once authenticated, each token carries its own
//! sub-interaction; a locally started thread is answered by the second token
//! of its sub-interaction.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError, RwLock, Weak};

use chainge_interact_core::{Nonce, Token};
use chainge_interact_flow::FlowType;
use chainge_interact_transport::{InboundSink, TransportApi};
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;

use crate::error::{ChannelError, InteractionError};
use crate::identity::Identity;
use crate::manager::{InteractionManager, SharedInteraction};

type Result<T> = std::result::Result<T, ChannelError>;

/// Called with every interaction that arrives over a channel and is not the
/// answer to a locally started thread.
pub type InteractionCallback = Arc<dyn Fn(SharedInteraction) + Send + Sync>;

/// A thread awaiting its response.
#[derive(Debug)]
pub struct PendingThread {
    id: Nonce,
    rx: oneshot::Receiver<Token>,
}

impl PendingThread {
    pub fn id(&self) -> &Nonce {
        &self.id
    }

    /// Wait for the second token of the thread's interaction. There is no
    /// timeout.
    pub async fn response(self) -> Result<Token> {
        self.rx.await.map_err(|_| ChannelError::Closed)
    }
}

pub struct Channel {
    id: Nonce,
    manager: Arc<InteractionManager>,
    control: SharedInteraction,
    transport: Mutex<Option<TransportApi>>,
    inbound_tx: InboundSink,
    inbound_rx: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
    threads: StdMutex<HashMap<Nonce, oneshot::Sender<Token>>>,
    auth: watch::Sender<bool>,
    started: AtomicBool,
    pump: StdMutex<Option<JoinHandle<()>>>,
    callback: RwLock<Option<InteractionCallback>>,
}

impl Channel {
    fn new(
        id: Nonce,
        manager: Arc<InteractionManager>,
        control: SharedInteraction,
        transport: Option<TransportApi>,
        established: bool,
    ) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (auth, _) = watch::channel(established);
        Self {
            id,
            manager,
            control,
            transport: Mutex::new(transport),
            inbound_tx,
            inbound_rx: Arc::new(Mutex::new(inbound_rx)),
            threads: StdMutex::new(HashMap::new()),
            auth,
            started: AtomicBool::new(false),
            pump: StdMutex::new(None),
            callback: RwLock::new(None),
        }
    }

    /// Id of the control interaction.
    pub fn id(&self) -> &Nonce {
        &self.id
    }

    pub fn control(&self) -> &SharedInteraction {
        &self.control
    }

    /// Sender feeding the channel's inbound queue. Transports started for
    /// the channel deliver here; the queue is drained once the channel runs.
    pub fn inbound_sink(&self) -> InboundSink {
        self.inbound_tx.clone()
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub async fn transport(&self) -> Option<TransportApi> {
        self.transport.lock().await.clone()
    }

    /// Bind a transport before the channel is started. A bound transport
    /// takes precedence over the negotiated descriptor.
    pub async fn set_transport(&self, transport: TransportApi) -> Result<()> {
        if self.is_started() {
            return Err(ChannelError::AlreadyStarted);
        }
        *self.transport.lock().await = Some(transport);
        Ok(())
    }

    /// Whether the control interaction has been established.
    pub async fn authenticated(&self) -> bool {
        self.control
            .lock()
            .await
            .flow()
            .as_establish_channel()
            .is_some_and(|state| state.established)
    }

    /// The other party of the control interaction.
    pub async fn counterparty(&self) -> Option<Identity> {
        self.control.lock().await.counterparty().cloned()
    }

    /// Resolve once the control interaction is established.
    pub async fn wait_authenticated(&self) -> Result<()> {
        let mut rx = self.auth.subscribe();
        rx.wait_for(|established| *established)
            .await
            .map(|_| ())
            .map_err(|_| ChannelError::Closed)
    }

    /// Bind the transport if needed, wait for it to be ready, and start
    /// draining the inbound queue.
    pub async fn start(self: &Arc<Self>, callback: Option<InteractionCallback>) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ChannelError::AlreadyStarted);
        }

        match self.bind().await {
            Ok(transport) => {
                *self
                    .callback
                    .write()
                    .unwrap_or_else(PoisonError::into_inner) = callback;
                let handle = tokio::spawn(pump(
                    Arc::downgrade(self),
                    Arc::clone(&self.inbound_rx),
                ));
                *self.pump.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
                tracing::info!(
                    id = %self.id,
                    transport = %transport.descriptor().kind,
                    "channel started"
                );
                Ok(())
            }
            Err(e) => {
                self.started.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    async fn bind(&self) -> Result<TransportApi> {
        let mut slot = self.transport.lock().await;
        let transport = match slot.as_ref() {
            Some(transport) => transport.clone(),
            None => {
                let desc = self
                    .control
                    .lock()
                    .await
                    .flow()
                    .as_establish_channel()
                    .and_then(|state| state.selected_transport().cloned())
                    .ok_or(ChannelError::MissingTransport)?;
                let ctx = self.manager.context();
                ctx.transports.start(&desc, self.inbound_sink()).await?
            }
        };
        transport.ready().await?;
        *slot = Some(transport.clone());
        Ok(transport)
    }

    /// Route one raw token that arrived for this channel.
    pub async fn process_jwt(
        &self,
        raw: &str,
        transport: Option<TransportApi>,
    ) -> Result<SharedInteraction> {
        let token = Token::decode(raw).map_err(InteractionError::invalid)?;

        if token.nonce() == &self.id {
            let accepted = self.manager.process_on(&self.control, &token).await?;
            if accepted && self.authenticated().await {
                tracing::info!(id = %self.id, "channel authenticated");
                self.auth.send_replace(true);
            }
            return Ok(Arc::clone(&self.control));
        }

        if !self.authenticated().await {
            return Err(ChannelError::NotAuthenticated);
        }

        let transport = match transport {
            Some(transport) => Some(transport),
            None => self.transport().await,
        };
        let (shared, accepted) = self.manager.process_jwt(raw, transport).await?;

        let waiter = self
            .threads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(token.nonce());
        if waiter {
            if accepted {
                self.resolve_thread(token.nonce(), &shared).await;
            } else {
                tracing::debug!(
                    channel = %self.id,
                    thread = %token.nonce(),
                    seq = token.seq(),
                    "thread response refused, thread still pending"
                );
            }
        } else {
            let callback = self
                .callback
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            if let Some(callback) = callback {
                callback(Arc::clone(&shared));
            }
        }

        Ok(shared)
    }

    async fn resolve_thread(&self, id: &Nonce, shared: &SharedInteraction) {
        let Some(response) = shared.lock().await.messages().get(1).cloned() else {
            return;
        };
        let sender = self
            .threads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        if let Some(sender) = sender {
            tracing::debug!(channel = %self.id, thread = %id, "thread answered");
            // the waiter may have given up
            let _ = sender.send(response);
        }
    }

    /// Start a sub-interaction from `token`, send it, and return a handle
    /// for its response.
    pub async fn start_thread(&self, token: &Token) -> Result<PendingThread> {
        if !self.authenticated().await {
            return Err(ChannelError::NotAuthenticated);
        }
        let transport = self.transport().await.ok_or(ChannelError::MissingTransport)?;

        let id = token.nonce().clone();
        self.manager.start(token, Some(transport.clone())).await?;

        let (tx, rx) = oneshot::channel();
        self.threads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), tx);

        if let Err(e) = transport.send(&token.encode()).await {
            self.threads
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&id);
            return Err(e.into());
        }
        tracing::debug!(channel = %self.id, thread = %id, "thread started");
        Ok(PendingThread { id, rx })
    }

    /// Number of threads still waiting for a response.
    pub fn pending_threads(&self) -> usize {
        self.threads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Send a token over the bound transport.
    pub async fn send(&self, token: &Token) -> Result<()> {
        let transport = self.transport().await.ok_or(ChannelError::MissingTransport)?;
        transport.send(&token.encode()).await?;
        Ok(())
    }

    /// Stop inbound dispatch and tear down the transport. Pending threads
    /// are left as they are.
    pub async fn stop(&self) -> Result<()> {
        if let Some(handle) = self
            .pump
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
        let transport = self.transport.lock().await.take();
        if let Some(transport) = transport {
            transport.stop().await?;
            tracing::info!(id = %self.id, "channel stopped");
        }
        self.started.store(false, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        if let Some(handle) = self
            .pump
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}

async fn pump(channel: Weak<Channel>, inbound: Arc<Mutex<mpsc::UnboundedReceiver<String>>>) {
    let mut rx = inbound.lock().await;
    while let Some(raw) = rx.recv().await {
        let Some(channel) = channel.upgrade() else {
            break;
        };
        if let Err(e) = channel.process_jwt(&raw, None).await {
            tracing::warn!(id = %channel.id, error = %e, "dropping inbound token");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Keeper
// ─────────────────────────────────────────────────────────────────────────────

/// Registry of channels keyed by their control interaction id.
pub struct ChannelKeeper {
    manager: Arc<InteractionManager>,
    channels: RwLock<HashMap<Nonce, Arc<Channel>>>,
}

impl ChannelKeeper {
    pub fn new(manager: Arc<InteractionManager>) -> Self {
        Self {
            manager,
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Register a channel for an establishChannel interaction.
    pub async fn create(
        &self,
        interaction: SharedInteraction,
        transport: Option<TransportApi>,
    ) -> Result<Arc<Channel>> {
        let (id, established) = {
            let guard = interaction.lock().await;
            let actual = guard.flow_type();
            if actual != FlowType::EstablishChannel {
                return Err(ChannelError::WrongFlow {
                    id: guard.id().clone(),
                    actual,
                });
            }
            let established = guard
                .flow()
                .as_establish_channel()
                .is_some_and(|state| state.established);
            (guard.id().clone(), established)
        };

        let mut channels = self
            .channels
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if channels.contains_key(&id) {
            return Err(ChannelError::ChannelExists(id));
        }
        let channel = Arc::new(Channel::new(
            id.clone(),
            Arc::clone(&self.manager),
            interaction,
            transport,
            established,
        ));
        channels.insert(id, Arc::clone(&channel));
        Ok(channel)
    }

    pub fn get(&self, id: &Nonce) -> Result<Arc<Channel>> {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| ChannelError::NoSuchChannel(id.clone()))
    }

    pub fn list(&self) -> Vec<Arc<Channel>> {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Remove a channel from the registry without stopping it.
    pub fn remove(&self, id: &Nonce) -> Option<Arc<Channel>> {
        self.channels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Party;
    use chainge_interact_core::{
        AuthenticationBody, EstablishChannelRequest, Message, TokenBuilder, TransportDescriptor,
    };
    use chainge_interact_transport::{MemoryHub, MEMORY_TRANSPORT};
    use serde_json::json;

    fn auth() -> Message {
        described("ping")
    }

    fn described(description: &str) -> Message {
        Message::Authentication(AuthenticationBody {
            description: description.into(),
            callback_url: None,
        })
    }

    fn offer(room: &str) -> Message {
        Message::EstablishChannelRequest(EstablishChannelRequest {
            description: "sync".into(),
            transports: vec![TransportDescriptor::new(
                MEMORY_TRANSPORT,
                json!({ "endpoint": room }),
            )],
        })
    }

    struct Side {
        party: Party,
        manager: Arc<InteractionManager>,
        keeper: ChannelKeeper,
    }

    impl Side {
        fn new(seed: u8, hub: &Arc<MemoryHub>) -> Self {
            let party = Party::new(seed);
            party.ctx.transports.register(Arc::new(hub.handler()));
            let manager = Arc::new(InteractionManager::new(party.shared_context()));
            let keeper = ChannelKeeper::new(Arc::clone(&manager));
            Self {
                party,
                manager,
                keeper,
            }
        }
    }

    #[tokio::test]
    async fn test_create_requires_establish_channel() {
        let hub = MemoryHub::new();
        let alice = Side::new(1, &hub);

        let token = alice.party.request(auth()).await;
        let shared = alice.manager.start(&token, None).await.unwrap();
        assert!(matches!(
            alice.keeper.create(shared, None).await,
            Err(ChannelError::WrongFlow {
                actual: FlowType::Authentication,
                ..
            })
        ));

        let token = alice.party.request(offer("room")).await;
        let shared = alice.manager.start(&token, None).await.unwrap();
        let channel = alice.keeper.create(Arc::clone(&shared), None).await.unwrap();
        assert!(matches!(
            alice.keeper.create(shared, None).await,
            Err(ChannelError::ChannelExists(_))
        ));
        assert!(Arc::ptr_eq(&alice.keeper.get(channel.id()).unwrap(), &channel));
        assert!(matches!(
            alice.keeper.get(&Nonce::random()),
            Err(ChannelError::NoSuchChannel(_))
        ));
        assert_eq!(alice.keeper.list().len(), 1);
    }

    #[tokio::test]
    async fn test_gating_authentication_and_threads() {
        let hub = MemoryHub::new();
        let alice = Side::new(1, &hub);
        let bob = Side::new(2, &hub);

        // alice offers a room and listens on it before the answer arrives
        let request = alice.party.request(offer("room")).await;
        let control = alice.manager.start(&request, None).await.unwrap();
        let at_alice = alice.keeper.create(control, None).await.unwrap();

        assert!(matches!(
            at_alice.start(None).await,
            Err(ChannelError::MissingTransport)
        ));
        assert!(!at_alice.is_started());

        let desc = TransportDescriptor::new(MEMORY_TRANSPORT, json!({ "endpoint": "room" }));
        let listening = alice
            .party
            .ctx
            .transports
            .start(&desc, at_alice.inbound_sink())
            .await
            .unwrap();
        at_alice.set_transport(listening).await.unwrap();

        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        let callback: InteractionCallback = Arc::new(move |shared| {
            let _ = seen_tx.send(shared);
        });
        at_alice.start(Some(callback)).await.unwrap();
        assert!(matches!(
            at_alice.start(None).await,
            Err(ChannelError::AlreadyStarted)
        ));

        // nothing but the control response gets through yet
        let early = bob.party.request(auth()).await;
        assert!(matches!(
            at_alice.process_jwt(&early.encode(), None).await,
            Err(ChannelError::NotAuthenticated)
        ));

        // bob answers, derives the transport from the negotiated descriptor
        let control = bob
            .manager
            .process_jwt(&request.encode(), None)
            .await
            .unwrap()
            .0;
        let response = control
            .lock()
            .await
            .create_establish_channel_response(0, &bob.party.ctx)
            .await
            .unwrap();
        assert!(bob.manager.process_on(&control, &response).await.unwrap());
        let at_bob = bob.keeper.create(control, None).await.unwrap();
        assert!(at_bob.authenticated().await);
        at_bob.start(None).await.unwrap();
        at_bob.send(&response).await.unwrap();

        at_alice.wait_authenticated().await.unwrap();
        assert!(at_alice.authenticated().await);
        assert_eq!(
            at_alice.counterparty().await.map(|i| i.did),
            Some(bob.party.did().clone())
        );

        // bob starts a thread; alice sees a new interaction and answers it
        let ping = bob.party.request(auth()).await;
        let pending = at_bob.start_thread(&ping).await.unwrap();
        assert_eq!(at_bob.pending_threads(), 1);

        let incoming = seen_rx.recv().await.unwrap();
        let pong = {
            let guard = incoming.lock().await;
            assert_eq!(guard.id(), ping.nonce());
            guard
                .create_authentication_response(&alice.party.ctx)
                .await
                .unwrap()
        };
        assert!(alice.manager.process_on(&incoming, &pong).await.unwrap());
        at_alice.send(&pong).await.unwrap();

        let answer = pending.response().await.unwrap();
        assert_eq!(answer, pong);
        assert_eq!(at_bob.pending_threads(), 0);

        at_alice.stop().await.unwrap();
        at_alice.stop().await.unwrap();
        assert!(at_alice.transport().await.is_none());
        at_bob.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_refused_thread_response_leaves_thread_pending() {
        let hub = MemoryHub::new();
        let alice = Side::new(1, &hub);
        let bob = Side::new(2, &hub);

        // alice only listens on the room
        let desc = TransportDescriptor::new(MEMORY_TRANSPORT, json!({ "endpoint": "room" }));
        let (sink, _delivered) = mpsc::unbounded_channel();
        let _listening = alice.party.ctx.transports.start(&desc, sink).await.unwrap();

        let request = alice.party.request(offer("room")).await;
        let control = bob
            .manager
            .process_jwt(&request.encode(), None)
            .await
            .unwrap()
            .0;
        let response = control
            .lock()
            .await
            .create_establish_channel_response(0, &bob.party.ctx)
            .await
            .unwrap();
        assert!(bob.manager.process_on(&control, &response).await.unwrap());
        let at_bob = bob.keeper.create(control, None).await.unwrap();
        at_bob.start(None).await.unwrap();

        let ping = bob.party.request(auth()).await;
        let pending = at_bob.start_thread(&ping).await.unwrap();

        // authentication refuses a different description
        let refused = alice
            .party
            .sign(TokenBuilder::reply(described("pong"), &ping))
            .await;
        let shared = at_bob.process_jwt(&refused.encode(), None).await.unwrap();
        assert_eq!(shared.lock().await.messages().len(), 1);
        assert_eq!(at_bob.pending_threads(), 1);

        let pong = alice.party.sign(TokenBuilder::reply(auth(), &ping)).await;
        at_bob.process_jwt(&pong.encode(), None).await.unwrap();
        assert_eq!(pending.response().await.unwrap(), pong);
        assert_eq!(at_bob.pending_threads(), 0);

        at_bob.stop().await.unwrap();
    }
}
