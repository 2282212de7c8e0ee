//! WebSocket runtime for the TernChat client.
//!
//! Owns the single transport connection, drives the
//! connect -> authenticate -> ready lifecycle, and wires inbound frames
//! through the typed dispatcher into the sync store. Consumers talk to the
//! runtime over a command channel and observe it over a broadcast event
//! stream; no module-level state exists — every runtime is an explicitly
//! constructed instance.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use client_core::{
    ClientCommand, ClientEvent, ClientRequest, ConnectAttempt, ConnectionState,
    ConnectionStateMachine, Dispatcher, Effects, ServerEvent, ServerEventKind, Session,
    Subscription, SyncConfig, SyncStore,
};
use client_platform::TokenStore;

/// Async command/event channel primitives.
pub mod channel;
/// Transport adapter over a single WebSocket connection.
pub mod transport;

pub use channel::{ChannelError, ClientChannels, EventStream};
pub use transport::{Transport, TransportHandle, TransportSignal};

/// Runtime construction parameters.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// WebSocket endpoint, for example `ws://chat.example.org/ws`.
    pub endpoint: String,
    /// Sync store tuning.
    pub sync: SyncConfig,
    /// Command channel depth.
    pub command_buffer: usize,
    /// Event broadcast depth.
    pub event_buffer: usize,
}

impl GatewayConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            sync: SyncConfig::default(),
            command_buffer: 64,
            event_buffer: 256,
        }
    }
}

/// Consumer-facing handle to a spawned runtime.
#[derive(Clone, Debug)]
pub struct RuntimeHandle {
    channels: ClientChannels,
}

impl RuntimeHandle {
    /// Queue one command for the runtime.
    pub async fn send(&self, command: ClientCommand) -> Result<(), ChannelError> {
        self.channels.send_command(command).await
    }

    /// Subscribe to the runtime's event stream.
    pub fn subscribe(&self) -> EventStream {
        self.channels.subscribe()
    }
}

/// Construct a runtime and spawn its task.
pub fn spawn_runtime(config: GatewayConfig, token_store: Arc<dyn TokenStore>) -> RuntimeHandle {
    let (channels, command_rx) = ClientChannels::new(config.command_buffer, config.event_buffer);
    let runtime = ChatRuntime::new(config, channels.clone(), command_rx, token_store);
    tokio::spawn(async move {
        runtime.run().await;
    });

    RuntimeHandle { channels }
}

struct ChatRuntime {
    endpoint: String,
    channels: ClientChannels,
    command_rx: mpsc::Receiver<ClientCommand>,
    dispatcher: Arc<Dispatcher>,
    state_machine: ConnectionStateMachine,
    store: SyncStore,
    token_store: Arc<dyn TokenStore>,
    transport: Option<Transport>,
    session: Option<Session>,
    pending_token: Option<String>,
    subscriptions: Vec<Subscription>,
    // Replaced wholesale on every connect so signals from a dead socket
    // can never reach a newer connection.
    signal_rx: mpsc::UnboundedReceiver<TransportSignal>,
    inbound_tx: mpsc::UnboundedSender<ServerEvent>,
    inbound_rx: mpsc::UnboundedReceiver<ServerEvent>,
}

impl ChatRuntime {
    fn new(
        config: GatewayConfig,
        channels: ClientChannels,
        command_rx: mpsc::Receiver<ClientCommand>,
        token_store: Arc<dyn TokenStore>,
    ) -> Self {
        // The sender is dropped immediately; the branch stays quiet until
        // the first connect installs a live channel.
        let (_signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        Self {
            endpoint: config.endpoint,
            channels,
            command_rx,
            dispatcher: Arc::new(Dispatcher::new()),
            state_machine: ConnectionStateMachine::default(),
            store: SyncStore::new(config.sync),
            token_store,
            transport: None,
            session: None,
            pending_token: None,
            subscriptions: Vec::new(),
            signal_rx,
            inbound_tx,
            inbound_rx,
        }
    }

    async fn run(mut self) {
        debug!(endpoint = %self.endpoint, "client runtime started");
        loop {
            tokio::select! {
                maybe_command = self.command_rx.recv() => {
                    let Some(command) = maybe_command else {
                        debug!("command channel closed; runtime exiting");
                        break;
                    };
                    self.handle_command(command).await;
                }
                Some(signal) = self.signal_rx.recv() => {
                    self.handle_signal(signal);
                }
                Some(event) = self.inbound_rx.recv() => {
                    self.handle_server_event(event);
                }
            }
        }

        if let Some(transport) = &self.transport {
            transport.close();
        }
    }

    async fn handle_command(&mut self, command: ClientCommand) {
        match command {
            ClientCommand::Connect { token } => self.handle_connect(token).await,
            ClientCommand::SelectChat { chat } => {
                if !self.is_ready("select_chat") {
                    return;
                }
                let effects = self.store.select_chat(chat);
                self.forward(effects);
            }
            ClientCommand::SendMessage { text } => {
                if !self.is_ready("send_message") {
                    return;
                }
                let effects = self.store.send_message(&text, Utc::now());
                self.forward(effects);
            }
            ClientCommand::CreateChat { member_ids, name } => {
                if !self.is_ready("create_chat") {
                    return;
                }
                let effects = self.store.create_chat(&member_ids, &name);
                self.forward(effects);
            }
            ClientCommand::Disconnect => {
                // Only the connection manager may close the socket.
                if let Some(transport) = &self.transport {
                    info!("disconnect requested");
                    transport.close();
                } else {
                    debug!("disconnect requested without a transport");
                }
            }
        }
    }

    async fn handle_connect(&mut self, token: String) {
        // An undecodable token can never form a session; reject it locally
        // the same way a server rejection would land. Validated before the
        // state machine moves so a bad token leaves the state untouched.
        let session = match Session::from_token(token.clone()) {
            Ok(session) => session,
            Err(err) => {
                warn!(error = %err, "refusing connect with undecodable token");
                self.clear_persisted_token();
                self.channels.emit(ClientEvent::AuthRejected {
                    reason: err.to_string(),
                });
                return;
            }
        };

        if self.state_machine.connect() == ConnectAttempt::AlreadyActive {
            debug!(state = ?self.state_machine.state(), "ignoring connect: already active");
            return;
        }

        // Bookkeeping from a previous connection can never be answered now.
        self.store.end_session();
        self.emit_state();
        self.register_subscriptions();

        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        self.signal_rx = signal_rx;

        match Transport::open(&self.endpoint, signal_tx).await {
            Ok(transport) => {
                self.dispatcher.set_sink(Arc::new(transport.handle()));
                self.transport = Some(transport);
                self.pending_token = Some(token);
                self.session = Some(session);
            }
            Err(err) => {
                warn!(error = %err, "transport open failed");
                self.channels.emit(ClientEvent::TransportError {
                    message: err.message.clone(),
                });
                if self.state_machine.on_transport_closed().is_some() {
                    self.emit_state();
                }
                self.teardown_connection();
            }
        }
    }

    /// Domain commands only make sense over an authenticated connection;
    /// anything issued earlier (or after a close) is dropped locally so no
    /// history-request bookkeeping is left dangling for responses that can
    /// never arrive.
    fn is_ready(&self, action: &str) -> bool {
        if self.state_machine.state() == ConnectionState::Ready {
            return true;
        }
        debug!(
            action,
            state = ?self.state_machine.state(),
            "ignoring command: connection not ready"
        );
        false
    }

    fn handle_signal(&mut self, signal: TransportSignal) {
        match signal {
            TransportSignal::Opened => {
                match self.state_machine.on_transport_open() {
                    Ok(_) => {
                        self.emit_state();
                        let Some(token) = self.pending_token.clone() else {
                            warn!("transport opened without a pending token");
                            return;
                        };
                        trace!("issuing auth handshake");
                        self.dispatcher.publish(&ClientRequest::Auth { token });
                    }
                    Err(err) => warn!(error = %err, "unexpected transport open"),
                }
            }
            TransportSignal::Frame(raw) => self.dispatcher.dispatch(&raw),
            TransportSignal::Error(message) => {
                warn!(%message, "transport error");
                self.channels.emit(ClientEvent::TransportError { message });
            }
            TransportSignal::Closed => {
                info!("transport closed");
                if self.state_machine.on_transport_closed().is_some() {
                    self.emit_state();
                }
                self.teardown_connection();
            }
        }
    }

    fn handle_server_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::AuthStatus { success, message } => {
                self.handle_auth_status(success, message);
            }
            other => {
                let effects = self.store.apply(&other);
                self.forward(effects);
            }
        }
    }

    fn handle_auth_status(&mut self, success: bool, message: String) {
        if let Err(err) = self.state_machine.on_auth_status(success) {
            warn!(error = %err, "dropping unexpected auth status");
            return;
        }

        if success {
            self.emit_state();
            let Some(session) = self.session.clone() else {
                warn!("auth accepted without a pending session");
                return;
            };
            info!(user_id = session.user_id, "authenticated");
            self.store.set_own_user_id(session.user_id);
            self.channels.emit(ClientEvent::AuthAccepted {
                user_id: session.user_id,
            });
            // Ready triggers the initial chat-list fetch.
            self.dispatcher.publish(&ClientRequest::GetMyChats);
        } else {
            warn!(%message, "authentication rejected");
            self.emit_state();
            self.clear_persisted_token();
            self.session = None;
            self.pending_token = None;
            self.channels.emit(ClientEvent::AuthRejected { reason: message });
            if let Some(transport) = &self.transport {
                transport.close();
            }
        }
    }

    fn forward(&self, effects: Effects) {
        for event in effects.events {
            self.channels.emit(event);
        }
        if let Some(request) = effects.request {
            self.dispatcher.publish(&request);
        }
    }

    fn emit_state(&self) {
        self.channels.emit(ClientEvent::StateChanged {
            state: self.state_machine.state(),
        });
    }

    /// Register the runtime's dispatcher handlers, one per inbound kind.
    ///
    /// Handlers only re-queue the typed event into the runtime's own loop,
    /// which is where state may be mutated.
    fn register_subscriptions(&mut self) {
        if !self.subscriptions.is_empty() {
            return;
        }

        for kind in [
            ServerEventKind::AuthStatus,
            ServerEventKind::MyChatsList,
            ServerEventKind::ChatHistory,
            ServerEventKind::NewMessage,
            ServerEventKind::ChatListUpdated,
        ] {
            let inbound_tx = self.inbound_tx.clone();
            let subscription = self.dispatcher.subscribe(
                kind,
                Arc::new(move |event: &ServerEvent| {
                    let _ = inbound_tx.send(event.clone());
                }),
            );
            self.subscriptions.push(subscription);
        }
    }

    /// Drop everything scoped to the connection that just ended.
    fn teardown_connection(&mut self) {
        self.dispatcher.clear_sink();
        for subscription in self.subscriptions.drain(..) {
            self.dispatcher.unsubscribe(&subscription);
        }
        self.transport = None;
        self.session = None;
        self.pending_token = None;
        self.store.end_session();
    }

    fn clear_persisted_token(&self) {
        if let Err(err) = self.token_store.clear() {
            warn!(error = %err, "failed clearing persisted token");
        }
    }
}
