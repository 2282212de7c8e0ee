//! Core client contract shared between the gateway runtime and consumers.
//!
//! This crate defines the wire protocol, connection lifecycle model, typed
//! event dispatcher, and the chat/timeline synchronization store. It
//! performs no I/O; the gateway crate owns the socket.

/// Typed publish/subscribe dispatcher over raw frames.
pub mod dispatcher;
/// Stable client error types.
pub mod error;
/// Wire frames and the typed request/event protocol.
pub mod protocol;
/// Session identity derived from the bearer token.
pub mod session;
/// Connection lifecycle state machine.
pub mod state_machine;
/// Chat-list and timeline reconciliation.
pub mod store;
/// Domain data and the command/event channel types.
pub mod types;

pub use dispatcher::{Dispatcher, EventHandler, FrameSink, Subscription};
pub use error::{ClientError, ErrorCategory};
pub use protocol::{
    ClientRequest, ENDPOINT_PATH, Frame, ProtocolError, ServerEvent, ServerEventKind,
};
pub use session::{Session, SessionError, decode_user_id};
pub use state_machine::{ConnectAttempt, ConnectionStateMachine};
pub use store::{Effects, SyncConfig, SyncStore};
pub use types::{Chat, ClientCommand, ClientEvent, ConnectionState, Message};
