use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Connection lifecycle state reported to consumers.
///
/// Exactly one instance exists per client; the connection manager owns it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and no attempt in progress.
    Disconnected,
    /// Transport open is in progress.
    Connecting,
    /// Transport is open and the auth handshake is in flight.
    Authenticating,
    /// Authenticated; domain requests may flow.
    Ready,
    /// The transport closed or failed; a fresh `Connect` starts over.
    Closed,
}

/// One chat as listed by the server.
///
/// The chat list is replaced wholesale whenever a fresh snapshot arrives;
/// entries are never merged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chat {
    /// Opaque chat identifier.
    pub id: String,
    /// Display name; empty for unnamed direct chats.
    #[serde(default)]
    pub name: String,
}

/// One message, either from a history batch or a live event.
///
/// Messages are never mutated or deleted once admitted to a timeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Server-assigned message identifier.
    pub id: String,
    /// Chat the message belongs to.
    pub chat_id: String,
    /// Sending user's identifier.
    pub sender_id: i64,
    /// Message body.
    pub text: String,
    /// Server-side send timestamp (RFC 3339 on the wire).
    pub sent_at: DateTime<Utc>,
}

/// Command channel input accepted by the client runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ClientCommand {
    /// Open the connection and run the auth handshake with this token.
    Connect {
        /// Opaque bearer token; its `sub` claim yields the user id.
        token: String,
    },
    /// Make this chat the active one and fetch its history.
    SelectChat {
        /// Target chat.
        chat: Chat,
    },
    /// Send a text message to the active chat.
    SendMessage {
        /// Message body; ignored when blank or no chat is active.
        text: String,
    },
    /// Request creation of a new chat with the given members.
    CreateChat {
        /// Member user ids; must be non-empty and positive.
        member_ids: Vec<i64>,
        /// Optional chat name; empty for direct chats.
        name: String,
    },
    /// Close the connection.
    Disconnect,
}

/// Event channel output emitted by the client runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ClientEvent {
    /// Connection lifecycle transition.
    StateChanged {
        /// New connection state.
        state: ConnectionState,
    },
    /// Auth handshake succeeded and a session exists.
    AuthAccepted {
        /// User id decoded from the token's `sub` claim.
        user_id: i64,
    },
    /// Auth handshake was rejected; the persisted token has been cleared.
    AuthRejected {
        /// Server-provided rejection detail.
        reason: String,
    },
    /// Full chat list replacement.
    ChatListReplaced {
        /// Latest chat snapshot, in server order.
        chats: Vec<Chat>,
    },
    /// The active chat's timeline was replaced wholesale.
    TimelineReplaced {
        /// Chat the timeline belongs to.
        chat_id: String,
        /// Timeline in canonical (server history) order.
        messages: Vec<Message>,
    },
    /// A live message was appended to the active chat's timeline.
    MessageAppended {
        /// The appended message.
        message: Message,
    },
    /// Transport-level failure surfaced for logging/UI.
    TransportError {
        /// Failure detail.
        message: String,
    },
}
