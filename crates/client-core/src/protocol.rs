//! Wire frames and the typed request/event protocol.
//!
//! Every frame on the socket is `{"type": <string>, "payload": <object>}`.
//! Outbound frames are built from [`ClientRequest`]; inbound frames decode
//! into the closed [`ServerEvent`] union so downstream dispatch is an
//! exhaustive match instead of a string lookup.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

use crate::types::{Chat, Message};

/// Well-known connection path on the serving host.
pub const ENDPOINT_PATH: &str = "/ws";

/// One complete wire unit: a type tag plus a payload object.
///
/// `payload` may be absent or null (the server sends `chat_list_updated`
/// with a null payload).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Frame {
    /// Message type tag.
    #[serde(rename = "type")]
    pub kind: String,
    /// Type-specific payload.
    #[serde(default)]
    pub payload: Option<Value>,
}

/// Errors produced while encoding or decoding frames.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The frame or its payload was not well-formed for its type.
    #[error("malformed frame: {0}")]
    Malformed(String),
    /// The frame carried a type tag this client does not know.
    #[error("unknown message type '{0}'")]
    UnknownType(String),
    /// An outbound frame could not be serialized.
    #[error("frame encoding failed: {0}")]
    Encode(String),
}

/// Outbound request sent by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientRequest {
    /// Authentication handshake carrying the bearer token.
    Auth {
        /// Opaque token string.
        token: String,
    },
    /// Fetch the caller's chat list.
    GetMyChats,
    /// Fetch the full message history of one chat.
    GetChatHistory {
        /// Target chat id.
        chat_id: String,
    },
    /// Send a text message (fire-and-forget; no acknowledgement).
    SendMessage {
        /// Target chat id.
        chat_id: String,
        /// Message body.
        text: String,
    },
    /// Request creation of a chat; the result arrives indirectly via a
    /// later `chat_list_updated` notification.
    CreateChat {
        /// Member user ids.
        member_ids: Vec<i64>,
        /// Chat name; may be empty.
        name: String,
    },
}

impl ClientRequest {
    /// Wire type tag for this request.
    pub fn message_type(&self) -> &'static str {
        match self {
            Self::Auth { .. } => "auth",
            Self::GetMyChats => "get_my_chats",
            Self::GetChatHistory { .. } => "get_chat_history",
            Self::SendMessage { .. } => "send_message",
            Self::CreateChat { .. } => "create_chat",
        }
    }

    /// Serialize to the raw frame text sent over the transport.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        let payload = match self {
            Self::Auth { token } => json!({ "token": token }),
            Self::GetMyChats => json!({}),
            Self::GetChatHistory { chat_id } => json!({ "chat_id": chat_id }),
            Self::SendMessage { chat_id, text } => json!({ "chat_id": chat_id, "text": text }),
            Self::CreateChat { member_ids, name } => {
                json!({ "member_ids": member_ids, "name": name })
            }
        };

        let frame = Frame {
            kind: self.message_type().to_owned(),
            payload: Some(payload),
        };
        serde_json::to_string(&frame).map_err(|err| ProtocolError::Encode(err.to_string()))
    }
}

/// Registry key identifying one inbound message kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerEventKind {
    /// `auth_status`
    AuthStatus,
    /// `my_chats_list`
    MyChatsList,
    /// `chat_history`
    ChatHistory,
    /// `new_message`
    NewMessage,
    /// `chat_list_updated`
    ChatListUpdated,
}

/// Inbound server event, decoded from one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// Result of the auth handshake.
    AuthStatus {
        /// Whether the token was accepted.
        success: bool,
        /// Server-provided detail, useful on rejection.
        message: String,
    },
    /// Full chat list snapshot; supersedes all prior entries.
    MyChatsList {
        /// Chats in server order.
        chats: Vec<Chat>,
    },
    /// Full history of the most recently requested chat, in chronological
    /// order (the canonical timeline order).
    ChatHistory {
        /// History batch.
        messages: Vec<Message>,
    },
    /// One live message.
    NewMessage(Message),
    /// Notification that the chat list changed; carries no data and is
    /// answered with a fresh `get_my_chats` fetch.
    ChatListUpdated,
}

#[derive(Debug, Deserialize)]
struct AuthStatusPayload {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ChatsPayload {
    #[serde(default)]
    chats: Vec<Chat>,
}

#[derive(Debug, Deserialize)]
struct HistoryPayload {
    #[serde(default)]
    messages: Vec<Message>,
}

impl ServerEvent {
    /// Decode one raw frame into a typed event.
    ///
    /// Missing list fields default to empty; a missing or null payload is
    /// treated as an empty object. Unknown type tags and payloads that do
    /// not fit their type's shape are reported as errors for the caller to
    /// log and drop.
    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        let frame: Frame =
            serde_json::from_str(raw).map_err(|err| ProtocolError::Malformed(err.to_string()))?;
        let payload = match frame.payload {
            Some(Value::Null) | None => json!({}),
            Some(value) => value,
        };

        match frame.kind.as_str() {
            "auth_status" => {
                let p: AuthStatusPayload = decode_payload(payload)?;
                Ok(Self::AuthStatus {
                    success: p.success,
                    message: p.message,
                })
            }
            "my_chats_list" => {
                let p: ChatsPayload = decode_payload(payload)?;
                Ok(Self::MyChatsList { chats: p.chats })
            }
            "chat_history" => {
                let p: HistoryPayload = decode_payload(payload)?;
                Ok(Self::ChatHistory {
                    messages: p.messages,
                })
            }
            "new_message" => Ok(Self::NewMessage(decode_payload(payload)?)),
            "chat_list_updated" => Ok(Self::ChatListUpdated),
            other => Err(ProtocolError::UnknownType(other.to_owned())),
        }
    }

    /// The registry key matching this event.
    pub fn kind(&self) -> ServerEventKind {
        match self {
            Self::AuthStatus { .. } => ServerEventKind::AuthStatus,
            Self::MyChatsList { .. } => ServerEventKind::MyChatsList,
            Self::ChatHistory { .. } => ServerEventKind::ChatHistory,
            Self::NewMessage(_) => ServerEventKind::NewMessage,
            Self::ChatListUpdated => ServerEventKind::ChatListUpdated,
        }
    }
}

fn decode_payload<T: serde::de::DeserializeOwned>(payload: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(payload).map_err(|err| ProtocolError::Malformed(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_requests_with_wire_field_names() {
        let raw = ClientRequest::SendMessage {
            chat_id: "c1".into(),
            text: "hello".into(),
        }
        .encode()
        .expect("send_message should encode");
        let value: Value = serde_json::from_str(&raw).expect("encoded frame should be JSON");
        assert_eq!(value["type"], "send_message");
        assert_eq!(value["payload"]["chat_id"], "c1");
        assert_eq!(value["payload"]["text"], "hello");

        let raw = ClientRequest::CreateChat {
            member_ids: vec![42],
            name: String::new(),
        }
        .encode()
        .expect("create_chat should encode");
        let value: Value = serde_json::from_str(&raw).expect("encoded frame should be JSON");
        assert_eq!(value["payload"]["member_ids"], json!([42]));
        assert_eq!(value["payload"]["name"], "");

        let raw = ClientRequest::Auth {
            token: "tok".into(),
        }
        .encode()
        .expect("auth should encode");
        let value: Value = serde_json::from_str(&raw).expect("encoded frame should be JSON");
        assert_eq!(value["type"], "auth");
        assert_eq!(value["payload"]["token"], "tok");
    }

    #[test]
    fn decodes_each_inbound_kind() {
        let event = ServerEvent::decode(
            r#"{"type":"auth_status","payload":{"success":true,"message":"ok"}}"#,
        )
        .expect("auth_status should decode");
        assert_eq!(
            event,
            ServerEvent::AuthStatus {
                success: true,
                message: "ok".into(),
            }
        );

        let event = ServerEvent::decode(
            r#"{"type":"my_chats_list","payload":{"chats":[{"id":"c1","name":"Team"}]}}"#,
        )
        .expect("my_chats_list should decode");
        assert_eq!(event.kind(), ServerEventKind::MyChatsList);

        let event = ServerEvent::decode(
            r#"{"type":"new_message","payload":{"id":"m1","chat_id":"c1","sender_id":7,"text":"hi","sent_at":"2025-05-01T12:00:00Z"}}"#,
        )
        .expect("new_message should decode");
        match event {
            ServerEvent::NewMessage(message) => {
                assert_eq!(message.id, "m1");
                assert_eq!(message.sender_id, 7);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn tolerates_null_payload_and_missing_lists() {
        let event = ServerEvent::decode(r#"{"type":"chat_list_updated","payload":null}"#)
            .expect("null payload should decode");
        assert_eq!(event, ServerEvent::ChatListUpdated);

        let event = ServerEvent::decode(r#"{"type":"chat_list_updated"}"#)
            .expect("absent payload should decode");
        assert_eq!(event, ServerEvent::ChatListUpdated);

        let event = ServerEvent::decode(r#"{"type":"my_chats_list","payload":{}}"#)
            .expect("missing chats should default to empty");
        assert_eq!(event, ServerEvent::MyChatsList { chats: vec![] });

        let event = ServerEvent::decode(r#"{"type":"chat_history","payload":null}"#)
            .expect("null history payload should default to empty");
        assert_eq!(event, ServerEvent::ChatHistory { messages: vec![] });
    }

    #[test]
    fn rejects_malformed_and_unknown_frames() {
        let err = ServerEvent::decode("not json").expect_err("garbage must not decode");
        assert!(matches!(err, ProtocolError::Malformed(_)));

        let err = ServerEvent::decode(r#"{"payload":{}}"#).expect_err("missing type must fail");
        assert!(matches!(err, ProtocolError::Malformed(_)));

        let err = ServerEvent::decode(r#"{"type":"presence_ping","payload":{}}"#)
            .expect_err("unknown type must fail");
        assert_eq!(err, ProtocolError::UnknownType("presence_ping".into()));

        let err = ServerEvent::decode(r#"{"type":"new_message","payload":{"id":"m1"}}"#)
            .expect_err("incomplete message payload must fail");
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }
}
