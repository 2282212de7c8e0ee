//! Chat-list and timeline reconciliation.
//!
//! `SyncStore` is a pure reducer: commands validate their arguments and
//! return the outbound request (if any) for the runtime to publish; server
//! events mutate the store and return the consumer-facing events to
//! broadcast. No I/O happens here.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use tracing::{debug, trace, warn};

use crate::{
    protocol::{ClientRequest, ServerEvent},
    types::{Chat, ClientEvent, Message},
};

/// Store tuning decided at construction time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncConfig {
    /// Append sent messages to the timeline immediately instead of waiting
    /// for the server echo. The provisional entry is reconciled against the
    /// first own-sender echo with matching text. Off by default: the wire
    /// contract does not promise an echo to the sender, and double entries
    /// are worse than late ones.
    pub optimistic_send: bool,
}

/// Result of feeding one command or server event through the store.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Effects {
    /// Outbound request to publish, when the input produced one.
    pub request: Option<ClientRequest>,
    /// Consumer-facing events to broadcast.
    pub events: Vec<ClientEvent>,
}

impl Effects {
    fn none() -> Self {
        Self::default()
    }

    fn request(request: ClientRequest) -> Self {
        Self {
            request: Some(request),
            events: Vec::new(),
        }
    }
}

/// Reconciliation core: owns the chat list and the active chat's timeline.
#[derive(Debug, Default)]
pub struct SyncStore {
    optimistic_send: bool,
    chats: Vec<Chat>,
    active_chat: Option<Chat>,
    timeline: Vec<Message>,
    // Chat ids of in-flight history requests, oldest first. Responses carry
    // no chat id, so each one is tagged by pairing it FIFO with these
    // (the transport delivers frames in order).
    pending_history: VecDeque<String>,
    // Texts of optimistic sends awaiting their echo, oldest first.
    pending_echoes: VecDeque<String>,
    own_user_id: Option<i64>,
}

impl SyncStore {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            optimistic_send: config.optimistic_send,
            ..Self::default()
        }
    }

    /// Record the authenticated user's id (used for echo reconciliation).
    pub fn set_own_user_id(&mut self, user_id: i64) {
        self.own_user_id = Some(user_id);
    }

    /// Forget session-scoped bookkeeping after the connection ended.
    ///
    /// Chat list and timeline are kept for display; in-flight request tags
    /// and pending echoes can never be answered and are dropped.
    pub fn end_session(&mut self) {
        self.own_user_id = None;
        self.pending_history.clear();
        self.pending_echoes.clear();
    }

    pub fn chats(&self) -> &[Chat] {
        &self.chats
    }

    pub fn active_chat(&self) -> Option<&Chat> {
        self.active_chat.as_ref()
    }

    pub fn timeline(&self) -> &[Message] {
        &self.timeline
    }

    /// Make `chat` the active chat.
    ///
    /// Clears the timeline atomically and requests the chat's history. A
    /// blank chat id is rejected locally with no network call.
    pub fn select_chat(&mut self, chat: Chat) -> Effects {
        if chat.id.trim().is_empty() {
            debug!("ignoring chat selection with blank id");
            return Effects::none();
        }

        let chat_id = chat.id.clone();
        self.active_chat = Some(chat);
        self.timeline.clear();
        self.pending_echoes.clear();
        self.pending_history.push_back(chat_id.clone());

        Effects {
            request: Some(ClientRequest::GetChatHistory {
                chat_id: chat_id.clone(),
            }),
            events: vec![ClientEvent::TimelineReplaced {
                chat_id,
                messages: Vec::new(),
            }],
        }
    }

    /// Send a text message to the active chat.
    ///
    /// A blank text or a missing active chat rejects locally with no
    /// network call. The message is not added to the timeline unless
    /// optimistic send is enabled; it is expected back as a `new_message`
    /// echo.
    pub fn send_message(&mut self, text: &str, now: DateTime<Utc>) -> Effects {
        if text.trim().is_empty() {
            debug!("ignoring send request with blank text");
            return Effects::none();
        }
        let Some(active) = &self.active_chat else {
            debug!("ignoring send request: no active chat");
            return Effects::none();
        };

        let chat_id = active.id.clone();
        let mut effects = Effects::request(ClientRequest::SendMessage {
            chat_id: chat_id.clone(),
            text: text.to_owned(),
        });

        if self.optimistic_send
            && let Some(sender_id) = self.own_user_id
        {
            let provisional = Message {
                id: String::new(),
                chat_id,
                sender_id,
                text: text.to_owned(),
                sent_at: now,
            };
            self.pending_echoes.push_back(text.to_owned());
            self.timeline.push(provisional.clone());
            effects.events.push(ClientEvent::MessageAppended {
                message: provisional,
            });
        }

        effects
    }

    /// Request creation of a new chat.
    ///
    /// `member_ids` must be a non-empty set of positive ids; duplicates are
    /// collapsed. The name may be empty. The new chat arrives indirectly
    /// via a later `chat_list_updated` notification.
    pub fn create_chat(&self, member_ids: &[i64], name: &str) -> Effects {
        let mut unique: Vec<i64> = Vec::with_capacity(member_ids.len());
        for &id in member_ids {
            if id <= 0 {
                debug!(member_id = id, "ignoring create request: non-positive member id");
                return Effects::none();
            }
            if !unique.contains(&id) {
                unique.push(id);
            }
        }
        if unique.is_empty() {
            debug!("ignoring create request: empty member list");
            return Effects::none();
        }

        Effects::request(ClientRequest::CreateChat {
            member_ids: unique,
            name: name.to_owned(),
        })
    }

    /// Apply one server event under the documented reconciliation rules.
    pub fn apply(&mut self, event: &ServerEvent) -> Effects {
        match event {
            ServerEvent::MyChatsList { chats } => {
                self.chats = chats.clone();
                Effects {
                    request: None,
                    events: vec![ClientEvent::ChatListReplaced {
                        chats: chats.clone(),
                    }],
                }
            }
            ServerEvent::ChatHistory { messages } => self.apply_history(messages),
            ServerEvent::NewMessage(message) => self.apply_new_message(message),
            ServerEvent::ChatListUpdated => {
                trace!("chat list changed upstream; refetching");
                Effects::request(ClientRequest::GetMyChats)
            }
            // The handshake belongs to the connection manager.
            ServerEvent::AuthStatus { .. } => Effects::none(),
        }
    }

    fn apply_history(&mut self, messages: &[Message]) -> Effects {
        let Some(request_tag) = self.pending_history.pop_front() else {
            warn!("discarding unsolicited chat history");
            return Effects::none();
        };
        let Some(active_id) = self.active_chat.as_ref().map(|chat| chat.id.clone()) else {
            debug!("discarding chat history: no active chat");
            return Effects::none();
        };
        if request_tag != active_id {
            debug!(
                requested = %request_tag,
                active = %active_id,
                "discarding stale chat history"
            );
            return Effects::none();
        }

        let mut admitted: Vec<Message> = Vec::with_capacity(messages.len());
        for message in messages {
            if message.chat_id == active_id {
                admitted.push(message.clone());
            } else {
                warn!(
                    message_id = %message.id,
                    chat_id = %message.chat_id,
                    "dropping history entry for a different chat"
                );
            }
        }

        // History order is canonical; replace wholesale, never merge.
        self.timeline = admitted.clone();
        self.pending_echoes.clear();
        Effects {
            request: None,
            events: vec![ClientEvent::TimelineReplaced {
                chat_id: active_id,
                messages: admitted,
            }],
        }
    }

    fn apply_new_message(&mut self, message: &Message) -> Effects {
        let Some(active_id) = self.active_chat.as_ref().map(|chat| chat.id.clone()) else {
            trace!(chat_id = %message.chat_id, "discarding live message: no active chat");
            return Effects::none();
        };
        if message.chat_id != active_id {
            trace!(
                chat_id = %message.chat_id,
                active = %active_id,
                "discarding live message for inactive chat"
            );
            return Effects::none();
        }

        // A known id is a redelivery or the echo of an already-admitted
        // entry; replace in place instead of appending a duplicate.
        if !message.id.is_empty()
            && let Some(existing) = self.timeline.iter_mut().find(|m| m.id == message.id)
        {
            *existing = message.clone();
            return self.timeline_replaced(active_id);
        }

        // Echo of an optimistic send: swap the provisional entry for the
        // server's version instead of appending it twice.
        if self.own_user_id == Some(message.sender_id)
            && self.pending_echoes.front() == Some(&message.text)
        {
            self.pending_echoes.pop_front();
            if let Some(position) = self
                .timeline
                .iter()
                .position(|m| m.id.is_empty() && m.text == message.text)
            {
                self.timeline[position] = message.clone();
                return self.timeline_replaced(active_id);
            }
        }

        self.timeline.push(message.clone());
        Effects {
            request: None,
            events: vec![ClientEvent::MessageAppended {
                message: message.clone(),
            }],
        }
    }

    fn timeline_replaced(&self, chat_id: String) -> Effects {
        Effects {
            request: None,
            events: vec![ClientEvent::TimelineReplaced {
                chat_id,
                messages: self.timeline.clone(),
            }],
        }
    }
}
