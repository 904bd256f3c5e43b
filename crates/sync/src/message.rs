use std::fmt;

use natter_services::{HistoryRecord, PeerId, SessionRecord, UserId};
use uuid::Uuid;

/// Stable render key, assigned once when a message is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new_v7() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Who authored a message, relative to the local user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    Local,
    Peer,
}

/// Immutable transcript entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub origin: Origin,
    pub text: String,
}

impl Message {
    pub fn new(origin: Origin, text: impl Into<String>) -> Self {
        Self {
            id: MessageId::new_v7(),
            origin,
            text: text.into(),
        }
    }

    pub fn local(text: impl Into<String>) -> Self {
        Self::new(Origin::Local, text)
    }

    pub fn peer(text: impl Into<String>) -> Self {
        Self::new(Origin::Peer, text)
    }

    pub fn from_history(record: HistoryRecord) -> Self {
        let origin = if record.from_self {
            Origin::Local
        } else {
            Origin::Peer
        };
        Self::new(origin, record.message)
    }

    pub fn is_from_peer(&self) -> bool {
        self.origin == Origin::Peer
    }
}

/// Local actor, captured at construction and replaced only by an explicit refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: UserId,
    pub username: String,
}

impl From<SessionRecord> for Session {
    fn from(record: SessionRecord) -> Self {
        Self {
            user_id: record.user_id,
            username: record.username,
        }
    }
}

/// Conversation partner currently on screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    pub peer_id: PeerId,
    pub display_name: String,
    pub avatar: Option<String>,
}

impl Peer {
    pub fn new(peer_id: impl Into<PeerId>, display_name: impl Into<String>) -> Self {
        Self {
            peer_id: peer_id.into(),
            display_name: display_name.into(),
            avatar: None,
        }
    }
}
