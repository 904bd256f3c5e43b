use std::fmt;

use serde::{Deserialize, Serialize};

// Account ids are opaque server-issued strings; the macro keeps both wrappers identical.
macro_rules! define_account_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into().trim().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }
    };
}

define_account_id!(UserId);
define_account_id!(PeerId);

/// Signed-in user as persisted by the session store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(rename = "_id")]
    pub user_id: UserId,
    #[serde(default)]
    pub username: String,
}

impl SessionRecord {
    pub fn new(user_id: impl Into<UserId>, username: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
        }
    }
}

/// One row of conversation history, in server order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub from_self: bool,
    pub message: String,
}

impl HistoryRecord {
    pub fn new(from_self: bool, message: impl Into<String>) -> Self {
        Self {
            from_self,
            message: message.into(),
        }
    }
}

/// Locally authored message addressed to one peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub to: PeerId,
    pub from: UserId,
    pub text: String,
}

impl OutboundMessage {
    pub fn new(to: PeerId, from: UserId, text: impl Into<String>) -> Self {
        Self {
            to,
            from,
            text: text.into(),
        }
    }
}

/// Text pushed by the realtime transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub text: String,
}

impl InboundMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// One classifier label. Duplicates are expected and left to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicPrediction {
    pub prediction: String,
}

impl TopicPrediction {
    pub fn new(prediction: impl Into<String>) -> Self {
        Self {
            prediction: prediction.into(),
        }
    }
}
