//! Collaborators the transcript controller talks to: the chat server's HTTP API, the
//! realtime socket, the topic classifier, the session store and the notification sink.

mod error;
mod http;
mod service;
mod session;
mod socket;
mod types;

pub use error::{ServiceError, ServiceResult};
pub use http::{
    HISTORY_ROUTE, HttpChatApi, HttpTopicClassifier, PERSIST_ROUTE, decode_history, decode_topics,
};
pub use service::{
    BoxFuture, ClassificationService, HistoryService, InboundReceiver, NotificationSink,
    PersistenceService, RealtimeTransport, ServiceWorker, SessionStore,
};
pub use session::FileSessionStore;
pub use socket::{RealtimeConnection, SocketFrame, WebSocketTransport};
pub use types::{
    HistoryRecord, InboundMessage, OutboundMessage, PeerId, SessionRecord, TopicPrediction, UserId,
};
