use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;

use super::error::ServiceResult;
use super::types::{
    HistoryRecord, InboundMessage, OutboundMessage, PeerId, SessionRecord, TopicPrediction, UserId,
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
pub type ServiceWorker = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;
pub type InboundReceiver = mpsc::UnboundedReceiver<InboundMessage>;

/// Read-only access to the signed-in user.
pub trait SessionStore: Send + Sync {
    /// Returns `Ok(None)` when nobody is signed in.
    fn get(&self) -> ServiceResult<Option<SessionRecord>>;
}

pub trait HistoryService: Send + Sync {
    fn fetch<'a>(
        &'a self,
        user_id: &'a UserId,
        peer_id: &'a PeerId,
    ) -> BoxFuture<'a, ServiceResult<Vec<HistoryRecord>>>;
}

pub trait PersistenceService: Send + Sync {
    fn record<'a>(&'a self, message: &'a OutboundMessage) -> BoxFuture<'a, ServiceResult<()>>;
}

/// Bidirectional live channel.
///
/// `emit` only queues the frame, so it never blocks the caller. Inbound messages can be
/// subscribed exactly once; a second subscription fails with `AlreadySubscribed`.
pub trait RealtimeTransport: Send + Sync {
    fn emit(&self, message: OutboundMessage) -> ServiceResult<()>;
    fn subscribe(&self) -> ServiceResult<InboundReceiver>;
}

pub trait ClassificationService: Send + Sync {
    fn classify<'a>(
        &'a self,
        samples: &'a [String],
    ) -> BoxFuture<'a, ServiceResult<Vec<TopicPrediction>>>;
}

/// Fire-and-forget sink for ephemeral notifications.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, label: &str);
}
