use std::sync::Arc;

use natter_services::{OutboundMessage, PersistenceService, RealtimeTransport};
use snafu::{ResultExt, ensure};

use crate::controller::{Completion, PendingOperation};
use crate::error::{EmptyMessageSnafu, SyncResult, TransportSnafu};
use crate::message::{MessageId, Peer, Session};

pub(crate) fn outbound_message(
    session: &Session,
    peer: &Peer,
    text: String,
) -> SyncResult<OutboundMessage> {
    ensure!(
        !text.trim().is_empty(),
        EmptyMessageSnafu {
            stage: "build-outbound"
        }
    );
    Ok(OutboundMessage::new(
        peer.peer_id.clone(),
        session.user_id.clone(),
        text,
    ))
}

/// Hands the message to the live socket. Never waits on the network.
pub(crate) fn publish(transport: &dyn RealtimeTransport, message: OutboundMessage) -> SyncResult<()> {
    transport.emit(message).context(TransportSnafu {
        stage: "publish-outbound",
    })
}

pub(crate) fn persist_operation(
    persistence: Arc<dyn PersistenceService>,
    message_id: MessageId,
    message: OutboundMessage,
) -> PendingOperation {
    Box::pin(async move {
        let result = persistence
            .record(&message)
            .await
            .context(TransportSnafu {
                stage: "persist-outbound",
            });
        Some(Completion::Persisted { message_id, result })
    })
}
