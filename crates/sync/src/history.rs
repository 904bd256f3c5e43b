use std::sync::Arc;

use natter_services::HistoryService;
use snafu::ResultExt;

use crate::controller::{Completion, PendingOperation};
use crate::error::{FetchSnafu, SyncResult};
use crate::message::{Message, Peer, Session};
use crate::transcript::HistoryGeneration;

/// Fetches the full conversation between `session` and `peer`, oldest first.
pub async fn load_history(
    service: &dyn HistoryService,
    session: &Session,
    peer: &Peer,
) -> SyncResult<Vec<Message>> {
    let records = service
        .fetch(&session.user_id, &peer.peer_id)
        .await
        .context(FetchSnafu {
            stage: "load-history",
        })?;
    Ok(records.into_iter().map(Message::from_history).collect())
}

pub(crate) fn history_operation(
    service: Arc<dyn HistoryService>,
    session: Session,
    peer: Peer,
    generation: HistoryGeneration,
) -> PendingOperation {
    Box::pin(async move {
        let result = load_history(service.as_ref(), &session, &peer).await;
        Some(Completion::HistoryLoaded {
            generation,
            peer_id: peer.peer_id,
            result,
        })
    })
}
