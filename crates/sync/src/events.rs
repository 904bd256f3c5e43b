use natter_services::PeerId;

use crate::message::{Message, MessageId};

/// Everything the rendering layer needs to mirror the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewEvent {
    /// A peer was selected; the old transcript is gone and history is being fetched.
    HistoryLoading { peer_id: PeerId },
    /// The transcript was replaced wholesale; render `messages` in order.
    TranscriptReplaced {
        peer_id: PeerId,
        messages: Vec<Message>,
    },
    MessageAppended { message: Message },
    /// The latest message should be brought into view.
    ScrollToLatest,
    HistoryFailed { peer_id: PeerId, error: String },
    /// The message stays on screen but may not have reached the peer.
    DeliveryFailed { message_id: MessageId, error: String },
    PollingChanged { running: bool },
}
