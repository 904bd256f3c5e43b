use std::sync::{Mutex, PoisonError};

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use snafu::{OptionExt, ResultExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use super::error::{
    AlreadySubscribedSnafu, DecodeBodySnafu, EncodeFrameSnafu, ServiceResult, TransportClosedSnafu,
    WebSocketSnafu,
};
use super::service::{InboundReceiver, RealtimeTransport, ServiceWorker};
use super::types::{InboundMessage, OutboundMessage, PeerId, UserId};

/// JSON envelope exchanged with the chat server: `{"event": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum SocketFrame {
    /// Announces the local user so the server can route messages to this socket.
    #[serde(rename = "add-user")]
    AddUser(UserId),
    #[serde(rename = "send-msg")]
    SendMsg {
        to: PeerId,
        from: UserId,
        msg: String,
    },
    // The server spells this event name this way.
    #[serde(rename = "msg-recieve")]
    MsgReceive(String),
}

impl SocketFrame {
    pub fn encode(&self) -> ServiceResult<String> {
        serde_json::to_string(self).context(EncodeFrameSnafu {
            stage: "encode-socket-frame",
        })
    }

    pub fn decode(payload: &str) -> ServiceResult<Self> {
        serde_json::from_str(payload).context(DecodeBodySnafu {
            stage: "decode-socket-frame",
        })
    }
}

/// Websocket-backed realtime transport.
///
/// The socket itself is driven by the worker returned from [`WebSocketTransport::connect`];
/// this handle only exchanges frames with that worker over channels.
pub struct WebSocketTransport {
    outbound: mpsc::UnboundedSender<SocketFrame>,
    inbound: Mutex<Option<InboundReceiver>>,
}

pub struct RealtimeConnection {
    pub transport: WebSocketTransport,
    pub worker: ServiceWorker,
}

impl WebSocketTransport {
    pub async fn connect(url: &str, user_id: &UserId) -> ServiceResult<RealtimeConnection> {
        let (stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .context(WebSocketSnafu {
                stage: "connect-socket",
            })?;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        if outbound_tx
            .send(SocketFrame::AddUser(user_id.clone()))
            .is_err()
        {
            return TransportClosedSnafu {
                stage: "announce-user",
            }
            .fail();
        }

        tracing::info!(url, user_id = %user_id, "realtime transport connected");

        let worker: ServiceWorker =
            Box::pin(run_socket_worker(stream, outbound_rx, inbound_tx));
        Ok(RealtimeConnection {
            transport: Self::from_channels(outbound_tx, inbound_rx),
            worker,
        })
    }

    pub(crate) fn from_channels(
        outbound: mpsc::UnboundedSender<SocketFrame>,
        inbound: InboundReceiver,
    ) -> Self {
        Self {
            outbound,
            inbound: Mutex::new(Some(inbound)),
        }
    }
}

impl RealtimeTransport for WebSocketTransport {
    fn emit(&self, message: OutboundMessage) -> ServiceResult<()> {
        let frame = SocketFrame::SendMsg {
            to: message.to,
            from: message.from,
            msg: message.text,
        };
        if self.outbound.send(frame).is_err() {
            return TransportClosedSnafu { stage: "emit-send-msg" }.fail();
        }
        Ok(())
    }

    fn subscribe(&self) -> ServiceResult<InboundReceiver> {
        let mut slot = self.inbound.lock().unwrap_or_else(PoisonError::into_inner);
        slot.take().context(AlreadySubscribedSnafu {
            stage: "subscribe-inbound",
        })
    }
}

async fn run_socket_worker<S>(
    stream: WebSocketStream<S>,
    mut outbound_rx: mpsc::UnboundedReceiver<SocketFrame>,
    inbound_tx: mpsc::UnboundedSender<InboundMessage>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let (mut sink, mut source) = stream.split();

    loop {
        tokio::select! {
            frame = outbound_rx.recv() => {
                let Some(frame) = frame else {
                    // Every transport handle is gone; close politely.
                    let _ = sink.close().await;
                    break;
                };

                let payload = match frame.encode() {
                    Ok(payload) => payload,
                    Err(error) => {
                        tracing::warn!(error = %error, "dropping unencodable socket frame");
                        continue;
                    }
                };

                if let Err(source) = sink.send(WsMessage::Text(payload.into())).await {
                    tracing::error!(error = %source, "failed to write socket frame");
                    break;
                }
            }
            incoming = source.next() => {
                match incoming {
                    Some(Ok(WsMessage::Text(payload))) => {
                        match SocketFrame::decode(payload.as_str()) {
                            Ok(SocketFrame::MsgReceive(text)) => {
                                if inbound_tx.send(InboundMessage::new(text)).is_err() {
                                    tracing::debug!("inbound subscriber dropped; stopping socket worker");
                                    break;
                                }
                            }
                            Ok(frame) => {
                                tracing::debug!(?frame, "ignoring non-delivery socket frame");
                            }
                            Err(error) => {
                                tracing::warn!(error = %error, "ignoring malformed socket frame");
                            }
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        tracing::info!("realtime transport closed by server");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(source)) => {
                        tracing::error!(error = %source, "realtime transport failed");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ServiceError;

    #[test]
    fn frames_use_server_event_names() {
        let send = SocketFrame::SendMsg {
            to: PeerId::new("p-1"),
            from: UserId::new("u-1"),
            msg: "hello".to_string(),
        };

        let encoded: serde_json::Value =
            serde_json::from_str(&send.encode().expect("frame should encode"))
                .expect("encoded frame is json");

        assert_eq!(
            encoded,
            serde_json::json!({
                "event": "send-msg",
                "data": {"to": "p-1", "from": "u-1", "msg": "hello"}
            })
        );
        assert_eq!(
            SocketFrame::AddUser(UserId::new("u-1"))
                .encode()
                .expect("frame should encode"),
            r#"{"event":"add-user","data":"u-1"}"#
        );
    }

    #[test]
    fn inbound_delivery_frame_decodes_to_text() {
        let frame = SocketFrame::decode(r#"{"event":"msg-recieve","data":"see you"}"#)
            .expect("delivery frame should decode");

        assert_eq!(frame, SocketFrame::MsgReceive("see you".to_string()));
    }

    #[test]
    fn emit_queues_send_frame_for_worker() {
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
        let (_inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let transport = WebSocketTransport::from_channels(outbound_tx, inbound_rx);

        transport
            .emit(OutboundMessage::new(
                PeerId::new("p-1"),
                UserId::new("u-1"),
                "hi",
            ))
            .expect("emit should queue");

        assert_eq!(
            outbound_rx.try_recv().ok(),
            Some(SocketFrame::SendMsg {
                to: PeerId::new("p-1"),
                from: UserId::new("u-1"),
                msg: "hi".to_string(),
            })
        );
    }

    #[test]
    fn emit_after_worker_exit_reports_closed_transport() {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (_inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let transport = WebSocketTransport::from_channels(outbound_tx, inbound_rx);
        drop(outbound_rx);

        let error = transport
            .emit(OutboundMessage::new(
                PeerId::new("p-1"),
                UserId::new("u-1"),
                "hi",
            ))
            .expect_err("closed channel must fail");

        assert!(matches!(error, ServiceError::TransportClosed { .. }));
    }

    #[test]
    fn inbound_can_only_be_subscribed_once() {
        let (outbound_tx, _outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let transport = WebSocketTransport::from_channels(outbound_tx, inbound_rx);

        let mut receiver = transport.subscribe().expect("first subscription succeeds");
        inbound_tx
            .send(InboundMessage::new("ping"))
            .expect("receiver is alive");

        assert_eq!(receiver.try_recv().ok(), Some(InboundMessage::new("ping")));
        assert!(matches!(
            transport.subscribe(),
            Err(ServiceError::AlreadySubscribed { .. })
        ));
    }
}
