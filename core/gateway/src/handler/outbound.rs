use crate::error::GatewayError;
use futures::Sink;
use futures_util::SinkExt;
use std::borrow::Cow;
use std::net::SocketAddr;
use tokio::sync::mpsc::{channel, Receiver, Sender};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;
const OUTBOUND_CHANNEL_SIZE: usize = 1024;
#[derive(Debug)]
enum OutboundMessage {
    Text(String),
    Close { code: CloseCode, reason: String },
}
/// The only writer of a client websocket.
///
/// Both relay directions push through this handle; a single task owns the
/// websocket sink and drops everything that arrives after the close frame.
#[derive(Clone)]
pub struct ClientOutbound {
    outbound_tx: Sender<OutboundMessage>,
}
impl ClientOutbound {
    pub fn spawn<K>(client_ws_sink: K, client_address: SocketAddr) -> (Self, JoinHandle<()>)
    where
        K: Sink<Message, Error = tungstenite::Error> + Unpin + Send + 'static,
    {
        let (outbound_tx, outbound_rx) = channel::<OutboundMessage>(OUTBOUND_CHANNEL_SIZE);
        let writer_guard = tokio::spawn(write_client(client_ws_sink, outbound_rx, client_address));
        (Self { outbound_tx }, writer_guard)
    }
    pub fn is_closed(&self) -> bool {
        self.outbound_tx.is_closed()
    }
    pub async fn send_text(&self, text: String) -> Result<(), GatewayError> {
        self.outbound_tx
            .send(OutboundMessage::Text(text))
            .await
            .map_err(|_| GatewayError::ClientWebSocketClosed)
    }
    /// Ask for the close frame, a no-op once the websocket is closed.
    pub async fn close(&self, code: CloseCode, reason: impl Into<String>) {
        let close = OutboundMessage::Close {
            code,
            reason: reason.into(),
        };
        if self.outbound_tx.send(close).await.is_err() {
            debug!("Client websocket already closed, skip close frame.");
        }
    }
}
async fn write_client<K>(
    mut client_ws_sink: K,
    mut outbound_rx: Receiver<OutboundMessage>,
    client_address: SocketAddr,
) where
    K: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    while let Some(outbound_message) = outbound_rx.recv().await {
        match outbound_message {
            OutboundMessage::Text(text) => {
                if let Err(e) = client_ws_sink.send(Message::Text(text)).await {
                    debug!(
                        client_address = { format!("{client_address}") },
                        "Fail to write client websocket, stop writing: {e:?}"
                    );
                    return;
                }
            }
            OutboundMessage::Close { code, reason } => {
                debug!(
                    client_address = { format!("{client_address}") },
                    "Close client websocket with {code}: {reason}"
                );
                let close_frame = CloseFrame {
                    code,
                    reason: Cow::Owned(reason),
                };
                if let Err(e) = client_ws_sink.send(Message::Close(Some(close_frame))).await {
                    debug!(
                        client_address = { format!("{client_address}") },
                        "Fail to send close frame to client: {e:?}"
                    );
                }
                if let Err(e) = client_ws_sink.close().await {
                    debug!(
                        client_address = { format!("{client_address}") },
                        "Fail to close client websocket: {e:?}"
                    );
                }
                return;
            }
        }
    }
}
