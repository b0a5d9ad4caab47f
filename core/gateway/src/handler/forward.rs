use crate::destination::DestinationRead;
use crate::handler::outbound::ClientOutbound;
use futures_util::StreamExt;
use sipws_domain::Destination;
use std::net::SocketAddr;
use tokio::task::JoinHandle;
use tracing::{debug, error};
const LOG_PREVIEW_CHARS: usize = 200;
/// How the sip server to client direction finished.
#[derive(Debug, PartialEq, Eq)]
pub enum ForwardOutcome {
    /// The sip server closed the connection.
    Ended,
    /// Reading the sip server failed.
    Failed(String),
    /// The client websocket is gone, nothing left to forward to.
    ClientGone,
}
pub(crate) fn log_preview(text: &str) -> String {
    text.chars().take(LOG_PREVIEW_CHARS).collect()
}
/// Relay sip server data to the client, one read becomes one text message.
pub fn spawn_forwarding(
    mut dst_read: DestinationRead,
    client_outbound: ClientOutbound,
    destination: Destination,
    client_address: SocketAddr,
) -> JoinHandle<ForwardOutcome> {
    tokio::spawn(async move {
        while let Some(dst_item) = dst_read.next().await {
            let sip_text = match dst_item {
                Ok(sip_text) => sip_text,
                Err(e) => {
                    error!(
                        client_address = { format!("{client_address}") },
                        destination = { format!("{destination}") },
                        "Fail to read sip server: {e:?}"
                    );
                    return ForwardOutcome::Failed(e.to_string());
                }
            };
            debug!(
                client_address = { format!("{client_address}") },
                destination = { format!("{destination}") },
                "<- From sip server: {}",
                log_preview(&sip_text)
            );
            if client_outbound.is_closed() || client_outbound.send_text(sip_text).await.is_err() {
                return ForwardOutcome::ClientGone;
            }
        }
        debug!(
            client_address = { format!("{client_address}") },
            destination = { format!("{destination}") },
            "Sip server connection exhausted."
        );
        ForwardOutcome::Ended
    })
}
