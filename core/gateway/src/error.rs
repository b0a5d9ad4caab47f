use crate::bo::state::ServerStateBuilderError;
use sipws_common::error::CommonError;
use sipws_domain::error::DomainError;
use sipws_domain::Destination;
use thiserror::Error;
use tokio_tungstenite::tungstenite;
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Common(#[from] CommonError),
    #[error(transparent)]
    WebSocket(#[from] tungstenite::Error),
    #[error(transparent)]
    Http(#[from] http::Error),
    #[error(transparent)]
    Regex(#[from] regex::Error),
    #[error(transparent)]
    ServerStateBuilder(#[from] ServerStateBuilderError),
    #[error("Timeout after {timeout_ms} milliseconds when connecting sip server {destination}")]
    DestinationConnectTimeout {
        destination: Destination,
        timeout_ms: u64,
    },
    #[error("Client websocket already closed")]
    ClientWebSocketClosed,
}
impl From<GatewayError> for std::io::Error {
    fn from(value: GatewayError) -> Self {
        std::io::Error::new(std::io::ErrorKind::Other, value)
    }
}
