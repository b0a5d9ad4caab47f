use crate::config::Config;
use crate::destination::DestinationTextCodec;
use crate::error::GatewayError;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use sipws_domain::Destination;
use socket2::SockRef;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::{debug, error};
pub type DestinationFramed = Framed<TcpStream, DestinationTextCodec>;
pub type DestinationRead = SplitStream<DestinationFramed>;
/// Await a connect attempt for at most `dial_timeout_ms` milliseconds.
pub(crate) async fn connect_with_timeout<C>(
    destination: &Destination,
    dial_timeout_ms: u64,
    connect: C,
) -> Result<TcpStream, GatewayError>
where
    C: Future<Output = std::io::Result<TcpStream>>,
{
    match timeout(Duration::from_millis(dial_timeout_ms), connect).await {
        Ok(Ok(dst_tcp_stream)) => Ok(dst_tcp_stream),
        Ok(Err(e)) => {
            error!(
                destination = { format!("{destination}") },
                "Fail to connect sip server: {e:?}"
            );
            Err(e.into())
        }
        Err(_) => {
            error!(
                destination = { format!("{destination}") },
                "Fail to connect sip server because of timeout: {dial_timeout_ms} milliseconds"
            );
            Err(GatewayError::DestinationConnectTimeout {
                destination: destination.clone(),
                timeout_ms: dial_timeout_ms,
            })
        }
    }
}
/// Dial the sip server, bounded by the configured dial timeout.
pub async fn new_tcp_destination(
    destination: Destination,
    config: Arc<Config>,
) -> Result<DestinationFramed, GatewayError> {
    let dst_tcp_stream = connect_with_timeout(
        &destination,
        *config.dial_timeout(),
        TcpStream::connect((destination.host.as_str(), destination.port)),
    )
    .await?;
    let dst_socket = SockRef::from(&dst_tcp_stream);
    dst_socket.set_nodelay(*config.dst_tcp_nodelay())?;
    dst_socket.set_linger(None)?;
    Ok(Framed::with_capacity(
        dst_tcp_stream,
        DestinationTextCodec::new(),
        *config.dst_buffer_size(),
    ))
}
/// The write half of a sip server connection.
///
/// Closing is idempotent, whichever side of the relay gives up first closes
/// it and later attempts are no-ops.
pub struct DestinationWriter {
    destination: Destination,
    dst_sink: Option<SplitSink<DestinationFramed, String>>,
}
impl DestinationWriter {
    /// Split a connected destination into the writer and the read half.
    pub fn split(destination: Destination, framed: DestinationFramed) -> (Self, DestinationRead) {
        let (dst_sink, dst_stream) = framed.split();
        (
            Self {
                destination,
                dst_sink: Some(dst_sink),
            },
            dst_stream,
        )
    }
    pub fn is_closed(&self) -> bool {
        self.dst_sink.is_none()
    }
    pub async fn write(&mut self, sip_text: String) -> Result<(), GatewayError> {
        match self.dst_sink.as_mut() {
            Some(dst_sink) => dst_sink.send(sip_text).await,
            None => Err(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                format!("sip server connection {} already closed", self.destination),
            )
            .into()),
        }
    }
    pub async fn close(&mut self) {
        let Some(mut dst_sink) = self.dst_sink.take() else {
            debug!(
                destination = { format!("{}", self.destination) },
                "Sip server connection already closed."
            );
            return;
        };
        if let Err(e) = dst_sink.close().await {
            debug!(
                destination = { format!("{}", self.destination) },
                "Error when closing sip server connection: {e:?}"
            );
        }
    }
}
