use crate::bo::session::SessionStatus;
use crate::bo::state::ServerState;
use crate::config::{Config, ResolveMode};
use crate::destination::{new_tcp_destination, DestinationFramed, DestinationWriter};
use crate::error::GatewayError;
use crate::handler::forward::{log_preview, spawn_forwarding, ForwardOutcome};
use crate::handler::outbound::ClientOutbound;
use futures::{Sink, Stream};
use futures_util::StreamExt;
use sipws_domain::sip::SERVICE_UNAVAILABLE_RESPONSE;
use sipws_domain::{ClientDirective, ClientFrame, Destination, ServerNotice};
use std::collections::VecDeque;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};
type DialFuture = Pin<Box<dyn Future<Output = Result<DestinationFramed, GatewayError>> + Send>>;
type Dialer = fn(Destination, Arc<Config>) -> DialFuture;
// How long the close frame may take to reach a client that stopped reading
const CLIENT_WRITER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);
fn dial_tcp_destination(destination: Destination, config: Arc<Config>) -> DialFuture {
    Box::pin(new_tcp_destination(destination, config))
}
/// The dial in flight, together with what it dials for.
struct PendingDial {
    destination: Destination,
    explicit: bool,
    dial: DialFuture,
}
/// One client websocket paired with at most one sip server connection.
///
/// The session task is the single owner of the status and of the sip server
/// write half, the forwarding task only reports back through its join
/// handle, so closing happens in one place.
pub struct RelaySession {
    client_address: SocketAddr,
    server_state: ServerState,
    dialer: Dialer,
    status: SessionStatus,
    client_outbound: ClientOutbound,
    client_writer_guard: Option<JoinHandle<()>>,
    pending_dial: Option<PendingDial>,
    pending_sip_texts: VecDeque<String>,
    dst_writer: Option<DestinationWriter>,
    forwarding_guard: Option<JoinHandle<ForwardOutcome>>,
}
async fn wait_dial(pending_dial: &mut Option<PendingDial>) -> Result<DestinationFramed, GatewayError> {
    match pending_dial.as_mut() {
        Some(pending_dial) => pending_dial.dial.as_mut().await,
        None => std::future::pending().await,
    }
}
async fn wait_forwarding(
    forwarding_guard: &mut Option<JoinHandle<ForwardOutcome>>,
) -> Result<ForwardOutcome, JoinError> {
    match forwarding_guard.as_mut() {
        Some(forwarding_guard) => forwarding_guard.await,
        None => std::future::pending().await,
    }
}
impl RelaySession {
    pub fn new<K>(client_ws_sink: K, client_address: SocketAddr, server_state: ServerState) -> Self
    where
        K: Sink<Message, Error = tungstenite::Error> + Unpin + Send + 'static,
    {
        let (client_outbound, client_writer_guard) =
            ClientOutbound::spawn(client_ws_sink, client_address);
        Self {
            client_address,
            server_state,
            dialer: dial_tcp_destination,
            status: SessionStatus::Idle,
            client_outbound,
            client_writer_guard: Some(client_writer_guard),
            pending_dial: None,
            pending_sip_texts: VecDeque::new(),
            dst_writer: None,
            forwarding_guard: None,
        }
    }
    #[cfg(test)]
    fn with_dialer(mut self, dialer: Dialer) -> Self {
        self.dialer = dialer;
        self
    }
    /// Drive the session until either side finishes, then release both sides.
    pub async fn run<R>(mut self, mut client_ws_read: R) -> SessionStatus
    where
        R: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
    {
        debug!(
            client_address = { format!("{}", self.client_address) },
            "Relay session started."
        );
        while self.status != SessionStatus::Closed {
            tokio::select! {
                dial_result = wait_dial(&mut self.pending_dial) => {
                    self.on_dial_complete(dial_result).await;
                }
                forward_result = wait_forwarding(&mut self.forwarding_guard) => {
                    self.forwarding_guard = None;
                    self.on_forwarding_complete(forward_result).await;
                }
                client_item = client_ws_read.next() => match client_item {
                    None => self.on_client_closed(None),
                    Some(Err(e)) => self.on_client_closed(Some(e)),
                    Some(Ok(client_message)) => self.on_client_message(client_message).await,
                }
            }
        }
        self.shutdown().await;
        self.status
    }
    async fn on_client_message(&mut self, client_message: Message) {
        let client_frame = match client_message {
            Message::Text(text) => {
                match ClientFrame::decode_text(text, *self.server_state.config().default_sip_port())
                {
                    Ok(client_frame) => client_frame,
                    Err(e) => {
                        warn!(
                            client_address = { format!("{}", self.client_address) },
                            "Ignore invalid client directive: {e}"
                        );
                        return;
                    }
                }
            }
            Message::Binary(data) => ClientFrame::Binary(data.into()),
            Message::Close(close_frame) => {
                debug!(
                    client_address = { format!("{}", self.client_address) },
                    "Client sent close frame: {close_frame:?}"
                );
                self.on_client_closed(None);
                return;
            }
            // Pings are answered by the websocket layer
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => return,
        };
        self.on_client_frame(client_frame).await;
    }
    async fn on_client_frame(&mut self, client_frame: ClientFrame) {
        match (self.status, client_frame) {
            (SessionStatus::Closed, _) => {}
            (_, ClientFrame::Binary(data)) => {
                warn!(
                    client_address = { format!("{}", self.client_address) },
                    status = { format!("{}", self.status) },
                    "Ignore binary frame of {} bytes, only text crosses the relay.",
                    data.len()
                );
            }
            (SessionStatus::Idle, ClientFrame::Directive(ClientDirective::Connect(destination))) => {
                self.start_dial(destination, true, None);
            }
            (SessionStatus::Idle, ClientFrame::RawText(sip_text)) => {
                match self.server_state.config().resolve_mode() {
                    ResolveMode::Sniff => {
                        let destination =
                            self.server_state.destination_resolver().resolve(&sip_text);
                        self.start_dial(destination, false, Some(sip_text));
                    }
                    ResolveMode::Explicit => {
                        warn!(
                            client_address = { format!("{}", self.client_address) },
                            "Sip server not connected yet, drop client message: {}",
                            log_preview(&sip_text)
                        );
                    }
                }
            }
            (SessionStatus::Connecting, ClientFrame::RawText(sip_text)) => {
                debug!(
                    client_address = { format!("{}", self.client_address) },
                    "Sip server still connecting, queue client message."
                );
                self.pending_sip_texts.push_back(sip_text);
            }
            (SessionStatus::Connected, ClientFrame::RawText(sip_text)) => {
                self.write_destination(sip_text).await;
            }
            (_, ClientFrame::Directive(directive)) => {
                warn!(
                    client_address = { format!("{}", self.client_address) },
                    status = { format!("{}", self.status) },
                    "Ignore directive, the session already has a sip server: {directive:?}"
                );
            }
        }
    }
    fn start_dial(&mut self, destination: Destination, explicit: bool, first_sip_text: Option<String>) {
        info!(
            client_address = { format!("{}", self.client_address) },
            destination = { format!("{destination}") },
            "Connecting sip server."
        );
        self.status = SessionStatus::Connecting;
        if let Some(first_sip_text) = first_sip_text {
            self.pending_sip_texts.push_back(first_sip_text);
        }
        let dial = (self.dialer)(destination.clone(), self.server_state.config().clone());
        self.pending_dial = Some(PendingDial {
            destination,
            explicit,
            dial,
        });
    }
    async fn on_dial_complete(&mut self, dial_result: Result<DestinationFramed, GatewayError>) {
        let Some(PendingDial {
            destination,
            explicit,
            ..
        }) = self.pending_dial.take()
        else {
            return;
        };
        let destination_framed = match dial_result {
            Ok(destination_framed) => destination_framed,
            Err(e) => {
                self.on_dial_failed(destination, explicit, e).await;
                return;
            }
        };
        info!(
            client_address = { format!("{}", self.client_address) },
            destination = { format!("{destination}") },
            "Sip server connected."
        );
        let (dst_writer, dst_read) = DestinationWriter::split(destination.clone(), destination_framed);
        self.dst_writer = Some(dst_writer);
        self.status = SessionStatus::Connected;
        // The acknowledgment goes out before anything the sip server sends
        if explicit {
            self.send_notice(ServerNotice::Connected).await;
        }
        self.forwarding_guard = Some(spawn_forwarding(
            dst_read,
            self.client_outbound.clone(),
            destination,
            self.client_address,
        ));
        while let Some(sip_text) = self.pending_sip_texts.pop_front() {
            self.write_destination(sip_text).await;
            if self.status == SessionStatus::Closed {
                break;
            }
        }
    }
    async fn on_dial_failed(&mut self, destination: Destination, explicit: bool, e: GatewayError) {
        error!(
            client_address = { format!("{}", self.client_address) },
            destination = { format!("{destination}") },
            "Fail to connect sip server: {e}"
        );
        self.status = SessionStatus::Closed;
        self.pending_sip_texts.clear();
        if self.client_outbound.is_closed() {
            return;
        }
        if explicit {
            self.send_notice(ServerNotice::Error {
                message: format!("Failed to connect: {e}"),
            })
            .await;
        }
        if let Err(e) = self
            .client_outbound
            .send_text(SERVICE_UNAVAILABLE_RESPONSE.to_string())
            .await
        {
            debug!(
                client_address = { format!("{}", self.client_address) },
                "Fail to send sip failure response to client: {e}"
            );
            return;
        }
        tokio::time::sleep(self.server_state.config().close_grace_delay_duration()).await;
        self.client_outbound
            .close(CloseCode::Error, "SIP server connection failed")
            .await;
    }
    async fn on_forwarding_complete(&mut self, forward_result: Result<ForwardOutcome, JoinError>) {
        self.status = SessionStatus::Closed;
        match forward_result {
            Ok(ForwardOutcome::Ended) => {
                info!(
                    client_address = { format!("{}", self.client_address) },
                    "Sip server closed the connection."
                );
                self.client_outbound
                    .close(CloseCode::Normal, "SIP server closed connection")
                    .await;
            }
            Ok(ForwardOutcome::Failed(reason)) => {
                self.client_outbound
                    .close(CloseCode::Error, format!("SIP server read failed: {reason}"))
                    .await;
            }
            Ok(ForwardOutcome::ClientGone) => {
                debug!(
                    client_address = { format!("{}", self.client_address) },
                    "Client websocket gone while forwarding."
                );
            }
            Err(e) => {
                error!(
                    client_address = { format!("{}", self.client_address) },
                    "Forwarding task failed: {e:?}"
                );
                self.client_outbound
                    .close(CloseCode::Error, "SIP relay failed")
                    .await;
            }
        }
    }
    fn on_client_closed(&mut self, error: Option<tungstenite::Error>) {
        match error {
            None => info!(
                client_address = { format!("{}", self.client_address) },
                "Client websocket disconnected."
            ),
            Some(e) => error!(
                client_address = { format!("{}", self.client_address) },
                "Client websocket error: {e:?}"
            ),
        }
        self.status = SessionStatus::Closed;
    }
    async fn write_destination(&mut self, sip_text: String) {
        let Some(dst_writer) = self.dst_writer.as_mut() else {
            return;
        };
        debug!(
            client_address = { format!("{}", self.client_address) },
            "-> To sip server: {}",
            log_preview(&sip_text)
        );
        if let Err(e) = dst_writer.write(sip_text).await {
            error!(
                client_address = { format!("{}", self.client_address) },
                "Fail to write sip server: {e:?}"
            );
            self.status = SessionStatus::Closed;
            self.client_outbound
                .close(CloseCode::Error, "SIP server write failed")
                .await;
        }
    }
    async fn send_notice(&mut self, notice: ServerNotice) {
        let notice_json = match notice.to_json() {
            Ok(notice_json) => notice_json,
            Err(e) => {
                error!("Fail to encode server notice: {e}");
                return;
            }
        };
        if let Err(e) = self.client_outbound.send_text(notice_json).await {
            debug!(
                client_address = { format!("{}", self.client_address) },
                "Fail to send notice to client: {e}"
            );
        }
    }
    /// Release everything the session owns, each piece exactly once.
    async fn shutdown(&mut self) {
        self.status = SessionStatus::Closed;
        self.pending_dial = None;
        self.pending_sip_texts.clear();
        if let Some(forwarding_guard) = self.forwarding_guard.take() {
            forwarding_guard.abort();
            if let Err(e) = forwarding_guard.await {
                if !e.is_cancelled() {
                    error!(
                        client_address = { format!("{}", self.client_address) },
                        "Forwarding task failed: {e:?}"
                    );
                }
            }
        }
        if let Some(mut dst_writer) = self.dst_writer.take() {
            dst_writer.close().await;
        }
        self.client_outbound
            .close(CloseCode::Normal, "Relay session closed")
            .await;
        if let Some(mut client_writer_guard) = self.client_writer_guard.take() {
            match timeout(CLIENT_WRITER_SHUTDOWN_TIMEOUT, &mut client_writer_guard).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(
                        client_address = { format!("{}", self.client_address) },
                        "Client writer task failed: {e:?}"
                    );
                }
                Err(_) => {
                    warn!(
                        client_address = { format!("{}", self.client_address) },
                        "Client stopped reading, abort the websocket writer."
                    );
                    client_writer_guard.abort();
                }
            }
        }
        debug!(
            client_address = { format!("{}", self.client_address) },
            "Relay session closed."
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destination::{connect_with_timeout, DestinationTextCodec};
    use futures::channel::mpsc::{unbounded, UnboundedReceiver};
    use futures_util::SinkExt;
    use tokio::io::AsyncWriteExt;
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::mpsc::channel;
    use tokio_util::codec::Framed;

    const SIP_OK: &str = "SIP/2.0 200 OK\r\nContent-Length: 0\r\n\r\n";
    const OPTIONS: &str = "OPTIONS sip:x SIP/2.0\r\n\r\n";

    fn server_state(config_text: &str) -> ServerState {
        let (server_event_tx, _) = channel(16);
        let config = toml::from_str::<Config>(config_text).unwrap();
        ServerState::from_config(Arc::new(config), server_event_tx).unwrap()
    }

    fn new_session(
        server_state: ServerState,
    ) -> (RelaySession, UnboundedReceiver<Message>) {
        let (client_ws_sink, written) = unbounded::<Message>();
        let client_ws_sink =
            client_ws_sink.sink_map_err(|_| tungstenite::Error::ConnectionClosed);
        let client_address = "127.0.0.1:45000".parse().unwrap();
        (
            RelaySession::new(client_ws_sink, client_address, server_state),
            written,
        )
    }

    fn dial_never_answers(destination: Destination, config: Arc<Config>) -> DialFuture {
        Box::pin(async move {
            let dst_tcp_stream = connect_with_timeout(
                &destination,
                *config.dial_timeout(),
                std::future::pending::<std::io::Result<TcpStream>>(),
            )
            .await?;
            Ok::<_, GatewayError>(Framed::new(dst_tcp_stream, DestinationTextCodec::new()))
        })
    }

    fn dial_refused(_: Destination, _: Arc<Config>) -> DialFuture {
        Box::pin(async {
            Err(GatewayError::from(std::io::Error::from(
                std::io::ErrorKind::ConnectionRefused,
            )))
        })
    }

    fn first_message_then_stay_open(
        text: &str,
    ) -> impl Stream<Item = Result<Message, tungstenite::Error>> + Unpin {
        futures::stream::iter(vec![Ok(Message::Text(text.to_string()))])
            .chain(futures::stream::pending())
    }

    fn is_close_with(message: &Message, code: CloseCode) -> bool {
        matches!(message, Message::Close(Some(close_frame)) if close_frame.code == code)
    }

    #[tokio::test]
    async fn session_runs_on_a_spawned_task() {
        let (relay_session, _written) = new_session(server_state(""));
        let client_ws_read = futures::stream::empty::<Result<Message, tungstenite::Error>>();
        let status = tokio::spawn(relay_session.run(client_ws_read)).await.unwrap();
        assert_eq!(status, SessionStatus::Closed);
    }

    #[tokio::test]
    async fn non_text_frames_in_idle_never_dial() {
        let (relay_session, written) = new_session(server_state(""));
        let client_ws_read = futures::stream::iter(vec![
            Ok(Message::Binary(vec![1, 2, 3])),
            Ok(Message::Ping(vec![])),
        ]);
        assert_eq!(relay_session.run(client_ws_read).await, SessionStatus::Closed);
        let written = written.collect::<Vec<Message>>().await;
        assert_eq!(written.len(), 1);
        assert!(matches!(
            &written[0],
            Message::Close(Some(close_frame)) if close_frame.code == CloseCode::Normal
        ));
    }

    #[tokio::test]
    async fn dial_failure_sends_503_then_error_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let closed_port = listener.local_addr().unwrap().port();
        drop(listener);
        let (relay_session, written) = new_session(server_state(&format!(
            "default_sip_host = \"127.0.0.1\"\ndefault_sip_port = {closed_port}\nclose_grace_delay = 1\n"
        )));
        // The client stays connected while the dial fails
        let client_ws_read = futures::stream::iter(vec![Ok(Message::Text(
            "OPTIONS sip:x SIP/2.0\r\n\r\n".to_string(),
        ))])
        .chain(futures::stream::pending());
        assert_eq!(relay_session.run(client_ws_read).await, SessionStatus::Closed);
        let written = written.collect::<Vec<Message>>().await;
        assert_eq!(written.len(), 2);
        assert_eq!(
            written[0],
            Message::Text(SERVICE_UNAVAILABLE_RESPONSE.to_string())
        );
        assert!(matches!(
            &written[1],
            Message::Close(Some(close_frame)) if close_frame.code == CloseCode::Error
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn dial_timeout_sends_one_503_then_error_close() {
        let (relay_session, written) =
            new_session(server_state("dial_timeout = 200\nclose_grace_delay = 50\n"));
        let relay_session = relay_session.with_dialer(dial_never_answers);
        let status = relay_session
            .run(first_message_then_stay_open(OPTIONS))
            .await;
        assert_eq!(status, SessionStatus::Closed);
        let written = written.collect::<Vec<Message>>().await;
        assert_eq!(written.len(), 2);
        assert_eq!(
            written[0],
            Message::Text(SERVICE_UNAVAILABLE_RESPONSE.to_string())
        );
        assert!(is_close_with(&written[1], CloseCode::Error));
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_dial_timeout_reports_error_notice_first() {
        let (relay_session, written) = new_session(server_state(
            "resolve_mode = \"explicit\"\ndial_timeout = 200\nclose_grace_delay = 50\n",
        ));
        let relay_session = relay_session.with_dialer(dial_never_answers);
        relay_session
            .run(first_message_then_stay_open(
                r#"{"type":"connect","sipServer":"sip.example.com"}"#,
            ))
            .await;
        let timed_out = GatewayError::DestinationConnectTimeout {
            destination: Destination::new("sip.example.com".into(), 5060),
            timeout_ms: 200,
        };
        let error_notice = ServerNotice::Error {
            message: format!("Failed to connect: {timed_out}"),
        };
        let written = written.collect::<Vec<Message>>().await;
        assert_eq!(written.len(), 3);
        assert_eq!(written[0], Message::Text(error_notice.to_json().unwrap()));
        assert_eq!(
            written[1],
            Message::Text(SERVICE_UNAVAILABLE_RESPONSE.to_string())
        );
        assert!(is_close_with(&written[2], CloseCode::Error));
    }

    #[tokio::test]
    async fn explicit_connect_acknowledged_before_sip_server_data() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        // The sip server talks first and hangs up right away
        tokio::spawn(async move {
            let (mut sip_stream, _) = listener.accept().await.unwrap();
            sip_stream.write_all(SIP_OK.as_bytes()).await.unwrap();
        });
        let (relay_session, written) = new_session(server_state("resolve_mode = \"explicit\"\n"));
        let status = relay_session
            .run(first_message_then_stay_open(&format!(
                r#"{{"type":"connect","sipServer":"127.0.0.1:{port}"}}"#
            )))
            .await;
        assert_eq!(status, SessionStatus::Closed);
        let written = written.collect::<Vec<Message>>().await;
        assert_eq!(
            written[0],
            Message::Text(ServerNotice::Connected.to_json().unwrap())
        );
        let relayed = written[1..written.len() - 1]
            .iter()
            .map(|message| match message {
                Message::Text(text) => text.as_str(),
                other => panic!("expect text frame, got {other:?}"),
            })
            .collect::<String>();
        assert_eq!(relayed, SIP_OK);
        assert!(is_close_with(&written[written.len() - 1], CloseCode::Normal));
    }

    #[tokio::test]
    async fn sip_server_write_failure_closes_with_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let destination = Destination::new("127.0.0.1".into(), port);
        let (mut relay_session, written) = new_session(server_state(""));
        let framed = new_tcp_destination(destination.clone(), relay_session.server_state.config().clone())
            .await
            .unwrap();
        let (_sip_stream, _) = listener.accept().await.unwrap();
        let (mut dst_writer, _dst_read) = DestinationWriter::split(destination, framed);
        dst_writer.close().await;
        relay_session.dst_writer = Some(dst_writer);
        relay_session.status = SessionStatus::Connected;
        relay_session
            .on_client_frame(ClientFrame::RawText(OPTIONS.to_string()))
            .await;
        assert_eq!(relay_session.status, SessionStatus::Closed);
        relay_session.shutdown().await;
        let written = written.collect::<Vec<Message>>().await;
        assert_eq!(written.len(), 1);
        match &written[0] {
            Message::Close(Some(close_frame)) => {
                assert_eq!(close_frame.code, CloseCode::Error);
                assert_eq!(close_frame.reason, "SIP server write failed");
            }
            other => panic!("expect close frame, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn client_that_stops_reading_does_not_hold_the_session() {
        // Nobody reads this channel, the writer blocks after the first frame
        let (client_ws_sink, mut written) = futures::channel::mpsc::channel::<Message>(0);
        let client_ws_sink =
            client_ws_sink.sink_map_err(|_| tungstenite::Error::ConnectionClosed);
        let relay_session = RelaySession::new(
            client_ws_sink,
            "127.0.0.1:45001".parse().unwrap(),
            server_state(""),
        )
        .with_dialer(dial_refused);
        let status = timeout(
            Duration::from_secs(60),
            relay_session.run(first_message_then_stay_open(OPTIONS)),
        )
        .await
        .unwrap();
        assert_eq!(status, SessionStatus::Closed);
        assert_eq!(
            written.next().await,
            Some(Message::Text(SERVICE_UNAVAILABLE_RESPONSE.to_string()))
        );
    }
}
