use crate::bo::event::GatewayServerEvent;
use crate::bo::state::ServerState;
use crate::config::Config;
use crate::error::GatewayError;
use crate::handler;
use crate::publish_server_event;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use socket2::{Domain, Socket, Type};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{channel, Receiver};
use tracing::{debug, error, info};
const SERVER_EVENT_CHANNEL_SIZE: usize = 1024;
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);
pub struct GatewayServer {
    server_state: ServerState,
}
impl GatewayServer {
    pub fn new(config: Arc<Config>) -> Result<(Self, Receiver<GatewayServerEvent>), GatewayError> {
        let (server_event_tx, server_event_rx) =
            channel::<GatewayServerEvent>(SERVER_EVENT_CHANNEL_SIZE);
        Ok((
            Self {
                server_state: ServerState::from_config(config, server_event_tx)?,
            },
            server_event_rx,
        ))
    }
    fn bind_listener(server_state: &ServerState) -> Result<TcpListener, GatewayError> {
        let server_socket_addr = SocketAddr::new(
            IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            *server_state.config().port(),
        );
        let server_socket = Socket::new(Domain::IPV4, Type::STREAM, None)?;
        server_socket.set_reuse_address(true)?;
        server_socket.set_nodelay(true)?;
        server_socket.set_nonblocking(true)?;
        server_socket.bind(&server_socket_addr.into())?;
        server_socket.listen(*server_state.config().server_socket_backlog() as i32)?;
        Ok(TcpListener::from_std(server_socket.into())?)
    }
    fn spawn_client_task(
        client_tcp_stream: TcpStream,
        client_socket_address: SocketAddr,
        server_state: ServerState,
    ) {
        tokio::spawn(async move {
            let client_io = TokioIo::new(client_tcp_stream);
            let http_service = service_fn(move |request| {
                handler::handle_http_request(request, client_socket_address, server_state.clone())
            });
            if let Err(e) = http1::Builder::new()
                .serve_connection(client_io, http_service)
                .with_upgrades()
                .await
            {
                debug!(
                    client_socket_address = { format!("{client_socket_address}") },
                    "Client http connection finished with error: {e:?}"
                );
            }
        });
    }
    async fn concrete_start_server(server_listener: TcpListener, server_state: ServerState) {
        loop {
            let (client_tcp_stream, client_socket_address) = match server_listener.accept().await
            {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Fail to accept client connection: {e:?}");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    continue;
                }
            };
            debug!(
                client_socket_address = { format!("{client_socket_address}") },
                "Accept client tcp connection."
            );
            Self::spawn_client_task(
                client_tcp_stream,
                client_socket_address,
                server_state.clone(),
            );
        }
    }
    /// Bind the listener and start accepting clients in background.
    ///
    /// Returns the bound address, useful when the configured port is 0.
    pub async fn start(
        &self,
        server_event_rx: Receiver<GatewayServerEvent>,
    ) -> Result<(SocketAddr, Receiver<GatewayServerEvent>), GatewayError> {
        let server_listener = match Self::bind_listener(&self.server_state) {
            Ok(server_listener) => server_listener,
            Err(e) => {
                publish_server_event(
                    self.server_state.server_event_tx(),
                    GatewayServerEvent::ServerStartFail,
                );
                return Err(e);
            }
        };
        let local_address = server_listener.local_addr()?;
        info!(
            local_address = { format!("{local_address}") },
            "WebSocket to sip gateway listening."
        );
        tokio::spawn(Self::concrete_start_server(
            server_listener,
            self.server_state.clone(),
        ));
        publish_server_event(
            self.server_state.server_event_tx(),
            GatewayServerEvent::ServerStartup(local_address),
        );
        Ok((local_address, server_event_rx))
    }
}
