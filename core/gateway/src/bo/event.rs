use std::net::SocketAddr;
#[derive(Debug)]
pub enum GatewayServerEvent {
    ServerStartup(SocketAddr),
    ServerStartFail,
    SessionStarted(SocketAddr),
    SessionClosed(SocketAddr),
}
