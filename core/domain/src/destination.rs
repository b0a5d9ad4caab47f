use crate::error::DomainError;
use derive_more::{Constructor, Display};
use std::net::SocketAddr;
/// The sip server a relay session dials, the host can be a domain or an ip address.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Constructor, Display)]
#[display("{host}:{port}")]
pub struct Destination {
    pub host: String,
    pub port: u16,
}
impl Destination {
    /// Parse a `host[:port]` text, the port falls back to `default_port` when absent.
    ///
    /// Ip v6 hosts must be written in brackets when a port is given, `[::1]:5060`.
    pub fn parse(value: &str, default_port: u16) -> Result<Self, DomainError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(DomainError::ParseSipServerAddress(value.to_string()));
        }
        if let Ok(socket_address) = value.parse::<SocketAddr>() {
            return Ok(Self::new(
                socket_address.ip().to_string(),
                socket_address.port(),
            ));
        }
        if let Some(bracketed_host) = value
            .strip_prefix('[')
            .and_then(|value| value.strip_suffix(']'))
        {
            return Ok(Self::new(bracketed_host.to_string(), default_port));
        }
        let host_parts = value.split(':').collect::<Vec<&str>>();
        match host_parts.len() {
            2 => {
                let host = host_parts[0];
                if host.is_empty() {
                    return Err(DomainError::ParseSipServerAddress(value.to_string()));
                }
                let port = host_parts[1]
                    .parse::<u16>()
                    .map_err(|_| DomainError::ParseSipServerAddress(value.to_string()))?;
                Ok(Self::new(host.to_string(), port))
            }
            1 => Ok(Self::new(host_parts[0].to_string(), default_port)),
            // A bare ip v6 address without port
            _ => match value.parse::<std::net::Ipv6Addr>() {
                Ok(ip_v6) => Ok(Self::new(ip_v6.to_string(), default_port)),
                Err(_) => Err(DomainError::ParseSipServerAddress(value.to_string())),
            },
        }
    }
}
