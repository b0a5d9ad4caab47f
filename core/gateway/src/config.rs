use crate::command::CommandArgs;
use accessory::Accessors;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use sipws_domain::sip::DEFAULT_SIP_PORT;
use std::path::PathBuf;
use std::time::Duration;
/// How a relay session learns which sip server to dial.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ResolveMode {
    /// Infer the sip server from the first sip message of the client.
    #[default]
    Sniff,
    /// Wait for a `connect` directive naming the sip server.
    Explicit,
}
#[derive(Debug, Clone, Serialize, Deserialize, Accessors)]
#[serde(default)]
pub struct Config {
    #[access(get)]
    port: u16,
    #[access(get)]
    worker_threads: usize,
    #[access(get(ty(&str)))]
    default_sip_host: String,
    #[access(get)]
    default_sip_port: u16,
    /// Milliseconds
    #[access(get)]
    dial_timeout: u64,
    /// Milliseconds to wait before closing the websocket after a failure notice
    #[access(get)]
    close_grace_delay: u64,
    #[access(get)]
    dst_buffer_size: usize,
    #[access(get)]
    dst_tcp_nodelay: bool,
    #[access(get)]
    resolve_mode: ResolveMode,
    #[access(get(ty(&str)))]
    health_path: String,
    #[access(get)]
    server_socket_backlog: u16,
    #[access(get(ty(&str)))]
    max_log_level: String,
    #[access(get)]
    log_folder: Option<PathBuf>,
}
impl Config {
    pub fn dial_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.dial_timeout)
    }
    pub fn close_grace_delay_duration(&self) -> Duration {
        Duration::from_millis(self.close_grace_delay)
    }
    /// Command line arguments and environment variables win over the file.
    pub fn apply_command_args(&mut self, command: &CommandArgs) {
        if let Some(port) = command.port {
            self.port = port;
        }
        if let Some(default_sip_host) = &command.default_sip_host {
            self.default_sip_host = default_sip_host.clone();
        }
        if let Some(default_sip_port) = command.default_sip_port {
            self.default_sip_port = default_sip_port;
        }
        if let Some(dial_timeout) = command.dial_timeout {
            self.dial_timeout = dial_timeout;
        }
        if let Some(dst_buffer_size) = command.dst_buffer_size {
            self.dst_buffer_size = dst_buffer_size;
        }
        if let Some(resolve_mode) = command.resolve_mode {
            self.resolve_mode = resolve_mode;
        }
        if let Some(max_log_level) = &command.max_log_level {
            self.max_log_level = max_log_level.clone();
        }
        if let Some(log_folder) = &command.log_folder {
            self.log_folder = Some(log_folder.clone());
        }
    }
}
impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            worker_threads: 64,
            default_sip_host: "sip1.alienvoip.com".to_string(),
            default_sip_port: DEFAULT_SIP_PORT,
            dial_timeout: 10000,
            close_grace_delay: 100,
            dst_buffer_size: 8 * 1024,
            dst_tcp_nodelay: true,
            resolve_mode: ResolveMode::Sniff,
            health_path: "/health".to_string(),
            server_socket_backlog: 1024,
            max_log_level: "INFO".to_string(),
            log_folder: None,
        }
    }
}
