use crate::config::ResolveMode;
use clap::Parser;
use std::path::PathBuf;
#[derive(Parser, Debug, Default)]
#[command(version, about, long_about = None)]
pub struct CommandArgs {
    /// The configuration file path of the gateway
    #[arg(short, long, env = "SIPWS_CONFIG")]
    pub config: Option<PathBuf>,
    /// The websocket listening port
    #[arg(short, long, env = "PORT")]
    pub port: Option<u16>,
    /// The sip server used when the first message names none
    #[arg(long, env = "SIP_DEFAULT_HOST")]
    pub default_sip_host: Option<String>,
    #[arg(long, env = "SIP_DEFAULT_PORT")]
    pub default_sip_port: Option<u16>,
    /// The sip server dial timeout in milliseconds
    #[arg(long, env = "SIP_DIAL_TIMEOUT_MS")]
    pub dial_timeout: Option<u64>,
    #[arg(long, env = "SIP_BUFFER_SIZE")]
    pub dst_buffer_size: Option<usize>,
    #[arg(long, value_enum, env = "SIP_RESOLVE_MODE")]
    pub resolve_mode: Option<ResolveMode>,
    #[arg(long, env = "LOG_LEVEL")]
    pub max_log_level: Option<String>,
    /// Log into daily rolling files under this folder instead of stdout
    #[arg(long, env = "LOG_FOLDER")]
    pub log_folder: Option<PathBuf>,
}
