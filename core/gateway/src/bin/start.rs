use anyhow::Result;
use clap::Parser;
use gateway::command::CommandArgs;
use gateway::config::Config;
use gateway::server::GatewayServer;
use sipws_common::init_logger;
use std::fs::read_to_string;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Builder;
use tracing::{error, info};
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;
const DEFAULT_CONFIG_FILE: &str = "config.toml";
const LOG_FILE_NAME_PREFIX: &str = "sip-ws-gateway.log";
fn load_config(command: &CommandArgs) -> Result<Config> {
    let config_file_path = command
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    // The gateway must run unconfigured, only an explicit file is mandatory
    let mut config = match read_to_string(&config_file_path) {
        Ok(config_file_content) => toml::from_str::<Config>(&config_file_content)?,
        Err(e) if command.config.is_none() && e.kind() == std::io::ErrorKind::NotFound => {
            Config::default()
        }
        Err(e) => return Err(e.into()),
    };
    config.apply_command_args(command);
    Ok(config)
}
pub fn main() -> Result<()> {
    let command = CommandArgs::parse();
    let config = Arc::new(load_config(&command)?);
    let _trace_append_guard = init_logger(
        config.log_folder().as_deref(),
        LOG_FILE_NAME_PREFIX,
        config.max_log_level(),
    )?;
    let runtime = Builder::new_multi_thread()
        .worker_threads(*config.worker_threads())
        .enable_all()
        .build()?;
    runtime.block_on(async {
        let (server, server_event_rx) = match GatewayServer::new(config) {
            Ok(server) => server,
            Err(e) => {
                error!("Failed to build server object: {}", e);
                return;
            }
        };
        let (_, mut server_event_rx) = match server.start(server_event_rx).await {
            Ok(started) => started,
            Err(e) => {
                error!("Failed to start server: {}", e);
                return;
            }
        };
        while let Some(server_event) = server_event_rx.recv().await {
            info!("Server event received: {:?}", server_event);
        }
    });
    Ok(())
}
