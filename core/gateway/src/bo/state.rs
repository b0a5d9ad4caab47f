use crate::bo::event::GatewayServerEvent;
use crate::config::Config;
use crate::destination::DestinationResolver;
use crate::error::GatewayError;
use accessory::Accessors;
use derive_builder::Builder;
use std::sync::Arc;
use tokio::sync::mpsc::Sender;
#[derive(Clone, Accessors, Builder)]
pub struct ServerState {
    #[access(get)]
    config: Arc<Config>,
    #[access(get)]
    destination_resolver: Arc<DestinationResolver>,
    #[access(get)]
    server_event_tx: Arc<Sender<GatewayServerEvent>>,
}
impl ServerState {
    pub fn from_config(
        config: Arc<Config>,
        server_event_tx: Sender<GatewayServerEvent>,
    ) -> Result<Self, GatewayError> {
        let destination_resolver = DestinationResolver::new(
            config.default_sip_host(),
            *config.default_sip_port(),
        )?;
        let mut server_state_builder = ServerStateBuilder::default();
        server_state_builder
            .config(config)
            .destination_resolver(Arc::new(destination_resolver))
            .server_event_tx(Arc::new(server_event_tx));
        Ok(server_state_builder.build()?)
    }
}
