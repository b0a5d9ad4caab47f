use crate::bo::event::GatewayServerEvent;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::Sender;
use tracing::{error, warn};
pub mod bo;
pub mod command;
pub mod config;
mod destination;
pub mod error;
mod handler;
pub mod server;
pub use destination::DestinationResolver;
/// Publish the server event to console, never blocks a session.
pub fn publish_server_event(server_event_tx: &Sender<GatewayServerEvent>, event: GatewayServerEvent) {
    match server_event_tx.try_send(event) {
        Ok(()) => {}
        Err(TrySendError::Full(event)) => {
            warn!("Server event channel full, drop event: {event:?}");
        }
        Err(TrySendError::Closed(event)) => {
            error!("Failed to publish server event, channel closed: {event:?}");
        }
    }
}
