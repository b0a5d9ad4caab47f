mod resolver;
mod tcp;
mod text_codec;
pub use resolver::DestinationResolver;
pub use tcp::{new_tcp_destination, DestinationFramed, DestinationRead, DestinationWriter};
#[cfg(test)]
pub(crate) use tcp::connect_with_timeout;
pub use text_codec::DestinationTextCodec;
