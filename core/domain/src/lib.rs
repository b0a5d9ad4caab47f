pub mod destination;
pub mod error;
pub mod frame;
pub mod notice;
pub mod sip;
pub use destination::Destination;
pub use frame::{ClientDirective, ClientFrame};
pub use notice::ServerNotice;
