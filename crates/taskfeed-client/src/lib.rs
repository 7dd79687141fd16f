pub mod bridge;
pub mod handlers;
pub mod manager;
#[cfg(test)]
mod mock;
pub mod transport;

pub use bridge::store_handlers;
pub use handlers::{Completion, ProgressHandlers};
pub use manager::{ConnectionManager, ManagerConfig};
pub use transport::{Channel, ChannelEvent, Connector, TransportError, WsConnector, NORMAL_CLOSURE};
