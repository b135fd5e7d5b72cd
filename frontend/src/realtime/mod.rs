pub mod backoff;
pub mod manager;
pub mod stomp;
pub mod transport;

pub use manager::{ConnectFuture, ConnectionListener, ConnectionManager, ConnectionOptions, ConnectionStatus};
