pub mod client;
pub mod errors;
pub mod subscriptions;
pub mod transport;

pub use client::{BridgeClient, CallOptions, ClientOptions};
pub use errors::ClientError;
pub use subscriptions::Subscription;
pub use transport::{ChannelTransport, Transport, TransportError};
