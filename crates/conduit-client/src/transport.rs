use tokio::sync::mpsc;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,
    #[error("transport queue full")]
    Full,
    #[error("{0}")]
    Other(String),
}

/// Outbound half of the bridge as seen from the content layer.
pub trait Transport: Send + Sync {
    /// Whether the native side can currently receive messages.
    fn is_available(&self) -> bool;

    /// Hand one encoded message to the native side.
    fn post_message(&self, message: String) -> Result<(), TransportError>;
}

/// Transport backed by a bounded tokio channel, paired with the receiver a
/// `BridgeHost` consumes.
#[derive(Clone, Debug)]
pub struct ChannelTransport {
    tx: mpsc::Sender<String>,
}

impl ChannelTransport {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl Transport for ChannelTransport {
    fn is_available(&self) -> bool {
        !self.tx.is_closed()
    }

    fn post_message(&self, message: String) -> Result<(), TransportError> {
        self.tx.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TransportError::Full,
            mpsc::error::TrySendError::Closed(_) => TransportError::Closed,
        })
    }
}
