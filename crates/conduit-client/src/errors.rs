use std::time::Duration;

use conduit_core::BridgeError;

/// Why a bridge call did not produce a result.
///
/// Every variant names the module and action; all but `TransportUnavailable`
/// carry the request id, since no id is generated when the transport is
/// missing.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum ClientError {
    #[error("Bridge transport unavailable for {module}.{action}")]
    TransportUnavailable { module: String, action: String },

    #[error("Request {id} to {module}.{action} timed out after {elapsed:?}")]
    Timeout {
        elapsed: Duration,
        module: String,
        action: String,
        id: String,
    },

    /// Failure reported by the native side; `message` is its text verbatim.
    #[error("{message}")]
    Server {
        message: String,
        module: String,
        action: String,
        id: String,
    },

    #[error("Failed to send {module}.{action}: {message}")]
    Transport {
        message: String,
        module: String,
        action: String,
        id: String,
    },
}

impl ClientError {
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::TransportUnavailable { .. } => None,
            Self::Timeout { id, .. } | Self::Server { id, .. } | Self::Transport { id, .. } => {
                Some(id)
            }
        }
    }

    pub fn module(&self) -> &str {
        match self {
            Self::TransportUnavailable { module, .. }
            | Self::Timeout { module, .. }
            | Self::Server { module, .. }
            | Self::Transport { module, .. } => module,
        }
    }

    pub fn action(&self) -> &str {
        match self {
            Self::TransportUnavailable { action, .. }
            | Self::Timeout { action, .. }
            | Self::Server { action, .. }
            | Self::Transport { action, .. } => action,
        }
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::TransportUnavailable { .. } => "transport_unavailable",
            Self::Timeout { .. } => "timeout",
            Self::Server { .. } => "server_error",
            Self::Transport { .. } => "transport_error",
        }
    }
}

/// Fold a client-side failure into the bridge-wide taxonomy. Request context
/// is dropped; server and send failures keep their text.
impl From<&ClientError> for BridgeError {
    fn from(err: &ClientError) -> Self {
        match err {
            ClientError::TransportUnavailable { .. } => Self::TransportUnavailable,
            ClientError::Timeout { elapsed, .. } => Self::Timeout(*elapsed),
            ClientError::Server { message, .. } => Self::Module(message.clone()),
            ClientError::Transport { .. } => Self::Module(err.to_string()),
        }
    }
}

impl From<ClientError> for BridgeError {
    fn from(err: ClientError) -> Self {
        Self::from(&err)
    }
}
