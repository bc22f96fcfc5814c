use std::fmt;
use std::time::Duration;

use crate::value::DecodeError;

/// Errors raised while routing or handling a bridge request.
///
/// The `Display` text is what the content layer sees in a failure response.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum BridgeError {
    #[error("Unknown module: {0}")]
    UnknownModule(String),
    #[error("Unknown action: {0}")]
    UnknownAction(String),
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
    /// Application error reported by a module handler.
    #[error("{0}")]
    Module(String),
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
    #[error("Transport unavailable")]
    TransportUnavailable,
    #[error("Encoding failure: {0}")]
    EncodingFailure(String),
}

impl BridgeError {
    /// Wrap any displayable error raised inside a module.
    pub fn module(err: impl fmt::Display) -> Self {
        Self::Module(err.to_string())
    }

    pub fn invalid_payload(reason: impl Into<String>) -> Self {
        Self::InvalidPayload(reason.into())
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::UnknownModule(_) => "unknown_module",
            Self::UnknownAction(_) => "unknown_action",
            Self::InvalidPayload(_) => "invalid_payload",
            Self::Module(_) => "module_error",
            Self::Timeout(_) => "timeout",
            Self::TransportUnavailable => "transport_unavailable",
            Self::EncodingFailure(_) => "encoding_failure",
        }
    }
}

impl From<DecodeError> for BridgeError {
    fn from(err: DecodeError) -> Self {
        Self::InvalidPayload(err.to_string())
    }
}
