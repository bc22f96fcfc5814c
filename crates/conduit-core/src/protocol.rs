//! Wire records exchanged between the content layer and the native host.
//!
//! ```text
//! Request:  { "id", "module", "action", "payload"? }
//! Response: { "id", "success", "data"?, "error"? }
//! Event:    { "type", "data"? }
//! ```
//!
//! Absent optional fields are omitted from the encoded form. A literal
//! `null` for `payload` or `data` decodes as absent. A response must carry
//! `error` exactly when `success` is false, and never `data` alongside it.

use serde::{Deserialize, Serialize};

use crate::errors::BridgeError;
use crate::ids;
use crate::value::{DecodeError, DynamicValue, EncodeError};

/// Inbound request targeting one module action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Correlation id echoed back in the [`Response`].
    pub id: String,
    /// Registered module name.
    pub module: String,
    /// Action within the module.
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<DynamicValue>,
}

/// Correlated reply to a [`Message`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireResponse")]
pub struct Response {
    pub id: String,
    pub success: bool,
    /// Result payload. Only ever present when `success == true`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<DynamicValue>,
    /// Human-readable failure. Present exactly when `success == false`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Deserialize)]
struct WireResponse {
    id: String,
    success: bool,
    #[serde(default)]
    data: Option<DynamicValue>,
    #[serde(default)]
    error: Option<String>,
}

impl TryFrom<WireResponse> for Response {
    type Error = String;

    fn try_from(wire: WireResponse) -> Result<Self, Self::Error> {
        let fault = match (wire.success, wire.data.is_some(), wire.error.is_some()) {
            (true, _, true) => Some("success with an error"),
            (false, true, _) => Some("failure with data"),
            (false, _, false) => Some("failure without an error"),
            _ => None,
        };
        if let Some(fault) = fault {
            return Err(format!("response {:?} reports {fault}", wire.id));
        }
        Ok(Self {
            id: wire.id,
            success: wire.success,
            data: wire.data,
            error: wire.error,
        })
    }
}

/// Unsolicited notification pushed to the content layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<DynamicValue>,
}

impl Message {
    /// Build a message with a freshly generated request id.
    pub fn new(
        module: impl Into<String>,
        action: impl Into<String>,
        payload: Option<DynamicValue>,
    ) -> Self {
        Self::with_id(ids::new_request_id(), module, action, payload)
    }

    pub fn with_id(
        id: impl Into<String>,
        module: impl Into<String>,
        action: impl Into<String>,
        payload: Option<DynamicValue>,
    ) -> Self {
        Self {
            id: id.into(),
            module: module.into(),
            action: action.into(),
            payload,
        }
    }

    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn encode(&self) -> Result<String, EncodeError> {
        Ok(serde_json::to_string(self)?)
    }
}

impl Response {
    /// Build a success response. `data` may be absent.
    pub fn success(id: impl Into<String>, data: Option<DynamicValue>) -> Self {
        Self {
            id: id.into(),
            success: true,
            data,
            error: None,
        }
    }

    /// Build a failure response.
    pub fn failure(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }

    /// Build a failure response from a bridge error.
    pub fn from_error(id: impl Into<String>, error: &BridgeError) -> Self {
        Self::failure(id, error.to_string())
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Split into the success payload or the reported error message.
    ///
    /// A failure without an error string yields a generic message.
    pub fn into_result(self) -> Result<Option<DynamicValue>, String> {
        if self.success {
            Ok(self.data)
        } else {
            Err(self
                .error
                .unwrap_or_else(|| "Request failed without an error message".to_owned()))
        }
    }

    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn encode(&self) -> Result<String, EncodeError> {
        Ok(serde_json::to_string(self)?)
    }
}

impl Event {
    pub fn new(event_type: impl Into<String>, data: Option<DynamicValue>) -> Self {
        Self {
            event_type: event_type.into(),
            data,
        }
    }

    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn encode(&self) -> Result<String, EncodeError> {
        Ok(serde_json::to_string(self)?)
    }
}
