//! Script-call text delivered into the content layer.
//!
//! A response becomes `NS._handleResponse("<json>");` and an event becomes
//! `NS._handleEvent("<json>");`, where `<json>` is the compact encoding of
//! the record escaped into a double-quoted literal. The argument is itself a
//! valid JSON string token, so the shim can hand it to a strict JSON parser.

use serde::Serialize;

use crate::config::{is_valid_namespace, ConfigError, DEFAULT_NAMESPACE};
use crate::protocol::{Event, Response};

/// Shim function receiving responses.
pub const RESPONSE_HANDLER: &str = "_handleResponse";
/// Shim function receiving events.
pub const EVENT_HANDLER: &str = "_handleEvent";

/// A delivery call decoded back into its record.
#[derive(Clone, Debug, PartialEq)]
pub enum ScriptCall {
    Response(Response),
    Event(Event),
}

/// Renders responses and events as script-call text.
#[derive(Clone, Debug)]
pub struct ScriptCallFormatter {
    namespace: String,
}

impl Default for ScriptCallFormatter {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_owned(),
        }
    }
}

impl ScriptCallFormatter {
    /// The namespace is spliced into script text verbatim, so anything other
    /// than dotted identifiers is rejected.
    pub fn new(namespace: impl Into<String>) -> Result<Self, ConfigError> {
        let namespace = namespace.into();
        if !is_valid_namespace(&namespace) {
            return Err(ConfigError::InvalidNamespace(namespace));
        }
        Ok(Self { namespace })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn format_response(&self, response: &Response) -> String {
        self.format_call(RESPONSE_HANDLER, &encode_or_empty(response))
    }

    pub fn format_event(&self, event: &Event) -> String {
        self.format_call(EVENT_HANDLER, &encode_or_empty(event))
    }

    fn format_call(&self, handler: &str, json: &str) -> String {
        format!("{}.{handler}(\"{}\");", self.namespace, escape(json))
    }

    /// Decode call text produced by this formatter.
    ///
    /// Returns `None` for foreign namespaces, unknown handlers, or payloads
    /// that do not decode to the handler's record type.
    pub fn parse_call(&self, text: &str) -> Option<ScriptCall> {
        let rest = text.trim().strip_prefix(self.namespace.as_str())?.strip_prefix('.')?;
        let (handler, rest) = rest.split_once('(')?;
        let literal = rest.strip_suffix(");")?;
        let json: String = serde_json::from_str(literal).ok()?;
        match handler {
            RESPONSE_HANDLER => Response::decode(&json).ok().map(ScriptCall::Response),
            EVENT_HANDLER => Event::decode(&json).ok().map(ScriptCall::Event),
            _ => None,
        }
    }
}

/// Encode a record compactly, delivering `{}` if encoding fails.
fn encode_or_empty<T: Serialize>(record: &T) -> String {
    match serde_json::to_string(record) {
        Ok(json) => json,
        Err(e) => {
            tracing::warn!(error = %e, "failed to encode bridge record, delivering empty object");
            "{}".to_owned()
        }
    }
}

/// Escape text for embedding in a double-quoted script literal.
///
/// Only quote, backslash, newline, carriage return, tab, U+2028 and U+2029
/// are rewritten. Everything else, including non-ASCII, passes through.
pub fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 16);
    for ch in input.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            other => out.push(other),
        }
    }
    out
}
