use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use conduit_core::{
    ensure_supported_action, BridgeError, DynamicValue, Message, ModuleContext, Response,
};
use futures::FutureExt;
use tracing::Instrument;

use crate::registry::ModuleRegistry;

/// Routes inbound messages to registered modules and shapes the reply.
///
/// Every message yields exactly one response carrying the message id. Handler
/// errors and panics become failure responses; nothing escapes as a panic.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ModuleRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ModuleRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    /// Route a decoded message. Always returns a response with `message.id`.
    pub async fn dispatch(&self, message: Message, ctx: &ModuleContext) -> Response {
        let span = tracing::debug_span!(
            "dispatch",
            id = %message.id,
            module = %message.module,
            action = %message.action
        );
        self.dispatch_inner(message, ctx).instrument(span).await
    }

    async fn dispatch_inner(&self, message: Message, ctx: &ModuleContext) -> Response {
        let started = Instant::now();
        let Message {
            id,
            module,
            action,
            payload,
        } = message;

        let result = self.route(&module, &action, payload, ctx).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(data) => {
                tracing::debug!(elapsed_ms, "dispatch succeeded");
                Response::success(id, data)
            }
            Err(e) => {
                tracing::warn!(error = %e, kind = e.error_kind(), elapsed_ms, "dispatch failed");
                Response::from_error(id, &e)
            }
        }
    }

    async fn route(
        &self,
        module_name: &str,
        action: &str,
        payload: Option<DynamicValue>,
        ctx: &ModuleContext,
    ) -> Result<Option<DynamicValue>, BridgeError> {
        let module = self
            .registry
            .module(module_name)
            .ok_or_else(|| BridgeError::UnknownModule(module_name.to_owned()))?;
        ensure_supported_action(module.as_ref(), action)?;

        let outcome = AssertUnwindSafe(module.handle(action, payload, ctx))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                Err(BridgeError::Module(format!(
                    "Module '{module_name}' panicked while handling '{action}'"
                )))
            })?;

        match outcome {
            Some(data) if !data.is_encodable() => Err(BridgeError::EncodingFailure(
                "result contains a non-finite number".into(),
            )),
            other => Ok(other),
        }
    }

    /// Decode raw message text and dispatch it.
    ///
    /// Undecodable input yields an `InvalidPayload` failure whose id is the
    /// text's top-level string `"id"` when one can be recovered, else `""`.
    pub async fn decode_and_dispatch(&self, raw: &str, ctx: &ModuleContext) -> Response {
        match Message::decode(raw) {
            Ok(message) => self.dispatch(message, ctx).await,
            Err(e) => {
                let id = recover_id(raw);
                tracing::warn!(id = %id, error = %e, "rejected undecodable message");
                Response::from_error(id, &BridgeError::from(e))
            }
        }
    }

    /// Decode, dispatch and encode. The result is always response JSON.
    pub async fn dispatch_raw(&self, raw: &str, ctx: &ModuleContext) -> String {
        encode_response(&self.decode_and_dispatch(raw, ctx).await)
    }
}

/// Encode a response; an unencodable one is replaced by a failure with the
/// same id.
pub fn encode_response(response: &Response) -> String {
    match response.encode() {
        Ok(json) => json,
        Err(e) => {
            tracing::warn!(id = %response.id, error = %e, "response could not be encoded");
            let fallback =
                Response::from_error(response.id.clone(), &BridgeError::EncodingFailure(e.to_string()));
            fallback.encode().unwrap_or_else(|_| {
                r#"{"id":"","success":false,"error":"Encoding failure"}"#.to_owned()
            })
        }
    }
}

fn recover_id(raw: &str) -> String {
    DynamicValue::decode(raw)
        .ok()
        .and_then(|value| value.get("id").and_then(DynamicValue::as_str).map(str::to_owned))
        .unwrap_or_default()
}
