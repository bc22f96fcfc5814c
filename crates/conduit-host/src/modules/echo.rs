use std::time::Duration;

use async_trait::async_trait;
use conduit_core::module::{require_field, require_str};
use conduit_core::{ensure_supported_action, BridgeError, BridgeModule, DynamicValue, ModuleContext};
use tracing::instrument;

use crate::event_bridge::EventEmitter;

/// Upper bound accepted by the `delay` action.
pub const MAX_DELAY_MS: i64 = 10_000;

const ACTIONS: &[&str] = &["echo", "delay", "info", "error", "emit"];

/// Diagnostic module for exercising the bridge end to end.
///
/// - `echo`: returns the payload unchanged.
/// - `delay`: sleeps `ms` milliseconds, then returns `value` (or null).
/// - `info`: describes the module.
/// - `error`: fails with `message`, or `"Echo error"`.
/// - `emit`: publishes an event `{type, data?}` through the context's
///   [`EventEmitter`] and reports how many bridges received it.
#[derive(Debug, Default)]
pub struct EchoModule;

impl EchoModule {
    pub fn new() -> Self {
        Self
    }

    #[instrument(skip(self, payload))]
    async fn delay(&self, payload: Option<&DynamicValue>) -> Result<Option<DynamicValue>, BridgeError> {
        let ms = require_field(payload, "ms")?
            .as_int()
            .ok_or_else(|| BridgeError::invalid_payload("field 'ms' must be an integer"))?;
        if !(0..=MAX_DELAY_MS).contains(&ms) {
            return Err(BridgeError::invalid_payload(format!(
                "field 'ms' must be between 0 and {MAX_DELAY_MS}"
            )));
        }
        tokio::time::sleep(Duration::from_millis(ms as u64)).await;
        Ok(Some(
            payload
                .and_then(|p| p.get("value"))
                .cloned()
                .unwrap_or_default(),
        ))
    }

    fn emit(&self, payload: Option<&DynamicValue>, ctx: &ModuleContext) -> Result<Option<DynamicValue>, BridgeError> {
        let event_type = require_str(payload, "type")?;
        let data = payload.and_then(|p| p.get("data")).cloned();
        let emitter = ctx
            .extension::<EventEmitter>()
            .ok_or_else(|| BridgeError::module("No event emitter attached"))?;
        let delivered = emitter.emit(event_type, data);
        Ok(Some(DynamicValue::from_iter([("delivered", delivered as i64)])))
    }

    fn info(&self) -> DynamicValue {
        DynamicValue::from_iter([
            ("module", DynamicValue::from(self.name())),
            ("version", DynamicValue::from(env!("CARGO_PKG_VERSION"))),
            (
                "actions",
                DynamicValue::from(ACTIONS.iter().map(|a| DynamicValue::from(*a)).collect::<Vec<_>>()),
            ),
        ])
    }
}

#[async_trait]
impl BridgeModule for EchoModule {
    fn name(&self) -> &str {
        "echo"
    }

    fn supported_actions(&self) -> &[&str] {
        ACTIONS
    }

    async fn handle(
        &self,
        action: &str,
        payload: Option<DynamicValue>,
        ctx: &ModuleContext,
    ) -> Result<Option<DynamicValue>, BridgeError> {
        ensure_supported_action(self, action)?;
        match action {
            "echo" => Ok(payload),
            "delay" => self.delay(payload.as_ref()).await,
            "info" => Ok(Some(self.info())),
            "error" => {
                let message = payload
                    .as_ref()
                    .and_then(|p| p.get("message"))
                    .and_then(DynamicValue::as_str)
                    .unwrap_or("Echo error");
                Err(BridgeError::module(message))
            }
            "emit" => self.emit(payload.as_ref(), ctx),
            other => Err(BridgeError::UnknownAction(other.to_owned())),
        }
    }
}
