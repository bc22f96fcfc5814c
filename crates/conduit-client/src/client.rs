use std::sync::Arc;
use std::time::Duration;

use conduit_core::config::DEFAULT_TIMEOUT_MS;
use conduit_core::ids::new_request_id;
use conduit_core::{
    BridgeConfig, ConfigError, DecodeError, DynamicValue, Event, Message, Response, ScriptCall,
    ScriptCallFormatter,
};
use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::errors::ClientError;
use crate::subscriptions::{Subscription, Subscriptions};
use crate::transport::Transport;

type CallResult = Result<Option<DynamicValue>, ClientError>;

#[derive(Clone, Debug)]
pub struct ClientOptions {
    /// Timeout for calls that do not set their own.
    pub default_timeout: Duration,
    /// Formatter matching the host's namespace, used by `receive_script`.
    pub formatter: ScriptCallFormatter,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            formatter: ScriptCallFormatter::default(),
        }
    }
}

impl ClientOptions {
    /// Fails when the configured namespace is not a dotted identifier path.
    pub fn from_config(config: &BridgeConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            default_timeout: config.default_timeout(),
            formatter: ScriptCallFormatter::new(config.namespace.clone())?,
        })
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct CallOptions {
    pub timeout: Option<Duration>,
}

impl CallOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

struct PendingCall {
    module: String,
    action: String,
    resolver: oneshot::Sender<CallResult>,
    timer: Option<JoinHandle<()>>,
}

struct Inner {
    transport: Arc<dyn Transport>,
    options: ClientOptions,
    pending: DashMap<String, PendingCall>,
    subscriptions: Arc<Subscriptions>,
}

impl Inner {
    /// Claim a pending call. Whoever gets `Some` owns its single outcome.
    fn take(&self, id: &str) -> Option<PendingCall> {
        let (_, mut call) = self.pending.remove(id)?;
        if let Some(timer) = call.timer.take() {
            timer.abort();
        }
        Some(call)
    }
}

/// Content-layer side of the bridge: issues calls, correlates responses and
/// fans out events.
///
/// Cloning is cheap; clones share the pending table and listeners.
#[derive(Clone)]
pub struct BridgeClient {
    inner: Arc<Inner>,
}

impl BridgeClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_options(transport, ClientOptions::default())
    }

    pub fn with_options(transport: Arc<dyn Transport>, options: ClientOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                options,
                pending: DashMap::new(),
                subscriptions: Arc::new(Subscriptions::default()),
            }),
        }
    }

    pub fn is_available(&self) -> bool {
        self.inner.transport.is_available()
    }

    pub async fn call(
        &self,
        module: &str,
        action: &str,
        payload: Option<DynamicValue>,
    ) -> CallResult {
        self.call_with(module, action, payload, CallOptions::default())
            .await
    }

    /// Send a request and wait for its response, a timeout, or a send failure.
    ///
    /// Exactly one outcome is produced per call. The timer runs on its own
    /// task, so dropping this future before it completes still clears the
    /// pending entry when the timeout elapses.
    pub async fn call_with(
        &self,
        module: &str,
        action: &str,
        payload: Option<DynamicValue>,
        options: CallOptions,
    ) -> CallResult {
        if !self.is_available() {
            tracing::warn!(module, action, "bridge transport unavailable");
            return Err(ClientError::TransportUnavailable {
                module: module.to_owned(),
                action: action.to_owned(),
            });
        }

        let id = new_request_id();
        let timeout = options.timeout.unwrap_or(self.inner.options.default_timeout);
        let (resolver, outcome) = oneshot::channel();

        self.inner.pending.insert(
            id.clone(),
            PendingCall {
                module: module.to_owned(),
                action: action.to_owned(),
                resolver,
                timer: None,
            },
        );
        let timer = self.arm_timer(id.clone(), timeout);
        match self.inner.pending.get_mut(&id) {
            Some(mut entry) => entry.timer = Some(timer),
            None => timer.abort(),
        }

        tracing::debug!(id = %id, module, action, timeout_ms = timeout.as_millis() as u64, "sending bridge call");
        let message = Message::with_id(id.clone(), module, action, payload);
        let sent = message
            .encode()
            .map_err(|e| e.to_string())
            .and_then(|text| self.inner.transport.post_message(text).map_err(|e| e.to_string()));
        if let Err(reason) = sent {
            if let Some(call) = self.inner.take(&id) {
                tracing::warn!(id = %id, module, action, error = %reason, "bridge call send failed");
                let _ = call.resolver.send(Err(ClientError::Transport {
                    message: reason,
                    module: call.module,
                    action: call.action,
                    id: id.clone(),
                }));
            }
        }

        outcome.await.unwrap_or_else(|_| {
            Err(ClientError::Transport {
                message: "call abandoned before completion".into(),
                module: module.to_owned(),
                action: action.to_owned(),
                id,
            })
        })
    }

    fn arm_timer(&self, id: String, timeout: Duration) -> JoinHandle<()> {
        let inner = Arc::downgrade(&self.inner);
        let started = Instant::now();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let Some(inner) = inner.upgrade() else {
                return;
            };
            let Some((_, call)) = inner.pending.remove(&id) else {
                return;
            };
            let elapsed = started.elapsed();
            tracing::warn!(
                id = %id,
                module = %call.module,
                action = %call.action,
                elapsed_ms = elapsed.as_millis() as u64,
                "bridge call timed out"
            );
            let _ = call.resolver.send(Err(ClientError::Timeout {
                elapsed,
                module: call.module,
                action: call.action,
                id,
            }));
        })
    }

    /// Settle the call matching `response.id`. Returns `false` when no call
    /// is pending under that id (timed out already, or never issued).
    pub fn handle_response(&self, response: Response) -> bool {
        let Some(call) = self.inner.take(&response.id) else {
            tracing::debug!(id = %response.id, "ignoring response with no pending call");
            return false;
        };

        let id = response.id.clone();
        let outcome = response.into_result().map_err(|message| ClientError::Server {
            message,
            module: call.module,
            action: call.action,
            id,
        });
        if call.resolver.send(outcome).is_err() {
            tracing::debug!("caller dropped before response arrived");
        }
        true
    }

    /// Deliver an event to its listeners. Returns how many ran.
    pub fn handle_event(&self, event: &Event) -> usize {
        let delivered = self.inner.subscriptions.deliver(event);
        tracing::trace!(event_type = %event.event_type, delivered, "delivered event");
        delivered
    }

    pub fn receive_response_json(&self, json: &str) -> Result<bool, DecodeError> {
        Ok(self.handle_response(Response::decode(json)?))
    }

    pub fn receive_event_json(&self, json: &str) -> Result<usize, DecodeError> {
        Ok(self.handle_event(&Event::decode(json)?))
    }

    /// Accept a delivery call produced by the host's formatter. Returns
    /// `false` for text that is not a recognised call.
    pub fn receive_script(&self, script: &str) -> bool {
        match self.inner.options.formatter.parse_call(script) {
            Some(ScriptCall::Response(response)) => {
                self.handle_response(response);
                true
            }
            Some(ScriptCall::Event(event)) => {
                self.handle_event(&event);
                true
            }
            None => {
                tracing::warn!(len = script.len(), "unrecognised script call");
                false
            }
        }
    }

    /// Listen for every event of `event_type`.
    pub fn on<F>(&self, event_type: impl Into<String>, listener: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.inner
            .subscriptions
            .add(event_type.into(), Arc::new(listener), false)
    }

    /// Listen for the next event of `event_type` only.
    pub fn once<F>(&self, event_type: impl Into<String>, listener: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.inner
            .subscriptions
            .add(event_type.into(), Arc::new(listener), true)
    }

    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    pub fn listener_count(&self, event_type: &str) -> usize {
        self.inner.subscriptions.count(event_type)
    }
}
