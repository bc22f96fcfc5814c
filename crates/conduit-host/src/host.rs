use std::sync::Arc;

use conduit_core::{Event, ModuleContext, ScriptCallFormatter};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::dispatcher::Dispatcher;

/// Executes script-call text in the content layer.
///
/// Implementations must tolerate concurrent calls from any task.
pub trait ScriptSink: Send + Sync {
    fn evaluate(&self, script: String);
}

/// Sink that forwards each script call into an unbounded channel.
#[derive(Clone, Debug)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ScriptSink for ChannelSink {
    fn evaluate(&self, script: String) {
        if self.tx.send(script).is_err() {
            tracing::debug!("script sink closed, dropping call");
        }
    }
}

/// Native side of the bridge: turns inbound message text into delivered
/// response calls, and events into event calls.
pub struct BridgeHost {
    dispatcher: Dispatcher,
    formatter: ScriptCallFormatter,
    sink: Arc<dyn ScriptSink>,
    context: ModuleContext,
}

impl BridgeHost {
    pub fn new(dispatcher: Dispatcher, sink: Arc<dyn ScriptSink>) -> Self {
        Self {
            dispatcher,
            formatter: ScriptCallFormatter::default(),
            sink,
            context: ModuleContext::new(),
        }
    }

    #[must_use]
    pub fn with_formatter(mut self, formatter: ScriptCallFormatter) -> Self {
        self.formatter = formatter;
        self
    }

    #[must_use]
    pub fn with_context(mut self, context: ModuleContext) -> Self {
        self.context = context;
        self
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn formatter(&self) -> &ScriptCallFormatter {
        &self.formatter
    }

    pub fn sink(&self) -> Arc<dyn ScriptSink> {
        Arc::clone(&self.sink)
    }

    /// Dispatch one inbound message and deliver its response call.
    pub async fn handle_message(&self, raw: &str) {
        let response = self.dispatcher.decode_and_dispatch(raw, &self.context).await;
        self.sink.evaluate(self.formatter.format_response(&response));
    }

    /// Deliver an event call.
    pub fn emit(&self, event: &Event) {
        tracing::debug!(event_type = %event.event_type, "emitting event");
        self.sink.evaluate(self.formatter.format_event(event));
    }

    /// Process inbound messages until the channel closes.
    ///
    /// Each message is dispatched on its own task, so a slow handler never
    /// holds up the ones behind it. Returns once every in-flight dispatch has
    /// delivered its response.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<String>) {
        let mut in_flight = JoinSet::new();

        loop {
            tokio::select! {
                inbound = rx.recv() => match inbound {
                    Some(raw) => {
                        let host = Arc::clone(&self);
                        in_flight.spawn(async move { host.handle_message(&raw).await });
                    }
                    None => break,
                },
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "dispatch task failed");
                    }
                }
            }
        }

        tracing::info!(pending = in_flight.len(), "inbound channel closed, draining");
        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "dispatch task failed");
            }
        }
    }
}

/// Spawn [`BridgeHost::run`] on the current runtime.
pub fn spawn_host(host: Arc<BridgeHost>, rx: mpsc::Receiver<String>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(host.run(rx))
}
