use std::sync::Arc;

use conduit_core::{DynamicValue, Event, ScriptCallFormatter};
use tokio::sync::broadcast;

use crate::host::ScriptSink;

/// Default broadcast capacity for [`EventEmitter::new`].
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Fan-out handle native code uses to publish events.
///
/// Modules reach it through `ModuleContext::extension::<EventEmitter>()`.
#[derive(Clone, Debug)]
pub struct EventEmitter {
    tx: broadcast::Sender<Event>,
}

impl EventEmitter {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Publish an event. Returns how many bridges received it; zero when
    /// nothing is listening.
    pub fn emit(&self, event_type: impl Into<String>, data: Option<DynamicValue>) -> usize {
        let event = Event::new(event_type, data);
        match self.tx.send(event) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(event)) => {
                tracing::debug!(event_type = %event.event_type, "no event bridge listening, dropping event");
                0
            }
        }
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

/// Forwards published events into a script sink as event calls.
pub struct EventBridge {
    sink: Arc<dyn ScriptSink>,
    formatter: ScriptCallFormatter,
}

impl EventBridge {
    pub fn new(sink: Arc<dyn ScriptSink>, formatter: ScriptCallFormatter) -> Self {
        Self { sink, formatter }
    }

    /// Spawn the forwarding loop. It ends when every emitter is dropped.
    pub fn start(self, mut rx: broadcast::Receiver<Event>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => self.sink.evaluate(self.formatter.format_event(&event)),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "event bridge lagged, dropped events");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("event bridge channel closed");
                        break;
                    }
                }
            }
        })
    }
}

/// Wire an event bridge to an emitter and start it.
pub fn create_bridge(
    emitter: &EventEmitter,
    sink: Arc<dyn ScriptSink>,
    formatter: ScriptCallFormatter,
) -> tokio::task::JoinHandle<()> {
    EventBridge::new(sink, formatter).start(emitter.subscribe())
}
