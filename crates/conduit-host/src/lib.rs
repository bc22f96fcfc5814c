pub mod dispatcher;
pub mod event_bridge;
pub mod host;
pub mod modules;
pub mod registry;

pub use dispatcher::{encode_response, Dispatcher};
pub use event_bridge::{create_bridge, EventBridge, EventEmitter};
pub use host::{spawn_host, BridgeHost, ChannelSink, ScriptSink};
pub use modules::EchoModule;
pub use registry::ModuleRegistry;
