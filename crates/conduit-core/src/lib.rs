pub mod config;
pub mod errors;
pub mod ids;
pub mod module;
pub mod protocol;
pub mod script;
pub mod value;

pub use config::{BridgeConfig, ConfigError, FeatureFlags};
pub use errors::BridgeError;
pub use module::{ensure_supported_action, BridgeModule, ModuleContext, PresenterHandle};
pub use protocol::{Event, Message, Response};
pub use script::{ScriptCall, ScriptCallFormatter};
pub use value::{DecodeError, DynamicValue, EncodeError, Object};
