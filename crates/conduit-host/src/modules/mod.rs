//! Built-in modules shipped with the host.

pub mod echo;

pub use echo::EchoModule;
