//! The capability interface native modules implement.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::FeatureFlags;
use crate::errors::BridgeError;
use crate::value::DynamicValue;

/// A named native capability reachable from the content layer.
///
/// `name` and `supported_actions` must not change for the lifetime of the
/// value; the registry keys on the name at registration time.
#[async_trait]
pub trait BridgeModule: Send + Sync {
    fn name(&self) -> &str;

    /// Actions this module accepts, in declaration order.
    fn supported_actions(&self) -> &[&str];

    fn supports_action(&self, action: &str) -> bool {
        self.supported_actions().iter().any(|a| *a == action)
    }

    async fn handle(
        &self,
        action: &str,
        payload: Option<DynamicValue>,
        ctx: &ModuleContext,
    ) -> Result<Option<DynamicValue>, BridgeError>;
}

/// Fail with [`BridgeError::UnknownAction`] unless `module` declares `action`.
///
/// The dispatcher runs this before every handler call; modules may repeat it
/// at the top of `handle`.
pub fn ensure_supported_action(module: &dyn BridgeModule, action: &str) -> Result<(), BridgeError> {
    if module.supports_action(action) {
        Ok(())
    } else {
        Err(BridgeError::UnknownAction(action.to_owned()))
    }
}

/// Opaque handle to a presentation surface owned by the embedding app.
///
/// Modules that need to present UI resolve the handle through their own
/// collaborator; the bridge never holds the surface itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PresenterHandle(u64);

impl PresenterHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(self) -> u64 {
        self.0
    }
}

/// Ambient services passed through to every handler call untouched.
#[derive(Clone, Default)]
pub struct ModuleContext {
    flags: Arc<FeatureFlags>,
    presenter: Option<PresenterHandle>,
    extensions: Arc<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl ModuleContext {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_flags(mut self, flags: FeatureFlags) -> Self {
        self.flags = Arc::new(flags);
        self
    }

    #[must_use]
    pub fn with_presenter(mut self, presenter: PresenterHandle) -> Self {
        self.presenter = Some(presenter);
        self
    }

    /// Attach a service, replacing any previous value of the same type.
    #[must_use]
    pub fn with_extension<T: Any + Send + Sync>(mut self, value: T) -> Self {
        Arc::make_mut(&mut self.extensions).insert(TypeId::of::<T>(), Arc::new(value));
        self
    }

    pub fn flags(&self) -> &FeatureFlags {
        &self.flags
    }

    pub fn presenter(&self) -> Option<PresenterHandle> {
        self.presenter
    }

    pub fn extension<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.extensions
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|value| value.downcast::<T>().ok())
    }
}

impl fmt::Debug for ModuleContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleContext")
            .field("flags", &self.flags)
            .field("presenter", &self.presenter)
            .field("extensions", &self.extensions.len())
            .finish()
    }
}

/// Extract a required field from an object payload.
pub fn require_field<'a>(
    payload: Option<&'a DynamicValue>,
    key: &str,
) -> Result<&'a DynamicValue, BridgeError> {
    payload
        .and_then(|p| p.get(key))
        .ok_or_else(|| BridgeError::InvalidPayload(format!("missing required field '{key}'")))
}

/// Extract a required string field from an object payload.
pub fn require_str<'a>(payload: Option<&'a DynamicValue>, key: &str) -> Result<&'a str, BridgeError> {
    let value = require_field(payload, key)?;
    value.as_str().ok_or_else(|| {
        BridgeError::InvalidPayload(format!(
            "field '{key}' must be a string, got {}",
            value.type_name()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Clipboard;

    #[async_trait]
    impl BridgeModule for Clipboard {
        fn name(&self) -> &str {
            "clipboard"
        }

        fn supported_actions(&self) -> &[&str] {
            &["read", "write"]
        }

        async fn handle(
            &self,
            action: &str,
            payload: Option<DynamicValue>,
            _ctx: &ModuleContext,
        ) -> Result<Option<DynamicValue>, BridgeError> {
            ensure_supported_action(self, action)?;
            match action {
                "write" => {
                    let text = require_str(payload.as_ref(), "text")?;
                    Ok(Some(DynamicValue::from(text.len() as i64)))
                }
                _ => Ok(Some(DynamicValue::from("clip"))),
            }
        }
    }

    #[test]
    fn supports_declared_actions_only() {
        assert!(Clipboard.supports_action("read"));
        assert!(Clipboard.supports_action("write"));
        assert!(!Clipboard.supports_action("clear"));
    }

    #[test]
    fn ensure_supported_action_errors_on_unknown() {
        assert!(ensure_supported_action(&Clipboard, "read").is_ok());
        let err = ensure_supported_action(&Clipboard, "clear").unwrap_err();
        assert_eq!(err, BridgeError::UnknownAction("clear".into()));
    }

    #[tokio::test]
    async fn handler_can_guard_itself() {
        let ctx = ModuleContext::new();
        let err = Clipboard.handle("clear", None, &ctx).await.unwrap_err();
        assert_eq!(err.to_string(), "Unknown action: clear");
    }

    #[tokio::test]
    async fn handler_reads_payload() {
        let ctx = ModuleContext::new();
        let payload = DynamicValue::from_iter([("text", "hello")]);
        let out = Clipboard.handle("write", Some(payload), &ctx).await.unwrap();
        assert_eq!(out.and_then(|v| v.as_int()), Some(5));
    }

    #[test]
    fn require_field_reports_missing_key() {
        let payload = DynamicValue::from_iter([("other", 1)]);
        let err = require_field(Some(&payload), "text").unwrap_err();
        assert_eq!(err.error_kind(), "invalid_payload");
        assert!(require_field(None, "text").is_err());
    }

    #[test]
    fn require_str_reports_wrong_type() {
        let payload = DynamicValue::from_iter([("text", 42)]);
        let err = require_str(Some(&payload), "text").unwrap_err();
        assert!(err.to_string().contains("must be a string, got integer"));
    }

    #[test]
    fn context_carries_flags_and_presenter() {
        let ctx = ModuleContext::new()
            .with_flags(FeatureFlags::new().with_flag("haptics", false))
            .with_presenter(PresenterHandle::new(7));
        assert!(!ctx.flags().is_enabled("haptics"));
        assert_eq!(ctx.presenter().map(PresenterHandle::id), Some(7));
    }

    #[test]
    fn context_extensions_by_type() {
        #[derive(Debug, PartialEq)]
        struct AppVersion(&'static str);

        let ctx = ModuleContext::new().with_extension(AppVersion("1.2.3"));
        assert_eq!(*ctx.extension::<AppVersion>().unwrap(), AppVersion("1.2.3"));
        assert!(ctx.extension::<String>().is_none());
    }

    #[test]
    fn context_clone_does_not_leak_later_extensions() {
        let base = ModuleContext::new();
        let extended = base.clone().with_extension(5u32);
        assert!(base.extension::<u32>().is_none());
        assert_eq!(extended.extension::<u32>().as_deref(), Some(&5));
    }
}
