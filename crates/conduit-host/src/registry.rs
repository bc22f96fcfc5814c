use std::collections::HashMap;
use std::sync::Arc;

use conduit_core::{BridgeModule, FeatureFlags};
use parking_lot::RwLock;

/// Name → module map shared by every dispatch.
///
/// All access goes through one reader/writer lock, so concurrent writers
/// for the same name resolve to whichever lands last and readers never see
/// a half-applied write.
pub struct ModuleRegistry {
    modules: RwLock<HashMap<String, Arc<dyn BridgeModule>>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self {
            modules: RwLock::new(HashMap::new()),
        }
    }

    /// Insert a module under its own name.
    ///
    /// Returns `true` if the registry changed. With `allow_overwrite == false`
    /// an existing entry of the same name is kept and this returns `false`.
    pub fn register(&self, module: Arc<dyn BridgeModule>, allow_overwrite: bool) -> bool {
        let name = module.name().to_owned();
        let replaced = {
            let mut modules = self.modules.write();
            if !allow_overwrite && modules.contains_key(&name) {
                drop(modules);
                tracing::debug!(module = %name, "module already registered, keeping existing entry");
                return false;
            }
            modules.insert(name.clone(), module).is_some()
        };
        tracing::debug!(module = %name, replaced, "registered module");
        true
    }

    /// Register (overwriting) only when `condition` holds.
    pub fn register_if(&self, module: Arc<dyn BridgeModule>, condition: bool) -> bool {
        if !condition {
            tracing::debug!(module = %module.name(), "conditional registration skipped");
            return false;
        }
        self.register(module, true)
    }

    /// Register (overwriting) unless the flag named after the module is off.
    pub fn register_when_enabled(&self, module: Arc<dyn BridgeModule>, flags: &FeatureFlags) -> bool {
        let enabled = flags.is_enabled(module.name());
        self.register_if(module, enabled)
    }

    /// Register each module in order; returns how many changed the registry.
    pub fn register_all<I>(&self, modules: I, allow_overwrite: bool) -> usize
    where
        I: IntoIterator<Item = Arc<dyn BridgeModule>>,
    {
        modules
            .into_iter()
            .filter(|module| self.register(Arc::clone(module), allow_overwrite))
            .count()
    }

    pub fn unregister(&self, name: &str) -> Option<Arc<dyn BridgeModule>> {
        let removed = self.modules.write().remove(name);
        if removed.is_some() {
            tracing::debug!(module = %name, "unregistered module");
        }
        removed
    }

    pub fn module(&self, name: &str) -> Option<Arc<dyn BridgeModule>> {
        self.modules.read().get(name).map(Arc::clone)
    }

    pub fn has_module(&self, name: &str) -> bool {
        self.modules.read().contains_key(name)
    }

    /// Registered names, sorted.
    pub fn registered_module_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.modules.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Every registered module, ordered by name.
    pub fn all_modules(&self) -> Vec<Arc<dyn BridgeModule>> {
        let mut modules: Vec<Arc<dyn BridgeModule>> =
            self.modules.read().values().map(Arc::clone).collect();
        modules.sort_by(|a, b| a.name().cmp(b.name()));
        modules
    }

    pub fn len(&self) -> usize {
        self.modules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.read().is_empty()
    }

    pub fn remove_all(&self) {
        let removed = std::mem::take(&mut *self.modules.write());
        tracing::debug!(count = removed.len(), "removed all modules");
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
