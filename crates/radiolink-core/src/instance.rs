//! Communication instances as plugin owners.
//!
//! An [`Instance`] is what plugins are loaded *for*. The plugin subsystem
//! only needs three things from it: whether it is still usable, a collection
//! of the plugins it owns, and a [`ThreadSupervisor`] for restartable tasks.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SupervisorConfig;
use crate::error::{Error, Result};
use crate::plugin::{self, NamedCapability, PluginArg, PluginRecord};
use crate::supervisor::ThreadSupervisor;

/// Replacement for the built-in plugin load on one instance.
pub type LoadHook = dyn Fn(&Path, &Arc<Instance>, PluginArg) -> Result<()> + Send + Sync;

/// Replacement for the built-in plugin unload on one instance.
pub type UnloadHook = dyn Fn(&Path, &Arc<Instance>) -> Result<()> + Send + Sync;

/// Who handles plugin load or unload requests for an instance.
pub enum HookSlot<H: ?Sized> {
    /// The built-in plugin registry.
    Default,
    /// Requests fail with [`Error::NotImplemented`].
    Disabled,
    /// Requests are passed to this handler and its result returned as is.
    Custom(Arc<H>),
}

impl<H: ?Sized> Clone for HookSlot<H> {
    fn clone(&self) -> Self {
        match self {
            HookSlot::Default => HookSlot::Default,
            HookSlot::Disabled => HookSlot::Disabled,
            HookSlot::Custom(hook) => HookSlot::Custom(hook.clone()),
        }
    }
}

impl<H: ?Sized> fmt::Debug for HookSlot<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookSlot::Default => f.write_str("Default"),
            HookSlot::Disabled => f.write_str("Disabled"),
            HookSlot::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Lifecycle state of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    Running,
    ShuttingDown,
    Terminated,
}

/// A communication instance that can own plugins.
pub struct Instance {
    id: Uuid,
    state: RwLock<InstanceState>,
    plugins: Mutex<Vec<Arc<PluginRecord>>>,
    load_hook: RwLock<HookSlot<LoadHook>>,
    unload_hook: RwLock<HookSlot<UnloadHook>>,
    supervisor: ThreadSupervisor,
    mode: RwLock<Option<NamedCapability>>,
}

impl Instance {
    /// Create an instance with the supervisor configured from the environment.
    pub fn new() -> Arc<Self> {
        Self::with_supervisor_config(SupervisorConfig::from_env())
    }

    pub fn with_supervisor_config(config: SupervisorConfig) -> Arc<Self> {
        let instance = Arc::new(Self {
            id: Uuid::new_v4(),
            state: RwLock::new(InstanceState::Running),
            plugins: Mutex::new(Vec::new()),
            load_hook: RwLock::new(HookSlot::Default),
            unload_hook: RwLock::new(HookSlot::Default),
            supervisor: ThreadSupervisor::new(config),
            mode: RwLock::new(None),
        });
        debug!(instance = %instance.id, "Instance created");
        instance
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> InstanceState {
        *self.state.read()
    }

    /// Whether the instance can still be used.
    ///
    /// A shutting-down instance only counts when `accept_shutdown` is set.
    pub fn is_valid(&self, accept_shutdown: bool) -> bool {
        match *self.state.read() {
            InstanceState::Running => true,
            InstanceState::ShuttingDown => accept_shutdown,
            InstanceState::Terminated => false,
        }
    }

    pub fn load_hook(&self) -> HookSlot<LoadHook> {
        self.load_hook.read().clone()
    }

    pub fn unload_hook(&self) -> HookSlot<UnloadHook> {
        self.unload_hook.read().clone()
    }

    pub fn set_load_hook(&self, hook: HookSlot<LoadHook>) {
        *self.load_hook.write() = hook;
    }

    pub fn set_unload_hook(&self, hook: HookSlot<UnloadHook>) {
        *self.unload_hook.write() = hook;
    }

    /// Hand plugin loads on this instance to `hook`.
    pub fn delegate_load<F>(&self, hook: F)
    where
        F: Fn(&Path, &Arc<Instance>, PluginArg) -> Result<()> + Send + Sync + 'static,
    {
        let hook: Arc<LoadHook> = Arc::new(hook);
        self.set_load_hook(HookSlot::Custom(hook));
    }

    /// Hand plugin unloads on this instance to `hook`.
    pub fn delegate_unload<F>(&self, hook: F)
    where
        F: Fn(&Path, &Arc<Instance>) -> Result<()> + Send + Sync + 'static,
    {
        let hook: Arc<UnloadHook> = Arc::new(hook);
        self.set_unload_hook(HookSlot::Custom(hook));
    }

    pub fn supervisor(&self) -> &ThreadSupervisor {
        &self.supervisor
    }

    /// Plugins owned by this instance, in load order.
    pub fn plugins(&self) -> Vec<Arc<PluginRecord>> {
        self.plugins.lock().clone()
    }

    pub fn plugin_count(&self) -> usize {
        self.plugins.lock().len()
    }

    #[cfg_attr(not(feature = "plugins"), allow(dead_code))]
    pub(crate) fn attach(&self, record: Arc<PluginRecord>) {
        self.plugins.lock().push(record);
    }

    #[cfg_attr(not(feature = "plugins"), allow(dead_code))]
    pub(crate) fn detach(&self, record: &Arc<PluginRecord>) {
        self.plugins.lock().retain(|r| !Arc::ptr_eq(r, record));
    }

    /// Bind the named capability (a radio mode such as `"series2"`) to this
    /// instance. The name is matched case-insensitively across all loaded plugins.
    pub fn select_mode(&self, name: &str) -> Result<NamedCapability> {
        if name.is_empty() {
            return Err(Error::MissingParam("name"));
        }
        if !self.is_valid(false) {
            return Err(Error::invalid(format!("instance {} is not running", self.id)));
        }
        let mode = plugin::find_named_capability(name)
            .ok_or_else(|| Error::NotExists(format!("mode {name}")))?;
        info!(instance = %self.id, mode = mode.name(), "Mode selected");
        self.set_mode(mode.clone());
        Ok(mode)
    }

    pub fn set_mode(&self, mode: NamedCapability) {
        *self.mode.write() = Some(mode);
    }

    pub fn mode(&self) -> Option<NamedCapability> {
        self.mode.read().clone()
    }

    pub fn mode_name(&self) -> Option<String> {
        self.mode.read().as_ref().map(|m| m.name().to_string())
    }

    /// Unload every owned plugin and stop all monitored threads.
    ///
    /// Safe to call more than once; later calls do nothing.
    pub fn shutdown(&self) {
        {
            let mut state = self.state.write();
            if *state != InstanceState::Running {
                return;
            }
            *state = InstanceState::ShuttingDown;
        }
        self.release_all();
    }

    fn release_all(&self) {
        let records = self.plugins();
        for record in records.iter().rev() {
            if let Err(e) = plugin::release_owned(record, self) {
                warn!(instance = %self.id, error = %e, "Failed to unload plugin during shutdown");
            }
        }
        self.supervisor.close();
        self.mode.write().take();
        *self.state.write() = InstanceState::Terminated;
        info!(instance = %self.id, plugins = records.len(), "Instance shut down");
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        let state = *self.state.get_mut();
        if state == InstanceState::Terminated {
            return;
        }
        *self.state.get_mut() = InstanceState::ShuttingDown;
        self.release_all();
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("plugins", &self.plugin_count())
            .field("load_hook", &*self.load_hook.read())
            .field("unload_hook", &*self.unload_hook.read())
            .finish_non_exhaustive()
    }
}
