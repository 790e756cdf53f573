//! Run-time plugin loading.
//!
//! A plugin is a shared module exporting a [`PluginFeatures`](radiolink_plugin_sdk::PluginFeatures)
//! table. It is loaded either globally or for one [`Instance`](crate::Instance), and is
//! identified by its canonical path together with that owner:
//!
//! ```text
//! load(path, owner, arg)
//!   -> resolve path -> check (owner, path) unused -> open module
//!   -> register -> init hook -> start task
//! unload(path, owner)
//!   -> stop task -> deregister -> remove hook -> release module
//! ```
//!
//! The free functions operate on the process-wide [`PluginRegistry`]. Build
//! without the `plugins` feature and they report [`Error::NotImplemented`](crate::Error::NotImplemented).

use std::ffi::c_void;
#[cfg(feature = "plugins")]
use std::sync::Arc;

#[cfg(feature = "plugins")]
use crate::instance::Instance;

#[cfg(feature = "plugins")]
mod lifecycle;
#[cfg(feature = "plugins")]
pub mod loader;
#[cfg(feature = "plugins")]
mod lookup;
#[cfg(feature = "plugins")]
pub mod path;
#[cfg(feature = "plugins")]
mod record;
#[cfg(feature = "plugins")]
mod registry;
#[cfg(feature = "plugins")]
mod task;

#[cfg(not(feature = "plugins"))]
mod disabled;

#[cfg(feature = "plugins")]
pub use loader::{LoadedModule, ModuleLoader, NativeLoader, Residency, StaticLoader};
#[cfg(feature = "plugins")]
pub use lookup::NamedCapability;
#[cfg(feature = "plugins")]
pub use record::{PluginInfo, PluginRecord, TaskMode};
#[cfg(feature = "plugins")]
pub use registry::PluginRegistry;

#[cfg(not(feature = "plugins"))]
pub use disabled::{find_named_capability, force_unload, load, unload, NamedCapability, PluginRecord};

/// Opaque caller argument handed to every hook of a plugin.
///
/// The host never dereferences it. Whoever passes it keeps the pointee
/// alive until the plugin is unloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PluginArg(*mut c_void);

// SAFETY: the host only passes the pointer through to the plugin.
unsafe impl Send for PluginArg {}
unsafe impl Sync for PluginArg {}

impl PluginArg {
    /// No argument (a null pointer).
    pub const fn none() -> Self {
        Self(std::ptr::null_mut())
    }

    pub const fn from_raw(ptr: *mut c_void) -> Self {
        Self(ptr)
    }

    /// Point at `value`. The caller keeps `value` alive while the plugin is loaded.
    pub fn from_ref<T>(value: &T) -> Self {
        Self(value as *const T as *mut c_void)
    }

    pub const fn as_ptr(self) -> *mut c_void {
        self.0
    }

    pub fn is_none(self) -> bool {
        self.0.is_null()
    }
}

impl Default for PluginArg {
    fn default() -> Self {
        Self::none()
    }
}

/// Load the plugin at `path` into the process-wide registry.
///
/// With an owner, the owner's load hook applies: disabled hooks report
/// `NotImplemented`, custom hooks receive the call instead.
#[cfg(feature = "plugins")]
pub fn load(
    path: impl AsRef<std::path::Path>,
    owner: Option<&Arc<Instance>>,
    arg: PluginArg,
) -> crate::Result<()> {
    PluginRegistry::global().load(path, owner, arg)
}

/// Unload the plugin at `path` from the process-wide registry.
#[cfg(feature = "plugins")]
pub fn unload(path: impl AsRef<std::path::Path>, owner: Option<&Arc<Instance>>) -> crate::Result<()> {
    PluginRegistry::global().unload(path, owner)
}

/// Tear down `record`, bypassing path lookup and hooks.
///
/// `accept_shutdown` lets a record whose owner is shutting down stop its
/// supervised task.
#[cfg(feature = "plugins")]
pub fn force_unload(record: &Arc<PluginRecord>, accept_shutdown: bool) -> crate::Result<()> {
    lifecycle::force_unload(record, accept_shutdown)
}

/// Find a named capability in any loaded plugin.
///
/// Returns `None` without creating the process-wide registry if nothing has
/// been loaded yet.
#[cfg(feature = "plugins")]
pub fn find_named_capability(name: &str) -> Option<NamedCapability> {
    PluginRegistry::try_global()?.find_named_capability(name)
}

/// Tear down a record on behalf of its owner during shutdown.
#[cfg(feature = "plugins")]
pub(crate) fn release_owned(record: &Arc<PluginRecord>, owner: &Instance) -> crate::Result<()> {
    lifecycle::teardown(record, Some(owner), true)
}

#[cfg(not(feature = "plugins"))]
pub(crate) use disabled::release_owned;
