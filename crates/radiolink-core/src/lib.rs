//! Plugin loading and lifecycle management for Radiolink.
//!
//! Plugins are shared modules built with `radiolink-plugin-sdk`. They are
//! loaded globally or for a communication [`Instance`], may run a background
//! task, and advertise named capabilities such as radio series modes.

pub mod config;
pub mod error;
pub mod instance;
pub mod plugin;
pub mod supervisor;

pub use config::{PluginConfig, RadiolinkConfig, SupervisorConfig};
pub use error::{Error, Result};
pub use instance::{HookSlot, Instance, InstanceState};
pub use plugin::{find_named_capability, force_unload, load, unload, NamedCapability, PluginArg, PluginRecord};
pub use supervisor::{MonitorHandle, ThreadSupervisor};

#[cfg(feature = "plugins")]
pub use plugin::{PluginInfo, PluginRegistry, StaticLoader, TaskMode};

/// The module-side SDK, for hosts that build capability tables in-process.
pub use radiolink_plugin_sdk as sdk;

/// Re-exports commonly used types.
pub mod prelude {
    // Error handling
    pub use crate::error::{Error, Result};

    // Configuration
    pub use crate::config::{defaults, env_vars, PluginConfig, SupervisorConfig};

    // Owners
    pub use crate::instance::{HookSlot, Instance};

    // Plugins
    pub use crate::plugin::{NamedCapability, PluginArg, PluginRecord};
    #[cfg(feature = "plugins")]
    pub use crate::plugin::{ModuleLoader, NativeLoader, PluginRegistry, StaticLoader};
}
