//! Radiolink Plugin SDK
//!
//! Types and macros for building modules that the Radiolink host loads at run
//! time. A module is a `cdylib` exporting one [`PluginFeatures`] table:
//!
//! - `init(owner, arg, &mut state) -> i32` - optional, non-zero aborts the load
//! - `remove(owner, arg, &mut state) -> i32` - optional, result is diagnostic only
//! - `task(owner, arg, &mut state, &TaskSignal)` - optional background task
//! - `task_mode` - run once, or restarted by the owning instance
//! - named [`CapabilityDescriptor`]s, found by the host case-insensitively
//!
//! # Quick Start
//!
//! ```rust
//! use radiolink_plugin_sdk::prelude::*;
//! use std::ffi::{c_int, c_void};
//!
//! unsafe extern "C" fn init(_owner: *const c_void, _arg: *mut c_void, slot: *mut *mut c_void) -> c_int {
//!     state::store(slot, 0u64);
//!     0
//! }
//!
//! unsafe extern "C" fn remove(_owner: *const c_void, _arg: *mut c_void, slot: *mut *mut c_void) -> c_int {
//!     state::take::<u64>(slot);
//!     0
//! }
//!
//! export_plugin!(PluginFeatures::new().with_init(init).with_remove(remove));
//! ```

pub mod descriptor;
#[macro_use]
pub mod macros;
pub mod signal;
pub mod state;

pub use descriptor::{
    CapabilityDescriptor, DescriptorError, InitFn, PluginFeatures, RemoveFn, TaskFn,
    FEATURES_SYMBOL, PLUGIN_ABI_VERSION, TASK_MODE_RUN_ONCE, TASK_MODE_SUPERVISED_RESTART,
};
pub use signal::TaskSignal;

/// Prelude module with common imports
pub mod prelude {
    pub use crate::descriptor::{
        CapabilityDescriptor, PluginFeatures, PLUGIN_ABI_VERSION, TASK_MODE_RUN_ONCE,
        TASK_MODE_SUPERVISED_RESTART,
    };
    pub use crate::signal::TaskSignal;
    pub use crate::state;

    // Macros are automatically available due to #[macro_use]
    pub use crate::export_plugin;
}
