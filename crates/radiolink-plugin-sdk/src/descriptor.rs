//! Plugin capability table.
//!
//! Every plugin module exports one static [`PluginFeatures`] under the symbol
//! [`FEATURES_SYMBOL`]. The host reads it once after opening the module and
//! never writes to it.

use std::ffi::{c_char, c_int, c_void, CStr};

use crate::signal::TaskSignal;

/// Plugin ABI version (must match the host).
pub const PLUGIN_ABI_VERSION: u32 = 1;

/// Name of the exported capability table, NUL-terminated for symbol lookup.
pub const FEATURES_SYMBOL: &[u8] = b"radiolink_plugin_features\0";

/// Raw `task_mode` value: the task runs once on a detached thread.
pub const TASK_MODE_RUN_ONCE: u32 = 0;

/// Raw `task_mode` value: the owning instance restarts the task when it exits.
pub const TASK_MODE_SUPERVISED_RESTART: u32 = 1;

/// Called once after the plugin is registered.
///
/// `owner` is an opaque pointer to the owning instance, or null for a global
/// plugin. `state` points at the plugin's private-state slot. A non-zero return
/// aborts the load.
pub type InitFn =
    unsafe extern "C" fn(owner: *const c_void, arg: *mut c_void, state: *mut *mut c_void) -> c_int;

/// Called once while the plugin is torn down. The return value is diagnostic only.
pub type RemoveFn =
    unsafe extern "C" fn(owner: *const c_void, arg: *mut c_void, state: *mut *mut c_void) -> c_int;

/// Background task body. Must return promptly once `signal` is cancelled.
pub type TaskFn = unsafe extern "C" fn(
    owner: *const c_void,
    arg: *mut c_void,
    state: *mut *mut c_void,
    signal: *const TaskSignal,
);

/// A named capability advertised by a plugin (for example a radio series mode).
#[repr(C)]
#[derive(Debug)]
pub struct CapabilityDescriptor {
    /// NUL-terminated name, matched case-insensitively by the host
    pub name: *const c_char,
    /// Descriptor revision, defined by the plugin
    pub version: u32,
    /// Plugin-defined payload, opaque to the host
    pub data: *const c_void,
}

// SAFETY: descriptors live in static, read-only plugin memory.
unsafe impl Sync for CapabilityDescriptor {}
unsafe impl Send for CapabilityDescriptor {}

impl CapabilityDescriptor {
    /// Create a descriptor without a payload.
    pub const fn new(name: &'static CStr, version: u32) -> Self {
        Self {
            name: name.as_ptr(),
            version,
            data: std::ptr::null(),
        }
    }

    /// Attach a static payload.
    pub const fn with_data(mut self, data: *const c_void) -> Self {
        self.data = data;
        self
    }

    /// Read the descriptor name.
    ///
    /// # Safety
    /// `name` must be null or point to a NUL-terminated string that outlives `self`.
    pub unsafe fn name(&self) -> Option<&CStr> {
        if self.name.is_null() {
            None
        } else {
            Some(CStr::from_ptr(self.name))
        }
    }
}

/// The capability table exported by a plugin module.
#[repr(C)]
#[derive(Debug)]
pub struct PluginFeatures {
    /// ABI version - must match PLUGIN_ABI_VERSION
    pub abi_version: u32,
    pub init: Option<InitFn>,
    pub remove: Option<RemoveFn>,
    pub task: Option<TaskFn>,
    /// One of the `TASK_MODE_*` constants
    pub task_mode: u32,
    /// Pointer to `capability_count` descriptors (may be null when the count is zero)
    pub capabilities: *const CapabilityDescriptor,
    pub capability_count: usize,
}

// SAFETY: the table is immutable static data once exported.
unsafe impl Sync for PluginFeatures {}
unsafe impl Send for PluginFeatures {}

impl PluginFeatures {
    /// An empty table with the current ABI version.
    pub const fn new() -> Self {
        Self {
            abi_version: PLUGIN_ABI_VERSION,
            init: None,
            remove: None,
            task: None,
            task_mode: TASK_MODE_RUN_ONCE,
            capabilities: std::ptr::null(),
            capability_count: 0,
        }
    }

    /// Set the init hook.
    pub const fn with_init(mut self, init: InitFn) -> Self {
        self.init = Some(init);
        self
    }

    /// Set the remove hook.
    pub const fn with_remove(mut self, remove: RemoveFn) -> Self {
        self.remove = Some(remove);
        self
    }

    /// Set the background task and its mode.
    pub const fn with_task(mut self, task: TaskFn, task_mode: u32) -> Self {
        self.task = Some(task);
        self.task_mode = task_mode;
        self
    }

    /// Advertise named capabilities.
    pub const fn with_capabilities(mut self, capabilities: &'static [CapabilityDescriptor]) -> Self {
        self.capabilities = capabilities.as_ptr();
        self.capability_count = capabilities.len();
        self
    }

    /// Check the table before the host relies on it.
    pub fn validate(&self) -> Result<(), DescriptorError> {
        if self.abi_version != PLUGIN_ABI_VERSION {
            return Err(DescriptorError::AbiMismatch {
                expected: PLUGIN_ABI_VERSION,
                found: self.abi_version,
            });
        }
        if self.capability_count > 0 && self.capabilities.is_null() {
            return Err(DescriptorError::MissingCapabilities(self.capability_count));
        }
        Ok(())
    }

    /// The advertised capability descriptors.
    ///
    /// # Safety
    /// The table must have passed [`validate`](Self::validate) and its
    /// descriptor array must outlive the returned slice.
    pub unsafe fn capabilities(&self) -> &[CapabilityDescriptor] {
        if self.capabilities.is_null() || self.capability_count == 0 {
            &[]
        } else {
            std::slice::from_raw_parts(self.capabilities, self.capability_count)
        }
    }
}

impl Default for PluginFeatures {
    fn default() -> Self {
        Self::new()
    }
}

/// Capability table validation errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("ABI version mismatch: expected {expected}, found {found}")]
    AbiMismatch { expected: u32, found: u32 },

    #[error("capability list is null but {0} descriptors are declared")]
    MissingCapabilities(usize),
}
