//! Loaded plugin records.

use std::cell::UnsafeCell;
use std::ffi::c_void;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use radiolink_plugin_sdk::{TASK_MODE_RUN_ONCE, TASK_MODE_SUPERVISED_RESTART};
use serde::Serialize;
use uuid::Uuid;

use super::loader::{LoadedModule, Residency};
use super::registry::RegistryShared;
use super::task::PluginTask;
use super::PluginArg;
use crate::instance::Instance;

/// How a plugin's background task is run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskMode {
    /// Started once on a detached thread.
    RunOnce,
    /// Started under the owner's supervisor and restarted when it exits.
    SupervisedRestart,
}

impl TaskMode {
    /// Decode a raw `task_mode`. Unknown values fall back to run-once.
    pub fn from_raw(raw: u32, path: &Path) -> Self {
        match raw {
            TASK_MODE_RUN_ONCE => TaskMode::RunOnce,
            TASK_MODE_SUPERVISED_RESTART => TaskMode::SupervisedRestart,
            other => {
                tracing::warn!(
                    path = %path.display(),
                    mode = other,
                    "Unknown plugin task mode, running once"
                );
                TaskMode::RunOnce
            }
        }
    }
}

/// The private-state slot handed to every hook as `*mut *mut c_void`.
///
/// Shared between the record and its task so the slot outlives both.
pub(crate) struct StateSlot(UnsafeCell<*mut c_void>);

// SAFETY: the slot is only a pointer cell; synchronizing access to what it
// points at is the plugin's responsibility.
unsafe impl Send for StateSlot {}
unsafe impl Sync for StateSlot {}

impl StateSlot {
    pub(crate) fn new() -> Self {
        Self(UnsafeCell::new(std::ptr::null_mut()))
    }

    pub(crate) fn as_ptr(&self) -> *mut *mut c_void {
        self.0.get()
    }

    fn get(&self) -> *mut c_void {
        // SAFETY: reading a pointer-sized cell
        unsafe { *self.0.get() }
    }
}

/// One loaded module bound to zero or one owning instance.
pub struct PluginRecord {
    pub(crate) path: PathBuf,
    pub(crate) owner: Option<Weak<Instance>>,
    pub(crate) owner_id: Option<Uuid>,
    pub(crate) module: Arc<LoadedModule>,
    pub(crate) arg: PluginArg,
    pub(crate) state: Arc<StateSlot>,
    pub(crate) task: Mutex<Option<PluginTask>>,
    pub(crate) task_mode: Option<TaskMode>,
    pub(crate) loaded_at: DateTime<Utc>,
    /// Held by `load` from registration until the load completes or is rolled back.
    pub(crate) loading: Mutex<()>,
    pub(crate) unloading: AtomicBool,
    pub(crate) registry: Weak<RegistryShared>,
}

impl PluginRecord {
    pub(crate) fn new(
        module: LoadedModule,
        owner: Option<&Arc<Instance>>,
        arg: PluginArg,
        registry: Weak<RegistryShared>,
    ) -> Self {
        let path = module.path().to_path_buf();
        let features = module.features();
        let task_mode = features
            .task
            .map(|_| TaskMode::from_raw(features.task_mode, &path));

        Self {
            path,
            owner: owner.map(Arc::downgrade),
            owner_id: owner.map(|o| o.id()),
            module: Arc::new(module),
            arg,
            state: Arc::new(StateSlot::new()),
            task: Mutex::new(None),
            task_mode,
            loaded_at: Utc::now(),
            loading: Mutex::new(()),
            unloading: AtomicBool::new(false),
            registry,
        }
    }

    /// Canonical path of the module.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Id of the owning instance, `None` for a global plugin.
    pub fn owner_id(&self) -> Option<Uuid> {
        self.owner_id
    }

    /// The owning instance, if it is still alive.
    pub fn owner(&self) -> Option<Arc<Instance>> {
        self.owner.as_ref().and_then(Weak::upgrade)
    }

    pub fn task_mode(&self) -> Option<TaskMode> {
        self.task_mode
    }

    pub fn residency(&self) -> Residency {
        self.module.residency()
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn arg(&self) -> PluginArg {
        self.arg
    }

    /// Current value of the plugin's private state pointer.
    pub fn private_state(&self) -> *mut c_void {
        self.state.get()
    }

    /// Whether a task handle is currently held for this record.
    pub fn has_task(&self) -> bool {
        self.task.lock().is_some()
    }

    /// Names of the capabilities the module advertises.
    pub fn capability_names(&self) -> Vec<String> {
        // SAFETY: the table was validated when the module was opened
        unsafe { self.module.features().capabilities() }
            .iter()
            .filter_map(|cap| unsafe { cap.name() })
            .map(|name| name.to_string_lossy().into_owned())
            .collect()
    }

    pub fn info(&self) -> PluginInfo {
        PluginInfo {
            path: self.path.clone(),
            owner: self.owner_id,
            task_mode: self.task_mode,
            residency: self.residency(),
            capabilities: self.capability_names(),
            loaded_at: self.loaded_at,
        }
    }

    pub(crate) fn matches(&self, path: &Path, owner_id: Option<Uuid>) -> bool {
        self.owner_id == owner_id && self.path == path
    }

    /// Opaque owner pointer passed to hooks, null for a global plugin.
    pub(crate) fn owner_ptr(&self) -> *const c_void {
        self.owner
            .as_ref()
            .map_or(std::ptr::null(), |owner| owner.as_ptr() as *const c_void)
    }

    /// Block until an in-flight load of this record has finished.
    pub(crate) fn wait_loaded(&self) {
        drop(self.loading.lock());
    }

    /// Claim the record for teardown. Only the first caller gets `true`.
    ///
    /// A record whose load was rolled back stays claimed.
    pub(crate) fn claim(&self) -> bool {
        !self.unloading.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn release_claim(&self) {
        self.unloading.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for PluginRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRecord")
            .field("path", &self.path)
            .field("owner", &self.owner_id)
            .field("task_mode", &self.task_mode)
            .field("loaded_at", &self.loaded_at)
            .finish_non_exhaustive()
    }
}

/// Serializable snapshot of a loaded plugin.
#[derive(Debug, Clone, Serialize)]
pub struct PluginInfo {
    pub path: PathBuf,
    pub owner: Option<Uuid>,
    pub task_mode: Option<TaskMode>,
    pub residency: Residency,
    pub capabilities: Vec<String>,
    pub loaded_at: DateTime<Utc>,
}
