//! Shared fixtures for plugin tests.
//!
//! Capability tables here are linked into the test binary and served by a
//! `StaticLoader` under temporary file paths. Every hook expects its `arg` to
//! point at a [`HookLog`], which records what the host called.

#![allow(dead_code)]

use std::ffi::{c_int, c_void};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use radiolink_core::config::{PluginConfig, SupervisorConfig};
use radiolink_core::sdk::prelude::*;
use radiolink_core::{Instance, PluginArg, PluginRegistry, StaticLoader};
use tempfile::TempDir;

/// Counters updated by the test hooks.
#[derive(Debug, Default)]
pub struct HookLog {
    pub inits: AtomicUsize,
    pub removes: AtomicUsize,
    pub task_starts: AtomicUsize,
    pub task_running: AtomicUsize,
    pub task_cancelled: AtomicUsize,
    /// While set, `GATED_INIT` parks inside `init`.
    pub hold_init: AtomicBool,
    pub init_parked: AtomicUsize,
}

impl HookLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn arg(self: &Arc<Self>) -> PluginArg {
        PluginArg::from_ref(self.as_ref())
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    /// A log whose `GATED_INIT` hook blocks until [`HookLog::release_init`].
    pub fn holding_init() -> Arc<Self> {
        let log = Self::new();
        log.hold_init.store(true, Ordering::SeqCst);
        log
    }

    pub fn release_init(&self) {
        self.hold_init.store(false, Ordering::SeqCst);
    }
}

unsafe fn hook_log<'a>(arg: *mut c_void) -> &'a HookLog {
    state::arg::<HookLog>(arg).expect("hook arg must be a HookLog")
}

// Private state: the init sequence number, so records can be told apart.
unsafe extern "C" fn init(_owner: *const c_void, arg: *mut c_void, slot: *mut *mut c_void) -> c_int {
    let hooks = hook_log(arg);
    let n = hooks.inits.fetch_add(1, Ordering::SeqCst) + 1;
    state::store(slot, n);
    0
}

unsafe extern "C" fn gated_init(owner: *const c_void, arg: *mut c_void, slot: *mut *mut c_void) -> c_int {
    let hooks = hook_log(arg);
    hooks.init_parked.fetch_add(1, Ordering::SeqCst);
    while hooks.hold_init.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(1));
    }
    init(owner, arg, slot)
}

unsafe extern "C" fn failing_init(_owner: *const c_void, arg: *mut c_void, _slot: *mut *mut c_void) -> c_int {
    hook_log(arg).inits.fetch_add(1, Ordering::SeqCst);
    -7
}

unsafe extern "C" fn remove(_owner: *const c_void, arg: *mut c_void, slot: *mut *mut c_void) -> c_int {
    hook_log(arg).removes.fetch_add(1, Ordering::SeqCst);
    match state::take::<usize>(slot) {
        Some(_) => 0,
        None => -1,
    }
}

unsafe extern "C" fn blocking_task(
    _owner: *const c_void,
    arg: *mut c_void,
    _slot: *mut *mut c_void,
    signal: *const TaskSignal,
) {
    let hooks = hook_log(arg);
    let signal = TaskSignal::from_ptr(signal).expect("task signal");
    hooks.task_starts.fetch_add(1, Ordering::SeqCst);
    hooks.task_running.fetch_add(1, Ordering::SeqCst);
    while !signal.wait_timeout(Duration::from_millis(2)) {}
    hooks.task_cancelled.fetch_add(1, Ordering::SeqCst);
    hooks.task_running.fetch_sub(1, Ordering::SeqCst);
}

unsafe extern "C" fn returning_task(
    _owner: *const c_void,
    arg: *mut c_void,
    _slot: *mut *mut c_void,
    _signal: *const TaskSignal,
) {
    hook_log(arg).task_starts.fetch_add(1, Ordering::SeqCst);
}

pub static SERIES2_MODES: [CapabilityDescriptor; 1] = [CapabilityDescriptor::new(c"Series2", 2)];
pub static SERIES1_MODES: [CapabilityDescriptor; 2] = [
    CapabilityDescriptor::new(c"Series1", 1),
    CapabilityDescriptor::new(c"Series1-API", 1),
];

pub static BASIC: PluginFeatures = PluginFeatures::new()
    .with_init(init)
    .with_remove(remove)
    .with_capabilities(&SERIES2_MODES);

pub static GATED_INIT: PluginFeatures = PluginFeatures::new()
    .with_init(gated_init)
    .with_remove(remove);

pub static GATED_SUPERVISED: PluginFeatures = PluginFeatures::new()
    .with_init(gated_init)
    .with_remove(remove)
    .with_task(blocking_task, TASK_MODE_SUPERVISED_RESTART);

pub static FAILING_INIT: PluginFeatures = PluginFeatures::new()
    .with_init(failing_init)
    .with_remove(remove);

pub static SUPERVISED: PluginFeatures = PluginFeatures::new()
    .with_init(init)
    .with_remove(remove)
    .with_task(blocking_task, TASK_MODE_SUPERVISED_RESTART)
    .with_capabilities(&SERIES1_MODES);

pub static FLAKY_SUPERVISED: PluginFeatures = PluginFeatures::new()
    .with_init(init)
    .with_remove(remove)
    .with_task(returning_task, TASK_MODE_SUPERVISED_RESTART);

pub static RUN_ONCE: PluginFeatures = PluginFeatures::new()
    .with_init(init)
    .with_remove(remove)
    .with_task(blocking_task, TASK_MODE_RUN_ONCE);

pub static UNKNOWN_MODE: PluginFeatures = PluginFeatures::new()
    .with_init(init)
    .with_remove(remove)
    .with_task(blocking_task, 9);

pub static NO_HOOKS: PluginFeatures = PluginFeatures::new();

pub static BAD_ABI: PluginFeatures = {
    let mut features = PluginFeatures::new().with_init(init);
    features.abi_version = PLUGIN_ABI_VERSION + 1;
    features
};

/// A private registry backed by a `StaticLoader` and a temp directory.
pub struct Fixture {
    pub dir: TempDir,
    pub loader: Arc<StaticLoader>,
    pub registry: PluginRegistry,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(PluginConfig::default())
    }

    pub fn with_config(config: PluginConfig) -> Self {
        init_tracing();
        let loader = Arc::new(StaticLoader::new());
        Self {
            dir: tempfile::tempdir().expect("tempdir"),
            registry: PluginRegistry::new(loader.clone(), config),
            loader,
        }
    }

    /// Create `name` in the temp directory and serve `features` from it.
    pub fn plugin(&self, name: &str, features: &'static PluginFeatures) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, b"").expect("write plugin file");
        self.loader.register(&path, features).expect("register static plugin");
        path
    }
}

/// An instance that restarts supervised tasks almost immediately.
pub fn instance() -> Arc<Instance> {
    Instance::with_supervisor_config(
        SupervisorConfig::default().with_restart_delay(Duration::from_millis(1)),
    )
}

pub fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    false
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
