//! Series 2 radio mode plugin.
//!
//! Advertises the `Series2` mode and runs a heartbeat task that counts ticks
//! in the plugin's private state until the host cancels it. The load argument
//! may point at [`Series2Options`].
//!
//! The host does not join run-once tasks, so the heartbeat keeps its own
//! reference to the state and `remove` only drops the slot's reference.

use std::ffi::{c_int, c_void};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{const_mutex, Mutex};
use radiolink_plugin_sdk::prelude::*;

/// Mode parameters published as the capability payload.
#[repr(C)]
#[derive(Debug)]
pub struct Series2Mode {
    pub max_payload: u16,
    pub escaped_api: u8,
}

pub static SERIES2_MODE: Series2Mode = Series2Mode {
    max_payload: 84,
    escaped_api: 1,
};

/// Optional load argument.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Series2Options {
    pub heartbeat_ms: u32,
}

const DEFAULT_HEARTBEAT: Duration = Duration::from_millis(1000);

/// Private state kept per loaded record.
#[derive(Debug)]
pub struct Series2State {
    pub heartbeat: Duration,
    pub ticks: AtomicU64,
}

/// Held while a reference is taken out of, or removed from, a state slot.
static SLOT_LOCK: Mutex<()> = const_mutex(());

unsafe extern "C" fn init(_owner: *const c_void, arg: *mut c_void, slot: *mut *mut c_void) -> c_int {
    let heartbeat = state::arg::<Series2Options>(arg)
        .map(|o| Duration::from_millis(u64::from(o.heartbeat_ms)))
        .unwrap_or(DEFAULT_HEARTBEAT);
    if heartbeat.is_zero() {
        tracing::error!("Series2 heartbeat must be non-zero");
        return -1;
    }

    let shared = Arc::new(Series2State {
        heartbeat,
        ticks: AtomicU64::new(0),
    });
    let _slot = SLOT_LOCK.lock();
    state::store(slot, shared);
    tracing::debug!(?heartbeat, "Series2 plugin initialized");
    0
}

unsafe extern "C" fn remove(_owner: *const c_void, _arg: *mut c_void, slot: *mut *mut c_void) -> c_int {
    let taken = {
        let _slot = SLOT_LOCK.lock();
        state::take::<Arc<Series2State>>(slot)
    };
    match taken {
        Some(state) => {
            tracing::debug!(ticks = state.ticks.load(Ordering::Relaxed), "Series2 plugin removed");
            0
        }
        None => -1,
    }
}

unsafe extern "C" fn heartbeat(
    _owner: *const c_void,
    _arg: *mut c_void,
    slot: *mut *mut c_void,
    signal: *const TaskSignal,
) {
    let state = {
        let _slot = SLOT_LOCK.lock();
        state::get::<Arc<Series2State>>(slot).cloned()
    };
    let (Some(state), Some(signal)) = (state, TaskSignal::from_ptr(signal)) else {
        return;
    };
    while !signal.wait_timeout(state.heartbeat) {
        state.ticks.fetch_add(1, Ordering::Relaxed);
    }
}

static MODES: [CapabilityDescriptor; 1] = [CapabilityDescriptor::new(c"Series2", 1)
    .with_data(&SERIES2_MODE as *const Series2Mode as *const c_void)];

export_plugin!(PluginFeatures::new()
    .with_init(init)
    .with_remove(remove)
    .with_task(heartbeat, TASK_MODE_RUN_ONCE)
    .with_capabilities(&MODES));
