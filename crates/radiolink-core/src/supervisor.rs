//! Monitored threads owned by an instance.
//!
//! A monitored thread runs its task in a loop: when the task returns or panics
//! without having been asked to stop, the monitor waits for the configured
//! restart delay and runs it again. Stopping cancels the task's
//! [`TaskSignal`] and joins the monitor thread.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use radiolink_plugin_sdk::TaskSignal;
use tracing::{debug, error, warn};

use crate::config::SupervisorConfig;
use crate::error::{Error, Result};

/// Handle to a monitored thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MonitorHandle(u64);

struct Monitored {
    name: String,
    signal: Arc<TaskSignal>,
    restarts: Arc<AtomicU32>,
    thread: JoinHandle<()>,
}

/// Starts, restarts and stops monitored threads.
pub struct ThreadSupervisor {
    config: SupervisorConfig,
    threads: Mutex<HashMap<MonitorHandle, Monitored>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl ThreadSupervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        Self {
            config,
            threads: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Start `task` under supervision.
    ///
    /// The task receives the thread's cancellation signal and should return
    /// soon after it is cancelled. Fails once the supervisor is closed.
    pub fn start<F>(&self, name: &str, task: F) -> Result<MonitorHandle>
    where
        F: FnMut(&TaskSignal) + Send + 'static,
    {
        if self.is_closed() {
            return Err(Error::Thread(std::io::Error::other(format!(
                "supervisor closed, cannot start {name}"
            ))));
        }
        let handle = MonitorHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        let signal = Arc::new(TaskSignal::new());
        let restarts = Arc::new(AtomicU32::new(0));

        let thread = std::thread::Builder::new()
            .name(format!("monitor:{name}"))
            .spawn({
                let name = name.to_string();
                let signal = signal.clone();
                let restarts = restarts.clone();
                let config = self.config.clone();
                move || monitor_loop(&name, task, &signal, &restarts, &config)
            })
            .map_err(Error::Thread)?;

        debug!(thread = name, "Monitored thread started");
        self.threads.lock().insert(
            handle,
            Monitored {
                name: name.to_string(),
                signal,
                restarts,
                thread,
            },
        );
        Ok(handle)
    }

    /// Stop a monitored thread and wait for it to exit.
    pub fn stop(&self, handle: MonitorHandle) -> Result<()> {
        let monitored = self
            .threads
            .lock()
            .remove(&handle)
            .ok_or_else(|| Error::NotExists(format!("monitored thread {}", handle.0)))?;
        join(monitored);
        Ok(())
    }

    /// Stop every monitored thread.
    pub fn stop_all(&self) {
        let threads: Vec<Monitored> = self.threads.lock().drain().map(|(_, m)| m).collect();
        for monitored in threads {
            join(monitored);
        }
    }

    /// Stop every monitored thread and refuse later starts.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.stop_all();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of monitored threads that have not been stopped.
    pub fn len(&self) -> usize {
        self.threads.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// How often the task behind `handle` has been restarted.
    pub fn restarts(&self, handle: MonitorHandle) -> Option<u32> {
        self.threads
            .lock()
            .get(&handle)
            .map(|m| m.restarts.load(Ordering::Relaxed))
    }
}

impl Drop for ThreadSupervisor {
    fn drop(&mut self) {
        self.stop_all();
    }
}

fn join(monitored: Monitored) {
    monitored.signal.cancel();
    if monitored.thread.join().is_err() {
        error!(thread = %monitored.name, "Monitor thread panicked");
    }
    debug!(thread = %monitored.name, "Monitored thread stopped");
}

fn monitor_loop<F>(
    name: &str,
    mut task: F,
    signal: &TaskSignal,
    restarts: &AtomicU32,
    config: &SupervisorConfig,
) where
    F: FnMut(&TaskSignal),
{
    loop {
        if signal.is_cancelled() {
            return;
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| task(signal)));
        if signal.is_cancelled() {
            return;
        }

        match outcome {
            Ok(()) => warn!(thread = name, "Monitored task exited unexpectedly"),
            Err(payload) => {
                error!(thread = name, panic = panic_message(&*payload), "Monitored task panicked")
            }
        }

        let count = restarts.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(max) = config.max_restarts {
            if count > max {
                error!(thread = name, restarts = max, "Restart limit reached, giving up");
                return;
            }
        }

        if signal.wait_timeout(config.restart_delay()) {
            return;
        }
        debug!(thread = name, restart = count, "Restarting monitored task");
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}
