//! Cooperative cancellation for plugin tasks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Polling step used by [`TaskSignal::wait_timeout`].
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Cancellation flag shared between the host and a running plugin task.
///
/// The host owns the signal and hands the task a pointer to it. A task must
/// check [`is_cancelled`](Self::is_cancelled) regularly and return once it is set.
#[repr(C)]
#[derive(Debug, Default)]
pub struct TaskSignal {
    cancelled: AtomicBool,
}

impl TaskSignal {
    pub const fn new() -> Self {
        Self {
            cancelled: AtomicBool::new(false),
        }
    }

    /// Request the task to stop.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Sleep up to `timeout`, waking early on cancellation.
    ///
    /// Returns `true` if the signal was cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_cancelled() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep(POLL_INTERVAL.min(deadline - now));
        }
    }

    /// Borrow the signal behind a raw pointer received over the plugin ABI.
    ///
    /// # Safety
    /// `ptr` must be null or point to a signal that outlives the returned reference.
    pub unsafe fn from_ptr<'a>(ptr: *const TaskSignal) -> Option<&'a TaskSignal> {
        ptr.as_ref()
    }
}
