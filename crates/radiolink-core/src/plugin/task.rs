//! Background tasks provided by plugins.

use std::ffi::c_void;
use std::sync::Arc;

use radiolink_plugin_sdk::TaskSignal;
use tracing::debug;

use super::loader::LoadedModule;
use super::record::{PluginRecord, StateSlot, TaskMode};
use super::PluginArg;
use crate::error::{Error, Result};
use crate::instance::Instance;
use crate::supervisor::MonitorHandle;

/// A running plugin task and how to stop it.
#[derive(Debug)]
pub(crate) enum PluginTask {
    /// Detached thread; stopping only requests cancellation.
    RunOnce { signal: Arc<TaskSignal> },
    /// Monitored by the owner's supervisor; stopping waits for the thread.
    Supervised { handle: MonitorHandle },
}

/// Everything the task body touches, kept alive for as long as it runs.
struct TaskContext {
    module: Arc<LoadedModule>,
    state: Arc<StateSlot>,
    arg: PluginArg,
    owner: *const c_void,
}

// SAFETY: `owner` is only handed back to the plugin, never dereferenced here.
unsafe impl Send for TaskContext {}

impl TaskContext {
    fn run(&self, signal: &TaskSignal) {
        if let Some(task) = self.module.features().task {
            // SAFETY: the module stays open through `self.module`, and the
            // state slot through `self.state`.
            unsafe { task(self.owner, self.arg.as_ptr(), self.state.as_ptr(), signal) };
        }
    }
}

fn thread_name(record: &PluginRecord) -> String {
    let stem = record
        .path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "plugin".to_string());
    format!("plugin:{stem}")
}

impl PluginTask {
    /// Start the record's task in `mode`.
    pub(crate) fn start(record: &PluginRecord, mode: TaskMode, owner: Option<&Instance>) -> Result<Self> {
        let ctx = TaskContext {
            module: record.module.clone(),
            state: record.state.clone(),
            arg: record.arg,
            owner: record.owner_ptr(),
        };
        let name = thread_name(record);

        match mode {
            TaskMode::SupervisedRestart => {
                let owner = owner.ok_or_else(|| Error::invalid("supervised task requires an owner"))?;
                let handle = owner.supervisor().start(&name, move |signal| ctx.run(signal))?;
                debug!(path = %record.path.display(), "Supervised plugin task started");
                Ok(PluginTask::Supervised { handle })
            }
            TaskMode::RunOnce => {
                let signal = Arc::new(TaskSignal::new());
                let task_signal = signal.clone();
                std::thread::Builder::new()
                    .name(name)
                    .spawn(move || ctx.run(&task_signal))
                    .map_err(Error::Thread)?;
                debug!(path = %record.path.display(), "Run-once plugin task started");
                Ok(PluginTask::RunOnce { signal })
            }
        }
    }

    /// Stop the task. Supervised tasks need the owner that started them.
    pub(crate) fn stop(&self, owner: Option<&Instance>) -> Result<()> {
        match self {
            PluginTask::RunOnce { signal } => {
                signal.cancel();
                Ok(())
            }
            PluginTask::Supervised { handle } => {
                let owner = owner.ok_or_else(|| Error::invalid("owner of supervised task is gone"))?;
                owner.supervisor().stop(*handle)
            }
        }
    }
}
