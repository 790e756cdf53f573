//! Load and unload sequences.
//!
//! Loading walks a fixed sequence of stages; a failure at any stage unwinds
//! exactly the stages already completed. Unloading is the reverse: stop the
//! task, deregister, run `remove`, release the module.

use std::path::Path;
use std::sync::Arc;

use scopeguard::ScopeGuard;
use tracing::{debug, error, info, warn};

use super::path;
use super::record::{PluginRecord, TaskMode};
use super::registry::PluginRegistry;
use super::task::PluginTask;
use super::PluginArg;
use crate::error::{Error, Result};
use crate::instance::{HookSlot, Instance};

/// Load stages that need undoing on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Registered,
    Initialized,
}

fn check_owner(path: &Path, owner: &Instance) -> Result<()> {
    if owner.is_valid(false) {
        Ok(())
    } else {
        Err(Error::invalid(format!(
            "instance {} is not running (plugin {})",
            owner.id(),
            path.display()
        )))
    }
}

pub(crate) fn load(
    registry: &PluginRegistry,
    path: &Path,
    owner: Option<&Arc<Instance>>,
    arg: PluginArg,
) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(Error::MissingParam("path"));
    }
    if let Some(owner) = owner {
        check_owner(path, owner)?;
        match owner.load_hook() {
            HookSlot::Default => {}
            HookSlot::Disabled => return Err(Error::NotImplemented),
            HookSlot::Custom(hook) => return hook(path, owner, arg),
        }
    }

    let canonical = path::canonicalize(path)?;
    if !registry.config().is_path_allowed(&canonical) {
        return Err(Error::NotAllowed(canonical));
    }

    let owner_id = owner.map(|o| o.id());
    if registry.shared().find(&canonical, owner_id).is_some() {
        return Err(Error::InUse(canonical));
    }

    let module = registry.loader().open(&canonical).map_err(|e| {
        error!(path = %canonical.display(), error = %e, "Failed to open plugin");
        e
    })?;

    let record = Arc::new(PluginRecord::new(
        module,
        owner,
        arg,
        Arc::downgrade(registry.shared()),
    ));
    if record.task_mode == Some(TaskMode::SupervisedRestart) && owner.is_none() {
        return Err(Error::invalid(format!(
            "plugin {} needs an owning instance for its supervised task",
            canonical.display()
        )));
    }

    // Unloads that find the record before the load finishes wait on this
    // lock, then see it claimed if the load was rolled back.
    record.claim();
    let _loading = record.loading.lock();
    let owner_ref = owner.map(|o| o.as_ref());

    registry.shared().insert(&record, owner_ref)?;
    debug!(path = %canonical.display(), owner = ?owner_id, "Plugin registered");

    let mut stage = scopeguard::guard(Stage::Registered, |stage| {
        rollback(registry, &record, owner_ref, stage)
    });

    if let Some(init) = record.module.features().init {
        // SAFETY: hook from a validated table; the state slot lives in the record
        let rc = unsafe { init(record.owner_ptr(), record.arg.as_ptr(), record.state.as_ptr()) };
        if rc != 0 {
            error!(path = %canonical.display(), rc, "Plugin init failed");
            return Err(Error::Unknown(rc));
        }
    }
    *stage = Stage::Initialized;

    // The owner may have started shutting down while init ran.
    if let Some(owner) = owner_ref {
        check_owner(&canonical, owner).map_err(|e| {
            warn!(path = %canonical.display(), owner = %owner.id(), "Owner stopped during plugin load");
            e
        })?;
    }

    if let Some(mode) = record.task_mode {
        let task = PluginTask::start(&record, mode, owner_ref).map_err(|e| {
            error!(path = %canonical.display(), ?mode, error = %e, "Failed to start plugin task");
            e
        })?;
        *record.task.lock() = Some(task);
    }

    ScopeGuard::into_inner(stage);
    record.release_claim();
    info!(
        path = %canonical.display(),
        owner = ?owner_id,
        residency = ?record.residency(),
        "Plugin loaded"
    );
    Ok(())
}

fn rollback(registry: &PluginRegistry, record: &Arc<PluginRecord>, owner: Option<&Instance>, stage: Stage) {
    debug!(path = %record.path.display(), ?stage, "Rolling back plugin load");
    registry.shared().remove(record, owner);
    if stage == Stage::Initialized {
        run_remove(record);
    }
}

fn run_remove(record: &PluginRecord) {
    if let Some(remove) = record.module.features().remove {
        // SAFETY: hook from a validated table; the state slot lives in the record
        let rc = unsafe { remove(record.owner_ptr(), record.arg.as_ptr(), record.state.as_ptr()) };
        if rc != 0 {
            warn!(path = %record.path.display(), rc, "Plugin remove hook reported failure");
        }
    }
}

pub(crate) fn unload(registry: &PluginRegistry, path: &Path, owner: Option<&Arc<Instance>>) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(Error::MissingParam("path"));
    }
    if let Some(owner) = owner {
        check_owner(path, owner)?;
        match owner.unload_hook() {
            HookSlot::Default => {}
            HookSlot::Disabled => return Err(Error::NotImplemented),
            HookSlot::Custom(hook) => return hook(path, owner),
        }
    }

    let canonical = path::canonicalize(path)?;
    let owner_id = owner.map(|o| o.id());
    let Some(record) = registry.shared().find(&canonical, owner_id) else {
        debug!(path = %canonical.display(), owner = ?owner_id, "Plugin not loaded, nothing to unload");
        return Ok(());
    };

    teardown(&record, owner.map(|o| o.as_ref()), false)
}

pub(crate) fn force_unload(record: &Arc<PluginRecord>, accept_shutdown: bool) -> Result<()> {
    let owner = record.owner();
    teardown(record, owner.as_deref(), accept_shutdown)
}

/// Reverse a completed load.
///
/// `owner` is the record's owner, passed explicitly so an instance can tear
/// down its plugins while it is being dropped.
pub(crate) fn teardown(record: &Arc<PluginRecord>, owner: Option<&Instance>, accept_shutdown: bool) -> Result<()> {
    record.wait_loaded();
    if !record.claim() {
        debug!(path = %record.path.display(), "Plugin already unloaded or being unloaded");
        return Ok(());
    }
    let claim = scopeguard::guard((), |_| record.release_claim());

    {
        let mut task = record.task.lock();
        if let Some(running) = task.as_ref() {
            if matches!(running, PluginTask::Supervised { .. })
                && !owner.is_some_and(|o| o.is_valid(accept_shutdown))
            {
                return Err(Error::invalid(format!(
                    "owner of plugin {} is gone; its supervised task cannot be stopped",
                    record.path.display()
                )));
            }
            running.stop(owner)?;
            *task = None;
            debug!(path = %record.path.display(), "Plugin task stopped");
        }
    }

    match record.registry.upgrade() {
        Some(shared) => shared.remove(record, owner),
        None => {
            if let Some(owner) = owner {
                owner.detach(record);
            }
        }
    }

    run_remove(record);
    ScopeGuard::into_inner(claim);

    info!(path = %record.path.display(), owner = ?record.owner_id, "Plugin unloaded");
    Ok(())
}
