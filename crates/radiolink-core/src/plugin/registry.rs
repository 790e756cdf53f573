//! Plugin registry.
//!
//! The registry holds every loaded [`PluginRecord`] in load order. Records
//! with an owner are also kept in that instance's own collection; the
//! registry lock is always taken before the instance's.

use std::path::Path;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use super::loader::{ModuleLoader, NativeLoader};
use super::lookup::{self, NamedCapability};
use super::record::{PluginInfo, PluginRecord};
use super::{lifecycle, path, PluginArg};
use crate::config::PluginConfig;
use crate::error::{Error, Result};
use crate::instance::Instance;

static GLOBAL: Lazy<PluginRegistry> =
    Lazy::new(|| PluginRegistry::new(Arc::new(NativeLoader::new()), PluginConfig::from_env()));

#[derive(Default)]
struct RegistryState {
    records: Vec<Arc<PluginRecord>>,
    closed: bool,
}

/// State shared between a registry and the records it created.
#[derive(Default)]
pub(crate) struct RegistryShared {
    state: Mutex<RegistryState>,
}

impl RegistryShared {
    /// Insert `record` unless an equal `(owner, path)` pair is already present.
    pub(crate) fn insert(&self, record: &Arc<PluginRecord>, owner: Option<&Instance>) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(Error::RegistryUnavailable);
        }
        if state
            .records
            .iter()
            .any(|r| r.matches(&record.path, record.owner_id))
        {
            return Err(Error::InUse(record.path.clone()));
        }

        state.records.push(record.clone());
        if let Some(owner) = owner {
            owner.attach(record.clone());
        }
        Ok(())
    }

    /// Remove `record` from the registry and from `owner`'s collection.
    pub(crate) fn remove(&self, record: &Arc<PluginRecord>, owner: Option<&Instance>) {
        let mut state = self.state.lock();
        state.records.retain(|r| !Arc::ptr_eq(r, record));
        if let Some(owner) = owner {
            owner.detach(record);
        }
    }

    pub(crate) fn find(&self, path: &Path, owner_id: Option<Uuid>) -> Option<Arc<PluginRecord>> {
        self.state
            .lock()
            .records
            .iter()
            .find(|r| r.matches(path, owner_id))
            .cloned()
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<PluginRecord>> {
        self.state.lock().records.clone()
    }
}

/// A set of loaded plugins and the loader that opens them.
///
/// Cloning yields another handle to the same registry.
#[derive(Clone)]
pub struct PluginRegistry {
    shared: Arc<RegistryShared>,
    loader: Arc<dyn ModuleLoader>,
    config: Arc<PluginConfig>,
}

impl PluginRegistry {
    pub fn new(loader: Arc<dyn ModuleLoader>, config: PluginConfig) -> Self {
        Self {
            shared: Arc::new(RegistryShared::default()),
            loader,
            config: Arc::new(config),
        }
    }

    /// The process-wide registry, created on first use.
    pub fn global() -> &'static PluginRegistry {
        &GLOBAL
    }

    /// The process-wide registry, if anything has created it yet.
    pub fn try_global() -> Option<&'static PluginRegistry> {
        Lazy::get(&GLOBAL)
    }

    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    pub(crate) fn loader(&self) -> &dyn ModuleLoader {
        self.loader.as_ref()
    }

    pub(crate) fn shared(&self) -> &Arc<RegistryShared> {
        &self.shared
    }

    /// Number of loaded records.
    pub fn len(&self) -> usize {
        self.shared.state.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the registry has been shut down.
    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// All loaded records, in load order.
    pub fn records(&self) -> Vec<Arc<PluginRecord>> {
        self.shared.snapshot()
    }

    /// Snapshots of all loaded records, in load order.
    pub fn list(&self) -> Vec<PluginInfo> {
        self.records().iter().map(|r| r.info()).collect()
    }

    /// The record loaded from `path` for `owner`, if any.
    pub fn find(&self, path: impl AsRef<Path>, owner: Option<&Arc<Instance>>) -> Option<Arc<PluginRecord>> {
        let canonical = path::canonicalize(path.as_ref()).ok()?;
        self.shared.find(&canonical, owner.map(|o| o.id()))
    }

    pub fn contains(&self, path: impl AsRef<Path>, owner: Option<&Arc<Instance>>) -> bool {
        self.find(path, owner).is_some()
    }

    /// Load the plugin at `path` for `owner` (or globally).
    pub fn load(&self, path: impl AsRef<Path>, owner: Option<&Arc<Instance>>, arg: PluginArg) -> Result<()> {
        lifecycle::load(self, path.as_ref(), owner, arg)
    }

    /// Unload the plugin at `path` for `owner`. Unloading something that is
    /// not loaded succeeds.
    pub fn unload(&self, path: impl AsRef<Path>, owner: Option<&Arc<Instance>>) -> Result<()> {
        lifecycle::unload(self, path.as_ref(), owner)
    }

    /// Tear down a specific record.
    pub fn force_unload(&self, record: &Arc<PluginRecord>, accept_shutdown: bool) -> Result<()> {
        lifecycle::force_unload(record, accept_shutdown)
    }

    /// First capability named `name` (ASCII case-insensitive), in load order.
    pub fn find_named_capability(&self, name: &str) -> Option<NamedCapability> {
        lookup::find(&self.records(), name)
    }

    /// Unload every record and refuse later loads.
    pub fn shutdown(&self) {
        let records = {
            let mut state = self.shared.state.lock();
            state.closed = true;
            state.records.clone()
        };

        for record in &records {
            if let Err(e) = lifecycle::force_unload(record, true) {
                warn!(path = %record.path.display(), error = %e, "Plugin left loaded at registry shutdown");
            }
        }
        info!(count = records.len(), "Plugin registry shut down");
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("len", &self.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
