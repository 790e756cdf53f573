//! Named capability lookup across loaded plugins.

use std::ffi::c_void;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use super::loader::LoadedModule;
use super::record::PluginRecord;

/// A capability found in a loaded module.
///
/// Holds a reference to the module, so `data` stays valid for the lifetime
/// of this value.
#[derive(Clone)]
pub struct NamedCapability {
    name: String,
    version: u32,
    data: *const c_void,
    module: Arc<LoadedModule>,
}

// SAFETY: `data` points into immutable module memory kept mapped by `module`.
unsafe impl Send for NamedCapability {}
unsafe impl Sync for NamedCapability {}

impl NamedCapability {
    /// Name as the module spells it.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// The module's opaque payload for this capability.
    pub fn data(&self) -> *const c_void {
        self.data
    }

    /// Canonical path of the module that advertises it.
    pub fn module_path(&self) -> &Path {
        self.module.path()
    }
}

impl fmt::Debug for NamedCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedCapability")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("module", &self.module.path())
            .finish()
    }
}

pub(crate) fn find(records: &[Arc<PluginRecord>], name: &str) -> Option<NamedCapability> {
    records.iter().find_map(|record| {
        let features = record.module.features();
        // SAFETY: validated when the module was opened
        let caps = unsafe { features.capabilities() };
        caps.iter().find_map(|cap| {
            let cap_name = unsafe { cap.name() }?;
            if !cap_name.to_bytes().eq_ignore_ascii_case(name.as_bytes()) {
                return None;
            }
            Some(NamedCapability {
                name: cap_name.to_string_lossy().into_owned(),
                version: cap.version,
                data: cap.data,
                module: record.module.clone(),
            })
        })
    })
}
