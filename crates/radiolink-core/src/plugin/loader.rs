//! Opening plugin modules and reading their capability tables.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use parking_lot::RwLock;
use radiolink_plugin_sdk::{PluginFeatures, FEATURES_SYMBOL};
use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};

#[cfg(unix)]
type Library = libloading::os::unix::Library;
#[cfg(not(unix))]
type Library = libloading::Library;

/// Opens a module at a canonical path and returns its validated table.
pub trait ModuleLoader: Send + Sync {
    fn open(&self, path: &Path) -> Result<LoadedModule>;
}

/// How the module came to be mapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Residency {
    /// It was already resident in the process; the handle is an extra reference.
    Shared,
    /// Mapped by this open, pinned against unmapping.
    Fresh,
    /// Linked into the host binary.
    Static,
}

/// An opened module with a validated capability table.
///
/// Dropping the last reference closes the library handle. On unix the
/// mapping itself stays resident, so code a detached task is still running
/// is never unmapped underneath it.
pub struct LoadedModule {
    path: PathBuf,
    features: NonNull<PluginFeatures>,
    residency: Residency,
    _library: Option<Library>,
}

// SAFETY: the capability table is immutable static data and the library
// handle is only closed on drop.
unsafe impl Send for LoadedModule {}
unsafe impl Sync for LoadedModule {}

impl LoadedModule {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn residency(&self) -> Residency {
        self.residency
    }

    pub fn features(&self) -> &PluginFeatures {
        // SAFETY: validated at open and kept mapped by the library handle
        unsafe { self.features.as_ref() }
    }
}

impl fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedModule")
            .field("path", &self.path)
            .field("residency", &self.residency)
            .finish_non_exhaustive()
    }
}

fn validated(path: &Path, features: *const PluginFeatures) -> Result<NonNull<PluginFeatures>> {
    let features = NonNull::new(features as *mut PluginFeatures)
        .ok_or_else(|| Error::open_failed(path, "capability table is null"))?;
    // SAFETY: non-null pointer to the exported static
    unsafe { features.as_ref() }
        .validate()
        .map_err(|e| Error::open_failed(path, e))?;
    Ok(features)
}

/// Loads shared libraries from disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeLoader;

impl NativeLoader {
    pub fn new() -> Self {
        Self
    }
}

impl ModuleLoader for NativeLoader {
    fn open(&self, path: &Path) -> Result<LoadedModule> {
        let (library, residency) = open_library(path)?;

        // Any early return below drops `library`, which closes the handle.
        let features = unsafe {
            let symbol = library
                .get::<*const PluginFeatures>(FEATURES_SYMBOL)
                .map_err(|e| Error::open_failed(path, e))?;
            *symbol
        };
        let features = validated(path, features)?;

        debug!(path = %path.display(), ?residency, "Opened plugin module");
        Ok(LoadedModule {
            path: path.to_path_buf(),
            features,
            residency,
            _library: Some(library),
        })
    }
}

#[cfg(unix)]
fn open_library(path: &Path) -> Result<(Library, Residency)> {
    use libloading::os::unix::{RTLD_LAZY, RTLD_LOCAL};

    // SAFETY: RTLD_NOLOAD never runs initializers; it only bumps the refcount
    // of a module that is already mapped.
    if let Ok(library) = unsafe { Library::open(Some(path), RTLD_LAZY | RTLD_LOCAL | libc::RTLD_NOLOAD) } {
        return Ok((library, Residency::Shared));
    }

    // SAFETY: loading a plugin runs its initializers; plugins are trusted code.
    unsafe { Library::open(Some(path), RTLD_LAZY | RTLD_LOCAL | libc::RTLD_NODELETE) }
        .map(|library| (library, Residency::Fresh))
        .map_err(|e| Error::open_failed(path, e))
}

#[cfg(not(unix))]
fn open_library(path: &Path) -> Result<(Library, Residency)> {
    // The platform loader refcounts modules by path; a second open of a
    // resident module returns the same mapping.
    unsafe { Library::new(path) }
        .map(|library| (library, Residency::Fresh))
        .map_err(|e| Error::open_failed(path, e))
}

/// Serves capability tables linked into the host binary.
///
/// Tables are registered under a path; that path is canonicalized, so it
/// must exist on disk (the file contents are never read).
#[derive(Default)]
pub struct StaticLoader {
    modules: RwLock<HashMap<PathBuf, &'static PluginFeatures>>,
}

impl StaticLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `features` under `path`.
    pub fn register(&self, path: impl AsRef<Path>, features: &'static PluginFeatures) -> Result<()> {
        let path = super::path::canonicalize(path.as_ref())?;
        self.modules.write().insert(path, features);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.modules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ModuleLoader for StaticLoader {
    fn open(&self, path: &Path) -> Result<LoadedModule> {
        let features = self
            .modules
            .read()
            .get(path)
            .copied()
            .ok_or_else(|| Error::open_failed(path, "no static module registered at this path"))?;
        let features = validated(path, features)?;

        Ok(LoadedModule {
            path: path.to_path_buf(),
            features,
            residency: Residency::Static,
            _library: None,
        })
    }
}
