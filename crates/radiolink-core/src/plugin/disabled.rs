//! Plugin operations when the `plugins` feature is off.

use std::path::Path;
use std::sync::Arc;

use super::PluginArg;
use crate::error::{Error, Result};
use crate::instance::Instance;

/// Never constructed without plugin support.
#[derive(Debug)]
pub enum PluginRecord {}

/// Never constructed without plugin support.
#[derive(Debug, Clone)]
pub enum NamedCapability {}

impl NamedCapability {
    pub fn name(&self) -> &str {
        match *self {}
    }
}

pub fn load(_path: impl AsRef<Path>, _owner: Option<&Arc<Instance>>, _arg: PluginArg) -> Result<()> {
    Err(Error::NotImplemented)
}

pub fn unload(_path: impl AsRef<Path>, _owner: Option<&Arc<Instance>>) -> Result<()> {
    Err(Error::NotImplemented)
}

pub fn force_unload(_record: &Arc<PluginRecord>, _accept_shutdown: bool) -> Result<()> {
    Err(Error::NotImplemented)
}

pub fn find_named_capability(_name: &str) -> Option<NamedCapability> {
    None
}

pub(crate) fn release_owned(record: &Arc<PluginRecord>, _owner: &Instance) -> Result<()> {
    match **record {}
}
