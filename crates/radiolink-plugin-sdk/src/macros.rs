//! Declarative macros for plugin development.

/// Export a capability table under the well-known symbol.
///
/// # Example
///
/// ```rust
/// use radiolink_plugin_sdk::prelude::*;
///
/// static MODES: [CapabilityDescriptor; 1] = [CapabilityDescriptor::new(c"series2", 1)];
///
/// export_plugin!(PluginFeatures::new().with_capabilities(&MODES));
/// ```
#[macro_export]
macro_rules! export_plugin {
    ($features:expr) => {
        #[no_mangle]
        #[allow(non_upper_case_globals)]
        pub static radiolink_plugin_features: $crate::PluginFeatures = $features;
    };
}
