// ABOUTME: Loader for the built-in platform table embedded as JSON.
// ABOUTME: Provides load_builtin_registry() to build the default PlatformRegistry.

use crate::platform::registry::PlatformRegistry;
use crate::platform::PlatformSpec;

/// Embedded JSON containing the built-in platform records, in resolution order.
const BUILTIN_PLATFORMS_JSON: &str = include_str!("../../data/platforms.json");

/// Parse the built-in platform records.
///
/// # Panics
///
/// Panics if the embedded JSON is malformed or cannot be deserialized.
pub fn builtin_platform_specs() -> Vec<PlatformSpec> {
    serde_json::from_str(BUILTIN_PLATFORMS_JSON).expect("failed to parse builtin platforms")
}

/// Loads the built-in platform registry.
///
/// # Panics
///
/// Panics if the embedded JSON is malformed or cannot be deserialized.
pub fn load_builtin_registry() -> PlatformRegistry {
    let mut registry = PlatformRegistry::new();
    for spec in builtin_platform_specs() {
        registry.register(spec);
    }
    registry
}
