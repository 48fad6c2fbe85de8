//! Native library units.
//!
//! A native unit is a shared library exporting `capsule_init_<short name>`.
//! The entry point takes no arguments and registers its unit through the
//! host functions in [`abi`], which find the qualified name in the
//! thread-local [`context`].

pub mod abi;
pub mod context;
pub mod dl;

/// Prefix of every native entry point symbol.
pub const ENTRY_POINT_PREFIX: &str = "capsule_init_";

/// Entry point symbol for a unit's short name.
pub fn entry_point_symbol(short_name: &str) -> String {
    format!("{}{}", ENTRY_POINT_PREFIX, short_name)
}
