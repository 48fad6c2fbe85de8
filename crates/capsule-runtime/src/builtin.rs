//! Units compiled into the runtime itself.
//!
//! Builtins are consulted before any finder, so they cannot be shadowed by
//! artifacts on disk.

use crate::unit::{LoadedUnit, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Populates a freshly registered builtin unit.
pub type BuiltinInit = fn(&LoadedUnit);

/// Table of builtin units by qualified name.
#[derive(Clone, Default)]
pub struct BuiltinTable {
    entries: BTreeMap<String, BuiltinInit>,
}

impl fmt::Debug for BuiltinTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

impl BuiltinTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// The table every runtime starts with: just `sys`.
    pub fn standard() -> Self {
        let mut table = Self::new();
        table.register("sys", init_sys);
        table
    }

    pub fn register(&mut self, name: impl Into<String>, init: BuiltinInit) {
        self.entries.insert(name.into(), init);
    }

    pub fn get(&self, name: &str) -> Option<BuiltinInit> {
        self.entries.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Sorted builtin names.
    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }
}

fn init_sys(unit: &LoadedUnit) {
    unit.set_attr("platform", Value::Str(std::env::consts::OS.to_string()));
    unit.set_attr("arch", Value::Str(std::env::consts::ARCH.to_string()));
    unit.set_attr(
        "version",
        Value::Str(env!("CARGO_PKG_VERSION").to_string()),
    );
}
