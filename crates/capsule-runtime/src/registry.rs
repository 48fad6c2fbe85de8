//! Process-wide table of loaded units.
//!
//! The registry maps fully qualified names to units. A unit is inserted
//! before its initialization code runs, so a circular import observes the
//! partially initialized unit instead of loading it twice.

use crate::finder::ArtifactKind;
use crate::unit::{LoadedUnit, UnitRef};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Summary of one registered unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitInfo {
    pub name: String,
    pub origin: Option<String>,
    pub kind: Option<ArtifactKind>,
    pub is_namespace_container: bool,
}

/// Registry of loaded units.
#[derive(Debug, Default)]
pub struct UnitRegistry {
    units: Mutex<HashMap<String, UnitRef>>,
}

impl UnitRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a unit by qualified name.
    pub fn get(&self, name: &str) -> Option<UnitRef> {
        self.units.lock().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.units.lock().contains_key(name)
    }

    /// Insert a unit, replacing any previous entry of the same name.
    pub fn insert(&self, unit: UnitRef) -> Option<UnitRef> {
        let name = unit.name().to_string();
        debug!("Registered unit {}", name);
        self.units.lock().insert(name, unit)
    }

    /// Return the existing unit, or register a fresh one.
    ///
    /// The flag is `true` when the unit was created by this call.
    pub fn get_or_create(&self, name: &str) -> (UnitRef, bool) {
        let mut units = self.units.lock();
        if let Some(existing) = units.get(name) {
            return (Arc::clone(existing), false);
        }
        let unit = LoadedUnit::new_ref(name);
        units.insert(name.to_string(), Arc::clone(&unit));
        debug!("Registered unit {}", name);
        (unit, true)
    }

    /// Remove a unit. Outstanding references keep it alive.
    pub fn evict(&self, name: &str) -> Option<UnitRef> {
        let removed = self.units.lock().remove(name);
        if removed.is_some() {
            info!("Evicted unit {}", name);
        }
        removed
    }

    /// Sorted qualified names.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.units.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Summaries of all units, sorted by name.
    pub fn list_units(&self) -> Vec<UnitInfo> {
        let units: Vec<UnitRef> = self.units.lock().values().cloned().collect();
        let mut infos: Vec<UnitInfo> = units
            .iter()
            .map(|unit| {
                let state = unit.state();
                UnitInfo {
                    name: unit.name().to_string(),
                    origin: state.origin,
                    kind: state.kind,
                    is_namespace_container: state.is_namespace_container,
                }
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    pub fn len(&self) -> usize {
        self.units.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.lock().is_empty()
    }
}
