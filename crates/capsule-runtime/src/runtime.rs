//! The runtime: registry, builtins and the resolution chain.
//!
//! Importing a dotted name imports every parent first. Children are looked
//! up in their parent's search locations; a parent that is not a container
//! cannot have children. Lookups consult builtins, then each finder in
//! chain order, and the first finder to return a resolution wins.

use crate::builtin::BuiltinTable;
use crate::dirfd::ArtifactFile;
use crate::error::{LoaderError, LoaderResult};
use crate::finder::{Finder, Resolution};
use crate::reclaim::ReclamationGate;
use crate::registry::UnitRegistry;
use crate::unit::{short_name, UnitRef, Value};
use libloading::os::unix::Library;
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Something that can import units by qualified name.
///
/// Unit initialization code imports through this trait, which lets the
/// runtime re-enter itself for nested and circular imports.
pub trait Importer {
    fn import(&self, name: &str) -> LoaderResult<UnitRef>;
}

/// A unit runtime with its own registry and resolution chain.
pub struct Runtime {
    registry: Arc<UnitRegistry>,
    finders: RwLock<Vec<Arc<dyn Finder>>>,
    builtins: BuiltinTable,
    reclamation: Arc<ReclamationGate>,
    import_lock: ReentrantMutex<()>,
    libraries: Mutex<Vec<LinkedLibrary>>,
}

/// A linked library and the descriptor it was linked from.
///
/// The descriptor stays open while the library is loaded: on Linux the
/// library is known to the dynamic linker as `/proc/self/fd/N`, and a
/// reused `N` would make a later load return this library again.
struct LinkedLibrary {
    _library: Library,
    _file: ArtifactFile,
}

impl Runtime {
    /// A runtime with the standard builtins and an empty chain.
    pub fn new() -> Self {
        Self::with_builtins(BuiltinTable::standard())
    }

    pub fn with_builtins(builtins: BuiltinTable) -> Self {
        Self {
            registry: Arc::new(UnitRegistry::new()),
            finders: RwLock::new(Vec::new()),
            builtins,
            reclamation: Arc::new(ReclamationGate::new()),
            import_lock: ReentrantMutex::new(()),
            libraries: Mutex::new(Vec::new()),
        }
    }

    pub fn registry(&self) -> &UnitRegistry {
        &self.registry
    }

    /// Shared handle on the registry, for code outliving a borrow of the runtime.
    pub fn shared_registry(&self) -> Arc<UnitRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn builtins(&self) -> &BuiltinTable {
        &self.builtins
    }

    pub fn reclamation(&self) -> &ReclamationGate {
        &self.reclamation
    }

    /// Shared handle on the reclamation gate, published to native initializers.
    pub fn shared_reclamation(&self) -> Arc<ReclamationGate> {
        Arc::clone(&self.reclamation)
    }

    /// Append a finder to the end of the chain.
    pub fn push_finder(&self, finder: Arc<dyn Finder>) {
        info!("Installed finder {}", finder);
        self.finders.write().push(finder);
    }

    /// Replace the whole chain, returning the previous one.
    pub fn replace_finders(&self, finders: Vec<Arc<dyn Finder>>) -> Vec<Arc<dyn Finder>> {
        info!("Replacing resolution chain with {} finders", finders.len());
        std::mem::replace(&mut *self.finders.write(), finders)
    }

    /// Snapshot of the chain.
    pub fn finders(&self) -> Vec<Arc<dyn Finder>> {
        self.finders.read().clone()
    }

    /// Display strings of the chain, in order.
    pub fn finder_descriptions(&self) -> Vec<String> {
        self.finders.read().iter().map(|f| f.to_string()).collect()
    }

    /// Ask the chain for `name` without loading anything.
    pub fn find(
        &self,
        name: &str,
        search_path: Option<&[PathBuf]>,
    ) -> LoaderResult<Option<Resolution>> {
        for finder in self.finders() {
            if let Some(resolution) = finder.find(name, search_path)? {
                debug!("{} resolved {}", finder, name);
                return Ok(Some(resolution));
            }
        }
        Ok(None)
    }

    /// Remove a unit from the registry.
    pub fn evict(&self, name: &str) -> Option<UnitRef> {
        self.registry.evict(name)
    }

    /// Evict `names` in one reclamation pass.
    ///
    /// Returns the names that were registered and got evicted, or `None`
    /// when a native load currently has reclamation suspended.
    pub fn reclaim(&self, names: &[String]) -> Option<Vec<String>> {
        let mut evicted = Vec::new();
        let ran = self.reclamation.try_reclaim(|| {
            evicted = names
                .iter()
                .filter(|name| self.registry.evict(name).is_some())
                .cloned()
                .collect();
        });
        if !ran {
            return None;
        }
        info!("Reclaimed {} of {} units", evicted.len(), names.len());
        Some(evicted)
    }

    /// Keep a linked library and its descriptor alive for the lifetime of the runtime.
    pub(crate) fn retain_library(&self, library: Library, file: ArtifactFile) {
        self.libraries.lock().push(LinkedLibrary {
            _library: library,
            _file: file,
        });
    }

    /// Number of native libraries linked so far.
    pub fn linked_libraries(&self) -> usize {
        self.libraries.lock().len()
    }

    fn import_unlocked(&self, name: &str) -> LoaderResult<UnitRef> {
        if let Some(existing) = self.registry.get(name) {
            return Ok(existing);
        }

        let (parent, search_path) = match name.rsplit_once('.') {
            Some((parent_name, _)) => {
                let parent = self.import_unlocked(parent_name)?;
                // the parent's initializer may have imported us already
                if let Some(existing) = self.registry.get(name) {
                    return Ok(existing);
                }
                if !parent.is_namespace_container() {
                    return Err(LoaderError::MissingArtifact(format!(
                        "{} ({} is not a container)",
                        name, parent_name
                    )));
                }
                let locations = parent.search_locations();
                (Some(parent), Some(locations))
            }
            None => (None, None),
        };

        let unit = match self.builtins.get(name) {
            Some(init) => {
                let (unit, _) = self.registry.get_or_create(name);
                unit.bind_metadata(None, None, None);
                init(&unit);
                info!("Loaded builtin unit {}", name);
                unit
            }
            None => self.load_from_chain(name, search_path.as_deref())?,
        };

        if let Some(parent) = parent {
            parent.set_attr(short_name(name), Value::Unit(name.to_string()));
        }
        Ok(unit)
    }

    fn load_from_chain(&self, name: &str, search_path: Option<&[PathBuf]>) -> LoaderResult<UnitRef> {
        let resolution = self
            .find(name, search_path)?
            .ok_or_else(|| LoaderError::MissingArtifact(name.to_string()))?;

        match resolution {
            Resolution::Artifact { artifact, loader } => {
                match loader.load(self, &artifact) {
                    Ok(unit) => Ok(unit),
                    Err(e) => {
                        warn!("Failed to load {}: {}", name, e);
                        self.registry.evict(name);
                        Err(e)
                    }
                }
            }
            Resolution::Namespace {
                qualified_name,
                search_locations,
            } => {
                let (unit, _) = self.registry.get_or_create(&qualified_name);
                unit.bind_metadata(None, None, Some(search_locations));
                info!("Created namespace unit {}", qualified_name);
                Ok(unit)
            }
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Importer for Runtime {
    fn import(&self, name: &str) -> LoaderResult<UnitRef> {
        validate_name(name)?;
        let _guard = self.import_lock.lock();
        self.import_unlocked(name)
    }
}

/// Dotted names are non-empty identifier segments.
fn validate_name(name: &str) -> LoaderResult<()> {
    let valid = !name.is_empty()
        && name.split('.').all(|segment| {
            !segment.is_empty()
                && !segment.contains(['/', '\\', '\0'])
                && segment.chars().all(|c| !c.is_whitespace())
        });
    if valid {
        Ok(())
    } else {
        Err(LoaderError::BadPath(format!("invalid unit name '{}'", name)))
    }
}
