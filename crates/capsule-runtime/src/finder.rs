//! Finding artifacts for dotted unit names.
//!
//! A [`NamespaceFinder`] owns one root [`DirectoryHandle`] and answers
//! lookups relative to it, or relative to subdirectories of it named by a
//! parent container's search locations. Candidates are probed in a fixed
//! kind priority:
//!
//! 1. native libraries (`.so`)
//! 2. source units (`.src`)
//! 3. compiled caches (`.cache`)
//!
//! Within one directory the first kind that exists wins, whether it is a
//! flat file or a container initializer; for the same kind the flat file
//! is tried first. Across several candidate directories the first
//! directory with any match wins.

use crate::dirfd::{absolute_name, DirectoryHandle};
use crate::error::{LoaderError, LoaderResult};
use crate::loader::Loader;
use crate::rights::RightsLimiter;
use crate::unit::short_name;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// The kind of artifact backing a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Shared library with a native entry point.
    NativeLibrary,
    /// Source text.
    Source,
    /// Precompiled body with a cache header.
    CompiledCache,
}

/// Filename suffixes per artifact kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuffixRules {
    /// Native library suffixes.
    #[serde(default = "default_native")]
    pub native: Vec<String>,

    /// Source suffixes.
    #[serde(default = "default_source")]
    pub source: Vec<String>,

    /// Compiled cache suffixes.
    #[serde(default = "default_compiled")]
    pub compiled: Vec<String>,

    /// File stem of a container's initializer.
    #[serde(default = "default_initializer")]
    pub initializer: String,
}

fn default_native() -> Vec<String> {
    vec![".so".to_string()]
}

fn default_source() -> Vec<String> {
    vec![".src".to_string()]
}

fn default_compiled() -> Vec<String> {
    vec![".cache".to_string()]
}

fn default_initializer() -> String {
    "__init__".to_string()
}

impl Default for SuffixRules {
    fn default() -> Self {
        Self {
            native: default_native(),
            source: default_source(),
            compiled: default_compiled(),
            initializer: default_initializer(),
        }
    }
}

impl SuffixRules {
    /// `(kind, suffix)` pairs in probe order.
    pub fn candidates(&self) -> Vec<(ArtifactKind, &str)> {
        let native = self
            .native
            .iter()
            .map(|s| (ArtifactKind::NativeLibrary, s.as_str()));
        let source = self.source.iter().map(|s| (ArtifactKind::Source, s.as_str()));
        let compiled = self
            .compiled
            .iter()
            .map(|s| (ArtifactKind::CompiledCache, s.as_str()));
        native.chain(source).chain(compiled).collect()
    }

    /// Cache path sitting next to a source path.
    pub fn cache_for_source(&self, source: &Path) -> Option<PathBuf> {
        let cache_suffix = self.compiled.first()?;
        self.source
            .iter()
            .find_map(|suffix| replace_suffix(source, suffix, cache_suffix))
    }

    /// Source path sitting next to a cache path.
    pub fn source_for_cache(&self, cache: &Path) -> Option<PathBuf> {
        let source_suffix = self.source.first()?;
        self.compiled
            .iter()
            .find_map(|suffix| replace_suffix(cache, suffix, source_suffix))
    }
}

fn replace_suffix(path: &Path, from: &str, to: &str) -> Option<PathBuf> {
    let file_name = path.file_name()?.to_str()?;
    let stem = file_name.strip_suffix(from)?;
    Some(path.with_file_name(format!("{}{}", stem, to)))
}

/// A concrete artifact chosen for a unit name.
#[derive(Debug, Clone)]
pub struct ResolvedArtifact {
    /// Fully qualified unit name.
    pub qualified_name: String,

    /// Handle the artifact is relative to.
    pub directory: Arc<DirectoryHandle>,

    /// Path of the artifact inside `directory`.
    pub relative_path: PathBuf,

    /// Artifact kind.
    pub kind: ArtifactKind,

    /// Whether the artifact initializes a container.
    pub is_namespace_container: bool,

    /// Child directories of a container.
    pub search_locations: Vec<PathBuf>,
}

impl ResolvedArtifact {
    /// Display path of the artifact.
    pub fn origin(&self) -> String {
        self.directory
            .name()
            .join(&self.relative_path)
            .display()
            .to_string()
    }
}

/// Outcome of a successful lookup.
#[derive(Debug)]
pub enum Resolution {
    /// An artifact together with the loader that handles it.
    Artifact {
        artifact: ResolvedArtifact,
        loader: Loader,
    },

    /// Directories without any initializer: a container with no backing artifact.
    Namespace {
        qualified_name: String,
        search_locations: Vec<PathBuf>,
    },
}

/// One link of the runtime's resolution chain.
pub trait Finder: Send + Sync + fmt::Display {
    /// Look up `qualified_name`, optionally restricted to a parent's search locations.
    fn find(
        &self,
        qualified_name: &str,
        search_path: Option<&[PathBuf]>,
    ) -> LoaderResult<Option<Resolution>>;

    /// Whether this finder serves the given search path entry.
    fn handles(&self, path_entry: &Path) -> bool;
}

/// Finder anchored on a pre-opened root directory.
pub struct NamespaceFinder {
    root: Arc<DirectoryHandle>,
    rules: SuffixRules,
}

impl NamespaceFinder {
    /// Open `root` and apply every limiter to it, in order.
    pub fn open(
        root: impl AsRef<Path>,
        rules: SuffixRules,
        limiters: &[Arc<dyn RightsLimiter>],
    ) -> LoaderResult<Self> {
        let handle = DirectoryHandle::open_path(root)?;
        for limiter in limiters {
            limiter.limit(&handle)?;
        }
        info!(
            "Opened finder root {} ({} limiters)",
            handle.name().display(),
            limiters.len()
        );
        Ok(Self::with_handle(handle, rules))
    }

    /// Wrap an already opened handle.
    pub fn with_handle(root: DirectoryHandle, rules: SuffixRules) -> Self {
        Self {
            root: Arc::new(root),
            rules,
        }
    }

    /// The root handle.
    pub fn root(&self) -> &DirectoryHandle {
        &self.root
    }

    /// The suffix rules this finder probes with.
    pub fn rules(&self) -> &SuffixRules {
        &self.rules
    }

    /// Resolve a dotted name.
    pub fn resolve(
        &self,
        qualified_name: &str,
        search_path: Option<&[PathBuf]>,
    ) -> LoaderResult<Option<Resolution>> {
        let tail = short_name(qualified_name);
        if tail.is_empty() || tail == "." || tail == ".." || tail.contains('/') {
            return Ok(None);
        }

        let directories = match self.candidate_directories(search_path)? {
            Some(directories) => directories,
            None => return Ok(None),
        };

        let mut portions = Vec::new();

        for directory in &directories {
            let container = directory.is_directory(tail)?;
            let location = directory.name().join(tail);

            for (kind, suffix) in self.rules.candidates() {
                let file = PathBuf::from(format!("{}{}", tail, suffix));
                if directory.is_file(&file)? {
                    debug!(
                        "Found {:?} artifact for {} in {}",
                        kind, qualified_name, directory
                    );
                    return Ok(Some(self.bind(qualified_name, directory, file, kind, None)));
                }

                if container {
                    let initializer =
                        Path::new(tail).join(format!("{}{}", self.rules.initializer, suffix));
                    if directory.is_file(&initializer)? {
                        debug!("Found container {} at {:?}", qualified_name, location);
                        return Ok(Some(self.bind(
                            qualified_name,
                            directory,
                            initializer,
                            kind,
                            Some(vec![location]),
                        )));
                    }
                }
            }

            if container {
                debug!("Recording namespace portion {:?}", location);
                portions.push(location);
            }
        }

        if portions.is_empty() {
            return Ok(None);
        }
        debug!(
            "Resolved {} as a namespace over {} portions",
            qualified_name,
            portions.len()
        );
        Ok(Some(Resolution::Namespace {
            qualified_name: qualified_name.to_string(),
            search_locations: portions,
        }))
    }

    /// Handles to probe: the root, or one per search location.
    ///
    /// `None` means the search path is not served by this finder.
    fn candidate_directories(
        &self,
        search_path: Option<&[PathBuf]>,
    ) -> LoaderResult<Option<Vec<Arc<DirectoryHandle>>>> {
        let entries = match search_path {
            None => return Ok(Some(vec![Arc::clone(&self.root)])),
            Some(entries) => entries,
        };

        let mut directories = Vec::with_capacity(entries.len());
        for entry in entries {
            match self.root.open_subdirectory(entry) {
                Ok(handle) => directories.push(Arc::new(handle)),
                Err(e @ LoaderError::ClosedHandle(_)) => return Err(e),
                Err(e) => {
                    debug!("{} does not serve {:?}: {}", self, entry, e);
                    return Ok(None);
                }
            }
        }
        Ok(Some(directories))
    }

    fn bind(
        &self,
        qualified_name: &str,
        directory: &Arc<DirectoryHandle>,
        relative_path: PathBuf,
        kind: ArtifactKind,
        search_locations: Option<Vec<PathBuf>>,
    ) -> Resolution {
        let artifact = ResolvedArtifact {
            qualified_name: qualified_name.to_string(),
            directory: Arc::clone(directory),
            relative_path,
            kind,
            is_namespace_container: search_locations.is_some(),
            search_locations: search_locations.unwrap_or_default(),
        };
        let loader = Loader::for_artifact(&artifact, &self.rules);
        Resolution::Artifact { artifact, loader }
    }
}

impl Finder for NamespaceFinder {
    fn find(
        &self,
        qualified_name: &str,
        search_path: Option<&[PathBuf]>,
    ) -> LoaderResult<Option<Resolution>> {
        self.resolve(qualified_name, search_path)
    }

    fn handles(&self, path_entry: &Path) -> bool {
        absolute_name(path_entry).is_ok_and(|entry| entry == self.root.name())
    }
}

impl fmt::Display for NamespaceFinder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<NamespaceFinder for {}>", self.root.name().display())
    }
}

/// Finder that re-opens its roots by path on every lookup.
///
/// This is the ambient resolution used before a process gives up
/// path-based filesystem access, for example to warm preloaded units.
pub struct PathFinder {
    roots: Vec<PathBuf>,
    rules: SuffixRules,
}

impl PathFinder {
    pub fn new(roots: Vec<PathBuf>, rules: SuffixRules) -> Self {
        Self { roots, rules }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }
}

impl Finder for PathFinder {
    fn find(
        &self,
        qualified_name: &str,
        search_path: Option<&[PathBuf]>,
    ) -> LoaderResult<Option<Resolution>> {
        for root in &self.roots {
            if !root.is_dir() {
                continue;
            }
            let handle = DirectoryHandle::open_path(root)?;
            let finder = NamespaceFinder::with_handle(handle, self.rules.clone());
            if let Some(resolution) = finder.resolve(qualified_name, search_path)? {
                return Ok(Some(resolution));
            }
        }
        Ok(None)
    }

    fn handles(&self, path_entry: &Path) -> bool {
        let Ok(entry) = absolute_name(path_entry) else {
            return false;
        };
        self.roots
            .iter()
            .any(|root| absolute_name(root).is_ok_and(|root| root == entry))
    }
}

impl fmt::Display for PathFinder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<PathFinder for {} roots>", self.roots.len())
    }
}
