//! Loaders turn a resolved artifact into a registered, initialized unit.
//!
//! Every loader follows the same contract:
//!
//! - if the qualified name is already registered, return that unit untouched
//! - validate the artifact before anything is registered
//! - register the unit, then run its initialization code
//! - on failure after registration, evict the name again

mod compiled;
mod fallback;
mod native;
mod source;

pub use compiled::read_validated;

use crate::dirfd::{ArtifactFile, DirectoryHandle};
use crate::error::{LoaderError, LoaderResult};
use crate::finder::{ArtifactKind, ResolvedArtifact, SuffixRules};
use crate::runtime::Runtime;
use crate::script::Program;
use crate::unit::UnitRef;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Strategy used to load a resolved artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Loader {
    /// Parse and execute source text.
    Source,

    /// Execute a compiled cache, checking freshness against `source_sibling`
    /// when one is named and present.
    CompiledCache { source_sibling: Option<PathBuf> },

    /// Try the cache at `cache_path`, fall back to the source on any
    /// recoverable cache failure.
    CacheThenSource { cache_path: PathBuf },

    /// Link a shared library and call its entry point.
    NativeLibrary,
}

impl Loader {
    /// Pick the loader for an artifact.
    pub fn for_artifact(artifact: &ResolvedArtifact, rules: &SuffixRules) -> Self {
        match artifact.kind {
            ArtifactKind::NativeLibrary => Loader::NativeLibrary,
            ArtifactKind::CompiledCache => Loader::CompiledCache {
                source_sibling: rules.source_for_cache(&artifact.relative_path),
            },
            ArtifactKind::Source => match rules.cache_for_source(&artifact.relative_path) {
                Some(cache_path) => Loader::CacheThenSource { cache_path },
                None => Loader::Source,
            },
        }
    }

    /// Load `artifact` into `runtime`'s registry.
    pub fn load(&self, runtime: &Runtime, artifact: &ResolvedArtifact) -> LoaderResult<UnitRef> {
        if let Some(existing) = runtime.registry().get(&artifact.qualified_name) {
            return Ok(existing);
        }

        match self {
            Loader::Source => source::load(runtime, artifact),
            Loader::CompiledCache { source_sibling } => {
                compiled::load(runtime, artifact, source_sibling.as_deref())
            }
            Loader::CacheThenSource { cache_path } => fallback::load(runtime, artifact, cache_path),
            Loader::NativeLibrary => native::load(runtime, artifact),
        }
    }
}

/// Open an artifact, reporting absence as `MissingArtifact`.
fn open_artifact(directory: &DirectoryHandle, relative: &Path) -> LoaderResult<ArtifactFile> {
    directory.open(relative).map_err(|e| match e {
        LoaderError::Io(io) => {
            LoaderError::from_artifact_io(directory.name().join(relative).display().to_string(), io)
        }
        other => other,
    })
}

/// Read an opened artifact to the end.
fn read_artifact(file: &mut ArtifactFile) -> LoaderResult<Vec<u8>> {
    let origin = file.name().display().to_string();
    file.read_all()
        .map_err(|e| LoaderError::from_artifact_io(origin, e))
}

/// Register the unit for `artifact` and execute `program` in it.
fn install_program(
    runtime: &Runtime,
    artifact: &ResolvedArtifact,
    kind: ArtifactKind,
    program: &Program,
) -> LoaderResult<UnitRef> {
    let (unit, created) = runtime.registry().get_or_create(&artifact.qualified_name);
    if !created {
        return Ok(unit);
    }

    unit.bind_metadata(
        Some(artifact.origin()),
        Some(kind),
        artifact
            .is_namespace_container
            .then(|| artifact.search_locations.clone()),
    );

    if let Err(e) = program.execute(&unit, runtime) {
        warn!("Initialization of {} failed: {}", artifact.qualified_name, e);
        runtime.registry().evict(&artifact.qualified_name);
        return Err(e);
    }

    info!(
        "Loaded {} from {} ({:?})",
        artifact.qualified_name,
        artifact.origin(),
        kind
    );
    Ok(unit)
}
