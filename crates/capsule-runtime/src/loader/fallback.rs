use super::{compiled, install_program, source};
use crate::error::{LoaderError, LoaderResult};
use crate::finder::{ArtifactKind, ResolvedArtifact};
use crate::runtime::Runtime;
use crate::unit::UnitRef;
use std::path::Path;
use tracing::{debug, warn};

/// Load from the cache next to a source, or from the source itself.
///
/// Missing, corrupt, incomplete and stale caches fall back to the source.
/// Anything else, such as a permission failure, is reported as is.
pub(super) fn load(
    runtime: &Runtime,
    artifact: &ResolvedArtifact,
    cache_path: &Path,
) -> LoaderResult<UnitRef> {
    match compiled::read_validated(
        &artifact.directory,
        cache_path,
        Some(&artifact.relative_path),
    ) {
        Ok(program) => {
            return install_program(runtime, artifact, ArtifactKind::CompiledCache, &program)
        }
        Err(LoaderError::MissingArtifact(_)) => {
            debug!("No cache for {}, loading source", artifact.qualified_name);
        }
        Err(e) if e.is_cache_recoverable() => {
            warn!("Ignoring cache for {}: {}", artifact.qualified_name, e);
        }
        Err(e) => return Err(e),
    }

    source::load(runtime, artifact)
}
