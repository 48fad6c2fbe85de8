use super::{install_program, open_artifact, read_artifact};
use crate::cache::{decode_body, CacheHeader};
use crate::dirfd::DirectoryHandle;
use crate::error::{LoaderError, LoaderResult};
use crate::finder::{ArtifactKind, ResolvedArtifact};
use crate::runtime::Runtime;
use crate::script::Program;
use crate::unit::UnitRef;
use std::path::Path;
use tracing::debug;

/// Load a unit from a compiled cache.
pub(super) fn load(
    runtime: &Runtime,
    artifact: &ResolvedArtifact,
    source_sibling: Option<&Path>,
) -> LoaderResult<UnitRef> {
    let program = read_validated(&artifact.directory, &artifact.relative_path, source_sibling)?;
    install_program(runtime, artifact, ArtifactKind::CompiledCache, &program)
}

/// Read a cache, validate its header and decode its body.
///
/// When `source_sibling` names a source that exists, its truncated mtime must
/// equal the one recorded in the header. A cache without a source is trusted.
pub fn read_validated(
    directory: &DirectoryHandle,
    cache: &Path,
    source_sibling: Option<&Path>,
) -> LoaderResult<Program> {
    let mut file = open_artifact(directory, cache)?;
    let origin = file.name().display().to_string();

    let header = CacheHeader::read(&mut file, &origin).map_err(|e| match e {
        LoaderError::Io(io) => LoaderError::from_artifact_io(origin.clone(), io),
        other => other,
    })?;

    if let Some(source) = source_sibling {
        ensure_fresh(directory, source, header, &origin)?;
    }

    let body = read_artifact(&mut file)?;
    let program = decode_body(&body, &origin)?;
    debug!("Decoded cache {} ({} bytes)", origin, body.len());
    Ok(program)
}

fn ensure_fresh(
    directory: &DirectoryHandle,
    source: &Path,
    header: CacheHeader,
    origin: &str,
) -> LoaderResult<()> {
    let meta = match directory.stat(source) {
        Ok(meta) => meta,
        Err(e) if e.is_not_found() => {
            debug!("No source next to {}, trusting cache", origin);
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    let source_mtime = meta.mtime_low32();
    if source_mtime != header.source_mtime {
        return Err(LoaderError::StaleCache {
            path: origin.to_string(),
            cached: header.source_mtime,
            source_mtime,
        });
    }
    Ok(())
}
