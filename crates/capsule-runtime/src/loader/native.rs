use super::open_artifact;
use crate::error::{LoaderError, LoaderResult};
use crate::finder::{ArtifactKind, ResolvedArtifact};
use crate::native::context::{NativeContext, QualificationScope};
use crate::native::{abi, dl, entry_point_symbol};
use crate::runtime::Runtime;
use crate::unit::{short_name, UnitRef};
use std::os::unix::io::AsRawFd;
use tracing::{debug, info};

/// Link a native library and run its entry point.
///
/// Reclamation stays suspended from opening the file until the unit has
/// been looked up in the registry.
pub(super) fn load(runtime: &Runtime, artifact: &ResolvedArtifact) -> LoaderResult<UnitRef> {
    let name = artifact.qualified_name.as_str();
    let _reclaim = runtime.reclamation().suspend();

    // native units resolve these from the executable
    std::hint::black_box(abi::exported_functions());

    let file = open_artifact(&artifact.directory, &artifact.relative_path)?;
    let origin = artifact.origin();

    let library = dl::open_fd(file.as_raw_fd())
        .map_err(|e| LoaderError::DynamicLoadFailure(format!("{}: {}", origin, e)))?;
    debug!("Linked {} for {}", origin, name);

    let symbol = entry_point_symbol(short_name(name));
    // SAFETY: native units export their entry point with the `EntryPoint` signature.
    let init = unsafe { dl::entry_point(&library, &symbol) }.map_err(|message| {
        LoaderError::EntryPointNotFound {
            symbol: symbol.clone(),
            message,
        }
    })?;

    // The library is never unloaded, so `init` stays valid.
    runtime.retain_library(library, file);

    {
        let context = NativeContext::new(runtime.shared_registry(), name)
            .with_reclamation(runtime.shared_reclamation());
        let _scope = QualificationScope::enter(context);
        // SAFETY: see above; the entry point takes no arguments.
        unsafe { init() };
    }

    let unit = runtime.registry().get(name).ok_or_else(|| {
        LoaderError::DynamicLoadFailure(format!("{} did not register unit {}", symbol, name))
    })?;

    unit.bind_metadata(
        Some(origin.clone()),
        Some(ArtifactKind::NativeLibrary),
        artifact
            .is_namespace_container
            .then(|| artifact.search_locations.clone()),
    );
    info!(
        "Loaded native unit {} from {} ({} libraries linked)",
        name,
        origin,
        runtime.linked_libraries()
    );
    Ok(unit)
}
