use super::{install_program, open_artifact, read_artifact};
use crate::error::{LoaderError, LoaderResult};
use crate::finder::{ArtifactKind, ResolvedArtifact};
use crate::runtime::Runtime;
use crate::script::Program;
use crate::unit::UnitRef;
use tracing::debug;

/// Load a unit from its source text.
pub(super) fn load(runtime: &Runtime, artifact: &ResolvedArtifact) -> LoaderResult<UnitRef> {
    let mut file = open_artifact(&artifact.directory, &artifact.relative_path)?;
    let origin = file.name().display().to_string();
    let bytes = read_artifact(&mut file)?;

    let text = String::from_utf8(bytes).map_err(|e| LoaderError::Syntax {
        origin: origin.clone(),
        line: 0,
        message: format!("source is not UTF-8: {}", e),
    })?;
    let program = Program::parse(&text, &origin)?;
    debug!("Parsed {} statements from {}", program.statements.len(), origin);

    install_program(runtime, artifact, ArtifactKind::Source, &program)
}
