//! # capsule-runtime
//!
//! Unit loading for processes that have given up path-based filesystem
//! access.
//!
//! This crate provides:
//! - Directory handles that open, stat and list strictly beneath a
//!   pre-opened directory descriptor, with narrowable rights
//! - Finders that map dotted unit names to artifacts under such handles
//! - Loaders for source units, compiled caches and native libraries
//! - A runtime tying the registry, builtins and finder chain together
//!
//! ## Artifact Layout
//!
//! For a unit `pkg.mod` under a root `/r`:
//! - `/r/pkg/__init__.src` - initializer of the `pkg` container
//! - `/r/pkg/mod.so` - native library exporting `capsule_init_mod`
//! - `/r/pkg/mod.src` - source text
//! - `/r/pkg/mod.cache` - compiled form of `mod.src`
//!
//! A directory without any initializer is a namespace portion; several
//! portions may together form one namespace container.

pub mod builtin;
pub mod cache;
pub mod dirfd;
pub mod error;
pub mod finder;
pub mod loader;
pub mod native;
pub mod reclaim;
pub mod registry;
pub mod rights;
pub mod runtime;
pub mod script;
pub mod unit;

pub use builtin::BuiltinTable;
pub use dirfd::{ArtifactFile, DirectoryHandle, Metadata};
pub use error::{LoaderError, LoaderResult};
pub use finder::{
    ArtifactKind, Finder, NamespaceFinder, PathFinder, Resolution, ResolvedArtifact, SuffixRules,
};
pub use loader::Loader;
pub use reclaim::{ReclamationGate, ReclamationGuard};
pub use registry::{UnitInfo, UnitRegistry};
pub use rights::{Right, Rights, RightsLimiter};
pub use runtime::{Importer, Runtime};
pub use script::Program;
pub use unit::{LoadedUnit, UnitRef, Value};
