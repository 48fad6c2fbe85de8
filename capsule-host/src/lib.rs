//! Capsule host library
//!
//! Host-side setup around `capsule-runtime`: reading the configuration,
//! installing descriptor-based finders and running the restricted-mode
//! sequence.

pub mod config;
pub mod install;
pub mod logging;
pub mod restrict;

pub use config::Config;
pub use install::{ambient_runtime, install, install_from_config, InstallReport};
pub use logging::init_logging;
pub use restrict::{restrict, RestrictReport, RestrictedMode, Unrestricted};
