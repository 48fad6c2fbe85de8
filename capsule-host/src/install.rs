//! Installing descriptor-based finders into a runtime.
//!
//! Installation happens while the process can still resolve paths: every
//! preload is imported through whatever chain the runtime has at that
//! point, then the chain is replaced with one [`NamespaceFinder`] per
//! existing root.

use crate::config::Config;
use anyhow::{Context, Result};
use capsule_runtime::{
    Finder, Importer, NamespaceFinder, PathFinder, RightsLimiter, Runtime, SuffixRules,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// What [`install`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    /// Units imported before the chain was replaced.
    pub preloaded: Vec<String>,
    /// Roots that received a finder, in chain order.
    pub roots: Vec<PathBuf>,
    /// Configured roots that are not directories or repeat an earlier root.
    pub skipped_roots: Vec<PathBuf>,
}

/// Preload units, then replace the chain with descriptor-based finders.
///
/// Each root handle is limited once by every limiter, in order.
pub fn install(
    runtime: &Runtime,
    roots: &[PathBuf],
    limiters: &[Arc<dyn RightsLimiter>],
    preload: &[String],
    rules: &SuffixRules,
) -> Result<InstallReport> {
    let mut report = InstallReport::default();

    for name in preload {
        runtime
            .import(name)
            .with_context(|| format!("Failed to preload unit '{}'", name))?;
        debug!("Preloaded {}", name);
        report.preloaded.push(name.clone());
    }

    let mut finders: Vec<Arc<dyn Finder>> = Vec::with_capacity(roots.len());
    for root in roots {
        if !root.is_dir() {
            debug!("Skipping root {} (not a directory)", root.display());
            report.skipped_roots.push(root.clone());
            continue;
        }
        if finders.iter().any(|finder| finder.handles(root)) {
            debug!("Skipping root {} (already installed)", root.display());
            report.skipped_roots.push(root.clone());
            continue;
        }
        let finder = NamespaceFinder::open(root, rules.clone(), limiters)
            .with_context(|| format!("Failed to open unit root: {}", root.display()))?;
        finders.push(Arc::new(finder));
        report.roots.push(root.clone());
    }

    runtime.replace_finders(finders);
    info!(
        "Installed {} unit roots after {} preloads",
        report.roots.len(),
        report.preloaded.len()
    );
    Ok(report)
}

/// [`install`] with the roots, rights, preloads and suffixes from `config`.
pub fn install_from_config(runtime: &Runtime, config: &Config) -> Result<InstallReport> {
    let limiter: Arc<dyn RightsLimiter> = Arc::new(config.rights.to_rights());
    install(
        runtime,
        &config.loader.roots,
        &[limiter],
        &config.loader.preload,
        &config.loader.suffixes,
    )
}

/// A runtime whose chain resolves the configured roots by path.
///
/// This is the chain preloads go through before [`install`] replaces it.
pub fn ambient_runtime(config: &Config) -> Runtime {
    let runtime = Runtime::new();
    runtime.push_finder(Arc::new(PathFinder::new(
        config.loader.roots.clone(),
        config.loader.suffixes.clone(),
    )));
    runtime
}
