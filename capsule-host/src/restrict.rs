//! The restricted-mode sequence.
//!
//! Order matters: finders must be installed while paths still resolve, the
//! mode is entered exactly once afterwards, and bootstrap units are evicted
//! last so later imports cannot observe them.

use crate::config::Config;
use crate::install::{install_from_config, InstallReport};
use anyhow::{Context, Result};
use capsule_runtime::Runtime;
use tracing::{info, warn};

/// The platform mechanism that removes path-based filesystem access.
pub trait RestrictedMode {
    /// Enter the mode. Called at most once per [`restrict`] call.
    fn enter(&self) -> Result<()>;

    fn name(&self) -> &str;
}

/// A mode that only logs. Useful where no capability mode exists.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unrestricted;

impl RestrictedMode for Unrestricted {
    fn enter(&self) -> Result<()> {
        warn!("No restricted mode available, continuing with ambient access");
        Ok(())
    }

    fn name(&self) -> &str {
        "unrestricted"
    }
}

/// Capsicum capability mode.
#[cfg(target_os = "freebsd")]
#[derive(Debug, Clone, Copy, Default)]
pub struct CapabilityMode;

#[cfg(target_os = "freebsd")]
impl RestrictedMode for CapabilityMode {
    fn enter(&self) -> Result<()> {
        // SAFETY: cap_enter takes no arguments and only changes process state.
        if unsafe { libc::cap_enter() } != 0 {
            return Err(std::io::Error::last_os_error()).context("cap_enter failed");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "capsicum"
    }
}

/// What [`restrict`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestrictReport {
    /// Whether the skip variable short-circuited the sequence.
    pub skipped: bool,
    /// Installation results, absent when skipped.
    pub install: Option<InstallReport>,
    /// Units that were registered and got evicted.
    pub evicted: Vec<String>,
}

/// Whether the configured skip variable is set.
pub fn skip_requested(config: &Config) -> bool {
    std::env::var_os(&config.restrict.skip_env).is_some()
}

/// Install, enter `mode`, then evict the configured bootstrap units.
pub fn restrict(runtime: &Runtime, config: &Config, mode: &dyn RestrictedMode) -> Result<RestrictReport> {
    if skip_requested(config) {
        info!(
            "{} is set, staying unrestricted",
            config.restrict.skip_env
        );
        return Ok(RestrictReport {
            skipped: true,
            ..Default::default()
        });
    }

    let install = install_from_config(runtime, config)?;

    mode.enter()
        .with_context(|| format!("Failed to enter restricted mode ({})", mode.name()))?;
    info!("Entered restricted mode ({})", mode.name());

    let evicted = match runtime.reclaim(&config.restrict.evict_after) {
        Some(evicted) => evicted,
        None => {
            warn!("Reclamation is suspended by a native load, keeping bootstrap units");
            Vec::new()
        }
    };

    Ok(RestrictReport {
        skipped: false,
        install: Some(install),
        evicted,
    })
}
