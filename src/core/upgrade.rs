//! Package version convergence.
//!
//! Omnibus packages must not skip major releases: moving from 13.x to 15.x
//! means finishing the 13 line, installing the newest 14.x and running a
//! reconfigure after each step before 15.x can be installed.

use crate::config::{PathSettings, UpgradeSettings};
use crate::core::render::reconfigure;
use crate::core::resolver::ResolvedConfiguration;
use crate::core::version::{InstallTarget, PackageVersion};
use crate::errors::{Error, Result};
use crate::host::{Collaborators, PackageInfo, PackageManager};
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Refreshes the index and reads `name`, retrying transient failures.
async fn fetch_with_retry(
    packages: &dyn PackageManager,
    name: &str,
    settings: &UpgradeSettings,
) -> Result<Option<PackageInfo>> {
    let attempts = settings.index_attempts.max(1);
    let mut attempt = 1;
    loop {
        let result = match packages.refresh(name).await {
            Ok(()) => packages.fetch(name).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(info) => return Ok(info),
            Err(e) if attempt < attempts => {
                warn!(
                    "Package index lookup failed (attempt {}/{}): {}",
                    attempt, attempts, e
                );
                tokio::time::sleep(Duration::from_millis(settings.index_retry_delay_ms)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn install_and_reconfigure(
    collaborators: &Collaborators,
    paths: &PathSettings,
    name: &str,
    target: &InstallTarget,
) -> Result<()> {
    info!("Installing {} {}", name, target);
    collaborators.packages.install(name, target).await?;
    reconfigure(collaborators.commands.as_ref(), paths).await
}

/// Brings the installed package to the desired version.
///
/// Returns `true` when any install was performed.
#[instrument(skip_all, fields(package = resolved.package_name()))]
pub async fn converge_version(
    resolved: &ResolvedConfiguration,
    upgrade: &UpgradeSettings,
    paths: &PathSettings,
    collaborators: &Collaborators,
) -> Result<bool> {
    let name = resolved.package_name();
    let pin = resolved.version_pin.as_ref();
    let exact_or =
        |fallback: InstallTarget| pin.map_or(fallback, |v| InstallTarget::Exact(v.clone()));

    let mut hopped = false;
    // Major line the previous hop landed on; it is already at its newest release.
    let mut landed_major: Option<u64> = None;

    loop {
        let info = fetch_with_retry(collaborators.packages.as_ref(), name, upgrade).await?;
        let Some(installed) = info.as_ref().and_then(|i| i.installed.clone()) else {
            info!("{} is not installed", name);
            // The package postinstall runs the first reconfigure itself.
            let target = exact_or(InstallTarget::Latest);
            info!("Installing {} {}", name, target);
            collaborators.packages.install(name, &target).await?;
            return Ok(true);
        };

        if let Some(expected) = landed_major {
            if installed.major() < expected {
                return Err(Error::UpgradeStalled {
                    package: name.to_string(),
                    major: installed.major(),
                });
            }
        }

        let desired: PackageVersion = match pin {
            Some(pin) => pin.clone(),
            None => info
                .and_then(|i| i.candidate)
                .ok_or_else(|| Error::PackageIndex {
                    package: name.to_string(),
                    message: "no candidate version in the package index".to_string(),
                })?,
        };
        info!("{}: installed {}, desired {}", name, installed, desired);

        if desired == installed {
            return Ok(hopped);
        }
        if desired < installed {
            return Err(Error::DowngradeRefused {
                package: name.to_string(),
                installed: installed.to_string(),
                desired: desired.to_string(),
            });
        }

        let current = installed.major();
        if desired.major() == current {
            let target = exact_or(InstallTarget::Major(current));
            install_and_reconfigure(collaborators, paths, name, &target).await?;
            return Ok(true);
        }

        if landed_major != Some(current) {
            install_and_reconfigure(collaborators, paths, name, &InstallTarget::Major(current))
                .await?;
        }
        let next = current + 1;
        let target = if next == desired.major() {
            exact_or(InstallTarget::Major(next))
        } else {
            InstallTarget::Major(next)
        };
        install_and_reconfigure(collaborators, paths, name, &target).await?;
        hopped = true;
        landed_major = Some(next);
    }
}
