//! Package index and installer.
//!
//! The production [`AptPackageManager`] keeps the vendor repository source in
//! place, refreshes the apt cache and reads `apt-cache policy` to learn the
//! candidate and installed versions of a package.

use crate::core::version::{InstallTarget, PackageVersion};
use crate::errors::{Error, Result};
use crate::host::command::{Command, CommandRunner};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Index view of a single package
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageInfo {
    /// Newest version available in the index
    pub candidate: Option<PackageVersion>,
    /// Version currently installed on the host
    pub installed: Option<PackageVersion>,
}

/// Package index and installer
#[async_trait]
pub trait PackageManager: Send + Sync {
    /// Make sure the index is current for `name`
    async fn refresh(&self, name: &str) -> Result<()>;

    /// Look up `name`; `Ok(None)` when the index does not know the package
    async fn fetch(&self, name: &str) -> Result<Option<PackageInfo>>;

    /// Install `name` at `target`; fatal on failure
    async fn install(&self, name: &str, target: &InstallTarget) -> Result<()>;
}

/// Vendor repository the managed package comes from
#[derive(Debug, Clone)]
pub struct AptRepository {
    pub base_url: String,
    pub key: Option<String>,
    pub sources_dir: PathBuf,
}

/// apt-backed [`PackageManager`]
pub struct AptPackageManager {
    commands: Arc<dyn CommandRunner>,
    repository: Option<AptRepository>,
}

impl AptPackageManager {
    #[must_use]
    pub fn new(commands: Arc<dyn CommandRunner>, repository: Option<AptRepository>) -> Self {
        Self {
            commands,
            repository,
        }
    }

    async fn add_source(&self, repository: &AptRepository, name: &str) -> Result<()> {
        let codename = self
            .commands
            .run(&Command::new("lsb_release").arg("-cs"))
            .await?
            .stdout
            .trim()
            .to_string();
        let line = format!(
            "deb {}/{name}/ubuntu {codename} main\n",
            repository.base_url.trim_end_matches('/')
        );
        let path = repository.sources_dir.join(format!("{name}.list"));

        let current = tokio::fs::read_to_string(&path).await.ok();
        if current.as_deref() != Some(line.as_str()) {
            info!("Installing apt source for {}: {}", name, line.trim());
            tokio::fs::write(&path, &line).await?;
        }

        if let Some(key) = &repository.key {
            self.commands
                .run(&Command::new("apt-key").args([
                    "adv",
                    "--keyserver",
                    "hkp://keyserver.ubuntu.com:80",
                    "--recv-keys",
                    key.as_str(),
                ]))
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl PackageManager for AptPackageManager {
    #[instrument(skip(self))]
    async fn refresh(&self, name: &str) -> Result<()> {
        if let Some(repository) = &self.repository {
            self.add_source(repository, name).await?;
        }
        self.commands
            .run(&Command::new("apt-get").arg("update").env("DEBIAN_FRONTEND", "noninteractive"))
            .await
            .map_err(|e| Error::PackageIndex {
                package: name.to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn fetch(&self, name: &str) -> Result<Option<PackageInfo>> {
        let output = self
            .commands
            .run(&Command::new("apt-cache").args(["policy", name]))
            .await
            .map_err(|e| Error::PackageIndex {
                package: name.to_string(),
                message: e.to_string(),
            })?;
        let info = parse_policy(&output.stdout)?;
        debug!("Package information for {}: {:?}", name, info);
        Ok(info)
    }

    #[instrument(skip(self))]
    async fn install(&self, name: &str, target: &InstallTarget) -> Result<()> {
        info!("Installing {}", target.package_spec(name));
        self.commands
            .run(
                &Command::new("apt-get")
                    .args(["install", "-y", "-o", "Dpkg::Options::=--force-confold"])
                    .arg(target.package_spec(name))
                    .env("DEBIAN_FRONTEND", "noninteractive"),
            )
            .await?;
        Ok(())
    }
}

/// Parses `apt-cache policy <name>` output.
///
/// apt prints nothing (and exits zero) for packages it has never heard of.
pub fn parse_policy(output: &str) -> Result<Option<PackageInfo>> {
    if output.trim().is_empty() {
        return Ok(None);
    }

    let mut info = PackageInfo::default();
    for line in output.lines().map(str::trim) {
        if let Some(value) = line.strip_prefix("Installed:") {
            info.installed = parse_policy_version(value)?;
        } else if let Some(value) = line.strip_prefix("Candidate:") {
            info.candidate = parse_policy_version(value)?;
        }
    }
    Ok(Some(info))
}

fn parse_policy_version(value: &str) -> Result<Option<PackageVersion>> {
    match value.trim() {
        "" | "(none)" => Ok(None),
        version => PackageVersion::parse(version).map(Some),
    }
}
