//! Host layer - production implementations of the agent's external collaborators.
//!
//! The core logic only talks to the traits defined here; [`Collaborators`]
//! bundles one implementation of each so tests can hand in fakes.

/// Backup helper
pub mod backup;
/// Subprocess execution
pub mod command;
/// Orchestration hook tools (status, ports, network, relation data)
pub mod hooks;
/// Operation lock
pub mod lock;
/// Package index and installer
pub mod packages;

pub use backup::{BackupHelper, CommandBackupHelper};
pub use command::{Command, CommandOutput, CommandRunner, SystemCommandRunner};
pub use hooks::{HookTools, HostInfo, PortControl, ProxyRelation, StatusReporter, WorkloadStatus};
pub use lock::OperationLock;
pub use packages::{AptPackageManager, AptRepository, PackageInfo, PackageManager};

use crate::config::Settings;
use std::path::PathBuf;
use std::sync::Arc;

/// One implementation of every external collaborator
#[derive(Clone)]
pub struct Collaborators {
    pub commands: Arc<dyn CommandRunner>,
    pub packages: Arc<dyn PackageManager>,
    pub ports: Arc<dyn PortControl>,
    pub status: Arc<dyn StatusReporter>,
    pub host: Arc<dyn HostInfo>,
    pub proxy: Arc<dyn ProxyRelation>,
    pub backup: Arc<dyn BackupHelper>,
}

impl Collaborators {
    /// Collaborators that act on the real host
    #[must_use]
    pub fn system(settings: &Settings) -> Self {
        let commands: Arc<dyn CommandRunner> = Arc::new(SystemCommandRunner);
        let hooks = Arc::new(HookTools::new(Arc::clone(&commands)));
        let repository = AptRepository {
            base_url: settings.package.apt_repo.clone(),
            key: settings.package.apt_key.clone(),
            sources_dir: PathBuf::from("/etc/apt/sources.list.d"),
        };

        Self {
            packages: Arc::new(AptPackageManager::new(
                Arc::clone(&commands),
                Some(repository),
            )),
            ports: hooks.clone(),
            status: hooks.clone(),
            host: hooks.clone(),
            proxy: hooks,
            backup: Arc::new(CommandBackupHelper::new(
                Arc::clone(&commands),
                settings.backup.helper_command.clone(),
            )),
            commands,
        }
    }
}
