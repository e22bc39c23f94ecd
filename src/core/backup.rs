//! Application backup.

use crate::config::PathSettings;
use crate::errors::Result;
use crate::host::{Collaborators, Command};
use tracing::{info, instrument};

/// Runs `gitlab-backup create`, then hands over to the backup helper.
#[instrument(skip_all)]
pub async fn backup(paths: &PathSettings, collaborators: &Collaborators) -> Result<()> {
    info!("Creating GitLab backup");
    collaborators
        .commands
        .run(
            &Command::new("sudo")
                .arg(paths.gitlab_backup.display().to_string())
                .args(["create", "STRATEGY=copy"]),
        )
        .await?;
    collaborators.backup.backup().await
}
