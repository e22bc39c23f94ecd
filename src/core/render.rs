//! Render & apply.
//!
//! Writes `gitlab.rb` for the selected database backend and runs
//! `gitlab-ctl reconfigure` only when the rendered content differs from what
//! was last applied.

use crate::config::PathSettings;
use crate::core::changes::{has_changed, mark_applied, write_rendered};
use crate::core::database::{cache_endpoint, select_backend};
use crate::core::kv::KeyValueStore;
use crate::core::resolver::ResolvedConfiguration;
use crate::core::templates::{ApplicationSettings, render_gitlab_rb};
use crate::errors::Result;
use crate::host::{Collaborators, Command, CommandRunner, WorkloadStatus};
use tracing::{debug, info, instrument, warn};

pub const MISSING_DB_MESSAGE: &str =
    "DB configuration is missing. Verify database relations to continue.";

/// Runs `gitlab-ctl reconfigure`.
#[instrument(skip_all)]
pub async fn reconfigure(commands: &dyn CommandRunner, paths: &PathSettings) -> Result<()> {
    info!("Reconfiguring GitLab");
    commands
        .run(&Command::from_path(&paths.gitlab_ctl).arg("reconfigure"))
        .await?;
    Ok(())
}

/// Renders the application configuration and applies it when it changed.
///
/// Returns `Ok(false)` and sets a blocked status when no database backend is
/// configured; nothing is written in that case.
#[instrument(skip_all)]
pub async fn render_and_apply(
    resolved: &ResolvedConfiguration,
    paths: &PathSettings,
    store: &dyn KeyValueStore,
    collaborators: &Collaborators,
) -> Result<bool> {
    let endpoint = select_backend(store).await?;
    let cache = cache_endpoint(store).await?;
    let Some(settings) = ApplicationSettings::build(resolved, &endpoint, cache) else {
        warn!("No database backend configured, blocking");
        collaborators
            .status
            .set(WorkloadStatus::Blocked, MISSING_DB_MESSAGE)
            .await;
        return Ok(false);
    };

    debug!("Rendering {:?} for {:?}", paths.gitlab_config, endpoint.backend());
    let rendered = write_rendered(&paths.gitlab_config, &render_gitlab_rb(&settings)).await?;

    if has_changed(store, &rendered).await? {
        reconfigure(collaborators.commands.as_ref(), paths).await?;
        mark_applied(store, &rendered).await?;
    } else {
        debug!("GitLab configuration unchanged, skipping reconfigure");
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::core::database::Backend;
    use crate::core::resolver::resolve;
    use crate::test_utils::{Fakes, seed_backend, setup_test_store, test_credentials};
    use std::path::Path;

    fn settings_in(dir: &Path) -> Settings {
        let mut settings = Settings::default();
        settings.paths.gitlab_config = dir.join("gitlab.rb");
        settings
    }

    fn reconfigure_count(fakes: &Fakes) -> usize {
        fakes
            .commands
            .calls()
            .iter()
            .filter(|argv| argv.last().map(String::as_str) == Some("reconfigure"))
            .count()
    }

    #[tokio::test]
    async fn test_missing_backend_blocks_without_writing() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let settings = settings_in(dir.path());
        let store = setup_test_store().await?;
        let fakes = Fakes::default();
        let resolved = resolve(&settings, &store, fakes.host.as_ref()).await?;

        let applied =
            render_and_apply(&resolved, &settings.paths, &store, &fakes.collaborators()).await?;

        assert!(!applied);
        assert!(!settings.paths.gitlab_config.exists());
        assert!(fakes.commands.calls().is_empty());
        assert_eq!(
            fakes.status.last(),
            Some((WorkloadStatus::Blocked, MISSING_DB_MESSAGE.to_string()))
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_reconfigures_only_on_change() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut settings = settings_in(dir.path());
        let store = setup_test_store().await?;
        seed_backend(&store, Backend::Postgres, &test_credentials(Backend::Postgres)).await?;
        let fakes = Fakes::default();
        let collaborators = fakes.collaborators();

        let resolved = resolve(&settings, &store, fakes.host.as_ref()).await?;
        assert!(render_and_apply(&resolved, &settings.paths, &store, &collaborators).await?);
        assert_eq!(reconfigure_count(&fakes), 1);
        let rb = std::fs::read_to_string(&settings.paths.gitlab_config)?;
        assert!(rb.contains("gitlab_rails['db_database'] = 'gitlab_pg'"));

        assert!(render_and_apply(&resolved, &settings.paths, &store, &collaborators).await?);
        assert_eq!(reconfigure_count(&fakes), 1, "unchanged render must not reconfigure");

        settings.network.http_port = 8080;
        let resolved = resolve(&settings, &store, fakes.host.as_ref()).await?;
        render_and_apply(&resolved, &settings.paths, &store, &collaborators).await?;
        assert_eq!(reconfigure_count(&fakes), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_reconfigure_is_retried() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let settings = settings_in(dir.path());
        let store = setup_test_store().await?;
        seed_backend(&store, Backend::MySql, &test_credentials(Backend::MySql)).await?;
        let fakes = Fakes::default();
        let collaborators = fakes.collaborators();
        let resolved = resolve(&settings, &store, fakes.host.as_ref()).await?;

        fakes.commands.fail("/usr/bin/gitlab-ctl");
        assert!(
            render_and_apply(&resolved, &settings.paths, &store, &collaborators)
                .await
                .is_err()
        );

        fakes.commands.succeed("/usr/bin/gitlab-ctl");
        render_and_apply(&resolved, &settings.paths, &store, &collaborators).await?;
        assert_eq!(reconfigure_count(&fakes), 2);
        Ok(())
    }
}
