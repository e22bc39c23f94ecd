//! One-time MySQL to PostgreSQL data migration via `pgloader`.
//!
//! The migration only runs once both database relations are complete, and
//! `mysql_migration_run` is only set after `pgloader` succeeded. Until then
//! the instructions file is not marked applied, so a failed attempt is
//! re-run by the next invocation.

use crate::config::PathSettings;
use crate::core::changes::{has_changed, mark_applied, write_rendered};
use crate::core::database::{Backend, load_credentials, migration_needed};
use crate::core::kv::{KeyValueStore, keys};
use crate::core::render::{reconfigure, render_and_apply};
use crate::core::resolver::ResolvedConfiguration;
use crate::core::templates::render_commands_load;
use crate::core::version::InstallTarget;
use crate::errors::Result;
use crate::host::{Collaborators, Command, WorkloadStatus};
use tracing::{info, instrument};

pub const COMPLETED_MESSAGE: &str = "Please remove the MySQL relation now migration is complete.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyMigrated,
    NotConfigured,
    /// The instructions were already applied successfully
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    Skipped(SkipReason),
    Completed,
}

/// Moves MySQL data into PostgreSQL if that has not happened yet.
#[instrument(skip_all)]
pub async fn migrate(
    resolved: &ResolvedConfiguration,
    paths: &PathSettings,
    store: &dyn KeyValueStore,
    collaborators: &Collaborators,
) -> Result<MigrationOutcome> {
    if !migration_needed(store).await? {
        let reason = if store.get_flag(keys::MYSQL_MIGRATION_RUN).await? {
            info!("MySQL data was already migrated");
            SkipReason::AlreadyMigrated
        } else {
            info!("MySQL and PostgreSQL are not both configured, nothing to migrate");
            SkipReason::NotConfigured
        };
        return Ok(MigrationOutcome::Skipped(reason));
    }

    let (Some(mysql), Some(pgsql)) = (
        load_credentials(store, Backend::MySql).await?,
        load_credentials(store, Backend::Postgres).await?,
    ) else {
        return Ok(MigrationOutcome::Skipped(SkipReason::NotConfigured));
    };

    collaborators
        .status
        .set(WorkloadStatus::Maintenance, "Migrating MySQL data to PostgreSQL")
        .await;
    collaborators
        .packages
        .install("pgloader", &InstallTarget::Latest)
        .await?;

    let instructions =
        write_rendered(&paths.commands_file, &render_commands_load(&mysql, &pgsql)?).await?;
    if !has_changed(store, &instructions).await? {
        info!("Migration instructions were already applied");
        collaborators
            .status
            .set(WorkloadStatus::Maintenance, COMPLETED_MESSAGE)
            .await;
        return Ok(MigrationOutcome::Skipped(SkipReason::Unchanged));
    }

    render_and_apply(resolved, paths, store, collaborators).await?;
    reconfigure(collaborators.commands.as_ref(), paths).await?;
    info!("Running pgloader with {:?}", instructions.path);
    collaborators
        .commands
        .run(&Command::from_path(&paths.pgloader).arg(instructions.path.display().to_string()))
        .await?;

    store.set_flag(keys::MYSQL_MIGRATION_RUN, true).await?;
    mark_applied(store, &instructions).await?;
    collaborators
        .status
        .set(WorkloadStatus::Maintenance, COMPLETED_MESSAGE)
        .await;
    info!("MySQL to PostgreSQL migration complete");
    Ok(MigrationOutcome::Completed)
}
