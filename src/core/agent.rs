//! Lifecycle operations invoked by the orchestration hooks.

use crate::config::Settings;
use crate::core::backup;
use crate::core::database::{CacheEndpoint, DatabaseCredentials};
use crate::core::kv::KeyValueStore;
use crate::core::migration::{MigrationOutcome, migrate};
use crate::core::ports::{close_all, reconcile_ports};
use crate::core::proxy::proxy_routes;
use crate::core::relations;
use crate::core::render::render_and_apply;
use crate::core::resolver::{ResolvedConfiguration, resolve};
use crate::core::upgrade::converge_version;
use crate::errors::Result;
use crate::host::{Collaborators, OperationLock, WorkloadStatus};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Name of the reverse-proxy relation
pub const PROXY_RELATION: &str = "reverseproxy";

/// Relation data delivered or withdrawn by a relation hook
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationChange {
    SavePgsql(DatabaseCredentials),
    SaveMysql(DatabaseCredentials),
    SaveRedis(CacheEndpoint),
    RemovePgsql,
    RemoveMysql,
    RemoveRedis,
    RemoveLegacyDb,
    /// Copy the MySQL relation into the legacy `db_*` keys
    AdoptMysql,
}

/// Settings, state and collaborators for one invocation
pub struct Agent {
    settings: Settings,
    store: Arc<dyn KeyValueStore>,
    collaborators: Collaborators,
}

impl Agent {
    #[must_use]
    pub fn new(
        settings: Settings,
        store: Arc<dyn KeyValueStore>,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            settings,
            store,
            collaborators,
        }
    }

    #[must_use]
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    async fn resolve(&self) -> Result<ResolvedConfiguration> {
        resolve(
            &self.settings,
            self.store.as_ref(),
            self.collaborators.host.as_ref(),
        )
        .await
    }

    /// Renders and applies the configuration, reconciles ports and converges
    /// the package version.
    ///
    /// Returns `false` when the configuration is blocked on missing database
    /// relations; the version check still runs in that case.
    #[instrument(skip(self))]
    pub async fn configure(&self) -> Result<bool> {
        let _lock = OperationLock::acquire(&self.settings.paths.lock_file).await?;
        let resolved = self.resolve().await?;

        let applied = render_and_apply(
            &resolved,
            &self.settings.paths,
            self.store.as_ref(),
            &self.collaborators,
        )
        .await?;

        let ports = self.collaborators.ports.as_ref();
        if applied {
            reconcile_ports(ports, &resolved.desired_ports()).await?;
        } else {
            close_all(ports).await?;
        }

        self.converge(&resolved).await?;

        if applied {
            self.collaborators
                .status
                .set(WorkloadStatus::Active, "GitLab is ready")
                .await;
        }
        Ok(applied)
    }

    /// Converges the package version without rendering.
    #[instrument(skip(self))]
    pub async fn upgrade(&self) -> Result<bool> {
        let _lock = OperationLock::acquire(&self.settings.paths.lock_file).await?;
        let resolved = self.resolve().await?;
        self.converge(&resolved).await
    }

    async fn converge(&self, resolved: &ResolvedConfiguration) -> Result<bool> {
        let upgraded = converge_version(
            resolved,
            &self.settings.upgrade,
            &self.settings.paths,
            &self.collaborators,
        )
        .await?;
        if upgraded {
            info!("{} was upgraded", resolved.package_name());
        }
        Ok(upgraded)
    }

    pub async fn backup(&self) -> Result<()> {
        backup::backup(&self.settings.paths, &self.collaborators).await
    }

    #[instrument(skip(self))]
    pub async fn migrate_db(&self) -> Result<MigrationOutcome> {
        let _lock = OperationLock::acquire(&self.settings.paths.lock_file).await?;
        let resolved = self.resolve().await?;
        migrate(
            &resolved,
            &self.settings.paths,
            self.store.as_ref(),
            &self.collaborators,
        )
        .await
    }

    /// Publishes proxy routes and switches SSH to the proxied port.
    #[instrument(skip(self))]
    pub async fn configure_proxy(&self) -> Result<()> {
        let resolved = self.resolve().await?;
        let internal_host = if resolved.proxy_via_ip {
            self.collaborators
                .host
                .ingress_address(PROXY_RELATION)
                .await?
        } else {
            self.collaborators.host.fqdn().await?
        };

        let routes = proxy_routes(&resolved, &internal_host);
        self.collaborators.proxy.configure(&routes).await?;
        relations::set_proxy_configured(self.store.as_ref(), true).await
    }

    pub async fn proxy_removed(&self) -> Result<()> {
        relations::set_proxy_configured(self.store.as_ref(), false).await
    }

    /// Records relation data in the store.
    #[instrument(skip_all)]
    pub async fn apply_relation(&self, change: RelationChange) -> Result<()> {
        let store = self.store.as_ref();
        match change {
            RelationChange::SavePgsql(credentials) => {
                relations::save_pgsql_conf(store, &credentials).await
            }
            RelationChange::SaveMysql(credentials) => {
                relations::save_mysql_conf(store, &credentials).await
            }
            RelationChange::SaveRedis(cache) => relations::save_redis_conf(store, &cache).await,
            RelationChange::RemovePgsql => relations::remove_pgsql_conf(store).await,
            RelationChange::RemoveMysql => relations::remove_mysql_conf(store).await,
            RelationChange::RemoveRedis => relations::remove_redis_conf(store).await,
            RelationChange::RemoveLegacyDb => relations::remove_legacy_db_conf(store).await,
            RelationChange::AdoptMysql => {
                if !relations::migrate_mysql_config(store).await? {
                    warn!("No complete MySQL relation data to adopt");
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::database::Backend;
    use crate::core::kv::keys;
    use crate::core::ports::{Port, PortSet};
    use crate::core::render::MISSING_DB_MESSAGE;
    use crate::test_utils::{
        FakePackages, FakePorts, Fakes, setup_test_store, test_credentials, test_settings,
    };
    use tempfile::TempDir;

    async fn agent_with(fakes: &Fakes) -> Result<(TempDir, Agent)> {
        let dir = tempfile::tempdir()?;
        let store = Arc::new(setup_test_store().await?);
        let agent = Agent::new(test_settings(dir.path()), store, fakes.collaborators());
        Ok((dir, agent))
    }

    fn installed_fakes() -> Fakes {
        let mut fakes =
            Fakes::with_packages(FakePackages::new(["13.12.0"], Some("13.12.0")));
        fakes.ports = Arc::new(FakePorts::with_open(["443/tcp"]));
        fakes
    }

    #[tokio::test]
    async fn test_configure_opens_desired_ports() -> Result<()> {
        let fakes = installed_fakes();
        let (_dir, agent) = agent_with(&fakes).await?;
        agent
            .apply_relation(RelationChange::SavePgsql(test_credentials(Backend::Postgres)))
            .await?;

        assert!(agent.configure().await?);

        let expected: PortSet = [Port::tcp(80), Port::tcp(22)].into_iter().collect();
        assert_eq!(fakes.ports.open_set(), expected);
        assert_eq!(
            fakes.status.last(),
            Some((WorkloadStatus::Active, "GitLab is ready".to_string()))
        );
        assert!(agent.settings().paths.gitlab_config.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_blocked_configure_closes_ports_and_still_upgrades() -> Result<()> {
        let mut fakes = Fakes::with_packages(FakePackages::new(
            ["13.12.0", "14.0.0"],
            Some("13.12.0"),
        ));
        fakes.ports = Arc::new(FakePorts::with_open(["80/tcp", "22/tcp"]));
        let (_dir, agent) = agent_with(&fakes).await?;

        assert!(!agent.configure().await?);

        assert!(fakes.ports.open_set().is_empty());
        assert!(
            fakes
                .status
                .history()
                .contains(&(WorkloadStatus::Blocked, MISSING_DB_MESSAGE.to_string()))
        );
        assert_ne!(fakes.status.last().map(|(s, _)| s), Some(WorkloadStatus::Active));
        assert!(!fakes.packages.installs().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_configure_proxy_switches_ssh_port() -> Result<()> {
        let fakes = installed_fakes();
        let (_dir, agent) = agent_with(&fakes).await?;
        agent
            .apply_relation(RelationChange::SaveMysql(test_credentials(Backend::MySql)))
            .await?;

        agent.configure_proxy().await?;
        agent.configure().await?;

        let routes = fakes.proxy.last_routes();
        assert_eq!(routes.len(), 2);
        assert!(routes.iter().all(|r| r.internal_host == "mock.example.com"));
        assert!(fakes.ports.open_set().contains(&Port::tcp(2222)));

        agent.proxy_removed().await?;
        agent.configure().await?;
        assert!(fakes.ports.open_set().contains(&Port::tcp(22)));
        assert!(!fakes.ports.open_set().contains(&Port::tcp(2222)));
        Ok(())
    }

    #[tokio::test]
    async fn test_configure_proxy_via_ingress_address() -> Result<()> {
        let fakes = installed_fakes();
        let dir = tempfile::tempdir()?;
        let store = Arc::new(setup_test_store().await?);
        let mut settings = test_settings(dir.path());
        settings.network.proxy_via_ip = true;
        let agent = Agent::new(settings, store.clone(), fakes.collaborators());

        agent.configure_proxy().await?;

        assert!(
            fakes
                .proxy
                .last_routes()
                .iter()
                .all(|r| r.internal_host == "10.0.0.5")
        );
        assert!(store.get_flag(keys::REVERSEPROXY_CONFIGURED).await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_adopted_mysql_survives_relation_removal() -> Result<()> {
        let fakes = installed_fakes();
        let (_dir, agent) = agent_with(&fakes).await?;

        agent
            .apply_relation(RelationChange::SaveMysql(test_credentials(Backend::MySql)))
            .await?;
        agent.apply_relation(RelationChange::AdoptMysql).await?;
        agent.apply_relation(RelationChange::RemoveMysql).await?;

        assert!(agent.configure().await?);
        let rb = std::fs::read_to_string(&agent.settings().paths.gitlab_config)?;
        assert!(rb.contains("gitlab_rails['db_adapter'] = 'mysql2'"));

        agent.apply_relation(RelationChange::RemoveLegacyDb).await?;
        assert!(!agent.configure().await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_migrate_db_completes() -> Result<()> {
        let fakes = installed_fakes();
        let (_dir, agent) = agent_with(&fakes).await?;
        agent
            .apply_relation(RelationChange::SaveMysql(test_credentials(Backend::MySql)))
            .await?;

        assert_eq!(
            agent.migrate_db().await?,
            MigrationOutcome::Skipped(crate::core::migration::SkipReason::NotConfigured)
        );

        agent
            .apply_relation(RelationChange::SavePgsql(test_credentials(Backend::Postgres)))
            .await?;
        assert_eq!(agent.migrate_db().await?, MigrationOutcome::Completed);
        Ok(())
    }

    #[tokio::test]
    async fn test_backup() -> Result<()> {
        let fakes = installed_fakes();
        let (_dir, agent) = agent_with(&fakes).await?;

        agent.backup().await?;

        assert_eq!(fakes.backup.runs(), 1);
        Ok(())
    }
}
