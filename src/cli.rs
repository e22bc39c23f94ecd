//! Command line interface definition

use crate::config::CONFIG_PATH_ENV;
use crate::core::RelationChange;
use crate::core::database::{CacheEndpoint, DatabaseCredentials};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// omnibus-agent - lifecycle agent for GitLab Omnibus deployments
#[derive(Parser)]
#[command(name = "omnibus-agent")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Lifecycle agent for GitLab Omnibus deployments")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Use alternate config file
    #[arg(long, global = true, value_name = "PATH", env = CONFIG_PATH_ENV)]
    pub config: Option<PathBuf>,
}

/// Endpoint data handed over by a database relation
#[derive(Args, Debug, Clone)]
pub struct DatabaseArgs {
    #[arg(long)]
    pub host: String,
    #[arg(long)]
    pub port: String,
    #[arg(long)]
    pub database: String,
    #[arg(long)]
    pub user: String,
    #[arg(long, env = "OMNIBUS_AGENT_DB_PASSWORD", hide_env_values = true)]
    pub password: String,
}

impl From<DatabaseArgs> for DatabaseCredentials {
    fn from(args: DatabaseArgs) -> Self {
        Self {
            host: args.host,
            port: args.port,
            database: args.database,
            user: args.user,
            password: args.password,
        }
    }
}

/// Endpoint data handed over by the Redis relation
#[derive(Args, Debug, Clone)]
pub struct RedisArgs {
    #[arg(long)]
    pub host: String,
    #[arg(long)]
    pub port: String,
    #[arg(long, env = "OMNIBUS_AGENT_REDIS_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

impl From<RedisArgs> for CacheEndpoint {
    fn from(args: RedisArgs) -> Self {
        Self {
            host: args.host,
            port: args.port,
            password: args.password,
        }
    }
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render the configuration, reconcile ports and converge the package version
    Configure,

    /// Install or upgrade the package without rendering
    Upgrade,

    /// Create an application backup and run the backup helper
    Backup,

    /// Migrate MySQL data into PostgreSQL
    MigrateDb,

    /// Publish routes to the reverse proxy
    ProxyConfigure,

    /// The reverse-proxy relation was removed
    ProxyRemoved,

    /// Store PostgreSQL relation data
    SavePgsql(DatabaseArgs),

    /// Store MySQL relation data
    SaveMysql(DatabaseArgs),

    /// Store Redis relation data
    SaveRedis(RedisArgs),

    /// Forget PostgreSQL relation data
    RemovePgsql,

    /// Forget MySQL relation data
    RemoveMysql,

    /// Forget Redis relation data
    RemoveRedis,

    /// Forget the legacy database configuration
    RemoveLegacyDb,

    /// Keep the MySQL relation data as the legacy database configuration
    AdoptMysql,
}

impl Commands {
    /// The relation change this command stands for, if any
    #[must_use]
    pub fn into_relation_change(self) -> Option<RelationChange> {
        let change = match self {
            Self::SavePgsql(args) => RelationChange::SavePgsql(args.into()),
            Self::SaveMysql(args) => RelationChange::SaveMysql(args.into()),
            Self::SaveRedis(args) => RelationChange::SaveRedis(args.into()),
            Self::RemovePgsql => RelationChange::RemovePgsql,
            Self::RemoveMysql => RelationChange::RemoveMysql,
            Self::RemoveRedis => RelationChange::RemoveRedis,
            Self::RemoveLegacyDb => RelationChange::RemoveLegacyDb,
            Self::AdoptMysql => RelationChange::AdoptMysql,
            Self::Configure
            | Self::Upgrade
            | Self::Backup
            | Self::MigrateDb
            | Self::ProxyConfigure
            | Self::ProxyRemoved => return None,
        };
        Some(change)
    }
}
