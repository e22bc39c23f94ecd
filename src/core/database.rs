//! Database backend selection.
//!
//! Several database relations can be present at once while a deployment moves
//! from MySQL to PostgreSQL. Exactly one of them is authoritative for a render,
//! chosen by a fixed precedence; a backend only counts once all five of its
//! credential keys are present.

use crate::core::kv::{KeyValueStore, keys};
use crate::errors::Result;
use tracing::debug;

/// A database backend the application can be wired to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// PostgreSQL relation
    Postgres,
    /// MySQL relation
    MySql,
    /// MySQL credentials kept under the legacy `db_*` keys
    LegacyMySql,
}

struct CredentialKeys {
    host: &'static str,
    port: &'static str,
    database: &'static str,
    user: &'static str,
    password: &'static str,
}

impl Backend {
    /// Candidates in precedence order, highest first
    pub const PRECEDENCE: [Self; 3] = [Self::Postgres, Self::MySql, Self::LegacyMySql];

    const fn keys(self) -> CredentialKeys {
        match self {
            Self::Postgres => CredentialKeys {
                host: keys::PGSQL_HOST,
                port: keys::PGSQL_PORT,
                database: keys::PGSQL_DB,
                user: keys::PGSQL_USER,
                password: keys::PGSQL_PASS,
            },
            Self::MySql => CredentialKeys {
                host: keys::MYSQL_HOST,
                port: keys::MYSQL_PORT,
                database: keys::MYSQL_DB,
                user: keys::MYSQL_USER,
                password: keys::MYSQL_PASS,
            },
            Self::LegacyMySql => CredentialKeys {
                host: keys::DB_HOST,
                port: keys::DB_PORT,
                database: keys::DB_DB,
                user: keys::DB_USER,
                password: keys::DB_PASS,
            },
        }
    }

    /// Every store key holding this backend's credentials
    #[must_use]
    pub fn credential_keys(self) -> [&'static str; 5] {
        let k = self.keys();
        [k.host, k.port, k.database, k.user, k.password]
    }
}

/// Connection credentials for one backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseCredentials {
    pub host: String,
    pub port: String,
    pub database: String,
    pub user: String,
    pub password: String,
}

/// The authoritative backend for this run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseEndpoint {
    Postgres(DatabaseCredentials),
    MySql(DatabaseCredentials),
    LegacyMySql {
        credentials: DatabaseCredentials,
        adapter: String,
    },
    /// Nothing fully configured; callers must block
    None,
}

impl DatabaseEndpoint {
    #[must_use]
    pub const fn backend(&self) -> Option<Backend> {
        match self {
            Self::Postgres(_) => Some(Backend::Postgres),
            Self::MySql(_) => Some(Backend::MySql),
            Self::LegacyMySql { .. } => Some(Backend::LegacyMySql),
            Self::None => None,
        }
    }

    #[must_use]
    pub const fn credentials(&self) -> Option<&DatabaseCredentials> {
        match self {
            Self::Postgres(credentials)
            | Self::MySql(credentials)
            | Self::LegacyMySql { credentials, .. } => Some(credentials),
            Self::None => None,
        }
    }

    /// Rails database adapter name for the application configuration
    #[must_use]
    pub fn adapter(&self) -> Option<&str> {
        match self {
            Self::Postgres(_) => Some("postgresql"),
            Self::MySql(_) => Some("mysql2"),
            Self::LegacyMySql { adapter, .. } => Some(adapter),
            Self::None => None,
        }
    }
}

/// Redis endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEndpoint {
    pub host: String,
    pub port: String,
    pub password: Option<String>,
}

/// Reads `backend`'s credentials, `None` unless every key is present.
pub async fn load_credentials(
    store: &dyn KeyValueStore,
    backend: Backend,
) -> Result<Option<DatabaseCredentials>> {
    let k = backend.keys();
    let (Some(host), Some(port), Some(database), Some(user), Some(password)) = (
        store.get_present(k.host).await?,
        store.get_present(k.port).await?,
        store.get_present(k.database).await?,
        store.get_present(k.user).await?,
        store.get_present(k.password).await?,
    ) else {
        return Ok(None);
    };

    Ok(Some(DatabaseCredentials {
        host,
        port,
        database,
        user,
        password,
    }))
}

/// Whether `backend` has a complete credential set.
pub async fn is_configured(store: &dyn KeyValueStore, backend: Backend) -> Result<bool> {
    Ok(load_credentials(store, backend).await?.is_some())
}

/// Picks the highest-precedence fully configured backend.
pub async fn select_backend(store: &dyn KeyValueStore) -> Result<DatabaseEndpoint> {
    for backend in Backend::PRECEDENCE {
        let Some(credentials) = load_credentials(store, backend).await? else {
            continue;
        };
        debug!("{:?} is related and configured in the unit state store", backend);
        let endpoint = match backend {
            Backend::Postgres => DatabaseEndpoint::Postgres(credentials),
            Backend::MySql => DatabaseEndpoint::MySql(credentials),
            Backend::LegacyMySql => DatabaseEndpoint::LegacyMySql {
                credentials,
                adapter: store
                    .get_present(keys::DB_ADAPTER)
                    .await?
                    .unwrap_or_else(|| "mysql2".to_string()),
            },
        };
        return Ok(endpoint);
    }
    Ok(DatabaseEndpoint::None)
}

/// True when MySQL data still has to be moved into PostgreSQL.
pub async fn migration_needed(store: &dyn KeyValueStore) -> Result<bool> {
    Ok(!store.get_flag(keys::MYSQL_MIGRATION_RUN).await?
        && is_configured(store, Backend::MySql).await?
        && is_configured(store, Backend::Postgres).await?)
}

/// Redis endpoint, present once host and port are known.
pub async fn cache_endpoint(store: &dyn KeyValueStore) -> Result<Option<CacheEndpoint>> {
    let (Some(host), Some(port)) = (
        store.get_present(keys::REDIS_HOST).await?,
        store.get_present(keys::REDIS_PORT).await?,
    ) else {
        return Ok(None);
    };
    debug!("Redis is related and configured in the unit state store");
    Ok(Some(CacheEndpoint {
        host,
        port,
        password: store.get_present(keys::REDIS_PASS).await?,
    }))
}
