//! Relation data handlers.
//!
//! Each relation hook hands over endpoint data which is stored verbatim so
//! that later `configure` runs can pick it up. Breaking a relation removes its
//! keys again.

use crate::core::database::{Backend, CacheEndpoint, DatabaseCredentials, load_credentials};
use crate::core::kv::{KeyValueStore, keys};
use crate::errors::Result;
use tracing::{debug, info, instrument};

async fn save_credentials(
    store: &dyn KeyValueStore,
    backend: Backend,
    credentials: &DatabaseCredentials,
) -> Result<()> {
    let [host, port, database, user, password] = backend.credential_keys();
    store.set(host, &credentials.host).await?;
    store.set(port, &credentials.port).await?;
    store.set(database, &credentials.database).await?;
    store.set(user, &credentials.user).await?;
    store.set(password, &credentials.password).await?;
    Ok(())
}

async fn remove_credentials(store: &dyn KeyValueStore, backend: Backend) -> Result<()> {
    for key in backend.credential_keys() {
        store.unset(key).await?;
    }
    Ok(())
}

/// Stores the PostgreSQL relation's master endpoint.
#[instrument(skip(store, credentials), fields(host = %credentials.host))]
pub async fn save_pgsql_conf(
    store: &dyn KeyValueStore,
    credentials: &DatabaseCredentials,
) -> Result<()> {
    debug!("Saving related PostgreSQL database config");
    save_credentials(store, Backend::Postgres, credentials).await
}

/// Stores the MySQL relation's endpoint.
#[instrument(skip(store, credentials), fields(host = %credentials.host))]
pub async fn save_mysql_conf(
    store: &dyn KeyValueStore,
    credentials: &DatabaseCredentials,
) -> Result<()> {
    debug!("Saving related MySQL database config");
    save_credentials(store, Backend::MySql, credentials).await
}

/// Stores the Redis relation's endpoint; a missing password clears any old one.
#[instrument(skip(store, cache), fields(host = %cache.host))]
pub async fn save_redis_conf(store: &dyn KeyValueStore, cache: &CacheEndpoint) -> Result<()> {
    store.set(keys::REDIS_HOST, &cache.host).await?;
    store.set(keys::REDIS_PORT, &cache.port).await?;
    match cache.password.as_deref().filter(|p| !p.is_empty()) {
        Some(password) => store.set(keys::REDIS_PASS, password).await,
        None => store.unset(keys::REDIS_PASS).await,
    }
}

pub async fn remove_pgsql_conf(store: &dyn KeyValueStore) -> Result<()> {
    remove_credentials(store, Backend::Postgres).await
}

pub async fn remove_mysql_conf(store: &dyn KeyValueStore) -> Result<()> {
    remove_credentials(store, Backend::MySql).await
}

pub async fn remove_redis_conf(store: &dyn KeyValueStore) -> Result<()> {
    store.unset(keys::REDIS_HOST).await?;
    store.unset(keys::REDIS_PORT).await?;
    store.unset(keys::REDIS_PASS).await
}

/// Removes the legacy `db_*` credentials, adapter included.
pub async fn remove_legacy_db_conf(store: &dyn KeyValueStore) -> Result<()> {
    remove_credentials(store, Backend::LegacyMySql).await?;
    store.unset(keys::DB_ADAPTER).await
}

/// Copies a complete MySQL record into the legacy `db_*` keys.
///
/// Returns `false` when there is no complete MySQL record to copy.
pub async fn migrate_mysql_config(store: &dyn KeyValueStore) -> Result<bool> {
    let Some(credentials) = load_credentials(store, Backend::MySql).await? else {
        return Ok(false);
    };
    save_credentials(store, Backend::LegacyMySql, &credentials).await?;
    store.set(keys::DB_ADAPTER, "mysql2").await?;
    info!("Copied MySQL relation data into the legacy database keys");
    Ok(true)
}

/// Records whether the reverse-proxy relation is established.
pub async fn set_proxy_configured(store: &dyn KeyValueStore, configured: bool) -> Result<()> {
    store
        .set_flag(keys::REVERSEPROXY_CONFIGURED, configured)
        .await
}
