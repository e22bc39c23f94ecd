//! Persistent key/value store.
//!
//! Relation handlers write endpoint credentials here, and later invocations
//! read them back; the store outlives any single invocation. [`UnitStateStore`]
//! keeps the pairs in the `unit_state` table.

use crate::{
    entities::{UnitState, unit_state},
    errors::Result,
};
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{Set, prelude::*};
use tracing::{debug, instrument};

/// Key names used in the store
pub mod keys {
    pub const PGSQL_HOST: &str = "pgsql_host";
    pub const PGSQL_PORT: &str = "pgsql_port";
    pub const PGSQL_DB: &str = "pgsql_db";
    pub const PGSQL_USER: &str = "pgsql_user";
    pub const PGSQL_PASS: &str = "pgsql_pass";

    pub const MYSQL_HOST: &str = "mysql_host";
    pub const MYSQL_PORT: &str = "mysql_port";
    pub const MYSQL_DB: &str = "mysql_db";
    pub const MYSQL_USER: &str = "mysql_user";
    pub const MYSQL_PASS: &str = "mysql_pass";

    pub const DB_HOST: &str = "db_host";
    pub const DB_PORT: &str = "db_port";
    pub const DB_DB: &str = "db_db";
    pub const DB_USER: &str = "db_user";
    pub const DB_PASS: &str = "db_pass";
    pub const DB_ADAPTER: &str = "db_adapter";

    pub const REDIS_HOST: &str = "redis_host";
    pub const REDIS_PORT: &str = "redis_port";
    pub const REDIS_PASS: &str = "redis_pass";

    pub const MYSQL_MIGRATION_RUN: &str = "mysql_migration_run";
    pub const REVERSEPROXY_CONFIGURED: &str = "reverseproxy_configured";

    /// Prefix for the hash of the last applied content of a rendered file
    pub const FILE_HASH_PREFIX: &str = "file_hash:";
}

/// Durable string map
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn unset(&self, key: &str) -> Result<()>;

    /// Value of `key` if present and non-empty
    async fn get_present(&self, key: &str) -> Result<Option<String>> {
        Ok(self.get(key).await?.filter(|v| !v.is_empty()))
    }

    /// Boolean flag; anything other than `"true"` reads as unset
    async fn get_flag(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.as_deref() == Some("true"))
    }

    async fn set_flag(&self, key: &str, value: bool) -> Result<()> {
        if value {
            self.set(key, "true").await
        } else {
            self.unset(key).await
        }
    }
}

/// [`KeyValueStore`] backed by the `unit_state` table
#[derive(Debug, Clone)]
pub struct UnitStateStore {
    db: DatabaseConnection,
}

impl UnitStateStore {
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl KeyValueStore for UnitStateStore {
    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let state = UnitState::find()
            .filter(unit_state::Column::Key.eq(key))
            .one(&self.db)
            .await?;
        Ok(state.map(|s| s.value))
    }

    #[instrument(skip(self, value))]
    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let now = Utc::now().naive_utc();

        let existing = UnitState::find()
            .filter(unit_state::Column::Key.eq(key))
            .one(&self.db)
            .await?;

        if let Some(state) = existing {
            let mut active_model: unit_state::ActiveModel = state.into();
            active_model.value = Set(value.to_string());
            active_model.updated_at = Set(now);
            active_model.update(&self.db).await?;
        } else {
            let new_state = unit_state::ActiveModel {
                key: Set(key.to_string()),
                value: Set(value.to_string()),
                updated_at: Set(now),
                ..Default::default()
            };
            new_state.insert(&self.db).await?;
        }

        debug!("Stored unit state key '{}'", key);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn unset(&self, key: &str) -> Result<()> {
        UnitState::delete_many()
            .filter(unit_state::Column::Key.eq(key))
            .exec(&self.db)
            .await?;
        Ok(())
    }
}
