//! Unit state entity - Stores the agent's durable key-value pairs.
//! Relation-supplied endpoint credentials, the migration record and the
//! hashes of applied configuration files all live here.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Unit state database model - one row per key
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "unit_state")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i32,
    /// State key (e.g., `"pgsql_host"`, `"mysql_migration_run"`)
    #[sea_orm(unique)]
    pub key: String,
    /// Value stored as string
    pub value: String,
    /// When this key was last written
    pub updated_at: DateTime,
}

/// `UnitState` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
