//! State database configuration module.
//!
//! This module handles the `SQLite` connection backing the agent's persistent
//! key/value store and creates its table with `SeaORM`'s
//! `Schema::create_table_from_entity`, so the schema always follows the entity
//! definition without hand-written SQL.

use crate::entities::UnitState;
use crate::errors::Result;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Schema};
use tracing::{debug, instrument};

const DEFAULT_DATABASE_URL: &str = "sqlite:///var/lib/omnibus-agent/state.sqlite?mode=rwc";

/// Gets the state database URL from the `DATABASE_URL` environment variable,
/// falling back to the default on-host `SQLite` file.
#[must_use]
pub fn get_database_url() -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string())
}

/// Establishes a connection to the state database and makes sure its tables exist.
#[instrument]
pub async fn create_connection(database_url: &str) -> Result<DatabaseConnection> {
    debug!("Connecting to state database");
    let db = Database::connect(database_url).await?;
    create_tables(&db).await?;
    Ok(db)
}

/// Creates the `unit_state` table if it does not exist yet.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let mut unit_state_table = schema.create_table_from_entity(UnitState);
    unit_state_table.if_not_exists();

    db.execute(builder.build(&unit_state_table)).await?;

    Ok(())
}
