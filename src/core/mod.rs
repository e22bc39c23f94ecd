/// Lifecycle operations driven by the CLI
pub mod agent;
/// Application backup
pub mod backup;
/// Rendered file change tracking
pub mod changes;
/// Database backend selection
pub mod database;
/// Persistent key/value store
pub mod kv;
/// MySQL to PostgreSQL migration
pub mod migration;
/// Open port reconciliation
pub mod ports;
/// Reverse-proxy routes
pub mod proxy;
/// Relation data handlers
pub mod relations;
/// Render & apply of `gitlab.rb`
pub mod render;
/// Per-invocation configuration snapshot
pub mod resolver;
/// `gitlab.rb` and `pgloader` templates
pub mod templates;
/// Package version convergence
pub mod upgrade;
/// Package versions and install targets
pub mod version;

pub use agent::{Agent, RelationChange};
pub use migration::{MigrationOutcome, SkipReason};
