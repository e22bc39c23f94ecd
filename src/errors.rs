use thiserror::Error;

/// Errors raised by the agent.
///
/// Blocked states (missing database relation) are not errors; they are
/// reported through the workload status and an `Ok(false)` return.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    #[error("Command `{command}` failed with status {}: {output}", status.map_or_else(|| "signal".to_string(), |c| c.to_string()))]
    ExternalTool {
        command: String,
        status: Option<i32>,
        output: String,
    },

    #[error("Package index error for {package}: {message}")]
    PackageIndex { package: String, message: String },

    #[error("Invalid version '{version}': {message}")]
    InvalidVersion { version: String, message: String },

    #[error("Upgrade of {package} stalled at major version {major}")]
    UpgradeStalled { package: String, major: u64 },

    #[error("Refusing to downgrade {package} from {installed} to {desired}")]
    DowngradeRefused {
        package: String,
        installed: String,
        desired: String,
    },

    #[error("Failed to lock {path}: {message}")]
    Lock { path: String, message: String },
}

impl Error {
    /// Shorthand for building an [`Error::Config`].
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
