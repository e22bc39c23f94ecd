/// State database connection and table management
pub mod database;

/// Static deployment settings loaded from config.toml
pub mod settings;

pub use settings::{
    BackupSettings, CONFIG_PATH_ENV, EmailSettings, NetworkSettings, PackageSettings,
    PathSettings, Settings, SmtpSettings, UpgradeSettings, load_config, load_default_config,
};
