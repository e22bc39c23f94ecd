//! Static deployment settings loaded from config.toml
//!
//! These are the operator-supplied options for the unit: which package edition
//! to manage, an optional version pin, listen ports, SMTP and email identity,
//! and the on-host paths the agent writes to. Every field has a default so a
//! partial (or empty) file is valid. Empty strings are treated as unset, which
//! matches how the orchestration platform hands over blank options.

use crate::errors::{Error, Result};
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};

/// Environment variable naming the settings file
pub const CONFIG_PATH_ENV: &str = "OMNIBUS_AGENT_CONFIG";

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Managed package and its repository
    pub package: PackageSettings,
    /// External URL and listen ports
    pub network: NetworkSettings,
    /// Outbound mail relay
    pub smtp: SmtpSettings,
    /// Sender identity for outgoing mail
    pub email: EmailSettings,
    /// Files and binaries on the host
    pub paths: PathSettings,
    /// Upgrade loop tuning
    pub upgrade: UpgradeSettings,
    /// Backup helper invocation
    pub backup: BackupSettings,
}

/// Managed package configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PackageSettings {
    /// `gitlab-ee` selects the enterprise edition; anything else means `gitlab-ce`
    pub name: String,
    /// Version pin; latest available when unset
    #[serde(deserialize_with = "empty_as_none")]
    pub version: Option<String>,
    /// Base URL of the apt repository
    pub apt_repo: String,
    /// Signing key fingerprint for the apt repository
    #[serde(deserialize_with = "empty_as_none")]
    pub apt_key: Option<String>,
}

/// Network-facing configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    /// External URL; `http://<fqdn>` when unset
    #[serde(deserialize_with = "empty_as_none")]
    pub external_url: Option<String>,
    /// Port the bundled web server listens on
    pub http_port: u16,
    /// Port the bundled SSH server listens on
    pub ssh_port: u16,
    /// SSH port exposed by the reverse proxy
    pub proxy_ssh_port: u16,
    /// Hand the proxy our ingress address instead of our fqdn
    pub proxy_via_ip: bool,
}

/// SMTP relay configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SmtpSettings {
    #[serde(deserialize_with = "empty_as_none")]
    pub server: Option<String>,
    pub port: Option<u16>,
    #[serde(deserialize_with = "empty_as_none")]
    pub user: Option<String>,
    #[serde(deserialize_with = "empty_as_none")]
    pub password: Option<String>,
    /// HELO domain; defaults to the SSH host
    #[serde(deserialize_with = "empty_as_none")]
    pub domain: Option<String>,
    pub authentication: String,
    pub tls: bool,
}

/// Email identity configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EmailSettings {
    #[serde(deserialize_with = "empty_as_none")]
    pub from: Option<String>,
    #[serde(deserialize_with = "empty_as_none")]
    pub display_name: Option<String>,
    #[serde(deserialize_with = "empty_as_none")]
    pub reply_to: Option<String>,
}

/// On-host paths
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    /// Rendered application configuration
    pub gitlab_config: PathBuf,
    /// Rendered pgloader instructions
    pub commands_file: PathBuf,
    /// Advisory lock serializing agent operations
    pub lock_file: PathBuf,
    pub gitlab_ctl: PathBuf,
    pub gitlab_backup: PathBuf,
    pub pgloader: PathBuf,
}

/// Upgrade loop configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpgradeSettings {
    /// Attempts at refreshing and reading the package index before giving up
    pub index_attempts: u32,
    /// Delay between index attempts, in milliseconds
    pub index_retry_delay_ms: u64,
}

/// Backup helper configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BackupSettings {
    /// argv of the helper run after the application backup; skipped when empty
    pub helper_command: Vec<String>,
}

impl Default for PackageSettings {
    fn default() -> Self {
        Self {
            name: "gitlab-ce".to_string(),
            version: None,
            apt_repo: "https://packages.gitlab.com/gitlab".to_string(),
            apt_key: None,
        }
    }
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            external_url: None,
            http_port: 80,
            ssh_port: 22,
            proxy_ssh_port: 2222,
            proxy_via_ip: false,
        }
    }
}

impl Default for SmtpSettings {
    fn default() -> Self {
        Self {
            server: None,
            port: None,
            user: None,
            password: None,
            domain: None,
            authentication: "login".to_string(),
            tls: true,
        }
    }
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            gitlab_config: PathBuf::from("/etc/gitlab/gitlab.rb"),
            commands_file: PathBuf::from("/etc/gitlab/commands.load"),
            lock_file: PathBuf::from("/var/lib/omnibus-agent/agent.lock"),
            gitlab_ctl: PathBuf::from("/usr/bin/gitlab-ctl"),
            gitlab_backup: PathBuf::from("/usr/bin/gitlab-backup"),
            pgloader: PathBuf::from("/usr/bin/pgloader"),
        }
    }
}

impl Default for UpgradeSettings {
    fn default() -> Self {
        Self {
            index_attempts: 3,
            index_retry_delay_ms: 2000,
        }
    }
}

fn empty_as_none<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|v| !v.trim().is_empty()))
}

/// Parses settings from TOML text.
pub fn parse_config(contents: &str) -> Result<Settings> {
    toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse settings: {e}"),
    })
}

/// Loads settings from a TOML file
///
/// # Errors
/// Returns an error if the file cannot be read or is not valid TOML for
/// [`Settings`]. An unreadable settings file is fatal for every operation.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Settings> {
    let path_ref = path.as_ref();
    tracing::debug!("Attempting to load settings from: {:?}", path_ref);
    let contents = std::fs::read_to_string(path_ref).map_err(|e| Error::Config {
        message: format!("Failed to read settings file {}: {e}", path_ref.display()),
    })?;
    parse_config(&contents)
}

/// Loads settings from `OMNIBUS_AGENT_CONFIG`, or `./config.toml` when unset
pub fn load_default_config() -> Result<Settings> {
    let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "config.toml".to_string());
    load_config(path)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let settings = parse_config("").unwrap();
        assert_eq!(settings.package.name, "gitlab-ce");
        assert!(settings.package.version.is_none());
        assert_eq!(settings.network.http_port, 80);
        assert_eq!(settings.network.ssh_port, 22);
        assert_eq!(settings.smtp.authentication, "login");
        assert!(settings.smtp.tls);
        assert_eq!(settings.upgrade.index_attempts, 3);
        assert!(settings.backup.helper_command.is_empty());
    }

    #[test]
    fn test_parse_full_settings() {
        let toml_str = r#"
            [package]
            name = "gitlab-ee"
            version = "13.8.4"

            [network]
            external_url = "https://git.example.com"
            ssh_port = 2022
            proxy_via_ip = true

            [smtp]
            server = "smtp.example.com"
            port = 587
            tls = false

            [backup]
            helper_command = ["/usr/local/bin/backup-helper", "run"]
        "#;

        let settings = parse_config(toml_str).unwrap();
        assert_eq!(settings.package.name, "gitlab-ee");
        assert_eq!(settings.package.version.as_deref(), Some("13.8.4"));
        assert_eq!(
            settings.network.external_url.as_deref(),
            Some("https://git.example.com")
        );
        assert_eq!(settings.network.ssh_port, 2022);
        assert_eq!(settings.network.http_port, 80);
        assert!(settings.network.proxy_via_ip);
        assert_eq!(settings.smtp.port, Some(587));
        assert!(!settings.smtp.tls);
        assert_eq!(settings.backup.helper_command.len(), 2);
    }

    #[test]
    fn test_blank_strings_are_unset() {
        let toml_str = r#"
            [package]
            version = ""

            [network]
            external_url = "  "
        "#;

        let settings = parse_config(toml_str).unwrap();
        assert!(settings.package.version.is_none());
        assert!(settings.network.external_url.is_none());
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let result = parse_config("[network]\nhttp_port = \"eighty\"");
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_example_config_matches_defaults() {
        let settings = parse_config(include_str!("../../config.example.toml")).unwrap();
        let defaults = Settings::default();
        assert_eq!(settings.package.apt_repo, defaults.package.apt_repo);
        assert_eq!(settings.network.proxy_ssh_port, defaults.network.proxy_ssh_port);
        assert_eq!(settings.paths.lock_file, defaults.paths.lock_file);
        assert_eq!(
            settings.upgrade.index_retry_delay_ms,
            defaults.upgrade.index_retry_delay_ms
        );
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let result = load_config("/nonexistent/omnibus-agent/config.toml");
        assert!(matches!(result, Err(Error::Config { .. })));
    }
}
