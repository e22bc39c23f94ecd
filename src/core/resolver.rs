//! Configuration resolution.
//!
//! Combines the static settings with persisted relation state into the
//! snapshot every other component works from. The snapshot is rebuilt on each
//! invocation and never cached.

use crate::config::{EmailSettings, Settings, SmtpSettings};
use crate::core::kv::{KeyValueStore, keys};
use crate::core::ports::{Port, PortSet};
use crate::core::version::PackageVersion;
use crate::errors::Result;
use crate::host::HostInfo;
use std::fmt;
use tracing::{debug, instrument};
use url::Url;

/// Which product edition the deployment manages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageEdition {
    Community,
    Enterprise,
}

impl PackageEdition {
    /// `gitlab-ee` selects the enterprise edition; everything else is community
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        if name.trim() == "gitlab-ee" {
            Self::Enterprise
        } else {
            Self::Community
        }
    }

    #[must_use]
    pub const fn package_name(self) -> &'static str {
        match self {
            Self::Community => "gitlab-ce",
            Self::Enterprise => "gitlab-ee",
        }
    }
}

impl fmt::Display for PackageEdition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.package_name())
    }
}

/// Per-invocation view of everything the agent needs to decide on
#[derive(Debug, Clone)]
pub struct ResolvedConfiguration {
    pub edition: PackageEdition,
    pub version_pin: Option<PackageVersion>,
    pub external_url: String,
    pub ssh_host: String,
    /// SSH port advertised to users
    pub ssh_port: u16,
    /// SSH port the unit itself listens on
    pub local_ssh_port: u16,
    pub proxy_ssh_port: u16,
    pub http_port: u16,
    pub proxy_configured: bool,
    pub proxy_via_ip: bool,
    pub smtp_enabled: bool,
    pub smtp_domain: String,
    pub smtp: SmtpSettings,
    pub email: EmailSettings,
}

impl ResolvedConfiguration {
    #[must_use]
    pub fn package_name(&self) -> &'static str {
        self.edition.package_name()
    }

    /// `https` or `http`, from the external URL
    #[must_use]
    pub fn external_scheme(&self) -> String {
        Url::parse(&self.external_url)
            .map(|u| u.scheme().to_string())
            .unwrap_or_else(|_| "http".to_string())
    }

    /// Host portion of the external URL
    #[must_use]
    pub fn external_host(&self) -> Option<String> {
        url_hostname(&self.external_url)
    }

    /// Ports that should be open while the application is configured
    #[must_use]
    pub fn desired_ports(&self) -> PortSet {
        [Port::tcp(self.http_port), Port::tcp(self.ssh_port)]
            .into_iter()
            .collect()
    }
}

fn url_hostname(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .filter(|h| !h.is_empty())
}

/// Builds the [`ResolvedConfiguration`] for this invocation.
///
/// # Errors
/// Fails if the version pin does not parse, or if the store or host lookup fails.
#[instrument(skip_all)]
pub async fn resolve(
    settings: &Settings,
    store: &dyn KeyValueStore,
    host: &dyn HostInfo,
) -> Result<ResolvedConfiguration> {
    let version_pin = settings
        .package
        .version
        .as_deref()
        .map(PackageVersion::parse)
        .transpose()?;

    let external_url = match &settings.network.external_url {
        Some(url) => url.clone(),
        None => format!("http://{}", host.fqdn().await?),
    };

    let ssh_host = match url_hostname(&external_url) {
        Some(hostname) => hostname,
        None => host.fqdn().await?,
    };

    let proxy_configured = store.get_flag(keys::REVERSEPROXY_CONFIGURED).await?;
    let ssh_port = if proxy_configured {
        settings.network.proxy_ssh_port
    } else {
        settings.network.ssh_port
    };

    let smtp_enabled = settings.smtp.server.is_some() && settings.smtp.port.is_some();
    let smtp_domain = settings
        .smtp
        .domain
        .clone()
        .unwrap_or_else(|| ssh_host.clone());

    let resolved = ResolvedConfiguration {
        edition: PackageEdition::from_name(&settings.package.name),
        version_pin,
        external_url,
        ssh_host,
        ssh_port,
        local_ssh_port: settings.network.ssh_port,
        proxy_ssh_port: settings.network.proxy_ssh_port,
        http_port: settings.network.http_port,
        proxy_configured,
        proxy_via_ip: settings.network.proxy_via_ip,
        smtp_enabled,
        smtp_domain,
        smtp: settings.smtp.clone(),
        email: settings.email.clone(),
    };
    debug!("Resolved configuration: {:?}", resolved);
    Ok(resolved)
}
