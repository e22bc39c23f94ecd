//! Orchestration hook tools.
//!
//! The orchestration platform exposes unit status, port exposure, network
//! lookups and relation data through small CLI tools available while a hook
//! runs. [`HookTools`] wraps them behind the collaborator traits.

use crate::core::ports::Port;
use crate::core::proxy::ProxyRoute;
use crate::errors::{Error, Result};
use crate::host::command::{Command, CommandRunner};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Workload status shown by the orchestration platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadStatus {
    Maintenance,
    Blocked,
    Active,
}

impl WorkloadStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Maintenance => "maintenance",
            Self::Blocked => "blocked",
            Self::Active => "active",
        }
    }
}

impl fmt::Display for WorkloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reports workload status. Reporting is best effort and never fails an operation.
#[async_trait]
pub trait StatusReporter: Send + Sync {
    async fn set(&self, status: WorkloadStatus, message: &str);
}

/// Opens and closes ports on the unit
#[async_trait]
pub trait PortControl: Send + Sync {
    async fn opened_ports(&self) -> Result<Vec<Port>>;
    async fn open_port(&self, port: &Port) -> Result<()>;
    async fn close_port(&self, port: &Port) -> Result<()>;
}

/// Facts about the host the agent runs on
#[async_trait]
pub trait HostInfo: Send + Sync {
    /// Fully qualified domain name of the host
    async fn fqdn(&self) -> Result<String>;

    /// Address peers on `relation` should use to reach this unit
    async fn ingress_address(&self, relation: &str) -> Result<String>;
}

/// The reverse-proxy relation
#[async_trait]
pub trait ProxyRelation: Send + Sync {
    async fn configure(&self, routes: &[ProxyRoute]) -> Result<()>;
}

/// Hook tool backed implementation of the orchestration collaborators
pub struct HookTools {
    commands: Arc<dyn CommandRunner>,
}

impl HookTools {
    #[must_use]
    pub fn new(commands: Arc<dyn CommandRunner>) -> Self {
        Self { commands }
    }
}

#[async_trait]
impl StatusReporter for HookTools {
    async fn set(&self, status: WorkloadStatus, message: &str) {
        debug!("Setting workload status {}: {}", status, message);
        let command = Command::new("status-set").args([status.as_str(), message]);
        if let Err(e) = self.commands.run(&command).await {
            warn!("Failed to set workload status: {}", e);
        }
    }
}

#[async_trait]
impl PortControl for HookTools {
    #[instrument(skip(self))]
    async fn opened_ports(&self) -> Result<Vec<Port>> {
        let output = self.commands.run(&Command::new("opened-ports")).await?;
        let mut ports = Vec::new();
        for line in output.stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
            match line.parse::<Port>() {
                Ok(port) => ports.push(port),
                Err(e) => warn!("Ignoring unrecognised opened port '{}': {}", line, e),
            }
        }
        Ok(ports)
    }

    #[instrument(skip(self))]
    async fn open_port(&self, port: &Port) -> Result<()> {
        self.commands
            .run(&Command::new("open-port").arg(port.to_string()))
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn close_port(&self, port: &Port) -> Result<()> {
        self.commands
            .run(&Command::new("close-port").arg(port.to_string()))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl HostInfo for HookTools {
    async fn fqdn(&self) -> Result<String> {
        let output = self
            .commands
            .run(&Command::new("hostname").arg("--fqdn"))
            .await?;
        let fqdn = output.stdout.trim();
        if fqdn.is_empty() {
            return Err(Error::config("hostname reported an empty fqdn"));
        }
        Ok(fqdn.to_string())
    }

    async fn ingress_address(&self, relation: &str) -> Result<String> {
        let output = self
            .commands
            .run(&Command::new("network-get").args([relation, "--ingress-address"]))
            .await?;
        output
            .stdout
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(str::to_string)
            .ok_or_else(|| Error::config(format!("no ingress address for relation {relation}")))
    }
}

#[async_trait]
impl ProxyRelation for HookTools {
    #[instrument(skip(self, routes))]
    async fn configure(&self, routes: &[ProxyRoute]) -> Result<()> {
        let config = serde_json::to_string(routes).map_err(|e| Error::Config {
            message: format!("Failed to encode proxy routes: {e}"),
        })?;
        self.commands
            .run(&Command::new("relation-set").arg(format!("config={config}")))
            .await?;
        Ok(())
    }
}
