//! Network exposure.
//!
//! Reconciles the unit's open ports with the ports the application should
//! expose. Running it twice with the same desired set does nothing the second time.

use crate::errors::{Error, Result};
use crate::host::PortControl;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use tracing::{info, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
}

/// A port in `N/proto` form
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Port {
    pub number: u16,
    pub protocol: Protocol,
}

impl Port {
    #[must_use]
    pub const fn tcp(number: u16) -> Self {
        Self {
            number,
            protocol: Protocol::Tcp,
        }
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let protocol = match self.protocol {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        };
        write!(f, "{}/{protocol}", self.number)
    }
}

impl FromStr for Port {
    type Err = Error;

    /// Accepts `80/tcp`, `53/udp`, or a bare `80` (tcp)
    fn from_str(s: &str) -> Result<Self> {
        let (number, protocol) = s.trim().split_once('/').unwrap_or((s.trim(), "tcp"));
        let protocol = match protocol.to_ascii_lowercase().as_str() {
            "tcp" => Protocol::Tcp,
            "udp" => Protocol::Udp,
            other => return Err(Error::config(format!("unknown port protocol '{other}'"))),
        };
        let number = number
            .parse::<u16>()
            .map_err(|e| Error::config(format!("invalid port '{s}': {e}")))?;
        Ok(Self { number, protocol })
    }
}

/// Ports the unit should have open
pub type PortSet = BTreeSet<Port>;

/// What a reconcile pass changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortChanges {
    pub opened: Vec<Port>,
    pub closed: Vec<Port>,
}

impl PortChanges {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.opened.is_empty() && self.closed.is_empty()
    }
}

/// Closes open ports outside `desired` and opens the missing ones.
#[instrument(skip(ports))]
pub async fn reconcile_ports(ports: &dyn PortControl, desired: &PortSet) -> Result<PortChanges> {
    let opened: PortSet = ports.opened_ports().await?.into_iter().collect();
    let mut changes = PortChanges::default();

    for port in opened.difference(desired) {
        info!("Closing port {}", port);
        ports.close_port(port).await?;
        changes.closed.push(*port);
    }
    for port in desired.difference(&opened) {
        info!("Opening port {}", port);
        ports.open_port(port).await?;
        changes.opened.push(*port);
    }
    Ok(changes)
}

/// Closes every open port.
pub async fn close_all(ports: &dyn PortControl) -> Result<PortChanges> {
    reconcile_ports(ports, &PortSet::new()).await
}
