//! Package versions.
//!
//! Versions are compared as three-component semantic versions. Omnibus
//! packages carry their edition as a pre-release tag (`13.8.4-ce.0`), which
//! `semver` accepts as-is.

use crate::errors::{Error, Result};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// A semantic version of the managed package
///
/// Equality and ordering only look at `major.minor.patch`; the edition tag
/// apt reports (`-ce.0`) does not make a release newer or older.
#[derive(Debug, Clone)]
pub struct PackageVersion(semver::Version);

impl PackageVersion {
    /// Parse a version string
    pub fn parse(version: &str) -> Result<Self> {
        semver::Version::parse(version.trim())
            .map(Self)
            .map_err(|e| Error::InvalidVersion {
                version: version.to_string(),
                message: e.to_string(),
            })
    }

    /// Major component, the only component that drives upgrade branching
    #[must_use]
    pub const fn major(&self) -> u64 {
        self.0.major
    }

    const fn release(&self) -> (u64, u64, u64) {
        (self.0.major, self.0.minor, self.0.patch)
    }
}

impl PartialEq for PackageVersion {
    fn eq(&self, other: &Self) -> bool {
        self.release() == other.release()
    }
}

impl Eq for PackageVersion {}

impl PartialOrd for PackageVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PackageVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.release().cmp(&other.release())
    }
}

impl Hash for PackageVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.release().hash(state);
    }
}

impl FromStr for PackageVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// What to ask the package manager for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallTarget {
    /// Newest version in the index
    Latest,
    /// One specific version
    Exact(PackageVersion),
    /// Newest version within a major line (`<major>.*`)
    Major(u64),
}

impl InstallTarget {
    /// apt-style package spec (`name`, `name=1.2.3`, `name=13.*`)
    #[must_use]
    pub fn package_spec(&self, name: &str) -> String {
        match self {
            Self::Latest => name.to_string(),
            Self::Exact(version) => format!("{name}={version}"),
            Self::Major(major) => format!("{name}={major}.*"),
        }
    }
}

impl fmt::Display for InstallTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest => f.write_str("latest"),
            Self::Exact(version) => version.fmt(f),
            Self::Major(major) => write!(f, "{major}.*"),
        }
    }
}
