//! Shared identity and versioning value types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Monotonic version counter for an application's total configuration.
///
/// Bumped whenever any configuration belonging to the application changes.
/// Clients report the generation they hold as a baseline; servers only ever
/// compare it against their own, never treat it as authoritative.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Generation(pub u64);

impl Generation {
    /// The baseline of a client that holds no configuration yet.
    pub const ZERO: Generation = Generation(0);

    /// The next generation in sequence.
    #[must_use]
    pub fn next(self) -> Generation {
        Generation(self.0 + 1)
    }

    /// The raw counter value.
    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies one deployed application: a tenant plus an application name.
///
/// Rendered as `tenant:application`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationId {
    /// Owning tenant.
    pub tenant: String,
    /// Application name within the tenant.
    pub application: String,
}

impl ApplicationId {
    /// Creates an application id from its parts.
    #[must_use]
    pub fn new(tenant: impl Into<String>, application: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            application: application.into(),
        }
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tenant, self.application)
    }
}

/// Software version of a requesting node, `major.minor.micro`.
///
/// Carried on every request so the resolver can serve version-dependent
/// values. Missing trailing components parse as zero, so `"8.1"` equals
/// `"8.1.0"`. Ordering is numeric per component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeVersion {
    /// Major version component.
    pub major: u32,
    /// Minor version component.
    pub minor: u32,
    /// Micro version component.
    pub micro: u32,
}

impl NodeVersion {
    /// Creates a version from its components.
    #[must_use]
    pub fn new(major: u32, minor: u32, micro: u32) -> Self {
        Self {
            major,
            minor,
            micro,
        }
    }
}

impl fmt::Display for NodeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)
    }
}

/// Error returned when a version string is not of the form `major[.minor[.micro]]`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid node version '{input}'")]
pub struct ParseVersionError {
    /// The rejected input.
    pub input: String,
}

impl FromStr for NodeVersion {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseVersionError {
            input: s.to_string(),
        };

        let mut parts = s.split('.');
        let component = |part: Option<&str>| -> Result<u32, ParseVersionError> {
            match part {
                None => Ok(0),
                Some(p) => p.parse().map_err(|_| err()),
            }
        };

        let major = match parts.next() {
            Some(p) if !p.is_empty() => p.parse().map_err(|_| err())?,
            _ => return Err(err()),
        };
        let minor = component(parts.next())?;
        let micro = component(parts.next())?;
        if parts.next().is_some() {
            return Err(err());
        }

        Ok(NodeVersion::new(major, minor, micro))
    }
}
