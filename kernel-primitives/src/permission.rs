//! Permission tags and caller roles.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Opaque permission tag drawn from a closed set.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub enum Permission {
    /// Read analysis results and run read-only queries.
    #[serde(rename = "read:analysis")]
    ReadAnalysis,
    /// Produce or modify reports.
    #[serde(rename = "write:reports")]
    WriteReports,
    /// Execute investment and operational decisions.
    #[serde(rename = "execute:decisions")]
    ExecuteDecisions,
    /// Administer backend servers.
    #[serde(rename = "admin:servers")]
    AdminServers,
    /// Administer users and their grants.
    #[serde(rename = "admin:users")]
    AdminUsers,
}

impl Permission {
    /// Every permission in declaration order.
    pub const ALL: [Self; 5] = [
        Self::ReadAnalysis,
        Self::WriteReports,
        Self::ExecuteDecisions,
        Self::AdminServers,
        Self::AdminUsers,
    ];

    /// Returns the wire tag, e.g. `read:analysis`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ReadAnalysis => "read:analysis",
            Self::WriteReports => "write:reports",
            Self::ExecuteDecisions => "execute:decisions",
            Self::AdminServers => "admin:servers",
            Self::AdminUsers => "admin:users",
        }
    }
}

impl Display for Permission {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|permission| permission.as_str() == s)
            .ok_or_else(|| Error::InvalidPermission { tag: s.to_owned() })
    }
}

/// Role assigned to a caller at authentication time.
///
/// Variants are declared from least to most privileged. The privilege
/// relationship itself lives in the role table, not in this ordering.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Reads analysis output.
    Analyst,
    /// Runs analyses and writes reports.
    Engineer,
    /// Makes decisions on top of engineer access.
    Executive,
    /// Full administrative access.
    Admin,
}

impl Role {
    /// Roles in ascending hierarchy order.
    pub const ASCENDING: [Self; 4] = [Self::Analyst, Self::Engineer, Self::Executive, Self::Admin];

    /// Returns the wire tag, e.g. `analyst`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Analyst => "analyst",
            Self::Engineer => "engineer",
            Self::Executive => "executive",
            Self::Admin => "admin",
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::ASCENDING
            .into_iter()
            .find(|role| role.as_str() == normalized)
            .ok_or_else(|| Error::InvalidRole { tag: s.to_owned() })
    }
}
