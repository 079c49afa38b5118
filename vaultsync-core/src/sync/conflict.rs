//! Conflict policy for edits the server rejected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which side wins when a local edit collides with the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    /// Discard the local edit and take the server's state.
    #[default]
    RemoteWins,
    /// Keep the local edit and push it again on top of the server's state.
    KeepLocal,
}

/// What happened on the server side of a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Another device pushed a newer version first.
    StaleVersion,
    /// The server no longer has the secret.
    RemoteDeleted,
}

/// Conflict resolution outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Local row now mirrors the server (content replaced or marked deleted).
    AcceptRemote,
    /// Local content kept; it will be pushed on the next pass.
    KeepLocal,
}

impl ConflictPolicy {
    pub fn resolve(self, _kind: ConflictKind) -> Resolution {
        match self {
            ConflictPolicy::RemoteWins => Resolution::AcceptRemote,
            ConflictPolicy::KeepLocal => Resolution::KeepLocal,
        }
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictPolicy::RemoteWins => f.write_str("remote-wins"),
            ConflictPolicy::KeepLocal => f.write_str("keep-local"),
        }
    }
}

impl FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "remote-wins" | "remote" => Ok(ConflictPolicy::RemoteWins),
            "keep-local" | "local" => Ok(ConflictPolicy::KeepLocal),
            other => Err(format!("unknown conflict policy: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_remote_wins() {
        assert_eq!(ConflictPolicy::default(), ConflictPolicy::RemoteWins);
    }

    #[test]
    fn policy_decides_every_kind() {
        for kind in [ConflictKind::StaleVersion, ConflictKind::RemoteDeleted] {
            assert_eq!(ConflictPolicy::RemoteWins.resolve(kind), Resolution::AcceptRemote);
            assert_eq!(ConflictPolicy::KeepLocal.resolve(kind), Resolution::KeepLocal);
        }
    }

    #[test]
    fn parse_and_display_agree() {
        for policy in [ConflictPolicy::RemoteWins, ConflictPolicy::KeepLocal] {
            assert_eq!(policy.to_string().parse::<ConflictPolicy>().unwrap(), policy);
        }
        assert!("merge".parse::<ConflictPolicy>().is_err());
    }

    #[test]
    fn serde_uses_kebab_case() {
        let json = serde_json::to_string(&ConflictPolicy::KeepLocal).unwrap();
        assert_eq!(json, "\"keep-local\"");
    }
}
