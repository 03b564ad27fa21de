//! Configuration for the sync engine.

use sshconf_core::{CoreError, GetStrategyKind};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default API base URL.
pub const DEFAULT_API_URL: &str = "https://api.serverauditor.com";

/// Which side wins when a pulled record is also dirty locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// The remote copy overwrites the local one and the local change is
    /// dropped.
    #[default]
    ServerWins,
    /// The local copy is kept and pushed on the next push.
    ClientWins,
}

impl FromStr for ConflictPolicy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "server-wins" | "server" => Ok(Self::ServerWins),
            "client-wins" | "client" => Ok(Self::ClientWins),
            other => Err(CoreError::config(format!("unknown conflict policy '{other}'"))),
        }
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ServerWins => "server-wins",
            Self::ClientWins => "client-wins",
        })
    }
}

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// API base URL.
    pub base_url: String,
    /// Request timeout.
    pub timeout: Duration,
    /// Conflict policy for pulls.
    pub conflict_policy: ConflictPolicy,
    /// How dirty records are resolved before a push.
    pub push_resolution: GetStrategyKind,
}

impl SyncConfig {
    /// Creates a new sync configuration.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(30),
            conflict_policy: ConflictPolicy::default(),
            push_resolution: GetStrategyKind::Related,
        }
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the conflict policy.
    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }

    /// Sets how dirty records are resolved before a push.
    pub fn with_push_resolution(mut self, kind: GetStrategyKind) -> Self {
        self.push_resolution = kind;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new(DEFAULT_API_URL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.base_url, DEFAULT_API_URL);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.conflict_policy, ConflictPolicy::ServerWins);
        assert_eq!(config.push_resolution, GetStrategyKind::Related);
    }

    #[test]
    fn builder_pattern() {
        let config = SyncConfig::new("http://localhost:8000")
            .with_timeout(Duration::from_secs(5))
            .with_conflict_policy(ConflictPolicy::ClientWins)
            .with_push_resolution(GetStrategyKind::Shallow);
        assert_eq!(config.base_url, "http://localhost:8000");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.conflict_policy, ConflictPolicy::ClientWins);
        assert_eq!(config.push_resolution, GetStrategyKind::Shallow);
    }

    #[test]
    fn conflict_policy_names() {
        assert_eq!("client-wins".parse::<ConflictPolicy>().unwrap(), ConflictPolicy::ClientWins);
        assert_eq!("Server".parse::<ConflictPolicy>().unwrap(), ConflictPolicy::ServerWins);
        assert!("latest".parse::<ConflictPolicy>().is_err());
        assert_eq!(ConflictPolicy::ClientWins.to_string(), "client-wins");
    }
}
