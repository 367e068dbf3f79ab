//! Server configuration.

use std::{path::PathBuf, time::Duration};

/// Admission caps and capacity limits.
///
/// Every limit is a validation rule checked where the corresponding table
/// grows, so raising one needs no rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Maximum concurrent sessions, authenticating ones included
    pub max_sessions: usize,
    /// Maximum number of groups
    pub max_groups: usize,
    /// Maximum members on one group roster
    pub max_roster: usize,
    /// Maximum contacts per user
    pub max_contacts: usize,
    /// Outbound lines queued per session before deliveries to it are dropped
    pub outbox_capacity: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_sessions: 100,
            max_groups: 10,
            max_roster: 10,
            max_contacts: 32,
            outbox_capacity: 256,
        }
    }
}

/// Which record store backend the binary opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    /// `users.txt` and `groups.txt` in the data directory
    #[default]
    File,
    /// A single `huddle.redb` database in the data directory
    Redb,
}

impl std::str::FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(Self::File),
            "redb" => Ok(Self::Redb),
            other => Err(format!("unknown backend '{other}' (expected 'file' or 'redb')")),
        }
    }
}

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to (e.g., "127.0.0.1:8080")
    pub bind_address: String,
    /// Directory holding the record store
    pub data_dir: PathBuf,
    /// Record store backend
    pub backend: StoreBackend,
    /// Pause between two accepts
    pub accept_interval: Duration,
    /// Deadline for one socket write before the session is dropped
    pub write_timeout: Duration,
    /// Capacity limits
    pub limits: Limits,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".to_string(),
            data_dir: PathBuf::from("."),
            backend: StoreBackend::File,
            accept_interval: Duration::from_millis(1000),
            write_timeout: Duration::from_secs(5),
            limits: Limits::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_classic_limits() {
        let limits = Limits::default();
        assert_eq!(limits.max_sessions, 100);
        assert_eq!(limits.max_groups, 10);
        assert_eq!(limits.max_roster, 10);
        assert_eq!(limits.max_contacts, 32);
    }

    #[test]
    fn backend_parses_from_cli_names() {
        assert_eq!("file".parse::<StoreBackend>(), Ok(StoreBackend::File));
        assert_eq!("redb".parse::<StoreBackend>(), Ok(StoreBackend::Redb));
        assert!("sqlite".parse::<StoreBackend>().is_err());
    }
}
