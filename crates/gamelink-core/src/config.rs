//! Configuration types for gamelink

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default lifetime of a pairing request and of an approval, in seconds
pub const DEFAULT_TTL_SECS: u64 = 5 * 60;

/// Longest lifetime a pairing request or an approval may be given
pub const MAX_TTL_SECS: u64 = 24 * 60 * 60;

/// Cost parameters for the slow secret hash (Argon2id)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashCost {
    /// Memory size in KiB
    pub memory_kib: u32,
    /// Number of passes
    pub iterations: u32,
    /// Degree of parallelism
    pub parallelism: u32,
}

impl Default for HashCost {
    /// Matches the argon2 crate's recommended defaults
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl HashCost {
    /// Smallest cost argon2 accepts. Only meant for tests.
    pub fn minimal() -> Self {
        Self {
            memory_kib: 8,
            iterations: 1,
            parallelism: 1,
        }
    }
}

/// A browser session known ahead of time, used by the built-in session table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSeed {
    /// Value of the `session_id` cookie
    pub token: String,
    /// User the session belongs to
    pub user_id: String,
    /// Public display name
    pub username: String,
}

/// Main configuration for gamelink
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the HTTP server binds to
    pub listen_addr: String,
    /// Externally reachable base URL used in pairing links (derived from listen_addr if None)
    pub public_url: Option<String>,
    /// Where the browser is sent to sign in
    pub login_url: String,
    /// Pairing request lifetime in seconds
    pub request_ttl_secs: u64,
    /// Approval lifetime in seconds
    pub approval_ttl_secs: u64,
    /// Secret hashing cost
    pub hash_cost: HashCost,
    /// Pairing store file (platform config dir if None)
    pub storage_path: Option<PathBuf>,
    /// Keep pairings in memory only
    pub in_memory: bool,
    /// Browser sessions accepted by the built-in session table
    pub sessions: Vec<SessionSeed>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            public_url: None,
            login_url: "/login".to_string(),
            request_ttl_secs: DEFAULT_TTL_SECS,
            approval_ttl_secs: DEFAULT_TTL_SECS,
            hash_cost: HashCost::default(),
            storage_path: None,
            in_memory: false,
            sessions: Vec::new(),
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from a JSON file
    ///
    /// Fields missing from the file keep their default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents)?;
        debug!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Builder pattern: set listen address
    pub fn with_listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = addr.into();
        self
    }

    /// Builder pattern: set public URL
    pub fn with_public_url(mut self, url: impl Into<String>) -> Self {
        self.public_url = Some(url.into());
        self
    }

    /// Builder pattern: set login URL
    pub fn with_login_url(mut self, url: impl Into<String>) -> Self {
        self.login_url = url.into();
        self
    }

    /// Builder pattern: set request TTL
    pub fn with_request_ttl_secs(mut self, secs: u64) -> Self {
        self.request_ttl_secs = secs;
        self
    }

    /// Builder pattern: set approval TTL
    pub fn with_approval_ttl_secs(mut self, secs: u64) -> Self {
        self.approval_ttl_secs = secs;
        self
    }

    /// Builder pattern: set hashing cost
    pub fn with_hash_cost(mut self, cost: HashCost) -> Self {
        self.hash_cost = cost;
        self
    }

    /// Builder pattern: set storage path
    pub fn with_storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_path = Some(path.into());
        self
    }

    /// Builder pattern: keep pairings in memory only
    pub fn with_in_memory(mut self, in_memory: bool) -> Self {
        self.in_memory = in_memory;
        self
    }

    /// Builder pattern: add a known browser session
    pub fn with_session(mut self, seed: SessionSeed) -> Self {
        self.sessions.push(seed);
        self
    }

    /// Base URL the device embeds in the pairing link, without trailing slash
    pub fn public_base_url(&self) -> String {
        match &self.public_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}", self.listen_addr),
        }
    }

    /// Parsed listen address
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.listen_addr
            .parse()
            .map_err(|e| Error::config(format!("invalid listen address {}: {}", self.listen_addr, e)))
    }

    /// Check the configuration for values the server cannot run with
    pub fn validate(&self) -> Result<()> {
        self.socket_addr()?;

        for (name, secs) in [
            ("request_ttl_secs", self.request_ttl_secs),
            ("approval_ttl_secs", self.approval_ttl_secs),
        ] {
            if secs == 0 || secs > MAX_TTL_SECS {
                return Err(Error::config(format!(
                    "{} must be between 1 and {}",
                    name, MAX_TTL_SECS
                )));
            }
        }

        let cost = &self.hash_cost;
        if cost.iterations == 0 || cost.parallelism == 0 {
            return Err(Error::config(
                "hash_cost iterations and parallelism must be at least 1",
            ));
        }
        // argon2 requires at least 8 KiB per lane
        if cost.memory_kib < 8 * cost.parallelism {
            return Err(Error::config(format!(
                "hash_cost memory_kib must be at least {}",
                8 * cost.parallelism
            )));
        }

        for seed in &self.sessions {
            if seed.token.trim().is_empty() || seed.user_id.trim().is_empty() {
                return Err(Error::config("sessions need a token and a user_id"));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::new();
        assert!(config.validate().is_ok());
        assert_eq!(config.request_ttl_secs, 300);
        assert_eq!(config.approval_ttl_secs, 300);
        assert_eq!(config.public_base_url(), "http://127.0.0.1:8080");
    }

    #[test]
    fn test_public_url_trailing_slash() {
        let config = Config::new().with_public_url("https://games.example.com/");
        assert_eq!(config.public_base_url(), "https://games.example.com");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(Config::new().with_request_ttl_secs(0).validate().is_err());
        assert!(Config::new().with_approval_ttl_secs(0).validate().is_err());
        assert!(Config::new()
            .with_request_ttl_secs(9_000_000_000_000)
            .validate()
            .is_err());
        assert!(Config::new()
            .with_approval_ttl_secs(MAX_TTL_SECS + 1)
            .validate()
            .is_err());
        assert!(Config::new()
            .with_request_ttl_secs(MAX_TTL_SECS)
            .with_approval_ttl_secs(MAX_TTL_SECS)
            .validate()
            .is_ok());
        assert!(Config::new().with_listen_addr("not an addr").validate().is_err());

        let cost = HashCost {
            memory_kib: 4,
            iterations: 1,
            parallelism: 1,
        };
        assert!(Config::new().with_hash_cost(cost).validate().is_err());
        assert!(Config::new().with_hash_cost(HashCost::minimal()).validate().is_ok());
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gamelink.json");
        std::fs::write(
            &path,
            r#"{
                "listen_addr": "0.0.0.0:9000",
                "sessions": [{"token": "s1", "user_id": "u1", "username": "alice"}]
            }"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:9000");
        assert_eq!(config.login_url, "/login");
        assert_eq!(config.sessions.len(), 1);
        assert_eq!(config.sessions[0].username, "alice");
    }
}
