//! Configuration for habitquest

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::roster::RosterMember;

/// Collection name prefix, the store's schema version marker
pub const DEFAULT_NAMESPACE: &str = "habitquest_v1";

/// Default storage directory
pub fn default_storage_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("habitquest")
}

/// Which document store backs the shared collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Sled,
    Memory,
}

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Storage directory for the document database and this file
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// HTTP API port
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Prefix of the physical collection names
    #[serde(default = "default_namespace")]
    pub namespace: String,

    #[serde(default)]
    pub backend: Backend,

    /// sled page cache in bytes
    #[serde(default = "default_cache_size")]
    pub cache_size: u64,

    /// Idle sessions expire after this many seconds
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,

    /// WebSocket heartbeat interval
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Members allowed to log in
    #[serde(default = "RosterMember::defaults")]
    pub roster: Vec<RosterMember>,
}

fn default_http_port() -> u16 {
    8095
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_cache_size() -> u64 {
    64 * 1024 * 1024
}

fn default_session_ttl() -> u64 {
    12 * 60 * 60
}

fn default_heartbeat_interval() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            http_port: default_http_port(),
            namespace: default_namespace(),
            backend: Backend::default(),
            cache_size: default_cache_size(),
            session_ttl_secs: default_session_ttl(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            roster: RosterMember::defaults(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), std::io::Error> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Get document database path
    pub fn documents_db_path(&self) -> PathBuf {
        self.storage_dir.join("documents.sled")
    }

    /// Get config file path
    pub fn config_path(&self) -> PathBuf {
        self.storage_dir.join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str("http_port = 9000\nbackend = \"memory\"\n").unwrap();
        assert_eq!(config.http_port, 9000);
        assert_eq!(config.backend, Backend::Memory);
        assert_eq!(config.namespace, DEFAULT_NAMESPACE);
        assert_eq!(config.roster.len(), 2);
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config {
            storage_dir: temp_dir.path().to_path_buf(),
            ..Default::default()
        };
        config.session_ttl_secs = 60;
        config.save(config.config_path()).unwrap();

        let loaded = Config::load(temp_dir.path().join("config.toml")).unwrap();
        assert_eq!(loaded.session_ttl_secs, 60);
        assert_eq!(loaded.roster, config.roster);
        assert_eq!(loaded.documents_db_path(), temp_dir.path().join("documents.sled"));
    }
}
