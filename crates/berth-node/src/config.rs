//! Node configuration types.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Configuration for the Berth node.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// HTTP listen address.
    pub listen_addr: SocketAddr,
    /// Directory holding one bare repository per project.
    pub storage_root: PathBuf,
    /// Base URL exported to repository hooks.
    pub base_url: String,
    /// Byte ceiling for fetch request bodies.
    pub max_fetch_bytes: u64,
    /// Byte ceiling for push request bodies.
    pub max_push_bytes: u64,
    /// Per-request time ceiling in seconds.
    pub request_timeout_secs: u64,
    /// Default branch for newly created repositories.
    pub default_branch: String,
    /// Log level.
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            storage_root: PathBuf::from("./repositories"),
            base_url: "http://127.0.0.1:8080".to_string(),
            max_fetch_bytes: berth_gateway::DEFAULT_FETCH_LIMIT,
            max_push_bytes: berth_gateway::DEFAULT_PUSH_LIMIT,
            request_timeout_secs: 600,
            default_branch: "main".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Loads configuration from a YAML file, falling back to defaults
    /// when the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(serde_yaml::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("could not read config file: {0}")]
    Io(#[from] std::io::Error),
    /// The file is not valid YAML for [`Config`].
    #[error("could not parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = Config::load(Path::new("/nonexistent/berth.yaml")).unwrap();
        assert_eq!(config.default_branch, "main");
        assert_eq!(config.listen_addr.port(), 8080);
    }

    #[test]
    fn test_partial_yaml_overrides_defaults() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");
        std::fs::write(
            &path,
            "listen_addr: \"0.0.0.0:9999\"\nmax_push_bytes: 1024\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.listen_addr.port(), 9999);
        assert_eq!(config.max_push_bytes, 1024);
        // Untouched fields keep their defaults.
        assert_eq!(config.default_branch, "main");
    }

    #[test]
    fn test_invalid_yaml_is_an_error() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");
        std::fs::write(&path, "listen_addr: [not, an, addr]\n").unwrap();
        assert!(Config::load(&path).is_err());
    }
}
