//! Layered daemon configuration.
//!
//! Precedence, lowest to highest: built-in defaults, `tidyd.toml` (or the file
//! named by `TIDYD_CONFIG`), `TIDYD_*` environment variables, command-line
//! arguments.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use crate::core::ChecksumAlgorithm;

const DEFAULT_CONFIG_FILE: &str = "tidyd.toml";
const ENV_PREFIX: &str = "TIDYD_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Address the JSON-RPC server listens on.
    pub rpc_bind: SocketAddr,
    /// Sampling interval for progress streams, in milliseconds.
    pub poll_interval_ms: u64,
    /// Use copy/verify/delete instead of a plain rename by default.
    pub safe_mode: bool,
    pub checksum: ChecksumAlgorithm,
    /// fsync each safe-mode copy before verifying it.
    pub sync_files: bool,
    /// Size above which an extensionless Android file counts as cache.
    pub android_threshold_mb: u64,
    pub verbose: bool,
    pub json_logs: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            rpc_bind: SocketAddr::from(([127, 0, 0, 1], 7878)),
            poll_interval_ms: 200,
            safe_mode: false,
            checksum: ChecksumAlgorithm::Sha256,
            sync_files: true,
            android_threshold_mb: 50,
            verbose: false,
            json_logs: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from every layer, with `cli_args` on top.
    ///
    /// `cli_args` should skip `None` fields when serialized so unset flags do
    /// not mask lower layers.
    pub fn new<T: Serialize>(cli_args: Option<&T>) -> Result<Self> {
        Self::from_figment(Self::figment(&config_path(), cli_args))
    }

    pub fn figment<T: Serialize>(config_file: &Path, cli_args: Option<&T>) -> Figment {
        let figment = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(config_file))
            .merge(Env::prefixed(ENV_PREFIX).ignore(&["config"]));

        match cli_args {
            Some(args) => figment.merge(Serialized::defaults(args)),
            None => figment,
        }
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        figment.extract().context("Failed to load configuration")
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }
}

fn config_path() -> PathBuf {
    std::env::var_os("TIDYD_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[derive(Serialize)]
    struct Args {
        #[serde(skip_serializing_if = "Option::is_none")]
        safe_mode: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        poll_interval_ms: Option<u64>,
    }

    #[test]
    fn test_defaults_when_file_missing() {
        let temp = tempdir().unwrap();
        let figment = AppConfig::figment::<Args>(&temp.path().join("absent.toml"), None);
        let config = AppConfig::from_figment(figment).unwrap();

        assert_eq!(config.poll_interval(), Duration::from_millis(200));
        assert_eq!(config.checksum, ChecksumAlgorithm::Sha256);
        assert_eq!(config.android_threshold_mb, 50);
        assert!(!config.safe_mode);
        assert!(config.sync_files);
    }

    #[test]
    fn test_file_then_cli_precedence() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("tidyd.toml");
        std::fs::write(
            &file,
            "safe_mode = true\npoll_interval_ms = 500\nchecksum = \"blake3\"\nsync_files = false\nrpc_bind = \"0.0.0.0:9000\"\n",
        )
        .unwrap();

        let args = Args {
            safe_mode: None,
            poll_interval_ms: Some(50),
        };
        let config = AppConfig::from_figment(AppConfig::figment(&file, Some(&args))).unwrap();

        assert!(config.safe_mode, "unset CLI flag must not mask the file");
        assert_eq!(config.poll_interval_ms, 50);
        assert_eq!(config.checksum, ChecksumAlgorithm::Blake3);
        assert!(!config.sync_files);
        assert_eq!(config.rpc_bind.port(), 9000);
    }

    #[test]
    fn test_invalid_value_is_reported() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("tidyd.toml");
        std::fs::write(&file, "checksum = \"md5\"\n").unwrap();

        let err = AppConfig::from_figment(AppConfig::figment::<Args>(&file, None)).unwrap_err();
        assert!(err.to_string().contains("Failed to load configuration"));
    }

    #[test]
    fn test_toml_rendering_round_trips() {
        let config = AppConfig::default();
        let rendered = config.to_toml().unwrap();
        assert!(rendered.contains("rpc_bind = \"127.0.0.1:7878\""));

        let parsed: AppConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, config);
    }
}
