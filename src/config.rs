//! Configuration for the CWMP simulator: ACS contact info, device identity
//! overrides, download/connection-request tuning, and logging.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    pub acs: AcsConfig,
    pub device: DeviceConfig,
    pub download: DownloadConfig,
    pub connection_request: ConnectionRequestConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcsConfig {
    /// Full ACS endpoint, e.g. `http://acs.example.com:7547/acs`.
    pub url: String,
    /// `ManagementServer.PeriodicInformInterval`, in seconds.
    pub periodic_inform_interval: u64,
    /// Session socket timeout is `session_timeout_ms + 30s`.
    pub session_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub serial_number: String,
    pub mac_address: String,
    /// Default credentials; overridden at runtime by
    /// `ManagementServer.Username`/`Password` in the data model.
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Overridable by the `DOWNLOAD_TIMEOUT` environment variable.
    pub timeout_ms: u64,
    pub max_auth_retries: u32,
}

impl DownloadConfig {
    /// Resolves the effective per-attempt timeout, honoring `DOWNLOAD_TIMEOUT`
    /// (milliseconds) if set.
    pub fn effective_timeout_ms(&self) -> u64 {
        std::env::var("DOWNLOAD_TIMEOUT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionRequestConfig {
    /// The connection-request listener binds on the outbound-facing local
    /// IP at `acs_port + bind_port_offset`.
    pub bind_port_offset: u16,
    /// Overrides the auto-discovered bind address when set (useful in
    /// containers without a route to the ACS at startup time).
    pub bind_address_override: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
    pub max_size: u64,
    pub max_files: u32,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LogFormat {
    #[serde(rename = "json")]
    Json,
    #[serde(rename = "compact")]
    Compact,
    #[serde(rename = "full")]
    Full,
}

impl SimConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: SimConfig =
            toml::from_str(&contents).map_err(|e| Error::parse(format!("Invalid TOML: {}", e)))?;
        Ok(config)
    }

    pub fn load_from_env() -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::Environment::with_prefix("CWMP").separator("_"))
            .build()?;
        let sim_config = settings.try_deserialize()?;
        Ok(sim_config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.acs.url.is_empty() {
            return Err(Error::parse("ACS URL must not be empty"));
        }
        if !(self.acs.url.starts_with("http://") || self.acs.url.starts_with("https://")) {
            return Err(Error::parse("ACS URL must be http:// or https://"));
        }
        if self.acs.periodic_inform_interval == 0 {
            return Err(Error::parse("periodic_inform_interval must be positive"));
        }
        if self.download.max_auth_retries == 0 {
            return Err(Error::parse("download.max_auth_retries must be positive"));
        }
        Ok(())
    }

    pub fn default_config() -> Self {
        Self {
            acs: AcsConfig {
                url: "http://127.0.0.1:7547/acs".to_string(),
                periodic_inform_interval: 10,
                session_timeout_ms: 30_000,
            },
            device: DeviceConfig {
                serial_number: "SIM000001".to_string(),
                mac_address: "00:11:22:33:44:55".to_string(),
                username: "usertest".to_string(),
                password: "passtest".to_string(),
            },
            download: DownloadConfig {
                timeout_ms: 30_000,
                max_auth_retries: 5,
            },
            connection_request: ConnectionRequestConfig {
                bind_port_offset: 1,
                bind_address_override: None,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file: Some("/var/log/cwmp-sim.log".to_string()),
                max_size: 100 * 1024 * 1024,
                max_files: 10,
                format: LogFormat::Json,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_validates() {
        assert!(SimConfig::default_config().validate().is_ok());
    }

    #[test]
    fn load_from_file_round_trips_through_toml() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cwmp-sim.toml");
        let mut config = SimConfig::default_config();
        config.device.serial_number = "FILE000001".to_string();
        std::fs::write(&path, toml::to_string_pretty(&config).unwrap()).unwrap();

        let loaded = SimConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.device.serial_number, "FILE000001");
        assert_eq!(loaded.acs.url, config.acs.url);
    }

    #[test]
    fn rejects_empty_acs_url() {
        let mut config = SimConfig::default_config();
        config.acs.url = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_non_http_acs_url() {
        let mut config = SimConfig::default_config();
        config.acs.url = "ftp://acs.example.com".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn download_timeout_honors_env_override() {
        let config = SimConfig::default_config();
        std::env::remove_var("DOWNLOAD_TIMEOUT");
        assert_eq!(config.download.effective_timeout_ms(), 30_000);
        std::env::set_var("DOWNLOAD_TIMEOUT", "5000");
        assert_eq!(config.download.effective_timeout_ms(), 5000);
        std::env::remove_var("DOWNLOAD_TIMEOUT");
    }
}
