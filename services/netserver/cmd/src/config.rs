//! Configuration handling for the network server.
//!
//! The configuration is read from a YAML file and then overridden by
//! environment variables. A missing file yields the defaults.

use ns_grpc::config::{MonitoringConfig, MqttClientConfig, OpenIdConnectConfig};
use ns_grpc::region::RegionConfig;
use ns_grpc::ApiConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file exists but could not be read
    #[error("Failed to read config file {path}: {source}")]
    Read {
        /// File path
        path: PathBuf,
        /// Cause
        source: std::io::Error,
    },
    /// Config file is not valid YAML for [`ServerConfig`]
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        /// File path
        path: PathBuf,
        /// Cause
        source: serde_yaml::Error,
    },
    /// `api.bind` is not a socket address
    #[error("Invalid api.bind '{0}'")]
    InvalidBind(String),
    /// A duration could not be parsed
    #[error("Invalid duration for {field}: {source}")]
    InvalidDuration {
        /// Config key
        field: &'static str,
        /// Cause
        source: humantime::DurationError,
    },
}

/// API listener settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSection {
    /// gRPC bind address
    pub bind: String,
    /// HS256 token secret
    pub secret: String,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            secret: String::new(),
        }
    }
}

/// User authentication settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserAuthenticationSection {
    /// OpenID Connect login
    pub openid_connect: OpenIdConnectConfig,
}

/// Network settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSection {
    /// Region ids served by this network
    pub enabled_regions: Vec<String>,
}

/// MQTT client certificate settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttClientSection {
    /// CA certificate path
    pub ca_cert: String,
    /// CA key path
    pub ca_key: String,
    /// Lifetime of issued certificates, e.g. `365d`
    pub client_cert_lifetime: String,
}

impl Default for MqttClientSection {
    fn default() -> Self {
        Self {
            ca_cert: String::new(),
            ca_key: String::new(),
            client_cert_lifetime: "365d".to_string(),
        }
    }
}

/// MQTT integration settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttSection {
    /// Client certificates
    pub client: MqttClientSection,
}

/// Integration settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationSection {
    /// MQTT
    pub mqtt: MqttSection,
}

/// Network server configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// API listener
    pub api: ApiSection,
    /// User authentication
    pub user_authentication: UserAuthenticationSection,
    /// Network
    pub network: NetworkSection,
    /// Region definitions
    pub regions: Vec<RegionConfig>,
    /// Integrations
    pub integration: IntegrationSection,
    /// Frame and event log retention
    pub monitoring: MonitoringConfig,
}

impl ServerConfig {
    /// Load configuration from file and environment variables
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self, ConfigError> {
        let path = config_path.as_ref();

        let mut config = match std::fs::read_to_string(path) {
            Ok(content) => {
                let config: ServerConfig =
                    serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
                        path: path.to_path_buf(),
                        source,
                    })?;
                info!("Loaded configuration from {:?}", path);
                config
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Config file {:?} not found, using defaults", path);
                Self::default()
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        config.apply_environment_overrides();

        info!(
            "Final configuration: bind={}, enabled_regions={:?}, oidc={}",
            config.api.bind,
            config.network.enabled_regions,
            config.user_authentication.openid_connect.enabled
        );
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_environment_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = lookup("NETSERVER_API_BIND") {
            info!("API bind address overridden by environment: {}", bind);
            self.api.bind = bind;
        }

        if let Some(secret) = lookup("NETSERVER_API_SECRET") {
            info!("API secret overridden by environment");
            self.api.secret = secret;
        }
    }

    /// Parsed `api.bind`
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.api
            .bind
            .parse()
            .map_err(|_| ConfigError::InvalidBind(self.api.bind.clone()))
    }

    /// Settings consumed by the gRPC services
    pub fn api_config(&self) -> Result<ApiConfig, ConfigError> {
        let mqtt = &self.integration.mqtt.client;
        let client_cert_lifetime = humantime::parse_duration(&mqtt.client_cert_lifetime)
            .map_err(|source| ConfigError::InvalidDuration {
                field: "integration.mqtt.client.client_cert_lifetime",
                source,
            })?;

        Ok(ApiConfig {
            secret: self.api.secret.clone(),
            openid_connect: self.user_authentication.openid_connect.clone(),
            enabled_regions: self.network.enabled_regions.clone(),
            regions: self.regions.clone(),
            mqtt_client: MqttClientConfig {
                ca_cert: PathBuf::from(&mqtt.ca_cert),
                ca_key: PathBuf::from(&mqtt.ca_key),
                client_cert_lifetime,
            },
            monitoring: self.monitoring.clone(),
        })
    }
}
