//! Runtime configuration of the API services

use crate::region::RegionConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// OpenID Connect login settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenIdConnectConfig {
    /// OpenID Connect login is offered
    pub enabled: bool,
    /// Unknown users are registered on first login
    pub registration_enabled: bool,
    /// Label of the login button
    pub login_label: String,
    /// Provider logout URL
    pub logout_url: String,
}

/// Frame and event log retention
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Items retained per gateway or device frame log
    pub frame_log_max_history: usize,
    /// Items retained per device event log
    pub event_log_max_history: usize,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            frame_log_max_history: 10,
            event_log_max_history: 10,
        }
    }
}

/// CA used to sign MQTT integration client certificates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttClientConfig {
    /// CA certificate (PEM)
    pub ca_cert: PathBuf,
    /// CA private key (PEM)
    pub ca_key: PathBuf,
    /// Validity of issued client certificates
    pub client_cert_lifetime: Duration,
}

impl Default for MqttClientConfig {
    fn default() -> Self {
        Self {
            ca_cert: PathBuf::new(),
            ca_key: PathBuf::new(),
            client_cert_lifetime: Duration::from_secs(365 * 24 * 60 * 60),
        }
    }
}

/// Configuration shared by the application and internal services
#[derive(Debug, Clone, Default)]
pub struct ApiConfig {
    /// HS256 secret for session and API key tokens
    pub secret: String,
    /// OpenID Connect settings
    pub openid_connect: OpenIdConnectConfig,
    /// Ids of the regions served by this network
    pub enabled_regions: Vec<String>,
    /// Region definitions
    pub regions: Vec<RegionConfig>,
    /// MQTT client certificate CA
    pub mqtt_client: MqttClientConfig,
    /// Log stream retention
    pub monitoring: MonitoringConfig,
}

impl ApiConfig {
    /// Region definition for an enabled region id
    pub fn enabled_region(&self, id: &str) -> Option<&RegionConfig> {
        if !self.enabled_regions.iter().any(|r| r == id) {
            return None;
        }
        self.regions.iter().find(|r| r.id == id)
    }
}
