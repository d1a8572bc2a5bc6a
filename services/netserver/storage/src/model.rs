//! Domain entities

use crate::StorageError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Lower-case hex encoding of a byte slice.
pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// 64 bit extended unique identifier (DevEUI, gateway id).
#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Eui64(pub [u8; 8]);

impl Eui64 {
    /// Construct from a big-endian integer
    pub fn from_be_u64(v: u64) -> Self {
        Eui64(v.to_be_bytes())
    }
}

impl fmt::Display for Eui64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", to_hex(&self.0))
    }
}

impl FromStr for Eui64 {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 16 || !s.is_ascii() {
            return Err(StorageError::Validation(format!(
                "EUI64 must be 16 hex characters, got '{}'",
                s
            )));
        }

        let mut out = [0u8; 8];
        for (i, b) in out.iter_mut().enumerate() {
            *b = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .map_err(|e| StorageError::Validation(format!("EUI64 '{}': {}", s, e)))?;
        }
        Ok(Eui64(out))
    }
}

impl Serialize for Eui64 {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Eui64 {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// `local@domain.tld` without whitespace.
fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain
                    .split_once('.')
                    .map(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
                    .unwrap_or(false)
        }
        None => false,
    }
}

/// Tenant
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    /// Tenant id
    pub id: Uuid,
    /// Created at
    pub created_at: DateTime<Utc>,
    /// Updated at
    pub updated_at: DateTime<Utc>,
    /// Name
    pub name: String,
    /// Description
    pub description: String,
}

impl Tenant {
    /// Validate before storing
    pub fn validate(&self) -> Result<(), StorageError> {
        if self.name.is_empty() {
            return Err(StorageError::Validation("name is not set".into()));
        }
        Ok(())
    }
}

impl Default for Tenant {
    fn default() -> Self {
        let now = Utc::now();
        Tenant {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            name: String::new(),
            description: String::new(),
        }
    }
}

/// Membership of a user within a tenant
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TenantUser {
    /// Tenant id
    pub tenant_id: Uuid,
    /// User id
    pub user_id: Uuid,
    /// Created at
    pub created_at: DateTime<Utc>,
    /// Updated at
    pub updated_at: DateTime<Utc>,
    /// Tenant admin
    pub is_admin: bool,
    /// May manage applications, devices and device-profiles
    pub is_device_admin: bool,
    /// May manage gateways
    pub is_gateway_admin: bool,
}

impl Default for TenantUser {
    fn default() -> Self {
        let now = Utc::now();
        TenantUser {
            tenant_id: Uuid::nil(),
            user_id: Uuid::nil(),
            created_at: now,
            updated_at: now,
            is_admin: false,
            is_device_admin: false,
            is_gateway_admin: false,
        }
    }
}

/// User
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// User id
    pub id: Uuid,
    /// Id assigned by an external identity provider
    pub external_id: Option<String>,
    /// Created at
    pub created_at: DateTime<Utc>,
    /// Updated at
    pub updated_at: DateTime<Utc>,
    /// Global admin
    pub is_admin: bool,
    /// Inactive users can not log in
    pub is_active: bool,
    /// E-mail address
    pub email: String,
    /// E-mail address has been verified
    pub email_verified: bool,
    /// Argon2 PHC string; empty for externally authenticated users
    pub password_hash: String,
    /// Optional note
    pub note: String,
}

impl User {
    /// Validate before storing
    pub fn validate(&self) -> Result<(), StorageError> {
        if self.external_id.is_none() && !is_valid_email(&self.email) {
            return Err(StorageError::InvalidEmail);
        }
        Ok(())
    }

    /// Replace the password hash
    pub fn set_password_hash(&mut self, password: &str) -> Result<(), StorageError> {
        self.password_hash = crate::password::hash_password(password)?;
        Ok(())
    }
}

impl Default for User {
    fn default() -> Self {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            external_id: None,
            created_at: now,
            updated_at: now,
            is_admin: false,
            is_active: false,
            email: String::new(),
            email_verified: false,
            password_hash: String::new(),
            note: String::new(),
        }
    }
}

/// Application
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Application {
    /// Application id
    pub id: Uuid,
    /// Owning tenant
    pub tenant_id: Uuid,
    /// Created at
    pub created_at: DateTime<Utc>,
    /// Updated at
    pub updated_at: DateTime<Utc>,
    /// Name
    pub name: String,
    /// Description
    pub description: String,
    /// PEM encoded MQTT client certificate, once issued
    pub mqtt_tls_cert: Option<Vec<u8>>,
}

impl Application {
    /// Validate before storing
    pub fn validate(&self) -> Result<(), StorageError> {
        if self.name.is_empty() {
            return Err(StorageError::Validation("name is not set".into()));
        }
        Ok(())
    }
}

impl Default for Application {
    fn default() -> Self {
        let now = Utc::now();
        Application {
            id: Uuid::new_v4(),
            tenant_id: Uuid::nil(),
            created_at: now,
            updated_at: now,
            name: String::new(),
            description: String::new(),
            mqtt_tls_cert: None,
        }
    }
}

/// Application list filters
#[derive(Clone, Debug, Default)]
pub struct ApplicationFilters {
    /// Only applications of this tenant
    pub tenant_id: Option<Uuid>,
    /// Case-insensitive substring of the name
    pub search: Option<String>,
}

/// Application list row
#[derive(Clone, Debug, PartialEq)]
pub struct ApplicationListItem {
    /// Application id
    pub id: Uuid,
    /// Created at
    pub created_at: DateTime<Utc>,
    /// Updated at
    pub updated_at: DateTime<Utc>,
    /// Name
    pub name: String,
    /// Description
    pub description: String,
}

impl From<&Application> for ApplicationListItem {
    fn from(a: &Application) -> Self {
        ApplicationListItem {
            id: a.id,
            created_at: a.created_at,
            updated_at: a.updated_at,
            name: a.name.clone(),
            description: a.description.clone(),
        }
    }
}

/// Integration kinds that can be stored for an application
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntegrationKind {
    /// HTTP endpoint
    Http,
    /// InfluxDB
    InfluxDb,
    /// ThingsBoard
    ThingsBoard,
    /// myDevices
    MyDevices,
    /// LoRa Cloud
    LoraCloud,
    /// Google Cloud Pub/Sub
    GcpPubSub,
    /// AWS SNS
    AwsSns,
    /// Azure Service Bus
    AzureServiceBus,
    /// Pilot Things
    PilotThings,
    /// IFTTT webhooks
    Ifttt,
}

impl fmt::Display for IntegrationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl FromStr for IntegrationKind {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "Http" => IntegrationKind::Http,
            "InfluxDb" => IntegrationKind::InfluxDb,
            "ThingsBoard" => IntegrationKind::ThingsBoard,
            "MyDevices" => IntegrationKind::MyDevices,
            "LoraCloud" => IntegrationKind::LoraCloud,
            "GcpPubSub" => IntegrationKind::GcpPubSub,
            "AwsSns" => IntegrationKind::AwsSns,
            "AzureServiceBus" => IntegrationKind::AzureServiceBus,
            "PilotThings" => IntegrationKind::PilotThings,
            "Ifttt" => IntegrationKind::Ifttt,
            _ => {
                return Err(StorageError::Validation(format!(
                    "Unexpected IntegrationKind: {}",
                    s
                )));
            }
        })
    }
}

/// Integration configuration, stored as a JSON document
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum IntegrationConfiguration {
    /// No configuration
    None,
    /// HTTP
    Http(HttpConfiguration),
    /// InfluxDB
    InfluxDb(InfluxDbConfiguration),
    /// ThingsBoard
    ThingsBoard(ThingsBoardConfiguration),
    /// myDevices
    MyDevices(MyDevicesConfiguration),
    /// LoRa Cloud
    LoraCloud(LoraCloudConfiguration),
    /// Google Cloud Pub/Sub
    GcpPubSub(GcpPubSubConfiguration),
    /// AWS SNS
    AwsSns(AwsSnsConfiguration),
    /// Azure Service Bus
    AzureServiceBus(AzureServiceBusConfiguration),
    /// Pilot Things
    PilotThings(PilotThingsConfiguration),
    /// IFTTT
    Ifttt(IftttConfiguration),
}

/// HTTP integration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpConfiguration {
    /// Extra request headers
    pub headers: HashMap<String, String>,
    /// JSON encoding when true, Protobuf otherwise
    pub json: bool,
    /// Event endpoint URL
    pub event_endpoint_url: String,
}

/// InfluxDB integration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct InfluxDbConfiguration {
    pub endpoint: String,
    pub db: String,
    pub username: String,
    pub password: String,
    pub retention_policy_name: String,
    pub precision: i32,
    pub version: i32,
    pub token: String,
    pub organization: String,
    pub bucket: String,
}

/// ThingsBoard integration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ThingsBoardConfiguration {
    /// Server URL
    pub server: String,
}

/// myDevices integration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MyDevicesConfiguration {
    /// Endpoint URL
    pub endpoint: String,
}

/// LoRa Cloud integration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LoraCloudConfiguration {
    /// Modem and geolocation services
    pub modem_geolocation_services: LoraCloudModemGeolocationServices,
}

/// LoRa Cloud modem and geolocation services.
///
/// `modem_port` and `gnss_port` are only read from configurations created
/// before `forward_f_ports` existed.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct LoraCloudModemGeolocationServices {
    pub token: String,
    pub modem_enabled: bool,
    #[serde(default)]
    pub modem_port: u32,
    #[serde(default)]
    pub gnss_port: u32,
    #[serde(default)]
    pub forward_f_ports: Vec<u32>,
    pub gnss_use_rx_time: bool,
    #[serde(default)]
    pub gnss_use_gateway_location: bool,
    pub parse_tlv: bool,
    pub geolocation_buffer_ttl: u32,
    pub geolocation_min_buffer_size: u32,
    pub geolocation_tdoa: bool,
    pub geolocation_rssi: bool,
    pub geolocation_gnss: bool,
    pub geolocation_gnss_payload_field: String,
    pub geolocation_gnss_use_rx_time: bool,
    pub geolocation_wifi: bool,
    pub geolocation_wifi_payload_field: String,
}

/// Google Cloud Pub/Sub integration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct GcpPubSubConfiguration {
    pub encoding: i32,
    pub credentials_file: String,
    pub project_id: String,
    pub topic_name: String,
}

/// AWS SNS integration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct AwsSnsConfiguration {
    pub encoding: i32,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub topic_arn: String,
}

/// Azure Service Bus integration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct AzureServiceBusConfiguration {
    pub encoding: i32,
    pub connection_string: String,
    pub publish_name: String,
}

/// Pilot Things integration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct PilotThingsConfiguration {
    pub server: String,
    pub token: String,
}

/// IFTTT integration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IftttConfiguration {
    /// Webhook key
    pub key: String,
    /// Decoded payload keys mapped to value1 and value2; value3 carries the
    /// DevEUI
    pub uplink_values: [String; 2],
    /// Publish the full decoded payload as JSON instead
    pub arbitrary_json: bool,
    /// Prefix of the event name
    pub event_prefix: String,
}

/// Integration of an application
#[derive(Clone, Debug, PartialEq)]
pub struct Integration {
    /// Application id
    pub application_id: Uuid,
    /// Kind
    pub kind: IntegrationKind,
    /// Created at
    pub created_at: DateTime<Utc>,
    /// Updated at
    pub updated_at: DateTime<Utc>,
    /// Configuration
    pub configuration: IntegrationConfiguration,
}

impl Default for Integration {
    fn default() -> Self {
        let now = Utc::now();
        Integration {
            application_id: Uuid::nil(),
            kind: IntegrationKind::Http,
            created_at: now,
            updated_at: now,
            configuration: IntegrationConfiguration::None,
        }
    }
}

/// API key
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApiKey {
    /// Key id; the token's subject
    pub id: Uuid,
    /// Created at
    pub created_at: DateTime<Utc>,
    /// Name
    pub name: String,
    /// Global admin key
    pub is_admin: bool,
    /// Tenant the key is restricted to
    pub tenant_id: Option<Uuid>,
}

impl ApiKey {
    /// Validate before storing
    pub fn validate(&self) -> Result<(), StorageError> {
        if self.name.is_empty() {
            return Err(StorageError::Validation("name is not set".into()));
        }
        Ok(())
    }
}

impl Default for ApiKey {
    fn default() -> Self {
        ApiKey {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            name: String::new(),
            is_admin: false,
            tenant_id: None,
        }
    }
}

/// API key list filters
#[derive(Clone, Debug, Default)]
pub struct ApiKeyFilters {
    /// Only admin keys when true, only non-admin keys otherwise
    pub is_admin: bool,
    /// Only keys of this tenant
    pub tenant_id: Option<Uuid>,
}

/// Device-profile
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeviceProfile {
    /// Profile id
    pub id: Uuid,
    /// Owning tenant
    pub tenant_id: Uuid,
    /// Name
    pub name: String,
    /// Expected uplink interval in seconds
    pub uplink_interval: u32,
    /// Measurement key to display name
    pub measurements: BTreeMap<String, String>,
}

impl Default for DeviceProfile {
    fn default() -> Self {
        DeviceProfile {
            id: Uuid::new_v4(),
            tenant_id: Uuid::nil(),
            name: String::new(),
            uplink_interval: 3600,
            measurements: BTreeMap::new(),
        }
    }
}

/// Device
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Device {
    /// DevEUI
    pub dev_eui: Eui64,
    /// Application id
    pub application_id: Uuid,
    /// Device-profile id
    pub device_profile_id: Uuid,
    /// Name
    pub name: String,
    /// Current device address
    pub dev_addr: Option<[u8; 4]>,
    /// User defined tags
    pub tags: HashMap<String, String>,
    /// Last uplink
    pub last_seen_at: Option<DateTime<Utc>>,
    /// Data-rate of the last uplink
    pub dr: Option<u8>,
}

/// Device activity counts
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DevicesActiveInactive {
    /// Never seen
    pub never_seen_count: u32,
    /// Seen within 1.5x the profile's uplink interval
    pub active_count: u32,
    /// Seen before that
    pub inactive_count: u32,
}

/// Gateway
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Gateway {
    /// Gateway id
    pub gateway_id: Eui64,
    /// Owning tenant
    pub tenant_id: Uuid,
    /// Name
    pub name: String,
    /// User defined tags
    pub tags: HashMap<String, String>,
    /// Last stats message
    pub last_seen_at: Option<DateTime<Utc>>,
    /// Expected stats interval in seconds
    pub stats_interval_secs: u32,
}

impl Default for Gateway {
    fn default() -> Self {
        Gateway {
            gateway_id: Eui64::default(),
            tenant_id: Uuid::nil(),
            name: String::new(),
            tags: HashMap::new(),
            last_seen_at: None,
            stats_interval_secs: 30,
        }
    }
}

/// Gateway state counts
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GatewayCountsByState {
    /// Never seen
    pub never_seen_count: u32,
    /// Seen within 2x the stats interval
    pub online_count: u32,
    /// Seen before that
    pub offline_count: u32,
}
