//! Storage layer for the network-server management API.
//!
//! This crate owns the domain entities (tenants, users, applications,
//! integrations, API keys, devices and gateways), the async storage traits
//! the gRPC services are written against, and the backends implementing
//! them. Only the in-memory backend ships today; it is used by the server
//! binary and by the tests of every crate in the workspace.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod model;
pub mod password;
pub mod search;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

pub use backend::mem::MemoryStore;
pub use model::*;
pub use search::{parse_search_query, similarity, SearchQuery, SearchResult};

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// Object does not exist
    #[error("Object does not exist (id: {0})")]
    NotFound(String),
    /// Object already exists
    #[error("Object already exists (id: {0})")]
    AlreadyExists(String),
    /// Object failed validation
    #[error("Validation error: {0}")]
    Validation(String),
    /// Malformed e-mail address
    #[error("Invalid email address")]
    InvalidEmail,
    /// Password could not be hashed or the stored hash is unreadable
    #[error("Hash password error: {0}")]
    HashPassword(String),
    /// Login failed
    #[error("Invalid username or password")]
    InvalidUsernameOrPassword,
    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Anything else
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Result alias used by every storage operation.
pub type Result<T, E = StorageError> = std::result::Result<T, E>;

/// Tenant and tenant-user operations
#[async_trait]
pub trait TenantStore: Send + Sync {
    /// Create a tenant
    async fn create_tenant(&self, tenant: Tenant) -> Result<Tenant>;

    /// Get a tenant by id
    async fn get_tenant(&self, id: &Uuid) -> Result<Tenant>;

    /// Add a user to a tenant
    async fn add_tenant_user(&self, tenant_user: TenantUser) -> Result<TenantUser>;

    /// Get the tenant-user link
    async fn get_tenant_user(&self, tenant_id: &Uuid, user_id: &Uuid) -> Result<TenantUser>;

    /// List the tenant links of a user, ordered by tenant id
    async fn get_tenant_users_for_user(&self, user_id: &Uuid) -> Result<Vec<TenantUser>>;
}

/// User operations
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Create a user; the password hash must already be set
    async fn create_user(&self, user: User) -> Result<User>;

    /// Get a user by id
    async fn get_user(&self, id: &Uuid) -> Result<User>;

    /// Get a user by e-mail address
    async fn get_user_by_email(&self, email: &str) -> Result<User>;

    /// Get a user by the id assigned by an external identity provider
    async fn get_user_by_external_id(&self, external_id: &str) -> Result<User>;

    /// Get an active user matching the given credentials
    async fn get_user_by_email_and_pw(&self, email: &str, password: &str) -> Result<User>;

    /// Update a user
    async fn update_user(&self, user: User) -> Result<User>;

    /// Delete a user and its tenant links
    async fn delete_user(&self, id: &Uuid) -> Result<()>;
}

/// Application operations
#[async_trait]
pub trait ApplicationStore: Send + Sync {
    /// Create an application
    async fn create_application(&self, app: Application) -> Result<Application>;

    /// Get an application by id
    async fn get_application(&self, id: &Uuid) -> Result<Application>;

    /// Update name and description of an application
    async fn update_application(&self, app: Application) -> Result<Application>;

    /// Store the MQTT client certificate issued for an application
    async fn set_mqtt_tls_cert(&self, id: &Uuid, cert: &[u8]) -> Result<Application>;

    /// Delete an application together with its integrations
    async fn delete_application(&self, id: &Uuid) -> Result<()>;

    /// Count the applications matching the filters
    async fn get_application_count(&self, filters: &ApplicationFilters) -> Result<i64>;

    /// List the applications matching the filters, ordered by name
    async fn list_applications(
        &self,
        limit: i64,
        offset: i64,
        filters: &ApplicationFilters,
    ) -> Result<Vec<ApplicationListItem>>;

    /// Sorted, distinct measurement keys of the device-profiles used by the
    /// application's devices
    async fn get_measurement_keys(&self, application_id: &Uuid) -> Result<Vec<String>>;
}

/// Integration operations
#[async_trait]
pub trait IntegrationStore: Send + Sync {
    /// Create an integration; one per kind and application
    async fn create_integration(&self, integration: Integration) -> Result<Integration>;

    /// Get the integration of the given kind
    async fn get_integration(
        &self,
        application_id: &Uuid,
        kind: IntegrationKind,
    ) -> Result<Integration>;

    /// Replace the configuration of an existing integration
    async fn update_integration(&self, integration: Integration) -> Result<Integration>;

    /// Delete the integration of the given kind
    async fn delete_integration(&self, application_id: &Uuid, kind: IntegrationKind)
        -> Result<()>;

    /// List the integrations of an application, ordered by kind
    async fn get_integrations_for_application(
        &self,
        application_id: &Uuid,
    ) -> Result<Vec<Integration>>;
}

/// API key operations
#[async_trait]
pub trait ApiKeyStore: Send + Sync {
    /// Create an API key
    async fn create_api_key(&self, key: ApiKey) -> Result<ApiKey>;

    /// Get an API key by id
    async fn get_api_key(&self, id: &Uuid) -> Result<ApiKey>;

    /// Delete an API key
    async fn delete_api_key(&self, id: &Uuid) -> Result<()>;

    /// Count the API keys matching the filters
    async fn get_api_key_count(&self, filters: &ApiKeyFilters) -> Result<i64>;

    /// List the API keys matching the filters, ordered by name
    async fn list_api_keys(
        &self,
        limit: i64,
        offset: i64,
        filters: &ApiKeyFilters,
    ) -> Result<Vec<ApiKey>>;
}

/// Device, device-profile and gateway operations
#[async_trait]
pub trait DeviceStore: Send + Sync {
    /// Create a device-profile
    async fn create_device_profile(&self, profile: DeviceProfile) -> Result<DeviceProfile>;

    /// Create a device
    async fn create_device(&self, device: Device) -> Result<Device>;

    /// Get a device by DevEUI
    async fn get_device(&self, dev_eui: &Eui64) -> Result<Device>;

    /// Record that a device was seen
    async fn set_device_seen(&self, dev_eui: &Eui64, at: DateTime<Utc>, dr: Option<u8>)
        -> Result<()>;

    /// Active / inactive / never-seen device counts
    async fn get_devices_active_inactive(
        &self,
        tenant_id: Option<Uuid>,
    ) -> Result<DevicesActiveInactive>;

    /// Number of devices per data-rate, excluding never-seen devices
    async fn get_devices_data_rates(&self, tenant_id: Option<Uuid>) -> Result<BTreeMap<u8, u32>>;

    /// Create a gateway
    async fn create_gateway(&self, gateway: Gateway) -> Result<Gateway>;

    /// Get a gateway by id
    async fn get_gateway(&self, gateway_id: &Eui64) -> Result<Gateway>;

    /// Record that a gateway was seen
    async fn set_gateway_seen(&self, gateway_id: &Eui64, at: DateTime<Utc>) -> Result<()>;

    /// Online / offline / never-seen gateway counts
    async fn get_gateways_counts_by_state(
        &self,
        tenant_id: Option<Uuid>,
    ) -> Result<GatewayCountsByState>;
}

/// Search over all entity kinds
#[async_trait]
pub trait SearchStore: Send + Sync {
    /// Search tenants, applications, devices and gateways visible to the
    /// user. Global admins see everything.
    async fn global_search(
        &self,
        user_id: &Uuid,
        global_admin: bool,
        search: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SearchResult>>;
}

/// Everything the gRPC services need from a backend.
pub trait Store:
    TenantStore + UserStore + ApplicationStore + IntegrationStore + ApiKeyStore + DeviceStore + SearchStore
{
}

impl<T> Store for T where
    T: TenantStore
        + UserStore
        + ApplicationStore
        + IntegrationStore
        + ApiKeyStore
        + DeviceStore
        + SearchStore
{
}

/// Storage backend selection
#[derive(Clone, Debug, Default)]
pub enum StorageMode {
    /// In-memory storage; contents are lost on restart
    #[default]
    InMemory,
}

/// Create the store for the configured backend
pub fn from_mode(mode: &StorageMode) -> Arc<dyn Store> {
    match mode {
        StorageMode::InMemory => Arc::new(MemoryStore::new()),
    }
}
