//! Per-request authorization rules.
//!
//! Users must be active. Global admin users and admin API keys may do
//! everything. Otherwise access is derived from the caller's membership of
//! the tenant owning the object:
//!
//! | object       | read / list  | create / update / delete         |
//! |--------------|--------------|----------------------------------|
//! | tenant       | tenant user  | global admin only                |
//! | application  | tenant user  | tenant admin or device admin     |
//! | device       | tenant user  | tenant admin or device admin     |
//! | gateway      | tenant user  | tenant admin or gateway admin    |
//! | API key      | tenant user  | tenant admin                     |
//!
//! Tenant API keys are limited to their own tenant and can never manage API
//! keys.

use crate::auth::AuthID;
use async_trait::async_trait;
use ns_storage::{ApiKey, Eui64, StorageError, Store, TenantUser, User};
use std::sync::Arc;
use tonic::{Extensions, Status};
use tracing::error;
use uuid::Uuid;

/// Requested action
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Flag {
    /// Create
    Create,
    /// Read
    Read,
    /// Update
    Update,
    /// Delete
    Delete,
    /// List
    List,
}

/// Authorization rule for one action
#[async_trait]
pub trait Validator: Send + Sync {
    /// Whether the user may perform the action
    async fn validate_user(&self, store: &dyn Store, id: &Uuid) -> Result<bool, StorageError>;

    /// Whether the API key may perform the action
    async fn validate_key(&self, store: &dyn Store, id: &Uuid) -> Result<bool, StorageError>;
}

/// Runs a [`Validator`] against the identity of a request
#[derive(Clone)]
pub struct RequestValidator {
    store: Arc<dyn Store>,
}

impl RequestValidator {
    /// Create a request validator
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Authorize the request, returning the caller identity.
    pub async fn validate(
        &self,
        ext: &Extensions,
        validator: impl Validator,
    ) -> Result<AuthID, Status> {
        let id = ext.get::<AuthID>().copied().unwrap_or(AuthID::None);

        let res = match &id {
            AuthID::User(user_id) => validator.validate_user(self.store.as_ref(), user_id).await,
            AuthID::Key(key_id) => validator.validate_key(self.store.as_ref(), key_id).await,
            AuthID::None => return Err(Status::unauthenticated("no authorization provided")),
        };

        match res {
            Ok(true) => Ok(id),
            Ok(false) => Err(Status::unauthenticated("")),
            Err(e) => {
                error!(error = %e, "Validator function error");
                Err(Status::internal(""))
            }
        }
    }
}

fn optional<T>(res: Result<T, StorageError>) -> Result<Option<T>, StorageError> {
    match res {
        Ok(v) => Ok(Some(v)),
        Err(StorageError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

async fn active_user(store: &dyn Store, id: &Uuid) -> Result<Option<User>, StorageError> {
    Ok(optional(store.get_user(id).await)?.filter(|u| u.is_active))
}

async fn tenant_user(
    store: &dyn Store,
    tenant_id: &Uuid,
    user_id: &Uuid,
) -> Result<Option<TenantUser>, StorageError> {
    optional(store.get_tenant_user(tenant_id, user_id).await)
}

async fn api_key(store: &dyn Store, id: &Uuid) -> Result<Option<ApiKey>, StorageError> {
    optional(store.get_api_key(id).await)
}

/// Tenant of the device's application
async fn device_tenant(store: &dyn Store, dev_eui: &Eui64) -> Result<Option<Uuid>, StorageError> {
    let device = match optional(store.get_device(dev_eui).await)? {
        Some(d) => d,
        None => return Ok(None),
    };
    Ok(optional(store.get_application(&device.application_id).await)?.map(|a| a.tenant_id))
}

/// Which tenant role may modify the object
#[derive(Clone, Copy)]
enum AdminRole {
    Device,
    Gateway,
}

/// Tenant-scoped user rule shared by applications, devices and gateways
async fn tenant_scoped_user(
    store: &dyn Store,
    user_id: &Uuid,
    tenant_id: Option<Uuid>,
    flag: Flag,
    role: AdminRole,
) -> Result<bool, StorageError> {
    let user = match active_user(store, user_id).await? {
        Some(u) => u,
        None => return Ok(false),
    };
    if user.is_admin {
        return Ok(true);
    }

    let tenant_id = match tenant_id {
        Some(t) => t,
        None => return Ok(false),
    };
    let tu = match tenant_user(store, &tenant_id, user_id).await? {
        Some(tu) => tu,
        None => return Ok(false),
    };

    Ok(match flag {
        Flag::Read | Flag::List => true,
        Flag::Create | Flag::Update | Flag::Delete => {
            tu.is_admin
                || match role {
                    AdminRole::Device => tu.is_device_admin,
                    AdminRole::Gateway => tu.is_gateway_admin,
                }
        }
    })
}

/// Tenant-scoped key rule: admin keys, or keys of the owning tenant
async fn tenant_scoped_key(
    store: &dyn Store,
    key_id: &Uuid,
    tenant_id: Option<Uuid>,
) -> Result<bool, StorageError> {
    Ok(match api_key(store, key_id).await? {
        Some(key) => key.is_admin || (tenant_id.is_some() && key.tenant_id == tenant_id),
        None => false,
    })
}

/// Any active user
#[derive(Default)]
pub struct ValidateActiveUser;

impl ValidateActiveUser {
    /// Create the validator
    pub fn new() -> Self {
        ValidateActiveUser
    }
}

#[async_trait]
impl Validator for ValidateActiveUser {
    async fn validate_user(&self, store: &dyn Store, id: &Uuid) -> Result<bool, StorageError> {
        Ok(active_user(store, id).await?.is_some())
    }

    async fn validate_key(&self, _: &dyn Store, _: &Uuid) -> Result<bool, StorageError> {
        Ok(false)
    }
}

/// Active global admin user
#[derive(Default)]
pub struct ValidateIsAdmin;

impl ValidateIsAdmin {
    /// Create the validator
    pub fn new() -> Self {
        ValidateIsAdmin
    }
}

#[async_trait]
impl Validator for ValidateIsAdmin {
    async fn validate_user(&self, store: &dyn Store, id: &Uuid) -> Result<bool, StorageError> {
        Ok(active_user(store, id)
            .await?
            .map(|u| u.is_admin)
            .unwrap_or(false))
    }

    async fn validate_key(&self, _: &dyn Store, _: &Uuid) -> Result<bool, StorageError> {
        Ok(false)
    }
}

/// Create or list API keys, optionally of a tenant
pub struct ValidateApiKeysAccess {
    flag: Flag,
    tenant_id: Option<Uuid>,
}

impl ValidateApiKeysAccess {
    /// Create the validator
    pub fn new(flag: Flag, tenant_id: Option<Uuid>) -> Self {
        ValidateApiKeysAccess { flag, tenant_id }
    }
}

#[async_trait]
impl Validator for ValidateApiKeysAccess {
    async fn validate_user(&self, store: &dyn Store, id: &Uuid) -> Result<bool, StorageError> {
        let user = match active_user(store, id).await? {
            Some(u) => u,
            None => return Ok(false),
        };
        if user.is_admin {
            return Ok(true);
        }

        let tu = match self.tenant_id {
            Some(tenant_id) => tenant_user(store, &tenant_id, id).await?,
            None => None,
        };
        Ok(match (self.flag, tu) {
            (Flag::Create, Some(tu)) => tu.is_admin,
            (Flag::List, Some(_)) => true,
            _ => false,
        })
    }

    async fn validate_key(&self, _: &dyn Store, _: &Uuid) -> Result<bool, StorageError> {
        Ok(false)
    }
}

/// Access to a single API key
pub struct ValidateApiKeyAccess {
    flag: Flag,
    id: Uuid,
}

impl ValidateApiKeyAccess {
    /// Create the validator
    pub fn new(flag: Flag, id: Uuid) -> Self {
        ValidateApiKeyAccess { flag, id }
    }
}

#[async_trait]
impl Validator for ValidateApiKeyAccess {
    async fn validate_user(&self, store: &dyn Store, id: &Uuid) -> Result<bool, StorageError> {
        let user = match active_user(store, id).await? {
            Some(u) => u,
            None => return Ok(false),
        };
        if user.is_admin {
            return Ok(true);
        }
        if self.flag != Flag::Delete {
            return Ok(false);
        }

        let tenant_id = match api_key(store, &self.id).await?.and_then(|k| k.tenant_id) {
            Some(t) => t,
            None => return Ok(false),
        };
        Ok(tenant_user(store, &tenant_id, id)
            .await?
            .map(|tu| tu.is_admin)
            .unwrap_or(false))
    }

    async fn validate_key(&self, _: &dyn Store, _: &Uuid) -> Result<bool, StorageError> {
        Ok(false)
    }
}

/// Access to a tenant
pub struct ValidateTenantAccess {
    flag: Flag,
    tenant_id: Uuid,
}

impl ValidateTenantAccess {
    /// Create the validator
    pub fn new(flag: Flag, tenant_id: Uuid) -> Self {
        ValidateTenantAccess { flag, tenant_id }
    }
}

#[async_trait]
impl Validator for ValidateTenantAccess {
    async fn validate_user(&self, store: &dyn Store, id: &Uuid) -> Result<bool, StorageError> {
        let user = match active_user(store, id).await? {
            Some(u) => u,
            None => return Ok(false),
        };
        if user.is_admin {
            return Ok(true);
        }

        Ok(match self.flag {
            Flag::Read => tenant_user(store, &self.tenant_id, id).await?.is_some(),
            _ => false,
        })
    }

    async fn validate_key(&self, store: &dyn Store, id: &Uuid) -> Result<bool, StorageError> {
        let key = match api_key(store, id).await? {
            Some(k) => k,
            None => return Ok(false),
        };

        Ok(match self.flag {
            Flag::Read => key.is_admin || key.tenant_id == Some(self.tenant_id),
            _ => key.is_admin,
        })
    }
}

/// Create or list applications of a tenant
pub struct ValidateApplicationsAccess {
    flag: Flag,
    tenant_id: Uuid,
}

impl ValidateApplicationsAccess {
    /// Create the validator
    pub fn new(flag: Flag, tenant_id: Uuid) -> Self {
        ValidateApplicationsAccess { flag, tenant_id }
    }
}

#[async_trait]
impl Validator for ValidateApplicationsAccess {
    async fn validate_user(&self, store: &dyn Store, id: &Uuid) -> Result<bool, StorageError> {
        tenant_scoped_user(store, id, Some(self.tenant_id), self.flag, AdminRole::Device).await
    }

    async fn validate_key(&self, store: &dyn Store, id: &Uuid) -> Result<bool, StorageError> {
        tenant_scoped_key(store, id, Some(self.tenant_id)).await
    }
}

/// Access to a single application
pub struct ValidateApplicationAccess {
    flag: Flag,
    application_id: Uuid,
}

impl ValidateApplicationAccess {
    /// Create the validator
    pub fn new(flag: Flag, application_id: Uuid) -> Self {
        ValidateApplicationAccess {
            flag,
            application_id,
        }
    }

    async fn tenant_id(&self, store: &dyn Store) -> Result<Option<Uuid>, StorageError> {
        Ok(optional(store.get_application(&self.application_id).await)?.map(|a| a.tenant_id))
    }
}

#[async_trait]
impl Validator for ValidateApplicationAccess {
    async fn validate_user(&self, store: &dyn Store, id: &Uuid) -> Result<bool, StorageError> {
        let tenant_id = self.tenant_id(store).await?;
        tenant_scoped_user(store, id, tenant_id, self.flag, AdminRole::Device).await
    }

    async fn validate_key(&self, store: &dyn Store, id: &Uuid) -> Result<bool, StorageError> {
        let tenant_id = self.tenant_id(store).await?;
        tenant_scoped_key(store, id, tenant_id).await
    }
}

/// Access to a single device
pub struct ValidateDeviceAccess {
    flag: Flag,
    dev_eui: Eui64,
}

impl ValidateDeviceAccess {
    /// Create the validator
    pub fn new(flag: Flag, dev_eui: Eui64) -> Self {
        ValidateDeviceAccess { flag, dev_eui }
    }
}

#[async_trait]
impl Validator for ValidateDeviceAccess {
    async fn validate_user(&self, store: &dyn Store, id: &Uuid) -> Result<bool, StorageError> {
        let tenant_id = device_tenant(store, &self.dev_eui).await?;
        tenant_scoped_user(store, id, tenant_id, self.flag, AdminRole::Device).await
    }

    async fn validate_key(&self, store: &dyn Store, id: &Uuid) -> Result<bool, StorageError> {
        let tenant_id = device_tenant(store, &self.dev_eui).await?;
        tenant_scoped_key(store, id, tenant_id).await
    }
}

/// Access to a single gateway
pub struct ValidateGatewayAccess {
    flag: Flag,
    gateway_id: Eui64,
}

impl ValidateGatewayAccess {
    /// Create the validator
    pub fn new(flag: Flag, gateway_id: Eui64) -> Self {
        ValidateGatewayAccess { flag, gateway_id }
    }

    async fn tenant_id(&self, store: &dyn Store) -> Result<Option<Uuid>, StorageError> {
        Ok(optional(store.get_gateway(&self.gateway_id).await)?.map(|g| g.tenant_id))
    }
}

#[async_trait]
impl Validator for ValidateGatewayAccess {
    async fn validate_user(&self, store: &dyn Store, id: &Uuid) -> Result<bool, StorageError> {
        let tenant_id = self.tenant_id(store).await?;
        tenant_scoped_user(store, id, tenant_id, self.flag, AdminRole::Gateway).await
    }

    async fn validate_key(&self, store: &dyn Store, id: &Uuid) -> Result<bool, StorageError> {
        let tenant_id = self.tenant_id(store).await?;
        tenant_scoped_key(store, id, tenant_id).await
    }
}
