//! In-memory storage backend for development and testing

use crate::search::{parse_search_query, similarity, SearchResult};
use crate::{
    password, ApiKey, ApiKeyFilters, ApiKeyStore, Application, ApplicationFilters,
    ApplicationListItem, ApplicationStore, Device, DeviceProfile, DeviceStore,
    DevicesActiveInactive, Eui64, Gateway, GatewayCountsByState, Integration,
    IntegrationConfiguration, IntegrationKind, IntegrationStore, Result, SearchStore,
    StorageError, Tenant, TenantStore, TenantUser, User, UserStore,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

/// Integration row; the configuration is kept as a JSON document.
#[derive(Clone, Debug)]
struct StoredIntegration {
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    configuration: serde_json::Value,
}

/// In-memory store implementing every storage trait
#[derive(Clone, Default)]
pub struct MemoryStore {
    tenants: Arc<DashMap<Uuid, Tenant>>,
    /// (tenant_id, user_id) -> link
    tenant_users: Arc<DashMap<(Uuid, Uuid), TenantUser>>,
    users: Arc<DashMap<Uuid, User>>,
    /// Serializes user writes so e-mail and external id stay unique
    user_writes: Arc<Mutex<()>>,
    applications: Arc<DashMap<Uuid, Application>>,
    integrations: Arc<DashMap<(Uuid, IntegrationKind), StoredIntegration>>,
    api_keys: Arc<DashMap<Uuid, ApiKey>>,
    device_profiles: Arc<DashMap<Uuid, DeviceProfile>>,
    devices: Arc<DashMap<Eui64, Device>>,
    gateways: Arc<DashMap<Eui64, Gateway>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_user_writes(&self) -> MutexGuard<'_, ()> {
        self.user_writes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn filter_applications(&self, filters: &ApplicationFilters) -> Vec<Application> {
        let search = filters.search.as_ref().map(|s| s.to_lowercase());
        self.applications
            .iter()
            .filter(|a| filters.tenant_id.map(|t| a.tenant_id == t).unwrap_or(true))
            .filter(|a| {
                search
                    .as_ref()
                    .map(|s| a.name.to_lowercase().contains(s.as_str()))
                    .unwrap_or(true)
            })
            .map(|a| a.value().clone())
            .collect()
    }

    fn filter_api_keys(&self, filters: &ApiKeyFilters) -> Vec<ApiKey> {
        self.api_keys
            .iter()
            .filter(|k| k.is_admin == filters.is_admin)
            .filter(|k| filters.tenant_id.map(|t| k.tenant_id == Some(t)).unwrap_or(true))
            .map(|k| k.value().clone())
            .collect()
    }

    fn decode_integration(
        application_id: Uuid,
        kind: IntegrationKind,
        stored: StoredIntegration,
    ) -> Result<Integration> {
        Ok(Integration {
            application_id,
            kind,
            created_at: stored.created_at,
            updated_at: stored.updated_at,
            configuration: serde_json::from_value::<IntegrationConfiguration>(
                stored.configuration,
            )?,
        })
    }

    /// Tenant of the device-profile a device uses
    fn device_tenant(&self, device: &Device) -> Option<Uuid> {
        self.device_profiles
            .get(&device.device_profile_id)
            .map(|dp| dp.tenant_id)
    }

    fn visible_tenants(&self, user_id: &Uuid, global_admin: bool) -> HashSet<Uuid> {
        if global_admin {
            return self.tenants.iter().map(|t| *t.key()).collect();
        }
        self.tenant_users
            .iter()
            .filter(|tu| tu.user_id == *user_id)
            .map(|tu| tu.tenant_id)
            .collect()
    }
}

fn paginate<T>(items: Vec<T>, limit: i64, offset: i64) -> Vec<T> {
    items
        .into_iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .collect()
}

#[async_trait]
impl TenantStore for MemoryStore {
    async fn create_tenant(&self, tenant: Tenant) -> Result<Tenant> {
        tenant.validate()?;
        if self.tenants.contains_key(&tenant.id) {
            return Err(StorageError::AlreadyExists(tenant.id.to_string()));
        }
        self.tenants.insert(tenant.id, tenant.clone());
        debug!(id = %tenant.id, "Tenant created");
        Ok(tenant)
    }

    async fn get_tenant(&self, id: &Uuid) -> Result<Tenant> {
        self.tenants
            .get(id)
            .map(|t| t.clone())
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    async fn add_tenant_user(&self, tenant_user: TenantUser) -> Result<TenantUser> {
        if !self.tenants.contains_key(&tenant_user.tenant_id) {
            return Err(StorageError::NotFound(tenant_user.tenant_id.to_string()));
        }
        if !self.users.contains_key(&tenant_user.user_id) {
            return Err(StorageError::NotFound(tenant_user.user_id.to_string()));
        }

        let key = (tenant_user.tenant_id, tenant_user.user_id);
        if self.tenant_users.contains_key(&key) {
            return Err(StorageError::AlreadyExists(format!(
                "{}/{}",
                tenant_user.tenant_id, tenant_user.user_id
            )));
        }
        self.tenant_users.insert(key, tenant_user.clone());
        debug!(
            tenant_id = %tenant_user.tenant_id,
            user_id = %tenant_user.user_id,
            "Tenant user added"
        );
        Ok(tenant_user)
    }

    async fn get_tenant_user(&self, tenant_id: &Uuid, user_id: &Uuid) -> Result<TenantUser> {
        self.tenant_users
            .get(&(*tenant_id, *user_id))
            .map(|tu| tu.clone())
            .ok_or_else(|| StorageError::NotFound(format!("{}/{}", tenant_id, user_id)))
    }

    async fn get_tenant_users_for_user(&self, user_id: &Uuid) -> Result<Vec<TenantUser>> {
        let mut out: Vec<TenantUser> = self
            .tenant_users
            .iter()
            .filter(|tu| tu.user_id == *user_id)
            .map(|tu| tu.value().clone())
            .collect();
        out.sort_by_key(|tu| tu.tenant_id);
        Ok(out)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, user: User) -> Result<User> {
        user.validate()?;

        let _writes = self.lock_user_writes();
        let duplicate = self.users.iter().any(|u| {
            (!user.email.is_empty() && u.email == user.email)
                || (user.external_id.is_some() && u.external_id == user.external_id)
        });
        if duplicate {
            return Err(StorageError::AlreadyExists(user.email.clone()));
        }

        match self.users.entry(user.id) {
            Entry::Occupied(_) => return Err(StorageError::AlreadyExists(user.id.to_string())),
            Entry::Vacant(e) => {
                e.insert(user.clone());
            }
        }
        debug!(id = %user.id, email = %user.email, "User created");
        Ok(user)
    }

    async fn get_user(&self, id: &Uuid) -> Result<User> {
        self.users
            .get(id)
            .map(|u| u.clone())
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    async fn get_user_by_email(&self, email: &str) -> Result<User> {
        self.users
            .iter()
            .find(|u| u.email == email)
            .map(|u| u.value().clone())
            .ok_or_else(|| StorageError::NotFound(email.to_string()))
    }

    async fn get_user_by_external_id(&self, external_id: &str) -> Result<User> {
        self.users
            .iter()
            .find(|u| u.external_id.as_deref() == Some(external_id))
            .map(|u| u.value().clone())
            .ok_or_else(|| StorageError::NotFound(external_id.to_string()))
    }

    async fn get_user_by_email_and_pw(&self, email: &str, pw: &str) -> Result<User> {
        let user = match self.get_user_by_email(email).await {
            Ok(u) => u,
            Err(StorageError::NotFound(_)) => {
                return Err(StorageError::InvalidUsernameOrPassword)
            }
            Err(e) => return Err(e),
        };

        if !user.is_active || !password::verify_password(pw, &user.password_hash)? {
            return Err(StorageError::InvalidUsernameOrPassword);
        }
        Ok(user)
    }

    async fn update_user(&self, mut user: User) -> Result<User> {
        user.validate()?;

        let _writes = self.lock_user_writes();
        let created_at = self
            .users
            .get(&user.id)
            .map(|u| u.created_at)
            .ok_or_else(|| StorageError::NotFound(user.id.to_string()))?;
        let conflict = self.users.iter().any(|u| {
            u.id != user.id
                && ((!user.email.is_empty() && u.email == user.email)
                    || (user.external_id.is_some() && u.external_id == user.external_id))
        });
        if conflict {
            return Err(StorageError::AlreadyExists(user.email.clone()));
        }

        user.created_at = created_at;
        user.updated_at = Utc::now();
        self.users.insert(user.id, user.clone());
        debug!(id = %user.id, "User updated");
        Ok(user)
    }

    async fn delete_user(&self, id: &Uuid) -> Result<()> {
        if self.users.remove(id).is_none() {
            return Err(StorageError::NotFound(id.to_string()));
        }
        self.tenant_users.retain(|(_, user_id), _| user_id != id);
        debug!(id = %id, "User deleted");
        Ok(())
    }
}

#[async_trait]
impl ApplicationStore for MemoryStore {
    async fn create_application(&self, app: Application) -> Result<Application> {
        app.validate()?;
        if !self.tenants.contains_key(&app.tenant_id) {
            return Err(StorageError::NotFound(app.tenant_id.to_string()));
        }
        match self.applications.entry(app.id) {
            Entry::Occupied(_) => return Err(StorageError::AlreadyExists(app.id.to_string())),
            Entry::Vacant(e) => {
                e.insert(app.clone());
            }
        }
        debug!(id = %app.id, tenant_id = %app.tenant_id, "Application created");
        Ok(app)
    }

    async fn get_application(&self, id: &Uuid) -> Result<Application> {
        self.applications
            .get(id)
            .map(|a| a.clone())
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    async fn update_application(&self, app: Application) -> Result<Application> {
        app.validate()?;

        let mut existing = self
            .applications
            .get_mut(&app.id)
            .ok_or_else(|| StorageError::NotFound(app.id.to_string()))?;
        existing.name = app.name;
        existing.description = app.description;
        existing.updated_at = Utc::now();

        debug!(id = %existing.id, "Application updated");
        Ok(existing.clone())
    }

    async fn set_mqtt_tls_cert(&self, id: &Uuid, cert: &[u8]) -> Result<Application> {
        let mut existing = self
            .applications
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        existing.mqtt_tls_cert = Some(cert.to_vec());

        debug!(id = %id, "Application MQTT certificate updated");
        Ok(existing.clone())
    }

    async fn delete_application(&self, id: &Uuid) -> Result<()> {
        if self.applications.remove(id).is_none() {
            return Err(StorageError::NotFound(id.to_string()));
        }
        self.integrations.retain(|(app_id, _), _| app_id != id);
        self.devices.retain(|_, d| d.application_id != *id);
        debug!(id = %id, "Application deleted");
        Ok(())
    }

    async fn get_application_count(&self, filters: &ApplicationFilters) -> Result<i64> {
        Ok(self.filter_applications(filters).len() as i64)
    }

    async fn list_applications(
        &self,
        limit: i64,
        offset: i64,
        filters: &ApplicationFilters,
    ) -> Result<Vec<ApplicationListItem>> {
        let mut apps = self.filter_applications(filters);
        apps.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));

        Ok(paginate(apps, limit, offset)
            .iter()
            .map(ApplicationListItem::from)
            .collect())
    }

    async fn get_measurement_keys(&self, application_id: &Uuid) -> Result<Vec<String>> {
        let profile_ids: HashSet<Uuid> = self
            .devices
            .iter()
            .filter(|d| d.application_id == *application_id)
            .map(|d| d.device_profile_id)
            .collect();

        let keys: BTreeSet<String> = profile_ids
            .iter()
            .filter_map(|id| self.device_profiles.get(id))
            .flat_map(|dp| dp.measurements.keys().cloned().collect::<Vec<_>>())
            .collect();

        Ok(keys.into_iter().collect())
    }
}

#[async_trait]
impl IntegrationStore for MemoryStore {
    async fn create_integration(&self, integration: Integration) -> Result<Integration> {
        if !self.applications.contains_key(&integration.application_id) {
            return Err(StorageError::NotFound(
                integration.application_id.to_string(),
            ));
        }

        let stored = StoredIntegration {
            created_at: integration.created_at,
            updated_at: integration.updated_at,
            configuration: serde_json::to_value(&integration.configuration)?,
        };
        match self
            .integrations
            .entry((integration.application_id, integration.kind))
        {
            Entry::Occupied(_) => {
                return Err(StorageError::AlreadyExists(format!(
                    "{}/{}",
                    integration.application_id, integration.kind
                )))
            }
            Entry::Vacant(e) => {
                e.insert(stored);
            }
        }
        debug!(
            application_id = %integration.application_id,
            kind = %integration.kind,
            "Integration created"
        );
        Ok(integration)
    }

    async fn get_integration(
        &self,
        application_id: &Uuid,
        kind: IntegrationKind,
    ) -> Result<Integration> {
        let stored = self
            .integrations
            .get(&(*application_id, kind))
            .map(|i| i.clone())
            .ok_or_else(|| StorageError::NotFound(format!("{}/{}", application_id, kind)))?;

        Self::decode_integration(*application_id, kind, stored)
    }

    async fn update_integration(&self, mut integration: Integration) -> Result<Integration> {
        let key = (integration.application_id, integration.kind);
        let mut stored = self.integrations.get_mut(&key).ok_or_else(|| {
            StorageError::NotFound(format!(
                "{}/{}",
                integration.application_id, integration.kind
            ))
        })?;

        integration.created_at = stored.created_at;
        integration.updated_at = Utc::now();
        stored.updated_at = integration.updated_at;
        stored.configuration = serde_json::to_value(&integration.configuration)?;

        debug!(
            application_id = %integration.application_id,
            kind = %integration.kind,
            "Integration updated"
        );
        Ok(integration)
    }

    async fn delete_integration(
        &self,
        application_id: &Uuid,
        kind: IntegrationKind,
    ) -> Result<()> {
        if self.integrations.remove(&(*application_id, kind)).is_none() {
            return Err(StorageError::NotFound(format!("{}/{}", application_id, kind)));
        }
        debug!(application_id = %application_id, kind = %kind, "Integration deleted");
        Ok(())
    }

    async fn get_integrations_for_application(
        &self,
        application_id: &Uuid,
    ) -> Result<Vec<Integration>> {
        let rows: Vec<(IntegrationKind, StoredIntegration)> = self
            .integrations
            .iter()
            .filter(|i| i.key().0 == *application_id)
            .map(|i| (i.key().1, i.value().clone()))
            .collect();

        let mut out = rows
            .into_iter()
            .map(|(kind, stored)| Self::decode_integration(*application_id, kind, stored))
            .collect::<Result<Vec<_>>>()?;
        out.sort_by_key(|i| i.kind.to_string());
        Ok(out)
    }
}

#[async_trait]
impl ApiKeyStore for MemoryStore {
    async fn create_api_key(&self, key: ApiKey) -> Result<ApiKey> {
        key.validate()?;
        if let Some(tenant_id) = &key.tenant_id {
            if !self.tenants.contains_key(tenant_id) {
                return Err(StorageError::NotFound(tenant_id.to_string()));
            }
        }
        if self.api_keys.contains_key(&key.id) {
            return Err(StorageError::AlreadyExists(key.id.to_string()));
        }

        self.api_keys.insert(key.id, key.clone());
        debug!(id = %key.id, "Api-key created");
        Ok(key)
    }

    async fn get_api_key(&self, id: &Uuid) -> Result<ApiKey> {
        self.api_keys
            .get(id)
            .map(|k| k.clone())
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    async fn delete_api_key(&self, id: &Uuid) -> Result<()> {
        if self.api_keys.remove(id).is_none() {
            return Err(StorageError::NotFound(id.to_string()));
        }
        debug!(id = %id, "Api-key deleted");
        Ok(())
    }

    async fn get_api_key_count(&self, filters: &ApiKeyFilters) -> Result<i64> {
        Ok(self.filter_api_keys(filters).len() as i64)
    }

    async fn list_api_keys(
        &self,
        limit: i64,
        offset: i64,
        filters: &ApiKeyFilters,
    ) -> Result<Vec<ApiKey>> {
        let mut keys = self.filter_api_keys(filters);
        keys.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(paginate(keys, limit, offset))
    }
}

#[async_trait]
impl DeviceStore for MemoryStore {
    async fn create_device_profile(&self, profile: DeviceProfile) -> Result<DeviceProfile> {
        if !self.tenants.contains_key(&profile.tenant_id) {
            return Err(StorageError::NotFound(profile.tenant_id.to_string()));
        }
        self.device_profiles.insert(profile.id, profile.clone());
        debug!(id = %profile.id, "Device-profile created");
        Ok(profile)
    }

    async fn create_device(&self, device: Device) -> Result<Device> {
        if !self.applications.contains_key(&device.application_id) {
            return Err(StorageError::NotFound(device.application_id.to_string()));
        }
        if !self.device_profiles.contains_key(&device.device_profile_id) {
            return Err(StorageError::NotFound(device.device_profile_id.to_string()));
        }
        if self.devices.contains_key(&device.dev_eui) {
            return Err(StorageError::AlreadyExists(device.dev_eui.to_string()));
        }

        self.devices.insert(device.dev_eui, device.clone());
        debug!(dev_eui = %device.dev_eui, "Device created");
        Ok(device)
    }

    async fn get_device(&self, dev_eui: &Eui64) -> Result<Device> {
        self.devices
            .get(dev_eui)
            .map(|d| d.clone())
            .ok_or_else(|| StorageError::NotFound(dev_eui.to_string()))
    }

    async fn set_device_seen(
        &self,
        dev_eui: &Eui64,
        at: DateTime<Utc>,
        dr: Option<u8>,
    ) -> Result<()> {
        let mut device = self
            .devices
            .get_mut(dev_eui)
            .ok_or_else(|| StorageError::NotFound(dev_eui.to_string()))?;
        device.last_seen_at = Some(at);
        if dr.is_some() {
            device.dr = dr;
        }
        Ok(())
    }

    async fn get_devices_active_inactive(
        &self,
        tenant_id: Option<Uuid>,
    ) -> Result<DevicesActiveInactive> {
        let now = Utc::now();
        let mut out = DevicesActiveInactive::default();

        let devices: Vec<Device> = self.devices.iter().map(|d| d.value().clone()).collect();
        for device in devices {
            let profile = match self.device_profiles.get(&device.device_profile_id) {
                Some(dp) => dp.clone(),
                None => continue,
            };
            if tenant_id.map(|t| t != profile.tenant_id).unwrap_or(false) {
                continue;
            }

            let window = Duration::milliseconds(i64::from(profile.uplink_interval) * 1500);
            match device.last_seen_at {
                None => out.never_seen_count += 1,
                Some(seen) if now - window <= seen => out.active_count += 1,
                Some(_) => out.inactive_count += 1,
            }
        }

        Ok(out)
    }

    async fn get_devices_data_rates(&self, tenant_id: Option<Uuid>) -> Result<BTreeMap<u8, u32>> {
        let mut out = BTreeMap::new();

        let devices: Vec<Device> = self.devices.iter().map(|d| d.value().clone()).collect();
        for device in devices {
            let dr = match device.dr {
                Some(dr) => dr,
                None => continue,
            };
            if let Some(t) = tenant_id {
                if self.device_tenant(&device) != Some(t) {
                    continue;
                }
            }
            *out.entry(dr).or_insert(0) += 1;
        }

        Ok(out)
    }

    async fn create_gateway(&self, gateway: Gateway) -> Result<Gateway> {
        if gateway.name.is_empty() {
            return Err(StorageError::Validation("name is not set".into()));
        }
        if !self.tenants.contains_key(&gateway.tenant_id) {
            return Err(StorageError::NotFound(gateway.tenant_id.to_string()));
        }
        if self.gateways.contains_key(&gateway.gateway_id) {
            return Err(StorageError::AlreadyExists(gateway.gateway_id.to_string()));
        }

        self.gateways.insert(gateway.gateway_id, gateway.clone());
        debug!(gateway_id = %gateway.gateway_id, "Gateway created");
        Ok(gateway)
    }

    async fn get_gateway(&self, gateway_id: &Eui64) -> Result<Gateway> {
        self.gateways
            .get(gateway_id)
            .map(|g| g.clone())
            .ok_or_else(|| StorageError::NotFound(gateway_id.to_string()))
    }

    async fn set_gateway_seen(&self, gateway_id: &Eui64, at: DateTime<Utc>) -> Result<()> {
        let mut gateway = self
            .gateways
            .get_mut(gateway_id)
            .ok_or_else(|| StorageError::NotFound(gateway_id.to_string()))?;
        gateway.last_seen_at = Some(at);
        Ok(())
    }

    async fn get_gateways_counts_by_state(
        &self,
        tenant_id: Option<Uuid>,
    ) -> Result<GatewayCountsByState> {
        let now = Utc::now();
        let mut out = GatewayCountsByState::default();

        for gw in self.gateways.iter() {
            if tenant_id.map(|t| t != gw.tenant_id).unwrap_or(false) {
                continue;
            }

            let window = Duration::seconds(i64::from(gw.stats_interval_secs) * 2);
            match gw.last_seen_at {
                None => out.never_seen_count += 1,
                Some(seen) if now - window <= seen => out.online_count += 1,
                Some(_) => out.offline_count += 1,
            }
        }

        Ok(out)
    }
}

#[async_trait]
impl SearchStore for MemoryStore {
    async fn global_search(
        &self,
        user_id: &Uuid,
        global_admin: bool,
        search: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SearchResult>> {
        let q = parse_search_query(search)?;
        let visible = self.visible_tenants(user_id, global_admin);
        let mut results = Vec::new();

        let tenant_name = |id: &Uuid| self.tenants.get(id).map(|t| t.name.clone());

        let devices: Vec<Device> = self.devices.iter().map(|d| d.value().clone()).collect();
        for d in devices {
            let app = match self.applications.get(&d.application_id) {
                Some(a) => a.clone(),
                None => continue,
            };
            if !visible.contains(&app.tenant_id) {
                continue;
            }

            let eui = d.dev_eui.to_string();
            let dev_addr = d.dev_addr.map(|a| crate::to_hex(&a));
            let text_match = q.matches_text(&d.name)
                || q.matches_text(&eui)
                || dev_addr.as_deref().map(|a| q.matches_text(a)).unwrap_or(false);
            if !(text_match || q.matches_tags(&d.tags)) {
                continue;
            }

            let score = [
                Some(similarity(&d.name, search)),
                Some(similarity(&eui, search)),
                dev_addr.as_deref().map(|a| similarity(a, search)),
            ]
            .into_iter()
            .flatten()
            .fold(0.0f32, f32::max);

            let mut r = SearchResult::new("device", score);
            r.tenant_id = Some(app.tenant_id);
            r.tenant_name = tenant_name(&app.tenant_id);
            r.application_id = Some(app.id);
            r.application_name = Some(app.name.clone());
            r.device_dev_eui = Some(d.dev_eui);
            r.device_name = Some(d.name.clone());
            results.push(r);
        }

        let gateways: Vec<Gateway> = self.gateways.iter().map(|g| g.value().clone()).collect();
        for g in gateways {
            if !visible.contains(&g.tenant_id) {
                continue;
            }

            let id = g.gateway_id.to_string();
            if !(q.matches_text(&g.name) || q.matches_text(&id) || q.matches_tags(&g.tags)) {
                continue;
            }

            let mut r = SearchResult::new(
                "gateway",
                similarity(&g.name, search).max(similarity(&id, search)),
            );
            r.tenant_id = Some(g.tenant_id);
            r.tenant_name = tenant_name(&g.tenant_id);
            r.gateway_id = Some(g.gateway_id);
            r.gateway_name = Some(g.name.clone());
            results.push(r);
        }

        let tenants: Vec<Tenant> = self.tenants.iter().map(|t| t.value().clone()).collect();
        for t in tenants {
            if !visible.contains(&t.id) || !q.matches_text(&t.name) {
                continue;
            }

            let mut r = SearchResult::new("tenant", similarity(&t.name, search));
            r.tenant_id = Some(t.id);
            r.tenant_name = Some(t.name.clone());
            results.push(r);
        }

        let apps: Vec<Application> =
            self.applications.iter().map(|a| a.value().clone()).collect();
        for a in apps {
            if !visible.contains(&a.tenant_id) || !q.matches_text(&a.name) {
                continue;
            }

            let mut r = SearchResult::new("application", similarity(&a.name, search));
            r.tenant_id = Some(a.tenant_id);
            r.tenant_name = tenant_name(&a.tenant_id);
            r.application_id = Some(a.id);
            r.application_name = Some(a.name.clone());
            results.push(r);
        }

        // map iteration order is arbitrary; fix it before ranking
        results.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.kind.cmp(&b.kind))
                .then_with(|| a.tenant_id.cmp(&b.tenant_id))
                .then_with(|| a.application_id.cmp(&b.application_id))
                .then_with(|| a.device_dev_eui.cmp(&b.device_dev_eui))
                .then_with(|| a.gateway_id.cmp(&b.gateway_id))
        });

        debug!(
            user_id = %user_id,
            search = %search,
            hits = results.len(),
            "Global search"
        );
        Ok(results.into_iter().skip(offset).take(limit).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    async fn setup_tenant(store: &MemoryStore, name: &str) -> Tenant {
        store
            .create_tenant(Tenant {
                name: name.into(),
                ..Default::default()
            })
            .await
            .unwrap()
    }

    async fn setup_app(store: &MemoryStore, tenant_id: Uuid, name: &str) -> Application {
        store
            .create_application(Application {
                tenant_id,
                name: name.into(),
                ..Default::default()
            })
            .await
            .unwrap()
    }

    async fn setup_user(store: &MemoryStore, email: &str, pw: &str, active: bool) -> User {
        let mut user = User {
            email: email.into(),
            is_active: active,
            ..Default::default()
        };
        user.set_password_hash(pw).unwrap();
        store.create_user(user).await.unwrap()
    }

    #[tokio::test]
    async fn test_application_crud() {
        let store = MemoryStore::new();
        let tenant = setup_tenant(&store, "tenant").await;

        let app = setup_app(&store, tenant.id, "test-app").await;
        assert_eq!(store.get_application(&app.id).await.unwrap(), app);

        let updated = store
            .update_application(Application {
                name: "renamed".into(),
                description: "desc".into(),
                ..app.clone()
            })
            .await
            .unwrap();
        assert_eq!(updated.name, "renamed");
        assert_eq!(updated.created_at, app.created_at);
        assert!(updated.updated_at >= app.updated_at);

        store.delete_application(&app.id).await.unwrap();
        assert!(matches!(
            store.get_application(&app.id).await,
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            store.delete_application(&app.id).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_application_requires_name_and_tenant() {
        let store = MemoryStore::new();
        let tenant = setup_tenant(&store, "tenant").await;

        let res = store
            .create_application(Application {
                tenant_id: tenant.id,
                ..Default::default()
            })
            .await;
        assert!(matches!(res, Err(StorageError::Validation(_))));

        let res = store
            .create_application(Application {
                tenant_id: Uuid::new_v4(),
                name: "app".into(),
                ..Default::default()
            })
            .await;
        assert!(matches!(res, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_application_list_filters() {
        let store = MemoryStore::new();
        let t1 = setup_tenant(&store, "t1").await;
        let t2 = setup_tenant(&store, "t2").await;
        setup_app(&store, t1.id, "charlie").await;
        setup_app(&store, t1.id, "Alpha").await;
        setup_app(&store, t1.id, "bravo").await;
        setup_app(&store, t2.id, "alphabet").await;

        let all = ApplicationFilters::default();
        assert_eq!(store.get_application_count(&all).await.unwrap(), 4);

        let f = ApplicationFilters {
            tenant_id: Some(t1.id),
            search: None,
        };
        assert_eq!(store.get_application_count(&f).await.unwrap(), 3);
        let names: Vec<String> = store
            .list_applications(10, 0, &f)
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.name)
            .collect();
        assert_eq!(names, vec!["Alpha", "bravo", "charlie"]);

        let page = store.list_applications(1, 1, &f).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].name, "bravo");

        let f = ApplicationFilters {
            tenant_id: None,
            search: Some("ALPH".into()),
        };
        assert_eq!(store.get_application_count(&f).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_integrations() {
        let store = MemoryStore::new();
        let tenant = setup_tenant(&store, "tenant").await;
        let app = setup_app(&store, tenant.id, "app").await;

        let http = Integration {
            application_id: app.id,
            kind: IntegrationKind::Http,
            configuration: IntegrationConfiguration::Http(crate::HttpConfiguration {
                json: true,
                event_endpoint_url: "http://localhost:8090".into(),
                ..Default::default()
            }),
            ..Default::default()
        };
        store.create_integration(http.clone()).await.unwrap();
        assert!(matches!(
            store.create_integration(http.clone()).await,
            Err(StorageError::AlreadyExists(_))
        ));

        store
            .create_integration(Integration {
                application_id: app.id,
                kind: IntegrationKind::AwsSns,
                configuration: IntegrationConfiguration::AwsSns(Default::default()),
                ..Default::default()
            })
            .await
            .unwrap();

        let got = store
            .get_integration(&app.id, IntegrationKind::Http)
            .await
            .unwrap();
        assert_eq!(got.configuration, http.configuration);

        let kinds: Vec<IntegrationKind> = store
            .get_integrations_for_application(&app.id)
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.kind)
            .collect();
        assert_eq!(kinds, vec![IntegrationKind::AwsSns, IntegrationKind::Http]);

        let mut changed = got.clone();
        changed.configuration = IntegrationConfiguration::Http(crate::HttpConfiguration {
            json: false,
            ..Default::default()
        });
        let updated = store.update_integration(changed.clone()).await.unwrap();
        assert_eq!(updated.created_at, got.created_at);

        store
            .delete_integration(&app.id, IntegrationKind::Http)
            .await
            .unwrap();
        assert!(matches!(
            store.delete_integration(&app.id, IntegrationKind::Http).await,
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            store.update_integration(changed).await,
            Err(StorageError::NotFound(_))
        ));

        // deleting the application removes the remaining integrations
        store.delete_application(&app.id).await.unwrap();
        assert!(store.integrations.is_empty());
    }

    #[tokio::test]
    async fn test_legacy_integration_document() {
        let store = MemoryStore::new();
        let tenant = setup_tenant(&store, "tenant").await;
        let app = setup_app(&store, tenant.id, "app").await;

        let now = Utc::now();
        store.integrations.insert(
            (app.id, IntegrationKind::LoraCloud),
            StoredIntegration {
                created_at: now,
                updated_at: now,
                configuration: serde_json::json!({"LoraCloud": {"modem_geolocation_services": {
                    "token": "t", "modem_enabled": true, "modem_port": 199, "gnss_port": 198,
                    "gnss_use_rx_time": false, "parse_tlv": false,
                    "geolocation_buffer_ttl": 0, "geolocation_min_buffer_size": 0,
                    "geolocation_tdoa": false, "geolocation_rssi": false, "geolocation_gnss": false,
                    "geolocation_gnss_payload_field": "", "geolocation_gnss_use_rx_time": false,
                    "geolocation_wifi": false, "geolocation_wifi_payload_field": ""}}}),
            },
        );

        let i = store
            .get_integration(&app.id, IntegrationKind::LoraCloud)
            .await
            .unwrap();
        match i.configuration {
            IntegrationConfiguration::LoraCloud(c) => {
                assert_eq!(c.modem_geolocation_services.modem_port, 199);
                assert!(c.modem_geolocation_services.forward_f_ports.is_empty());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creates_conflict() {
        let store = MemoryStore::new();
        let tenant = setup_tenant(&store, "tenant").await;
        let app = setup_app(&store, tenant.id, "app").await;

        for round in 0..50 {
            let integration = Integration {
                application_id: app.id,
                kind: IntegrationKind::Http,
                configuration: IntegrationConfiguration::Http(Default::default()),
                ..Default::default()
            };
            let tasks: Vec<_> = (0..2)
                .map(|_| {
                    let store = store.clone();
                    let integration = integration.clone();
                    tokio::spawn(async move { store.create_integration(integration).await })
                })
                .collect();
            let mut created = 0;
            for t in tasks {
                match t.await.unwrap() {
                    Ok(_) => created += 1,
                    Err(e) => assert!(matches!(e, StorageError::AlreadyExists(_))),
                }
            }
            assert_eq!(created, 1);
            store
                .delete_integration(&app.id, IntegrationKind::Http)
                .await
                .unwrap();

            let email = format!("user{}@example.com", round);
            let tasks: Vec<_> = (0..2)
                .map(|_| {
                    let store = store.clone();
                    let mut user = User {
                        email: email.clone(),
                        ..Default::default()
                    };
                    user.set_password_hash("pw").unwrap();
                    tokio::spawn(async move { store.create_user(user).await })
                })
                .collect();
            let mut created = 0;
            for t in tasks {
                if t.await.unwrap().is_ok() {
                    created += 1;
                }
            }
            assert_eq!(created, 1, "{}", email);
        }

        let app = store.get_application(&app.id).await.unwrap();
        assert!(matches!(
            store.create_application(app).await,
            Err(StorageError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_user_login() {
        let store = MemoryStore::new();
        setup_user(&store, "admin@example.com", "secret", true).await;
        setup_user(&store, "inactive@example.com", "secret", false).await;

        let user = store
            .get_user_by_email_and_pw("admin@example.com", "secret")
            .await
            .unwrap();
        assert_eq!(user.email, "admin@example.com");

        for (email, pw) in [
            ("admin@example.com", "wrong"),
            ("nobody@example.com", "secret"),
            ("inactive@example.com", "secret"),
        ] {
            assert!(matches!(
                store.get_user_by_email_and_pw(email, pw).await,
                Err(StorageError::InvalidUsernameOrPassword)
            ));
        }

        let res = store
            .create_user(User {
                email: "admin@example.com".into(),
                ..Default::default()
            })
            .await;
        assert!(matches!(res, Err(StorageError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_user_update_and_delete() {
        let store = MemoryStore::new();
        let tenant = setup_tenant(&store, "tenant").await;
        let user = setup_user(&store, "user@example.com", "pw", true).await;
        store
            .add_tenant_user(TenantUser {
                tenant_id: tenant.id,
                user_id: user.id,
                ..Default::default()
            })
            .await
            .unwrap();

        let mut changed = user.clone();
        changed.external_id = Some("sub-1".into());
        changed.email_verified = true;
        store.update_user(changed).await.unwrap();
        let by_ext = store.get_user_by_external_id("sub-1").await.unwrap();
        assert_eq!(by_ext.id, user.id);
        assert!(by_ext.email_verified);

        assert_eq!(store.get_tenant_users_for_user(&user.id).await.unwrap().len(), 1);
        store.delete_user(&user.id).await.unwrap();
        assert!(store.get_tenant_users_for_user(&user.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_api_key_filters() {
        let store = MemoryStore::new();
        let tenant = setup_tenant(&store, "tenant").await;

        for (name, is_admin, tenant_id) in [
            ("b-admin", true, None),
            ("a-admin", true, None),
            ("tenant-key", false, Some(tenant.id)),
        ] {
            store
                .create_api_key(ApiKey {
                    name: name.into(),
                    is_admin,
                    tenant_id,
                    ..Default::default()
                })
                .await
                .unwrap();
        }

        let admin = ApiKeyFilters {
            is_admin: true,
            tenant_id: None,
        };
        assert_eq!(store.get_api_key_count(&admin).await.unwrap(), 2);
        let names: Vec<String> = store
            .list_api_keys(10, 0, &admin)
            .await
            .unwrap()
            .into_iter()
            .map(|k| k.name)
            .collect();
        assert_eq!(names, vec!["a-admin", "b-admin"]);

        let per_tenant = ApiKeyFilters {
            is_admin: false,
            tenant_id: Some(tenant.id),
        };
        assert_eq!(store.get_api_key_count(&per_tenant).await.unwrap(), 1);

        let res = store
            .create_api_key(ApiKey {
                name: "orphan".into(),
                tenant_id: Some(Uuid::new_v4()),
                ..Default::default()
            })
            .await;
        assert!(matches!(res, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_device_and_gateway_summaries() {
        let store = MemoryStore::new();
        let t1 = setup_tenant(&store, "t1").await;
        let t2 = setup_tenant(&store, "t2").await;
        let app = setup_app(&store, t1.id, "app").await;

        let mut measurements = BTreeMap::new();
        measurements.insert("temperature".to_string(), "Temperature".to_string());
        measurements.insert("humidity".to_string(), "Humidity".to_string());
        let dp = store
            .create_device_profile(DeviceProfile {
                tenant_id: t1.id,
                uplink_interval: 60,
                measurements,
                ..Default::default()
            })
            .await
            .unwrap();

        for i in 1..=3u64 {
            store
                .create_device(Device {
                    dev_eui: Eui64::from_be_u64(i),
                    application_id: app.id,
                    device_profile_id: dp.id,
                    name: format!("dev-{}", i),
                    ..Default::default()
                })
                .await
                .unwrap();
        }

        let now = Utc::now();
        store
            .set_device_seen(&Eui64::from_be_u64(1), now, Some(5))
            .await
            .unwrap();
        store
            .set_device_seen(&Eui64::from_be_u64(2), now - Duration::seconds(300), Some(5))
            .await
            .unwrap();

        let counts = store.get_devices_active_inactive(None).await.unwrap();
        assert_eq!(
            counts,
            DevicesActiveInactive {
                never_seen_count: 1,
                active_count: 1,
                inactive_count: 1,
            }
        );
        assert_eq!(
            store.get_devices_active_inactive(Some(t2.id)).await.unwrap(),
            DevicesActiveInactive::default()
        );

        let drs = store.get_devices_data_rates(Some(t1.id)).await.unwrap();
        assert_eq!(drs.get(&5), Some(&2));
        assert_eq!(drs.len(), 1);

        assert_eq!(
            store.get_measurement_keys(&app.id).await.unwrap(),
            vec!["humidity".to_string(), "temperature".to_string()]
        );

        for (i, seen) in [(1u64, Some(now)), (2, Some(now - Duration::seconds(61))), (3, None)] {
            store
                .create_gateway(Gateway {
                    gateway_id: Eui64::from_be_u64(i),
                    tenant_id: t2.id,
                    name: format!("gw-{}", i),
                    last_seen_at: seen,
                    ..Default::default()
                })
                .await
                .unwrap();
        }
        assert_eq!(
            store.get_gateways_counts_by_state(Some(t2.id)).await.unwrap(),
            GatewayCountsByState {
                never_seen_count: 1,
                online_count: 1,
                offline_count: 1,
            }
        );
        assert_eq!(
            store.get_gateways_counts_by_state(Some(t1.id)).await.unwrap(),
            GatewayCountsByState::default()
        );
    }

    #[tokio::test]
    async fn test_global_search() {
        let store = MemoryStore::new();
        let t1 = setup_tenant(&store, "test-tenant").await;
        let t2 = setup_tenant(&store, "other").await;
        let app = setup_app(&store, t1.id, "test-app").await;
        let dp = store
            .create_device_profile(DeviceProfile {
                tenant_id: t1.id,
                ..Default::default()
            })
            .await
            .unwrap();

        let mut tags = HashMap::new();
        tags.insert("floor".to_string(), "2".to_string());
        store
            .create_device(Device {
                dev_eui: Eui64::from_be_u64(0x0102030405060708),
                application_id: app.id,
                device_profile_id: dp.id,
                name: "test-device".into(),
                tags,
                ..Default::default()
            })
            .await
            .unwrap();
        store
            .create_gateway(Gateway {
                gateway_id: Eui64::from_be_u64(0x0807060504030201),
                tenant_id: t2.id,
                name: "test-gateway".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        let admin_id = Uuid::new_v4();
        let res = store
            .global_search(&admin_id, true, "test", 10, 0)
            .await
            .unwrap();
        let kinds: HashSet<&str> = res.iter().map(|r| r.kind.as_str()).collect();
        assert_eq!(
            kinds,
            ["tenant", "application", "device", "gateway"].into_iter().collect()
        );
        assert!(res.windows(2).all(|w| w[0].score >= w[1].score));

        // hex identifiers match
        let res = store
            .global_search(&admin_id, true, "0102030405", 10, 0)
            .await
            .unwrap();
        assert_eq!(res.len(), 1);
        assert_eq!(res[0].device_name.as_deref(), Some("test-device"));
        assert_eq!(res[0].application_name.as_deref(), Some("test-app"));
        assert_eq!(res[0].tenant_name.as_deref(), Some("test-tenant"));

        // tag filters
        let res = store
            .global_search(&admin_id, true, "floor:2", 10, 0)
            .await
            .unwrap();
        assert!(res.iter().any(|r| r.kind == "device"));

        // non admin only sees its tenants
        let user = setup_user(&store, "user@example.com", "pw", true).await;
        let res = store
            .global_search(&user.id, false, "test", 10, 0)
            .await
            .unwrap();
        assert!(res.is_empty());

        store
            .add_tenant_user(TenantUser {
                tenant_id: t1.id,
                user_id: user.id,
                ..Default::default()
            })
            .await
            .unwrap();
        let res = store
            .global_search(&user.id, false, "test", 10, 0)
            .await
            .unwrap();
        assert_eq!(res.len(), 3);
        assert!(res.iter().all(|r| r.tenant_id == Some(t1.id)));

        let page = store
            .global_search(&user.id, false, "test", 2, 2)
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
    }
}
