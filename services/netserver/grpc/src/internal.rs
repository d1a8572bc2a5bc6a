//! `api.InternalService`: login, profile, search, API keys, dashboard
//! summaries, frame/event log streams and regions.

use crate::auth::claims::AuthClaim;
use crate::auth::validator::{
    Flag, RequestValidator, ValidateActiveUser, ValidateApiKeyAccess, ValidateApiKeysAccess,
    ValidateDeviceAccess, ValidateGatewayAccess, ValidateIsAdmin, ValidateTenantAccess,
};
use crate::auth::AuthID;
use crate::config::ApiConfig;
use crate::error::ToStatus;
use crate::helpers::{datetime_to_prost_timestamp, parse_optional_uuid, parse_uuid};
use crate::oidc::OidcProvider;
use crate::region;
use crate::stream::{LogStreams, StreamKind};
use ns_api::api;
use ns_api::api::internal_service_server::InternalService;
use ns_storage::{ApiKey, ApiKeyFilters, Eui64, StorageError, Store, User};
use std::str::FromStr;
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};
use tracing::{info, warn};
use uuid::Uuid;

const OIDC_LOGIN_URL: &str = "/auth/oidc/login";

/// Internal service implementation
pub struct InternalApi {
    store: Arc<dyn Store>,
    validator: RequestValidator,
    config: Arc<ApiConfig>,
    streams: Arc<LogStreams>,
    oidc: Option<Arc<dyn OidcProvider>>,
}

impl InternalApi {
    /// Create the service
    pub fn new(store: Arc<dyn Store>, config: Arc<ApiConfig>, streams: Arc<LogStreams>) -> Self {
        Self {
            validator: RequestValidator::new(store.clone()),
            store,
            config,
            streams,
            oidc: None,
        }
    }

    /// Use the given provider for OpenID Connect logins
    pub fn with_oidc_provider(mut self, provider: Arc<dyn OidcProvider>) -> Self {
        self.oidc = Some(provider);
        self
    }

    /// OpenID Connect is offered only when enabled and a provider is set
    fn oidc_enabled(&self) -> bool {
        self.oidc.is_some() && self.config.openid_connect.enabled
    }

    fn user_token(&self, user_id: &Uuid) -> Result<String, Status> {
        AuthClaim::new_for_user(user_id)
            .encode(self.config.secret.as_bytes())
            .map_err(|e| Status::internal(e.to_string()))
    }

    /// Find the user behind an OpenID Connect identity, binding or
    /// registering it when needed.
    async fn oidc_user(&self, subject: &str, email: &str, note: String) -> Result<User, Status> {
        match self.store.get_user_by_external_id(subject).await {
            Ok(user) => return Ok(user),
            Err(StorageError::NotFound(_)) => {}
            Err(e) => return Err(e.status()),
        }

        match self.store.get_user_by_email(email).await {
            Ok(mut user) => {
                user.external_id = Some(subject.to_string());
                user.email_verified = true;
                info!(user_id = %user.id, "External id bound to existing user");
                return self.store.update_user(user).await.map_err(|e| e.status());
            }
            Err(StorageError::NotFound(_)) => {}
            Err(e) => return Err(e.status()),
        }

        if !self.config.openid_connect.registration_enabled {
            return Err(Status::not_found("User does not exist"));
        }

        let user = self
            .store
            .create_user(User {
                external_id: Some(subject.to_string()),
                email: email.to_string(),
                email_verified: true,
                is_active: true,
                note,
                ..Default::default()
            })
            .await
            .map_err(|e| e.status())?;
        info!(user_id = %user.id, "User registered through OpenID Connect");
        Ok(user)
    }

    async fn stream_for(
        &self,
        kind: StreamKind,
        id: &Eui64,
    ) -> Result<Response<ReceiverStream<Result<api::LogItem, Status>>>, Status> {
        info!(key = %kind.key(id), "Log stream opened");
        Ok(Response::new(self.streams.stream_items(kind, id).await))
    }
}

fn parse_eui64(s: &str) -> Result<Eui64, Status> {
    Eui64::from_str(s).map_err(|e| Status::invalid_argument(e.to_string()))
}

fn api_key_to_proto(key: &ApiKey) -> api::ApiKey {
    api::ApiKey {
        id: key.id.to_string(),
        name: key.name.clone(),
        is_admin: key.is_admin,
        tenant_id: key.tenant_id.map(|t| t.to_string()).unwrap_or_default(),
    }
}

#[tonic::async_trait]
impl InternalService for InternalApi {
    async fn login(
        &self,
        request: Request<api::LoginRequest>,
    ) -> Result<Response<api::LoginResponse>, Status> {
        let req = request.get_ref();
        let user = self
            .store
            .get_user_by_email_and_pw(&req.email, &req.password)
            .await
            .map_err(|e| e.status())?;

        info!(user_id = %user.id, "User logged in");
        Ok(Response::new(api::LoginResponse {
            jwt: self.user_token(&user.id)?,
        }))
    }

    async fn profile(&self, request: Request<()>) -> Result<Response<api::ProfileResponse>, Status> {
        let id = self
            .validator
            .validate(request.extensions(), ValidateActiveUser::new())
            .await?;
        let user_id = match id {
            AuthID::User(id) => id,
            _ => return Err(Status::invalid_argument("no user id")),
        };

        let user = self
            .store
            .get_user(&user_id)
            .await
            .map_err(|e| e.status())?;
        let tenants = self
            .store
            .get_tenant_users_for_user(&user_id)
            .await
            .map_err(|e| e.status())?;

        Ok(Response::new(api::ProfileResponse {
            user: Some(api::User {
                id: user.id.to_string(),
                is_admin: user.is_admin,
                is_active: user.is_active,
                email: user.email,
                note: user.note,
            }),
            tenants: tenants
                .iter()
                .map(|tu| api::UserTenantLink {
                    created_at: Some(datetime_to_prost_timestamp(&tu.created_at)),
                    updated_at: Some(datetime_to_prost_timestamp(&tu.updated_at)),
                    tenant_id: tu.tenant_id.to_string(),
                    is_admin: tu.is_admin,
                    is_device_admin: tu.is_device_admin,
                    is_gateway_admin: tu.is_gateway_admin,
                })
                .collect(),
        }))
    }

    async fn global_search(
        &self,
        request: Request<api::GlobalSearchRequest>,
    ) -> Result<Response<api::GlobalSearchResponse>, Status> {
        let (_, ext, req) = request.into_parts();
        let id = self
            .validator
            .validate(&ext, ValidateActiveUser::new())
            .await?;
        let user_id = match id {
            AuthID::User(id) => id,
            _ => return Err(Status::invalid_argument("no user id")),
        };
        let user = self
            .store
            .get_user(&user_id)
            .await
            .map_err(|e| e.status())?;

        let results = self
            .store
            .global_search(
                &user.id,
                user.is_admin,
                &req.search,
                req.limit.max(0) as usize,
                req.offset.max(0) as usize,
            )
            .await
            .map_err(|e| e.status())?;

        Ok(Response::new(api::GlobalSearchResponse {
            result: results
                .into_iter()
                .map(|r| api::GlobalSearchResult {
                    kind: r.kind,
                    score: r.score,
                    tenant_id: r.tenant_id.map(|v| v.to_string()).unwrap_or_default(),
                    tenant_name: r.tenant_name.unwrap_or_default(),
                    application_id: r.application_id.map(|v| v.to_string()).unwrap_or_default(),
                    application_name: r.application_name.unwrap_or_default(),
                    device_dev_eui: r.device_dev_eui.map(|v| v.to_string()).unwrap_or_default(),
                    device_name: r.device_name.unwrap_or_default(),
                    gateway_id: r.gateway_id.map(|v| v.to_string()).unwrap_or_default(),
                    gateway_name: r.gateway_name.unwrap_or_default(),
                })
                .collect(),
        }))
    }

    async fn create_api_key(
        &self,
        request: Request<api::CreateApiKeyRequest>,
    ) -> Result<Response<api::CreateApiKeyResponse>, Status> {
        let (_, ext, req) = request.into_parts();
        let req_key = req
            .api_key
            .ok_or_else(|| Status::invalid_argument("api_key is missing"))?;
        let tenant_id = parse_optional_uuid(&req_key.tenant_id)?;

        if req_key.is_admin && tenant_id.is_some() {
            return Err(Status::invalid_argument(
                "tenant_id can not be set with is_admin set to true",
            ));
        }
        if !req_key.is_admin && tenant_id.is_none() {
            return Err(Status::invalid_argument(
                "either is_admin or tenant_id must be set",
            ));
        }

        self.validator
            .validate(&ext, ValidateApiKeysAccess::new(Flag::Create, tenant_id))
            .await?;

        let key = self
            .store
            .create_api_key(ApiKey {
                name: req_key.name,
                is_admin: req_key.is_admin,
                tenant_id,
                ..Default::default()
            })
            .await
            .map_err(|e| e.status())?;

        let token = AuthClaim::new_for_api_key(&key.id)
            .encode(self.config.secret.as_bytes())
            .map_err(|e| Status::internal(e.to_string()))?;

        info!(api_key_id = %key.id, is_admin = key.is_admin, "API key created");
        Ok(Response::new(api::CreateApiKeyResponse {
            id: key.id.to_string(),
            token,
        }))
    }

    async fn delete_api_key(
        &self,
        request: Request<api::DeleteApiKeyRequest>,
    ) -> Result<Response<()>, Status> {
        let (_, ext, req) = request.into_parts();
        let id = parse_uuid(&req.id)?;

        self.validator
            .validate(&ext, ValidateApiKeyAccess::new(Flag::Delete, id))
            .await?;

        self.store
            .delete_api_key(&id)
            .await
            .map_err(|e| e.status())?;

        info!(api_key_id = %id, "API key deleted");
        Ok(Response::new(()))
    }

    async fn list_api_keys(
        &self,
        request: Request<api::ListApiKeysRequest>,
    ) -> Result<Response<api::ListApiKeysResponse>, Status> {
        let (_, ext, req) = request.into_parts();
        let tenant_id = parse_optional_uuid(&req.tenant_id)?;

        if req.is_admin && tenant_id.is_some() {
            return Err(Status::invalid_argument(
                "tenant_id can not be set with is_admin set to true",
            ));
        }

        self.validator
            .validate(&ext, ValidateApiKeysAccess::new(Flag::List, tenant_id))
            .await?;

        let filters = ApiKeyFilters {
            is_admin: req.is_admin,
            tenant_id,
        };
        let count = self
            .store
            .get_api_key_count(&filters)
            .await
            .map_err(|e| e.status())?;
        let keys = self
            .store
            .list_api_keys(req.limit as i64, req.offset as i64, &filters)
            .await
            .map_err(|e| e.status())?;

        Ok(Response::new(api::ListApiKeysResponse {
            total_count: count as u32,
            result: keys.iter().map(api_key_to_proto).collect(),
        }))
    }

    async fn settings(&self, _: Request<()>) -> Result<Response<api::SettingsResponse>, Status> {
        let oidc = &self.config.openid_connect;
        Ok(Response::new(api::SettingsResponse {
            openid_connect: Some(api::OpenIdConnect {
                enabled: self.oidc_enabled(),
                login_url: OIDC_LOGIN_URL.to_string(),
                login_label: oidc.login_label.clone(),
                logout_url: oidc.logout_url.clone(),
            }),
        }))
    }

    async fn open_id_connect_login(
        &self,
        request: Request<api::OpenIdConnectLoginRequest>,
    ) -> Result<Response<api::OpenIdConnectLoginResponse>, Status> {
        let provider = match &self.oidc {
            Some(p) if self.oidc_enabled() => p,
            _ => return Err(Status::unimplemented("OpenID Connect is not configured")),
        };
        let req = request.get_ref();

        let info = provider
            .exchange(&req.code, &req.state)
            .await
            .map_err(|e| {
                warn!(error = format!("{:#}", e), "OpenID Connect exchange failed");
                Status::unauthenticated(format!("{:#}", e))
            })?;

        let email = match info.email.as_deref() {
            Some(v) if !v.is_empty() => v.to_string(),
            _ => return Err(Status::invalid_argument("email is missing")),
        };
        if !info.email_verified {
            return Err(Status::failed_precondition(
                "email address must be verified before you can login",
            ));
        }

        let user = self
            .oidc_user(&info.subject, &email, info.note.unwrap_or_default())
            .await?;
        if !user.is_active {
            return Err(Status::unauthenticated("user is not active"));
        }

        info!(user_id = %user.id, "User logged in through OpenID Connect");
        Ok(Response::new(api::OpenIdConnectLoginResponse {
            token: self.user_token(&user.id)?,
        }))
    }

    async fn get_devices_summary(
        &self,
        request: Request<api::GetDevicesSummaryRequest>,
    ) -> Result<Response<api::GetDevicesSummaryResponse>, Status> {
        let (_, ext, req) = request.into_parts();
        let tenant_id = parse_optional_uuid(&req.tenant_id)?;

        match tenant_id {
            Some(id) => {
                self.validator
                    .validate(&ext, ValidateTenantAccess::new(Flag::Read, id))
                    .await?
            }
            None => self.validator.validate(&ext, ValidateIsAdmin::new()).await?,
        };

        let counts = self
            .store
            .get_devices_active_inactive(tenant_id)
            .await
            .map_err(|e| e.status())?;
        let data_rates = self
            .store
            .get_devices_data_rates(tenant_id)
            .await
            .map_err(|e| e.status())?;

        Ok(Response::new(api::GetDevicesSummaryResponse {
            active_count: counts.active_count,
            inactive_count: counts.inactive_count,
            dr_count: data_rates
                .into_iter()
                .map(|(dr, count)| (dr as u32, count))
                .collect(),
            never_seen_count: counts.never_seen_count,
        }))
    }

    async fn get_gateways_summary(
        &self,
        request: Request<api::GetGatewaysSummaryRequest>,
    ) -> Result<Response<api::GetGatewaysSummaryResponse>, Status> {
        let (_, ext, req) = request.into_parts();
        let tenant_id = parse_optional_uuid(&req.tenant_id)?;

        match tenant_id {
            Some(id) => {
                self.validator
                    .validate(&ext, ValidateTenantAccess::new(Flag::Read, id))
                    .await?
            }
            None => self.validator.validate(&ext, ValidateIsAdmin::new()).await?,
        };

        let counts = self
            .store
            .get_gateways_counts_by_state(tenant_id)
            .await
            .map_err(|e| e.status())?;

        Ok(Response::new(api::GetGatewaysSummaryResponse {
            online_count: counts.online_count,
            offline_count: counts.offline_count,
            never_seen_count: counts.never_seen_count,
        }))
    }

    type StreamGatewayFramesStream = ReceiverStream<Result<api::LogItem, Status>>;

    async fn stream_gateway_frames(
        &self,
        request: Request<api::StreamGatewayFramesRequest>,
    ) -> Result<Response<Self::StreamGatewayFramesStream>, Status> {
        let (_, ext, req) = request.into_parts();
        let gateway_id = parse_eui64(&req.gateway_id)?;

        self.validator
            .validate(&ext, ValidateGatewayAccess::new(Flag::Read, gateway_id))
            .await?;

        self.stream_for(StreamKind::GatewayFrame, &gateway_id).await
    }

    type StreamDeviceFramesStream = ReceiverStream<Result<api::LogItem, Status>>;

    async fn stream_device_frames(
        &self,
        request: Request<api::StreamDeviceFramesRequest>,
    ) -> Result<Response<Self::StreamDeviceFramesStream>, Status> {
        let (_, ext, req) = request.into_parts();
        let dev_eui = parse_eui64(&req.dev_eui)?;

        self.validator
            .validate(&ext, ValidateDeviceAccess::new(Flag::Read, dev_eui))
            .await?;

        self.stream_for(StreamKind::DeviceFrame, &dev_eui).await
    }

    type StreamDeviceEventsStream = ReceiverStream<Result<api::LogItem, Status>>;

    async fn stream_device_events(
        &self,
        request: Request<api::StreamDeviceEventsRequest>,
    ) -> Result<Response<Self::StreamDeviceEventsStream>, Status> {
        let (_, ext, req) = request.into_parts();
        let dev_eui = parse_eui64(&req.dev_eui)?;

        self.validator
            .validate(&ext, ValidateDeviceAccess::new(Flag::Read, dev_eui))
            .await?;

        self.stream_for(StreamKind::DeviceEvent, &dev_eui).await
    }

    async fn list_regions(
        &self,
        request: Request<()>,
    ) -> Result<Response<api::ListRegionsResponse>, Status> {
        self.validator
            .validate(request.extensions(), ValidateActiveUser::new())
            .await?;

        Ok(Response::new(region::list_regions(&self.config)?))
    }

    async fn get_region(
        &self,
        request: Request<api::GetRegionRequest>,
    ) -> Result<Response<api::GetRegionResponse>, Status> {
        self.validator
            .validate(request.extensions(), ValidateActiveUser::new())
            .await?;

        Ok(Response::new(region::get_region(
            &self.config,
            &request.get_ref().id,
        )?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonitoringConfig;
    use crate::oidc::OidcUserInfo;
    use async_trait::async_trait;
    use chrono::Utc;
    use ns_storage::{
        ApiKeyStore, Application, ApplicationStore, Device, DeviceProfile, DeviceStore, Gateway,
        MemoryStore, Tenant, TenantStore, TenantUser, UserStore,
    };
    use serde_json::json;
    use std::collections::HashMap;
    use std::time::Duration;
    use tokio_stream::StreamExt;
    use tonic::Code;

    const SECRET: &str = "test-secret";

    struct Setup {
        store: Arc<MemoryStore>,
        streams: Arc<LogStreams>,
        api: InternalApi,
        admin: Uuid,
        tenant_id: Uuid,
    }

    fn config() -> ApiConfig {
        ApiConfig {
            secret: SECRET.into(),
            ..Default::default()
        }
    }

    async fn setup_with(config: ApiConfig) -> Setup {
        let store = Arc::new(MemoryStore::new());
        let mut admin = User {
            email: "admin@example.com".into(),
            is_admin: true,
            is_active: true,
            ..Default::default()
        };
        admin.set_password_hash("admin").unwrap();
        let admin = store.create_user(admin).await.unwrap().id;
        let tenant_id = store
            .create_tenant(Tenant {
                name: "acme".into(),
                ..Default::default()
            })
            .await
            .unwrap()
            .id;

        let streams = Arc::new(LogStreams::new(&MonitoringConfig::default()));
        Setup {
            api: InternalApi::new(store.clone(), Arc::new(config), streams.clone()),
            store,
            streams,
            admin,
            tenant_id,
        }
    }

    async fn setup() -> Setup {
        setup_with(config()).await
    }

    fn request<T>(id: AuthID, msg: T) -> Request<T> {
        let mut req = Request::new(msg);
        req.extensions_mut().insert(id);
        req
    }

    async fn tenant_member(s: &Setup, is_admin: bool) -> Uuid {
        let id = s
            .store
            .create_user(User {
                email: format!("{}@example.com", Uuid::new_v4()),
                is_active: true,
                ..Default::default()
            })
            .await
            .unwrap()
            .id;
        s.store
            .add_tenant_user(TenantUser {
                tenant_id: s.tenant_id,
                user_id: id,
                is_admin,
                ..Default::default()
            })
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn test_login() {
        let s = setup().await;

        let resp = s
            .api
            .login(Request::new(api::LoginRequest {
                email: "admin@example.com".into(),
                password: "admin".into(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(
            AuthID::from_token(&resp.jwt, SECRET.as_bytes()).unwrap(),
            AuthID::User(s.admin)
        );

        let err = s
            .api
            .login(Request::new(api::LoginRequest {
                email: "admin@example.com".into(),
                password: "wrong".into(),
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::Unauthenticated);
    }

    #[tokio::test]
    async fn test_profile() {
        let s = setup().await;
        let member = tenant_member(&s, true).await;

        let resp = s
            .api
            .profile(request(AuthID::User(member), ()))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(resp.user.unwrap().id, member.to_string());
        assert_eq!(resp.tenants.len(), 1);
        assert_eq!(resp.tenants[0].tenant_id, s.tenant_id.to_string());
        assert!(resp.tenants[0].is_admin);

        let err = s.api.profile(request(AuthID::None, ())).await.unwrap_err();
        assert_eq!(err.code(), Code::Unauthenticated);
    }

    #[tokio::test]
    async fn test_global_search() {
        let s = setup().await;
        s.store
            .create_application(Application {
                tenant_id: s.tenant_id,
                name: "weather".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        let resp = s
            .api
            .global_search(request(
                AuthID::User(s.admin),
                api::GlobalSearchRequest {
                    search: "weather".into(),
                    limit: 10,
                    offset: -5,
                },
            ))
            .await
            .unwrap()
            .into_inner();
        assert!(resp
            .result
            .iter()
            .any(|r| r.kind == "application" && r.application_name == "weather"));
        assert!(resp
            .result
            .iter()
            .all(|r| r.tenant_id == s.tenant_id.to_string()));
    }

    #[tokio::test]
    async fn test_api_keys() {
        let s = setup().await;
        let admin = AuthID::User(s.admin);

        for (is_admin, tenant_id, msg) in [
            (
                true,
                s.tenant_id.to_string(),
                "tenant_id can not be set with is_admin set to true",
            ),
            (false, String::new(), "either is_admin or tenant_id must be set"),
        ] {
            let err = s
                .api
                .create_api_key(request(
                    admin,
                    api::CreateApiKeyRequest {
                        api_key: Some(api::ApiKey {
                            name: "k".into(),
                            is_admin,
                            tenant_id,
                            ..Default::default()
                        }),
                    },
                ))
                .await
                .unwrap_err();
            assert_eq!(err.code(), Code::InvalidArgument);
            assert_eq!(err.message(), msg);
        }

        let created = s
            .api
            .create_api_key(request(
                admin,
                api::CreateApiKeyRequest {
                    api_key: Some(api::ApiKey {
                        name: "integration".into(),
                        tenant_id: s.tenant_id.to_string(),
                        ..Default::default()
                    }),
                },
            ))
            .await
            .unwrap()
            .into_inner();
        let key_id = parse_uuid(&created.id).unwrap();
        assert_eq!(
            AuthID::from_token(&created.token, SECRET.as_bytes()).unwrap(),
            AuthID::Key(key_id)
        );

        let list = s
            .api
            .list_api_keys(request(
                admin,
                api::ListApiKeysRequest {
                    limit: 10,
                    offset: 0,
                    is_admin: false,
                    tenant_id: s.tenant_id.to_string(),
                },
            ))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(list.total_count, 1);
        assert_eq!(list.result[0].name, "integration");
        assert_eq!(list.result[0].tenant_id, s.tenant_id.to_string());

        // API keys can not manage API keys
        let err = s
            .api
            .delete_api_key(request(
                AuthID::Key(key_id),
                api::DeleteApiKeyRequest {
                    id: key_id.to_string(),
                },
            ))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::Unauthenticated);

        s.api
            .delete_api_key(request(
                admin,
                api::DeleteApiKeyRequest {
                    id: key_id.to_string(),
                },
            ))
            .await
            .unwrap();
        assert!(matches!(
            s.store.get_api_key(&key_id).await,
            Err(StorageError::NotFound(_))
        ));
    }

    async fn oidc_settings(s: &Setup) -> api::OpenIdConnect {
        s.api
            .settings(Request::new(()))
            .await
            .unwrap()
            .into_inner()
            .openid_connect
            .unwrap()
    }

    #[tokio::test]
    async fn test_settings() {
        let mut conf = config();
        conf.openid_connect.enabled = true;
        conf.openid_connect.login_label = "Login with SSO".into();
        let mut s = setup_with(conf).await;
        s.api = s
            .api
            .with_oidc_provider(Arc::new(StaticProvider(OidcUserInfo::default())));

        let oidc = oidc_settings(&s).await;
        assert!(oidc.enabled);
        assert_eq!(oidc.login_url, "/auth/oidc/login");
        assert_eq!(oidc.login_label, "Login with SSO");
    }

    #[tokio::test]
    async fn test_settings_without_provider() {
        let mut conf = config();
        conf.openid_connect.enabled = true;
        let s = setup_with(conf).await;

        assert!(!oidc_settings(&s).await.enabled);
        let err = s.api.open_id_connect_login(oidc_login("c")).await.unwrap_err();
        assert_eq!(err.code(), Code::Unimplemented);
    }

    #[tokio::test]
    async fn test_settings_provider_disabled() {
        let mut s = setup().await;
        s.api = s
            .api
            .with_oidc_provider(Arc::new(StaticProvider(OidcUserInfo::default())));
        assert!(!oidc_settings(&s).await.enabled);
    }

    struct StaticProvider(OidcUserInfo);

    #[async_trait]
    impl OidcProvider for StaticProvider {
        async fn exchange(&self, code: &str, _state: &str) -> anyhow::Result<OidcUserInfo> {
            if code == "bad" {
                anyhow::bail!("invalid code");
            }
            Ok(self.0.clone())
        }
    }

    async fn oidc_setup(registration_enabled: bool, info: OidcUserInfo) -> Setup {
        let mut conf = config();
        conf.openid_connect.enabled = true;
        conf.openid_connect.registration_enabled = registration_enabled;
        let mut s = setup_with(conf).await;
        s.api = s.api.with_oidc_provider(Arc::new(StaticProvider(info)));
        s
    }

    fn oidc_login(code: &str) -> Request<api::OpenIdConnectLoginRequest> {
        Request::new(api::OpenIdConnectLoginRequest {
            code: code.into(),
            state: "state".into(),
        })
    }

    fn verified(subject: &str, email: &str) -> OidcUserInfo {
        OidcUserInfo {
            subject: subject.into(),
            email: Some(email.into()),
            email_verified: true,
            note: None,
        }
    }

    #[tokio::test]
    async fn test_oidc_not_configured() {
        let s = setup().await;
        let err = s.api.open_id_connect_login(oidc_login("c")).await.unwrap_err();
        assert_eq!(err.code(), Code::Unimplemented);
    }

    #[tokio::test]
    async fn test_oidc_binds_existing_user() {
        let s = oidc_setup(false, verified("sub-1", "admin@example.com")).await;

        let token = s
            .api
            .open_id_connect_login(oidc_login("c"))
            .await
            .unwrap()
            .into_inner()
            .token;
        assert_eq!(
            AuthID::from_token(&token, SECRET.as_bytes()).unwrap(),
            AuthID::User(s.admin)
        );
        let user = s.store.get_user_by_external_id("sub-1").await.unwrap();
        assert_eq!(user.id, s.admin);
    }

    #[tokio::test]
    async fn test_oidc_registration() {
        let s = oidc_setup(false, verified("sub-2", "new@example.com")).await;
        let err = s.api.open_id_connect_login(oidc_login("c")).await.unwrap_err();
        assert_eq!(err.code(), Code::NotFound);
        assert_eq!(err.message(), "User does not exist");

        let s = oidc_setup(true, verified("sub-2", "new@example.com")).await;
        s.api.open_id_connect_login(oidc_login("c")).await.unwrap();
        let user = s.store.get_user_by_email("new@example.com").await.unwrap();
        assert_eq!(user.external_id.as_deref(), Some("sub-2"));
        assert!(user.is_active);
        assert!(!user.is_admin);
    }

    #[tokio::test]
    async fn test_oidc_rejections() {
        let mut info = verified("sub-3", "x@example.com");
        info.email_verified = false;
        let s = oidc_setup(true, info).await;
        let err = s.api.open_id_connect_login(oidc_login("c")).await.unwrap_err();
        assert_eq!(err.code(), Code::FailedPrecondition);

        let err = s.api.open_id_connect_login(oidc_login("bad")).await.unwrap_err();
        assert_eq!(err.code(), Code::Unauthenticated);

        let mut info = verified("sub-3", "");
        info.email = None;
        let s = oidc_setup(true, info).await;
        let err = s.api.open_id_connect_login(oidc_login("c")).await.unwrap_err();
        assert_eq!(err.message(), "email is missing");
    }

    async fn add_device(s: &Setup, eui: u64, seen: Option<(chrono::DateTime<Utc>, u8)>) -> Eui64 {
        let app = s
            .store
            .create_application(Application {
                tenant_id: s.tenant_id,
                name: format!("app-{}", eui),
                ..Default::default()
            })
            .await
            .unwrap();
        let dp = s
            .store
            .create_device_profile(DeviceProfile {
                tenant_id: s.tenant_id,
                uplink_interval: 3600,
                ..Default::default()
            })
            .await
            .unwrap();
        let dev_eui = Eui64::from_be_u64(eui);
        s.store
            .create_device(Device {
                dev_eui,
                application_id: app.id,
                device_profile_id: dp.id,
                name: format!("dev-{}", eui),
                ..Default::default()
            })
            .await
            .unwrap();
        if let Some((at, dr)) = seen {
            s.store.set_device_seen(&dev_eui, at, Some(dr)).await.unwrap();
        }
        dev_eui
    }

    #[tokio::test]
    async fn test_devices_summary() {
        let s = setup().await;
        add_device(&s, 1, None).await;
        add_device(&s, 2, Some((Utc::now(), 5))).await;
        add_device(&s, 3, Some((Utc::now(), 5))).await;

        let resp = s
            .api
            .get_devices_summary(request(
                AuthID::User(s.admin),
                api::GetDevicesSummaryRequest {
                    tenant_id: s.tenant_id.to_string(),
                },
            ))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(resp.never_seen_count, 1);
        assert_eq!(resp.active_count, 2);
        assert_eq!(resp.inactive_count, 0);
        assert_eq!(resp.dr_count.get(&5), Some(&2));

        // only global admins may request the global summary
        let member = tenant_member(&s, false).await;
        let err = s
            .api
            .get_devices_summary(request(
                AuthID::User(member),
                api::GetDevicesSummaryRequest::default(),
            ))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::Unauthenticated);
        s.api
            .get_devices_summary(request(
                AuthID::User(member),
                api::GetDevicesSummaryRequest {
                    tenant_id: s.tenant_id.to_string(),
                },
            ))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_gateways_summary() {
        let s = setup().await;
        s.store
            .create_gateway(Gateway {
                gateway_id: Eui64::from_be_u64(1),
                tenant_id: s.tenant_id,
                name: "gw".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        let resp = s
            .api
            .get_gateways_summary(request(
                AuthID::User(s.admin),
                api::GetGatewaysSummaryRequest::default(),
            ))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(resp.never_seen_count, 1);
        assert_eq!(resp.online_count, 0);
    }

    #[tokio::test]
    async fn test_stream_device_events() {
        let s = setup().await;
        let dev_eui = add_device(&s, 42, None).await;
        s.streams
            .publish(
                StreamKind::DeviceEvent,
                &dev_eui,
                "join",
                &json!({ "dev_addr": "01020304" }),
                HashMap::new(),
            )
            .await;

        let mut stream = s
            .api
            .stream_device_events(request(
                AuthID::User(s.admin),
                api::StreamDeviceEventsRequest {
                    dev_eui: dev_eui.to_string(),
                },
            ))
            .await
            .unwrap()
            .into_inner();

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.description, "join");

        s.streams
            .publish(StreamKind::DeviceEvent, &dev_eui, "up", &json!({}), HashMap::new())
            .await;
        let second = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(second.description, "up");
    }

    #[tokio::test]
    async fn test_stream_validation() {
        let s = setup().await;

        let err = s
            .api
            .stream_gateway_frames(request(
                AuthID::User(s.admin),
                api::StreamGatewayFramesRequest {
                    gateway_id: "xyz".into(),
                },
            ))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);

        let member = tenant_member(&s, false).await;
        let err = s
            .api
            .stream_device_frames(request(
                AuthID::User(member),
                api::StreamDeviceFramesRequest {
                    dev_eui: "0102030405060708".into(),
                },
            ))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::Unauthenticated);
    }

    #[tokio::test]
    async fn test_regions_require_credentials() {
        let s = setup().await;
        let err = s
            .api
            .list_regions(request(AuthID::None, ()))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::Unauthenticated);

        for is_admin in [false, true] {
            let key_id = s
                .store
                .create_api_key(ApiKey {
                    name: "key".into(),
                    is_admin,
                    tenant_id: (!is_admin).then_some(s.tenant_id),
                    ..Default::default()
                })
                .await
                .unwrap()
                .id;
            let err = s
                .api
                .list_regions(request(AuthID::Key(key_id), ()))
                .await
                .unwrap_err();
            assert_eq!(err.code(), Code::Unauthenticated);
            let err = s
                .api
                .get_region(request(
                    AuthID::Key(key_id),
                    api::GetRegionRequest { id: "eu868".into() },
                ))
                .await
                .unwrap_err();
            assert_eq!(err.code(), Code::Unauthenticated);
        }

        let resp = s
            .api
            .list_regions(request(AuthID::User(s.admin), ()))
            .await
            .unwrap()
            .into_inner();
        assert!(resp.regions.is_empty());

        let err = s
            .api
            .get_region(request(
                AuthID::User(s.admin),
                api::GetRegionRequest { id: "eu868".into() },
            ))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::NotFound);
    }
}
