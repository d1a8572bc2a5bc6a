//! `api.ApplicationService`: applications, their integrations and MQTT
//! client certificates.

use crate::auth::validator::{
    Flag, RequestValidator, ValidateApplicationAccess, ValidateApplicationsAccess,
};
use crate::certificate::client_cert_for_application_id;
use crate::config::ApiConfig;
use crate::error::ToStatus;
use crate::helpers::{
    datetime_to_prost_timestamp, encoding_to_json, json_to_encoding, parse_uuid, with_log_field,
};
use ns_api::api;
use ns_api::api::application_service_server::ApplicationService;
use ns_storage::{
    ApplicationFilters, AwsSnsConfiguration, AzureServiceBusConfiguration, GcpPubSubConfiguration,
    HttpConfiguration, IftttConfiguration, InfluxDbConfiguration, Integration,
    IntegrationConfiguration, IntegrationKind, LoraCloudConfiguration,
    LoraCloudModemGeolocationServices, MyDevicesConfiguration, PilotThingsConfiguration, Store,
    ThingsBoardConfiguration,
};
use regex::Regex;
use std::sync::{Arc, OnceLock};
use tonic::{Extensions, Request, Response, Status};
use tracing::info;
use uuid::Uuid;

const LOG_APPLICATION_ID: &str = "x-log-application_id";
const LOG_TENANT_ID: &str = "x-log-tenant_id";

/// FPorts used by LoRa Cloud before forwarding became configurable, after
/// the modem and GNSS ports
const LEGACY_LORA_CLOUD_F_PORTS: [u32; 2] = [197, 192];

/// Application service implementation
pub struct ApplicationApi {
    store: Arc<dyn Store>,
    validator: RequestValidator,
    config: Arc<ApiConfig>,
}

impl ApplicationApi {
    /// Create the service
    pub fn new(store: Arc<dyn Store>, config: Arc<ApiConfig>) -> Self {
        Self {
            validator: RequestValidator::new(store.clone()),
            store,
            config,
        }
    }

    async fn create_integration<M: IntegrationMessage>(
        &self,
        ext: &Extensions,
        msg: Option<M>,
    ) -> Result<Response<()>, Status> {
        let msg = msg.ok_or_else(|| Status::invalid_argument("integration is missing"))?;
        let app_id = parse_uuid(msg.application_id())?;
        self.validator
            .validate(ext, ValidateApplicationAccess::new(Flag::Update, app_id))
            .await?;

        let configuration = msg.into_configuration()?;
        self.store
            .create_integration(Integration {
                application_id: app_id,
                kind: M::KIND,
                configuration,
                ..Default::default()
            })
            .await
            .map_err(|e| e.status())?;

        info!(application_id = %app_id, kind = %M::KIND, "Integration created");
        Ok(with_log_field(Response::new(()), LOG_APPLICATION_ID, &app_id))
    }

    async fn get_integration<M: IntegrationMessage>(
        &self,
        ext: &Extensions,
        application_id: &str,
    ) -> Result<(Uuid, M), Status> {
        let app_id = parse_uuid(application_id)?;
        self.validator
            .validate(ext, ValidateApplicationAccess::new(Flag::Read, app_id))
            .await?;

        let integration = self
            .store
            .get_integration(&app_id, M::KIND)
            .await
            .map_err(|e| e.status())?;

        Ok((app_id, M::from_configuration(&app_id, integration.configuration)?))
    }

    async fn update_integration<M: IntegrationMessage>(
        &self,
        ext: &Extensions,
        msg: Option<M>,
    ) -> Result<Response<()>, Status> {
        let msg = msg.ok_or_else(|| Status::invalid_argument("integration is missing"))?;
        let app_id = parse_uuid(msg.application_id())?;
        self.validator
            .validate(ext, ValidateApplicationAccess::new(Flag::Update, app_id))
            .await?;

        let configuration = msg.into_configuration()?;
        self.store
            .update_integration(Integration {
                application_id: app_id,
                kind: M::KIND,
                configuration,
                ..Default::default()
            })
            .await
            .map_err(|e| e.status())?;

        Ok(with_log_field(Response::new(()), LOG_APPLICATION_ID, &app_id))
    }

    async fn delete_integration(
        &self,
        ext: &Extensions,
        application_id: &str,
        kind: IntegrationKind,
    ) -> Result<Response<()>, Status> {
        let app_id = parse_uuid(application_id)?;
        self.validator
            .validate(ext, ValidateApplicationAccess::new(Flag::Update, app_id))
            .await?;

        self.store
            .delete_integration(&app_id, kind)
            .await
            .map_err(|e| e.status())?;

        info!(application_id = %app_id, kind = %kind, "Integration deleted");
        Ok(with_log_field(Response::new(()), LOG_APPLICATION_ID, &app_id))
    }
}

/// Protobuf representation of a stored integration
trait IntegrationMessage: Sized + Send {
    const KIND: IntegrationKind;

    fn application_id(&self) -> &str;

    fn into_configuration(self) -> Result<IntegrationConfiguration, Status>;

    fn from_configuration(
        application_id: &Uuid,
        configuration: IntegrationConfiguration,
    ) -> Result<Self, Status>;
}

fn wrong_configuration(kind: IntegrationKind) -> Status {
    Status::internal(format!("Integration has no {} configuration", kind))
}

impl IntegrationMessage for api::HttpIntegration {
    const KIND: IntegrationKind = IntegrationKind::Http;

    fn application_id(&self) -> &str {
        &self.application_id
    }

    fn into_configuration(self) -> Result<IntegrationConfiguration, Status> {
        Ok(IntegrationConfiguration::Http(HttpConfiguration {
            json: encoding_to_json(self.encoding()),
            headers: self.headers,
            event_endpoint_url: self.event_endpoint_url,
        }))
    }

    fn from_configuration(
        application_id: &Uuid,
        configuration: IntegrationConfiguration,
    ) -> Result<Self, Status> {
        match configuration {
            IntegrationConfiguration::Http(c) => Ok(api::HttpIntegration {
                application_id: application_id.to_string(),
                headers: c.headers,
                encoding: json_to_encoding(c.json) as i32,
                event_endpoint_url: c.event_endpoint_url,
            }),
            _ => Err(wrong_configuration(Self::KIND)),
        }
    }
}

impl IntegrationMessage for api::InfluxDbIntegration {
    const KIND: IntegrationKind = IntegrationKind::InfluxDb;

    fn application_id(&self) -> &str {
        &self.application_id
    }

    fn into_configuration(self) -> Result<IntegrationConfiguration, Status> {
        Ok(IntegrationConfiguration::InfluxDb(InfluxDbConfiguration {
            endpoint: self.endpoint,
            db: self.db,
            username: self.username,
            password: self.password,
            retention_policy_name: self.retention_policy_name,
            precision: self.precision,
            version: self.version,
            token: self.token,
            organization: self.organization,
            bucket: self.bucket,
        }))
    }

    fn from_configuration(
        application_id: &Uuid,
        configuration: IntegrationConfiguration,
    ) -> Result<Self, Status> {
        match configuration {
            IntegrationConfiguration::InfluxDb(c) => Ok(api::InfluxDbIntegration {
                application_id: application_id.to_string(),
                endpoint: c.endpoint,
                db: c.db,
                username: c.username,
                password: c.password,
                retention_policy_name: c.retention_policy_name,
                precision: c.precision,
                version: c.version,
                token: c.token,
                organization: c.organization,
                bucket: c.bucket,
            }),
            _ => Err(wrong_configuration(Self::KIND)),
        }
    }
}

impl IntegrationMessage for api::ThingsBoardIntegration {
    const KIND: IntegrationKind = IntegrationKind::ThingsBoard;

    fn application_id(&self) -> &str {
        &self.application_id
    }

    fn into_configuration(self) -> Result<IntegrationConfiguration, Status> {
        Ok(IntegrationConfiguration::ThingsBoard(
            ThingsBoardConfiguration {
                server: self.server,
            },
        ))
    }

    fn from_configuration(
        application_id: &Uuid,
        configuration: IntegrationConfiguration,
    ) -> Result<Self, Status> {
        match configuration {
            IntegrationConfiguration::ThingsBoard(c) => Ok(api::ThingsBoardIntegration {
                application_id: application_id.to_string(),
                server: c.server,
            }),
            _ => Err(wrong_configuration(Self::KIND)),
        }
    }
}

impl IntegrationMessage for api::MyDevicesIntegration {
    const KIND: IntegrationKind = IntegrationKind::MyDevices;

    fn application_id(&self) -> &str {
        &self.application_id
    }

    fn into_configuration(self) -> Result<IntegrationConfiguration, Status> {
        Ok(IntegrationConfiguration::MyDevices(MyDevicesConfiguration {
            endpoint: self.endpoint,
        }))
    }

    fn from_configuration(
        application_id: &Uuid,
        configuration: IntegrationConfiguration,
    ) -> Result<Self, Status> {
        match configuration {
            IntegrationConfiguration::MyDevices(c) => Ok(api::MyDevicesIntegration {
                application_id: application_id.to_string(),
                endpoint: c.endpoint,
            }),
            _ => Err(wrong_configuration(Self::KIND)),
        }
    }
}

impl IntegrationMessage for api::LoraCloudIntegration {
    const KIND: IntegrationKind = IntegrationKind::LoraCloud;

    fn application_id(&self) -> &str {
        &self.application_id
    }

    fn into_configuration(self) -> Result<IntegrationConfiguration, Status> {
        let mgs = self
            .modem_geolocation_services
            .ok_or_else(|| Status::invalid_argument("modem_geolocation_services is missing"))?;

        Ok(IntegrationConfiguration::LoraCloud(LoraCloudConfiguration {
            modem_geolocation_services: LoraCloudModemGeolocationServices {
                token: mgs.token,
                modem_enabled: mgs.modem_enabled,
                modem_port: 0,
                gnss_port: 0,
                forward_f_ports: mgs.forward_f_ports,
                gnss_use_rx_time: mgs.gnss_use_rx_time,
                gnss_use_gateway_location: mgs.gnss_use_gateway_location,
                parse_tlv: mgs.parse_tlv,
                geolocation_buffer_ttl: mgs.geolocation_buffer_ttl,
                geolocation_min_buffer_size: mgs.geolocation_min_buffer_size,
                geolocation_tdoa: mgs.geolocation_tdoa,
                geolocation_rssi: mgs.geolocation_rssi,
                geolocation_gnss: mgs.geolocation_gnss,
                geolocation_gnss_payload_field: mgs.geolocation_gnss_payload_field,
                geolocation_gnss_use_rx_time: mgs.geolocation_gnss_use_rx_time,
                geolocation_wifi: mgs.geolocation_wifi,
                geolocation_wifi_payload_field: mgs.geolocation_wifi_payload_field,
            },
        }))
    }

    fn from_configuration(
        application_id: &Uuid,
        configuration: IntegrationConfiguration,
    ) -> Result<Self, Status> {
        let mgs = match configuration {
            IntegrationConfiguration::LoraCloud(c) => c.modem_geolocation_services,
            _ => return Err(wrong_configuration(Self::KIND)),
        };

        let legacy = mgs.modem_port != 0 || mgs.gnss_port != 0;
        let forward_f_ports = if mgs.forward_f_ports.is_empty() && legacy {
            let mut ports = vec![mgs.modem_port, mgs.gnss_port];
            ports.extend_from_slice(&LEGACY_LORA_CLOUD_F_PORTS);
            ports
        } else {
            mgs.forward_f_ports
        };

        Ok(api::LoraCloudIntegration {
            application_id: application_id.to_string(),
            modem_geolocation_services: Some(api::LoraCloudModemGeolocationServices {
                token: mgs.token,
                modem_enabled: mgs.modem_enabled,
                forward_f_ports,
                gnss_use_rx_time: mgs.gnss_use_rx_time,
                gnss_use_gateway_location: mgs.gnss_use_gateway_location,
                parse_tlv: mgs.parse_tlv,
                geolocation_buffer_ttl: mgs.geolocation_buffer_ttl,
                geolocation_min_buffer_size: mgs.geolocation_min_buffer_size,
                geolocation_tdoa: mgs.geolocation_tdoa,
                geolocation_rssi: mgs.geolocation_rssi,
                geolocation_gnss: mgs.geolocation_gnss,
                geolocation_gnss_payload_field: mgs.geolocation_gnss_payload_field,
                geolocation_gnss_use_rx_time: mgs.geolocation_gnss_use_rx_time,
                geolocation_wifi: mgs.geolocation_wifi,
                geolocation_wifi_payload_field: mgs.geolocation_wifi_payload_field,
            }),
        })
    }
}

impl IntegrationMessage for api::GcpPubSubIntegration {
    const KIND: IntegrationKind = IntegrationKind::GcpPubSub;

    fn application_id(&self) -> &str {
        &self.application_id
    }

    fn into_configuration(self) -> Result<IntegrationConfiguration, Status> {
        Ok(IntegrationConfiguration::GcpPubSub(GcpPubSubConfiguration {
            encoding: self.encoding,
            credentials_file: self.credentials_file,
            project_id: self.project_id,
            topic_name: self.topic_name,
        }))
    }

    fn from_configuration(
        application_id: &Uuid,
        configuration: IntegrationConfiguration,
    ) -> Result<Self, Status> {
        match configuration {
            IntegrationConfiguration::GcpPubSub(c) => Ok(api::GcpPubSubIntegration {
                application_id: application_id.to_string(),
                encoding: c.encoding,
                credentials_file: c.credentials_file,
                project_id: c.project_id,
                topic_name: c.topic_name,
            }),
            _ => Err(wrong_configuration(Self::KIND)),
        }
    }
}

impl IntegrationMessage for api::AwsSnsIntegration {
    const KIND: IntegrationKind = IntegrationKind::AwsSns;

    fn application_id(&self) -> &str {
        &self.application_id
    }

    fn into_configuration(self) -> Result<IntegrationConfiguration, Status> {
        Ok(IntegrationConfiguration::AwsSns(AwsSnsConfiguration {
            encoding: self.encoding,
            region: self.region,
            access_key_id: self.access_key_id,
            secret_access_key: self.secret_access_key,
            topic_arn: self.topic_arn,
        }))
    }

    fn from_configuration(
        application_id: &Uuid,
        configuration: IntegrationConfiguration,
    ) -> Result<Self, Status> {
        match configuration {
            IntegrationConfiguration::AwsSns(c) => Ok(api::AwsSnsIntegration {
                application_id: application_id.to_string(),
                encoding: c.encoding,
                region: c.region,
                access_key_id: c.access_key_id,
                secret_access_key: c.secret_access_key,
                topic_arn: c.topic_arn,
            }),
            _ => Err(wrong_configuration(Self::KIND)),
        }
    }
}

impl IntegrationMessage for api::AzureServiceBusIntegration {
    const KIND: IntegrationKind = IntegrationKind::AzureServiceBus;

    fn application_id(&self) -> &str {
        &self.application_id
    }

    fn into_configuration(self) -> Result<IntegrationConfiguration, Status> {
        Ok(IntegrationConfiguration::AzureServiceBus(
            AzureServiceBusConfiguration {
                encoding: self.encoding,
                connection_string: self.connection_string,
                publish_name: self.publish_name,
            },
        ))
    }

    fn from_configuration(
        application_id: &Uuid,
        configuration: IntegrationConfiguration,
    ) -> Result<Self, Status> {
        match configuration {
            IntegrationConfiguration::AzureServiceBus(c) => Ok(api::AzureServiceBusIntegration {
                application_id: application_id.to_string(),
                encoding: c.encoding,
                connection_string: c.connection_string,
                publish_name: c.publish_name,
            }),
            _ => Err(wrong_configuration(Self::KIND)),
        }
    }
}

impl IntegrationMessage for api::PilotThingsIntegration {
    const KIND: IntegrationKind = IntegrationKind::PilotThings;

    fn application_id(&self) -> &str {
        &self.application_id
    }

    fn into_configuration(self) -> Result<IntegrationConfiguration, Status> {
        Ok(IntegrationConfiguration::PilotThings(
            PilotThingsConfiguration {
                server: self.server,
                token: self.token,
            },
        ))
    }

    fn from_configuration(
        application_id: &Uuid,
        configuration: IntegrationConfiguration,
    ) -> Result<Self, Status> {
        match configuration {
            IntegrationConfiguration::PilotThings(c) => Ok(api::PilotThingsIntegration {
                application_id: application_id.to_string(),
                server: c.server,
                token: c.token,
            }),
            _ => Err(wrong_configuration(Self::KIND)),
        }
    }
}

fn event_prefix_regex() -> Result<&'static Regex, Status> {
    static RE: OnceLock<Regex> = OnceLock::new();
    if let Some(re) = RE.get() {
        return Ok(re);
    }
    let re = Regex::new(r"^[a-zA-Z0-9]+$").map_err(|e| Status::internal(e.to_string()))?;
    Ok(RE.get_or_init(|| re))
}

impl IntegrationMessage for api::IftttIntegration {
    const KIND: IntegrationKind = IntegrationKind::Ifttt;

    fn application_id(&self) -> &str {
        &self.application_id
    }

    fn into_configuration(self) -> Result<IntegrationConfiguration, Status> {
        if !self.event_prefix.is_empty() && !event_prefix_regex()?.is_match(&self.event_prefix) {
            return Err(Status::invalid_argument(
                "event_prefix may only contain A-Z, a-z and 0-9 characters",
            ));
        }

        let mut values = self.uplink_values.into_iter();
        Ok(IntegrationConfiguration::Ifttt(IftttConfiguration {
            key: self.key,
            uplink_values: [
                values.next().unwrap_or_default(),
                values.next().unwrap_or_default(),
            ],
            arbitrary_json: self.arbitrary_json,
            event_prefix: self.event_prefix,
        }))
    }

    fn from_configuration(
        application_id: &Uuid,
        configuration: IntegrationConfiguration,
    ) -> Result<Self, Status> {
        match configuration {
            IntegrationConfiguration::Ifttt(c) => Ok(api::IftttIntegration {
                application_id: application_id.to_string(),
                key: c.key,
                uplink_values: c.uplink_values.into(),
                arbitrary_json: c.arbitrary_json,
                event_prefix: c.event_prefix,
            }),
            _ => Err(wrong_configuration(Self::KIND)),
        }
    }
}

fn api_integration_kind(kind: IntegrationKind) -> api::IntegrationKind {
    match kind {
        IntegrationKind::Http => api::IntegrationKind::Http,
        IntegrationKind::InfluxDb => api::IntegrationKind::InfluxDb,
        IntegrationKind::ThingsBoard => api::IntegrationKind::ThingsBoard,
        IntegrationKind::MyDevices => api::IntegrationKind::MyDevices,
        IntegrationKind::LoraCloud => api::IntegrationKind::LoraCloud,
        IntegrationKind::GcpPubSub => api::IntegrationKind::GcpPubSub,
        IntegrationKind::AwsSns => api::IntegrationKind::AwsSns,
        IntegrationKind::AzureServiceBus => api::IntegrationKind::AzureServiceBus,
        IntegrationKind::PilotThings => api::IntegrationKind::PilotThings,
        IntegrationKind::Ifttt => api::IntegrationKind::Ifttt,
    }
}

#[tonic::async_trait]
impl ApplicationService for ApplicationApi {
    async fn create(
        &self,
        request: Request<api::CreateApplicationRequest>,
    ) -> Result<Response<api::CreateApplicationResponse>, Status> {
        let (_, ext, req) = request.into_parts();
        let req_app = req
            .application
            .ok_or_else(|| Status::invalid_argument("application is missing"))?;
        let tenant_id = parse_uuid(&req_app.tenant_id)?;

        self.validator
            .validate(
                &ext,
                ValidateApplicationsAccess::new(Flag::Create, tenant_id),
            )
            .await?;

        let app = self
            .store
            .create_application(ns_storage::Application {
                tenant_id,
                name: req_app.name,
                description: req_app.description,
                ..Default::default()
            })
            .await
            .map_err(|e| e.status())?;

        info!(application_id = %app.id, tenant_id = %tenant_id, "Application created");
        Ok(with_log_field(
            Response::new(api::CreateApplicationResponse {
                id: app.id.to_string(),
            }),
            LOG_APPLICATION_ID,
            &app.id,
        ))
    }

    async fn get(
        &self,
        request: Request<api::GetApplicationRequest>,
    ) -> Result<Response<api::GetApplicationResponse>, Status> {
        let (_, ext, req) = request.into_parts();
        let app_id = parse_uuid(&req.id)?;

        self.validator
            .validate(&ext, ValidateApplicationAccess::new(Flag::Read, app_id))
            .await?;

        let app = self
            .store
            .get_application(&app_id)
            .await
            .map_err(|e| e.status())?;
        let measurement_keys = self
            .store
            .get_measurement_keys(&app_id)
            .await
            .map_err(|e| e.status())?;

        Ok(with_log_field(
            Response::new(api::GetApplicationResponse {
                application: Some(api::Application {
                    id: app.id.to_string(),
                    tenant_id: app.tenant_id.to_string(),
                    name: app.name,
                    description: app.description,
                }),
                created_at: Some(datetime_to_prost_timestamp(&app.created_at)),
                updated_at: Some(datetime_to_prost_timestamp(&app.updated_at)),
                measurement_keys,
            }),
            LOG_APPLICATION_ID,
            &app_id,
        ))
    }

    async fn update(
        &self,
        request: Request<api::UpdateApplicationRequest>,
    ) -> Result<Response<()>, Status> {
        let (_, ext, req) = request.into_parts();
        let req_app = req
            .application
            .ok_or_else(|| Status::invalid_argument("application is missing"))?;
        let app_id = parse_uuid(&req_app.id)?;

        self.validator
            .validate(&ext, ValidateApplicationAccess::new(Flag::Update, app_id))
            .await?;

        // The owning tenant is immutable.
        let app = self
            .store
            .get_application(&app_id)
            .await
            .map_err(|e| e.status())?;
        self.store
            .update_application(ns_storage::Application {
                name: req_app.name,
                description: req_app.description,
                ..app
            })
            .await
            .map_err(|e| e.status())?;

        Ok(with_log_field(Response::new(()), LOG_APPLICATION_ID, &app_id))
    }

    async fn delete(
        &self,
        request: Request<api::DeleteApplicationRequest>,
    ) -> Result<Response<()>, Status> {
        let (_, ext, req) = request.into_parts();
        let app_id = parse_uuid(&req.id)?;

        self.validator
            .validate(&ext, ValidateApplicationAccess::new(Flag::Delete, app_id))
            .await?;

        self.store
            .delete_application(&app_id)
            .await
            .map_err(|e| e.status())?;

        info!(application_id = %app_id, "Application deleted");
        Ok(with_log_field(Response::new(()), LOG_APPLICATION_ID, &app_id))
    }

    async fn list(
        &self,
        request: Request<api::ListApplicationsRequest>,
    ) -> Result<Response<api::ListApplicationsResponse>, Status> {
        let (_, ext, req) = request.into_parts();
        let tenant_id = parse_uuid(&req.tenant_id)?;

        self.validator
            .validate(&ext, ValidateApplicationsAccess::new(Flag::List, tenant_id))
            .await?;

        let filters = ApplicationFilters {
            tenant_id: Some(tenant_id),
            search: if req.search.is_empty() {
                None
            } else {
                Some(req.search)
            },
        };

        let count = self
            .store
            .get_application_count(&filters)
            .await
            .map_err(|e| e.status())?;
        let items = self
            .store
            .list_applications(req.limit as i64, req.offset as i64, &filters)
            .await
            .map_err(|e| e.status())?;

        Ok(with_log_field(
            Response::new(api::ListApplicationsResponse {
                total_count: count as u32,
                result: items
                    .iter()
                    .map(|a| api::ApplicationListItem {
                        id: a.id.to_string(),
                        created_at: Some(datetime_to_prost_timestamp(&a.created_at)),
                        updated_at: Some(datetime_to_prost_timestamp(&a.updated_at)),
                        name: a.name.clone(),
                        description: a.description.clone(),
                    })
                    .collect(),
            }),
            LOG_TENANT_ID,
            &tenant_id,
        ))
    }

    async fn list_integrations(
        &self,
        request: Request<api::ListIntegrationsRequest>,
    ) -> Result<Response<api::ListIntegrationsResponse>, Status> {
        let (_, ext, req) = request.into_parts();
        let app_id = parse_uuid(&req.application_id)?;

        self.validator
            .validate(&ext, ValidateApplicationAccess::new(Flag::Read, app_id))
            .await?;

        let integrations = self
            .store
            .get_integrations_for_application(&app_id)
            .await
            .map_err(|e| e.status())?;

        let mut result: Vec<api::IntegrationListItem> = integrations
            .iter()
            .map(|i| api::IntegrationListItem {
                kind: api_integration_kind(i.kind) as i32,
            })
            .collect();

        // The global MQTT integration is always available.
        result.push(api::IntegrationListItem {
            kind: api::IntegrationKind::MqttGlobal as i32,
        });

        Ok(with_log_field(
            Response::new(api::ListIntegrationsResponse {
                total_count: result.len() as u32,
                result,
            }),
            LOG_APPLICATION_ID,
            &app_id,
        ))
    }

    async fn create_http_integration(
        &self,
        request: Request<api::CreateHttpIntegrationRequest>,
    ) -> Result<Response<()>, Status> {
        let (_, ext, req) = request.into_parts();
        self.create_integration(&ext, req.integration).await
    }

    async fn get_http_integration(
        &self,
        request: Request<api::GetHttpIntegrationRequest>,
    ) -> Result<Response<api::GetHttpIntegrationResponse>, Status> {
        let (_, ext, req) = request.into_parts();
        let (app_id, integration) = self.get_integration(&ext, &req.application_id).await?;
        Ok(with_log_field(
            Response::new(api::GetHttpIntegrationResponse {
                integration: Some(integration),
            }),
            LOG_APPLICATION_ID,
            &app_id,
        ))
    }

    async fn update_http_integration(
        &self,
        request: Request<api::UpdateHttpIntegrationRequest>,
    ) -> Result<Response<()>, Status> {
        let (_, ext, req) = request.into_parts();
        self.update_integration(&ext, req.integration).await
    }

    async fn delete_http_integration(
        &self,
        request: Request<api::DeleteHttpIntegrationRequest>,
    ) -> Result<Response<()>, Status> {
        let (_, ext, req) = request.into_parts();
        self.delete_integration(&ext, &req.application_id, IntegrationKind::Http)
            .await
    }

    async fn create_influx_db_integration(
        &self,
        request: Request<api::CreateInfluxDbIntegrationRequest>,
    ) -> Result<Response<()>, Status> {
        let (_, ext, req) = request.into_parts();
        self.create_integration(&ext, req.integration).await
    }

    async fn get_influx_db_integration(
        &self,
        request: Request<api::GetInfluxDbIntegrationRequest>,
    ) -> Result<Response<api::GetInfluxDbIntegrationResponse>, Status> {
        let (_, ext, req) = request.into_parts();
        let (app_id, integration) = self.get_integration(&ext, &req.application_id).await?;
        Ok(with_log_field(
            Response::new(api::GetInfluxDbIntegrationResponse {
                integration: Some(integration),
            }),
            LOG_APPLICATION_ID,
            &app_id,
        ))
    }

    async fn update_influx_db_integration(
        &self,
        request: Request<api::UpdateInfluxDbIntegrationRequest>,
    ) -> Result<Response<()>, Status> {
        let (_, ext, req) = request.into_parts();
        self.update_integration(&ext, req.integration).await
    }

    async fn delete_influx_db_integration(
        &self,
        request: Request<api::DeleteInfluxDbIntegrationRequest>,
    ) -> Result<Response<()>, Status> {
        let (_, ext, req) = request.into_parts();
        self.delete_integration(&ext, &req.application_id, IntegrationKind::InfluxDb)
            .await
    }

    async fn create_things_board_integration(
        &self,
        request: Request<api::CreateThingsBoardIntegrationRequest>,
    ) -> Result<Response<()>, Status> {
        let (_, ext, req) = request.into_parts();
        self.create_integration(&ext, req.integration).await
    }

    async fn get_things_board_integration(
        &self,
        request: Request<api::GetThingsBoardIntegrationRequest>,
    ) -> Result<Response<api::GetThingsBoardIntegrationResponse>, Status> {
        let (_, ext, req) = request.into_parts();
        let (app_id, integration) = self.get_integration(&ext, &req.application_id).await?;
        Ok(with_log_field(
            Response::new(api::GetThingsBoardIntegrationResponse {
                integration: Some(integration),
            }),
            LOG_APPLICATION_ID,
            &app_id,
        ))
    }

    async fn update_things_board_integration(
        &self,
        request: Request<api::UpdateThingsBoardIntegrationRequest>,
    ) -> Result<Response<()>, Status> {
        let (_, ext, req) = request.into_parts();
        self.update_integration(&ext, req.integration).await
    }

    async fn delete_things_board_integration(
        &self,
        request: Request<api::DeleteThingsBoardIntegrationRequest>,
    ) -> Result<Response<()>, Status> {
        let (_, ext, req) = request.into_parts();
        self.delete_integration(&ext, &req.application_id, IntegrationKind::ThingsBoard)
            .await
    }

    async fn create_my_devices_integration(
        &self,
        request: Request<api::CreateMyDevicesIntegrationRequest>,
    ) -> Result<Response<()>, Status> {
        let (_, ext, req) = request.into_parts();
        self.create_integration(&ext, req.integration).await
    }

    async fn get_my_devices_integration(
        &self,
        request: Request<api::GetMyDevicesIntegrationRequest>,
    ) -> Result<Response<api::GetMyDevicesIntegrationResponse>, Status> {
        let (_, ext, req) = request.into_parts();
        let (app_id, integration) = self.get_integration(&ext, &req.application_id).await?;
        Ok(with_log_field(
            Response::new(api::GetMyDevicesIntegrationResponse {
                integration: Some(integration),
            }),
            LOG_APPLICATION_ID,
            &app_id,
        ))
    }

    async fn update_my_devices_integration(
        &self,
        request: Request<api::UpdateMyDevicesIntegrationRequest>,
    ) -> Result<Response<()>, Status> {
        let (_, ext, req) = request.into_parts();
        self.update_integration(&ext, req.integration).await
    }

    async fn delete_my_devices_integration(
        &self,
        request: Request<api::DeleteMyDevicesIntegrationRequest>,
    ) -> Result<Response<()>, Status> {
        let (_, ext, req) = request.into_parts();
        self.delete_integration(&ext, &req.application_id, IntegrationKind::MyDevices)
            .await
    }

    async fn create_lora_cloud_integration(
        &self,
        request: Request<api::CreateLoraCloudIntegrationRequest>,
    ) -> Result<Response<()>, Status> {
        let (_, ext, req) = request.into_parts();
        self.create_integration(&ext, req.integration).await
    }

    async fn get_lora_cloud_integration(
        &self,
        request: Request<api::GetLoraCloudIntegrationRequest>,
    ) -> Result<Response<api::GetLoraCloudIntegrationResponse>, Status> {
        let (_, ext, req) = request.into_parts();
        let (app_id, integration) = self.get_integration(&ext, &req.application_id).await?;
        Ok(with_log_field(
            Response::new(api::GetLoraCloudIntegrationResponse {
                integration: Some(integration),
            }),
            LOG_APPLICATION_ID,
            &app_id,
        ))
    }

    async fn update_lora_cloud_integration(
        &self,
        request: Request<api::UpdateLoraCloudIntegrationRequest>,
    ) -> Result<Response<()>, Status> {
        let (_, ext, req) = request.into_parts();
        self.update_integration(&ext, req.integration).await
    }

    async fn delete_lora_cloud_integration(
        &self,
        request: Request<api::DeleteLoraCloudIntegrationRequest>,
    ) -> Result<Response<()>, Status> {
        let (_, ext, req) = request.into_parts();
        self.delete_integration(&ext, &req.application_id, IntegrationKind::LoraCloud)
            .await
    }

    async fn create_gcp_pub_sub_integration(
        &self,
        request: Request<api::CreateGcpPubSubIntegrationRequest>,
    ) -> Result<Response<()>, Status> {
        let (_, ext, req) = request.into_parts();
        self.create_integration(&ext, req.integration).await
    }

    async fn get_gcp_pub_sub_integration(
        &self,
        request: Request<api::GetGcpPubSubIntegrationRequest>,
    ) -> Result<Response<api::GetGcpPubSubIntegrationResponse>, Status> {
        let (_, ext, req) = request.into_parts();
        let (app_id, integration) = self.get_integration(&ext, &req.application_id).await?;
        Ok(with_log_field(
            Response::new(api::GetGcpPubSubIntegrationResponse {
                integration: Some(integration),
            }),
            LOG_APPLICATION_ID,
            &app_id,
        ))
    }

    async fn update_gcp_pub_sub_integration(
        &self,
        request: Request<api::UpdateGcpPubSubIntegrationRequest>,
    ) -> Result<Response<()>, Status> {
        let (_, ext, req) = request.into_parts();
        self.update_integration(&ext, req.integration).await
    }

    async fn delete_gcp_pub_sub_integration(
        &self,
        request: Request<api::DeleteGcpPubSubIntegrationRequest>,
    ) -> Result<Response<()>, Status> {
        let (_, ext, req) = request.into_parts();
        self.delete_integration(&ext, &req.application_id, IntegrationKind::GcpPubSub)
            .await
    }

    async fn create_aws_sns_integration(
        &self,
        request: Request<api::CreateAwsSnsIntegrationRequest>,
    ) -> Result<Response<()>, Status> {
        let (_, ext, req) = request.into_parts();
        self.create_integration(&ext, req.integration).await
    }

    async fn get_aws_sns_integration(
        &self,
        request: Request<api::GetAwsSnsIntegrationRequest>,
    ) -> Result<Response<api::GetAwsSnsIntegrationResponse>, Status> {
        let (_, ext, req) = request.into_parts();
        let (app_id, integration) = self.get_integration(&ext, &req.application_id).await?;
        Ok(with_log_field(
            Response::new(api::GetAwsSnsIntegrationResponse {
                integration: Some(integration),
            }),
            LOG_APPLICATION_ID,
            &app_id,
        ))
    }

    async fn update_aws_sns_integration(
        &self,
        request: Request<api::UpdateAwsSnsIntegrationRequest>,
    ) -> Result<Response<()>, Status> {
        let (_, ext, req) = request.into_parts();
        self.update_integration(&ext, req.integration).await
    }

    async fn delete_aws_sns_integration(
        &self,
        request: Request<api::DeleteAwsSnsIntegrationRequest>,
    ) -> Result<Response<()>, Status> {
        let (_, ext, req) = request.into_parts();
        self.delete_integration(&ext, &req.application_id, IntegrationKind::AwsSns)
            .await
    }

    async fn create_azure_service_bus_integration(
        &self,
        request: Request<api::CreateAzureServiceBusIntegrationRequest>,
    ) -> Result<Response<()>, Status> {
        let (_, ext, req) = request.into_parts();
        self.create_integration(&ext, req.integration).await
    }

    async fn get_azure_service_bus_integration(
        &self,
        request: Request<api::GetAzureServiceBusIntegrationRequest>,
    ) -> Result<Response<api::GetAzureServiceBusIntegrationResponse>, Status> {
        let (_, ext, req) = request.into_parts();
        let (app_id, integration) = self.get_integration(&ext, &req.application_id).await?;
        Ok(with_log_field(
            Response::new(api::GetAzureServiceBusIntegrationResponse {
                integration: Some(integration),
            }),
            LOG_APPLICATION_ID,
            &app_id,
        ))
    }

    async fn update_azure_service_bus_integration(
        &self,
        request: Request<api::UpdateAzureServiceBusIntegrationRequest>,
    ) -> Result<Response<()>, Status> {
        let (_, ext, req) = request.into_parts();
        self.update_integration(&ext, req.integration).await
    }

    async fn delete_azure_service_bus_integration(
        &self,
        request: Request<api::DeleteAzureServiceBusIntegrationRequest>,
    ) -> Result<Response<()>, Status> {
        let (_, ext, req) = request.into_parts();
        self.delete_integration(&ext, &req.application_id, IntegrationKind::AzureServiceBus)
            .await
    }

    async fn create_pilot_things_integration(
        &self,
        request: Request<api::CreatePilotThingsIntegrationRequest>,
    ) -> Result<Response<()>, Status> {
        let (_, ext, req) = request.into_parts();
        self.create_integration(&ext, req.integration).await
    }

    async fn get_pilot_things_integration(
        &self,
        request: Request<api::GetPilotThingsIntegrationRequest>,
    ) -> Result<Response<api::GetPilotThingsIntegrationResponse>, Status> {
        let (_, ext, req) = request.into_parts();
        let (app_id, integration) = self.get_integration(&ext, &req.application_id).await?;
        Ok(with_log_field(
            Response::new(api::GetPilotThingsIntegrationResponse {
                integration: Some(integration),
            }),
            LOG_APPLICATION_ID,
            &app_id,
        ))
    }

    async fn update_pilot_things_integration(
        &self,
        request: Request<api::UpdatePilotThingsIntegrationRequest>,
    ) -> Result<Response<()>, Status> {
        let (_, ext, req) = request.into_parts();
        self.update_integration(&ext, req.integration).await
    }

    async fn delete_pilot_things_integration(
        &self,
        request: Request<api::DeletePilotThingsIntegrationRequest>,
    ) -> Result<Response<()>, Status> {
        let (_, ext, req) = request.into_parts();
        self.delete_integration(&ext, &req.application_id, IntegrationKind::PilotThings)
            .await
    }

    async fn create_ifttt_integration(
        &self,
        request: Request<api::CreateIftttIntegrationRequest>,
    ) -> Result<Response<()>, Status> {
        let (_, ext, req) = request.into_parts();
        self.create_integration(&ext, req.integration).await
    }

    async fn get_ifttt_integration(
        &self,
        request: Request<api::GetIftttIntegrationRequest>,
    ) -> Result<Response<api::GetIftttIntegrationResponse>, Status> {
        let (_, ext, req) = request.into_parts();
        let (app_id, integration) = self.get_integration(&ext, &req.application_id).await?;
        Ok(with_log_field(
            Response::new(api::GetIftttIntegrationResponse {
                integration: Some(integration),
            }),
            LOG_APPLICATION_ID,
            &app_id,
        ))
    }

    async fn update_ifttt_integration(
        &self,
        request: Request<api::UpdateIftttIntegrationRequest>,
    ) -> Result<Response<()>, Status> {
        let (_, ext, req) = request.into_parts();
        self.update_integration(&ext, req.integration).await
    }

    async fn delete_ifttt_integration(
        &self,
        request: Request<api::DeleteIftttIntegrationRequest>,
    ) -> Result<Response<()>, Status> {
        let (_, ext, req) = request.into_parts();
        self.delete_integration(&ext, &req.application_id, IntegrationKind::Ifttt)
            .await
    }

    async fn generate_mqtt_integration_client_certificate(
        &self,
        request: Request<api::GenerateMqttIntegrationClientCertificateRequest>,
    ) -> Result<Response<api::GenerateMqttIntegrationClientCertificateResponse>, Status> {
        let (_, ext, req) = request.into_parts();
        let app_id = parse_uuid(&req.application_id)?;

        self.validator
            .validate(&ext, ValidateApplicationAccess::new(Flag::Update, app_id))
            .await?;

        let issued = client_cert_for_application_id(&self.config.mqtt_client, &app_id)
            .await
            .map_err(|e| e.status())?;

        self.store
            .set_mqtt_tls_cert(&app_id, issued.cert.as_bytes())
            .await
            .map_err(|e| e.status())?;

        Ok(with_log_field(
            Response::new(api::GenerateMqttIntegrationClientCertificateResponse {
                tls_cert: issued.cert,
                tls_key: issued.key,
                ca_cert: issued.ca_cert,
                expires_at: Some(datetime_to_prost_timestamp(&issued.expires_at)),
            }),
            LOG_APPLICATION_ID,
            &app_id,
        ))
    }
}
