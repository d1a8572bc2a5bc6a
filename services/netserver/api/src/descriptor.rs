//! Static RPC table for the exposed gRPC services.
//!
//! Each entry names the method, its HTTP/2 path, the fully qualified
//! request and response message types and whether the response is a
//! server stream. The generated tonic stubs route on the same paths; the
//! table is what tooling (logging, access decisions, reflection checks)
//! uses without going through the generated code.

/// Fully qualified name of the application service
pub const APPLICATION_SERVICE_NAME: &str = "api.ApplicationService";

/// Fully qualified name of the internal service
pub const INTERNAL_SERVICE_NAME: &str = "api.InternalService";

/// Description of a single RPC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodDescriptor {
    /// Fully qualified service name, e.g. `api.InternalService`
    pub service: &'static str,
    /// Method name as declared in the service
    pub name: &'static str,
    /// Fully qualified request message type
    pub request_type: &'static str,
    /// Fully qualified response message type
    pub response_type: &'static str,
    /// Response is a stream of `response_type` messages
    pub server_streaming: bool,
}

impl MethodDescriptor {
    /// HTTP/2 path of the RPC, e.g. `/api.InternalService/Login`
    pub fn path(&self) -> String {
        format!("/{}/{}", self.service, self.name)
    }

    /// Whether the request message is `google.protobuf.Empty`
    pub fn takes_empty(&self) -> bool {
        self.request_type == "google.protobuf.Empty"
    }

    /// Whether the response message is `google.protobuf.Empty`
    pub fn returns_empty(&self) -> bool {
        self.response_type == "google.protobuf.Empty"
    }
}

/// Description of a gRPC service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceDescriptor {
    /// Fully qualified service name
    pub name: &'static str,
    /// Methods in declaration order
    pub methods: &'static [MethodDescriptor],
}

impl ServiceDescriptor {
    /// Protobuf package of the service
    pub fn package(&self) -> &'static str {
        self.name.rsplit_once('.').map(|(pkg, _)| pkg).unwrap_or("")
    }

    /// Service name without its package
    pub fn short_name(&self) -> &'static str {
        self.name.rsplit_once('.').map(|(_, name)| name).unwrap_or(self.name)
    }

    /// Look up a method by name
    pub fn method(&self, name: &str) -> Option<&'static MethodDescriptor> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// Methods returning a server stream
    pub fn streaming_methods(&self) -> impl Iterator<Item = &'static MethodDescriptor> {
        self.methods.iter().filter(|m| m.server_streaming)
    }
}

macro_rules! unary {
    ($svc:expr, $name:literal, $req:literal, $resp:literal) => {
        MethodDescriptor {
            service: $svc,
            name: $name,
            request_type: $req,
            response_type: $resp,
            server_streaming: false,
        }
    };
}

macro_rules! server_streaming {
    ($svc:expr, $name:literal, $req:literal, $resp:literal) => {
        MethodDescriptor {
            service: $svc,
            name: $name,
            request_type: $req,
            response_type: $resp,
            server_streaming: true,
        }
    };
}

const APPLICATION_METHODS: &[MethodDescriptor] = &[
    unary!(APPLICATION_SERVICE_NAME, "Create", "api.CreateApplicationRequest", "api.CreateApplicationResponse"),
    unary!(APPLICATION_SERVICE_NAME, "Get", "api.GetApplicationRequest", "api.GetApplicationResponse"),
    unary!(APPLICATION_SERVICE_NAME, "Update", "api.UpdateApplicationRequest", "google.protobuf.Empty"),
    unary!(APPLICATION_SERVICE_NAME, "Delete", "api.DeleteApplicationRequest", "google.protobuf.Empty"),
    unary!(APPLICATION_SERVICE_NAME, "List", "api.ListApplicationsRequest", "api.ListApplicationsResponse"),
    unary!(APPLICATION_SERVICE_NAME, "ListIntegrations", "api.ListIntegrationsRequest", "api.ListIntegrationsResponse"),
    unary!(APPLICATION_SERVICE_NAME, "CreateHttpIntegration", "api.CreateHttpIntegrationRequest", "google.protobuf.Empty"),
    unary!(APPLICATION_SERVICE_NAME, "GetHttpIntegration", "api.GetHttpIntegrationRequest", "api.GetHttpIntegrationResponse"),
    unary!(APPLICATION_SERVICE_NAME, "UpdateHttpIntegration", "api.UpdateHttpIntegrationRequest", "google.protobuf.Empty"),
    unary!(APPLICATION_SERVICE_NAME, "DeleteHttpIntegration", "api.DeleteHttpIntegrationRequest", "google.protobuf.Empty"),
    unary!(APPLICATION_SERVICE_NAME, "CreateInfluxDbIntegration", "api.CreateInfluxDbIntegrationRequest", "google.protobuf.Empty"),
    unary!(APPLICATION_SERVICE_NAME, "GetInfluxDbIntegration", "api.GetInfluxDbIntegrationRequest", "api.GetInfluxDbIntegrationResponse"),
    unary!(APPLICATION_SERVICE_NAME, "UpdateInfluxDbIntegration", "api.UpdateInfluxDbIntegrationRequest", "google.protobuf.Empty"),
    unary!(APPLICATION_SERVICE_NAME, "DeleteInfluxDbIntegration", "api.DeleteInfluxDbIntegrationRequest", "google.protobuf.Empty"),
    unary!(APPLICATION_SERVICE_NAME, "CreateThingsBoardIntegration", "api.CreateThingsBoardIntegrationRequest", "google.protobuf.Empty"),
    unary!(APPLICATION_SERVICE_NAME, "GetThingsBoardIntegration", "api.GetThingsBoardIntegrationRequest", "api.GetThingsBoardIntegrationResponse"),
    unary!(APPLICATION_SERVICE_NAME, "UpdateThingsBoardIntegration", "api.UpdateThingsBoardIntegrationRequest", "google.protobuf.Empty"),
    unary!(APPLICATION_SERVICE_NAME, "DeleteThingsBoardIntegration", "api.DeleteThingsBoardIntegrationRequest", "google.protobuf.Empty"),
    unary!(APPLICATION_SERVICE_NAME, "CreateMyDevicesIntegration", "api.CreateMyDevicesIntegrationRequest", "google.protobuf.Empty"),
    unary!(APPLICATION_SERVICE_NAME, "GetMyDevicesIntegration", "api.GetMyDevicesIntegrationRequest", "api.GetMyDevicesIntegrationResponse"),
    unary!(APPLICATION_SERVICE_NAME, "UpdateMyDevicesIntegration", "api.UpdateMyDevicesIntegrationRequest", "google.protobuf.Empty"),
    unary!(APPLICATION_SERVICE_NAME, "DeleteMyDevicesIntegration", "api.DeleteMyDevicesIntegrationRequest", "google.protobuf.Empty"),
    unary!(APPLICATION_SERVICE_NAME, "CreateLoraCloudIntegration", "api.CreateLoraCloudIntegrationRequest", "google.protobuf.Empty"),
    unary!(APPLICATION_SERVICE_NAME, "GetLoraCloudIntegration", "api.GetLoraCloudIntegrationRequest", "api.GetLoraCloudIntegrationResponse"),
    unary!(APPLICATION_SERVICE_NAME, "UpdateLoraCloudIntegration", "api.UpdateLoraCloudIntegrationRequest", "google.protobuf.Empty"),
    unary!(APPLICATION_SERVICE_NAME, "DeleteLoraCloudIntegration", "api.DeleteLoraCloudIntegrationRequest", "google.protobuf.Empty"),
    unary!(APPLICATION_SERVICE_NAME, "CreateGcpPubSubIntegration", "api.CreateGcpPubSubIntegrationRequest", "google.protobuf.Empty"),
    unary!(APPLICATION_SERVICE_NAME, "GetGcpPubSubIntegration", "api.GetGcpPubSubIntegrationRequest", "api.GetGcpPubSubIntegrationResponse"),
    unary!(APPLICATION_SERVICE_NAME, "UpdateGcpPubSubIntegration", "api.UpdateGcpPubSubIntegrationRequest", "google.protobuf.Empty"),
    unary!(APPLICATION_SERVICE_NAME, "DeleteGcpPubSubIntegration", "api.DeleteGcpPubSubIntegrationRequest", "google.protobuf.Empty"),
    unary!(APPLICATION_SERVICE_NAME, "CreateAwsSnsIntegration", "api.CreateAwsSnsIntegrationRequest", "google.protobuf.Empty"),
    unary!(APPLICATION_SERVICE_NAME, "GetAwsSnsIntegration", "api.GetAwsSnsIntegrationRequest", "api.GetAwsSnsIntegrationResponse"),
    unary!(APPLICATION_SERVICE_NAME, "UpdateAwsSnsIntegration", "api.UpdateAwsSnsIntegrationRequest", "google.protobuf.Empty"),
    unary!(APPLICATION_SERVICE_NAME, "DeleteAwsSnsIntegration", "api.DeleteAwsSnsIntegrationRequest", "google.protobuf.Empty"),
    unary!(APPLICATION_SERVICE_NAME, "CreateAzureServiceBusIntegration", "api.CreateAzureServiceBusIntegrationRequest", "google.protobuf.Empty"),
    unary!(APPLICATION_SERVICE_NAME, "GetAzureServiceBusIntegration", "api.GetAzureServiceBusIntegrationRequest", "api.GetAzureServiceBusIntegrationResponse"),
    unary!(APPLICATION_SERVICE_NAME, "UpdateAzureServiceBusIntegration", "api.UpdateAzureServiceBusIntegrationRequest", "google.protobuf.Empty"),
    unary!(APPLICATION_SERVICE_NAME, "DeleteAzureServiceBusIntegration", "api.DeleteAzureServiceBusIntegrationRequest", "google.protobuf.Empty"),
    unary!(APPLICATION_SERVICE_NAME, "CreatePilotThingsIntegration", "api.CreatePilotThingsIntegrationRequest", "google.protobuf.Empty"),
    unary!(APPLICATION_SERVICE_NAME, "GetPilotThingsIntegration", "api.GetPilotThingsIntegrationRequest", "api.GetPilotThingsIntegrationResponse"),
    unary!(APPLICATION_SERVICE_NAME, "UpdatePilotThingsIntegration", "api.UpdatePilotThingsIntegrationRequest", "google.protobuf.Empty"),
    unary!(APPLICATION_SERVICE_NAME, "DeletePilotThingsIntegration", "api.DeletePilotThingsIntegrationRequest", "google.protobuf.Empty"),
    unary!(APPLICATION_SERVICE_NAME, "CreateIftttIntegration", "api.CreateIftttIntegrationRequest", "google.protobuf.Empty"),
    unary!(APPLICATION_SERVICE_NAME, "GetIftttIntegration", "api.GetIftttIntegrationRequest", "api.GetIftttIntegrationResponse"),
    unary!(APPLICATION_SERVICE_NAME, "UpdateIftttIntegration", "api.UpdateIftttIntegrationRequest", "google.protobuf.Empty"),
    unary!(APPLICATION_SERVICE_NAME, "DeleteIftttIntegration", "api.DeleteIftttIntegrationRequest", "google.protobuf.Empty"),
    unary!(APPLICATION_SERVICE_NAME, "GenerateMqttIntegrationClientCertificate", "api.GenerateMqttIntegrationClientCertificateRequest", "api.GenerateMqttIntegrationClientCertificateResponse"),
];

const INTERNAL_METHODS: &[MethodDescriptor] = &[
    unary!(INTERNAL_SERVICE_NAME, "Login", "api.LoginRequest", "api.LoginResponse"),
    unary!(INTERNAL_SERVICE_NAME, "Profile", "google.protobuf.Empty", "api.ProfileResponse"),
    unary!(INTERNAL_SERVICE_NAME, "GlobalSearch", "api.GlobalSearchRequest", "api.GlobalSearchResponse"),
    unary!(INTERNAL_SERVICE_NAME, "CreateApiKey", "api.CreateApiKeyRequest", "api.CreateApiKeyResponse"),
    unary!(INTERNAL_SERVICE_NAME, "DeleteApiKey", "api.DeleteApiKeyRequest", "google.protobuf.Empty"),
    unary!(INTERNAL_SERVICE_NAME, "ListApiKeys", "api.ListApiKeysRequest", "api.ListApiKeysResponse"),
    unary!(INTERNAL_SERVICE_NAME, "Settings", "google.protobuf.Empty", "api.SettingsResponse"),
    unary!(INTERNAL_SERVICE_NAME, "OpenIdConnectLogin", "api.OpenIdConnectLoginRequest", "api.OpenIdConnectLoginResponse"),
    unary!(INTERNAL_SERVICE_NAME, "GetDevicesSummary", "api.GetDevicesSummaryRequest", "api.GetDevicesSummaryResponse"),
    unary!(INTERNAL_SERVICE_NAME, "GetGatewaysSummary", "api.GetGatewaysSummaryRequest", "api.GetGatewaysSummaryResponse"),
    server_streaming!(INTERNAL_SERVICE_NAME, "StreamGatewayFrames", "api.StreamGatewayFramesRequest", "api.LogItem"),
    server_streaming!(INTERNAL_SERVICE_NAME, "StreamDeviceFrames", "api.StreamDeviceFramesRequest", "api.LogItem"),
    server_streaming!(INTERNAL_SERVICE_NAME, "StreamDeviceEvents", "api.StreamDeviceEventsRequest", "api.LogItem"),
    unary!(INTERNAL_SERVICE_NAME, "ListRegions", "google.protobuf.Empty", "api.ListRegionsResponse"),
    unary!(INTERNAL_SERVICE_NAME, "GetRegion", "api.GetRegionRequest", "api.GetRegionResponse"),
];

/// `api.ApplicationService`
pub static APPLICATION_SERVICE: ServiceDescriptor = ServiceDescriptor {
    name: APPLICATION_SERVICE_NAME,
    methods: APPLICATION_METHODS,
};

/// `api.InternalService`
pub static INTERNAL_SERVICE: ServiceDescriptor = ServiceDescriptor {
    name: INTERNAL_SERVICE_NAME,
    methods: INTERNAL_METHODS,
};

/// All services exposed by the API server
pub static SERVICES: [&ServiceDescriptor; 2] = [&APPLICATION_SERVICE, &INTERNAL_SERVICE];

/// Resolve a gRPC request path (`/package.Service/Method`) to its descriptor.
pub fn find_method(path: &str) -> Option<&'static MethodDescriptor> {
    let (service, method) = path.strip_prefix('/')?.split_once('/')?;
    SERVICES
        .iter()
        .find(|s| s.name == service)
        .and_then(|s| s.method(method))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_counts() {
        assert_eq!(APPLICATION_SERVICE.methods.len(), 47);
        assert_eq!(INTERNAL_SERVICE.methods.len(), 15);
    }

    #[test]
    fn test_paths() {
        let login = INTERNAL_SERVICE.method("Login").unwrap();
        assert_eq!(login.path(), "/api.InternalService/Login");
        assert_eq!(login.request_type, "api.LoginRequest");
        assert_eq!(login.response_type, "api.LoginResponse");
        assert!(!login.server_streaming);

        let create = APPLICATION_SERVICE.method("Create").unwrap();
        assert_eq!(create.path(), "/api.ApplicationService/Create");
    }

    #[test]
    fn test_streaming_methods() {
        let names: Vec<_> = INTERNAL_SERVICE.streaming_methods().map(|m| m.name).collect();
        assert_eq!(
            names,
            vec!["StreamGatewayFrames", "StreamDeviceFrames", "StreamDeviceEvents"]
        );
        assert!(INTERNAL_SERVICE
            .streaming_methods()
            .all(|m| m.response_type == "api.LogItem"));
        assert_eq!(APPLICATION_SERVICE.streaming_methods().count(), 0);
    }

    #[test]
    fn test_find_method() {
        let m = find_method("/api.InternalService/StreamGatewayFrames").unwrap();
        assert!(m.server_streaming);
        assert_eq!(m.request_type, "api.StreamGatewayFramesRequest");

        let m = find_method("/api.ApplicationService/DeleteIftttIntegration").unwrap();
        assert!(m.returns_empty());

        assert!(find_method("/api.InternalService/Unknown").is_none());
        assert!(find_method("/api.DeviceService/Get").is_none());
        assert!(find_method("api.InternalService/Login").is_none());
        assert!(find_method("/api.InternalService").is_none());
    }

    #[test]
    fn test_service_names() {
        assert_eq!(INTERNAL_SERVICE.package(), "api");
        assert_eq!(INTERNAL_SERVICE.short_name(), "InternalService");
    }

    #[test]
    fn test_empty_requests() {
        let empty: Vec<_> = INTERNAL_SERVICE
            .methods
            .iter()
            .filter(|m| m.takes_empty())
            .map(|m| m.name)
            .collect();
        assert_eq!(empty, vec!["Profile", "Settings", "ListRegions"]);
    }
}
