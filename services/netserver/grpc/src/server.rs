//! gRPC server implementation

use crate::application::ApplicationApi;
use crate::auth::AuthInterceptor;
use crate::config::ApiConfig;
use crate::internal::InternalApi;
use crate::oidc::OidcProvider;
use crate::stream::LogStreams;
use ns_api::api::application_service_server::ApplicationServiceServer;
use ns_api::api::internal_service_server::InternalServiceServer;
use ns_storage::Store;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::service::interceptor::InterceptedService;
use tonic::transport::server::Router;
use tonic::transport::Server;
use tonic_reflection::server::Builder as ReflectionBuilder;
use tracing::{error, info};

/// gRPC server configuration
#[derive(Debug, Clone)]
pub struct GrpcServerConfig {
    /// Bind address
    pub bind_addr: SocketAddr,
    /// Maximum message receive size
    pub max_recv_message_size: Option<usize>,
    /// Maximum message send size
    pub max_send_message_size: Option<usize>,
}

impl Default for GrpcServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_recv_message_size: Some(4 * 1024 * 1024),
            max_send_message_size: Some(4 * 1024 * 1024),
        }
    }
}

/// gRPC server for the application and internal services
pub struct NetserverGrpcServer {
    config: GrpcServerConfig,
    secret: String,
    application: ApplicationApi,
    internal: InternalApi,
    streams: Arc<LogStreams>,
}

impl NetserverGrpcServer {
    /// Create a new gRPC server
    pub fn new(
        config: GrpcServerConfig,
        store: Arc<dyn Store>,
        api_config: Arc<ApiConfig>,
        streams: Arc<LogStreams>,
        oidc: Option<Arc<dyn OidcProvider>>,
    ) -> Self {
        let application = ApplicationApi::new(store.clone(), api_config.clone());
        let mut internal = InternalApi::new(store, api_config.clone(), streams.clone());
        if let Some(provider) = oidc {
            internal = internal.with_oidc_provider(provider);
        }

        Self {
            config,
            secret: api_config.secret.clone(),
            application,
            internal,
            streams,
        }
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Hub feeding the frame and event log streams
    pub fn log_streams(&self) -> Arc<LogStreams> {
        self.streams.clone()
    }

    fn router(self) -> anyhow::Result<Router> {
        let interceptor = AuthInterceptor::new(&self.secret);

        let mut application = ApplicationServiceServer::new(self.application);
        let mut internal = InternalServiceServer::new(self.internal);
        if let Some(size) = self.config.max_recv_message_size {
            application = application.max_decoding_message_size(size);
            internal = internal.max_decoding_message_size(size);
        }
        if let Some(size) = self.config.max_send_message_size {
            application = application.max_encoding_message_size(size);
            internal = internal.max_encoding_message_size(size);
        }

        let reflection_service = ReflectionBuilder::configure()
            .register_encoded_file_descriptor_set(ns_api::proto::FILE_DESCRIPTOR_SET)
            .build_v1()
            .map_err(|e| anyhow::anyhow!("Failed to create reflection service: {}", e))?;

        Ok(Server::builder()
            .add_service(InterceptedService::new(application, interceptor.clone()))
            .add_service(InterceptedService::new(internal, interceptor))
            .add_service(reflection_service))
    }

    /// Start the gRPC server
    pub async fn serve(self) -> anyhow::Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Start the gRPC server, stopping when `signal` completes
    pub async fn serve_with_shutdown<F>(self, signal: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let addr = self.config.bind_addr;
        info!("Starting gRPC server on {}", addr);

        let router = self.router()?;
        info!("gRPC server listening on {}", addr);

        if let Err(e) = router.serve_with_shutdown(addr, signal).await {
            error!("gRPC server error: {}", e);
            return Err(e.into());
        }

        info!("gRPC server stopped");
        Ok(())
    }

    /// Serve on an already bound listener, stopping when `signal` completes
    pub async fn serve_with_listener<F>(self, listener: TcpListener, signal: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let addr = listener.local_addr()?;
        let router = self.router()?;
        info!("gRPC server listening on {}", addr);

        if let Err(e) = router
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), signal)
            .await
        {
            error!("gRPC server error: {}", e);
            return Err(e.into());
        }

        Ok(())
    }
}

/// Builder for creating gRPC server
#[derive(Default)]
pub struct NetserverGrpcServerBuilder {
    config: GrpcServerConfig,
    store: Option<Arc<dyn Store>>,
    api_config: Option<Arc<ApiConfig>>,
    streams: Option<Arc<LogStreams>>,
    oidc: Option<Arc<dyn OidcProvider>>,
}

impl NetserverGrpcServerBuilder {
    /// Create a new server builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bind address
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.config.bind_addr = addr;
        self
    }

    /// Set maximum receive message size
    pub fn max_recv_message_size(mut self, size: usize) -> Self {
        self.config.max_recv_message_size = Some(size);
        self
    }

    /// Set maximum send message size
    pub fn max_send_message_size(mut self, size: usize) -> Self {
        self.config.max_send_message_size = Some(size);
        self
    }

    /// Set the storage backend
    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the API configuration
    pub fn api_config(mut self, config: ApiConfig) -> Self {
        self.api_config = Some(Arc::new(config));
        self
    }

    /// Share an existing log stream hub
    pub fn log_streams(mut self, streams: Arc<LogStreams>) -> Self {
        self.streams = Some(streams);
        self
    }

    /// Set the OpenID Connect provider
    pub fn oidc_provider(mut self, provider: Arc<dyn OidcProvider>) -> Self {
        self.oidc = Some(provider);
        self
    }

    /// Build the server
    pub fn build(self) -> Result<NetserverGrpcServer, &'static str> {
        let store = self.store.ok_or("Store is required")?;
        let api_config = self.api_config.ok_or("API configuration is required")?;
        if api_config.secret.is_empty() {
            return Err("API secret must not be empty");
        }
        let streams = self
            .streams
            .unwrap_or_else(|| Arc::new(LogStreams::new(&api_config.monitoring)));

        Ok(NetserverGrpcServer::new(
            self.config,
            store,
            api_config,
            streams,
            self.oidc,
        ))
    }
}
