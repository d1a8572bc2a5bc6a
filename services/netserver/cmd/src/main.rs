//! Network-server management API binary.
//!
//! Loads the configuration, bootstraps the admin user and serves the
//! application and internal gRPC services until interrupted.

use anyhow::Context;
use clap::Parser;
use ns_grpc::NetserverGrpcServerBuilder;
use ns_storage::{StorageMode, Store, User};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::sync::oneshot;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[macro_use]
mod logging;
mod config;

use config::ServerConfig;
use logging::NetserverLogFormatter;

/// LoRaWAN network-server management API
#[derive(Parser, Debug)]
#[command(name = "netserver", version, about = "LoRaWAN network-server management API")]
struct Args {
    /// Configuration file path
    #[arg(long, default_value = "netserver.yaml")]
    config: PathBuf,

    /// gRPC bind address, overrides api.bind
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "NETSERVER_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// E-mail of the bootstrapped admin user
    #[arg(long, default_value = "admin@netserver.local")]
    admin_email: String,

    /// Password of the bootstrapped admin user, generated when unset
    #[arg(long, env = "NETSERVER_ADMIN_PASSWORD")]
    admin_password: Option<String>,

    /// How long to wait for in-flight requests on shutdown, e.g. 5s
    #[arg(long, default_value = "5s")]
    shutdown_timeout: humantime::Duration,
}

fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Create the global admin user of a fresh store
async fn bootstrap_admin(
    store: &dyn Store,
    email: &str,
    password: Option<String>,
) -> anyhow::Result<()> {
    let generated = password.is_none();
    let password = password.unwrap_or_else(|| random_string(16));

    let mut user = User {
        email: email.to_string(),
        email_verified: true,
        is_admin: true,
        is_active: true,
        note: "Bootstrapped admin user".to_string(),
        ..Default::default()
    };
    user.set_password_hash(&password)
        .context("Hash admin password")?;
    let user = store.create_user(user).await.context("Create admin user")?;

    component_info!("bootstrap", user_id = %user.id, email = %user.email, "Admin user created");
    if generated {
        component_warn!("bootstrap", password = %password, "Generated admin password, pass --admin-password to set one");
    }
    Ok(())
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let env_filter = EnvFilter::new("info")
        .add_directive(format!("netserver={}", args.log_level).parse()?)
        .add_directive(format!("ns_grpc={}", args.log_level).parse()?)
        .add_directive(format!("ns_storage={}", args.log_level).parse()?);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .event_format(NetserverLogFormatter::new("netserver"))
        .init();

    info!("Starting netserver v{}", env!("CARGO_PKG_VERSION"));

    let mut server_config = ServerConfig::load_from_file(&args.config)?;
    if server_config.api.secret.is_empty() {
        warn!("api.secret is not set, using a random secret; issued tokens will not survive a restart");
        server_config.api.secret = random_string(32);
    }

    let bind_addr = match args.bind {
        Some(addr) => addr,
        None => server_config.bind_addr()?,
    };
    let api_config = server_config.api_config()?;

    let store = ns_storage::from_mode(&StorageMode::InMemory);
    bootstrap_admin(store.as_ref(), &args.admin_email, args.admin_password.clone()).await?;

    let server = NetserverGrpcServerBuilder::new()
        .bind_addr(bind_addr)
        .store(store)
        .api_config(api_config)
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build gRPC server: {}", e))?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let mut server_handle = tokio::spawn(server.serve_with_shutdown(async {
        let _ = shutdown_rx.await;
    }));

    tokio::select! {
        res = &mut server_handle => {
            return match res {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e.context("gRPC server failed")),
                Err(e) => Err(anyhow::anyhow!("gRPC server task failed: {}", e)),
            };
        }
        res = tokio::signal::ctrl_c() => {
            res.context("Listen for shutdown signal")?;
            info!("Received shutdown signal, stopping gRPC server");
        }
    }

    let _ = shutdown_tx.send(());
    let timeout: std::time::Duration = args.shutdown_timeout.into();
    match tokio::time::timeout(timeout, server_handle).await {
        Ok(Ok(Ok(()))) => info!("Shutdown complete"),
        Ok(Ok(Err(e))) => error!("gRPC server error during shutdown: {:#}", e),
        Ok(Err(e)) => error!("gRPC server task failed: {}", e),
        Err(_) => warn!("gRPC server did not stop within {}", args.shutdown_timeout),
    }

    Ok(())
}
