//! Tonic gRPC services for the network-server management API.
//!
//! This crate implements `api.ApplicationService` and `api.InternalService`
//! on top of the storage traits from `ns-storage`, together with the
//! authentication and authorization layer, the frame and event log streams,
//! and the server builder used by the `netserver` binary.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod application;
pub mod auth;
pub mod certificate;
pub mod config;
pub mod error;
pub mod helpers;
pub mod internal;
pub mod oidc;
pub mod region;
pub mod server;
pub mod stream;

pub use application::ApplicationApi;
pub use auth::{AuthID, AuthInterceptor};
pub use config::ApiConfig;
pub use error::ToStatus;
pub use internal::InternalApi;
pub use oidc::{OidcProvider, OidcUserInfo};
pub use server::*;
pub use stream::{LogStreams, StreamKind};
