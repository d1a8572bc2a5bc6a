//! Protobuf messages and gRPC stubs for the network-server management API.
//!
//! The message types, client stubs and server traits are generated at build
//! time from the `.proto` files under `api/proto`. This crate adds the
//! string conversions used in configuration files, thin typed wire helpers
//! and a static table describing every RPC of the exposed services.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod convert;
pub mod descriptor;
pub mod wire;

pub use convert::*;
pub use descriptor::*;
pub use wire::*;

/// Generated protobuf code and gRPC service definitions
pub mod proto {
    /// Types shared between the services (regions, MAC versions, locations)
    #[allow(missing_docs)]
    pub mod common {
        tonic::include_proto!("common");
    }

    /// Application and internal service definitions
    #[allow(missing_docs)]
    pub mod api {
        tonic::include_proto!("api");
    }

    /// File descriptor set for reflection
    pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("api_descriptor");
}

pub use proto::{api, common};
