//! Mapping of internal errors onto gRPC status codes

use ns_storage::StorageError;
use tonic::{Code, Status};
use tracing::error;

/// Conversion of an error into the `Status` returned to the client.
pub trait ToStatus {
    /// The status for this error
    fn status(&self) -> Status;
}

impl ToStatus for StorageError {
    fn status(&self) -> Status {
        match self {
            StorageError::NotFound(_) => Status::new(Code::NotFound, self.to_string()),
            StorageError::AlreadyExists(_) => Status::new(Code::AlreadyExists, self.to_string()),
            StorageError::Validation(_)
            | StorageError::InvalidEmail
            | StorageError::HashPassword(_) => {
                Status::new(Code::InvalidArgument, self.to_string())
            }
            StorageError::InvalidUsernameOrPassword => {
                Status::new(Code::Unauthenticated, self.to_string())
            }
            StorageError::Serialization(_) | StorageError::Anyhow(_) => {
                error!(error = %self, "Storage error");
                Status::new(Code::Internal, self.to_string())
            }
        }
    }
}

impl ToStatus for anyhow::Error {
    fn status(&self) -> Status {
        match self.downcast_ref::<StorageError>() {
            Some(e) => e.status(),
            None => {
                error!(error = format!("{:#}", self), "Internal error");
                Status::new(Code::Internal, format!("{:#}", self))
            }
        }
    }
}

impl ToStatus for uuid::Error {
    fn status(&self) -> Status {
        Status::new(Code::InvalidArgument, self.to_string())
    }
}

impl ToStatus for jsonwebtoken::errors::Error {
    fn status(&self) -> Status {
        Status::new(Code::Unauthenticated, self.to_string())
    }
}
