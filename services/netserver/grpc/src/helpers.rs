//! Small conversions shared by the services

use crate::error::ToStatus;
use chrono::{DateTime, Utc};
use ns_api::api;
use std::str::FromStr;
use tonic::{Response, Status};
use uuid::Uuid;

/// chrono timestamp to protobuf timestamp
pub fn datetime_to_prost_timestamp(dt: &DateTime<Utc>) -> prost_types::Timestamp {
    prost_types::Timestamp {
        seconds: dt.timestamp(),
        nanos: dt.timestamp_subsec_nanos() as i32,
    }
}

/// Parse a UUID request field; malformed ids are `InvalidArgument`.
pub fn parse_uuid(s: &str) -> Result<Uuid, Status> {
    Uuid::from_str(s).map_err(|e| e.status())
}

/// Parse an optional UUID request field; empty means unset.
pub fn parse_optional_uuid(s: &str) -> Result<Option<Uuid>, Status> {
    if s.is_empty() {
        Ok(None)
    } else {
        parse_uuid(s).map(Some)
    }
}

/// Attach a `x-log-<field>` response header used for request logging.
pub fn with_log_field<T>(mut resp: Response<T>, key: &'static str, value: &Uuid) -> Response<T> {
    if let Ok(v) = value.to_string().parse() {
        resp.metadata_mut().insert(key, v);
    }
    resp
}

/// JSON flag of the stored HTTP configuration
pub fn encoding_to_json(encoding: api::Encoding) -> bool {
    encoding == api::Encoding::Json
}

/// Inverse of [`encoding_to_json`]
pub fn json_to_encoding(json: bool) -> api::Encoding {
    if json {
        api::Encoding::Json
    } else {
        api::Encoding::Protobuf
    }
}
