//! Typed encode/decode helpers over the generated messages.

use prost::Message;
use thiserror::Error;

/// Wire-level codec errors
#[derive(Error, Debug)]
pub enum WireError {
    /// The buffer is not a valid encoding of the requested message
    #[error("Decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    /// The destination buffer cannot hold the encoded message
    #[error("Encode error: {0}")]
    Encode(#[from] prost::EncodeError),

    /// An enum field carries a value the schema does not define
    #[error("Unknown {enum_name} value {value}")]
    UnknownEnumValue {
        /// Protobuf enum name
        enum_name: &'static str,
        /// Raw wire value
        value: i32,
    },
}

/// Serialize a message to its protobuf wire representation.
///
/// Scalar fields at their default value are not written, so an empty
/// message encodes to zero bytes.
pub fn encode<M: Message>(msg: &M) -> Vec<u8> {
    msg.encode_to_vec()
}

/// Serialize a message into a caller-provided buffer.
pub fn encode_into<M: Message>(msg: &M, buf: &mut Vec<u8>) -> Result<(), WireError> {
    msg.encode(buf)?;
    Ok(())
}

/// Deserialize a message. Fields with unknown numbers are skipped.
pub fn decode<M: Message + Default>(buf: &[u8]) -> Result<M, WireError> {
    Ok(M::decode(buf)?)
}

/// Serialize a message prefixed with its varint length.
pub fn encode_length_delimited<M: Message>(msg: &M) -> Vec<u8> {
    msg.encode_length_delimited_to_vec()
}

/// Deserialize a varint length-prefixed message.
pub fn decode_length_delimited<M: Message + Default>(buf: &[u8]) -> Result<M, WireError> {
    Ok(M::decode_length_delimited(buf)?)
}

/// Resolve a raw enum field value, rejecting values outside the schema.
pub fn enum_value<E>(enum_name: &'static str, value: i32) -> Result<E, WireError>
where
    E: TryFrom<i32>,
{
    E::try_from(value).map_err(|_| WireError::UnknownEnumValue { enum_name, value })
}
