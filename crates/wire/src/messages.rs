//! Demo service messages and their payload codec.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Method name of the greeting call.
pub const SAY_HELLO: &str = "SayHello";
/// Method name of the health probe.
pub const HEALTH_CHECK: &str = "HealthCheck";
/// Method name of the metadata listing.
pub const GET_META_DATA: &str = "GetMetaData";

/// `SayHello` request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloRequest {
	/// Who to greet.
	pub name: String,
}

/// `SayHello` response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloReply {
	/// The greeting.
	pub message: String,
}

/// `HealthCheck` request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckRequest {
	/// Service being probed.
	pub service: String,
}

/// `HealthCheck` response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckReply {
	/// Human-readable status line.
	pub status: String,
}

/// `GetMetaData` request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaRequest {
	/// Entry key.
	pub key: String,
	/// Entry value prefix.
	pub value: String,
}

/// `GetMetaData` response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaReply {
	/// Rendered entries.
	pub data: Vec<String>,
}

/// Encodes a message into a call payload.
///
/// # Errors
///
/// Fails only if `postcard` rejects the value.
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>> {
	Ok(postcard::to_allocvec(message)?)
}

/// Decodes a call payload.
///
/// # Errors
///
/// Fails if `bytes` is not a valid encoding of `T`.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
	Ok(postcard::from_bytes(bytes)?)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn truncated_payload_fails_to_decode() {
		let bytes = encode(&MetaRequest {
			key: "k".into(),
			value: "v".into(),
		})
		.unwrap();
		assert!(decode::<MetaRequest>(&bytes[..bytes.len() - 1]).is_err());
	}

	#[test]
	fn empty_payload_is_not_a_hello() {
		assert!(decode::<HelloRequest>(&[]).is_err());
	}
}
