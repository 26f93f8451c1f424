//! `TestService`: the three demo methods.

use std::sync::Arc;

use bytes::Bytes;
use cqrpc_rpc::{MethodBinding, Outcome, Status, Transport};
use cqrpc_wire::messages::{
	GET_META_DATA, HEALTH_CHECK, HealthCheckReply, HealthCheckRequest, HelloReply, HelloRequest, MetaReply, MetaRequest, SAY_HELLO,
};
use cqrpc_wire::{decode, encode};
use cqrpc_worker::OffloadPool;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Bindings for every `TestService` method on `transport`.
///
/// `GetMetaData` runs on `pool`; the others run inline.
pub fn bindings(transport: &Arc<dyn Transport>, pool: &OffloadPool) -> Vec<MethodBinding> {
	vec![
		MethodBinding::inline(SAY_HELLO, Arc::clone(transport), say_hello),
		MethodBinding::inline(HEALTH_CHECK, Arc::clone(transport), health_check),
		MethodBinding::offloaded(GET_META_DATA, Arc::clone(transport), pool, get_meta_data),
	]
}

/// `SayHello`: greets `name`.
pub fn say_hello(request: &Bytes) -> Outcome {
	unary(request, |req: HelloRequest| HelloReply {
		message: format!("Hello {}", req.name),
	})
}

/// `HealthCheck`: reports `service` healthy.
pub fn health_check(request: &Bytes) -> Outcome {
	unary(request, |req: HealthCheckRequest| HealthCheckReply {
		status: format!("{} is ok", req.service),
	})
}

/// `GetMetaData`: three numbered renderings of the key/value pair.
pub fn get_meta_data(request: &Bytes) -> Outcome {
	unary(request, |req: MetaRequest| MetaReply {
		data: (1..=3).map(|i| format!("{}: {}{i}", req.key, req.value)).collect(),
	})
}

fn unary<Req, Resp>(request: &Bytes, handler: impl FnOnce(Req) -> Resp) -> Outcome
where
	Req: DeserializeOwned,
	Resp: Serialize,
{
	let req = match decode::<Req>(request) {
		Ok(req) => req,
		Err(err) => return Outcome::Failure(Status::invalid_argument(format!("malformed request: {err}"))),
	};
	match encode(&handler(req)) {
		Ok(payload) => Outcome::ok(payload),
		Err(err) => Outcome::Failure(Status::internal(format!("failed to encode response: {err}"))),
	}
}
