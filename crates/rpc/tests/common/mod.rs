#![allow(dead_code)]

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use cqrpc_rpc::{MemTransport, MethodBinding, Outcome, Server, Status};

pub fn wait_until(what: &str, cond: impl Fn() -> bool) {
	let deadline = Instant::now() + Duration::from_secs(5);
	while !cond() {
		assert!(Instant::now() < deadline, "timed out waiting for {what}");
		thread::sleep(Duration::from_millis(1));
	}
}

pub fn echo(transport: &Arc<MemTransport>) -> MethodBinding {
	MethodBinding::inline("Echo", transport.clone(), |req: &Bytes| Outcome::Ok(req.clone()))
}

pub fn fail(transport: &Arc<MemTransport>) -> MethodBinding {
	MethodBinding::inline("Fail", transport.clone(), |_: &Bytes| Outcome::Failure(Status::invalid_argument("always fails")))
}

pub fn echo_server(transport: &Arc<MemTransport>, workers: usize) -> Server {
	Server::builder()
		.workers(workers)
		.bind(echo(transport))
		.bind(fail(transport))
		.transport(transport.clone())
		.start()
		.expect("server starts")
}
