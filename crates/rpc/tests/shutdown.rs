mod common;

use common::{echo, echo_server, wait_until};
use cqrpc_rpc::{CallState, MemTransport, Offer, Outcome, Server, StatusCode};

#[test]
fn shutdown_fails_armed_and_flushes_finishing_records() {
	let transport = MemTransport::with_manual_flush();
	let server = Server::builder().workers(1).bind(echo(&transport)).transport(transport.clone()).start().unwrap();

	let call = transport.call("Echo", "x");
	assert_eq!(call.blocking_outcome(), Outcome::ok("x"));
	wait_until("held completion", || transport.held() == 1);

	let mut states: Vec<_> = server.calls().into_iter().map(|call| call.state).collect();
	states.sort_by_key(|state| state.as_str());
	assert_eq!(states, [CallState::Armed, CallState::Finishing]);

	let report = server.shutdown();
	assert!(report.reclaimed.is_empty(), "{:?}", report.reclaimed);
	assert_eq!(report.stats.discarded, 1);
	assert_eq!(report.stats.completed, 1);
	assert_eq!(report.stats.transport_failures, 0);
	assert!(server.calls().is_empty());
}

#[test]
fn shutdown_is_idempotent_and_rejects_new_calls() {
	let transport = MemTransport::new();
	let server = echo_server(&transport, 2);
	assert!(!server.is_shutting_down());

	let first = server.shutdown();
	let second = server.shutdown();
	assert_eq!(first, second);
	assert!(server.is_shutting_down());

	let call = transport.call("Echo", "late");
	assert_eq!(call.offer(), Offer::Rejected);
	assert_eq!(call.blocking_outcome().code(), StatusCode::Unavailable);
}

#[test]
fn shutdown_joins_every_worker() {
	let transport = MemTransport::new();
	let server = echo_server(&transport, 3);
	wait_until("workers registered", || server.workers().len() == 3);
	let report = server.shutdown();
	assert!(report.worker_panics.is_empty());
	assert_eq!(report.stats.discarded, 2);
	assert!(server.workers().iter().all(|worker| worker.state != cqrpc_worker::WorkerState::Running));
}

#[test]
fn dropping_the_server_shuts_it_down() {
	let transport = MemTransport::new();
	drop(echo_server(&transport, 1));
	assert!(transport.acceptor().is_shut_down());
}
