use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{CallSlot, Completion, IncomingCall, deliver};
use crate::queue::CompletionSink;
use crate::status::Status;
use crate::tag::Tag;

struct Registration {
	slot: CallSlot,
	completion: Completion,
}

#[derive(Default)]
struct AcceptorState {
	/// Armed registrations per method. A key exists for every method that has
	/// ever registered, which is how unknown methods are told apart.
	armed: HashMap<Arc<str>, VecDeque<Registration>>,
	/// Calls that arrived while their method had nothing armed.
	backlog: HashMap<Arc<str>, VecDeque<IncomingCall>>,
	shut_down: bool,
}

/// What happened to an offered call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
	/// Matched to the armed record with this tag.
	Matched(Tag),
	/// Parked until the method's next registration.
	Queued,
	/// Answered immediately (unknown method or shutting down).
	Rejected,
}

/// Counts from the first [`Acceptor::shutdown`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AcceptorShutdown {
	/// Registrations failed with `ok == false`.
	pub cancelled: usize,
	/// Backlogged calls answered with `UNAVAILABLE`.
	pub rejected: usize,
}

/// Matching core shared by transports.
///
/// Pairs inbound calls with armed registrations, per method, first come first
/// served on both sides.
#[derive(Default)]
pub struct Acceptor {
	state: Mutex<AcceptorState>,
}

impl std::fmt::Debug for Acceptor {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let state = self.state.lock();
		f.debug_struct("Acceptor")
			.field("methods", &state.armed.len())
			.field("shut_down", &state.shut_down)
			.finish()
	}
}

impl Acceptor {
	/// Creates an empty acceptor.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Arms one registration, or matches it at once against a backlogged call.
	pub fn register(&self, method: &str, slot: CallSlot, sink: CompletionSink, tag: Tag) {
		let completion = Completion::new(tag, sink);
		let mut state = self.state.lock();
		if state.shut_down {
			drop(state);
			tracing::debug!(%tag, method, "rpc.acceptor.register_after_shutdown");
			completion.complete(false);
			return;
		}

		if let Some(call) = state.backlog.get_mut(method).and_then(VecDeque::pop_front) {
			drop(state);
			tracing::trace!(%tag, method, "rpc.acceptor.matched_backlog");
			deliver(&slot, call, completion);
			return;
		}

		match state.armed.get_mut(method) {
			Some(queue) => queue.push_back(Registration { slot, completion }),
			None => {
				state.armed.insert(Arc::from(method), VecDeque::from([Registration { slot, completion }]));
			}
		}
	}

	/// Offers an inbound call.
	pub fn offer(&self, call: IncomingCall) -> Offer {
		let mut state = self.state.lock();
		if state.shut_down {
			drop(state);
			call.responder.reject(Status::unavailable("server is shutting down"));
			return Offer::Rejected;
		}

		let method = Arc::clone(call.context.method_arc());
		let Some(queue) = state.armed.get_mut(&method) else {
			drop(state);
			tracing::debug!(method = %method, "rpc.acceptor.unknown_method");
			call.responder.reject(Status::unimplemented(format!("unknown method `{method}`")));
			return Offer::Rejected;
		};

		match queue.pop_front() {
			Some(registration) => {
				drop(state);
				let tag = registration.completion.tag();
				deliver(&registration.slot, call, registration.completion);
				Offer::Matched(tag)
			}
			None => {
				state.backlog.entry(method).or_default().push_back(call);
				Offer::Queued
			}
		}
	}

	/// Stops accepting, failing armed registrations and backlogged calls.
	///
	/// Idempotent; later calls report zero counts.
	pub fn shutdown(&self) -> AcceptorShutdown {
		let (registrations, calls) = {
			let mut state = self.state.lock();
			state.shut_down = true;
			let registrations: Vec<_> = state.armed.values_mut().flat_map(std::mem::take).collect();
			let calls: Vec<_> = state.backlog.values_mut().flat_map(std::mem::take).collect();
			(registrations, calls)
		};

		let report = AcceptorShutdown {
			cancelled: registrations.len(),
			rejected: calls.len(),
		};
		for registration in registrations {
			registration.completion.complete(false);
		}
		for call in calls {
			call.responder.reject(Status::unavailable("server is shutting down"));
		}
		if report != AcceptorShutdown::default() {
			tracing::debug!(cancelled = report.cancelled, rejected = report.rejected, "rpc.acceptor.shutdown");
		}
		report
	}

	/// Returns `true` once [`shutdown`](Self::shutdown) has run.
	pub fn is_shut_down(&self) -> bool {
		self.state.lock().shut_down
	}

	/// Registrations currently armed for `method`.
	pub fn armed(&self, method: &str) -> usize {
		self.state.lock().armed.get(method).map_or(0, VecDeque::len)
	}

	/// Calls waiting for `method` to re-arm.
	pub fn backlog(&self, method: &str) -> usize {
		self.state.lock().backlog.get(method).map_or(0, VecDeque::len)
	}
}

#[cfg(test)]
mod tests {
	use tokio::sync::oneshot;

	use super::*;
	use crate::queue::CompletionQueue;
	use crate::status::{Outcome, StatusCode};
	use crate::tag::CompletionEvent;
	use crate::transport::{CallContext, Responder};

	struct Capture(oneshot::Sender<Result<Outcome, Status>>);

	impl Responder for Capture {
		fn finish(self: Box<Self>, outcome: Outcome, completion: Completion) {
			let _ = self.0.send(Ok(outcome));
			completion.complete(true);
		}

		fn reject(self: Box<Self>, status: Status) {
			let _ = self.0.send(Err(status));
		}
	}

	fn call(method: &str) -> (IncomingCall, oneshot::Receiver<Result<Outcome, Status>>) {
		let (tx, rx) = oneshot::channel();
		(IncomingCall::new(CallContext::new(method), "req", Box::new(Capture(tx))), rx)
	}

	#[test]
	fn armed_registration_matches_offer() {
		let queue = CompletionQueue::new();
		let acceptor = Acceptor::new();
		let slot = CallSlot::new();
		let tag = Tag::new(0, 1);
		acceptor.register("Echo", slot.clone(), queue.sink(), tag);
		assert_eq!(acceptor.armed("Echo"), 1);

		let (incoming, _rx) = call("Echo");
		assert_eq!(acceptor.offer(incoming), Offer::Matched(tag));
		assert!(slot.is_filled());
		assert_eq!(queue.try_pop(), Some(CompletionEvent::ok(tag)));
		assert_eq!(acceptor.armed("Echo"), 0);
	}

	#[test]
	fn backlogged_call_matches_next_registration() {
		let queue = CompletionQueue::new();
		let acceptor = Acceptor::new();
		let first = Tag::new(0, 1);
		acceptor.register("Echo", CallSlot::new(), queue.sink(), first);
		let (a, _ra) = call("Echo");
		let (b, _rb) = call("Echo");
		assert_eq!(acceptor.offer(a), Offer::Matched(first));
		assert_eq!(acceptor.offer(b), Offer::Queued);
		assert_eq!(acceptor.backlog("Echo"), 1);

		let slot = CallSlot::new();
		let second = Tag::new(1, 2);
		acceptor.register("Echo", slot.clone(), queue.sink(), second);
		assert!(slot.is_filled());
		assert_eq!(acceptor.backlog("Echo"), 0);
		assert_eq!(queue.try_pop(), Some(CompletionEvent::ok(first)));
		assert_eq!(queue.try_pop(), Some(CompletionEvent::ok(second)));
	}

	#[test]
	fn unknown_method_is_unimplemented() {
		let acceptor = Acceptor::new();
		let (incoming, mut rx) = call("Missing");
		assert_eq!(acceptor.offer(incoming), Offer::Rejected);
		let status = rx.try_recv().expect("rejected synchronously").unwrap_err();
		assert_eq!(status.code, StatusCode::Unimplemented);
	}

	#[test]
	fn shutdown_cancels_registrations_and_backlog_once() {
		let queue = CompletionQueue::new();
		let acceptor = Acceptor::new();
		let tag = Tag::new(0, 1);
		acceptor.register("Echo", CallSlot::new(), queue.sink(), tag);
		acceptor.register("Other", CallSlot::new(), queue.sink(), Tag::new(1, 2));
		let (a, _ra) = call("Other");
		assert!(matches!(acceptor.offer(a), Offer::Matched(_)));
		let (b, mut rb) = call("Other");
		assert_eq!(acceptor.offer(b), Offer::Queued);
		let _ = queue.try_pop();

		let report = acceptor.shutdown();
		assert_eq!(report, AcceptorShutdown { cancelled: 1, rejected: 1 });
		assert_eq!(queue.try_pop(), Some(CompletionEvent::failed(tag)));
		assert_eq!(rb.try_recv().unwrap().unwrap_err().code, StatusCode::Unavailable);

		assert_eq!(acceptor.shutdown(), AcceptorShutdown::default());

		let late = Tag::new(2, 3);
		acceptor.register("Echo", CallSlot::new(), queue.sink(), late);
		assert_eq!(queue.try_pop(), Some(CompletionEvent::failed(late)));
		let (c, mut rc) = call("Echo");
		assert_eq!(acceptor.offer(c), Offer::Rejected);
		assert_eq!(rc.try_recv().unwrap().unwrap_err().code, StatusCode::Unavailable);
	}
}
