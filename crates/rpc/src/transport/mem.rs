use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use super::{Acceptor, CallContext, CallSlot, Completion, IncomingCall, Offer, Responder, Transport};
use crate::queue::CompletionSink;
use crate::status::{Outcome, Status, StatusCode};
use crate::tag::Tag;

struct MemShared {
	acceptor: Acceptor,
	manual_flush: bool,
	/// Responses delivered to their caller whose completion is being held back.
	held: Mutex<Vec<(Completion, bool)>>,
	next_peer: AtomicU64,
}

/// In-process transport: calls are plain method invocations, responses come
/// back over a oneshot channel.
///
/// In manual-flush mode a delivered response's completion event is held until
/// [`flush`](Self::flush) (or shutdown), which keeps its Call Record in
/// FINISHING for as long as a test needs.
pub struct MemTransport {
	shared: Arc<MemShared>,
}

impl std::fmt::Debug for MemTransport {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("MemTransport")
			.field("acceptor", &self.shared.acceptor)
			.field("manual_flush", &self.shared.manual_flush)
			.finish()
	}
}

/// Caller side of one in-process call.
#[derive(Debug)]
pub struct PendingCall {
	offer: Offer,
	rx: oneshot::Receiver<Outcome>,
}

impl PendingCall {
	/// How the transport routed the call.
	pub fn offer(&self) -> Offer {
		self.offer
	}

	/// Waits for the call's outcome.
	pub async fn outcome(self) -> Outcome {
		self.rx.await.unwrap_or_else(|_| dropped())
	}

	/// Blocking variant of [`outcome`](Self::outcome); must not run inside an async context.
	pub fn blocking_outcome(self) -> Outcome {
		self.rx.blocking_recv().unwrap_or_else(|_| dropped())
	}
}

fn dropped() -> Outcome {
	Outcome::failure(StatusCode::Cancelled, "call dropped without a response")
}

struct MemResponder {
	tx: oneshot::Sender<Outcome>,
	shared: Arc<MemShared>,
}

impl Responder for MemResponder {
	fn finish(self: Box<Self>, outcome: Outcome, completion: Completion) {
		let delivered = self.tx.send(outcome).is_ok();
		if self.shared.manual_flush {
			// Checked under the held lock so shutdown's flush cannot miss this entry.
			let mut held = self.shared.held.lock();
			if !self.shared.acceptor.is_shut_down() {
				held.push((completion, delivered));
				return;
			}
		}
		completion.complete(delivered);
	}

	fn reject(self: Box<Self>, status: Status) {
		let _ = self.tx.send(Outcome::Failure(status));
	}
}

impl MemTransport {
	/// Transport that reports every response as flushed immediately.
	#[must_use]
	pub fn new() -> Arc<Self> {
		Self::build(false)
	}

	/// Transport that holds completion events until [`flush`](Self::flush).
	#[must_use]
	pub fn with_manual_flush() -> Arc<Self> {
		Self::build(true)
	}

	fn build(manual_flush: bool) -> Arc<Self> {
		Arc::new(Self {
			shared: Arc::new(MemShared {
				acceptor: Acceptor::new(),
				manual_flush,
				held: Mutex::new(Vec::new()),
				next_peer: AtomicU64::new(1),
			}),
		})
	}

	/// Issues a call to `method`.
	pub fn call(&self, method: &str, request: impl Into<Bytes>) -> PendingCall {
		let peer = self.shared.next_peer.fetch_add(1, Ordering::Relaxed);
		self.call_with(CallContext::new(method).with_peer(format!("mem:{peer}")), request)
	}

	/// Issues a call with an explicit context.
	pub fn call_with(&self, context: CallContext, request: impl Into<Bytes>) -> PendingCall {
		let (tx, rx) = oneshot::channel();
		let responder = Box::new(MemResponder {
			tx,
			shared: Arc::clone(&self.shared),
		});
		let offer = self.shared.acceptor.offer(IncomingCall::new(context, request, responder));
		PendingCall { offer, rx }
	}

	/// Releases every held completion event. Returns how many were released.
	pub fn flush(&self) -> usize {
		let held = std::mem::take(&mut *self.shared.held.lock());
		let count = held.len();
		for (completion, delivered) in held {
			completion.complete(delivered);
		}
		count
	}

	/// Completion events currently held back.
	pub fn held(&self) -> usize {
		self.shared.held.lock().len()
	}

	/// The matching core.
	pub fn acceptor(&self) -> &Acceptor {
		&self.shared.acceptor
	}
}

impl Transport for MemTransport {
	fn request_call(&self, method: &str, slot: CallSlot, sink: CompletionSink, tag: Tag) {
		self.shared.acceptor.register(method, slot, sink, tag);
	}

	fn shutdown(&self) {
		self.shared.acceptor.shutdown();
		let flushed = self.flush();
		if flushed > 0 {
			tracing::debug!(flushed, "rpc.mem.shutdown_flush");
		}
	}
}
