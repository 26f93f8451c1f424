//! Boundary between the engine and the layer that owns connections.
//!
//! A transport receives registrations ("notify me through this sink, with this
//! tag, when a call for method M arrives"), fills the registered [`CallSlot`]
//! when a call is matched, and pushes the readiness event. Each matched call
//! carries a [`Responder`] through which the engine later submits the outcome.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::queue::CompletionSink;
use crate::status::{Outcome, Status};
use crate::tag::{CompletionEvent, Tag};

mod acceptor;
mod mem;

pub use acceptor::{Acceptor, AcceptorShutdown, Offer};
pub use mem::{MemTransport, PendingCall};

/// Per-call metadata supplied by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
	method: Arc<str>,
	peer: Option<String>,
}

impl CallContext {
	/// Context for a call to `method` with no peer information.
	pub fn new(method: impl Into<Arc<str>>) -> Self {
		Self {
			method: method.into(),
			peer: None,
		}
	}

	/// Attaches the remote peer address.
	#[must_use]
	pub fn with_peer(mut self, peer: impl Into<String>) -> Self {
		self.peer = Some(peer.into());
		self
	}

	/// Method name the call targets.
	pub fn method(&self) -> &str {
		&self.method
	}

	/// Shared method name.
	pub fn method_arc(&self) -> &Arc<str> {
		&self.method
	}

	/// Remote peer address, if the transport knows it.
	pub fn peer(&self) -> Option<&str> {
		self.peer.as_deref()
	}
}

/// Obligation to report exactly one completion event for a tag.
///
/// Dropping a `Completion` without calling [`complete`](Self::complete)
/// reports `ok == false`, so the engine always gets its event.
pub struct Completion {
	tag: Tag,
	sink: Option<CompletionSink>,
}

impl fmt::Debug for Completion {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Completion").field("tag", &self.tag).field("pending", &self.sink.is_some()).finish()
	}
}

impl Completion {
	/// Binds a tag to the sink its event must be pushed into.
	#[must_use]
	pub fn new(tag: Tag, sink: CompletionSink) -> Self {
		Self { tag, sink: Some(sink) }
	}

	/// Tag the event will carry.
	pub fn tag(&self) -> Tag {
		self.tag
	}

	/// Pushes the completion event.
	pub fn complete(mut self, ok: bool) {
		self.push(ok);
	}

	fn push(&mut self, ok: bool) {
		let Some(sink) = self.sink.take() else {
			return;
		};
		let event = CompletionEvent { tag: self.tag, ok };
		if let Err(err) = sink.push(event) {
			tracing::debug!(tag = %self.tag, ok, error = %err, "rpc.completion.dropped");
		}
	}
}

impl Drop for Completion {
	fn drop(&mut self) {
		self.push(false);
	}
}

/// Per-call response path supplied by the transport.
pub trait Responder: Send + 'static {
	/// Submits the outcome of a call that was matched to a Call Record.
	///
	/// Implementations report through `completion` once the response has been
	/// flushed (or has definitively failed to flush).
	fn finish(self: Box<Self>, outcome: Outcome, completion: Completion);

	/// Answers a call that never reached a Call Record.
	fn reject(self: Box<Self>, status: Status);
}

/// A call accepted by the transport, waiting for its Call Record.
pub struct IncomingCall {
	/// Call metadata.
	pub context: CallContext,
	/// Opaque request payload.
	pub request: Bytes,
	/// Response path.
	pub responder: Box<dyn Responder>,
}

impl IncomingCall {
	/// Bundles a call.
	pub fn new(context: CallContext, request: impl Into<Bytes>, responder: Box<dyn Responder>) -> Self {
		Self {
			context,
			request: request.into(),
			responder,
		}
	}
}

impl fmt::Debug for IncomingCall {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("IncomingCall")
			.field("context", &self.context)
			.field("request_len", &self.request.len())
			.field("responder", &"<dyn Responder>")
			.finish()
	}
}

/// Request slot owned by one Call Record and filled by the transport.
#[derive(Clone, Default)]
pub struct CallSlot {
	inner: Arc<Mutex<Option<IncomingCall>>>,
}

impl fmt::Debug for CallSlot {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("CallSlot").field("filled", &self.is_filled()).finish()
	}
}

impl CallSlot {
	/// Creates an empty slot.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Stores a matched call, returning any call the slot already held.
	pub fn fill(&self, call: IncomingCall) -> Option<IncomingCall> {
		self.inner.lock().replace(call)
	}

	/// Removes the stored call.
	pub fn take(&self) -> Option<IncomingCall> {
		self.inner.lock().take()
	}

	/// Returns `true` while a call is stored.
	pub fn is_filled(&self) -> bool {
		self.inner.lock().is_some()
	}
}

/// Registration and shutdown primitives a transport exposes to the engine.
pub trait Transport: Send + Sync + 'static {
	/// Arms `tag`: when a call for `method` arrives, fill `slot` and push an
	/// `ok == true` event for `tag` into `sink`. If the call can never arrive
	/// (shutdown), push `ok == false` instead.
	fn request_call(&self, method: &str, slot: CallSlot, sink: CompletionSink, tag: Tag);

	/// Stops accepting calls and fails every outstanding registration.
	///
	/// Must be idempotent.
	fn shutdown(&self);
}

/// Delivers a matched call into its slot and signals the record.
pub(crate) fn deliver(slot: &CallSlot, call: IncomingCall, completion: Completion) {
	if let Some(stale) = slot.fill(call) {
		tracing::warn!(tag = %completion.tag(), "rpc.transport.slot_overwritten");
		stale.responder.reject(Status::internal("request slot reused"));
	}
	completion.complete(true);
}
