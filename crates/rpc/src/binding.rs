//! Method bindings: one registration hook and one handler per RPC method.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use cqrpc_worker::OffloadPool;
use parking_lot::Mutex;

use crate::queue::CompletionSink;
use crate::status::{Outcome, StatusCode};
use crate::tag::Tag;
use crate::transport::{CallSlot, Completion, Transport};

/// Arms a Call Record with the transport.
pub type RegisterFn = Arc<dyn Fn(CallSlot, CompletionSink, Tag) + Send + Sync>;

/// Handler that computes the outcome on the dispatch worker.
pub type InlineFn = Arc<dyn Fn(&Bytes) -> Outcome + Send + Sync>;

/// Handler that returns at once and answers later through a [`Reply`].
pub type DeferredFn = Arc<dyn Fn(Bytes, Reply) + Send + Sync>;

/// Business logic of one method.
#[derive(Clone)]
pub enum Handler {
	/// Runs synchronously between accept and response submission.
	Inline(InlineFn),
	/// Parks the record in PROCESSING until the [`Reply`] is sent.
	Deferred(DeferredFn),
}

impl fmt::Debug for Handler {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Inline(_) => f.write_str("Handler::Inline"),
			Self::Deferred(_) => f.write_str("Handler::Deferred"),
		}
	}
}

/// Immutable pairing of a method's registration hook and its handler.
pub struct MethodBinding {
	name: Arc<str>,
	register: RegisterFn,
	handler: Handler,
}

impl fmt::Debug for MethodBinding {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("MethodBinding")
			.field("name", &self.name)
			.field("handler", &self.handler)
			.finish_non_exhaustive()
	}
}

impl MethodBinding {
	/// Binds an arbitrary registration hook to a handler.
	pub fn new(name: impl Into<Arc<str>>, register: impl Fn(CallSlot, CompletionSink, Tag) + Send + Sync + 'static, handler: Handler) -> Self {
		Self {
			name: name.into(),
			register: Arc::new(register),
			handler,
		}
	}

	/// Binds `handler` to `name` on `transport`, running it inline.
	pub fn inline(name: impl Into<Arc<str>>, transport: Arc<dyn Transport>, handler: impl Fn(&Bytes) -> Outcome + Send + Sync + 'static) -> Self {
		let name = name.into();
		Self::new(Arc::clone(&name), transport_hook(name, transport), Handler::Inline(Arc::new(handler)))
	}

	/// Binds a deferred handler to `name` on `transport`.
	pub fn deferred(name: impl Into<Arc<str>>, transport: Arc<dyn Transport>, handler: impl Fn(Bytes, Reply) + Send + Sync + 'static) -> Self {
		let name = name.into();
		Self::new(Arc::clone(&name), transport_hook(name, transport), Handler::Deferred(Arc::new(handler)))
	}

	/// Binds a synchronous handler that runs on `pool` instead of a dispatch worker.
	pub fn offloaded(
		name: impl Into<Arc<str>>,
		transport: Arc<dyn Transport>,
		pool: &OffloadPool,
		handler: impl Fn(&Bytes) -> Outcome + Send + Sync + 'static,
	) -> Self {
		let pool = pool.clone();
		let handler = Arc::new(handler);
		Self::deferred(name, transport, move |request, reply| {
			let handler = Arc::clone(&handler);
			pool.execute(
				move || handler(&request),
				move |result| {
					reply.send(result.unwrap_or_else(|msg| Outcome::failure(StatusCode::Internal, format!("handler panicked: {msg}"))));
				},
			);
		})
	}

	/// Method name.
	pub fn name(&self) -> &str {
		&self.name
	}

	pub(crate) fn name_arc(&self) -> &Arc<str> {
		&self.name
	}

	/// Handler of this method.
	pub fn handler(&self) -> &Handler {
		&self.handler
	}

	/// Invokes the registration hook.
	pub(crate) fn register(&self, slot: CallSlot, sink: CompletionSink, tag: Tag) {
		(self.register)(slot, sink, tag);
	}
}

fn transport_hook(name: Arc<str>, transport: Arc<dyn Transport>) -> impl Fn(CallSlot, CompletionSink, Tag) + Send + Sync + 'static {
	move |slot, sink, tag| transport.request_call(&name, slot, sink, tag)
}

/// Shared cell a deferred handler's outcome is parked in until dispatch picks it up.
pub(crate) type OutcomeCell = Arc<Mutex<Option<Outcome>>>;

/// Answer channel handed to a deferred handler.
///
/// Sending stores the outcome and pushes a readiness event for the record back
/// into the completion queue. Dropping an unsent `Reply` answers with
/// `INTERNAL`, so a record never stays in PROCESSING forever.
pub struct Reply {
	cell: OutcomeCell,
	completion: Option<Completion>,
}

impl fmt::Debug for Reply {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Reply").field("completion", &self.completion).finish()
	}
}

impl Reply {
	pub(crate) fn new(cell: OutcomeCell, completion: Completion) -> Self {
		Self {
			cell,
			completion: Some(completion),
		}
	}

	/// Tag of the record this reply answers.
	pub fn tag(&self) -> Option<Tag> {
		self.completion.as_ref().map(Completion::tag)
	}

	/// Answers the call.
	pub fn send(mut self, outcome: Outcome) {
		self.deliver(outcome);
	}

	fn deliver(&mut self, outcome: Outcome) {
		let Some(completion) = self.completion.take() else {
			return;
		};
		*self.cell.lock() = Some(outcome);
		completion.complete(true);
	}
}

impl Drop for Reply {
	fn drop(&mut self) {
		if self.completion.is_some() {
			self.deliver(Outcome::failure(StatusCode::Internal, "handler dropped reply"));
		}
	}
}
