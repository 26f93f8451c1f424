//! Tag-driven dispatch: the loop every worker runs.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use cqrpc_worker::{WorkerContext, panic_message};
use tracing::{debug, trace, warn};

use crate::binding::{Handler, MethodBinding};
use crate::call::{CallRecord, Step};
use crate::queue::CompletionQueue;
use crate::registry::ServiceRegistry;
use crate::stats::{Counters, ServerStats, bump};
use crate::status::{Outcome, StatusCode};
use crate::table::{CallSnapshot, CallTable};
use crate::tag::{CompletionEvent, Tag};
use crate::transport::{CallContext, CallSlot, Completion};

/// Shared state of a running server, read by every dispatch worker.
pub(crate) struct Engine {
	registry: ServiceRegistry,
	table: CallTable,
	queue: CompletionQueue,
	shutting_down: AtomicBool,
	counters: Counters,
}

impl Engine {
	pub(crate) fn new(registry: ServiceRegistry) -> Self {
		Self {
			registry,
			table: CallTable::new(),
			queue: CompletionQueue::new(),
			shutting_down: AtomicBool::new(false),
			counters: Counters::default(),
		}
	}

	/// Arms one record per bound method.
	pub(crate) fn seed(&self) {
		for binding in self.registry.iter() {
			self.arm(binding);
		}
	}

	/// Stores a fresh ARMED record, then registers it with the transport.
	///
	/// The record is in the table before the hook runs, so a completion
	/// produced during registration always resolves.
	fn arm(&self, binding: &Arc<MethodBinding>) -> Tag {
		let slot = CallSlot::new();
		let tag = self.table.insert(CallRecord::new(Arc::clone(binding), slot.clone()));
		bump(&self.counters.armed);
		trace!(%tag, method = binding.name(), "rpc.call.arm");
		binding.register(slot, self.queue.sink(), tag);
		tag
	}

	/// Worker loop: consume events until the queue is closed and drained.
	pub(crate) fn run_worker(&self, ctx: &WorkerContext) {
		trace!(worker = ctx.name(), "rpc.worker.start");
		while let Some(event) = self.queue.pop() {
			ctx.record_event();
			self.dispatch(event);
		}
		trace!(worker = ctx.name(), "rpc.worker.stop");
	}

	/// Advances the record `event` names by exactly one step.
	///
	/// # Panics
	///
	/// Panics if the tag does not resolve to a resident record. That can only
	/// happen when a transport or handler reports a completion twice.
	pub(crate) fn dispatch(&self, event: CompletionEvent) {
		let tag = event.tag;
		let mut record = match self.table.checkout(tag) {
			Ok(record) => record,
			Err(violation) => panic!("unresolvable completion event (ok={}): {violation}", event.ok),
		};
		match record.advance(event.ok) {
			Step::Discard => {
				debug!(%tag, method = record.binding().name(), "rpc.call.discard");
				self.remove(tag);
				bump(&self.counters.discarded);
			}
			Step::Accept { context, request } => {
				bump(&self.counters.accepted);
				let binding = Arc::clone(record.binding());
				trace!(%tag, method = binding.name(), peer = context.peer(), "rpc.call.accept");
				if let Err(violation) = self.table.mark(tag, record.state()) {
					panic!("call table corrupted: {violation}");
				}
				if !self.is_shutting_down() {
					self.arm(&binding);
					bump(&self.counters.replacements);
				}
				self.run_handler(tag, record, &binding, &context, request);
			}
			Step::Submit(outcome) => self.submit(tag, record, outcome),
			Step::Destroy { flushed } => {
				self.remove(tag);
				bump(&self.counters.completed);
				if flushed {
					debug!(%tag, method = record.binding().name(), "rpc.call.destroy");
				} else {
					bump(&self.counters.transport_failures);
					warn!(%tag, method = record.binding().name(), "rpc.call.undelivered");
				}
			}
		}
	}

	fn run_handler(&self, tag: Tag, mut record: CallRecord, binding: &MethodBinding, context: &CallContext, request: Bytes) {
		match binding.handler() {
			Handler::Inline(handler) => {
				let outcome = catch_unwind(AssertUnwindSafe(|| handler(&request))).unwrap_or_else(|payload| {
					let msg = panic_message(&*payload).unwrap_or_else(|| "opaque panic payload".to_owned());
					self.handler_panicked(tag, context, &msg);
					Outcome::failure(StatusCode::Internal, format!("handler panicked: {msg}"))
				});
				self.submit(tag, record, outcome);
			}
			Handler::Deferred(handler) => {
				let reply = record.defer(Completion::new(tag, self.queue.sink()));
				self.checkin(tag, record);
				// A panic drops the reply, which answers INTERNAL on its own.
				if let Err(payload) = catch_unwind(AssertUnwindSafe(|| handler(request, reply))) {
					let msg = panic_message(&*payload).unwrap_or_else(|| "opaque panic payload".to_owned());
					self.handler_panicked(tag, context, &msg);
				}
			}
		}
	}

	fn handler_panicked(&self, tag: Tag, context: &CallContext, msg: &str) {
		bump(&self.counters.panics);
		warn!(%tag, method = context.method(), panic = msg, "rpc.handler.panic");
	}

	/// Moves the record to FINISHING and hands the outcome to the transport.
	///
	/// The record is back in the table before the responder runs, so the
	/// flush confirmation can be dispatched by any worker at any time.
	fn submit(&self, tag: Tag, mut record: CallRecord, outcome: Outcome) {
		if !outcome.is_ok() {
			bump(&self.counters.failures);
		}
		trace!(%tag, method = record.binding().name(), code = %outcome.code(), "rpc.call.finish");
		let responder = record.finish();
		self.checkin(tag, record);
		responder.finish(outcome, Completion::new(tag, self.queue.sink()));
	}

	fn checkin(&self, tag: Tag, record: CallRecord) {
		if let Err(violation) = self.table.checkin(tag, record) {
			panic!("call table corrupted: {violation}");
		}
	}

	fn remove(&self, tag: Tag) {
		if let Err(violation) = self.table.remove(tag) {
			panic!("call table corrupted: {violation}");
		}
	}

	pub(crate) fn registry(&self) -> &ServiceRegistry {
		&self.registry
	}

	pub(crate) fn queue(&self) -> &CompletionQueue {
		&self.queue
	}

	pub(crate) fn is_shutting_down(&self) -> bool {
		self.shutting_down.load(Ordering::Acquire)
	}

	/// Flags shutdown; returns `false` if it was already flagged.
	pub(crate) fn begin_shutdown(&self) -> bool {
		!self.shutting_down.swap(true, Ordering::AcqRel)
	}

	pub(crate) fn stats(&self) -> ServerStats {
		self.counters.snapshot()
	}

	pub(crate) fn calls(&self) -> Vec<CallSnapshot> {
		self.table.snapshot()
	}

	pub(crate) fn armed(&self, method: &str) -> usize {
		self.table.armed_count(method)
	}

	pub(crate) fn len(&self) -> usize {
		self.table.len()
	}

	pub(crate) fn drain(&self) -> Vec<CallSnapshot> {
		self.table.drain()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::call::CallState;
	use crate::transport::MemTransport;

	fn engine(transport: &Arc<MemTransport>) -> Engine {
		let mut registry = ServiceRegistry::new();
		registry
			.bind(MethodBinding::inline("Echo", transport.clone(), |req: &Bytes| Outcome::Ok(req.clone())))
			.unwrap();
		Engine::new(registry)
	}

	fn pump(engine: &Engine) -> usize {
		let mut handled = 0;
		while let Some(event) = engine.queue().try_pop() {
			engine.dispatch(event);
			handled += 1;
		}
		handled
	}

	#[test]
	fn accept_arms_replacement_before_handler_finishes() {
		let transport = MemTransport::new();
		let engine = engine(&transport);
		engine.seed();
		assert_eq!(engine.armed("Echo"), 1);

		let pending = transport.call("Echo", "ping");
		pump(&engine);

		assert_eq!(pending.blocking_outcome(), Outcome::ok("ping"));
		assert_eq!(engine.len(), 1);
		assert_eq!(engine.armed("Echo"), 1);
		let stats = engine.stats();
		assert_eq!((stats.armed, stats.replacements, stats.accepted, stats.completed), (2, 1, 1, 1));
	}

	#[test]
	fn no_replacement_once_shutting_down() {
		let transport = MemTransport::new();
		let engine = engine(&transport);
		engine.seed();
		let pending = transport.call("Echo", "x");
		assert!(engine.begin_shutdown());
		assert!(!engine.begin_shutdown());
		pump(&engine);

		assert_eq!(pending.blocking_outcome(), Outcome::ok("x"));
		assert_eq!(engine.len(), 0);
		assert_eq!(engine.stats().replacements, 0);
	}

	#[test]
	fn manual_flush_leaves_record_finishing() {
		let transport = MemTransport::with_manual_flush();
		let engine = engine(&transport);
		engine.seed();
		let _pending = transport.call("Echo", "x");
		pump(&engine);

		let finishing: Vec<_> = engine.calls().into_iter().filter(|call| call.state == CallState::Finishing).collect();
		assert_eq!(finishing.len(), 1);
		assert_eq!(transport.flush(), 1);
		pump(&engine);
		assert_eq!(engine.len(), 1, "only the replacement remains");
	}

	#[test]
	#[should_panic(expected = "unresolvable completion event")]
	fn duplicate_event_is_fatal() {
		let transport = MemTransport::new();
		let engine = engine(&transport);
		engine.dispatch(CompletionEvent::ok(Tag::new(7, 1)));
	}
}
