//! Per-call state machine.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::binding::{MethodBinding, OutcomeCell, Reply};
use crate::status::Outcome;
use crate::transport::{CallContext, CallSlot, Completion, Responder};

/// Lifecycle state of a Call Record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallState {
	/// Registered with the transport, waiting for a call.
	Armed,
	/// Accepted; the handler runs (or, for deferred handlers, is pending).
	Processing,
	/// Response submitted; waiting for the flush confirmation.
	Finishing,
}

impl CallState {
	/// Lowercase label used in tracing fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Armed => "armed",
			Self::Processing => "processing",
			Self::Finishing => "finishing",
		}
	}
}

impl fmt::Display for CallState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// What the dispatcher must do after one [`CallRecord::advance`].
#[derive(Debug)]
pub(crate) enum Step {
	/// ARMED record failed by the transport: destroy without replacement.
	Discard,
	/// ARMED record matched a call: arm a replacement, then run the handler.
	Accept { context: CallContext, request: Bytes },
	/// Deferred handler answered: submit this outcome.
	Submit(Outcome),
	/// FINISHING record confirmed: destroy it.
	Destroy { flushed: bool },
}

/// State for one in-flight invocation, from arming to flush confirmation.
///
/// Owned by the call table; only the worker that checked it out touches it.
pub(crate) struct CallRecord {
	state: CallState,
	binding: Arc<MethodBinding>,
	slot: CallSlot,
	responder: Option<Box<dyn Responder>>,
	pending: Option<OutcomeCell>,
}

impl fmt::Debug for CallRecord {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("CallRecord")
			.field("state", &self.state)
			.field("method", &self.binding.name())
			.field("slot", &self.slot)
			.field("has_responder", &self.responder.is_some())
			.finish()
	}
}

impl CallRecord {
	/// New ARMED record for `binding`, reading its call from `slot`.
	pub(crate) fn new(binding: Arc<MethodBinding>, slot: CallSlot) -> Self {
		Self {
			state: CallState::Armed,
			binding,
			slot,
			responder: None,
			pending: None,
		}
	}

	pub(crate) fn state(&self) -> CallState {
		self.state
	}

	pub(crate) fn binding(&self) -> &Arc<MethodBinding> {
		&self.binding
	}

	/// Consumes one completion event.
	///
	/// # Panics
	///
	/// Panics when the event cannot belong to this record: an `ok` accept
	/// with an empty slot, or a PROCESSING event with no parked outcome.
	pub(crate) fn advance(&mut self, ok: bool) -> Step {
		match self.state {
			CallState::Armed if !ok => Step::Discard,
			CallState::Armed => {
				let Some(call) = self.slot.take() else {
					panic!("{} record signalled accept without a filled call slot", self.binding.name());
				};
				self.responder = Some(call.responder);
				self.state = CallState::Processing;
				Step::Accept {
					context: call.context,
					request: call.request,
				}
			}
			CallState::Processing => {
				let outcome = self.pending.as_ref().and_then(|cell| cell.lock().take());
				match outcome {
					Some(outcome) => {
						self.pending = None;
						Step::Submit(outcome)
					}
					None => panic!("{} record received a processing event with no parked outcome", self.binding.name()),
				}
			}
			CallState::Finishing => Step::Destroy { flushed: ok },
		}
	}

	/// Parks the record in PROCESSING and returns the reply for a deferred handler.
	pub(crate) fn defer(&mut self, completion: Completion) -> Reply {
		assert_eq!(self.state, CallState::Processing, "only an accepted record can defer");
		let cell: OutcomeCell = Arc::new(Mutex::new(None));
		self.pending = Some(Arc::clone(&cell));
		Reply::new(cell, completion)
	}

	/// Moves PROCESSING to FINISHING, handing back the responder to submit through.
	pub(crate) fn finish(&mut self) -> Box<dyn Responder> {
		assert_eq!(self.state, CallState::Processing, "only a processing record can finish");
		let Some(responder) = self.responder.take() else {
			panic!("{} record lost its responder before finishing", self.binding.name());
		};
		self.state = CallState::Finishing;
		responder
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::binding::Handler;
	use crate::queue::CompletionQueue;
	use crate::status::{Status, StatusCode};
	use crate::tag::{CompletionEvent, Tag};
	use crate::transport::IncomingCall;

	struct Sink;

	impl Responder for Sink {
		fn finish(self: Box<Self>, _outcome: Outcome, completion: Completion) {
			completion.complete(true);
		}

		fn reject(self: Box<Self>, _status: Status) {}
	}

	fn record() -> (CallRecord, CallSlot) {
		let binding = Arc::new(MethodBinding::new("Echo", |_, _, _| {}, Handler::Inline(Arc::new(|req: &Bytes| Outcome::Ok(req.clone())))));
		let slot = CallSlot::new();
		(CallRecord::new(binding, slot.clone()), slot)
	}

	#[test]
	fn armed_failure_discards() {
		let (mut rec, _slot) = record();
		assert!(matches!(rec.advance(false), Step::Discard));
	}

	#[test]
	fn inline_lifecycle_runs_each_state_once() {
		let (mut rec, slot) = record();
		slot.fill(IncomingCall::new(CallContext::new("Echo"), "x", Box::new(Sink)));

		let Step::Accept { context, request } = rec.advance(true) else {
			panic!("expected accept");
		};
		assert_eq!(context.method(), "Echo");
		assert_eq!(request, Bytes::from_static(b"x"));
		assert_eq!(rec.state(), CallState::Processing);

		let _responder = rec.finish();
		assert_eq!(rec.state(), CallState::Finishing);
		assert!(matches!(rec.advance(false), Step::Destroy { flushed: false }));
	}

	#[test]
	fn deferred_outcome_is_submitted_after_reply() {
		let (mut rec, slot) = record();
		slot.fill(IncomingCall::new(CallContext::new("Echo"), "x", Box::new(Sink)));
		let _ = rec.advance(true);

		let queue = CompletionQueue::new();
		let tag = Tag::new(4, 9);
		let reply = rec.defer(Completion::new(tag, queue.sink()));
		reply.send(Outcome::failure(StatusCode::NotFound, "nope"));
		assert_eq!(queue.try_pop(), Some(CompletionEvent::ok(tag)));

		match rec.advance(true) {
			Step::Submit(outcome) => assert_eq!(outcome.code(), StatusCode::NotFound),
			other => panic!("expected submit, got {other:?}"),
		}
	}

	#[test]
	fn dropped_reply_answers_internal() {
		let (mut rec, slot) = record();
		slot.fill(IncomingCall::new(CallContext::new("Echo"), "x", Box::new(Sink)));
		let _ = rec.advance(true);

		let queue = CompletionQueue::new();
		drop(rec.defer(Completion::new(Tag::new(0, 1), queue.sink())));
		assert!(queue.try_pop().is_some());
		match rec.advance(true) {
			Step::Submit(outcome) => assert_eq!(outcome.code(), StatusCode::Internal),
			other => panic!("expected submit, got {other:?}"),
		}
	}

	#[test]
	#[should_panic(expected = "without a filled call slot")]
	fn accept_without_call_is_fatal() {
		let (mut rec, _slot) = record();
		let _ = rec.advance(true);
	}

	#[test]
	#[should_panic(expected = "no parked outcome")]
	fn processing_event_without_outcome_is_fatal() {
		let (mut rec, slot) = record();
		slot.fill(IncomingCall::new(CallContext::new("Echo"), "x", Box::new(Sink)));
		let _ = rec.advance(true);
		let _ = rec.advance(true);
	}
}
