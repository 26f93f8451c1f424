//! Blocking multi-producer multi-consumer completion queue.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::tag::CompletionEvent;

struct QueueState {
	events: VecDeque<CompletionEvent>,
	closed: bool,
}

struct QueueInner {
	state: Mutex<QueueState>,
	ready: Condvar,
}

/// Push was rejected because the queue is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("completion queue closed; dropped {event:?}")]
pub struct QueueClosed {
	/// The event that was not enqueued.
	pub event: CompletionEvent,
}

/// Consumer side of the completion queue, polled by dispatch workers.
///
/// Every event is delivered to exactly one caller of [`pop`](Self::pop);
/// concurrent poppers compete for events. Closing is idempotent: queued events
/// are still drained, after which every blocked and future `pop` returns `None`.
#[derive(Clone)]
pub struct CompletionQueue {
	inner: Arc<QueueInner>,
}

/// Producer side of the completion queue, handed to transports.
#[derive(Clone)]
pub struct CompletionSink {
	inner: Arc<QueueInner>,
}

impl std::fmt::Debug for CompletionQueue {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let state = self.inner.state.lock();
		f.debug_struct("CompletionQueue")
			.field("pending", &state.events.len())
			.field("closed", &state.closed)
			.finish()
	}
}

impl std::fmt::Debug for CompletionSink {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CompletionSink").finish_non_exhaustive()
	}
}

impl Default for CompletionQueue {
	fn default() -> Self {
		Self::new()
	}
}

impl CompletionQueue {
	/// Creates an open, empty queue.
	#[must_use]
	pub fn new() -> Self {
		Self {
			inner: Arc::new(QueueInner {
				state: Mutex::new(QueueState {
					events: VecDeque::new(),
					closed: false,
				}),
				ready: Condvar::new(),
			}),
		}
	}

	/// Returns a producer handle.
	#[must_use]
	pub fn sink(&self) -> CompletionSink {
		CompletionSink {
			inner: Arc::clone(&self.inner),
		}
	}

	/// Blocks until an event is available. Returns `None` once closed and drained.
	pub fn pop(&self) -> Option<CompletionEvent> {
		let mut state = self.inner.state.lock();
		loop {
			if let Some(event) = state.events.pop_front() {
				return Some(event);
			}
			if state.closed {
				return None;
			}
			self.inner.ready.wait(&mut state);
		}
	}

	/// Dequeues one event without waiting.
	#[cfg(test)]
	pub(crate) fn try_pop(&self) -> Option<CompletionEvent> {
		self.inner.state.lock().events.pop_front()
	}

	/// Closes the queue and wakes every blocked consumer.
	///
	/// Returns `true` for the call that actually closed it.
	pub fn close(&self) -> bool {
		let mut state = self.inner.state.lock();
		if state.closed {
			return false;
		}
		state.closed = true;
		drop(state);
		self.inner.ready.notify_all();
		true
	}

	/// Returns `true` once [`close`](Self::close) has been called.
	pub fn is_closed(&self) -> bool {
		self.inner.state.lock().closed
	}

	/// Number of events waiting to be popped.
	pub fn len(&self) -> usize {
		self.inner.state.lock().events.len()
	}

	/// Returns `true` if no events are waiting.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

impl CompletionSink {
	/// Enqueues one event and wakes one consumer.
	///
	/// # Errors
	///
	/// Returns [`QueueClosed`] carrying the event if the queue is closed.
	pub fn push(&self, event: CompletionEvent) -> Result<(), QueueClosed> {
		let mut state = self.inner.state.lock();
		if state.closed {
			return Err(QueueClosed { event });
		}
		state.events.push_back(event);
		drop(state);
		self.inner.ready.notify_one();
		Ok(())
	}

	/// Returns `true` once the queue has been closed.
	pub fn is_closed(&self) -> bool {
		self.inner.state.lock().closed
	}
}
