//! Engine counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of the engine counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ServerStats {
	/// Records armed, including the initial seed.
	pub armed: u64,
	/// Records armed as replacements after an accept.
	pub replacements: u64,
	/// Calls matched to a record.
	pub accepted: u64,
	/// Calls answered with a failure status.
	pub failures: u64,
	/// Handler panics converted to `INTERNAL`.
	pub panics: u64,
	/// ARMED records the transport failed (shutdown or cancellation).
	pub discarded: u64,
	/// Records destroyed after their flush confirmation.
	pub completed: u64,
	/// Finished records whose response the transport could not deliver.
	pub transport_failures: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
	pub(crate) armed: AtomicU64,
	pub(crate) replacements: AtomicU64,
	pub(crate) accepted: AtomicU64,
	pub(crate) failures: AtomicU64,
	pub(crate) panics: AtomicU64,
	pub(crate) discarded: AtomicU64,
	pub(crate) completed: AtomicU64,
	pub(crate) transport_failures: AtomicU64,
}

pub(crate) fn bump(counter: &AtomicU64) {
	counter.fetch_add(1, Ordering::Relaxed);
}

impl Counters {
	pub(crate) fn snapshot(&self) -> ServerStats {
		let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
		ServerStats {
			armed: load(&self.armed),
			replacements: load(&self.replacements),
			accepted: load(&self.accepted),
			failures: load(&self.failures),
			panics: load(&self.panics),
			discarded: load(&self.discarded),
			completed: load(&self.completed),
			transport_failures: load(&self.transport_failures),
		}
	}
}
