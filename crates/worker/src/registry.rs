use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::TaskClass;

/// Lifecycle state of one registered worker thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
	/// The loop body is running.
	Running,
	/// The loop body returned normally.
	Exited,
	/// The loop body panicked.
	Panicked,
}

/// Snapshot for one registered worker.
#[derive(Debug, Clone)]
pub struct WorkerRecord {
	/// Thread name.
	pub name: String,
	/// Execution class.
	pub class: TaskClass,
	/// Current lifecycle state.
	pub state: WorkerState,
	/// Events handled so far.
	pub events: u64,
	/// Panic message of the last abnormal exit.
	pub last_exit: Option<String>,
}

#[derive(Debug)]
struct WorkerEntry {
	class: TaskClass,
	state: WorkerState,
	events: Arc<AtomicU64>,
	last_exit: Option<String>,
}

/// In-memory worker registry for status snapshots.
#[derive(Debug, Default, Clone)]
pub struct WorkerRegistry {
	inner: Arc<RwLock<HashMap<String, WorkerEntry>>>,
}

impl WorkerRegistry {
	/// Creates an empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers a running worker and returns its event counter.
	pub(crate) fn register(&self, name: &str, class: TaskClass) -> Arc<AtomicU64> {
		let events = Arc::new(AtomicU64::new(0));
		if let Ok(mut guard) = self.inner.write() {
			guard.insert(
				name.to_string(),
				WorkerEntry {
					class,
					state: WorkerState::Running,
					events: Arc::clone(&events),
					last_exit: None,
				},
			);
		}
		events
	}

	/// Records how a worker's loop body ended.
	pub(crate) fn mark_exit(&self, name: &str, state: WorkerState, last_exit: Option<String>) {
		if let Ok(mut guard) = self.inner.write()
			&& let Some(entry) = guard.get_mut(name)
		{
			entry.state = state;
			entry.last_exit = last_exit;
		}
	}

	/// Removes one record.
	pub fn remove(&self, name: &str) {
		if let Ok(mut guard) = self.inner.write() {
			guard.remove(name);
		}
	}

	/// Sum of events handled by every registered worker.
	pub fn total_events(&self) -> u64 {
		let Ok(guard) = self.inner.read() else {
			return 0;
		};
		guard.values().map(|entry| entry.events.load(Ordering::Relaxed)).sum()
	}

	/// Returns snapshots sorted by name.
	pub fn snapshots(&self) -> Vec<WorkerRecord> {
		let Ok(guard) = self.inner.read() else {
			return Vec::new();
		};
		let mut records: Vec<_> = guard
			.iter()
			.map(|(name, entry)| WorkerRecord {
				name: name.clone(),
				class: entry.class,
				state: entry.state,
				events: entry.events.load(Ordering::Relaxed),
				last_exit: entry.last_exit.clone(),
			})
			.collect();
		records.sort_by(|a, b| a.name.cmp(&b.name));
		records
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn snapshots_are_sorted_and_track_events() {
		let registry = WorkerRegistry::new();
		let b = registry.register("w-b", TaskClass::Dispatch);
		let a = registry.register("w-a", TaskClass::Offload);
		b.fetch_add(3, Ordering::Relaxed);
		a.fetch_add(1, Ordering::Relaxed);

		let snaps = registry.snapshots();
		assert_eq!(snaps.len(), 2);
		assert_eq!(snaps[0].name, "w-a");
		assert_eq!(snaps[0].events, 1);
		assert_eq!(snaps[1].events, 3);
		assert_eq!(registry.total_events(), 4);
	}

	#[test]
	fn exit_state_is_recorded() {
		let registry = WorkerRegistry::new();
		let _ = registry.register("w-0", TaskClass::Dispatch);
		registry.mark_exit("w-0", WorkerState::Panicked, Some("boom".to_string()));

		let snap = &registry.snapshots()[0];
		assert_eq!(snap.state, WorkerState::Panicked);
		assert_eq!(snap.last_exit.as_deref(), Some("boom"));

		registry.remove("w-0");
		assert!(registry.snapshots().is_empty());
	}
}
