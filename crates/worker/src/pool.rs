use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;

use crate::registry::{WorkerRegistry, WorkerState};
use crate::{TaskClass, panic_message, spawn_named_thread};

/// Per-thread handle passed to the pool's loop body.
#[derive(Debug)]
pub struct WorkerContext {
	index: usize,
	name: String,
	events: Arc<AtomicU64>,
}

impl WorkerContext {
	/// Position of this worker in its pool.
	pub fn index(&self) -> usize {
		self.index
	}

	/// Thread name of this worker.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Counts one handled event in the registry snapshot.
	pub fn record_event(&self) {
		self.events.fetch_add(1, Ordering::Relaxed);
	}
}

/// Result of joining every worker in a pool.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PoolReport {
	/// Workers whose loop body returned normally.
	pub joined: usize,
	/// `(worker name, panic message)` for workers that panicked.
	pub panicked: Vec<(String, String)>,
}

/// Fixed-size pool of named OS threads that all run the same loop body.
///
/// The body is expected to block on a shared source of work and return once
/// that source is closed; [`WorkerPool::join`] then collects every thread.
#[derive(Debug)]
pub struct WorkerPool {
	class: TaskClass,
	workers: Vec<(String, JoinHandle<()>)>,
	registry: WorkerRegistry,
}

impl WorkerPool {
	/// Spawns `size` threads named `{name_prefix}-{index}`.
	///
	/// # Panics
	///
	/// Panics if `size` is zero.
	///
	/// # Errors
	///
	/// Returns the OS error if a thread cannot be created. Threads spawned
	/// before the failure keep running until their work source closes.
	pub fn spawn<F>(class: TaskClass, size: usize, name_prefix: &str, registry: &WorkerRegistry, body: F) -> std::io::Result<Self>
	where
		F: Fn(&WorkerContext) + Send + Sync + 'static,
	{
		assert!(size > 0, "worker pool size must be > 0");
		let body = Arc::new(body);
		let mut workers = Vec::with_capacity(size);
		for index in 0..size {
			let name = format!("{name_prefix}-{index}");
			let ctx = WorkerContext {
				index,
				name: name.clone(),
				events: registry.register(&name, class),
			};
			let body = Arc::clone(&body);
			let handle = spawn_named_thread(class, name.clone(), move || body(&ctx))?;
			workers.push((name, handle));
		}
		tracing::debug!(worker_class = class.as_str(), size, "worker.pool.spawned");
		Ok(Self {
			class,
			workers,
			registry: registry.clone(),
		})
	}

	/// Number of threads in the pool.
	pub fn len(&self) -> usize {
		self.workers.len()
	}

	/// Returns `true` if the pool has no threads.
	pub fn is_empty(&self) -> bool {
		self.workers.is_empty()
	}

	/// Blocks until every worker has returned, recording exits in the registry.
	pub fn join(self) -> PoolReport {
		let mut report = PoolReport::default();
		for (name, handle) in self.workers {
			match handle.join() {
				Ok(()) => {
					self.registry.mark_exit(&name, WorkerState::Exited, None);
					report.joined += 1;
				}
				Err(payload) => {
					let msg = panic_message(payload.as_ref()).unwrap_or_else(|| "non-string panic payload".to_string());
					tracing::error!(worker_class = self.class.as_str(), worker = %name, panic = %msg, "worker.panicked");
					self.registry.mark_exit(&name, WorkerState::Panicked, Some(msg.clone()));
					report.panicked.push((name, msg));
				}
			}
		}
		report
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::AtomicUsize;

	use super::*;

	#[test]
	fn every_worker_runs_the_body_once() {
		let registry = WorkerRegistry::new();
		let runs = Arc::new(AtomicUsize::new(0));
		let seen = Arc::clone(&runs);
		let pool = WorkerPool::spawn(TaskClass::Dispatch, 3, "test-pool", &registry, move |ctx| {
			seen.fetch_add(1, Ordering::SeqCst);
			ctx.record_event();
		})
		.expect("spawn pool");
		assert_eq!(pool.len(), 3);

		let report = pool.join();
		assert_eq!(report.joined, 3);
		assert!(report.panicked.is_empty());
		assert_eq!(runs.load(Ordering::SeqCst), 3);
		assert_eq!(registry.total_events(), 3);
		assert!(registry.snapshots().iter().all(|r| r.state == WorkerState::Exited));
	}

	#[test]
	fn panicking_worker_is_reported() {
		let registry = WorkerRegistry::new();
		let pool = WorkerPool::spawn(TaskClass::Dispatch, 2, "panic-pool", &registry, |ctx| {
			if ctx.index() == 1 {
				panic!("worker {} failed", ctx.name());
			}
		})
		.expect("spawn pool");

		let report = pool.join();
		assert_eq!(report.joined, 1);
		assert_eq!(report.panicked.len(), 1);
		assert_eq!(report.panicked[0].0, "panic-pool-1");
		assert!(report.panicked[0].1.contains("panic-pool-1 failed"));

		let snaps = registry.snapshots();
		assert_eq!(snaps[1].state, WorkerState::Panicked);
	}

	#[test]
	#[should_panic(expected = "worker pool size must be > 0")]
	fn empty_pool_is_rejected() {
		let _ = WorkerPool::spawn(TaskClass::Dispatch, 0, "empty", &WorkerRegistry::new(), |_| {});
	}
}
