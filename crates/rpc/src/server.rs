//! Server assembly and lifecycle.

use std::sync::Arc;
use std::thread;

use cqrpc_worker::{TaskClass, WorkerContext, WorkerPool, WorkerRecord, WorkerRegistry};
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::binding::MethodBinding;
use crate::dispatch::Engine;
use crate::error::{Error, Result};
use crate::registry::ServiceRegistry;
use crate::stats::ServerStats;
use crate::table::CallSnapshot;
use crate::transport::Transport;

/// Default thread name prefix for dispatch workers.
pub const DEFAULT_THREAD_NAME: &str = "cqrpc-dispatch";

/// Collects bindings and transports, then starts a [`Server`].
///
/// Binding errors are kept until [`start`](Self::start) so the builder can be
/// chained.
pub struct ServerBuilder {
	registry: ServiceRegistry,
	transports: Vec<Arc<dyn Transport>>,
	workers: Option<usize>,
	thread_name: String,
	error: Option<Error>,
}

impl Default for ServerBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl std::fmt::Debug for ServerBuilder {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ServerBuilder")
			.field("methods", &self.registry.names().collect::<Vec<_>>())
			.field("transports", &self.transports.len())
			.field("workers", &self.workers)
			.field("thread_name", &self.thread_name)
			.finish()
	}
}

impl ServerBuilder {
	/// Empty builder.
	pub fn new() -> Self {
		Self {
			registry: ServiceRegistry::new(),
			transports: Vec::new(),
			workers: None,
			thread_name: DEFAULT_THREAD_NAME.to_owned(),
			error: None,
		}
	}

	/// Number of dispatch workers. Defaults to the available parallelism.
	pub fn workers(mut self, workers: usize) -> Self {
		self.workers = Some(workers);
		self
	}

	/// Thread name prefix for dispatch workers.
	pub fn thread_name(mut self, prefix: impl Into<String>) -> Self {
		self.thread_name = prefix.into();
		self
	}

	/// Adds a method binding.
	pub fn bind(mut self, binding: MethodBinding) -> Self {
		if self.error.is_none()
			&& let Err(err) = self.registry.bind(binding)
		{
			self.error = Some(err);
		}
		self
	}

	/// Adds a transport to shut down with the server.
	pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
		self.transports.push(transport);
		self
	}

	/// Arms one record per method and spawns the dispatch workers.
	///
	/// # Errors
	///
	/// Fails on a duplicate binding, an empty registry, a zero worker count,
	/// or if the worker threads cannot be spawned.
	pub fn start(self) -> Result<Server> {
		if let Some(err) = self.error {
			return Err(err);
		}
		if self.registry.is_empty() {
			return Err(Error::NoMethods);
		}
		let workers = match self.workers {
			Some(0) => return Err(Error::NoWorkers),
			Some(n) => n,
			None => thread::available_parallelism().map_or(1, usize::from),
		};

		let engine = Arc::new(Engine::new(self.registry));
		engine.seed();

		let worker_registry = WorkerRegistry::new();
		let body = {
			let engine = Arc::clone(&engine);
			move |ctx: &WorkerContext| engine.run_worker(ctx)
		};
		let pool = match WorkerPool::spawn(TaskClass::Dispatch, workers, &self.thread_name, &worker_registry, body) {
			Ok(pool) => pool,
			Err(err) => {
				engine.begin_shutdown();
				for transport in &self.transports {
					transport.shutdown();
				}
				engine.queue().close();
				return Err(Error::Spawn(err.to_string()));
			}
		};

		info!(
			workers,
			methods = engine.registry().len(),
			transports = self.transports.len(),
			"rpc.server.start"
		);
		Ok(Server {
			engine,
			transports: self.transports,
			workers: worker_registry,
			pool: Mutex::new(Some(pool)),
			report: Mutex::new(None),
		})
	}
}

/// Outcome of [`Server::shutdown`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
	/// Records still in the table after the workers exited, now destroyed.
	pub reclaimed: Vec<CallSnapshot>,
	/// `(worker name, panic message)` for workers that died.
	pub worker_panics: Vec<(String, String)>,
	/// Counters at the moment the workers stopped.
	pub stats: ServerStats,
}

/// A running server: armed records, a completion queue, and its workers.
pub struct Server {
	engine: Arc<Engine>,
	transports: Vec<Arc<dyn Transport>>,
	workers: WorkerRegistry,
	pool: Mutex<Option<WorkerPool>>,
	report: Mutex<Option<ShutdownReport>>,
}

impl std::fmt::Debug for Server {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Server")
			.field("methods", &self.engine.registry().len())
			.field("live_calls", &self.engine.len())
			.field("shutting_down", &self.engine.is_shutting_down())
			.finish_non_exhaustive()
	}
}

impl Server {
	/// Shorthand for [`ServerBuilder::new`].
	pub fn builder() -> ServerBuilder {
		ServerBuilder::new()
	}

	/// Current counters.
	pub fn stats(&self) -> ServerStats {
		self.engine.stats()
	}

	/// Every live Call Record.
	pub fn calls(&self) -> Vec<CallSnapshot> {
		self.engine.calls()
	}

	/// Records of `method` currently ARMED.
	pub fn armed(&self, method: &str) -> usize {
		self.engine.armed(method)
	}

	/// Bound method names, in binding order.
	pub fn methods(&self) -> Vec<String> {
		self.engine.registry().names().map(str::to_owned).collect()
	}

	/// Dispatch worker snapshots.
	pub fn workers(&self) -> Vec<WorkerRecord> {
		self.workers.snapshots()
	}

	/// Whether [`shutdown`](Self::shutdown) has begun.
	pub fn is_shutting_down(&self) -> bool {
		self.engine.is_shutting_down()
	}

	/// Stops the server and waits for every worker.
	///
	/// Transports are shut down first so armed records fail out and held
	/// responses flush, then the queue is closed and drained by the workers.
	/// Records left over afterwards are reclaimed. Idempotent: later calls
	/// return the first report. Must not be called from a handler.
	pub fn shutdown(&self) -> ShutdownReport {
		let mut cached = self.report.lock();
		if let Some(report) = cached.as_ref() {
			return report.clone();
		}

		self.engine.begin_shutdown();
		info!("rpc.server.shutdown");
		for transport in &self.transports {
			transport.shutdown();
		}
		self.engine.queue().close();

		let worker_panics = match self.pool.lock().take() {
			Some(pool) => pool.join().panicked,
			None => Vec::new(),
		};
		let reclaimed = self.engine.drain();
		if !reclaimed.is_empty() {
			warn!(reclaimed = reclaimed.len(), "rpc.server.reclaimed");
		}

		let report = ShutdownReport {
			reclaimed,
			worker_panics,
			stats: self.engine.stats(),
		};
		info!(
			completed = report.stats.completed,
			reclaimed = report.reclaimed.len(),
			worker_panics = report.worker_panics.len(),
			"rpc.server.stopped"
		);
		*cached = Some(report.clone());
		report
	}
}

impl Drop for Server {
	fn drop(&mut self) {
		self.shutdown();
	}
}
