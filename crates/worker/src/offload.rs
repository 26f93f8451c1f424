use std::sync::Arc;

use tokio::runtime::Runtime;

use crate::{TaskClass, join_error_panic_message};

struct OffloadInner {
	runtime: Option<Runtime>,
	threads: usize,
}

impl Drop for OffloadInner {
	fn drop(&mut self) {
		// `shutdown_background` is the only teardown allowed inside an async context.
		if let Some(runtime) = self.runtime.take() {
			runtime.shutdown_background();
		}
	}
}

/// Bounded pool for blocking work that must not hold a dispatch worker.
///
/// Backed by a dedicated tokio runtime whose blocking pool is capped at
/// `threads`; excess jobs queue until a thread frees up.
#[derive(Clone)]
pub struct OffloadPool {
	inner: Arc<OffloadInner>,
}

impl std::fmt::Debug for OffloadPool {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("OffloadPool").field("threads", &self.inner.threads).finish()
	}
}

impl OffloadPool {
	/// Creates a pool running at most `threads` jobs at once.
	///
	/// # Panics
	///
	/// Panics if `threads` is zero.
	///
	/// # Errors
	///
	/// Returns the OS error if the backing runtime cannot be built.
	pub fn new(threads: usize) -> std::io::Result<Self> {
		assert!(threads > 0, "offload pool size must be > 0");
		let runtime = tokio::runtime::Builder::new_multi_thread()
			.worker_threads(1)
			.max_blocking_threads(threads)
			.thread_name("cqrpc-offload")
			.enable_time()
			.build()?;
		Ok(Self {
			inner: Arc::new(OffloadInner {
				runtime: Some(runtime),
				threads,
			}),
		})
	}

	/// Maximum number of concurrently running jobs.
	pub fn threads(&self) -> usize {
		self.inner.threads
	}

	/// Runs `job` on the pool and hands its result to `done`.
	///
	/// A panicking job reaches `done` as `Err(panic message)`.
	pub fn execute<F, R, C>(&self, job: F, done: C)
	where
		F: FnOnce() -> R + Send + 'static,
		R: Send + 'static,
		C: FnOnce(Result<R, String>) + Send + 'static,
	{
		let Some(runtime) = self.inner.runtime.as_ref() else {
			return;
		};
		tracing::trace!(worker_class = TaskClass::Offload.as_str(), "worker.offload.execute");
		let handle = runtime.handle().clone();
		runtime.spawn(async move {
			let result = handle
				.spawn_blocking(job)
				.await
				.map_err(|err| join_error_panic_message(err).unwrap_or_else(|| "offload job cancelled".to_string()));
			done(result);
		});
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use tokio::sync::oneshot;

	use super::*;

	#[tokio::test]
	async fn job_result_reaches_callback() {
		let pool = OffloadPool::new(2).expect("build pool");
		let (tx, rx) = oneshot::channel();
		pool.execute(|| 6 * 7, move |res| {
			let _ = tx.send(res);
		});
		let res = tokio::time::timeout(Duration::from_secs(5), rx).await.expect("job finished").expect("callback ran");
		assert_eq!(res, Ok(42));
	}

	#[tokio::test]
	async fn panicking_job_reports_message() {
		let pool = OffloadPool::new(1).expect("build pool");
		let (tx, rx) = oneshot::channel::<Result<(), String>>();
		pool.execute(|| panic!("slow-boom"), move |res| {
			let _ = tx.send(res);
		});
		let res = tokio::time::timeout(Duration::from_secs(5), rx).await.expect("job finished").expect("callback ran");
		assert!(res.unwrap_err().contains("slow-boom"));
	}
}
