use std::future::Future;

/// Spawns an async task on the current tokio runtime, tagged with its class.
///
/// # Panics
///
/// Panics when called outside a tokio runtime.
pub fn spawn_task<F>(class: crate::TaskClass, fut: F) -> tokio::task::JoinHandle<F::Output>
where
	F: Future + Send + 'static,
	F::Output: Send + 'static,
{
	tracing::trace!(worker_class = class.as_str(), "worker.spawn_task");
	tokio::spawn(fut)
}

/// Spawns a dedicated named OS thread with shared worker classification metadata.
///
/// # Errors
///
/// Returns the OS error if the thread cannot be created.
pub fn spawn_named_thread<F, R>(class: crate::TaskClass, name: impl Into<String>, f: F) -> std::io::Result<std::thread::JoinHandle<R>>
where
	F: FnOnce() -> R + Send + 'static,
	R: Send + 'static,
{
	let name = name.into();
	tracing::trace!(worker_class = class.as_str(), worker = %name, "worker.spawn_named_thread");
	std::thread::Builder::new().name(name).spawn(f)
}
