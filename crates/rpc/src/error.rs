//! Errors raised while assembling or starting a server.

/// Result alias for server construction.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Startup failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// Two bindings were registered under one method name.
	#[error("method '{0}' is bound twice")]
	DuplicateMethod(String),
	/// The server was started with no bound methods.
	#[error("no methods bound")]
	NoMethods,
	/// The server was configured with zero dispatch workers.
	#[error("worker count must be at least 1")]
	NoWorkers,
	/// A dispatch worker thread could not be created.
	#[error("failed to spawn dispatch workers: {0}")]
	Spawn(String),
}
