//! Wiring of config, transport, offload pool and engine into a running server.

use std::net::SocketAddr;
use std::sync::Arc;

use cqrpc_rpc::{Server, ShutdownReport, Transport};
use cqrpc_worker::OffloadPool;

use crate::config::ServerConfig;
use crate::service;
use crate::tcp::TcpTransport;

/// Failure to bring the server up.
#[derive(Debug, thiserror::Error)]
pub enum StartError {
	/// The listen address could not be bound.
	#[error("failed to bind {addr}: {source}")]
	Bind {
		/// Address from the config.
		addr: SocketAddr,
		/// Underlying error.
		source: std::io::Error,
	},
	/// The offload pool could not be built.
	#[error("failed to start offload pool: {0}")]
	Offload(std::io::Error),
	/// The engine refused to start.
	#[error(transparent)]
	Engine(#[from] cqrpc_rpc::Error),
}

/// The demo service serving TCP clients.
#[derive(Debug)]
pub struct App {
	server: Server,
	transport: Arc<TcpTransport>,
	_offload: OffloadPool,
}

impl App {
	/// Binds the listener and starts the engine with every `TestService` method.
	///
	/// Must run inside a tokio runtime; connection tasks are spawned on it.
	///
	/// # Errors
	///
	/// See [`StartError`].
	pub async fn start(config: &ServerConfig) -> Result<Self, StartError> {
		let offload = OffloadPool::new(config.offload_threads).map_err(StartError::Offload)?;
		let transport = TcpTransport::bind(config.listen).await.map_err(|source| StartError::Bind {
			addr: config.listen,
			source,
		})?;
		let dyn_transport: Arc<dyn Transport> = transport.clone();

		let mut builder = Server::builder().transport(Arc::clone(&dyn_transport));
		if let Some(workers) = config.workers {
			builder = builder.workers(workers);
		}
		for binding in service::bindings(&dyn_transport, &offload) {
			builder = builder.bind(binding);
		}
		let server = match builder.start() {
			Ok(server) => server,
			Err(err) => {
				dyn_transport.shutdown();
				return Err(err.into());
			}
		};

		Ok(Self {
			server,
			transport,
			_offload: offload,
		})
	}

	/// Address clients should connect to.
	pub fn local_addr(&self) -> SocketAddr {
		self.transport.local_addr()
	}

	/// The running engine.
	pub fn server(&self) -> &Server {
		&self.server
	}

	/// Runs the two-phase shutdown off the async workers.
	///
	/// # Errors
	///
	/// Fails only if the blocking shutdown task panicked.
	pub async fn shutdown(self) -> Result<ShutdownReport, tokio::task::JoinError> {
		tokio::task::spawn_blocking(move || self.server.shutdown()).await
	}
}
