//! TCP transport: framed requests in, framed responses out.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use cqrpc_rpc::{Acceptor, CallContext, CallSlot, Completion, CompletionSink, IncomingCall, Outcome, Responder, Status, Tag, Transport};
use cqrpc_wire::{Frame, Request, Response, read_frame, write_frame};
use cqrpc_worker::{TaskClass, spawn_task};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Response queued for a connection's writer task.
struct Outbound {
	frame: Frame,
	/// Pushed once the frame is flushed; `None` for rejections.
	completion: Option<Completion>,
}

/// Serves bound methods to TCP clients.
///
/// Each connection gets a reader task that offers calls to the shared
/// [`Acceptor`] and a writer task that reports each response's flush as the
/// record's final completion event.
pub struct TcpTransport {
	acceptor: Arc<Acceptor>,
	shutdown: CancellationToken,
	local_addr: SocketAddr,
	connections: Arc<AtomicU64>,
}

impl std::fmt::Debug for TcpTransport {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TcpTransport")
			.field("local_addr", &self.local_addr)
			.field("connections", &self.connections.load(Ordering::Relaxed))
			.finish_non_exhaustive()
	}
}

impl TcpTransport {
	/// Binds `addr` and starts accepting on the current tokio runtime.
	///
	/// # Errors
	///
	/// Returns the error from binding the listener.
	pub async fn bind(addr: SocketAddr) -> std::io::Result<Arc<Self>> {
		let listener = TcpListener::bind(addr).await?;
		let local_addr = listener.local_addr()?;
		let transport = Arc::new(Self {
			acceptor: Arc::new(Acceptor::new()),
			shutdown: CancellationToken::new(),
			local_addr,
			connections: Arc::new(AtomicU64::new(0)),
		});
		tracing::info!(addr = %local_addr, "tcp.listen");
		spawn_task(
			TaskClass::Transport,
			accept_loop(
				listener,
				Arc::clone(&transport.acceptor),
				transport.shutdown.clone(),
				Arc::clone(&transport.connections),
			),
		);
		Ok(transport)
	}

	/// Address the listener is bound to.
	pub fn local_addr(&self) -> SocketAddr {
		self.local_addr
	}

	/// Connections accepted so far.
	pub fn connections(&self) -> u64 {
		self.connections.load(Ordering::Relaxed)
	}
}

impl Transport for TcpTransport {
	fn request_call(&self, method: &str, slot: CallSlot, sink: CompletionSink, tag: Tag) {
		self.acceptor.register(method, slot, sink, tag);
	}

	fn shutdown(&self) {
		self.shutdown.cancel();
		let report = self.acceptor.shutdown();
		tracing::info!(cancelled = report.cancelled, rejected = report.rejected, "tcp.shutdown");
	}
}

async fn accept_loop(listener: TcpListener, acceptor: Arc<Acceptor>, shutdown: CancellationToken, connections: Arc<AtomicU64>) {
	loop {
		tokio::select! {
			_ = shutdown.cancelled() => break,
			res = listener.accept() => match res {
				Ok((stream, peer)) => {
					connections.fetch_add(1, Ordering::Relaxed);
					spawn_task(TaskClass::Transport, handle_connection(stream, peer, Arc::clone(&acceptor), shutdown.clone()));
				}
				Err(err) => tracing::error!(error = %err, "tcp.accept_failed"),
			},
		}
	}
	tracing::debug!("tcp.accept_loop.stop");
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, acceptor: Arc<Acceptor>, shutdown: CancellationToken) {
	tracing::debug!(%peer, "tcp.connection.open");
	if let Err(err) = stream.set_nodelay(true) {
		tracing::debug!(%peer, error = %err, "tcp.connection.nodelay_failed");
	}
	let (reader, writer) = stream.into_split();
	let (tx, rx) = mpsc::unbounded_channel();
	let writer_task = spawn_task(TaskClass::Transport, write_responses(writer, rx, peer));
	read_requests(reader, peer, &acceptor, &tx, &shutdown).await;
	drop(tx);
	// The writer outlives the reader until every matched call has answered.
	if let Err(err) = writer_task.await {
		tracing::error!(%peer, error = %err, "tcp.writer.join_failed");
	}
	tracing::debug!(%peer, "tcp.connection.closed");
}

async fn read_requests(
	mut reader: OwnedReadHalf,
	peer: SocketAddr,
	acceptor: &Acceptor,
	tx: &mpsc::UnboundedSender<Outbound>,
	shutdown: &CancellationToken,
) {
	let peer_label = peer.to_string();
	loop {
		let frame = tokio::select! {
			_ = shutdown.cancelled() => return,
			frame = read_frame(&mut reader) => frame,
		};
		match frame {
			Ok(Some(Frame::Request(Request { id, method, payload }))) => {
				let context = CallContext::new(method).with_peer(peer_label.clone());
				let responder = Box::new(TcpResponder { id, tx: tx.clone() });
				acceptor.offer(IncomingCall::new(context, Bytes::from(payload), responder));
			}
			Ok(Some(Frame::Response(resp))) => {
				tracing::warn!(%peer, id = resp.id, "tcp.connection.unexpected_response");
				return;
			}
			Ok(None) => return,
			Err(err) => {
				tracing::warn!(%peer, error = %err, "tcp.connection.read_failed");
				return;
			}
		}
	}
}

async fn write_responses(mut writer: OwnedWriteHalf, mut rx: mpsc::UnboundedReceiver<Outbound>, peer: SocketAddr) {
	let mut broken = false;
	while let Some(Outbound { frame, completion }) = rx.recv().await {
		let ok = !broken
			&& match write_frame(&mut writer, &frame).await {
				Ok(()) => true,
				Err(err) => {
					tracing::warn!(%peer, error = %err, "tcp.connection.write_failed");
					broken = true;
					false
				}
			};
		if let Some(completion) = completion {
			completion.complete(ok);
		}
	}
}

struct TcpResponder {
	id: u64,
	tx: mpsc::UnboundedSender<Outbound>,
}

impl Responder for TcpResponder {
	fn finish(self: Box<Self>, outcome: Outcome, completion: Completion) {
		// A closed writer hands the message back; dropping it fails the completion.
		let _ = self.tx.send(Outbound {
			frame: response_frame(self.id, outcome),
			completion: Some(completion),
		});
	}

	fn reject(self: Box<Self>, status: Status) {
		let _ = self.tx.send(Outbound {
			frame: response_frame(self.id, Outcome::Failure(status)),
			completion: None,
		});
	}
}

fn response_frame(id: u64, outcome: Outcome) -> Frame {
	let response = match outcome {
		Outcome::Ok(payload) => Response {
			id,
			code: 0,
			message: String::new(),
			payload: payload.to_vec(),
		},
		Outcome::Failure(status) => Response {
			id,
			code: status.code.as_u32(),
			message: status.message,
			payload: Vec::new(),
		},
	};
	Frame::Response(response)
}
