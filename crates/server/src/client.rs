//! One-connection async client.

use bytes::Bytes;
use cqrpc_rpc::{Outcome, Status, StatusCode};
use cqrpc_wire::{Frame, Request, WireError, decode, encode, read_frame, write_frame};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::net::{TcpStream, ToSocketAddrs};

/// Client-side call failure.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
	/// Transport or codec failure.
	#[error(transparent)]
	Wire(#[from] WireError),
	/// Connecting failed.
	#[error("connect failed: {0}")]
	Connect(std::io::Error),
	/// The server answered with a failure status.
	#[error("{0}")]
	Status(Status),
	/// The server closed the connection before answering.
	#[error("connection closed before the response arrived")]
	Closed,
	/// The server sent something other than the awaited response.
	#[error("unexpected frame: {0}")]
	Protocol(String),
}

/// Issues unary calls over one TCP connection, one at a time or pipelined.
#[derive(Debug)]
pub struct Client {
	stream: TcpStream,
	next_id: u64,
}

impl Client {
	/// Connects to a server.
	///
	/// # Errors
	///
	/// Returns [`ClientError::Connect`] if the connection cannot be opened.
	pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, ClientError> {
		let stream = TcpStream::connect(addr).await.map_err(ClientError::Connect)?;
		Ok(Self { stream, next_id: 1 })
	}

	/// Sends raw payload bytes and waits for the outcome.
	///
	/// # Errors
	///
	/// Fails on wire errors or if the connection closes first. A failure
	/// status is an `Ok(Outcome::Failure(..))`.
	pub async fn call(&mut self, method: &str, payload: Vec<u8>) -> Result<Outcome, ClientError> {
		let mut outcomes = self.pipeline(vec![(method.to_owned(), payload)]).await?;
		outcomes.pop().ok_or(ClientError::Closed)
	}

	/// Writes every request before reading any response, then matches the
	/// responses to their requests by id. Outcomes come back in request order
	/// whatever order the server answers in.
	///
	/// # Errors
	///
	/// As [`call`](Self::call), plus [`ClientError::Protocol`] for a response
	/// whose id matches no outstanding request.
	pub async fn pipeline(&mut self, calls: Vec<(String, Vec<u8>)>) -> Result<Vec<Outcome>, ClientError> {
		let first = self.next_id;
		for (method, payload) in calls {
			let id = self.next_id;
			self.next_id += 1;
			write_frame(&mut self.stream, &Frame::Request(Request { id, method, payload })).await?;
		}

		let mut outcomes: Vec<Option<Outcome>> = (first..self.next_id).map(|_| None).collect();
		let mut outstanding = outcomes.len();
		while outstanding > 0 {
			let resp = match read_frame(&mut self.stream).await? {
				Some(Frame::Response(resp)) => resp,
				Some(Frame::Request(req)) => return Err(ClientError::Protocol(format!("request {} from server", req.id))),
				None => return Err(ClientError::Closed),
			};
			let slot = resp
				.id
				.checked_sub(first)
				.and_then(|idx| outcomes.get_mut(idx as usize))
				.filter(|slot| slot.is_none())
				.ok_or_else(|| ClientError::Protocol(format!("response id {} matches no outstanding request", resp.id)))?;
			*slot = Some(match StatusCode::from_u32(resp.code) {
				StatusCode::Ok => Outcome::Ok(Bytes::from(resp.payload)),
				code => Outcome::Failure(Status::new(code, resp.message)),
			});
			outstanding -= 1;
		}
		Ok(outcomes.into_iter().flatten().collect())
	}

	/// Encodes `request`, calls `method`, and decodes the response message.
	///
	/// # Errors
	///
	/// As [`call`](Self::call), plus [`ClientError::Status`] for a failure
	/// status and a codec error for an undecodable response.
	pub async fn unary<Req, Resp>(&mut self, method: &str, request: &Req) -> Result<Resp, ClientError>
	where
		Req: Serialize,
		Resp: DeserializeOwned,
	{
		let payload = self.call(method, encode(request)?).await?.into_result().map_err(ClientError::Status)?;
		Ok(decode(&payload)?)
	}
}
